//! A tunable second-order Butterworth low-pass filter ("PT2").
//!
//! The filter is designed once for the prototype cutoff ratio
//! $F_c / F_s = 0.25$ and retuned to the requested ratio by bilinear
//! frequency warping. The sample type `D` and the coefficient type `B` are
//! independent, so the same filter smooths scalars ([`f32`]) as well as
//! vectors ([`crate::Vector3`]).

use core::ops::{Add, Mul, Sub};
use core::time::Duration;

use crate::error::FilterError;
use crate::vector::{real, Real};

/// Prototype numerator coefficients at the design cutoff ratio.
const PROTOTYPE_B: [f64; 3] = [0.292_893_218_813_452, 0.585_786_437_626_905, 0.292_893_218_813_452];
/// Prototype denominator coefficients at the design cutoff ratio, `a0 = 1`.
const PROTOTYPE_A: [f64; 2] = [0.0, 0.171_572_875_253_810];
/// Cutoff ratio the prototype is designed for.
const DESIGN_RATIO: f64 = 0.25;

/// Samples a [`Pt2`] filter can process.
pub trait Signal<B>: Copy + Default + Add<Output = Self> + Sub<Output = Self> + Mul<B, Output = Self> {}

impl<D, B> Signal<B> for D where D: Copy + Default + Add<Output = D> + Sub<Output = D> + Mul<B, Output = D> {}

/// Second-order IIR low-pass filter in direct form II.
///
/// # Example
///
/// ```rust
/// use soar_ahrs::Pt2;
///
/// // cutoff at 1 % of the sampling frequency
/// let mut filter = Pt2::<f32, f32>::new(0.01).unwrap();
///
/// // without settling, the filter starts from zero and ramps up
/// let first = filter.respond(1.0);
/// assert!(first < 0.01);
///
/// // a settled filter is in steady state right away
/// filter.settle(1.0);
/// assert!((filter.respond(1.0) - 1.0).abs() < 1e-6);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Pt2<D, B> {
    /// The most recent input sample.
    input: D,
    /// The most recent output sample.
    output: D,
    /// Intermediate state one sample back.
    old: D,
    /// Intermediate state two samples back.
    very_old: D,
    /// The numerator coefficients of the filter.
    b: [B; 3],
    /// The denominator coefficients of the filter, assuming `a0 = 1.0`.
    a: [B; 2],
}

impl<D: Signal<B>, B: Real> Pt2<D, B> {
    /// Creates a filter for the cutoff ratio `Fc / Fs`.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::CutoffOutOfRange`] unless `0 < cutoff < 0.5`;
    /// outside of that band the frequency warping yields non-physical
    /// coefficients.
    pub fn new(cutoff: B) -> Result<Self, FilterError> {
        let (b, a) = coefficients(cutoff)?;
        Ok(Self {
            input: D::default(),
            output: D::default(),
            old: D::default(),
            very_old: D::default(),
            b,
            a,
        })
    }

    /// Creates a filter with a cutoff frequency in Hz for the given sampling
    /// time.
    ///
    /// # Errors
    ///
    /// See [`Pt2::new`].
    pub fn with_cutoff_frequency(frequency: B, sampling_time: Duration) -> Result<Self, FilterError> {
        Self::new(frequency * real::<B>(sampling_time.as_secs_f64()))
    }

    /// Primes the filter history so that a constant `value` passes through
    /// without a startup transient.
    pub fn settle(&mut self, value: D) {
        let tuning = nalgebra::one::<B>() / (nalgebra::one::<B>() + self.a[0] + self.a[1]);
        self.old = value * tuning;
        self.very_old = self.old;
        self.input = value;
        self.output = value;
    }

    /// Advances the filter by one sample and returns the new output.
    pub fn respond(&mut self, input: D) -> D {
        self.input = input;
        let x = input - self.old * self.a[0] - self.very_old * self.a[1];
        self.output = x * self.b[0] + self.old * self.b[1] + self.very_old * self.b[2];
        self.very_old = self.old;
        self.old = x;
        self.output
    }

    /// The most recent output.
    #[must_use]
    pub fn output(&self) -> D {
        self.output
    }

    /// The most recent input.
    #[must_use]
    pub fn last_input(&self) -> D {
        self.input
    }

    /// Numerator (`b`) and denominator (`a`, with `a0 = 1` omitted)
    /// coefficients.
    #[must_use]
    pub fn coefficients(&self) -> ([B; 3], [B; 2]) {
        (self.b, self.a)
    }
}

/// Returns the `(b, a)` coefficients of the warped prototype, normalized to
/// `a0 = 1` and to a DC gain of exactly one.
fn coefficients<B: Real>(cutoff: B) -> Result<([B; 3], [B; 2]), FilterError> {
    let zero = nalgebra::zero::<B>();
    if !(cutoff > zero && cutoff < real::<B>(0.5)) {
        return Err(FilterError::CutoffOutOfRange {
            ratio: nalgebra::try_convert(cutoff).unwrap_or(f64::NAN),
        });
    }

    let one = nalgebra::one::<B>();
    let two = real::<B>(2.0);
    let pi = B::pi();
    let design = real::<B>(DESIGN_RATIO);
    let [pb0, pb1, pb2] = PROTOTYPE_B.map(real::<B>);
    let [pa1, pa2] = PROTOTYPE_A.map(real::<B>);

    let delta = (pi * (design - cutoff)).sin() / (pi * (cutoff + design)).sin();
    let delta2 = delta * delta;

    let a0x = pa2 * delta2 - pa1 + one;
    let a1x = -two * delta * pa2 + (delta2 + one) * pa1 - two * delta;
    let a2x = pa2 - delta * pa1 + delta2;

    let b0x = pb2 * delta2 - pb1 * delta + pb0;
    let b1x = -two * delta * pb2 + (delta2 + one) * pb1 - two * delta * pb0;
    let b2x = pb2 - delta * pb1 + delta2 * pb0;

    let a = [a1x / a0x, a2x / a0x];
    let b = [b0x / a0x, b1x / a0x, b2x / a0x];

    // force the DC gain to exactly one
    let gain = (one + a[0] + a[1]) / (b[0] + b[1] + b[2]);
    Ok((b.map(|b| b * gain), a))
}
