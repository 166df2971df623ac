//! Magnetometer calibration data and the expected navigation-frame induction.
//!
//! The estimator does not fit hard/soft iron models itself. It collects
//! per-axis `(raw reading, expected body induction)` pairs in
//! [`LinearLeastSquareFit`] accumulators and turns them into a per-axis
//! offset/scale [`CompassCalibration`] on request. The reference field the
//! heading correction steers towards comes from an [`InductionObserver`].

use crate::error::{CalibrationError, FilterError};
use crate::pt2::Pt2;
use crate::quaternion::Quaternion;
use crate::vector::Vector3;

/// Result of a straight line fit `y = offset + slope * x`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LinearFit {
    /// Intercept.
    pub offset: f64,
    /// Slope.
    pub slope: f64,
    /// Variance of the intercept estimate.
    pub offset_variance: f64,
    /// Variance of the slope estimate.
    pub slope_variance: f64,
}

/// Running sums for a linear least squares fit.
///
/// Sums are kept in `f64`: a calibration run easily collects 10^5 samples.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LinearLeastSquareFit {
    sum_x: f64,
    sum_y: f64,
    sum_xx: f64,
    sum_xy: f64,
    sum_yy: f64,
    count: u64,
}

impl LinearLeastSquareFit {
    /// An empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one `(x, y)` pair.
    pub fn add_value(&mut self, x: f64, y: f64) {
        self.sum_x += x;
        self.sum_y += y;
        self.sum_xx += x * x;
        self.sum_xy += x * y;
        self.sum_yy += y * y;
        self.count += 1;
    }

    /// Number of pairs collected.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.count
    }

    /// `true` if nothing was collected yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Discards all collected pairs.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Evaluates the fit.
    ///
    /// Returns `None` with fewer than three pairs or when all `x` values are
    /// equal, i.e. the slope is undetermined.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn evaluate(&self) -> Option<LinearFit> {
        if self.count < 3 {
            return None;
        }
        let n = self.count as f64;
        let determinant = n * self.sum_xx - self.sum_x * self.sum_x;
        if determinant <= f64::EPSILON * n * self.sum_xx.max(1.0) {
            return None;
        }

        let slope = (n * self.sum_xy - self.sum_x * self.sum_y) / determinant;
        let offset = (self.sum_y - slope * self.sum_x) / n;

        let residual_variance =
            ((self.sum_yy - offset * self.sum_y - slope * self.sum_xy) / (n - 2.0)).max(0.0);

        Some(LinearFit {
            offset,
            slope,
            offset_variance: residual_variance * self.sum_xx / determinant,
            slope_variance: residual_variance * n / determinant,
        })
    }
}

/// Per-axis offset and scale applied to raw magnetometer readings.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CompassCalibration {
    /// Added after scaling.
    pub offset: Vector3<f32>,
    /// Per-axis gain.
    pub scale: Vector3<f32>,
}

impl Default for CompassCalibration {
    fn default() -> Self {
        Self {
            offset: Vector3::zeros(),
            scale: Vector3::from_xyz(1.0, 1.0, 1.0),
        }
    }
}

impl CompassCalibration {
    /// Maps a raw reading to the calibrated body-frame induction.
    #[must_use]
    pub fn calibrate(&self, raw: &Vector3<f32>) -> Vector3<f32> {
        Vector3::from_xyz(
            self.offset[0] + self.scale[0] * raw[0],
            self.offset[1] + self.scale[1] * raw[1],
            self.offset[2] + self.scale[2] * raw[2],
        )
    }
}

/// Collects calibration samples for the three magnetometer axes.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MagneticCalibrator {
    fits: [LinearLeastSquareFit; 3],
}

impl MagneticCalibrator {
    /// Adds one sample: the raw sensor reading and the induction the current
    /// attitude predicts in the body frame.
    pub fn feed(&mut self, raw: &Vector3<f32>, expected_body_induction: &Vector3<f32>) {
        for (axis, fit) in self.fits.iter_mut().enumerate() {
            fit.add_value(f64::from(raw[axis]), f64::from(expected_body_induction[axis]));
        }
    }

    /// The accumulator of one axis.
    #[must_use]
    pub fn fit(&self, axis: usize) -> &LinearLeastSquareFit {
        &self.fits[axis]
    }

    /// Number of samples collected (equal for all axes).
    #[must_use]
    pub fn samples(&self) -> u64 {
        self.fits[0].len()
    }

    /// Evaluates all three axes.
    ///
    /// # Errors
    ///
    /// [`CalibrationError::InsufficientSamples`] if an axis has fewer than
    /// `min_samples` pairs, [`CalibrationError::Degenerate`] if its slope is
    /// undetermined or not a plausible positive gain.
    #[allow(clippy::cast_possible_truncation)]
    pub fn compute(&self, min_samples: u32) -> Result<CompassCalibration, CalibrationError> {
        let mut calibration = CompassCalibration::default();
        for (axis, fit) in self.fits.iter().enumerate() {
            if fit.len() < u64::from(min_samples.max(3)) {
                return Err(CalibrationError::InsufficientSamples {
                    axis,
                    samples: fit.len(),
                });
            }
            let line = fit
                .evaluate()
                .filter(|line| line.slope.is_finite() && line.slope > 0.0)
                .ok_or(CalibrationError::Degenerate { axis })?;

            calibration.offset[axis] = line.offset as f32;
            calibration.scale[axis] = line.slope as f32;
        }
        Ok(calibration)
    }

    /// Discards all samples.
    pub fn reset(&mut self) {
        self.fits.iter_mut().for_each(LinearLeastSquareFit::reset);
    }
}

/// Source of the induction vector expected in the navigation frame.
///
/// This is the contract of the induction observer service the estimator
/// talks to; the estimator feeds it every calibrated sample that passed the
/// plausibility check.
pub trait InductionObserver {
    /// Sets the reference induction in the navigation frame.
    fn initialize(&mut self, reference: Vector3<f32>);

    /// Offers one calibrated body-frame sample together with the attitude it
    /// was taken at.
    fn feed(&mut self, sample: &Vector3<f32>, attitude: &Quaternion<f32>);

    /// The currently expected navigation-frame induction.
    fn expected_induction(&self) -> Vector3<f32>;

    /// `false` while no usable reference exists; heading correction from the
    /// magnetometer is suppressed then.
    fn is_valid(&self) -> bool;

    /// Discards a learned reference so the next fed sample starts over.
    /// Observers with an externally given reference keep it.
    fn reset(&mut self) {}
}

/// A constant, location-dependent reference field.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FixedInduction {
    reference: Option<Vector3<f32>>,
}

impl FixedInduction {
    /// A fixed reference field, e.g. from a world magnetic model.
    #[must_use]
    pub fn new(reference: Vector3<f32>) -> Self {
        Self {
            reference: Some(reference),
        }
    }
}

impl InductionObserver for FixedInduction {
    fn initialize(&mut self, reference: Vector3<f32>) {
        self.reference = Some(reference);
    }

    fn feed(&mut self, _sample: &Vector3<f32>, _attitude: &Quaternion<f32>) {}

    fn expected_induction(&self) -> Vector3<f32> {
        self.reference.unwrap_or_default()
    }

    fn is_valid(&self) -> bool {
        self.reference
            .is_some_and(|reference| reference[0].hypot(reference[1]) > 0.0)
    }
}

/// Tracks the navigation-frame induction with a slow PT2 filter.
///
/// Until [`InductionObserver::initialize`] is called the first fed sample
/// settles the filter. The filter runs in `f64`: at the cutoff ratios needed
/// here the `f32` coefficients would lose the DC gain entirely.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InductionAverager {
    filter: Pt2<Vector3<f64>, f64>,
    initialized: bool,
}

impl InductionAverager {
    /// Default cutoff ratio, a time constant of a few minutes at 100 Hz.
    pub const DEFAULT_CUTOFF: f64 = 1e-5;

    /// Creates an averager with the cutoff ratio `Fc / Fs`.
    ///
    /// # Errors
    ///
    /// See [`Pt2::new`].
    pub fn new(cutoff: f64) -> Result<Self, FilterError> {
        Ok(Self {
            filter: Pt2::new(cutoff)?,
            initialized: false,
        })
    }

    fn widen(v: &Vector3<f32>) -> Vector3<f64> {
        Vector3::from_xyz(f64::from(v[0]), f64::from(v[1]), f64::from(v[2]))
    }
}

impl InductionObserver for InductionAverager {
    fn initialize(&mut self, reference: Vector3<f32>) {
        self.filter.settle(Self::widen(&reference));
        self.initialized = true;
    }

    fn feed(&mut self, sample: &Vector3<f32>, attitude: &Quaternion<f32>) {
        let nav_induction = attitude.rotation_matrix() * *sample;
        if self.initialized {
            self.filter.respond(Self::widen(&nav_induction));
        } else {
            self.initialize(nav_induction);
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn expected_induction(&self) -> Vector3<f32> {
        let expected = self.filter.output();
        Vector3::from_xyz(expected[0] as f32, expected[1] as f32, expected[2] as f32)
    }

    fn is_valid(&self) -> bool {
        let expected = self.filter.output();
        self.initialized && expected[0].hypot(expected[1]) > 0.0
    }

    fn reset(&mut self) {
        self.initialized = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn fits_a_noise_free_line() {
        let mut fit = LinearLeastSquareFit::new();
        assert!(fit.evaluate().is_none());
        for step in 0..100 {
            let x = f64::from(step) * 0.1 - 3.0;
            fit.add_value(x, 0.25 + 1.5 * x);
        }
        let line = fit.evaluate().unwrap();
        assert_relative_eq!(line.offset, 0.25, epsilon = 1e-9);
        assert_relative_eq!(line.slope, 1.5, epsilon = 1e-9);
        assert!(line.slope_variance < 1e-12);
        assert_eq!(fit.len(), 100);

        fit.reset();
        assert!(fit.is_empty());
    }

    #[test]
    fn count_goes_beyond_u32_range() {
        // state after 2^32 - 2 pairs, half of them (0, 1), half (1, 3)
        let pairs = f64::from(u32::MAX) - 1.0;
        let half = pairs / 2.0;
        let mut fit = LinearLeastSquareFit {
            sum_x: half,
            sum_y: half * 4.0,
            sum_xx: half,
            sum_xy: half * 3.0,
            sum_yy: half * 10.0,
            count: u64::from(u32::MAX) - 1,
        };
        fit.add_value(0.0, 1.0);
        fit.add_value(1.0, 3.0);

        assert_eq!(fit.len(), u64::from(u32::MAX) + 1);
        let line = fit.evaluate().unwrap();
        assert_relative_eq!(line.offset, 1.0, epsilon = 1e-9);
        assert_relative_eq!(line.slope, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn constant_input_is_degenerate() {
        let mut fit = LinearLeastSquareFit::new();
        for _ in 0..10 {
            fit.add_value(2.0, 1.0);
        }
        assert!(fit.evaluate().is_none());
    }

    #[test]
    fn calibrator_recovers_offset_and_scale() {
        let mut calibrator = MagneticCalibrator::default();
        let offset = Vector3::from_xyz(0.1_f32, -0.2, 0.05);
        let scale = Vector3::from_xyz(0.9_f32, 1.1, 1.05);

        for step in 0..360_u16 {
            let angle = f32::from(step).to_radians();
            let truth = Vector3::from_xyz(angle.cos(), angle.sin(), 0.5 * (2.0 * angle).sin());
            // raw = (truth - offset) / scale
            let raw = Vector3::from_xyz(
                (truth[0] - offset[0]) / scale[0],
                (truth[1] - offset[1]) / scale[1],
                (truth[2] - offset[2]) / scale[2],
            );
            calibrator.feed(&raw, &truth);
        }

        let calibration = calibrator.compute(100).unwrap();
        for axis in 0..3 {
            assert_relative_eq!(calibration.offset[axis], offset[axis], epsilon = 1e-4);
            assert_relative_eq!(calibration.scale[axis], scale[axis], epsilon = 1e-4);
        }
        let raw = Vector3::from_xyz(0.3_f32, 0.4, -0.2);
        assert_relative_eq!(calibration.calibrate(&raw)[1], -0.2 + 1.1 * 0.4, epsilon = 1e-4);
    }

    #[test]
    fn calibrator_reports_missing_data() {
        let mut calibrator = MagneticCalibrator::default();
        assert_eq!(
            calibrator.compute(10),
            Err(CalibrationError::InsufficientSamples { axis: 0, samples: 0 })
        );
        for _ in 0..20 {
            calibrator.feed(&Vector3::from_xyz(1.0, 1.0, 1.0), &Vector3::from_xyz(0.5, 0.5, 0.5));
        }
        assert_eq!(calibrator.samples(), 20);
        assert_eq!(calibrator.compute(10), Err(CalibrationError::Degenerate { axis: 0 }));

        calibrator.reset();
        assert_eq!(calibrator.samples(), 0);
    }

    #[test]
    fn fixed_induction_validity() {
        let mut observer = FixedInduction::default();
        assert!(!observer.is_valid());
        observer.initialize(Vector3::from_xyz(0.0, 0.0, 0.5));
        // no horizontal component, no heading information
        assert!(!observer.is_valid());
        observer.initialize(Vector3::from_xyz(0.2, 0.0, 0.4));
        observer.feed(&Vector3::zeros(), &Quaternion::identity());
        observer.reset();
        assert!(observer.is_valid());
        assert_eq!(observer.expected_induction(), Vector3::from_xyz(0.2, 0.0, 0.4));
    }

    #[test]
    fn averager_tracks_navigation_frame_induction() {
        let mut observer = InductionAverager::new(0.01).unwrap();
        assert!(!observer.is_valid());

        let nav = Vector3::from_xyz(0.2_f32, 0.05, 0.4);
        let attitude = Quaternion::from_euler(0.1, -0.2, 1.3);
        let body = attitude.rotation_matrix().reverse_map(&nav);

        observer.feed(&body, &attitude);
        assert!(observer.is_valid());
        for _ in 0..100 {
            observer.feed(&body, &attitude);
        }
        assert_relative_eq!((observer.expected_induction() - nav).norm(), 0.0, epsilon = 1e-5);

        observer.reset();
        assert!(!observer.is_valid());
        let moved = Vector3::from_xyz(0.1_f32, 0.2, 0.3);
        observer.feed(&moved, &Quaternion::identity());
        assert!(observer.is_valid());
        assert_relative_eq!((observer.expected_induction() - moved).norm(), 0.0, epsilon = 1e-6);
    }
}
