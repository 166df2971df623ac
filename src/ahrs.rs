//! The attitude and heading reference system.
//!
//! [`Ahrs`] owns the attitude quaternion and runs one fusion cycle per
//! sample:
//!
//! 1. propagate the attitude with the bias-compensated gyro rates,
//! 2. rotate acceleration and induction into the navigation frame,
//! 3. form the tilt error from observed versus expected gravity,
//! 4. form the heading error from the magnetometer and, if available, the
//!    differential GNSS heading, weighted by the flight regime,
//! 5. apply the error through a PI loop: the proportional part rotates the
//!    attitude, the integral part learns the gyro bias,
//! 6. collect magnetometer calibration data and feed the induction observer,
//! 7. smooth turn rate, slip angle, nick angle and G-load, and classify the
//!    flight regime.
//!
//! Frames: body is (front, right, bottom), navigation is (north, east,
//! down). The accelerometer convention is "gravity points down", i.e. a
//! sensor at rest and level reads `(0, 0, +g)`.

use core::f32::consts::PI;
use core::time::Duration;

use nalgebra::UnitQuaternion;

use crate::circling::{CirclingClassifier, CirclingParameters, CirclingState};
use crate::error::AhrsError;
use crate::magnetic::{
    CompassCalibration, InductionAverager, InductionObserver, MagneticCalibrator,
};
use crate::matrix::Matrix3;
use crate::pt2::Pt2;
use crate::quaternion::{EulerAngles, Quaternion};
use crate::vector::Vector3;

/// Navigation frame axis index.
pub const NORTH: usize = 0;
/// Navigation frame axis index.
pub const EAST: usize = 1;
/// Navigation frame axis index.
pub const DOWN: usize = 2;
/// Body frame axis index.
pub const FRONT: usize = 0;
/// Body frame axis index.
pub const RIGHT: usize = 1;
/// Body frame axis index.
pub const BOTTOM: usize = 2;

/// A value for each [`CirclingState`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PerRegime<T> {
    /// Used in [`CirclingState::StraightFlight`].
    pub straight_flight: T,
    /// Used in [`CirclingState::Transition`].
    pub transition: T,
    /// Used in [`CirclingState::Circling`].
    pub circling: T,
}

impl<T: Copy> PerRegime<T> {
    /// The same value in every regime.
    #[must_use]
    pub fn uniform(value: T) -> Self {
        Self {
            straight_flight: value,
            transition: value,
            circling: value,
        }
    }

    /// The value for `state`.
    #[must_use]
    pub fn get(&self, state: CirclingState) -> T {
        match state {
            CirclingState::StraightFlight => self.straight_flight,
            CirclingState::Transition => self.transition,
            CirclingState::Circling => self.circling,
        }
    }
}

/// Mounting of the secondary GNSS antenna, relative to the base line length.
///
/// A perfectly mounted secondary antenna sits straight ahead of the primary
/// one: `down = right = 0`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AntennaOffset {
    /// How much lower the secondary antenna sits.
    pub down: f32,
    /// How much further right the secondary antenna sits.
    pub right: f32,
}

/// Parameters for the [`Ahrs`] estimator.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AhrsParameters {
    /// Fixed interval between two update calls.
    pub sampling_time: Duration,
    /// Proportional gain of the attitude correction loop, in 1/s.
    ///
    /// The attitude error decays roughly with a time constant of
    /// $1 / k_p$.
    pub attitude_p_gain: f32,
    /// Integral gain of the gyro bias learning loop, in 1/s^2.
    ///
    /// Bias converges roughly with a time constant of $k_p / k_i$.
    pub bias_i_gain: f32,
    /// Weight of the tilt error from the accelerometer.
    pub acceleration_gain: f32,
    /// Weight of the magnetic heading error before normalization by the
    /// horizontal field strength.
    pub magnetic_heading_gain: f32,
    /// Weight of the differential GNSS heading error.
    pub dgnss_heading_gain: f32,
    /// Trust in the magnetic heading per flight regime.
    pub magnetic_weights: PerRegime<f32>,
    /// Trust in the differential GNSS heading per flight regime.
    pub dgnss_weights: PerRegime<f32>,
    /// Flight regimes in which magnetometer calibration data is collected.
    pub calibration_regimes: PerRegime<bool>,
    /// Magnetic correction is suppressed while the observed induction
    /// differs from the expected one by more than this fraction of the
    /// expected magnitude.
    pub magnetic_disturbance_limit: f32,
    /// Consecutive implausible magnetometer samples after which the
    /// induction observer is reset and learns the reference anew.
    pub magnetic_recovery_samples: u32,
    /// Bound for every component of the learned gyro correction, in rad/s.
    pub gyro_correction_limit: f32,
    /// Magnitude of gravity in the unit of the accelerometer readings.
    pub gravity: f32,
    /// Thresholds of the circling classifier.
    pub circling: CirclingParameters,
    /// Cutoff ratio `Fc / Fs` of the slip angle smoother.
    pub slip_angle_cutoff: f32,
    /// Cutoff ratio `Fc / Fs` of the nick angle smoother.
    pub nick_angle_cutoff: f32,
    /// Cutoff ratio `Fc / Fs` of the turn rate smoother.
    pub turn_rate_cutoff: f32,
    /// Cutoff ratio `Fc / Fs` of the G-load smoother.
    pub g_load_cutoff: f32,
    /// Secondary GNSS antenna mounting.
    pub antenna: AntennaOffset,
    /// Samples per axis before a magnetometer calibration is accepted.
    pub calibration_min_samples: u32,
}

impl Default for AhrsParameters {
    fn default() -> Self {
        Self {
            sampling_time: Duration::from_millis(10),
            attitude_p_gain: 0.5,
            bias_i_gain: 0.01,
            acceleration_gain: 1.0,
            magnetic_heading_gain: 1.0,
            dgnss_heading_gain: 1.0,
            magnetic_weights: PerRegime {
                straight_flight: 1.0,
                transition: 0.5,
                circling: 1.0,
            },
            dgnss_weights: PerRegime {
                straight_flight: 1.0,
                transition: 0.5,
                circling: 0.25,
            },
            calibration_regimes: PerRegime {
                straight_flight: true,
                transition: false,
                circling: false,
            },
            magnetic_disturbance_limit: 0.3,
            magnetic_recovery_samples: 6000,
            gyro_correction_limit: 0.1,
            gravity: 9.81,
            circling: CirclingParameters::default(),
            slip_angle_cutoff: 0.005,
            nick_angle_cutoff: 0.005,
            turn_rate_cutoff: 0.005,
            g_load_cutoff: 0.01,
            antenna: AntennaOffset::default(),
            calibration_min_samples: 1000,
        }
    }
}

impl AhrsParameters {
    fn validate(&self) -> Result<(), AhrsError> {
        let checks = [
            ("sampling_time", !self.sampling_time.is_zero()),
            ("attitude_p_gain", self.attitude_p_gain >= 0.0),
            ("bias_i_gain", self.bias_i_gain >= 0.0),
            ("gravity", self.gravity > 0.0),
            ("gyro_correction_limit", self.gyro_correction_limit >= 0.0),
            ("magnetic_disturbance_limit", self.magnetic_disturbance_limit > 0.0),
            ("magnetic_recovery_samples", self.magnetic_recovery_samples > 0),
            (
                "circling.low_turn_rate",
                self.circling.low_turn_rate < self.circling.high_turn_rate,
            ),
            (
                "circling.hysteresis_samples",
                self.circling.hysteresis_samples > 0,
            ),
        ];
        match checks.iter().find(|(_, valid)| !valid) {
            Some((name, _)) => Err(AhrsError::InvalidParameter { name: *name }),
            None => Ok(()),
        }
    }
}

/// Which heading references take part in one update cycle.
#[derive(Debug, Clone, Copy)]
struct HeadingSources {
    /// Magnetometer steers the heading and feeds observer and calibration.
    magnetic: bool,
    dgnss_heading: Option<f32>,
}

/// Low-pass filtered flight state signals.
#[derive(Debug, Clone, PartialEq)]
struct OutputSmoothers {
    slip_angle: Pt2<f32, f32>,
    nick_angle: Pt2<f32, f32>,
    turn_rate: Pt2<f32, f32>,
    g_load: Pt2<f32, f32>,
}

impl OutputSmoothers {
    fn new(parameters: &AhrsParameters) -> Result<Self, AhrsError> {
        let mut smoothers = Self {
            slip_angle: Pt2::new(parameters.slip_angle_cutoff)?,
            nick_angle: Pt2::new(parameters.nick_angle_cutoff)?,
            turn_rate: Pt2::new(parameters.turn_rate_cutoff)?,
            g_load: Pt2::new(parameters.g_load_cutoff)?,
        };
        smoothers.g_load.settle(1.0);
        Ok(smoothers)
    }
}

/// The attitude and heading reference system.
///
/// One instance per sensor unit; all state is owned here and updated
/// synchronously by the update calls, once per
/// [`AhrsParameters::sampling_time`].
///
/// # Example
///
/// ```rust
/// use soar_ahrs::{Ahrs, AhrsParameters, CirclingState, FixedInduction, Vector3};
///
/// let induction = Vector3::from_xyz(0.2, 0.0, 0.45);
/// let mut ahrs =
///     Ahrs::with_observer(AhrsParameters::default(), FixedInduction::new(induction)).unwrap();
///
/// for _ in 0..100 {
///     ahrs.update(
///         Vector3::zeros(),
///         Vector3::from_xyz(0.0, 0.0, 9.81),
///         induction,
///         None,
///         None,
///     );
/// }
///
/// assert!(ahrs.euler().roll.abs() < 1e-4);
/// assert_eq!(ahrs.circling_state(), CirclingState::StraightFlight);
/// ```
#[derive(Debug, Clone)]
pub struct Ahrs<O = InductionAverager> {
    parameters: AhrsParameters,
    /// Sampling time in seconds.
    ts: f32,
    attitude: Quaternion<f32>,
    body2nav: Matrix3<f32>,
    /// Navigation frame error of the last cycle.
    nav_correction: Vector3<f32>,
    /// Learned additive gyro compensation, converges to minus the bias.
    gyro_correction: Vector3<f32>,
    acceleration_nav_frame: Vector3<f32>,
    induction_nav_frame: Vector3<f32>,
    expected_nav_induction: Vector3<f32>,
    circling: CirclingClassifier,
    smoothers: OutputSmoothers,
    compass_calibration: CompassCalibration,
    magnetic_calibrator: MagneticCalibrator,
    induction_observer: O,
    heading_difference_ahrs_dgnss: f32,
    magnetic_disturbance: f32,
    magnetic_control_gain: f32,
    magnetic_suppressed: bool,
    /// Consecutive samples rejected by the plausibility check.
    implausible_samples: u32,
}

impl Ahrs<InductionAverager> {
    /// Creates an estimator that learns the expected induction with an
    /// [`InductionAverager`].
    ///
    /// # Errors
    ///
    /// [`AhrsError::InvalidParameter`] or [`AhrsError::Filter`] if the
    /// parameters do not validate.
    pub fn new(parameters: AhrsParameters) -> Result<Self, AhrsError> {
        let observer = InductionAverager::new(InductionAverager::DEFAULT_CUTOFF)?;
        Self::with_observer(parameters, observer)
    }
}

impl<O: InductionObserver> Ahrs<O> {
    /// Creates an estimator at identity attitude using the given induction
    /// observer.
    ///
    /// # Errors
    ///
    /// [`AhrsError::InvalidParameter`] or [`AhrsError::Filter`] if the
    /// parameters do not validate.
    pub fn with_observer(parameters: AhrsParameters, induction_observer: O) -> Result<Self, AhrsError> {
        parameters.validate()?;
        let smoothers = OutputSmoothers::new(&parameters)?;

        crate::log_info!(
            "AHRS ready, Ts = {} s",
            parameters.sampling_time.as_secs_f32()
        );

        let mut ahrs = Self {
            ts: parameters.sampling_time.as_secs_f32(),
            attitude: Quaternion::identity(),
            body2nav: Matrix3::identity(),
            nav_correction: Vector3::zeros(),
            gyro_correction: Vector3::zeros(),
            acceleration_nav_frame: Vector3::zeros(),
            induction_nav_frame: Vector3::zeros(),
            expected_nav_induction: induction_observer.expected_induction(),
            circling: CirclingClassifier::new(parameters.circling),
            smoothers,
            compass_calibration: CompassCalibration::default(),
            magnetic_calibrator: MagneticCalibrator::default(),
            induction_observer,
            heading_difference_ahrs_dgnss: 0.0,
            magnetic_disturbance: 0.0,
            magnetic_control_gain: 0.0,
            magnetic_suppressed: false,
            implausible_samples: 0,
            parameters,
        };
        ahrs.update_magnetic_loop_gain();
        Ok(ahrs)
    }

    /// Seeds the attitude from one accelerometer and one magnetometer
    /// sample: tilt from gravity, heading from the horizontal field.
    ///
    /// With a valid induction observer its declination is taken into
    /// account, otherwise magnetic north is taken as north.
    ///
    /// # Errors
    ///
    /// [`AhrsError::Algebra`] if either vector is zero or both are parallel.
    /// The attitude is left unchanged then.
    pub fn attitude_setup(
        &mut self,
        acceleration: &Vector3<f32>,
        induction: &Vector3<f32>,
    ) -> Result<(), AhrsError> {
        let induction = self.compass_calibration.calibrate(induction);
        let down = acceleration.normalized()?;
        let east = down.cross(&induction).normalized()?;
        let north = east.cross(&down);

        let body2nav = Matrix3::from_rows([
            [north[0], north[1], north[2]],
            [east[0], east[1], east[2]],
            [down[0], down[1], down[2]],
        ]);
        let mut attitude = Quaternion::from_rotation_matrix(&body2nav);

        if self.induction_observer.is_valid() {
            let expected = self.induction_observer.expected_induction();
            let declination = expected[EAST].atan2(expected[NORTH]);
            attitude = Quaternion::from_euler(0.0, 0.0, declination) * attitude;
        }

        self.set_attitude(attitude);
        let euler = self.euler();
        crate::log_info!(
            "attitude setup: roll {} nick {} yaw {}",
            euler.roll,
            euler.pitch,
            euler.yaw
        );
        Ok(())
    }

    /// Resets the attitude to the given Euler angles in radians.
    pub fn set_from_euler(&mut self, roll: f32, nick: f32, yaw: f32) {
        self.set_attitude(Quaternion::from_euler(roll, nick, yaw));
    }

    /// Full update with magnetic and differential GNSS heading references.
    ///
    /// * `gyro` - body angular rate in rad/s.
    /// * `acc` - body acceleration, gravity pointing down.
    /// * `mag` - raw body magnetic induction.
    /// * `gnss_acceleration` - kinematic acceleration in the navigation
    ///   frame from GNSS, in the accelerometer unit; `None` if not available.
    /// * `gnss_heading` - heading of the differential GNSS base line in
    ///   radians; `None` while not valid, which disables that correction
    ///   for this sample.
    pub fn update(
        &mut self,
        gyro: Vector3<f32>,
        acc: Vector3<f32>,
        mag: Vector3<f32>,
        gnss_acceleration: Option<Vector3<f32>>,
        gnss_heading: Option<f32>,
    ) {
        let sources = HeadingSources {
            magnetic: true,
            dgnss_heading: gnss_heading,
        };
        self.update_cycle(&gyro, &acc, &mag, gnss_acceleration, sources);
    }

    /// Update with the magnetic heading reference only.
    pub fn update_compass(
        &mut self,
        gyro: Vector3<f32>,
        acc: Vector3<f32>,
        mag: Vector3<f32>,
        gnss_acceleration: Option<Vector3<f32>>,
    ) {
        let sources = HeadingSources {
            magnetic: true,
            dgnss_heading: None,
        };
        self.update_cycle(&gyro, &acc, &mag, gnss_acceleration, sources);
    }

    /// Update without any heading reference, e.g. during a soft iron test.
    ///
    /// The magnetometer is only evaluated for the disturbance diagnostic. It
    /// neither steers the attitude nor reaches the induction observer or the
    /// calibration data.
    pub fn update_acc_only(
        &mut self,
        gyro: Vector3<f32>,
        acc: Vector3<f32>,
        mag: Vector3<f32>,
        gnss_acceleration: Option<Vector3<f32>>,
    ) {
        let sources = HeadingSources {
            magnetic: false,
            dgnss_heading: None,
        };
        self.update_cycle(&gyro, &acc, &mag, gnss_acceleration, sources);
    }

    fn update_cycle(
        &mut self,
        gyro: &Vector3<f32>,
        acc: &Vector3<f32>,
        raw_mag: &Vector3<f32>,
        gnss_acceleration: Option<Vector3<f32>>,
        sources: HeadingSources,
    ) {
        let mag = self.compass_calibration.calibrate(raw_mag);

        let corrected_gyro = *gyro + self.gyro_correction;
        self.attitude.rotate_by(&(corrected_gyro * self.ts));
        self.body2nav = self.attitude.rotation_matrix();

        self.acceleration_nav_frame = self.body2nav * *acc;
        self.induction_nav_frame = self.body2nav * mag;
        self.expected_nav_induction = self.induction_observer.expected_induction();
        self.update_magnetic_loop_gain();
        let magnetic_plausible = self.update_magnetic_disturbance();

        let gravity_directions = self.gravity_directions(gnss_acceleration);
        let mut nav_error = gravity_directions
            .map(|(observed, expected)| self.tilt_error(&observed, &expected))
            .unwrap_or_default();
        if sources.magnetic && magnetic_plausible {
            nav_error[DOWN] += self.magnetic_heading_error(gravity_directions);
        }
        if let Some(heading) = sources.dgnss_heading {
            nav_error[DOWN] += self.dgnss_heading_error(heading);
        }
        self.apply_correction(nav_error);

        if sources.magnetic {
            self.track_magnetic_plausibility(magnetic_plausible);
            self.feed_magnetic_induction_observer(raw_mag, &mag, magnetic_plausible);
        }
        self.update_flight_state(&corrected_gyro, acc);
    }

    /// Observed and expected direction of the specific force in the
    /// navigation frame, both of unit length. `None` if either is degenerate.
    fn gravity_directions(
        &self,
        gnss_acceleration: Option<Vector3<f32>>,
    ) -> Option<(Vector3<f32>, Vector3<f32>)> {
        let gravity = Vector3::from_xyz(0.0, 0.0, self.parameters.gravity);
        let expected = gravity - gnss_acceleration.unwrap_or_default();
        let observed = self.acceleration_nav_frame.normalized().ok()?;
        Some((observed, expected.normalized().ok()?))
    }

    /// Tilt error from observed versus expected gravity direction, in the
    /// navigation frame. The down component is dropped: heading comes from
    /// the heading references only.
    fn tilt_error(&self, observed: &Vector3<f32>, expected: &Vector3<f32>) -> Vector3<f32> {
        let mut error = observed.cross(expected) * self.parameters.acceleration_gain;
        error[DOWN] = 0.0;
        error
    }

    /// Heading error about the down axis from the horizontal components of
    /// observed and expected induction.
    ///
    /// The observed induction is leveled first with the rotation that takes
    /// the observed gravity direction onto the expected one, so a tilt error
    /// does not leak into the heading term through the vertical field.
    fn magnetic_heading_error(
        &self,
        gravity_directions: Option<(Vector3<f32>, Vector3<f32>)>,
    ) -> f32 {
        if !self.induction_observer.is_valid() {
            return 0.0;
        }
        let leveling = gravity_directions.and_then(|(observed, expected)| {
            UnitQuaternion::rotation_between(&observed.into_inner(), &expected.into_inner())
        });
        let observed = match leveling {
            Some(rotation) => Vector3::from(rotation * self.induction_nav_frame.into_inner()),
            None => self.induction_nav_frame,
        };
        let expected = &self.expected_nav_induction;
        let weight = self.parameters.magnetic_weights.get(self.circling.state());

        (observed[NORTH] * expected[EAST] - observed[EAST] * expected[NORTH])
            * self.magnetic_control_gain
            * weight
    }

    /// Heading error about the down axis from the differential GNSS base
    /// line heading.
    fn dgnss_heading_error(&mut self, gnss_heading: f32) -> f32 {
        let antenna = self.parameters.antenna;
        let baseline = self.body2nav * Vector3::from_xyz(1.0, antenna.right, antenna.down);
        let ahrs_heading = baseline[EAST].atan2(baseline[NORTH]);

        self.heading_difference_ahrs_dgnss = wrap_angle(ahrs_heading - gnss_heading);

        let weight = self.parameters.dgnss_weights.get(self.circling.state());
        -self.heading_difference_ahrs_dgnss * self.parameters.dgnss_heading_gain * weight
    }

    /// Applies the navigation frame error through the PI loop.
    fn apply_correction(&mut self, nav_error: Vector3<f32>) {
        self.nav_correction = nav_error;
        let body_error = self.body2nav.reverse_map(&nav_error);

        let limit = self.parameters.gyro_correction_limit;
        self.gyro_correction += body_error * (self.parameters.bias_i_gain * self.ts);
        self.gyro_correction = self.gyro_correction.map(|x| x.clamp(-limit, limit));

        self.attitude
            .rotate_by(&(body_error * (self.parameters.attitude_p_gain * self.ts)));
        self.body2nav = self.attitude.rotation_matrix();
    }

    /// Updates [`Self::magnetic_disturbance`] and returns whether the
    /// magnetometer is plausible for this sample.
    fn update_magnetic_disturbance(&mut self) -> bool {
        self.magnetic_disturbance = (self.induction_nav_frame - self.expected_nav_induction).norm();

        let bound = self.parameters.magnetic_disturbance_limit * self.expected_nav_induction.norm();
        let plausible = !self.induction_observer.is_valid() || self.magnetic_disturbance <= bound;

        if plausible == self.magnetic_suppressed {
            self.magnetic_suppressed = !plausible;
            if self.magnetic_suppressed {
                crate::log_warn!(
                    "magnetic disturbance {} above {}, heading correction suspended",
                    self.magnetic_disturbance,
                    bound
                );
            } else {
                crate::log_info!("magnetic disturbance back to {}", self.magnetic_disturbance);
            }
        }
        plausible
    }

    fn update_magnetic_loop_gain(&mut self) {
        let expected = &self.expected_nav_induction;
        let horizontal_squared = expected[NORTH] * expected[NORTH] + expected[EAST] * expected[EAST];
        self.magnetic_control_gain = if horizontal_squared > 0.0 {
            self.parameters.magnetic_heading_gain / horizontal_squared
        } else {
            0.0
        };
    }

    /// Resets the induction observer after a long run of implausible
    /// samples, so a reference that no longer matches the sensor cannot
    /// suppress magnetic correction forever.
    fn track_magnetic_plausibility(&mut self, plausible: bool) {
        if plausible {
            self.implausible_samples = 0;
            return;
        }
        self.implausible_samples = self.implausible_samples.saturating_add(1);
        if self.implausible_samples >= self.parameters.magnetic_recovery_samples {
            crate::log_warn!(
                "magnetometer implausible for {} samples, relearning the reference",
                self.implausible_samples
            );
            self.reset_induction_reference();
        }
    }

    /// Makes the induction observer learn the reference anew from the next
    /// sample.
    fn reset_induction_reference(&mut self) {
        self.induction_observer.reset();
        self.implausible_samples = 0;
    }

    fn feed_magnetic_induction_observer(
        &mut self,
        raw_mag: &Vector3<f32>,
        mag: &Vector3<f32>,
        plausible: bool,
    ) {
        if !plausible {
            return;
        }
        if self.induction_observer.is_valid()
            && self
                .parameters
                .calibration_regimes
                .get(self.circling.state())
        {
            let expected_body = self.body2nav.reverse_map(&self.expected_nav_induction);
            self.magnetic_calibrator.feed(raw_mag, &expected_body);
        }
        self.induction_observer.feed(mag, &self.attitude);
    }

    fn update_flight_state(&mut self, corrected_gyro: &Vector3<f32>, acc: &Vector3<f32>) {
        let nav_rate = self.body2nav * *corrected_gyro;
        let turn_rate = self.smoothers.turn_rate.respond(nav_rate[DOWN]);
        self.circling.update(turn_rate);

        self.smoothers
            .slip_angle
            .respond(acc[RIGHT].atan2(acc[BOTTOM]));
        self.smoothers
            .nick_angle
            .respond((-acc[FRONT]).atan2(acc[BOTTOM]));
        self.smoothers
            .g_load
            .respond(acc[BOTTOM] / self.parameters.gravity);
    }

    fn set_attitude(&mut self, attitude: Quaternion<f32>) {
        self.attitude = attitude;
        self.body2nav = attitude.rotation_matrix();
    }

    /// Evaluates the collected magnetometer calibration data and, on
    /// success, applies the new calibration to all following samples.
    ///
    /// The collected data is kept; the fit keeps improving with further
    /// samples.
    ///
    /// # Errors
    ///
    /// [`AhrsError::Calibration`] while the data does not yet support a fit.
    pub fn handle_magnetic_calibration(&mut self) -> Result<CompassCalibration, AhrsError> {
        let calibration = self
            .magnetic_calibrator
            .compute(self.parameters.calibration_min_samples)?;
        crate::log_info!(
            "compass calibration accepted after {} samples",
            self.magnetic_calibrator.samples()
        );
        self.set_compass_calibration(calibration);
        Ok(calibration)
    }

    /// Installs a previously stored calibration.
    ///
    /// The induction observer is reset: a reference learned from
    /// differently calibrated samples would reject the new ones.
    pub fn set_compass_calibration(&mut self, calibration: CompassCalibration) {
        self.compass_calibration = calibration;
        self.reset_induction_reference();
    }

    /// Updates the secondary antenna mounting, e.g. after a mounting
    /// calibration.
    pub fn set_antenna_offset(&mut self, antenna: AntennaOffset) {
        self.parameters.antenna = antenna;
    }

    /// The estimator parameters.
    #[must_use]
    pub fn parameters(&self) -> &AhrsParameters {
        &self.parameters
    }

    /// The attitude quaternion, body to navigation frame.
    #[must_use]
    pub fn attitude(&self) -> Quaternion<f32> {
        self.attitude
    }

    /// The attitude as Euler angles.
    #[must_use]
    pub fn euler(&self) -> EulerAngles<f32> {
        self.attitude.euler()
    }

    /// The body to navigation rotation matrix.
    #[must_use]
    pub fn body2nav(&self) -> &Matrix3<f32> {
        &self.body2nav
    }

    /// The body front axis in the navigation frame.
    #[must_use]
    pub fn orientation(&self) -> Vector3<f32> {
        Vector3::from_xyz(
            self.attitude.north(),
            self.attitude.east(),
            self.attitude.down(),
        )
    }

    /// True heading in radians.
    #[must_use]
    pub fn heading(&self) -> f32 {
        self.attitude.heading()
    }

    /// Acceleration in the navigation frame, as observed in the last cycle.
    #[must_use]
    pub fn nav_acceleration(&self) -> &Vector3<f32> {
        &self.acceleration_nav_frame
    }

    /// Induction in the navigation frame, as observed in the last cycle.
    #[must_use]
    pub fn nav_induction(&self) -> &Vector3<f32> {
        &self.induction_nav_frame
    }

    /// Induction the observer expects in the navigation frame.
    #[must_use]
    pub fn expected_nav_induction(&self) -> &Vector3<f32> {
        &self.expected_nav_induction
    }

    /// Learned gyro compensation in rad/s; added to the raw rates, so it
    /// converges to minus the gyro bias.
    #[must_use]
    pub fn gyro_correction(&self) -> &Vector3<f32> {
        &self.gyro_correction
    }

    /// Navigation frame attitude error of the last cycle.
    #[must_use]
    pub fn nav_correction(&self) -> &Vector3<f32> {
        &self.nav_correction
    }

    /// The current flight regime.
    #[must_use]
    pub fn circling_state(&self) -> CirclingState {
        self.circling.state()
    }

    /// Smoothed slip angle in radians, positive with acceleration to the
    /// right.
    #[must_use]
    pub fn slip_angle(&self) -> f32 {
        self.smoothers.slip_angle.output()
    }

    /// Smoothed nick (pitch) angle from the accelerometer, in radians.
    #[must_use]
    pub fn nick_angle(&self) -> f32 {
        self.smoothers.nick_angle.output()
    }

    /// Smoothed turn rate about the down axis in rad/s, positive turning
    /// right.
    #[must_use]
    pub fn turn_rate(&self) -> f32 {
        self.smoothers.turn_rate.output()
    }

    /// Smoothed load factor along the body bottom axis, 1 in level flight.
    #[must_use]
    pub fn g_load(&self) -> f32 {
        self.smoothers.g_load.output()
    }

    /// AHRS heading minus differential GNSS heading in radians, from the
    /// last sample that carried a valid GNSS heading.
    #[must_use]
    pub fn heading_difference_ahrs_dgnss(&self) -> f32 {
        self.heading_difference_ahrs_dgnss
    }

    /// `|observed - expected|` navigation frame induction.
    #[must_use]
    pub fn magnetic_disturbance(&self) -> f32 {
        self.magnetic_disturbance
    }

    /// Magnetic heading loop gain, inversely proportional to the squared
    /// horizontal field strength.
    #[must_use]
    pub fn magnetic_loop_gain(&self) -> f32 {
        self.magnetic_control_gain
    }

    /// The calibration applied to raw magnetometer readings.
    #[must_use]
    pub fn compass_calibration(&self) -> &CompassCalibration {
        &self.compass_calibration
    }

    /// Calibration data collected so far.
    #[must_use]
    pub fn magnetic_calibrator(&self) -> &MagneticCalibrator {
        &self.magnetic_calibrator
    }

    /// The induction observer.
    #[must_use]
    pub fn induction_observer(&self) -> &O {
        &self.induction_observer
    }

    /// Mutable access to the induction observer, e.g. to initialize it with
    /// a world magnetic model value.
    pub fn induction_observer_mut(&mut self) -> &mut O {
        &mut self.induction_observer
    }
}

/// Wraps an angle into `[-pi, pi)`.
fn wrap_angle(angle: f32) -> f32 {
    (angle + PI).rem_euclid(2.0 * PI) - PI
}
