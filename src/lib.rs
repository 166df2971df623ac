//! A quaternion attitude and heading reference system (AHRS) for soaring
//! flight sensors.
//!
//! The [`Ahrs`] fuses a 3-axis gyroscope, accelerometer and magnetometer,
//! optionally aided by GNSS acceleration and a differential GNSS heading,
//! into an attitude estimate. Attitude errors are fed back through a PI
//! loop: the proportional part corrects the attitude, the integral part
//! learns the gyro bias. Alongside the attitude it derives smoothed turn
//! rate, slip angle, nick angle and G-load, and classifies the flight regime
//! ([`CirclingState`]), which in turn decides how much the magnetic and
//! DGNSS heading references are trusted.
//!
//! The algebra ([`Vector`], [`Matrix`], [`Quaternion`]) and the [`Pt2`]
//! low-pass filter are usable on their own.
//!
//! # Conventions
//!
//! - Body frame: front, right, bottom. Navigation frame: north, east, down.
//! - The attitude quaternion rotates body vectors into the navigation frame.
//! - Euler angles use the 3-2-1 (yaw, pitch, roll) sequence, in radians.
//! - A level accelerometer at rest reads `(0, 0, +g)`.

mod logging;

pub(crate) use logging::{log_debug, log_info, log_warn};

mod ahrs;
mod atmosphere;
mod circling;
mod error;
mod magnetic;
mod matrix;
mod pt2;
mod quaternion;
mod vector;

pub use ahrs::{
    Ahrs, AhrsParameters, AntennaOffset, PerRegime, BOTTOM, DOWN, EAST, FRONT, NORTH, RIGHT,
};
pub use atmosphere::Atmosphere;
pub use circling::{CirclingClassifier, CirclingParameters, CirclingState};
pub use error::{AhrsError, AlgebraError, CalibrationError, FilterError};
pub use magnetic::{
    CompassCalibration, FixedInduction, InductionAverager, InductionObserver, LinearFit,
    LinearLeastSquareFit, MagneticCalibrator,
};
pub use matrix::{Matrix, Matrix3};
pub use pt2::{Pt2, Signal};
pub use quaternion::{EulerAngles, Quaternion};
pub use vector::{Real, Vector, Vector3, Vector4};
