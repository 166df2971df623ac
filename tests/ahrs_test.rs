use core::time::Duration;

use approx::{assert_abs_diff_eq, assert_relative_eq};
use rstest::{fixture, rstest};
use soar_ahrs::{
    Ahrs, AhrsError, AhrsParameters, AntennaOffset, CalibrationError, CirclingState,
    CompassCalibration, FixedInduction, InductionObserver, Quaternion, Vector3,
};

const G: f32 = 9.81;
const EPS_ANGLE: f32 = 1e-3;
const SETTLE_STEPS: usize = 6000;

fn gravity() -> Vector3<f32> {
    Vector3::from_xyz(0.0, 0.0, G)
}

fn induction() -> Vector3<f32> {
    Vector3::from_xyz(0.2, 0.0, 0.45)
}

/// Faster loop than the defaults so that every test converges within a
/// minute of simulated flight.
#[fixture]
fn parameters() -> AhrsParameters {
    AhrsParameters {
        sampling_time: Duration::from_millis(10),
        attitude_p_gain: 1.0,
        bias_i_gain: 0.1,
        ..AhrsParameters::default()
    }
}

#[fixture]
fn ahrs(parameters: AhrsParameters) -> Ahrs<FixedInduction> {
    Ahrs::with_observer(parameters, FixedInduction::new(induction())).unwrap()
}

/// Ahrs without a magnetic reference.
#[fixture]
fn gyro_ahrs(parameters: AhrsParameters) -> Ahrs<FixedInduction> {
    Ahrs::with_observer(parameters, FixedInduction::default()).unwrap()
}

/// Sensor readings of a unit at rest with the given attitude.
fn at_rest(attitude: &Quaternion<f32>) -> (Vector3<f32>, Vector3<f32>) {
    let body2nav = attitude.rotation_matrix();
    (body2nav.reverse_map(&gravity()), body2nav.reverse_map(&induction()))
}

#[rstest]
fn stays_at_identity_when_level(mut ahrs: Ahrs<FixedInduction>) {
    for _ in 0..1000 {
        ahrs.update(Vector3::zeros(), gravity(), induction(), None, None);
    }
    let euler = ahrs.euler();
    assert_abs_diff_eq!(euler.roll, 0.0, epsilon = 1e-6);
    assert_abs_diff_eq!(euler.pitch, 0.0, epsilon = 1e-6);
    assert_abs_diff_eq!(euler.yaw, 0.0, epsilon = 1e-6);
    assert_abs_diff_eq!(ahrs.gyro_correction().norm(), 0.0, epsilon = 1e-6);
    assert_eq!(ahrs.circling_state(), CirclingState::StraightFlight);
}

#[rstest]
#[case(0.1, -0.1, 0.2)]
#[case(-0.3, 0.2, -0.5)]
#[case(0.0, 0.0, 0.6)]
fn converges_to_true_attitude(
    mut ahrs: Ahrs<FixedInduction>,
    #[case] roll: f32,
    #[case] nick: f32,
    #[case] yaw: f32,
) {
    ahrs.set_from_euler(roll, nick, yaw);
    for _ in 0..SETTLE_STEPS {
        ahrs.update_compass(Vector3::zeros(), gravity(), induction(), None);
    }
    let euler = ahrs.euler();
    assert_abs_diff_eq!(euler.roll, 0.0, epsilon = EPS_ANGLE);
    assert_abs_diff_eq!(euler.pitch, 0.0, epsilon = EPS_ANGLE);
    assert_abs_diff_eq!(euler.yaw, 0.0, epsilon = EPS_ANGLE);
    assert_abs_diff_eq!(ahrs.gyro_correction().norm(), 0.0, epsilon = EPS_ANGLE);
}

#[rstest]
fn learns_gyro_bias(mut ahrs: Ahrs<FixedInduction>) {
    let bias = Vector3::from_xyz(0.01, -0.02, 0.015);
    for _ in 0..10_000 {
        ahrs.update_compass(bias, gravity(), induction(), None);
    }

    let correction = ahrs.gyro_correction();
    for axis in 0..3 {
        assert_relative_eq!(correction[axis], -bias[axis], epsilon = 1e-4);
    }
    let euler = ahrs.euler();
    assert_abs_diff_eq!(euler.roll, 0.0, epsilon = EPS_ANGLE);
    assert_abs_diff_eq!(euler.pitch, 0.0, epsilon = EPS_ANGLE);
    assert_abs_diff_eq!(euler.yaw, 0.0, epsilon = EPS_ANGLE);
}

#[rstest]
fn gyro_correction_is_bounded(parameters: AhrsParameters) {
    let limit = parameters.gyro_correction_limit;
    let mut ahrs = Ahrs::with_observer(parameters, FixedInduction::new(induction())).unwrap();
    let bias = Vector3::from_xyz(0.5, 0.0, 0.0);
    for _ in 0..SETTLE_STEPS {
        ahrs.update_compass(bias, gravity(), induction(), None);
    }
    assert!(ahrs.gyro_correction()[0] >= -limit - f32::EPSILON);
    assert_relative_eq!(ahrs.gyro_correction()[0], -limit);
}

#[rstest]
fn missing_dgnss_heading_equals_compass_update(parameters: AhrsParameters) {
    let mut full = Ahrs::with_observer(parameters.clone(), FixedInduction::new(induction())).unwrap();
    let mut compass = Ahrs::with_observer(parameters, FixedInduction::new(induction())).unwrap();
    full.set_from_euler(0.05, 0.1, -0.4);
    compass.set_from_euler(0.05, 0.1, -0.4);

    let gyro = Vector3::from_xyz(0.01, 0.0, -0.02);
    for _ in 0..500 {
        full.update(gyro, gravity(), induction(), None, None);
        compass.update_compass(gyro, gravity(), induction(), None);
    }
    assert_eq!(full.attitude(), compass.attitude());
    assert_eq!(full.gyro_correction(), compass.gyro_correction());
    assert_abs_diff_eq!(full.heading_difference_ahrs_dgnss(), 0.0);
}

#[rstest]
fn heading_difference_survives_gnss_outage(mut gyro_ahrs: Ahrs<FixedInduction>) {
    gyro_ahrs.set_from_euler(0.0, 0.0, 0.3);
    gyro_ahrs.update(Vector3::zeros(), gravity(), induction(), None, Some(0.0));
    let difference = gyro_ahrs.heading_difference_ahrs_dgnss();
    assert_relative_eq!(difference, 0.3, epsilon = 0.01);

    for _ in 0..10 {
        gyro_ahrs.update(Vector3::zeros(), gravity(), induction(), None, None);
    }
    assert_eq!(gyro_ahrs.heading_difference_ahrs_dgnss(), difference);
}

#[rstest]
#[case(0.3, AntennaOffset::default(), 0.0)]
#[case(-0.5, AntennaOffset::default(), 0.3)]
#[case(3.0, AntennaOffset::default(), -3.0)]
#[case(0.2, AntennaOffset { down: 0.0, right: 0.1 }, 0.1_f32.atan())]
fn dgnss_heading_steers_attitude(
    mut gyro_ahrs: Ahrs<FixedInduction>,
    #[case] initial_yaw: f32,
    #[case] antenna: AntennaOffset,
    #[case] gnss_heading: f32,
) {
    gyro_ahrs.set_antenna_offset(antenna);
    gyro_ahrs.set_from_euler(0.0, 0.0, initial_yaw);
    for _ in 0..SETTLE_STEPS {
        gyro_ahrs.update(Vector3::zeros(), gravity(), Vector3::zeros(), None, Some(gnss_heading));
    }

    let expected_yaw = gnss_heading - antenna.right.atan2(1.0);
    assert_abs_diff_eq!(gyro_ahrs.heading(), expected_yaw, epsilon = EPS_ANGLE);
    assert_abs_diff_eq!(gyro_ahrs.heading_difference_ahrs_dgnss(), 0.0, epsilon = EPS_ANGLE);
}

#[rstest]
fn gnss_acceleration_compensates_centripetal_load(mut ahrs: Ahrs<FixedInduction>) {
    // level turn, 30 degree bank: lift tilts with the aircraft, the
    // centripetal acceleration points east
    let bank: f32 = 30.0_f32.to_radians();
    let truth = Quaternion::from_euler(bank, 0.0, 0.0);
    let centripetal = G * bank.tan();
    let nav_specific_force = Vector3::from_xyz(0.0, -centripetal, G);
    let body2nav = truth.rotation_matrix();
    let acc = body2nav.reverse_map(&nav_specific_force);
    let mag = body2nav.reverse_map(&induction());

    ahrs.set_from_euler(bank, 0.0, 0.0);
    for _ in 0..1000 {
        ahrs.update_compass(
            Vector3::zeros(),
            acc,
            mag,
            Some(Vector3::from_xyz(0.0, centripetal, 0.0)),
        );
    }
    assert_abs_diff_eq!(ahrs.euler().roll, bank, epsilon = EPS_ANGLE);
}

#[rstest]
fn circling_is_detected_and_left(mut gyro_ahrs: Ahrs<FixedInduction>) {
    let turning = Vector3::from_xyz(0.0, 0.0, 0.3);
    let mut states = Vec::new();
    for _ in 0..1000 {
        gyro_ahrs.update_acc_only(turning, gravity(), induction(), None);
        states.push(gyro_ahrs.circling_state());
    }
    assert_eq!(gyro_ahrs.circling_state(), CirclingState::Circling);
    assert_relative_eq!(gyro_ahrs.turn_rate(), 0.3, epsilon = 1e-3);
    let first_circling = states
        .iter()
        .position(|s| *s == CirclingState::Circling)
        .unwrap();
    assert_eq!(states[first_circling - 1], CirclingState::Transition);

    for _ in 0..1000 {
        gyro_ahrs.update_acc_only(Vector3::zeros(), gravity(), induction(), None);
    }
    assert_eq!(gyro_ahrs.circling_state(), CirclingState::StraightFlight);
    assert_abs_diff_eq!(gyro_ahrs.turn_rate(), 0.0, epsilon = 1e-3);
}

#[rstest]
#[case(Vector3::from_xyz(0.0, 1.0, G), 1.0_f32.atan2(G), 0.0, 1.0)]
#[case(Vector3::from_xyz(-1.0, 0.0, G), 0.0, 1.0_f32.atan2(G), 1.0)]
#[case(Vector3::from_xyz(0.0, 0.0, 2.0 * G), 0.0, 0.0, 2.0)]
fn smoothed_flight_state(
    mut gyro_ahrs: Ahrs<FixedInduction>,
    #[case] acc: Vector3<f32>,
    #[case] slip: f32,
    #[case] nick: f32,
    #[case] g_load: f32,
) {
    for _ in 0..2000 {
        gyro_ahrs.update_acc_only(Vector3::zeros(), acc, Vector3::zeros(), None);
    }
    assert_abs_diff_eq!(gyro_ahrs.slip_angle(), slip, epsilon = 1e-4);
    assert_abs_diff_eq!(gyro_ahrs.nick_angle(), nick, epsilon = 1e-4);
    assert_relative_eq!(gyro_ahrs.g_load(), g_load, epsilon = 1e-4);
}

#[rstest]
#[case(0.0, 0.0, 0.0)]
#[case(0.3, -0.2, 2.0)]
#[case(-0.5, 0.4, -2.5)]
fn attitude_setup_from_rest(
    mut ahrs: Ahrs<FixedInduction>,
    #[case] roll: f32,
    #[case] nick: f32,
    #[case] yaw: f32,
) {
    let (acc, mag) = at_rest(&Quaternion::from_euler(roll, nick, yaw));
    ahrs.attitude_setup(&acc, &mag).unwrap();
    let euler = ahrs.euler();
    assert_abs_diff_eq!(euler.roll, roll, epsilon = 1e-4);
    assert_abs_diff_eq!(euler.pitch, nick, epsilon = 1e-4);
    assert_abs_diff_eq!(euler.yaw, yaw, epsilon = 1e-4);
}

#[test]
fn attitude_setup_without_reference_uses_magnetic_north() {
    let mut ahrs = Ahrs::new(AhrsParameters::default()).unwrap();
    assert!(!ahrs.induction_observer().is_valid());

    // 0.1 rad magnetic declination
    let declined = Vector3::from_xyz(0.2 * 0.1_f32.cos(), 0.2 * 0.1_f32.sin(), 0.45);
    ahrs.attitude_setup(&gravity(), &declined).unwrap();
    assert_abs_diff_eq!(ahrs.heading(), -0.1, epsilon = 1e-4);

    assert!(matches!(
        ahrs.attitude_setup(&gravity(), &Vector3::from_xyz(0.0, 0.0, 0.4)),
        Err(AhrsError::Algebra(_))
    ));
}

#[rstest]
fn magnetic_calibration_from_flight_data(parameters: AhrsParameters) {
    let parameters = AhrsParameters {
        calibration_min_samples: 200,
        ..parameters
    };
    let mut ahrs = Ahrs::with_observer(parameters, FixedInduction::new(induction())).unwrap();
    let offset = Vector3::from_xyz(0.02, -0.01, 0.015);
    let scale = Vector3::from_xyz(1.05, 0.97, 1.02);
    let raw_reading = |truth: Vector3<f32>| {
        Vector3::from_xyz(
            (truth[0] - offset[0]) / scale[0],
            (truth[1] - offset[1]) / scale[1],
            (truth[2] - offset[2]) / scale[2],
        )
    };

    assert!(matches!(
        ahrs.handle_magnetic_calibration(),
        Err(AhrsError::Calibration(CalibrationError::InsufficientSamples { .. }))
    ));

    for yaw_step in 0..36_u8 {
        for roll in [-0.6_f32, 0.0, 0.6] {
            for nick in [-0.4_f32, 0.0, 0.4] {
                let yaw = f32::from(yaw_step) * 10.0_f32.to_radians();
                let (acc, mag) = at_rest(&Quaternion::from_euler(roll, nick, yaw));
                ahrs.set_from_euler(roll, nick, yaw);
                ahrs.update_compass(Vector3::zeros(), acc, raw_reading(mag), None);
            }
        }
    }
    assert_eq!(ahrs.magnetic_calibrator().samples(), 324);

    let calibration = ahrs.handle_magnetic_calibration().unwrap();
    for axis in 0..3 {
        assert_abs_diff_eq!(calibration.offset[axis], offset[axis], epsilon = 5e-3);
        assert_abs_diff_eq!(calibration.scale[axis], scale[axis], epsilon = 5e-3);
    }
    assert_eq!(ahrs.compass_calibration(), &calibration);

    let truth = Quaternion::from_euler(0.2, 0.1, 1.2);
    let (acc, mag) = at_rest(&truth);
    ahrs.set_from_euler(0.2, 0.1, 1.2);
    ahrs.update_compass(Vector3::zeros(), acc, raw_reading(mag), None);
    assert_abs_diff_eq!(ahrs.magnetic_disturbance(), 0.0, epsilon = 5e-3);
}

#[rstest]
fn disturbed_samples_are_not_collected(mut ahrs: Ahrs<FixedInduction>) {
    for _ in 0..100 {
        ahrs.update_compass(Vector3::zeros(), gravity(), induction() * 3.0, None);
    }
    assert!(ahrs.magnetic_disturbance() > 0.5);
    assert_eq!(ahrs.magnetic_calibrator().samples(), 0);
    assert_abs_diff_eq!(ahrs.heading(), 0.0, epsilon = 1e-6);
}

#[rstest]
#[case(AhrsParameters { attitude_p_gain: -1.0, ..AhrsParameters::default() }, "attitude_p_gain")]
#[case(AhrsParameters { gravity: 0.0, ..AhrsParameters::default() }, "gravity")]
#[case(AhrsParameters { magnetic_disturbance_limit: 0.0, ..AhrsParameters::default() }, "magnetic_disturbance_limit")]
fn invalid_parameters(#[case] parameters: AhrsParameters, #[case] name: &'static str) {
    assert_eq!(
        Ahrs::new(parameters).err(),
        Some(AhrsError::InvalidParameter { name })
    );
}

#[rstest]
fn stored_calibration_restarts_the_learned_reference(parameters: AhrsParameters) {
    let mut ahrs = Ahrs::new(parameters).unwrap();
    let hard_iron = Vector3::from_xyz(0.3, 0.0, 0.0);
    let raw = induction() + hard_iron;
    for _ in 0..100 {
        ahrs.update_compass(Vector3::zeros(), gravity(), raw, None);
    }
    assert_abs_diff_eq!((*ahrs.expected_nav_induction() - raw).norm(), 0.0, epsilon = 1e-5);

    ahrs.set_compass_calibration(CompassCalibration {
        offset: -hard_iron,
        ..CompassCalibration::default()
    });
    for _ in 0..10 {
        ahrs.update_compass(Vector3::zeros(), gravity(), raw, None);
    }
    assert_abs_diff_eq!(
        (*ahrs.expected_nav_induction() - induction()).norm(),
        0.0,
        epsilon = 1e-5
    );

    let collected = ahrs.magnetic_calibrator().samples();
    ahrs.set_from_euler(0.0, 0.0, 0.5);
    for _ in 0..SETTLE_STEPS {
        ahrs.update_compass(Vector3::zeros(), gravity(), raw, None);
    }
    assert_abs_diff_eq!(ahrs.heading(), 0.0, epsilon = 5e-3);
    assert!(ahrs.magnetic_calibrator().samples() > collected);
}

#[rstest]
fn persistent_disturbance_relearns_the_reference(parameters: AhrsParameters) {
    let parameters = AhrsParameters {
        magnetic_recovery_samples: 500,
        ..parameters
    };
    let mut ahrs = Ahrs::new(parameters).unwrap();
    for _ in 0..100 {
        ahrs.update_compass(Vector3::zeros(), gravity(), induction(), None);
    }

    // e.g. a new instrument mounted next to the sensor
    let shifted = induction() + Vector3::from_xyz(0.3, 0.0, 0.0);
    for _ in 0..499 {
        ahrs.update_compass(Vector3::zeros(), gravity(), shifted, None);
    }
    assert!(ahrs.magnetic_disturbance() > 0.25);

    for _ in 0..10 {
        ahrs.update_compass(Vector3::zeros(), gravity(), shifted, None);
    }
    assert_abs_diff_eq!(ahrs.magnetic_disturbance(), 0.0, epsilon = 1e-5);
    assert!(ahrs.induction_observer().is_valid());
    assert_abs_diff_eq!(ahrs.heading(), 0.0, epsilon = 1e-6);
}

#[rstest]
fn acc_only_update_does_not_learn_from_the_magnetometer(
    mut ahrs: Ahrs<FixedInduction>,
    parameters: AhrsParameters,
) {
    for _ in 0..500 {
        ahrs.update_acc_only(Vector3::zeros(), gravity(), induction() * 1.1, None);
    }
    assert_eq!(ahrs.magnetic_calibrator().samples(), 0);
    assert!(ahrs.magnetic_disturbance() > 0.04);

    let mut learning = Ahrs::new(parameters).unwrap();
    for _ in 0..500 {
        learning.update_acc_only(Vector3::zeros(), gravity(), induction(), None);
    }
    assert!(!learning.induction_observer().is_valid());
}

#[rstest]
#[case(0.2)]
#[case(0.05)]
fn tilt_error_does_not_leak_into_heading(parameters: AhrsParameters, #[case] horizontal: f32) {
    let field = Vector3::from_xyz(horizontal, 0.0, 0.45);
    let mut ahrs = Ahrs::with_observer(parameters, FixedInduction::new(field)).unwrap();
    ahrs.set_from_euler(0.1, 0.0, 0.0);

    let mut peak_heading: f32 = 0.0;
    for _ in 0..4000 {
        ahrs.update_compass(Vector3::zeros(), gravity(), field, None);
        peak_heading = peak_heading.max(ahrs.heading().abs());
    }
    assert!(peak_heading < 1e-3, "heading excursion {peak_heading}");
    assert_abs_diff_eq!(ahrs.euler().roll, 0.0, epsilon = EPS_ANGLE);
}
