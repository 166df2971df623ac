//! Properties of the earth's atmosphere: air density and pressure altitude.
//!
//! The estimator itself never reads these; the surrounding system uses them
//! to turn dynamic pressure into airspeed. Density correction factors are
//! produced by an external air density observer and averaged here with a
//! [`Pt2`] filter.

use crate::error::FilterError;
use crate::pt2::Pt2;

/// `2 / 1.225 kg/m^3`, used for the indicated airspeed.
const RECIP_STD_DENSITY_TIMES_2: f32 = 1.632;
/// Gas constant of dry air in J/kg/K.
const GAS_CONST_DRY_AIR: f32 = 287.058;
/// `1 - R_dry / R_vapor`.
const ONE_MINUS_RATIO_GAS_CONSTANTS: f32 = 0.378;
/// Offset from degree Celsius to Kelvin.
const CELSIUS_TO_KELVIN_OFFSET: f32 = 273.15;
/// Density correction factors outside of this band are discarded.
const PLAUSIBLE_DENSITY_CORRECTION: (f32, f32) = (0.85, 1.15);

/// Ambient air data from an external temperature/humidity sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
struct AmbientAir {
    /// Degree Celsius.
    temperature: f32,
    /// Relative humidity, `0.0 ..= 1.0`.
    humidity: f32,
}

/// Atmosphere state of one sensor unit.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Atmosphere {
    /// Absolute static pressure in Pa.
    pressure: f32,
    ambient_air: Option<AmbientAir>,
    density_correction: f32,
    density_correction_averager: Pt2<f32, f32>,
    density_measurements: u32,
    gnss_altitude_based_density: Option<f32>,
    extrapolated_sea_level_pressure: f32,
}

impl Atmosphere {
    /// Creates the atmosphere model for the current absolute pressure in Pa.
    ///
    /// `density_averager_cutoff` is the cutoff ratio of the filter that
    /// smooths density correction measurements, relative to their rate.
    ///
    /// # Errors
    ///
    /// See [`Pt2::new`].
    pub fn new(pressure: f32, density_averager_cutoff: f32) -> Result<Self, FilterError> {
        let mut density_correction_averager = Pt2::new(density_averager_cutoff)?;
        density_correction_averager.settle(1.0);
        Ok(Self {
            pressure,
            ambient_air: None,
            density_correction: 1.0,
            density_correction_averager,
            density_measurements: 0,
            gnss_altitude_based_density: None,
            extrapolated_sea_level_pressure: 101_325.0,
        })
    }

    /// Updates the absolute static pressure in Pa.
    pub fn set_pressure(&mut self, pressure: f32) {
        self.pressure = pressure;
    }

    /// Absolute static pressure in Pa.
    #[must_use]
    pub fn pressure(&self) -> f32 {
        self.pressure
    }

    /// Sea level pressure extrapolated from the current pressure and
    /// altitude, in Pa.
    #[must_use]
    pub fn extrapolated_sea_level_pressure(&self) -> f32 {
        self.extrapolated_sea_level_pressure
    }

    /// Records the sea level pressure in Pa derived from a known altitude.
    pub fn set_extrapolated_sea_level_pressure(&mut self, pressure: f32) {
        self.extrapolated_sea_level_pressure = pressure;
    }

    /// Feeds the GNSS altitude in m; `None` if the GNSS fix is not usable.
    pub fn update_density(&mut self, gnss_altitude: Option<f32>) {
        self.gnss_altitude_based_density =
            gnss_altitude.map(|altitude| Self::std_density(altitude) * self.density_correction);
    }

    /// Standard atmosphere density in kg/m^3 at the given altitude in m.
    #[must_use]
    pub fn std_density(altitude: f32) -> f32 {
        0.000_000_003_547_494 * altitude * altitude - 0.000_115_412_74 * altitude + 1.224_096_6
    }

    /// Standard atmosphere density in kg/m^3 at the given static pressure in
    /// Pa.
    #[must_use]
    pub fn pressure_density(static_pressure: f32) -> f32 {
        1.049_634_7e-5 * static_pressure + 0.167_154_6
    }

    /// Best available air density in kg/m^3.
    ///
    /// In order of preference: GNSS altitude based, measured ambient air
    /// data, static pressure based. The first and last are scaled by the
    /// averaged density correction.
    #[must_use]
    pub fn density(&self) -> f32 {
        if let Some(density) = self.gnss_altitude_based_density {
            return density;
        }
        match self.ambient_air {
            Some(air) => Self::humid_air_density(air.humidity, self.pressure, air.temperature),
            None => Self::pressure_density(self.pressure) * self.density_correction,
        }
    }

    /// Pressure altitude in m, negated: more negative the higher the
    /// aircraft flies.
    #[must_use]
    pub fn negative_pressure_altitude(&self) -> f32 {
        let tmp = 8.104_381_5e-4 * self.pressure;
        -tmp * tmp + 0.208_673 * self.pressure - 14_421.439
    }

    /// True airspeed in m/s for the given dynamic pressure in Pa.
    #[must_use]
    pub fn tas_from_dynamic_pressure(&self, dynamic_pressure: f32) -> f32 {
        (2.0 * dynamic_pressure / self.density()).sqrt()
    }

    /// Indicated airspeed in m/s for the given dynamic pressure in Pa.
    #[must_use]
    pub fn ias_from_dynamic_pressure(dynamic_pressure: f32) -> f32 {
        (dynamic_pressure * RECIP_STD_DENSITY_TIMES_2).sqrt()
    }

    /// Sets ambient temperature in degree Celsius and relative humidity.
    pub fn set_ambient_air_data(&mut self, temperature: f32, humidity: f32) {
        self.ambient_air = Some(AmbientAir {
            temperature,
            humidity: humidity.clamp(0.0, 1.0),
        });
    }

    /// Stops using ambient air data, e.g. after a sensor timeout.
    pub fn disregard_ambient_air_data(&mut self) {
        self.ambient_air = None;
    }

    /// `true` while ambient air data is in use.
    #[must_use]
    pub fn has_ambient_air_data(&self) -> bool {
        self.ambient_air.is_some()
    }

    /// The averaged density correction factor currently applied.
    #[must_use]
    pub fn density_correction(&self) -> f32 {
        self.density_correction
    }

    /// Feeds one result of the external air density observer, `None` if the
    /// observer could not produce a valid measurement.
    ///
    /// The first measurement is taken as is; later ones are averaged. An
    /// implausible average resets the correction to one.
    pub fn air_density_metering(&mut self, density_correction: Option<f32>) {
        let Some(measured) = density_correction else {
            return;
        };

        self.density_correction = if self.density_measurements == 0 {
            self.density_correction_averager.settle(measured);
            measured
        } else {
            self.density_correction_averager.respond(measured)
        };
        self.density_measurements = self.density_measurements.saturating_add(1);

        let (low, high) = PLAUSIBLE_DENSITY_CORRECTION;
        if !(low..=high).contains(&self.density_correction) {
            crate::log_warn!(
                "implausible density correction {}, reset to 1",
                self.density_correction
            );
            self.density_correction = 1.0;
            self.density_correction_averager.settle(1.0);
        }
    }

    /// Magnus formula, saturation vapor pressure in Pa.
    fn saturation_vapor_pressure(temperature: f32) -> f32 {
        610.78 * 10.0_f32.powf(7.5 * temperature / (temperature + 237.3))
    }

    fn humid_air_gas_constant(humidity: f32, pressure: f32, temperature: f32) -> f32 {
        let vapor_pressure = humidity * Self::saturation_vapor_pressure(temperature);
        GAS_CONST_DRY_AIR / (1.0 - ONE_MINUS_RATIO_GAS_CONSTANTS * vapor_pressure / pressure)
    }

    fn humid_air_density(humidity: f32, pressure: f32, temperature: f32) -> f32 {
        pressure
            / (Self::humid_air_gas_constant(humidity, pressure, temperature)
                * (temperature + CELSIUS_TO_KELVIN_OFFSET))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn atmosphere() -> Atmosphere {
        Atmosphere::new(101_325.0, 0.1).unwrap()
    }

    #[test]
    fn standard_figures_at_sea_level() {
        let atmosphere = atmosphere();
        assert_relative_eq!(atmosphere.density(), 1.231, epsilon = 0.01);
        assert_relative_eq!(Atmosphere::std_density(0.0), 1.224, epsilon = 0.001);
        assert_relative_eq!(atmosphere.negative_pressure_altitude(), 0.0, epsilon = 25.0);
        assert_relative_eq!(Atmosphere::ias_from_dynamic_pressure(612.5), 31.6, epsilon = 0.1);
    }

    #[test]
    fn pressure_altitude_grows_with_decreasing_pressure() {
        let mut atmosphere = atmosphere();
        atmosphere.set_pressure(89_875.0);
        assert_relative_eq!(atmosphere.pressure(), 89_875.0);
        // roughly 1000 m in the standard atmosphere
        assert_relative_eq!(atmosphere.negative_pressure_altitude(), -1000.0, epsilon = 40.0);
    }

    #[test]
    fn gnss_density_takes_precedence() {
        let mut atmosphere = atmosphere();
        atmosphere.update_density(Some(1000.0));
        assert_relative_eq!(atmosphere.density(), Atmosphere::std_density(1000.0));
        atmosphere.update_density(None);
        assert_relative_eq!(
            atmosphere.density(),
            Atmosphere::pressure_density(101_325.0)
        );
    }

    #[test]
    fn humid_air_is_lighter() {
        let mut atmosphere = atmosphere();
        atmosphere.set_ambient_air_data(20.0, 0.0);
        let dry = atmosphere.density();
        assert_relative_eq!(dry, 1.204, epsilon = 0.002);
        atmosphere.set_ambient_air_data(20.0, 1.0);
        assert!(atmosphere.density() < dry);
        atmosphere.disregard_ambient_air_data();
        assert!(!atmosphere.has_ambient_air_data());
    }

    #[test]
    fn density_correction_is_averaged_and_clamped() {
        let mut atmosphere = atmosphere();
        atmosphere.air_density_metering(None);
        assert_relative_eq!(atmosphere.density_correction(), 1.0);

        atmosphere.air_density_metering(Some(1.05));
        assert_relative_eq!(atmosphere.density_correction(), 1.05);
        atmosphere.air_density_metering(Some(0.95));
        let averaged = atmosphere.density_correction();
        assert!(averaged > 0.95 && averaged < 1.05);

        for _ in 0..200 {
            atmosphere.air_density_metering(Some(0.5));
        }
        assert_relative_eq!(atmosphere.density_correction(), 1.0, epsilon = 0.2);
        assert!((0.85..=1.15).contains(&atmosphere.density_correction()));
    }

    #[test]
    fn true_airspeed_follows_density() {
        let mut atmosphere = atmosphere();
        let sea_level = atmosphere.tas_from_dynamic_pressure(600.0);
        atmosphere.update_density(Some(3000.0));
        assert!(atmosphere.tas_from_dynamic_pressure(600.0) > sea_level);
    }
}
