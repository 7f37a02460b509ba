use thiserror::Error;

pub const WATTS_PER_KILOWATT: u32 = 1_000;
pub const KILOWATTS_PER_MEGAWATT: u32 = 1_000;
pub const JOULES_PER_KILOJOULE: u32 = 1_000;
pub const SECONDS_PER_HOUR: u32 = 3_600;
pub const HOURS_PER_YEAR: u32 = 8_760;
pub const HOURS_PER_LEAP_YEAR: u32 = 8_784;
pub const MILLIMETRES_IN_METRE: u32 = 1_000;
pub const PASCALS_PER_BAR: f64 = 100_000.;
pub const ZERO_CELSIUS_IN_KELVIN: f64 = 273.15;

pub fn celsius_to_kelvin(temp_c: f64) -> Result<f64, BelowAbsoluteZeroError> {
    if temp_c < -ZERO_CELSIUS_IN_KELVIN {
        Err(BelowAbsoluteZeroError::from_c(temp_c))
    } else {
        Ok(temp_c + ZERO_CELSIUS_IN_KELVIN)
    }
}

/// Energy in MWh delivered by a power series in kW sampled at a fixed step (hours).
pub fn power_series_to_mwh(power_kw: &[f64], step_hours: f64) -> f64 {
    power_kw.iter().sum::<f64>() / KILOWATTS_PER_MEGAWATT as f64 * step_hours
}

#[derive(Debug, Error)]
#[error("Temperature {temp} {unit} is below absolute zero")]
pub struct BelowAbsoluteZeroError {
    temp: f64,
    unit: &'static str,
}

impl BelowAbsoluteZeroError {
    fn from_c(temp: f64) -> Self {
        Self { temp, unit: "°C" }
    }
}
