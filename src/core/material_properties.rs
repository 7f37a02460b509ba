use crate::core::solvers::root_brent;
use crate::core::units::{JOULES_PER_KILOJOULE, SECONDS_PER_HOUR, ZERO_CELSIUS_IN_KELVIN};
use std::sync::LazyLock;

const JOULES_PER_KILOWATT_HOUR: f64 = JOULES_PER_KILOJOULE as f64 * SECONDS_PER_HOUR as f64;

/// Properties of the heat carrier fluids used in networks and storages.

#[derive(Clone, Copy, Debug)]
pub struct MaterialProperties {
    density: f64,                // kg/m3
    specific_heat_capacity: f64, // J/(kg.K)
}

impl MaterialProperties {
    pub fn new(density: f64, specific_heat_capacity: f64) -> Self {
        Self {
            density,
            specific_heat_capacity,
        }
    }

    pub fn density(&self) -> f64 {
        self.density
    }

    pub fn specific_heat_capacity(&self) -> f64 {
        self.specific_heat_capacity
    }

    /// Return the heat held by a volume of this material over a temperature spread, in kWh
    ///
    /// Arguments:
    /// * `volume` - volume in m3
    /// * `temp_high` - upper temperature, in deg C or K
    /// * `temp_low` - lower temperature, in same units as temp_high
    pub fn stored_heat_kwh(&self, volume: f64, temp_high: f64, temp_low: f64) -> f64 {
        volume * self.density * self.specific_heat_capacity * (temp_high - temp_low)
            / JOULES_PER_KILOWATT_HOUR
    }
}

/// Water as used in buffer storages.
pub static WATER: LazyLock<MaterialProperties> =
    LazyLock::new(|| MaterialProperties::new(1000., 4186.));

/// Water as seen by the network heat-exchanger controllers.
pub static NETWORK_WATER: LazyLock<MaterialProperties> =
    LazyLock::new(|| MaterialProperties::new(1000., 4190.));

pub const TRIPLE_POINT_PRESSURE_PA: f64 = 611.657;
pub const TRIPLE_POINT_TEMPERATURE_C: f64 = 0.01;

const WATER_VAPOUR_GAS_CONSTANT: f64 = 461.5; // J/(kg.K)
const WATER_VAPOUR_HEAT_CAPACITY_RATIO: f64 = 1.33;

/// Saturation pressure of water vapour over liquid water (Magnus form), in Pa
pub fn saturation_pressure(temp_c: f64) -> f64 {
    611.2 * (17.62 * temp_c / (243.12 + temp_c)).exp()
}

/// Saturation temperature for a given vapour pressure, in deg C
pub fn saturation_temperature(pressure_pa: f64) -> anyhow::Result<f64> {
    root_brent(
        |temp_c| saturation_pressure(temp_c) - pressure_pa,
        -20.,
        150.,
        1e-9,
    )
}

/// Latent heat of vaporisation of water, in kJ/kg
pub fn latent_heat_of_vaporisation(temp_c: f64) -> f64 {
    2500.9 - 2.36 * temp_c
}

/// Latent heat of vaporisation at the saturation temperature of the given pressure, in kJ/kg
pub fn latent_heat_at_pressure(pressure_pa: f64) -> anyhow::Result<f64> {
    Ok(latent_heat_of_vaporisation(saturation_temperature(
        pressure_pa,
    )?))
}

/// Specific work to compress saturated water vapour between two pressures, in kJ/kg
///
/// Ideal-gas isentropic compression from `inlet_pressure` at `inlet_temp_c`, divided by the
/// compressor's isentropic efficiency.
pub fn vapour_compression_work(
    inlet_temp_c: f64,
    inlet_pressure: f64,
    outlet_pressure: f64,
    isentropic_efficiency: f64,
) -> f64 {
    let kappa = WATER_VAPOUR_HEAT_CAPACITY_RATIO;
    let cp = kappa / (kappa - 1.) * WATER_VAPOUR_GAS_CONSTANT;
    let inlet_temp_k = inlet_temp_c + ZERO_CELSIUS_IN_KELVIN;
    let isentropic_work =
        cp * inlet_temp_k * ((outlet_pressure / inlet_pressure).powf((kappa - 1.) / kappa) - 1.);

    isentropic_work / isentropic_efficiency / JOULES_PER_KILOJOULE as f64
}
