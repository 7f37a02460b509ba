use crate::core::economics::Investment;
use crate::core::heat_generators::solar_thermal::subsidised_levelized_cost;
use crate::core::heat_generators::{DispatchContext, ElectricityRole, GeneratorOutput, HeatGenerator};
use crate::core::units::{power_series_to_mwh, WATTS_PER_KILOWATT};
use crate::errors::ensure_same_length;
use crate::read_weather_file::WeatherData;
use serde::{Deserialize, Serialize};

const LIFETIME: u32 = 20;
const INSTALLATION_PERCENT: f64 = 0.5;
const INSPECTION_PERCENT: f64 = 1.;

/// Module temperature at standard test conditions, deg C
const STC_TEMPERATURE: f64 = 25.;
/// Irradiance at standard test conditions, W/m2
const STC_IRRADIANCE: f64 = 1000.;

/// Coefficients k1..k6 of the relative efficiency model for crystalline silicon.
const RELATIVE_EFFICIENCY_COEFFICIENTS: [f64; 6] =
    [-0.017237, -0.040465, -0.004702, 0.000149, 0.000170, 0.000005];

/// Rooftop or ground-mounted PV field. Produces electricity only.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Photovoltaics {
    #[serde(default)]
    pub name: String,
    /// module area, m2
    pub area: f64,
    #[serde(default = "default_efficiency")]
    pub efficiency: f64,
    /// inverter, cabling and soiling losses
    #[serde(default = "default_system_losses")]
    pub system_losses: f64,
    /// constant heat loss coefficient, W/(m2 K)
    #[serde(default = "default_u0")]
    pub u0: f64,
    /// wind dependent heat loss coefficient, W s/(m3 K)
    #[serde(default = "default_u1")]
    pub u1: f64,
    /// EUR/m2
    #[serde(default = "default_specific_cost")]
    pub specific_cost: f64,
}

fn default_efficiency() -> f64 {
    0.199
}

fn default_system_losses() -> f64 {
    0.14
}

fn default_u0() -> f64 {
    26.9
}

fn default_u1() -> f64 {
    6.2
}

fn default_specific_cost() -> f64 {
    100.
}

impl Photovoltaics {
    pub fn new(name: &str, area: f64) -> Self {
        Self {
            name: name.to_string(),
            area,
            efficiency: default_efficiency(),
            system_losses: default_system_losses(),
            u0: default_u0(),
            u1: default_u1(),
            specific_cost: default_specific_cost(),
        }
    }

    /// Efficiency relative to standard test conditions at irradiance `global` (W/m2) and
    /// module temperature `module_temperature` (deg C).
    pub fn relative_efficiency(global: f64, module_temperature: f64) -> f64 {
        if global <= 0. {
            return 0.;
        }
        let [k1, k2, k3, k4, k5, k6] = RELATIVE_EFFICIENCY_COEFFICIENTS;
        let ln_g = (global / STC_IRRADIANCE).ln();
        let dt = module_temperature - STC_TEMPERATURE;

        1. + k1 * ln_g
            + k2 * ln_g.powi(2)
            + dt * (k3 + k4 * ln_g + k5 * ln_g.powi(2))
            + k6 * dt.powi(2)
    }

    /// Electrical output per time step, kW
    pub fn electric_power(&self, weather: &WeatherData) -> Vec<f64> {
        weather
            .global_radiation()
            .iter()
            .zip(weather.air_temperatures.iter())
            .zip(weather.wind_speeds.iter())
            .map(|((&global, &air_temperature), &wind_speed)| {
                if global <= 0. {
                    return 0.;
                }
                let module_temperature = air_temperature + global / (self.u0 + self.u1 * wind_speed);
                // irradiance in kW/m2 times the module area and efficiency gives kW
                let power = global / WATTS_PER_KILOWATT as f64
                    * self.area
                    * self.efficiency
                    * Self::relative_efficiency(global, module_temperature)
                    * (1. - self.system_losses);
                power.max(0.)
            })
            .collect()
    }
}

impl HeatGenerator for Photovoltaics {
    fn name(&self) -> &str {
        &self.name
    }

    fn calculate(
        &self,
        residual_load: &[f64],
        context: &DispatchContext,
    ) -> anyhow::Result<GeneratorOutput> {
        let steps = residual_load.len();
        if self.area <= 0. {
            return Ok(GeneratorOutput::zero(steps, "gold"));
        }

        let weather = context.weather(&self.name)?;
        ensure_same_length("weather data", steps, weather.len())?;
        let electric_power = self.electric_power(weather);
        let electricity_energy = power_series_to_mwh(&electric_power, context.step_hours);

        Ok(GeneratorOutput {
            heat: vec![0.; steps],
            electric_power,
            electricity_energy,
            // levelized cost of electricity, EUR/MWh
            levelized_cost: subsidised_levelized_cost(
                Investment::new(
                    self.specific_cost * self.area,
                    LIFETIME,
                    INSTALLATION_PERCENT,
                    INSPECTION_PERCENT,
                ),
                electricity_energy,
                context,
            ),
            colour: "gold",
            ..Default::default()
        })
    }

    fn electricity_role(&self) -> ElectricityRole {
        ElectricityRole::Producer
    }
}
