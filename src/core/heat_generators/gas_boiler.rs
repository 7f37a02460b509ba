use crate::core::economics::{annuity, AnnualEnergy, Investment};
use crate::core::heat_generators::{
    DispatchContext, GeneratorOutput, HeatGenerator, NATURAL_GAS_CO2_FACTOR,
    NATURAL_GAS_PRIMARY_ENERGY_FACTOR,
};
use crate::core::units::power_series_to_mwh;
use crate::statistics::max_or_zero;
use serde::{Deserialize, Serialize};

const LIFETIME: u32 = 20;
const INSTALLATION_PERCENT: f64 = 1.;
const INSPECTION_PERCENT: f64 = 2.;

/// Peak load boiler. Covers whatever residual load is left, without a capacity limit, and is
/// sized afterwards from the peak of the total demand.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GasBoiler {
    #[serde(default)]
    pub name: String,
    /// EUR/kW
    #[serde(default = "default_specific_cost")]
    pub specific_cost: f64,
    #[serde(default = "default_efficiency")]
    pub efficiency: f64,
    /// installed capacity relative to the peak demand
    #[serde(default = "default_sizing_factor")]
    pub sizing_factor: f64,
}

fn default_specific_cost() -> f64 {
    30.
}

fn default_efficiency() -> f64 {
    0.9
}

fn default_sizing_factor() -> f64 {
    1.
}

impl GasBoiler {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            specific_cost: default_specific_cost(),
            efficiency: default_efficiency(),
            sizing_factor: default_sizing_factor(),
        }
    }

    /// Installed capacity, kW
    pub fn capacity(&self, demand: &[f64]) -> f64 {
        max_or_zero(demand) * self.sizing_factor
    }
}

impl HeatGenerator for GasBoiler {
    fn name(&self) -> &str {
        &self.name
    }

    fn calculate(
        &self,
        residual_load: &[f64],
        context: &DispatchContext,
    ) -> anyhow::Result<GeneratorOutput> {
        let heat = residual_load
            .iter()
            .map(|load| load.max(0.))
            .collect::<Vec<_>>();
        let heat_energy = power_series_to_mwh(&heat, context.step_hours);
        let fuel_demand = heat_energy / self.efficiency;

        let levelized_cost = if heat_energy > 0. {
            let investment = Investment::new(
                self.specific_cost * self.capacity(context.demand),
                LIFETIME,
                INSTALLATION_PERCENT,
                INSPECTION_PERCENT,
            );
            let fuel = AnnualEnergy::purchased(fuel_demand, context.prices.gas);
            annuity(&investment, &fuel, &context.economics) / heat_energy
        } else {
            0.
        };

        Ok(GeneratorOutput {
            electric_power: vec![0.; heat.len()],
            heat,
            heat_energy,
            fuel_demand,
            levelized_cost,
            specific_co2: if heat_energy > 0. {
                fuel_demand * NATURAL_GAS_CO2_FACTOR / heat_energy
            } else {
                0.
            },
            primary_energy: fuel_demand * NATURAL_GAS_PRIMARY_ENERGY_FACTOR,
            colour: "saddlebrown",
            ..Default::default()
        })
    }
}
