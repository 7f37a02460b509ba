use crate::core::economics::{annuity, AnnualEnergy, Investment};
use crate::core::heat_generators::{
    dispatch_unit, DispatchContext, GeneratorOutput, HeatGenerator, OperatingStatistics,
    SizingVariable, WOOD_CO2_FACTOR, WOOD_PRIMARY_ENERGY_FACTOR,
};
use crate::core::storage::StorageConfig;
use crate::core::units::power_series_to_mwh;
use serde::{Deserialize, Serialize};

const LIFETIME: u32 = 15;
const INSTALLATION_PERCENT: f64 = 3.;
const INSPECTION_PERCENT: f64 = 3.;

/// Wood chip or pellet boiler with its fuel store, optionally with a buffer storage.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BiomassBoiler {
    #[serde(default)]
    pub name: String,
    /// kW
    pub thermal_capacity: f64,
    /// m3
    #[serde(default = "default_fuel_store_volume")]
    pub fuel_store_volume: f64,
    /// EUR/kW
    #[serde(default = "default_specific_cost")]
    pub specific_cost: f64,
    /// EUR/m3
    #[serde(default = "default_fuel_store_specific_cost")]
    pub fuel_store_specific_cost: f64,
    #[serde(default = "default_efficiency")]
    pub efficiency: f64,
    #[serde(default = "default_min_part_load")]
    pub min_part_load: f64,
    #[serde(default)]
    pub storage: Option<StorageConfig>,
}

fn default_fuel_store_volume() -> f64 {
    40.
}

fn default_specific_cost() -> f64 {
    200.
}

fn default_fuel_store_specific_cost() -> f64 {
    400.
}

fn default_efficiency() -> f64 {
    0.8
}

fn default_min_part_load() -> f64 {
    0.3
}

impl BiomassBoiler {
    pub fn new(name: &str, thermal_capacity: f64) -> Self {
        Self {
            name: name.to_string(),
            thermal_capacity,
            fuel_store_volume: default_fuel_store_volume(),
            specific_cost: default_specific_cost(),
            fuel_store_specific_cost: default_fuel_store_specific_cost(),
            efficiency: default_efficiency(),
            min_part_load: default_min_part_load(),
            storage: None,
        }
    }

    fn investment(&self) -> f64 {
        self.specific_cost * self.thermal_capacity
            + self.fuel_store_specific_cost * self.fuel_store_volume
            + self.storage.map(|storage| storage.investment()).unwrap_or(0.)
    }
}

impl HeatGenerator for BiomassBoiler {
    fn name(&self) -> &str {
        &self.name
    }

    fn calculate(
        &self,
        residual_load: &[f64],
        context: &DispatchContext,
    ) -> anyhow::Result<GeneratorOutput> {
        if self.thermal_capacity <= 0. {
            return Ok(GeneratorOutput::zero(residual_load.len(), "green"));
        }

        let unit = dispatch_unit(
            residual_load,
            self.thermal_capacity,
            self.min_part_load,
            self.storage.as_ref(),
            context.step_hours,
        );

        let heat_energy = power_series_to_mwh(&unit.delivered, context.step_hours);
        let fuel_demand =
            power_series_to_mwh(&unit.production, context.step_hours) / self.efficiency;

        let levelized_cost = if heat_energy > 0. {
            let investment =
                Investment::new(self.investment(), LIFETIME, INSTALLATION_PERCENT, INSPECTION_PERCENT);
            let fuel = AnnualEnergy::purchased(fuel_demand, context.prices.wood);
            annuity(&investment, &fuel, &context.economics) / heat_energy
        } else {
            0.
        };

        Ok(GeneratorOutput {
            operating_statistics: Some(OperatingStatistics::from_production(
                &unit.production,
                context.step_hours,
            )),
            storage_fill_percent: unit.fill_percent,
            electric_power: vec![0.; unit.delivered.len()],
            heat: unit.delivered,
            heat_energy,
            fuel_demand,
            electricity_energy: 0.,
            levelized_cost,
            specific_co2: if heat_energy > 0. {
                fuel_demand * WOOD_CO2_FACTOR / heat_energy
            } else {
                0.
            },
            primary_energy: fuel_demand * WOOD_PRIMARY_ENERGY_FACTOR,
            colour: "green",
        })
    }

    fn sizing_variables(&self) -> Vec<SizingVariable> {
        let mut variables = vec![SizingVariable::new(
            "thermal_capacity",
            self.thermal_capacity,
            0.,
            1000.,
        )];
        if let Some(storage) = &self.storage {
            variables.push(SizingVariable::new("storage_volume", storage.volume, 0., 100.));
        }
        variables
    }

    fn apply_sizing(&mut self, values: &[f64]) {
        if let Some(&capacity) = values.first() {
            self.thermal_capacity = capacity;
        }
        if let (Some(storage), Some(&volume)) = (self.storage.as_mut(), values.get(1)) {
            storage.volume = volume;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cop::tests::cop_table;
    use crate::core::cop::CopTable;
    use crate::core::economics::EconomicParameters;
    use crate::core::heat_generators::heat_pump::tests::context;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[rstest]
    fn should_follow_load_above_minimum_part_load(cop_table: CopTable) {
        let load = [400., 250., 100., 0., 250.];
        let context = context(&load, &[80.; 5], &[50.; 5], &cop_table);
        let boiler = BiomassBoiler::new("Biomassekessel", 300.);

        let output = boiler.calculate(&load, &context).unwrap();

        assert_eq!(output.heat, vec![300., 250., 100., 0., 250.]);
        assert_relative_eq!(output.heat_energy, 0.9);
        assert_relative_eq!(output.fuel_demand, 0.9 / 0.8);
        assert_relative_eq!(output.specific_co2, 0.036 / 0.8, max_relative = 1e-12);
        assert_eq!(
            output.operating_statistics,
            Some(OperatingStatistics {
                starts: 1,
                operating_hours: 4.,
                hours_per_start: 4.,
            })
        );
        assert_eq!(output.colour, "green");
    }

    #[rstest]
    fn should_levelize_cost_over_delivered_heat(cop_table: CopTable) {
        let load = vec![200.; 8760];
        let (supply, return_) = (vec![80.; 8760], vec![50.; 8760]);
        let context = context(&load, &supply, &return_, &cop_table);
        let boiler = BiomassBoiler::new("Biomassekessel", 200.);

        let output = boiler.calculate(&load, &context).unwrap();

        let investment = Investment::new(200. * 200. + 400. * 40., 15, 3., 3.);
        let fuel = AnnualEnergy::purchased(1752. / 0.8, 50.);
        assert_relative_eq!(
            output.levelized_cost,
            annuity(&investment, &fuel, &EconomicParameters::default()) / 1752.,
            max_relative = 1e-9
        );
    }
}
