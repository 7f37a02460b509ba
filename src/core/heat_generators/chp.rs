use crate::core::economics::{annuity, AnnualEnergy, Investment};
use crate::core::heat_generators::{
    dispatch_unit, DispatchContext, ElectricityRole, GeneratorOutput, HeatGenerator,
    OperatingStatistics, SizingVariable, ELECTRICITY_CO2_FACTOR, NATURAL_GAS_CO2_FACTOR,
    NATURAL_GAS_PRIMARY_ENERGY_FACTOR, WOOD_CO2_FACTOR, WOOD_PRIMARY_ENERGY_FACTOR,
};
use crate::core::storage::StorageConfig;
use crate::core::units::power_series_to_mwh;
use serde::{Deserialize, Serialize};

const LIFETIME: u32 = 15;
const INSTALLATION_PERCENT: f64 = 6.;
const INSPECTION_PERCENT: f64 = 2.;

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq, strum::Display)]
pub enum ChpFuel {
    #[default]
    NaturalGas,
    WoodGas,
}

impl ChpFuel {
    /// Investment per kW of thermal output, EUR/kW
    pub fn specific_cost(&self) -> f64 {
        match self {
            Self::NaturalGas => 1500.,
            Self::WoodGas => 1850.,
        }
    }

    pub fn co2_factor(&self) -> f64 {
        match self {
            Self::NaturalGas => NATURAL_GAS_CO2_FACTOR,
            Self::WoodGas => WOOD_CO2_FACTOR,
        }
    }

    pub fn primary_energy_factor(&self) -> f64 {
        match self {
            Self::NaturalGas => NATURAL_GAS_PRIMARY_ENERGY_FACTOR,
            Self::WoodGas => WOOD_PRIMARY_ENERGY_FACTOR,
        }
    }
}

/// Combined heat and power unit, optionally with a buffer storage.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Chp {
    #[serde(default)]
    pub name: String,
    /// kW
    pub thermal_capacity: f64,
    #[serde(default)]
    pub fuel: ChpFuel,
    #[serde(default = "default_electrical_efficiency")]
    pub electrical_efficiency: f64,
    /// electrical plus thermal efficiency
    #[serde(default = "default_total_efficiency")]
    pub total_efficiency: f64,
    #[serde(default = "default_min_part_load")]
    pub min_part_load: f64,
    /// EUR/kW, overrides the fuel's default
    #[serde(default)]
    pub specific_cost: Option<f64>,
    #[serde(default)]
    pub storage: Option<StorageConfig>,
}

fn default_electrical_efficiency() -> f64 {
    0.33
}

fn default_total_efficiency() -> f64 {
    0.9
}

fn default_min_part_load() -> f64 {
    0.7
}

impl Chp {
    pub fn new(name: &str, thermal_capacity: f64, fuel: ChpFuel) -> Self {
        Self {
            name: name.to_string(),
            thermal_capacity,
            fuel,
            electrical_efficiency: default_electrical_efficiency(),
            total_efficiency: default_total_efficiency(),
            min_part_load: default_min_part_load(),
            specific_cost: None,
            storage: None,
        }
    }

    pub fn with_storage(mut self, storage: StorageConfig) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn thermal_efficiency(&self) -> f64 {
        self.total_efficiency - self.electrical_efficiency
    }

    fn investment(&self) -> f64 {
        let unit = self.specific_cost.unwrap_or(self.fuel.specific_cost()) * self.thermal_capacity;
        let storage = self.storage.map(|storage| storage.investment()).unwrap_or(0.);
        unit + storage
    }
}

impl HeatGenerator for Chp {
    fn name(&self) -> &str {
        &self.name
    }

    fn calculate(
        &self,
        residual_load: &[f64],
        context: &DispatchContext,
    ) -> anyhow::Result<GeneratorOutput> {
        if self.thermal_capacity <= 0. {
            return Ok(GeneratorOutput::zero(residual_load.len(), "yellow"));
        }

        let unit = dispatch_unit(
            residual_load,
            self.thermal_capacity,
            self.min_part_load,
            self.storage.as_ref(),
            context.step_hours,
        );
        let electric_power = unit
            .production
            .iter()
            .map(|heat| heat / self.thermal_efficiency() * self.electrical_efficiency)
            .collect::<Vec<_>>();

        let produced_heat = power_series_to_mwh(&unit.production, context.step_hours);
        let heat_energy = power_series_to_mwh(&unit.delivered, context.step_hours);
        let electricity_energy = power_series_to_mwh(&electric_power, context.step_hours);
        let fuel_demand = (produced_heat + electricity_energy) / self.total_efficiency;

        let fuel_price = match self.fuel {
            ChpFuel::NaturalGas => context.prices.gas,
            ChpFuel::WoodGas => context.prices.wood,
        };

        let levelized_cost = if heat_energy > 0. {
            let investment =
                Investment::new(self.investment(), LIFETIME, INSTALLATION_PERCENT, INSPECTION_PERCENT);
            let energy = AnnualEnergy::purchased(fuel_demand, fuel_price)
                .with_revenue(electricity_energy * context.prices.electricity);
            annuity(&investment, &energy, &context.economics) / heat_energy
        } else {
            0.
        };

        // electricity fed into the grid displaces grid emissions
        let co2 = fuel_demand * self.fuel.co2_factor() - electricity_energy * ELECTRICITY_CO2_FACTOR;

        Ok(GeneratorOutput {
            operating_statistics: Some(OperatingStatistics::from_production(
                &unit.production,
                context.step_hours,
            )),
            storage_fill_percent: unit.fill_percent,
            heat: unit.delivered,
            heat_energy,
            fuel_demand,
            electric_power,
            electricity_energy,
            levelized_cost,
            specific_co2: if heat_energy > 0. { co2 / heat_energy } else { 0. },
            primary_energy: fuel_demand * self.fuel.primary_energy_factor(),
            colour: "yellow",
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

    fn electricity_role(&self) -> ElectricityRole {
        ElectricityRole::Producer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cop::tests::cop_table;
    use crate::core::cop::CopTable;
    use crate::core::heat_generators::heat_pump::tests::context;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[rstest]
    fn should_derive_electricity_and_fuel_from_heat(cop_table: CopTable) {
        let load = [200., 80., 50.];
        let context = context(&load, &[80.; 3], &[50.; 3], &cop_table);
        let chp = Chp::new("BHKW", 100., ChpFuel::NaturalGas);

        let output = chp.calculate(&load, &context).unwrap();

        // 50 kW is below the 70 % minimum part load
        assert_eq!(output.heat, vec![100., 80., 0.]);
        assert_relative_eq!(output.electric_power[0], 100. / 0.57 * 0.33, max_relative = 1e-12);
        let electricity = 180. / 0.57 * 0.33 / 1000.;
        assert_relative_eq!(output.electricity_energy, electricity, max_relative = 1e-12);
        assert_relative_eq!(output.fuel_demand, (0.18 + electricity) / 0.9, max_relative = 1e-12);
        assert_relative_eq!(
            output.specific_co2,
            (output.fuel_demand * 0.201 - electricity * 0.4) / 0.18,
            max_relative = 1e-12
        );
        assert_relative_eq!(output.primary_energy, output.fuel_demand * 1.1, max_relative = 1e-12);
        assert_eq!(output.operating_statistics.unwrap().starts, 0);
    }

    #[rstest]
    fn should_price_wood_gas_with_wood(cop_table: CopTable) {
        let load = vec![100.; 100];
        let context = context(&load, &[80.; 100], &[50.; 100], &cop_table);

        let gas = Chp::new("BHKW", 100., ChpFuel::NaturalGas)
            .calculate(&load, &context)
            .unwrap();
        let wood = Chp::new("Holzgas-BHKW", 100., ChpFuel::WoodGas)
            .calculate(&load, &context)
            .unwrap();

        assert_eq!(gas.heat_energy, wood.heat_energy);
        assert!(wood.specific_co2 < gas.specific_co2);
        assert!(wood.primary_energy < gas.primary_energy);
    }

    #[rstest]
    fn should_run_on_off_with_storage(cop_table: CopTable) {
        let load = vec![40.; 48];
        let context = context(&load, &[80.; 48], &[50.; 48], &cop_table);
        let chp = Chp::new("BHKW", 100., ChpFuel::NaturalGas)
            .with_storage(StorageConfig::with_volume(20.));

        let output = chp.calculate(&load, &context).unwrap();

        for delivered in &output.heat {
            assert_relative_eq!(*delivered, 40., max_relative = 1e-9);
        }
        let statistics = output.operating_statistics.unwrap();
        assert!(statistics.starts >= 1);
        assert!(statistics.operating_hours < 48.);
        let fill = output.storage_fill_percent.unwrap();
        assert!(fill.iter().all(|percent| (20. - 1e-9..=80. + 1e-9).contains(percent)));
    }

    #[rstest]
    fn should_offer_storage_volume_for_sizing() {
        let mut chp = Chp::new("BHKW", 100., ChpFuel::NaturalGas)
            .with_storage(StorageConfig::with_volume(20.));
        assert_eq!(
            chp.sizing_variables()
                .iter()
                .map(|variable| variable.name)
                .collect::<Vec<_>>(),
            vec!["thermal_capacity", "storage_volume"]
        );

        chp.apply_sizing(&[150., 35.]);
        assert_eq!(chp.thermal_capacity, 150.);
        assert_eq!(chp.storage.unwrap().volume, 35.);
    }
}
