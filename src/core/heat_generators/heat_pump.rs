use crate::core::cop::{CopSeries, SourceTemperature};
use crate::core::economics::{annuity, AnnualEnergy, Investment};
use crate::core::heat_generators::{
    capped_dispatch, DispatchContext, ElectricityRole, GeneratorOutput, HeatGenerator,
    SizingVariable, ELECTRICITY_CO2_FACTOR, ELECTRICITY_PRIMARY_ENERGY_FACTOR,
};
use crate::core::units::power_series_to_mwh;
use crate::statistics::max_or_zero;
use serde::{Deserialize, Serialize};

const HEAT_PUMP_LIFETIME: u32 = 20;
const HEAT_PUMP_INSTALLATION_PERCENT: f64 = 1.;
const HEAT_PUMP_INSPECTION_PERCENT: f64 = 1.5;
const SOURCE_INSTALLATION_PERCENT: f64 = 0.5;
const SOURCE_INSPECTION_PERCENT: f64 = 0.5;

/// Source temperature as given in the input: one value, or one per time step.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum SourceTemperatureInput {
    Constant(f64),
    Series(Vec<f64>),
}

impl SourceTemperatureInput {
    pub fn as_source(&self) -> SourceTemperature<'_> {
        match self {
            Self::Constant(value) => SourceTemperature::Constant(*value),
            Self::Series(series) => SourceTemperature::Series(series),
        }
    }
}

fn default_heat_pump_specific_cost() -> f64 {
    1000.
}

fn default_min_part_load() -> f64 {
    0.2
}

/// Capital side of a heat pump with its heat source.
pub(crate) struct HeatPumpCosting {
    /// heat pump capacity the investment is based on, kW
    pub heat_pump_capacity: f64,
    /// EUR/kW
    pub heat_pump_specific_cost: f64,
    /// investment in the heat source (collector, probes, intake), EUR
    pub source_investment: f64,
    pub source_lifetime: u32,
}

impl HeatPumpCosting {
    /// Levelized cost of heat (EUR/MWh) from the heat pump and source annuities.
    pub fn levelized_cost(
        &self,
        heat_energy: f64,
        electricity_energy: f64,
        context: &DispatchContext,
    ) -> f64 {
        if heat_energy == 0. {
            return 0.;
        }

        let heat_pump = Investment::new(
            self.heat_pump_specific_cost * self.heat_pump_capacity.round(),
            HEAT_PUMP_LIFETIME,
            HEAT_PUMP_INSTALLATION_PERCENT,
            HEAT_PUMP_INSPECTION_PERCENT,
        );
        let electricity = AnnualEnergy::purchased(electricity_energy, context.prices.electricity);
        let source = Investment::new(
            self.source_investment,
            self.source_lifetime,
            SOURCE_INSTALLATION_PERCENT,
            SOURCE_INSPECTION_PERCENT,
        );

        (annuity(&heat_pump, &electricity, &context.economics)
            + annuity(&source, &AnnualEnergy::default(), &context.economics))
            / heat_energy
    }
}

/// Electricity drawn for a heat series at the given COPs, kW.
pub(crate) fn electric_power(heat: &[f64], cop: &[f64]) -> Vec<f64> {
    heat.iter()
        .zip(cop.iter())
        .map(|(heat, cop)| if *heat > 0. { heat / cop } else { 0. })
        .collect()
}

/// Assemble the common heat pump result from delivered heat and electricity series.
pub(crate) fn heat_pump_output(
    heat: Vec<f64>,
    electric_power: Vec<f64>,
    costing: HeatPumpCosting,
    context: &DispatchContext,
    colour: &'static str,
) -> GeneratorOutput {
    let heat_energy = power_series_to_mwh(&heat, context.step_hours);
    let electricity_energy = power_series_to_mwh(&electric_power, context.step_hours);

    GeneratorOutput {
        levelized_cost: costing.levelized_cost(heat_energy, electricity_energy, context),
        specific_co2: if heat_energy > 0. {
            electricity_energy * ELECTRICITY_CO2_FACTOR / heat_energy
        } else {
            0.
        },
        primary_energy: electricity_energy * ELECTRICITY_PRIMARY_ENERGY_FACTOR,
        heat,
        heat_energy,
        electric_power,
        electricity_energy,
        colour,
        ..Default::default()
    }
}

/// Heat pump drawing on river water, sized by its thermal output.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RiverHeatPump {
    #[serde(default)]
    pub name: String,
    /// kW
    pub thermal_capacity: f64,
    /// river temperature, deg C
    pub source_temperature: SourceTemperatureInput,
    /// shortfall of the reachable supply temperature that is still accepted, K
    #[serde(default)]
    pub deadband: f64,
    /// river intake investment, EUR/kW
    #[serde(default = "default_river_source_cost")]
    pub source_specific_cost: f64,
    #[serde(default = "default_heat_pump_specific_cost")]
    pub heat_pump_specific_cost: f64,
    #[serde(default = "default_min_part_load")]
    pub min_part_load: f64,
}

fn default_river_source_cost() -> f64 {
    1000.
}

impl RiverHeatPump {
    pub fn new(name: &str, thermal_capacity: f64, source_temperature: f64) -> Self {
        Self {
            name: name.to_string(),
            thermal_capacity,
            source_temperature: SourceTemperatureInput::Constant(source_temperature),
            deadband: 0.,
            source_specific_cost: default_river_source_cost(),
            heat_pump_specific_cost: default_heat_pump_specific_cost(),
            min_part_load: default_min_part_load(),
        }
    }
}

impl HeatGenerator for RiverHeatPump {
    fn name(&self) -> &str {
        &self.name
    }

    fn calculate(
        &self,
        residual_load: &[f64],
        context: &DispatchContext,
    ) -> anyhow::Result<GeneratorOutput> {
        if self.thermal_capacity <= 0. {
            return Ok(GeneratorOutput::zero(residual_load.len(), "blue"));
        }

        let CopSeries {
            cop,
            supply_temperatures: reachable,
        } = context
            .cop_table(&self.name)?
            .interpolate(context.supply_temperatures, self.source_temperature.as_source())?;

        let heat = capped_dispatch(
            residual_load,
            |t| {
                if reachable[t] >= context.supply_temperatures[t] - self.deadband {
                    self.thermal_capacity
                } else {
                    0.
                }
            },
            self.min_part_load,
        );
        let electric_power = electric_power(&heat, &cop);

        let costing = HeatPumpCosting {
            heat_pump_capacity: self.thermal_capacity,
            heat_pump_specific_cost: self.heat_pump_specific_cost,
            source_investment: self.source_specific_cost * self.thermal_capacity,
            source_lifetime: 20,
        };

        Ok(heat_pump_output(heat, electric_power, costing, context, "blue"))
    }

    fn sizing_variables(&self) -> Vec<SizingVariable> {
        vec![SizingVariable::new(
            "thermal_capacity",
            self.thermal_capacity,
            0.,
            1000.,
        )]
    }

    fn apply_sizing(&mut self, values: &[f64]) {
        if let Some(&capacity) = values.first() {
            self.thermal_capacity = capacity;
        }
    }

    fn electricity_role(&self) -> ElectricityRole {
        ElectricityRole::Consumer
    }
}

/// Heat pump lifting industrial or sewage waste heat, sized by the cooling capacity of the source.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct WasteHeatPump {
    #[serde(default)]
    pub name: String,
    /// heat extracted from the waste heat source at full load, kW
    pub cooling_capacity: f64,
    /// deg C
    pub source_temperature: SourceTemperatureInput,
    /// waste heat connection investment, EUR/kW
    #[serde(default = "default_waste_source_cost")]
    pub source_specific_cost: f64,
    #[serde(default = "default_heat_pump_specific_cost")]
    pub heat_pump_specific_cost: f64,
    #[serde(default = "default_min_part_load")]
    pub min_part_load: f64,
}

fn default_waste_source_cost() -> f64 {
    500.
}

impl WasteHeatPump {
    pub fn new(name: &str, cooling_capacity: f64, source_temperature: f64) -> Self {
        Self {
            name: name.to_string(),
            cooling_capacity,
            source_temperature: SourceTemperatureInput::Constant(source_temperature),
            source_specific_cost: default_waste_source_cost(),
            heat_pump_specific_cost: default_heat_pump_specific_cost(),
            min_part_load: default_min_part_load(),
        }
    }
}

impl HeatGenerator for WasteHeatPump {
    fn name(&self) -> &str {
        &self.name
    }

    fn calculate(
        &self,
        residual_load: &[f64],
        context: &DispatchContext,
    ) -> anyhow::Result<GeneratorOutput> {
        if self.cooling_capacity <= 0. {
            return Ok(GeneratorOutput::zero(residual_load.len(), "grey"));
        }

        let CopSeries { cop, .. } = context
            .cop_table(&self.name)?
            .interpolate(context.supply_temperatures, self.source_temperature.as_source())?;

        // heat output that the full source cooling capacity allows at each step's COP
        let heat_capacity = cop
            .iter()
            .map(|cop| self.cooling_capacity / (1. - 1. / cop))
            .collect::<Vec<_>>();

        let heat = capped_dispatch(residual_load, |t| heat_capacity[t], self.min_part_load);
        let electric_power = electric_power(&heat, &cop);

        let peak_heat = max_or_zero(&heat);
        let costing = HeatPumpCosting {
            heat_pump_capacity: peak_heat,
            heat_pump_specific_cost: self.heat_pump_specific_cost,
            source_investment: self.source_specific_cost * peak_heat,
            source_lifetime: 20,
        };

        Ok(heat_pump_output(heat, electric_power, costing, context, "grey"))
    }

    fn sizing_variables(&self) -> Vec<SizingVariable> {
        vec![SizingVariable::new(
            "cooling_capacity",
            self.cooling_capacity,
            0.,
            500.,
        )]
    }

    fn apply_sizing(&mut self, values: &[f64]) {
        if let Some(&capacity) = values.first() {
            self.cooling_capacity = capacity;
        }
    }

    fn electricity_role(&self) -> ElectricityRole {
        ElectricityRole::Consumer
    }
}
