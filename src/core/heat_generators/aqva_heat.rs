use crate::core::cop::CopSeries;
use crate::core::heat_generators::heat_pump::{heat_pump_output, HeatPumpCosting};
use crate::core::heat_generators::{
    capped_dispatch, DispatchContext, ElectricityRole, GeneratorOutput, HeatGenerator,
};
use crate::core::material_properties::{
    latent_heat_at_pressure, saturation_pressure, vapour_compression_work,
    TRIPLE_POINT_PRESSURE_PA, TRIPLE_POINT_TEMPERATURE_C,
};
use serde::{Deserialize, Serialize};

/// Vapour condenses on the heat pump evaporator at about 14 hPa.
const CONDENSING_PRESSURE_PA: f64 = 1400.;

/// Vacuum ice slurry generator feeding a heat pump.
///
/// The ice generator freezes river water under vacuum and compresses the released vapour from
/// the triple point up to the intermediate temperature, where it condenses on the evaporator of
/// a conventional heat pump that lifts the heat to the network supply temperature.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AqvaHeat {
    #[serde(default)]
    pub name: String,
    /// kW
    #[serde(default = "default_nominal_power")]
    pub nominal_power: f64,
    /// heat pump evaporator temperature, deg C
    #[serde(default = "default_intermediate_temperature")]
    pub intermediate_temperature: f64,
    /// approach over the network heat exchanger, K
    #[serde(default = "default_deadband")]
    pub deadband: f64,
    #[serde(default = "default_isentropic_efficiency")]
    pub isentropic_efficiency: f64,
    /// 1 means the unit only runs at full load
    #[serde(default = "default_min_part_load")]
    pub min_part_load: f64,
    /// EUR/kW of heat pump capacity
    #[serde(default = "default_specific_cost")]
    pub heat_pump_specific_cost: f64,
    /// EUR/kW of ice generator capacity
    #[serde(default = "default_specific_cost")]
    pub source_specific_cost: f64,
}

fn default_nominal_power() -> f64 {
    100.
}

fn default_intermediate_temperature() -> f64 {
    12.
}

fn default_deadband() -> f64 {
    2.5
}

fn default_isentropic_efficiency() -> f64 {
    0.7
}

fn default_min_part_load() -> f64 {
    1.
}

fn default_specific_cost() -> f64 {
    1000.
}

impl AqvaHeat {
    pub fn new(name: &str, nominal_power: f64) -> Self {
        Self {
            name: name.to_string(),
            nominal_power,
            intermediate_temperature: default_intermediate_temperature(),
            deadband: default_deadband(),
            isentropic_efficiency: default_isentropic_efficiency(),
            min_part_load: default_min_part_load(),
            heat_pump_specific_cost: default_specific_cost(),
            source_specific_cost: default_specific_cost(),
        }
    }

    /// Compressor work per kg of vapour lifted from the triple point to the intermediate
    /// temperature, kJ/kg
    fn compression_work(&self) -> f64 {
        vapour_compression_work(
            TRIPLE_POINT_TEMPERATURE_C,
            TRIPLE_POINT_PRESSURE_PA,
            saturation_pressure(self.intermediate_temperature),
            self.isentropic_efficiency,
        )
    }
}

impl HeatGenerator for AqvaHeat {
    fn name(&self) -> &str {
        &self.name
    }

    fn calculate(
        &self,
        residual_load: &[f64],
        context: &DispatchContext,
    ) -> anyhow::Result<GeneratorOutput> {
        if self.nominal_power <= 0. {
            return Ok(GeneratorOutput::zero(residual_load.len(), "lightblue"));
        }

        let CopSeries {
            cop,
            supply_temperatures: reachable,
        } = context
            .cop_table(&self.name)?
            .interpolate(context.supply_temperatures, self.intermediate_temperature)?;

        let heat = capped_dispatch(
            residual_load,
            |t| {
                if reachable[t] >= context.supply_temperatures[t] - self.deadband {
                    self.nominal_power
                } else {
                    0.
                }
            },
            self.min_part_load,
        );

        let latent_heat = latent_heat_at_pressure(CONDENSING_PRESSURE_PA)?;
        let compression_work = self.compression_work();

        let electric_power = heat
            .iter()
            .zip(cop.iter())
            .map(|(&heat, &cop)| {
                if heat <= 0. {
                    return 0.;
                }
                let heat_pump_power = heat / cop;
                let evaporator_load = heat - heat_pump_power;
                // kg/s of vapour the evaporator condenses
                let vapour_flow = evaporator_load / latent_heat;
                heat_pump_power + vapour_flow * compression_work
            })
            .collect::<Vec<_>>();

        let costing = HeatPumpCosting {
            heat_pump_capacity: self.nominal_power,
            heat_pump_specific_cost: self.heat_pump_specific_cost,
            source_investment: self.source_specific_cost * self.nominal_power,
            source_lifetime: 20,
        };

        Ok(heat_pump_output(
            heat,
            electric_power,
            costing,
            context,
            "lightblue",
        ))
    }

    fn electricity_role(&self) -> ElectricityRole {
        ElectricityRole::Consumer
    }
}
