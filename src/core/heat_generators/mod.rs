pub mod aqva_heat;
pub mod biomass_boiler;
pub mod chp;
pub mod gas_boiler;
pub mod geothermal;
pub mod heat_pump;
pub mod photovoltaics;
pub mod solar_thermal;

use crate::core::cop::CopTable;
use crate::core::economics::{EconomicParameters, Prices};
use crate::core::storage::{dispatch_with_storage, StorageConfig};
use crate::read_weather_file::WeatherData;
use aqva_heat::AqvaHeat;
use anyhow::anyhow;
use biomass_boiler::BiomassBoiler;
use chp::Chp;
use gas_boiler::GasBoiler;
use geothermal::Geothermal;
use heat_pump::{RiverHeatPump, WasteHeatPump};
use photovoltaics::Photovoltaics;
use serde::{Deserialize, Serialize};
use solar_thermal::SolarThermal;

/// Emission factor of grid electricity, t CO2/MWh
pub const ELECTRICITY_CO2_FACTOR: f64 = 0.4;
/// Primary energy factor of grid electricity
pub const ELECTRICITY_PRIMARY_ENERGY_FACTOR: f64 = 2.4;
pub const NATURAL_GAS_CO2_FACTOR: f64 = 0.201;
pub const NATURAL_GAS_PRIMARY_ENERGY_FACTOR: f64 = 1.1;
pub const WOOD_CO2_FACTOR: f64 = 0.036;
pub const WOOD_PRIMARY_ENERGY_FACTOR: f64 = 0.2;

/// Everything a generator needs besides the residual load it is dispatched against.
#[derive(Clone, Copy, Debug)]
pub struct DispatchContext<'a> {
    /// total heat demand before any generator, kW
    pub demand: &'a [f64],
    /// network supply temperature, deg C
    pub supply_temperatures: &'a [f64],
    /// network return temperature, deg C
    pub return_temperatures: &'a [f64],
    pub weather: Option<&'a WeatherData>,
    pub cop_table: Option<&'a CopTable>,
    pub prices: Prices,
    pub economics: EconomicParameters,
    pub step_hours: f64,
}

impl<'a> DispatchContext<'a> {
    pub fn cop_table(&self, generator: &str) -> anyhow::Result<&'a CopTable> {
        self.cop_table
            .ok_or_else(|| anyhow!("Generator '{generator}' is a heat pump and needs a COP table"))
    }

    pub fn weather(&self, generator: &str) -> anyhow::Result<&'a WeatherData> {
        self.weather
            .ok_or_else(|| anyhow!("Generator '{generator}' needs weather data"))
    }
}

/// How a generator takes part in the electricity balance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ElectricityRole {
    None,
    Consumer,
    Producer,
}

/// One continuous design variable the mix optimizer may tune, with its box bounds.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SizingVariable {
    pub name: &'static str,
    pub value: f64,
    pub lower: f64,
    pub upper: f64,
}

impl SizingVariable {
    pub fn new(name: &'static str, value: f64, lower: f64, upper: f64) -> Self {
        Self {
            name,
            value,
            lower,
            upper,
        }
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.lower, self.upper)
    }
}

/// Maintenance-relevant statistics of an on/off unit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct OperatingStatistics {
    pub starts: usize,
    pub operating_hours: f64,
    pub hours_per_start: f64,
}

impl OperatingStatistics {
    /// A start is a step with output following a step without; the first step never counts.
    pub fn from_production(production: &[f64], step_hours: f64) -> Self {
        let starts = production
            .windows(2)
            .filter(|pair| pair[0] <= 0. && pair[1] > 0.)
            .count();
        let operating_hours = production.iter().filter(|p| **p > 0.).count() as f64 * step_hours;

        Self {
            starts,
            operating_hours,
            hours_per_start: if starts > 0 {
                operating_hours / starts as f64
            } else {
                0.
            },
        }
    }
}

/// Result of dispatching one generator against the residual load.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct GeneratorOutput {
    /// heat delivered to the network, including storage output, kW
    pub heat: Vec<f64>,
    /// heat delivered over the period, MWh
    pub heat_energy: f64,
    /// fuel used over the period, MWh
    pub fuel_demand: f64,
    /// electricity consumed or produced, kW
    pub electric_power: Vec<f64>,
    /// electricity consumed or produced over the period, MWh
    pub electricity_energy: f64,
    /// levelized cost of heat, EUR/MWh
    pub levelized_cost: f64,
    /// t CO2 per MWh of heat
    pub specific_co2: f64,
    /// primary energy, MWh
    pub primary_energy: f64,
    pub colour: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operating_statistics: Option<OperatingStatistics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_fill_percent: Option<Vec<f64>>,
}

impl GeneratorOutput {
    pub(crate) fn zero(steps: usize, colour: &'static str) -> Self {
        Self {
            heat: vec![0.; steps],
            electric_power: vec![0.; steps],
            colour,
            ..Default::default()
        }
    }

    pub fn has_output(&self) -> bool {
        self.heat_energy > 0. || self.electricity_energy > 0.
    }
}

pub trait HeatGenerator {
    fn name(&self) -> &str;

    /// Dispatch against `residual_load` (kW). Never delivers more than the residual load.
    fn calculate(
        &self,
        residual_load: &[f64],
        context: &DispatchContext,
    ) -> anyhow::Result<GeneratorOutput>;

    fn sizing_variables(&self) -> Vec<SizingVariable> {
        vec![]
    }

    /// Write optimized values back, in the order of `sizing_variables`.
    fn apply_sizing(&mut self, _values: &[f64]) {}

    fn electricity_role(&self) -> ElectricityRole {
        ElectricityRole::None
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, strum::Display)]
pub enum GeneratorKind {
    SolarThermal,
    BiomassBoiler,
    GasBoiler,
    #[strum(to_string = "CHP")]
    #[serde(rename = "CHP")]
    Chp,
    Geothermal,
    WasteHeatPump,
    RiverHeatPump,
    AqvaHeat,
    Photovoltaics,
}

/// Generator configuration as given in the project input, tagged by technology.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum Generator {
    SolarThermal(SolarThermal),
    BiomassBoiler(BiomassBoiler),
    GasBoiler(GasBoiler),
    #[serde(rename = "CHP")]
    Chp(Chp),
    Geothermal(Geothermal),
    WasteHeatPump(WasteHeatPump),
    RiverHeatPump(RiverHeatPump),
    AqvaHeat(AqvaHeat),
    Photovoltaics(Photovoltaics),
}

impl Generator {
    pub fn kind(&self) -> GeneratorKind {
        match self {
            Self::SolarThermal(_) => GeneratorKind::SolarThermal,
            Self::BiomassBoiler(_) => GeneratorKind::BiomassBoiler,
            Self::GasBoiler(_) => GeneratorKind::GasBoiler,
            Self::Chp(_) => GeneratorKind::Chp,
            Self::Geothermal(_) => GeneratorKind::Geothermal,
            Self::WasteHeatPump(_) => GeneratorKind::WasteHeatPump,
            Self::RiverHeatPump(_) => GeneratorKind::RiverHeatPump,
            Self::AqvaHeat(_) => GeneratorKind::AqvaHeat,
            Self::Photovoltaics(_) => GeneratorKind::Photovoltaics,
        }
    }

    pub fn as_heat_generator(&self) -> &dyn HeatGenerator {
        match self {
            Self::SolarThermal(generator) => generator,
            Self::BiomassBoiler(generator) => generator,
            Self::GasBoiler(generator) => generator,
            Self::Chp(generator) => generator,
            Self::Geothermal(generator) => generator,
            Self::WasteHeatPump(generator) => generator,
            Self::RiverHeatPump(generator) => generator,
            Self::AqvaHeat(generator) => generator,
            Self::Photovoltaics(generator) => generator,
        }
    }

    pub fn as_heat_generator_mut(&mut self) -> &mut dyn HeatGenerator {
        match self {
            Self::SolarThermal(generator) => generator,
            Self::BiomassBoiler(generator) => generator,
            Self::GasBoiler(generator) => generator,
            Self::Chp(generator) => generator,
            Self::Geothermal(generator) => generator,
            Self::WasteHeatPump(generator) => generator,
            Self::RiverHeatPump(generator) => generator,
            Self::AqvaHeat(generator) => generator,
            Self::Photovoltaics(generator) => generator,
        }
    }

    /// Name given in the input, or the technology name when none was given.
    pub fn display_name(&self) -> String {
        let name = self.as_heat_generator().name();
        if name.is_empty() {
            self.kind().to_string()
        } else {
            name.to_string()
        }
    }
}

/// Load-following dispatch with a part-load floor.
///
/// A unit runs at a step only if the load there reaches `min_part_load` of its capacity; it then
/// delivers the load capped at its capacity.
pub(crate) fn capped_dispatch(
    load: &[f64],
    capacity: impl Fn(usize) -> f64,
    min_part_load: f64,
) -> Vec<f64> {
    load.iter()
        .enumerate()
        .map(|(t, &load)| {
            let capacity = capacity(t);
            if capacity > 0. && load > 0. && load >= capacity * min_part_load {
                load.min(capacity)
            } else {
                0.
            }
        })
        .collect()
}

/// Output of a unit that either follows the load directly or runs through a buffer storage.
pub(crate) struct UnitDispatch {
    /// heat produced by the unit, kW
    pub production: Vec<f64>,
    /// heat reaching the network, kW
    pub delivered: Vec<f64>,
    pub fill_percent: Option<Vec<f64>>,
}

pub(crate) fn dispatch_unit(
    load: &[f64],
    capacity: f64,
    min_part_load: f64,
    storage: Option<&StorageConfig>,
    step_hours: f64,
) -> UnitDispatch {
    match storage {
        Some(storage) if storage.volume > 0. => {
            let result = dispatch_with_storage(storage, load, capacity, step_hours);
            UnitDispatch {
                delivered: result.delivered(),
                production: result.production,
                fill_percent: Some(result.fill_percent),
            }
        }
        _ => {
            let production = capped_dispatch(load, |_| capacity, min_part_load);
            UnitDispatch {
                delivered: production.clone(),
                production,
                fill_percent: None,
            }
        }
    }
}
