use crate::core::material_properties::NETWORK_WATER;
use crate::core::network::pipe_catalog::PipeType;
use crate::core::units::MILLIMETRES_IN_METRE;
use anyhow::bail;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Node of the network. Pressure in bar and temperature in K are written by the solver.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Junction {
    #[serde(default)]
    pub name: String,
    #[serde(skip)]
    pub pressure: f64,
    #[serde(skip)]
    pub temperature: f64,
}

impl Junction {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct PipeResult {
    /// mean velocity, m/s; negative when the flow runs from `to` to `from`
    pub velocity: f64,
    /// kg/s, signed like the velocity
    pub mass_flow: f64,
    pub pressure_from: f64,
    pub pressure_to: f64,
    pub temperature_from: f64,
    pub temperature_to: f64,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Pipe {
    #[serde(default)]
    pub name: String,
    pub from: usize,
    pub to: usize,
    pub length_km: f64,
    /// inner diameter, m
    pub diameter_m: f64,
    /// wall roughness, mm
    #[serde(default = "default_roughness")]
    pub roughness_mm: f64,
    /// heat transfer coefficient related to the inner pipe surface, W/(m2 K)
    #[serde(default = "default_heat_transfer_coefficient")]
    pub heat_transfer_coefficient: f64,
    /// catalog entry this pipe was last sized to
    #[serde(default)]
    pub std_type: Option<String>,
    #[serde(skip)]
    pub result: PipeResult,
}

fn default_roughness() -> f64 {
    0.1
}

fn default_heat_transfer_coefficient() -> f64 {
    1.
}

impl Pipe {
    pub fn new(name: &str, from: usize, to: usize, length_km: f64, diameter_m: f64) -> Self {
        Self {
            name: name.to_string(),
            from,
            to,
            length_km,
            diameter_m,
            roughness_mm: default_roughness(),
            heat_transfer_coefficient: default_heat_transfer_coefficient(),
            std_type: None,
            result: Default::default(),
        }
    }

    pub fn apply_type(&mut self, pipe_type: &PipeType) {
        self.std_type = Some(pipe_type.name.to_string());
        self.diameter_m = pipe_type.inner_diameter_mm / MILLIMETRES_IN_METRE as f64;
        self.roughness_mm = pipe_type.roughness_mm;
        self.heat_transfer_coefficient = pipe_type.heat_transfer_coefficient();
    }

    pub fn length_m(&self) -> f64 {
        self.length_km * 1000.
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct ConsumerResult {
    /// pressure after the flow control, bar
    pub pressure_from: f64,
    /// pressure after the heat exchanger, bar
    pub pressure_to: f64,
    /// K
    pub temperature_from: f64,
    /// K
    pub temperature_to: f64,
    pub velocity: f64,
}

impl ConsumerResult {
    pub fn pressure_difference(&self) -> f64 {
        self.pressure_from - self.pressure_to
    }
}

/// Building connection: flow control valve and heat exchanger between a supply junction and a
/// return junction.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct HeatConsumer {
    #[serde(default)]
    pub name: String,
    pub from: usize,
    pub to: usize,
    /// heat exchanger diameter, m
    pub diameter_m: f64,
    /// heat extracted from the network, W
    #[serde(default)]
    pub heat_load: f64,
    /// kg/s
    #[serde(default = "default_controlled_mass_flow")]
    pub controlled_mass_flow: f64,
    #[serde(skip)]
    pub result: ConsumerResult,
}

fn default_controlled_mass_flow() -> f64 {
    0.1
}

impl HeatConsumer {
    pub fn new(name: &str, from: usize, to: usize, diameter_m: f64) -> Self {
        Self {
            name: name.to_string(),
            from,
            to,
            diameter_m,
            heat_load: 0.,
            controlled_mass_flow: default_controlled_mass_flow(),
            result: Default::default(),
        }
    }
}

/// Pump groups as they are labelled in the results files.
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Serialize,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
pub enum PumpGroup {
    #[strum(serialize = "Heizentrale Haupteinspeisung")]
    MainPlant,
    #[strum(serialize = "weitere Einspeisung")]
    Secondary,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct PumpResult {
    pub mass_flow: f64,
    pub pressure_difference: f64,
}

/// Circulation pump holding the flow pressure and lift between its return and flow junctions.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Pump {
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_pump_group")]
    pub group: PumpGroup,
    pub flow_junction: usize,
    pub return_junction: usize,
    /// bar
    #[serde(default = "default_flow_pressure")]
    pub flow_pressure: f64,
    /// bar
    #[serde(default = "default_lift_pressure")]
    pub lift_pressure: f64,
    /// K, overwritten every time step from the supply temperature curve
    #[serde(default = "default_flow_temperature")]
    pub flow_temperature: f64,
    #[serde(skip)]
    pub result: PumpResult,
}

fn default_pump_group() -> PumpGroup {
    PumpGroup::MainPlant
}

fn default_flow_pressure() -> f64 {
    4.
}

fn default_lift_pressure() -> f64 {
    1.5
}

fn default_flow_temperature() -> f64 {
    358.15
}

impl Pump {
    pub fn new(name: &str, flow_junction: usize, return_junction: usize) -> Self {
        Self {
            name: name.to_string(),
            group: PumpGroup::MainPlant,
            flow_junction,
            return_junction,
            flow_pressure: default_flow_pressure(),
            lift_pressure: default_lift_pressure(),
            flow_temperature: default_flow_temperature(),
            result: Default::default(),
        }
    }
}

/// Two-pipe district heating network: supply and return pipes joined by heat consumers and
/// closed by the pumps.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct NetworkGraph {
    pub junctions: Vec<Junction>,
    pub pipes: Vec<Pipe>,
    pub consumers: Vec<HeatConsumer>,
    pub pumps: Vec<Pump>,
}

impl NetworkGraph {
    /// Check that every element refers to existing junctions.
    pub fn validate(&self) -> anyhow::Result<()> {
        let junction_count = self.junctions.len();
        let check = |kind: &str, name: &str, junction: usize| {
            if junction >= junction_count {
                bail!("{kind} '{name}' refers to junction {junction}, but the network only has {junction_count} junctions");
            }
            Ok(())
        };

        for pipe in &self.pipes {
            check("Pipe", &pipe.name, pipe.from)?;
            check("Pipe", &pipe.name, pipe.to)?;
            if pipe.diameter_m <= 0. || pipe.length_km <= 0. {
                bail!("Pipe '{}' needs a positive length and diameter", pipe.name);
            }
        }
        for consumer in &self.consumers {
            check("Heat consumer", &consumer.name, consumer.from)?;
            check("Heat consumer", &consumer.name, consumer.to)?;
            if consumer.diameter_m <= 0. {
                bail!("Heat consumer '{}' needs a positive diameter", consumer.name);
            }
        }
        for pump in &self.pumps {
            check("Pump", &pump.name, pump.flow_junction)?;
            check("Pump", &pump.name, pump.return_junction)?;
        }
        if self.pumps.is_empty() {
            bail!("The network needs at least one pump");
        }

        Ok(())
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }

    /// Swap the junctions of a pipe so that its orientation follows the flow.
    pub fn reverse_pipe(&mut self, index: usize) {
        let pipe = &mut self.pipes[index];
        std::mem::swap(&mut pipe.from, &mut pipe.to);
        let result = &mut pipe.result;
        result.velocity = -result.velocity;
        result.mass_flow = -result.mass_flow;
        std::mem::swap(&mut result.pressure_from, &mut result.pressure_to);
        std::mem::swap(&mut result.temperature_from, &mut result.temperature_to);
    }

    pub fn total_heat_load(&self) -> f64 {
        self.consumers.iter().map(|consumer| consumer.heat_load).sum()
    }
}

/// Cross-section of a circular pipe, m2
pub fn cross_section(diameter_m: f64) -> f64 {
    PI / 4. * diameter_m.powi(2)
}

/// Mean velocity of water at a mass flow (kg/s) through a diameter (m), m/s
pub fn velocity(mass_flow: f64, diameter_m: f64) -> f64 {
    mass_flow / (NETWORK_WATER.density() * cross_section(diameter_m))
}

/// Mass flow at a mean velocity (m/s) through a diameter (m), kg/s
pub fn mass_flow(velocity: f64, diameter_m: f64) -> f64 {
    velocity * cross_section(diameter_m) * NETWORK_WATER.density()
}
