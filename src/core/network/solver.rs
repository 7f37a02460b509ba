use crate::core::material_properties::NETWORK_WATER;
use crate::core::network::graph::{cross_section, velocity, NetworkGraph, Pipe};
use crate::core::units::{PASCALS_PER_BAR, ZERO_CELSIUS_IN_KELVIN};
use anyhow::bail;
use std::collections::VecDeque;
use std::f64::consts::PI;

/// Steady-state hydraulic and thermal solver for a network.
///
/// Reads the consumers' heat loads and controlled mass flows and the pumps' pressures and flow
/// temperature, and writes junction pressures and temperatures as well as pipe, consumer and
/// pump results. Identical boundary conditions must give identical results; nothing is carried
/// from one call to the next.
pub trait HydraulicSolver {
    fn solve(&self, network: &mut NetworkGraph) -> anyhow::Result<()>;
}

const LAMINAR_REYNOLDS_LIMIT: f64 = 2300.;
const NEGLIGIBLE_MASS_FLOW: f64 = 1e-9;

/// Solver for radial (tree-shaped) networks fed by a single pump.
///
/// The mass flow in every pipe is the sum of the consumer flows downstream of it, so pressures
/// and temperatures follow in a single sweep from the pump outwards (supply side) and back
/// (return side).
#[derive(Clone, Copy, Debug)]
pub struct TreeSolver {
    /// K
    pub ground_temperature: f64,
    /// m2/s
    pub kinematic_viscosity: f64,
}

impl Default for TreeSolver {
    fn default() -> Self {
        Self {
            ground_temperature: ZERO_CELSIUS_IN_KELVIN + 10.,
            kinematic_viscosity: 0.55e-6,
        }
    }
}

/// Breadth-first spanning tree over the pipes reachable from one root junction.
struct PipeTree {
    /// junctions in visiting order, root first
    order: Vec<usize>,
    parent: Vec<Option<(usize, usize)>>, // (parent junction, pipe)
    member: Vec<bool>,
}

impl PipeTree {
    fn grow(network: &NetworkGraph, adjacency: &[Vec<(usize, usize)>], root: usize) -> anyhow::Result<Self> {
        let junction_count = network.junctions.len();
        let mut tree = Self {
            order: vec![],
            parent: vec![None; junction_count],
            member: vec![false; junction_count],
        };
        let mut queue = VecDeque::from([root]);
        tree.member[root] = true;

        while let Some(junction) = queue.pop_front() {
            tree.order.push(junction);
            for &(neighbour, pipe) in &adjacency[junction] {
                if tree.parent[junction].is_some_and(|(_, parent_pipe)| parent_pipe == pipe) {
                    continue;
                }
                if tree.member[neighbour] {
                    bail!(
                        "Pipe '{}' closes a loop; meshed networks need a solver that handles loops",
                        network.pipes[pipe].name
                    );
                }
                tree.member[neighbour] = true;
                tree.parent[neighbour] = Some((junction, pipe));
                queue.push_back(neighbour);
            }
        }

        Ok(tree)
    }
}

impl TreeSolver {
    fn pressure_drop(&self, pipe: &Pipe, mass_flow: f64) -> f64 {
        let speed = velocity(mass_flow.abs(), pipe.diameter_m);
        let reynolds = speed * pipe.diameter_m / self.kinematic_viscosity;
        if reynolds <= 0. {
            return 0.;
        }
        let friction = if reynolds < LAMINAR_REYNOLDS_LIMIT {
            64. / reynolds
        } else {
            // Swamee-Jain
            let roughness = pipe.roughness_mm / 1000.;
            0.25 / (roughness / (3.7 * pipe.diameter_m) + 5.74 / reynolds.powf(0.9))
                .log10()
                .powi(2)
        };

        friction * pipe.length_m() / pipe.diameter_m * NETWORK_WATER.density() * speed.powi(2)
            / 2.
            / PASCALS_PER_BAR
    }

    /// Temperature at the end of a pipe for water entering at `temperature`.
    fn cooled(&self, pipe: &Pipe, mass_flow: f64, temperature: f64) -> f64 {
        let mass_flow = mass_flow.abs();
        if mass_flow < NEGLIGIBLE_MASS_FLOW {
            return temperature;
        }
        let exponent = pipe.heat_transfer_coefficient * PI * pipe.diameter_m * pipe.length_m()
            / (mass_flow * NETWORK_WATER.specific_heat_capacity());

        self.ground_temperature + (temperature - self.ground_temperature) * (-exponent).exp()
    }
}

impl HydraulicSolver for TreeSolver {
    fn solve(&self, network: &mut NetworkGraph) -> anyhow::Result<()> {
        network.validate()?;
        if network.pumps.len() != 1 {
            bail!(
                "The tree solver handles exactly one pump, the network has {}",
                network.pumps.len()
            );
        }
        let junction_count = network.junctions.len();
        let mut adjacency = vec![vec![]; junction_count];
        for (index, pipe) in network.pipes.iter().enumerate() {
            adjacency[pipe.from].push((pipe.to, index));
            adjacency[pipe.to].push((pipe.from, index));
        }

        let pump = network.pumps[0].clone();
        let supply = PipeTree::grow(network, &adjacency, pump.flow_junction)?;
        let return_ = PipeTree::grow(network, &adjacency, pump.return_junction)?;
        if supply.member.iter().zip(&return_.member).any(|(&s, &r)| s && r) {
            bail!("Supply and return side are connected by pipes");
        }
        for consumer in &network.consumers {
            if !supply.member[consumer.from] || !return_.member[consumer.to] {
                bail!(
                    "Heat consumer '{}' must draw from the supply side and feed the return side",
                    consumer.name
                );
            }
        }

        // mass flow leaving each junction towards consumers, summed over the subtree
        let mut supply_flow = vec![0.; junction_count];
        let mut return_flow = vec![0.; junction_count];
        for consumer in &network.consumers {
            let flow = consumer.controlled_mass_flow.max(0.);
            supply_flow[consumer.from] += flow;
            return_flow[consumer.to] += flow;
        }
        for &junction in supply.order.iter().rev() {
            if let Some((parent, pipe)) = supply.parent[junction] {
                supply_flow[parent] += supply_flow[junction];
                let sign = if network.pipes[pipe].from == parent { 1. } else { -1. };
                network.pipes[pipe].result.mass_flow = sign * supply_flow[junction];
            }
        }
        for &junction in return_.order.iter().rev() {
            if let Some((parent, pipe)) = return_.parent[junction] {
                return_flow[parent] += return_flow[junction];
                let sign = if network.pipes[pipe].from == junction { 1. } else { -1. };
                network.pipes[pipe].result.mass_flow = sign * return_flow[junction];
            }
        }

        let mut pressure = vec![0.; junction_count];
        let mut temperature = vec![self.ground_temperature; junction_count];

        // supply side, from the pump outwards
        pressure[pump.flow_junction] = pump.flow_pressure;
        temperature[pump.flow_junction] = pump.flow_temperature;
        for &junction in &supply.order {
            if let Some((parent, pipe)) = supply.parent[junction] {
                let pipe = &network.pipes[pipe];
                let flow = pipe.result.mass_flow;
                pressure[junction] = pressure[parent] - self.pressure_drop(pipe, flow);
                temperature[junction] = self.cooled(pipe, flow, temperature[parent]);
            }
        }

        // consumers
        let mut mixed_heat = vec![0.; junction_count];
        let mut mixed_flow = vec![0.; junction_count];
        for consumer in network.consumers.iter_mut() {
            let flow = consumer.controlled_mass_flow.max(0.);
            let inlet = temperature[consumer.from];
            let outlet = if flow > NEGLIGIBLE_MASS_FLOW {
                (inlet - consumer.heat_load / (flow * NETWORK_WATER.specific_heat_capacity()))
                    .max(self.ground_temperature)
            } else {
                self.ground_temperature
            };
            mixed_heat[consumer.to] += flow * outlet;
            mixed_flow[consumer.to] += flow;

            consumer.result.temperature_from = inlet;
            consumer.result.temperature_to = outlet;
            consumer.result.velocity = velocity(flow, consumer.diameter_m);
        }

        // return side pressures, from the pump outwards against the flow
        pressure[pump.return_junction] = pump.flow_pressure - pump.lift_pressure;
        for &junction in &return_.order {
            if let Some((parent, pipe)) = return_.parent[junction] {
                let pipe = &network.pipes[pipe];
                pressure[junction] = pressure[parent] + self.pressure_drop(pipe, pipe.result.mass_flow);
            }
        }

        // return side temperatures, mixing from the far ends back to the pump
        let mut arrival = vec![None; network.pipes.len()];
        for &junction in return_.order.iter().rev() {
            if mixed_flow[junction] > NEGLIGIBLE_MASS_FLOW {
                temperature[junction] = mixed_heat[junction] / mixed_flow[junction];
            }
            if let Some((parent, pipe_index)) = return_.parent[junction] {
                let pipe = &network.pipes[pipe_index];
                let end_temperature = self.cooled(pipe, return_flow[junction], temperature[junction]);
                mixed_heat[parent] += return_flow[junction] * end_temperature;
                mixed_flow[parent] += return_flow[junction];
                arrival[pipe_index] = Some(end_temperature);
            }
        }

        for (index, pipe) in network.pipes.iter_mut().enumerate() {
            let result = &mut pipe.result;
            result.velocity = result.mass_flow / (NETWORK_WATER.density() * cross_section(pipe.diameter_m));
            result.pressure_from = pressure[pipe.from];
            result.pressure_to = pressure[pipe.to];
            // the downstream end of a return pipe sees the water before mixing
            let (upstream, downstream) = if result.mass_flow >= 0. {
                (pipe.from, pipe.to)
            } else {
                (pipe.to, pipe.from)
            };
            let end_temperature = arrival[index].unwrap_or(temperature[downstream]);
            if upstream == pipe.from {
                result.temperature_from = temperature[upstream];
                result.temperature_to = end_temperature;
            } else {
                result.temperature_from = end_temperature;
                result.temperature_to = temperature[upstream];
            }
        }
        for consumer in network.consumers.iter_mut() {
            consumer.result.pressure_from = pressure[consumer.from];
            consumer.result.pressure_to = pressure[consumer.to];
        }
        for (junction, state) in network.junctions.iter_mut().enumerate() {
            state.pressure = pressure[junction];
            state.temperature = temperature[junction];
        }
        let pump = &mut network.pumps[0];
        pump.result.mass_flow = supply_flow[pump.flow_junction];
        pump.result.pressure_difference = pump.lift_pressure;

        Ok(())
    }
}
