pub mod control_loop;
pub mod controllers;
pub mod graph;
pub mod pipe_catalog;
pub mod preprocessing;
pub mod results;
pub mod sizing;
pub mod solver;
pub mod worst_point;

use crate::core::heat_curve::NetworkSupplyCurve;
use crate::core::network::control_loop::{ControlSettings, NetworkControlLoop};
use crate::core::network::graph::NetworkGraph;
use crate::core::network::preprocessing::{ConsumerDemand, NetworkBoundaryConditions, PreprocessingSettings};
use crate::core::network::results::NetworkResults;
use crate::core::network::sizing::{correct_flow_directions, net_optimization, SizingSettings};
use crate::core::network::solver::HydraulicSolver;
use crate::errors::ensure_same_length;
use anyhow::bail;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

/// Everything needed to simulate one district heating network.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct NetworkSettings {
    pub topology: NetworkGraph,
    pub consumers: Vec<ConsumerDemand>,
    pub supply_curve: NetworkSupplyCurve,
    #[serde(default)]
    pub preprocessing: PreprocessingSettings,
    #[serde(default)]
    pub control: ControlSettings,
    /// size pipes and heat exchangers for the peak step before the time series
    #[serde(default)]
    pub sizing: Option<SizingSettings>,
    /// COP grid of the building heat pumps, needed for cold networks
    #[serde(default)]
    pub cop_file: Option<PathBuf>,
}

/// Simulate a network over all time steps of `conditions`.
///
/// Pipes are first turned to follow the flow. With sizing settings the network is sized for
/// the step with the highest total load, then the worst point is located again and every step
/// is run in order.
pub fn simulate_network<S: HydraulicSolver>(
    solver: S,
    network: &mut NetworkGraph,
    conditions: &NetworkBoundaryConditions,
    timestamps: Vec<NaiveDateTime>,
    control: ControlSettings,
    sizing: Option<&SizingSettings>,
) -> anyhow::Result<NetworkResults> {
    network.validate()?;
    if conditions.is_empty() {
        bail!("No time steps to simulate");
    }
    ensure_same_length("network timestamps", conditions.len(), timestamps.len())?;
    ensure_same_length(
        "network consumers",
        network.consumer_count(),
        conditions.heat_loads.len(),
    )?;

    correct_flow_directions(network, &solver)?;
    let mut control_loop = NetworkControlLoop::new(solver, network, control)?;

    if let Some(sizing) = sizing {
        let peak = conditions.peak_step();
        info!("Sizing the network for time step {peak}");
        net_optimization(network, &mut control_loop, &conditions.step(peak), sizing)?;
    }
    control_loop.locate_worst_point(network)?;

    let mut results = NetworkResults::new(
        timestamps,
        conditions.total_heat_kw(),
        conditions.total_electricity_kw(),
    );
    control_loop.run_time_series(network, conditions, &mut results)?;

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::network::graph::tests::network;
    use crate::core::network::graph::PumpGroup;
    use crate::core::network::solver::TreeSolver;
    use crate::simulation_time::SimulationTime;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use rstest::*;

    fn conditions(loads: &[f64]) -> NetworkBoundaryConditions {
        let steps = loads.len();
        NetworkBoundaryConditions {
            heat_loads: vec![loads.to_vec(); 3],
            electricity: vec![vec![0.; steps]; 3],
            return_temperatures: vec![vec![50.; steps]; 3],
            min_supply_temperatures: vec![vec![70.; steps]; 3],
            supply_temperatures: vec![85.; steps],
        }
    }

    fn timestamps(steps: usize) -> Vec<NaiveDateTime> {
        let first = NaiveDate::from_ymd_opt(2025, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        SimulationTime::new(0., steps as f64, 1.).timestamps(first)
    }

    #[rstest]
    fn should_record_every_time_step(mut network: NetworkGraph) {
        let conditions = conditions(&[20_000., 40_000., 10_000.]);

        let results = simulate_network(
            TreeSolver::default(),
            &mut network,
            &conditions,
            timestamps(3),
            Default::default(),
            None,
        )
        .unwrap();

        assert_eq!(results.timestamps.len(), 3);
        assert_eq!(results.total_heat, vec![60., 120., 30.]);
        let main = &results.pumps[&PumpGroup::MainPlant][&0];
        assert_eq!(main.heat.len(), 3);
        // fed-in heat covers the consumers plus pipe losses
        for (generated, demand) in results.generated_heat().iter().zip(&results.total_heat) {
            assert!(generated > demand);
        }
        assert_relative_eq!(main.flow_temperature[0], 85., epsilon = 1e-9);
    }

    #[rstest]
    fn should_size_before_running_series(mut network: NetworkGraph) {
        let conditions = conditions(&[20_000., 60_000.]);

        simulate_network(
            TreeSolver::default(),
            &mut network,
            &conditions,
            timestamps(2),
            Default::default(),
            Some(&SizingSettings::default()),
        )
        .unwrap();

        assert!(network.pipes.iter().all(|pipe| pipe.std_type.is_some()));
    }

    #[rstest]
    fn should_reject_timestamps_of_other_length(mut network: NetworkGraph) {
        let result = simulate_network(
            TreeSolver::default(),
            &mut network,
            &conditions(&[1_000.]),
            timestamps(2),
            Default::default(),
            None,
        );

        assert!(result.is_err());
    }

    #[test]
    fn should_parse_network_settings() {
        let settings: NetworkSettings = serde_json::from_value(serde_json::json!({
            "topology": {
                "junctions": [{"name": "a"}, {"name": "b"}, {"name": "c"}, {"name": "d"}],
                "pipes": [
                    {"name": "VL", "from": 0, "to": 1, "length_km": 0.1, "diameter_m": 0.05},
                    {"name": "RL", "from": 3, "to": 2, "length_km": 0.1, "diameter_m": 0.05}
                ],
                "consumers": [{"name": "HAST", "from": 1, "to": 3, "diameter_m": 0.02}],
                "pumps": [{"name": "Heizzentrale", "flow_junction": 0, "return_junction": 2}]
            },
            "consumers": [{
                "heat_demand": [1000.0],
                "building": {"supply_temperature": 70.0, "return_temperature": 50.0}
            }],
            "supply_curve": {"mode": "static", "supply_temperature": 85.0},
            "sizing": {"max_pipe_velocity": 1.5}
        }))
        .unwrap();

        settings.topology.validate().unwrap();
        assert_eq!(settings.topology.pumps[0].group, PumpGroup::MainPlant);
        assert_eq!(settings.sizing.unwrap().max_pipe_velocity, 1.5);
        assert_eq!(settings.control, ControlSettings::default());
    }
}
