use crate::core::network::control_loop::NetworkControlLoop;
use crate::core::network::graph::NetworkGraph;
use crate::core::network::pipe_catalog::PipeCatalog;
use crate::core::network::preprocessing::TimeStepBoundary;
use crate::core::network::solver::HydraulicSolver;
use crate::errors::{IterativeLoop, NotConvergedError};
use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SizingSettings {
    /// m/s
    #[serde(default = "default_max_pipe_velocity")]
    pub max_pipe_velocity: f64,
    /// m/s, before the 1.5 safety factor
    #[serde(default = "default_max_heat_exchanger_velocity")]
    pub max_heat_exchanger_velocity: f64,
    #[serde(default = "default_material")]
    pub material: String,
    #[serde(default = "default_insulation")]
    pub insulation: String,
    /// m
    #[serde(default = "default_diameter_step")]
    pub diameter_step: f64,
    /// full passes over all elements before giving up
    #[serde(default = "default_max_passes")]
    pub max_passes: usize,
}

fn default_max_pipe_velocity() -> f64 {
    1.
}

fn default_max_heat_exchanger_velocity() -> f64 {
    2.
}

fn default_material() -> String {
    "KMR".to_string()
}

fn default_insulation() -> String {
    "2v".to_string()
}

fn default_diameter_step() -> f64 {
    0.001
}

fn default_max_passes() -> usize {
    500
}

impl Default for SizingSettings {
    fn default() -> Self {
        Self {
            max_pipe_velocity: default_max_pipe_velocity(),
            max_heat_exchanger_velocity: default_max_heat_exchanger_velocity(),
            material: default_material(),
            insulation: default_insulation(),
            diameter_step: default_diameter_step(),
            max_passes: default_max_passes(),
        }
    }
}

/// Heat exchanger velocities are held below the maximum by this factor.
const HEAT_EXCHANGER_SAFETY_FACTOR: f64 = 1.5;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SizingSummary {
    pub passes: usize,
    pub within_target: usize,
    pub outside_target: usize,
}

/// Turn pipes whose flow runs against their orientation. Returns the number of pipes turned.
pub fn correct_flow_directions(network: &mut NetworkGraph, solver: &impl HydraulicSolver) -> anyhow::Result<usize> {
    solver.solve(network)?;
    let reversed = (0..network.pipes.len())
        .filter(|&pipe| network.pipes[pipe].result.velocity < 0.)
        .collect::<Vec<_>>();
    for &pipe in &reversed {
        network.reverse_pipe(pipe);
    }
    solver.solve(network)?;

    if !reversed.is_empty() {
        info!("Turned {} pipes to follow the flow direction", reversed.len());
    }
    Ok(reversed.len())
}

/// Set every pipe to the standard type closest to the diameter that would carry its current
/// flow at the maximum velocity.
pub fn init_diameter_types(
    network: &mut NetworkGraph,
    solver: &impl HydraulicSolver,
    catalog: &PipeCatalog,
    max_velocity: f64,
) -> anyhow::Result<()> {
    solver.solve(network)?;
    for pipe in network.pipes.iter_mut() {
        let required = pipe.diameter_m * (pipe.result.velocity.abs() / max_velocity).sqrt();
        let pipe_type = catalog
            .get(catalog.closest(required))
            .ok_or_else(|| anyhow!("The pipe catalog is empty"))?;
        pipe.apply_type(pipe_type);
    }
    solver.solve(network)?;
    Ok(())
}

/// Greedy standard type selection: upsize pipes above the maximum velocity and downsize the
/// others as long as the smaller type still respects it.
pub fn optimize_diameter_types(
    network: &mut NetworkGraph,
    solver: &impl HydraulicSolver,
    catalog: &PipeCatalog,
    max_velocity: f64,
    max_passes: usize,
) -> anyhow::Result<SizingSummary> {
    init_diameter_types(network, solver, catalog, max_velocity)?;

    let mut settled = vec![false; network.pipes.len()];
    let mut summary = SizingSummary::default();

    loop {
        if summary.passes == max_passes {
            return Err(NotConvergedError::new(
                IterativeLoop::DiameterSizing,
                max_passes,
                excess_velocities(network, max_velocity),
            )
            .with_detail("pipe standard types")
            .into());
        }
        summary.passes += 1;
        summary.within_target = 0;
        summary.outside_target = 0;
        let mut change_made = false;

        for index in 0..network.pipes.len() {
            let velocity = network.pipes[index].result.velocity.abs();
            if settled[index] && velocity <= max_velocity {
                summary.within_target += 1;
                continue;
            }
            let position = network.pipes[index]
                .std_type
                .as_deref()
                .and_then(|name| catalog.position(name))
                .unwrap_or_else(|| catalog.closest(network.pipes[index].diameter_m));
            let larger = catalog.get(position + 1);
            let smaller = position.checked_sub(1).and_then(|p| catalog.get(p));

            match (velocity > max_velocity, larger, smaller) {
                (true, Some(larger), _) => {
                    network.pipes[index].apply_type(larger);
                    change_made = true;
                    summary.outside_target += 1;
                }
                (false, _, Some(smaller)) => {
                    network.pipes[index].apply_type(smaller);
                    solver.solve(network)?;
                    if network.pipes[index].result.velocity.abs() <= max_velocity {
                        change_made = true;
                    } else {
                        if let Some(current) = catalog.get(position) {
                            network.pipes[index].apply_type(current);
                        }
                        solver.solve(network)?;
                        settled[index] = true;
                        summary.within_target += 1;
                    }
                }
                (true, None, _) => {
                    summary.outside_target += 1;
                }
                (false, _, None) => {
                    settled[index] = true;
                    summary.within_target += 1;
                }
            }
        }

        if change_made {
            solver.solve(network)?;
        }
        info!(
            "Pass {}: {} pipes within target velocity, {} pipes outside target velocity",
            summary.passes, summary.within_target, summary.outside_target
        );
        if !change_made {
            if summary.outside_target > 0 {
                return Err(NotConvergedError::new(
                    IterativeLoop::DiameterSizing,
                    summary.passes,
                    excess_velocities(network, max_velocity),
                )
                .with_detail("largest pipe standard type is too small")
                .into());
            }
            return Ok(summary);
        }
    }
}

fn excess_velocities(network: &NetworkGraph, max_velocity: f64) -> Vec<f64> {
    network
        .pipes
        .iter()
        .map(|pipe| pipe.result.velocity.abs() - max_velocity)
        .filter(|excess| *excess > 0.)
        .collect()
}

/// Continuous diameter sizing of the heat exchangers in fixed steps, targeting the maximum
/// velocity reduced by the safety factor. Returns the number of passes.
pub fn optimize_consumer_diameters(
    network: &mut NetworkGraph,
    solver: &impl HydraulicSolver,
    max_velocity: f64,
    step: f64,
    max_passes: usize,
) -> anyhow::Result<usize> {
    let target = max_velocity / HEAT_EXCHANGER_SAFETY_FACTOR;
    solver.solve(network)?;

    for pass in 1..=max_passes {
        let mut change_made = false;

        for index in 0..network.consumers.len() {
            let velocity = network.consumers[index].result.velocity.abs();
            let diameter = network.consumers[index].diameter_m;

            if velocity > target {
                network.consumers[index].diameter_m = diameter + step;
                change_made = true;
            } else if velocity < target && diameter - step >= step {
                network.consumers[index].diameter_m = diameter - step;
                solver.solve(network)?;
                if network.consumers[index].result.velocity.abs() > target {
                    network.consumers[index].diameter_m = diameter;
                    solver.solve(network)?;
                } else {
                    change_made = true;
                }
            }
        }

        if !change_made {
            debug!("Heat exchanger diameters settled after {pass} passes");
            return Ok(pass);
        }
        solver.solve(network)?;
    }

    let residuals = network
        .consumers
        .iter()
        .map(|consumer| consumer.result.velocity.abs() - target)
        .collect();
    Err(NotConvergedError::new(IterativeLoop::DiameterSizing, max_passes, residuals)
        .with_detail("heat exchanger diameters")
        .into())
}

/// Size pipes and heat exchangers for the flows of one (design) time step.
///
/// The controllers are settled first so that the velocities reflect controlled mass flows;
/// after resizing the mass flow limits follow the new heat exchanger diameters and the
/// controllers are settled again.
pub fn net_optimization<S: HydraulicSolver>(
    network: &mut NetworkGraph,
    control_loop: &mut NetworkControlLoop<S>,
    design_boundary: &TimeStepBoundary,
    settings: &SizingSettings,
) -> anyhow::Result<()> {
    let catalog = PipeCatalog::filtered(&settings.material, &settings.insulation)?;
    control_loop.run_time_step(network, design_boundary)?;

    let summary = optimize_diameter_types(
        network,
        control_loop.solver(),
        &catalog,
        settings.max_pipe_velocity,
        settings.max_passes,
    )?;
    let passes = optimize_consumer_diameters(
        network,
        control_loop.solver(),
        settings.max_heat_exchanger_velocity,
        settings.diameter_step,
        settings.max_passes,
    )?;
    info!(
        "Sized {} pipes in {} passes and {} heat exchangers in {} passes",
        network.pipes.len(),
        summary.passes,
        network.consumers.len(),
        passes
    );

    control_loop.recalculate_mass_flow_limits(network);
    control_loop.locate_worst_point(network)?;
    control_loop.run_time_step(network, design_boundary)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::network::graph::tests::network;
    use crate::core::network::solver::TreeSolver;
    use crate::core::network::graph::velocity;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[fixture]
    fn catalog() -> PipeCatalog {
        PipeCatalog::filtered("KMR", "2v").unwrap()
    }

    #[rstest]
    fn should_turn_pipes_against_the_flow(mut network: NetworkGraph) {
        network.reverse_pipe(1);
        network.reverse_pipe(6);

        let turned = correct_flow_directions(&mut network, &TreeSolver::default()).unwrap();

        assert_eq!(turned, 2);
        assert!(network.pipes.iter().all(|pipe| pipe.result.velocity >= 0.));
    }

    #[rstest]
    fn should_keep_velocities_below_target_with_smallest_feasible_types(
        mut network: NetworkGraph,
        catalog: PipeCatalog,
    ) {
        let solver = TreeSolver::default();

        let summary = optimize_diameter_types(&mut network, &solver, &catalog, 0.5, 100).unwrap();

        assert_eq!(summary.outside_target, 0);
        for pipe in &network.pipes {
            assert!(pipe.result.velocity.abs() <= 0.5);
            let position = catalog.position(pipe.std_type.as_deref().unwrap()).unwrap();
            // the next smaller type would be too fast
            if let Some(smaller) = position.checked_sub(1).and_then(|p| catalog.get(p)) {
                let smaller_velocity =
                    velocity(pipe.result.mass_flow.abs(), smaller.inner_diameter_mm / 1000.);
                assert!(smaller_velocity > 0.5);
            }
        }
    }

    #[rstest]
    fn should_upsize_pipes_that_are_too_fast(mut network: NetworkGraph, catalog: PipeCatalog) {
        network
            .consumers
            .iter_mut()
            .for_each(|consumer| consumer.controlled_mass_flow = 15.);
        let solver = TreeSolver::default();

        optimize_diameter_types(&mut network, &solver, &catalog, 1., 100).unwrap();

        // 45 kg/s at 1 m/s needs more than DN 200
        assert_eq!(network.pipes[0].std_type.as_deref(), Some("KMR 250/450-2v"));
        assert!(network.pipes[0].result.velocity <= 1.);
    }

    #[rstest]
    fn should_stop_at_pass_limit(mut network: NetworkGraph, catalog: PipeCatalog) {
        let error = optimize_diameter_types(&mut network, &TreeSolver::default(), &catalog, 0.5, 1)
            .unwrap_err()
            .downcast::<NotConvergedError>()
            .unwrap();

        assert_eq!(error.loop_name, IterativeLoop::DiameterSizing);
        assert_eq!(error.iterations, 1);
    }

    #[rstest]
    fn should_fail_when_largest_type_is_still_too_fast(mut network: NetworkGraph) {
        network
            .consumers
            .iter_mut()
            .for_each(|consumer| consumer.controlled_mass_flow = 15.);
        let catalog = PipeCatalog::filtered("FL", "2v").unwrap();

        let error = optimize_diameter_types(&mut network, &TreeSolver::default(), &catalog, 1., 100)
            .unwrap_err()
            .downcast::<NotConvergedError>()
            .unwrap();

        assert_eq!(error.loop_name, IterativeLoop::DiameterSizing);
        assert!(!error.residuals.is_empty());
        assert!(error.residuals.iter().all(|excess| *excess > 0.));
        // the trunk pipe sits on the largest type of the range
        let largest = catalog.get(catalog.len() - 1).unwrap();
        assert_eq!(network.pipes[0].std_type.as_deref(), Some(largest.name));
        assert!(network.pipes[0].result.velocity > 1.);
    }

    #[rstest]
    fn should_size_heat_exchangers_in_steps(mut network: NetworkGraph) {
        let solver = TreeSolver::default();

        optimize_consumer_diameters(&mut network, &solver, 2., 0.001, 100).unwrap();

        let target = 2. / 1.5;
        for consumer in &network.consumers {
            assert!(consumer.result.velocity <= target);
            // one step smaller would exceed the target
            assert!(velocity(consumer.controlled_mass_flow, consumer.diameter_m - 0.001) > target);
        }
    }

    #[rstest]
    fn should_size_network_at_design_point_and_resettle_controllers(mut network: NetworkGraph) {
        let mut control =
            NetworkControlLoop::new(TreeSolver::default(), &mut network, Default::default()).unwrap();
        let boundary = TimeStepBoundary {
            heat_loads: vec![60_000.; 3],
            return_temperatures: vec![50.; 3],
            min_supply_temperatures: vec![70.; 3],
            supply_temperature: 85.,
        };
        let settings = SizingSettings::default();

        net_optimization(&mut network, &mut control, &boundary, &settings).unwrap();

        assert!(network
            .pipes
            .iter()
            .all(|pipe| pipe.std_type.as_deref().is_some_and(|name| name.starts_with("KMR"))));
        assert!(network.consumers.iter().all(|consumer| consumer.diameter_m < 0.03));
        assert_eq!(control.state(), crate::core::network::control_loop::LoopState::Converged);
    }
}
