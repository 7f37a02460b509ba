use crate::core::network::controllers::{
    Controller, NetworkController, PressureControlSettings, ReturnTemperatureController,
    ReturnTemperatureSettings, WorstPointPressureController,
};
use crate::core::network::graph::NetworkGraph;
use crate::core::network::preprocessing::{NetworkBoundaryConditions, TimeStepBoundary};
use crate::core::network::results::NetworkResults;
use crate::core::network::solver::HydraulicSolver;
use crate::core::units::{celsius_to_kelvin, ZERO_CELSIUS_IN_KELVIN};
use crate::errors::{ensure_same_length, IterativeLoop, NotConvergedError};
use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
pub enum LoopState {
    Init,
    Solving,
    Converged,
    Failed,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ControlSettings {
    /// solver runs per time step before giving up
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// keep the last state of a time step that did not converge instead of failing the run
    #[serde(default)]
    pub accept_unconverged: bool,
    #[serde(default)]
    pub pressure: PressureControlSettings,
    #[serde(default)]
    pub return_temperature: ReturnTemperatureSettings,
}

fn default_max_iterations() -> usize {
    100
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            accept_unconverged: false,
            pressure: Default::default(),
            return_temperature: Default::default(),
        }
    }
}

/// Drives a network to a self-consistent state at every time step by alternating solver runs
/// and controller steps.
pub struct NetworkControlLoop<S> {
    solver: S,
    controllers: Vec<NetworkController>,
    settings: ControlSettings,
    state: LoopState,
}

impl<S: HydraulicSolver> NetworkControlLoop<S> {
    /// Create one return temperature controller per consumer and a pressure controller anchored
    /// at the current worst point of the main pump.
    pub fn new(solver: S, network: &mut NetworkGraph, settings: ControlSettings) -> anyhow::Result<Self> {
        solver.solve(network)?;
        let worst_point = network
            .worst_point()
            .ok_or_else(|| anyhow!("The network has no heat consumers to control"))?;

        let mut controllers = (0..network.consumer_count())
            .map(|consumer| {
                NetworkController::ReturnTemperature(ReturnTemperatureController::new(
                    consumer,
                    network,
                    settings.return_temperature,
                ))
            })
            .collect::<Vec<_>>();
        controllers.push(NetworkController::Pressure(WorstPointPressureController::new(
            0,
            worst_point.consumer,
            settings.pressure,
        )));
        debug!(
            "Worst point at consumer {} with {:.3} bar",
            worst_point.consumer, worst_point.pressure_difference
        );

        Ok(Self {
            solver,
            controllers,
            settings,
            state: LoopState::Init,
        })
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    pub fn controllers(&self) -> &[NetworkController] {
        &self.controllers
    }

    /// Re-derive every return temperature controller's mass flow limits, e.g. after the heat
    /// exchangers were resized.
    pub fn recalculate_mass_flow_limits(&mut self, network: &NetworkGraph) {
        for controller in self.controllers.iter_mut() {
            if let NetworkController::ReturnTemperature(controller) = controller {
                controller.calculate_mass_flow_limits(network);
            }
        }
    }

    /// Solve the network and move the pressure controller to the current worst point.
    pub fn locate_worst_point(&mut self, network: &mut NetworkGraph) -> anyhow::Result<()> {
        self.solver.solve(network)?;
        if let Some(worst_point) = network.worst_point() {
            for controller in self.controllers.iter_mut() {
                if let NetworkController::Pressure(controller) = controller {
                    controller.worst_point = worst_point.consumer;
                }
            }
        }
        Ok(())
    }

    /// Inject one time step's boundary conditions and reset the controllers.
    pub fn apply_boundary(&mut self, network: &mut NetworkGraph, boundary: &TimeStepBoundary) -> anyhow::Result<()> {
        let consumers = network.consumer_count();
        ensure_same_length("consumer heat loads", consumers, boundary.heat_loads.len())?;
        ensure_same_length(
            "consumer return temperatures",
            consumers,
            boundary.return_temperatures.len(),
        )?;
        ensure_same_length(
            "consumer minimum supply temperatures",
            consumers,
            boundary.min_supply_temperatures.len(),
        )?;

        for (consumer, &heat_load) in network.consumers.iter_mut().zip(&boundary.heat_loads) {
            consumer.heat_load = heat_load;
        }
        let flow_temperature = celsius_to_kelvin(boundary.supply_temperature)?;
        for pump in network.pumps.iter_mut() {
            pump.flow_temperature = flow_temperature;
        }
        for controller in self.controllers.iter_mut() {
            if let NetworkController::ReturnTemperature(controller) = controller {
                controller.target_return_temperature = boundary.return_temperatures[controller.consumer];
                controller.min_supply_temperature =
                    Some(boundary.min_supply_temperatures[controller.consumer]);
            }
            controller.reset(network);
        }
        self.state = LoopState::Init;

        Ok(())
    }

    /// Solve and correct until every controller is satisfied. Returns the number of solver runs.
    pub fn converge(&mut self, network: &mut NetworkGraph) -> anyhow::Result<usize> {
        self.state = LoopState::Solving;
        for iteration in 1..=self.settings.max_iterations {
            self.solver.solve(network)?;

            let mut all_converged = true;
            for controller in self.controllers.iter_mut() {
                if !controller.is_converged(network) {
                    all_converged = false;
                    controller.control_step(network);
                }
            }
            if all_converged {
                self.state = LoopState::Converged;
                return Ok(iteration);
            }
        }

        self.state = LoopState::Failed;
        // the controllers have already moved on from the last solved state
        self.solver.solve(network)?;
        let residuals = self
            .controllers
            .iter()
            .map(|controller| controller.residual(network))
            .collect();
        Err(NotConvergedError::new(
            IterativeLoop::NetworkControl,
            self.settings.max_iterations,
            residuals,
        )
        .into())
    }

    pub fn run_time_step(
        &mut self,
        network: &mut NetworkGraph,
        boundary: &TimeStepBoundary,
    ) -> anyhow::Result<usize> {
        self.apply_boundary(network, boundary)?;
        self.converge(network)
    }

    /// Run every time step in order and record the pump results.
    pub fn run_time_series(
        &mut self,
        network: &mut NetworkGraph,
        conditions: &NetworkBoundaryConditions,
        results: &mut NetworkResults,
    ) -> anyhow::Result<()> {
        let mut total_iterations = 0;
        let mut unconverged = 0;

        for step in 0..conditions.len() {
            match self.run_time_step(network, &conditions.step(step)) {
                Ok(iterations) => total_iterations += iterations,
                Err(error) => match error.downcast::<NotConvergedError>() {
                    Ok(error) if self.settings.accept_unconverged => {
                        warn!("Time step {step}: {error}");
                        total_iterations += error.iterations;
                        unconverged += 1;
                    }
                    Ok(error) => return Err(error.with_detail(format!("time step {step}")).into()),
                    Err(error) => return Err(error),
                },
            }
            results.record_pumps(network);
        }

        info!(
            "Simulated {} time steps with {} solver runs ({} steps did not converge)",
            conditions.len(),
            total_iterations,
            unconverged
        );
        Ok(())
    }
}

impl NetworkController {
    /// Remaining control error: bar for the pressure controller, K for return temperatures.
    pub fn residual(&self, network: &NetworkGraph) -> f64 {
        match self {
            Self::Pressure(controller) => {
                controller.settings.target_pressure_difference
                    - network.consumers[controller.worst_point]
                        .result
                        .pressure_difference()
            }
            Self::ReturnTemperature(controller) => {
                network.consumers[controller.consumer].result.temperature_to
                    - ZERO_CELSIUS_IN_KELVIN
                    - controller.target_return_temperature
            }
        }
    }
}
