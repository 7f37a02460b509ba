use crate::core::material_properties::NETWORK_WATER;
use crate::core::network::graph::{mass_flow, NetworkGraph};
use crate::core::units::ZERO_CELSIUS_IN_KELVIN;
use serde::{Deserialize, Serialize};

/// Feedback controller acting on the network between two solver runs.
pub trait Controller {
    /// Prepare for a new time step. Called after the boundary conditions are set and before
    /// the first solve.
    fn reset(&mut self, network: &mut NetworkGraph);
    /// Check the last solved state. May record history used by the next check.
    fn is_converged(&mut self, network: &NetworkGraph) -> bool;
    /// Adjust the controlled quantity towards the setpoint.
    fn control_step(&mut self, network: &mut NetworkGraph);
}

/// Keeps the pressure difference at the worst point at its target by moving the pump's flow
/// pressure and lift together.
#[derive(Clone, Debug, PartialEq)]
pub struct WorstPointPressureController {
    pub pump: usize,
    pub worst_point: usize,
    pub settings: PressureControlSettings,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PressureControlSettings {
    /// bar
    #[serde(default = "default_target_pressure_difference")]
    pub target_pressure_difference: f64,
    /// bar
    #[serde(default = "default_pressure_tolerance")]
    pub tolerance: f64,
    #[serde(default = "default_proportional_gain")]
    pub proportional_gain: f64,
    /// W; a worst point with a load at or below this is left alone
    #[serde(default = "default_negligible_load")]
    pub negligible_load: f64,
}

fn default_target_pressure_difference() -> f64 {
    1.
}

fn default_pressure_tolerance() -> f64 {
    0.2
}

fn default_proportional_gain() -> f64 {
    0.2
}

fn default_negligible_load() -> f64 {
    250.
}

impl Default for PressureControlSettings {
    fn default() -> Self {
        Self {
            target_pressure_difference: default_target_pressure_difference(),
            tolerance: default_pressure_tolerance(),
            proportional_gain: default_proportional_gain(),
            negligible_load: default_negligible_load(),
        }
    }
}

impl WorstPointPressureController {
    pub fn new(pump: usize, worst_point: usize, settings: PressureControlSettings) -> Self {
        Self {
            pump,
            worst_point,
            settings,
        }
    }

    fn error(&self, network: &NetworkGraph) -> f64 {
        self.settings.target_pressure_difference
            - network.consumers[self.worst_point]
                .result
                .pressure_difference()
    }
}

impl Controller for WorstPointPressureController {
    fn reset(&mut self, _network: &mut NetworkGraph) {}

    fn is_converged(&mut self, network: &NetworkGraph) -> bool {
        if network.consumers[self.worst_point].heat_load <= self.settings.negligible_load {
            return true;
        }
        self.error(network).abs() < self.settings.tolerance
    }

    fn control_step(&mut self, network: &mut NetworkGraph) {
        let adjustment = self.settings.proportional_gain * self.error(network);
        let pump = &mut network.pumps[self.pump];
        pump.lift_pressure = (pump.lift_pressure + adjustment).max(0.);
        pump.flow_pressure += adjustment;
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ReturnTemperatureSettings {
    /// K
    #[serde(default = "default_temperature_tolerance")]
    pub tolerance: f64,
    /// weight of the current mass flow in each update
    #[serde(default = "default_damping_factor")]
    pub damping_factor: f64,
    /// m/s
    #[serde(default = "default_min_velocity")]
    pub min_velocity: f64,
    /// m/s
    #[serde(default = "default_max_velocity")]
    pub max_velocity: f64,
    /// W; consumers at or below this load are parked at the minimum mass flow
    #[serde(default = "default_idle_load")]
    pub idle_load: f64,
    /// iterations a consumer may sit at a mass flow limit before it counts as converged
    #[serde(default = "default_iterations_at_limit")]
    pub iterations_at_limit: usize,
}

fn default_temperature_tolerance() -> f64 {
    2.
}

fn default_damping_factor() -> f64 {
    0.5
}

fn default_min_velocity() -> f64 {
    0.01
}

fn default_max_velocity() -> f64 {
    2.
}

fn default_idle_load() -> f64 {
    500.
}

fn default_iterations_at_limit() -> usize {
    10
}

impl Default for ReturnTemperatureSettings {
    fn default() -> Self {
        Self {
            tolerance: default_temperature_tolerance(),
            damping_factor: default_damping_factor(),
            min_velocity: default_min_velocity(),
            max_velocity: default_max_velocity(),
            idle_load: default_idle_load(),
            iterations_at_limit: default_iterations_at_limit(),
        }
    }
}

/// Smallest inlet-to-target spread (K) the mass flow law is evaluated at.
const MIN_TEMPERATURE_SPREAD: f64 = 0.1;

/// Holds one consumer's return temperature at its target by adjusting its mass flow.
#[derive(Clone, Debug, PartialEq)]
pub struct ReturnTemperatureController {
    pub consumer: usize,
    /// deg C
    pub target_return_temperature: f64,
    /// deg C
    pub min_supply_temperature: Option<f64>,
    pub settings: ReturnTemperatureSettings,
    min_mass_flow: f64,
    max_mass_flow: f64,
    /// inlet temperatures (deg C) of the last two checks, oldest first
    inlet_history: Vec<f64>,
    iterations: usize,
}

impl ReturnTemperatureController {
    pub fn new(consumer: usize, network: &NetworkGraph, settings: ReturnTemperatureSettings) -> Self {
        let mut controller = Self {
            consumer,
            target_return_temperature: 0.,
            min_supply_temperature: None,
            settings,
            min_mass_flow: 0.,
            max_mass_flow: 0.,
            inlet_history: Vec::with_capacity(2),
            iterations: 0,
        };
        controller.calculate_mass_flow_limits(network);
        controller
    }

    /// Derive the mass flow limits from the velocity bounds and the heat exchanger diameter.
    pub fn calculate_mass_flow_limits(&mut self, network: &NetworkGraph) {
        let diameter = network.consumers[self.consumer].diameter_m;
        self.min_mass_flow = mass_flow(self.settings.min_velocity, diameter);
        self.max_mass_flow = mass_flow(self.settings.max_velocity, diameter);
    }

    pub fn mass_flow_limits(&self) -> (f64, f64) {
        (self.min_mass_flow, self.max_mass_flow)
    }

    /// Within 1 % of either limit. The damped update only approaches a limit asymptotically.
    fn at_limit(&self, mass_flow: f64) -> bool {
        mass_flow <= self.min_mass_flow * 1.01 || mass_flow >= self.max_mass_flow * 0.99
    }

    fn inlet_too_cold(&self, inlet: f64) -> bool {
        self.min_supply_temperature
            .is_some_and(|min_supply| inlet < min_supply)
    }
}

fn celsius(temperature_k: f64) -> f64 {
    temperature_k - ZERO_CELSIUS_IN_KELVIN
}

impl Controller for ReturnTemperatureController {
    fn reset(&mut self, network: &mut NetworkGraph) {
        self.inlet_history.clear();
        self.iterations = 0;
        let consumer = &mut network.consumers[self.consumer];
        if consumer.heat_load <= self.settings.idle_load {
            consumer.controlled_mass_flow = self.min_mass_flow;
        } else {
            consumer.controlled_mass_flow = consumer
                .controlled_mass_flow
                .clamp(self.min_mass_flow, self.max_mass_flow);
        }
    }

    fn is_converged(&mut self, network: &NetworkGraph) -> bool {
        let consumer = &network.consumers[self.consumer];
        if consumer.heat_load <= self.settings.idle_load {
            return true;
        }
        let inlet = celsius(consumer.result.temperature_from);
        let outlet = celsius(consumer.result.temperature_to);

        if self.inlet_history.len() == 2 {
            self.inlet_history.remove(0);
        }
        self.inlet_history.push(inlet);

        if self.inlet_too_cold(inlet) {
            return false;
        }
        if self.at_limit(consumer.controlled_mass_flow)
            && self.iterations > self.settings.iterations_at_limit
        {
            return true;
        }

        let inlet_settled = matches!(
            self.inlet_history.as_slice(),
            [previous, current] if (current - previous).abs() < self.settings.tolerance
        );
        let on_target = (outlet - self.target_return_temperature).abs() < self.settings.tolerance;

        inlet_settled && on_target
    }

    fn control_step(&mut self, network: &mut NetworkGraph) {
        self.iterations += 1;
        let consumer = &mut network.consumers[self.consumer];
        let current = consumer.controlled_mass_flow;
        let inlet = celsius(consumer.result.temperature_from);

        let target = if self.inlet_too_cold(inlet) {
            // pull more hot water through the supply line
            current.max(self.min_mass_flow) * 2.
        } else {
            let spread = inlet - self.target_return_temperature;
            if spread > MIN_TEMPERATURE_SPREAD {
                consumer.heat_load / (NETWORK_WATER.specific_heat_capacity() * spread)
            } else {
                self.max_mass_flow
            }
        };
        let damping = self.settings.damping_factor;

        consumer.controlled_mass_flow = (damping * current + (1. - damping) * target)
            .clamp(self.min_mass_flow, self.max_mass_flow);
    }
}

/// The controllers acting on one network.
#[derive(Clone, Debug, PartialEq)]
pub enum NetworkController {
    Pressure(WorstPointPressureController),
    ReturnTemperature(ReturnTemperatureController),
}

impl Controller for NetworkController {
    fn reset(&mut self, network: &mut NetworkGraph) {
        match self {
            Self::Pressure(controller) => controller.reset(network),
            Self::ReturnTemperature(controller) => controller.reset(network),
        }
    }

    fn is_converged(&mut self, network: &NetworkGraph) -> bool {
        match self {
            Self::Pressure(controller) => controller.is_converged(network),
            Self::ReturnTemperature(controller) => controller.is_converged(network),
        }
    }

    fn control_step(&mut self, network: &mut NetworkGraph) {
        match self {
            Self::Pressure(controller) => controller.control_step(network),
            Self::ReturnTemperature(controller) => controller.control_step(network),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::network::graph::tests::network;
    use crate::core::network::solver::{HydraulicSolver, TreeSolver};
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use rstest::*;

    fn solve(network: &mut NetworkGraph) {
        TreeSolver::default().solve(network).unwrap();
    }

    fn return_controller(network: &NetworkGraph, consumer: usize) -> ReturnTemperatureController {
        let mut controller =
            ReturnTemperatureController::new(consumer, network, ReturnTemperatureSettings::default());
        controller.target_return_temperature = 50.;
        controller
    }

    #[rstest]
    fn should_derive_mass_flow_limits_from_velocity_bounds(network: NetworkGraph) {
        let controller = return_controller(&network, 0);
        let (min, max) = controller.mass_flow_limits();

        // 0.03 m heat exchanger
        let area = std::f64::consts::PI / 4. * 0.03_f64.powi(2);
        assert_relative_eq!(min, 0.01 * area * 1000., max_relative = 1e-12);
        assert_relative_eq!(max, 2. * area * 1000., max_relative = 1e-12);
    }

    #[rstest]
    fn should_damp_mass_flow_update(mut network: NetworkGraph) {
        let mut controller = return_controller(&network, 0);
        solve(&mut network);
        let inlet = network.consumers[0].result.temperature_from - ZERO_CELSIUS_IN_KELVIN;

        controller.control_step(&mut network);

        let required = 30_000. / (4190. * (inlet - 50.));
        assert_relative_eq!(
            network.consumers[0].controlled_mass_flow,
            0.5 * 0.25 + 0.5 * required,
            max_relative = 1e-12
        );
    }

    #[rstest]
    fn should_settle_return_temperature_at_target(mut network: NetworkGraph) {
        let mut controllers = (0..3)
            .map(|i| return_controller(&network, i))
            .collect::<Vec<_>>();
        controllers
            .iter_mut()
            .for_each(|controller| controller.reset(&mut network));

        let mut converged = false;
        for _ in 0..50 {
            solve(&mut network);
            let mut all_converged = true;
            for controller in controllers.iter_mut() {
                if !controller.is_converged(&network) {
                    all_converged = false;
                    controller.control_step(&mut network);
                }
            }
            if all_converged {
                converged = true;
                break;
            }
        }

        assert!(converged);
        for consumer in &network.consumers {
            let outlet = consumer.result.temperature_to - ZERO_CELSIUS_IN_KELVIN;
            assert!((outlet - 50.).abs() < 2.);
        }
    }

    #[rstest]
    fn should_park_idle_consumer_at_minimum_flow(mut network: NetworkGraph) {
        network.consumers[2].heat_load = 400.;
        let mut controller = return_controller(&network, 2);

        controller.reset(&mut network);
        solve(&mut network);

        assert_eq!(
            network.consumers[2].controlled_mass_flow,
            controller.mass_flow_limits().0
        );
        assert!(controller.is_converged(&network));
    }

    #[rstest]
    fn should_raise_flow_when_inlet_is_below_minimum_supply(mut network: NetworkGraph) {
        let mut controller = return_controller(&network, 0);
        controller.min_supply_temperature = Some(95.);
        solve(&mut network);
        let before = network.consumers[0].controlled_mass_flow;

        assert!(!controller.is_converged(&network));
        controller.control_step(&mut network);

        assert!(network.consumers[0].controlled_mass_flow > before);
    }

    #[rstest]
    fn should_accept_consumer_pinned_at_limit_after_enough_iterations(mut network: NetworkGraph) {
        // a target above the inlet temperature asks for ever more flow
        let mut controller = return_controller(&network, 0);
        controller.target_return_temperature = 90.;
        controller.reset(&mut network);

        let mut iterations = 0;
        loop {
            solve(&mut network);
            if controller.is_converged(&network) {
                break;
            }
            controller.control_step(&mut network);
            iterations += 1;
            assert!(iterations < 50);
        }

        assert_relative_eq!(
            network.consumers[0].controlled_mass_flow,
            controller.mass_flow_limits().1,
            max_relative = 0.01
        );
        assert_eq!(iterations, 11);
    }

    #[rstest]
    fn should_move_flow_pressure_and_lift_together(mut network: NetworkGraph) {
        solve(&mut network);
        let mut controller = WorstPointPressureController::new(0, 1, PressureControlSettings::default());
        let dp = network.consumers[1].result.pressure_difference();
        let (flow, lift) = (network.pumps[0].flow_pressure, network.pumps[0].lift_pressure);

        controller.control_step(&mut network);

        let adjustment = 0.2 * (1. - dp);
        assert_relative_eq!(network.pumps[0].flow_pressure, flow + adjustment);
        assert_relative_eq!(network.pumps[0].lift_pressure, lift + adjustment);
    }

    #[rstest]
    fn should_bring_worst_point_to_target_pressure_difference(mut network: NetworkGraph) {
        let mut controller = WorstPointPressureController::new(0, 1, PressureControlSettings::default());

        let mut iterations = 0;
        loop {
            solve(&mut network);
            if controller.is_converged(&network) {
                break;
            }
            controller.control_step(&mut network);
            iterations += 1;
            assert!(iterations < 30);
        }

        assert!((network.consumers[1].result.pressure_difference() - 1.).abs() < 0.2);
    }

    #[rstest]
    fn should_treat_negligible_worst_point_load_as_converged(mut network: NetworkGraph) {
        network.consumers[1].heat_load = 250.;
        network.pumps[0].lift_pressure = 5.;
        solve(&mut network);

        let mut controller = WorstPointPressureController::new(0, 1, PressureControlSettings::default());

        assert!(controller.is_converged(&network));
    }
}
