use crate::core::material_properties::WATER;
use serde::{Deserialize, Serialize};

/// Buffer storage attached to a CHP unit or biomass boiler.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// water volume, m3
    pub volume: f64,
    #[serde(default = "default_charged_temperature")]
    pub charged_temperature: f64,
    #[serde(default = "default_discharged_temperature")]
    pub discharged_temperature: f64,
    #[serde(default)]
    pub initial_fill_fraction: f64,
    #[serde(default = "default_min_fill_fraction")]
    pub min_fill_fraction: f64,
    #[serde(default = "default_max_fill_fraction")]
    pub max_fill_fraction: f64,
    /// storage investment, EUR/m3
    #[serde(default = "default_specific_cost")]
    pub specific_cost: f64,
}

fn default_charged_temperature() -> f64 {
    90.
}

fn default_discharged_temperature() -> f64 {
    60.
}

fn default_min_fill_fraction() -> f64 {
    0.2
}

fn default_max_fill_fraction() -> f64 {
    0.8
}

fn default_specific_cost() -> f64 {
    750.
}

impl StorageConfig {
    pub fn with_volume(volume: f64) -> Self {
        Self {
            volume,
            charged_temperature: default_charged_temperature(),
            discharged_temperature: default_discharged_temperature(),
            initial_fill_fraction: 0.,
            min_fill_fraction: default_min_fill_fraction(),
            max_fill_fraction: default_max_fill_fraction(),
            specific_cost: default_specific_cost(),
        }
    }

    /// Usable heat content between the charged and discharged temperature, kWh
    pub fn capacity(&self) -> f64 {
        WATER.stored_heat_kwh(
            self.volume,
            self.charged_temperature,
            self.discharged_temperature,
        )
    }

    pub fn investment(&self) -> f64 {
        self.specific_cost * self.volume
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum UnitState {
    Running,
    Idle,
}

/// Heat flows of one time step with the storage in the loop, kW.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StorageStep {
    /// heat produced by the unit
    pub production: f64,
    /// heat leaving the storage towards the network, negative while charging
    pub storage_output: f64,
}

impl StorageStep {
    pub fn delivered(&self) -> f64 {
        self.production + self.storage_output
    }
}

/// Hysteresis-controlled buffer storage.
///
/// The unit runs at full output until the storage reaches its upper fill bound, then stays off
/// while the storage alone serves the load until it would drop below the lower fill bound.
#[derive(Debug)]
pub struct ThermalStorage {
    capacity: f64,
    fill: f64,
    min_fill: f64,
    max_fill: f64,
    state: UnitState,
}

impl ThermalStorage {
    pub fn new(config: &StorageConfig) -> Self {
        let capacity = config.capacity();
        let min_fill = config.min_fill_fraction * capacity;
        let max_fill = config.max_fill_fraction * capacity;

        Self {
            capacity,
            fill: (config.initial_fill_fraction * capacity).clamp(min_fill, max_fill),
            min_fill,
            max_fill,
            state: UnitState::Running,
        }
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Heat currently stored, kWh
    pub fn fill(&self) -> f64 {
        self.fill
    }

    pub fn fill_percent(&self) -> f64 {
        if self.capacity > 0. {
            self.fill / self.capacity * 100.
        } else {
            0.
        }
    }

    /// Advance one step of `step_hours` against `load` (kW) for a unit of `nominal_power` (kW).
    ///
    /// An idle unit restarts one step early, before the storage would be drawn below its lower
    /// fill bound, rather than once the fill has already reached that bound.
    pub fn step(&mut self, load: f64, nominal_power: f64, step_hours: f64) -> StorageStep {
        match self.state {
            UnitState::Running if self.fill >= self.max_fill => self.state = UnitState::Idle,
            // restart as soon as the storage can no longer cover the whole step
            UnitState::Idle if self.fill - load * step_hours < self.min_fill => {
                self.state = UnitState::Running
            }
            _ => {}
        }

        match self.state {
            UnitState::Running => {
                if load >= nominal_power {
                    return StorageStep {
                        production: nominal_power,
                        storage_output: 0.,
                    };
                }
                let filled = (self.fill + (nominal_power - load) * step_hours).min(self.max_fill);
                let charge_power = (filled - self.fill).max(0.) / step_hours;
                self.fill = filled.max(self.fill);

                // output is throttled once the storage cannot take the whole surplus
                StorageStep {
                    production: load + charge_power,
                    storage_output: -charge_power,
                }
            }
            UnitState::Idle => {
                let emptied = (self.fill - load * step_hours).max(self.min_fill);
                let discharge = (self.fill - emptied).max(0.);
                self.fill = emptied.min(self.fill);

                StorageStep {
                    production: 0.,
                    storage_output: discharge / step_hours,
                }
            }
        }
    }
}

/// Series produced by running a unit with a buffer storage over a whole load profile.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StorageDispatch {
    pub production: Vec<f64>,
    pub storage_output: Vec<f64>,
    pub fill_percent: Vec<f64>,
}

impl StorageDispatch {
    pub fn delivered(&self) -> Vec<f64> {
        self.production
            .iter()
            .zip(self.storage_output.iter())
            .map(|(production, storage)| production + storage)
            .collect()
    }
}

pub fn dispatch_with_storage(
    config: &StorageConfig,
    load: &[f64],
    nominal_power: f64,
    step_hours: f64,
) -> StorageDispatch {
    let mut storage = ThermalStorage::new(config);
    let mut result = StorageDispatch {
        production: Vec::with_capacity(load.len()),
        storage_output: Vec::with_capacity(load.len()),
        fill_percent: Vec::with_capacity(load.len()),
    };

    for &step_load in load {
        let step = storage.step(step_load.max(0.), nominal_power, step_hours);
        result.production.push(step.production);
        result.storage_output.push(step.storage_output);
        result.fill_percent.push(storage.fill_percent());
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[fixture]
    fn config() -> StorageConfig {
        StorageConfig::with_volume(20.)
    }

    fn varying_load() -> Vec<f64> {
        (0..500)
            .map(|i| 50. + 40. * ((i as f64) / 7.).sin() + if i % 24 < 6 { 60. } else { 0. })
            .collect()
    }

    #[rstest]
    fn should_derive_capacity_from_volume_and_spread(config: StorageConfig) {
        assert_relative_eq!(config.capacity(), 697.6666666666666, max_relative = 1e-12);
        assert_relative_eq!(config.investment(), 15_000.);
    }

    #[rstest]
    fn should_keep_fill_within_bounds(config: StorageConfig) {
        let load = varying_load();
        let mut storage = ThermalStorage::new(&config);
        let (min, max) = (0.2 * storage.capacity(), 0.8 * storage.capacity());

        for step_load in load {
            storage.step(step_load, 100., 1.);
            assert!(storage.fill() >= min - 1e-9);
            assert!(storage.fill() <= max + 1e-9);
        }
    }

    #[rstest]
    fn should_never_deliver_more_than_load(config: StorageConfig) {
        let load = varying_load();
        let result = dispatch_with_storage(&config, &load, 100., 1.);

        for (delivered, demand) in result.delivered().iter().zip(load.iter()) {
            assert!(*delivered <= demand + 1e-9);
            assert!(*delivered >= 0.);
        }
    }

    #[rstest]
    fn should_switch_off_when_full_and_restart_when_empty(config: StorageConfig) {
        // 100 kW unit against 40 kW load charges 60 kWh per hour from 20 % to 80 %
        let load = vec![40.; 30];
        let result = dispatch_with_storage(&config, &load, 100., 1.);

        let first_idle = result.production.iter().position(|p| *p == 0.).unwrap();
        assert!(first_idle > 0);
        assert_relative_eq!(result.fill_percent[first_idle - 1], 80., max_relative = 1e-9);
        // while idle the storage covers the whole load
        assert_relative_eq!(result.storage_output[first_idle], 40.);

        let restart = first_idle
            + result.production[first_idle..]
                .iter()
                .position(|p| *p > 0.)
                .unwrap();
        for idle in first_idle..restart {
            assert_relative_eq!(result.storage_output[idle], 40.);
        }
        // one more idle step would have taken the storage below 20 %
        let one_step_percent = 40. / config.capacity() * 100.;
        assert!(result.fill_percent[restart - 1] < 20. + one_step_percent);
        assert_relative_eq!(result.delivered()[restart], 40., max_relative = 1e-9);
    }

    #[rstest]
    fn should_restart_before_load_would_empty_storage_below_lower_bound() {
        let config = StorageConfig {
            initial_fill_fraction: 0.8,
            ..StorageConfig::with_volume(20.)
        };
        let mut storage = ThermalStorage::new(&config);
        let min_fill = 0.2 * storage.capacity();

        // full storage switches the unit off
        let idle = storage.step(40., 500., 1.);
        assert_eq!(idle.production, 0.);
        assert!(storage.fill() - 400. < min_fill);

        // fill is still above the lower bound, but not by enough to cover 400 kWh
        let restarted = storage.step(400., 500., 1.);
        assert!(restarted.production >= 400.);
        assert!(storage.fill() >= min_fill);
    }

    #[rstest]
    fn should_clamp_initial_fill_to_bounds() {
        let config = StorageConfig {
            initial_fill_fraction: 1.,
            ..StorageConfig::with_volume(10.)
        };
        let storage = ThermalStorage::new(&config);
        assert_relative_eq!(storage.fill_percent(), 80.);
    }

    #[rstest]
    fn should_deserialize_with_defaults() {
        let config: StorageConfig = serde_json::from_str(r#"{"volume": 20}"#).unwrap();
        assert_eq!(config, StorageConfig::with_volume(20.));
    }
}
