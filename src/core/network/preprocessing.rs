use crate::core::cop::{CopTable, SourceTemperature};
use crate::core::heat_curve::{BuildingHeatCurve, NetworkSupplyCurve};
use crate::core::units::WATTS_PER_KILOWATT;
use crate::errors::{ensure_same_length, InfeasibleTemperaturesError};
use anyhow::{anyhow, bail};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, strum::Display)]
#[serde(rename_all = "snake_case")]
pub enum NetworkKind {
    #[default]
    Conventional,
    /// low temperature network feeding building heat pumps
    Cold,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, strum::Display)]
#[serde(rename_all = "snake_case")]
pub enum TemperatureMode {
    /// fixed building temperatures
    #[default]
    Static,
    /// building temperatures follow each building's heating curve
    BuildingCurve,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PreprocessingSettings {
    #[serde(default)]
    pub network_kind: NetworkKind,
    #[serde(default)]
    pub temperature_mode: TemperatureMode,
    /// return temperature behind the building connections, deg C
    #[serde(default = "default_return_temperature")]
    pub return_temperature: f64,
    /// approach temperature of the building heat exchangers, K
    #[serde(default = "default_heat_exchanger_spread")]
    pub heat_exchanger_spread: f64,
}

fn default_return_temperature() -> f64 {
    60.
}

fn default_heat_exchanger_spread() -> f64 {
    5.
}

impl Default for PreprocessingSettings {
    fn default() -> Self {
        Self {
            network_kind: Default::default(),
            temperature_mode: Default::default(),
            return_temperature: default_return_temperature(),
            heat_exchanger_spread: default_heat_exchanger_spread(),
        }
    }
}

/// Heating system temperatures of one building, deg C.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BuildingTemperatures {
    pub supply_temperature: f64,
    pub return_temperature: f64,
    #[serde(default)]
    pub heat_curve: Option<BuildingHeatCurve>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConsumerDemand {
    /// heat demand of the building, W
    pub heat_demand: Vec<f64>,
    pub building: BuildingTemperatures,
}

/// Boundary conditions of one time step, per consumer where given as a list.
#[derive(Clone, Debug, PartialEq)]
pub struct TimeStepBoundary {
    /// W
    pub heat_loads: Vec<f64>,
    /// deg C
    pub return_temperatures: Vec<f64>,
    /// deg C
    pub min_supply_temperatures: Vec<f64>,
    /// network supply temperature, deg C
    pub supply_temperature: f64,
}

/// Boundary conditions for a whole simulation, series indexed by consumer then time step.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NetworkBoundaryConditions {
    /// heat drawn from the network, W
    pub heat_loads: Vec<Vec<f64>>,
    /// electricity of building heat pumps, W
    pub electricity: Vec<Vec<f64>>,
    /// deg C
    pub return_temperatures: Vec<Vec<f64>>,
    /// deg C
    pub min_supply_temperatures: Vec<Vec<f64>>,
    /// deg C
    pub supply_temperatures: Vec<f64>,
}

impl NetworkBoundaryConditions {
    pub fn len(&self) -> usize {
        self.supply_temperatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.supply_temperatures.is_empty()
    }

    pub fn step(&self, step: usize) -> TimeStepBoundary {
        fn column(series: &[Vec<f64>], step: usize) -> Vec<f64> {
            series.iter().map(|s| s[step]).collect()
        }

        TimeStepBoundary {
            heat_loads: column(&self.heat_loads, step),
            return_temperatures: column(&self.return_temperatures, step),
            min_supply_temperatures: column(&self.min_supply_temperatures, step),
            supply_temperature: self.supply_temperatures[step],
        }
    }

    /// Total network heat load per time step, kW
    pub fn total_heat_kw(&self) -> Vec<f64> {
        sum_kw(&self.heat_loads, self.len())
    }

    /// Total electricity of building heat pumps per time step, kW
    pub fn total_electricity_kw(&self) -> Vec<f64> {
        sum_kw(&self.electricity, self.len())
    }

    /// Time step with the highest total heat load, used to size the network.
    pub fn peak_step(&self) -> usize {
        self.total_heat_kw()
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(step, _)| step)
            .unwrap_or_default()
    }

    /// Every consumer must be able to return water below the supply temperature.
    pub fn check_feasible(&self) -> Result<(), InfeasibleTemperaturesError> {
        for (consumer, return_temperatures) in self.return_temperatures.iter().enumerate() {
            for (step, (&return_temperature, &supply_temperature)) in return_temperatures
                .iter()
                .zip(&self.supply_temperatures)
                .enumerate()
            {
                if return_temperature >= supply_temperature {
                    return Err(InfeasibleTemperaturesError {
                        consumer,
                        step,
                        return_temperature,
                        supply_temperature,
                    });
                }
            }
        }
        Ok(())
    }
}

fn sum_kw(series: &[Vec<f64>], steps: usize) -> Vec<f64> {
    (0..steps)
        .map(|step| {
            series.iter().map(|s| s[step]).sum::<f64>() / WATTS_PER_KILOWATT as f64
        })
        .collect()
}

/// Turn building demands and temperatures into network boundary conditions.
///
/// Conventional networks pass the building heat straight through. Cold networks feed building
/// heat pumps, so only the part of the heat not covered by their electricity is drawn from the
/// network, and the network only has to supply slightly above its own return temperature.
pub fn preprocess(
    consumers: &[ConsumerDemand],
    air_temperatures: &[f64],
    supply_curve: &NetworkSupplyCurve,
    settings: &PreprocessingSettings,
    cop_table: Option<&CopTable>,
) -> anyhow::Result<NetworkBoundaryConditions> {
    let steps = air_temperatures.len();
    let spread = settings.heat_exchanger_spread;
    info!(
        "Preprocessing {} consumers for a {} network with {} building temperatures",
        consumers.len(),
        settings.network_kind,
        settings.temperature_mode
    );

    let mut conditions = NetworkBoundaryConditions {
        supply_temperatures: supply_curve.series(air_temperatures),
        ..Default::default()
    };

    for (index, consumer) in consumers.iter().enumerate() {
        ensure_same_length(
            &format!("heat demand of consumer {index}"),
            steps,
            consumer.heat_demand.len(),
        )?;
        let building = consumer.building;
        let (building_supply, building_return) = match settings.temperature_mode {
            TemperatureMode::Static => (
                vec![building.supply_temperature; steps],
                vec![building.return_temperature; steps],
            ),
            TemperatureMode::BuildingCurve => {
                let Some(curve) = building.heat_curve else {
                    bail!("Consumer {index} needs a heating curve for building curve temperatures");
                };
                curve
                    .series(air_temperatures)
                    .into_iter()
                    .map(|temperatures| (temperatures.supply, temperatures.return_))
                    .unzip()
            }
        };

        let return_temperatures = match (settings.network_kind, settings.temperature_mode) {
            (NetworkKind::Conventional, TemperatureMode::BuildingCurve) => {
                building_return.iter().map(|t| t + spread).collect()
            }
            _ => vec![settings.return_temperature; steps],
        };

        let (heat_loads, electricity, min_supply_temperatures) = match settings.network_kind {
            NetworkKind::Conventional => (
                consumer.heat_demand.clone(),
                vec![0.; steps],
                building_supply.iter().map(|t| t + spread).collect(),
            ),
            NetworkKind::Cold => {
                let cop_table = cop_table
                    .ok_or_else(|| anyhow!("A cold network needs a COP table for the building heat pumps"))?;
                let cop = cop_table
                    .interpolate(&building_supply, SourceTemperature::Series(&return_temperatures))?
                    .cop;
                let electricity = consumer
                    .heat_demand
                    .iter()
                    .zip(&cop)
                    .map(|(heat, cop)| heat / cop)
                    .collect::<Vec<f64>>();
                let heat_loads = consumer
                    .heat_demand
                    .iter()
                    .zip(&electricity)
                    .map(|(heat, electricity)| heat - electricity)
                    .collect();
                (
                    heat_loads,
                    electricity,
                    return_temperatures.iter().map(|t| t + spread).collect(),
                )
            }
        };

        conditions.heat_loads.push(heat_loads);
        conditions.electricity.push(electricity);
        conditions.return_temperatures.push(return_temperatures);
        conditions.min_supply_temperatures.push(min_supply_temperatures);
    }

    conditions.check_feasible()?;
    let unreachable = conditions
        .min_supply_temperatures
        .iter()
        .filter(|series| {
            series
                .iter()
                .zip(&conditions.supply_temperatures)
                .any(|(min_supply, supply)| min_supply > supply)
        })
        .count();
    if unreachable > 0 {
        warn!("{unreachable} consumers need a higher supply temperature than the network provides at some time steps");
    }

    Ok(conditions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cop::tests::cop_table;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use rstest::*;

    const STATIC_SUPPLY: NetworkSupplyCurve = NetworkSupplyCurve::Static {
        supply_temperature: 85.,
    };

    fn consumer() -> ConsumerDemand {
        ConsumerDemand {
            heat_demand: vec![10_000., 20_000., 30_000.],
            building: BuildingTemperatures {
                supply_temperature: 70.,
                return_temperature: 55.,
                heat_curve: Some(BuildingHeatCurve {
                    max_supply_temperature: 70.,
                    max_return_temperature: 55.,
                    slope: 1.,
                    design_outdoor_temperature: -12.,
                }),
            },
        }
    }

    #[rstest]
    fn should_pass_heat_through_conventional_network() {
        let consumers = [consumer()];
        let conditions = preprocess(
            &consumers,
            &[-12., 0., 8.],
            &STATIC_SUPPLY,
            &PreprocessingSettings::default(),
            None,
        )
        .unwrap();

        assert_eq!(conditions.heat_loads[0], vec![10_000., 20_000., 30_000.]);
        assert_eq!(conditions.electricity[0], vec![0.; 3]);
        assert_eq!(conditions.return_temperatures[0], vec![60.; 3]);
        assert_eq!(conditions.min_supply_temperatures[0], vec![75.; 3]);
        assert_eq!(conditions.total_heat_kw(), vec![10., 20., 30.]);
        assert_eq!(conditions.peak_step(), 2);
    }

    #[rstest]
    fn should_follow_building_curve_with_heat_exchanger_spread() {
        let consumers = [consumer()];
        let settings = PreprocessingSettings {
            temperature_mode: TemperatureMode::BuildingCurve,
            ..Default::default()
        };

        let conditions =
            preprocess(&consumers, &[-12., 0., 8.], &STATIC_SUPPLY, &settings, None).unwrap();

        assert_eq!(conditions.return_temperatures[0], vec![60., 48., 40.]);
        assert_eq!(conditions.min_supply_temperatures[0], vec![75., 63., 55.]);
    }

    #[rstest]
    fn should_split_building_heat_in_cold_network(cop_table: CopTable) {
        let consumers = [consumer()];
        let settings = PreprocessingSettings {
            network_kind: NetworkKind::Cold,
            return_temperature: 10.,
            ..Default::default()
        };
        let supply = NetworkSupplyCurve::Static {
            supply_temperature: 20.,
        };

        let conditions =
            preprocess(&consumers, &[-12., 0., 8.], &supply, &settings, Some(&cop_table)).unwrap();

        // COP of 70 deg C supply from a 10 deg C source
        let cop = cop_table.cop_at(10., 70.);
        assert_relative_eq!(conditions.electricity[0][0], 10_000. / cop, max_relative = 1e-12);
        assert_relative_eq!(
            conditions.heat_loads[0][0] + conditions.electricity[0][0],
            10_000.,
            max_relative = 1e-12
        );
        assert_eq!(conditions.min_supply_temperatures[0], vec![15.; 3]);
        assert_eq!(conditions.total_electricity_kw()[0], conditions.electricity[0][0] / 1000.);
    }

    #[rstest]
    fn should_require_cop_table_for_cold_network() {
        let consumers = [consumer()];
        let settings = PreprocessingSettings {
            network_kind: NetworkKind::Cold,
            return_temperature: 10.,
            ..Default::default()
        };

        assert!(preprocess(&consumers, &[0.; 3], &STATIC_SUPPLY, &settings, None).is_err());
    }

    #[rstest]
    fn should_reject_return_temperature_at_supply_temperature() {
        let consumers = [consumer()];
        let settings = PreprocessingSettings {
            return_temperature: 85.,
            ..Default::default()
        };

        let error = preprocess(&consumers, &[0.; 3], &STATIC_SUPPLY, &settings, None).unwrap_err();

        assert_eq!(
            error.downcast_ref::<InfeasibleTemperaturesError>(),
            Some(&InfeasibleTemperaturesError {
                consumer: 0,
                step: 0,
                return_temperature: 85.,
                supply_temperature: 85.,
            })
        );
    }

    #[rstest]
    fn should_reject_demand_of_wrong_length() {
        let consumers = [consumer()];

        assert!(preprocess(
            &consumers,
            &[0.; 4],
            &STATIC_SUPPLY,
            &PreprocessingSettings::default(),
            None
        )
        .is_err());
    }

    #[rstest]
    fn should_collect_one_time_step_across_consumers() {
        let consumers = [consumer(), consumer()];
        let conditions = preprocess(
            &consumers,
            &[-12., 0., 8.],
            &STATIC_SUPPLY,
            &PreprocessingSettings::default(),
            None,
        )
        .unwrap();

        let boundary = conditions.step(1);

        assert_eq!(boundary.heat_loads, vec![20_000., 20_000.]);
        assert_eq!(boundary.supply_temperature, 85.);
    }
}
