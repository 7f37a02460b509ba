#![allow(clippy::too_many_arguments)]

pub mod core;
pub mod errors;
pub mod input;
pub mod output;
pub mod read_weather_file;
pub mod simulation_time;
mod statistics;

pub use crate::core::network::results::NetworkResults;
use crate::core::cop::CopTable;
use crate::core::dispatch::{dispatch, DispatchResult};
use crate::core::heat_curve::NetworkSupplyCurve;
use crate::core::heat_generators::DispatchContext;
use crate::core::network::graph::PumpGroup;
use crate::core::network::preprocessing::{preprocess, NetworkBoundaryConditions};
use crate::core::network::solver::TreeSolver;
use crate::core::network::{simulate_network, NetworkSettings};
use crate::core::optimizer::{optimize_mix, OptimizedMix};
use crate::core::units::power_series_to_mwh;
use crate::errors::{DhsCoreError, DhsError, NotConvergedError, NotImplementedError};
use crate::input::{ingest_input, resolve_path, Input};
use crate::output::{Output, NETWORK_RESULTS_KEY, SUMMARY_KEY};
use crate::read_weather_file::WeatherData;
use crate::statistics::{max_or_zero, mean_or_zero, percentile};
use anyhow::{anyhow, bail, Context};
use serde::Serialize;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::{info, warn};

/// Everything a project run reports besides the network time series.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub demand: DemandSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimization: Option<OptimizedMix>,
    /// generators that produced heat or electricity, in merit order
    pub active_generators: Vec<String>,
    pub dispatch: DispatchResult,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct DemandSummary {
    pub annual_mwh: f64,
    pub peak_kw: f64,
    pub mean_kw: f64,
    pub percentile_90_kw: f64,
}

impl DemandSummary {
    fn new(demand: &[f64], step_hours: f64) -> Self {
        Self {
            annual_mwh: power_series_to_mwh(demand, step_hours),
            peak_kw: max_or_zero(demand),
            mean_kw: mean_or_zero(demand),
            percentile_90_kw: if demand.is_empty() {
                0.
            } else {
                percentile(demand, 90)
            },
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
pub struct NetworkSummary {
    /// heat fed in by the pumps, MWh
    pub generated_mwh: f64,
    /// heat drawn by the consumers, MWh
    pub consumer_heat_mwh: f64,
    pub heat_pump_electricity_mwh: f64,
    pub losses_mwh: f64,
    pub peak_generated_kw: f64,
}

/// Demand and network temperatures the generator mix is dispatched against.
struct DispatchSeries {
    demand: Vec<f64>,
    supply_temperatures: Vec<f64>,
    return_temperatures: Vec<f64>,
    network: Option<NetworkSummary>,
}

/// Run one project: simulate the network if there is one, then optimize (if enabled) and
/// dispatch the generator mix against the heat the network needs.
///
/// Relative file paths in the input are resolved against `base_directory`. Weather given as
/// `weather_override` takes precedence over weather in the input.
pub fn run_project(
    input: impl Read,
    output: impl Output,
    base_directory: Option<&Path>,
    weather_override: Option<WeatherData>,
) -> Result<RunSummary, DhsError> {
    let input = ingest_input(input)?;
    let weather = match weather_override {
        Some(weather) => Some(weather),
        None => input
            .weather
            .as_ref()
            .map(|weather| weather.load(base_directory))
            .transpose()?,
    };
    if let Some(weather) = &weather {
        input
            .simulation_time
            .ensure_series_length("air temperatures", &weather.air_temperatures)?;
    }
    if !input.simulation_time.is_full_year() {
        warn!("The simulation does not cover a full year, annual costs and energies refer to the simulated period");
    }
    let cop_table = input
        .cop_file
        .as_deref()
        .map(|path| load_cop_table(base_directory, path))
        .transpose()?;

    let series = match &input.network {
        Some(settings) => {
            if settings.topology.pumps.len() > 1 {
                return Err(NotImplementedError::new(
                    "networks fed by more than one pump need an external hydraulic solver",
                )
                .into());
            }
            let weather = weather
                .as_ref()
                .ok_or_else(|| anyhow!("Simulating a network needs weather data"))?;
            network_series(&input, settings, weather, base_directory, &output)
                .map_err(calculation_error)?
        }
        None => standalone_series(&input, weather.as_ref())?,
    };

    let step_hours = input.simulation_time.step_in_hours();
    let context = DispatchContext {
        demand: &series.demand,
        supply_temperatures: &series.supply_temperatures,
        return_temperatures: &series.return_temperatures,
        weather: weather.as_ref(),
        cop_table: cop_table.as_ref(),
        prices: input.prices,
        economics: input.economics.into(),
        step_hours,
    };

    let mut generators = input.generators.clone();
    let optimization = if input.optimization.enabled {
        match optimize_mix(&mut generators, &context, &input.optimization) {
            Ok(mix) => Some(mix),
            Err(error) => match error.downcast::<NotConvergedError>() {
                Ok(error) => {
                    warn!("{error}; dispatching the mix as configured");
                    None
                }
                Err(error) => return Err(calculation_error(error)),
            },
        }
    } else {
        None
    };

    let dispatch_result = dispatch(&generators, &context).map_err(calculation_error)?;
    dispatch_result.retain_active(&mut generators);
    info!(
        "Dispatched {} generators against {:.1} MWh, {:.1} MWh left uncovered",
        generators.len(),
        dispatch_result.annual_demand,
        dispatch_result.residual_demand
    );

    let summary = RunSummary {
        demand: DemandSummary::new(&series.demand, step_hours),
        network: series.network,
        optimization,
        active_generators: generators
            .iter()
            .map(|generator| generator.display_name())
            .collect(),
        dispatch: dispatch_result,
    };
    if !output.is_noop() {
        write_summary(&output, &summary)?;
    }

    Ok(summary)
}

fn calculation_error(error: anyhow::Error) -> DhsError {
    match error.downcast::<NotConvergedError>() {
        Ok(error) => DhsError::NotConverged(error),
        Err(error) => DhsError::FailureInCalculation(DhsCoreError::new(error)),
    }
}

fn load_cop_table(base_directory: Option<&Path>, path: &Path) -> anyhow::Result<CopTable> {
    let path = resolve_path(base_directory, path);
    let file =
        File::open(&path).with_context(|| format!("Could not open COP file {}", path.display()))?;
    CopTable::from_csv_reader(file)
        .with_context(|| format!("Could not read COP file {}", path.display()))
}

fn network_series(
    input: &Input,
    settings: &NetworkSettings,
    weather: &WeatherData,
    base_directory: Option<&Path>,
    output: &impl Output,
) -> anyhow::Result<DispatchSeries> {
    let cop_table = settings
        .cop_file
        .as_deref()
        .map(|path| load_cop_table(base_directory, path))
        .transpose()?;
    let conditions = preprocess(
        &settings.consumers,
        &weather.air_temperatures,
        &settings.supply_curve,
        &settings.preprocessing,
        cop_table.as_ref(),
    )?;

    let mut network = settings.topology.clone();
    let results = simulate_network(
        TreeSolver::default(),
        &mut network,
        &conditions,
        input.simulation_time.timestamps(input.first_timestamp()?),
        settings.control,
        settings.sizing.as_ref(),
    )?;
    if !output.is_noop() {
        let mut writer = output.writer_for_location_key(NETWORK_RESULTS_KEY)?;
        results.write_csv(&mut writer)?;
        writer.flush()?;
    }

    let step_hours = input.simulation_time.step_in_hours();
    let demand = results.generated_heat();
    let consumer_heat_mwh = power_series_to_mwh(&results.total_heat, step_hours);
    let generated_mwh = power_series_to_mwh(&demand, step_hours);
    let summary = NetworkSummary {
        generated_mwh,
        consumer_heat_mwh,
        heat_pump_electricity_mwh: power_series_to_mwh(&results.heat_pump_electricity, step_hours),
        losses_mwh: generated_mwh - consumer_heat_mwh,
        peak_generated_kw: max_or_zero(&demand),
    };

    let (supply_temperatures, return_temperatures) = match results
        .pumps
        .get(&PumpGroup::MainPlant)
        .and_then(|pumps| pumps.get(&0))
    {
        Some(main) => (main.flow_temperature.clone(), main.return_temperature.clone()),
        None => (
            conditions.supply_temperatures.clone(),
            mean_return_temperatures(&conditions),
        ),
    };

    Ok(DispatchSeries {
        demand,
        supply_temperatures,
        return_temperatures,
        network: Some(summary),
    })
}

fn mean_return_temperatures(conditions: &NetworkBoundaryConditions) -> Vec<f64> {
    (0..conditions.len())
        .map(|step| mean_or_zero(&conditions.step(step).return_temperatures))
        .collect()
}

fn standalone_series(input: &Input, weather: Option<&WeatherData>) -> anyhow::Result<DispatchSeries> {
    let demand = input
        .demand
        .clone()
        .ok_or_else(|| anyhow!("A project needs either a network or a demand series"))?;
    input
        .simulation_time
        .ensure_series_length("heat demand", &demand)?;
    let temperatures = input
        .temperatures
        .ok_or_else(|| anyhow!("A project without a network needs network temperatures"))?;

    let steps = demand.len();
    let supply_temperatures = match (weather, temperatures.supply_curve) {
        (Some(weather), curve) => curve.series(&weather.air_temperatures),
        (None, NetworkSupplyCurve::Static { supply_temperature }) => vec![supply_temperature; steps],
        (None, NetworkSupplyCurve::Sliding { .. }) => {
            bail!("A sliding supply temperature curve needs weather data")
        }
    };

    Ok(DispatchSeries {
        demand,
        supply_temperatures,
        return_temperatures: vec![temperatures.return_temperature; steps],
        network: None,
    })
}

fn write_summary(output: &impl Output, summary: &RunSummary) -> anyhow::Result<()> {
    let mut writer = output.writer_for_location_key(SUMMARY_KEY)?;
    serde_json::to_writer_pretty(&mut writer, summary)?;
    writer.flush()?;
    Ok(())
}
