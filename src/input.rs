use crate::core::economics::{EconomicParameters, Prices, DEFAULT_HOURLY_RATE};
use crate::core::heat_curve::NetworkSupplyCurve;
use crate::core::heat_generators::Generator;
use crate::core::network::NetworkSettings;
use crate::core::optimizer::OptimizationSettings;
use crate::read_weather_file::{weather_data_from_try, WeatherData};
use crate::simulation_time::SimulationTime;
use anyhow::{anyhow, Context};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

pub fn ingest_input(json: impl Read) -> anyhow::Result<Input> {
    serde_json::from_reader(BufReader::new(json)).context("Could not parse the project input")
}

/// A project: one generator mix dispatched against the heat demand of one network.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Input {
    #[serde(default = "SimulationTime::hourly_year")]
    pub simulation_time: SimulationTime,
    /// calendar year the first time step falls in, used for result timestamps
    #[serde(default = "default_start_year")]
    pub start_year: i32,
    #[serde(default)]
    pub economics: EconomicsInput,
    #[serde(default)]
    pub prices: Prices,
    /// generators in merit order
    pub generators: Vec<Generator>,
    #[serde(default)]
    pub optimization: OptimizationSettings,
    /// simulate a network and dispatch the generators against the heat its pumps feed in
    #[serde(default)]
    pub network: Option<NetworkSettings>,
    /// total heat demand, kW, when no network is simulated
    #[serde(default)]
    pub demand: Option<Vec<f64>>,
    /// network temperatures the generators see when no network is simulated
    #[serde(default)]
    pub temperatures: Option<TemperatureInput>,
    #[serde(default)]
    pub weather: Option<WeatherInput>,
    /// COP grid for the heat pump generators
    #[serde(default)]
    pub cop_file: Option<PathBuf>,
}

fn default_start_year() -> i32 {
    2021
}

impl Input {
    /// Timestamp of the first time step.
    pub fn first_timestamp(&self) -> anyhow::Result<NaiveDateTime> {
        NaiveDate::from_ymd_opt(self.start_year, 1, 1)
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .ok_or_else(|| anyhow!("Start year {} is out of range", self.start_year))
    }
}

/// Financial parameters as rates in percent.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct EconomicsInput {
    #[serde(default = "default_interest_rate")]
    pub interest_rate: f64,
    #[serde(default = "default_inflation_rate")]
    pub inflation_rate: f64,
    #[serde(default = "default_period_years")]
    pub period_years: u32,
    #[serde(default = "default_hourly_rate")]
    pub hourly_rate: f64,
    #[serde(default)]
    pub subsidy: bool,
}

fn default_interest_rate() -> f64 {
    5.
}

fn default_inflation_rate() -> f64 {
    3.
}

fn default_period_years() -> u32 {
    20
}

fn default_hourly_rate() -> f64 {
    DEFAULT_HOURLY_RATE
}

impl Default for EconomicsInput {
    fn default() -> Self {
        Self {
            interest_rate: default_interest_rate(),
            inflation_rate: default_inflation_rate(),
            period_years: default_period_years(),
            hourly_rate: default_hourly_rate(),
            subsidy: false,
        }
    }
}

impl From<EconomicsInput> for EconomicParameters {
    fn from(input: EconomicsInput) -> Self {
        EconomicParameters::from_rates(
            input.interest_rate,
            input.inflation_rate,
            input.period_years,
            input.hourly_rate,
        )
        .with_subsidy(input.subsidy)
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TemperatureInput {
    pub supply_curve: NetworkSupplyCurve,
    /// deg C
    pub return_temperature: f64,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum WeatherInput {
    /// DWD test reference year file
    TryFile(PathBuf),
    Inline(WeatherData),
}

impl WeatherInput {
    /// Load the weather, resolving file paths against `base_directory`.
    pub fn load(&self, base_directory: Option<&Path>) -> anyhow::Result<WeatherData> {
        match self {
            Self::TryFile(path) => {
                let path = resolve_path(base_directory, path);
                let file = File::open(&path)
                    .with_context(|| format!("Could not open weather file {}", path.display()))?;
                weather_data_from_try(file)
            }
            Self::Inline(weather) => Ok(weather.clone()),
        }
    }
}

/// Relative paths in the input are taken relative to the input file.
pub fn resolve_path(base_directory: Option<&Path>, path: &Path) -> PathBuf {
    match base_directory {
        Some(base) if path.is_relative() => base.join(path),
        _ => path.to_path_buf(),
    }
}
