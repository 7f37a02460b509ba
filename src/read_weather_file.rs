use anyhow::{anyhow, bail, Context};
use serde::Deserialize;
use std::io::{BufRead, BufReader, Read};

// column positions in a DWD test reference year (TRY) data row:
// RW HW MM DD HH t p WR WG N x RF B D A E IL
const COLUMN_AIR_TEMP: usize = 5; // air temperature 2 m above ground, deg C
const COLUMN_WIND_SPEED: usize = 8; // wind speed, m/s
const COLUMN_DIRECT_RAD: usize = 12; // direct solar irradiance on horizontal plane, W/m2
const COLUMN_DIFFUSE_RAD: usize = 13; // diffuse solar irradiance on horizontal plane, W/m2
const MINIMUM_COLUMNS: usize = 17;

/// Marks the end of the TRY header block.
const HEADER_END_MARKER: &str = "***";

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct WeatherData {
    pub air_temperatures: Vec<f64>,
    pub wind_speeds: Vec<f64>,
    pub direct_radiation: Vec<f64>,
    pub diffuse_radiation: Vec<f64>,
}

impl WeatherData {
    pub fn len(&self) -> usize {
        self.air_temperatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.air_temperatures.is_empty()
    }

    /// Global horizontal irradiance, W/m2
    pub fn global_radiation(&self) -> Vec<f64> {
        self.direct_radiation
            .iter()
            .zip(self.diffuse_radiation.iter())
            .map(|(direct, diffuse)| direct + diffuse)
            .collect()
    }
}

/// Read a DWD test reference year file into hourly weather series.
pub fn weather_data_from_try(file: impl Read) -> anyhow::Result<WeatherData> {
    let reader = BufReader::new(file);
    let mut weather = WeatherData::default();
    let mut in_data = false;

    for (line_number, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Could not read line {}", line_number + 1))?;

        if !in_data {
            in_data = line.trim_start().starts_with(HEADER_END_MARKER);
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }

        let fields = line.split_whitespace().collect::<Vec<_>>();
        if fields.len() < MINIMUM_COLUMNS {
            bail!(
                "Weather file line {} has {} columns, expected {MINIMUM_COLUMNS}",
                line_number + 1,
                fields.len()
            );
        }
        let value = |column: usize| -> anyhow::Result<f64> {
            fields[column].parse::<f64>().map_err(|e| {
                anyhow!(
                    "Could not parse '{}' in line {} of weather file: {e}",
                    fields[column],
                    line_number + 1
                )
            })
        };

        weather.air_temperatures.push(value(COLUMN_AIR_TEMP)?);
        weather.wind_speeds.push(value(COLUMN_WIND_SPEED)?);
        weather.direct_radiation.push(value(COLUMN_DIRECT_RAD)?);
        weather.diffuse_radiation.push(value(COLUMN_DIFFUSE_RAD)?);
    }

    if weather.is_empty() {
        bail!("Weather file did not contain any data rows after the '{HEADER_END_MARKER}' header marker");
    }

    Ok(weather)
}
