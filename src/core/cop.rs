use crate::errors::{ensure_same_length, ShapeMismatchError};
use csv::ReaderBuilder as CsvReaderBuilder;
use interp::{interp, InterpMode};
use std::io::Read;
use thiserror::Error;

/// Maximum temperature lift a heat pump can achieve between source and supply, in K.
pub const MAX_TEMPERATURE_LIFT: f64 = 75.;

#[derive(Debug, Error)]
pub enum CopTableError {
    #[error("COP table could not be read: {0}")]
    Csv(#[from] csv::Error),
    #[error("COP table value '{value}' in row {row}, column {column} is not a number")]
    InvalidNumber {
        value: String,
        row: usize,
        column: usize,
    },
    #[error("COP table needs at least two source and two supply temperatures, got {sources} and {supplies}")]
    TooSmall { sources: usize, supplies: usize },
    #[error("COP table row {row} has {actual} values, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        actual: usize,
    },
    #[error("COP table axis '{axis}' must be strictly increasing")]
    UnsortedAxis { axis: &'static str },
}

/// Heat source temperature for a COP query: one value for the whole series, or one per step.
#[derive(Clone, Copy, Debug)]
pub enum SourceTemperature<'a> {
    Constant(f64),
    Series(&'a [f64]),
}

impl From<f64> for SourceTemperature<'_> {
    fn from(value: f64) -> Self {
        Self::Constant(value)
    }
}

impl<'a> From<&'a [f64]> for SourceTemperature<'a> {
    fn from(value: &'a [f64]) -> Self {
        Self::Series(value)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CopSeries {
    pub cop: Vec<f64>,
    /// supply temperatures after limiting to the maximum lift, deg C
    pub supply_temperatures: Vec<f64>,
}

/// Heat pump performance grid: COP by source temperature (rows) and supply temperature (columns).
///
/// Loaded once and shared read-only by every heat-pump generator in a run. Queries outside the
/// grid are held at the nearest edge value.
#[derive(Clone, Debug, PartialEq)]
pub struct CopTable {
    source_temperatures: Vec<f64>,
    supply_temperatures: Vec<f64>,
    values: Vec<Vec<f64>>,
}

impl CopTable {
    pub fn new(
        source_temperatures: Vec<f64>,
        supply_temperatures: Vec<f64>,
        values: Vec<Vec<f64>>,
    ) -> Result<Self, CopTableError> {
        if source_temperatures.len() < 2 || supply_temperatures.len() < 2 {
            return Err(CopTableError::TooSmall {
                sources: source_temperatures.len(),
                supplies: supply_temperatures.len(),
            });
        }
        if values.len() != source_temperatures.len() {
            return Err(CopTableError::RaggedRow {
                row: values.len(),
                expected: source_temperatures.len(),
                actual: values.len(),
            });
        }
        for (row, row_values) in values.iter().enumerate() {
            if row_values.len() != supply_temperatures.len() {
                return Err(CopTableError::RaggedRow {
                    row: row + 1,
                    expected: supply_temperatures.len(),
                    actual: row_values.len(),
                });
            }
        }
        if !is_strictly_increasing(&source_temperatures) {
            return Err(CopTableError::UnsortedAxis { axis: "source" });
        }
        if !is_strictly_increasing(&supply_temperatures) {
            return Err(CopTableError::UnsortedAxis { axis: "supply" });
        }

        Ok(Self {
            source_temperatures,
            supply_temperatures,
            values,
        })
    }

    /// Read a `;`-delimited grid: first row holds supply temperatures after a corner cell, first
    /// column holds source temperatures.
    pub fn from_csv_reader(file: impl Read) -> Result<Self, CopTableError> {
        let mut reader = CsvReaderBuilder::new()
            .delimiter(b';')
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(file);

        let mut rows: Vec<Vec<f64>> = vec![];
        for (row, record) in reader.records().enumerate() {
            let record = record?;
            let parsed = record
                .iter()
                .enumerate()
                .map(|(column, value)| {
                    // the corner cell is a label, not a number
                    if row == 0 && column == 0 {
                        return Ok(f64::NAN);
                    }
                    value
                        .replace(',', ".")
                        .parse::<f64>()
                        .map_err(|_| CopTableError::InvalidNumber {
                            value: value.to_string(),
                            row,
                            column,
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;
            rows.push(parsed);
        }

        let Some((header, body)) = rows.split_first() else {
            return Err(CopTableError::TooSmall {
                sources: 0,
                supplies: 0,
            });
        };
        let supply_temperatures = header.iter().skip(1).copied().collect::<Vec<_>>();
        let source_temperatures = body.iter().filter_map(|row| row.first().copied()).collect();
        let values = body
            .iter()
            .map(|row| row.iter().skip(1).copied().collect())
            .collect();

        Self::new(source_temperatures, supply_temperatures, values)
    }

    /// Bilinear interpolation of the grid at one operating point, held at the grid edges.
    pub fn cop_at(&self, source_temperature: f64, supply_temperature: f64) -> f64 {
        let supply = clamp_to_axis(supply_temperature, &self.supply_temperatures);
        let source = clamp_to_axis(source_temperature, &self.source_temperatures);

        let cop_by_source = self
            .values
            .iter()
            .map(|row| interp(&self.supply_temperatures, row, supply, &InterpMode::default()))
            .collect::<Vec<f64>>();

        interp(&self.source_temperatures, &cop_by_source, source, &InterpMode::default())
    }

    /// COP for every supply temperature sample, with supply limited to `source + 75 K`.
    pub fn interpolate<'a>(
        &self,
        supply_temperatures: &[f64],
        source_temperature: impl Into<SourceTemperature<'a>>,
    ) -> Result<CopSeries, ShapeMismatchError> {
        let source_temperature = source_temperature.into();
        if let SourceTemperature::Series(series) = source_temperature {
            ensure_same_length(
                "COP source temperatures",
                supply_temperatures.len(),
                series.len(),
            )?;
        }

        let (cop, supply_temperatures) = supply_temperatures
            .iter()
            .enumerate()
            .map(|(i, &supply)| {
                let source = match source_temperature {
                    SourceTemperature::Constant(value) => value,
                    SourceTemperature::Series(series) => series[i],
                };
                let supply = supply.min(source + MAX_TEMPERATURE_LIFT);
                (self.cop_at(source, supply), supply)
            })
            .unzip();

        Ok(CopSeries {
            cop,
            supply_temperatures,
        })
    }
}

fn clamp_to_axis(value: f64, axis: &[f64]) -> f64 {
    match (axis.first(), axis.last()) {
        (Some(&first), Some(&last)) => value.clamp(first, last),
        _ => value,
    }
}

fn is_strictly_increasing(axis: &[f64]) -> bool {
    axis.windows(2).all(|pair| pair[0] < pair[1])
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use rstest::*;

    const COP_FILE: &str = "QT/VLT;35;55;75;85
0;4.0;3.0;2.2;1.9
10;5.0;3.6;2.6;2.2
20;6.0;4.2;3.0;2.5
";

    pub(crate) fn sample_cop_table() -> CopTable {
        CopTable::from_csv_reader(COP_FILE.as_bytes()).unwrap()
    }

    #[fixture]
    pub(crate) fn cop_table() -> CopTable {
        sample_cop_table()
    }

    #[rstest]
    fn should_read_grid_axes_from_file(cop_table: CopTable) {
        assert_eq!(cop_table.supply_temperatures, vec![35., 55., 75., 85.]);
        assert_eq!(cop_table.source_temperatures, vec![0., 10., 20.]);
        assert_relative_eq!(cop_table.cop_at(10., 55.), 3.6, max_relative = 1e-12);
    }

    #[rstest]
    fn should_interpolate_bilinearly(cop_table: CopTable) {
        // midway between 0 and 10 deg C source, and 35 and 55 deg C supply
        let expected = (4.0 + 3.0 + 5.0 + 3.6) / 4.;
        assert_relative_eq!(cop_table.cop_at(5., 45.), expected, max_relative = 1e-12);
    }

    #[rstest]
    fn should_hold_edge_values_outside_grid(cop_table: CopTable) {
        assert_relative_eq!(cop_table.cop_at(-5., 30.), 4.0, max_relative = 1e-12);
        assert_relative_eq!(cop_table.cop_at(30., 95.), 2.5, max_relative = 1e-12);
    }

    #[rstest]
    fn should_limit_supply_temperature_to_maximum_lift(cop_table: CopTable) {
        let supply = [60., 85., 95.];
        let result = cop_table.interpolate(&supply, 5.).unwrap();

        assert_eq!(result.supply_temperatures, vec![60., 80., 80.]);
        for (effective, source) in result.supply_temperatures.iter().zip([5.; 3]) {
            assert!(*effective <= source + MAX_TEMPERATURE_LIFT);
        }
        assert_relative_eq!(result.cop[1], cop_table.cop_at(5., 80.));
    }

    #[rstest]
    fn should_accept_source_temperature_per_step(cop_table: CopTable) {
        let sources = [0., 20.];
        let result = cop_table.interpolate(&[35., 35.], &sources[..]).unwrap();
        assert_relative_eq!(result.cop[0], 4.0, max_relative = 1e-12);
        assert_relative_eq!(result.cop[1], 6.0, max_relative = 1e-12);
    }

    #[rstest]
    fn should_reject_source_series_of_wrong_length(cop_table: CopTable) {
        let sources = [0., 10., 20.];
        let error = cop_table.interpolate(&[35., 55.], &sources[..]).unwrap_err();
        assert_eq!(error, ShapeMismatchError::new("COP source temperatures", 2, 3));
    }

    #[rstest]
    fn should_reject_malformed_tables() {
        assert!(matches!(
            CopTable::from_csv_reader("x;35;55\n0;4.0;abc\n10;5;3\n".as_bytes()),
            Err(CopTableError::InvalidNumber { .. })
        ));
        assert!(matches!(
            CopTable::from_csv_reader("x;35;55\n0;4.0;3.0\n".as_bytes()),
            Err(CopTableError::TooSmall { .. })
        ));
        assert!(matches!(
            CopTable::from_csv_reader("x;55;35\n0;4.0;3.0\n10;5;3\n".as_bytes()),
            Err(CopTableError::UnsortedAxis { axis: "supply" })
        ));
    }
}
