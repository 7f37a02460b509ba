use crate::core::network::graph::{NetworkGraph, PumpGroup};
use crate::core::units::ZERO_CELSIUS_IN_KELVIN;
use crate::errors::{ensure_same_length, ResultsCsvError};
use chrono::NaiveDateTime;
use csv::{ReaderBuilder, WriterBuilder};
use indexmap::IndexMap;
use serde::Serialize;
use std::io::{Read, Write};
use strum::IntoEnumIterator;
use tracing::warn;

/// kJ/(kg K), as used for the plant heat balance in results files
const CP_KJ_PER_KG_K: f64 = 4.2;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const TIME_COLUMN: &str = "Zeit";
const TOTAL_HEAT_COLUMN: &str = "Gesamtwärmebedarf_Gebäude_kW";
const TOTAL_LOAD_COLUMN: &str = "Gesamtheizlast_Gebäude_kW";
const HEAT_PUMP_ELECTRICITY_COLUMN: &str = "Gesamtstrombedarf_Wärmepumpen_Gebäude_kW";

#[derive(Clone, Copy, Debug, PartialEq, strum::EnumIter, strum::EnumString, strum::IntoStaticStr)]
enum PumpQuantity {
    #[strum(serialize = "Wärmeerzeugung")]
    Heat,
    #[strum(serialize = "Massenstrom")]
    MassFlow,
    #[strum(serialize = "Delta p")]
    PressureDifference,
    #[strum(serialize = "Vorlauftemperatur")]
    FlowTemperature,
    #[strum(serialize = "Rücklauftemperatur")]
    ReturnTemperature,
    #[strum(serialize = "Vorlaufdruck")]
    FlowPressure,
    #[strum(serialize = "Rücklaufdruck")]
    ReturnPressure,
}

impl PumpQuantity {
    fn unit(self) -> &'static str {
        match self {
            Self::Heat => "kW",
            Self::MassFlow => "kg/s",
            Self::PressureDifference | Self::FlowPressure | Self::ReturnPressure => "bar",
            Self::FlowTemperature | Self::ReturnTemperature => "°C",
        }
    }

    fn column(self, group: PumpGroup, index: usize) -> String {
        let label: &'static str = self.into();
        format!("{label}_{group}_{}_{}", index + 1, self.unit())
    }
}

/// Time series of one pump.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PumpSeries {
    /// kW
    pub heat: Vec<f64>,
    /// kg/s
    pub mass_flow: Vec<f64>,
    /// bar
    pub pressure_difference: Vec<f64>,
    /// deg C
    pub flow_temperature: Vec<f64>,
    /// deg C
    pub return_temperature: Vec<f64>,
    /// bar
    pub flow_pressure: Vec<f64>,
    /// bar
    pub return_pressure: Vec<f64>,
}

impl PumpSeries {
    fn series(&self, quantity: PumpQuantity) -> &Vec<f64> {
        match quantity {
            PumpQuantity::Heat => &self.heat,
            PumpQuantity::MassFlow => &self.mass_flow,
            PumpQuantity::PressureDifference => &self.pressure_difference,
            PumpQuantity::FlowTemperature => &self.flow_temperature,
            PumpQuantity::ReturnTemperature => &self.return_temperature,
            PumpQuantity::FlowPressure => &self.flow_pressure,
            PumpQuantity::ReturnPressure => &self.return_pressure,
        }
    }

    fn series_mut(&mut self, quantity: PumpQuantity) -> &mut Vec<f64> {
        match quantity {
            PumpQuantity::Heat => &mut self.heat,
            PumpQuantity::MassFlow => &mut self.mass_flow,
            PumpQuantity::PressureDifference => &mut self.pressure_difference,
            PumpQuantity::FlowTemperature => &mut self.flow_temperature,
            PumpQuantity::ReturnTemperature => &mut self.return_temperature,
            PumpQuantity::FlowPressure => &mut self.flow_pressure,
            PumpQuantity::ReturnPressure => &mut self.return_pressure,
        }
    }
}

pub type PumpResults = IndexMap<PumpGroup, IndexMap<usize, PumpSeries>>;

/// Results of a network time series simulation as written to and read from results files.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NetworkResults {
    pub timestamps: Vec<NaiveDateTime>,
    /// heat drawn from the network by all consumers, kW
    pub total_heat: Vec<f64>,
    /// electricity of all building heat pumps, kW
    pub heat_pump_electricity: Vec<f64>,
    pub pumps: PumpResults,
}

impl NetworkResults {
    pub fn new(timestamps: Vec<NaiveDateTime>, total_heat: Vec<f64>, heat_pump_electricity: Vec<f64>) -> Self {
        Self {
            timestamps,
            total_heat,
            heat_pump_electricity,
            pumps: Default::default(),
        }
    }

    /// Append the current state of every pump. Pumps are numbered in order within their group.
    pub fn record_pumps(&mut self, network: &NetworkGraph) {
        let mut counts = IndexMap::<PumpGroup, usize>::new();
        for pump in &network.pumps {
            let index = counts.entry(pump.group).or_default();
            let series = self
                .pumps
                .entry(pump.group)
                .or_default()
                .entry(*index)
                .or_default();
            *index += 1;

            let flow = &network.junctions[pump.flow_junction];
            let return_ = &network.junctions[pump.return_junction];
            let flow_temperature = flow.temperature - ZERO_CELSIUS_IN_KELVIN;
            let return_temperature = return_.temperature - ZERO_CELSIUS_IN_KELVIN;

            series.heat.push(
                pump.result.mass_flow * CP_KJ_PER_KG_K * (flow_temperature - return_temperature),
            );
            series.mass_flow.push(pump.result.mass_flow);
            series.pressure_difference.push(pump.result.pressure_difference);
            series.flow_temperature.push(flow_temperature);
            series.return_temperature.push(return_temperature);
            series.flow_pressure.push(flow.pressure);
            series.return_pressure.push(return_.pressure);
        }
    }

    /// Heat fed in by all pumps per time step, kW
    pub fn generated_heat(&self) -> Vec<f64> {
        let mut total = vec![0.; self.timestamps.len()];
        for series in self.pumps.values().flat_map(|pumps| pumps.values()) {
            total
                .iter_mut()
                .zip(&series.heat)
                .for_each(|(total, heat)| *total += heat);
        }
        total
    }

    pub fn write_csv(&self, writer: impl Write) -> Result<(), ResultsCsvError> {
        let mut writer = WriterBuilder::new().delimiter(b';').from_writer(writer);

        let mut header = vec![
            TIME_COLUMN.to_string(),
            TOTAL_HEAT_COLUMN.to_string(),
            TOTAL_LOAD_COLUMN.to_string(),
            HEAT_PUMP_ELECTRICITY_COLUMN.to_string(),
        ];
        let mut columns = vec![];
        for (&group, pumps) in &self.pumps {
            for (&index, series) in pumps {
                for quantity in PumpQuantity::iter() {
                    header.push(quantity.column(group, index));
                    columns.push(series.series(quantity));
                }
            }
        }
        let rows = self.timestamps.len();
        ensure_same_length(TOTAL_HEAT_COLUMN, rows, self.total_heat.len())?;
        ensure_same_length(HEAT_PUMP_ELECTRICITY_COLUMN, rows, self.heat_pump_electricity.len())?;
        for (name, column) in header[4..].iter().zip(&columns) {
            ensure_same_length(name, rows, column.len())?;
        }
        writer.write_record(&header)?;

        for (row, timestamp) in self.timestamps.iter().enumerate() {
            let heat = self.total_heat[row];
            let electricity = self.heat_pump_electricity[row];
            let mut record = vec![
                timestamp.format(TIMESTAMP_FORMAT).to_string(),
                heat.to_string(),
                (heat + electricity).to_string(),
                electricity.to_string(),
            ];
            record.extend(columns.iter().map(|column| column[row].to_string()));
            writer.write_record(&record)?;
        }
        writer.flush().map_err(csv::Error::from)?;

        Ok(())
    }

    pub fn read_csv(reader: impl Read) -> Result<Self, ResultsCsvError> {
        let mut reader = ReaderBuilder::new().delimiter(b';').from_reader(reader);
        let headers = reader.headers()?.clone();
        let position = |name: &str| {
            headers
                .iter()
                .position(|header| header == name)
                .ok_or_else(|| ResultsCsvError::MissingColumn(name.to_string()))
        };
        let time_column = position(TIME_COLUMN)?;
        let heat_column = position(TOTAL_HEAT_COLUMN)?;
        let electricity_column = position(HEAT_PUMP_ELECTRICITY_COLUMN)?;

        let mut pump_columns = vec![];
        for (column, header) in headers.iter().enumerate() {
            if [TIME_COLUMN, TOTAL_HEAT_COLUMN, TOTAL_LOAD_COLUMN, HEAT_PUMP_ELECTRICITY_COLUMN]
                .contains(&header)
            {
                continue;
            }
            match parse_pump_column(header) {
                Some(key) => pump_columns.push((column, key)),
                None => warn!("Ignoring results column '{header}' with unexpected format"),
            }
        }

        let mut results = Self::default();
        for (row, record) in reader.records().enumerate() {
            let record = record?;
            let field = |column: usize| record.get(column).unwrap_or_default();
            let number = |column: usize| {
                let value = field(column);
                value.parse::<f64>().map_err(|_| ResultsCsvError::InvalidNumber {
                    column: headers.get(column).unwrap_or_default().to_string(),
                    row,
                    value: value.to_string(),
                })
            };

            let timestamp = NaiveDateTime::parse_from_str(field(time_column), TIMESTAMP_FORMAT)
                .map_err(|_| ResultsCsvError::InvalidTimestamp {
                    row,
                    value: field(time_column).to_string(),
                })?;
            results.timestamps.push(timestamp);
            results.total_heat.push(number(heat_column)?);
            results.heat_pump_electricity.push(number(electricity_column)?);

            for &(column, (group, index, quantity)) in &pump_columns {
                let value = number(column)?;
                results
                    .pumps
                    .entry(group)
                    .or_default()
                    .entry(index)
                    .or_default()
                    .series_mut(quantity)
                    .push(value);
            }
        }

        Ok(results)
    }
}

/// Split `{quantity}_{group}_{n}_{unit}` into its parts, with `n` counted from one.
fn parse_pump_column(header: &str) -> Option<(PumpGroup, usize, PumpQuantity)> {
    let mut parts = header.splitn(4, '_');
    let quantity = parts.next()?.parse::<PumpQuantity>().ok()?;
    let group = parts.next()?.parse::<PumpGroup>().ok()?;
    let number = parts.next()?.parse::<usize>().ok()?;
    let unit = parts.next()?;
    if number == 0 || unit != quantity.unit() {
        return None;
    }
    Some((group, number - 1, quantity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::network::graph::tests::network;
    use crate::core::network::solver::{HydraulicSolver, TreeSolver};
    use approx::assert_relative_eq;
    use chrono::{NaiveDate, TimeDelta};
    use pretty_assertions::assert_eq;
    use rstest::*;

    fn timestamps(count: usize) -> Vec<NaiveDateTime> {
        let start = NaiveDate::from_ymd_opt(2023, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        (0..count)
            .map(|hour| start + TimeDelta::hours(hour as i64))
            .collect()
    }

    #[fixture]
    fn results() -> NetworkResults {
        let mut results = NetworkResults::new(
            timestamps(3),
            vec![120.5, 0.1 + 0.2, 98.765_432_1],
            vec![0., 1. / 3., 12.],
        );
        for (group, offset) in [(PumpGroup::MainPlant, 0.), (PumpGroup::Secondary, 0.5)] {
            let series = PumpSeries {
                heat: vec![121. + offset, 0.3, 99.1],
                mass_flow: vec![1.234_567_890_123, 0.001, 0.8],
                pressure_difference: vec![1.5, 1.45, 1.4 + offset],
                flow_temperature: vec![85., 84.999_999, 85.],
                return_temperature: vec![55.2, 60.1, 57.3],
                flow_pressure: vec![4., 4.1, 3.9],
                return_pressure: vec![2.5, 2.65, 2.5],
            };
            results.pumps.entry(group).or_default().insert(0, series);
        }
        results
    }

    #[rstest]
    fn should_write_expected_header(results: NetworkResults) {
        let mut buffer = vec![];
        results.write_csv(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let header = text.lines().next().unwrap();

        assert!(header.starts_with(
            "Zeit;Gesamtwärmebedarf_Gebäude_kW;Gesamtheizlast_Gebäude_kW;Gesamtstrombedarf_Wärmepumpen_Gebäude_kW;\
             Wärmeerzeugung_Heizentrale Haupteinspeisung_1_kW;Massenstrom_Heizentrale Haupteinspeisung_1_kg/s;\
             Delta p_Heizentrale Haupteinspeisung_1_bar;Vorlauftemperatur_Heizentrale Haupteinspeisung_1_°C;"
        ));
        assert!(header.ends_with("Rücklaufdruck_weitere Einspeisung_1_bar"));
        assert!(text.lines().nth(1).unwrap().starts_with("2023-01-01 00:00:00;120.5;120.5;0;"));
    }

    #[rstest]
    fn should_reject_columns_shorter_than_timestamps(mut results: NetworkResults) {
        results.pumps[&PumpGroup::Secondary][&0].return_pressure.pop();
        let mut buffer = vec![];

        let error = results.write_csv(&mut buffer).unwrap_err();

        assert!(matches!(error, ResultsCsvError::ShapeMismatch(_)));
        assert!(buffer.is_empty());
    }

    #[rstest]
    fn should_reproduce_series_after_writing_and_reading(results: NetworkResults) {
        let mut buffer = vec![];
        results.write_csv(&mut buffer).unwrap();

        let imported = NetworkResults::read_csv(buffer.as_slice()).unwrap();

        assert_eq!(imported, results);
    }

    #[rstest]
    fn should_ignore_unknown_columns() {
        let csv = "Zeit;Gesamtwärmebedarf_Gebäude_kW;Gesamtstrombedarf_Wärmepumpen_Gebäude_kW;Bemerkung;Massenstrom_weitere Einspeisung_2_kg/s
2023-01-01 00:00:00;10;0;Test;0.5
";

        let imported = NetworkResults::read_csv(csv.as_bytes()).unwrap();

        assert_eq!(imported.total_heat, vec![10.]);
        assert_eq!(imported.pumps[&PumpGroup::Secondary][&1].mass_flow, vec![0.5]);
    }

    #[rstest]
    #[case("Zeit;Gesamtwärmebedarf_Gebäude_kW\n2023-01-01 00:00:00;10\n")]
    #[case("Zeit;Gesamtwärmebedarf_Gebäude_kW;Gesamtstrombedarf_Wärmepumpen_Gebäude_kW\n01.01.2023;10;0\n")]
    #[case("Zeit;Gesamtwärmebedarf_Gebäude_kW;Gesamtstrombedarf_Wärmepumpen_Gebäude_kW\n2023-01-01 00:00:00;zehn;0\n")]
    fn should_reject_malformed_results(#[case] csv: &str) {
        assert!(NetworkResults::read_csv(csv.as_bytes()).is_err());
    }

    #[rstest]
    fn should_record_plant_heat_from_pump_state(mut network: NetworkGraph) {
        TreeSolver::default().solve(&mut network).unwrap();
        let mut results = NetworkResults::new(timestamps(1), vec![90.], vec![0.]);

        results.record_pumps(&network);

        let series = &results.pumps[&PumpGroup::MainPlant][&0];
        let expected = 0.75
            * 4.2
            * (network.junctions[0].temperature - network.junctions[5].temperature);
        assert_relative_eq!(series.heat[0], expected, max_relative = 1e-12);
        assert_eq!(series.pressure_difference, vec![1.5]);
        assert_eq!(results.generated_heat(), series.heat);
    }
}
