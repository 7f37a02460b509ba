use crate::core::cop::CopSeries;
use crate::core::heat_generators::heat_pump::{
    electric_power, heat_pump_output, HeatPumpCosting, SourceTemperatureInput,
};
use crate::core::heat_generators::{
    capped_dispatch, DispatchContext, ElectricityRole, GeneratorOutput, HeatGenerator,
    SizingVariable,
};
use crate::core::solvers::bisect;
use crate::core::units::{power_series_to_mwh, HOURS_PER_YEAR, KILOWATTS_PER_MEGAWATT, WATTS_PER_KILOWATT};
use crate::errors::IterativeLoop;
use crate::statistics::max_or_zero;
use serde::{Deserialize, Serialize};
use tracing::debug;

const OPERATING_HOURS_TOLERANCE: f64 = 0.5;
const MAX_BISECTION_ITERATIONS: usize = 100;
const PROBE_LIFETIME: u32 = 30;

/// Ground-source heat pump on a field of borehole heat exchangers.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Geothermal {
    #[serde(default)]
    pub name: String,
    /// area available for the probe field, m2
    pub area: f64,
    /// m
    pub drilling_depth: f64,
    /// undisturbed ground temperature, deg C
    pub source_temperature: SourceTemperatureInput,
    /// EUR/m
    #[serde(default = "default_drilling_cost")]
    pub drilling_cost: f64,
    /// W/m at the nominal full-load hours
    #[serde(default = "default_specific_extraction")]
    pub specific_extraction: f64,
    /// full-load hours the specific extraction is rated for, h/a
    #[serde(default = "default_full_load_hours")]
    pub full_load_hours: f64,
    /// m
    #[serde(default = "default_probe_spacing")]
    pub probe_spacing: f64,
    #[serde(default = "default_heat_pump_specific_cost")]
    pub heat_pump_specific_cost: f64,
    #[serde(default = "default_min_part_load")]
    pub min_part_load: f64,
}

fn default_drilling_cost() -> f64 {
    100.
}

fn default_specific_extraction() -> f64 {
    50.
}

fn default_full_load_hours() -> f64 {
    2400.
}

fn default_probe_spacing() -> f64 {
    10.
}

fn default_heat_pump_specific_cost() -> f64 {
    1000.
}

fn default_min_part_load() -> f64 {
    0.2
}

/// Probe field derived from area and depth.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProbeField {
    pub probes: u32,
    /// extraction capacity at the nominal full-load hours, kW
    pub extraction_capacity: f64,
    /// heat the ground yields per year, MWh
    pub annual_extraction: f64,
    /// EUR
    pub investment: f64,
}

impl Geothermal {
    pub fn new(name: &str, area: f64, drilling_depth: f64, source_temperature: f64) -> Self {
        Self {
            name: name.to_string(),
            area,
            drilling_depth,
            source_temperature: SourceTemperatureInput::Constant(source_temperature),
            drilling_cost: default_drilling_cost(),
            specific_extraction: default_specific_extraction(),
            full_load_hours: default_full_load_hours(),
            probe_spacing: default_probe_spacing(),
            heat_pump_specific_cost: default_heat_pump_specific_cost(),
            min_part_load: default_min_part_load(),
        }
    }

    pub fn probe_field(&self) -> ProbeField {
        let per_side = (self.area.sqrt() / self.probe_spacing).round() as u32 + 1;
        let probes = per_side.pow(2);
        let extraction_capacity = self.drilling_depth * self.specific_extraction * probes as f64
            / WATTS_PER_KILOWATT as f64;

        ProbeField {
            probes,
            extraction_capacity,
            annual_extraction: extraction_capacity * self.full_load_hours
                / KILOWATTS_PER_MEGAWATT as f64,
            investment: self.drilling_depth * self.drilling_cost * probes as f64,
        }
    }
}

struct Operation {
    heat: Vec<f64>,
    /// heat taken from the ground, MWh
    extracted: f64,
}

impl HeatGenerator for Geothermal {
    fn name(&self) -> &str {
        &self.name
    }

    /// The extraction power the field sustains depends on the operating hours, which in turn
    /// depend on how much heat the heat pump can deliver at that power. Solved for the operating
    /// hours by bisection so that the heat extracted over the year matches the field's yield.
    fn calculate(
        &self,
        residual_load: &[f64],
        context: &DispatchContext,
    ) -> anyhow::Result<GeneratorOutput> {
        if self.area <= 0. || self.drilling_depth <= 0. {
            return Ok(GeneratorOutput::zero(residual_load.len(), "darkorange"));
        }

        let field = self.probe_field();
        let CopSeries { cop, .. } = context
            .cop_table(&self.name)?
            .interpolate(context.supply_temperatures, self.source_temperature.as_source())?;

        let operate = |operating_hours: f64| -> anyhow::Result<(f64, Operation)> {
            let extraction_power =
                field.annual_extraction * KILOWATTS_PER_MEGAWATT as f64 / operating_hours;
            let heat = capped_dispatch(
                residual_load,
                |t| extraction_power / (1. - 1. / cop[t]),
                self.min_part_load,
            );
            let extraction = heat
                .iter()
                .zip(cop.iter())
                .map(|(heat, cop)| heat * (1. - 1. / cop))
                .collect::<Vec<_>>();
            let extracted = power_series_to_mwh(&extraction, context.step_hours);

            Ok((
                extracted - field.annual_extraction,
                Operation { heat, extracted },
            ))
        };

        let solution = bisect(
            operate,
            1.,
            HOURS_PER_YEAR as f64,
            OPERATING_HOURS_TOLERANCE,
            MAX_BISECTION_ITERATIONS,
            IterativeLoop::GeothermalBisection,
        )?;
        debug!(
            "{}: {} probes, {:.1} operating hours after {} bisection steps, {:.2} of {:.2} MWh extracted",
            self.name,
            field.probes,
            solution.x,
            solution.iterations,
            solution.payload.extracted,
            field.annual_extraction
        );

        let heat = solution.payload.heat;
        let electric_power = electric_power(&heat, &cop);
        let peak_heat = max_or_zero(&heat);

        let costing = HeatPumpCosting {
            heat_pump_capacity: peak_heat,
            heat_pump_specific_cost: self.heat_pump_specific_cost,
            source_investment: if peak_heat > 0. { field.investment } else { 0. },
            source_lifetime: PROBE_LIFETIME,
        };

        Ok(heat_pump_output(
            heat,
            electric_power,
            costing,
            context,
            "darkorange",
        ))
    }

    fn sizing_variables(&self) -> Vec<SizingVariable> {
        vec![
            SizingVariable::new("area", self.area, 0., 5000.),
            SizingVariable::new("drilling_depth", self.drilling_depth, 0., 400.),
        ]
    }

    fn apply_sizing(&mut self, values: &[f64]) {
        if let [area, depth, ..] = values {
            self.area = *area;
            self.drilling_depth = *depth;
        }
    }

    fn electricity_role(&self) -> ElectricityRole {
        ElectricityRole::Consumer
    }
}
