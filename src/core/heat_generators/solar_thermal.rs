use crate::core::economics::{annuity, AnnualEnergy, Investment};
use crate::core::heat_generators::{
    DispatchContext, GeneratorOutput, HeatGenerator, SizingVariable,
};
use crate::core::units::{power_series_to_mwh, WATTS_PER_KILOWATT};
use crate::errors::ensure_same_length;
use crate::read_weather_file::WeatherData;
use serde::{Deserialize, Serialize};

const LIFETIME: u32 = 20;
const INSTALLATION_PERCENT: f64 = 0.5;
const INSPECTION_PERCENT: f64 = 1.;

/// Share of the investment the operator pays under the BEW subsidy.
pub(crate) const SUBSIDY_OWN_SHARE: f64 = 0.6;
/// BEW operating cost subsidy, EUR/MWh
pub(crate) const SUBSIDY_OPERATING_CREDIT: f64 = 10.;

/// Upper storage temperature, deg C
const MAX_STORAGE_TEMPERATURE: f64 = 90.;
/// Mean return temperature the storage discharges to, deg C
const MEAN_RETURN_TEMPERATURE: f64 = 53.4;
/// Volumetric heat capacity of water, kWh/(m3 K)
const WATER_HEAT_CAPACITY_KWH: f64 = 1.16;

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq, strum::Display)]
pub enum CollectorType {
    #[default]
    Flat,
    Vacuum,
}

/// Collector efficiency curve on the reference area.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CollectorParameters {
    pub optical_efficiency: f64,
    /// incidence angle modifier for diffuse irradiance
    pub diffuse_incidence_factor: f64,
    /// W/(m2 K)
    pub c1: f64,
    /// W/(m2 K2)
    pub c2: f64,
    /// reference area per m2 of gross area
    pub reference_area_ratio: f64,
}

impl CollectorType {
    /// EUR/m2 gross area
    pub fn specific_cost(&self) -> f64 {
        match self {
            Self::Flat => 430.,
            Self::Vacuum => 590.,
        }
    }

    pub fn parameters(&self) -> CollectorParameters {
        match self {
            Self::Flat => CollectorParameters {
                optical_efficiency: 0.763,
                diffuse_incidence_factor: 0.931,
                c1: 1.969,
                c2: 0.015,
                reference_area_ratio: 1.,
            },
            Self::Vacuum => CollectorParameters {
                optical_efficiency: 0.693,
                diffuse_incidence_factor: 0.951,
                c1: 0.583,
                c2: 0.003,
                reference_area_ratio: 4.5 / 4.94,
            },
        }
    }
}

/// Time series a solar yield model works on.
pub struct SolarYieldInput<'a> {
    /// load the plant may cover, kW
    pub load: &'a [f64],
    pub supply_temperatures: &'a [f64],
    pub return_temperatures: &'a [f64],
    pub weather: &'a WeatherData,
    pub step_hours: f64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SolarYield {
    /// heat delivered to the network, kW
    pub heat: Vec<f64>,
    pub storage_fill_percent: Vec<f64>,
}

/// Turns weather and load into the heat a collector field with its storage delivers.
pub trait SolarYieldModel {
    fn simulate(&self, plant: &SolarThermal, input: &SolarYieldInput) -> anyhow::Result<SolarYield>;
}

/// Efficiency curve on tilted irradiance with a fully mixed storage.
///
/// Direct irradiance is taken as it falls on the collector; diffuse irradiance is reduced by the
/// sky view factor of the tilted plane. The storage is charged by surplus yield up to its capacity
/// and loses heat to the ambient through its envelope.
#[derive(Clone, Copy, Debug, Default)]
pub struct SimpleSolarYield;

impl SimpleSolarYield {
    /// Collector output per time step, kW
    pub fn collector_output(plant: &SolarThermal, input: &SolarYieldInput) -> Vec<f64> {
        let parameters = plant.collector_type.parameters();
        let reference_area = plant.gross_area * parameters.reference_area_ratio;
        let sky_view = (1. + plant.tilt.to_radians().cos()) / 2.;
        let weather = input.weather;

        (0..input.load.len())
            .map(|t| {
                let beam = weather.direct_radiation[t];
                let diffuse = weather.diffuse_radiation[t] * sky_view;
                if beam + diffuse <= 0. {
                    return 0.;
                }
                let mean_collector_temperature =
                    (input.supply_temperatures[t] + input.return_temperatures[t]) / 2.;
                let excess = mean_collector_temperature - weather.air_temperatures[t];

                let specific = parameters.optical_efficiency
                    * (beam + parameters.diffuse_incidence_factor * diffuse)
                    - parameters.c1 * excess
                    - parameters.c2 * excess.powi(2);
                specific.max(0.) * reference_area / WATTS_PER_KILOWATT as f64
            })
            .collect()
    }

    /// Standing loss of a cylindrical storage at `fill_fraction`, kW
    fn storage_loss(volume: f64, fill_fraction: f64, air_temperature: f64) -> f64 {
        let storage_temperature = MEAN_RETURN_TEMPERATURE
            + (MAX_STORAGE_TEMPERATURE - MEAN_RETURN_TEMPERATURE) * fill_fraction;
        (0.75 * (volume * 1000.).sqrt() * 0.16 * (storage_temperature - air_temperature)
            / WATTS_PER_KILOWATT as f64)
            .max(0.)
    }
}

impl SolarYieldModel for SimpleSolarYield {
    fn simulate(&self, plant: &SolarThermal, input: &SolarYieldInput) -> anyhow::Result<SolarYield> {
        let steps = input.load.len();
        ensure_same_length("air temperatures", steps, input.weather.air_temperatures.len())?;
        ensure_same_length("direct radiation", steps, input.weather.direct_radiation.len())?;
        ensure_same_length("diffuse radiation", steps, input.weather.diffuse_radiation.len())?;

        let collector = Self::collector_output(plant, input);
        let capacity = plant.storage_capacity();
        let dt = input.step_hours;

        let mut stored = 0.;
        let mut heat = Vec::with_capacity(steps);
        let mut storage_fill_percent = Vec::with_capacity(steps);

        for t in 0..steps {
            let load = input.load[t].max(0.);
            let fill_fraction = if capacity > 0. { stored / capacity } else { 0. };
            let loss = Self::storage_loss(
                plant.storage_volume,
                fill_fraction,
                input.weather.air_temperatures[t],
            );
            stored = (stored - loss * dt).max(0.);

            let available = stored + collector[t] * dt;
            let delivered = load.min(available / dt);
            // surplus beyond the storage capacity is dumped
            stored = (available - delivered * dt).min(capacity);

            heat.push(delivered);
            storage_fill_percent.push(if capacity > 0. {
                stored / capacity * 100.
            } else {
                0.
            });
        }

        Ok(SolarYield {
            heat,
            storage_fill_percent,
        })
    }
}

/// Solar thermal collector field with a seasonal or buffer storage.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SolarThermal {
    #[serde(default)]
    pub name: String,
    /// m2
    pub gross_area: f64,
    /// m3
    #[serde(default)]
    pub storage_volume: f64,
    #[serde(default)]
    pub collector_type: CollectorType,
    /// collector tilt against the horizontal, deg
    #[serde(default = "default_tilt")]
    pub tilt: f64,
    /// EUR/m2, overrides the collector type's default
    #[serde(default)]
    pub specific_cost: Option<f64>,
    /// EUR/m3
    #[serde(default = "default_storage_specific_cost")]
    pub storage_specific_cost: f64,
}

fn default_tilt() -> f64 {
    36.
}

fn default_storage_specific_cost() -> f64 {
    750.
}

impl SolarThermal {
    pub fn new(name: &str, gross_area: f64, storage_volume: f64, collector_type: CollectorType) -> Self {
        Self {
            name: name.to_string(),
            gross_area,
            storage_volume,
            collector_type,
            tilt: default_tilt(),
            specific_cost: None,
            storage_specific_cost: default_storage_specific_cost(),
        }
    }

    /// Usable storage content, kWh
    pub fn storage_capacity(&self) -> f64 {
        WATER_HEAT_CAPACITY_KWH
            * self.storage_volume
            * (MAX_STORAGE_TEMPERATURE - MEAN_RETURN_TEMPERATURE)
    }

    fn investment(&self) -> f64 {
        self.specific_cost
            .unwrap_or(self.collector_type.specific_cost())
            * self.gross_area
            + self.storage_specific_cost * self.storage_volume
    }

    /// Dispatch with a solar yield model other than the built-in one.
    pub fn calculate_with(
        &self,
        model: &impl SolarYieldModel,
        residual_load: &[f64],
        context: &DispatchContext,
    ) -> anyhow::Result<GeneratorOutput> {
        if self.gross_area <= 0. {
            return Ok(GeneratorOutput::zero(residual_load.len(), "red"));
        }

        let input = SolarYieldInput {
            load: residual_load,
            supply_temperatures: context.supply_temperatures,
            return_temperatures: context.return_temperatures,
            weather: context.weather(&self.name)?,
            step_hours: context.step_hours,
        };
        let SolarYield {
            heat,
            storage_fill_percent,
        } = model.simulate(self, &input)?;
        let heat_energy = power_series_to_mwh(&heat, context.step_hours);

        Ok(GeneratorOutput {
            levelized_cost: subsidised_levelized_cost(
                Investment::new(self.investment(), LIFETIME, INSTALLATION_PERCENT, INSPECTION_PERCENT),
                heat_energy,
                context,
            ),
            electric_power: vec![0.; heat.len()],
            heat,
            heat_energy,
            storage_fill_percent: Some(storage_fill_percent),
            colour: "red",
            ..Default::default()
        })
    }
}

/// Levelized cost of an investment without running energy cost, with the BEW subsidy applied
/// when the economic parameters ask for it.
pub(crate) fn subsidised_levelized_cost(
    investment: Investment,
    energy: f64,
    context: &DispatchContext,
) -> f64 {
    if energy <= 0. {
        return 0.;
    }
    if context.economics.subsidy {
        let own_share = investment.with_capital(investment.capital * SUBSIDY_OWN_SHARE);
        annuity(&own_share, &AnnualEnergy::default(), &context.economics) / energy
            - SUBSIDY_OPERATING_CREDIT
    } else {
        annuity(&investment, &AnnualEnergy::default(), &context.economics) / energy
    }
}

impl HeatGenerator for SolarThermal {
    fn name(&self) -> &str {
        &self.name
    }

    fn calculate(
        &self,
        residual_load: &[f64],
        context: &DispatchContext,
    ) -> anyhow::Result<GeneratorOutput> {
        self.calculate_with(&SimpleSolarYield, residual_load, context)
    }

    fn sizing_variables(&self) -> Vec<SizingVariable> {
        vec![
            SizingVariable::new("gross_area", self.gross_area, 0., 2000.),
            SizingVariable::new("storage_volume", self.storage_volume, 0., 200.),
        ]
    }

    fn apply_sizing(&mut self, values: &[f64]) {
        if let [area, volume, ..] = values {
            self.gross_area = *area;
            self.storage_volume = *volume;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::cop::tests::sample_cop_table;
    use crate::core::economics::EconomicParameters;
    use crate::core::heat_generators::heat_pump::tests::context;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use rstest::*;

    /// Clear noon at 1000 W/m2 direct, dark otherwise.
    pub(crate) fn sunny_days(days: usize) -> WeatherData {
        let steps = days * 24;
        WeatherData {
            air_temperatures: vec![20.; steps],
            wind_speeds: vec![2.; steps],
            direct_radiation: (0..steps)
                .map(|t| if t % 24 == 12 { 1000. } else { 0. })
                .collect(),
            diffuse_radiation: vec![0.; steps],
        }
    }

    #[rstest]
    fn should_apply_collector_efficiency_curve() {
        let weather = sunny_days(1);
        let load = vec![0.; 24];
        let (supply, return_) = (vec![80.; 24], vec![40.; 24]);
        let input = SolarYieldInput {
            load: &load,
            supply_temperatures: &supply,
            return_temperatures: &return_,
            weather: &weather,
            step_hours: 1.,
        };
        let plant = SolarThermal::new("Solarthermie", 100., 0., CollectorType::Flat);

        let output = SimpleSolarYield::collector_output(&plant, &input);

        // mean collector temperature 60 deg C, 40 K above ambient
        let specific = 0.763 * 1000. - 1.969 * 40. - 0.015 * 1600.;
        assert_relative_eq!(output[12], specific * 100. / 1000., max_relative = 1e-12);
        assert_eq!(output[0], 0.);
    }

    #[rstest]
    fn should_shift_noon_yield_into_the_evening_through_storage() {
        let weather = sunny_days(2);
        let load = vec![10.; 48];
        let (supply, return_) = (vec![80.; 48], vec![40.; 48]);
        let table = sample_cop_table();
        let context = DispatchContext {
            weather: Some(&weather),
            ..context(&load, &supply, &return_, &table)
        };
        let plant = SolarThermal::new("Solarthermie", 500., 10., CollectorType::Flat);

        let output = plant.calculate(&load, &context).unwrap();

        assert_eq!(output.heat[11], 0.);
        assert_relative_eq!(output.heat[12], 10.);
        assert_relative_eq!(output.heat[13], 10.);
        let fill = output.storage_fill_percent.unwrap();
        assert!(fill[12] > 0.);
        assert!(fill.iter().all(|percent| (0.0..=100.).contains(percent)));
        assert!(output.heat.iter().zip(load.iter()).all(|(heat, load)| heat <= load));
        assert_eq!(output.colour, "red");
    }

    #[rstest]
    fn should_dump_yield_without_storage() {
        let weather = sunny_days(1);
        let load = vec![10.; 24];
        let (supply, return_) = (vec![80.; 24], vec![40.; 24]);
        let table = sample_cop_table();
        let context = DispatchContext {
            weather: Some(&weather),
            ..context(&load, &supply, &return_, &table)
        };
        let plant = SolarThermal::new("Solarthermie", 500., 0., CollectorType::Vacuum);

        let output = plant.calculate(&load, &context).unwrap();

        assert_relative_eq!(output.heat_energy, 0.01);
    }

    #[rstest]
    fn should_apply_subsidy_to_levelized_cost() {
        let weather = sunny_days(1);
        let load = vec![50.; 24];
        let (supply, return_) = (vec![80.; 24], vec![40.; 24]);
        let table = sample_cop_table();
        let plain = DispatchContext {
            weather: Some(&weather),
            ..context(&load, &supply, &return_, &table)
        };
        let subsidised = DispatchContext {
            economics: EconomicParameters::default().with_subsidy(true),
            ..plain
        };
        let plant = SolarThermal::new("Solarthermie", 100., 0., CollectorType::Flat);

        let without = plant.calculate(&load, &plain).unwrap();
        let with = plant.calculate(&load, &subsidised).unwrap();

        assert_relative_eq!(
            with.levelized_cost,
            without.levelized_cost * 0.6 - 10.,
            max_relative = 1e-9
        );
    }

    #[rstest]
    fn should_require_weather_data() {
        let load = [10.];
        let table = sample_cop_table();
        let context = context(&load, &[80.], &[40.], &table);
        assert!(SolarThermal::new("Solarthermie", 100., 0., CollectorType::Flat)
            .calculate(&load, &context)
            .is_err());
    }
}
