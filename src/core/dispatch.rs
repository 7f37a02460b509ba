use crate::core::heat_generators::{
    DispatchContext, ElectricityRole, Generator, GeneratorKind, GeneratorOutput,
};
use crate::core::units::power_series_to_mwh;
use crate::errors::ensure_same_length;
use anyhow::Context;
use serde::Serialize;
use tracing::{debug, info};

/// What one generator contributed to the mix.
#[derive(Clone, Debug, Serialize)]
pub struct GeneratorResult {
    /// position in the merit order as given
    pub index: usize,
    pub name: String,
    pub kind: GeneratorKind,
    /// share of the annual heat demand
    pub share: f64,
    #[serde(flatten)]
    pub output: GeneratorOutput,
}

/// Aggregate result of dispatching a merit order against a demand series.
#[derive(Clone, Debug, Default, Serialize)]
pub struct DispatchResult {
    /// MWh
    pub annual_demand: f64,
    /// demand left uncovered after every generator, MWh
    pub residual_demand: f64,
    /// kW
    pub residual_load: Vec<f64>,
    /// demand-weighted levelized cost of heat, EUR/MWh
    pub levelized_cost: f64,
    /// t CO2 per MWh of demand
    pub specific_co2: f64,
    /// primary energy per MWh of demand
    pub primary_energy_factor: f64,
    /// electricity drawn by heat pumps, MWh
    pub electricity_demand: f64,
    /// electricity produced by CHP and PV, MWh
    pub electricity_generation: f64,
    /// kW
    pub electricity_demand_series: Vec<f64>,
    /// kW
    pub electricity_generation_series: Vec<f64>,
    /// generation minus demand, kW
    pub net_electricity_series: Vec<f64>,
    pub generators: Vec<GeneratorResult>,
    /// merit order positions of generators that produced nothing
    pub removed: Vec<usize>,
}

impl DispatchResult {
    fn new(demand: &[f64], step_hours: f64) -> Self {
        let annual_demand = power_series_to_mwh(demand, step_hours);
        let steps = demand.len();
        Self {
            annual_demand,
            residual_demand: annual_demand,
            residual_load: demand.to_vec(),
            electricity_demand_series: vec![0.; steps],
            electricity_generation_series: vec![0.; steps],
            net_electricity_series: vec![0.; steps],
            ..Default::default()
        }
    }

    fn per_demand(&self, value: f64) -> f64 {
        if self.annual_demand > 0. {
            value / self.annual_demand
        } else {
            0.
        }
    }

    fn accumulate(
        mut self,
        index: usize,
        generator: &Generator,
        output: GeneratorOutput,
        role: ElectricityRole,
    ) -> Self {
        let name = generator.display_name();
        if !output.has_output() {
            info!("{name} has no output and is removed from the mix");
            self.removed.push(index);
            return self;
        }

        for (residual, heat) in self.residual_load.iter_mut().zip(output.heat.iter()) {
            *residual = (*residual - heat).max(0.);
        }
        self.residual_demand -= output.heat_energy;
        self.levelized_cost += self.per_demand(output.heat_energy * output.levelized_cost);
        self.specific_co2 += self.per_demand(output.heat_energy * output.specific_co2);
        self.primary_energy_factor += self.per_demand(output.primary_energy);

        match role {
            ElectricityRole::Producer => {
                self.electricity_generation += output.electricity_energy;
                for (t, power) in output.electric_power.iter().enumerate() {
                    self.electricity_generation_series[t] += power;
                    self.net_electricity_series[t] += power;
                }
            }
            ElectricityRole::Consumer => {
                self.electricity_demand += output.electricity_energy;
                for (t, power) in output.electric_power.iter().enumerate() {
                    self.electricity_demand_series[t] += power;
                    self.net_electricity_series[t] -= power;
                }
            }
            ElectricityRole::None => {}
        }

        debug!(
            "{name}: {:.2} MWh heat at {:.2} EUR/MWh, residual demand {:.2} MWh",
            output.heat_energy, output.levelized_cost, self.residual_demand
        );

        self.generators.push(GeneratorResult {
            index,
            name,
            kind: generator.kind(),
            share: self.per_demand(output.heat_energy),
            output,
        });
        self
    }

    /// Drop the generators this dispatch found without output from the merit order.
    pub fn retain_active(&self, generators: &mut Vec<Generator>) {
        let mut index = 0;
        generators.retain(|_| {
            let keep = !self.removed.contains(&index);
            index += 1;
            keep
        });
    }

    /// Total delivered heat of all generators per step, kW
    pub fn delivered_heat(&self) -> Vec<f64> {
        let mut delivered = vec![0.; self.residual_load.len()];
        for result in &self.generators {
            for (total, heat) in delivered.iter_mut().zip(result.output.heat.iter()) {
                *total += heat;
            }
        }
        delivered
    }
}

/// Dispatch `generators` in the given merit order. Each generator sees the load its
/// predecessors left uncovered.
pub fn dispatch(
    generators: &[Generator],
    context: &DispatchContext,
) -> anyhow::Result<DispatchResult> {
    let steps = context.demand.len();
    ensure_same_length("supply temperatures", steps, context.supply_temperatures.len())?;
    ensure_same_length("return temperatures", steps, context.return_temperatures.len())?;

    generators.iter().enumerate().try_fold(
        DispatchResult::new(context.demand, context.step_hours),
        |result, (index, generator)| -> anyhow::Result<DispatchResult> {
            let heat_generator = generator.as_heat_generator();
            let output = heat_generator
                .calculate(&result.residual_load, context)
                .with_context(|| format!("Dispatch of {} failed", generator.display_name()))?;
            ensure_same_length("generator heat output", steps, output.heat.len())?;
            Ok(result.accumulate(index, generator, output, heat_generator.electricity_role()))
        },
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::cop::tests::cop_table;
    use crate::core::cop::CopTable;
    use crate::core::heat_generators::biomass_boiler::BiomassBoiler;
    use crate::core::heat_generators::chp::{Chp, ChpFuel};
    use crate::core::heat_generators::gas_boiler::GasBoiler;
    use crate::core::heat_generators::heat_pump::tests::context;
    use crate::core::heat_generators::heat_pump::RiverHeatPump;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use rstest::*;

    /// Winter-heavy demand between 40 and 360 kW.
    pub(crate) fn seasonal_demand(steps: usize) -> Vec<f64> {
        (0..steps)
            .map(|t| {
                let phase = 2. * std::f64::consts::PI * t as f64 / steps as f64;
                200. + 160. * phase.cos()
            })
            .collect()
    }

    pub(crate) fn merit_order() -> Vec<Generator> {
        vec![
            Generator::RiverHeatPump(RiverHeatPump::new("Flusswasser", 80., 10.)),
            Generator::Chp(Chp::new("BHKW", 100., ChpFuel::NaturalGas)),
            Generator::BiomassBoiler(BiomassBoiler::new("Biomassekessel", 120.)),
            Generator::GasBoiler(GasBoiler::new("Gaskessel")),
        ]
    }

    #[rstest]
    fn should_cover_constant_load_with_gas_boiler(cop_table: CopTable) {
        let demand = vec![100.; 8760];
        let (supply, return_) = (vec![80.; 8760], vec![50.; 8760]);
        let context = context(&demand, &supply, &return_, &cop_table);
        let generators = vec![Generator::GasBoiler(GasBoiler::new("Gaskessel"))];

        let result = dispatch(&generators, &context).unwrap();

        assert_relative_eq!(result.annual_demand, 876., max_relative = 1e-12);
        assert_relative_eq!(result.generators[0].output.heat_energy, 876., max_relative = 1e-12);
        assert_relative_eq!(result.generators[0].share, 1., max_relative = 1e-12);
        assert_relative_eq!(
            result.levelized_cost,
            result.generators[0].output.levelized_cost,
            max_relative = 1e-12
        );
        assert_relative_eq!(result.residual_demand, 0., epsilon = 1e-9);
    }

    #[rstest]
    fn should_only_ever_reduce_residual_load(cop_table: CopTable) {
        let demand = seasonal_demand(240);
        let (supply, return_) = (vec![75.; 240], vec![50.; 240]);
        let context = context(&demand, &supply, &return_, &cop_table);
        let generators = merit_order();

        let mut previous = demand.clone();
        for end in 1..=generators.len() {
            let result = dispatch(&generators[..end], &context).unwrap();
            for (after, before) in result.residual_load.iter().zip(previous.iter()) {
                assert!(after <= before);
            }
            previous = result.residual_load;
        }
    }

    #[rstest]
    fn should_conserve_energy_when_capacity_covers_peak(cop_table: CopTable) {
        let demand = seasonal_demand(240);
        let (supply, return_) = (vec![75.; 240], vec![50.; 240]);
        let context = context(&demand, &supply, &return_, &cop_table);

        let result = dispatch(&merit_order(), &context).unwrap();

        let delivered = result.delivered_heat();
        for (heat, demand) in delivered.iter().zip(demand.iter()) {
            assert_relative_eq!(*heat, *demand, max_relative = 1e-9);
        }
        let total = result
            .generators
            .iter()
            .map(|result| result.output.heat_energy)
            .sum::<f64>();
        assert_relative_eq!(total, result.annual_demand, max_relative = 1e-9);
        assert_relative_eq!(
            result.generators.iter().map(|result| result.share).sum::<f64>(),
            1.,
            max_relative = 1e-9
        );
    }

    #[rstest]
    fn should_split_heat_by_merit_order(cop_table: CopTable) {
        let demand = seasonal_demand(240);
        let (supply, return_) = (vec![75.; 240], vec![50.; 240]);
        let context = context(&demand, &supply, &return_, &cop_table);
        let forward = merit_order();
        let mut reordered = merit_order();
        reordered.swap(0, 2);

        let first = dispatch(&forward, &context).unwrap();
        let second = dispatch(&reordered, &context).unwrap();

        let heat_of = |result: &DispatchResult, name: &str| {
            result
                .generators
                .iter()
                .find(|generator| generator.name == name)
                .map(|generator| generator.output.heat_energy)
                .unwrap()
        };
        assert!(heat_of(&second, "Biomassekessel") > heat_of(&first, "Biomassekessel"));
        assert!(heat_of(&second, "Flusswasser") < heat_of(&first, "Flusswasser"));

        let total = |result: &DispatchResult| {
            result
                .generators
                .iter()
                .map(|generator| generator.output.heat_energy)
                .sum::<f64>()
        };
        assert_relative_eq!(total(&first), total(&second), max_relative = 1e-9);
    }

    #[rstest]
    fn should_keep_separate_electricity_ledgers(cop_table: CopTable) {
        let demand = seasonal_demand(240);
        let (supply, return_) = (vec![75.; 240], vec![50.; 240]);
        let context = context(&demand, &supply, &return_, &cop_table);

        let result = dispatch(&merit_order(), &context).unwrap();

        let heat_pump = &result.generators[0].output;
        let chp = &result.generators[1].output;
        assert_relative_eq!(result.electricity_demand, heat_pump.electricity_energy);
        assert_relative_eq!(result.electricity_generation, chp.electricity_energy);
        assert_relative_eq!(
            result.net_electricity_series[0],
            chp.electric_power[0] - heat_pump.electric_power[0],
            max_relative = 1e-12
        );
    }

    #[rstest]
    fn should_remove_generators_without_output(cop_table: CopTable) {
        let demand = vec![50.; 24];
        let (supply, return_) = (vec![75.; 24], vec![50.; 24]);
        let context = context(&demand, &supply, &return_, &cop_table);
        // the CHP cannot run below 70 kW
        let mut generators = vec![
            Generator::Chp(Chp::new("BHKW", 100., ChpFuel::NaturalGas)),
            Generator::GasBoiler(GasBoiler::new("Gaskessel")),
        ];

        let result = dispatch(&generators, &context).unwrap();
        assert_eq!(result.removed, vec![0]);
        assert_eq!(result.generators.len(), 1);
        assert_eq!(result.generators[0].index, 1);

        result.retain_active(&mut generators);
        assert_eq!(
            generators.iter().map(Generator::kind).collect::<Vec<_>>(),
            vec![GeneratorKind::GasBoiler]
        );
    }

    #[rstest]
    fn should_reject_mismatched_temperature_series(cop_table: CopTable) {
        let demand = vec![50.; 24];
        let (supply, return_) = (vec![75.; 23], vec![50.; 24]);
        let context = context(&demand, &supply, &return_, &cop_table);

        assert!(dispatch(&merit_order(), &context).is_err());
    }
}
