use crate::core::dispatch::{dispatch, DispatchResult};
use crate::core::heat_generators::{DispatchContext, Generator, SizingVariable};
use crate::errors::{IterativeLoop, NotConvergedError};
use argmin::core::{
    CostFunction, Error, Executor, State, TerminationReason, TerminationStatus,
};
use argmin::solver::neldermead::NelderMead;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Objective value given to parameter sets the dispatch cannot evaluate.
const PENALTY: f64 = 1e12;
/// Relative size of the initial simplex edges against each variable's range.
const INITIAL_STEP_FRACTION: f64 = 0.05;

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ObjectiveWeights {
    #[serde(default = "default_cost_weight")]
    pub cost: f64,
    #[serde(default)]
    pub co2: f64,
    #[serde(default)]
    pub primary_energy: f64,
}

fn default_cost_weight() -> f64 {
    1.
}

impl Default for ObjectiveWeights {
    fn default() -> Self {
        Self {
            cost: default_cost_weight(),
            co2: 0.,
            primary_energy: 0.,
        }
    }
}

/// Bring cost (EUR/MWh), specific CO2 (t/MWh) and primary energy factor to comparable ranges.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ObjectiveScales {
    pub cost: f64,
    pub co2: f64,
    pub primary_energy: f64,
}

impl Default for ObjectiveScales {
    fn default() -> Self {
        Self {
            cost: 1.,
            co2: 1000.,
            primary_energy: 100.,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct OptimizationSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub weights: ObjectiveWeights,
    #[serde(default)]
    pub scales: ObjectiveScales,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u64,
    /// standard deviation of the simplex objective values below which the search has converged
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

fn default_max_iterations() -> u64 {
    100
}

fn default_tolerance() -> f64 {
    1e-6
}

impl Default for OptimizationSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            weights: ObjectiveWeights::default(),
            scales: ObjectiveScales::default(),
            max_iterations: default_max_iterations(),
            tolerance: default_tolerance(),
        }
    }
}

impl OptimizationSettings {
    pub fn objective(&self, result: &DispatchResult) -> f64 {
        self.weights.cost * result.levelized_cost * self.scales.cost
            + self.weights.co2 * result.specific_co2 * self.scales.co2
            + self.weights.primary_energy * result.primary_energy_factor * self.scales.primary_energy
    }
}

/// A sizing variable and the merit order position of the generator it belongs to.
#[derive(Clone, Debug)]
struct Slot {
    generator: usize,
    variable: SizingVariable,
}

fn slots(generators: &[Generator]) -> Vec<Slot> {
    generators
        .iter()
        .enumerate()
        .flat_map(|(generator, g)| {
            g.as_heat_generator()
                .sizing_variables()
                .into_iter()
                .map(move |variable| Slot {
                    generator,
                    variable,
                })
        })
        .collect()
}

/// Copy of `generators` with the (clamped) parameter vector written into their sizing.
fn sized(generators: &[Generator], slots: &[Slot], params: &[f64]) -> Vec<Generator> {
    let mut generators = generators.to_vec();
    for (generator, group) in &slots
        .iter()
        .zip(params.iter())
        .chunk_by(|(slot, _)| slot.generator)
    {
        let values = group
            .map(|(slot, value)| slot.variable.clamp(*value))
            .collect::<Vec<_>>();
        generators[generator]
            .as_heat_generator_mut()
            .apply_sizing(&values);
    }
    generators
}

struct MixObjective<'a> {
    generators: &'a [Generator],
    slots: &'a [Slot],
    context: DispatchContext<'a>,
    settings: &'a OptimizationSettings,
}

impl CostFunction for MixObjective<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, params: &Self::Param) -> Result<Self::Output, Error> {
        let generators = sized(self.generators, self.slots, params);
        // the simplex solver cannot recover from a failed evaluation
        match dispatch(&generators, &self.context) {
            Ok(result) => Ok(self.settings.objective(&result)),
            Err(e) => {
                debug!("Dispatch failed for sizing {params:?}, penalised: {e:#}");
                Ok(PENALTY)
            }
        }
    }
}

fn initial_simplex(slots: &[Slot]) -> Vec<Vec<f64>> {
    let start = slots
        .iter()
        .map(|slot| slot.variable.clamp(slot.variable.value))
        .collect::<Vec<_>>();

    let mut simplex = vec![start.clone()];
    for (i, slot) in slots.iter().enumerate() {
        let SizingVariable { lower, upper, .. } = slot.variable;
        let step = ((upper - lower) * INITIAL_STEP_FRACTION).max(f64::EPSILON);
        let mut vertex = start.clone();
        vertex[i] = if start[i] + step <= upper {
            start[i] + step
        } else {
            start[i] - step
        };
        simplex.push(vertex);
    }
    simplex
}

/// Outcome of a successful mix optimization.
#[derive(Clone, Debug, Serialize)]
pub struct OptimizedMix {
    /// weighted objective at the optimum
    pub objective: f64,
    pub iterations: u64,
    /// generator name, variable name and optimized value
    pub variables: Vec<(String, &'static str, f64)>,
}

/// Tune the sizing variables of `generators` to minimise the weighted objective of the dispatch.
///
/// On convergence the optimized sizing is written back into `generators`; otherwise they are
/// left as they were and the best point found is reported in the error.
pub fn optimize_mix(
    generators: &mut [Generator],
    context: &DispatchContext,
    settings: &OptimizationSettings,
) -> anyhow::Result<OptimizedMix> {
    let slots = slots(generators);
    if slots.is_empty() {
        info!("No generator has sizing variables, skipping mix optimization");
        let objective = settings.objective(&dispatch(generators, context)?);
        return Ok(OptimizedMix {
            objective,
            iterations: 0,
            variables: vec![],
        });
    }

    let objective = MixObjective {
        generators,
        slots: &slots,
        context: *context,
        settings,
    };
    let solver = NelderMead::new(initial_simplex(&slots)).with_sd_tolerance(settings.tolerance)?;
    let (iterations, best_cost, best, status) = {
        let result = Executor::new(objective, solver)
            .configure(|state| state.max_iters(settings.max_iterations))
            .run()?;
        let state = result.state();
        (
            state.get_iter(),
            state.get_best_cost(),
            state.get_best_param().cloned(),
            state.get_termination_status().clone(),
        )
    };
    let best = best
        .unwrap_or_else(|| slots.iter().map(|slot| slot.variable.value).collect())
        .iter()
        .zip(slots.iter())
        .map(|(value, slot)| slot.variable.clamp(*value))
        .collect::<Vec<_>>();

    if !matches!(
        status,
        TerminationStatus::Terminated(TerminationReason::SolverConverged)
    ) {
        return Err(NotConvergedError::new(
            IterativeLoop::MixOptimizer,
            iterations as usize,
            vec![best_cost],
        )
        .with_detail(format!("{status}, best sizing {best:?} left unapplied"))
        .into());
    }

    let optimized = sized(generators, &slots, &best);
    generators.clone_from_slice(&optimized);

    let variables = slots
        .iter()
        .zip(best.iter())
        .map(|(slot, value)| {
            (
                generators[slot.generator].display_name(),
                slot.variable.name,
                *value,
            )
        })
        .collect::<Vec<_>>();
    for (generator, variable, value) in &variables {
        info!("{generator}: {variable} optimized to {value:.2}");
    }

    Ok(OptimizedMix {
        objective: best_cost,
        iterations,
        variables,
    })
}
