use crate::core::units::{HOURS_PER_LEAP_YEAR, HOURS_PER_YEAR};
use crate::errors::ensure_same_length;
use chrono::{NaiveDateTime, TimeDelta};
use serde::Deserialize;

/// Period and resolution of a simulation run, in hours.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SimulationTime {
    #[serde(rename(deserialize = "start"))]
    start_time: f64,
    #[serde(rename(deserialize = "end"))]
    end_time: f64,
    step: f64,
}

impl SimulationTime {
    pub fn new(start_time: f64, end_time: f64, step: f64) -> Self {
        Self {
            start_time,
            end_time,
            step,
        }
    }

    /// A whole (non-leap) year at hourly resolution.
    pub fn hourly_year() -> Self {
        Self::new(0., HOURS_PER_YEAR as f64, 1.)
    }

    pub fn step_in_hours(&self) -> f64 {
        self.step
    }

    pub fn total_steps(&self) -> usize {
        ((self.end_time - self.start_time) / self.step).ceil() as usize
    }

    /// Whether the run covers exactly one (possibly leap) year.
    pub fn is_full_year(&self) -> bool {
        let hours = self.end_time - self.start_time;
        hours == HOURS_PER_YEAR as f64 || hours == HOURS_PER_LEAP_YEAR as f64
    }

    /// Check that a time series carries one value per step of this run.
    pub fn ensure_series_length(&self, context: &str, series: &[f64]) -> anyhow::Result<()> {
        ensure_same_length(context, self.total_steps(), series.len())?;
        Ok(())
    }

    /// Wall-clock timestamps of every step, counted from `first`.
    pub fn timestamps(&self, first: NaiveDateTime) -> Vec<NaiveDateTime> {
        self.iter()
            .map(|step| first + TimeDelta::seconds(((step.time - self.start_time) * 3600.) as i64))
            .collect()
    }

    pub(crate) fn iter(&self) -> SimulationTimeIterator {
        SimulationTimeIterator::from(*self)
    }
}

#[derive(Clone)]
pub struct SimulationTimeIterator {
    current_index: usize,
    current_time: f64,
    started: bool,
    simulation_time: SimulationTime,
}

impl SimulationTimeIterator {
    fn from(simulation_time: SimulationTime) -> Self {
        SimulationTimeIterator {
            current_index: 0,
            current_time: simulation_time.start_time,
            started: false,
            simulation_time,
        }
    }
}

#[derive(Debug)]
pub struct SimulationTimeIteration {
    pub index: usize,
    pub time: f64,
    pub timestep: f64,
}

impl Iterator for SimulationTimeIterator {
    type Item = SimulationTimeIteration;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.started && self.simulation_time.start_time != self.simulation_time.end_time {
            self.started = true;
            return Some(SimulationTimeIteration {
                index: 0,
                time: self.simulation_time.start_time,
                timestep: self.simulation_time.step,
            });
        }
        match self.current_time < (self.simulation_time.end_time - self.simulation_time.step) {
            true => {
                self.current_index += 1;
                self.current_time += self.simulation_time.step;
                Some(SimulationTimeIteration {
                    index: self.current_index,
                    time: self.current_time,
                    timestep: self.simulation_time.step,
                })
            }
            false => None,
        }
    }
}
