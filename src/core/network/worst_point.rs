use crate::core::network::graph::NetworkGraph;

/// The hydraulically most disadvantaged consumer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WorstPoint {
    /// bar
    pub pressure_difference: f64,
    pub consumer: usize,
}

/// Smallest `p_in - p_out` over the given consumer pressures (bar). The first consumer wins ties.
pub fn find_worst_point(pressures: impl IntoIterator<Item = (f64, f64)>) -> Option<WorstPoint> {
    pressures
        .into_iter()
        .enumerate()
        .map(|(consumer, (pressure_in, pressure_out))| WorstPoint {
            pressure_difference: pressure_in - pressure_out,
            consumer,
        })
        .reduce(|worst, candidate| {
            if candidate.pressure_difference < worst.pressure_difference {
                candidate
            } else {
                worst
            }
        })
}

impl NetworkGraph {
    /// Worst point of the last solved state of the network.
    pub fn worst_point(&self) -> Option<WorstPoint> {
        find_worst_point(
            self.consumers
                .iter()
                .map(|consumer| (consumer.result.pressure_from, consumer.result.pressure_to)),
        )
    }
}
