/// A simple statistics module with some utility functions for summarising time series.
use statrs::statistics::{Data, OrderStatistics, Statistics};

pub fn percentile(numbers: &[f64], percentile: usize) -> f64 {
    let numbers = numbers.to_vec();
    let mut data = Data::new(numbers);

    data.percentile(percentile)
}

/// Maximum of a series, 0 for an empty series.
pub fn max_or_zero(numbers: &[f64]) -> f64 {
    if numbers.is_empty() {
        return 0.;
    }
    Statistics::max(numbers)
}

/// Arithmetic mean of a series, 0 for an empty series.
pub fn mean_or_zero(numbers: &[f64]) -> f64 {
    if numbers.is_empty() {
        return 0.;
    }
    Statistics::mean(numbers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::*;

    #[fixture]
    fn numbers() -> [f64; 10] {
        [9.0, 3.0, 3.0, 4.0, 5.0, 4.9, 8.0, 3.3, 2.0, 0.1]
    }

    #[rstest]
    fn test_percentile(numbers: [f64; 10]) {
        assert_relative_eq!(percentile(&numbers, 70), 4.95, epsilon = 1e-2);
        assert_relative_eq!(percentile(&numbers, 50), 3.65, epsilon = 1e-2);
    }

    #[rstest]
    fn test_max_and_mean(numbers: [f64; 10]) {
        assert_relative_eq!(max_or_zero(&numbers), 9.0);
        assert_relative_eq!(mean_or_zero(&numbers), 4.23, epsilon = 1e-9);
        assert_eq!(max_or_zero(&[]), 0.);
        assert_eq!(mean_or_zero(&[]), 0.);
    }
}
