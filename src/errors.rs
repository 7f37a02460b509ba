use thiserror::Error;

#[derive(Debug, Error)]
pub enum DhsError {
    #[error("Request was considered invalid due to error: {0}")]
    InvalidRequest(#[from] anyhow::Error),
    #[error("Error identified during district heating calculation: {0}")]
    FailureInCalculation(#[from] DhsCoreError),
    #[error("{0}")]
    NotConverged(#[from] NotConvergedError),
    #[error("{0}")]
    NotImplemented(#[from] NotImplementedError),
}

#[derive(Debug, Error)]
#[error(transparent)]
pub struct DhsCoreError {
    error: anyhow::Error,
}

impl DhsCoreError {
    pub(crate) fn new(error: anyhow::Error) -> Self {
        Self { error }
    }
}

/// An error representing that an area of functionality has not been implemented.
#[derive(Clone, Debug, Error)]
#[error("Not implemented: {0}")]
pub struct NotImplementedError(String);

impl NotImplementedError {
    pub(crate) fn new(message: &str) -> Self {
        NotImplementedError(message.to_string())
    }
}

/// The iterative loops that can fail to settle.
#[derive(Clone, Copy, Debug, PartialEq, strum::Display)]
pub enum IterativeLoop {
    #[strum(to_string = "network control loop")]
    NetworkControl,
    #[strum(to_string = "diameter sizing loop")]
    DiameterSizing,
    #[strum(to_string = "geothermal operating hours bisection")]
    GeothermalBisection,
    #[strum(to_string = "generator mix optimizer")]
    MixOptimizer,
}

/// An iterative loop stopped at its iteration cap without meeting its convergence criterion.
///
/// The last residuals are kept so that callers can decide whether a best-effort result is good
/// enough or the run should be aborted.
#[derive(Clone, Debug, Error)]
#[error("{loop_name} did not converge after {iterations} iterations (last residuals: {residuals:?}){}", .detail.as_ref().map(|d| format!(": {d}")).unwrap_or_default())]
pub struct NotConvergedError {
    pub loop_name: IterativeLoop,
    pub iterations: usize,
    pub residuals: Vec<f64>,
    pub detail: Option<String>,
}

impl NotConvergedError {
    pub fn new(loop_name: IterativeLoop, iterations: usize, residuals: Vec<f64>) -> Self {
        Self {
            loop_name,
            iterations,
            residuals,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Parallel inputs (time series, COP query arrays) did not have matching lengths.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("Shape mismatch for {context}: expected length {expected}, got {actual}")]
pub struct ShapeMismatchError {
    pub context: String,
    pub expected: usize,
    pub actual: usize,
}

impl ShapeMismatchError {
    pub fn new(context: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self {
            context: context.into(),
            expected,
            actual,
        }
    }
}

/// A consumer is asked to return water at or above the temperature the network supplies.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("Return temperature {return_temperature} °C of heat consumer {consumer} at time step {step} is not below the network supply temperature {supply_temperature} °C")]
pub struct InfeasibleTemperaturesError {
    pub consumer: usize,
    pub step: usize,
    pub return_temperature: f64,
    pub supply_temperature: f64,
}

#[derive(Debug, Error)]
pub enum ResultsCsvError {
    #[error("Could not read or write results CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    ShapeMismatch(#[from] ShapeMismatchError),
    #[error("Results CSV is missing column '{0}'")]
    MissingColumn(String),
    #[error("Invalid number '{value}' in column '{column}' at row {row}")]
    InvalidNumber {
        column: String,
        row: usize,
        value: String,
    },
    #[error("Invalid timestamp '{value}' at row {row}")]
    InvalidTimestamp { row: usize, value: String },
}

/// Fail fast if a slice does not have the expected length.
pub fn ensure_same_length(context: &str, expected: usize, actual: usize) -> Result<(), ShapeMismatchError> {
    if expected != actual {
        return Err(ShapeMismatchError::new(context, expected, actual));
    }
    Ok(())
}
