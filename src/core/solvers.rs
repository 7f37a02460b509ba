use crate::errors::{IterativeLoop, NotConvergedError};
use roots::{find_root_brent, SimpleConvergency};

/// Brent's method on a bracketing interval.
pub(crate) fn root_brent(
    func: impl Fn(f64) -> f64,
    a: f64,
    b: f64,
    tol: f64,
) -> anyhow::Result<f64> {
    let mut convergency = SimpleConvergency {
        eps: tol,
        max_iter: 100,
    };

    find_root_brent::<f64, _>(a, b, func, &mut convergency).map_err(|e| anyhow::anyhow!(e))
}

/// Result of a bracketed bisection, together with whatever the last evaluation produced.
#[derive(Debug)]
pub(crate) struct Bisection<T> {
    pub x: f64,
    pub iterations: usize,
    pub payload: T,
}

/// Bracketed bisection on `[lower, upper]` until the bracket is narrower than `xtol`.
///
/// `func` returns a residual and a payload for a trial point. A positive residual moves the
/// lower bound up to the trial point, anything else moves the upper bound down. Unlike Brent's
/// method this does not need a sign change at the bracket ends, so it also works on residuals
/// that are flat (e.g. zero output) over part of the interval.
pub(crate) fn bisect<T>(
    mut func: impl FnMut(f64) -> anyhow::Result<(f64, T)>,
    lower: f64,
    upper: f64,
    xtol: f64,
    max_iter: usize,
    loop_name: IterativeLoop,
) -> anyhow::Result<Bisection<T>> {
    let (mut lower, mut upper) = (lower, upper);
    let mut mid = (lower + upper) / 2.;
    let (mut residual, mut payload) = func(mid)?;
    let mut iterations = 1;

    loop {
        if residual > 0. {
            lower = mid;
        } else {
            upper = mid;
        }

        if upper - lower <= xtol {
            break;
        }
        if iterations >= max_iter {
            return Err(
                NotConvergedError::new(loop_name, iterations, vec![upper - lower, residual])
                    .into(),
            );
        }

        mid = (lower + upper) / 2.;
        (residual, payload) = func(mid)?;
        iterations += 1;
    }

    Ok(Bisection {
        x: mid,
        iterations,
        payload,
    })
}
