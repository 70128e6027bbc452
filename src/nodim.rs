//! Nonlinear distribution mapping (NODIM) primitives.
//!
//! NODIM aligns one cohort's feature distribution to another's by composing
//! the source distribution's CDF with the target distribution's inverse CDF.
//! Both CDFs are inverted on a common quantile grid via monotone cubic
//! interpolation, and input values are then carried through the resulting
//! source-value -> target-value table by linear interpolation.

use itertools_num::linspace;
use statrs::distribution::{ContinuousCDF, Normal};

use crate::error::PredageError;
use crate::math::{interp_linear, Pchip};

/// Number of support points per CDF and quantile-grid points in [0, 1].
const GRID_POINTS: usize = 1000;

/// Half-width of the Gaussian support grid, in standard deviations.
const SUPPORT_STDS: f64 = 5.0;

/// Parameters of a fitted Gaussian distribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianParams {
    pub mu: f64,
    pub std: f64,
}

/// An empirical distribution function: sorted unique values with their
/// cumulative probabilities.
#[derive(Debug, Clone, PartialEq)]
pub struct Ecdf {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

/// Maximum-likelihood Gaussian parameters (mean and population std).
pub fn estimate_params(values: &[f64]) -> GaussianParams {
    let n = values.len() as f64;
    let mu = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mu) * (v - mu)).sum::<f64>() / n;
    GaussianParams {
        mu,
        std: var.sqrt(),
    }
}

/// Empirical distribution function of `values`.
///
/// Ties are collapsed to their highest cumulative probability so the
/// abscissae stay strictly increasing for interpolation.
pub fn estimate_ecdf(values: &[f64]) -> Ecdf {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len() as f64;

    let mut x = Vec::with_capacity(sorted.len());
    let mut y = Vec::with_capacity(sorted.len());
    for (i, v) in sorted.iter().enumerate() {
        let p = (i + 1) as f64 / n;
        if x.last() == Some(v) {
            *y.last_mut().expect("y tracks x") = p;
        } else {
            x.push(*v);
            y.push(p);
        }
    }
    Ecdf { x, y }
}

/// Map `values` drawn from the `from` Gaussian onto the `to` Gaussian.
pub fn transform_nodim(
    from: &GaussianParams,
    to: &GaussianParams,
    values: &[f64],
) -> Result<Vec<f64>, PredageError> {
    let (x1, cdf1) = gaussian_support(from)?;
    let (x2, cdf2) = gaussian_support(to)?;
    map_through_quantiles(&cdf1, &x1, &cdf2, &x2, values)
}

/// Map `values` drawn from the `from` empirical distribution onto the `to`
/// empirical distribution.
pub fn transform_ecdf_nodim(
    from: &Ecdf,
    to: &Ecdf,
    values: &[f64],
) -> Result<Vec<f64>, PredageError> {
    map_through_quantiles(&from.y, &from.x, &to.y, &to.x, values)
}

/// Support grid over mu +- 5 std and the analytic CDF at each point.
fn gaussian_support(params: &GaussianParams) -> Result<(Vec<f64>, Vec<f64>), PredageError> {
    let dist = Normal::new(params.mu, params.std)
        .map_err(|e| PredageError::Numeric(format!("degenerate gaussian: {}", e)))?;
    let x: Vec<f64> = linspace(
        params.mu - SUPPORT_STDS * params.std,
        params.mu + SUPPORT_STDS * params.std,
        GRID_POINTS,
    )
    .collect();
    let cdf: Vec<f64> = x.iter().map(|&v| dist.cdf(v)).collect();
    Ok((x, cdf))
}

/// Invert both CDFs on a shared quantile grid, then carry each value through
/// the source-to-target composition by linear interpolation.
fn map_through_quantiles(
    cdf1: &[f64],
    x1: &[f64],
    cdf2: &[f64],
    x2: &[f64],
    values: &[f64],
) -> Result<Vec<f64>, PredageError> {
    let ip1 = Pchip::new(cdf1.to_vec(), x1.to_vec())?;
    let ip2 = Pchip::new(cdf2.to_vec(), x2.to_vec())?;

    let quantiles: Vec<f64> = linspace(0.0, 1.0, GRID_POINTS).collect();
    let v1: Vec<f64> = quantiles.iter().map(|&q| ip1.eval(q)).collect();
    let v2: Vec<f64> = quantiles.iter().map(|&q| ip2.eval(q)).collect();

    values
        .iter()
        .map(|&v| interp_linear(&v1, &v2, v))
        .collect()
}
