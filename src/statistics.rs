//! Correlated t-test for comparing two cross-validated workflows.
//!
//! Fold scores from repeated cross-validation are not independent; the
//! Nadeau-Bengio correction inflates the variance estimate with the
//! correlation heuristic rho = 1/(folds per repetition) before forming the
//! t statistic. Zero-variance differences are not special-cased: they
//! produce infinite statistics and degenerate intervals through ordinary
//! floating-point semantics.
//!
//! Reference: Nadeau, C., & Bengio, Y. (2003). Inference for the
//! generalization error. Machine Learning, 52(3), 239-281.

use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::error::PredageError;

/// Two-sided test summary at a given significance level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TTestSummary {
    pub statistic: f64,
    pub pvalue: f64,
    /// Confidence interval bounds for the mean difference.
    pub lower: f64,
    pub upper: f64,
}

/// Tail probabilities of the mean difference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TailProbabilities {
    /// No equivalence band: P(diff < 0) and P(diff > 0).
    TwoTail { negative: f64, positive: f64 },
    /// Symmetric band of practical equivalence around zero.
    Rope {
        below: f64,
        within: f64,
        above: f64,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct CorrelatedTTest {
    /// Mean fold-score difference.
    pub mu: f64,
    /// Correlation-corrected variance of the mean difference.
    pub var: f64,
    /// Degrees of freedom (total folds - 1).
    pub df: f64,
}

impl CorrelatedTTest {
    /// `a` and `b` are equal-length fold-score vectors, `n_runs` the number
    /// of independent CV repetitions they came from.
    pub fn new(a: &[f64], b: &[f64], n_runs: usize) -> Result<Self, PredageError> {
        if a.len() != b.len() {
            return Err(PredageError::LengthMismatch {
                expected: a.len(),
                got: b.len(),
            });
        }
        let j = a.len();
        if j < 2 {
            return Err(PredageError::Numeric(
                "correlated t-test requires at least two folds".to_string(),
            ));
        }
        if n_runs == 0 || j % n_runs != 0 {
            return Err(PredageError::Numeric(format!(
                "{} folds cannot come from {} repetitions",
                j, n_runs
            )));
        }

        let diffs: Vec<f64> = a.iter().zip(b.iter()).map(|(x, y)| x - y).collect();
        let mu = diffs.iter().sum::<f64>() / j as f64;
        let sample_var =
            diffs.iter().map(|d| (d - mu) * (d - mu)).sum::<f64>() / (j - 1) as f64;

        // folds per repetition set the correlation heuristic
        let k = j / n_runs;
        let rho = 1.0 / k as f64;
        let var = (1.0 / j as f64 + rho / (1.0 - rho)) * sample_var;

        Ok(CorrelatedTTest {
            mu,
            var,
            df: (j - 1) as f64,
        })
    }

    fn dist(&self) -> Result<StudentsT, PredageError> {
        StudentsT::new(0.0, 1.0, self.df)
            .map_err(|e| PredageError::Numeric(e.to_string()))
    }

    /// Two-sided t statistic, p-value and confidence interval at `alpha`.
    pub fn ttest(&self, alpha: f64) -> Result<TTestSummary, PredageError> {
        let dist = self.dist()?;
        let se = self.var.sqrt();
        let statistic = self.mu / se;
        let pvalue = 2.0 * dist.cdf(-statistic.abs());
        let quantile = dist.inverse_cdf(alpha / 2.0);
        Ok(TTestSummary {
            statistic,
            pvalue,
            lower: self.mu + quantile * se,
            upper: self.mu - quantile * se,
        })
    }

    /// Without a region of practical equivalence: the two one-sided tails.
    /// With one (`rope > 0`): the below/within/above split for the symmetric
    /// band `[-rope, rope]`.
    pub fn probabilities(
        &self,
        rope: Option<f64>,
    ) -> Result<TailProbabilities, PredageError> {
        let dist = self.dist()?;
        let se = self.var.sqrt();
        let z = |x: f64| (x - self.mu) / se;
        match rope {
            None => {
                let negative = dist.cdf(z(0.0));
                Ok(TailProbabilities::TwoTail {
                    negative,
                    positive: 1.0 - negative,
                })
            }
            Some(rope) => {
                let below = dist.cdf(z(-rope));
                let above = 1.0 - dist.cdf(z(rope));
                Ok(TailProbabilities::Rope {
                    below,
                    within: 1.0 - below - above,
                    above,
                })
            }
        }
    }
}
