//! Bayesian linear regressors: evidence-iterated ridge and its per-feature
//! (ARD) variant. Both expose coefficients for weight extraction and a
//! posterior predictive standard deviation.

use ndarray::{Array1, Array2, Axis};

use crate::config::ParamValue;
use crate::error::PredageError;
use crate::math::{cholesky, cholesky_inverse, cholesky_solve};
use crate::models::{
    center_columns, check_predict_width, check_training_shapes, require_f64, require_usize,
    FeatureWeights, Regressor,
};

#[derive(Debug, Clone)]
struct LinearFit {
    coef: Array1<f64>,
    intercept: f64,
    /// Posterior covariance of the coefficients.
    sigma: Array2<f64>,
    /// Noise precision.
    alpha: f64,
    x_mean: Array1<f64>,
    feature_names: Vec<String>,
}

impl LinearFit {
    fn predict(&self, x: &Array2<f64>) -> Array1<f64> {
        let centered = center_columns(x, &self.x_mean);
        centered.dot(&self.coef) + self.intercept
    }

    fn predict_std(&self, x: &Array2<f64>) -> Array1<f64> {
        let centered = center_columns(x, &self.x_mean);
        let mut out = Array1::<f64>::zeros(x.nrows());
        for (i, row) in centered.axis_iter(Axis(0)).enumerate() {
            let row = row.to_owned();
            let var = 1.0 / self.alpha + row.dot(&self.sigma.dot(&row));
            out[i] = var.max(0.0).sqrt();
        }
        out
    }
}

/// Bayesian ridge regression with Gamma hyperpriors on the noise and weight
/// precisions, iterated to a fixed point of the evidence approximation.
#[derive(Debug, Clone)]
pub struct BayesianRidge {
    pub alpha_1: f64,
    pub alpha_2: f64,
    pub lambda_1: f64,
    pub lambda_2: f64,
    pub max_iter: usize,
    pub tol: f64,
    fitted: Option<LinearFit>,
}

impl Default for BayesianRidge {
    fn default() -> Self {
        BayesianRidge {
            alpha_1: 1e-6,
            alpha_2: 1e-6,
            lambda_1: 1e-6,
            lambda_2: 1e-6,
            max_iter: 300,
            tol: 1e-3,
            fitted: None,
        }
    }
}

impl Regressor for BayesianRidge {
    fn family(&self) -> &'static str {
        "linear"
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<(), PredageError> {
        match name {
            "alpha_1" => self.alpha_1 = require_f64(name, value)?,
            "alpha_2" => self.alpha_2 = require_f64(name, value)?,
            "lambda_1" => self.lambda_1 = require_f64(name, value)?,
            "lambda_2" => self.lambda_2 = require_f64(name, value)?,
            "max_iter" => self.max_iter = require_usize(name, value)?,
            "tol" => self.tol = require_f64(name, value)?,
            _ => {
                return Err(PredageError::UnknownParam {
                    target: "bayesianridge".to_string(),
                    param: name.to_string(),
                })
            }
        }
        Ok(())
    }

    fn fit(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        feature_names: &[String],
    ) -> Result<(), PredageError> {
        check_training_shapes(x, y, feature_names)?;
        let n = x.nrows();
        let p = x.ncols();

        let x_mean = x.mean_axis(Axis(0)).expect("non-empty matrix");
        let y_mean = y.mean().unwrap_or(0.0);
        let xc = center_columns(x, &x_mean);
        let yc = y.mapv(|v| v - y_mean);

        let xtx = xc.t().dot(&xc);
        let xty = xc.t().dot(&yc);

        let var_y = yc.dot(&yc) / n as f64;
        let mut alpha = if var_y > 0.0 { 1.0 / var_y } else { 1.0 };
        let mut lambda = 1.0;

        let mut coef = Array1::<f64>::zeros(p);
        let mut sigma = Array2::<f64>::eye(p);
        for _ in 0..self.max_iter {
            let mut a = &xtx * alpha;
            for j in 0..p {
                a[(j, j)] += lambda;
            }
            let l = cholesky(&a)?;
            let new_coef = cholesky_solve(&l, &(&xty * alpha));
            sigma = cholesky_inverse(&l);

            let gamma = p as f64 - lambda * sigma.diag().sum();
            let residual = &yc - &xc.dot(&new_coef);
            let rss = residual.dot(&residual);

            lambda = (gamma + 2.0 * self.lambda_1)
                / (new_coef.dot(&new_coef) + 2.0 * self.lambda_2);
            alpha = (n as f64 - gamma + 2.0 * self.alpha_1) / (rss + 2.0 * self.alpha_2);

            let delta = (&new_coef - &coef).mapv(f64::abs).sum();
            coef = new_coef;
            if delta < self.tol {
                break;
            }
        }

        self.fitted = Some(LinearFit {
            coef,
            intercept: y_mean,
            sigma,
            alpha,
            x_mean,
            feature_names: feature_names.to_vec(),
        });
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, PredageError> {
        let fit = self.fitted.as_ref().ok_or(PredageError::NotFitted)?;
        check_predict_width(x, fit.feature_names.len())?;
        Ok(fit.predict(x))
    }

    fn predict_std(&self, x: &Array2<f64>) -> Result<Option<Array1<f64>>, PredageError> {
        let fit = self.fitted.as_ref().ok_or(PredageError::NotFitted)?;
        check_predict_width(x, fit.feature_names.len())?;
        Ok(Some(fit.predict_std(x)))
    }

    fn feature_weights(&self) -> Result<FeatureWeights, PredageError> {
        let fit = self.fitted.as_ref().ok_or(PredageError::NotFitted)?;
        Ok(FeatureWeights {
            names: fit.feature_names.clone(),
            values: fit.coef.to_vec(),
        })
    }

    fn clone_box(&self) -> Box<dyn Regressor> {
        Box::new(self.clone())
    }
}

/// Automatic-relevance-determination regression: one precision per feature,
/// so irrelevant features are driven towards zero weight.
#[derive(Debug, Clone)]
pub struct ArdRegression {
    pub alpha_1: f64,
    pub alpha_2: f64,
    pub lambda_1: f64,
    pub lambda_2: f64,
    pub threshold_lambda: f64,
    pub max_iter: usize,
    pub tol: f64,
    fitted: Option<LinearFit>,
}

impl Default for ArdRegression {
    fn default() -> Self {
        ArdRegression {
            alpha_1: 1e-6,
            alpha_2: 1e-6,
            lambda_1: 1e-6,
            lambda_2: 1e-6,
            threshold_lambda: 1e4,
            max_iter: 300,
            tol: 1e-3,
            fitted: None,
        }
    }
}

impl Regressor for ArdRegression {
    fn family(&self) -> &'static str {
        "linear"
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<(), PredageError> {
        match name {
            "alpha_1" => self.alpha_1 = require_f64(name, value)?,
            "alpha_2" => self.alpha_2 = require_f64(name, value)?,
            "lambda_1" => self.lambda_1 = require_f64(name, value)?,
            "lambda_2" => self.lambda_2 = require_f64(name, value)?,
            "threshold_lambda" => self.threshold_lambda = require_f64(name, value)?,
            "max_iter" => self.max_iter = require_usize(name, value)?,
            "tol" => self.tol = require_f64(name, value)?,
            _ => {
                return Err(PredageError::UnknownParam {
                    target: "ardregression".to_string(),
                    param: name.to_string(),
                })
            }
        }
        Ok(())
    }

    fn fit(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        feature_names: &[String],
    ) -> Result<(), PredageError> {
        check_training_shapes(x, y, feature_names)?;
        let n = x.nrows();
        let p = x.ncols();

        let x_mean = x.mean_axis(Axis(0)).expect("non-empty matrix");
        let y_mean = y.mean().unwrap_or(0.0);
        let xc = center_columns(x, &x_mean);
        let yc = y.mapv(|v| v - y_mean);

        let xtx = xc.t().dot(&xc);
        let xty = xc.t().dot(&yc);

        let var_y = yc.dot(&yc) / n as f64;
        let mut alpha = if var_y > 0.0 { 1.0 / var_y } else { 1.0 };
        let mut lambda = Array1::<f64>::ones(p);

        let mut coef = Array1::<f64>::zeros(p);
        let mut sigma = Array2::<f64>::eye(p);
        for _ in 0..self.max_iter {
            let mut a = &xtx * alpha;
            for j in 0..p {
                a[(j, j)] += lambda[j];
            }
            let l = cholesky(&a)?;
            let new_coef = cholesky_solve(&l, &(&xty * alpha));
            sigma = cholesky_inverse(&l);

            let mut gamma_sum = 0.0;
            for j in 0..p {
                let gamma_j = 1.0 - lambda[j] * sigma[(j, j)];
                gamma_sum += gamma_j;
                let updated = (gamma_j + 2.0 * self.lambda_1)
                    / (new_coef[j] * new_coef[j] + 2.0 * self.lambda_2);
                lambda[j] = updated.min(self.threshold_lambda);
            }
            let residual = &yc - &xc.dot(&new_coef);
            let rss = residual.dot(&residual);
            alpha = (n as f64 - gamma_sum + 2.0 * self.alpha_1) / (rss + 2.0 * self.alpha_2);

            let delta = (&new_coef - &coef).mapv(f64::abs).sum();
            coef = new_coef;
            if delta < self.tol {
                break;
            }
        }

        self.fitted = Some(LinearFit {
            coef,
            intercept: y_mean,
            sigma,
            alpha,
            x_mean,
            feature_names: feature_names.to_vec(),
        });
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, PredageError> {
        let fit = self.fitted.as_ref().ok_or(PredageError::NotFitted)?;
        check_predict_width(x, fit.feature_names.len())?;
        Ok(fit.predict(x))
    }

    fn predict_std(&self, x: &Array2<f64>) -> Result<Option<Array1<f64>>, PredageError> {
        let fit = self.fitted.as_ref().ok_or(PredageError::NotFitted)?;
        check_predict_width(x, fit.feature_names.len())?;
        Ok(Some(fit.predict_std(x)))
    }

    fn feature_weights(&self) -> Result<FeatureWeights, PredageError> {
        let fit = self.fitted.as_ref().ok_or(PredageError::NotFitted)?;
        Ok(FeatureWeights {
            names: fit.feature_names.clone(),
            values: fit.coef.to_vec(),
        })
    }

    fn clone_box(&self) -> Box<dyn Regressor> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("pet_{}", i)).collect()
    }

    #[test]
    fn bayesian_ridge_recovers_a_linear_signal() {
        // y = 2*x0 - 1*x1 + 3
        let x = array![
            [0.0, 0.0],
            [1.0, 0.0],
            [0.0, 1.0],
            [1.0, 1.0],
            [2.0, 1.0],
            [1.0, 2.0],
            [3.0, 0.5],
            [0.5, 3.0],
        ];
        let y = x.column(0).mapv(|v| 2.0 * v) - x.column(1).to_owned() + 3.0;

        let mut model = BayesianRidge::default();
        model.fit(&x, &y, &names(2)).unwrap();
        let pred = model.predict(&x).unwrap();
        for (p, t) in pred.iter().zip(y.iter()) {
            assert_abs_diff_eq!(p, t, epsilon = 0.05);
        }

        let weights = model.feature_weights().unwrap();
        assert_eq!(weights.names, names(2));
        assert_abs_diff_eq!(weights.values[0], 2.0, epsilon = 0.1);
        assert_abs_diff_eq!(weights.values[1], -1.0, epsilon = 0.1);
    }

    #[test]
    fn bayesian_ridge_exposes_a_predictive_std() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![0.1, 0.9, 2.1, 2.9];
        let mut model = BayesianRidge::default();
        model.fit(&x, &y, &names(1)).unwrap();
        let std = model.predict_std(&x).unwrap().unwrap();
        assert_eq!(std.len(), 4);
        assert!(std.iter().all(|&s| s.is_finite() && s >= 0.0));
    }

    #[test]
    fn ard_shrinks_an_irrelevant_feature() {
        let x = array![
            [0.0, 0.3],
            [1.0, -0.2],
            [2.0, 0.1],
            [3.0, -0.4],
            [4.0, 0.2],
            [5.0, -0.1],
            [6.0, 0.3],
            [7.0, -0.3],
        ];
        let y = x.column(0).mapv(|v| 1.5 * v);

        let mut model = ArdRegression::default();
        model.fit(&x, &y, &names(2)).unwrap();
        let weights = model.feature_weights().unwrap();
        assert_abs_diff_eq!(weights.values[0], 1.5, epsilon = 0.1);
        assert!(weights.values[1].abs() < 0.1);
    }

    #[test]
    fn predict_rejects_mismatched_width() {
        let x = array![[0.0, 1.0], [1.0, 0.0]];
        let y = array![1.0, 2.0];
        let mut model = BayesianRidge::default();
        model.fit(&x, &y, &names(2)).unwrap();
        let narrow = array![[1.0], [2.0]];
        assert!(model.predict(&narrow).is_err());
    }

    #[test]
    fn unknown_param_is_a_config_error() {
        let mut model = BayesianRidge::default();
        let err = model
            .set_param("bogus", &ParamValue::Float(1.0))
            .unwrap_err();
        assert!(err.to_string().contains("bogus"));
    }
}
