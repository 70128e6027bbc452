//! Gaussian-process regression with the two fixed kernel families the
//! experiments use: a dot-product (linear) kernel and an RBF kernel.

use ndarray::{Array1, Array2, Axis};

use crate::config::ParamValue;
use crate::error::PredageError;
use crate::math::{cholesky, cholesky_solve, solve_lower};
use crate::models::{
    check_predict_width, check_training_shapes, require_f64, FeatureWeights, Regressor,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Kernel {
    DotProduct { sigma_0: f64 },
    Rbf { length_scale: f64 },
}

impl Kernel {
    fn eval(&self, a: &Array1<f64>, b: &Array1<f64>) -> f64 {
        match self {
            Kernel::DotProduct { sigma_0 } => sigma_0 * sigma_0 + a.dot(b),
            Kernel::Rbf { length_scale } => {
                let d2 = a
                    .iter()
                    .zip(b.iter())
                    .map(|(x, y)| (x - y) * (x - y))
                    .sum::<f64>();
                (-d2 / (2.0 * length_scale * length_scale)).exp()
            }
        }
    }
}

#[derive(Debug, Clone)]
struct GprFit {
    x_train: Array2<f64>,
    /// L from K = L L^T, needed for the predictive variance.
    chol: Array2<f64>,
    dual: Array1<f64>,
    y_mean: f64,
    feature_names: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct GprRegressor {
    pub kernel: Kernel,
    /// Diagonal jitter added to the training gram matrix.
    pub alpha: f64,
    fitted: Option<GprFit>,
}

impl GprRegressor {
    pub fn dot_product() -> Self {
        GprRegressor {
            kernel: Kernel::DotProduct { sigma_0: 1.0 },
            alpha: 1e-10,
            fitted: None,
        }
    }

    pub fn rbf() -> Self {
        GprRegressor {
            kernel: Kernel::Rbf { length_scale: 1.0 },
            alpha: 1e-10,
            fitted: None,
        }
    }

    fn gram(&self, x: &Array2<f64>) -> Array2<f64> {
        let n = x.nrows();
        let mut k = Array2::<f64>::zeros((n, n));
        for i in 0..n {
            let ri = x.row(i).to_owned();
            for j in 0..=i {
                let v = self.kernel.eval(&ri, &x.row(j).to_owned());
                k[(i, j)] = v;
                k[(j, i)] = v;
            }
        }
        k
    }
}

impl Regressor for GprRegressor {
    fn family(&self) -> &'static str {
        "gpr"
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<(), PredageError> {
        match (name, &mut self.kernel) {
            ("alpha", _) => self.alpha = require_f64(name, value)?,
            ("sigma_0", Kernel::DotProduct { sigma_0 }) => {
                *sigma_0 = require_f64(name, value)?
            }
            ("length_scale", Kernel::Rbf { length_scale }) => {
                *length_scale = require_f64(name, value)?
            }
            _ => {
                return Err(PredageError::UnknownParam {
                    target: "gpr".to_string(),
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
        let y_mean = y.mean().unwrap_or(0.0);
        let yc = y.mapv(|v| v - y_mean);

        let gram = self.gram(x);
        // escalate the jitter a few times before giving up on a
        // near-singular gram matrix
        let mut jitter = self.alpha.max(1e-12);
        let chol = loop {
            let mut k = gram.clone();
            for i in 0..n {
                k[(i, i)] += jitter;
            }
            match cholesky(&k) {
                Ok(l) => break l,
                Err(_) if jitter < 1e-2 => jitter *= 10.0,
                Err(e) => return Err(e),
            }
        };
        let dual = cholesky_solve(&chol, &yc);

        self.fitted = Some(GprFit {
            x_train: x.clone(),
            chol,
            dual,
            y_mean,
            feature_names: feature_names.to_vec(),
        });
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, PredageError> {
        let fit = self.fitted.as_ref().ok_or(PredageError::NotFitted)?;
        check_predict_width(x, fit.feature_names.len())?;
        let mut out = Array1::<f64>::zeros(x.nrows());
        for (i, row) in x.axis_iter(Axis(0)).enumerate() {
            let row = row.to_owned();
            let k_star: Array1<f64> = fit
                .x_train
                .axis_iter(Axis(0))
                .map(|train_row| self.kernel.eval(&row, &train_row.to_owned()))
                .collect();
            out[i] = k_star.dot(&fit.dual) + fit.y_mean;
        }
        Ok(out)
    }

    fn predict_std(&self, x: &Array2<f64>) -> Result<Option<Array1<f64>>, PredageError> {
        let fit = self.fitted.as_ref().ok_or(PredageError::NotFitted)?;
        check_predict_width(x, fit.feature_names.len())?;
        let mut out = Array1::<f64>::zeros(x.nrows());
        for (i, row) in x.axis_iter(Axis(0)).enumerate() {
            let row = row.to_owned();
            let k_star: Array1<f64> = fit
                .x_train
                .axis_iter(Axis(0))
                .map(|train_row| self.kernel.eval(&row, &train_row.to_owned()))
                .collect();
            let v = solve_lower(&fit.chol, &k_star);
            let var = self.kernel.eval(&row, &row) - v.dot(&v);
            out[i] = var.max(0.0).sqrt();
        }
        Ok(Some(out))
    }

    /// A GP posterior has no decomposable per-feature weight.
    fn feature_weights(&self) -> Result<FeatureWeights, PredageError> {
        if self.fitted.is_none() {
            return Err(PredageError::NotFitted);
        }
        Ok(FeatureWeights {
            names: vec!["gpr".to_string()],
            values: vec![0.0],
        })
    }

    fn clone_box(&self) -> Box<dyn Regressor> {
        Box::new(self.clone())
    }
}
