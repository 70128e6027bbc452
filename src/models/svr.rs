//! Linear epsilon-insensitive support-vector regression, solved by
//! full-batch projected subgradient descent on the primal objective.

use ndarray::{Array1, Array2, Axis};

use crate::config::ParamValue;
use crate::error::PredageError;
use crate::models::{
    center_columns, check_predict_width, check_training_shapes, require_f64, require_usize,
    FeatureWeights, Regressor,
};

#[derive(Debug, Clone)]
struct SvrFit {
    coef: Array1<f64>,
    intercept: f64,
    x_mean: Array1<f64>,
    feature_names: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct LinearSvr {
    pub c: f64,
    pub epsilon: f64,
    pub max_iter: usize,
    pub tol: f64,
    fitted: Option<SvrFit>,
}

impl Default for LinearSvr {
    fn default() -> Self {
        LinearSvr {
            c: 1.0,
            epsilon: 0.0,
            max_iter: 1000,
            tol: 1e-4,
            fitted: None,
        }
    }
}

impl Regressor for LinearSvr {
    fn family(&self) -> &'static str {
        "linear"
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<(), PredageError> {
        match name {
            "c" => self.c = require_f64(name, value)?,
            "epsilon" => self.epsilon = require_f64(name, value)?,
            "max_iter" => self.max_iter = require_usize(name, value)?,
            "tol" => self.tol = require_f64(name, value)?,
            _ => {
                return Err(PredageError::UnknownParam {
                    target: "linearsvr".to_string(),
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
        let xc = center_columns(x, &x_mean);

        let mut w = Array1::<f64>::zeros(p);
        let mut b = y.mean().unwrap_or(0.0);
        let scale = self.c / n as f64;

        for t in 0..self.max_iter {
            let residual = y - &(xc.dot(&w) + b);
            let mut grad_w = w.clone();
            let mut grad_b = 0.0;
            for (i, &r) in residual.iter().enumerate() {
                if r.abs() > self.epsilon {
                    let s = r.signum();
                    let row = xc.row(i);
                    grad_w.zip_mut_with(&row, |g, &xi| *g -= scale * s * xi);
                    grad_b -= scale * s;
                }
            }
            let norm = (grad_w.dot(&grad_w) + grad_b * grad_b).sqrt();
            if norm < self.tol {
                break;
            }
            // normalized subgradient steps with a diminishing schedule keep
            // the iteration stable regardless of feature scale
            let lr = 1.0 / (1.0 + t as f64).sqrt() / norm;
            w.zip_mut_with(&grad_w, |wi, &g| *wi -= lr * g);
            b -= lr * grad_b;
        }

        self.fitted = Some(SvrFit {
            coef: w,
            intercept: b,
            x_mean,
            feature_names: feature_names.to_vec(),
        });
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, PredageError> {
        let fit = self.fitted.as_ref().ok_or(PredageError::NotFitted)?;
        check_predict_width(x, fit.feature_names.len())?;
        let centered = center_columns(x, &fit.x_mean);
        Ok(centered.dot(&fit.coef) + fit.intercept)
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

    #[test]
    fn svr_tracks_a_clean_linear_relation() {
        let x = array![
            [0.0],
            [1.0],
            [2.0],
            [3.0],
            [4.0],
            [5.0],
            [6.0],
            [7.0]
        ];
        let y = x.column(0).mapv(|v| 0.8 * v + 1.0);
        let mut model = LinearSvr {
            c: 10.0,
            ..LinearSvr::default()
        };
        model
            .fit(&x, &y, &["pet_roi".to_string()])
            .unwrap();
        let pred = model.predict(&x).unwrap();
        let mae = pred
            .iter()
            .zip(y.iter())
            .map(|(p, t)| (p - t).abs())
            .sum::<f64>()
            / y.len() as f64;
        assert!(mae < 0.3, "mae was {}", mae);
        let w = model.feature_weights().unwrap();
        assert_abs_diff_eq!(w.values[0], 0.8, epsilon = 0.3);
    }
}
