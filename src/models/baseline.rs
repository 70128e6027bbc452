//! Baseline estimators: a constant predictor and the identity passthrough
//! used to carry a precomputed reference brain-age prediction through a
//! stacking branch.

use ndarray::{Array1, Array2};

use crate::config::ParamValue;
use crate::error::PredageError;
use crate::models::{
    check_predict_width, check_training_shapes, require_f64, FeatureWeights, Regressor,
};

/// Predicts a constant derived from the training labels.
#[derive(Debug, Clone)]
pub struct DummyRegressor {
    pub strategy: String,
    pub constant: f64,
    fitted: Option<DummyFit>,
}

#[derive(Debug, Clone)]
struct DummyFit {
    value: f64,
    n_features: usize,
}

impl Default for DummyRegressor {
    fn default() -> Self {
        DummyRegressor {
            strategy: "mean".to_string(),
            constant: 0.0,
            fitted: None,
        }
    }
}

impl Regressor for DummyRegressor {
    fn family(&self) -> &'static str {
        "baseline"
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<(), PredageError> {
        match name {
            "strategy" => {
                let strategy = value.as_str().ok_or_else(|| PredageError::InvalidParam {
                    param: name.to_string(),
                    reason: format!("expected a string, got '{}'", value),
                })?;
                match strategy {
                    "mean" | "median" | "constant" => self.strategy = strategy.to_string(),
                    other => {
                        return Err(PredageError::InvalidParam {
                            param: name.to_string(),
                            reason: format!("unknown strategy '{}'", other),
                        })
                    }
                }
            }
            "constant" => self.constant = require_f64(name, value)?,
            _ => {
                return Err(PredageError::UnknownParam {
                    target: "dummyregressor".to_string(),
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
        let value = match self.strategy.as_str() {
            "median" => {
                let mut sorted = y.to_vec();
                sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                let mid = sorted.len() / 2;
                if sorted.len() % 2 == 0 {
                    0.5 * (sorted[mid - 1] + sorted[mid])
                } else {
                    sorted[mid]
                }
            }
            "constant" => self.constant,
            _ => y.mean().unwrap_or(0.0),
        };
        self.fitted = Some(DummyFit {
            value,
            n_features: x.ncols(),
        });
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, PredageError> {
        let fit = self.fitted.as_ref().ok_or(PredageError::NotFitted)?;
        check_predict_width(x, fit.n_features)?;
        Ok(Array1::from_elem(x.nrows(), fit.value))
    }

    /// Baselines have no real features to weight.
    fn feature_weights(&self) -> Result<FeatureWeights, PredageError> {
        if self.fitted.is_none() {
            return Err(PredageError::NotFitted);
        }
        Ok(FeatureWeights {
            names: vec!["dummy".to_string()],
            values: vec![1.0],
        })
    }

    fn clone_box(&self) -> Box<dyn Regressor> {
        Box::new(self.clone())
    }
}

/// Identity passthrough for a single precomputed prediction column.
#[derive(Debug, Clone, Default)]
pub struct ReferenceModel {
    fitted: Option<usize>,
}

impl Regressor for ReferenceModel {
    fn family(&self) -> &'static str {
        "baseline"
    }

    fn set_param(&mut self, name: &str, _value: &ParamValue) -> Result<(), PredageError> {
        Err(PredageError::UnknownParam {
            target: "reference".to_string(),
            param: name.to_string(),
        })
    }

    fn fit(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        feature_names: &[String],
    ) -> Result<(), PredageError> {
        check_training_shapes(x, y, feature_names)?;
        if x.ncols() != 1 {
            return Err(PredageError::ShapeMismatch(format!(
                "the reference model expects exactly one prediction column, got {}",
                x.ncols()
            )));
        }
        self.fitted = Some(1);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, PredageError> {
        let n_features = self.fitted.ok_or(PredageError::NotFitted)?;
        check_predict_width(x, n_features)?;
        Ok(x.column(0).to_owned())
    }

    fn feature_weights(&self) -> Result<FeatureWeights, PredageError> {
        if self.fitted.is_none() {
            return Err(PredageError::NotFitted);
        }
        Ok(FeatureWeights {
            names: vec!["dummy".to_string()],
            values: vec![1.0],
        })
    }

    fn clone_box(&self) -> Box<dyn Regressor> {
        Box::new(self.clone())
    }
}
