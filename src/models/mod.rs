//! Regression estimators and the trait they share.
//!
//! Every estimator implements [`Regressor`]: fit/predict on an `ndarray`
//! feature matrix with the feature names captured at fit time, optional
//! predictive standard deviations, string-addressed hyperparameters for the
//! grid search, and a per-family feature-weight capability. The weight
//! capability defaults to an explicit "model type not supported" error so an
//! estimator without a weight notion fails loudly instead of silently.
pub mod baseline;
pub mod gbt;
pub mod gpr;
pub mod linear;
pub mod stacking;
pub mod svr;

use ndarray::{Array1, Array2};

use crate::config::ParamValue;
use crate::error::PredageError;

/// Per-feature importances/coefficients of a fitted estimator, single row.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureWeights {
    pub names: Vec<String>,
    pub values: Vec<f64>,
}

pub trait Regressor: Send + Sync {
    /// Model family identifier used in dispatch errors.
    fn family(&self) -> &'static str;

    /// Set one hyperparameter by name; unknown names are a configuration
    /// error carrying the family and parameter.
    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<(), PredageError>;

    /// Fit on `x` (samples x features) against `y`, capturing
    /// `feature_names` for later weight extraction.
    fn fit(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        feature_names: &[String],
    ) -> Result<(), PredageError>;

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, PredageError>;

    /// Predictive standard deviation, when the family supports one.
    fn predict_std(&self, _x: &Array2<f64>) -> Result<Option<Array1<f64>>, PredageError> {
        Ok(None)
    }

    /// Per-feature weights from fitted-model introspection alone.
    fn feature_weights(&self) -> Result<FeatureWeights, PredageError> {
        Err(PredageError::UnsupportedModel(self.family().to_string()))
    }

    fn clone_box(&self) -> Box<dyn Regressor>;
}

impl Clone for Box<dyn Regressor> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Reject configuration values of the wrong kind with the parameter name.
pub(crate) fn require_f64(name: &str, value: &ParamValue) -> Result<f64, PredageError> {
    value.as_f64().ok_or_else(|| PredageError::InvalidParam {
        param: name.to_string(),
        reason: format!("expected a number, got '{}'", value),
    })
}

pub(crate) fn require_usize(name: &str, value: &ParamValue) -> Result<usize, PredageError> {
    value.as_usize().ok_or_else(|| PredageError::InvalidParam {
        param: name.to_string(),
        reason: format!("expected a non-negative integer, got '{}'", value),
    })
}

/// Subtract per-column means from every row.
pub(crate) fn center_columns(x: &Array2<f64>, means: &Array1<f64>) -> Array2<f64> {
    let mut centered = x.to_owned();
    for mut row in centered.rows_mut() {
        row -= means;
    }
    centered
}

/// Shape check shared by all `fit` implementations.
pub(crate) fn check_training_shapes(
    x: &Array2<f64>,
    y: &Array1<f64>,
    feature_names: &[String],
) -> Result<(), PredageError> {
    if x.nrows() != y.len() {
        return Err(PredageError::LengthMismatch {
            expected: x.nrows(),
            got: y.len(),
        });
    }
    if x.ncols() != feature_names.len() {
        return Err(PredageError::ShapeMismatch(format!(
            "feature matrix has {} columns but {} feature names were supplied",
            x.ncols(),
            feature_names.len()
        )));
    }
    Ok(())
}

/// Shape check shared by all `predict` implementations.
pub(crate) fn check_predict_width(
    x: &Array2<f64>,
    fitted_features: usize,
) -> Result<(), PredageError> {
    if x.ncols() != fitted_features {
        return Err(PredageError::ShapeMismatch(format!(
            "model was fitted on {} features but asked to predict on {}",
            fitted_features,
            x.ncols()
        )));
    }
    Ok(())
}
