//! Two-branch stacked regressor.
//!
//! Each branch restricts the feature matrix to the columns matching its
//! modality pattern and feeds them to its base estimator. A Bayesian-ridge
//! blender combines the branch predictions; it is trained on out-of-fold
//! branch predictions so the blender never sees in-sample outputs. Branch
//! models are refitted on the full data afterwards.

use ndarray::{Array1, Array2, Axis};
use regex::Regex;

use crate::config::ParamValue;
use crate::cv::KFold;
use crate::error::PredageError;
use crate::models::linear::BayesianRidge;
use crate::models::{check_training_shapes, FeatureWeights, Regressor};

pub struct Branch {
    pub key: String,
    pub pattern: String,
    pub model: Box<dyn Regressor>,
    col_idx: Vec<usize>,
    col_names: Vec<String>,
}

impl Branch {
    pub fn new(key: &str, pattern: &str, model: Box<dyn Regressor>) -> Self {
        Branch {
            key: key.to_string(),
            pattern: pattern.to_string(),
            model,
            col_idx: Vec::new(),
            col_names: Vec::new(),
        }
    }

    fn bind(&mut self, feature_names: &[String]) -> Result<(), PredageError> {
        let re = Regex::new(&self.pattern).map_err(|e| PredageError::InvalidParam {
            param: format!("{}__pattern", self.key),
            reason: e.to_string(),
        })?;
        self.col_idx = feature_names
            .iter()
            .enumerate()
            .filter(|(_, name)| re.is_match(name))
            .map(|(i, _)| i)
            .collect();
        if self.col_idx.is_empty() {
            return Err(PredageError::MissingColumn(format!(
                "no columns match branch pattern '{}'",
                self.pattern
            )));
        }
        self.col_names = self
            .col_idx
            .iter()
            .map(|&i| feature_names[i].clone())
            .collect();
        Ok(())
    }

    fn view(&self, x: &Array2<f64>) -> Array2<f64> {
        x.select(Axis(1), &self.col_idx)
    }
}

impl Clone for Branch {
    fn clone(&self) -> Self {
        Branch {
            key: self.key.clone(),
            pattern: self.pattern.clone(),
            model: self.model.clone_box(),
            col_idx: self.col_idx.clone(),
            col_names: self.col_names.clone(),
        }
    }
}

pub struct StackingRegressor {
    branches: Vec<Branch>,
    final_estimator: BayesianRidge,
    cv_splits: usize,
    seed: u64,
    n_features: Option<usize>,
}

impl StackingRegressor {
    pub fn new(branches: Vec<Branch>) -> Self {
        StackingRegressor {
            branches,
            final_estimator: BayesianRidge::default(),
            cv_splits: 5,
            seed: 42,
            n_features: None,
        }
    }

    fn branch_keys(&self) -> Vec<String> {
        self.branches.iter().map(|b| b.key.clone()).collect()
    }
}

impl Clone for StackingRegressor {
    fn clone(&self) -> Self {
        StackingRegressor {
            branches: self.branches.clone(),
            final_estimator: self.final_estimator.clone(),
            cv_splits: self.cv_splits,
            seed: self.seed,
            n_features: self.n_features,
        }
    }
}

impl Regressor for StackingRegressor {
    fn family(&self) -> &'static str {
        "stacking"
    }

    /// Parameters address the branches by key (`pet__alpha_1`) or the
    /// blender (`final__alpha_1`).
    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<(), PredageError> {
        if let Some((head, rest)) = name.split_once("__") {
            if head == "final" {
                return self.final_estimator.set_param(rest, value);
            }
            if let Some(branch) = self.branches.iter_mut().find(|b| b.key == head) {
                return branch.model.set_param(rest, value);
            }
            return Err(PredageError::UnknownParam {
                target: "stacking".to_string(),
                param: name.to_string(),
            });
        }
        match name {
            "cv" => {
                self.cv_splits =
                    value.as_usize().ok_or_else(|| PredageError::InvalidParam {
                        param: name.to_string(),
                        reason: format!("expected a non-negative integer, got '{}'", value),
                    })?
            }
            "seed" => {
                self.seed = value.as_u64().ok_or_else(|| PredageError::InvalidParam {
                    param: name.to_string(),
                    reason: format!("expected a non-negative integer, got '{}'", value),
                })?
            }
            _ => {
                return Err(PredageError::UnknownParam {
                    target: "stacking".to_string(),
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
        for branch in self.branches.iter_mut() {
            branch.bind(feature_names)?;
        }

        // out-of-fold branch predictions feed the blender
        let splits = self.cv_splits.min(n).max(2);
        let folds = KFold::new(splits, true, self.seed).split(n);
        let mut z = Array2::<f64>::zeros((n, self.branches.len()));
        for (train_rows, test_rows) in &folds {
            let y_train = y.select(Axis(0), train_rows);
            for (b, branch) in self.branches.iter().enumerate() {
                let bx = branch.view(x);
                let mut model = branch.model.clone_box();
                model.fit(
                    &bx.select(Axis(0), train_rows),
                    &y_train,
                    &branch.col_names,
                )?;
                let pred = model.predict(&bx.select(Axis(0), test_rows))?;
                for (k, &row) in test_rows.iter().enumerate() {
                    z[(row, b)] = pred[k];
                }
            }
        }
        self.final_estimator.fit(&z, y, &self.branch_keys())?;

        // refit every branch on the full data
        for branch in self.branches.iter_mut() {
            let bx = branch.view(x);
            branch.model.fit(&bx, y, &branch.col_names.clone())?;
        }

        self.n_features = Some(feature_names.len());
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, PredageError> {
        let n_features = self.n_features.ok_or(PredageError::NotFitted)?;
        if x.ncols() != n_features {
            return Err(PredageError::ShapeMismatch(format!(
                "stacking model was fitted on {} features but asked to predict on {}",
                n_features,
                x.ncols()
            )));
        }
        let mut z = Array2::<f64>::zeros((x.nrows(), self.branches.len()));
        for (b, branch) in self.branches.iter().enumerate() {
            let pred = branch.model.predict(&branch.view(x))?;
            z.column_mut(b).assign(&pred);
        }
        self.final_estimator.predict(&z)
    }

    /// Branch inner-model weights concatenated with the blender's weights,
    /// the latter named by branch key (one scalar input per branch).
    fn feature_weights(&self) -> Result<FeatureWeights, PredageError> {
        if self.n_features.is_none() {
            return Err(PredageError::NotFitted);
        }
        let mut names = Vec::new();
        let mut values = Vec::new();
        for branch in &self.branches {
            let w = branch.model.feature_weights()?;
            names.extend(w.names);
            values.extend(w.values);
        }
        let blender = self.final_estimator.feature_weights()?;
        names.extend(blender.names);
        values.extend(blender.values);
        Ok(FeatureWeights { names, values })
    }

    fn clone_box(&self) -> Box<dyn Regressor> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::linear::BayesianRidge;
    use ndarray::Array2;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn two_modality_data(n: usize) -> (Array2<f64>, Array1<f64>, Vec<String>) {
        let mut rng = StdRng::seed_from_u64(5);
        let names: Vec<String> = (0..10)
            .map(|i| {
                if i < 5 {
                    format!("mri_{}", i)
                } else {
                    format!("pet_{}", i)
                }
            })
            .collect();
        let mut flat = Vec::with_capacity(n * 10);
        let mut y = Vec::with_capacity(n);
        for _ in 0..n {
            let row: Vec<f64> = (0..10).map(|_| rng.gen_range(-1.0..1.0)).collect();
            y.push(row[0] * 2.0 + row[7] - 0.5);
            flat.extend(row);
        }
        (
            Array2::from_shape_vec((n, 10), flat).unwrap(),
            Array1::from_vec(y),
            names,
        )
    }

    fn two_branch_model() -> StackingRegressor {
        StackingRegressor::new(vec![
            Branch::new("mri", "^mri", Box::new(BayesianRidge::default())),
            Branch::new("pet", "^pet", Box::new(BayesianRidge::default())),
        ])
    }

    #[test]
    fn stacked_weights_concatenate_branches_and_blender() {
        let (x, y, names) = two_modality_data(100);
        let mut model = two_branch_model();
        model.fit(&x, &y, &names).unwrap();
        let w = model.feature_weights().unwrap();
        assert_eq!(w.names.len(), 12);
        assert_eq!(w.values.len(), 12);
        assert_eq!(w.names[0], "mri_0");
        assert_eq!(w.names[10], "mri");
        assert_eq!(w.names[11], "pet");
    }

    #[test]
    fn stacked_predictions_follow_the_signal() {
        let (x, y, names) = two_modality_data(120);
        let mut model = two_branch_model();
        model.fit(&x, &y, &names).unwrap();
        let pred = model.predict(&x).unwrap();
        let mae = pred
            .iter()
            .zip(y.iter())
            .map(|(p, t)| (p - t).abs())
            .sum::<f64>()
            / y.len() as f64;
        assert!(mae < 0.2, "mae was {}", mae);
    }

    #[test]
    fn unmatched_branch_pattern_is_an_error() {
        let (x, y, names) = two_modality_data(20);
        let mut model = StackingRegressor::new(vec![
            Branch::new("ref", "^ref", Box::new(BayesianRidge::default())),
            Branch::new("pet", "^pet", Box::new(BayesianRidge::default())),
        ]);
        assert!(model.fit(&x, &y, &names).is_err());
    }
}
