//! Feature-weight extraction from fitted estimators.
//!
//! Each model family exposes its weights through the
//! [`Regressor::feature_weights`](crate::models::Regressor::feature_weights)
//! capability: linear families return their coefficient vector, the tree
//! family its impurity importances, baselines a single weight of 1 under
//! `dummy`, the Gaussian-process family a single zero under `gpr`, and the
//! stacking family the recursive concatenation of its branches plus the
//! blender. Extraction reads fitted state only; nothing is refitted.

use crate::data::Frame;
use crate::error::PredageError;
use crate::models::Regressor;

/// Single-row table: columns are feature names, values the per-feature
/// importances/coefficients of the fitted estimator.
pub fn get_feature_weights(model: &dyn Regressor) -> Result<Frame, PredageError> {
    let weights = model.feature_weights()?;
    Frame::single_row(weights.names, weights.values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::baseline::DummyRegressor;
    use crate::models::gpr::GprRegressor;
    use crate::models::linear::ArdRegression;
    use crate::models::stacking::{Branch, StackingRegressor};
    use crate::models::linear::BayesianRidge;
    use ndarray::{Array1, Array2};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn fitted_inputs(n: usize) -> (Array2<f64>, Array1<f64>, Vec<String>) {
        let mut rng = StdRng::seed_from_u64(17);
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
            let row: Vec<f64> = (0..10).map(|_| rng.gen_range(0.0..1.0)).collect();
            y.push(row.iter().sum::<f64>());
            flat.extend(row);
        }
        (
            Array2::from_shape_vec((n, 10), flat).unwrap(),
            Array1::from_vec(y),
            names,
        )
    }

    #[test]
    fn linear_weights_have_one_column_per_feature() {
        let (x, y, names) = fitted_inputs(100);
        let mut model = ArdRegression::default();
        model.fit(&x, &y, &names).unwrap();
        let table = get_feature_weights(&model).unwrap();
        assert_eq!(table.nrows(), 1);
        assert_eq!(table.ncols(), 10);
        assert_eq!(table.columns(), names.as_slice());
    }

    #[test]
    fn stacking_weights_cover_branches_and_blender() {
        let (x, y, names) = fitted_inputs(100);
        let mut model = StackingRegressor::new(vec![
            Branch::new("mri", "^mri", Box::new(BayesianRidge::default())),
            Branch::new("pet", "^pet", Box::new(BayesianRidge::default())),
        ]);
        model.fit(&x, &y, &names).unwrap();
        let table = get_feature_weights(&model).unwrap();
        assert_eq!(table.nrows(), 1);
        assert_eq!(table.ncols(), 12);
    }

    #[test]
    fn dummy_weights_are_a_single_synthetic_column() {
        let (x, y, names) = fitted_inputs(20);
        let mut model = DummyRegressor::default();
        model.fit(&x, &y, &names).unwrap();
        let table = get_feature_weights(&model).unwrap();
        assert_eq!(table.nrows(), 1);
        assert_eq!(table.ncols(), 1);
        assert_eq!(table.columns(), &["dummy".to_string()]);
    }

    #[test]
    fn gpr_weights_are_a_single_zero_column() {
        let (x, y, names) = fitted_inputs(30);
        let mut model = GprRegressor::rbf();
        model.fit(&x, &y, &names).unwrap();
        let table = get_feature_weights(&model).unwrap();
        assert_eq!(table.ncols(), 1);
        assert_eq!(table.columns(), &["gpr".to_string()]);
        assert_eq!(table.values()[(0, 0)], 0.0);
    }

    #[test]
    fn unfitted_models_cannot_be_extracted() {
        let model = ArdRegression::default();
        assert!(get_feature_weights(&model).is_err());
    }
}
