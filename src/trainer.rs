//! Nested cross-validation training.
//!
//! For each workflow the outer loop walks stratified-repeated folds; inside
//! every outer fold a plain k-fold grid search selects the hyperparameter
//! combination minimizing mean absolute error, the winner is refitted on the
//! full outer-train partition and evaluated on the held-out partition. All
//! per-fold predictions, scores, selected parameters and feature weights are
//! accumulated into one `WorkflowResults`. Any fold error aborts the whole
//! workflow; nothing partial is returned.

use std::collections::BTreeMap;

use ndarray::{Array1, Axis};
use rayon::prelude::*;

use crate::config::ParamValue;
use crate::cv::{KFold, RepeatedStratifiedKFold};
use crate::data::Frame;
use crate::error::PredageError;
use crate::pipeline::Pipeline;
use crate::workflow::{ParamRecord, Workflow, WorkflowResults};

pub struct Trainer;

impl Trainer {
    /// Train `workflow` on `data` under nested CV.
    ///
    /// `strat_col` stratifies the outer folds, `label_col` is the target.
    /// `n_jobs > 1` fans the inner grid-search candidates out across that
    /// many workers; the outer loop stays sequential so accumulated tables
    /// keep deterministic fold order.
    pub fn train(
        &self,
        data: &Frame,
        strat_col: &str,
        label_col: &str,
        cv_inner: &KFold,
        cv_outer: &RepeatedStratifiedKFold,
        workflow: &Workflow,
        n_jobs: usize,
    ) -> Result<WorkflowResults, PredageError> {
        let y_all = data.column(label_col)?;
        let strata = data.column(strat_col)?;
        let folds = cv_outer.split(&strata);

        let mut y_index: Vec<i64> = Vec::new();
        let mut result_rows: Vec<Vec<f64>> = Vec::new();
        let mut score_rows: Vec<Vec<f64>> = Vec::new();
        let mut weight_columns: Option<Vec<String>> = None;
        let mut weight_rows: Vec<Vec<f64>> = Vec::new();
        let mut best_params: Vec<ParamRecord> = Vec::new();
        let mut fold_ids: Vec<i64> = Vec::new();

        for (k, (train_rows, test_rows)) in folds.iter().enumerate() {
            let fold = (k + 1) as i64;
            let train = data.select_rows(train_rows);
            let test = data.select_rows(test_rows);
            let y_train = y_all.select(Axis(0), train_rows);
            let y_test = y_all.select(Axis(0), test_rows);
            log::info!(
                "training workflow '{}' on fold {} with {} training samples",
                workflow.name,
                fold,
                train.nrows()
            );
            self.log_split_strata(&strata, train_rows, test_rows);

            // inner grid search on the outer-train partition
            let selected = grid_search(
                &workflow.pipeline,
                &workflow.paramgrid,
                &train,
                &y_train,
                cv_inner,
                n_jobs,
            )?;

            // refit the winning configuration on the full outer-train split
            let mut pipe = workflow.pipeline.clone();
            for (path, value) in &selected {
                pipe.set_param(path, value)?;
            }
            pipe.fit(&train, &y_train)?;

            let pred = pipe.predict(&test)?;
            let std = pipe
                .predict_std(&test)?
                .unwrap_or_else(|| Array1::zeros(test.nrows()));

            let fold_mae = mean_absolute_error(&y_test, &pred);
            let fold_r2 = r2_score(&y_test, &pred);
            log::debug!(
                "fold {}: mae {:.3}, r2 {:.3}, best params {:?}",
                fold,
                fold_mae,
                fold_r2,
                selected
            );
            score_rows.push(vec![fold_mae, fold_r2]);

            let weights = pipe.model().feature_weights()?;
            match &weight_columns {
                None => weight_columns = Some(weights.names.clone()),
                Some(existing) if *existing != weights.names => {
                    return Err(PredageError::ShapeMismatch(format!(
                        "fold {} produced weight columns differing from earlier folds",
                        fold
                    )));
                }
                Some(_) => {}
            }
            weight_rows.push(weights.values);

            for (j, &row) in test_rows.iter().enumerate() {
                y_index.push(data.index()[row]);
                result_rows.push(vec![fold as f64, pred[j], std[j], y_test[j]]);
            }
            fold_ids.push(fold);
            best_params.push(selected);
        }

        let results = Frame::from_rows(
            y_index,
            vec![
                "fold".to_string(),
                "pred".to_string(),
                "std".to_string(),
                "true".to_string(),
            ],
            result_rows,
        )?;
        let scores = Frame::from_rows(
            fold_ids.clone(),
            vec!["mae".to_string(), "r2".to_string()],
            score_rows,
        )?;
        let weights = Frame::from_rows(
            fold_ids,
            weight_columns.unwrap_or_default(),
            weight_rows,
        )?;

        Ok(WorkflowResults {
            name: workflow.name.clone(),
            scores,
            results,
            best_params,
            weights,
        })
    }

    fn log_split_strata(&self, strata: &Array1<f64>, train: &[usize], test: &[usize]) {
        if !log::log_enabled!(log::Level::Trace) {
            return;
        }
        let mut counts: BTreeMap<u64, (usize, usize)> = BTreeMap::new();
        for &i in train {
            counts.entry(strata[i].to_bits()).or_default().0 += 1;
        }
        for &i in test {
            counts.entry(strata[i].to_bits()).or_default().1 += 1;
        }
        for (bits, (n_train, n_test)) in counts {
            log::trace!(
                "stratum {}: {} train / {} test",
                f64::from_bits(bits),
                n_train,
                n_test
            );
        }
    }
}

/// Mean inner-fold MAE of one candidate configuration.
fn evaluate_candidate(
    template: &Pipeline,
    candidate: &ParamRecord,
    train: &Frame,
    y_train: &Array1<f64>,
    inner_folds: &[(Vec<usize>, Vec<usize>)],
) -> Result<f64, PredageError> {
    let mut total = 0.0;
    for (fit_rows, val_rows) in inner_folds {
        let mut pipe = template.clone();
        for (path, value) in candidate {
            pipe.set_param(path, value)?;
        }
        let fit_frame = train.select_rows(fit_rows);
        let y_fit = y_train.select(Axis(0), fit_rows);
        pipe.fit(&fit_frame, &y_fit)?;

        let val_frame = train.select_rows(val_rows);
        let y_val = y_train.select(Axis(0), val_rows);
        let pred = pipe.predict(&val_frame)?;
        total += mean_absolute_error(&y_val, &pred);
    }
    Ok(total / inner_folds.len() as f64)
}

/// Grid search over the cartesian product of the parameter grid, selecting
/// the candidate with minimal mean inner MAE (first wins on ties, in grid
/// order, regardless of worker count).
fn grid_search(
    template: &Pipeline,
    grid: &BTreeMap<String, Vec<ParamValue>>,
    train: &Frame,
    y_train: &Array1<f64>,
    cv_inner: &KFold,
    n_jobs: usize,
) -> Result<ParamRecord, PredageError> {
    let candidates = grid_points(grid);
    let inner_folds = cv_inner.split(train.nrows());

    let scored: Vec<f64> = if n_jobs > 1 && candidates.len() > 1 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(n_jobs)
            .build()
            .map_err(|e| PredageError::Numeric(e.to_string()))?;
        pool.install(|| {
            candidates
                .par_iter()
                .map(|candidate| {
                    evaluate_candidate(template, candidate, train, y_train, &inner_folds)
                })
                .collect::<Result<Vec<f64>, PredageError>>()
        })?
    } else {
        candidates
            .iter()
            .map(|candidate| evaluate_candidate(template, candidate, train, y_train, &inner_folds))
            .collect::<Result<Vec<f64>, PredageError>>()?
    };

    let mut best = 0;
    for (i, score) in scored.iter().enumerate() {
        if *score < scored[best] {
            best = i;
        }
    }
    Ok(candidates.into_iter().nth(best).expect("at least one candidate"))
}

/// Cartesian product of the grid; an empty grid yields the single default
/// configuration.
fn grid_points(grid: &BTreeMap<String, Vec<ParamValue>>) -> Vec<ParamRecord> {
    let mut points: Vec<ParamRecord> = vec![ParamRecord::new()];
    for (path, values) in grid {
        let mut expanded = Vec::with_capacity(points.len() * values.len());
        for point in &points {
            for value in values {
                let mut next = point.clone();
                next.insert(path.clone(), value.clone());
                expanded.push(next);
            }
        }
        points = expanded;
    }
    points
}

pub fn mean_absolute_error(truth: &Array1<f64>, pred: &Array1<f64>) -> f64 {
    truth
        .iter()
        .zip(pred.iter())
        .map(|(t, p)| (t - p).abs())
        .sum::<f64>()
        / truth.len() as f64
}

/// Coefficient of determination without special cases: constant targets
/// yield NaN or -inf through ordinary floating-point division.
pub fn r2_score(truth: &Array1<f64>, pred: &Array1<f64>) -> f64 {
    let mean = truth.sum() / truth.len() as f64;
    let ss_tot = truth.iter().map(|t| (t - mean) * (t - mean)).sum::<f64>();
    let ss_res = truth
        .iter()
        .zip(pred.iter())
        .map(|(t, p)| (t - p) * (t - p))
        .sum::<f64>();
    1.0 - ss_res / ss_tot
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn grid_points_expand_the_cartesian_product() {
        let mut grid = BTreeMap::new();
        grid.insert(
            "model__a".to_string(),
            vec![ParamValue::Int(1), ParamValue::Int(2)],
        );
        grid.insert(
            "model__b".to_string(),
            vec![ParamValue::Int(3), ParamValue::Int(4), ParamValue::Int(5)],
        );
        assert_eq!(grid_points(&grid).len(), 6);
        assert_eq!(grid_points(&BTreeMap::new()), vec![ParamRecord::new()]);
    }

    #[test]
    fn scores_behave_on_simple_inputs() {
        let truth = array![1.0, 2.0, 3.0];
        let pred = array![1.0, 2.0, 5.0];
        assert!((mean_absolute_error(&truth, &pred) - 2.0 / 3.0).abs() < 1e-12);
        assert!(r2_score(&truth, &truth) == 1.0);
        // constant targets propagate through IEEE division
        let constant = array![2.0, 2.0, 2.0];
        assert!(r2_score(&constant, &constant).is_nan());
    }
}
