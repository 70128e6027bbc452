//! Gradient-boosted regression trees with squared-error loss.
//!
//! The booster records the impurity (variance) reduction of every split per
//! feature while fitting, so feature importances are available from the
//! fitted model alone.

use ndarray::{Array1, Array2, Axis};

use crate::config::ParamValue;
use crate::error::PredageError;
use crate::models::{
    check_predict_width, check_training_shapes, require_f64, require_usize, FeatureWeights,
    Regressor,
};

#[derive(Debug, Clone)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn predict_row(&self, row: &[f64]) -> f64 {
        let mut at = 0;
        loop {
            match &self.nodes[at] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    at = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

#[derive(Debug, Clone)]
struct GbtFit {
    base: f64,
    trees: Vec<Tree>,
    importances: Vec<f64>,
    feature_names: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct GbtRegressor {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_split: usize,
    fitted: Option<GbtFit>,
}

impl Default for GbtRegressor {
    fn default() -> Self {
        GbtRegressor {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_split: 2,
            fitted: None,
        }
    }
}

impl GbtRegressor {
    fn grow(
        &self,
        x: &Array2<f64>,
        residual: &Array1<f64>,
        rows: Vec<usize>,
        depth: usize,
        nodes: &mut Vec<Node>,
        importances: &mut [f64],
    ) -> usize {
        let mean = rows.iter().map(|&i| residual[i]).sum::<f64>() / rows.len() as f64;
        if depth >= self.max_depth || rows.len() < self.min_samples_split {
            nodes.push(Node::Leaf { value: mean });
            return nodes.len() - 1;
        }

        let best = best_split(x, residual, &rows);
        let Some(best) = best else {
            nodes.push(Node::Leaf { value: mean });
            return nodes.len() - 1;
        };

        importances[best.feature] += best.gain;
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&i| x[(i, best.feature)] <= best.threshold);

        let at = nodes.len();
        nodes.push(Node::Leaf { value: mean }); // placeholder, patched below
        let left = self.grow(x, residual, left_rows, depth + 1, nodes, importances);
        let right = self.grow(x, residual, right_rows, depth + 1, nodes, importances);
        nodes[at] = Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        };
        at
    }
}

/// Best variance-reducing split over all features, scanning the boundaries
/// between distinct sorted values.
fn best_split(x: &Array2<f64>, residual: &Array1<f64>, rows: &[usize]) -> Option<SplitCandidate> {
    let n = rows.len() as f64;
    let total_sum: f64 = rows.iter().map(|&i| residual[i]).sum();
    let total_sq: f64 = rows.iter().map(|&i| residual[i] * residual[i]).sum();
    let parent_sse = total_sq - total_sum * total_sum / n;

    let mut best: Option<SplitCandidate> = None;
    for feature in 0..x.ncols() {
        let mut order: Vec<usize> = rows.to_vec();
        order.sort_by(|&a, &b| {
            x[(a, feature)]
                .partial_cmp(&x[(b, feature)])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut left_sum = 0.0;
        let mut left_sq = 0.0;
        for (k, &i) in order.iter().enumerate().take(order.len() - 1) {
            left_sum += residual[i];
            left_sq += residual[i] * residual[i];
            let next = order[k + 1];
            if x[(i, feature)] == x[(next, feature)] {
                continue;
            }
            let n_left = (k + 1) as f64;
            let n_right = n - n_left;
            let right_sum = total_sum - left_sum;
            let right_sq = total_sq - left_sq;
            let sse = (left_sq - left_sum * left_sum / n_left)
                + (right_sq - right_sum * right_sum / n_right);
            let gain = parent_sse - sse;
            if gain > best.as_ref().map_or(0.0, |b| b.gain) {
                best = Some(SplitCandidate {
                    feature,
                    threshold: 0.5 * (x[(i, feature)] + x[(next, feature)]),
                    gain,
                });
            }
        }
    }
    best
}

impl Regressor for GbtRegressor {
    fn family(&self) -> &'static str {
        "tree"
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<(), PredageError> {
        match name {
            "n_estimators" => self.n_estimators = require_usize(name, value)?,
            "learning_rate" => self.learning_rate = require_f64(name, value)?,
            "max_depth" => self.max_depth = require_usize(name, value)?,
            "min_samples_split" => self.min_samples_split = require_usize(name, value)?,
            _ => {
                return Err(PredageError::UnknownParam {
                    target: "gbtregressor".to_string(),
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
        let base = y.mean().unwrap_or(0.0);
        let mut prediction = Array1::<f64>::from_elem(y.len(), base);
        let mut trees = Vec::with_capacity(self.n_estimators);
        let mut importances = vec![0.0; x.ncols()];

        for _ in 0..self.n_estimators {
            let residual = y - &prediction;
            let mut nodes = Vec::new();
            let rows: Vec<usize> = (0..x.nrows()).collect();
            self.grow(x, &residual, rows, 0, &mut nodes, &mut importances);
            let tree = Tree { nodes };
            for (i, row) in x.axis_iter(Axis(0)).enumerate() {
                let row: Vec<f64> = row.iter().copied().collect();
                prediction[i] += self.learning_rate * tree.predict_row(&row);
            }
            trees.push(tree);
        }

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for v in importances.iter_mut() {
                *v /= total;
            }
        }

        self.fitted = Some(GbtFit {
            base,
            trees,
            importances,
            feature_names: feature_names.to_vec(),
        });
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, PredageError> {
        let fit = self.fitted.as_ref().ok_or(PredageError::NotFitted)?;
        check_predict_width(x, fit.feature_names.len())?;
        let mut out = Array1::<f64>::from_elem(x.nrows(), fit.base);
        for (i, row) in x.axis_iter(Axis(0)).enumerate() {
            let row: Vec<f64> = row.iter().copied().collect();
            for tree in &fit.trees {
                out[i] += self.learning_rate * tree.predict_row(&row);
            }
        }
        Ok(out)
    }

    fn feature_weights(&self) -> Result<FeatureWeights, PredageError> {
        let fit = self.fitted.as_ref().ok_or(PredageError::NotFitted)?;
        Ok(FeatureWeights {
            names: fit.feature_names.clone(),
            values: fit.importances.clone(),
        })
    }

    fn clone_box(&self) -> Box<dyn Regressor> {
        Box::new(self.clone())
    }
}
