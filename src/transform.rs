//! Processing steps that run ahead of the model stage in a pipeline.
//!
//! Each step implements [`Transform`]: fit captures state from the training
//! frame, transform produces a new frame. Steps are boxed trait objects so a
//! pipeline can be cloned per grid-search candidate.

use std::collections::BTreeMap;

use ndarray::Array1;
use regex::Regex;

use crate::config::ParamValue;
use crate::data::Frame;
use crate::error::PredageError;
use crate::nodim::{
    estimate_ecdf, estimate_params, transform_ecdf_nodim, transform_nodim, Ecdf, GaussianParams,
};
use crate::prep::matched_subsample;

pub trait Transform: Send + Sync {
    /// Step identifier used in parameter-routing errors.
    fn label(&self) -> &'static str;

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<(), PredageError> {
        Err(PredageError::UnknownParam {
            target: self.label().to_string(),
            param: name.to_string(),
        })
    }

    fn fit(&mut self, frame: &Frame) -> Result<(), PredageError>;

    fn transform(&self, frame: &Frame) -> Result<Frame, PredageError>;

    fn clone_box(&self) -> Box<dyn Transform>;
}

impl Clone for Box<dyn Transform> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Per-column standardization to zero mean and unit variance.
#[derive(Debug, Clone)]
pub struct Scaler {
    pub with_mean: bool,
    pub with_std: bool,
    fitted: Option<(Vec<f64>, Vec<f64>)>,
}

impl Scaler {
    /// Floor on the fitted stddev to avoid division by zero.
    const MIN_STD: f64 = 1e-9;
}

impl Default for Scaler {
    fn default() -> Self {
        Scaler {
            with_mean: true,
            with_std: true,
            fitted: None,
        }
    }
}

impl Transform for Scaler {
    fn label(&self) -> &'static str {
        "scaler"
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<(), PredageError> {
        let flag = value.as_bool().ok_or_else(|| PredageError::InvalidParam {
            param: name.to_string(),
            reason: format!("expected a boolean, got '{}'", value),
        });
        match name {
            "with_mean" => self.with_mean = flag?,
            "with_std" => self.with_std = flag?,
            _ => {
                return Err(PredageError::UnknownParam {
                    target: self.label().to_string(),
                    param: name.to_string(),
                })
            }
        }
        Ok(())
    }

    fn fit(&mut self, frame: &Frame) -> Result<(), PredageError> {
        let n = frame.nrows() as f64;
        let mut means = Vec::with_capacity(frame.ncols());
        let mut stds = Vec::with_capacity(frame.ncols());
        for c in 0..frame.ncols() {
            let col = frame.values().column(c);
            let mean = col.sum() / n;
            let var = col.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
            means.push(mean);
            stds.push(var.sqrt().max(Self::MIN_STD));
        }
        self.fitted = Some((means, stds));
        Ok(())
    }

    fn transform(&self, frame: &Frame) -> Result<Frame, PredageError> {
        let (means, stds) = self.fitted.as_ref().ok_or(PredageError::NotFitted)?;
        if frame.ncols() != means.len() {
            return Err(PredageError::ShapeMismatch(format!(
                "scaler was fitted on {} columns, got {}",
                means.len(),
                frame.ncols()
            )));
        }
        let mut out = frame.clone();
        for c in 0..out.ncols() {
            for r in 0..out.nrows() {
                let mut v = out.get(r, c);
                if self.with_mean {
                    v -= means[c];
                }
                if self.with_std {
                    v /= stds[c];
                }
                out.set(r, c, v);
            }
        }
        Ok(out)
    }

    fn clone_box(&self) -> Box<dyn Transform> {
        Box::new(self.clone())
    }
}

/// Keep-list / drop-list column selection; exposes the fitted-in names.
#[derive(Debug, Clone, Default)]
pub struct SelectCols {
    pub keep: Option<Vec<String>>,
    pub drop: Option<Vec<String>>,
    fitted: Option<Vec<String>>,
}

impl SelectCols {
    pub fn feature_names(&self) -> Option<&[String]> {
        self.fitted.as_deref()
    }
}

impl Transform for SelectCols {
    fn label(&self) -> &'static str {
        "colselector"
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<(), PredageError> {
        let list = value
            .as_str_list()
            .ok_or_else(|| PredageError::InvalidParam {
                param: name.to_string(),
                reason: format!("expected a list of column names, got '{}'", value),
            });
        match name {
            "keep" => self.keep = Some(list?),
            "drop" => self.drop = Some(list?),
            _ => {
                return Err(PredageError::UnknownParam {
                    target: self.label().to_string(),
                    param: name.to_string(),
                })
            }
        }
        Ok(())
    }

    fn fit(&mut self, frame: &Frame) -> Result<(), PredageError> {
        let mut names: Vec<String> = match &self.keep {
            Some(keep) => {
                for name in keep {
                    frame.col_position(name)?;
                }
                keep.clone()
            }
            None => frame.columns().to_vec(),
        };
        if let Some(drop) = &self.drop {
            names.retain(|c| !drop.contains(c));
        }
        self.fitted = Some(names);
        Ok(())
    }

    fn transform(&self, frame: &Frame) -> Result<Frame, PredageError> {
        let names = self.fitted.as_ref().ok_or(PredageError::NotFitted)?;
        frame.select_columns(names)
    }

    fn clone_box(&self) -> Box<dyn Transform> {
        Box::new(self.clone())
    }
}

/// Per-dtype column transformer: numeric columns are standardized,
/// categorical columns are one-hot encoded on the categories seen at fit.
#[derive(Debug, Clone, Default)]
pub struct ColumnScaler {
    fitted: Option<ColumnScalerFit>,
}

#[derive(Debug, Clone)]
struct ColumnScalerFit {
    numeric: Vec<(String, f64, f64)>,
    categories: Vec<(String, Vec<f64>)>,
}

impl Transform for ColumnScaler {
    fn label(&self) -> &'static str {
        "columnscaler"
    }

    fn fit(&mut self, frame: &Frame) -> Result<(), PredageError> {
        let n = frame.nrows() as f64;
        let mut numeric = Vec::new();
        let mut categories = Vec::new();
        for name in frame.columns() {
            let col = frame.column(name)?;
            if frame.is_categorical(name) {
                let mut seen: Vec<f64> = Vec::new();
                for &v in col.iter() {
                    if !seen.contains(&v) {
                        seen.push(v);
                    }
                }
                seen.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                categories.push((name.clone(), seen));
            } else {
                let mean = col.sum() / n;
                let var = col.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
                numeric.push((name.clone(), mean, var.sqrt().max(Scaler::MIN_STD)));
            }
        }
        self.fitted = Some(ColumnScalerFit {
            numeric,
            categories,
        });
        Ok(())
    }

    fn transform(&self, frame: &Frame) -> Result<Frame, PredageError> {
        let fit = self.fitted.as_ref().ok_or(PredageError::NotFitted)?;
        let mut columns = Vec::new();
        let mut cols_data: Vec<Array1<f64>> = Vec::new();
        for (name, mean, std) in &fit.numeric {
            let col = frame.column(name)?;
            columns.push(name.clone());
            cols_data.push(col.mapv(|v| (v - mean) / std));
        }
        for (name, cats) in &fit.categories {
            let col = frame.column(name)?;
            for cat in cats {
                columns.push(format!("{}_{}", name, cat));
                cols_data.push(col.mapv(|v| if v == *cat { 1.0 } else { 0.0 }));
            }
        }
        let rows: Vec<Vec<f64>> = (0..frame.nrows())
            .map(|r| cols_data.iter().map(|c| c[r]).collect())
            .collect();
        Frame::from_rows(frame.index().to_vec(), columns, rows)
    }

    fn clone_box(&self) -> Box<dyn Transform> {
        Box::new(self.clone())
    }
}

/// Regex-based column selector-transformer: keeps matching columns in frame
/// order, drops the remainder.
#[derive(Debug, Clone)]
pub struct ColPattern {
    pub pattern: String,
    fitted: Option<Vec<String>>,
}

impl ColPattern {
    pub fn new(pattern: &str) -> Self {
        ColPattern {
            pattern: pattern.to_string(),
            fitted: None,
        }
    }
}

impl Transform for ColPattern {
    fn label(&self) -> &'static str {
        "colpattern"
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<(), PredageError> {
        match name {
            "pattern" => {
                self.pattern = value
                    .as_str()
                    .ok_or_else(|| PredageError::InvalidParam {
                        param: name.to_string(),
                        reason: format!("expected a string, got '{}'", value),
                    })?
                    .to_string()
            }
            _ => {
                return Err(PredageError::UnknownParam {
                    target: self.label().to_string(),
                    param: name.to_string(),
                })
            }
        }
        Ok(())
    }

    fn fit(&mut self, frame: &Frame) -> Result<(), PredageError> {
        let re = Regex::new(&self.pattern).map_err(|e| PredageError::InvalidParam {
            param: "pattern".to_string(),
            reason: e.to_string(),
        })?;
        let names: Vec<String> = frame
            .columns()
            .iter()
            .filter(|c| re.is_match(c))
            .cloned()
            .collect();
        if names.is_empty() {
            return Err(PredageError::MissingColumn(format!(
                "no columns match pattern '{}'",
                self.pattern
            )));
        }
        self.fitted = Some(names);
        Ok(())
    }

    fn transform(&self, frame: &Frame) -> Result<Frame, PredageError> {
        let names = self.fitted.as_ref().ok_or(PredageError::NotFitted)?;
        frame.select_columns(names)
    }

    fn clone_box(&self) -> Box<dyn Transform> {
        Box::new(self.clone())
    }
}

/// Divide every feature under a prefix by the intracranial-volume column.
#[derive(Debug, Clone)]
pub struct IcvNorm {
    pub pattern: String,
    pub icv_col: String,
}

impl Default for IcvNorm {
    fn default() -> Self {
        IcvNorm {
            pattern: "mri".to_string(),
            icv_col: "icv".to_string(),
        }
    }
}

impl Transform for IcvNorm {
    fn label(&self) -> &'static str {
        "icvnorm"
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<(), PredageError> {
        let text = value.as_str().ok_or_else(|| PredageError::InvalidParam {
            param: name.to_string(),
            reason: format!("expected a string, got '{}'", value),
        });
        match name {
            "pattern" => self.pattern = text?.to_string(),
            "icv_col" => self.icv_col = text?.to_string(),
            _ => {
                return Err(PredageError::UnknownParam {
                    target: self.label().to_string(),
                    param: name.to_string(),
                })
            }
        }
        Ok(())
    }

    fn fit(&mut self, frame: &Frame) -> Result<(), PredageError> {
        frame.col_position(&self.icv_col)?;
        Ok(())
    }

    fn transform(&self, frame: &Frame) -> Result<Frame, PredageError> {
        let icv = frame.column(&self.icv_col)?;
        let mut out = frame.clone();
        let targets: Vec<usize> = frame
            .columns()
            .iter()
            .enumerate()
            .filter(|(_, name)| name.starts_with(&self.pattern))
            .map(|(i, _)| i)
            .collect();
        for c in targets {
            for r in 0..out.nrows() {
                let v = out.get(r, c) / icv[r];
                out.set(r, c, v);
            }
        }
        Ok(out)
    }

    fn clone_box(&self) -> Box<dyn Transform> {
        Box::new(self.clone())
    }
}

/// One fitted distribution per (feature, group).
#[derive(Debug, Clone)]
enum FittedDist {
    Gaussian(GaussianParams),
    Empirical(Ecdf),
}

/// Distribution-mapping harmonization between the two cohorts of a
/// categorical group column.
///
/// Fitting subsamples the false group so every stratification bucket
/// contributes the true group's count, then estimates each eligible
/// feature's distribution per group. Transforming remaps true-group values
/// through the source-to-target inverse-CDF composition; false-group rows
/// and non-eligible features pass through unchanged.
#[derive(Debug, Clone)]
pub struct DiMap {
    pub cat_col: String,
    pub sample_col: String,
    pub pattern: String,
    pub match_nsamples: bool,
    pub method: String,
    pub check_domain: bool,
    pub seed: u64,
    fitted: Option<DiMapFit>,
}

#[derive(Debug, Clone)]
struct DiMapFit {
    columns: Vec<String>,
    from: BTreeMap<String, FittedDist>,
    to: BTreeMap<String, FittedDist>,
}

impl DiMap {
    pub fn new(cat_col: &str, sample_col: &str, pattern: &str) -> Self {
        DiMap {
            cat_col: cat_col.to_string(),
            sample_col: sample_col.to_string(),
            pattern: pattern.to_string(),
            match_nsamples: true,
            method: "gaussian".to_string(),
            check_domain: false,
            seed: 0,
            fitted: None,
        }
    }

    fn estimate(&self, values: &[f64]) -> FittedDist {
        if self.method == "ecdf" {
            FittedDist::Empirical(estimate_ecdf(values))
        } else {
            FittedDist::Gaussian(estimate_params(values))
        }
    }

    fn map_values(
        &self,
        from: &FittedDist,
        to: &FittedDist,
        values: &[f64],
        column: &str,
    ) -> Result<Vec<f64>, PredageError> {
        if self.check_domain {
            let (lo, hi) = match from {
                FittedDist::Gaussian(p) => (p.mu - 5.0 * p.std, p.mu + 5.0 * p.std),
                FittedDist::Empirical(e) => (
                    *e.x.first().unwrap_or(&f64::NEG_INFINITY),
                    *e.x.last().unwrap_or(&f64::INFINITY),
                ),
            };
            if values.iter().any(|&v| v < lo || v > hi) {
                return Err(PredageError::OutOfDomain {
                    column: column.to_string(),
                    lo,
                    hi,
                });
            }
        }
        match (from, to) {
            (FittedDist::Gaussian(p1), FittedDist::Gaussian(p2)) => {
                transform_nodim(p1, p2, values)
            }
            (FittedDist::Empirical(e1), FittedDist::Empirical(e2)) => {
                transform_ecdf_nodim(e1, e2, values)
            }
            _ => Err(PredageError::Numeric(
                "mismatched distribution kinds".to_string(),
            )),
        }
    }
}

impl Transform for DiMap {
    fn label(&self) -> &'static str {
        "dimap"
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<(), PredageError> {
        match name {
            "cat_col" | "sample_col" | "pattern" | "method" => {
                let text = value
                    .as_str()
                    .ok_or_else(|| PredageError::InvalidParam {
                        param: name.to_string(),
                        reason: format!("expected a string, got '{}'", value),
                    })?
                    .to_string();
                match name {
                    "cat_col" => self.cat_col = text,
                    "sample_col" => self.sample_col = text,
                    "pattern" => self.pattern = text,
                    _ => {
                        if text != "gaussian" && text != "ecdf" {
                            return Err(PredageError::InvalidParam {
                                param: name.to_string(),
                                reason: format!("unknown method '{}'", text),
                            });
                        }
                        self.method = text;
                    }
                }
            }
            "match_nsamples" => {
                self.match_nsamples =
                    value.as_bool().ok_or_else(|| PredageError::InvalidParam {
                        param: name.to_string(),
                        reason: format!("expected a boolean, got '{}'", value),
                    })?
            }
            "check_domain" => {
                self.check_domain =
                    value.as_bool().ok_or_else(|| PredageError::InvalidParam {
                        param: name.to_string(),
                        reason: format!("expected a boolean, got '{}'", value),
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
                    target: self.label().to_string(),
                    param: name.to_string(),
                })
            }
        }
        Ok(())
    }

    fn fit(&mut self, frame: &Frame) -> Result<(), PredageError> {
        let matched = matched_subsample(
            frame,
            &self.cat_col,
            &self.sample_col,
            self.match_nsamples,
            self.seed,
        )?;
        let cat = matched.column(&self.cat_col)?;
        let true_rows: Vec<usize> = (0..matched.nrows()).filter(|&i| cat[i] > 0.5).collect();
        let false_rows: Vec<usize> = (0..matched.nrows()).filter(|&i| cat[i] <= 0.5).collect();

        let columns: Vec<String> = frame
            .columns()
            .iter()
            .filter(|c| {
                c.starts_with(&self.pattern)
                    && **c != self.cat_col
                    && **c != self.sample_col
            })
            .cloned()
            .collect();

        let mut from = BTreeMap::new();
        let mut to = BTreeMap::new();
        for name in &columns {
            let col = matched.column(name)?;
            let true_vals: Vec<f64> = true_rows.iter().map(|&i| col[i]).collect();
            let false_vals: Vec<f64> = false_rows.iter().map(|&i| col[i]).collect();
            from.insert(name.clone(), self.estimate(&true_vals));
            to.insert(name.clone(), self.estimate(&false_vals));
        }

        log::debug!(
            "dimap fitted {} columns on {} true / {} false rows",
            columns.len(),
            true_rows.len(),
            false_rows.len()
        );
        self.fitted = Some(DiMapFit { columns, from, to });
        Ok(())
    }

    fn transform(&self, frame: &Frame) -> Result<Frame, PredageError> {
        let fit = self.fitted.as_ref().ok_or(PredageError::NotFitted)?;
        let cat = frame.column(&self.cat_col)?;
        let true_rows: Vec<usize> = (0..frame.nrows()).filter(|&i| cat[i] > 0.5).collect();
        if true_rows.is_empty() {
            return Ok(frame.clone());
        }

        let mut out = frame.clone();
        for name in &fit.columns {
            let pos = out.col_position(name)?;
            let values: Vec<f64> = true_rows.iter().map(|&i| out.get(i, pos)).collect();
            let mapped = self.map_values(&fit.from[name], &fit.to[name], &values, name)?;
            for (&row, &v) in true_rows.iter().zip(mapped.iter()) {
                out.set(row, pos, v);
            }
        }
        Ok(out)
    }

    fn clone_box(&self) -> Box<dyn Transform> {
        Box::new(self.clone())
    }
}
