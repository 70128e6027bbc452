//! Workflows: one trainable (pipeline, model) pair, and the per-workflow
//! training results with their four persisted tabular artifacts.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{ParamGrid, ParamValue};
use crate::data::Frame;
use crate::error::PredageError;
use crate::model_builder::ModelRepresentation;
use crate::pipeline::{Pipeline, PipelineSpec};

/// One hyperparameter selection, keyed by parameter path.
pub type ParamRecord = BTreeMap<String, ParamValue>;

/// A trainable unit: the assembled pipeline with the model appended as its
/// final stage, named `pipeline_name + "_" + model_name`.
pub struct Workflow {
    pub name: String,
    pub pipe_name: String,
    pub model_name: String,
    pub pipeline: Pipeline,
    pub paramgrid: ParamGrid,
}

impl Workflow {
    pub fn new(pipe_spec: PipelineSpec, model: ModelRepresentation) -> Self {
        let name = format!("{}_{}", pipe_spec.name, model.name);
        Workflow {
            name,
            pipe_name: pipe_spec.name,
            model_name: model.name,
            pipeline: Pipeline::new(pipe_spec.steps, model.model),
            paramgrid: model.paramgrid,
        }
    }
}

/// Results of training one workflow under nested CV. Immutable after
/// creation; `save` then `load` reproduces equal tables.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowResults {
    pub name: String,
    /// One row per outer fold: mae, r2.
    pub scores: Frame,
    /// One row per subject: fold, pred, std, true; indexed by subject id.
    pub results: Frame,
    /// Selected hyperparameters per outer fold.
    pub best_params: Vec<ParamRecord>,
    /// One weight row per outer fold, columns are feature names.
    pub weights: Frame,
}

impl WorkflowResults {
    pub fn pipe_name(&self) -> &str {
        self.name.split('_').next().unwrap_or(&self.name)
    }

    pub fn model_name(&self) -> &str {
        self.name.split_once('_').map(|(_, m)| m).unwrap_or("")
    }

    fn artifact(dir: &Path, experiment: &str, workflow: &str, kind: &str) -> PathBuf {
        dir.join(format!("{}_{}_{}.csv", experiment, workflow, kind))
    }

    pub fn save(&self, dir: &Path, experiment: &str) -> anyhow::Result<()> {
        fs::create_dir_all(dir)?;
        self.scores
            .to_csv(&Self::artifact(dir, experiment, &self.name, "scores"))?;
        self.results
            .to_csv(&Self::artifact(dir, experiment, &self.name, "results"))?;
        self.weights
            .to_csv(&Self::artifact(dir, experiment, &self.name, "weights"))?;
        save_params(
            &Self::artifact(dir, experiment, &self.name, "best_params"),
            &self.best_params,
        )?;
        log::info!(
            "saved workflow '{}' artifacts under {}",
            self.name,
            dir.display()
        );
        Ok(())
    }

    pub fn load(dir: &Path, experiment: &str, workflow: &str) -> anyhow::Result<Self> {
        let scores = Frame::from_csv(&Self::artifact(dir, experiment, workflow, "scores"))?;
        let results = Frame::from_csv(&Self::artifact(dir, experiment, workflow, "results"))?;
        let weights = Frame::from_csv(&Self::artifact(dir, experiment, workflow, "weights"))?;
        let best_params =
            load_params(&Self::artifact(dir, experiment, workflow, "best_params"))?;
        Ok(WorkflowResults {
            name: workflow.to_string(),
            scores,
            results,
            best_params,
            weights,
        })
    }
}

/// Best-parameter records as CSV: one row per fold, columns the union of
/// parameter paths across folds.
fn save_params(path: &Path, records: &[ParamRecord]) -> anyhow::Result<()> {
    let mut columns: Vec<String> = Vec::new();
    for record in records {
        for key in record.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }
    columns.sort();

    let mut writer = csv::Writer::from_path(path)?;
    let mut header = vec!["fold".to_string()];
    header.extend(columns.iter().cloned());
    writer.write_record(&header)?;
    for (fold, record) in records.iter().enumerate() {
        let mut row = vec![(fold + 1).to_string()];
        for column in &columns {
            row.push(record.get(column).map(|v| v.to_string()).unwrap_or_default());
        }
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

fn load_params(path: &Path) -> anyhow::Result<Vec<ParamRecord>> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let columns: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();
    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let mut record = ParamRecord::new();
        for (column, field) in columns.iter().zip(row.iter().skip(1)) {
            if !field.is_empty() {
                record.insert(column.clone(), ParamValue::parse(field));
            }
        }
        records.push(record);
    }
    Ok(records)
}
