//! Experiment orchestration: resolve an experiment entry into workflows,
//! train them sequentially, persist per-workflow artifacts, and aggregate
//! everything into one queryable results object.

use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::config::{
    get_entry, read_experiments, read_models, read_pipelines, DataConfig,
};
use crate::cv::CvSpec;
use crate::data::Frame;
use crate::error::PredageError;
use crate::model_builder::ModelBuilder;
use crate::pipeline::PipelineBuilder;
use crate::steps::StepRegistry;
use crate::trainer::Trainer;
use crate::workflow::{Workflow, WorkflowResults};

/// Which per-workflow table to look up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    Predictions,
    Scores,
    Weights,
}

/// A resolved experiment: file paths, CV settings, data filters and the
/// (pipeline, model) pairs to run.
pub struct ExperimentSpec {
    pub name: String,
    pub description: String,
    pub result_dir: PathBuf,
    pub data_file: PathBuf,
    pub pipeline_file: PathBuf,
    pub model_file: PathBuf,
    pub data: DataConfig,
    pub cv: CvSpec,
    /// (pipeline name, model name) per declared workflow.
    pub pairs: Vec<(String, String)>,
}

impl ExperimentSpec {
    /// Read the named entry from the experiment file under `data_dir` and
    /// expand its pipeline declarations into workflow pairs. Duplicate
    /// pairs are a configuration error: the workflow name is the join key
    /// everywhere downstream.
    pub fn from_file(
        data_dir: &Path,
        exp_file_name: &str,
        name: &str,
        result_dir: &Path,
    ) -> anyhow::Result<Self> {
        let experiments = read_experiments(&data_dir.join(exp_file_name))?;
        let config = get_entry(&experiments, name)?;

        let mut pairs = Vec::new();
        for decl in &config.pipelines {
            for model in &decl.models {
                let pair = (decl.name.clone(), model.clone());
                if pairs.contains(&pair) {
                    return Err(PredageError::DuplicateWorkflow(format!(
                        "{}_{}",
                        pair.0, pair.1
                    ))
                    .into());
                }
                pairs.push(pair);
            }
        }

        log::info!(
            "experiment '{}': {} ({} workflows)",
            name,
            config.description,
            pairs.len()
        );
        Ok(ExperimentSpec {
            name: name.to_string(),
            description: config.description.clone(),
            result_dir: result_dir.to_path_buf(),
            data_file: data_dir.join(&config.files.data_file),
            pipeline_file: data_dir.join(&config.files.pipeline_file),
            model_file: data_dir.join(&config.files.model_file),
            data: config.data.clone(),
            cv: CvSpec::from(config.cv),
            pairs,
        })
    }
}

pub struct ExperimentRunner {
    spec: ExperimentSpec,
    workflows: Vec<Workflow>,
}

impl ExperimentRunner {
    /// Assemble every declared workflow from the pipeline and model files.
    pub fn new(spec: ExperimentSpec) -> anyhow::Result<Self> {
        let pipelines = read_pipelines(&spec.pipeline_file)?;
        let models = read_models(&spec.model_file)?;
        let registry = StepRegistry::new();

        let mut workflows = Vec::with_capacity(spec.pairs.len());
        for (pipe_name, model_name) in &spec.pairs {
            let pipe_spec = PipelineBuilder::build(&pipelines, pipe_name, &registry)
                .with_context(|| format!("building pipeline '{}'", pipe_name))?;
            let model = ModelBuilder::build(&models, model_name, &registry)
                .with_context(|| format!("building model '{}'", model_name))?;
            workflows.push(Workflow::new(pipe_spec, model));
        }
        Ok(ExperimentRunner { spec, workflows })
    }

    pub fn workflow_names(&self) -> Vec<&str> {
        self.workflows.iter().map(|w| w.name.as_str()).collect()
    }

    /// Load the prepared dataset named by the experiment's data file.
    pub fn load_data(&self) -> anyhow::Result<Frame> {
        Frame::from_csv(&self.spec.data_file)
    }

    /// Train every workflow sequentially and persist its artifacts.
    ///
    /// Workflows are not isolated from one another: the first training
    /// error aborts the remaining ones and the whole run.
    pub fn run(&self, data: &Frame, n_jobs: usize) -> anyhow::Result<ExperimentResults> {
        let data = data.drop_columns(&self.spec.data.exclude);
        let cv_inner = self.spec.cv.inner();
        let cv_outer = self.spec.cv.outer();
        let trainer = Trainer;

        let mut results = Vec::with_capacity(self.workflows.len());
        for workflow in &self.workflows {
            let workflow_results = trainer
                .train(
                    &data,
                    &self.spec.data.strata,
                    &self.spec.data.label,
                    &cv_inner,
                    &cv_outer,
                    workflow,
                    n_jobs,
                )
                .with_context(|| format!("training workflow '{}'", workflow.name))?;
            workflow_results.save(&self.spec.result_dir, &self.spec.name)?;
            results.push(workflow_results);
        }
        Ok(ExperimentResults::new(self.spec.name.clone(), results)?)
    }

    /// Rebuild the aggregated results purely from previously saved
    /// artifacts.
    pub fn load(&self) -> anyhow::Result<ExperimentResults> {
        let mut results = Vec::with_capacity(self.workflows.len());
        for workflow in &self.workflows {
            results.push(WorkflowResults::load(
                &self.spec.result_dir,
                &self.spec.name,
                &workflow.name,
            )?);
        }
        Ok(ExperimentResults::new(self.spec.name.clone(), results)?)
    }
}

/// All workflows' results of one experiment, with per-name lookup and the
/// merged per-subject prediction table.
pub struct ExperimentResults {
    pub name: String,
    pub results: Vec<WorkflowResults>,
    /// Columns: fold, true, then one prediction column per workflow name;
    /// indexed by subject id. Inner join on (subject, fold, true).
    pub predictions: Frame,
}

impl ExperimentResults {
    pub fn new(name: String, results: Vec<WorkflowResults>) -> Result<Self, PredageError> {
        let predictions = merge_predictions(&results)?;
        Ok(ExperimentResults {
            name,
            results,
            predictions,
        })
    }

    pub fn workflow_names(&self) -> Vec<&str> {
        self.results.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn get(&self, workflow_name: &str) -> Option<&WorkflowResults> {
        self.results.iter().find(|r| r.name == workflow_name)
    }

    /// Look up one of a workflow's tables by name.
    pub fn workflow_table(
        &self,
        kind: ResultKind,
        workflow_name: &str,
    ) -> Result<&Frame, PredageError> {
        let results = self
            .get(workflow_name)
            .ok_or_else(|| PredageError::MissingEntry(workflow_name.to_string()))?;
        match kind {
            ResultKind::Predictions => Ok(&results.results),
            ResultKind::Scores => Ok(&results.scores),
            ResultKind::Weights => Ok(&results.weights),
        }
    }

    /// The per-fold hyperparameter selections of one workflow.
    pub fn best_params(
        &self,
        workflow_name: &str,
    ) -> Result<&[crate::workflow::ParamRecord], PredageError> {
        self.get(workflow_name)
            .map(|r| r.best_params.as_slice())
            .ok_or_else(|| PredageError::MissingEntry(workflow_name.to_string()))
    }
}

/// Join every workflow's fold-level predictions on (subject id, fold, true
/// value), dropping the std column.
fn merge_predictions(results: &[WorkflowResults]) -> Result<Frame, PredageError> {
    let Some(first) = results.first() else {
        return Frame::from_rows(Vec::new(), vec!["fold".to_string(), "true".to_string()], Vec::new());
    };

    let mut columns = vec!["fold".to_string(), "true".to_string()];
    let mut index = Vec::new();
    let mut rows: Vec<Vec<f64>> = Vec::new();
    let mut keys: Vec<(i64, i64, u64)> = Vec::new();

    {
        let fold = first.results.column("fold")?;
        let truth = first.results.column("true")?;
        let pred = first.results.column("pred")?;
        for i in 0..first.results.nrows() {
            index.push(first.results.index()[i]);
            keys.push((
                first.results.index()[i],
                fold[i] as i64,
                truth[i].to_bits(),
            ));
            rows.push(vec![fold[i], truth[i], pred[i]]);
        }
    }
    columns.push(first.name.clone());

    for later in &results[1..] {
        let fold = later.results.column("fold")?;
        let truth = later.results.column("true")?;
        let pred = later.results.column("pred")?;
        let mut lookup = std::collections::BTreeMap::new();
        for i in 0..later.results.nrows() {
            lookup.insert(
                (later.results.index()[i], fold[i] as i64, truth[i].to_bits()),
                pred[i],
            );
        }
        for (key, row) in keys.iter().zip(rows.iter_mut()) {
            let value = lookup.get(key).ok_or_else(|| {
                PredageError::ShapeMismatch(format!(
                    "workflow '{}' is missing a prediction for subject {} fold {}",
                    later.name, key.0, key.1
                ))
            })?;
            row.push(*value);
        }
        columns.push(later.name.clone());
    }

    Frame::from_rows(index, columns, rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workflow_results(name: &str, offset: f64) -> WorkflowResults {
        let scores = Frame::from_rows(
            vec![1, 2],
            vec!["mae".to_string(), "r2".to_string()],
            vec![vec![1.0, 0.5], vec![1.1, 0.4]],
        )
        .unwrap();
        let results = Frame::from_rows(
            vec![7, 8, 9],
            vec![
                "fold".to_string(),
                "pred".to_string(),
                "std".to_string(),
                "true".to_string(),
            ],
            vec![
                vec![1.0, 60.0 + offset, 0.0, 61.0],
                vec![1.0, 70.0 + offset, 0.0, 69.0],
                vec![2.0, 55.0 + offset, 0.0, 57.0],
            ],
        )
        .unwrap();
        let weights = Frame::from_rows(
            vec![1, 2],
            vec!["pet_a".to_string()],
            vec![vec![0.1], vec![0.2]],
        )
        .unwrap();
        WorkflowResults {
            name: name.to_string(),
            scores,
            results,
            best_params: vec![Default::default(), Default::default()],
            weights,
        }
    }

    #[test]
    fn merged_predictions_join_on_subject_fold_and_truth() {
        let results = vec![
            workflow_results("pet_bridge", 0.0),
            workflow_results("pet_dummy", 1.0),
        ];
        let agg = ExperimentResults::new("exp".to_string(), results).unwrap();
        let merged = &agg.predictions;
        assert_eq!(merged.nrows(), 3);
        assert_eq!(
            merged.columns(),
            &[
                "fold".to_string(),
                "true".to_string(),
                "pet_bridge".to_string(),
                "pet_dummy".to_string()
            ]
        );
        assert_eq!(
            merged.column("pet_dummy").unwrap().to_vec(),
            vec![61.0, 71.0, 56.0]
        );
        assert!(!merged.has_column("std"));
    }

    #[test]
    fn lookup_by_workflow_name() {
        let agg = ExperimentResults::new(
            "exp".to_string(),
            vec![workflow_results("pet_bridge", 0.0)],
        )
        .unwrap();
        assert_eq!(agg.workflow_names(), vec!["pet_bridge"]);
        let scores = agg
            .workflow_table(ResultKind::Scores, "pet_bridge")
            .unwrap();
        assert_eq!(scores.nrows(), 2);
        assert!(agg.workflow_table(ResultKind::Scores, "missing").is_err());
    }
}
