//! Declarative configuration for pipelines, models and experiments.
//!
//! Three TOML files drive an experiment run: a pipeline file (named step
//! sequences), a model file (named estimators with hyperparameter grids) and
//! an experiment file (which pipeline+model pairs to run, CV settings, data
//! filters). Everything is deserialized through serde into the structs below;
//! lookups of named entries fail with the offending key.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PredageError;

/// A scalar (or list) configuration value.
///
/// Kwargs and hyperparameter grids carry heterogeneous values; the untagged
/// representation keeps the TOML natural (`alpha_1 = 1e-6`,
/// `strategy = "mean"`, `keep = ["pet_x", "pet_y"]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<ParamValue>),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_usize(&self) -> Option<usize> {
        match self {
            ParamValue::Int(v) if *v >= 0 => Some(*v as usize),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            ParamValue::Int(v) if *v >= 0 => Some(*v as u64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str_list(&self) -> Option<Vec<String>> {
        match self {
            ParamValue::List(items) => items
                .iter()
                .map(|v| v.as_str().map(str::to_string))
                .collect(),
            ParamValue::Str(v) => Some(vec![v.clone()]),
            _ => None,
        }
    }

    /// Parse a display string back into a value (used when reloading
    /// persisted best-parameter records).
    pub fn parse(s: &str) -> ParamValue {
        match s {
            "true" => return ParamValue::Bool(true),
            "false" => return ParamValue::Bool(false),
            _ => {}
        }
        if let Ok(v) = s.parse::<i64>() {
            return ParamValue::Int(v);
        }
        if let Ok(v) = s.parse::<f64>() {
            return ParamValue::Float(v);
        }
        ParamValue::Str(s.to_string())
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(v) => write!(f, "{}", v),
            ParamValue::Int(v) => write!(f, "{}", v),
            // {:?} keeps the decimal point so floats survive a parse round-trip
            ParamValue::Float(v) => write!(f, "{:?}", v),
            ParamValue::Str(v) => write!(f, "{}", v),
            ParamValue::List(items) => {
                let joined: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", joined.join(", "))
            }
        }
    }
}

/// Keyword arguments of a step, keyed by parameter name.
pub type Kwargs = BTreeMap<String, ParamValue>;

/// Hyperparameter grid: parameter path (`model__alpha_1`) to candidate values.
pub type ParamGrid = BTreeMap<String, Vec<ParamValue>>;

/// One processing/model unit as declared in configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepConfig {
    pub name: String,
    #[serde(default)]
    pub kwargs: Kwargs,
}

/// A named ordered step sequence.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub descr: String,
    pub steps: Vec<StepConfig>,
}

/// A named estimator with its hyperparameter grid (carried verbatim).
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub name: String,
    #[serde(default)]
    pub kwargs: Kwargs,
    #[serde(default)]
    pub paramgrid: ParamGrid,
}

/// Contents of a pipeline configuration file, keyed by pipeline name.
pub type PipelineFile = BTreeMap<String, PipelineConfig>;

/// Contents of a model configuration file, keyed by model name.
pub type ModelFile = BTreeMap<String, ModelConfig>;

/// File names an experiment resolves relative to its data directory.
#[derive(Debug, Clone, Deserialize)]
pub struct ExperimentFiles {
    pub data_file: String,
    pub pipeline_file: String,
    pub model_file: String,
}

/// Data filters applied before training.
#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_label")]
    pub label: String,
    #[serde(default = "default_strata")]
    pub strata: String,
    #[serde(default)]
    pub exclude: Vec<String>,
}

fn default_label() -> String {
    "chron_age".to_string()
}

fn default_strata() -> String {
    "chron_age_group".to_string()
}

/// Cross-validation split/repeat counts and seed.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CvConfig {
    pub splits: usize,
    #[serde(default = "default_repeats")]
    pub repeats: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_shuffle")]
    pub shuffle: bool,
}

fn default_repeats() -> usize {
    1
}

fn default_seed() -> u64 {
    42
}

fn default_shuffle() -> bool {
    true
}

/// One pipeline declaration inside an experiment: the pipeline name and the
/// model names to pair it with (one workflow per model name).
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineDecl {
    pub name: String,
    pub models: Vec<String>,
}

/// A named experiment entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ExperimentConfig {
    pub description: String,
    pub files: ExperimentFiles,
    pub data: DataConfig,
    pub cv: CvConfig,
    pub pipelines: Vec<PipelineDecl>,
}

/// Contents of an experiment configuration file, keyed by experiment name.
pub type ExperimentFile = BTreeMap<String, ExperimentConfig>;

/// Look up a named entry, failing with the offending key.
pub fn get_entry<'a, T>(
    map: &'a BTreeMap<String, T>,
    name: &str,
) -> Result<&'a T, PredageError> {
    map.get(name)
        .ok_or_else(|| PredageError::MissingEntry(name.to_string()))
}

pub fn read_pipelines(path: &Path) -> anyhow::Result<PipelineFile> {
    read_toml(path)
}

pub fn read_models(path: &Path) -> anyhow::Result<ModelFile> {
    read_toml(path)
}

pub fn read_experiments(path: &Path) -> anyhow::Result<ExperimentFile> {
    read_toml(path)
}

fn read_toml<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {}", path.display(), e))?;
    let parsed = toml::from_str(&raw)
        .map_err(|e| anyhow::anyhow!("failed to parse {}: {}", path.display(), e))?;
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pipeline_file() {
        let raw = r#"
            [pet-harmonized]
            descr = "PET features with tracer harmonization"
            steps = [
                { name = "dimap", kwargs = { cat_col = "tracer", sample_col = "chron_age_group", pattern = "pet" } },
                { name = "colpattern", kwargs = { pattern = "^pet" } },
                { name = "scaler" },
            ]
        "#;
        let file: PipelineFile = toml::from_str(raw).unwrap();
        let pipe = get_entry(&file, "pet-harmonized").unwrap();
        assert_eq!(pipe.steps.len(), 3);
        assert_eq!(pipe.steps[0].name, "dimap");
        assert_eq!(
            pipe.steps[0].kwargs.get("pattern").unwrap().as_str(),
            Some("pet")
        );
    }

    #[test]
    fn parses_model_file_with_grid() {
        let raw = r#"
            [bridge]
            name = "bayesianridge"

            [bridge.paramgrid]
            model__alpha_1 = [1e-6, 1e-5]
            model__max_iter = [300]
        "#;
        let file: ModelFile = toml::from_str(raw).unwrap();
        let model = get_entry(&file, "bridge").unwrap();
        assert_eq!(model.name, "bayesianridge");
        assert_eq!(model.paramgrid["model__alpha_1"].len(), 2);
        assert_eq!(
            model.paramgrid["model__max_iter"][0],
            ParamValue::Int(300)
        );
    }

    #[test]
    fn missing_entry_names_the_key() {
        let file: ModelFile = BTreeMap::new();
        let err = get_entry(&file, "nope").unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn param_value_display_round_trips() {
        for v in [
            ParamValue::Int(5),
            ParamValue::Float(5.0),
            ParamValue::Float(1e-6),
            ParamValue::Bool(true),
            ParamValue::Str("mean".to_string()),
        ] {
            assert_eq!(ParamValue::parse(&v.to_string()), v);
        }
    }
}
