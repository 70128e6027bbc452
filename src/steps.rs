//! The step registry: one factory per step identifier, populated once at
//! construction and looked up by name. Unknown identifiers fail with a
//! configuration error naming the offender.

use std::collections::BTreeMap;

use crate::config::StepConfig;
use crate::error::PredageError;
use crate::models::baseline::{DummyRegressor, ReferenceModel};
use crate::models::gbt::GbtRegressor;
use crate::models::gpr::GprRegressor;
use crate::models::linear::{ArdRegression, BayesianRidge};
use crate::models::stacking::{Branch, StackingRegressor};
use crate::models::svr::LinearSvr;
use crate::models::Regressor;
use crate::transform::{ColPattern, ColumnScaler, DiMap, IcvNorm, Scaler, SelectCols, Transform};

/// A constructed processing/model unit.
pub enum StepObject {
    Transform(Box<dyn Transform>),
    Model(Box<dyn Regressor>),
}

impl std::fmt::Debug for StepObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepObject::Transform(_) => f.write_str("StepObject::Transform(<dyn Transform>)"),
            StepObject::Model(_) => f.write_str("StepObject::Model(<dyn Regressor>)"),
        }
    }
}

type Factory = fn(&StepConfig) -> Result<StepObject, PredageError>;

pub struct StepRegistry {
    factories: BTreeMap<&'static str, Factory>,
}

impl StepRegistry {
    pub fn new() -> Self {
        let mut factories: BTreeMap<&'static str, Factory> = BTreeMap::new();

        // processing steps
        factories.insert("scaler", |cfg| {
            transform_step(Box::new(Scaler::default()), cfg)
        });
        factories.insert("colselector", |cfg| {
            transform_step(Box::new(SelectCols::default()), cfg)
        });
        factories.insert("columnscaler", |cfg| {
            transform_step(Box::new(ColumnScaler::default()), cfg)
        });
        factories.insert("colpattern", |cfg| {
            transform_step(Box::new(ColPattern::new("")), cfg)
        });
        factories.insert("icvnorm", |cfg| {
            transform_step(Box::new(IcvNorm::default()), cfg)
        });
        factories.insert("dimap", |cfg| {
            transform_step(
                Box::new(DiMap::new("tracer", "chron_age_group", "pet")),
                cfg,
            )
        });

        // estimators
        factories.insert("bayesianridge", |cfg| {
            model_step(Box::new(BayesianRidge::default()), cfg)
        });
        factories.insert("ardregression", |cfg| {
            model_step(Box::new(ArdRegression::default()), cfg)
        });
        factories.insert("lingpr", |cfg| {
            model_step(Box::new(GprRegressor::dot_product()), cfg)
        });
        factories.insert("rbfgpr", |cfg| model_step(Box::new(GprRegressor::rbf()), cfg));
        factories.insert("linearsvr", |cfg| {
            model_step(Box::new(LinearSvr::default()), cfg)
        });
        factories.insert("gbtregressor", |cfg| {
            model_step(Box::new(GbtRegressor::default()), cfg)
        });
        factories.insert("dummyregressor", |cfg| {
            model_step(Box::new(DummyRegressor::default()), cfg)
        });
        factories.insert("reference", |cfg| {
            model_step(Box::new(ReferenceModel::default()), cfg)
        });

        // stacked ensembles over the two modality branches
        factories.insert("ens_bridge", |cfg| ensemble_step(cfg, false));
        factories.insert("ens_ard", |cfg| ensemble_step(cfg, false));
        factories.insert("ens_lingpr", |cfg| ensemble_step(cfg, false));
        factories.insert("ens_rbfgpr", |cfg| ensemble_step(cfg, false));
        factories.insert("ens_lsvr", |cfg| ensemble_step(cfg, false));
        factories.insert("ens_gbt", |cfg| ensemble_step(cfg, false));

        // reference-branch ensembles: the MRI side carries the precomputed
        // reference prediction, only the PET side learns
        factories.insert("ens_ref_bridge", |cfg| ensemble_step(cfg, true));
        factories.insert("ens_ref_ard", |cfg| ensemble_step(cfg, true));
        factories.insert("ens_ref_lingpr", |cfg| ensemble_step(cfg, true));
        factories.insert("ens_ref_rbfgpr", |cfg| ensemble_step(cfg, true));
        factories.insert("ens_ref_lsvr", |cfg| ensemble_step(cfg, true));
        factories.insert("ens_ref_gbt", |cfg| ensemble_step(cfg, true));

        StepRegistry { factories }
    }

    pub fn create(&self, config: &StepConfig) -> Result<StepObject, PredageError> {
        let factory = self
            .factories
            .get(config.name.as_str())
            .ok_or_else(|| PredageError::UnknownStep(config.name.clone()))?;
        factory(config)
    }

    /// The closed step vocabulary, in registry order.
    pub fn names(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        StepRegistry::new()
    }
}

fn transform_step(
    mut step: Box<dyn Transform>,
    config: &StepConfig,
) -> Result<StepObject, PredageError> {
    for (name, value) in &config.kwargs {
        step.set_param(name, value)?;
    }
    Ok(StepObject::Transform(step))
}

fn model_step(
    mut model: Box<dyn Regressor>,
    config: &StepConfig,
) -> Result<StepObject, PredageError> {
    for (name, value) in &config.kwargs {
        model.set_param(name, value)?;
    }
    Ok(StepObject::Model(model))
}

/// Base estimator shared by the ensemble branch(es), selected from the
/// ensemble step's own name suffix.
fn base_estimator(step_name: &str) -> Result<Box<dyn Regressor>, PredageError> {
    let suffix = step_name
        .rsplit('_')
        .next()
        .ok_or_else(|| PredageError::UnknownStep(step_name.to_string()))?;
    let model: Box<dyn Regressor> = match suffix {
        "bridge" => Box::new(BayesianRidge::default()),
        "ard" => Box::new(ArdRegression::default()),
        "lingpr" => Box::new(GprRegressor::dot_product()),
        "rbfgpr" => Box::new(GprRegressor::rbf()),
        "lsvr" => Box::new(LinearSvr::default()),
        "gbt" => Box::new(GbtRegressor::default()),
        _ => return Err(PredageError::UnknownStep(step_name.to_string())),
    };
    Ok(model)
}

fn ensemble_step(config: &StepConfig, reference_branch: bool) -> Result<StepObject, PredageError> {
    let base = base_estimator(&config.name)?;
    let first = if reference_branch {
        Branch::new("ref", "^ref", Box::new(ReferenceModel::default()))
    } else {
        Branch::new("mri", "^mri", base.clone_box())
    };
    let second = Branch::new("pet", "^pet", base);

    let mut model = StackingRegressor::new(vec![first, second]);
    for (name, value) in &config.kwargs {
        model.set_param(name, value)?;
    }
    Ok(StepObject::Model(Box::new(model)))
}
