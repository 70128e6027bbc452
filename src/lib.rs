//! predage: nested cross-validation training engine for brain-age prediction.
//!
//! This crate assembles configuration-driven processing/model pipelines
//! ("workflows") for predicting chronological age from PET- and MRI-derived
//! regional brain measures, trains them under nested cross-validation with
//! per-fold bookkeeping, harmonizes feature distributions across tracer
//! cohorts via quantile mapping, extracts per-feature weights across model
//! families, and compares workflows with a correlated-resampling t-test.
//!
//! The design favors small, testable modules: declarative TOML configuration
//! is resolved through a step registry into boxed transform/estimator trait
//! objects, and all randomness is driven by explicit seeds so that a given
//! seed and dataset reproduce identical fold assignments and scores.
pub mod config;
pub mod cv;
pub mod data;
pub mod error;
pub mod experiment;
pub mod logsetup;
pub mod math;
pub mod model_builder;
pub mod models;
pub mod nodim;
pub mod pipeline;
pub mod prep;
pub mod simulation;
pub mod statistics;
pub mod steps;
pub mod trainer;
pub mod transform;
pub mod weights;
pub mod workflow;
