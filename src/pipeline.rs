//! Pipeline assembly: an ordered chain of fitted processing steps ending in
//! the model stage, built from a named configuration entry through the step
//! registry.

use ndarray::Array1;

use crate::config::{get_entry, ParamValue, PipelineFile};
use crate::data::Frame;
use crate::error::PredageError;
use crate::models::Regressor;
use crate::steps::{StepObject, StepRegistry};
use crate::transform::Transform;

/// An ordered processing chain with the model as its final stage ("model").
pub struct Pipeline {
    steps: Vec<(String, Box<dyn Transform>)>,
    model: Box<dyn Regressor>,
}

impl Clone for Pipeline {
    fn clone(&self) -> Self {
        Pipeline {
            steps: self.steps.clone(),
            model: self.model.clone_box(),
        }
    }
}

impl Pipeline {
    pub fn new(steps: Vec<(String, Box<dyn Transform>)>, model: Box<dyn Regressor>) -> Self {
        Pipeline { steps, model }
    }

    /// Route a `stage__param` path to its stage; the remainder may itself be
    /// nested (stacking branches).
    pub fn set_param(&mut self, path: &str, value: &ParamValue) -> Result<(), PredageError> {
        let (stage, param) =
            path.split_once("__")
                .ok_or_else(|| PredageError::UnknownParam {
                    target: "pipeline".to_string(),
                    param: path.to_string(),
                })?;
        if stage == "model" {
            return self.model.set_param(param, value);
        }
        for (name, step) in self.steps.iter_mut() {
            if name == stage {
                return step.set_param(param, value);
            }
        }
        Err(PredageError::UnknownParam {
            target: "pipeline".to_string(),
            param: path.to_string(),
        })
    }

    /// Fit every step in order, feeding each the previous step's output,
    /// then fit the model on the final frame.
    pub fn fit(&mut self, frame: &Frame, y: &Array1<f64>) -> Result<(), PredageError> {
        let mut current = frame.clone();
        for (_, step) in self.steps.iter_mut() {
            step.fit(&current)?;
            current = step.transform(&current)?;
        }
        self.model
            .fit(current.values(), y, current.columns())
    }

    /// Apply the fitted processing steps without touching the model.
    pub fn apply_steps(&self, frame: &Frame) -> Result<Frame, PredageError> {
        let mut current = frame.clone();
        for (_, step) in &self.steps {
            current = step.transform(&current)?;
        }
        Ok(current)
    }

    pub fn predict(&self, frame: &Frame) -> Result<Array1<f64>, PredageError> {
        let current = self.apply_steps(frame)?;
        self.model.predict(current.values())
    }

    pub fn predict_std(&self, frame: &Frame) -> Result<Option<Array1<f64>>, PredageError> {
        let current = self.apply_steps(frame)?;
        self.model.predict_std(current.values())
    }

    /// The fitted model stage.
    pub fn model(&self) -> &dyn Regressor {
        self.model.as_ref()
    }
}

/// A named, not-yet-trained step chain read from configuration.
pub struct PipelineSpec {
    pub name: String,
    pub descr: String,
    pub steps: Vec<(String, Box<dyn Transform>)>,
}

impl std::fmt::Debug for PipelineSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let step_names: Vec<&String> = self.steps.iter().map(|(n, _)| n).collect();
        f.debug_struct("PipelineSpec")
            .field("name", &self.name)
            .field("descr", &self.descr)
            .field("steps", &step_names)
            .finish()
    }
}

pub struct PipelineBuilder;

impl PipelineBuilder {
    /// Build the named pipeline's step chain, preserving configuration
    /// order. Estimator steps are rejected here; the model joins the chain
    /// through the workflow assembler.
    pub fn build(
        config: &PipelineFile,
        name: &str,
        registry: &StepRegistry,
    ) -> Result<PipelineSpec, PredageError> {
        let pipeline_config = get_entry(config, name)?;
        let mut steps = Vec::with_capacity(pipeline_config.steps.len());
        for step_config in &pipeline_config.steps {
            match registry.create(step_config)? {
                StepObject::Transform(step) => {
                    steps.push((step_config.name.clone(), step));
                }
                StepObject::Model(_) => {
                    return Err(PredageError::MisplacedEstimator(step_config.name.clone()))
                }
            }
        }
        log::debug!("built pipeline '{}' with {} steps", name, steps.len());
        Ok(PipelineSpec {
            name: name.to_string(),
            descr: pipeline_config.descr.clone(),
            steps,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::linear::BayesianRidge;
    use crate::transform::Scaler;
    use approx::assert_abs_diff_eq;

    fn toy_frame() -> (Frame, Array1<f64>) {
        let frame = Frame::from_rows(
            vec![0, 1, 2, 3, 4, 5],
            vec!["pet_a".to_string(), "pet_b".to_string()],
            vec![
                vec![0.0, 5.0],
                vec![1.0, 4.0],
                vec![2.0, 3.0],
                vec![3.0, 2.0],
                vec![4.0, 1.0],
                vec![5.0, 0.0],
            ],
        )
        .unwrap();
        let y = frame.column("pet_a").unwrap().mapv(|v| 2.0 * v + 1.0);
        (frame, y)
    }

    #[test]
    fn pipeline_fits_and_predicts_through_its_steps() {
        let (frame, y) = toy_frame();
        let mut pipe = Pipeline::new(
            vec![("scaler".to_string(), Box::new(Scaler::default()))],
            Box::new(BayesianRidge::default()),
        );
        pipe.fit(&frame, &y).unwrap();
        let pred = pipe.predict(&frame).unwrap();
        for (p, t) in pred.iter().zip(y.iter()) {
            assert_abs_diff_eq!(p, t, epsilon = 0.1);
        }
    }

    #[test]
    fn set_param_routes_to_model_and_steps() {
        let (_, _) = toy_frame();
        let mut pipe = Pipeline::new(
            vec![("scaler".to_string(), Box::new(Scaler::default()))],
            Box::new(BayesianRidge::default()),
        );
        pipe.set_param("model__alpha_1", &ParamValue::Float(1e-5))
            .unwrap();
        pipe.set_param("scaler__with_mean", &ParamValue::Bool(false))
            .unwrap();
        assert!(pipe
            .set_param("missing__alpha", &ParamValue::Float(0.0))
            .is_err());
        assert!(pipe.set_param("noseparator", &ParamValue::Float(0.0)).is_err());
    }

    #[test]
    fn builder_rejects_estimators_in_the_step_list() {
        let raw = r#"
            [bad]
            descr = "estimator smuggled into the step list"
            steps = [{ name = "bayesianridge" }]
        "#;
        let file: PipelineFile = toml::from_str(raw).unwrap();
        let registry = StepRegistry::new();
        let err = PipelineBuilder::build(&file, "bad", &registry).unwrap_err();
        assert!(err.to_string().contains("bayesianridge"));
    }

    #[test]
    fn builder_preserves_step_order() {
        let raw = r#"
            [pet]
            descr = "select then scale"
            steps = [
                { name = "colpattern", kwargs = { pattern = "^pet" } },
                { name = "scaler" },
            ]
        "#;
        let file: PipelineFile = toml::from_str(raw).unwrap();
        let registry = StepRegistry::new();
        let spec = PipelineBuilder::build(&file, "pet", &registry).unwrap();
        let names: Vec<&str> = spec.steps.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["colpattern", "scaler"]);
    }
}
