//! Model assembly: resolve a named model entry into its estimator and carry
//! the hyperparameter grid verbatim.

use crate::config::{get_entry, ModelFile, ParamGrid, StepConfig};
use crate::error::PredageError;
use crate::models::Regressor;
use crate::steps::{StepObject, StepRegistry};

pub struct ModelRepresentation {
    pub name: String,
    pub model: Box<dyn Regressor>,
    pub paramgrid: ParamGrid,
}

impl std::fmt::Debug for ModelRepresentation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRepresentation")
            .field("name", &self.name)
            .field("model", &"<dyn Regressor>")
            .field("paramgrid", &self.paramgrid)
            .finish()
    }
}

pub struct ModelBuilder;

impl ModelBuilder {
    pub fn build(
        config: &ModelFile,
        name: &str,
        registry: &StepRegistry,
    ) -> Result<ModelRepresentation, PredageError> {
        let model_config = get_entry(config, name)?;
        let step_config = StepConfig {
            name: model_config.name.clone(),
            kwargs: model_config.kwargs.clone(),
        };
        let model = match registry.create(&step_config)? {
            StepObject::Model(model) => model,
            StepObject::Transform(_) => {
                return Err(PredageError::NotAnEstimator(model_config.name.clone()))
            }
        };
        Ok(ModelRepresentation {
            name: name.to_string(),
            model,
            paramgrid: model_config.paramgrid.clone(),
        })
    }
}
