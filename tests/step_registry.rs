use predage::config::{ParamValue, StepConfig};
use predage::steps::{StepObject, StepRegistry};

/// Every name in the supported vocabulary constructs without raising.
#[test]
fn every_registered_step_constructs() {
    let registry = StepRegistry::new();
    let names = registry.names();
    assert!(names.contains(&"dimap"));
    assert!(names.contains(&"ens_ref_gbt"));

    for name in names {
        let config = StepConfig {
            name: name.to_string(),
            ..StepConfig::default()
        };
        let step = registry
            .create(&config)
            .unwrap_or_else(|e| panic!("step '{}' failed to construct: {}", name, e));
        match step {
            StepObject::Transform(_) | StepObject::Model(_) => {}
        }
    }
}

#[test]
fn registry_builds_a_model_that_fits_and_predicts() {
    use ndarray::{Array1, Array2};

    let registry = StepRegistry::new();
    let config = StepConfig {
        name: "bayesianridge".to_string(),
        ..StepConfig::default()
    };
    let StepObject::Model(mut model) = registry.create(&config).unwrap() else {
        panic!("bayesianridge should be an estimator");
    };

    let x = Array2::from_shape_vec(
        (6, 2),
        vec![
            1.0, 0.0, 0.0, 1.0, 1.0, 0.1, 0.0, 0.9, 1.1, 0.0, 0.0, 1.2,
        ],
    )
    .expect("failed to create feature matrix");
    let y = Array1::from_vec(vec![2.0, -1.0, 2.1, -0.9, 2.2, -1.2]);
    let names = vec!["pet_a".to_string(), "pet_b".to_string()];

    model.fit(&x, &y, &names).unwrap();
    let pred = model.predict(&x).unwrap();
    assert_eq!(pred.len(), x.nrows());
}

#[test]
fn ensemble_steps_route_branch_params() {
    let registry = StepRegistry::new();
    let mut config = StepConfig {
        name: "ens_bridge".to_string(),
        ..StepConfig::default()
    };
    config
        .kwargs
        .insert("pet__alpha_1".to_string(), ParamValue::Float(1e-5));
    config
        .kwargs
        .insert("final__lambda_1".to_string(), ParamValue::Float(1e-5));
    assert!(registry.create(&config).is_ok());

    config
        .kwargs
        .insert("nosuchbranch__alpha_1".to_string(), ParamValue::Float(0.1));
    assert!(registry.create(&config).is_err());
}
