use std::fs;

use ndarray::Array2;

use predage::cv::{KFold, RepeatedStratifiedKFold};
use predage::data::Frame;
use predage::experiment::{ExperimentRunner, ExperimentSpec, ResultKind};
use predage::model_builder::ModelBuilder;
use predage::pipeline::PipelineBuilder;
use predage::prep::bin_ages;
use predage::steps::StepRegistry;
use predage::trainer::Trainer;
use predage::workflow::{Workflow, WorkflowResults};

const PIPE_TOML: &str = r#"
[pipeline-test]
descr = "scale everything, keep everything"
steps = [
    { name = "scaler" },
    { name = "colselector" },
]

[pet]
descr = "PET features only"
steps = [
    { name = "colpattern", kwargs = { pattern = "^pet" } },
    { name = "scaler" },
]
"#;

const MODEL_TOML: &str = r#"
[dummy]
name = "dummyregressor"
kwargs = { strategy = "mean" }

[bridge]
name = "bayesianridge"

[bridge.paramgrid]
model__alpha_1 = [1e-6, 1e-5]
"#;

fn build_workflow(pipe_name: &str, model_name: &str) -> Workflow {
    let pipelines = read_pipelines_str(PIPE_TOML);
    let models = read_models_str(MODEL_TOML);
    let registry = StepRegistry::new();
    let pipe_spec = PipelineBuilder::build(&pipelines, pipe_name, &registry).unwrap();
    let model = ModelBuilder::build(&models, model_name, &registry).unwrap();
    Workflow::new(pipe_spec, model)
}

fn read_pipelines_str(raw: &str) -> predage::config::PipelineFile {
    toml::from_str(raw).unwrap()
}

fn read_models_str(raw: &str) -> predage::config::ModelFile {
    toml::from_str(raw).unwrap()
}

/// Trivial dummy workflow on an all-zero dataset: training completes with
/// one prediction per input row and one score row per outer fold.
#[test]
fn dummy_workflow_trains_on_all_zero_data() {
    let n = 10;
    let frame = Frame::new(
        (0..n as i64).collect(),
        vec!["cat1".to_string(), "pet_roi".to_string(), "age".to_string()],
        Array2::zeros((n, 3)),
    )
    .unwrap();

    let workflow = build_workflow("pipeline-test", "dummy");
    assert_eq!(workflow.name, "pipeline-test_dummy");

    let cv_inner = KFold::new(2, true, 42);
    let cv_outer = RepeatedStratifiedKFold::new(2, 1, 42);
    let results = Trainer
        .train(&frame, "cat1", "age", &cv_inner, &cv_outer, &workflow, 1)
        .unwrap();

    assert_eq!(results.results.nrows(), n);
    assert_eq!(results.scores.nrows(), 2);
    assert_eq!(results.weights.nrows(), 2);
    assert_eq!(results.weights.columns(), &["dummy".to_string()]);
    assert_eq!(results.best_params.len(), 2);

    // a mean-strategy dummy on all-zero labels predicts zero everywhere
    let preds = results.results.column("pred").unwrap();
    assert!(preds.iter().all(|&p| p == 0.0));
    let maes = results.scores.column("mae").unwrap();
    assert!(maes.iter().all(|&m| m == 0.0));
}

/// Out-of-fold predictions cover every subject exactly once per repetition,
/// and the same seed reproduces identical tables.
#[test]
fn nested_cv_is_disjoint_and_reproducible() {
    let frame = synthetic_cohort(40);
    let workflow = build_workflow("pet", "bridge");
    let cv_inner = KFold::new(2, true, 42);
    let cv_outer = RepeatedStratifiedKFold::new(4, 1, 42);

    let a = Trainer
        .train(
            &frame,
            "chron_age_group",
            "chron_age",
            &cv_inner,
            &cv_outer,
            &workflow,
            1,
        )
        .unwrap();
    let b = Trainer
        .train(
            &frame,
            "chron_age_group",
            "chron_age",
            &cv_inner,
            &cv_outer,
            &workflow,
            1,
        )
        .unwrap();

    assert_eq!(a.results, b.results);
    assert_eq!(a.scores, b.scores);

    let mut seen: Vec<i64> = a.results.index().to_vec();
    seen.sort_unstable();
    let mut expected: Vec<i64> = frame.index().to_vec();
    expected.sort_unstable();
    assert_eq!(seen, expected);

    // the linear workflow should clearly beat chance on a linear signal
    let maes = a.scores.column("mae").unwrap();
    assert!(maes.iter().all(|&m| m < 3.0), "maes: {:?}", maes);
}

/// Ages 50..90 with two PET features linearly encoding age, a tracer flag
/// and the binned stratification bucket.
fn synthetic_cohort(n: usize) -> Frame {
    let mut rows = Vec::with_capacity(n);
    for i in 0..n {
        let age = 50.0 + (i as f64) * 40.0 / n as f64;
        let tracer = f64::from(i % 2 == 0);
        let pet_a = 3.0 - 0.02 * age;
        let pet_b = 1.0 + 0.01 * age;
        rows.push(vec![age, tracer, pet_a, pet_b]);
    }
    let mut frame = Frame::from_rows(
        (0..n as i64).collect(),
        vec![
            "chron_age".to_string(),
            "tracer".to_string(),
            "pet_a".to_string(),
            "pet_b".to_string(),
        ],
        rows,
    )
    .unwrap();
    bin_ages(&mut frame, "chron_age", 0.0, 100.0, 10.0).unwrap();
    frame
}

const EXPERIMENT_TOML: &str = r#"
[modality]
description = "PET workflows on the synthetic cohort"

[modality.files]
data_file = "data.csv"
pipeline_file = "pipelines.toml"
model_file = "models.toml"

[modality.data]
label = "chron_age"
strata = "chron_age_group"
exclude = []

[modality.cv]
splits = 2
repeats = 1
seed = 42

[[modality.pipelines]]
name = "pet"
models = ["bridge", "dummy"]
"#;

/// End-to-end: configuration files on disk, a run producing the four CSV
/// artifacts per workflow, and an artifact-only reload equal to the run.
#[test]
fn experiment_run_saves_and_reloads_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("data");
    let result_dir = dir.path().join("results");
    fs::create_dir_all(&data_dir).unwrap();
    fs::create_dir_all(&result_dir).unwrap();

    fs::write(data_dir.join("experiments.toml"), EXPERIMENT_TOML).unwrap();
    fs::write(data_dir.join("pipelines.toml"), PIPE_TOML).unwrap();
    fs::write(data_dir.join("models.toml"), MODEL_TOML).unwrap();
    let frame = synthetic_cohort(30);
    frame.to_csv(&data_dir.join("data.csv")).unwrap();

    let spec =
        ExperimentSpec::from_file(&data_dir, "experiments.toml", "modality", &result_dir)
            .unwrap();
    assert_eq!(spec.pairs.len(), 2);

    let runner = ExperimentRunner::new(spec).unwrap();
    assert_eq!(runner.workflow_names(), vec!["pet_bridge", "pet_dummy"]);

    let data = runner.load_data().unwrap();
    let results = runner.run(&data, 1).unwrap();

    for workflow in ["pet_bridge", "pet_dummy"] {
        for kind in ["scores", "results", "best_params", "weights"] {
            let artifact = result_dir.join(format!("modality_{}_{}.csv", workflow, kind));
            assert!(artifact.exists(), "missing artifact {:?}", artifact);
        }
    }

    // merged table joins both workflows on (subject, fold, true)
    assert_eq!(
        results.predictions.columns(),
        &[
            "fold".to_string(),
            "true".to_string(),
            "pet_bridge".to_string(),
            "pet_dummy".to_string()
        ]
    );
    assert_eq!(results.predictions.nrows(), 30);

    let reloaded = runner.load().unwrap();
    for name in results.workflow_names() {
        assert_eq!(reloaded.get(name).unwrap(), results.get(name).unwrap());
    }
    assert_eq!(
        reloaded
            .workflow_table(ResultKind::Scores, "pet_bridge")
            .unwrap(),
        results
            .workflow_table(ResultKind::Scores, "pet_bridge")
            .unwrap()
    );
}

/// The per-fold grid selection is persisted and reloadable.
#[test]
fn best_params_survive_the_round_trip() {
    let frame = synthetic_cohort(24);
    let workflow = build_workflow("pet", "bridge");
    let cv_inner = KFold::new(2, true, 42);
    let cv_outer = RepeatedStratifiedKFold::new(2, 1, 42);
    let results = Trainer
        .train(
            &frame,
            "chron_age_group",
            "chron_age",
            &cv_inner,
            &cv_outer,
            &workflow,
            1,
        )
        .unwrap();

    for record in &results.best_params {
        assert!(record.contains_key("model__alpha_1"));
    }

    let dir = tempfile::tempdir().unwrap();
    results.save(dir.path(), "grid").unwrap();
    let reloaded = WorkflowResults::load(dir.path(), "grid", "pet_bridge").unwrap();
    assert_eq!(reloaded, results);
}
