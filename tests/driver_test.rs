//! Run driver integration tests

mod common;

use alchemy_db::driver::{RunConfig, RunDriver};
use alchemy_db::engine::{BTreeParams, FileParams, FontanaParams, GeneratorConfig};
use alchemy_db::experiment::{NewRun, StepSelector};
use alchemy_db::store::ExperimentStore;
use alchemy_db::Error;
use common::ScriptedEngine;

fn btree(seed: i64, budget: u64, interval: u64) -> RunConfig {
    RunConfig::new(seed, GeneratorConfig::BTree(BTreeParams::default()), budget, interval)
}

fn metric_steps(store: &ExperimentStore, run_id: i64) -> Vec<u64> {
    store
        .get_metrics(run_id)
        .unwrap()
        .iter()
        .map(|m| m.step_index())
        .collect()
}

// =============================================================================
// Sampling
// =============================================================================

#[test]
fn test_exact_multiple_budget_samples_eleven_steps() {
    let store = ExperimentStore::open_in_memory().unwrap();
    let outcome = RunDriver::new(&store, ScriptedEngine::new())
        .run(&btree(1, 100, 10))
        .unwrap();

    assert_eq!(outcome.samples.len(), 11);
    assert_eq!(
        metric_steps(&store, outcome.run_id),
        vec![0, 10, 20, 30, 40, 50, 60, 70, 80, 90, 100]
    );
    assert_eq!(store.snapshot_steps(outcome.run_id).unwrap().len(), 11);
}

#[test]
fn test_trailing_step_is_sampled() {
    let store = ExperimentStore::open_in_memory().unwrap();
    let outcome = RunDriver::new(&store, ScriptedEngine::new())
        .run(&btree(1, 95, 10))
        .unwrap();

    assert_eq!(
        metric_steps(&store, outcome.run_id),
        vec![0, 10, 20, 30, 40, 50, 60, 70, 80, 90, 95]
    );
}

#[test]
fn test_scripted_entropy_scenario() {
    let store = ExperimentStore::open_in_memory().unwrap();
    let engine = ScriptedEngine::new().with_entropy(&[2.0, 1.8, 1.5, 1.2, 1.0, 0.9]);
    let outcome = RunDriver::new(&store, engine).run(&btree(42, 50, 10)).unwrap();

    let run = store.get_run(outcome.run_id).unwrap().unwrap();
    assert_eq!(run.seed(), 42);
    assert_eq!(run.generator_type(), "BTree");
    assert_eq!(run.freevar_probability(), Some(0.5));

    let pairs: Vec<(u64, f64)> = store
        .get_metrics(outcome.run_id)
        .unwrap()
        .iter()
        .map(|m| (m.step_index(), m.entropy()))
        .collect();
    assert_eq!(
        pairs,
        vec![(0, 2.0), (10, 1.8), (20, 1.5), (30, 1.2), (40, 1.0), (50, 0.9)]
    );
}

#[test]
fn test_snapshot_counts_match_population() {
    let store = ExperimentStore::open_in_memory().unwrap();
    let engine = ScriptedEngine::new().generating(&["a", "b", "c", "d"]);
    let outcome = RunDriver::new(&store, engine).run(&btree(1, 5, 5)).unwrap();

    let initial = store.get_initial_snapshot(outcome.run_id).unwrap();
    assert_eq!(initial.len(), 4);
    assert!(initial.iter().all(|e| e.count == 1));

    // One collision turns [a, b, c, d] into [a, b, c, a]
    let last = store.get_snapshot(outcome.run_id, StepSelector::Last).unwrap();
    assert_eq!(last[0].expression, "a");
    assert_eq!(last[0].count, 2);
    assert_eq!(last.len(), 3);

    let unique: Vec<u64> = outcome.samples.iter().map(|s| s.unique_count).collect();
    assert_eq!(unique, vec![4, 3]);
}

#[test]
fn test_default_name_assigned() {
    let store = ExperimentStore::open_in_memory().unwrap();
    let outcome = RunDriver::new(&store, ScriptedEngine::new())
        .run(&btree(1, 1, 1))
        .unwrap();
    let run = store.get_run(outcome.run_id).unwrap().unwrap();
    assert_eq!(run.display_name(), format!("Run {}", outcome.run_id));
}

// =============================================================================
// Failures
// =============================================================================

#[test]
fn test_invalid_config_writes_nothing() {
    let store = ExperimentStore::open_in_memory().unwrap();
    let driver = RunDriver::new(&store, ScriptedEngine::new());

    assert!(driver.run(&btree(1, 10, 0)).unwrap_err().is_validation());
    assert!(driver.run(&btree(1, 0, 10)).unwrap_err().is_validation());

    let mut fontana = FontanaParams::default();
    fontana.app_range = [0.9, 0.1];
    let config = RunConfig::new(1, GeneratorConfig::Fontana(fontana), 10, 1);
    assert!(driver.run(&config).unwrap_err().is_validation());

    assert!(store.is_empty().unwrap());
}

#[test]
fn test_blank_direct_input_writes_nothing() {
    let store = ExperimentStore::open_in_memory().unwrap();
    let config = RunConfig::new(
        1,
        GeneratorConfig::FromFile(FileParams::direct(" \n\t\n")),
        10,
        5,
    );
    let err = RunDriver::new(&store, ScriptedEngine::new())
        .run(&config)
        .unwrap_err();
    assert!(err.is_validation());
    assert_eq!(store.run_count().unwrap(), 0);
}

#[test]
fn test_engine_failure_keeps_partial_run() {
    let store = ExperimentStore::open_in_memory().unwrap();
    let engine = ScriptedEngine::new().failing_at_step(25);
    let err = RunDriver::new(&store, engine)
        .run(&btree(1, 50, 10))
        .unwrap_err();

    let Error::Engine { run_id, message } = &err else {
        panic!("expected engine error, got {err:?}");
    };
    assert!(message.contains("25"));
    assert_eq!(metric_steps(&store, *run_id), vec![0, 10, 20]);
    assert!(store.run_exists(*run_id).unwrap());
}

#[test]
fn test_huge_budget_failure_reports_run_id() {
    let store = ExperimentStore::open_in_memory().unwrap();
    let engine = ScriptedEngine::new().failing_at_step(1);
    let err = RunDriver::new(&store, engine)
        .run(&btree(1, 1_000_000_000_000, 1))
        .unwrap_err();

    let Error::Engine { run_id, .. } = &err else {
        panic!("expected engine error, got {err:?}");
    };
    assert_eq!(metric_steps(&store, *run_id), vec![0]);
    assert_eq!(
        store.get_run(*run_id).unwrap().unwrap().step_budget(),
        1_000_000_000_000
    );
}

#[test]
fn test_unstorable_budget_writes_nothing() {
    let store = ExperimentStore::open_in_memory().unwrap();
    let err = RunDriver::new(&store, ScriptedEngine::new())
        .run(&btree(1, u64::MAX, 1))
        .unwrap_err();
    assert!(err.is_validation());
    assert!(store.is_empty().unwrap());
}

#[test]
fn test_non_finite_entropy_is_engine_failure() {
    let store = ExperimentStore::open_in_memory().unwrap();
    let engine = ScriptedEngine::new().nan_at_read(1);
    let err = RunDriver::new(&store, engine)
        .run(&btree(1, 20, 10))
        .unwrap_err();

    let run_id = err.run_id().unwrap();
    assert_eq!(metric_steps(&store, run_id), vec![0]);
    assert_eq!(store.snapshot_steps(run_id).unwrap(), vec![0]);
}

// =============================================================================
// Local expressions and continuation
// =============================================================================

#[test]
fn test_from_file_direct_input() {
    let store = ExperimentStore::open_in_memory().unwrap();
    let engine = ScriptedEngine::new();
    let config = RunConfig::new(
        3,
        GeneratorConfig::FromFile(FileParams::direct("λx.x\nλy.y\nλx.x")),
        2,
        1,
    )
    .display_name("typed in");
    let outcome = RunDriver::new(&store, &engine).run(&config).unwrap();

    assert_eq!(engine.perturbed(), vec!["λx.x", "λy.y", "λx.x"]);
    let run = store.get_run(outcome.run_id).unwrap().unwrap();
    assert_eq!(run.generator_type(), "from_file");
    assert_eq!(run.display_name(), "typed in");
    assert_eq!(run.freevar_probability(), None);
    assert_eq!(store.get_initial_snapshot(outcome.run_id).unwrap()[0].count, 2);
}

#[test]
fn test_from_file_reads_text_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("soup.txt");
    std::fs::write(&path, "λx.x\n\nλx.λy.x\n").unwrap();

    let store = ExperimentStore::open_in_memory().unwrap();
    let engine = ScriptedEngine::new();
    let params = FileParams {
        filename: Some(path),
        ..FileParams::default()
    };
    RunDriver::new(&store, &engine)
        .run(&RunConfig::new(1, GeneratorConfig::FromFile(params), 1, 1))
        .unwrap();
    assert_eq!(engine.perturbed(), vec!["λx.x", "λx.λy.x"]);
}

#[test]
fn test_continue_run_from_last_state() {
    let store = ExperimentStore::open_in_memory().unwrap();
    let engine = ScriptedEngine::new().generating(&["a", "b", "c", "d"]);
    let driver = RunDriver::new(&store, &engine);

    let source = driver.run(&btree(9, 20, 10)).unwrap();
    let continued = driver.continue_run(source.run_id, Some("round two")).unwrap();

    let mut seeded = engine.perturbed();
    seeded.sort();
    assert_eq!(seeded, vec!["a", "a", "b", "c"]);

    let run = store.get_run(continued.run_id).unwrap().unwrap();
    assert_eq!(run.seed(), 9);
    assert_eq!(run.step_budget(), 20);
    assert_eq!(run.sample_interval(), 10);
    assert_eq!(run.display_name(), "round two");
    assert_eq!(run.generator_params()["continued_from"], source.run_id);
}

#[test]
fn test_continue_missing_or_empty_run() {
    let store = ExperimentStore::open_in_memory().unwrap();
    let driver = RunDriver::new(&store, ScriptedEngine::new());

    assert!(driver.continue_run(99, None).unwrap_err().is_not_found());

    let bare = store.create_run(NewRun::new(1, "BTree", 10, 1)).unwrap();
    assert!(driver.continue_run(bare, None).unwrap_err().is_validation());
    assert_eq!(store.run_count().unwrap(), 1);
}
