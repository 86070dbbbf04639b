//! Concurrent evaluation of independent units sharing one store

use convenient_snapshot::{
    ConfigError, CurrentSnapshots, Decision, DecisionStats, EngineConfig, ExecutionOutcome,
    FileDigest, FileSource, InMemorySnapshotStore, NormalizationStrategy, NormalizedEntry,
    PropertyRole, PropertySet, PropertySpec, Snapshot, SnapshotError, UnitEvaluation, UnitOfWork,
    UpToDateEngine, fingerprint,
};

const UNITS: usize = 64;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::INFO)
        .try_init();
}

fn unit(index: usize) -> UnitOfWork {
    let name = format!("recipe-{index}:do_compile");
    let sources = PropertySpec::input(name.as_str(), false, FileSource::collection(["src"]))
        .with_property_name("sources")
        .with_snapshot_normalization_strategy(NormalizationStrategy::Relative)
        .build()
        .unwrap();
    UnitOfWork::new(PropertySet::from_specs(name, [sources]).unwrap())
}

fn observation(index: usize, revision: usize) -> CurrentSnapshots {
    let entries = (0..16)
        .map(|file| {
            NormalizedEntry::new(
                format!("src/file{file}.c"),
                FileDigest::of(format!("{index}:{file}:{revision}").as_bytes()),
            )
        })
        .collect();
    CurrentSnapshots::new().with_snapshot(
        PropertyRole::Input,
        "sources",
        Snapshot::new(NormalizationStrategy::Relative, entries),
    )
}

fn evaluations(revision_of: impl Fn(usize) -> usize) -> Vec<UnitEvaluation> {
    (0..UNITS)
        .map(|index| UnitEvaluation {
            unit: unit(index),
            current: observation(index, revision_of(index)),
        })
        .collect()
}

#[test]
fn test_fan_out_matches_sequential_and_keeps_order() {
    init_tracing();

    let store = InMemorySnapshotStore::new();
    let parallel = UpToDateEngine::default();
    let sequential = UpToDateEngine::new(EngineConfig::sequential());

    // First build: every unit runs
    let first = evaluations(|_| 0);
    let decisions = parallel.decide_all(&store, &first);
    assert_eq!(decisions.len(), UNITS);
    for (evaluation, decided) in first.iter().zip(&decisions) {
        assert_eq!(decided.unit, evaluation.unit.identity());
        assert!(decided.decision.as_ref().unwrap().must_execute());
        let committed = parallel.complete(
            &store,
            &evaluation.unit,
            ExecutionOutcome::Executed,
            &evaluation.current,
        );
        assert!(committed.unwrap());
    }
    assert_eq!(store.len().unwrap(), UNITS);

    // Second build: every fourth unit had a source edited
    let second = evaluations(|index| usize::from(index % 4 == 0));
    let parallel_decisions = parallel.decide_all(&store, &second);
    let sequential_decisions = sequential.decide_all(&store, &second);

    let parallel_decisions: Vec<Decision> = parallel_decisions
        .into_iter()
        .map(|decided| decided.decision.unwrap())
        .collect();
    let sequential_decisions: Vec<Decision> = sequential_decisions
        .into_iter()
        .map(|decided| decided.decision.unwrap())
        .collect();
    assert_eq!(parallel_decisions, sequential_decisions);

    for (index, decision) in parallel_decisions.iter().enumerate() {
        assert_eq!(decision.must_execute(), index % 4 == 0, "unit {index}: {decision}");
    }

    let stats: DecisionStats = parallel_decisions.iter().collect();
    assert_eq!(stats.total, UNITS);
    assert_eq!(stats.must_execute, UNITS / 4);
    assert_eq!(stats.up_to_date, UNITS - UNITS / 4);
    println!("{stats}");
}

#[test]
fn test_one_failing_unit_does_not_affect_others() {
    init_tracing();

    let store = InMemorySnapshotStore::new();
    let engine = UpToDateEngine::default();

    let mut batch = evaluations(|_| 0);
    for evaluation in &batch {
        let committed = engine.complete(
            &store,
            &evaluation.unit,
            ExecutionOutcome::Executed,
            &evaluation.current,
        );
        assert!(committed.unwrap());
    }

    // Nothing observed for the required input of unit 3
    batch[3].current = CurrentSnapshots::new();

    let decisions = engine.decide_all(&store, &batch);
    for (index, decided) in decisions.iter().enumerate() {
        if index == 3 {
            assert!(matches!(
                decided.decision,
                Err(SnapshotError::Config(ConfigError::UnresolvedProperty { .. }))
            ));
        } else {
            assert!(decided.decision.as_ref().unwrap().is_up_to_date());
        }
    }

    let stats: DecisionStats = decisions.iter().collect();
    assert_eq!(stats.total, UNITS);
    assert_eq!(stats.errors, 1);
    assert_eq!(stats.up_to_date, UNITS - 1);
    assert_eq!(stats.must_execute, 0);
}

#[test]
fn test_fingerprints_follow_content() {
    let a = fingerprint(&unit(1), &observation(1, 0)).unwrap();
    let b = fingerprint(&unit(1), &observation(1, 0)).unwrap();
    let c = fingerprint(&unit(1), &observation(1, 1)).unwrap();
    let d = fingerprint(&unit(2), &observation(1, 0)).unwrap();

    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_ne!(a, d);
}
