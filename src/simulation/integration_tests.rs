//! End-to-end scenarios driving the full engine: happy path, crash faults,
//! view changes, Byzantine double voting, determinism, and scale.

use std::collections::HashMap;

use crate::config::Settings;
use crate::consensus::PacemakerKind;
use crate::simulation::{SimulationEngine, SimulationEvent};
use crate::types::{FaultKind, Hash};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn make_engine(settings: Settings) -> SimulationEngine {
    init_logging();
    SimulationEngine::new(settings).expect("valid settings")
}

fn run_steps(engine: &mut SimulationEngine, max_steps: usize) -> usize {
    let mut steps = 0;
    while steps < max_steps {
        if engine.step().is_none() {
            break;
        }
        steps += 1;
    }
    steps
}

fn commits(engine: &SimulationEngine) -> Vec<(u64, u64, Hash)> {
    engine
        .event_history()
        .iter()
        .filter_map(|event| match event {
            SimulationEvent::Commit {
                replica_id,
                height,
                block_hash,
                ..
            } => Some((*replica_id, *height, *block_hash)),
            _ => None,
        })
        .collect()
}

fn assert_committed_prefixes_agree(engine: &SimulationEngine) {
    let mut by_height: HashMap<u64, Hash> = HashMap::new();
    for (replica_id, height, hash) in commits(engine) {
        match by_height.get(&height) {
            Some(known) => assert_eq!(
                *known, hash,
                "replica {} committed a conflicting block at height {}",
                replica_id, height
            ),
            None => {
                by_height.insert(height, hash);
            }
        }
    }
}

fn assert_commits_contiguous(engine: &SimulationEngine) {
    let mut next_height: HashMap<u64, u64> = HashMap::new();
    for (replica_id, height, _) in commits(engine) {
        let expected = next_height.entry(replica_id).or_insert(1);
        assert_eq!(
            height, *expected,
            "replica {} committed height {} out of order",
            replica_id, height
        );
        *expected += 1;
    }
}

fn assert_locks_monotone(engine: &SimulationEngine) {
    let mut last_locked: HashMap<u64, u64> = HashMap::new();
    for event in engine.event_history() {
        if let SimulationEvent::LockUpdate {
            replica_id,
            locked_view,
            ..
        } = event
        {
            let previous = last_locked.entry(*replica_id).or_insert(0);
            assert!(
                *locked_view >= *previous,
                "replica {} lock regressed from {} to {}",
                replica_id,
                previous,
                locked_view
            );
            *previous = *locked_view;
        }
    }
}

#[test]
fn test_four_node_happy_path() {
    // S1: no faults, generous timeout, no view changes expected
    let mut engine = make_engine(Settings {
        num_replicas: 4,
        num_faulty: 1,
        fault_type: FaultKind::None,
        base_timeout_ms: 1000,
        random_seed: Some(42),
        ..Settings::default()
    });
    engine.start();
    run_steps(&mut engine, 500);

    let unique_heights: std::collections::HashSet<u64> =
        commits(&engine).iter().map(|(_, h, _)| *h).collect();
    assert!(
        unique_heights.len() >= 3,
        "expected at least 3 committed heights, got {}",
        unique_heights.len()
    );
    assert!(
        !engine
            .event_history()
            .iter()
            .any(|e| matches!(e, SimulationEvent::Timeout { .. })),
        "happy path must not time out"
    );
    assert_committed_prefixes_agree(&engine);
    assert_commits_contiguous(&engine);
    assert_locks_monotone(&engine);
}

#[test]
fn test_single_crash_non_leader() {
    // S2: replica 3 crashed; the other three keep committing
    let mut engine = make_engine(Settings {
        num_replicas: 4,
        num_faulty: 1,
        fault_type: FaultKind::Crash,
        base_timeout_ms: 500,
        random_seed: Some(42),
        ..Settings::default()
    });
    engine.start();
    run_steps(&mut engine, 1000);

    let commits = commits(&engine);
    let alive_commits = commits.iter().filter(|(id, _, _)| *id != 3).count();
    let crashed_commits = commits.iter().filter(|(id, _, _)| *id == 3).count();
    assert!(
        alive_commits >= 2,
        "expected commits from live replicas, got {}",
        alive_commits
    );
    assert_eq!(crashed_commits, 0, "crashed replica must not commit");
    assert_committed_prefixes_agree(&engine);
    assert_commits_contiguous(&engine);
}

#[test]
fn test_crashed_replica_forces_view_change() {
    // S3: replica 0 crashed with a tight timeout; its leader views stall
    // until the others time out past them
    let mut engine = make_engine(Settings {
        num_replicas: 4,
        num_faulty: 1,
        fault_type: FaultKind::None,
        base_timeout_ms: 100,
        network_delay_min_ms: 1,
        network_delay_max_ms: 10,
        random_seed: Some(42),
        ..Settings::default()
    });
    engine.inject_fault(0, FaultKind::Crash).unwrap();
    engine.start();
    run_steps(&mut engine, 2000);

    let history = engine.event_history();
    assert!(
        history
            .iter()
            .any(|e| matches!(e, SimulationEvent::Timeout { .. })),
        "crashed leader views must produce timeouts"
    );
    assert!(
        history.iter().any(|e| matches!(
            e,
            SimulationEvent::ViewChange { new_view, .. } if *new_view >= 2
        )),
        "replicas must move past the crashed leader's views"
    );
    assert!(
        !commits(&engine).is_empty(),
        "consensus must still make progress"
    );
    assert_committed_prefixes_agree(&engine);
    assert_commits_contiguous(&engine);
}

#[test]
fn test_determinism_same_seed_same_trace() {
    // S4: equal (config, seed) must yield identical event traces
    let settings = Settings {
        num_replicas: 4,
        num_faulty: 1,
        fault_type: FaultKind::Crash,
        random_seed: Some(12345),
        ..Settings::default()
    };

    let trace = |settings: Settings| -> Vec<(String, u64, u64)> {
        let mut engine = make_engine(settings);
        engine.start();
        for _ in 0..50 {
            if engine.step().is_none() {
                break;
            }
        }
        engine
            .event_history()
            .iter()
            .map(|e| (e.event_type().to_string(), e.timestamp(), e.principal_id()))
            .collect()
    };

    let first = trace(settings.clone());
    let second = trace(settings);
    assert!(!first.is_empty());
    assert_eq!(first, second, "same seed must reproduce the same trace");
}

#[test]
fn test_double_vote_cannot_break_agreement() {
    // S5: two equivocating replicas; correct replicas never commit
    // conflicting blocks at any height
    let mut engine = make_engine(Settings {
        num_replicas: 7,
        num_faulty: 2,
        fault_type: FaultKind::DoubleVote,
        base_timeout_ms: 1000,
        random_seed: Some(7),
        ..Settings::default()
    });
    engine.start();
    run_steps(&mut engine, 2000);

    assert!(
        engine
            .event_history()
            .iter()
            .any(|e| matches!(e, SimulationEvent::ByzantineAction { .. })),
        "double voters must actually equivocate"
    );
    assert_committed_prefixes_agree(&engine);
    assert_commits_contiguous(&engine);
    assert_locks_monotone(&engine);
}

#[test]
fn test_thirteen_replicas_commit() {
    // S6: full-quorum configuration at n=13 still makes progress
    let mut engine = make_engine(Settings {
        num_replicas: 13,
        num_faulty: 0,
        base_timeout_ms: 10000,
        random_seed: Some(42),
        ..Settings::default()
    });
    engine.start();
    run_steps(&mut engine, 13 * 13 * 100);

    assert!(
        !commits(&engine).is_empty(),
        "n=13 must commit within the step budget"
    );
    assert_committed_prefixes_agree(&engine);
    assert_commits_contiguous(&engine);
}

#[test]
fn test_silent_fault_stays_live_under_quorum() {
    // a silent replica neither votes nor proposes, but n - f honest
    // replicas still clear the quorum
    let mut engine = make_engine(Settings {
        num_replicas: 4,
        num_faulty: 1,
        fault_type: FaultKind::Silent,
        base_timeout_ms: 1000,
        random_seed: Some(9),
        ..Settings::default()
    });
    engine.start();
    run_steps(&mut engine, 1500);

    assert!(
        engine
            .event_history()
            .iter()
            .any(|e| matches!(e, SimulationEvent::ByzantineAction { .. })),
        "silent replica must report withheld actions"
    );
    assert!(!commits(&engine).is_empty());
    assert_committed_prefixes_agree(&engine);
    assert_commits_contiguous(&engine);
}

#[test]
fn test_adaptive_pacemaker_commits() {
    let mut engine = make_engine(Settings {
        num_replicas: 4,
        num_faulty: 0,
        pacemaker_type: PacemakerKind::Adaptive,
        base_timeout_ms: 1000,
        random_seed: Some(42),
        ..Settings::default()
    });
    engine.start();
    run_steps(&mut engine, 500);

    assert!(!commits(&engine).is_empty());
    assert_committed_prefixes_agree(&engine);
    assert_commits_contiguous(&engine);
}

#[test]
fn test_replica_states_reflect_progress() {
    let mut engine = make_engine(Settings {
        num_replicas: 4,
        num_faulty: 0,
        random_seed: Some(42),
        ..Settings::default()
    });
    engine.start();
    run_steps(&mut engine, 300);

    let states = engine.replica_states();
    assert_eq!(states.len(), 4);
    for state in &states {
        assert!(state.current_view >= 1);
        assert!(state.committed_count > 0);
    }
    assert!(engine.current_view() >= states.iter().map(|s| s.current_view).max().unwrap());
}
