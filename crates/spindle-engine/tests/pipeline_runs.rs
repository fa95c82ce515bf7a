//! Integration tests: sequential and parallel pipeline runs.
//!
//! Builds small pipelines from the fixture modules and checks what each
//! event's consumers saw, how failures are reported, and that a shut
//! down pipeline leaves nothing registered on the messenger.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use proptest::prelude::*;

use spindle_core::{EventId, MessengerError, ModuleInfo, MsgFlags};
use spindle_engine::{EventError, Pipeline, PipelineBuilder, PipelineConfig, PipelineError};
use spindle_messenger::Messenger;
use spindle_test_utils::{
    FailingModule, HitCollector, HitLog, HitSource, ParticleConsumer, ParticleSource,
};

// ── Helpers ──────────────────────────────────────────────────────────

fn new_log() -> HitLog {
    Arc::new(Mutex::new(Vec::new()))
}

fn sorted_entries(log: &HitLog) -> Vec<(EventId, Vec<u32>)> {
    let mut entries = log.lock().unwrap_or_else(PoisonError::into_inner).clone();
    entries.sort_by_key(|(event, _)| *event);
    entries
}

/// Source emitting two hits under "a" and two under "b", one collector
/// listening to "a" and one listening to every name.
fn hit_pipeline(config: PipelineConfig) -> (Pipeline, HitLog, HitLog) {
    let only_a = new_log();
    let every_name = new_log();
    let mut builder = PipelineBuilder::new(config);
    builder
        .add_module(ModuleInfo::new("source"), |subs| {
            Ok(HitSource::new(subs, &["a", "b"], 2))
        })
        .unwrap();
    let log = Arc::clone(&only_a);
    builder
        .add_module(ModuleInfo::new("collect_a").with_input("a"), move |subs| {
            Ok(HitCollector::new(subs, MsgFlags::NONE, log))
        })
        .unwrap();
    let log = Arc::clone(&every_name);
    builder
        .add_module(ModuleInfo::new("collect_all"), move |subs| {
            Ok(HitCollector::new(subs, MsgFlags::IGNORE_NAME, log))
        })
        .unwrap();
    (builder.build().unwrap(), only_a, every_name)
}

fn failing_pipeline(config: PipelineConfig, fail_on: &[u64]) -> (Pipeline, Arc<AtomicUsize>) {
    let failing = FailingModule::new(fail_on);
    let counter = failing.counter();
    let mut builder = PipelineBuilder::new(config);
    builder
        .add_module(ModuleInfo::new("failing"), move |_| Ok(failing))
        .unwrap();
    (builder.build().unwrap(), counter)
}

// ── Sequential ───────────────────────────────────────────────────────

#[test]
fn sequential_run_routes_by_name() {
    let (mut pipeline, only_a, every_name) = hit_pipeline(PipelineConfig::default());
    let summary = pipeline.run(5).unwrap();

    assert!(summary.is_success());
    assert_eq!(summary.events_processed, 5);
    assert_eq!(summary.metrics.completed_events, 5);
    assert_eq!(summary.metrics.dispatches, 10);

    let a = sorted_entries(&only_a);
    let all = sorted_entries(&every_name);
    assert_eq!(a.len(), 5);
    for (expected, (event, indices)) in a.iter().enumerate() {
        assert_eq!(*event, EventId(expected as u64));
        assert_eq!(indices, &vec![0, 1]);
    }
    for (_, indices) in &all {
        assert_eq!(indices, &vec![0, 1, 2, 3]);
    }
}

#[test]
fn event_ids_continue_across_sequential_runs() {
    let (mut pipeline, only_a, _) = hit_pipeline(PipelineConfig::default());
    pipeline.run(3).unwrap();
    pipeline.run(2).unwrap();
    assert_eq!(pipeline.next_event(), EventId(5));
    let events: Vec<EventId> = sorted_entries(&only_a).into_iter().map(|(e, _)| e).collect();
    assert_eq!(events, (0..5).map(EventId).collect::<Vec<_>>());
}

#[test]
fn failed_event_leaves_no_messages_behind() {
    let log = new_log();
    let mut builder = PipelineBuilder::new(PipelineConfig::default());
    builder
        .add_module(ModuleInfo::new("source"), |subs| {
            Ok(HitSource::new(subs, &[""], 3))
        })
        .unwrap();
    builder
        .add_module(ModuleInfo::new("failing"), |_| Ok(FailingModule::new(&[1])))
        .unwrap();
    let sink = Arc::clone(&log);
    builder
        .add_module(ModuleInfo::new("collect"), move |subs| {
            Ok(HitCollector::new(subs, MsgFlags::NONE, sink))
        })
        .unwrap();
    let mut pipeline = builder.build().unwrap();

    let summary = pipeline.run(3).unwrap();
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].event(), EventId(1));
    assert!(matches!(
        &summary.failures[0],
        EventError::Module { module, .. } if module == "failing"
    ));

    let entries = sorted_entries(&log);
    assert_eq!(
        entries,
        vec![(EventId(0), vec![0, 1, 2]), (EventId(2), vec![0, 1, 2])]
    );
}

#[test]
fn stop_on_error_halts_sequential_run() {
    let config = PipelineConfig {
        stop_on_error: true,
        ..PipelineConfig::default()
    };
    let (mut pipeline, counter) = failing_pipeline(config, &[3]);
    let summary = pipeline.run(10).unwrap();

    assert_eq!(summary.events_processed, 4);
    assert!(summary.aborted);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].event(), EventId(3));
    assert_eq!(counter.load(Ordering::Relaxed), 4);
}

#[test]
fn failures_are_isolated_without_stop_on_error() {
    let (mut pipeline, counter) = failing_pipeline(PipelineConfig::default(), &[2, 7]);
    let summary = pipeline.run(10).unwrap();

    assert_eq!(summary.events_processed, 10);
    assert!(!summary.aborted);
    let failed: Vec<EventId> = summary.failures.iter().map(EventError::event).collect();
    assert_eq!(failed, vec![EventId(2), EventId(7)]);
    assert_eq!(summary.metrics.completed_events, 8);
    assert_eq!(summary.metrics.failed_events, 2);
    assert_eq!(counter.load(Ordering::Relaxed), 10);
}

// ── Requirements ─────────────────────────────────────────────────────

fn unmet_requirement_pipeline(config: PipelineConfig) -> (Pipeline, HitLog) {
    let log = new_log();
    let mut builder = PipelineBuilder::new(config);
    builder
        .add_module(ModuleInfo::new("source"), |subs| {
            Ok(HitSource::new(subs, &["present"], 1))
        })
        .unwrap();
    let sink = Arc::clone(&log);
    builder
        .add_module(ModuleInfo::new("collect"), move |subs| {
            Ok(HitCollector::named(subs, "absent", MsgFlags::REQUIRED, sink))
        })
        .unwrap();
    (builder.build().unwrap(), log)
}

#[test]
fn missing_required_input_fails_event() {
    let (mut pipeline, log) = unmet_requirement_pipeline(PipelineConfig::default());
    let summary = pipeline.run(2).unwrap();

    assert_eq!(summary.failures.len(), 2);
    match &summary.failures[0] {
        EventError::Requirements {
            event,
            source: MessengerError::UnsatisfiedRequirement { missing },
        } => {
            assert_eq!(*event, EventId(0));
            assert_eq!(missing.len(), 1);
            assert_eq!(missing[0].module, "collect");
            assert_eq!(missing[0].name.as_deref(), Some("absent"));
        }
        other => panic!("expected requirements failure, got {other:?}"),
    }
    // The collector still ran; requirements are checked at the end.
    assert_eq!(sorted_entries(&log).len(), 2);
}

#[test]
fn skip_mode_skips_module_instead_of_failing() {
    let config = PipelineConfig {
        skip_unsatisfied_modules: true,
        ..PipelineConfig::default()
    };
    let (mut pipeline, log) = unmet_requirement_pipeline(config);
    let summary = pipeline.run(4).unwrap();

    assert!(summary.is_success());
    assert_eq!(summary.metrics.skipped_modules, 4);
    assert!(sorted_entries(&log).is_empty());
}

#[test]
fn skip_mode_runs_consumer_only_when_input_arrives() {
    let seen = Arc::new(AtomicUsize::new(0));
    let config = PipelineConfig {
        skip_unsatisfied_modules: true,
        ..PipelineConfig::default()
    };
    let mut builder = PipelineBuilder::new(config);
    builder
        .add_module(ModuleInfo::new("particles"), |subs| {
            Ok(ParticleSource::new(subs, 3))
        })
        .unwrap();
    let counter = Arc::clone(&seen);
    builder
        .add_module(ModuleInfo::new("consumer"), move |subs| {
            Ok(ParticleConsumer::new(subs, counter))
        })
        .unwrap();
    let mut pipeline = builder.build().unwrap();

    let summary = pipeline.run(9).unwrap();
    assert!(summary.is_success());
    // Events 0, 3 and 6 carry a particle.
    assert_eq!(seen.load(Ordering::Relaxed), 3);
    assert_eq!(summary.metrics.skipped_modules, 6);
}

#[test]
fn skip_mode_still_reports_requirements_outside_the_pipeline() {
    let messenger = Arc::new(Messenger::new());
    let mut outside = messenger.subscriptions(ModuleInfo::new("outside"));
    outside.bind_single::<u64>(MsgFlags::REQUIRED);

    let config = PipelineConfig {
        skip_unsatisfied_modules: true,
        ..PipelineConfig::default()
    };
    let log = new_log();
    let mut builder = PipelineBuilder::with_messenger(config, Arc::clone(&messenger));
    builder
        .add_module(ModuleInfo::new("source"), |subs| {
            Ok(HitSource::new(subs, &["present"], 1))
        })
        .unwrap();
    let sink = Arc::clone(&log);
    builder
        .add_module(ModuleInfo::new("collect"), move |subs| {
            Ok(HitCollector::named(subs, "absent", MsgFlags::REQUIRED, sink))
        })
        .unwrap();
    let mut pipeline = builder.build().unwrap();

    let summary = pipeline.run(2).unwrap();
    assert_eq!(summary.metrics.skipped_modules, 2);
    assert_eq!(summary.failures.len(), 2);
    for failure in &summary.failures {
        match failure {
            EventError::Requirements {
                source: MessengerError::UnsatisfiedRequirement { missing },
                ..
            } => {
                // The skipped collector is not reported; the foreign delegate is.
                assert_eq!(missing.len(), 1);
                assert_eq!(missing[0].module, "outside");
            }
            other => panic!("expected requirements failure, got {other:?}"),
        }
    }

    pipeline.shutdown().unwrap();
    outside.release().unwrap();
    assert_eq!(messenger.delegate_count(), 0);
}

// ── Detectors ────────────────────────────────────────────────────────

#[test]
fn detector_tagged_hits_reach_only_matching_instance() {
    let dut = new_log();
    let telescope = new_log();
    let mut builder = PipelineBuilder::new(PipelineConfig::default());
    builder
        .add_module(ModuleInfo::new("source"), |subs| {
            Ok(HitSource::new(subs, &[""], 3).for_detector("dut"))
        })
        .unwrap();
    for (detector, log) in [("dut", &dut), ("telescope", &telescope)] {
        let sink = Arc::clone(log);
        builder
            .add_module(ModuleInfo::new("hist").with_detector(detector), move |subs| {
                Ok(HitCollector::new(subs, MsgFlags::IGNORE_NAME, sink))
            })
            .unwrap();
    }
    let mut pipeline = builder.build().unwrap();
    assert!(pipeline.run(2).unwrap().is_success());

    assert_eq!(
        sorted_entries(&dut),
        vec![(EventId(0), vec![0, 1, 2]), (EventId(1), vec![0, 1, 2])]
    );
    assert_eq!(
        sorted_entries(&telescope),
        vec![(EventId(0), Vec::<u32>::new()), (EventId(1), Vec::new())]
    );
}

// ── Build-time checks ────────────────────────────────────────────────

#[test]
fn strict_contracts_reject_unproduced_subscription() {
    let config = PipelineConfig {
        strict_contracts: true,
        ..PipelineConfig::default()
    };
    let mut builder = PipelineBuilder::new(config);
    builder
        .add_module(ModuleInfo::new("consumer"), |subs| {
            Ok(ParticleConsumer::new(subs, Arc::new(AtomicUsize::new(0))))
        })
        .unwrap();
    match builder.build() {
        Err(PipelineError::Contracts(violations)) => assert_eq!(violations.len(), 1),
        other => panic!("expected contract violation, got {other:?}"),
    }
}

#[test]
fn strict_contracts_accept_declared_producer() {
    let config = PipelineConfig {
        strict_contracts: true,
        ..PipelineConfig::default()
    };
    let mut builder = PipelineBuilder::new(config);
    builder
        .add_module(ModuleInfo::new("particles"), |subs| {
            Ok(ParticleSource::new(subs, 1))
        })
        .unwrap();
    builder
        .add_module(ModuleInfo::new("consumer"), |subs| {
            Ok(ParticleConsumer::new(subs, Arc::new(AtomicUsize::new(0))))
        })
        .unwrap();
    let mut pipeline = builder.build().unwrap();
    assert!(pipeline.run(4).unwrap().is_success());
}

#[test]
fn shutdown_releases_every_delegate() {
    let (mut pipeline, _, _) = hit_pipeline(PipelineConfig::default());
    let messenger = Arc::clone(pipeline.messenger());
    assert_eq!(messenger.delegate_count(), 2);

    pipeline.run(2).unwrap();
    pipeline.finalize().unwrap();
    pipeline.shutdown().unwrap();
    assert_eq!(messenger.delegate_count(), 0);
    assert!(messenger.routes().is_empty());
    assert!(messenger.is_consistent());
}

#[test]
fn dropping_pipeline_releases_delegates() {
    let (pipeline, _, _) = hit_pipeline(PipelineConfig::default());
    let messenger = Arc::clone(pipeline.messenger());
    drop(pipeline);
    assert_eq!(messenger.delegate_count(), 0);
}

// ── Parallel ─────────────────────────────────────────────────────────

#[test]
fn parallel_run_processes_each_event_once() {
    let config = PipelineConfig {
        worker_count: Some(4),
        event_queue_capacity: 8,
        ..PipelineConfig::default()
    };
    let (mut pipeline, only_a, every_name) = hit_pipeline(config);
    let summary = pipeline.run_parallel(200).unwrap();

    assert!(summary.is_success());
    assert_eq!(summary.events_processed, 200);
    assert!(!summary.aborted);

    let a = sorted_entries(&only_a);
    let events: Vec<EventId> = a.iter().map(|(event, _)| *event).collect();
    assert_eq!(events, (0..200).map(EventId).collect::<Vec<_>>());
    assert!(a.iter().all(|(_, indices)| indices == &vec![0, 1]));
    assert!(sorted_entries(&every_name)
        .iter()
        .all(|(_, indices)| indices == &vec![0, 1, 2, 3]));
}

#[test]
fn parallel_failures_sorted_by_event() {
    let config = PipelineConfig {
        worker_count: Some(3),
        ..PipelineConfig::default()
    };
    let (mut pipeline, counter) = failing_pipeline(config, &[40, 5, 17]);
    let summary = pipeline.run_parallel(50).unwrap();

    assert_eq!(summary.events_processed, 50);
    let failed: Vec<EventId> = summary.failures.iter().map(EventError::event).collect();
    assert_eq!(failed, vec![EventId(5), EventId(17), EventId(40)]);
    assert_eq!(counter.load(Ordering::Relaxed), 50);
}

#[test]
fn stop_on_error_halts_parallel_run() {
    let config = PipelineConfig {
        worker_count: Some(2),
        event_queue_capacity: 1,
        stop_on_error: true,
        ..PipelineConfig::default()
    };
    let (mut pipeline, _) = failing_pipeline(config, &[3]);
    let summary = pipeline.run_parallel(1000).unwrap();

    assert!(summary.aborted);
    assert!(summary.events_processed < 1000);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].event(), EventId(3));
    assert_eq!(pipeline.next_event(), EventId(1000));
}

#[test]
fn sequential_and_parallel_runs_share_event_numbering() {
    let config = PipelineConfig {
        worker_count: Some(2),
        ..PipelineConfig::default()
    };
    let (mut pipeline, only_a, _) = hit_pipeline(config);
    pipeline.run(10).unwrap();
    pipeline.run_parallel(10).unwrap();
    let events: Vec<EventId> = sorted_entries(&only_a).into_iter().map(|(e, _)| e).collect();
    assert_eq!(events, (0..20).map(EventId).collect::<Vec<_>>());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn parallel_matches_sequential(workers in 1usize..8, events in 1u64..40) {
        let (mut sequential, seq_a, seq_all) = hit_pipeline(PipelineConfig::default());
        sequential.run(events).unwrap();

        let config = PipelineConfig {
            worker_count: Some(workers),
            event_queue_capacity: 2,
            ..PipelineConfig::default()
        };
        let (mut parallel, par_a, par_all) = hit_pipeline(config);
        let summary = parallel.run_parallel(events).unwrap();

        prop_assert!(summary.is_success());
        prop_assert_eq!(sorted_entries(&seq_a), sorted_entries(&par_a));
        prop_assert_eq!(sorted_entries(&seq_all), sorted_entries(&par_all));
    }
}
