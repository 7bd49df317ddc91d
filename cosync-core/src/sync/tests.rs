use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use super::*;
use crate::Tick;
use crate::config::CosyncConfig;
use crate::container::{InputContainer, ResultContainer};
use crate::messages::{MessageContent, ParsedMessage, PowerUnit};

const STEP: u64 = 900;

fn synchronizer() -> Arc<Synchronizer> {
    let sync = Arc::new(Synchronizer::new(&CosyncConfig::for_testing().sync));
    sync.set_step_size(STEP).unwrap();
    sync
}

/// Brings both sides to `tick`, whichever arrives first.
fn rendezvous(sync: &Arc<Synchronizer>, tick: Tick) {
    let host = {
        let sync = Arc::clone(sync);
        thread::spawn(move || sync.advance_host_tick(tick))
    };
    sync.advance_external_tick(tick).unwrap();
    host.join().unwrap().unwrap();
}

fn settle() {
    thread::sleep(Duration::from_millis(50));
}

#[test]
fn test_host_ahead_blocks_until_external_arrives() {
    let sync = synchronizer();
    let host = {
        let sync = Arc::clone(&sync);
        thread::spawn(move || sync.advance_host_tick(0))
    };

    settle();
    assert!(!host.is_finished());

    sync.advance_external_tick(0).unwrap();
    host.join().unwrap().unwrap();

    assert_eq!(sync.host_tick(), Some(0));
    assert_eq!(sync.external_tick(), Some(0));
    assert!(!sync.is_finished());
}

#[test]
fn test_external_ahead_blocks_until_host_arrives() {
    let sync = synchronizer();
    let external = {
        let sync = Arc::clone(&sync);
        thread::spawn(move || sync.advance_external_tick(0))
    };

    settle();
    assert!(!external.is_finished());

    sync.advance_host_tick(0).unwrap();
    external.join().unwrap().unwrap();
    assert!(!sync.is_finished());
}

#[test]
fn test_intermediate_host_tick_requested_before_boundary() {
    let sync = synchronizer();

    rendezvous(&sync, 0);
    assert!(sync.declare_next_host_tick(Some(900)));
    assert_eq!(sync.next_tick(), Some(900));
    assert!(!sync.should_emit_intermediate_output());

    rendezvous(&sync, 900);
    assert!(sync.declare_next_host_tick(Some(1350)));
    assert_eq!(sync.next_tick(), Some(1350));
    assert!(sync.should_emit_intermediate_output());
    assert!(!sync.should_emit_intermediate_output());

    rendezvous(&sync, 1350);
    sync.declare_next_host_tick(Some(1800));
    assert_eq!(sync.next_tick(), Some(1800));
    assert!(!sync.should_emit_intermediate_output());

    rendezvous(&sync, 1800);
    assert_eq!(sync.next_tick(), Some(2700));
}

#[test]
fn test_unchanged_declaration_reports_no_change() {
    let sync = synchronizer();
    rendezvous(&sync, 0);

    assert!(sync.declare_next_host_tick(Some(900)));
    assert!(!sync.declare_next_host_tick(Some(900)));
    assert_eq!(sync.next_host_tick(), Some(900));
}

#[test]
fn test_no_output_suppresses_intermediate_output() {
    let sync = synchronizer();
    rendezvous(&sync, 0);
    sync.declare_next_host_tick(Some(900));
    rendezvous(&sync, 900);
    sync.declare_next_host_tick(Some(1350));

    sync.set_no_output_flag();
    assert!(!sync.should_emit_intermediate_output());
    assert!(sync.publish_result(ResultContainer::new(900)));
    assert!(sync.poll_result(Duration::from_millis(1)).is_none());
}

#[test]
fn test_empty_input_does_not_block_host() {
    let sync = synchronizer();
    rendezvous(&sync, 0);
    assert!(!sync.no_input_signaled());

    sync.set_no_input_flag();
    assert!(sync.no_input_signaled());
    assert!(sync.receive_input().is_none());
}

#[test]
fn test_submitted_input_reaches_host() {
    let sync = synchronizer();
    rendezvous(&sync, 0);

    assert!(sync.submit_input(InputContainer::new(0, Some(900))));
    let input = sync.receive_input().unwrap();
    assert_eq!(input.tick, 0);
    assert_eq!(input.next_tick, Some(900));
}

#[test]
fn test_new_external_tick_clears_flags() {
    let sync = synchronizer();
    rendezvous(&sync, 0);
    sync.set_no_input_flag();
    sync.declare_next_host_tick(Some(900));

    rendezvous(&sync, 900);
    assert!(!sync.no_input_signaled());
}

#[test]
fn test_poll_result_returns_only_current_tick() {
    let sync = synchronizer();
    rendezvous(&sync, 0);
    assert!(sync.publish_result(ResultContainer::new(0)));
    assert_eq!(sync.poll_result(Duration::from_millis(1)).map(|r| r.tick), Some(0));

    sync.declare_next_host_tick(Some(900));
    rendezvous(&sync, 900);
    assert!(sync.publish_result(ResultContainer::new(0)));
    assert!(sync.publish_result(ResultContainer::new(900)));

    let result = sync.poll_result(Duration::from_millis(1)).unwrap();
    assert_eq!(result.tick, 900);
}

#[test]
fn test_external_proceeds_when_host_declared_later_tick() {
    let sync = synchronizer();
    rendezvous(&sync, 0);
    sync.declare_next_host_tick(Some(2700));

    sync.advance_external_tick(900).unwrap();
    assert!(sync.is_finished());
    assert!(sync.poll_result(Duration::from_millis(1)).is_none());
    assert_eq!(sync.next_tick(), Some(1800));
    assert!(sync.should_emit_intermediate_output());
}

#[test]
fn test_host_behind_external_does_not_block() {
    let sync = synchronizer();
    rendezvous(&sync, 0);
    sync.declare_next_host_tick(Some(2700));
    sync.advance_external_tick(900).unwrap();

    sync.advance_host_tick(450).unwrap();
    assert!(sync.is_finished());
    assert!(sync.receive_input().is_none());
}

#[test]
fn test_end_of_run_releases_external() {
    let sync = synchronizer();
    rendezvous(&sync, 0);
    sync.declare_next_host_tick(None);

    sync.advance_external_tick(900).unwrap();
    assert!(sync.is_finished());
    assert_eq!(sync.next_tick(), Some(1800));
}

#[test]
fn test_late_declaration_releases_waiting_external() {
    let sync = synchronizer();
    rendezvous(&sync, 0);

    let external = {
        let sync = Arc::clone(&sync);
        thread::spawn(move || sync.advance_external_tick(900))
    };
    settle();
    assert!(!external.is_finished());

    sync.declare_next_host_tick(Some(1800));
    external.join().unwrap().unwrap();
    assert!(sync.is_finished());
}

#[test]
fn test_external_waits_for_lagging_host() {
    let sync = synchronizer();
    rendezvous(&sync, 0);

    let external = {
        let sync = Arc::clone(&sync);
        thread::spawn(move || sync.advance_external_tick(600))
    };
    settle();
    assert!(!external.is_finished());

    sync.declare_next_host_tick(Some(300));
    settle();
    assert!(!external.is_finished());

    sync.advance_host_tick(300).unwrap();
    assert!(sync.is_finished());
    assert!(sync.receive_input().is_none());

    sync.declare_next_host_tick(Some(600));
    sync.advance_host_tick(600).unwrap();
    external.join().unwrap().unwrap();
    assert!(!sync.is_finished());
}

#[test]
fn test_declared_tick_from_behind_is_next_tick() {
    let sync = synchronizer();
    rendezvous(&sync, 0);
    sync.declare_next_host_tick(Some(1000));

    sync.advance_external_tick(900).unwrap();
    assert!(sync.is_finished());
    assert_eq!(sync.next_tick(), Some(1000));

    let host = {
        let sync = Arc::clone(&sync);
        thread::spawn(move || sync.advance_host_tick(1000))
    };
    sync.advance_external_tick(1000).unwrap();
    host.join().unwrap().unwrap();
    assert!(!sync.is_finished());
    assert_eq!(sync.next_tick(), Some(1800));
}

#[test]
fn test_close_releases_waiting_host() {
    let sync = synchronizer();
    let host = {
        let sync = Arc::clone(&sync);
        thread::spawn(move || sync.advance_host_tick(0))
    };
    settle();

    sync.close();
    assert_eq!(host.join().unwrap(), Err(SyncError::Closed));
    assert!(sync.is_closed());
    assert_eq!(sync.advance_external_tick(0), Err(SyncError::Closed));
    assert!(!SyncError::Closed.is_fatal());
}

#[test]
fn test_host_skipping_declared_tick_does_not_deadlock() {
    let sync = synchronizer();
    rendezvous(&sync, 0);
    sync.declare_next_host_tick(Some(900));

    let external = {
        let sync = Arc::clone(&sync);
        thread::spawn(move || sync.advance_external_tick(900))
    };
    settle();
    assert!(!external.is_finished());

    sync.advance_host_tick(1350).unwrap();
    external.join().unwrap().unwrap();
    assert!(sync.poll_result(Duration::from_millis(1)).is_none());
}

#[test]
fn test_external_releases_host_waiting_on_misdeclared_tick() {
    let sync = synchronizer();
    rendezvous(&sync, 0);
    sync.declare_next_host_tick(Some(1800));
    sync.advance_external_tick(900).unwrap();
    assert_eq!(sync.next_tick(), Some(1800));

    let (done_tx, done_rx) = crossbeam_channel::bounded(2);
    let host = {
        let sync = Arc::clone(&sync);
        let done = done_tx.clone();
        thread::spawn(move || {
            let result = sync.advance_host_tick(1000);
            done.send(Side::Host).unwrap();
            result
        })
    };
    settle();
    assert!(!host.is_finished());

    // Host parked at 1000 although it announced 1800
    let external = {
        let sync = Arc::clone(&sync);
        thread::spawn(move || {
            let result = sync.advance_external_tick(1800);
            done_tx.send(Side::External).unwrap();
            result
        })
    };

    let mut released = vec![
        done_rx.recv_timeout(Duration::from_secs(1)).unwrap(),
        done_rx.recv_timeout(Duration::from_secs(1)).unwrap(),
    ];
    released.sort_by_key(|side| side.to_string());
    assert_eq!(released, vec![Side::External, Side::Host]);

    external.join().unwrap().unwrap();
    host.join().unwrap().unwrap();
    assert!(sync.is_finished());
    assert_eq!(sync.next_tick(), Some(2700));
}

#[test]
fn test_input_for_unvisited_ticks_does_not_fill_queue() {
    let mut config = CosyncConfig::for_testing().sync;
    config.input_queue_capacity = 2;
    config.queue_send_timeout = Duration::from_secs(1);
    let sync = Arc::new(Synchronizer::new(&config));
    sync.set_step_size(STEP).unwrap();

    let host = {
        let sync = Arc::clone(&sync);
        thread::spawn(move || sync.advance_host_tick(18000))
    };
    settle();

    let started = Instant::now();
    for time in (0..=8100u64).step_by(STEP as usize) {
        sync.advance_external_tick(time).unwrap();
        assert!(sync.is_finished());
        assert!(sync.submit_input(InputContainer::new(time, Some(time + STEP))));
        assert!(sync.no_input_signaled());
    }
    assert!(started.elapsed() < Duration::from_secs(1));

    sync.close();
    assert_eq!(host.join().unwrap(), Err(SyncError::Closed));
}

#[test]
fn test_repeated_poll_within_tick_returns_result_again() {
    let sync = synchronizer();
    rendezvous(&sync, 0);
    assert!(sync.publish_result(ResultContainer::new(0).with_next_tick(Some(900))));

    let first = sync.poll_result(Duration::from_millis(1)).unwrap();
    let second = sync.poll_result(Duration::from_millis(1)).unwrap();
    assert_eq!(first, second);
    assert_eq!(second.next_tick, Some(900));
}

#[test]
fn test_repeated_external_tick_keeps_boundary() {
    let sync = synchronizer();
    rendezvous(&sync, 0);
    sync.declare_next_host_tick(Some(900));

    sync.advance_external_tick(0).unwrap();
    assert_eq!(sync.external_tick(), Some(0));
    assert_eq!(sync.next_tick(), Some(900));

    rendezvous(&sync, 900);
    assert_eq!(sync.next_tick(), Some(1800));
}

#[test]
fn test_host_tick_moving_backwards_is_violation() {
    let sync = synchronizer();
    rendezvous(&sync, 900);

    let err = sync.advance_host_tick(0).unwrap_err();
    assert!(matches!(
        err,
        SyncError::ProtocolViolation {
            side: Side::Host,
            tick: 0,
            ..
        }
    ));
    assert!(err.is_fatal());
}

#[test]
fn test_external_time_moving_backwards_is_violation() {
    let sync = synchronizer();
    rendezvous(&sync, 900);

    assert!(matches!(
        sync.advance_external_tick(0),
        Err(SyncError::ProtocolViolation {
            side: Side::External,
            ..
        })
    ));
}

#[test]
fn test_skipping_regular_boundary_is_violation() {
    let sync = synchronizer();
    rendezvous(&sync, 0);
    sync.declare_next_host_tick(Some(900));

    assert!(matches!(
        sync.advance_external_tick(1800),
        Err(SyncError::ProtocolViolation {
            side: Side::External,
            tick: 1800,
            ..
        })
    ));
}

#[test]
fn test_skipping_declared_host_tick_is_violation() {
    let sync = synchronizer();
    rendezvous(&sync, 0);
    sync.declare_next_host_tick(Some(300));

    let err = sync.advance_external_tick(900).unwrap_err();
    assert!(matches!(
        err,
        SyncError::ProtocolViolation {
            side: Side::External,
            tick: 900,
            ..
        }
    ));
    assert!(err.is_fatal());
}

#[test]
fn test_step_size_rules() {
    let sync = Synchronizer::new(&CosyncConfig::for_testing().sync);

    assert_eq!(sync.advance_external_tick(0), Err(SyncError::StepSizeUnset));
    assert_eq!(sync.set_step_size(0), Err(SyncError::ZeroStepSize));

    sync.set_step_size(900).unwrap();
    sync.set_step_size(900).unwrap();
    assert_eq!(
        sync.set_step_size(60),
        Err(SyncError::StepSizeAlreadySet { current: 900 })
    );
    assert_eq!(sync.step_size(), Some(900));
    assert!(!SyncError::ZeroStepSize.is_fatal());
}

#[test]
fn test_filter_unseen_scoped_to_tick() {
    let sync = synchronizer();
    let message = ParsedMessage::new(
        "load_1",
        Some("grid".to_string()),
        MessageContent::Measurement {
            unit: PowerUnit::KiloWatt,
            value: 250.0,
        },
    );

    assert_eq!(sync.filter_unseen(0, vec![message.clone()]).len(), 1);
    assert!(sync.filter_unseen(0, vec![message.clone()]).is_empty());
    assert_eq!(sync.filter_unseen(900, vec![message]).len(), 1);
}

#[test]
fn test_initialization_roundtrip_through_synchronizer() {
    let sync = synchronizer();
    sync.push_initialization_data(InitializationData::Parameters(
        SimulationParameters::with_step_size(STEP),
    ))
    .unwrap();

    let data = sync.take_initialization_data(InitKind::Parameters).unwrap();
    assert_eq!(data.kind(), InitKind::Parameters);

    sync.close();
    assert_eq!(
        sync.take_initialization_data(InitKind::Mapping).unwrap_err(),
        SyncError::HandshakeClosed
    );
}
