//! The synchronous UI facade driving the scheduler

mod common;

use common::{default_rig, rig, FakeBackend, FakeCompiler};
use std::time::Duration;
use strudel_live::{PlaygroundSession, SchedulerState, TelemetryStatus};
use tokio::time::sleep;

#[tokio::test(start_paused = true)]
async fn test_play_pattern_and_follow_the_beat() {
    let rig = default_rig();
    let session = PlaygroundSession::new(rig.scheduler.clone());

    session.set_pattern_text("bd hh sn hh");
    session.set_tempo(120);
    session.toggle_play();
    session.flush().await;

    assert!(session.snapshot().is_playing);
    assert_eq!(rig.scheduler.state(), SchedulerState::Playing);

    let telemetry = session.telemetry();
    // read halfway between beats, 500 ms apart
    sleep(Duration::from_millis(250)).await;
    let mut phases = Vec::new();
    for _ in 0..5 {
        let frame = telemetry.borrow().clone();
        assert_eq!(frame.status, TelemetryStatus::Live);
        assert_eq!(frame.sample.spectrum_bars.len(), 16);
        phases.push(frame.sample.beat_phase);
        sleep(Duration::from_millis(500)).await;
    }
    assert_eq!(phases, vec![0, 1, 2, 3, 0]);
}

#[tokio::test(start_paused = true)]
async fn test_rapid_double_toggle_ends_idle() {
    let rig = rig(
        FakeBackend {
            open_delay: Duration::from_millis(40),
            ..FakeBackend::default()
        },
        FakeCompiler::default(),
    );
    let session = PlaygroundSession::new(rig.scheduler.clone());

    session.toggle_play();
    session.toggle_play();
    session.flush().await;

    let snapshot = session.snapshot();
    assert!(!snapshot.is_playing);
    assert_eq!(snapshot.last_error, None);
    assert_eq!(rig.scheduler.state(), SchedulerState::Idle);
    assert_eq!(rig.ledger.sounding(), 0);

    let handle = rig.resources.ensure_ready().await.ok().unwrap();
    assert_eq!(handle.output().bound(), None);
    assert_eq!(session.telemetry().borrow().status, TelemetryStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_parse_error_surfaces_and_resets_intent() {
    let rig = default_rig();
    let session = PlaygroundSession::new(rig.scheduler.clone());

    session.set_pattern_text("((");
    session.toggle_play();
    session.flush().await;

    let snapshot = session.snapshot();
    assert!(!snapshot.is_playing);
    let error = snapshot.last_error.expect("error is reported");
    assert!(error.starts_with("Playback error: parse error"), "{}", error);
    assert!(matches!(rig.scheduler.state(), SchedulerState::Failed(_)));

    // the failed attempt resets the toggle, so the next toggle plays again
    session.set_pattern_text("bd sn");
    session.toggle_play();
    session.flush().await;

    let snapshot = session.snapshot();
    assert!(snapshot.is_playing);
    assert_eq!(snapshot.last_error, None);
    assert_eq!(rig.ledger.compiled(), vec!["bd sn"]);
}

#[tokio::test(start_paused = true)]
async fn test_stop_press_after_failed_start_stops() {
    let rig = default_rig();
    let session = PlaygroundSession::new(rig.scheduler.clone());

    // play a broken pattern, then stop and play a good one before the failure settles
    session.set_pattern_text("((");
    session.toggle_play();
    session.set_pattern_text("bd sn");
    session.toggle_play();
    session.toggle_play();
    session.flush().await;

    assert!(session.snapshot().is_playing);
    assert_eq!(rig.scheduler.state(), SchedulerState::Playing);
    assert_eq!(rig.ledger.starts(), 1);

    session.toggle_play();
    session.flush().await;

    assert!(!session.snapshot().is_playing);
    assert_eq!(rig.scheduler.state(), SchedulerState::Idle);
    assert_eq!(rig.ledger.starts(), 1);
    assert_eq!(rig.ledger.sounding(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_tempo_change_while_playing_stays_live() {
    let rig = default_rig();
    let session = PlaygroundSession::new(rig.scheduler.clone());
    session.set_tempo(120);
    session.toggle_play();
    session.flush().await;

    let sequence_before = session.telemetry().borrow().sequence;
    session.set_tempo(180);
    assert_eq!(session.snapshot().tempo, 180);
    session.flush().await;

    assert!(session.snapshot().is_playing);
    assert_eq!(rig.ledger.stops(), 0);
    assert_eq!(rig.ledger.tempos(), vec![120, 180]);
    assert_eq!(
        rig.scheduler.beat_period(),
        Some(Duration::from_secs_f64(60.0 / 180.0))
    );

    sleep(Duration::from_millis(100)).await;
    let frame = session.telemetry().borrow().clone();
    assert_eq!(frame.status, TelemetryStatus::Live);
    assert!(frame.sequence > sequence_before);
    assert_eq!(frame.sample.beat_phase, 0);
}

#[tokio::test(start_paused = true)]
async fn test_tempo_is_clamped() {
    let rig = default_rig();
    let session = PlaygroundSession::new(rig.scheduler.clone());

    session.set_tempo(500);
    assert_eq!(session.snapshot().tempo, 200);
    session.set_tempo(5);
    assert_eq!(session.snapshot().tempo, 60);
    session.flush().await;
    assert!(!session.snapshot().is_playing);
}

#[tokio::test(start_paused = true)]
async fn test_blank_text_plays_default_pattern() {
    let rig = default_rig();
    let session = PlaygroundSession::new(rig.scheduler.clone());

    session.set_pattern_text("   ");
    session.toggle_play();
    session.flush().await;

    assert!(session.snapshot().is_playing);
    assert_eq!(rig.ledger.compiled(), vec!["bd hh sn hh"]);
    assert_eq!(session.snapshot().pattern_text, "   ");
}

#[tokio::test(start_paused = true)]
async fn test_editing_text_does_not_restart_playback() {
    let rig = default_rig();
    let session = PlaygroundSession::new(rig.scheduler.clone());
    session.toggle_play();
    session.flush().await;

    session.set_pattern_text("cp cp");
    session.flush().await;

    assert_eq!(rig.ledger.starts(), 1);
    assert_eq!(session.snapshot().pattern_text, "cp cp");

    // the new text is used by the next start
    session.toggle_play();
    session.toggle_play();
    session.flush().await;
    assert_eq!(rig.ledger.compiled(), vec!["bd hh sn hh", "cp cp"]);
}

#[tokio::test(start_paused = true)]
async fn test_defaults_come_from_config() {
    let rig = default_rig();
    let session = PlaygroundSession::new(rig.scheduler.clone());
    let snapshot = session.snapshot();
    assert_eq!(snapshot.tempo, 120);
    assert_eq!(snapshot.pattern_text, "bd hh sn hh");
    assert!(!snapshot.is_playing);
    assert_eq!(snapshot.last_error, None);
}
