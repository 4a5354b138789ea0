//! Lifecycle guard transitions, driven with tokio's paused clock.

extern crate cseval;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use cseval::guard::{GuardConfig, GuardState, LifecycleGuard, Terminate};

#[derive(Default)]
struct Recorder {
    reasons: Mutex<Vec<String>>,
}

impl Recorder {
    fn count(&self) -> usize {
        self.reasons.lock().unwrap().len()
    }

    fn last(&self) -> Option<String> {
        self.reasons.lock().unwrap().last().cloned()
    }
}

impl Terminate for Recorder {
    fn terminate(&self, reason: &str) {
        self.reasons.lock().unwrap().push(reason.to_string());
    }
}

fn guard() -> (LifecycleGuard, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let config = GuardConfig {
        request_timeout: Duration::from_secs(30),
        drain_grace: Duration::from_secs(5),
    };
    (LifecycleGuard::new(config, recorder.clone()), recorder)
}

async fn advance(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

#[tokio::test(start_paused = true)]
async fn test_starts_idle() {
    let (guard, recorder) = guard();
    assert_eq!(guard.state(), GuardState::Idle);
    advance(120).await;
    assert_eq!(recorder.count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_request_timeout_terminates() {
    let (guard, recorder) = guard();
    guard.arm();
    assert_eq!(guard.state(), GuardState::Armed);
    advance(29).await;
    assert_eq!(recorder.count(), 0);
    advance(2).await;
    assert_eq!(recorder.count(), 1);
    assert_eq!(recorder.last().as_deref(), Some("request timed out"));
    assert_eq!(guard.state(), GuardState::Terminated);
}

#[tokio::test(start_paused = true)]
async fn test_completion_switches_to_drain() {
    let (guard, recorder) = guard();
    guard.arm();
    advance(10).await;
    guard.response_completed();
    assert_eq!(guard.state(), GuardState::Draining);
    advance(4).await;
    assert_eq!(recorder.count(), 0);
    advance(2).await;
    assert_eq!(recorder.count(), 1);
    assert_eq!(recorder.last().as_deref(), Some("drain period elapsed"));
}

#[tokio::test(start_paused = true)]
async fn test_rearm_replaces_schedule() {
    let (guard, recorder) = guard();
    guard.arm();
    advance(20).await;
    guard.arm();
    advance(20).await;
    assert_eq!(recorder.count(), 0);
    advance(11).await;
    assert_eq!(recorder.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_arm_does_not_cancel_draining() {
    let (guard, recorder) = guard();
    guard.arm();
    guard.response_completed();
    guard.arm();
    assert_eq!(guard.state(), GuardState::Draining);
    advance(6).await;
    assert_eq!(recorder.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_terminates_only_once() {
    let (guard, recorder) = guard();
    guard.arm();
    advance(31).await;
    guard.arm();
    guard.response_completed();
    advance(60).await;
    assert_eq!(recorder.count(), 1);
    assert_eq!(guard.state(), GuardState::Terminated);
}
