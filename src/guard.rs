//! Process lifecycle guard.
//!
//! A runaway script cannot be interrupted from the outside, so in
//! production every `/eval` request arms a watchdog. If the request does
//! not finish within the timeout, or the response does not drain within the
//! grace period, the process is terminated and the supervisor restarts it.
//!
//! There is a single timer per process. Each transition replaces the
//! pending schedule, so the most recent transition always wins.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Ends the process when the guard's timer fires.
pub trait Terminate: Send + Sync + 'static {
    fn terminate(&self, reason: &str);
}

/// Production terminator: logs and exits unconditionally.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessExit;

impl Terminate for ProcessExit {
    fn terminate(&self, reason: &str) {
        log::error!("Terminating process: {}", reason);
        std::process::exit(1);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Idle,
    Armed,
    Draining,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardConfig {
    pub request_timeout: Duration,
    pub drain_grace: Duration,
}

impl Default for GuardConfig {
    fn default() -> Self {
        GuardConfig {
            request_timeout: Duration::from_secs(30),
            drain_grace: Duration::from_secs(5),
        }
    }
}

/// Whether requests to `path` are watched.
pub fn guards_path(path: &str) -> bool {
    path.eq_ignore_ascii_case("/eval")
}

struct Inner {
    state: GuardState,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

#[derive(Clone)]
pub struct LifecycleGuard {
    config: GuardConfig,
    inner: Arc<Mutex<Inner>>,
    terminator: Arc<dyn Terminate>,
}

impl LifecycleGuard {
    pub fn new(config: GuardConfig, terminator: Arc<dyn Terminate>) -> Self {
        LifecycleGuard {
            config,
            inner: Arc::new(Mutex::new(Inner {
                state: GuardState::Idle,
                generation: 0,
                timer: None,
            })),
            terminator,
        }
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    pub fn state(&self) -> GuardState {
        self.lock().state
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // a poisoned lock still holds a consistent state
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// A guarded request started.
    pub fn arm(&self) {
        let mut inner = self.lock();
        match inner.state {
            GuardState::Idle | GuardState::Armed => {
                log::info!("Lifecycle guard armed for {:?}", self.config.request_timeout);
                inner.state = GuardState::Armed;
                self.schedule(&mut inner, self.config.request_timeout, "request timed out");
            }
            GuardState::Draining => log::debug!("Lifecycle guard is draining, arm ignored"),
            GuardState::Terminated => {}
        }
    }

    /// The guarded response finished streaming or was dropped.
    pub fn response_completed(&self) {
        let mut inner = self.lock();
        match inner.state {
            GuardState::Armed | GuardState::Draining => {
                log::info!("Response completed, draining for {:?}", self.config.drain_grace);
                inner.state = GuardState::Draining;
                self.schedule(&mut inner, self.config.drain_grace, "drain period elapsed");
            }
            GuardState::Idle | GuardState::Terminated => {}
        }
    }

    fn schedule(&self, inner: &mut Inner, delay: Duration, reason: &'static str) {
        if let Some(timer) = inner.timer.take() {
            timer.abort();
        }
        inner.generation += 1;
        let generation = inner.generation;
        let Ok(handle) = Handle::try_current() else {
            log::warn!("No runtime available, lifecycle timer not scheduled");
            return;
        };
        let shared = Arc::clone(&self.inner);
        let terminator = Arc::clone(&self.terminator);
        inner.timer = Some(handle.spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut inner = shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                if inner.generation != generation {
                    return;
                }
                inner.state = GuardState::Terminated;
                inner.timer = None;
            }
            log::warn!("Lifecycle guard fired: {}", reason);
            terminator.terminate(reason);
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting(AtomicUsize);

    impl Terminate for Counting {
        fn terminate(&self, _reason: &str) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn only_eval_is_guarded() {
        assert!(guards_path("/eval"));
        assert!(guards_path("/EVAL"));
        assert!(!guards_path("/il"));
        assert!(!guards_path("/eval/x"));
    }

    #[tokio::test(start_paused = true)]
    async fn completion_while_idle_is_ignored() {
        let counter = Arc::new(Counting::default());
        let guard = LifecycleGuard::new(GuardConfig::default(), counter.clone());
        guard.response_completed();
        assert_eq!(guard.state(), GuardState::Idle);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 0);
    }
}
