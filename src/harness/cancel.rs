//! Run cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::warn;

/// Shared cancellation flag; clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// A token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the run. In-flight executions are killed at their next poll.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether the run was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Cancel from a background thread once `deadline` has elapsed.
    ///
    /// The watchdog exits early when `done` is cancelled, so a finished run
    /// does not leave it sleeping.
    pub fn cancel_after(&self, deadline: Duration, done: CancelToken) -> thread::JoinHandle<()> {
        let token = self.clone();
        thread::spawn(move || {
            let started = Instant::now();
            while started.elapsed() < deadline {
                if done.is_cancelled() || token.is_cancelled() {
                    return;
                }
                thread::sleep(Duration::from_millis(50).min(deadline));
            }
            warn!(deadline_secs = deadline.as_secs_f64(), "deadline reached, cancelling run");
            token.cancel();
        })
    }
}
