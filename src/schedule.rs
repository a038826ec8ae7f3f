//! Periodic tick capability shared by both queues.
//!
//! Ticks are driven by `tokio::time`, so tests can run queues on a paused
//! clock and advance virtual time instead of sleeping.

use std::ops::ControlFlow;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Start/stop handle for a periodic callback.
///
/// The first tick fires one `period` after [`Ticker::start`]. Late ticks are
/// delayed rather than bursted, so two ticks are never closer than `period`.
/// The callback is synchronous; returning [`ControlFlow::Break`] ends the
/// schedule. Anything a tick spawns keeps running after [`Ticker::stop`].
pub struct Ticker {
    runtime: Handle,
    task: Option<JoinHandle<()>>,
}

impl Ticker {
    pub fn new(runtime: Handle) -> Self {
        Self { runtime, task: None }
    }

    /// Start ticking every `period`, replacing any running schedule.
    pub fn start<F>(&mut self, period: Duration, mut tick: F)
    where
        F: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        self.stop();
        let task = self.runtime.spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if tick().is_break() {
                    break;
                }
            }
        });
        self.task = Some(task);
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Forget the running schedule without aborting it; used by a tick that
    /// is about to return [`ControlFlow::Break`] itself.
    pub fn detach(&mut self) {
        self.task = None;
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn ticks_after_each_period_until_break() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut ticker = Ticker::new(Handle::current());

        let seen = Arc::clone(&count);
        ticker.start(Duration::from_millis(100), move || {
            if seen.fetch_add(1, Ordering::SeqCst) + 1 == 3 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert!(!ticker.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_pending_ticks() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut ticker = Ticker::new(Handle::current());

        let seen = Arc::clone(&count);
        ticker.start(Duration::from_millis(100), move || {
            seen.fetch_add(1, Ordering::SeqCst);
            ControlFlow::Continue(())
        });
        assert!(ticker.is_running());

        ticker.stop();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(!ticker.is_running());
    }
}
