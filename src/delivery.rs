//! Rate-limited delivery of payloads to the remote collector.
//!
//! Items leave the queue in FIFO order through a single worker. With a rate
//! limit `R > 0` a [`Ticker`] fires every `floor(60000 / R)` ms and each tick
//! hands at most one item to the worker; with `R <= 0` the worker drains the
//! whole queue back to back. Before the first delivery (and after every
//! [`DeliveryQueue::reset_availability`]) the dispatcher is probed; a failed
//! probe drops the backlog and keeps the queue closed until the next reset.

use crate::dispatch::{DeliveryItem, Dispatcher};
use crate::schedule::Ticker;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, error};

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Snapshot returned by [`DeliveryQueue::status`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryStatus {
    /// Items waiting to be dispatched.
    pub pending: usize,
    /// `pending * interval`, or 0 when unlimited.
    pub estimated_ms: u64,
    /// Active limit in messages per minute, 0 meaning unlimited.
    pub rate_per_minute: u32,
    /// Items the collector accepted.
    pub dispatched: u64,
    /// Items whose dispatch failed and were dropped.
    pub failed: u64,
    /// Items dropped by the availability circuit breaker.
    pub dropped: u64,
}

/// Clamp a configured rate to its effective value: anything `<= 0` is
/// unlimited (0).
pub fn normalize_rate(rate_per_minute: i64) -> u32 {
    if rate_per_minute <= 0 {
        0
    } else {
        u32::try_from(rate_per_minute).unwrap_or(u32::MAX)
    }
}

/// Spacing between dispatches for a normalized rate, `None` when unlimited.
pub fn dispatch_interval(rate_per_minute: u32) -> Option<Duration> {
    if rate_per_minute == 0 {
        return None;
    }
    // Rates above 60000/min would round down to a zero period.
    let millis = (60_000 / u64::from(rate_per_minute)).max(1);
    Some(Duration::from_millis(millis))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Availability {
    Unknown,
    Available,
    Unavailable,
}

struct State {
    pending: VecDeque<DeliveryItem>,
    rate_per_minute: u32,
    interval: Option<Duration>,
    ticker: Ticker,
    in_flight: bool,
    availability: Availability,
    /// Bumped on every reset so a probe that straddles a reset is discarded.
    availability_epoch: u64,
    dispatched: u64,
    failed: u64,
    dropped: u64,
}

struct Inner {
    state: Mutex<State>,
    dispatcher: Arc<dyn Dispatcher>,
    runtime: Handle,
}

/// FIFO queue of [`DeliveryItem`]s drained to a [`Dispatcher`] under a
/// per-minute rate limit.
///
/// The queue is unbounded. Dropping it discards anything still pending; an
/// item already handed to the dispatcher runs to completion.
pub struct DeliveryQueue {
    inner: Arc<Inner>,
}

impl DeliveryQueue {
    /// Create an idle queue. `rate_per_minute <= 0` means unlimited.
    pub fn new(rate_per_minute: i64, dispatcher: Arc<dyn Dispatcher>, runtime: Handle) -> Self {
        let rate_per_minute = normalize_rate(rate_per_minute);
        let state = State {
            pending: VecDeque::new(),
            rate_per_minute,
            interval: dispatch_interval(rate_per_minute),
            ticker: Ticker::new(runtime.clone()),
            in_flight: false,
            availability: Availability::Unknown,
            availability_epoch: 0,
            dispatched: 0,
            failed: 0,
            dropped: 0,
        };
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                dispatcher,
                runtime,
            }),
        }
    }

    /// Append an item and make sure something is draining the queue.
    ///
    /// While the circuit breaker is open the item is dropped immediately.
    pub fn enqueue(&self, item: DeliveryItem) {
        let mut state = self.inner.state.lock();
        if state.availability == Availability::Unavailable {
            state.dropped += 1;
            debug!(
                delivery_target = %item.target,
                "collector marked unavailable, dropping log"
            );
            return;
        }
        state.pending.push_back(item);
        Inner::ensure_processing(&self.inner, &mut state);
    }

    /// Discard every pending item and stop ticking.
    pub fn clear(&self) {
        let mut state = self.inner.state.lock();
        state.pending.clear();
        state.ticker.stop();
    }

    pub fn status(&self) -> DeliveryStatus {
        let state = self.inner.state.lock();
        let estimated_ms = state
            .interval
            .map_or(0, |interval| interval.as_millis() as u64 * state.pending.len() as u64);
        DeliveryStatus {
            pending: state.pending.len(),
            estimated_ms,
            rate_per_minute: state.rate_per_minute,
            dispatched: state.dispatched,
            failed: state.failed,
            dropped: state.dropped,
        }
    }

    /// Switch to a new rate, restarting the schedule if items are pending.
    pub fn update_rate_limit(&self, rate_per_minute: i64) {
        let mut state = self.inner.state.lock();
        state.rate_per_minute = normalize_rate(rate_per_minute);
        state.interval = dispatch_interval(state.rate_per_minute);
        state.ticker.stop();
        Inner::ensure_processing(&self.inner, &mut state);
    }

    /// Forget the cached probe result; the next delivery probes again.
    pub fn reset_availability(&self) {
        let mut state = self.inner.state.lock();
        state.availability = Availability::Unknown;
        state.availability_epoch += 1;
        Inner::ensure_processing(&self.inner, &mut state);
    }

    /// Wait until nothing is pending and no dispatch is in flight.
    pub async fn drain(&self) {
        loop {
            let poll = {
                let state = self.inner.state.lock();
                if state.pending.is_empty() && !state.in_flight {
                    return;
                }
                state
                    .interval
                    .map_or(DRAIN_POLL_INTERVAL, |interval| interval.min(DRAIN_POLL_INTERVAL))
            };
            tokio::time::sleep(poll).await;
        }
    }
}

impl Drop for DeliveryQueue {
    fn drop(&mut self) {
        self.clear();
    }
}

impl Inner {
    fn ensure_processing(inner: &Arc<Inner>, state: &mut State) {
        if state.pending.is_empty() || state.availability == Availability::Unavailable {
            return;
        }
        match state.interval {
            None => {
                if !state.in_flight {
                    if let Some(item) = state.pending.pop_front() {
                        state.in_flight = true;
                        Inner::spawn_worker(inner, item);
                    }
                }
            }
            Some(period) => {
                if !state.ticker.is_running() {
                    let weak = Arc::downgrade(inner);
                    state.ticker.start(period, move || {
                        let Some(inner) = weak.upgrade() else {
                            return ControlFlow::Break(());
                        };
                        Inner::tick(&inner)
                    });
                }
            }
        }
    }

    fn tick(inner: &Arc<Inner>) -> ControlFlow<()> {
        let mut state = inner.state.lock();
        if state.in_flight {
            return ControlFlow::Continue(());
        }
        match state.pending.pop_front() {
            Some(item) => {
                state.in_flight = true;
                Inner::spawn_worker(inner, item);
                ControlFlow::Continue(())
            }
            None => {
                state.ticker.detach();
                ControlFlow::Break(())
            }
        }
    }

    fn spawn_worker(inner: &Arc<Inner>, item: DeliveryItem) {
        let worker = Arc::clone(inner);
        inner.runtime.spawn(async move { worker.run_worker(item).await });
    }

    /// Deliver `item`, then keep draining while the queue is unlimited.
    async fn run_worker(self: Arc<Self>, mut item: DeliveryItem) {
        loop {
            self.deliver(item).await;

            let next = {
                let mut state = self.state.lock();
                let next = if state.interval.is_none()
                    && state.availability != Availability::Unavailable
                {
                    state.pending.pop_front()
                } else {
                    None
                };
                if next.is_none() {
                    state.in_flight = false;
                }
                next
            };

            match next {
                Some(next) => item = next,
                None => break,
            }
        }
    }

    async fn deliver(&self, item: DeliveryItem) {
        if !self.check_availability().await {
            self.state.lock().dropped += 1;
            return;
        }

        match self.dispatcher.send(&item).await {
            Ok(()) => self.state.lock().dispatched += 1,
            Err(e) => {
                self.state.lock().failed += 1;
                error!(
                    delivery_target = %item.target,
                    error = %e,
                    "failed to deliver log to collector"
                );
            }
        }
    }

    /// Resolve the cached availability, probing when it is unknown.
    async fn check_availability(&self) -> bool {
        loop {
            let epoch = {
                let state = self.state.lock();
                match state.availability {
                    Availability::Available => return true,
                    Availability::Unavailable => return false,
                    Availability::Unknown => state.availability_epoch,
                }
            };

            let available = self.dispatcher.probe().await;

            let mut state = self.state.lock();
            if state.availability_epoch != epoch {
                continue;
            }
            if available {
                state.availability = Availability::Available;
                return true;
            }

            state.availability = Availability::Unavailable;
            let dropped = state.pending.len();
            state.pending.clear();
            state.dropped += dropped as u64;
            state.ticker.stop();
            error!(
                dropped = dropped + 1,
                "collector unavailable, log delivery stopped until availability is reset"
            );
            return false;
        }
    }
}
