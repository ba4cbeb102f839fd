//! Fixed-window admission gate shared by concurrent callers.

use std::convert::Infallible;
use std::future::Future;
use std::num::NonZeroUsize;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::error::Cancelled;

/// Counter and window start, only ever touched together under one lock.
#[derive(Debug)]
struct GateState {
    /// Permits handed out in the current window and not yet released
    count: usize,
    /// When the current window began
    window_start: Instant,
    /// Bumped on every reset so permits know which window granted them
    window_id: u64,
}

/// Caps callers to `limit` permits per fixed window.
///
/// The window rolls over lazily: it is only reset by an `acquire` that finds
/// the gate full after the window has elapsed. A full window followed by an
/// immediate reset can therefore admit up to twice the limit across the
/// boundary.
///
/// Waiters are not served in arrival order. Every release wakes all of them
/// and whichever re-checks first wins, so a waiter can be overtaken
/// repeatedly under contention.
#[derive(Debug)]
pub struct RateGate {
    limit: usize,
    window: Duration,
    state: Mutex<GateState>,
    released: Notify,
}

impl RateGate {
    /// Create a gate admitting `limit` permits per `window`.
    ///
    /// The first window starts now.
    pub fn new(limit: NonZeroUsize, window: Duration) -> Self {
        Self {
            limit: limit.get(),
            window,
            state: Mutex::new(GateState {
                count: 0,
                window_start: Instant::now(),
                window_id: 0,
            }),
            released: Notify::new(),
        }
    }

    /// Wait for a permit.
    ///
    /// The wait can be abandoned by dropping the returned future (for example
    /// through `tokio::time::timeout`); an abandoned wait never takes a permit.
    pub async fn acquire(&self) -> Permit<'_> {
        match self.wait_for_permit(std::future::pending::<Infallible>()).await {
            Ok(permit) => permit,
            Err(never) => match never {},
        }
    }

    /// Wait for a permit, giving up as soon as `cancel` resolves.
    ///
    /// A permit that is immediately available is granted even if `cancel` has
    /// already resolved.
    pub async fn acquire_until<F>(&self, cancel: F) -> Result<Permit<'_>, Cancelled>
    where
        F: Future<Output = ()>,
    {
        self.wait_for_permit(cancel).await.map_err(|()| Cancelled)
    }

    /// Give one permit back and wake every waiter.
    ///
    /// Each call must balance exactly one successful acquisition whose
    /// [`Permit`] was forgotten. Unlike dropping a `Permit`, this cannot tell
    /// which window the permit came from, so it always counts against the
    /// current one and warns when that window has nothing outstanding.
    pub fn release(&self) {
        self.put_back(None);
    }

    fn put_back(&self, window_id: Option<u64>) {
        {
            let mut state = self.state.lock();
            match window_id {
                Some(id) if id != state.window_id => {
                    debug!(
                        count = state.count,
                        limit = self.limit,
                        "Permit from an earlier window returned, current window unaffected"
                    );
                }
                _ if state.count == 0 => {
                    warn!(limit = self.limit, "Release found no outstanding permits");
                }
                _ => {
                    state.count -= 1;
                    debug!(count = state.count, limit = self.limit, "Permit released");
                }
            }
        }
        self.released.notify_waiters();
    }

    /// Permits currently counted against the window.
    pub fn count(&self) -> usize {
        self.state.lock().count
    }

    /// Get the permit limit per window.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Get the window duration.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Permits an `acquire` could take right now without waiting.
    pub fn available(&self) -> usize {
        let state = self.state.lock();
        if state.count >= self.limit && state.window_start.elapsed() >= self.window {
            self.limit
        } else {
            self.limit.saturating_sub(state.count)
        }
    }

    /// Get the duration until the current window may be reset.
    pub fn duration_until_reset(&self) -> Duration {
        let state = self.state.lock();
        self.window.saturating_sub(state.window_start.elapsed())
    }

    async fn wait_for_permit<C>(&self, cancel: C) -> Result<Permit<'_>, C::Output>
    where
        C: Future,
    {
        tokio::pin!(cancel);

        loop {
            // Register before looking at the state so a release landing
            // between the check and the select is not lost.
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let wait = match self.try_admit() {
                Ok(window_id) => return Ok(Permit { gate: self, window_id }),
                Err(wait) => wait,
            };

            debug!(
                limit = self.limit,
                wait_ms = wait.as_millis() as u64,
                "Gate full, waiting for a release or the window to end"
            );

            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep(wait) => {}
                output = &mut cancel => {
                    debug!(limit = self.limit, "Permit wait cancelled");
                    return Err(output);
                }
            }
        }
    }

    /// Take a permit if one is free, resetting an elapsed window first.
    ///
    /// Returns the granting window, or how long the current window still
    /// runs when the gate is full.
    fn try_admit(&self) -> Result<u64, Duration> {
        let mut state = self.state.lock();
        let now = Instant::now();

        if state.count >= self.limit {
            let elapsed = now.saturating_duration_since(state.window_start);
            if elapsed < self.window {
                return Err(self.window - elapsed);
            }

            debug!(
                limit = self.limit,
                elapsed_ms = elapsed.as_millis() as u64,
                "Window elapsed, resetting gate"
            );
            state.count = 0;
            state.window_start = now;
            state.window_id += 1;
        }

        state.count += 1;
        trace!(count = state.count, limit = self.limit, "Permit granted");
        Ok(state.window_id)
    }
}

/// A granted permit; dropping it releases the permit back to its gate.
///
/// A permit outliving its window is not counted against the window that
/// replaced it, so dropping it then leaves the count untouched.
#[derive(Debug)]
#[must_use = "dropping a permit releases it immediately"]
pub struct Permit<'a> {
    gate: &'a RateGate,
    window_id: u64,
}

impl Permit<'_> {
    /// Keep the permit counted without tying it to this guard.
    ///
    /// The caller becomes responsible for calling [`RateGate::release`].
    pub fn forget(self) {
        std::mem::forget(self);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.gate.put_back(Some(self.window_id));
    }
}
