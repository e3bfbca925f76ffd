//! Long-polling update loop.
//!
//! The loop owns the offset cursor. Each fetched update advances the
//! offset and is handed to its own dispatch task, which waits for a limiter
//! permit before running handlers, so slow handlers never hold up the next
//! fetch. Failed fetches back off exponentially. The whole run holds the
//! single-instance lock. Dispatch tasks outlive the loop; callers drain them
//! with [`Poller::wait_idle`].

use crate::guard::InstanceGuard;
use crate::limiter::ConcurrencyLimiter;
use crate::registry::HandlerRegistry;
use courier_core::{
    config::{shellexpand, PollerConfig},
    error::CourierError,
    traits::Transport,
    update::Update,
};
use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};


/// Server-side wait for the priming fetch that discards queued updates.
const DISCARD_TIMEOUT_SECS: u64 = 1;

/// Backoff stops doubling after this many consecutive failures.
const MAX_BACKOFF_EXPONENT: u32 = 6;

/// Lifecycle of a [`Poller`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PollerState {
    Idle = 0,
    Running = 1,
    /// Stop requested; the current cycle is finishing.
    Stopping = 2,
    Stopped = 3,
}

impl PollerState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Idle,
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// Delay before the next fetch after `failures` consecutive failures:
/// `base * 2^(failures - 1)`, doubling at most six times, capped at `max`.
pub fn backoff_delay(base_secs: u64, max_secs: u64, failures: u32) -> Duration {
    let exp = failures.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
    Duration::from_secs(base_secs.saturating_mul(1u64 << exp).min(max_secs))
}

/// State shared between the loop and its stop handles.
struct Shared {
    state: AtomicU8,
    /// Wakes a loop sleeping in backoff when a stop is requested.
    wake: Notify,
    /// Mirror of the loop's offset, for observation only.
    offset: AtomicI64,
}

impl Shared {
    fn state(&self) -> PollerState {
        PollerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: PollerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn transition(&self, from: PollerState, to: PollerState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn request_stop(&self) -> bool {
        if self.transition(PollerState::Running, PollerState::Stopping) {
            info!("poller stop requested");
            self.wake.notify_waiters();
            true
        } else {
            false
        }
    }
}

/// Cloneable handle that can stop a running poller from another task or a
/// signal handler.
#[derive(Clone)]
pub struct StopHandle {
    shared: Arc<Shared>,
}

impl StopHandle {
    /// Request a cooperative stop. Returns `false` if the poller was not
    /// running.
    pub fn stop(&self) -> bool {
        self.shared.request_stop()
    }

    pub fn is_running(&self) -> bool {
        self.shared.state() == PollerState::Running
    }
}

/// Marks the poller stopped however `start` exits, including when its
/// future is dropped mid-run.
struct StoppedOnDrop<'a>(&'a Shared);

impl Drop for StoppedOnDrop<'_> {
    fn drop(&mut self) {
        self.0.set_state(PollerState::Stopped);
    }
}

/// Long-polling update loop with bounded concurrent dispatch.
pub struct Poller {
    transport: Arc<dyn Transport>,
    config: PollerConfig,
    handlers: Arc<HandlerRegistry>,
    limiter: ConcurrencyLimiter,
    /// Dispatch tasks spawned and not yet finished.
    tasks: TaskTracker,
    shared: Arc<Shared>,
}

impl Poller {
    pub fn new(
        transport: Arc<dyn Transport>,
        config: PollerConfig,
        handlers: HandlerRegistry,
    ) -> Self {
        let limiter = ConcurrencyLimiter::new(config.max_concurrency);
        Self {
            transport,
            config,
            handlers: Arc::new(handlers),
            limiter,
            tasks: TaskTracker::new(),
            shared: Arc::new(Shared {
                state: AtomicU8::new(PollerState::Idle as u8),
                wake: Notify::new(),
                offset: AtomicI64::new(0),
            }),
        }
    }

    /// Run the poller until [`stop`](Self::stop) is called.
    ///
    /// Fails with `AlreadyRunning` if this poller is already running or
    /// another process holds the lock file, and with `LockUnavailable` if
    /// the lock file cannot be used. Every other failure is handled inside
    /// the loop.
    pub async fn start(&self, discard_old_updates: bool) -> Result<(), CourierError> {
        let started = [PollerState::Idle, PollerState::Stopped]
            .into_iter()
            .any(|from| self.shared.transition(from, PollerState::Running));
        if !started {
            return Err(CourierError::AlreadyRunning { pid: None });
        }
        let _stopped = StoppedOnDrop(&self.shared);

        let _guard = InstanceGuard::acquire(shellexpand(&self.config.lock_path))?;

        info!(
            "poller started | timeout: {}s | backoff: {}s..{}s | concurrency: {}",
            self.config.poll_timeout_secs,
            self.config.backoff_base_secs,
            self.config.max_backoff_secs,
            self.config
                .max_concurrency
                .map_or_else(|| "unbounded".to_string(), |n| n.to_string()),
        );

        let mut offset = self.offset();
        if discard_old_updates {
            offset = self.discard_pending(offset).await;
        }

        let offset = self.run_loop(offset).await;

        info!(
            "poller stopped at offset {offset} ({} handler task(s) still running)",
            self.in_flight()
        );
        Ok(())
    }

    /// Request a cooperative stop: the in-flight fetch and its dispatch
    /// finish, no further fetch is issued. Running handlers are left alone;
    /// await [`wait_idle`](Self::wait_idle) to let them complete.
    pub fn stop(&self) -> bool {
        self.shared.request_stop()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == PollerState::Running
    }

    pub fn state(&self) -> PollerState {
        self.shared.state()
    }

    /// Next `update_id` to request.
    pub fn offset(&self) -> i64 {
        self.shared.offset.load(Ordering::Acquire)
    }

    /// Dispatch tasks spawned and not yet finished, including those waiting
    /// for a permit.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Wait until every dispatch task spawned so far has finished. Tasks
    /// spawned while waiting are waited for too. Meant to be called once
    /// `start` has returned, from a single caller at a time.
    pub async fn wait_idle(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }

    async fn run_loop(&self, mut offset: i64) -> i64 {
        let mut failures: u32 = 0;

        while self.shared.state() == PollerState::Running {
            match self
                .transport
                .fetch_updates(offset, self.config.poll_timeout_secs)
                .await
            {
                Ok(updates) => {
                    failures = 0;
                    offset = self.schedule_batch(offset, updates);
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    let delay = backoff_delay(
                        self.config.backoff_base_secs,
                        self.config.max_backoff_secs,
                        failures,
                    );
                    error!(
                        "poll error (failure {failures}, retry in {}s): {e}",
                        delay.as_secs()
                    );
                    self.backoff(delay).await;
                }
            }
        }

        offset
    }

    /// Advance the offset over a batch and spawn one dispatch task per
    /// update, in ascending `update_id` order.
    fn schedule_batch(&self, mut offset: i64, mut updates: Vec<Update>) -> i64 {
        updates.sort_by_key(|u| u.update_id);

        for update in updates {
            if update.update_id < offset {
                warn!("skipping update {} below offset {offset}", update.update_id);
                continue;
            }
            offset = update.update_id.saturating_add(1);
            self.shared.offset.store(offset, Ordering::Release);
            self.spawn_dispatch(update);
        }

        offset
    }

    fn spawn_dispatch(&self, update: Update) {
        if self.handlers.is_empty() {
            debug!(
                "no handlers registered, dropping update {}",
                update.update_id
            );
            return;
        }

        let handlers = Arc::clone(&self.handlers);
        let limiter = self.limiter.clone();

        self.tasks.spawn(async move {
            let permit = limiter.acquire().await;
            let outcome = handlers.dispatch(Arc::new(update)).await;
            if outcome.failed > 0 {
                let (failed, invoked, kind) = (outcome.failed, outcome.invoked, outcome.kind);
                debug!("{failed}/{invoked} handler(s) failed for a {kind} update");
            }
            permit.release();
        });
    }

    /// Priming fetch: skip everything already queued on the server.
    async fn discard_pending(&self, offset: i64) -> i64 {
        match self
            .transport
            .fetch_updates(offset, DISCARD_TIMEOUT_SECS)
            .await
        {
            Ok(updates) => match updates.iter().map(|u| u.update_id).max() {
                Some(last) if last >= offset => {
                    let next = last.saturating_add(1);
                    info!(
                        "discarded {} pending update(s), starting at offset {next}",
                        updates.len()
                    );
                    self.shared.offset.store(next, Ordering::Release);
                    next
                }
                _ => offset,
            },
            Err(e) => {
                warn!("discard old updates failed: {e}");
                offset
            }
        }
    }

    /// Sleep before the next fetch; a stop request cuts the wait short.
    async fn backoff(&self, delay: Duration) {
        let notified = self.shared.wake.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if self.shared.state() != PollerState::Running {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = &mut notified => debug!("backoff interrupted by stop"),
        }
    }
}
