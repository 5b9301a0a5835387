use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, trace, warn};

use crate::engine::{Engine, FlagGuard};
use crate::envelope::{Cursor, decode};
use crate::merge::{MergeReport, merge};
use crate::remote::Remote;
use crate::replica::Replica;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scheduler bookkeeping
#[derive(Default)]
pub(crate) struct PollState {
    active: AtomicBool,
    loading: AtomicBool,
    in_flight: AtomicBool,
    loaded: AtomicBool,

    /// Bumped on every start and stop so in-flight results from an
    /// earlier session can be recognized
    epoch: AtomicU64,

    cursor: Mutex<Option<Cursor>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for PollState {
    fn drop(&mut self) {
        if let Some(timer) = lock(&self.timer).take() {
            timer.abort();
        }
    }
}

/// Result of a single poll cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The envelope was merged into the replica
    Merged(MergeReport),
    /// Polling is not active, the bulk load of the current session has not
    /// completed or another cycle is in progress
    Skipped,
    /// Polling stopped or restarted while the request was in flight
    Discarded,
    /// The request failed or the envelope was rejected
    Failed,
}

impl<R: Remote> Engine<R> {
    pub fn is_polling(&self) -> bool {
        self.inner.poll.active.load(Ordering::Acquire)
    }

    pub fn is_loading(&self) -> bool {
        self.inner.poll.loading.load(Ordering::Acquire)
    }

    /// The cursor the next poll cycle will use
    pub fn cursor(&self) -> Option<Cursor> {
        *lock(&self.inner.poll.cursor)
    }

    /// Replace the replica with the full device list from the remote.
    ///
    /// Returns `false` without fetching if a bulk load is already in
    /// progress, and `false` if the fetch fails or its result became stale.
    #[instrument(skip_all)]
    pub async fn load_devices(&self) -> bool {
        let poll = &self.inner.poll;
        let Some(_guard) = FlagGuard::acquire(&poll.loading) else {
            debug!("bulk load already in progress");
            return false;
        };

        let epoch = poll.epoch.load(Ordering::Acquire);

        // taken before the fetch so changes made while it is in flight
        // are picked up by the next poll
        let cursor = Cursor::now();

        let docs = match self.inner.remote.fetch_all_devices().await {
            Ok(docs) => docs,
            Err(e) => {
                warn!("failed to load devices: {e}");
                return false;
            }
        };

        if poll.epoch.load(Ordering::Acquire) != epoch {
            debug!("polling restarted during bulk load, discarding result");
            return false;
        }

        let mut total = 0;
        self.inner.replica.send_modify(|replica| {
            *replica = Replica::from_documents(docs, replica);
            total = replica.len();
        });
        *lock(&poll.cursor) = Some(cursor);
        poll.loaded.store(true, Ordering::Release);

        info!(devices = total, %cursor, "devices loaded");
        true
    }

    /// Start polling the remote for changes.
    ///
    /// Loads the full device list, runs a poll cycle and then keeps polling
    /// at the configured interval until [`stop_polling`](Self::stop_polling)
    /// is called. If polling is already active this only runs a poll cycle.
    #[instrument(skip_all)]
    pub async fn start_polling(&self) {
        let poll = &self.inner.poll;
        if poll.active.swap(true, Ordering::AcqRel) {
            debug!("polling already active");
            self.poll_once().await;
            return;
        }
        // every session starts from a fresh bulk load
        poll.loaded.store(false, Ordering::Release);
        poll.epoch.fetch_add(1, Ordering::AcqRel);
        info!(interval = ?self.inner.config.poll_interval, "polling started");

        self.load_devices().await;
        self.poll_once().await;

        if !poll.active.load(Ordering::Acquire) {
            debug!("polling stopped before the timer was armed");
            return;
        }
        self.arm_timer();
    }

    fn arm_timer(&self) {
        let period = self.inner.config.poll_interval;
        let weak = Arc::downgrade(&self.inner);

        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                Engine { inner }.tick().await;
            }
        });

        if let Some(previous) = lock(&self.inner.poll.timer).replace(handle) {
            previous.abort();
        }
    }

    async fn tick(&self) {
        // retry the bulk load until it succeeds once per session
        if self.inner.poll.loaded.load(Ordering::Acquire) {
            self.poll_once().await;
        } else {
            self.load_devices().await;
        }
    }

    /// Stop polling. Calling it while polling is not active does nothing.
    ///
    /// Requests in flight are not cancelled but their results are dropped.
    pub fn stop_polling(&self) {
        let poll = &self.inner.poll;
        let was_active = poll.active.swap(false, Ordering::AcqRel);
        if let Some(timer) = lock(&poll.timer).take() {
            timer.abort();
        }
        if was_active {
            poll.epoch.fetch_add(1, Ordering::AcqRel);
            info!("polling stopped");
        }
    }

    /// Run a poll cycle in the background
    pub fn trigger_poll(&self) {
        let engine = self.clone();
        tokio::spawn(async move {
            engine.poll_once().await;
        });
    }

    /// Fetch the changes since the current cursor and merge them into the
    /// replica.
    ///
    /// Failures are logged and left for the next cycle to recover from.
    #[instrument(skip_all)]
    pub async fn poll_once(&self) -> PollOutcome {
        let poll = &self.inner.poll;
        if !poll.active.load(Ordering::Acquire) {
            trace!("polling not active");
            return PollOutcome::Skipped;
        }

        let Some(_guard) = FlagGuard::acquire(&poll.in_flight) else {
            debug!("poll already in progress");
            return PollOutcome::Skipped;
        };

        let cursor = *lock(&poll.cursor);
        let Some(cursor) = cursor.filter(|_| poll.loaded.load(Ordering::Acquire)) else {
            debug!("devices not loaded yet, waiting for the bulk load");
            return PollOutcome::Skipped;
        };

        let epoch = poll.epoch.load(Ordering::Acquire);
        let raw = match self.inner.remote.fetch_updates(&cursor).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("failed to fetch updates: {e}");
                return PollOutcome::Failed;
            }
        };

        if !poll.active.load(Ordering::Acquire) || poll.epoch.load(Ordering::Acquire) != epoch {
            debug!("polling stopped, discarding updates");
            return PollOutcome::Discarded;
        }

        let envelope = match decode(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("rejecting update envelope: {e}");
                return PollOutcome::Failed;
            }
        };

        let last_update = envelope.last_update;
        let mut report = MergeReport::default();
        self.inner.replica.send_if_modified(|replica| {
            report = merge(replica, envelope);
            report.changed()
        });
        self.advance_cursor(last_update);

        if report.changed() {
            debug!(
                updated = report.updated,
                icons = report.icons,
                ignored = report.ignored,
                "replica updated"
            );
        }
        PollOutcome::Merged(report)
    }

    /// Move the cursor forward, never backwards
    fn advance_cursor(&self, next: Cursor) {
        let mut cursor = lock(&self.inner.poll.cursor);
        match *cursor {
            Some(current) if next < current => {
                warn!(%current, %next, "remote cursor went backwards, keeping the current one");
            }
            _ => *cursor = Some(next),
        }
    }
}
