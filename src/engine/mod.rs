mod diff;
mod error;
mod ledger;
mod mutations;
mod queries;
mod store;

pub use diff::{OccupancyDiff, diff_occupancy, diff_state_change, normalize_label};
pub use error::{EngineError, ErrorKind};
pub use ledger::LedgerDelta;
pub use store::{DayState, SharedDay, SharedSlot};

use std::io;
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tokio::sync::{OwnedMutexGuard, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock, mpsc, oneshot};
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::limits::{DEFAULT_LOCK_TIMEOUT_MS, WAL_CHANNEL_CAPACITY};
use crate::model::*;
use crate::notify::NotifyHub;
use crate::observability::{DAYS_ACTIVE, LOCK_TIMEOUTS_TOTAL, WAL_FLUSH_BATCH_SIZE, WAL_FLUSH_DURATION_SECONDS};
use crate::roster::{Roster, RosterError};
use crate::wal::Wal;

use store::{Store, apply_to_slot};

// ── Group-commit WAL channel ─────────────────────────────

type AppendResponse = oneshot::Sender<io::Result<()>>;

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: AppendResponse,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Drain every Append already queued behind it.
/// 3. One flush_sync for the whole batch, then answer every sender.
/// A non-append command seen while draining closes the batch first.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let WalCommand::Append { event, response } = cmd else {
            handle_non_append(&mut wal, cmd);
            continue;
        };
        let mut batch = vec![(event, response)];
        let mut pending = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    pending = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }
        commit_batch(&mut wal, batch);
        if let Some(other) = pending {
            handle_non_append(&mut wal, other);
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: Vec<(Event, AppendResponse)>) {
    metrics::histogram!(WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, &batch);
    metrics::histogram!(WAL_FLUSH_DURATION_SECONDS).record(flush_start.elapsed().as_secs_f64());
    respond_batch(batch, &result);
}

/// Write and fsync a whole batch, or none of it. On error the batch is
/// rolled back, so no record of it comes back on replay.
fn flush_batch(wal: &mut Wal, batch: &[(Event, AppendResponse)]) -> io::Result<()> {
    let result = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event))
        .and_then(|()| wal.flush_sync());
    if let Err(e) = &result {
        match wal.rollback() {
            Ok(()) => warn!(error = %e, events = batch.len(), "journal write failed, batch rolled back"),
            Err(rollback_err) => error!(
                error = %e,
                rollback_error = %rollback_err,
                "journal rollback failed, refusing further appends"
            ),
        }
    }
    result
}

fn respond_batch(batch: Vec<(Event, AppendResponse)>, result: &io::Result<()>) {
    for (_, tx) in batch {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events).and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => commit_batch(wal, vec![(event, response)]),
    }
}

// ── Engine ───────────────────────────────────────────────

fn lock_timed_out(date: NaiveDate, room: RoomId) -> EngineError {
    metrics::counter!(LOCK_TIMEOUTS_TOTAL).increment(1);
    warn!(%date, %room, "slot lock wait timed out");
    EngineError::LockTimeout { date, room }
}

pub struct Engine {
    store: Store,
    roster: Arc<dyn Roster>,
    wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    /// Shared by every slot transition, exclusive for reset and compaction.
    gate: Arc<RwLock<()>>,
    lock_timeout: Duration,
}

/// Exclusive hold on one slot for the duration of a transition.
pub(crate) struct SlotLease {
    slot: OwnedMutexGuard<Slot>,
    _gate: OwnedRwLockReadGuard<()>,
}

impl Deref for SlotLease {
    type Target = Slot;

    fn deref(&self) -> &Slot {
        &self.slot
    }
}

impl DerefMut for SlotLease {
    fn deref_mut(&mut self) -> &mut Slot {
        &mut self.slot
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf, roster: Arc<dyn Roster>, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(WAL_CHANNEL_CAPACITY);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let store = Store::from_events(&events);
        metrics::gauge!(DAYS_ACTIVE).set(store.day_count() as f64);
        info!(
            events = events.len(),
            days = store.day_count(),
            "journal replayed from {}",
            wal_path.display()
        );

        Ok(Self {
            store,
            roster,
            wal_tx,
            notify,
            gate: Arc::new(RwLock::new(())),
            lock_timeout: Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS),
        })
    }

    /// Upper bound on waiting for a slot, the engine gate or the roster.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// WAL-append, apply to the leased slot and the ledger, notify.
    pub(super) async fn persist_and_apply(&self, slot: &mut Slot, event: &Event) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_slot(slot, event);
        self.store.apply_ledger(event);
        if let Some(date) = event.date() {
            self.notify.send(date, event);
        }
        Ok(())
    }

    /// Same as `persist_and_apply` for events that touch only counters.
    pub(super) async fn persist_ledger(&self, event: &Event) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.store.apply_ledger(event);
        Ok(())
    }

    /// Lease a slot, creating the day schedule when it doesn't exist yet.
    pub(super) async fn lease_slot(&self, date: NaiveDate, room: RoomId) -> Result<SlotLease, EngineError> {
        self.lease(date, room, true).await
    }

    /// Lease a slot of an existing day.
    pub(super) async fn lease_existing_slot(&self, date: NaiveDate, room: RoomId) -> Result<SlotLease, EngineError> {
        self.lease(date, room, false).await
    }

    async fn lease(&self, date: NaiveDate, room: RoomId, create: bool) -> Result<SlotLease, EngineError> {
        let deadline = Instant::now() + self.lock_timeout;
        let gate = tokio::time::timeout_at(deadline, self.gate.clone().read_owned())
            .await
            .map_err(|_| lock_timed_out(date, room))?;
        let day = match self.store.day(&date) {
            Some(day) => day,
            None if create => self.create_day(date).await?,
            None => return Err(EngineError::DayNotFound(date)),
        };
        let slot = tokio::time::timeout_at(deadline, day.slot(room).lock_owned())
            .await
            .map_err(|_| lock_timed_out(date, room))?;
        Ok(SlotLease { slot, _gate: gate })
    }

    /// Copy of one slot, or None when the day doesn't exist.
    pub(super) async fn read_slot(&self, date: NaiveDate, room: RoomId) -> Result<Option<Slot>, EngineError> {
        let Some(day) = self.store.day(&date) else {
            return Ok(None);
        };
        let slot = day.slot(room);
        let guard = tokio::time::timeout(self.lock_timeout, slot.lock())
            .await
            .map_err(|_| lock_timed_out(date, room))?;
        Ok(Some(guard.clone()))
    }

    pub(super) async fn read_day(&self, day: &DayState) -> Result<DaySchedule, EngineError> {
        day.snapshot_until(Instant::now() + self.lock_timeout)
            .await
            .map_err(|room| lock_timed_out(day.date, room))
    }

    /// Await a roster call for at most the lock timeout. Transitions make
    /// these calls while holding a slot.
    pub(super) async fn ask_roster<T>(
        &self,
        call: impl Future<Output = Result<T, RosterError>>,
    ) -> Result<T, EngineError> {
        match tokio::time::timeout(self.lock_timeout, call).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                warn!(timeout = ?self.lock_timeout, "roster call timed out");
                Err(EngineError::Roster(RosterError(format!(
                    "no answer within {:?}",
                    self.lock_timeout
                ))))
            }
        }
    }

    /// Caller holds the gate shared.
    async fn create_day(&self, date: NaiveDate) -> Result<SharedDay, EngineError> {
        if let Some(day) = self.store.day(&date) {
            return Ok(day);
        }
        let event = Event::DayCreated { date };
        self.wal_append(&event).await?;
        let day = self.store.get_or_insert_day(date);
        metrics::gauge!(DAYS_ACTIVE).set(self.store.day_count() as f64);
        self.notify.send(date, &event);
        Ok(day)
    }

    pub(super) async fn shared_gate(&self) -> Result<OwnedRwLockReadGuard<()>, EngineError> {
        tokio::time::timeout(self.lock_timeout, self.gate.clone().read_owned())
            .await
            .map_err(|_| EngineError::Busy)
    }

    pub(super) async fn exclusive_gate(&self) -> Result<OwnedRwLockWriteGuard<()>, EngineError> {
        tokio::time::timeout(self.lock_timeout, self.gate.clone().write_owned())
            .await
            .map_err(|_| EngineError::Busy)
    }
}
