//! Persistent Memory Manager.
//!
//! Owns the in-memory [`MemoryAggregate`] for the connected identity and keeps
//! it committed to the blob store. Mutations apply synchronously; a background
//! worker turns them into commits following the [`CommitScheduler`].
//!
//! Lifecycle: `Unloaded → Loading → Ready`. While `Ready`, `saving` and
//! `backoff_active` are reported as independent flags.
//!
//! Every commit, automatic or manual, goes through one async mutex, so at
//! most one `put` is in flight per manager. The snapshot is taken after that
//! mutex is acquired, so it reflects every mutation applied up to then.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::cache::PointerCache;
use super::notice::{Notice, NoticeThrottle, NoticeUpdate};
use super::scheduler::{CommitPolicy, CommitScheduler, TimerOutcome};
use super::types::{dedup_contacts, now_millis, ActivityLogEntry, ChatMessage, Contact, MemoryAggregate};
use crate::config::PersistenceConfig;
use crate::gateway::{BlobGateway, GatewayError, Pointer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Unloaded,
    Loading,
    Ready,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ManagerError {
    #[error("no identity is loaded")]
    NotReady,
}

/// Point-in-time view of the manager, for callers and UIs.
#[derive(Debug, Clone, Serialize)]
pub struct ManagerStatus {
    pub phase: Phase,
    pub identity: Option<String>,
    pub saving: bool,
    pub backoff_active: bool,
    pub consecutive_failures: u32,
    pub pending_changes: bool,
    pub pointer: Option<String>,
    pub notice: Option<Notice>,
}

/// Result of [`MemoryManager::save_now`].
#[derive(Debug, Clone)]
pub enum SaveOutcome {
    Saved { pointer: Pointer },
    /// The commit failed. `notice` is set unless the failure notice is throttled.
    Failed {
        error: String,
        notice: Option<NoticeUpdate>,
    },
    NotReady,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    /// Debounce or fast-path timer.
    Timer,
    /// Explicit flush; skipped when nothing changed, bypasses backoff.
    Flush,
    /// User-initiated save; always commits, bypasses backoff, may raise a notice.
    Manual,
}

struct ManagerState {
    phase: Phase,
    identity: Option<String>,
    aggregate: Option<MemoryAggregate>,
    scheduler: CommitScheduler,
    notices: NoticeThrottle,
    saving: bool,
    /// Bumped on every identity change and clear. Commits and workers from an
    /// older generation must not touch the current aggregate.
    generation: u64,
}

struct Shared {
    state: Mutex<ManagerState>,
    wake: Notify,
    commit_guard: tokio::sync::Mutex<()>,
    gateway: BlobGateway,
    cache: PointerCache,
    epochs: u32,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Memory manager for one connected identity at a time.
pub struct MemoryManager {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryManager {
    pub fn new(gateway: BlobGateway, cache: PointerCache, config: &PersistenceConfig, epochs: u32) -> Self {
        let state = ManagerState {
            phase: Phase::Unloaded,
            identity: None,
            aggregate: None,
            scheduler: CommitScheduler::new(CommitPolicy::from(config)),
            notices: NoticeThrottle::new(Duration::from_secs(config.notice_throttle_secs)),
            saving: false,
            generation: 0,
        };
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                wake: Notify::new(),
                commit_guard: tokio::sync::Mutex::new(()),
                gateway,
                cache,
                epochs,
            }),
            worker: Mutex::new(None),
        }
    }

    /// Switch to `identity`: drop the current aggregate and all scheduling
    /// state, then load from the pointer cache and blob store, or start fresh.
    #[tracing::instrument(skip(self))]
    pub async fn connect(&self, identity: &str) {
        self.stop_worker();
        let generation = {
            let mut st = self.shared.lock();
            st.generation += 1;
            st.phase = Phase::Loading;
            st.identity = Some(identity.to_string());
            st.aggregate = None;
            st.saving = false;
            st.scheduler.reset();
            st.notices.reset();
            st.generation
        };

        let aggregate = self.load(identity).await;

        {
            let mut st = self.shared.lock();
            if st.generation != generation {
                tracing::debug!("identity changed during load, discarding result");
                return;
            }
            st.aggregate = Some(aggregate);
            st.phase = Phase::Ready;
        }
        self.start_worker(generation);
    }

    async fn load(&self, identity: &str) -> MemoryAggregate {
        let pointer = match self.shared.cache.lookup(identity).await {
            Ok(Some(pointer)) => pointer,
            Ok(None) => {
                tracing::info!(identity, "no cached pointer, starting fresh");
                return MemoryAggregate::empty(identity);
            }
            Err(e) => {
                tracing::warn!(identity, error = %e, "pointer cache lookup failed, starting fresh");
                return MemoryAggregate::empty(identity);
            }
        };

        match self.shared.gateway.get(&pointer).await {
            Ok(Some(aggregate)) if aggregate.belongs_to(identity) => {
                tracing::info!(
                    identity,
                    %pointer,
                    messages = aggregate.chat_history.len(),
                    activities = aggregate.activity_logs.len(),
                    "memory loaded"
                );
                aggregate
            }
            Ok(Some(aggregate)) => {
                tracing::warn!(
                    identity,
                    %pointer,
                    owner = %aggregate.wallet_address,
                    "snapshot belongs to another identity, starting fresh"
                );
                MemoryAggregate::empty(identity)
            }
            Ok(None) => {
                tracing::info!(identity, %pointer, "snapshot expired or unknown, starting fresh");
                MemoryAggregate::empty(identity)
            }
            Err(e) => {
                tracing::warn!(identity, %pointer, error = %e, "snapshot fetch failed, starting fresh");
                MemoryAggregate::empty(identity)
            }
        }
    }

    /// Drop the identity and cancel any scheduled work. The remote snapshot
    /// is left alone.
    pub fn disconnect(&self) {
        self.stop_worker();
        let mut st = self.shared.lock();
        st.generation += 1;
        st.phase = Phase::Unloaded;
        if let Some(identity) = st.identity.take() {
            tracing::info!(identity = %identity, "identity disconnected");
        }
        st.aggregate = None;
        st.saving = false;
        st.scheduler.reset();
        st.notices.reset();
    }

    /// Replace the aggregate with a fresh empty one and forget the cached
    /// pointer. Nothing is committed until the next mutation.
    pub async fn clear(&self) -> Result<(), ManagerError> {
        self.stop_worker();
        let (identity, generation) = {
            let mut st = self.shared.lock();
            if st.phase != Phase::Ready {
                return Err(ManagerError::NotReady);
            }
            let identity = st.identity.clone().ok_or(ManagerError::NotReady)?;
            st.generation += 1;
            st.aggregate = Some(MemoryAggregate::empty(&identity));
            st.saving = false;
            st.scheduler.reset();
            (identity, st.generation)
        };
        self.start_worker(generation);

        if let Err(e) = self.shared.cache.remove(&identity).await {
            tracing::warn!(identity = %identity, error = %e, "failed to remove cached pointer");
        }
        tracing::info!(identity = %identity, "memory cleared");
        Ok(())
    }

    /// Flush pending changes, then disconnect.
    pub async fn shutdown(&self) {
        if let Err(e) = self.flush().await {
            tracing::warn!(error = %e, "final flush failed");
        }
        self.disconnect();
    }

    pub fn append_chat_message(&self, message: ChatMessage) -> Result<(), ManagerError> {
        self.mutate(|agg| agg.chat_history.push(message))
    }

    pub fn append_activity_log(&self, entry: ActivityLogEntry) -> Result<(), ManagerError> {
        self.mutate(|agg| agg.activity_logs.push(entry))
    }

    pub fn set_summary(&self, summary: impl Into<String>) -> Result<(), ManagerError> {
        let summary = summary.into();
        self.mutate(|agg| agg.ai_summary = summary)
    }

    /// Replace the contact set. Names are deduplicated case-insensitively.
    pub fn set_contacts(&self, contacts: Vec<Contact>) -> Result<(), ManagerError> {
        let contacts = dedup_contacts(contacts);
        self.mutate(|agg| agg.contacts = contacts)
    }

    fn mutate(&self, apply: impl FnOnce(&mut MemoryAggregate)) -> Result<(), ManagerError> {
        {
            let mut guard = self.shared.lock();
            let st = &mut *guard;
            if st.phase != Phase::Ready {
                return Err(ManagerError::NotReady);
            }
            let aggregate = st.aggregate.as_mut().ok_or(ManagerError::NotReady)?;
            apply(aggregate);
            let has_pointer = aggregate.pointer.is_some();
            st.scheduler.on_mutation(Instant::now(), has_pointer);
        }
        self.shared.wake.notify_one();
        Ok(())
    }

    /// Commit immediately, bypassing debounce and backoff. A failure counts
    /// toward backoff and may produce a throttled notice.
    pub async fn save_now(&self) -> SaveOutcome {
        let generation = match self.current_generation() {
            Some(generation) => generation,
            None => return SaveOutcome::NotReady,
        };
        match commit(&self.shared, Trigger::Manual, generation).await {
            Ok(Some(pointer)) => SaveOutcome::Saved { pointer },
            Ok(None) => SaveOutcome::NotReady,
            Err(e) => {
                let notice = {
                    let mut st = self.shared.lock();
                    st.notices
                        .offer(format!("Couldn't save your memory: {e}"), Instant::now())
                };
                SaveOutcome::Failed {
                    error: e.to_string(),
                    notice,
                }
            }
        }
    }

    /// Commit now if anything changed since the last successful commit.
    /// Returns the new pointer, or `None` when there was nothing to do.
    pub async fn flush(&self) -> Result<Option<Pointer>, GatewayError> {
        match self.current_generation() {
            Some(generation) => commit(&self.shared, Trigger::Flush, generation).await,
            None => Ok(None),
        }
    }

    pub fn dismiss_notice(&self, id: uuid::Uuid) -> bool {
        self.shared.lock().notices.dismiss(id)
    }

    /// Clone of the current aggregate, if loaded.
    pub fn snapshot(&self) -> Option<MemoryAggregate> {
        self.shared.lock().aggregate.clone()
    }

    /// Run `f` against the loaded aggregate without cloning it.
    pub fn with_aggregate<T>(&self, f: impl FnOnce(&MemoryAggregate) -> T) -> Option<T> {
        self.shared.lock().aggregate.as_ref().map(f)
    }

    pub fn status(&self) -> ManagerStatus {
        let st = self.shared.lock();
        ManagerStatus {
            phase: st.phase,
            identity: st.identity.clone(),
            saving: st.saving,
            backoff_active: st.scheduler.backoff_active(Instant::now()),
            consecutive_failures: st.scheduler.consecutive_failures(),
            pending_changes: st.scheduler.has_pending_changes(),
            pointer: st.aggregate.as_ref().and_then(|a| a.pointer.clone()),
            notice: st.notices.visible().cloned(),
        }
    }

    fn current_generation(&self) -> Option<u64> {
        let st = self.shared.lock();
        (st.phase == Phase::Ready).then_some(st.generation)
    }

    fn start_worker(&self, generation: u64) {
        let handle = tokio::spawn(run_worker(Arc::clone(&self.shared), generation));
        let mut worker = self.worker.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(old) = worker.replace(handle) {
            old.abort();
        }
    }

    fn stop_worker(&self) {
        let mut worker = self.worker.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(handle) = worker.take() {
            handle.abort();
        }
    }
}

impl Drop for MemoryManager {
    fn drop(&mut self) {
        self.stop_worker();
    }
}

/// Background loop: sleep until the scheduler's deadline (or until woken by
/// a mutation), then ask the scheduler what to do.
async fn run_worker(shared: Arc<Shared>, generation: u64) {
    loop {
        let deadline = {
            let st = shared.lock();
            if st.generation != generation {
                return;
            }
            st.scheduler.deadline()
        };

        match deadline {
            Some(at) => {
                tokio::select! {
                    _ = tokio::time::sleep_until(at) => {}
                    _ = shared.wake.notified() => continue,
                }
            }
            None => {
                shared.wake.notified().await;
                continue;
            }
        }

        let outcome = {
            let mut st = shared.lock();
            if st.generation != generation {
                return;
            }
            st.scheduler.on_timer(Instant::now())
        };

        match outcome {
            TimerOutcome::Commit { revision } => {
                tracing::debug!(revision, "commit timer elapsed");
                // Background failures are logged inside commit and never surfaced.
                let _ = commit(&shared, Trigger::Timer, generation).await;
            }
            TimerOutcome::Suppressed { until } => {
                tracing::debug!(
                    remaining_ms = until.saturating_duration_since(Instant::now()).as_millis() as u64,
                    "commit suppressed by backoff"
                );
            }
            TimerOutcome::Idle => {}
        }
    }
}

/// Single-flight commit. Returns `Ok(None)` when skipped (nothing to commit,
/// backoff for timer commits, or the session changed).
async fn commit(shared: &Shared, trigger: Trigger, generation: u64) -> Result<Option<Pointer>, GatewayError> {
    let _flight = shared.commit_guard.lock().await;

    let (snapshot, identity, revision) = {
        let mut st = shared.lock();
        if st.generation != generation || st.phase != Phase::Ready {
            return Ok(None);
        }
        let now = Instant::now();
        match trigger {
            Trigger::Timer if st.scheduler.backoff_active(now) => return Ok(None),
            Trigger::Timer | Trigger::Flush if !st.scheduler.has_pending_changes() => return Ok(None),
            _ => {}
        }
        let Some(identity) = st.identity.clone() else {
            return Ok(None);
        };
        let Some(aggregate) = st.aggregate.as_ref() else {
            return Ok(None);
        };
        let mut snapshot = aggregate.clone();
        snapshot.last_updated = now_millis();
        let revision = st.scheduler.revision();
        st.saving = true;
        (snapshot, identity, revision)
    };

    let result = shared.gateway.put(&snapshot, shared.epochs).await;

    let pointer = {
        let mut guard = shared.lock();
        let st = &mut *guard;
        st.saving = false;
        if st.generation != generation {
            tracing::debug!(identity = %identity, ok = result.is_ok(), "session changed during commit, result dropped");
            return Ok(None);
        }
        match result {
            Ok(pointer) => {
                st.scheduler.record_success(revision);
                if let Some(aggregate) = st.aggregate.as_mut() {
                    aggregate.pointer = Some(pointer.clone());
                    aggregate.last_updated = snapshot.last_updated;
                }
                pointer
            }
            Err(e) => {
                let opened = st.scheduler.record_failure(Instant::now());
                let failures = st.scheduler.consecutive_failures();
                match trigger {
                    Trigger::Manual => tracing::error!(identity = %identity, failures, error = %e, "manual save failed"),
                    _ => tracing::warn!(identity = %identity, failures, backoff = opened, error = %e, "background save failed"),
                }
                return Err(e);
            }
        }
    };

    if let Err(e) = shared.cache.store(&identity, &pointer).await {
        tracing::warn!(identity = %identity, %pointer, error = %e, "failed to update pointer cache");
    }
    tracing::info!(identity = %identity, %pointer, revision, ?trigger, "memory committed");
    Ok(Some(pointer))
}
