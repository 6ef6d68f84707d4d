//! Live session store with optimistic concurrency
//!
//! One versioned [`SyncSession`] per run. Writers read a snapshot, modify a
//! copy, and commit against the version they read — a commit loses when
//! another writer advanced the version first and must retry on the fresh
//! snapshot. Readers poll [`SessionStore::get`] or subscribe to the
//! broadcast stream for push updates.

use chrono::Utc;
use dashmap::DashMap;
use shared::sync::SyncSession;
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Capacity of the push channel; slow subscribers lag rather than block.
const BROADCAST_CAPACITY: usize = 256;

/// Why a commit was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommitError {
    #[error("session not found")]
    NotFound,

    #[error("version conflict: current={current_version}")]
    Conflict { current_version: u64 },
}

pub struct SessionStore {
    sessions: DashMap<Uuid, SyncSession>,
    latest_by_operation: DashMap<Uuid, Uuid>,
    tx: broadcast::Sender<SyncSession>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            sessions: DashMap::new(),
            latest_by_operation: DashMap::new(),
            tx,
        }
    }

    /// Create a fresh session for a new run, clearing any stale session a
    /// previous run of the same operation left behind.
    pub fn create(&self, run_id: Uuid, operation_id: Uuid) -> SyncSession {
        if let Some((_, stale_run)) = self.latest_by_operation.remove(&operation_id) {
            self.sessions.remove(&stale_run);
        }
        let session = SyncSession::new(run_id, operation_id, Utc::now());
        self.sessions.insert(run_id, session.clone());
        self.latest_by_operation.insert(operation_id, run_id);
        let _ = self.tx.send(session.clone());
        session
    }

    /// Latest persisted snapshot for a run.
    pub fn get(&self, run_id: Uuid) -> Option<SyncSession> {
        self.sessions.get(&run_id).map(|s| s.clone())
    }

    /// Latest run for an operation, if still retained.
    pub fn latest_for_operation(&self, operation_id: Uuid) -> Option<SyncSession> {
        self.latest_by_operation
            .get(&operation_id)
            .and_then(|run| self.get(*run))
    }

    /// Commit a modified snapshot against the version it was read at.
    ///
    /// Exactly one of several concurrent writers at the same base version
    /// wins; the others get [`CommitError::Conflict`] and must re-read.
    pub fn commit(
        &self,
        run_id: Uuid,
        base_version: u64,
        mut updated: SyncSession,
    ) -> Result<SyncSession, CommitError> {
        let mut entry = self.sessions.get_mut(&run_id).ok_or(CommitError::NotFound)?;
        if entry.version != base_version {
            return Err(CommitError::Conflict {
                current_version: entry.version,
            });
        }
        updated.version = base_version + 1;
        updated.recompute_progress();
        *entry = updated.clone();
        drop(entry);
        let _ = self.tx.send(updated.clone());
        Ok(updated)
    }

    /// Read-modify-write with automatic retry on conflict.
    pub fn update<F>(&self, run_id: Uuid, mut mutate: F) -> Option<SyncSession>
    where
        F: FnMut(&mut SyncSession),
    {
        loop {
            let snapshot = self.get(run_id)?;
            let base = snapshot.version;
            let mut copy = snapshot;
            mutate(&mut copy);
            match self.commit(run_id, base, copy) {
                Ok(committed) => return Some(committed),
                Err(CommitError::Conflict { .. }) => continue,
                Err(CommitError::NotFound) => return None,
            }
        }
    }

    /// Subscribe to the push stream of committed snapshots.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncSession> {
        self.tx.subscribe()
    }

    /// Drop terminal sessions past the retention window.
    pub fn gc(&self, retention: Duration) {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::hours(1));
        self.sessions.retain(|_, session| {
            !(session.phase.is_terminal()
                && session.end_time.map(|t| t < cutoff).unwrap_or(false))
        });
        self.latest_by_operation
            .retain(|_, run_id| self.sessions.contains_key(run_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::sync::SyncPhase;

    #[test]
    fn test_exactly_one_concurrent_writer_wins() {
        let store = SessionStore::new();
        let run = Uuid::new_v4();
        store.create(run, Uuid::new_v4());

        // Advance to version 4
        for _ in 0..4 {
            store.update(run, |s| s.platform.processed += 1);
        }
        let observed = store.get(run).unwrap();
        assert_eq!(observed.version, 4);

        // Two writers prepare updates from the same snapshot
        let mut writer_a = observed.clone();
        writer_a.platform.new += 1;
        let mut writer_b = observed.clone();
        writer_b.platform.updated += 1;

        let won = store.commit(run, observed.version, writer_a).unwrap();
        assert_eq!(won.version, 5);

        let lost = store.commit(run, observed.version, writer_b.clone());
        assert_eq!(
            lost.unwrap_err(),
            CommitError::Conflict { current_version: 5 }
        );

        // The loser retries against the fresh snapshot instead of overwriting
        let fresh = store.get(run).unwrap();
        let mut retry = fresh.clone();
        retry.platform.updated += 1;
        let committed = store.commit(run, fresh.version, retry).unwrap();
        assert_eq!(committed.version, 6);
        assert_eq!(committed.platform.new, 1);
        assert_eq!(committed.platform.updated, 1);
    }

    #[test]
    fn test_create_clears_stale_session() {
        let store = SessionStore::new();
        let op = Uuid::new_v4();
        let old_run = Uuid::new_v4();
        store.create(old_run, op);
        store.update(old_run, |s| {
            s.phase = SyncPhase::Completed;
            s.platform.processed = 10;
        });

        let new_run = Uuid::new_v4();
        let fresh = store.create(new_run, op);
        assert_eq!(fresh.version, 0);
        assert_eq!(fresh.platform.processed, 0);
        assert!(store.get(old_run).is_none());
        assert_eq!(
            store.latest_for_operation(op).unwrap().run_id,
            new_run
        );
    }

    #[test]
    fn test_push_stream_sees_commits() {
        let store = SessionStore::new();
        let run = Uuid::new_v4();
        let mut rx = store.subscribe();
        store.create(run, Uuid::new_v4());
        store.update(run, |s| s.phase = SyncPhase::SyncingPlatform);

        let first = rx.try_recv().unwrap();
        assert_eq!(first.version, 0);
        let second = rx.try_recv().unwrap();
        assert_eq!(second.phase, SyncPhase::SyncingPlatform);
    }

    #[test]
    fn test_gc_drops_old_terminal_sessions() {
        let store = SessionStore::new();
        let run = Uuid::new_v4();
        store.create(run, Uuid::new_v4());
        store.update(run, |s| {
            s.phase = SyncPhase::Completed;
            s.end_time = Some(Utc::now() - chrono::Duration::hours(2));
        });

        store.gc(Duration::from_secs(3600));
        assert!(store.get(run).is_none());
    }

    #[test]
    fn test_gc_keeps_active_sessions() {
        let store = SessionStore::new();
        let run = Uuid::new_v4();
        store.create(run, Uuid::new_v4());
        store.update(run, |s| s.phase = SyncPhase::Matching);

        store.gc(Duration::from_secs(0));
        assert!(store.get(run).is_some());
    }
}
