//! Coordination flags shared by every lifecycle operation
//!
//! Owned by the session manager and never persisted. Flags that are released
//! on a delay carry an epoch, so a late release from an earlier operation can
//! never clear a flag raised by a newer one.

use crate::core::types::{OperationId, SessionId};
use crate::session::stage::LoadingStage;
use ahash::{AHashMap, AHashSet};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Why an operation was skipped without touching the remote service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoSession,
    CreationInFlight,
    StartInFlight,
    Unmounting,
    CleanupInProgress,
    ActiveProtection,
    Initializing,
    StillLoading,
    ActiveOperation,
    RecentlyStopped,
    StaleSession,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::NoSession => "no active simulation",
            SkipReason::CreationInFlight => "a simulation is being created",
            SkipReason::StartInFlight => "a start request is already in flight",
            SkipReason::Unmounting => "the session is being torn down",
            SkipReason::CleanupInProgress => "cleanup already in progress",
            SkipReason::ActiveProtection => "the simulation is protected",
            SkipReason::Initializing => "the simulation is initializing",
            SkipReason::StillLoading => "the simulation is still loading",
            SkipReason::ActiveOperation => "an operation is using the simulation",
            SkipReason::RecentlyStopped => "the simulation was stopped recently",
            SkipReason::StaleSession => "the simulation was replaced",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Default)]
pub struct GuardState {
    next_epoch: u64,
    creation: Option<u64>,
    start: Option<u64>,
    protection: Option<u64>,
    pub unmounting: bool,
    /// One loading-timeout recovery per load; cleared once a session completes
    pub recovery_attempted: bool,
    active_operations: AHashMap<OperationId, SessionId>,
    cleanup_in_progress: AHashSet<SessionId>,
    recently_stopped: AHashMap<SessionId, Instant>,
    last_activity: AHashMap<SessionId, Instant>,
    autostarted: AHashSet<SessionId>,
    autostart_retries: AHashMap<SessionId, u32>,
}

impl GuardState {
    pub fn new() -> Self {
        Self::default()
    }

    fn epoch(&mut self) -> u64 {
        self.next_epoch += 1;
        self.next_epoch
    }

    pub fn creation_in_flight(&self) -> bool {
        self.creation.is_some()
    }

    /// Claim the creation slot; `None` if another create or reset holds it
    pub fn try_begin_creation(&mut self) -> Option<u64> {
        if self.creation.is_some() {
            return None;
        }
        let epoch = self.epoch();
        self.creation = Some(epoch);
        Some(epoch)
    }

    /// Release the creation slot if `epoch` still holds it
    pub fn end_creation(&mut self, epoch: u64) -> bool {
        if self.creation == Some(epoch) {
            self.creation = None;
            true
        } else {
            false
        }
    }

    pub fn try_begin_start(&mut self) -> Option<u64> {
        if self.start.is_some() {
            return None;
        }
        let epoch = self.epoch();
        self.start = Some(epoch);
        Some(epoch)
    }

    pub fn end_start(&mut self, epoch: u64) {
        if self.start == Some(epoch) {
            self.start = None;
        }
    }

    /// Raise protection against teardown, superseding any earlier holder
    pub fn protect(&mut self) -> u64 {
        let epoch = self.epoch();
        self.protection = Some(epoch);
        epoch
    }

    pub fn protection_epoch(&self) -> Option<u64> {
        self.protection
    }

    pub fn release_protection(&mut self, epoch: u64) {
        if self.protection == Some(epoch) {
            self.protection = None;
        }
    }

    /// Drop protection regardless of holder; the protected session has failed
    pub fn drop_protection(&mut self) {
        self.protection = None;
    }

    pub fn is_protected(&self) -> bool {
        self.protection.is_some()
    }

    pub fn begin_operation(&mut self, session: SessionId) -> OperationId {
        let id = OperationId::new();
        self.active_operations.insert(id, session);
        id
    }

    pub fn end_operation(&mut self, id: OperationId) {
        self.active_operations.remove(&id);
    }

    pub fn has_active_operation(&self, session: &SessionId) -> bool {
        self.active_operations.values().any(|s| s == session)
    }

    pub fn try_begin_cleanup(&mut self, session: &SessionId) -> bool {
        self.cleanup_in_progress.insert(session.clone())
    }

    pub fn end_cleanup(&mut self, session: &SessionId) {
        self.cleanup_in_progress.remove(session);
    }

    pub fn mark_stopped(&mut self, session: &SessionId, now: Instant) {
        self.recently_stopped.insert(session.clone(), now);
    }

    pub fn stopped_within(&self, session: &SessionId, window: Duration, now: Instant) -> bool {
        self.recently_stopped
            .get(session)
            .map(|at| now.saturating_duration_since(*at) < window)
            .unwrap_or(false)
    }

    pub fn touch(&mut self, session: &SessionId, now: Instant) {
        self.last_activity.insert(session.clone(), now);
    }

    pub fn last_activity(&self, session: &SessionId) -> Option<Instant> {
        self.last_activity.get(session).copied()
    }

    /// Sessions with no recorded activity for longer than `threshold`
    pub fn inactive(&self, threshold: Duration, now: Instant) -> Vec<SessionId> {
        self.last_activity
            .iter()
            .filter(|(_, at)| now.saturating_duration_since(**at) > threshold)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Record that autostart fired; false if it already had for this session
    pub fn mark_autostarted(&mut self, session: &SessionId) -> bool {
        self.autostarted.insert(session.clone())
    }

    /// Count one more auto-start retry for a session; returns the new count
    pub fn next_autostart_retry(&mut self, session: &SessionId) -> u32 {
        let count = self.autostart_retries.entry(session.clone()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn reset_autostart_retries(&mut self, session: &SessionId) {
        self.autostart_retries.remove(session);
    }

    /// Drop every timestamp and marker kept for a session that is gone
    pub fn forget(&mut self, session: &SessionId) {
        self.recently_stopped.remove(session);
        self.last_activity.remove(session);
        self.autostarted.remove(session);
        self.autostart_retries.remove(session);
        self.active_operations.retain(|_, s| s != session);
    }

    /// First reason cleanup of `session` must not proceed, if any
    pub fn cleanup_block(
        &self,
        session: &SessionId,
        stage: LoadingStage,
        recently_stopped: Duration,
        now: Instant,
    ) -> Option<SkipReason> {
        if self.cleanup_in_progress.contains(session) {
            Some(SkipReason::CleanupInProgress)
        } else if self.is_protected() {
            Some(SkipReason::ActiveProtection)
        } else if stage == LoadingStage::Initializing {
            Some(SkipReason::Initializing)
        } else if self.has_active_operation(session) {
            Some(SkipReason::ActiveOperation)
        } else if self.stopped_within(session, recently_stopped, now) {
            Some(SkipReason::RecentlyStopped)
        } else {
            None
        }
    }

    /// Unmount: drop every in-flight marker so a remount starts clean
    pub fn release_all(&mut self) {
        self.creation = None;
        self.start = None;
        self.protection = None;
        self.active_operations.clear();
        self.cleanup_in_progress.clear();
    }
}
