//! Pipeline counters shared with the health endpoint.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Serialize;

use crate::domain::session::SessionState;

/// Counters updated by every stream processor, plus the sessions they share.
#[derive(Debug, Default)]
pub struct PipelineStats {
    frames_decoded: AtomicU64,
    frame_errors: AtomicU64,
    messages_handled: AtomicU64,
    messages_unregistered: AtomicU64,
    orders_forwarded: AtomicU64,
    orders_rejected: AtomicU64,
    batches_submitted: AtomicU64,
    active_streams: AtomicUsize,
    sessions: Mutex<Vec<Weak<SessionState>>>,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStatsSnapshot {
    /// Messages decoded.
    pub frames_decoded: u64,
    /// Decode errors reported.
    pub frame_errors: u64,
    /// Messages that reached a handler.
    pub messages_handled: u64,
    /// Messages with no registered handler.
    pub messages_unregistered: u64,
    /// Orders handed to the upload path.
    pub orders_forwarded: u64,
    /// Documents skipped during conversion.
    pub orders_rejected: u64,
    /// Batches handed to the upload path.
    pub batches_submitted: u64,
    /// Stream processors currently running.
    pub active_streams: usize,
    /// Live sessions whose location is known.
    pub known_sessions: usize,
}

impl PipelineStats {
    /// Fresh counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_frame(&self) {
        self.frames_decoded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_frame_error(&self) {
        self.frame_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dispatch(&self, handled: bool) {
        if handled {
            self.messages_handled.fetch_add(1, Ordering::Relaxed);
        } else {
            self.messages_unregistered.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_batch(&self, orders: usize) {
        self.batches_submitted.fetch_add(1, Ordering::Relaxed);
        self.orders_forwarded
            .fetch_add(orders as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self, rejected: usize) {
        self.orders_rejected
            .fetch_add(rejected as u64, Ordering::Relaxed);
    }

    pub(crate) fn stream_opened(&self) {
        self.active_streams.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn stream_closed(&self) {
        self.active_streams.fetch_sub(1, Ordering::Relaxed);
    }

    /// Watch `session` for readiness. Sessions shared by several streams
    /// are tracked once; dropped sessions are pruned.
    pub(crate) fn track_session(&self, session: &Arc<SessionState>) {
        let mut sessions = self.sessions.lock();
        sessions.retain(|tracked| tracked.strong_count() > 0);
        let target = Arc::as_ptr(session);
        if !sessions.iter().any(|tracked| std::ptr::eq(tracked.as_ptr(), target)) {
            sessions.push(Arc::downgrade(session));
        }
    }

    /// Live sessions whose location is currently known.
    #[must_use]
    pub fn known_sessions(&self) -> usize {
        self.sessions
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|session| session.is_valid_location())
            .count()
    }

    /// Whether any live session currently has a known location.
    #[must_use]
    pub fn any_session_known(&self) -> bool {
        self.known_sessions() > 0
    }

    /// Copy every counter.
    #[must_use]
    pub fn snapshot(&self) -> PipelineStatsSnapshot {
        PipelineStatsSnapshot {
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            frame_errors: self.frame_errors.load(Ordering::Relaxed),
            messages_handled: self.messages_handled.load(Ordering::Relaxed),
            messages_unregistered: self.messages_unregistered.load(Ordering::Relaxed),
            orders_forwarded: self.orders_forwarded.load(Ordering::Relaxed),
            orders_rejected: self.orders_rejected.load(Ordering::Relaxed),
            batches_submitted: self.batches_submitted.load(Ordering::Relaxed),
            active_streams: self.active_streams.load(Ordering::Relaxed),
            known_sessions: self.known_sessions(),
        }
    }
}
