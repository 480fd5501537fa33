//! Session State
//!
//! Tracks whether the client's current world location is known. Market data
//! is only trusted while the location is known; any event that may change the
//! location moves the session back to `Unknown` until the server confirms the
//! new one.
//!
//! ```text
//!            establish(loc)
//!   Unknown ───────────────▶ Known(loc)
//!      ▲                        │  establish(other)
//!      │ invalidate / reset     ▼
//!      └──────────────────── Known(other)
//! ```

use parking_lot::RwLock;

use crate::domain::market::LocationId;

/// Current location knowledge for one observed session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// No trustworthy location; market messages are dropped.
    #[default]
    Unknown,
    /// Location confirmed by the server.
    Known(LocationId),
}

impl SessionPhase {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Known(_) => "known",
        }
    }
}

/// Shared per-session location state.
///
/// Handlers read it concurrently; only the location handlers and the stream
/// processor mutate it, and only through the methods below.
#[derive(Debug, Default)]
pub struct SessionState {
    phase: RwLock<SessionPhase>,
}

impl SessionState {
    /// New session in the `Unknown` phase.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a location is currently known.
    #[must_use]
    pub fn is_valid_location(&self) -> bool {
        matches!(*self.phase.read(), SessionPhase::Known(_))
    }

    /// Snapshot of the known location, if any.
    #[must_use]
    pub fn location(&self) -> Option<LocationId> {
        match &*self.phase.read() {
            SessionPhase::Known(loc) => Some(loc.clone()),
            SessionPhase::Unknown => None,
        }
    }

    /// Snapshot of the full phase.
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.phase.read().clone()
    }

    /// Record a server-confirmed location. Returns the previous phase.
    pub fn establish(&self, location: LocationId) -> SessionPhase {
        std::mem::replace(&mut *self.phase.write(), SessionPhase::Known(location))
    }

    /// Forget the location because it may be about to change.
    /// Returns the previous phase.
    pub fn invalidate(&self) -> SessionPhase {
        std::mem::take(&mut *self.phase.write())
    }

    /// Forget the location because the observed stream ended or disconnected.
    pub fn reset(&self) {
        *self.phase.write() = SessionPhase::Unknown;
    }
}
