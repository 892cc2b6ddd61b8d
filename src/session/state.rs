//! Session state management

use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};

use crate::types::{ChannelKind, MediaStatus, ReceiverStatus};

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Handshake in progress
    Connecting,
    /// Handshake done, events flowing
    Ready,
    /// Closed on request
    Closed,
    /// Ended by a connection failure
    Failed,
}

impl SessionState {
    /// Check if the session has ended
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }

    /// Check if events are flowing
    #[must_use]
    pub fn is_ready(self) -> bool {
        matches!(self, SessionState::Ready)
    }

    fn can_become(self, next: SessionState) -> bool {
        match (self, next) {
            (SessionState::Connecting, SessionState::Ready) => true,
            (from, SessionState::Closed | SessionState::Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Connecting => "connecting",
            SessionState::Ready => "ready",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Stamps events so that timestamps never go backwards within a channel
#[derive(Debug)]
struct ChannelClock {
    last: Mutex<DateTime<Utc>>,
}

impl ChannelClock {
    fn new(start: DateTime<Utc>) -> Self {
        Self {
            last: Mutex::new(start),
        }
    }

    fn stamp(&self, observed: DateTime<Utc>) -> DateTime<Utc> {
        let mut last = self.last.lock();
        if observed > *last {
            *last = observed;
        }
        *last
    }
}

/// State shared between a session handle and its dispatcher task
#[derive(Debug)]
pub(crate) struct SessionShared {
    state: RwLock<SessionState>,
    opened_at: DateTime<Utc>,
    device_clock: ChannelClock,
    media_clock: ChannelClock,
    last_device: RwLock<Option<ReceiverStatus>>,
    last_media: RwLock<Option<MediaStatus>>,
}

impl SessionShared {
    pub(crate) fn new(opened_at: DateTime<Utc>) -> Self {
        Self {
            state: RwLock::new(SessionState::Connecting),
            opened_at,
            device_clock: ChannelClock::new(opened_at),
            media_clock: ChannelClock::new(opened_at),
            last_device: RwLock::new(None),
            last_media: RwLock::new(None),
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        *self.state.read()
    }

    pub(crate) fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    /// Move to `next` if allowed; terminal states are entered at most once
    pub(crate) fn transition(&self, next: SessionState) -> bool {
        let mut state = self.state.write();
        let current = *state;
        if current.can_become(next) {
            tracing::trace!(from = %current, to = %next, "session state change");
            *state = next;
            true
        } else {
            false
        }
    }

    /// Timestamp for an event observed at `observed` on `kind`
    pub(crate) fn stamp(&self, kind: ChannelKind, observed: DateTime<Utc>) -> DateTime<Utc> {
        match kind {
            ChannelKind::Device => self.device_clock.stamp(observed),
            ChannelKind::Media => self.media_clock.stamp(observed),
        }
    }

    pub(crate) fn set_last_device(&self, status: ReceiverStatus) {
        *self.last_device.write() = Some(status);
    }

    pub(crate) fn set_last_media(&self, status: MediaStatus) {
        *self.last_media.write() = Some(status);
    }

    pub(crate) fn last_device(&self) -> Option<ReceiverStatus> {
        self.last_device.read().clone()
    }

    pub(crate) fn last_media(&self) -> Option<MediaStatus> {
        self.last_media.read().clone()
    }
}
