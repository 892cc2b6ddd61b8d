use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One of the two independent event streams of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Receiver (device) status: volume, running applications, standby
    Device,
    /// Media status of the running media application
    Media,
}

impl ChannelKind {
    /// Both channels, in a fixed order
    pub const ALL: [ChannelKind; 2] = [ChannelKind::Device, ChannelKind::Media];
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKind::Device => f.write_str("device"),
            ChannelKind::Media => f.write_str("media"),
        }
    }
}

/// A timestamped notification delivered to a channel listener
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusEvent {
    /// Channel the event was delivered on
    pub channel: ChannelKind,
    /// Friendly name of the originating device
    pub device: String,
    /// Decoded payload
    pub payload: EventPayload,
    /// Time the frame was received, non-decreasing per channel
    pub timestamp: DateTime<Utc>,
}

impl StatusEvent {
    /// Whether this is the final notification of the channel
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self.payload, EventPayload::SessionEnded { .. })
    }
}

/// Payload of a status event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    /// Receiver status update
    DeviceStatus(ReceiverStatus),
    /// Media status update
    MediaStatus(MediaStatus),
    /// The session ended unexpectedly; nothing follows on this channel
    SessionEnded {
        /// Why the session ended
        reason: DisconnectReason,
    },
}

impl fmt::Display for EventPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventPayload::DeviceStatus(status) => status.fmt(f),
            EventPayload::MediaStatus(status) => status.fmt(f),
            EventPayload::SessionEnded { reason } => write!(f, "SessionEnded({reason})"),
        }
    }
}

/// Reason a session failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    /// The device closed the platform virtual connection
    DeviceClosed,
    /// The socket reached EOF or failed
    ConnectionLost(String),
    /// No traffic within the heartbeat timeout
    HeartbeatTimeout,
    /// The frame stream could not be resynchronised
    FramingError(String),
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::DeviceClosed => f.write_str("device closed the connection"),
            DisconnectReason::ConnectionLost(message) => write!(f, "connection lost: {message}"),
            DisconnectReason::HeartbeatTimeout => f.write_str("heartbeat timeout"),
            DisconnectReason::FramingError(message) => write!(f, "framing error: {message}"),
        }
    }
}

/// Volume as reported by receiver and media status
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    /// Level in `0.0..=1.0`
    #[serde(default)]
    pub level: Option<f64>,
    /// Mute flag
    #[serde(default)]
    pub muted: Option<bool>,
}

/// A namespace an application listens on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppNamespace {
    /// Namespace URN
    pub name: String,
}

/// An application running on the receiver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    /// Application id (e.g., `CC1AD845` for the default media receiver)
    pub app_id: String,
    /// Human-readable application name
    #[serde(default)]
    pub display_name: Option<String>,
    /// Application session id
    #[serde(default)]
    pub session_id: Option<String>,
    /// Free-form status text
    #[serde(default)]
    pub status_text: Option<String>,
    /// Destination id for virtual connections to this application
    #[serde(default)]
    pub transport_id: Option<String>,
    /// Namespaces the application handles
    #[serde(default)]
    pub namespaces: Vec<AppNamespace>,
    /// Whether this is the idle/backdrop screen
    #[serde(default)]
    pub is_idle_screen: Option<bool>,
}

impl Application {
    /// Check if the application handles the given namespace
    #[must_use]
    pub fn supports_namespace(&self, namespace: &str) -> bool {
        self.namespaces.iter().any(|ns| ns.name == namespace)
    }
}

/// Receiver status (`RECEIVER_STATUS` payload)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiverStatus {
    /// Running applications
    #[serde(default)]
    pub applications: Vec<Application>,
    /// Device volume
    #[serde(default)]
    pub volume: Option<Volume>,
    /// Whether the device is the active input of its display
    #[serde(default)]
    pub is_active_input: Option<bool>,
    /// Whether the display is in standby
    #[serde(default)]
    pub is_stand_by: Option<bool>,
}

impl ReceiverStatus {
    /// The first application that is not the idle screen
    #[must_use]
    pub fn active_application(&self) -> Option<&Application> {
        self.applications
            .iter()
            .find(|app| app.is_idle_screen != Some(true))
            .or_else(|| self.applications.first())
    }
}

impl fmt::Display for ReceiverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let volume = self.volume.clone().unwrap_or_default();
        let app = self.active_application();
        write!(
            f,
            "CastStatus(is_active_input={}, is_stand_by={}, volume_level={}, volume_muted={}, \
             app_id={}, display_name={}, status_text={})",
            opt(self.is_active_input.as_ref()),
            opt(self.is_stand_by.as_ref()),
            opt(volume.level.as_ref()),
            opt(volume.muted.as_ref()),
            opt(app.map(|a| &a.app_id)),
            opt(app.and_then(|a| a.display_name.as_ref())),
            opt(app.and_then(|a| a.status_text.as_ref())),
        )
    }
}

/// Metadata attached to a media item
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaMetadata {
    /// Title
    #[serde(default)]
    pub title: Option<String>,
    /// Subtitle
    #[serde(default)]
    pub subtitle: Option<String>,
    /// Artist (music)
    #[serde(default)]
    pub artist: Option<String>,
    /// Album (music)
    #[serde(default)]
    pub album_name: Option<String>,
    /// Series (TV shows)
    #[serde(default)]
    pub series_title: Option<String>,
}

/// Description of the loaded media item
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaInformation {
    /// Content id, usually a URL
    #[serde(default)]
    pub content_id: Option<String>,
    /// MIME type
    #[serde(default)]
    pub content_type: Option<String>,
    /// `BUFFERED`, `LIVE` or `NONE`
    #[serde(default)]
    pub stream_type: Option<String>,
    /// Duration in seconds
    #[serde(default)]
    pub duration: Option<f64>,
    /// Item metadata
    #[serde(default)]
    pub metadata: Option<MediaMetadata>,
}

/// Status of a single media session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaSessionStatus {
    /// Media session id
    #[serde(default)]
    pub media_session_id: Option<i64>,
    /// `IDLE`, `PLAYING`, `PAUSED` or `BUFFERING`
    pub player_state: String,
    /// Playback position in seconds
    #[serde(default)]
    pub current_time: Option<f64>,
    /// Playback rate
    #[serde(default)]
    pub playback_rate: Option<f64>,
    /// Why the player went idle
    #[serde(default)]
    pub idle_reason: Option<String>,
    /// Loaded media, if the receiver sent it
    #[serde(default)]
    pub media: Option<MediaInformation>,
    /// Stream volume
    #[serde(default)]
    pub volume: Option<Volume>,
}

/// Media status (`MEDIA_STATUS` payload)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MediaStatus {
    /// Media sessions; empty when nothing is loaded
    #[serde(rename = "status", default)]
    pub sessions: Vec<MediaSessionStatus>,
}

impl MediaStatus {
    /// The session the receiver reported first
    #[must_use]
    pub fn current(&self) -> Option<&MediaSessionStatus> {
        self.sessions.first()
    }
}

impl fmt::Display for MediaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(current) = self.current() else {
            return f.write_str("MediaStatus(no media session)");
        };
        let media = current.media.clone().unwrap_or_default();
        let metadata = media.metadata.clone().unwrap_or_default();
        write!(
            f,
            "MediaStatus(player_state={}, current_time={}, duration={}, content_id={}, \
             title={}, artist={}, idle_reason={})",
            current.player_state,
            opt(current.current_time.as_ref()),
            opt(media.duration.as_ref()),
            opt(media.content_id.as_ref()),
            opt(metadata.title.as_ref()),
            opt(metadata.artist.as_ref()),
            opt(current.idle_reason.as_ref()),
        )
    }
}

fn opt<T: fmt::Display>(value: Option<&T>) -> String {
    value.map_or_else(|| "None".to_string(), ToString::to_string)
}
