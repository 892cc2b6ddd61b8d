//! Core types module

mod config;
mod device;
mod status;


pub use config::{MIN_HEARTBEAT_INTERVAL, MonitorConfig, MonitorConfigBuilder, TransportSecurity};
pub use device::{CastDevice, capability_bits};
pub use status::{
    AppNamespace, Application, ChannelKind, DisconnectReason, EventPayload, MediaInformation,
    MediaMetadata, MediaSessionStatus, MediaStatus, ReceiverStatus, StatusEvent, Volume,
};
