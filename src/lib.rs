//! # chromecast-monitor
//!
//! Discover Google Cast devices on the local network and follow their
//! device and media status.
//!
//! ## Features
//!
//! - Continuous mDNS discovery with add/update/remove notifications
//! - Persistent Cast v2 control sessions with heartbeat supervision
//! - Two ordered, timestamped event channels per device
//! - Pluggable event sinks via [`StatusListener`]
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use chromecast_monitor::{
//!     ChannelKind, DiscoveryService, LoggingListener, MonitorConfig, SessionSelector,
//! };
//!
//! # async fn example() -> Result<(), chromecast_monitor::CastError> {
//! let discovery = DiscoveryService::start(["Living Room"])?;
//! let selection = SessionSelector::new(&discovery, MonitorConfig::default())
//!     .resolve(["Living Room"])
//!     .await?;
//!
//! for session in &selection.sessions {
//!     session.register(ChannelKind::Device, Arc::new(LoggingListener))?;
//!     session.register(ChannelKind::Media, Arc::new(LoggingListener))?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - **Discovery**: [`DiscoveryService`] keeps the registry of visible devices
//! - **Sessions**: [`CastSession`] owns one control connection and its
//!   dispatcher task
//! - **Delivery**: each session routes events through its own listener
//!   registry to at most one [`StatusListener`] per channel
//! - **Orchestration**: [`SessionSelector`] and [`Monitor`] tie the above
//!   together

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Public modules
/// Error types
pub mod error;
/// Core types
pub mod types;

/// Testing utilities
pub mod testing;

pub mod discovery;
pub mod listener;
pub mod logging;
pub mod monitor;
pub mod net;
pub mod protocol;
pub mod selector;
pub mod session;

// Re-exports
pub use discovery::{DiscoveryEvent, DiscoveryService, Resolution, scan};
pub use error::{CastError, Result};
pub use listener::{LoggingListener, StatusListener};
pub use monitor::Monitor;
pub use selector::{FailedDevice, Selection, SessionSelector};
pub use session::{CastSession, SessionState};
pub use types::{
    CastDevice, ChannelKind, DisconnectReason, EventPayload, MediaStatus, MonitorConfig,
    ReceiverStatus, StatusEvent, TransportSecurity,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude for common imports
///
/// Convenient re-exports
pub mod prelude {
    pub use crate::{
        CastDevice, CastError, CastSession, ChannelKind, DiscoveryService, EventPayload,
        LoggingListener, Monitor, MonitorConfig, SessionSelector, StatusEvent, StatusListener,
    };
}
