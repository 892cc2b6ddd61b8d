//! Log output setup for the binary
//!
//! Everything goes to stdout with ANSI colours and, without colours, to an
//! append-only log file.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::error::{CastError, Result};

/// Default log file name
pub const DEFAULT_LOG_FILE: &str = "chromecast_monitor.log";

/// Log output options
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// File that receives a copy of every log line
    pub file: PathBuf,
    /// Debug level for this crate
    pub debug: bool,
    /// Debug level for the mDNS crate
    pub zeroconf_debug: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            file: PathBuf::from(DEFAULT_LOG_FILE),
            debug: false,
            zeroconf_debug: false,
        }
    }
}

/// Filter directives for `options`; a non-empty `env` value wins
#[must_use]
pub fn filter_directives(options: &LogOptions, env: Option<&str>) -> String {
    if let Some(env) = env.map(str::trim).filter(|env| !env.is_empty()) {
        return env.to_string();
    }

    let mut directives = vec![
        "warn".to_string(),
        if options.debug {
            "chromecast_monitor=debug".to_string()
        } else {
            "chromecast_monitor=info".to_string()
        },
    ];
    if options.zeroconf_debug {
        directives.push("mdns_sd=debug".to_string());
    }
    directives.join(",")
}

/// Build the subscriber without installing it
///
/// # Errors
///
/// Returns `IoError` if the log file cannot be opened and
/// `InvalidParameter` if the filter does not parse.
pub fn subscriber(
    options: &LogOptions,
) -> Result<impl tracing::Subscriber + Send + Sync + 'static> {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let directives = filter_directives(options, env.as_deref());
    let filter = EnvFilter::try_new(&directives).map_err(|e| CastError::InvalidParameter {
        name: EnvFilter::DEFAULT_ENV.to_string(),
        message: format!("invalid log filter {directives:?}: {e}"),
    })?;

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&options.file)
        .map_err(|e| CastError::IoError {
            message: format!("cannot open log file {}", options.file.display()),
            source: Some(Box::new(e)),
        })?;

    Ok(tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(Mutex::new(file)),
        ))
}

/// Install the global subscriber
///
/// # Errors
///
/// Fails like [`subscriber`], or with `InvalidState` if a global subscriber
/// is already set.
pub fn init(options: &LogOptions) -> Result<()> {
    subscriber(options)?
        .try_init()
        .map_err(|e| CastError::InvalidState {
            message: format!("logging already initialised: {e}"),
            current_state: "initialised".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::{LoggingListener, StatusListener};
    use crate::types::{ChannelKind, EventPayload, MediaStatus, ReceiverStatus, StatusEvent};

    #[test]
    fn test_default_filter() {
        let options = LogOptions::default();
        assert_eq!(filter_directives(&options, None), "warn,chromecast_monitor=info");
    }

    #[test]
    fn test_debug_flags() {
        let options = LogOptions {
            debug: true,
            zeroconf_debug: true,
            ..LogOptions::default()
        };
        assert_eq!(
            filter_directives(&options, Some("  ")),
            "warn,chromecast_monitor=debug,mdns_sd=debug"
        );
    }

    #[test]
    fn test_env_overrides_flags() {
        let options = LogOptions {
            debug: true,
            ..LogOptions::default()
        };
        assert_eq!(filter_directives(&options, Some("trace")), "trace");
    }

    #[test]
    fn test_events_reach_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let options = LogOptions {
            file: dir.path().join("monitor.log"),
            ..LogOptions::default()
        };
        let subscriber = subscriber(&options).unwrap();

        tracing::subscriber::with_default(subscriber, || {
            let listener = LoggingListener;
            listener.new_cast_status(&StatusEvent {
                channel: ChannelKind::Device,
                device: "Kitchen".to_string(),
                payload: EventPayload::DeviceStatus(ReceiverStatus::default()),
                timestamp: chrono::Utc::now(),
            });
            listener.new_media_status(&StatusEvent {
                channel: ChannelKind::Media,
                device: "Kitchen".to_string(),
                payload: EventPayload::MediaStatus(MediaStatus::default()),
                timestamp: chrono::Utc::now(),
            });
            tracing::debug!("not logged at the default level");
        });

        let contents = std::fs::read_to_string(&options.file).unwrap();
        assert!(contents.contains("chromecast_monitor::status"));
        assert!(contents.contains("status change: CastStatus("));
        assert!(contents.contains("chromecast_monitor::media"));
        assert!(contents.contains("media change: MediaStatus(no media session)"));
        assert!(contents.contains("device=Kitchen"));
        assert!(!contents.contains("not logged"));
        assert!(!contents.contains('\u{1b}'));
    }
}
