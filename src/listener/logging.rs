use super::StatusListener;
use crate::types::StatusEvent;

/// Listener that writes every event to the log
///
/// Device events go to target `chromecast_monitor::status`, media events to
/// `chromecast_monitor::media`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingListener;

impl StatusListener for LoggingListener {
    fn new_cast_status(&self, event: &StatusEvent) {
        tracing::info!(
            target: "chromecast_monitor::status",
            device = %event.device,
            channel = %event.channel,
            timestamp = %event.timestamp.to_rfc3339(),
            "status change: {}",
            event.payload
        );
    }

    fn new_media_status(&self, event: &StatusEvent) {
        tracing::info!(
            target: "chromecast_monitor::media",
            device = %event.device,
            channel = %event.channel,
            timestamp = %event.timestamp.to_rfc3339(),
            "media change: {}",
            event.payload
        );
    }
}
