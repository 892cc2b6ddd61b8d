//! Common test utilities
#![allow(dead_code)]

use std::sync::Once;
use std::time::Duration;

use chromecast_monitor::{MonitorConfig, TransportSecurity};
use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Initialize test logging (call once per test module)
pub fn init_logging() {
    INIT.call_once(|| {
        let filter = EnvFilter::from_default_env()
            .add_directive("chromecast_monitor=debug".parse().unwrap());

        fmt().with_env_filter(filter).with_test_writer().init();
    });
}

/// Plain-TCP configuration with short timeouts
pub fn test_config() -> MonitorConfig {
    MonitorConfig::builder()
        .discovery_timeout(Duration::from_millis(300))
        .connection_timeout(Duration::from_secs(1))
        .handshake_timeout(Duration::from_secs(1))
        .close_timeout(Duration::from_secs(1))
        .transport(TransportSecurity::Plain)
        .build()
}
