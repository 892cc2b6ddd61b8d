//! Test doubles for Cast devices and mDNS
//!
//! [`mock_device::MockCastDevice`] speaks the device side of the Cast
//! control channel over plain TCP or an in-memory duplex pipe.
//! [`mock_discovery::MockAdvertiser`] feeds a [`DiscoveryService`] without
//! touching the network.
//!
//! [`DiscoveryService`]: crate::discovery::DiscoveryService

pub mod mock_device;
pub mod mock_discovery;
pub mod recording;

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::net::IpAddr;

use crate::types::{CastDevice, capability_bits};

pub use mock_device::{MockCastDevice, MockDeviceConfig};
pub use mock_discovery::MockAdvertiser;
pub use recording::RecordingListener;

/// Helper to create a `CastDevice` for testing
///
/// This bypasses discovery and directly populates fields.
#[must_use]
pub fn create_test_device(name: &str, address: IpAddr, port: u16) -> CastDevice {
    let mut txt_records = HashMap::new();
    txt_records.insert("fn".to_string(), name.to_string());
    txt_records.insert("md".to_string(), "Chromecast".to_string());

    CastDevice {
        name: name.to_string(),
        uuid: None,
        model: Some("Chromecast".to_string()),
        host: format!("{}.local", name.to_lowercase().replace(' ', "-")),
        addresses: vec![address],
        port,
        capabilities: capability_bits::VIDEO_OUT | capability_bits::AUDIO_OUT,
        txt_records,
    }
}
