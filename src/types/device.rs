use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

/// Represents a discovered Cast device on the network
#[derive(Debug, Clone, PartialEq)]
pub struct CastDevice {
    /// Friendly name (e.g., "Living Room TV"); unique on the network and used
    /// as the device identifier throughout the crate
    pub name: String,

    /// Device UUID (from the `id` TXT record)
    pub uuid: Option<String>,

    /// Model name (e.g., "Chromecast Ultra")
    pub model: Option<String>,

    /// Resolved mDNS hostname, without the trailing dot
    pub host: String,

    /// Resolved IP addresses
    pub addresses: Vec<IpAddr>,

    /// Cast control port (normally 8009)
    pub port: u16,

    /// Capability bitmask from the `ca` TXT record
    pub capabilities: u32,

    /// Raw TXT record data
    pub txt_records: HashMap<String, String>,
}

/// Capability bits advertised in the `ca` TXT record
pub mod capability_bits {
    /// Can render video
    pub const VIDEO_OUT: u32 = 1 << 0;
    /// Can capture video
    pub const VIDEO_IN: u32 = 1 << 1;
    /// Can render audio
    pub const AUDIO_OUT: u32 = 1 << 2;
    /// Can capture audio
    pub const AUDIO_IN: u32 = 1 << 3;
    /// Is a multizone group
    pub const MULTIZONE_GROUP: u32 = 1 << 5;
}

impl CastDevice {
    /// Get the primary IP address (prefers IPv4 for better connectivity)
    #[must_use]
    pub fn address(&self) -> IpAddr {
        // IPv6 link-local addresses need a scope id we do not carry
        self.addresses
            .iter()
            .find(|addr| addr.is_ipv4())
            .or_else(|| {
                self.addresses
                    .iter()
                    .find(|addr| matches!(addr, IpAddr::V6(v6) if v6.segments()[0] != 0xfe80))
            })
            .or_else(|| self.addresses.first())
            .copied()
            .unwrap_or(IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED))
    }

    /// Socket address of the Cast control channel
    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address(), self.port)
    }

    /// Check if this device renders video
    #[must_use]
    pub fn supports_video(&self) -> bool {
        self.capabilities & capability_bits::VIDEO_OUT != 0
    }

    /// Check if this device is an audio-only receiver
    #[must_use]
    pub fn is_audio_only(&self) -> bool {
        self.capabilities & capability_bits::AUDIO_OUT != 0 && !self.supports_video()
    }

    /// Check if this entry is a speaker group rather than a physical device
    #[must_use]
    pub fn is_group(&self) -> bool {
        self.capabilities & capability_bits::MULTIZONE_GROUP != 0
    }
}
