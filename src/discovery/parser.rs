//! Parser for Cast TXT record data

use std::collections::HashMap;
use std::net::IpAddr;

use crate::types::CastDevice;

/// Known TXT record keys for `_googlecast._tcp`
pub mod txt_keys {
    /// Device UUID, 32 hex digits without dashes
    pub const ID: &str = "id";
    /// Friendly name
    pub const FRIENDLY_NAME: &str = "fn";
    /// Model name
    pub const MODEL: &str = "md";
    /// Capability bitmask (decimal)
    pub const CAPABILITIES: &str = "ca";
    /// Receiver status flag
    pub const STATUS: &str = "st";
    /// Running application text
    pub const RUNNING_APP: &str = "rs";
    /// Build version
    pub const BUILD_VERSION: &str = "bs";
}

/// Parse `key=value` TXT strings
#[must_use]
pub fn parse_txt_records(records: &[String]) -> HashMap<String, String> {
    records
        .iter()
        .filter_map(|record| {
            let (key, value) = record.split_once('=').unwrap_or((record, ""));
            (!key.is_empty()).then(|| (key.to_string(), value.to_string()))
        })
        .collect()
}

/// Instance name from an mDNS fullname
///
/// `Chromecast-abc123._googlecast._tcp.local.` becomes `Chromecast-abc123`.
#[must_use]
pub fn instance_name(fullname: &str) -> &str {
    let trimmed = fullname.trim();
    trimmed
        .strip_suffix(super::CAST_SERVICE_TYPE)
        .map(|name| name.trim_end_matches('.'))
        .filter(|name| !name.is_empty())
        .unwrap_or(trimmed)
        .trim_matches('.')
}

/// Format a 32-digit hex id as a dashed UUID; other values pass through
#[must_use]
pub fn format_uuid(id: &str) -> String {
    let id = id.trim();
    if id.len() != 32 || !id.chars().all(|c| c.is_ascii_hexdigit()) {
        return id.to_string();
    }
    let id = id.to_ascii_lowercase();
    format!(
        "{}-{}-{}-{}-{}",
        &id[0..8],
        &id[8..12],
        &id[12..16],
        &id[16..20],
        &id[20..32]
    )
}

/// Build a device descriptor from resolved service data
///
/// The friendly name comes from the `fn` record, falling back to the
/// instance name. Returns `None` if the service has no usable address.
#[must_use]
pub fn device_from_txt(
    fullname: &str,
    hostname: &str,
    addresses: Vec<IpAddr>,
    port: u16,
    txt_records: HashMap<String, String>,
) -> Option<CastDevice> {
    if addresses.is_empty() {
        return None;
    }

    let field = |key: &str| {
        txt_records
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(ToString::to_string)
    };

    let name = field(txt_keys::FRIENDLY_NAME)
        .unwrap_or_else(|| instance_name(fullname).to_string());
    let uuid = field(txt_keys::ID).map(|id| format_uuid(&id));
    let model = field(txt_keys::MODEL);
    let capabilities = field(txt_keys::CAPABILITIES)
        .and_then(|ca| ca.parse::<u32>().ok())
        .unwrap_or_default();

    let mut addresses = addresses;
    addresses.sort();
    addresses.dedup();

    Some(CastDevice {
        name,
        uuid,
        model,
        host: hostname.trim_end_matches('.').to_string(),
        addresses,
        port,
        capabilities,
        txt_records,
    })
}
