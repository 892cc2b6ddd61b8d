use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use parking_lot::RwLock;
use tokio::sync::{broadcast, watch};

use super::{Advertisement, DiscoveryEvent, Resolution};
use crate::types::CastDevice;

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Default)]
struct Entries {
    devices: HashMap<String, CastDevice>,
    // mDNS fullname -> friendly name
    fullnames: HashMap<String, String>,
}

/// Devices currently visible on the network
///
/// Writers replace whole entries under the write lock. Every applied change
/// bumps a generation counter that waiters watch.
#[derive(Debug)]
pub(crate) struct DeviceRegistry {
    filter: HashSet<String>,
    entries: RwLock<Entries>,
    events: broadcast::Sender<DiscoveryEvent>,
    generation: watch::Sender<u64>,
}

impl DeviceRegistry {
    /// Create a registry accepting only `filter` names (empty accepts all)
    pub(crate) fn new(filter: HashSet<String>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (generation, _) = watch::channel(0);
        Self {
            filter,
            entries: RwLock::new(Entries::default()),
            events,
            generation,
        }
    }

    fn accepts(&self, name: &str) -> bool {
        self.filter.is_empty() || self.filter.contains(name)
    }

    /// Apply one advertisement, returning the events it produced
    pub(crate) fn apply(&self, advertisement: Advertisement) -> Vec<DiscoveryEvent> {
        let events = match advertisement {
            Advertisement::Announced { fullname, device } => self.announce(fullname, device),
            Advertisement::Departed { fullname } => self.depart(&fullname),
        };

        if !events.is_empty() {
            self.generation.send_modify(|generation| *generation += 1);
            for event in &events {
                let _ = self.events.send(event.clone());
            }
        }
        events
    }

    fn announce(&self, fullname: String, device: CastDevice) -> Vec<DiscoveryEvent> {
        if !self.accepts(&device.name) {
            tracing::debug!(device = %device.name, "ignoring device outside the filter");
            return Vec::new();
        }

        let mut events = Vec::new();
        let mut entries = self.entries.write();

        // A renamed device keeps its fullname; drop the entry under the old name
        if let Some(previous) = entries.fullnames.insert(fullname, device.name.clone()) {
            if previous != device.name {
                let still_mapped = entries.fullnames.values().any(|name| *name == previous);
                if !still_mapped && entries.devices.remove(&previous).is_some() {
                    tracing::info!(device = %previous, renamed = %device.name, "device renamed");
                    events.push(DiscoveryEvent::Removed(previous));
                }
            }
        }

        match entries.devices.insert(device.name.clone(), device.clone()) {
            None => {
                tracing::info!(
                    device = %device.name,
                    addr = %device.socket_addr(),
                    model = device.model.as_deref().unwrap_or("unknown"),
                    "discovered device"
                );
                events.push(DiscoveryEvent::Added(device));
            }
            Some(old) if old != device => {
                tracing::debug!(device = %device.name, "device updated");
                events.push(DiscoveryEvent::Updated(device));
            }
            Some(_) => {}
        }
        events
    }

    fn depart(&self, fullname: &str) -> Vec<DiscoveryEvent> {
        let mut entries = self.entries.write();
        let Some(name) = entries.fullnames.remove(fullname) else {
            return Vec::new();
        };
        if entries.fullnames.values().any(|other| *other == name) {
            return Vec::new();
        }
        if entries.devices.remove(&name).is_some() {
            tracing::info!(device = %name, "device departed");
            vec![DiscoveryEvent::Removed(name)]
        } else {
            Vec::new()
        }
    }

    /// Snapshot sorted by name
    pub(crate) fn snapshot(&self) -> Vec<CastDevice> {
        let mut devices: Vec<CastDevice> = self.entries.read().devices.values().cloned().collect();
        devices.sort_by(|a, b| a.name.cmp(&b.name));
        devices
    }

    /// Split `names` into resolved and unresolved
    pub(crate) fn resolve(&self, names: &BTreeSet<String>) -> Resolution {
        let entries = self.entries.read();
        let mut resolved = BTreeMap::new();
        let mut unresolved = BTreeSet::new();
        for name in names {
            match entries.devices.get(name) {
                Some(device) => {
                    resolved.insert(name.clone(), device.clone());
                }
                None => {
                    unresolved.insert(name.clone());
                }
            }
        }
        Resolution {
            resolved,
            unresolved,
        }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<DiscoveryEvent> {
        self.events.subscribe()
    }

    pub(crate) fn watch(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }
}
