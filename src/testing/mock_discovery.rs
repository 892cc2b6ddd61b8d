//! Simulated advertisement source

use futures::Stream;
use tokio::sync::mpsc;

use crate::discovery::{Advertisement, CAST_SERVICE_TYPE};
use crate::types::CastDevice;

/// mDNS fullname a device would be announced under
#[must_use]
pub fn fullname_for(device: &CastDevice) -> String {
    format!("{}.{CAST_SERVICE_TYPE}", device.name.replace(' ', "-"))
}

/// Pushes advertisements into a discovery service
///
/// ```rust
/// use chromecast_monitor::discovery::DiscoveryService;
/// use chromecast_monitor::testing::{MockAdvertiser, create_test_device};
///
/// # async fn example() {
/// let (advertiser, source) = MockAdvertiser::channel();
/// let discovery = DiscoveryService::start_with_source(source, Vec::<String>::new());
/// advertiser.announce(&create_test_device("Den", [127, 0, 0, 1].into(), 8009));
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MockAdvertiser {
    tx: mpsc::UnboundedSender<Advertisement>,
}

impl MockAdvertiser {
    /// Create an advertiser and the stream it feeds
    #[must_use]
    pub fn channel() -> (Self, impl Stream<Item = Advertisement> + Send + 'static) {
        let (tx, rx) = mpsc::unbounded_channel();
        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|advertisement| (advertisement, rx))
        });
        (Self { tx }, stream)
    }

    /// Send a raw advertisement; false once the stream is gone
    pub fn send(&self, advertisement: Advertisement) -> bool {
        self.tx.send(advertisement).is_ok()
    }

    /// Announce a device under its default fullname
    pub fn announce(&self, device: &CastDevice) -> bool {
        self.send(Advertisement::Announced {
            fullname: fullname_for(device),
            device: device.clone(),
        })
    }

    /// Announce that the device left the network
    pub fn depart(&self, device: &CastDevice) -> bool {
        self.send(Advertisement::Departed {
            fullname: fullname_for(device),
        })
    }
}

/// A source that announces `devices` once and then stays open
pub fn fixed(devices: Vec<CastDevice>) -> impl Stream<Item = Advertisement> + Send + 'static {
    use futures::StreamExt;

    let announcements = devices.into_iter().map(|device| Advertisement::Announced {
        fullname: fullname_for(&device),
        device,
    });
    futures::stream::iter(announcements.collect::<Vec<_>>()).chain(futures::stream::pending())
}
