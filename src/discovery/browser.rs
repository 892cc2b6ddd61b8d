use std::collections::HashMap;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;

use super::{Advertisement, CAST_SERVICE_TYPE, parser};
use crate::error::CastError;

/// Start browsing for Cast devices on the local network
///
/// The mDNS daemon lives as long as the returned stream.
///
/// # Errors
///
/// Returns an error if the mDNS daemon cannot be initialized.
pub(crate) fn browse() -> Result<BrowserStream, CastError> {
    BrowserStream::new()
}

/// Stream of advertisements backed by an mDNS daemon
pub(crate) struct BrowserStream {
    mdns: mdns_sd::ServiceDaemon,
    stream: Box<dyn Stream<Item = mdns_sd::ServiceEvent> + Send + Unpin>,
}

impl BrowserStream {
    fn new() -> Result<Self, CastError> {
        let mdns = mdns_sd::ServiceDaemon::new().map_err(|e| CastError::DiscoveryFailed {
            message: format!("failed to create mDNS daemon: {e}"),
            source: None,
        })?;

        let receiver = match mdns.browse(CAST_SERVICE_TYPE) {
            Ok(receiver) => receiver,
            Err(e) => {
                let _ = mdns.shutdown();
                return Err(CastError::DiscoveryFailed {
                    message: format!("failed to browse {CAST_SERVICE_TYPE}: {e}"),
                    source: None,
                });
            }
        };

        tracing::debug!(service = CAST_SERVICE_TYPE, "mDNS browse started");

        Ok(Self {
            mdns,
            stream: Box::new(receiver.into_stream()),
        })
    }

    fn process_event(event: mdns_sd::ServiceEvent) -> Option<Advertisement> {
        match event {
            mdns_sd::ServiceEvent::ServiceResolved(info) => {
                let fullname = info.get_fullname().to_string();
                match device_from_service(&info) {
                    Some(device) => Some(Advertisement::Announced { fullname, device }),
                    None => {
                        tracing::debug!(%fullname, "resolved service has no address");
                        None
                    }
                }
            }
            mdns_sd::ServiceEvent::ServiceRemoved(_, fullname) => {
                Some(Advertisement::Departed { fullname })
            }
            _ => None,
        }
    }
}

fn device_from_service(info: &mdns_sd::ServiceInfo) -> Option<crate::types::CastDevice> {
    let txt_records: HashMap<String, String> = info
        .get_properties()
        .iter()
        .map(|prop| (prop.key().to_string(), prop.val_str().to_string()))
        .collect();

    parser::device_from_txt(
        info.get_fullname(),
        info.get_hostname(),
        info.get_addresses().iter().copied().collect(),
        info.get_port(),
        txt_records,
    )
}

impl Stream for BrowserStream {
    type Item = Advertisement;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            let event = match Pin::new(&mut self.stream).poll_next(cx) {
                Poll::Ready(Some(event)) => event,
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            };

            if let Some(advertisement) = Self::process_event(event) {
                return Poll::Ready(Some(advertisement));
            }
        }
    }
}

impl Drop for BrowserStream {
    fn drop(&mut self) {
        let _ = self.mdns.stop_browse(CAST_SERVICE_TYPE);
        let _ = self.mdns.shutdown();
        tracing::debug!("mDNS daemon released");
    }
}
