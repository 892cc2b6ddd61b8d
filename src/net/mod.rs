//! Network layer
//!
//! Opens the byte stream a session runs over. Everything above this module
//! sees a type-erased duplex stream, so tests can substitute an in-memory
//! pipe for the TLS socket.


use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::error::{CastError, Result};
use crate::types::{CastDevice, TransportSecurity};

/// Boxed async read/write for type erasure
pub type BoxedStream = Box<dyn AsyncReadWrite + Send + Unpin>;

/// Combined read/write trait
pub trait AsyncReadWrite: AsyncRead + AsyncWrite {}
impl<T: AsyncRead + AsyncWrite> AsyncReadWrite for T {}

/// Connect to the Cast control port of a device
///
/// # Errors
///
/// Returns `ConnectionTimeout` if the TCP connect plus TLS handshake takes
/// longer than `timeout`, and `ConnectionFailed` if the device refuses or
/// cannot be reached.
pub async fn connect(
    device: &CastDevice,
    security: TransportSecurity,
    timeout: Duration,
) -> Result<BoxedStream> {
    let addr = device.socket_addr();
    tracing::debug!(device = %device.name, %addr, ?security, "connecting");

    match tokio::time::timeout(timeout, establish(device, security)).await {
        Ok(result) => result,
        Err(_) => Err(CastError::ConnectionTimeout {
            device_name: device.name.clone(),
            duration: timeout,
        }),
    }
}

async fn establish(device: &CastDevice, security: TransportSecurity) -> Result<BoxedStream> {
    let tcp = TcpStream::connect(device.socket_addr())
        .await
        .map_err(|e| CastError::ConnectionFailed {
            device_name: device.name.clone(),
            message: format!("TCP connect to {} failed", device.socket_addr()),
            source: Some(Box::new(e)),
        })?;
    let _ = tcp.set_nodelay(true);

    match security {
        TransportSecurity::Plain => Ok(Box::new(tcp)),
        TransportSecurity::Tls => {
            // Cast devices present self-signed certificates
            let connector = native_tls::TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true)
                .build()
                .map_err(|e| CastError::ConnectionFailed {
                    device_name: device.name.clone(),
                    message: "failed to build TLS connector".to_string(),
                    source: Some(Box::new(e)),
                })?;
            let connector = tokio_native_tls::TlsConnector::from(connector);

            let tls = connector
                .connect(&device.host, tcp)
                .await
                .map_err(|e| CastError::ConnectionFailed {
                    device_name: device.name.clone(),
                    message: "TLS handshake failed".to_string(),
                    source: Some(Box::new(e)),
                })?;
            Ok(Box::new(tls))
        }
    }
}
