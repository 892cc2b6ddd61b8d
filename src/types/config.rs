use std::time::Duration;

/// Shortest heartbeat interval a session uses
pub const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(10);

/// How the Cast control channel is secured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportSecurity {
    /// TLS without certificate verification (Cast devices use self-signed
    /// certificates)
    #[default]
    Tls,
    /// Plain TCP, for mock devices and debugging proxies
    Plain,
}

/// Configuration for discovery and session behavior
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// How long to wait for requested devices to be announced (default: 5 seconds)
    pub discovery_timeout: Duration,

    /// Timeout for the TCP/TLS connect (default: 10 seconds)
    pub connection_timeout: Duration,

    /// Timeout for the initial receiver status (default: 10 seconds)
    pub handshake_timeout: Duration,

    /// Interval between heartbeat pings (default: 10 seconds)
    pub heartbeat_interval: Duration,

    /// Silence after which the connection is considered lost (default: 30 seconds)
    pub heartbeat_timeout: Duration,

    /// Upper bound a dispatcher waits to enqueue an event for a slow listener
    /// before dropping it (default: 1 second)
    pub sink_timeout: Duration,

    /// Buffered events per channel between dispatcher and listener (default: 64)
    pub listener_queue_depth: usize,

    /// How long `close()` waits for in-flight work to drain (default: 2 seconds)
    pub close_timeout: Duration,

    /// Transport used for the control channel
    pub transport: TransportSecurity,

    /// Source id this sender uses on virtual connections
    pub sender_id: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            discovery_timeout: Duration::from_secs(5),
            connection_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(10),
            heartbeat_timeout: Duration::from_secs(30),
            sink_timeout: Duration::from_secs(1),
            listener_queue_depth: 64,
            close_timeout: Duration::from_secs(2),
            transport: TransportSecurity::Tls,
            sender_id: "sender-0".to_string(),
        }
    }
}

impl MonitorConfig {
    /// Create a new config builder
    #[must_use]
    pub fn builder() -> MonitorConfigBuilder {
        MonitorConfigBuilder::default()
    }
}

/// Builder for `MonitorConfig`
#[derive(Debug, Clone, Default)]
pub struct MonitorConfigBuilder {
    config: MonitorConfig,
}

impl MonitorConfigBuilder {
    /// Set discovery timeout
    #[must_use]
    pub fn discovery_timeout(mut self, timeout: Duration) -> Self {
        self.config.discovery_timeout = timeout;
        self
    }

    /// Set connection timeout
    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_timeout = timeout;
        self
    }

    /// Set handshake timeout
    #[must_use]
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    /// Set heartbeat ping interval and the silence threshold
    ///
    /// The interval is raised to at least [`MIN_HEARTBEAT_INTERVAL`].
    #[must_use]
    pub fn heartbeat(mut self, interval: Duration, timeout: Duration) -> Self {
        self.config.heartbeat_interval = interval.max(MIN_HEARTBEAT_INTERVAL);
        self.config.heartbeat_timeout = timeout;
        self
    }

    /// Set the per-event enqueue budget for slow listeners
    #[must_use]
    pub fn sink_timeout(mut self, timeout: Duration) -> Self {
        self.config.sink_timeout = timeout;
        self
    }

    /// Set listener queue depth (clamped to at least 1)
    #[must_use]
    pub fn listener_queue_depth(mut self, depth: usize) -> Self {
        self.config.listener_queue_depth = depth.max(1);
        self
    }

    /// Set close drain timeout
    #[must_use]
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.config.close_timeout = timeout;
        self
    }

    /// Set transport security
    #[must_use]
    pub fn transport(mut self, transport: TransportSecurity) -> Self {
        self.config.transport = transport;
        self
    }

    /// Set the sender id used on virtual connections
    #[must_use]
    pub fn sender_id(mut self, sender_id: impl Into<String>) -> Self {
        self.config.sender_id = sender_id.into();
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> MonitorConfig {
        self.config
    }
}
