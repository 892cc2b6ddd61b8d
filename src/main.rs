use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use chromecast_monitor::logging::{self, DEFAULT_LOG_FILE, LogOptions};
use chromecast_monitor::{Monitor, MonitorConfig};

/// Log device and media status changes of Chromecasts on the local network
#[derive(Debug, Parser)]
#[command(name = "chromecast-monitor", version, about)]
struct Args {
    /// Friendly names of the Chromecasts to monitor
    chromecasts: Vec<String>,

    /// File that receives a copy of the log
    #[arg(long, default_value = DEFAULT_LOG_FILE)]
    file: PathBuf,

    /// Log debug messages of the monitor
    #[arg(long)]
    show_debug: bool,

    /// Log debug messages of mDNS discovery
    #[arg(long)]
    show_zeroconf_debug: bool,

    /// Seconds to wait for the devices to be discovered
    #[arg(long, default_value_t = 5)]
    discovery_timeout: u64,

    /// Seconds to wait for a connection
    #[arg(long, default_value_t = 10)]
    connect_timeout: u64,

    /// Seconds to wait for the first device status
    #[arg(long, default_value_t = 10)]
    handshake_timeout: u64,
}

impl Args {
    fn config(&self) -> MonitorConfig {
        MonitorConfig::builder()
            .discovery_timeout(Duration::from_secs(self.discovery_timeout))
            .connection_timeout(Duration::from_secs(self.connect_timeout))
            .handshake_timeout(Duration::from_secs(self.handshake_timeout))
            .build()
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if args.chromecasts.is_empty() {
        println!("No chromecasts provided.");
        return ExitCode::FAILURE;
    }

    let options = LogOptions {
        file: args.file.clone(),
        debug: args.show_debug,
        zeroconf_debug: args.show_zeroconf_debug,
    };
    if let Err(e) = logging::init(&options) {
        eprintln!("Failed to set up logging: {e}");
        return ExitCode::FAILURE;
    }
    if args.show_zeroconf_debug {
        tracing::info!("zeroconf debug logging enabled");
    }

    let monitor = match Monitor::start(args.chromecasts.clone(), args.config()).await {
        Ok(monitor) => monitor,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {}
                Err(e) => tracing::error!("cannot listen for Ctrl-C: {e}"),
            }
            shutdown.cancel();
        });
    }

    tracing::info!("monitoring; press Ctrl-C to stop");
    monitor.run_until(shutdown).await;
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["chromecast-monitor", "Living Room"]).unwrap();
        assert_eq!(args.chromecasts, vec!["Living Room".to_string()]);
        assert_eq!(args.file, PathBuf::from("chromecast_monitor.log"));
        assert!(!args.show_debug);

        let config = args.config();
        assert_eq!(config.discovery_timeout, Duration::from_secs(5));
        assert_eq!(config.connection_timeout, Duration::from_secs(10));
        assert_eq!(config.handshake_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_flags() {
        let args = Args::try_parse_from([
            "chromecast-monitor",
            "--file",
            "/tmp/cast.log",
            "--show-debug",
            "--show-zeroconf-debug",
            "--discovery-timeout",
            "2",
            "Kitchen",
            "Den",
        ])
        .unwrap();
        assert_eq!(args.chromecasts, vec!["Kitchen".to_string(), "Den".to_string()]);
        assert!(args.show_debug);
        assert!(args.show_zeroconf_debug);
        assert_eq!(args.config().discovery_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_no_names_parses() {
        let args = Args::try_parse_from(["chromecast-monitor"]).unwrap();
        assert!(args.chromecasts.is_empty());
    }
}
