use std::net::{IpAddr, UdpSocket};

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the stderr subscriber used by both binaries
///
/// Library output and the binary's own target are logged at TRACE.
pub fn init_tracing(binary_target: &str) {
    let filter = filter::Targets::new().with_targets(vec![
        ("metrics_relay", LevelFilter::TRACE),
        (binary_target, LevelFilter::TRACE),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

/// Local address the OS would use to reach `remote` (`host:port`)
///
/// Connecting a UDP socket sends nothing; it only selects a route. `None`
/// when the host cannot be resolved or no route exists.
pub fn local_ip_for(remote: &str) -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect(remote).ok()?;
    socket.local_addr().ok().map(|addr| addr.ip())
}

/// Strip an optional scheme and path, leaving `host:port`
pub fn host_port(address: &str) -> &str {
    let without_scheme = address
        .split_once("://")
        .map_or(address, |(_, rest)| rest);
    without_scheme
        .split_once('/')
        .map_or(without_scheme, |(host, _)| host)
}

/// Base URL for an address given as `host:port` or as a full URL
pub fn base_url(address: &str) -> String {
    let address = address.trim_end_matches('/');
    if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{address}")
    }
}
