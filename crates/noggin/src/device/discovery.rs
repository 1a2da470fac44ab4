//! mDNS resolution of the head's network address
//!
//! The head advertises a fixed service type on the local network. Each
//! discovery attempt browses for that type with a bounded timeout; a small
//! number of attempts are made with a short delay in between, since the
//! device answers unreliably while it is busy driving servos.

use crate::config::DeviceConfig;
use mdns_sd::{ServiceDaemon, ServiceEvent};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Resolve the head's address via mDNS
///
/// Returns the first resolved address, or `None` when every attempt timed
/// out or failed. Never panics; daemon errors are logged and treated as a
/// failed attempt.
pub fn resolve(config: &DeviceConfig) -> Option<SocketAddr> {
    for attempt in 1..=config.discovery_attempts {
        debug!(
            "Discovery attempt {}/{} for {}",
            attempt, config.discovery_attempts, config.service_type
        );

        match browse_once(&config.service_type, config.discovery_timeout()) {
            Some(addr) => {
                info!("Resolved {} to {}", config.service_type, addr);
                return Some(addr);
            }
            None => {
                if attempt < config.discovery_attempts {
                    std::thread::sleep(config.discovery_retry_delay());
                }
            }
        }
    }

    warn!(
        "Discovery failed after {} attempts for {}",
        config.discovery_attempts, config.service_type
    );
    None
}

/// Run a single bounded browse for the service type
fn browse_once(service_type: &str, timeout: Duration) -> Option<SocketAddr> {
    let daemon = match ServiceDaemon::new() {
        Ok(daemon) => daemon,
        Err(e) => {
            warn!("Failed to start mDNS daemon: {}", e);
            return None;
        }
    };

    let receiver = match daemon.browse(service_type) {
        Ok(receiver) => receiver,
        Err(e) => {
            warn!("Failed to browse {}: {}", service_type, e);
            let _ = daemon.shutdown();
            return None;
        }
    };

    let deadline = Instant::now() + timeout;
    let mut resolved = None;

    while resolved.is_none() {
        let remaining = match deadline.checked_duration_since(Instant::now()) {
            Some(remaining) if !remaining.is_zero() => remaining,
            _ => break,
        };

        match receiver.recv_timeout(remaining) {
            Ok(ServiceEvent::ServiceResolved(info)) => {
                resolved = info
                    .get_addresses()
                    .iter()
                    .next()
                    .map(|addr| SocketAddr::new(*addr, info.get_port()));
            }
            Ok(event) => {
                debug!("Discovery event: {:?}", event);
            }
            Err(_) => break,
        }
    }

    let _ = daemon.stop_browse(service_type);
    let _ = daemon.shutdown();
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;

    #[test]
    fn test_resolve_times_out_without_service() {
        // Nothing advertises this type; all attempts must time out quickly
        // and return None instead of hanging or panicking.
        let config = DeviceConfig {
            service_type: "_noggin-test-absent._tcp.local.".to_string(),
            discovery_timeout_ms: 100,
            discovery_attempts: 2,
            discovery_retry_delay_ms: 10,
            ..DeviceConfig::default()
        };

        let started = Instant::now();
        assert!(resolve(&config).is_none());
        // Two 100 ms attempts plus one 10 ms delay, with generous slack
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
