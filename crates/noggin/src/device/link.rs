//! TCP link to the head
//!
//! One `DeviceLink` is created at startup and lives for the whole process;
//! the connection underneath it comes and goes. Sends attempt one reconnect
//! when the link is down, every failure degrades to a boolean result, and a
//! dedicated receive loop forwards the head's text notifications (button
//! presses) to a registered handler.

use crate::config::DeviceConfig;
use crate::device::{codec, discovery, HeadControl};
use parking_lot::{Mutex, RwLock};
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

/// Handler invoked with each inbound text notification
pub type MessageHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Connection state, guarded by one lock around every transition
struct Inner {
    stream: Option<TcpStream>,
    /// Ties each receive loop to the stream it was spawned for, so a stale
    /// loop exiting cannot mark a newer connection as disconnected
    generation: u64,
    /// Last discovered address, reused until a connect against it fails
    resolved: Option<SocketAddr>,
}

/// Link to the actuator/indicator head
pub struct DeviceLink {
    config: DeviceConfig,
    inner: Arc<Mutex<Inner>>,
    handler: Arc<RwLock<Option<MessageHandler>>>,
}

impl DeviceLink {
    /// Create a link; no connection is attempted until [`connect`] or a send
    ///
    /// [`connect`]: DeviceLink::connect
    pub fn new(config: DeviceConfig) -> Self {
        Self {
            config,
            inner: Arc::new(Mutex::new(Inner {
                stream: None,
                generation: 0,
                resolved: None,
            })),
            handler: Arc::new(RwLock::new(None)),
        }
    }

    /// Check whether a live transport handle exists
    pub fn is_connected(&self) -> bool {
        self.inner.lock().stream.is_some()
    }

    /// Register the handler for inbound text notifications
    ///
    /// The handler runs synchronously on the receive-loop thread; it must
    /// not block (the orchestrator spawns session work onto its own thread).
    pub fn set_message_handler<F>(&self, handler: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        *self.handler.write() = Some(Arc::new(handler));
    }

    /// Establish the connection and start the receive loop
    ///
    /// Resolves the head's address (static config, cached discovery result,
    /// or a fresh discovery run), connects with a timeout, then clears the
    /// read timeout so the receive loop blocks indefinitely for data.
    /// Returns `false` on any failure; never panics.
    pub fn connect(&self) -> bool {
        if self.is_connected() {
            return true;
        }

        let Some(addr) = self.resolve_address() else {
            warn!("No address for the head; connect aborted");
            return false;
        };

        let stream = match TcpStream::connect_timeout(&addr, self.config.connect_timeout()) {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Failed to connect to {}: {}", addr, e);
                // Force rediscovery next time; the device may have moved
                self.inner.lock().resolved = None;
                return false;
            }
        };

        if let Err(e) = stream.set_read_timeout(None) {
            warn!("Failed to clear read timeout: {}", e);
            return false;
        }
        let _ = stream.set_nodelay(true);

        let reader = match stream.try_clone() {
            Ok(reader) => reader,
            Err(e) => {
                warn!("Failed to clone stream for receive loop: {}", e);
                return false;
            }
        };

        let generation = {
            let mut inner = self.inner.lock();
            inner.generation += 1;
            inner.stream = Some(stream);
            inner.resolved = Some(addr);
            inner.generation
        };

        self.spawn_receive_loop(reader, generation);
        info!("Connected to head at {}", addr);
        true
    }

    /// Close the connection, if any
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        if let Some(stream) = inner.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
            info!("Link closed");
        }
    }

    /// Build and write one frame, reconnecting once if the link is down
    ///
    /// Any write failure marks the link disconnected and returns `false`.
    pub fn send(&self, cmd: u8, payload: &[u8]) -> bool {
        if !self.is_connected() && !self.connect() {
            debug!("Send of cmd 0x{:02X} dropped: not connected", cmd);
            return false;
        }

        let frame = codec::encode(cmd, payload);

        let mut inner = self.inner.lock();
        let Some(stream) = inner.stream.as_mut() else {
            return false;
        };

        match stream.write_all(&frame).and_then(|_| stream.flush()) {
            Ok(()) => true,
            Err(e) => {
                warn!("Send failed, marking disconnected: {}", e);
                inner.stream = None;
                false
            }
        }
    }

    /// Send a WiFi SSID update; values over 31 bytes are rejected
    pub fn set_ssid(&self, ssid: &str) -> bool {
        match codec::credential_payload(codec::CONFIG_SSID, ssid) {
            Some(payload) => self.send(codec::CMD_CONFIG, &payload),
            None => {
                warn!("SSID too long ({} bytes), not sent", ssid.len());
                false
            }
        }
    }

    /// Send a WiFi password update; values over 31 bytes are rejected
    pub fn set_password(&self, password: &str) -> bool {
        match codec::credential_payload(codec::CONFIG_PASSWORD, password) {
            Some(payload) => self.send(codec::CMD_CONFIG, &payload),
            None => {
                warn!("Password too long ({} bytes), not sent", password.len());
                false
            }
        }
    }

    /// Ask the head to reboot
    ///
    /// On success the link is closed immediately: the device drops the
    /// connection to reboot, and a later `connect` re-resolves it.
    pub fn reboot(&self) -> bool {
        let sent = self.send(codec::CMD_CONFIG, &codec::reboot_payload());
        if sent {
            info!("Reboot requested, closing link");
            self.close();
            self.inner.lock().resolved = None;
        }
        sent
    }

    fn resolve_address(&self) -> Option<SocketAddr> {
        if let Some(address) = &self.config.address {
            return match address.to_socket_addrs() {
                Ok(mut addrs) => addrs.next(),
                Err(e) => {
                    warn!("Invalid static address {:?}: {}", address, e);
                    None
                }
            };
        }

        if let Some(addr) = self.inner.lock().resolved {
            return Some(addr);
        }

        discovery::resolve(&self.config)
    }

    /// Receive loop: best-effort text decode, synchronous handler dispatch
    ///
    /// A zero-length read is a peer-initiated disconnect; both it and read
    /// errors mark the link disconnected (if this loop's stream is still the
    /// current one) and end the loop.
    fn spawn_receive_loop(&self, mut stream: TcpStream, generation: u64) {
        let inner = Arc::clone(&self.inner);
        let handler = Arc::clone(&self.handler);

        let spawned = thread::Builder::new()
            .name("noggin-link-recv".to_string())
            .spawn(move || {
                let mut buf = [0u8; 1024];
                loop {
                    match stream.read(&mut buf) {
                        Ok(0) => {
                            info!("Head closed the connection");
                            break;
                        }
                        Ok(n) => {
                            let text = String::from_utf8_lossy(&buf[..n]);
                            let msg = text.trim();
                            if msg.is_empty() {
                                continue;
                            }
                            debug!("Head notification: {}", msg);
                            let current = handler.read().clone();
                            if let Some(handler) = current {
                                handler(msg);
                            }
                        }
                        Err(e) => {
                            warn!("Receive loop error: {}", e);
                            break;
                        }
                    }
                }

                let mut inner = inner.lock();
                if inner.generation == generation {
                    inner.stream = None;
                    debug!("Receive loop exited, link marked disconnected");
                }
            });

        if let Err(e) = spawned {
            warn!("Failed to spawn receive loop: {}", e);
        }
    }
}

impl HeadControl for DeviceLink {
    fn set_indicator(&self, index: u8, on: bool) -> bool {
        self.send(codec::CMD_INDICATOR, &codec::indicator_payload(index, on))
    }

    fn set_indicator_level(&self, level: u8) -> bool {
        self.send(
            codec::CMD_INDICATOR,
            &codec::indicator_level_payload(level),
        )
    }

    fn set_servo(&self, index: u8, angle: u8) -> bool {
        self.send(codec::CMD_SERVO, &codec::servo_payload(index, angle))
    }
}

impl Drop for DeviceLink {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_config() -> DeviceConfig {
        DeviceConfig {
            // Reserved port on loopback: connects are refused immediately
            address: Some("127.0.0.1:1".to_string()),
            connect_timeout_ms: 200,
            ..DeviceConfig::default()
        }
    }

    #[test]
    fn test_starts_disconnected() {
        let link = DeviceLink::new(unreachable_config());
        assert!(!link.is_connected());
    }

    #[test]
    fn test_send_fails_without_device() {
        let link = DeviceLink::new(unreachable_config());
        // One reconnect attempt, then boolean failure; no panic
        assert!(!link.set_indicator(4, true));
        assert!(!link.set_servo(2, 90));
        assert!(!link.is_connected());
    }

    #[test]
    fn test_connect_fails_with_bad_static_address() {
        let config = DeviceConfig {
            address: Some("definitely not an address".to_string()),
            ..DeviceConfig::default()
        };
        let link = DeviceLink::new(config);
        assert!(!link.connect());
    }

    #[test]
    fn test_oversized_credentials_rejected_without_send() {
        let link = DeviceLink::new(unreachable_config());
        // Rejected before any connect attempt is made
        assert!(!link.set_ssid(&"s".repeat(32)));
        assert!(!link.set_password(&"p".repeat(40)));
    }
}
