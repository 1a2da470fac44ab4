//! Fake head - device simulator for development without hardware
//!
//! Listens on TCP like the real head firmware, advertises itself over mDNS
//! so discovery finds it, decodes and logs every inbound frame, and sends a
//! `BUTTON_PRESS` notification when `b` is entered on stdin.

use anyhow::Context;
use mdns_sd::{ServiceDaemon, ServiceInfo};
use noggin::device::codec;
use parking_lot::Mutex;
use std::io::{BufRead, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_PORT: u16 = 1234;

/// Render a decoded frame the way the firmware would act on it
fn describe(frame: &codec::Frame) -> String {
    match (frame.cmd, frame.payload.as_slice()) {
        (codec::CMD_INDICATOR, [codec::INDICATOR_LEVEL, level]) => {
            format!("indicator level -> {}", level)
        }
        (codec::CMD_INDICATOR, [index, on]) => {
            format!("indicator {} -> {}", index, if *on != 0 { "on" } else { "off" })
        }
        (codec::CMD_SERVO, [index, angle]) => format!("servo {} -> {}°", index, angle),
        (codec::CMD_CONFIG, [codec::CONFIG_SSID, ssid @ ..]) => {
            format!("set ssid {:?}", String::from_utf8_lossy(ssid))
        }
        (codec::CMD_CONFIG, [codec::CONFIG_PASSWORD, password @ ..]) => {
            format!("set password ({} bytes)", password.len())
        }
        (codec::CMD_CONFIG, [codec::CONFIG_REBOOT]) => "reboot".to_string(),
        (cmd, payload) => format!("unknown cmd 0x{:02X} payload {:02X?}", cmd, payload),
    }
}

/// Serve one client connection until it closes
fn serve_client(mut stream: TcpStream) {
    let peer = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    info!("Controller connected from {}", peer);

    let mut pending = Vec::new();
    let mut buf = [0u8; 1024];

    loop {
        match stream.read(&mut buf) {
            Ok(0) => {
                info!("Controller {} disconnected", peer);
                return;
            }
            Ok(n) => {
                pending.extend_from_slice(&buf[..n]);
                while let Some((frame, consumed)) = codec::decode(&pending) {
                    info!("{}", describe(&frame));
                    pending.drain(..consumed);
                }
            }
            Err(e) => {
                warn!("Read error from {}: {}", peer, e);
                return;
            }
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "noggin=info,noggin_fake_head=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let port = std::env::args()
        .nth(1)
        .map(|arg| arg.parse::<u16>())
        .transpose()
        .context("parsing port argument")?
        .unwrap_or(DEFAULT_PORT);

    let service_type = noggin::DeviceConfig::default().service_type;

    let listener =
        TcpListener::bind(("0.0.0.0", port)).with_context(|| format!("binding port {}", port))?;
    info!("Fake head listening on port {}", port);

    // Advertise over mDNS so the controller's discovery finds us
    let daemon = ServiceDaemon::new().context("starting mDNS daemon")?;
    let service = ServiceInfo::new(
        &service_type,
        "noggin-head",
        "noggin-head.local.",
        "",
        port,
        &[("model", "fake")][..],
    )
    .context("building mDNS service info")?
    .enable_addr_auto();
    daemon.register(service).context("registering mDNS service")?;
    info!("Advertising {} on mDNS", service_type);

    // Current client, shared with the stdin thread for button injection
    let client: Arc<Mutex<Option<TcpStream>>> = Arc::new(Mutex::new(None));

    let button_client = Arc::clone(&client);
    thread::spawn(move || {
        println!("Type b to press the button, q to quit");
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            match line.trim() {
                "b" => {
                    let mut slot = button_client.lock();
                    match slot.as_mut() {
                        Some(stream) => {
                            if stream.write_all(b"BUTTON_PRESS\n").is_ok() {
                                info!("Sent BUTTON_PRESS");
                            } else {
                                warn!("Button send failed; controller gone?");
                                *slot = None;
                            }
                        }
                        None => warn!("No controller connected"),
                    }
                }
                "q" => std::process::exit(0),
                other => {
                    if !other.is_empty() {
                        warn!("Unknown command {:?}", other);
                    }
                }
            }
        }
    });

    for incoming in listener.incoming() {
        match incoming {
            Ok(stream) => {
                match stream.try_clone() {
                    Ok(clone) => *client.lock() = Some(clone),
                    Err(e) => warn!("Could not retain client for button injection: {}", e),
                }
                serve_client(stream);
                *client.lock() = None;
            }
            Err(e) => warn!("Accept failed: {}", e),
        }
    }

    Ok(())
}
