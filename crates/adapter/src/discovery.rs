//! LAN discovery - session code beacons over UDP broadcast
//!
//! The session code is the host's listening port written in decimal. While
//! seats are open the host sends `"<code>:<host>:<port>"` to the `x.y.z.255`
//! broadcast address of its own subnet, on the code port, every few seconds.
//! A joining client binds the code port and waits for a matching beacon.

use std::fmt;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::str::FromStr;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use crate::types::{BEACON_INTERVAL_SECS, DISCOVERY_RECV_TIMEOUT_SECS};

/// One discovery datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Beacon {
    pub code: u16,
    pub host: Ipv4Addr,
    pub port: u16,
}

impl Beacon {
    pub fn new(host: Ipv4Addr, port: u16) -> Self {
        Self {
            code: port,
            host,
            port,
        }
    }

    pub fn server_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.host, self.port))
    }
}

impl fmt::Display for Beacon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.code, self.host, self.port)
    }
}

impl FromStr for Beacon {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().splitn(3, ':');
        let code = parts.next().ok_or(())?.parse().map_err(|_| ())?;
        let host = parts.next().ok_or(())?.parse().map_err(|_| ())?;
        let port = parts.next().ok_or(())?.parse().map_err(|_| ())?;
        Ok(Self { code, host, port })
    }
}

/// Human-shareable code for a listening port
pub fn session_code(port: u16) -> String {
    port.to_string()
}

/// Parse a code typed by a player
pub fn parse_session_code(code: &str) -> Option<u16> {
    code.trim().parse().ok().filter(|&c| c != 0)
}

/// `x.y.z.255` for the subnet of `ip`
pub fn broadcast_addr(ip: Ipv4Addr) -> Ipv4Addr {
    let [a, b, c, _] = ip.octets();
    Ipv4Addr::new(a, b, c, 255)
}

/// Address of the interface that routes to the internet.
///
/// Connecting a UDP socket sends nothing; it only selects a route.
pub fn local_ipv4() -> Option<Ipv4Addr> {
    let socket = std::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect(("8.8.8.8", 80)).ok()?;
    match socket.local_addr().ok()? {
        SocketAddr::V4(addr) if !addr.ip().is_unspecified() => Some(*addr.ip()),
        _ => None,
    }
}

/// Send `beacon` to `target` every interval while `active` holds true.
///
/// Returns when `shutdown` flips to true or its sender is dropped.
pub async fn run_beacon(
    beacon: Beacon,
    target: SocketAddr,
    mut active: watch::Receiver<bool>,
    mut shutdown: watch::Receiver<bool>,
) -> io::Result<()> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
    socket.set_broadcast(true)?;
    let datagram = beacon.to_string();
    let mut ticker = tokio::time::interval(Duration::from_secs(BEACON_INTERVAL_SECS));
    info!(code = beacon.code, %target, "broadcasting session code");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !*active.borrow() {
                    continue;
                }
                match socket.send_to(datagram.as_bytes(), target).await {
                    Ok(_) => debug!(%target, "beacon sent"),
                    Err(e) => warn!(%target, "beacon send failed: {}", e),
                }
            }
            changed = active.changed() => {
                if changed.is_err() {
                    break;
                }
                if *active.borrow() {
                    info!("seats open, beacon resumed");
                } else {
                    info!("all seats taken, beacon suppressed");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    debug!("beacon stopped");
    Ok(())
}

/// Bind the code port and wait up to `window` for a matching beacon
pub async fn find_server(code: u16, window: Duration) -> io::Result<Option<SocketAddr>> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, code)).await?;
    socket.set_broadcast(true)?;
    listen_for_beacon(
        &socket,
        code,
        window,
        Duration::from_secs(DISCOVERY_RECV_TIMEOUT_SECS),
    )
    .await
}

/// Read datagrams from `socket` until one announces `code` or `window` ends.
///
/// Malformed and foreign datagrams are skipped.
pub async fn listen_for_beacon(
    socket: &UdpSocket,
    code: u16,
    window: Duration,
    recv_timeout: Duration,
) -> io::Result<Option<SocketAddr>> {
    let deadline = Instant::now() + window;
    let mut buf = [0u8; 1024];

    while Instant::now() < deadline {
        let wait = recv_timeout.min(deadline.saturating_duration_since(Instant::now()));
        let (len, from) = match timeout(wait, socket.recv_from(&mut buf)).await {
            Ok(received) => received?,
            Err(_) => continue,
        };
        let text = String::from_utf8_lossy(&buf[..len]);
        match text.parse::<Beacon>() {
            Ok(beacon) if beacon.code == code => {
                info!(%from, server = %beacon.server_addr(), "found session");
                return Ok(Some(beacon.server_addr()));
            }
            Ok(beacon) => debug!(code = beacon.code, "ignoring beacon for another session"),
            Err(()) => debug!(%from, "ignoring malformed datagram"),
        }
    }

    Ok(None)
}
