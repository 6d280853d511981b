//! Session Discovery
//!
//! Hosts advertise an open session on the limited-broadcast address;
//! prospective joiners listen for a bounded window and collect candidates.
//! Announcements are plain datagrams with no reliability.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::{timeout, Instant};
use tracing::{debug, info};

use crate::net::codec;
use crate::net::message::Payload;
use crate::net::transport::{TransportError, UdpTransport};
use crate::{DEFAULT_PORT, RECV_BUFFER_SIZE};

/// An open session seen during a scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionCandidate {
    /// The announcing host's display name.
    pub host_name: String,
    /// Where to send the handshake.
    pub addr: SocketAddr,
}

/// Broadcast an open-session announcement.
pub async fn announce(transport: &UdpTransport, host_name: &str) -> Result<(), TransportError> {
    transport
        .send_broadcast(&Payload::SessionOpen {
            host_name: host_name.to_string(),
        })
        .await
}

/// Listen on the well-known port for announcements until `window`
/// elapses.
pub async fn scan(window: Duration) -> Result<Vec<SessionCandidate>, TransportError> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT))
        .await
        .map_err(TransportError::BindFailed)?;
    Ok(scan_with(socket, window).await)
}

/// Collect announcements arriving on an already-bound socket. Candidates
/// are deduplicated by source address; the first announcement wins.
pub async fn scan_with(socket: UdpSocket, window: Duration) -> Vec<SessionCandidate> {
    let deadline = Instant::now() + window;
    let mut candidates: Vec<SessionCandidate> = Vec::new();
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        let (len, source) = match timeout(remaining, socket.recv_from(&mut buf)).await {
            Ok(Ok(received)) => received,
            Ok(Err(error)) => {
                debug!(%error, "scan receive failed");
                continue;
            }
            Err(_) => break,
        };

        let payload = codec::decode(&buf[..len]).and_then(|frame| Payload::from_frame(&frame));
        if let Some(Payload::SessionOpen { host_name }) = payload {
            if candidates.iter().any(|c| c.addr == source) {
                continue;
            }
            info!(%source, host_name, "open session found");
            candidates.push(SessionCandidate {
                host_name,
                addr: source,
            });
        }
    }
    candidates
}
