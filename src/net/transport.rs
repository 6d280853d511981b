//! UDP Transport
//!
//! Socket wiring around the reliability core: a bound UDP socket, a
//! dedicated receive task feeding an event channel, and the reliable /
//! fire-and-forget / broadcast send paths. All policy lives in
//! [`crate::net::reliability`]; this module only moves bytes.

use std::collections::BTreeSet;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::net::codec::{self, KEY_SEQ_NUM};
use crate::net::message::{Payload, MSG_ACK};
use crate::net::reliability::{ReliabilityState, SweepAction};
use crate::{DEFAULT_PORT, RECV_BUFFER_SIZE};

/// Transport errors.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind the UDP socket.
    #[error("Failed to bind: {0}")]
    BindFailed(std::io::Error),

    /// A socket send failed.
    #[error("Send failed: {0}")]
    SendFailed(#[from] std::io::Error),
}

/// A decoded inbound message tagged with its source address.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    /// Where the datagram came from.
    pub source: SocketAddr,
    /// The decoded message.
    pub payload: Payload,
}

/// What the transport surfaces to the session layer.
#[derive(Clone, Debug, PartialEq)]
pub enum TransportEvent {
    /// A fresh (non-duplicate) message arrived.
    Message(Envelope),
    /// A reliable send exhausted its retries; the peer is gone.
    ConnectionLost { sequence: u64 },
}

/// Reliable-messaging UDP endpoint for one session.
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    reliability: Arc<Mutex<ReliabilityState>>,
    peer: Arc<RwLock<Option<SocketAddr>>>,
    spectators: Arc<RwLock<BTreeSet<SocketAddr>>>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl UdpTransport {
    /// Bind to `0.0.0.0:port` with broadcast enabled and start the
    /// receive task. Returns the transport and the event stream it feeds.
    pub async fn bind(
        port: u16,
    ) -> Result<(Self, mpsc::UnboundedReceiver<TransportEvent>), TransportError> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map_err(TransportError::BindFailed)?;
        socket
            .set_broadcast(true)
            .map_err(TransportError::BindFailed)?;

        let socket = Arc::new(socket);
        let reliability = Arc::new(Mutex::new(ReliabilityState::new()));
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let transport = Self {
            socket: Arc::clone(&socket),
            reliability: Arc::clone(&reliability),
            peer: Arc::new(RwLock::new(None)),
            spectators: Arc::new(RwLock::new(BTreeSet::new())),
            events: event_tx.clone(),
        };

        info!(addr = %socket.local_addr().map_err(TransportError::BindFailed)?, "transport bound");
        tokio::spawn(receive_loop(socket, reliability, event_tx));
        Ok((transport, event_rx))
    }

    /// The locally bound address.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.socket.local_addr().map_err(TransportError::SendFailed)
    }

    /// Set the active peer for reliable sends.
    pub async fn set_peer(&self, addr: SocketAddr) {
        *self.peer.write().await = Some(addr);
    }

    /// The active peer, if one is set.
    pub async fn peer(&self) -> Option<SocketAddr> {
        *self.peer.read().await
    }

    /// Record a spectator address for best-effort copies.
    pub async fn add_spectator(&self, addr: SocketAddr) {
        self.spectators.write().await.insert(addr);
        info!(%addr, "spectator added");
    }

    /// Current spectator addresses.
    pub async fn spectators(&self) -> Vec<SocketAddr> {
        self.spectators.read().await.iter().copied().collect()
    }

    /// Fire-and-forget send to an explicit address. No sequence number,
    /// never acknowledged, never retried.
    pub async fn send(&self, addr: SocketAddr, payload: &Payload) -> Result<(), TransportError> {
        send_payload(&self.socket, addr, payload).await?;
        Ok(())
    }

    /// Reliable send to the active peer, with best-effort copies to every
    /// spectator. Assigns a fresh sequence number and tracks the send
    /// until acknowledged. With no peer set this logs and does nothing.
    pub async fn send_reliable(&self, payload: &Payload) -> Result<(), TransportError> {
        let Some(peer) = self.peer().await else {
            warn!(msg_type = payload.wire_type(), "no peer, dropping reliable send");
            return Ok(());
        };

        let mut frame = payload.to_frame();
        let bytes = {
            let mut reliability = self.reliability.lock().await;
            let sequence = reliability.next_sequence();
            frame
                .fields
                .insert(KEY_SEQ_NUM.to_string(), sequence.to_string());
            let bytes = codec::encode(&frame.msg_type, &frame.fields);
            reliability.register(sequence, bytes.clone(), Instant::now());
            bytes
        };

        self.socket.send_to(&bytes, peer).await?;
        for spectator in self.spectators().await {
            // Spectator copies share the peer's framing but are not
            // tracked; a lost copy is acceptable.
            if let Err(error) = self.socket.send_to(&bytes, spectator).await {
                debug!(%spectator, %error, "spectator copy failed");
            }
        }
        Ok(())
    }

    /// Sequenced but untracked send, used by the host's relay fan-out.
    /// The receiver dedups it like any reliable message; delivery is
    /// best-effort.
    pub async fn send_relay(
        &self,
        addr: SocketAddr,
        payload: &Payload,
    ) -> Result<(), TransportError> {
        let mut frame = payload.to_frame();
        let sequence = self.reliability.lock().await.next_sequence();
        frame
            .fields
            .insert(KEY_SEQ_NUM.to_string(), sequence.to_string());
        let bytes = codec::encode(&frame.msg_type, &frame.fields);
        self.socket.send_to(&bytes, addr).await?;
        Ok(())
    }

    /// Unreliable limited broadcast on the well-known port.
    pub async fn send_broadcast(&self, payload: &Payload) -> Result<(), TransportError> {
        let frame = payload.to_frame();
        let bytes = codec::encode(&frame.msg_type, &frame.fields);
        self.socket
            .send_to(&bytes, (Ipv4Addr::BROADCAST, DEFAULT_PORT))
            .await?;
        Ok(())
    }

    /// Sweep the pending table: retransmit stale sends and surface a
    /// connection-lost event when retries run out. Call periodically.
    pub async fn check_resend(&self) -> Result<(), TransportError> {
        let actions = self.reliability.lock().await.sweep(Instant::now());
        if actions.is_empty() {
            return Ok(());
        }

        let peer = self.peer().await;
        for action in actions {
            match action {
                SweepAction::Retransmit { bytes, .. } => {
                    if let Some(peer) = peer {
                        self.socket.send_to(&bytes, peer).await?;
                    }
                }
                SweepAction::GiveUp { sequence } => {
                    let _ = self.events.send(TransportEvent::ConnectionLost { sequence });
                }
            }
        }
        Ok(())
    }

    /// Unacknowledged reliable sends still in flight.
    pub async fn pending_count(&self) -> usize {
        self.reliability.lock().await.pending_count()
    }

    /// Drop all session state: peer, spectators, sequence counter, and
    /// the dedup set.
    pub async fn reset_session(&self) {
        *self.peer.write().await = None;
        self.spectators.write().await.clear();
        self.reliability.lock().await.reset();
        info!("session reset");
    }
}

/// Encode and emit one unsequenced datagram.
async fn send_payload(
    socket: &UdpSocket,
    addr: SocketAddr,
    payload: &Payload,
) -> std::io::Result<()> {
    let frame = payload.to_frame();
    let bytes = codec::encode(&frame.msg_type, &frame.fields);
    socket.send_to(&bytes, addr).await?;
    Ok(())
}

/// Blocks on the socket, acknowledges, dedups, decodes, queues.
async fn receive_loop(
    socket: Arc<UdpSocket>,
    reliability: Arc<Mutex<ReliabilityState>>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];
    loop {
        let (len, source) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(error) => {
                warn!(%error, "socket receive failed");
                continue;
            }
        };

        let Some(frame) = codec::decode(&buf[..len]) else {
            debug!(%source, "dropping malformed datagram");
            continue;
        };

        if frame.msg_type == MSG_ACK {
            if let Some(ack) = frame.ack_number() {
                reliability.lock().await.acknowledge(ack);
            }
            continue;
        }

        if let Some(sequence) = frame.sequence() {
            // Acknowledge before dedup so a peer whose ACK was lost
            // gets a fresh one for the duplicate.
            let ack = Payload::Ack {
                ack_number: sequence,
            };
            if let Err(error) = send_payload(&socket, source, &ack).await {
                debug!(%source, %error, "ack send failed");
            }

            if !reliability.lock().await.check_dedup(source, sequence) {
                debug!(%source, sequence, "duplicate suppressed");
                continue;
            }
        }

        let Some(payload) = Payload::from_frame(&frame) else {
            debug!(%source, msg_type = %frame.msg_type, "dropping unknown message");
            continue;
        };

        if events
            .send(TransportEvent::Message(Envelope { source, payload }))
            .is_err()
        {
            // Receiver dropped; the session is gone.
            return;
        }
    }
}
