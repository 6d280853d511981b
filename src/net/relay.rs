//! Host Relay
//!
//! The host forwards chat and game-progression traffic so spectators see
//! the battle and spectator chat reaches the active peer. Forwards are
//! re-framed with a fresh sequence number but left untracked; spectator
//! delivery is best-effort.

use std::net::SocketAddr;

use tracing::debug;

use crate::net::message::Payload;
use crate::net::transport::{Envelope, TransportError, UdpTransport};

/// Whether the host forwards this message kind at all.
///
/// Handshakes, spectator admission, discovery announcements, and ACKs are
/// point-to-point and never relayed.
pub fn is_relayable(payload: &Payload) -> bool {
    matches!(
        payload,
        Payload::BattleSetup { .. }
            | Payload::AttackAnnounce { .. }
            | Payload::DefenseAnnounce
            | Payload::CalculationReport(_)
            | Payload::CalculationConfirm
            | Payload::ResolutionRequest { .. }
            | Payload::GameOver { .. }
            | Payload::ChatMessage { .. }
    )
}

/// Everyone who should see a message from `source`: the active peer and
/// all spectators, minus the source itself.
pub fn relay_targets(
    source: SocketAddr,
    peer: Option<SocketAddr>,
    spectators: &[SocketAddr],
) -> Vec<SocketAddr> {
    peer.into_iter()
        .chain(spectators.iter().copied())
        .filter(|&addr| addr != source)
        .collect()
}

/// Forward an inbound message to everyone else in the session. Returns
/// how many copies went out.
pub async fn forward(
    transport: &UdpTransport,
    envelope: &Envelope,
) -> Result<usize, TransportError> {
    if !is_relayable(&envelope.payload) {
        return Ok(0);
    }

    let targets = relay_targets(
        envelope.source,
        transport.peer().await,
        &transport.spectators().await,
    );
    for &target in &targets {
        transport.send_relay(target, &envelope.payload).await?;
    }
    if !targets.is_empty() {
        debug!(
            msg_type = envelope.payload.wire_type(),
            copies = targets.len(),
            "relayed"
        );
    }
    Ok(targets.len())
}
