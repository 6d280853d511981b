//! Duelgram demo battle.
//!
//! Runs a scripted host-vs-challenger battle with a spectator over real
//! loopback sockets, exercising the full stack: handshake, setup, turn
//! resolution, chat relay, and game over.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use duelgram::core::rng::derive_session_seed;
use duelgram::net::message::ChatContent;
use duelgram::net::relay;
use duelgram::{
    BattleEngine, EngineAction, Payload, Phase, Role, Roster, TransportEvent, UdpTransport,
    VERSION,
};

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!("Duelgram v{}", VERSION);
    demo_battle().await
}

/// A scripted three-party session on loopback.
async fn demo_battle() -> Result<()> {
    info!("=== Starting Demo Battle ===");

    let (host_tp, host_rx) = UdpTransport::bind(0).await?;
    let (joiner_tp, joiner_rx) = UdpTransport::bind(0).await?;
    let (spec_tp, spec_rx) = UdpTransport::bind(0).await?;
    let host_addr = host_tp.local_addr()?;

    let entropy = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default();
    let seed = derive_session_seed(entropy, "alice", "bob");
    info!(seed, "host derived the session seed");

    let mut host = BattleEngine::new("alice", Role::Host, Roster::new());
    host.seed_session(seed);
    let host_task = tokio::spawn(run_battler(
        host,
        host_tp,
        host_rx,
        "Emberwing",
        "Flamethrower",
        true,
    ));

    // The challenger knows the host's address out of band here; a real
    // client would have found it via a discovery scan.
    joiner_tp.set_peer(host_addr).await;
    joiner_tp
        .send_reliable(&Payload::HandshakeRequest {
            sender_name: "bob".into(),
        })
        .await?;
    let joiner = BattleEngine::new("bob", Role::Joiner, Roster::new());
    let joiner_task = tokio::spawn(run_battler(
        joiner,
        joiner_tp,
        joiner_rx,
        "Tidehorn",
        "Surf",
        false,
    ));

    spec_tp.set_peer(host_addr).await;
    spec_tp
        .send_reliable(&Payload::SpectatorRequest {
            sender_name: "carol".into(),
        })
        .await?;
    let spectator = BattleEngine::new("carol", Role::Spectator, Roster::new());
    let spectator_task = tokio::spawn(run_spectator(spectator, spec_tp, spec_rx));

    let winner = tokio::time::timeout(Duration::from_secs(60), host_task)
        .await
        .context("demo battle timed out")???;
    let _ = joiner_task.await?;
    let _ = spectator_task.await?;

    info!(winner, "=== Demo Battle Complete ===");
    Ok(())
}

/// Drive one battling side until the battle ends. The same scripted
/// loop serves host and challenger; the host additionally admits the
/// peer and spectators and relays traffic.
async fn run_battler(
    mut engine: BattleEngine,
    transport: UdpTransport,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
    creature: &'static str,
    attack: &'static str,
    is_host: bool,
) -> Result<String> {
    let mut resend_timer = tokio::time::interval(Duration::from_millis(100));
    let mut selected = false;
    let mut greeted = false;

    // The challenger already has a peer and can set up immediately.
    if !is_host {
        for action in engine.select_creature(creature, 1, 1)? {
            perform(&transport, action).await?;
        }
        selected = true;
    }

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { anyhow::bail!("transport closed") };
                match event {
                    TransportEvent::Message(envelope) => {
                        if is_host {
                            match &envelope.payload {
                                Payload::HandshakeRequest { sender_name } => {
                                    info!(sender_name, "challenger connected");
                                    transport.set_peer(envelope.source).await;
                                }
                                Payload::SpectatorRequest { sender_name } => {
                                    info!(sender_name, "spectator admitted");
                                    transport.add_spectator(envelope.source).await;
                                }
                                _ => {
                                    relay::forward(&transport, &envelope).await?;
                                }
                            }
                        }
                        if let Payload::ChatMessage { sender_name, content } = &envelope.payload {
                            log_chat(sender_name, content);
                        }
                        for action in engine.handle_message(&envelope.payload) {
                            perform(&transport, action).await?;
                        }
                    }
                    TransportEvent::ConnectionLost { .. } => {
                        for action in engine.handle_connection_lost() {
                            perform(&transport, action).await?;
                        }
                    }
                }
            }
            _ = resend_timer.tick() => {
                transport.check_resend().await?;
            }
        }

        // The host waits for the handshake before revealing its pick.
        if !selected && transport.peer().await.is_some() {
            for action in engine.select_creature(creature, 1, 1)? {
                perform(&transport, action).await?;
            }
            selected = true;
        }

        if engine.state().phase == Phase::WaitingForMove {
            if !greeted {
                transport
                    .send_reliable(&Payload::ChatMessage {
                        sender_name: engine.player_name().to_string(),
                        content: ChatContent::Text("good luck!".into()),
                    })
                    .await?;
                greeted = true;
            }
            if engine.state().is_my_turn {
                match engine.select_move(attack, false) {
                    Ok(actions) => {
                        for action in actions {
                            perform(&transport, action).await?;
                        }
                    }
                    Err(error) => warn!(%error, "move rejected"),
                }
            }
        }

        if engine.state().phase == Phase::GameOver {
            // Give the final sends a moment to be acknowledged.
            for _ in 0..10 {
                transport.check_resend().await?;
                if transport.pending_count().await == 0 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            return Ok(engine.state().winner.clone().unwrap_or_default());
        }
    }
}

/// Watch the battle through the host relay until it ends.
async fn run_spectator(
    mut engine: BattleEngine,
    transport: UdpTransport,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
) -> Result<()> {
    let mut resend_timer = tokio::time::interval(Duration::from_millis(100));
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { return Ok(()) };
                if let TransportEvent::Message(envelope) = event {
                    if let Payload::ChatMessage { sender_name, content } = &envelope.payload {
                        log_chat(sender_name, content);
                    }
                    for action in engine.handle_message(&envelope.payload) {
                        if let EngineAction::BattleOver { winner, reason } = action {
                            info!(winner, ?reason, "[spectator] battle over");
                            return Ok(());
                        }
                    }
                }
            }
            _ = resend_timer.tick() => {
                transport.check_resend().await?;
            }
        }
    }
}

/// Carry out one engine action: sends go to the wire, events to the log.
async fn perform(transport: &UdpTransport, action: EngineAction) -> Result<()> {
    match action {
        EngineAction::Send(payload) => transport.send_reliable(&payload).await?,
        EngineAction::TurnResolved {
            attacker,
            move_name,
            damage,
            defender_hp,
        } => {
            info!(attacker, move_name, damage, defender_hp, "turn resolved");
        }
        EngineAction::BattleOver { winner, reason } => {
            info!(winner, ?reason, "battle over");
        }
    }
    Ok(())
}

fn log_chat(sender: &str, content: &ChatContent) {
    match content {
        ChatContent::Text(text) => info!("[{sender}]: {text}"),
        ChatContent::Sticker(_) => info!("[{sender}]: [sticker]"),
    }
}
