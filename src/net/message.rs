//! Typed Message Model
//!
//! Closed enum over every message kind the session speaks, decoded once at
//! the transport boundary. Everything above the transport works with
//! [`Payload`] values; the `name: value` field maps exist only at the edge.

use serde::{Deserialize, Serialize};

use crate::battle::state::BoostAllocation;
use crate::data::CreatureSnapshot;
use crate::net::codec::{FieldMap, WireFrame, KEY_ACK_NUM};

/// Wire tag for a join request.
pub const MSG_HANDSHAKE_REQUEST: &str = "HANDSHAKE_REQUEST";
/// Wire tag for the host's handshake accept.
pub const MSG_HANDSHAKE_RESPONSE: &str = "HANDSHAKE_RESPONSE";
/// Wire tag for a spectator admission request.
pub const MSG_SPECTATOR_REQUEST: &str = "SPECTATOR_REQUEST";
/// Wire tag for creature setup (and the `status: OPEN` announcement).
pub const MSG_BATTLE_SETUP: &str = "BATTLE_SETUP";
/// Wire tag for an attack commitment.
pub const MSG_ATTACK_ANNOUNCE: &str = "ATTACK_ANNOUNCE";
/// Wire tag for the defender's readiness signal.
pub const MSG_DEFENSE_ANNOUNCE: &str = "DEFENSE_ANNOUNCE";
/// Wire tag for a computed damage claim.
pub const MSG_CALCULATION_REPORT: &str = "CALCULATION_REPORT";
/// Wire tag for accepting the peer's claim.
pub const MSG_CALCULATION_CONFIRM: &str = "CALCULATION_CONFIRM";
/// Wire tag for a discrepancy resolution request.
pub const MSG_RESOLUTION_REQUEST: &str = "RESOLUTION_REQUEST";
/// Wire tag for the terminal battle result.
pub const MSG_GAME_OVER: &str = "GAME_OVER";
/// Wire tag for in-battle chat.
pub const MSG_CHAT_MESSAGE: &str = "CHAT_MESSAGE";
/// Wire tag for transport acknowledgments.
pub const MSG_ACK: &str = "ACK";

/// Field key: sender display name.
pub const KEY_SENDER: &str = "sender_name";
/// Field key: shared session seed.
pub const KEY_SEED: &str = "seed";
/// Field key: handshake or announcement status.
pub const KEY_STATUS: &str = "status";
/// Field key: selected creature name.
pub const KEY_CREATURE_NAME: &str = "creature_name";
/// Field key: serialized creature snapshot.
pub const KEY_CREATURE_DATA: &str = "creature_data";
/// Field key: boost allocation.
pub const KEY_STAT_BOOSTS: &str = "stat_boosts";
/// Field key: advertised speed for turn-order negotiation.
pub const KEY_SPEED: &str = "speed";
/// Field key: move name.
pub const KEY_MOVE_NAME: &str = "move_name";
/// Field key: computed damage.
pub const KEY_DMG_DEALT: &str = "damage_dealt";
/// Field key: predicted defender HP after the damage.
pub const KEY_HP_REMAINING: &str = "defender_hp_remaining";
/// Field key: effectiveness multiplier, scaled by 100.
pub const KEY_TYPE_EFFECT: &str = "type_effectiveness";
/// Field key: the disputing side's own figure.
pub const KEY_CLAIMED_DMG: &str = "claimed_damage";
/// Field key: winning creature name.
pub const KEY_WINNER: &str = "winner_name";
/// Field key: why the battle ended.
pub const KEY_REASON: &str = "game_over_reason";
/// Field key: chat content kind.
pub const KEY_CONTENT_TYPE: &str = "content_type";
/// Field key: chat text body.
pub const KEY_MSG_TEXT: &str = "message_text";
/// Field key: base64 sticker body.
pub const KEY_STICKER_DATA: &str = "sticker_data";

const STATUS_OPEN: &str = "OPEN";
const STATUS_OK: &str = "OK";
const CONTENT_TYPE_TEXT: &str = "TEXT";
const CONTENT_TYPE_STICKER: &str = "STICKER";

/// Why a battle ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameOverReason {
    /// The loser's creature reached zero HP.
    HpZero,
    /// The loser's peer stopped acknowledging.
    Disconnected,
    /// The loser gave up.
    Surrendered,
}

impl GameOverReason {
    fn as_wire(self) -> &'static str {
        match self {
            Self::HpZero => "HP_ZERO",
            Self::Disconnected => "DISCONNECTED",
            Self::Surrendered => "SURRENDERED",
        }
    }

    fn from_wire(value: &str) -> Option<Self> {
        match value {
            "HP_ZERO" => Some(Self::HpZero),
            "DISCONNECTED" => Some(Self::Disconnected),
            "SURRENDERED" => Some(Self::Surrendered),
            _ => None,
        }
    }
}

/// Chat body: plain text or an opaque base64 sticker, passed through
/// unmodified.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatContent {
    /// Plain chat text.
    Text(String),
    /// Base64-encoded sticker image.
    Sticker(String),
}

/// One side's damage claim for a turn.
///
/// Kept verbatim by the sender so a re-assertion is byte-identical to the
/// original report, which is what breaks resolution loops.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CalculationReport {
    /// Move the attacker used.
    pub move_name: String,
    /// Damage the sender computed.
    pub damage_dealt: u32,
    /// Defender HP after applying that damage, by the sender's books.
    pub defender_hp_remaining: u32,
    /// Combined effectiveness multiplier, scaled by 100.
    pub effectiveness_x100: u32,
}

/// Every message kind a session can carry, with typed fields.
///
/// `SessionOpen` is the broadcast discovery form of `BATTLE_SETUP`
/// (`status: OPEN`); it shares the wire tag but never appears inside an
/// established session.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// Joiner asks the host for a session.
    HandshakeRequest { sender_name: String },
    /// Host accepts and supplies the shared seed.
    HandshakeResponse { seed: u64 },
    /// Passive observer asks to be added to the relay set.
    SpectatorRequest { sender_name: String },
    /// Host advertises an open session on the broadcast channel.
    SessionOpen { host_name: String },
    /// A side declares its creature and boost allocation.
    BattleSetup {
        creature_name: String,
        /// Full snapshot when present; receivers fall back to a roster
        /// lookup by name when absent.
        creature_data: Option<CreatureSnapshot>,
        boosts: BoostAllocation,
        /// Advertised for turn-order negotiation.
        speed: Option<u32>,
    },
    /// Attacker commits to a move.
    AttackAnnounce { move_name: String },
    /// Defender signals readiness; no payload.
    DefenseAnnounce,
    /// A side's computed outcome for the turn.
    CalculationReport(CalculationReport),
    /// Peer's report checked out locally.
    CalculationConfirm,
    /// Peer's report did not check out; carries the local non-boosted
    /// figure so the other side can see the disagreement.
    ResolutionRequest { claimed_damage: u32 },
    /// Battle finished.
    GameOver {
        winner_name: String,
        reason: GameOverReason,
    },
    /// In-battle chat, relayed by the host to spectators.
    ChatMessage {
        sender_name: String,
        content: ChatContent,
    },
    /// Transport acknowledgment; consumed by the reliability layer.
    Ack { ack_number: u64 },
}

impl Payload {
    /// The wire `message_type` tag.
    pub fn wire_type(&self) -> &'static str {
        match self {
            Self::HandshakeRequest { .. } => MSG_HANDSHAKE_REQUEST,
            Self::HandshakeResponse { .. } => MSG_HANDSHAKE_RESPONSE,
            Self::SpectatorRequest { .. } => MSG_SPECTATOR_REQUEST,
            Self::SessionOpen { .. } | Self::BattleSetup { .. } => MSG_BATTLE_SETUP,
            Self::AttackAnnounce { .. } => MSG_ATTACK_ANNOUNCE,
            Self::DefenseAnnounce => MSG_DEFENSE_ANNOUNCE,
            Self::CalculationReport(_) => MSG_CALCULATION_REPORT,
            Self::CalculationConfirm => MSG_CALCULATION_CONFIRM,
            Self::ResolutionRequest { .. } => MSG_RESOLUTION_REQUEST,
            Self::GameOver { .. } => MSG_GAME_OVER,
            Self::ChatMessage { .. } => MSG_CHAT_MESSAGE,
            Self::Ack { .. } => MSG_ACK,
        }
    }

    /// Convert to a wire frame. Sequence numbers are the transport's
    /// business and are absent here.
    pub fn to_frame(&self) -> WireFrame {
        let mut fields = FieldMap::new();
        match self {
            Self::HandshakeRequest { sender_name } | Self::SpectatorRequest { sender_name } => {
                fields.insert(KEY_SENDER.into(), sender_name.clone());
            }
            Self::HandshakeResponse { seed } => {
                fields.insert(KEY_SEED.into(), seed.to_string());
                fields.insert(KEY_STATUS.into(), STATUS_OK.into());
            }
            Self::SessionOpen { host_name } => {
                fields.insert(KEY_STATUS.into(), STATUS_OPEN.into());
                fields.insert(KEY_SENDER.into(), host_name.clone());
            }
            Self::BattleSetup {
                creature_name,
                creature_data,
                boosts,
                speed,
            } => {
                fields.insert(KEY_CREATURE_NAME.into(), creature_name.clone());
                if let Some(snapshot) = creature_data {
                    if let Ok(json) = serde_json::to_string(snapshot) {
                        fields.insert(KEY_CREATURE_DATA.into(), json);
                    }
                }
                fields.insert(KEY_STAT_BOOSTS.into(), boosts.to_wire());
                if let Some(speed) = speed {
                    fields.insert(KEY_SPEED.into(), speed.to_string());
                }
            }
            Self::AttackAnnounce { move_name } => {
                fields.insert(KEY_MOVE_NAME.into(), move_name.clone());
            }
            Self::DefenseAnnounce | Self::CalculationConfirm => {}
            Self::CalculationReport(report) => {
                fields.insert(KEY_MOVE_NAME.into(), report.move_name.clone());
                fields.insert(KEY_DMG_DEALT.into(), report.damage_dealt.to_string());
                fields.insert(
                    KEY_HP_REMAINING.into(),
                    report.defender_hp_remaining.to_string(),
                );
                fields.insert(KEY_TYPE_EFFECT.into(), report.effectiveness_x100.to_string());
            }
            Self::ResolutionRequest { claimed_damage } => {
                fields.insert(KEY_CLAIMED_DMG.into(), claimed_damage.to_string());
            }
            Self::GameOver {
                winner_name,
                reason,
            } => {
                fields.insert(KEY_WINNER.into(), winner_name.clone());
                fields.insert(KEY_REASON.into(), reason.as_wire().into());
            }
            Self::ChatMessage {
                sender_name,
                content,
            } => {
                fields.insert(KEY_SENDER.into(), sender_name.clone());
                match content {
                    ChatContent::Text(text) => {
                        fields.insert(KEY_CONTENT_TYPE.into(), CONTENT_TYPE_TEXT.into());
                        fields.insert(KEY_MSG_TEXT.into(), text.clone());
                    }
                    ChatContent::Sticker(data) => {
                        fields.insert(KEY_CONTENT_TYPE.into(), CONTENT_TYPE_STICKER.into());
                        fields.insert(KEY_STICKER_DATA.into(), data.clone());
                    }
                }
            }
            Self::Ack { ack_number } => {
                fields.insert(KEY_ACK_NUM.into(), ack_number.to_string());
            }
        }
        WireFrame {
            msg_type: self.wire_type().to_string(),
            fields,
        }
    }

    /// Decode a wire frame into a typed payload.
    ///
    /// Returns `None` for unknown tags or frames missing required fields;
    /// the transport drops those silently.
    pub fn from_frame(frame: &WireFrame) -> Option<Self> {
        let get = |key: &str| frame.fields.get(key).cloned();
        match frame.msg_type.as_str() {
            MSG_HANDSHAKE_REQUEST => Some(Self::HandshakeRequest {
                sender_name: get(KEY_SENDER)?,
            }),
            MSG_HANDSHAKE_RESPONSE => Some(Self::HandshakeResponse {
                seed: get(KEY_SEED)?.parse().ok()?,
            }),
            MSG_SPECTATOR_REQUEST => Some(Self::SpectatorRequest {
                sender_name: get(KEY_SENDER)?,
            }),
            MSG_BATTLE_SETUP => {
                if get(KEY_STATUS).as_deref() == Some(STATUS_OPEN) {
                    return Some(Self::SessionOpen {
                        host_name: get(KEY_SENDER)?,
                    });
                }
                let creature_data = get(KEY_CREATURE_DATA)
                    .and_then(|json| serde_json::from_str(&json).ok());
                Some(Self::BattleSetup {
                    creature_name: get(KEY_CREATURE_NAME)?,
                    creature_data,
                    boosts: get(KEY_STAT_BOOSTS)
                        .and_then(|raw| BoostAllocation::from_wire(&raw))
                        .unwrap_or_default(),
                    speed: get(KEY_SPEED).and_then(|raw| raw.parse().ok()),
                })
            }
            MSG_ATTACK_ANNOUNCE => Some(Self::AttackAnnounce {
                move_name: get(KEY_MOVE_NAME)?,
            }),
            MSG_DEFENSE_ANNOUNCE => Some(Self::DefenseAnnounce),
            MSG_CALCULATION_REPORT => Some(Self::CalculationReport(CalculationReport {
                move_name: get(KEY_MOVE_NAME)?,
                damage_dealt: get(KEY_DMG_DEALT)?.parse().ok()?,
                defender_hp_remaining: get(KEY_HP_REMAINING)?.parse().ok()?,
                effectiveness_x100: get(KEY_TYPE_EFFECT)?.parse().ok()?,
            })),
            MSG_CALCULATION_CONFIRM => Some(Self::CalculationConfirm),
            MSG_RESOLUTION_REQUEST => Some(Self::ResolutionRequest {
                claimed_damage: get(KEY_CLAIMED_DMG)?.parse().ok()?,
            }),
            MSG_GAME_OVER => Some(Self::GameOver {
                winner_name: get(KEY_WINNER)?,
                reason: GameOverReason::from_wire(&get(KEY_REASON)?)?,
            }),
            MSG_CHAT_MESSAGE => {
                let sender_name = get(KEY_SENDER)?;
                let content = match get(KEY_CONTENT_TYPE)?.as_str() {
                    CONTENT_TYPE_STICKER => ChatContent::Sticker(get(KEY_STICKER_DATA)?),
                    _ => ChatContent::Text(get(KEY_MSG_TEXT)?),
                };
                Some(Self::ChatMessage {
                    sender_name,
                    content,
                })
            }
            MSG_ACK => Some(Self::Ack {
                ack_number: frame.ack_number()?,
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Roster;

    fn roundtrip(payload: Payload) -> Payload {
        let frame = payload.to_frame();
        Payload::from_frame(&frame).expect("frame should decode")
    }

    #[test]
    fn test_handshake_roundtrip() {
        let request = Payload::HandshakeRequest {
            sender_name: "ember".into(),
        };
        assert_eq!(roundtrip(request.clone()), request);

        let response = Payload::HandshakeResponse { seed: 4242 };
        assert_eq!(roundtrip(response.clone()), response);
    }

    #[test]
    fn test_battle_setup_carries_snapshot() {
        let roster = Roster::new();
        let snapshot = roster.snapshot("Voltpup").unwrap();
        let setup = Payload::BattleSetup {
            creature_name: "Voltpup".into(),
            creature_data: Some(snapshot),
            boosts: BoostAllocation::new(2, 1),
            speed: Some(110),
        };
        assert_eq!(roundtrip(setup.clone()), setup);
    }

    #[test]
    fn test_battle_setup_name_only() {
        let frame = WireFrame {
            msg_type: MSG_BATTLE_SETUP.into(),
            fields: [(KEY_CREATURE_NAME.to_string(), "Tidehorn".to_string())]
                .into_iter()
                .collect(),
        };
        match Payload::from_frame(&frame) {
            Some(Payload::BattleSetup {
                creature_name,
                creature_data,
                boosts,
                speed,
            }) => {
                assert_eq!(creature_name, "Tidehorn");
                assert!(creature_data.is_none());
                assert_eq!(boosts, BoostAllocation::default());
                assert!(speed.is_none());
            }
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn test_session_open_shares_setup_tag() {
        let open = Payload::SessionOpen {
            host_name: "arena-host".into(),
        };
        let frame = open.to_frame();
        assert_eq!(frame.msg_type, MSG_BATTLE_SETUP);
        assert_eq!(roundtrip(open.clone()), open);
    }

    #[test]
    fn test_calculation_report_roundtrip() {
        let report = Payload::CalculationReport(CalculationReport {
            move_name: "Surf".into(),
            damage_dealt: 46,
            defender_hp_remaining: 59,
            effectiveness_x100: 200,
        });
        assert_eq!(roundtrip(report.clone()), report);
    }

    #[test]
    fn test_game_over_reasons() {
        for reason in [
            GameOverReason::HpZero,
            GameOverReason::Disconnected,
            GameOverReason::Surrendered,
        ] {
            let over = Payload::GameOver {
                winner_name: "ember".into(),
                reason,
            };
            assert_eq!(roundtrip(over.clone()), over);
        }
    }

    #[test]
    fn test_chat_text_and_sticker() {
        let text = Payload::ChatMessage {
            sender_name: "ember".into(),
            content: ChatContent::Text("good luck: you'll need it".into()),
        };
        assert_eq!(roundtrip(text.clone()), text);

        let sticker = Payload::ChatMessage {
            sender_name: "ember".into(),
            content: ChatContent::Sticker("aGVsbG8=".into()),
        };
        assert_eq!(roundtrip(sticker.clone()), sticker);
    }

    #[test]
    fn test_unknown_tag_drops() {
        let frame = WireFrame {
            msg_type: "TIME_TRAVEL".into(),
            fields: FieldMap::new(),
        };
        assert_eq!(Payload::from_frame(&frame), None);
    }

    #[test]
    fn test_missing_required_field_drops() {
        let frame = WireFrame {
            msg_type: MSG_CALCULATION_REPORT.into(),
            fields: [(KEY_MOVE_NAME.to_string(), "Surf".to_string())]
                .into_iter()
                .collect(),
        };
        assert_eq!(Payload::from_frame(&frame), None);
    }

    #[test]
    fn test_ack_roundtrip() {
        let ack = Payload::Ack { ack_number: 17 };
        let frame = ack.to_frame();
        assert_eq!(frame.ack_number(), Some(17));
        assert_eq!(roundtrip(ack.clone()), ack);
    }
}
