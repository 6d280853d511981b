//! Battle State Definitions
//!
//! All state owned by the turn synchronization state machine. Nothing here
//! touches the network; phase and turn ownership change only through
//! [`crate::battle::engine::BattleEngine`].

use serde::{Deserialize, Serialize};

use crate::core::rng::DeterministicRng;
use crate::data::CreatureSnapshot;
use crate::net::message::CalculationReport;

/// Which side of the session this process plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Opened the session and generates the shared seed.
    Host,
    /// Connected to an existing session and receives the seed.
    Joiner,
    /// Passive observer; never owns a turn.
    Spectator,
}

/// Battle phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Exchanging creature snapshots and the seed.
    Setup,
    /// Waiting for either side to announce an attack.
    WaitingForMove,
    /// Computing and reconciling damage for the in-flight turn.
    ProcessingTurn,
    /// Battle finished; terminal.
    GameOver,
}

/// Per-battle consumable boost counters: one offensive, one defensive.
///
/// On the wire this accepts two encodings: a structured JSON object with
/// labeled counts (preferred) or a legacy `attack,defense` integer pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoostAllocation {
    /// Remaining offensive boost uses.
    pub attack_uses: u32,
    /// Remaining defensive boost uses.
    pub defense_uses: u32,
}

impl BoostAllocation {
    /// A fresh allocation.
    pub fn new(attack_uses: u32, defense_uses: u32) -> Self {
        Self {
            attack_uses,
            defense_uses,
        }
    }

    /// Serialize for the wire (preferred structured encoding).
    pub fn to_wire(&self) -> String {
        // Infallible: the struct is two plain integers.
        serde_json::to_string(self).unwrap_or_else(|_| format!("{},{}", self.attack_uses, self.defense_uses))
    }

    /// Parse either wire encoding.
    pub fn from_wire(value: &str) -> Option<Self> {
        if let Ok(parsed) = serde_json::from_str::<Self>(value) {
            return Some(parsed);
        }
        // Legacy: "attack,defense"
        let (attack, defense) = value.split_once(',')?;
        Some(Self {
            attack_uses: attack.trim().parse().ok()?,
            defense_uses: defense.trim().parse().ok()?,
        })
    }
}

/// The in-flight turn.
///
/// Created when an attack is announced or received; cleared when the turn
/// ends. Mirrored on both sides with `attacker_is_me` swapped.
#[derive(Clone, Debug)]
pub struct TurnRecord {
    /// Move being used this turn.
    pub move_name: String,
    /// Whether this process is the attacker.
    pub attacker_is_me: bool,
    /// Whether this side requested its own boost for the turn.
    pub boost_requested: bool,
    /// The shared-RNG roll for this turn, drawn exactly once per side.
    pub roll: Option<u32>,
    /// Damage this side computed for the turn.
    pub local_damage: Option<u32>,
    /// Last report sent, kept verbatim for re-assertion.
    pub last_report: Option<CalculationReport>,
    /// Last peer report disputed, kept to break resolution loops.
    pub disputed_report: Option<CalculationReport>,
    /// This side has validated and confirmed the peer's report.
    pub local_validated: bool,
    /// The peer's explicit confirmation has arrived.
    pub remote_confirmed: bool,
}

impl TurnRecord {
    /// Start a turn record for an attack this side is making.
    pub fn attacking(move_name: &str, boost_requested: bool) -> Self {
        Self {
            move_name: move_name.to_string(),
            attacker_is_me: true,
            boost_requested,
            roll: None,
            local_damage: None,
            last_report: None,
            disputed_report: None,
            local_validated: false,
            remote_confirmed: false,
        }
    }

    /// Start the mirrored record for an incoming attack.
    pub fn defending(move_name: &str, boost_requested: bool) -> Self {
        Self {
            attacker_is_me: false,
            ..Self::attacking(move_name, boost_requested)
        }
    }

    /// Both confirmation-equivalent events have happened.
    pub fn fully_confirmed(&self) -> bool {
        self.local_validated && self.remote_confirmed
    }
}

/// Complete battle state for one session.
#[derive(Clone, Debug)]
pub struct BattleState {
    /// Host or joiner.
    pub role: Role,
    /// Current phase; mutated only by the engine.
    pub phase: Phase,
    /// Own creature snapshot (independent copy of roster data).
    pub my_creature: Option<CreatureSnapshot>,
    /// Opponent creature snapshot.
    pub opponent_creature: Option<CreatureSnapshot>,
    /// Own boost counters; decremented when this side uses a boost.
    pub my_boosts: BoostAllocation,
    /// Belief about the opponent's remaining boosts. Seeded from their
    /// setup message, then updated only by inference - never by direct
    /// message content.
    pub opponent_boosts_belief: BoostAllocation,
    /// Whether this side owns the current turn.
    pub is_my_turn: bool,
    /// In-flight turn, if any.
    pub turn: Option<TurnRecord>,
    /// Defensive boost armed for the next incoming attack.
    pub defend_boost_armed: bool,
    /// Shared deterministic RNG, seeded at handshake.
    pub rng: Option<DeterministicRng>,
    /// The shared seed value.
    pub seed: Option<u64>,
    /// Opponent speed advertised at setup, enabling speed negotiation.
    pub opponent_speed: Option<u32>,
    /// Winner name once the battle is over.
    pub winner: Option<String>,
}

impl BattleState {
    /// Fresh state for a new session.
    pub fn new(role: Role) -> Self {
        Self {
            role,
            phase: Phase::Setup,
            my_creature: None,
            opponent_creature: None,
            my_boosts: BoostAllocation::default(),
            opponent_boosts_belief: BoostAllocation::default(),
            is_my_turn: false,
            turn: None,
            defend_boost_armed: false,
            rng: None,
            seed: None,
            opponent_speed: None,
            winner: None,
        }
    }

    /// Seed the shared RNG. Must happen before the first damage
    /// computation on either side.
    pub fn seed_rng(&mut self, seed: u64) {
        self.seed = Some(seed);
        self.rng = Some(DeterministicRng::new(seed));
    }

    /// Both snapshots and the seed are known: setup is complete.
    pub fn setup_complete(&self) -> bool {
        self.my_creature.is_some() && self.opponent_creature.is_some() && self.seed.is_some()
    }
}
