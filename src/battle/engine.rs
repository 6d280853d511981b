//! Turn Synchronization Engine
//!
//! The pure protocol core: every transition maps (current state, inbound
//! message) to a new state plus zero or more outgoing messages. No
//! sockets, no clocks. The caller performs all I/O and feeds results
//! back in, which is what makes the whole protocol drivable from tests.
//!
//! Both sides compute each turn's damage independently from the shared
//! seeded generator and cross-check the figures; the attacker's figure is
//! authoritative when they disagree.

use tracing::{debug, info, warn};

use crate::battle::state::{BattleState, Phase, Role, TurnRecord};
use crate::data::{compute_damage, DamageBreakdown, Roster};
use crate::net::message::{CalculationReport, GameOverReason, Payload};

/// Local-input rejections. Nothing here reaches the network.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Acting while the opponent owns the turn.
    #[error("It is not your turn")]
    NotYourTurn,

    /// The requested creature is not in the roster.
    #[error("Unknown creature: {0}")]
    UnknownCreature(String),

    /// The requested move is not in the roster.
    #[error("Unknown move: {0}")]
    UnknownMove(String),

    /// A boost was requested with no uses left.
    #[error("No {0} boost uses remaining")]
    NoBoostRemaining(&'static str),

    /// The operation is not valid in the current phase.
    #[error("Invalid in phase {0:?}")]
    WrongPhase(Phase),

    /// Spectators observe; they never act.
    #[error("Spectators cannot act")]
    SpectatorCannotAct,
}

/// What the engine wants the caller to do.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineAction {
    /// Send this over the reliable channel.
    Send(Payload),
    /// A turn finished without ending the battle.
    TurnResolved {
        attacker: String,
        move_name: String,
        damage: u32,
        defender_hp: u32,
    },
    /// The battle is over.
    BattleOver {
        winner: String,
        reason: GameOverReason,
    },
}

/// The lockstep battle state machine for one participant.
pub struct BattleEngine {
    player_name: String,
    roster: Roster,
    state: BattleState,
}

impl BattleEngine {
    /// A fresh engine in the setup phase.
    pub fn new(player_name: &str, role: Role, roster: Roster) -> Self {
        Self {
            player_name: player_name.to_string(),
            roster,
            state: BattleState::new(role),
        }
    }

    /// Read-only view of the battle state.
    pub fn state(&self) -> &BattleState {
        &self.state
    }

    /// This participant's display name.
    pub fn player_name(&self) -> &str {
        &self.player_name
    }

    /// Install the shared seed. The host calls this before answering the
    /// handshake; the joiner's engine does it on the handshake response.
    pub fn seed_session(&mut self, seed: u64) {
        info!(seed, "session seeded");
        self.state.seed_rng(seed);
    }

    /// Pick a creature and a boost allocation, producing the setup
    /// message to send. Valid only during setup.
    pub fn select_creature(
        &mut self,
        name: &str,
        attack_uses: u32,
        defense_uses: u32,
    ) -> Result<Vec<EngineAction>, EngineError> {
        if self.state.role == Role::Spectator {
            return Err(EngineError::SpectatorCannotAct);
        }
        if self.state.phase != Phase::Setup {
            return Err(EngineError::WrongPhase(self.state.phase));
        }
        let snapshot = self
            .roster
            .snapshot(name)
            .ok_or_else(|| EngineError::UnknownCreature(name.to_string()))?;

        let boosts = crate::battle::state::BoostAllocation::new(attack_uses, defense_uses);
        self.state.my_boosts = boosts;
        let setup = Payload::BattleSetup {
            creature_name: snapshot.name.clone(),
            creature_data: Some(snapshot.clone()),
            boosts,
            speed: Some(snapshot.speed),
        };
        self.state.my_creature = Some(snapshot);

        self.maybe_start();
        Ok(vec![EngineAction::Send(setup)])
    }

    /// Arm the defensive boost for the next incoming attack.
    pub fn arm_defense_boost(&mut self) -> Result<(), EngineError> {
        if self.state.role == Role::Spectator {
            return Err(EngineError::SpectatorCannotAct);
        }
        if self.state.my_boosts.defense_uses == 0 {
            return Err(EngineError::NoBoostRemaining("defense"));
        }
        self.state.defend_boost_armed = true;
        Ok(())
    }

    /// Announce an attack. Valid only on your own turn while waiting for
    /// a move.
    pub fn select_move(
        &mut self,
        move_name: &str,
        use_boost: bool,
    ) -> Result<Vec<EngineAction>, EngineError> {
        if self.state.role == Role::Spectator {
            return Err(EngineError::SpectatorCannotAct);
        }
        if self.state.phase != Phase::WaitingForMove {
            return Err(EngineError::WrongPhase(self.state.phase));
        }
        if !self.state.is_my_turn {
            return Err(EngineError::NotYourTurn);
        }
        let attack_move = self
            .roster
            .get_move(move_name)
            .ok_or_else(|| EngineError::UnknownMove(move_name.to_string()))?;
        let move_name = attack_move.name.clone();

        if use_boost {
            if self.state.my_boosts.attack_uses == 0 {
                return Err(EngineError::NoBoostRemaining("attack"));
            }
            self.state.my_boosts.attack_uses -= 1;
        }

        self.state.turn = Some(TurnRecord::attacking(&move_name, use_boost));
        self.state.phase = Phase::ProcessingTurn;
        debug!(move_name, use_boost, "attack announced");
        Ok(vec![EngineAction::Send(Payload::AttackAnnounce {
            move_name,
        })])
    }

    /// Concede the battle.
    pub fn surrender(&mut self) -> Vec<EngineAction> {
        let winner = self
            .state
            .opponent_creature
            .as_ref()
            .map(|c| c.name.clone())
            .unwrap_or_default();
        self.state.phase = Phase::GameOver;
        self.state.winner = Some(winner.clone());
        vec![
            EngineAction::Send(Payload::GameOver {
                winner_name: winner.clone(),
                reason: GameOverReason::Surrendered,
            }),
            EngineAction::BattleOver {
                winner,
                reason: GameOverReason::Surrendered,
            },
        ]
    }

    /// The transport gave up on the peer. Terminal, nothing is sent.
    pub fn handle_connection_lost(&mut self) -> Vec<EngineAction> {
        if self.state.phase == Phase::GameOver {
            return Vec::new();
        }
        let winner = self
            .state
            .my_creature
            .as_ref()
            .map(|c| c.name.clone())
            .unwrap_or_else(|| self.player_name.clone());
        warn!("peer unreachable, ending battle");
        self.state.phase = Phase::GameOver;
        self.state.winner = Some(winner.clone());
        vec![EngineAction::BattleOver {
            winner,
            reason: GameOverReason::Disconnected,
        }]
    }

    /// Advance the machine on an inbound message.
    ///
    /// Messages that make no sense in the current state are logged and
    /// dropped; the protocol recovers through retransmission or
    /// resolution, never by crashing.
    pub fn handle_message(&mut self, payload: &Payload) -> Vec<EngineAction> {
        if self.state.role == Role::Spectator {
            return self.handle_as_spectator(payload);
        }
        match payload {
            Payload::HandshakeRequest { sender_name } => self.handle_handshake_request(sender_name),
            Payload::HandshakeResponse { seed } => {
                if self.state.role == Role::Joiner && self.state.seed.is_none() {
                    self.seed_session(*seed);
                    self.maybe_start();
                }
                Vec::new()
            }
            Payload::BattleSetup {
                creature_name,
                creature_data,
                boosts,
                speed,
            } => self.handle_battle_setup(creature_name, creature_data.as_ref(), *boosts, *speed),
            Payload::AttackAnnounce { move_name } => self.handle_attack_announce(move_name),
            Payload::DefenseAnnounce => self.handle_defense_announce(),
            Payload::CalculationReport(report) => self.handle_report(report),
            Payload::CalculationConfirm => self.handle_confirm(),
            Payload::ResolutionRequest { claimed_damage } => self.handle_resolution(*claimed_damage),
            Payload::GameOver {
                winner_name,
                reason,
            } => self.handle_game_over(winner_name, *reason),
            // Transport and discovery traffic; nothing for the engine.
            Payload::SpectatorRequest { .. }
            | Payload::SessionOpen { .. }
            | Payload::ChatMessage { .. }
            | Payload::Ack { .. } => Vec::new(),
        }
    }

    fn handle_as_spectator(&mut self, payload: &Payload) -> Vec<EngineAction> {
        match payload {
            Payload::GameOver {
                winner_name,
                reason,
            } => self.handle_game_over(winner_name, *reason),
            _ => Vec::new(),
        }
    }

    fn handle_handshake_request(&mut self, sender_name: &str) -> Vec<EngineAction> {
        if self.state.role != Role::Host {
            warn!(sender_name, "handshake request at a non-host, ignoring");
            return Vec::new();
        }
        let Some(seed) = self.state.seed else {
            warn!("handshake request before the session was seeded");
            return Vec::new();
        };
        info!(sender_name, "challenger connected");
        vec![EngineAction::Send(Payload::HandshakeResponse { seed })]
    }

    fn handle_battle_setup(
        &mut self,
        creature_name: &str,
        creature_data: Option<&crate::data::CreatureSnapshot>,
        boosts: crate::battle::state::BoostAllocation,
        speed: Option<u32>,
    ) -> Vec<EngineAction> {
        let snapshot = match creature_data {
            Some(snapshot) => Some(snapshot.clone()),
            None => self.roster.snapshot(creature_name),
        };
        let Some(snapshot) = snapshot else {
            warn!(creature_name, "setup names an unknown creature, ignoring");
            return Vec::new();
        };
        info!(creature = %snapshot.name, "opponent selected a creature");
        self.state.opponent_creature = Some(snapshot);
        self.state.opponent_boosts_belief = boosts;
        self.state.opponent_speed = speed;
        self.maybe_start();
        Vec::new()
    }

    /// Leave setup once both snapshots and the seed are in. Ownership
    /// goes to the host, or to the faster creature when both setups
    /// advertised a speed, host winning ties.
    fn maybe_start(&mut self) {
        if self.state.phase != Phase::Setup || !self.state.setup_complete() {
            return;
        }
        let my_speed = self.state.my_creature.as_ref().map(|c| c.speed);
        self.state.is_my_turn = match (my_speed, self.state.opponent_speed) {
            (Some(mine), Some(theirs)) if mine != theirs => mine > theirs,
            _ => self.state.role == Role::Host,
        };
        self.state.phase = Phase::WaitingForMove;
        info!(first = self.state.is_my_turn, "battle started");
    }

    fn handle_attack_announce(&mut self, move_name: &str) -> Vec<EngineAction> {
        if self.state.phase != Phase::WaitingForMove || self.state.is_my_turn {
            warn!(move_name, "unexpected attack announce, ignoring");
            return Vec::new();
        }
        if self.roster.get_move(move_name).is_none() {
            warn!(move_name, "opponent announced an unknown move, ignoring");
            return Vec::new();
        }

        // Consume the armed defensive boost, if any.
        let defense_boosted = self.state.defend_boost_armed && self.state.my_boosts.defense_uses > 0;
        if defense_boosted {
            self.state.my_boosts.defense_uses -= 1;
        }
        self.state.defend_boost_armed = false;

        self.state.turn = Some(TurnRecord::defending(move_name, defense_boosted));
        self.state.phase = Phase::ProcessingTurn;

        let mut actions = vec![EngineAction::Send(Payload::DefenseAnnounce)];
        if let Some(report) = self.compute_own_report() {
            actions.push(EngineAction::Send(Payload::CalculationReport(report)));
        }
        actions
    }

    fn handle_defense_announce(&mut self) -> Vec<EngineAction> {
        let attacking = matches!(&self.state.turn, Some(turn) if turn.attacker_is_me);
        if !attacking {
            debug!("defense announce without an outgoing attack, ignoring");
            return Vec::new();
        }
        // The peer's report may have raced ahead of its defense announce,
        // in which case our report already exists; resend the stored one.
        let report = match self
            .state
            .turn
            .as_ref()
            .and_then(|turn| turn.last_report.clone())
        {
            Some(report) => Some(report),
            None => self.compute_own_report(),
        };
        match report {
            Some(report) => vec![EngineAction::Send(Payload::CalculationReport(report))],
            None => Vec::new(),
        }
    }

    /// Compute this side's figure for the in-flight turn with its own
    /// boost knowledge, and record it for later re-assertion.
    fn compute_own_report(&mut self) -> Option<CalculationReport> {
        let turn = self.state.turn.as_ref()?;
        let (attacker_boosted, defender_boosted) = if turn.attacker_is_me {
            (turn.boost_requested, false)
        } else {
            (false, turn.boost_requested)
        };
        let move_name = turn.move_name.clone();
        let breakdown = self.turn_breakdown(attacker_boosted, defender_boosted)?;

        let defender_hp = self.defender_creature()?.hp;
        let report = CalculationReport {
            move_name,
            damage_dealt: breakdown.damage,
            defender_hp_remaining: defender_hp.saturating_sub(breakdown.damage),
            effectiveness_x100: breakdown.effectiveness_x100,
        };

        let turn = self.state.turn.as_mut()?;
        turn.local_damage = Some(breakdown.damage);
        turn.last_report = Some(report.clone());
        Some(report)
    }

    /// Damage for the in-flight turn under the given boost assumptions,
    /// using the turn's cached roll. The roll is drawn exactly once per
    /// turn so repeated recomputation never advances the shared stream.
    fn turn_breakdown(
        &mut self,
        attacker_boosted: bool,
        defender_boosted: bool,
    ) -> Option<DamageBreakdown> {
        let turn = self.state.turn.as_ref()?;
        let attacker_is_me = turn.attacker_is_me;
        let attack_move = self.roster.get_move(&turn.move_name)?.clone();

        let roll = match turn.roll {
            Some(roll) => roll,
            None => {
                let roll = self.state.rng.as_mut()?.damage_roll();
                self.state.turn.as_mut()?.roll = Some(roll);
                roll
            }
        };

        let (attacker, defender) = if attacker_is_me {
            (
                self.state.my_creature.as_ref()?,
                self.state.opponent_creature.as_ref()?,
            )
        } else {
            (
                self.state.opponent_creature.as_ref()?,
                self.state.my_creature.as_ref()?,
            )
        };
        Some(compute_damage(
            attacker,
            defender,
            &attack_move,
            attacker_boosted,
            defender_boosted,
            roll,
        ))
    }

    fn defender_creature(&self) -> Option<&crate::data::CreatureSnapshot> {
        let turn = self.state.turn.as_ref()?;
        if turn.attacker_is_me {
            self.state.opponent_creature.as_ref()
        } else {
            self.state.my_creature.as_ref()
        }
    }

    fn apply_to_defender(&mut self, damage: u32) {
        let Some(turn) = self.state.turn.as_ref() else {
            return;
        };
        let target = if turn.attacker_is_me {
            self.state.opponent_creature.as_mut()
        } else {
            self.state.my_creature.as_mut()
        };
        if let Some(target) = target {
            target.apply_damage(damage);
        }
    }

    /// Cross-check the peer's figure against two local recomputations:
    /// once with the attacker's boost assumed unused, once assumed used.
    /// On the defending side a boosted match is the only evidence of the
    /// attacker's boost, so it also decrements the tracked belief about
    /// their counter. The heuristic cannot see the defender's defensive
    /// boost; that case converges through the resolution path instead.
    fn handle_report(&mut self, report: &CalculationReport) -> Vec<EngineAction> {
        let Some(turn) = self.state.turn.as_ref() else {
            debug!("report with no turn in flight, ignoring");
            return Vec::new();
        };
        if turn.local_validated {
            debug!("report for an already validated turn, ignoring");
            return Vec::new();
        }
        let attacker_is_me = turn.attacker_is_me;
        let defense_flag = if attacker_is_me {
            false
        } else {
            turn.boost_requested
        };

        // The attacker's own figure must exist before any verification
        // so acceptance can apply it; reports can outrun the defense
        // announce.
        if attacker_is_me && self.state.turn.as_ref().is_some_and(|t| t.local_damage.is_none()) {
            self.compute_own_report();
        }

        let base = self.turn_breakdown(false, defense_flag);
        let boosted = self.turn_breakdown(true, defense_flag);
        let (Some(base), Some(boosted)) = (base, boosted) else {
            warn!("cannot recompute the turn, ignoring report");
            return Vec::new();
        };

        if report.damage_dealt == base.damage {
            self.accept_report(report.damage_dealt)
        } else if report.damage_dealt == boosted.damage {
            if !attacker_is_me {
                let belief = &mut self.state.opponent_boosts_belief;
                belief.attack_uses = belief.attack_uses.saturating_sub(1);
                debug!(remaining = belief.attack_uses, "opponent attack boost inferred");
            }
            self.accept_report(report.damage_dealt)
        } else {
            self.handle_discrepancy(report, base.damage)
        }
    }

    /// Accept a validated report: apply damage, confirm, and end the
    /// turn if the peer's confirmation already arrived.
    ///
    /// The attacker applies its own computed figure (it knows its own
    /// boost); the defender applies the attacker's reported figure.
    fn accept_report(&mut self, reported: u32) -> Vec<EngineAction> {
        let Some(turn) = self.state.turn.as_mut() else {
            return Vec::new();
        };
        let applied = if turn.attacker_is_me {
            turn.local_damage.unwrap_or(reported)
        } else {
            turn.local_damage = Some(reported);
            reported
        };
        turn.local_validated = true;
        let both_done = turn.remote_confirmed;

        self.apply_to_defender(applied);
        let mut actions = vec![EngineAction::Send(Payload::CalculationConfirm)];
        if both_done {
            actions.extend(self.end_turn());
        }
        actions
    }

    /// One mismatch requests resolution; the same disputed report seen
    /// twice means the sender re-asserted, and this side yields to their
    /// authority so the protocol always terminates.
    fn handle_discrepancy(
        &mut self,
        report: &CalculationReport,
        own_base: u32,
    ) -> Vec<EngineAction> {
        let Some(turn) = self.state.turn.as_mut() else {
            return Vec::new();
        };
        if turn.disputed_report.as_ref() == Some(report) {
            info!(
                reported = report.damage_dealt,
                "yielding to the peer's re-asserted figure"
            );
            turn.local_damage = Some(report.damage_dealt);
            turn.local_validated = true;
            self.apply_to_defender(report.damage_dealt);
            let mut actions = vec![EngineAction::Send(Payload::CalculationConfirm)];
            actions.extend(self.end_turn());
            return actions;
        }

        warn!(
            reported = report.damage_dealt,
            computed = own_base,
            "damage discrepancy, requesting resolution"
        );
        turn.disputed_report = Some(report.clone());
        vec![EngineAction::Send(Payload::ResolutionRequest {
            claimed_damage: own_base,
        })]
    }

    fn handle_confirm(&mut self) -> Vec<EngineAction> {
        let Some(turn) = self.state.turn.as_mut() else {
            debug!("confirm with no turn in flight, ignoring");
            return Vec::new();
        };
        turn.remote_confirmed = true;
        if turn.fully_confirmed() {
            self.end_turn()
        } else {
            Vec::new()
        }
    }

    /// Re-assert by resending the stored report unchanged. Byte-identical
    /// re-encoding is what lets the peer detect the repeat.
    fn handle_resolution(&mut self, claimed_damage: u32) -> Vec<EngineAction> {
        let Some(report) = self
            .state
            .turn
            .as_ref()
            .and_then(|turn| turn.last_report.clone())
        else {
            debug!(claimed_damage, "resolution request with nothing to re-assert");
            return Vec::new();
        };
        info!(
            peer_figure = claimed_damage,
            own_figure = report.damage_dealt,
            "re-asserting calculation report"
        );
        vec![EngineAction::Send(Payload::CalculationReport(report))]
    }

    fn handle_game_over(&mut self, winner_name: &str, reason: GameOverReason) -> Vec<EngineAction> {
        if self.state.phase == Phase::GameOver {
            return Vec::new();
        }
        self.state.phase = Phase::GameOver;
        self.state.winner = Some(winner_name.to_string());
        self.state.turn = None;
        vec![EngineAction::BattleOver {
            winner: winner_name.to_string(),
            reason,
        }]
    }

    /// Close out the in-flight turn: clear the record, flip ownership,
    /// and end the battle when a creature has fainted.
    fn end_turn(&mut self) -> Vec<EngineAction> {
        let Some(turn) = self.state.turn.take() else {
            return Vec::new();
        };

        let my_fainted = self.state.my_creature.as_ref().is_some_and(|c| c.fainted());
        let opp_fainted = self
            .state
            .opponent_creature
            .as_ref()
            .is_some_and(|c| c.fainted());

        if my_fainted || opp_fainted {
            let winner = if opp_fainted {
                self.state.my_creature.as_ref()
            } else {
                self.state.opponent_creature.as_ref()
            }
            .map(|c| c.name.clone())
            .unwrap_or_default();
            self.state.phase = Phase::GameOver;
            self.state.winner = Some(winner.clone());
            info!(winner, "battle over");
            return vec![
                EngineAction::Send(Payload::GameOver {
                    winner_name: winner.clone(),
                    reason: GameOverReason::HpZero,
                }),
                EngineAction::BattleOver {
                    winner,
                    reason: GameOverReason::HpZero,
                },
            ];
        }

        let attacker = if turn.attacker_is_me {
            self.state.my_creature.as_ref()
        } else {
            self.state.opponent_creature.as_ref()
        }
        .map(|c| c.name.clone())
        .unwrap_or_default();
        let defender_hp = if turn.attacker_is_me {
            self.state.opponent_creature.as_ref()
        } else {
            self.state.my_creature.as_ref()
        }
        .map_or(0, |c| c.hp);

        self.state.is_my_turn = !self.state.is_my_turn;
        self.state.phase = Phase::WaitingForMove;
        debug!(attacker, defender_hp, "turn resolved");
        vec![EngineAction::TurnResolved {
            attacker,
            move_name: turn.move_name,
            damage: turn.local_damage.unwrap_or(0),
            defender_hp,
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Element, Move, MoveCategory, Species};
    use std::collections::VecDeque;

    // Fire-typed creatures with a Normal move keep the figures free of
    // both STAB and effectiveness modifiers.
    fn test_roster() -> Roster {
        let mut roster = Roster::new();
        roster.add_species(Species {
            name: "Bruiser".into(),
            element1: Element::Fire,
            element2: None,
            hp: 120,
            attack: 100,
            defense: 50,
            sp_attack: 60,
            sp_defense: 60,
            speed: 80,
        });
        roster.add_species(Species {
            name: "Bulwark".into(),
            element1: Element::Fire,
            element2: None,
            hp: 120,
            attack: 50,
            defense: 50,
            sp_attack: 60,
            sp_defense: 60,
            speed: 80,
        });
        roster.add_move(Move {
            name: "Jab".into(),
            element: Element::Normal,
            power: 40,
            category: MoveCategory::Physical,
        });
        roster
    }

    fn handshake(host: &mut BattleEngine, joiner: &mut BattleEngine, seed: u64) {
        host.seed_session(seed);
        let actions = host.handle_message(&Payload::HandshakeRequest {
            sender_name: joiner.player_name().to_string(),
        });
        let response = sent_payloads(&actions);
        assert_eq!(response, vec![Payload::HandshakeResponse { seed }]);
        for payload in response {
            joiner.handle_message(&payload);
        }
    }

    fn sent_payloads(actions: &[EngineAction]) -> Vec<Payload> {
        actions
            .iter()
            .filter_map(|action| match action {
                EngineAction::Send(payload) => Some(payload.clone()),
                _ => None,
            })
            .collect()
    }

    /// Deliver queued sends back and forth until both sides go quiet,
    /// collecting each side's non-send events.
    fn drive(
        host: &mut BattleEngine,
        joiner: &mut BattleEngine,
        initial: Vec<EngineAction>,
        from_host: bool,
    ) -> (Vec<EngineAction>, Vec<EngineAction>) {
        let mut host_events = Vec::new();
        let mut joiner_events = Vec::new();
        let mut queue: VecDeque<(bool, Payload)> = VecDeque::new();

        let mut absorb = |actions: Vec<EngineAction>,
                          host_side: bool,
                          queue: &mut VecDeque<(bool, Payload)>,
                          host_events: &mut Vec<EngineAction>,
                          joiner_events: &mut Vec<EngineAction>| {
            for action in actions {
                match action {
                    EngineAction::Send(payload) => queue.push_back((!host_side, payload)),
                    other if host_side => host_events.push(other),
                    other => joiner_events.push(other),
                }
            }
        };

        absorb(
            initial,
            from_host,
            &mut queue,
            &mut host_events,
            &mut joiner_events,
        );
        while let Some((to_host, payload)) = queue.pop_front() {
            let actions = if to_host {
                host.handle_message(&payload)
            } else {
                joiner.handle_message(&payload)
            };
            absorb(
                actions,
                to_host,
                &mut queue,
                &mut host_events,
                &mut joiner_events,
            );
        }
        (host_events, joiner_events)
    }

    fn started_pair(seed: u64) -> (BattleEngine, BattleEngine) {
        started_pair_with_boosts(seed, (0, 0), (0, 0))
    }

    fn started_pair_with_boosts(
        seed: u64,
        host_boosts: (u32, u32),
        joiner_boosts: (u32, u32),
    ) -> (BattleEngine, BattleEngine) {
        let mut host = BattleEngine::new("alice", Role::Host, test_roster());
        let mut joiner = BattleEngine::new("bob", Role::Joiner, test_roster());
        handshake(&mut host, &mut joiner, seed);

        let host_setup = host
            .select_creature("Bruiser", host_boosts.0, host_boosts.1)
            .unwrap();
        let joiner_setup = joiner
            .select_creature("Bulwark", joiner_boosts.0, joiner_boosts.1)
            .unwrap();
        for payload in sent_payloads(&host_setup) {
            joiner.handle_message(&payload);
        }
        for payload in sent_payloads(&joiner_setup) {
            host.handle_message(&payload);
        }

        assert_eq!(host.state().phase, Phase::WaitingForMove);
        assert_eq!(joiner.state().phase, Phase::WaitingForMove);
        // Equal speeds: the host acts first.
        assert!(host.state().is_my_turn);
        assert!(!joiner.state().is_my_turn);
        (host, joiner)
    }

    #[test]
    fn test_first_turn_resolves_identically_on_both_sides() {
        let (mut host, mut joiner) = started_pair(4242);

        let announce = host.select_move("Jab", false).unwrap();
        let (host_events, joiner_events) = drive(&mut host, &mut joiner, announce, true);

        // Seed 4242's first roll is 8879: power 40 at 100/50 gives 33.
        let expected = EngineAction::TurnResolved {
            attacker: "Bruiser".into(),
            move_name: "Jab".into(),
            damage: 33,
            defender_hp: 87,
        };
        assert_eq!(host_events, vec![expected.clone()]);
        assert_eq!(joiner_events, vec![expected]);

        assert_eq!(host.state().opponent_creature.as_ref().unwrap().hp, 87);
        assert_eq!(joiner.state().my_creature.as_ref().unwrap().hp, 87);

        // Ownership flipped to the joiner.
        assert!(!host.state().is_my_turn);
        assert!(joiner.state().is_my_turn);
        assert_eq!(host.state().phase, Phase::WaitingForMove);
    }

    #[test]
    fn test_boosted_attack_is_inferred_by_the_defender() {
        let (mut host, mut joiner) = started_pair_with_boosts(4242, (1, 0), (0, 0));
        assert_eq!(joiner.state().opponent_boosts_belief.attack_uses, 1);

        let announce = host.select_move("Jab", true).unwrap();
        assert_eq!(host.state().my_boosts.attack_uses, 0);

        let (host_events, joiner_events) = drive(&mut host, &mut joiner, announce, true);

        // Boosted attack stat 150 with roll 8879 gives 48.
        let expected = EngineAction::TurnResolved {
            attacker: "Bruiser".into(),
            move_name: "Jab".into(),
            damage: 48,
            defender_hp: 72,
        };
        assert_eq!(host_events, vec![expected.clone()]);
        assert_eq!(joiner_events, vec![expected]);

        // The defender never saw a boost flag; it inferred the usage.
        assert_eq!(joiner.state().opponent_boosts_belief.attack_uses, 0);
        assert_eq!(joiner.state().my_creature.as_ref().unwrap().hp, 72);
        assert_eq!(host.state().opponent_creature.as_ref().unwrap().hp, 72);
    }

    #[test]
    fn test_forged_report_triggers_one_resolution_then_yield() {
        let (mut host, mut joiner) = started_pair(4242);

        // Walk the host to the point where it has computed its own figure.
        let announce = host.select_move("Jab", false).unwrap();
        let joiner_actions = joiner.handle_message(&sent_payloads(&announce)[0].clone());
        let joiner_sent = sent_payloads(&joiner_actions);
        assert_eq!(joiner_sent[0], Payload::DefenseAnnounce);
        let host_report_actions = host.handle_message(&Payload::DefenseAnnounce);
        assert_eq!(sent_payloads(&host_report_actions).len(), 1);

        // A forged figure matching neither recomputation.
        let forged = CalculationReport {
            move_name: "Jab".into(),
            damage_dealt: 50,
            defender_hp_remaining: 70,
            effectiveness_x100: 100,
        };

        let first = host.handle_message(&Payload::CalculationReport(forged.clone()));
        assert_eq!(
            sent_payloads(&first),
            vec![Payload::ResolutionRequest { claimed_damage: 33 }]
        );

        // The identical report again: yield, confirm, end the turn with
        // the forged figure applied. No second resolution request.
        let second = host.handle_message(&Payload::CalculationReport(forged));
        let sent = sent_payloads(&second);
        assert_eq!(sent, vec![Payload::CalculationConfirm]);
        assert!(second
            .iter()
            .any(|a| matches!(a, EngineAction::TurnResolved { damage: 50, .. })));
        assert_eq!(host.state().opponent_creature.as_ref().unwrap().hp, 70);
        assert!(!host.state().is_my_turn);
    }

    #[test]
    fn test_reassertion_is_byte_identical() {
        let (mut host, mut joiner) = started_pair(4242);

        let announce = host.select_move("Jab", false).unwrap();
        joiner.handle_message(&sent_payloads(&announce)[0].clone());
        let actions = host.handle_message(&Payload::DefenseAnnounce);
        let original = match &sent_payloads(&actions)[0] {
            Payload::CalculationReport(report) => report.clone(),
            other => panic!("expected a report, got {other:?}"),
        };
        let original_frame = Payload::CalculationReport(original.clone()).to_frame();

        let reasserted = host.handle_message(&Payload::ResolutionRequest { claimed_damage: 99 });
        match &sent_payloads(&reasserted)[0] {
            Payload::CalculationReport(report) => {
                assert_eq!(*report, original);
                let frame = Payload::CalculationReport(report.clone()).to_frame();
                assert_eq!(frame, original_frame);
            }
            other => panic!("expected a re-asserted report, got {other:?}"),
        }
    }

    #[test]
    fn test_fainting_ends_the_battle_on_both_sides() {
        let mut roster = test_roster();
        roster.add_species(Species {
            name: "Wisp".into(),
            element1: Element::Fire,
            element2: None,
            hp: 20,
            attack: 50,
            defense: 50,
            sp_attack: 60,
            sp_defense: 60,
            speed: 10,
        });
        let mut host = BattleEngine::new("alice", Role::Host, roster.clone());
        let mut joiner = BattleEngine::new("bob", Role::Joiner, roster);
        handshake(&mut host, &mut joiner, 4242);

        let host_setup = host.select_creature("Bruiser", 0, 0).unwrap();
        let joiner_setup = joiner.select_creature("Wisp", 0, 0).unwrap();
        for payload in sent_payloads(&host_setup) {
            joiner.handle_message(&payload);
        }
        for payload in sent_payloads(&joiner_setup) {
            host.handle_message(&payload);
        }

        // 20 HP cannot survive the 33-damage opener.
        let announce = host.select_move("Jab", false).unwrap();
        let (host_events, joiner_events) = drive(&mut host, &mut joiner, announce, true);

        let expected = EngineAction::BattleOver {
            winner: "Bruiser".into(),
            reason: GameOverReason::HpZero,
        };
        assert!(host_events.contains(&expected));
        assert!(joiner_events.contains(&expected));
        assert_eq!(host.state().phase, Phase::GameOver);
        assert_eq!(joiner.state().phase, Phase::GameOver);
        assert_eq!(joiner.state().winner.as_deref(), Some("Bruiser"));
    }

    #[test]
    fn test_speed_negotiation_gives_the_faster_side_the_turn() {
        let mut roster = test_roster();
        roster.add_species(Species {
            name: "Darter".into(),
            element1: Element::Fire,
            element2: None,
            hp: 100,
            attack: 60,
            defense: 60,
            sp_attack: 60,
            sp_defense: 60,
            speed: 140,
        });
        let mut host = BattleEngine::new("alice", Role::Host, roster.clone());
        let mut joiner = BattleEngine::new("bob", Role::Joiner, roster);
        handshake(&mut host, &mut joiner, 7);

        let host_setup = host.select_creature("Bruiser", 0, 0).unwrap();
        let joiner_setup = joiner.select_creature("Darter", 0, 0).unwrap();
        for payload in sent_payloads(&host_setup) {
            joiner.handle_message(&payload);
        }
        for payload in sent_payloads(&joiner_setup) {
            host.handle_message(&payload);
        }

        assert!(!host.state().is_my_turn);
        assert!(joiner.state().is_my_turn);
    }

    #[test]
    fn test_local_input_rejections() {
        let (mut host, mut joiner) = started_pair(4242);

        assert!(matches!(
            joiner.select_move("Jab", false),
            Err(EngineError::NotYourTurn)
        ));
        assert!(matches!(
            host.select_move("Moonbeam", false),
            Err(EngineError::UnknownMove(_))
        ));
        assert!(matches!(
            host.select_move("Jab", true),
            Err(EngineError::NoBoostRemaining("attack"))
        ));
        assert!(matches!(
            host.select_creature("Bruiser", 0, 0),
            Err(EngineError::WrongPhase(Phase::WaitingForMove))
        ));

        // Rejections leave the machine untouched.
        assert_eq!(host.state().phase, Phase::WaitingForMove);
        assert!(host.state().is_my_turn);
    }

    #[test]
    fn test_connection_loss_ends_locally_without_sending() {
        let (mut host, _joiner) = started_pair(4242);
        let actions = host.handle_connection_lost();
        assert_eq!(
            actions,
            vec![EngineAction::BattleOver {
                winner: "Bruiser".into(),
                reason: GameOverReason::Disconnected,
            }]
        );
        assert!(sent_payloads(&actions).is_empty());
        assert_eq!(host.state().phase, Phase::GameOver);

        // Terminal: a second loss changes nothing.
        assert!(host.handle_connection_lost().is_empty());
    }

    #[test]
    fn test_surrender_names_the_opponent_winner() {
        let (mut host, mut joiner) = started_pair(4242);
        let actions = host.surrender();
        assert!(actions.contains(&EngineAction::BattleOver {
            winner: "Bulwark".into(),
            reason: GameOverReason::Surrendered,
        }));
        for payload in sent_payloads(&actions) {
            joiner.handle_message(&payload);
        }
        assert_eq!(joiner.state().phase, Phase::GameOver);
        assert_eq!(joiner.state().winner.as_deref(), Some("Bulwark"));
    }

    #[test]
    fn test_spectator_ignores_turn_traffic() {
        let mut spectator = BattleEngine::new("carol", Role::Spectator, test_roster());
        assert!(spectator
            .handle_message(&Payload::AttackAnnounce {
                move_name: "Jab".into()
            })
            .is_empty());
        assert!(matches!(
            spectator.select_move("Jab", false),
            Err(EngineError::SpectatorCannotAct)
        ));

        let over = spectator.handle_message(&Payload::GameOver {
            winner_name: "Bruiser".into(),
            reason: GameOverReason::HpZero,
        });
        assert_eq!(
            over,
            vec![EngineAction::BattleOver {
                winner: "Bruiser".into(),
                reason: GameOverReason::HpZero,
            }]
        );
    }
}
