//! Species Roster and Element Chart
//!
//! Static creature statistics and the elemental effectiveness chart.
//! The roster is the master data: battle code takes independent
//! [`CreatureSnapshot`] copies and never mutates the roster itself.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::moves::{default_moves, Move};

/// Elemental type of a creature or move.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Element {
    /// Plain element: neutral against almost everything.
    Normal,
    /// Fire.
    Fire,
    /// Water.
    Water,
    /// Grass.
    Grass,
    /// Electric.
    Electric,
    /// Ice.
    Ice,
    /// Fighting.
    Fighting,
    /// Poison.
    Poison,
    /// Ground.
    Ground,
    /// Flying.
    Flying,
    /// Psychic.
    Psychic,
    /// Bug.
    Bug,
    /// Rock.
    Rock,
    /// Ghost.
    Ghost,
    /// Dragon.
    Dragon,
    /// Steel.
    Steel,
    /// Dark.
    Dark,
    /// Fairy.
    Fairy,
}

/// Effectiveness multiplier of an attacking element against one defending
/// element, scaled by 10 (0 = immune, 5 = resisted, 10 = neutral,
/// 20 = super effective).
pub fn effectiveness_x10(attack: Element, defend: Element) -> u32 {
    use Element::*;
    match (attack, defend) {
        (Fire, Grass | Ice | Bug | Steel) => 20,
        (Fire, Water | Fire) => 5,

        (Water, Fire | Ground | Rock) => 20,
        (Water, Grass | Water) => 5,

        (Grass, Water | Ground | Rock) => 20,
        (Grass, Fire | Grass | Flying | Bug) => 5,

        (Electric, Water | Flying) => 20,
        (Electric, Grass) => 5,
        (Electric, Ground) => 0,

        (Normal, Rock | Steel) => 5,
        (Normal, Ghost) => 0,

        (Ice, Grass | Ground | Flying | Dragon) => 20,
        (Ice, Fire | Water | Ice) => 5,

        (Fighting, Normal | Ice | Rock | Dark | Steel) => 20,
        (Fighting, Poison | Flying | Psychic | Bug) => 5,

        (Poison, Grass) => 20,
        (Poison, Poison | Ground | Rock | Ghost) => 5,
        (Poison, Steel) => 0,

        (Ground, Fire | Electric | Poison | Rock | Steel) => 20,
        (Ground, Grass | Bug) => 5,
        (Ground, Flying) => 0,

        (Flying, Grass | Fighting | Bug) => 20,
        (Flying, Electric | Rock | Steel) => 5,

        (Psychic, Fighting | Poison) => 20,
        (Psychic, Psychic | Steel) => 5,
        (Psychic, Dark) => 0,

        (Bug, Grass | Psychic | Dark) => 20,
        (Bug, Fire | Fighting | Poison | Flying | Ghost | Steel | Fairy) => 5,

        (Rock, Fire | Ice | Flying | Bug) => 20,
        (Rock, Fighting | Ground | Steel) => 5,

        (Ghost, Psychic | Ghost) => 20,
        (Ghost, Dark) => 5,
        (Ghost, Normal) => 0,

        (Dragon, Dragon) => 20,
        (Dragon, Steel) => 5,
        (Dragon, Fairy) => 0,

        (Steel, Ice | Rock | Fairy) => 20,
        (Steel, Fire | Water | Electric | Steel) => 5,

        (Dark, Psychic | Ghost) => 20,
        (Dark, Fighting | Dark | Fairy) => 5,

        (Fairy, Fighting | Dragon | Dark) => 20,
        (Fairy, Fire | Poison | Steel) => 5,

        _ => 10,
    }
}

/// Combined effectiveness against a one- or two-element defender,
/// scaled by 100.
pub fn combined_effectiveness_x100(
    attack: Element,
    defend1: Element,
    defend2: Option<Element>,
) -> u32 {
    let e1 = effectiveness_x10(attack, defend1);
    let e2 = defend2.map_or(10, |d| effectiveness_x10(attack, d));
    e1 * e2
}

/// Immutable species stat record from the roster.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Species {
    /// Display name, also the wire identifier.
    pub name: String,
    /// Primary element.
    pub element1: Element,
    /// Optional secondary element.
    pub element2: Option<Element>,
    /// Base hit points.
    pub hp: u32,
    /// Physical attack.
    pub attack: u32,
    /// Physical defense.
    pub defense: u32,
    /// Special attack.
    pub sp_attack: u32,
    /// Special defense.
    pub sp_defense: u32,
    /// Speed, used for turn-order negotiation.
    pub speed: u32,
}

/// A battling creature: an independent copy of species stats plus current HP.
///
/// Snapshots are taken once at selection time; `max_hp` is frozen then.
/// Mutating a snapshot never touches the roster master data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreatureSnapshot {
    /// Species display name.
    pub name: String,
    /// Primary element.
    pub element1: Element,
    /// Optional secondary element.
    pub element2: Option<Element>,
    /// Current hit points. May go negative-equivalent (clamped at 0).
    pub hp: u32,
    /// Maximum hit points, frozen at selection time.
    pub max_hp: u32,
    /// Physical attack.
    pub attack: u32,
    /// Physical defense.
    pub defense: u32,
    /// Special attack.
    pub sp_attack: u32,
    /// Special defense.
    pub sp_defense: u32,
    /// Speed.
    pub speed: u32,
}

impl CreatureSnapshot {
    /// Snapshot a species record with full HP.
    pub fn from_species(species: &Species) -> Self {
        Self {
            name: species.name.clone(),
            element1: species.element1,
            element2: species.element2,
            hp: species.hp,
            max_hp: species.hp,
            attack: species.attack,
            defense: species.defense,
            sp_attack: species.sp_attack,
            sp_defense: species.sp_defense,
            speed: species.speed,
        }
    }

    /// Apply damage, clamping HP at zero.
    pub fn apply_damage(&mut self, damage: u32) {
        self.hp = self.hp.saturating_sub(damage);
    }

    /// Whether this creature has fainted.
    pub fn fainted(&self) -> bool {
        self.hp == 0
    }

    /// Does the move's element match one of this creature's elements?
    pub fn has_element(&self, element: Element) -> bool {
        self.element1 == element || self.element2 == Some(element)
    }
}

/// The static data provider: species and move lookup.
///
/// Lookup is case-insensitive. Returned references are immutable; battle
/// code works on [`CreatureSnapshot`] copies.
#[derive(Clone, Debug)]
pub struct Roster {
    species: BTreeMap<String, Species>,
    moves: BTreeMap<String, Move>,
}

impl Roster {
    /// Build the default roster with built-in species and moves.
    pub fn new() -> Self {
        let mut species = BTreeMap::new();
        for s in default_species() {
            species.insert(s.name.to_lowercase(), s);
        }
        let mut moves = BTreeMap::new();
        for m in default_moves() {
            moves.insert(m.name.to_lowercase(), m);
        }
        Self { species, moves }
    }

    /// Add or replace a species record.
    pub fn add_species(&mut self, species: Species) {
        self.species.insert(species.name.to_lowercase(), species);
    }

    /// Add or replace a move record.
    pub fn add_move(&mut self, attack_move: Move) {
        self.moves.insert(attack_move.name.to_lowercase(), attack_move);
    }

    /// Look up a species by name, case-insensitively.
    pub fn get_species(&self, name: &str) -> Option<&Species> {
        self.species.get(&name.to_lowercase())
    }

    /// Look up a move by name, case-insensitively.
    pub fn get_move(&self, name: &str) -> Option<&Move> {
        self.moves.get(&name.to_lowercase())
    }

    /// Take a fresh full-HP snapshot of a species.
    pub fn snapshot(&self, name: &str) -> Option<CreatureSnapshot> {
        self.get_species(name).map(CreatureSnapshot::from_species)
    }

    /// All species display names, sorted.
    pub fn species_names(&self) -> Vec<&str> {
        self.species.values().map(|s| s.name.as_str()).collect()
    }

    /// All move display names, sorted.
    pub fn move_names(&self) -> Vec<&str> {
        self.moves.values().map(|m| m.name.as_str()).collect()
    }
}

impl Default for Roster {
    fn default() -> Self {
        Self::new()
    }
}

fn species(
    name: &str,
    element1: Element,
    element2: Option<Element>,
    stats: [u32; 6],
) -> Species {
    let [hp, attack, defense, sp_attack, sp_defense, speed] = stats;
    Species {
        name: name.to_string(),
        element1,
        element2,
        hp,
        attack,
        defense,
        sp_attack,
        sp_defense,
        speed,
    }
}

/// The built-in species table.
fn default_species() -> Vec<Species> {
    use Element::*;
    vec![
        species("Emberwing", Fire, Some(Flying), [78, 84, 78, 109, 85, 100]),
        species("Tidehorn", Water, None, [79, 83, 100, 85, 105, 78]),
        species("Thornmaw", Grass, Some(Poison), [80, 82, 83, 100, 100, 80]),
        species("Voltpup", Electric, None, [60, 55, 40, 90, 80, 110]),
        species("Stonehide", Rock, Some(Ground), [80, 110, 130, 55, 65, 45]),
        species("Frostfin", Ice, Some(Water), [90, 70, 80, 95, 110, 65]),
        species("Gloomwisp", Ghost, Some(Poison), [60, 65, 60, 130, 75, 110]),
        species("Ironclad", Steel, None, [75, 85, 200, 55, 65, 30]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_lookup() {
        let roster = Roster::new();
        assert!(roster.get_species("emberwing").is_some());
        assert!(roster.get_species("EMBERWING").is_some());
        assert!(roster.get_species("Emberwing").is_some());
        assert!(roster.get_species("MissingNo").is_none());

        assert!(roster.get_move("ice beam").is_some());
        assert!(roster.get_move("Ice Beam").is_some());
        assert!(roster.get_move("Splash").is_none());
    }

    #[test]
    fn test_snapshot_is_independent_copy() {
        let roster = Roster::new();
        let mut snap = roster.snapshot("Tidehorn").unwrap();
        assert_eq!(snap.hp, snap.max_hp);

        snap.apply_damage(50);
        assert_eq!(snap.hp, snap.max_hp - 50);

        // Master data untouched
        let fresh = roster.snapshot("Tidehorn").unwrap();
        assert_eq!(fresh.hp, fresh.max_hp);
    }

    #[test]
    fn test_damage_clamps_at_zero() {
        let roster = Roster::new();
        let mut snap = roster.snapshot("Voltpup").unwrap();
        snap.apply_damage(snap.max_hp * 10);
        assert_eq!(snap.hp, 0);
        assert!(snap.fainted());
    }

    #[test]
    fn test_effectiveness_chart() {
        use Element::*;
        // Super effective
        assert_eq!(effectiveness_x10(Water, Fire), 20);
        assert_eq!(effectiveness_x10(Electric, Flying), 20);
        // Resisted
        assert_eq!(effectiveness_x10(Fire, Water), 5);
        // Immune
        assert_eq!(effectiveness_x10(Electric, Ground), 0);
        assert_eq!(effectiveness_x10(Normal, Ghost), 0);
        // Neutral default
        assert_eq!(effectiveness_x10(Dark, Normal), 10);
    }

    #[test]
    fn test_combined_effectiveness_dual_type() {
        use Element::*;
        // Grass vs Water/Ground: 2.0 * 2.0 = 4.0
        assert_eq!(combined_effectiveness_x100(Grass, Water, Some(Ground)), 400);
        // Electric vs Water/Ground: immune wins
        assert_eq!(combined_effectiveness_x100(Electric, Water, Some(Ground)), 0);
        // Single type is neutral second factor
        assert_eq!(combined_effectiveness_x100(Fire, Grass, None), 200);
    }

    #[test]
    fn test_snapshot_serde_roundtrip() {
        let roster = Roster::new();
        let snap = roster.snapshot("Gloomwisp").unwrap();
        let json = serde_json::to_string(&snap).unwrap();
        let back: CreatureSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snap);
    }
}
