//! Move Table
//!
//! The built-in move list. Moves are identified by display name; lookup is
//! case-insensitive through [`crate::data::Roster`].

use serde::{Deserialize, Serialize};

use super::species::Element;

/// Whether a move uses the physical or special stat pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveCategory {
    /// Uses attack vs. defense.
    Physical,
    /// Uses special attack vs. special defense.
    Special,
}

/// An attack move's static statistics.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Move {
    /// Display name, also the wire identifier.
    pub name: String,
    /// Elemental type of the move.
    pub element: Element,
    /// Base power.
    pub power: u32,
    /// Stat pair selector.
    pub category: MoveCategory,
}

impl Move {
    fn new(name: &str, element: Element, power: u32, category: MoveCategory) -> Self {
        Self {
            name: name.to_string(),
            element,
            power,
            category,
        }
    }
}

/// The default built-in move set.
pub fn default_moves() -> Vec<Move> {
    use Element::*;
    use MoveCategory::*;

    vec![
        Move::new("Thunderbolt", Electric, 90, Special),
        Move::new("Flamethrower", Fire, 90, Special),
        Move::new("Surf", Water, 90, Special),
        Move::new("Earthquake", Ground, 100, Physical),
        Move::new("Slash", Normal, 70, Physical),
        Move::new("Tackle", Normal, 40, Physical),
        Move::new("Ice Beam", Ice, 90, Special),
        Move::new("Mind Spike", Psychic, 90, Special),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_moves_present() {
        let moves = default_moves();
        assert_eq!(moves.len(), 8);
        assert!(moves.iter().any(|m| m.name == "Tackle" && m.power == 40));
        assert!(moves
            .iter()
            .all(|m| m.power > 0 && m.power <= 250));
    }

    #[test]
    fn test_move_serde_roundtrip() {
        let m = Move::new("Surf", Element::Water, 90, MoveCategory::Special);
        let json = serde_json::to_string(&m).unwrap();
        let back: Move = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
    }
}
