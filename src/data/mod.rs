//! Static Data Provider
//!
//! Species and move statistics plus the pure damage formula. This is the
//! external collaborator the battle engine consults; it owns no battle
//! state and performs no I/O. The only non-pure input to the damage
//! formula is the roll drawn from the shared deterministic RNG by the
//! caller.

pub mod damage;
pub mod moves;
pub mod species;

pub use damage::{compute_damage, DamageBreakdown};
pub use moves::{Move, MoveCategory};
pub use species::{CreatureSnapshot, Element, Roster, Species};
