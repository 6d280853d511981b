//! Damage Formula
//!
//! Pure, integer-only damage computation. The random multiplier is drawn by
//! the caller (one [`crate::core::rng::DeterministicRng::damage_roll`] per
//! turn) and passed in, so the same turn can be recomputed under different
//! boost assumptions without disturbing the shared random sequence.
//!
//! All arithmetic is scaled-integer (no floats): base damage x100, STAB x10,
//! effectiveness x100, roll x10000. Identical inputs produce identical
//! output on every platform.

use super::moves::{Move, MoveCategory};
use super::species::{combined_effectiveness_x100, CreatureSnapshot};

/// Battle level. All creatures fight at the same fixed level.
pub const LEVEL: u32 = 50;

/// Multiplier applied to a boosted stat, as numerator/denominator (3/2).
pub const BOOST_NUM: u32 = 3;
/// Boost multiplier denominator.
pub const BOOST_DEN: u32 = 2;

/// Result of a damage computation, including the stats actually used.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DamageBreakdown {
    /// Final damage dealt.
    pub damage: u32,
    /// Offensive stat used (after any boost).
    pub attack_stat_used: u32,
    /// Defensive stat used (after any boost).
    pub defense_stat_used: u32,
    /// Combined elemental effectiveness, scaled by 100.
    pub effectiveness_x100: u32,
}

/// Compute damage for one attack.
///
/// `attacker_boosted` applies the offensive boost to the stat the move's
/// category selects; `defender_boosted` likewise for the defensive stat.
/// `roll_x10000` is the shared-RNG multiplier in [8500, 10000].
///
/// Pure: no internal randomness, no state.
pub fn compute_damage(
    attacker: &CreatureSnapshot,
    defender: &CreatureSnapshot,
    attack_move: &Move,
    attacker_boosted: bool,
    defender_boosted: bool,
    roll_x10000: u32,
) -> DamageBreakdown {
    let (mut a_stat, mut d_stat) = match attack_move.category {
        MoveCategory::Physical => (attacker.attack, defender.defense),
        MoveCategory::Special => (attacker.sp_attack, defender.sp_defense),
    };

    if attacker_boosted {
        a_stat = a_stat * BOOST_NUM / BOOST_DEN;
    }
    if defender_boosted {
        d_stat = d_stat * BOOST_NUM / BOOST_DEN;
    }
    // A zero defense stat would divide by zero; treat it as 1.
    let d_stat = d_stat.max(1);

    // ((2 * level / 5 + 2) * power * A / D) / 50 + 2, scaled by 100.
    let inner = 2 * LEVEL / 5 + 2;
    let base_x100 =
        (inner as u64 * attack_move.power as u64 * a_stat as u64 * 100) / (50 * d_stat as u64)
            + 200;

    let stab_x10: u64 = if attacker.has_element(attack_move.element) {
        15
    } else {
        10
    };

    let effectiveness_x100 =
        combined_effectiveness_x100(attack_move.element, defender.element1, defender.element2);

    let damage = base_x100 * stab_x10 * effectiveness_x100 as u64 * roll_x10000 as u64
        / (100 * 10 * 100 * 10000);

    DamageBreakdown {
        damage: damage as u32,
        attack_stat_used: a_stat,
        defense_stat_used: d_stat,
        effectiveness_x100,
    }
}
