//! Battle Layer
//!
//! Lockstep turn resolution: shared state types and the pure engine that
//! drives the protocol.

pub mod engine;
pub mod state;

pub use engine::{BattleEngine, EngineAction, EngineError};
pub use state::{BattleState, BoostAllocation, Phase, Role, TurnRecord};
