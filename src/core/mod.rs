//! Core deterministic primitives.
//!
//! Everything here is designed for perfect cross-platform determinism:
//! identical seeds must yield identical damage figures on both peers, or
//! every turn would end in a discrepancy.

pub mod rng;

pub use rng::{derive_session_seed, DeterministicRng};
