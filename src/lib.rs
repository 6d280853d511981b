//! # Duelgram
//!
//! Peer-to-peer creature battles over lossy UDP: a reliable, ordered,
//! deduplicated messaging layer plus a lockstep turn-resolution protocol
//! in which both peers independently compute every outcome from a shared
//! seed and cross-check each other's figures.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         DUELGRAM                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  └── rng.rs      - Seeded Xorshift128+ PRNG                  │
//! │                                                              │
//! │  data/           - Battle data (deterministic)               │
//! │  ├── species.rs  - Creatures, elements, effectiveness        │
//! │  ├── moves.rs    - Move definitions                          │
//! │  └── damage.rs   - Integer-only damage formula               │
//! │                                                              │
//! │  net/            - Networking (non-deterministic)            │
//! │  ├── codec.rs    - Line-oriented wire format                 │
//! │  ├── message.rs  - Typed message model                       │
//! │  ├── reliability.rs - ACK / retry / dedup bookkeeping        │
//! │  ├── transport.rs   - UDP socket wiring                      │
//! │  ├── discovery.rs   - Broadcast announce and scan            │
//! │  └── relay.rs    - Host-side spectator fan-out               │
//! │                                                              │
//! │  battle/         - Lockstep turn resolution                  │
//! │  ├── state.rs    - Battle and turn state                     │
//! │  └── engine.rs   - Pure protocol state machine               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! The `core/`, `data/`, and `battle/` modules are **100% deterministic**:
//! - No floating-point arithmetic; every modifier is integer-scaled
//! - No HashMap in battle-visible state (BTreeMap for sorted iteration)
//! - All randomness from the seeded Xorshift128+ stream
//!
//! Given the same seed and the same move choices, two peers compute
//! **identical damage figures**, which is what makes the cross-check
//! protocol possible. Everything non-deterministic (sockets, timers,
//! retransmission) lives under `net/`.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod battle;
pub mod core;
pub mod data;
pub mod net;

// Re-export commonly used types
pub use battle::{BattleEngine, BattleState, BoostAllocation, EngineAction, Phase, Role};
pub use core::rng::DeterministicRng;
pub use data::{CreatureSnapshot, Roster};
pub use net::{Payload, TransportEvent, UdpTransport};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Well-known session port
pub const DEFAULT_PORT: u16 = 12345;

/// Fixed receive buffer; larger datagrams are dropped by the receiver
pub const RECV_BUFFER_SIZE: usize = 4096;
