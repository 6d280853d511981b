//! Networking Layer
//!
//! Wire codec, typed message model, reliability bookkeeping, UDP
//! transport, session discovery, and the host relay.

pub mod codec;
pub mod discovery;
pub mod message;
pub mod relay;
pub mod reliability;
pub mod transport;

pub use codec::WireFrame;
pub use discovery::SessionCandidate;
pub use message::{ChatContent, GameOverReason, Payload};
pub use transport::{Envelope, TransportError, TransportEvent, UdpTransport};
