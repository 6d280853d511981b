//! Reliability Bookkeeping
//!
//! The socket-free core of the reliable channel: sequence assignment, the
//! pending-acknowledgment table, the duplicate-suppression set, and the
//! resend sweep. Time comes in as an argument so every decision is
//! testable without a clock or a socket; `transport.rs` owns the I/O.

use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// How long an unacknowledged send waits before retransmission.
pub const RESEND_TIMEOUT: Duration = Duration::from_millis(500);

/// Retransmissions attempted before the peer is declared gone.
pub const MAX_RETRIES: u32 = 3;

/// One send awaiting acknowledgment. The original encoded bytes are kept
/// so every retransmission is identical to the first attempt.
#[derive(Clone, Debug)]
struct PendingAck {
    bytes: Vec<u8>,
    sent_at: Instant,
    retries: u32,
}

/// What the sweep decided for one pending send.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SweepAction {
    /// Send these bytes again.
    Retransmit { sequence: u64, bytes: Vec<u8> },
    /// Retries exhausted; the entry has been dropped.
    GiveUp { sequence: u64 },
}

/// Sequence counter, pending table, and dedup set for one session.
#[derive(Debug, Default)]
pub struct ReliabilityState {
    last_sequence: u64,
    pending: BTreeMap<u64, PendingAck>,
    /// Grows for the session lifetime; duplicates must stay suppressed
    /// no matter how late they arrive.
    seen: HashSet<(SocketAddr, u64)>,
}

impl ReliabilityState {
    /// Fresh state for a new session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next outbound sequence number. The first call
    /// returns 1.
    pub fn next_sequence(&mut self) -> u64 {
        self.last_sequence += 1;
        self.last_sequence
    }

    /// Register an outbound reliable send for acknowledgment tracking.
    pub fn register(&mut self, sequence: u64, bytes: Vec<u8>, now: Instant) {
        self.pending.insert(
            sequence,
            PendingAck {
                bytes,
                sent_at: now,
                retries: 0,
            },
        );
    }

    /// Handle an inbound acknowledgment. Late or duplicate ACKs match
    /// nothing and are ignored.
    pub fn acknowledge(&mut self, sequence: u64) -> bool {
        match self.pending.remove(&sequence) {
            Some(_) => {
                debug!(sequence, "delivery confirmed");
                true
            }
            None => false,
        }
    }

    /// First sighting of `(source, sequence)`? Records it either way.
    pub fn check_dedup(&mut self, source: SocketAddr, sequence: u64) -> bool {
        self.seen.insert((source, sequence))
    }

    /// Sweep the pending table: retransmit every entry older than
    /// [`RESEND_TIMEOUT`], dropping entries whose retries are spent.
    pub fn sweep(&mut self, now: Instant) -> Vec<SweepAction> {
        let mut actions = Vec::new();
        let mut exhausted = Vec::new();

        for (&sequence, entry) in self.pending.iter_mut() {
            if now.duration_since(entry.sent_at) < RESEND_TIMEOUT {
                continue;
            }
            if entry.retries >= MAX_RETRIES {
                exhausted.push(sequence);
                continue;
            }
            entry.retries += 1;
            entry.sent_at = now;
            debug!(sequence, retry = entry.retries, "retransmitting");
            actions.push(SweepAction::Retransmit {
                sequence,
                bytes: entry.bytes.clone(),
            });
        }

        for sequence in exhausted {
            warn!(sequence, "retries exhausted, giving up");
            self.pending.remove(&sequence);
            actions.push(SweepAction::GiveUp { sequence });
        }

        actions
    }

    /// Unacknowledged sends still in flight.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Clear everything for a fresh session.
    pub fn reset(&mut self) {
        self.last_sequence = 0;
        self.pending.clear();
        self.seen.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    #[test]
    fn test_sequences_start_at_one_and_increase() {
        let mut state = ReliabilityState::new();
        assert_eq!(state.next_sequence(), 1);
        assert_eq!(state.next_sequence(), 2);
        assert_eq!(state.next_sequence(), 3);
    }

    #[test]
    fn test_ack_removes_pending() {
        let mut state = ReliabilityState::new();
        let now = Instant::now();
        let seq = state.next_sequence();
        state.register(seq, b"payload".to_vec(), now);

        assert_eq!(state.pending_count(), 1);
        assert!(state.acknowledge(seq));
        assert_eq!(state.pending_count(), 0);
    }

    #[test]
    fn test_late_ack_is_noop() {
        let mut state = ReliabilityState::new();
        assert!(!state.acknowledge(99));
        assert!(!state.acknowledge(99));
    }

    #[test]
    fn test_sweep_retransmits_after_timeout() {
        let mut state = ReliabilityState::new();
        let start = Instant::now();
        state.register(1, b"hello".to_vec(), start);

        // Before the timeout nothing happens.
        assert!(state.sweep(start + Duration::from_millis(100)).is_empty());

        let actions = state.sweep(start + RESEND_TIMEOUT);
        assert_eq!(
            actions,
            vec![SweepAction::Retransmit {
                sequence: 1,
                bytes: b"hello".to_vec()
            }]
        );
        // The retransmission resets the timer.
        assert!(state
            .sweep(start + RESEND_TIMEOUT + Duration::from_millis(100))
            .is_empty());
    }

    #[test]
    fn test_sweep_gives_up_after_max_retries() {
        let mut state = ReliabilityState::new();
        let start = Instant::now();
        state.register(7, b"doomed".to_vec(), start);

        let mut now = start;
        for _ in 0..MAX_RETRIES {
            now += RESEND_TIMEOUT;
            let actions = state.sweep(now);
            assert!(matches!(actions[0], SweepAction::Retransmit { sequence: 7, .. }));
        }

        now += RESEND_TIMEOUT;
        assert_eq!(state.sweep(now), vec![SweepAction::GiveUp { sequence: 7 }]);
        assert_eq!(state.pending_count(), 0);
        // The entry is gone; later sweeps stay quiet.
        assert!(state.sweep(now + RESEND_TIMEOUT).is_empty());
    }

    #[test]
    fn test_dedup_is_per_source() {
        let mut state = ReliabilityState::new();
        assert!(state.check_dedup(addr(5000), 1));
        assert!(!state.check_dedup(addr(5000), 1));
        // Same sequence from a different source is a new message.
        assert!(state.check_dedup(addr(5001), 1));
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut state = ReliabilityState::new();
        let seq = state.next_sequence();
        state.register(seq, b"x".to_vec(), Instant::now());
        state.check_dedup(addr(5000), seq);

        state.reset();
        assert_eq!(state.next_sequence(), 1);
        assert_eq!(state.pending_count(), 0);
        assert!(state.check_dedup(addr(5000), 1));
    }

    proptest! {
        // However a stream of sequence numbers is duplicated and
        // reordered, each (source, sequence) pair passes dedup exactly
        // once.
        #[test]
        fn prop_dedup_accepts_each_pair_once(
            deliveries in proptest::collection::vec((0u16..4, 1u64..20), 1..200)
        ) {
            let mut state = ReliabilityState::new();
            let mut accepted = HashSet::new();
            for (source, sequence) in deliveries {
                let fresh = state.check_dedup(addr(5000 + source), sequence);
                prop_assert_eq!(fresh, accepted.insert((source, sequence)));
            }
        }

        // Retransmitted bytes are always identical to the registered
        // original.
        #[test]
        fn prop_retransmission_preserves_bytes(payload in proptest::collection::vec(any::<u8>(), 0..64)) {
            let mut state = ReliabilityState::new();
            let start = Instant::now();
            state.register(1, payload.clone(), start);
            let actions = state.sweep(start + RESEND_TIMEOUT);
            prop_assert_eq!(actions, vec![SweepAction::Retransmit { sequence: 1, bytes: payload }]);
        }
    }
}
