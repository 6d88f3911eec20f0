//! Session id / tracking number generator.
//!
//! Mints globally unique, "monotonic-enough" correlation pairs for each leg
//! (FTD, FTC, Reversal all get their own). Combines a millisecond timestamp
//! with a random suffix rather than a pure counter, since multiple worker
//! processes mint ids concurrently with no shared in-memory state.

use rand::Rng;

/// A freshly minted Gateway correlation pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationPair {
    pub session_id: String,
    pub tracking_number: String,
}

/// Mint a new `(sessionId, trackingNumber)` pair.
///
/// `session_id` is a timestamp-prefixed, lexicographically sortable string so
/// database indexes and log greps stay useful; `tracking_number` is a shorter
/// purely numeric field matching the Gateway's wire format expectations.
pub fn mint_correlation_pair() -> CorrelationPair {
    let now_ms = chrono::Utc::now().timestamp_millis();
    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000);
    CorrelationPair {
        session_id: format!("SES{now_ms:013}{suffix:06}"),
        tracking_number: format!("{:016}", (now_ms as u64).wrapping_mul(1_000_000) + suffix as u64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consecutive_pairs_are_distinct() {
        let a = mint_correlation_pair();
        let b = mint_correlation_pair();
        assert_ne!(a.session_id, b.session_id);
        assert_ne!(a.tracking_number, b.tracking_number);
    }
}
