//! Match-root digest for replay verification.
//!
//! Replaying the same submission sequence must yield identical matches.
//! The match root is a SHA-256 over the fields a replay reproduces, so two
//! runs can be compared without diffing full payloads. Order ids (random
//! UUIDv7) and the wall-clock `matched_at` are excluded.

use gridmatch_types::{Match, OrderSide};
use sha2::{Digest, Sha256};

/// Compute the match root over a sequence of matches.
///
/// Covers match ids and sequences, participants, amounts, prices and the
/// aggressor side, in order.
#[must_use]
pub fn compute_match_root(matches: &[Match]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"gridmatch:match_root:v1:");
    hasher.update((matches.len() as u64).to_le_bytes());

    for m in matches {
        hasher.update(m.id.0.as_bytes());
        hasher.update(m.sequence.to_le_bytes());
        hasher.update((m.buyer.as_str().len() as u64).to_le_bytes());
        hasher.update(m.buyer.as_str().as_bytes());
        hasher.update((m.seller.as_str().len() as u64).to_le_bytes());
        hasher.update(m.seller.as_str().as_bytes());
        hasher.update(m.amount.to_le_bytes());
        hasher.update(m.clearing_price.to_le_bytes());
        hasher.update([match m.aggressor {
            OrderSide::Buy => 0u8,
            OrderSide::Sell => 1u8,
        }]);
    }

    let result = hasher.finalize();
    let mut root = [0u8; 32];
    root.copy_from_slice(&result);
    root
}

#[must_use]
pub fn verify_match_root(matches: &[Match], expected_root: &[u8; 32]) -> bool {
    compute_match_root(matches) == *expected_root
}
