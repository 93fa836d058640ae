//! Deterministic proposer rotation

use alsania_chain::{Validator, ValidatorSet};

/// Round-robin over the validator set in insertion order: position
/// `(height + round) mod n`. Every node with the same set agrees.
pub fn select_proposer(validators: &ValidatorSet, height: u64, round: u64) -> Option<Validator> {
    let n = validators.len() as u64;
    if n == 0 {
        return None;
    }
    let position = height.wrapping_add(round) % n;
    validators.at(position as usize)
}
