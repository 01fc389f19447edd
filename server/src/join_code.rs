//! Join code generation for sessions.
//!
//! Codes are fixed-length uppercase strings drawn from Crockford's Base32
//! alphabet, which leaves out the easily confused I, L, O and U. The random
//! source is passed in so tests can seed it.

use rand::distributions::{Distribution, Uniform};
use rand::Rng;
use shared::JOIN_CODE_LENGTH;

const CROCKFORD: &[u8] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ"; // no I, L, O, U

pub fn generate_join_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    let dist = Uniform::from(0..CROCKFORD.len());

    let mut s = String::with_capacity(JOIN_CODE_LENGTH);
    for _ in 0..JOIN_CODE_LENGTH {
        s.push(CROCKFORD[dist.sample(rng)] as char);
    }
    s
}

/// Canonical form of a code typed by a player
pub fn normalize_join_code(input: &str) -> String {
    input.trim().to_ascii_uppercase()
}
