//! Short room codes players type to find each other.

use rand::Rng;

/// Characters a room code is drawn from. `0/O`, `1/I/L` are left out so
/// codes survive being read aloud or copied by hand.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Length of every room code.
pub const CODE_LEN: usize = 4;

/// Generates a random room code.
///
/// Codes are not checked against live rooms; two rooms can share one.
pub fn generate_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Normalises user input for comparison against generated codes.
pub fn normalize_code(input: &str) -> String {
    input.trim().to_ascii_uppercase()
}
