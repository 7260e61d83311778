//! Damm check character over the Crockford base-32 alphabet.
//!
//! The alphabet leaves out `i`, `l`, `o` and `u` so a token read aloud or
//! copied from paper cannot be confused with `1`, `0` or `v`.

/// Lowercase Crockford base-32 digits, in value order.
pub const CROCKFORD_ALPHABET: &[u8; 32] = b"0123456789abcdefghjkmnpqrstvwxyz";

const DAMM_MODULUS: usize = 32;
const DAMM_MASK: usize = 5;

/// Longest string `validate_cta_token` will consider.
const MAX_VALIDATED_LENGTH: usize = 10;

fn digit(c: u8) -> Option<usize> {
    CROCKFORD_ALPHABET.iter().position(|&a| a == c)
}

fn damm_operation(checksum: usize, digit: usize) -> usize {
    let mut result = (checksum ^ digit) << 1;
    if result >= DAMM_MODULUS {
        result = (result ^ DAMM_MASK) % DAMM_MODULUS;
    }
    result
}

/// Check character for `input`, or `None` if it contains a character outside
/// the alphabet.
pub fn damm_checksum(input: &str) -> Option<char> {
    let mut checksum = 0;
    for c in input.bytes() {
        checksum = damm_operation(checksum, digit(c)?);
    }
    Some(char::from(CROCKFORD_ALPHABET[checksum]))
}

/// True when `token` is a plausible order token: non-empty, short, drawn from
/// the alphabet, and carrying a correct trailing check character.
pub fn validate_cta_token(token: &str) -> bool {
    if token.is_empty() || token.len() > MAX_VALIDATED_LENGTH {
        return false;
    }
    damm_checksum(token) == Some('0')
}
