//! Token generation for test orders.
//!
//! - **checksum** - Crockford base-32 alphabet and Damm check character
//! - **generator** - Fresh order/polling/submission token triples

mod checksum;
mod generator;

pub use checksum::{CROCKFORD_ALPHABET, damm_checksum, validate_cta_token};
pub use generator::{CTA_TOKEN_BODY_LENGTH, TokensGenerator, VirologyTokens};
