//! Random token triples for new test orders.

use chrono::{DateTime, Utc};
use rand::RngExt;
use regex::Regex;
use tracing::debug;
use uuid::Uuid;

use super::checksum::{CROCKFORD_ALPHABET, damm_checksum};
use crate::domain::{CtaToken, DiagnosisKeySubmissionToken, TestOrder, TestResultPollingToken};

/// Random characters in an order token, before the check character.
pub const CTA_TOKEN_BODY_LENGTH: usize = 7;

/// The three independently generated tokens of one order attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirologyTokens {
    pub cta_token: CtaToken,
    pub test_result_polling_token: TestResultPollingToken,
    pub diagnosis_key_submission_token: DiagnosisKeySubmissionToken,
}

impl VirologyTokens {
    pub fn into_order(self, expire_at: DateTime<Utc>) -> TestOrder {
        TestOrder::new(
            self.cta_token,
            self.test_result_polling_token,
            self.diagnosis_key_submission_token,
            expire_at,
        )
    }
}

/// Stateless apart from the compiled banned-word filter.
#[derive(Debug, Clone)]
pub struct TokensGenerator {
    banned_words: Vec<Regex>,
}

impl TokensGenerator {
    pub fn new<S: AsRef<str>>(banned_word_patterns: &[S]) -> Result<Self, regex::Error> {
        let banned_words = banned_word_patterns
            .iter()
            .map(|p| Regex::new(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { banned_words })
    }

    /// A generator with no banned-word filter.
    pub const fn unfiltered() -> Self {
        Self {
            banned_words: Vec::new(),
        }
    }

    /// Generate a fresh token triple. Never reuses anything from a previous
    /// call.
    pub fn generate_virology_tokens(&self) -> VirologyTokens {
        VirologyTokens {
            cta_token: CtaToken::of(self.generate_cta_token()),
            test_result_polling_token: TestResultPollingToken::of(Uuid::new_v4().to_string()),
            diagnosis_key_submission_token: DiagnosisKeySubmissionToken::of(
                Uuid::new_v4().to_string(),
            ),
        }
    }

    /// The default order supplier: new tokens on every call, all expiring at
    /// `expire_at`.
    pub fn order_supplier(&self, expire_at: DateTime<Utc>) -> impl FnMut() -> TestOrder + '_ {
        move || self.generate_virology_tokens().into_order(expire_at)
    }

    /// Seven random alphabet characters plus their Damm check character,
    /// redrawn until the result contains no banned word.
    pub fn generate_cta_token(&self) -> String {
        let mut rng = rand::rng();
        loop {
            let mut token: String = (0..CTA_TOKEN_BODY_LENGTH)
                .map(|_| {
                    let idx = rng.random_range(0..CROCKFORD_ALPHABET.len());
                    char::from(CROCKFORD_ALPHABET[idx])
                })
                .collect();
            // Every character came from the alphabet.
            let Some(check) = damm_checksum(&token) else {
                continue;
            };
            token.push(check);

            if self.is_banned_word(&token) {
                debug!("Discarding order token candidate matching a banned word");
                continue;
            }
            return token;
        }
    }

    /// Digits that read like letters are mapped before matching, so `s3x`
    /// is caught by a pattern for `sex`.
    pub fn is_banned_word(&self, token: &str) -> bool {
        let normalised: String = token
            .chars()
            .map(|c| match c {
                '4' => 'a',
                '8' => 'b',
                '3' => 'e',
                '9' => 'g',
                '5' => 's',
                other => other,
            })
            .collect();
        self.banned_words.iter().any(|re| re.is_match(&normalised))
    }
}

impl Default for TokensGenerator {
    fn default() -> Self {
        Self::unfiltered()
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::tokens::validate_cta_token;

    #[test]
    fn cta_tokens_are_short_lowercase_and_checksummed() {
        let generator = TokensGenerator::unfiltered();
        for _ in 0..200 {
            let token = generator.generate_cta_token();
            assert_eq!(token.len(), CTA_TOKEN_BODY_LENGTH + 1);
            assert!(token.bytes().all(|b| CROCKFORD_ALPHABET.contains(&b)));
            assert!(validate_cta_token(&token), "{token}");
        }
    }

    #[test]
    fn polling_and_submission_tokens_are_uuids() {
        let tokens = TokensGenerator::unfiltered().generate_virology_tokens();
        assert!(Uuid::parse_str(tokens.test_result_polling_token.as_str()).is_ok());
        assert!(Uuid::parse_str(tokens.diagnosis_key_submission_token.as_str()).is_ok());
        assert_ne!(
            tokens.test_result_polling_token.as_str(),
            tokens.diagnosis_key_submission_token.as_str()
        );
    }

    #[test]
    fn every_call_produces_new_tokens() {
        let generator = TokensGenerator::unfiltered();
        let a = generator.generate_virology_tokens();
        let b = generator.generate_virology_tokens();
        assert_ne!(a.test_result_polling_token, b.test_result_polling_token);
        assert_ne!(a.diagnosis_key_submission_token, b.diagnosis_key_submission_token);
    }

    #[test]
    fn banned_words_match_after_digit_normalisation() {
        let generator = TokensGenerator::new(&["sex"]).unwrap();
        assert!(generator.is_banned_word("a53x1234"));
        assert!(generator.is_banned_word("sex00000"));
        assert!(!generator.is_banned_word("abcdefgh"));
    }

    #[test]
    fn generated_tokens_never_contain_banned_words() {
        // Bans every token containing a zero, roughly a fifth of candidates.
        let generator = TokensGenerator::new(&["0"]).unwrap();
        for _ in 0..100 {
            assert!(!generator.generate_cta_token().contains('0'));
        }
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        assert!(TokensGenerator::new(&["(unclosed"]).is_err());
    }

    #[test]
    fn supplier_stamps_the_given_expiry() {
        let expire_at = DateTime::from_timestamp(1_609_200_000, 0).unwrap();
        let generator = TokensGenerator::unfiltered();
        let mut supplier = generator.order_supplier(expire_at);

        let first = supplier();
        let second = supplier();
        assert_eq!(first.expire_at, expire_at);
        assert_eq!(first.download_count, None);
        assert_ne!(first.cta_token, second.cta_token);
    }
}
