//! String-backed token newtypes.
//!
//! The three tokens are all plain strings on the wire; distinct types keep an
//! order token from being passed where a polling token is expected.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_token {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn of(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_token!(
    /// Short human-enterable code identifying a test order (the CTA token).
    CtaToken
);

string_token!(
    /// Token a client polls with to retrieve its test result.
    TestResultPollingToken
);

string_token!(
    /// Token authorising a diagnosis key upload for one order.
    DiagnosisKeySubmissionToken
);

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn tokens_serialize_as_bare_strings() {
        let token = CtaToken::of("cc8f0b6z");
        assert_eq!(serde_json::to_string(&token).unwrap(), "\"cc8f0b6z\"");

        let parsed: TestResultPollingToken = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(parsed.as_str(), "abc");
    }

    #[test]
    fn display_is_the_raw_value() {
        let token = DiagnosisKeySubmissionToken::of("sub-1");
        assert_eq!(token.to_string(), "sub-1");
    }
}
