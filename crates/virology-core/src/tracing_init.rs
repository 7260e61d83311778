//! Logging setup for the virology store binary.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Store operations at info, `sqlx` statement logging kept quiet.
pub const DEFAULT_FILTER: &str = "virology_store=info,virology_core=info,sqlx=warn";

/// `RUST_LOG` when set and valid, `default_filter` otherwise.
fn env_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

/// Install the global subscriber.
///
/// Logs go to stderr so the JSON records printed on stdout stay parseable.
/// With `log_json` every log line is a JSON object too, carrying the token
/// fields (`cta_token`, `polling_token`, ...) as structured keys.
pub fn init_tracing(default_filter: &str, log_json: bool) {
    let registry = tracing_subscriber::registry().with(env_filter(default_filter));
    if log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_parses() {
        let filter = EnvFilter::new(DEFAULT_FILTER);
        assert!(filter.to_string().contains("virology_store=info"));
    }
}
