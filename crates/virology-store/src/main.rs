//! Virology Store CLI
//!
//! Operator tool over the virology database: order tests, upload results,
//! look results up, exchange order tokens and reap expired records.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

use virology_core::config::{self, Config};
use virology_core::tracing_init::{DEFAULT_FILTER, init_tracing};
use virology_core::{Clock, SystemClock, clock::epoch_seconds};
use virology_store::domain::{
    CtaToken, TestEndDate, TestKit, TestResult, TestResultPollingToken, VirologyResultRequest,
    VirologyTokenGenRequest,
};
use virology_store::persistence::VirologyPersistenceService;
use virology_store::storage::VirologyDatabase;
use virology_store::tokens::TokensGenerator;
use virology_store::virology::VirologyService;

#[derive(Parser, Debug)]
#[command(name = "virology-store")]
#[command(version, about = "Virology test order and result store")]
struct Cli {
    /// Configuration file layered over the global settings.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to SQLite database file.
    #[arg(long, global = true, env = "VIROLOGY_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a test order with a pending result.
    Order,

    /// Record a lab result for an existing order.
    UploadResult {
        /// Polling token of the order.
        #[arg(long)]
        polling_token: String,
        #[command(flatten)]
        result: ResultArgs,
    },

    /// Record a result that has no order yet, generating the order.
    TokenGen {
        #[command(flatten)]
        result: ResultArgs,
    },

    /// Poll for a result by polling token.
    Lookup { polling_token: String },

    /// Exchange an order token for its result.
    Exchange { cta_token: String },

    /// Check whether an order token can still be exchanged.
    Status { cta_token: String },

    /// Delete records whose expiry has passed.
    Reap {
        /// Keep running, reaping at this interval.
        #[arg(long)]
        interval_secs: Option<u64>,
    },
}

#[derive(clap::Args, Debug)]
struct ResultArgs {
    /// Day the test ended, `YYYY-MM-DD`.
    #[arg(long, value_parser = TestEndDate::parse)]
    test_end_date: TestEndDate,

    /// POSITIVE, NEGATIVE or VOID.
    #[arg(long, value_parser = parse_test_result)]
    result: TestResult,

    #[arg(long, default_value = "LAB_RESULT")]
    test_kit: TestKit,
}

fn parse_test_result(value: &str) -> Result<TestResult, String> {
    TestResult::from_wire(&value.to_uppercase()).map_err(|e| e.to_string())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Outcome<T: Serialize> {
    outcome: T,
}

#[allow(clippy::print_stdout)]
fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn open_database(cli: &Cli, config: &Config) -> anyhow::Result<VirologyDatabase> {
    let path = match cli
        .db_path
        .clone()
        .or_else(|| config.store.database_path.clone())
        .or_else(config::database_path)
    {
        Some(path) => path,
        None => default_db_path()?,
    };
    info!(path = %path.display(), "Opening virology database");
    Ok(VirologyDatabase::open(&path).await?)
}

fn default_db_path() -> anyhow::Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(home.join(".virology").join("virology.db"))
}

async fn reap(db: &VirologyDatabase, clock: &dyn Clock) -> anyhow::Result<()> {
    let reaped = db.reap_expired(epoch_seconds(clock.now())).await?;
    if reaped.total() > 0 {
        info!(
            orders = reaped.orders,
            results = reaped.results,
            submission_tokens = reaped.submission_tokens,
            "Expired records reaped"
        );
    }
    print_json(&reaped)
}

async fn reap_every(db: &VirologyDatabase, clock: &dyn Clock, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = reap(db, clock).await {
                    warn!(error = %e, "Reap pass failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Stopping reaper");
                return;
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(DEFAULT_FILTER, cli.log_json);

    let config = config::load_config(cli.config.as_deref())?;
    let db = open_database(&cli, &config).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let tokens = TokensGenerator::new(config.tokens.banned_word_patterns.as_slice())
        .context("Invalid banned word pattern")?;
    let persistence = VirologyPersistenceService::from_config(db.clone(), &config.virology);
    let service =
        VirologyService::from_config(persistence, tokens, Arc::clone(&clock), &config.virology);

    match cli.command {
        Command::Order => print_json(&service.order_test().await?),
        Command::UploadResult {
            polling_token,
            result,
        } => {
            let request = VirologyResultRequest {
                test_result_polling_token: TestResultPollingToken::of(polling_token),
                test_end_date: result.test_end_date,
                test_result: result.result,
                test_kit: result.test_kit,
            };
            let outcome = service.accept_test_result(&request).await?;
            print_json(&Outcome { outcome })
        }
        Command::TokenGen { result } => {
            let request = VirologyTokenGenRequest {
                test_end_date: result.test_end_date,
                test_result: result.result,
                test_kit: result.test_kit,
            };
            print_json(&service.accept_test_result_generating_tokens(&request).await?)
        }
        Command::Lookup { polling_token } => print_json(
            &service
                .lookup_test_result(&TestResultPollingToken::of(polling_token))
                .await?,
        ),
        Command::Exchange { cta_token } => {
            print_json(&service.exchange_cta_token(&CtaToken::of(cta_token)).await?)
        }
        Command::Status { cta_token } => {
            let outcome = service.check_token_status(&cta_token).await?;
            print_json(&Outcome { outcome })
        }
        Command::Reap { interval_secs } => match interval_secs {
            Some(secs) => {
                info!(interval_secs = secs, "Reaping expired records periodically");
                reap_every(&db, clock.as_ref(), Duration::from_secs(secs.max(1))).await;
                Ok(())
            }
            None => reap(&db, clock.as_ref()).await,
        },
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn upload_result_accepts_lowercase_result_and_default_kit() {
        let cli = Cli::try_parse_from([
            "virology-store",
            "upload-result",
            "--polling-token",
            "poll-1",
            "--test-end-date",
            "2020-12-01",
            "--result",
            "positive",
        ])
        .unwrap();

        match cli.command {
            Command::UploadResult {
                polling_token,
                result,
            } => {
                assert_eq!(polling_token, "poll-1");
                assert_eq!(result.result, TestResult::Positive);
                assert_eq!(result.test_kit, TestKit::LabResult);
                assert_eq!(result.test_end_date.show(), "2020-12-01T00:00:00Z");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn unknown_test_kit_is_rejected() {
        let parsed = Cli::try_parse_from([
            "virology-store",
            "token-gen",
            "--test-end-date",
            "2020-12-01",
            "--result",
            "VOID",
            "--test-kit",
            "PCR",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn reap_runs_once_without_interval() {
        let cli = Cli::try_parse_from(["virology-store", "reap"]).unwrap();
        assert!(matches!(cli.command, Command::Reap { interval_secs: None }));

        let cli = Cli::try_parse_from(["virology-store", "reap", "--interval-secs", "60"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Reap {
                interval_secs: Some(60)
            }
        ));
    }
}
