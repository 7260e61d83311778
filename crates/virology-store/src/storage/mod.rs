//! `SQLite` storage for virology test orders, results and submission tokens.
//!
//! ## Tables
//!
//! - **test_orders** - keyed by `ctaToken`, indexed by `testResultPollingToken`
//! - **test_results** - keyed by `testResultPollingToken`
//! - **submission_tokens** - keyed by `diagnosisKeySubmissionToken`
//!
//! Every record carries an `expireAt` epoch-second TTL. Records are never
//! deleted directly during normal operation; their TTL is rewritten and
//! `reap_expired` removes them once it has passed.
//!
//! Multi-record writes go through [`VirologyDatabase::transact_write`], which
//! applies a list of individually conditioned writes all-or-nothing.

mod db;
mod models;
mod queries;
mod transact;

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests;

pub use db::VirologyDatabase;
pub use models::{SubmissionTokenRow, TableCounts, TestOrderRow, TestResultRow};
pub use transact::{ConditionFailure, TransactWriteError, TransactWriteItem};
pub use virology_core::db::DatabaseError;
