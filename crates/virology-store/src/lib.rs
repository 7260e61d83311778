//! Virology Store Library
//!
//! Persistence for virology test orders and their results:
//! - Domain types for tokens, test kits and the pending/available result
//! - Order token generation with checksum and banned-word filtering
//! - SQLite storage for orders, results and submission tokens with
//!   all-or-nothing conditioned writes
//! - `VirologyPersistenceService`: order creation with collision retry,
//!   result recording and expiry marking
//! - `VirologyService`: ordering, result upload, lookup and token exchange

pub mod domain;
pub mod persistence;
pub mod storage;
pub mod tokens;
pub mod virology;
