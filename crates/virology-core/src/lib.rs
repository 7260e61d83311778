//! Virology Core Library
//!
//! Shared functionality for the virology store:
//! - Configuration resolution and hierarchy
//! - `SQLite` pool helpers and the `define_database!` macro
//! - Clock abstraction and epoch-second conversions
//! - Common error types

pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod tracing_init;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::Config;
pub use error::{Error, Result};
