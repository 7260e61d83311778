//! Orchestration of the three virology record stores.
//!
//! [`VirologyPersistenceService`] creates orders with collision retry, records
//! results transactionally and marks related records for expiry. Every write
//! that touches more than one record is a single `transact_write`.

mod error;
mod records;
mod service;
mod ttl;


pub use error::{PersistenceError, ResultPersistOutcome};
pub use service::VirologyPersistenceService;
pub use ttl::{VirologyDataTimeToLive, VirologyDataTimeToLiveCalculator};
pub(crate) use ttl::{add_saturating, secs_to_delta};
