//! Request-level operations on test orders and results.
//!
//! [`VirologyService`] ties token generation, the clock and the TTL policy to
//! the persistence layer: ordering a test, accepting lab results, result
//! lookup by polling token and the exchange of an order token for its result.

mod outcome;
mod service;


pub use outcome::{CtaExchangeResponse, CtaExchangeResult, LookupResult, TokenStatus};
pub use service::VirologyService;
