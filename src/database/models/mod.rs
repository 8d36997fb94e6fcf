//! Database Models
//!
//! Row records for the ledger, cache and regeneration tables.

mod cache;
mod ledger;
mod regeneration;

pub use cache::*;
pub use ledger::*;
pub use regeneration::*;
