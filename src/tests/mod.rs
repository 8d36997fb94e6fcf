//! Crate-internal test suites
//!
//! - `common`: database and request fixtures
//! - `mocks`: canned completion clients and retrievers
//! - `property`: proptest invariants for the ledger and canonical hashing
//! - `integration`: orchestrator scenarios over a real SQLite file

pub mod common;
pub mod mocks;

mod property;
