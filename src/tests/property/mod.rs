//! Property-based tests
//!
//! - `canonical_hash_props`: request hashing ignores key order at every depth
//! - `ledger_props`: random concurrent consume/refund/add sequences never
//!   drive a balance negative and always reconcile with the ledger history
//!
//! Ledger properties open a real database per case, so they run fewer
//! cases than the proptest default. `PROPTEST_CASES` overrides both.

mod canonical_hash_props;
mod ledger_props;
