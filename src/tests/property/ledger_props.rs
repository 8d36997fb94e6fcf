//! Property-based tests for the credit ledger
//!
//! Tests invariants:
//! - Credits never go negative under concurrent consume/refund/add
//! - Final balance equals the sum of recorded transaction amounts
//! - Every consume either succeeds or fails with InsufficientCredits

use proptest::prelude::*;

use crate::core::credits::{CreditLedger, CreditSource, LedgerError, OperationKind};
use crate::tests::common::create_test_db;

const USERS: [&str; 3] = ["alice", "bram", "cora"];

#[derive(Debug, Clone)]
enum LedgerOp {
    Consume(usize, OperationKind),
    Refund(usize, OperationKind),
    Add(usize, i64),
}

fn arb_operation_kind() -> impl Strategy<Value = OperationKind> {
    prop::sample::select(OperationKind::ALL.to_vec())
}

fn arb_op() -> impl Strategy<Value = LedgerOp> {
    let user = 0..USERS.len();
    prop_oneof![
        4 => (user.clone(), arb_operation_kind()).prop_map(|(u, k)| LedgerOp::Consume(u, k)),
        1 => (user.clone(), arb_operation_kind()).prop_map(|(u, k)| LedgerOp::Refund(u, k)),
        2 => (user, 1i64..5).prop_map(|(u, n)| LedgerOp::Add(u, n)),
    ]
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Property: concurrent random sequences never produce a negative balance,
    /// and the balance always reconciles with the append-only history
    #[test]
    fn prop_credits_never_negative(
        initial in prop::collection::vec(0i64..3, USERS.len()),
        ops in prop::collection::vec(arb_op(), 1..40),
    ) {
        let rt = runtime();
        rt.block_on(async {
            let (db, _temp) = create_test_db().await;
            let ledger = CreditLedger::new(db);

            for (user, credits) in USERS.iter().zip(&initial) {
                if *credits > 0 {
                    ledger
                        .add_credits(user, *credits, CreditSource::Grant { reason: "seed".into() })
                        .await
                        .unwrap();
                }
            }

            let tasks = ops.into_iter().map(|op| {
                let ledger = ledger.clone();
                tokio::spawn(async move {
                    match op {
                        LedgerOp::Consume(u, kind) => ledger.consume(USERS[u], kind, serde_json::Value::Null).await.map(|_| ()),
                        LedgerOp::Refund(u, kind) => ledger.refund(USERS[u], kind, serde_json::Value::Null).await.map(|_| ()),
                        LedgerOp::Add(u, n) => ledger
                            .add_credits(USERS[u], n, CreditSource::Purchase { reference: "prop".into() })
                            .await
                            .map(|_| ()),
                    }
                })
            });

            for result in futures::future::join_all(tasks).await {
                match result.unwrap() {
                    Ok(()) | Err(LedgerError::InsufficientCredits { .. }) => {}
                    Err(other) => panic!("unexpected ledger error: {other}"),
                }
            }

            for user in USERS {
                let balance = ledger.get_balance(user).await.unwrap();
                assert!(balance >= 0, "{user} went negative: {balance}");

                let history = ledger.transactions(user, i64::MAX).await.unwrap();
                let recorded: i64 = history.iter().map(|t| t.amount).sum();
                assert_eq!(recorded, balance, "{user} balance does not match history");
                assert!(history.iter().all(|t| t.balance_after >= 0));
            }
        });
    }
}
