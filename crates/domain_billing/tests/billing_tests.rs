//! Comprehensive tests for domain_billing

use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use core_kernel::{CreditRate, Credits, ProjectId};
use domain_metering::{LineParser, Measurement, MetricDescriptor, MetricRegistry, Timestamp};

use domain_billing::{
    AttributeSyncClient, BillingTransaction, Calculation, CreditCalculator,
    GroupLedgerState, HistoryRecorder, HistoryStore, InMemoryAttributeStore,
    InMemoryHistoryStore, BillingHistoryEntry, Mutation, NotificationPolicy, RetryPolicy,
    SkipReason, SyncError, Threshold, TransactionOutcome, UpdateKind, AppendOutcome,
};

fn project() -> ProjectId {
    ProjectId::new("demo").unwrap()
}

fn vcpu_registry() -> Arc<MetricRegistry> {
    let mut registry = MetricRegistry::new();
    registry
        .register(MetricDescriptor::cumulative(
            "vcpu",
            "cpu",
            CreditRate::new(dec!(0.001)).unwrap(),
        ))
        .unwrap();
    Arc::new(registry)
}

fn fast_retries() -> RetryPolicy {
    RetryPolicy {
        max_conflicts: 3,
        max_unavailable_retries: 3,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
    }
}

async fn seeded_store(granted: Decimal) -> Arc<InMemoryAttributeStore> {
    let store = Arc::new(InMemoryAttributeStore::new());
    store
        .insert(GroupLedgerState::new(project(), Credits::new(granted)))
        .await;
    store
}

async fn bill(
    client: &AttributeSyncClient,
    billing: &BillingTransaction,
    measurement: &Measurement,
) -> Result<Credits, SyncError> {
    let outcome = client
        .transact(&measurement.project, |ledger| billing.plan(measurement, ledger))
        .await?;
    Ok(match outcome {
        TransactionOutcome::Committed { payload, .. } => payload.delta,
        TransactionOutcome::Skipped(_) => Credits::zero(),
    })
}

// ============================================================================
// Worked Example
// ============================================================================

mod worked_example_tests {
    use super::*;

    #[tokio::test]
    async fn test_baseline_then_hour_then_duplicate() {
        let parser = LineParser::new(vcpu_registry());
        let store = seeded_store(dec!(1000)).await;
        let client = AttributeSyncClient::new(store.clone(), fast_retries());
        let billing = BillingTransaction::default();

        let first = parser
            .parse("vcpu,project=demo value=3600 1577836800000000000")
            .unwrap();
        let second = parser
            .parse("vcpu,project=demo value=7200 1577840400000000000")
            .unwrap();

        assert!(bill(&client, &billing, &first).await.unwrap().is_zero());
        let ledger = store.ledger(&project()).await.unwrap();
        assert!(ledger.credits_used.is_zero());
        assert_eq!(ledger.cursor("vcpu").unwrap().last_value, dec!(3600));

        assert_eq!(bill(&client, &billing, &second).await.unwrap().amount(), dec!(3.6));
        assert_eq!(
            store.ledger(&project()).await.unwrap().credits_used.amount(),
            dec!(3.6)
        );

        assert!(bill(&client, &billing, &second).await.unwrap().is_zero());
        assert_eq!(
            store.ledger(&project()).await.unwrap().credits_used.amount(),
            dec!(3.6)
        );
    }
}

// ============================================================================
// Staleness and Counter Reset Tests
// ============================================================================

mod ordering_tests {
    use super::*;

    fn sample(value: Decimal, ts: i64) -> Measurement {
        let registry = vcpu_registry();
        Measurement {
            project: project(),
            resource: None,
            metric: registry.resolve("vcpu").unwrap(),
            value,
            timestamp: Timestamp::from_nanos(ts),
        }
    }

    fn apply(state: &GroupLedgerState, m: &Measurement) -> GroupLedgerState {
        match CreditCalculator::default().calculate(m, state).unwrap() {
            Calculation::Update { state, .. } => state,
            Calculation::Skip(_) => state.clone(),
        }
    }

    #[test]
    fn test_late_lower_sample_is_stale_not_reset() {
        let ledger = GroupLedgerState::new(project(), Credits::new(dec!(100)));
        let ledger = apply(&ledger, &sample(dec!(1000), 10));
        let ledger = apply(&ledger, &sample(dec!(3000), 30));

        // sample from t=20 delivered after t=30
        let late = CreditCalculator::default()
            .calculate(&sample(dec!(2000), 20), &ledger)
            .unwrap();
        assert!(matches!(late, Calculation::Skip(SkipReason::Stale { .. })));
    }

    #[test]
    fn test_real_reset_bills_from_zero() {
        let ledger = GroupLedgerState::new(project(), Credits::new(dec!(100)));
        let ledger = apply(&ledger, &sample(dec!(5000), 10));

        let result = CreditCalculator::default()
            .calculate(&sample(dec!(1000), 20), &ledger)
            .unwrap();
        let Calculation::Update { kind, delta, .. } = result else {
            panic!("expected update");
        };
        assert_eq!(kind, UpdateKind::CounterReset);
        assert_eq!(delta.amount(), dec!(1));
    }

    #[test]
    fn test_usage_after_small_reset_is_billed_in_full() {
        let ledger = GroupLedgerState::new(project(), Credits::new(dec!(100)));
        let ledger = apply(&ledger, &sample(dec!(1000), 10));

        // restarted counter at 4 units bills 0.004 credits, rounded away
        let ledger = apply(&ledger, &sample(dec!(4), 20));
        assert_eq!(ledger.cursor("vcpu").unwrap().last_value, dec!(4));
        assert!(ledger.credits_used.is_zero());

        // 1496 units since the reset
        let ledger = apply(&ledger, &sample(dec!(1500), 30));
        assert_eq!(ledger.credits_used.amount(), dec!(1.50));
        assert_eq!(ledger.cursor("vcpu").unwrap().last_value, dec!(1500));
    }
}

// ============================================================================
// Sync Client Tests
// ============================================================================

mod sync_tests {
    use super::*;

    fn grant_more(ledger: &GroupLedgerState) -> Result<Mutation<(), ()>, domain_billing::BillingError> {
        let mut next = ledger.clone();
        next.credits_granted = next.credits_granted + Credits::new(dec!(1));
        Ok(Mutation::Write(next, ()))
    }

    #[tokio::test]
    async fn test_conflicts_exhausted_leave_ledger_unchanged() {
        let store = seeded_store(dec!(10)).await;
        let before = store.ledger(&project()).await.unwrap();
        store.inject_conflicts(3).await;

        let client = AttributeSyncClient::new(store.clone(), fast_retries());
        let result = client.transact(&project(), grant_more).await;

        assert!(matches!(
            result,
            Err(SyncError::ConcurrencyExhausted { attempts: 3, .. })
        ));
        assert_eq!(store.ledger(&project()).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_conflict_then_commit_recomputes() {
        let store = seeded_store(dec!(10)).await;
        store.inject_conflicts(2).await;

        let client = AttributeSyncClient::new(store.clone(), fast_retries());
        let mut calls = 0;
        let outcome = client
            .transact(&project(), |ledger| {
                calls += 1;
                grant_more(ledger)
            })
            .await
            .unwrap();

        assert!(matches!(outcome, TransactionOutcome::Committed { conflicts: 2, .. }));
        assert_eq!(calls, 3);
        assert_eq!(
            store.ledger(&project()).await.unwrap().credits_granted.amount(),
            dec!(11)
        );
    }

    #[tokio::test]
    async fn test_recompute_sees_concurrent_write() {
        let store = Arc::new(
            InMemoryAttributeStore::new().with_latency(Duration::from_millis(50)),
        );
        store
            .insert(GroupLedgerState::new(project(), Credits::new(dec!(10))))
            .await;

        let other = store.clone();
        let interloper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            other
                .update(&project(), |s| s.credits_used = Credits::new(dec!(4)))
                .await
                .unwrap();
        });

        let client = AttributeSyncClient::new(store.clone(), fast_retries());
        let mut seen = Vec::new();
        client
            .transact(&project(), |ledger| {
                seen.push(ledger.credits_used);
                let mut next = ledger.clone();
                next.credits_used = next.credits_used + Credits::new(dec!(1));
                Ok::<_, domain_billing::BillingError>(Mutation::<(), ()>::Write(next, ()))
            })
            .await
            .unwrap();
        interloper.await.unwrap();

        assert_eq!(seen.first().map(|c| c.amount()), Some(dec!(0)));
        assert_eq!(seen.last().map(|c| c.amount()), Some(dec!(4)));
        assert_eq!(
            store.ledger(&project()).await.unwrap().credits_used.amount(),
            dec!(5)
        );
    }

    #[tokio::test]
    async fn test_outage_within_budget_is_retried() {
        let store = seeded_store(dec!(10)).await;
        store.inject_unavailable_fetches(2).await;
        store.inject_unavailable_writes(1).await;

        let client = AttributeSyncClient::new(store.clone(), fast_retries());
        assert!(client.transact(&project(), grant_more).await.is_ok());
    }

    #[tokio::test]
    async fn test_outage_beyond_budget_surfaces_unavailable() {
        let store = seeded_store(dec!(10)).await;
        store.inject_unavailable_fetches(10).await;

        let client = AttributeSyncClient::new(store.clone(), fast_retries());
        let result = client.transact(&project(), grant_more).await;
        assert!(matches!(
            result,
            Err(SyncError::StoreUnavailable { attempts: 4, .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_project_is_not_found() {
        let store = Arc::new(InMemoryAttributeStore::new());
        let client = AttributeSyncClient::new(store, fast_retries());
        let result = client.transact(&project(), grant_more).await;
        assert!(matches!(result, Err(SyncError::ProjectNotFound(p)) if p == project()));
    }

    #[tokio::test]
    async fn test_abort_signal_cuts_backoff() {
        let store = seeded_store(dec!(10)).await;
        store.inject_unavailable_fetches(10).await;

        let (abort_tx, abort_rx) = watch::channel(false);
        let slow = RetryPolicy {
            initial_backoff: Duration::from_secs(60),
            max_backoff: Duration::from_secs(60),
            ..fast_retries()
        };
        let client = AttributeSyncClient::new(store, slow).with_abort_signal(abort_rx);

        let handle = tokio::spawn(async move { client.transact(&project(), grant_more).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        abort_tx.send(true).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("transaction did not stop")
            .unwrap();
        assert!(matches!(result, Err(SyncError::Aborted(_))));
    }
}

// ============================================================================
// History Tests
// ============================================================================

mod history_tests {
    use super::*;

    fn entry(ts: i64) -> BillingHistoryEntry {
        BillingHistoryEntry {
            project: project(),
            timestamp: Timestamp::from_nanos(ts),
            metric: "vcpu".to_string(),
            metric_friendly_name: "cpu".to_string(),
            delta: Credits::new(dec!(1.5)),
            credits_left: Credits::new(dec!(8.5)),
        }
    }

    #[tokio::test]
    async fn test_recorder_reports_duplicates() {
        let store = Arc::new(InMemoryHistoryStore::new());
        let recorder = HistoryRecorder::new(store.clone());

        assert_eq!(recorder.record(&entry(1)).await, Some(AppendOutcome::Appended));
        assert_eq!(recorder.record(&entry(1)).await, Some(AppendOutcome::DuplicateIgnored));
        assert_eq!(recorder.record(&entry(2)).await, Some(AppendOutcome::Appended));
        assert_eq!(store.entries(&project()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_recorder_swallows_outage() {
        let store = Arc::new(InMemoryHistoryStore::new());
        store.inject_unavailable_appends(1).await;
        let recorder = HistoryRecorder::new(store.clone());

        assert_eq!(recorder.record(&entry(1)).await, None);
        assert!(store.is_empty().await);
    }
}

// ============================================================================
// Notification Tests
// ============================================================================

mod notification_tests {
    use super::*;

    #[tokio::test]
    async fn test_marker_committed_with_billing() {
        let store = seeded_store(dec!(10)).await;
        let client = AttributeSyncClient::new(store.clone(), fast_retries());
        let metric = Arc::new(MetricDescriptor::instantaneous(
            "egress",
            "net",
            CreditRate::new(dec!(1)).unwrap(),
        ));
        let billing = BillingTransaction::new(
            CreditCalculator::default(),
            NotificationPolicy::new(vec![Threshold::Absolute(Credits::new(dec!(5)))]),
        );
        let m = Measurement {
            project: project(),
            resource: None,
            metric,
            value: dec!(6),
            timestamp: Timestamp::from_nanos(1),
        };

        let outcome = client
            .transact(&project(), |ledger| billing.plan(&m, ledger))
            .await
            .unwrap();
        let TransactionOutcome::Committed { payload, state, .. } = outcome else {
            panic!("expected commit");
        };
        assert!(payload.crossing.is_some());
        assert_eq!(
            state.last_notified_threshold,
            Some(Threshold::Absolute(Credits::new(dec!(5))))
        );
        assert_eq!(
            store.ledger(&project()).await.unwrap().last_notified_threshold,
            state.last_notified_threshold
        );
    }
}

// ============================================================================
// Property Tests
// ============================================================================

mod property_tests {
    use super::*;

    fn counter_sample(rate: Decimal, value: u64, ts: i64) -> Measurement {
        Measurement {
            project: project(),
            resource: None,
            metric: Arc::new(MetricDescriptor::cumulative(
                "vcpu",
                "cpu",
                CreditRate::new(rate).unwrap(),
            )),
            value: Decimal::from(value),
            timestamp: Timestamp::from_nanos(ts),
        }
    }

    proptest! {
        #[test]
        fn linear_billing_law(
            rate_cents in 1i64..1_000i64,
            v0 in 0u64..1_000_000u64,
            step in 0u64..1_000_000u64,
        ) {
            let rate = Decimal::new(rate_cents, 2);
            let calc = CreditCalculator::default();
            let ledger = GroupLedgerState::new(project(), Credits::new(dec!(1000000000)));

            let Calculation::Update { state, .. } =
                calc.calculate(&counter_sample(rate, v0, 1), &ledger).unwrap()
            else {
                panic!("baseline must update");
            };
            let second = calc.calculate(&counter_sample(rate, v0 + step, 2), &state).unwrap();

            prop_assert_eq!(second.delta().amount(), Decimal::from(step) * rate);
        }

        #[test]
        fn stale_samples_never_change_ledger(
            value in 0u64..1_000_000u64,
            stale_value in 0u64..1_000_000u64,
            ts in 1i64..1_000_000i64,
            back in 0i64..1_000i64,
        ) {
            let calc = CreditCalculator::default();
            let ledger = GroupLedgerState::new(project(), Credits::new(dec!(1000)));
            let Calculation::Update { state, .. } =
                calc.calculate(&counter_sample(dec!(1), value, ts), &ledger).unwrap()
            else {
                panic!("baseline must update");
            };

            let result = calc
                .calculate(&counter_sample(dec!(1), stale_value, ts - back), &state)
                .unwrap();
            let is_stale = matches!(result, Calculation::Skip(SkipReason::Stale { .. }));
            prop_assert!(is_stale);
        }

        #[test]
        fn decreasing_balance_notifies_once(
            spends in proptest::collection::vec(1i64..40i64, 1..30)
        ) {
            let policy = NotificationPolicy::default();
            let mut ledger = GroupLedgerState::new(project(), Credits::new(dec!(100)));
            let mut notified = 0;

            for spend in spends {
                let mut next = ledger.clone();
                next.credits_used = next.credits_used + Credits::new(Decimal::from(spend));
                if policy.evaluate(&ledger, &mut next).unwrap().is_some() {
                    notified += 1;
                }
                ledger = next;
            }

            let crossed = ledger.credits_left().unwrap().amount() <= dec!(50);
            prop_assert_eq!(notified, usize::from(crossed));
        }
    }
}
