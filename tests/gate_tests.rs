//! Admission gate integration tests

mod common;

#[cfg(test)]
mod tests {
    use super::common::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use launchgate::error::{ExecutorError, WalletError};
    use launchgate::execution::Executor;
    use launchgate::gate::{AdmissionGate, GateConfig, WalletBalance};
    use launchgate::persistence::{DeploymentStore, ReconcileQueue};
    use launchgate::summary::{SummaryConfig, SummaryStore};
    use launchgate::types::{ActionSpec, AdmissionResult, RejectReason};
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;

    struct Setup {
        gate: Arc<AdmissionGate>,
        store: Arc<FlakyStore>,
        summary: Arc<SummaryStore>,
        reconcile: Arc<ReconcileQueue>,
    }

    fn setup(wallet: Arc<dyn WalletBalance>, executor: Arc<dyn Executor>) -> Setup {
        let store = Arc::new(FlakyStore::new());
        let summary = Arc::new(SummaryStore::ephemeral(SummaryConfig::default()));
        let reconcile = Arc::new(ReconcileQueue::new());
        let gate = AdmissionGate::new(
            GateConfig::default(),
            store.clone(),
            executor,
            wallet,
            summary.clone(),
            reconcile.clone(),
        );
        Setup {
            gate: Arc::new(gate),
            store,
            summary,
            reconcile,
        }
    }

    fn funded() -> Arc<MockWallet> {
        let mut wallet = MockWallet::new();
        wallet.expect_spendable_balance().returning(|| Ok(5.0));
        Arc::new(wallet)
    }

    // ============================================================================
    // Dedup
    // ============================================================================

    #[tokio::test]
    async fn same_trigger_is_admitted_at_most_once() {
        let executor = Arc::new(SlowExecutor::new(Duration::ZERO));
        let s = setup(funded(), executor.clone());
        let t0 = Utc::now();
        let url = "https://x.com/whale/status/1800000000000000042";

        let mut admitted = 0;
        for i in 0..5 {
            let at = t0 + ChronoDuration::seconds(i * 600);
            let result = s.gate.propose_at(proposal("DUP", Some(url)), at).await;
            if result.is_admitted() {
                admitted += 1;
            } else {
                assert!(matches!(
                    result.reject_reason(),
                    Some(RejectReason::Duplicate { .. })
                ));
            }
        }
        assert_eq!(admitted, 1);
        assert_eq!(executor.calls(), 1);
    }

    #[tokio::test]
    async fn duplicate_surfaces_existing_label() {
        let s = setup(funded(), Arc::new(SlowExecutor::new(Duration::ZERO)));
        let t0 = Utc::now();
        let AdmissionResult::Admitted { record, persisted } =
            s.gate.propose_at(proposal("FIRST", Some("9001")), t0).await
        else {
            panic!("expected admission");
        };
        assert!(persisted);

        let again = s
            .gate
            .propose_at(
                proposal("SECOND", Some("https://twitter.com/x/status/9001")),
                t0 + ChronoDuration::hours(2),
            )
            .await;
        match again {
            AdmissionResult::Rejected {
                reason: RejectReason::Duplicate { existing_label },
                detail,
            } => {
                assert_eq!(existing_label, record.label());
                assert!(detail.contains("$FIRST"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn store_outage_fails_open_on_dedup() {
        let s = setup(funded(), Arc::new(SlowExecutor::new(Duration::ZERO)));
        s.store.fail_reads.store(true, Ordering::SeqCst);

        let result = s.gate.propose(proposal("OPEN", Some("123"))).await;
        assert!(result.is_admitted());
    }

    #[tokio::test]
    async fn failed_write_back_is_queued_and_still_deduplicated() {
        let s = setup(funded(), Arc::new(SlowExecutor::new(Duration::ZERO)));
        s.store.fail_saves.store(true, Ordering::SeqCst);
        let t0 = Utc::now();

        let result = s.gate.propose_at(proposal("LOST", Some("555")), t0).await;
        let AdmissionResult::Admitted { persisted, .. } = result else {
            panic!("expected admission");
        };
        assert!(!persisted);
        assert_eq!(s.reconcile.len().await, 1);
        assert_eq!(s.summary.snapshot().await.total_deployed, 1);

        let again = s
            .gate
            .propose_at(proposal("LOST", Some("555")), t0 + ChronoDuration::seconds(241))
            .await;
        assert!(matches!(
            again.reject_reason(),
            Some(RejectReason::Duplicate { .. })
        ));

        // Store recovers; the next stale-cache proposal flushes the queue
        s.store.fail_saves.store(false, Ordering::SeqCst);
        s.gate
            .propose_at(proposal("NEXT", None), t0 + ChronoDuration::hours(1))
            .await;
        assert!(s.reconcile.is_empty().await);
        assert!(s.store.find_by_trigger("555").await.unwrap().is_some());
    }

    // ============================================================================
    // Cooldown
    // ============================================================================

    #[tokio::test]
    async fn cooldown_reports_rounded_up_wait() {
        let s = setup(funded(), Arc::new(SlowExecutor::new(Duration::ZERO)));
        let t0 = Utc::now();
        assert!(s.gate.propose_at(proposal("A", None), t0).await.is_admitted());

        let result = s
            .gate
            .propose_at(proposal("B", None), t0 + ChronoDuration::milliseconds(100_250))
            .await;
        assert_eq!(
            result.reject_reason(),
            Some(&RejectReason::Cooldown { wait_secs: 140 })
        );

        let result = s
            .gate
            .propose_at(proposal("B", None), t0 + ChronoDuration::seconds(300))
            .await;
        assert!(result.is_admitted());
    }

    #[tokio::test]
    async fn concurrent_proposals_admit_exactly_one() {
        let executor = Arc::new(SlowExecutor::new(Duration::from_millis(50)));
        let s = setup(funded(), executor.clone());
        let now = Utc::now();

        let mut handles = Vec::new();
        for i in 0..4 {
            let gate = s.gate.clone();
            let trigger = format!("{}", 700 + i);
            handles.push(tokio::spawn(async move {
                gate.propose_at(proposal("RACE", Some(&trigger)), now).await
            }));
        }

        let mut admitted = 0;
        let mut cooldown = 0;
        for handle in handles {
            match handle.await.unwrap() {
                r if r.is_admitted() => admitted += 1,
                r => {
                    assert!(matches!(
                        r.reject_reason(),
                        Some(RejectReason::Cooldown { .. })
                    ));
                    cooldown += 1;
                }
            }
        }
        assert_eq!(admitted, 1);
        assert_eq!(cooldown, 3);
        assert_eq!(executor.calls(), 1);
    }

    #[tokio::test]
    async fn proposals_spaced_beyond_cooldown_both_pass() {
        let s = setup(funded(), Arc::new(SlowExecutor::new(Duration::ZERO)));
        let t0 = Utc::now();
        assert!(s.gate.propose_at(proposal("A", Some("1")), t0).await.is_admitted());
        assert!(s
            .gate
            .propose_at(proposal("B", Some("2")), t0 + ChronoDuration::seconds(240))
            .await
            .is_admitted());
    }

    #[tokio::test]
    async fn executor_failure_consumes_cooldown() {
        let mut executor = MockExec::new();
        executor
            .expect_execute()
            .withf(|action| matches!(action, ActionSpec::Deploy(_)))
            .times(1)
            .returning(|_| Err(ExecutorError::Transport("rpc timeout".to_string())));
        let s = setup(funded(), Arc::new(executor));
        let t0 = Utc::now();

        let result = s.gate.propose_at(proposal("FAIL", Some("31337")), t0).await;
        match result {
            AdmissionResult::Failed { error } => assert!(error.contains("rpc timeout")),
            other => panic!("unexpected {:?}", other),
        }

        let retry = s
            .gate
            .propose_at(proposal("FAIL", Some("31337")), t0 + ChronoDuration::seconds(10))
            .await;
        assert!(matches!(
            retry.reject_reason(),
            Some(RejectReason::Cooldown { wait_secs: 230 })
        ));
        assert_eq!(s.summary.snapshot().await.total_deployed, 0);
    }

    // ============================================================================
    // Confidence and balance
    // ============================================================================

    #[tokio::test]
    async fn reserve_makes_nominal_balance_insufficient() {
        let mut wallet = MockWallet::new();
        wallet.expect_spendable_balance().times(2).returning(|| Ok(0.32));
        let mut executor = MockExec::new();
        executor.expect_execute().never();
        let s = setup(Arc::new(wallet), Arc::new(executor));

        for confidence in [75.0, 100.0] {
            let mut spec = proposal("POOR", None);
            spec.confidence = confidence;
            match s.gate.propose(spec).await.reject_reason() {
                Some(RejectReason::InsufficientFunds { available, requested }) => {
                    assert!((available - 0.02).abs() < 1e-9);
                    assert_eq!(*requested, 0.05);
                }
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn unreachable_wallet_fails_closed() {
        let mut wallet = MockWallet::new();
        wallet
            .expect_spendable_balance()
            .returning(|| Err(WalletError::Query("rpc down".to_string())));
        let s = setup(Arc::new(wallet), Arc::new(SlowExecutor::new(Duration::ZERO)));

        let result = s.gate.propose(proposal("DARK", None)).await;
        match result {
            AdmissionResult::Rejected {
                reason: RejectReason::InsufficientFunds { .. },
                detail,
            } => assert!(detail.contains("balance unavailable")),
            other => panic!("unexpected {:?}", other),
        }
        assert!(s.gate.last_deployment_at().await.is_none());
    }

    #[tokio::test]
    async fn low_confidence_never_queries_wallet() {
        let mut wallet = MockWallet::new();
        wallet.expect_spendable_balance().never();
        let s = setup(Arc::new(wallet), Arc::new(SlowExecutor::new(Duration::ZERO)));

        let mut spec = proposal("MEH", None);
        spec.confidence = 40.0;
        assert!(matches!(
            s.gate.propose(spec).await.reject_reason(),
            Some(RejectReason::LowConfidence { .. })
        ));
    }
}
