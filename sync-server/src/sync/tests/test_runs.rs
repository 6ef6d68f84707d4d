use super::*;
use shared::error::ErrorCode;
use shared::order::OrderStatus;
use shared::sync::SyncPhase;

#[tokio::test]
async fn test_full_run_ingests_matches_and_completes() {
    let platform = StubAdapter::new(
        ProviderKind::Shopify,
        vec![vec![
            checkout_record("1001", "+351911111111", dec!(49.90), "paid"),
            checkout_record("1002", "+351922222222", dec!(20.00), "paid"),
        ]],
    );
    let carrier = StubAdapter::new(
        ProviderKind::Elogy,
        vec![vec![fulfillment_record(
            "EL-1",
            Some("1001"),
            "+351911111111",
            dec!(49.90),
            "delivery",
        )]],
    );
    let env = env_with_adapters(vec![Arc::new(platform), Arc::new(carrier)]);
    seed_cost_link(&env, "abc123", dec!(12.00), dec!(4.50)).await;

    let run_id = env
        .orchestrator
        .clone()
        .trigger(full_sync(env.operation_id))
        .unwrap();
    let session = wait_terminal(&env.sessions, run_id).await;

    assert_eq!(session.phase, SyncPhase::Completed);
    assert_eq!(session.overall_progress, 100);
    assert!(session.end_time.is_some());
    assert_eq!(session.platform.processed, 2);
    assert_eq!(session.provider.processed, 1);
    assert_eq!(session.matching.new, 1);

    // Three ingested rows collapse to two: the carrier row was absorbed
    let orders = env
        .ledger
        .orders_for_operation(env.operation_id, 100, 0)
        .await
        .unwrap();
    assert_eq!(orders.len(), 2);

    let matched = orders
        .iter()
        .find(|o| o.provider_order_id.as_deref() == Some("1001"))
        .unwrap();
    assert!(matched.is_matched());
    assert_eq!(matched.status, OrderStatus::Shipped);
    assert_eq!(matched.tracking_number.as_deref(), Some("TRK-EL-1"));
    assert!(matched.carrier_matched_at.is_some());
    // Shipped recognizes both costs
    assert_eq!(matched.product_cost, dec!(12.00));
    assert_eq!(matched.shipping_cost, dec!(4.50));

    // Run archived for history/incremental bounds
    wait_archived(&env.archive, 1).await;
}

#[tokio::test]
async fn test_rerunning_ingestion_is_idempotent() {
    let records = vec![vec![
        checkout_record("1001", "+351911111111", dec!(49.90), "paid"),
        checkout_record("1002", "+351922222222", dec!(20.00), "paid"),
    ]];
    let env = env_with_adapters(vec![Arc::new(StubAdapter::new(
        ProviderKind::Shopify,
        records.clone(),
    ))]);

    let first = env
        .orchestrator
        .clone()
        .trigger(full_sync(env.operation_id))
        .unwrap();
    wait_terminal(&env.sessions, first).await;
    let after_first = env
        .ledger
        .orders_for_operation(env.operation_id, 100, 0)
        .await
        .unwrap();

    let second = trigger_settled(&env, full_sync(env.operation_id)).await;
    let session = wait_terminal(&env.sessions, second).await;

    let after_second = env
        .ledger
        .orders_for_operation(env.operation_id, 100, 0)
        .await
        .unwrap();
    assert_eq!(after_first.len(), after_second.len());
    assert_eq!(session.platform.new, 0);
    assert_eq!(session.platform.updated, 2);
    for (a, b) in after_first.iter().zip(after_second.iter()) {
        assert_eq!(a.id, b.id);
        assert_eq!(a.total, b.total);
        assert_eq!(a.status, b.status);
    }
}

#[tokio::test]
async fn test_concurrent_trigger_is_rejected() {
    let gate = Arc::new(Semaphore::new(0));
    let adapter = StubAdapter::new(
        ProviderKind::Shopify,
        vec![vec![checkout_record("1001", "+351911111111", dec!(10.00), "paid")]],
    )
    .gated(gate.clone());
    let env = env_with_adapters(vec![Arc::new(adapter)]);

    let run_id = env
        .orchestrator
        .clone()
        .trigger(full_sync(env.operation_id))
        .unwrap();

    // Second trigger while the first is blocked on the gate
    let err = env
        .orchestrator
        .clone()
        .trigger(full_sync(env.operation_id))
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::SyncAlreadyRunning);

    gate.add_permits(10);
    wait_terminal(&env.sessions, run_id).await;

    // After completion a new run is accepted again
    gate.add_permits(10);
    let next = trigger_settled(&env, full_sync(env.operation_id)).await;
    wait_terminal(&env.sessions, next).await;
}

#[tokio::test]
async fn test_auth_failure_ends_run_in_error() {
    let adapter = StubAdapter::new(
        ProviderKind::Shopify,
        vec![vec![checkout_record("1001", "+351911111111", dec!(10.00), "paid")]],
    )
    .failing(FailMode::AuthOnPage(0));
    let env = env_with_adapters(vec![Arc::new(adapter)]);

    let run_id = env
        .orchestrator
        .clone()
        .trigger(full_sync(env.operation_id))
        .unwrap();
    let session = wait_terminal(&env.sessions, run_id).await;

    assert_eq!(session.phase, SyncPhase::Error);
    assert!(session.error.unwrap().contains("authentication failed"));
}

#[tokio::test]
async fn test_transient_failure_on_later_page_does_not_abort_run() {
    let adapter = StubAdapter::new(
        ProviderKind::Shopify,
        vec![
            vec![checkout_record("1001", "+351911111111", dec!(10.00), "paid")],
            vec![checkout_record("1002", "+351922222222", dec!(12.00), "paid")],
        ],
    )
    .failing(FailMode::TransientOnPage(1));
    let env = env_with_adapters(vec![Arc::new(adapter)]);

    let run_id = env
        .orchestrator
        .clone()
        .trigger(full_sync(env.operation_id))
        .unwrap();
    let session = wait_terminal(&env.sessions, run_id).await;

    // The failed page is an error counter, not a run failure
    assert_eq!(session.phase, SyncPhase::Completed);
    assert_eq!(session.platform.errors, 1);
    assert_eq!(session.platform.processed, 1);
    assert_eq!(session.non_fatal_errors(), 1);
}

#[tokio::test]
async fn test_no_integrations_fails_in_preparing() {
    let env = env_with_adapters(vec![]);

    let run_id = env
        .orchestrator
        .clone()
        .trigger(full_sync(env.operation_id))
        .unwrap();
    let session = wait_terminal(&env.sessions, run_id).await;

    assert_eq!(session.phase, SyncPhase::Error);
    assert!(session
        .error
        .unwrap()
        .contains("no enabled integration"));
}

#[tokio::test]
async fn test_malformed_records_are_counted_not_fatal() {
    let adapter = StubAdapter::new(
        ProviderKind::Shopify,
        vec![vec![checkout_record("1001", "+351911111111", dec!(10.00), "paid")]],
    )
    .with_malformed(0, 2);
    let env = env_with_adapters(vec![Arc::new(adapter)]);

    let run_id = env
        .orchestrator
        .clone()
        .trigger(full_sync(env.operation_id))
        .unwrap();
    let session = wait_terminal(&env.sessions, run_id).await;

    assert_eq!(session.phase, SyncPhase::Completed);
    assert_eq!(session.platform.errors, 2);
    assert_eq!(session.platform.processed, 1);
}

#[tokio::test]
async fn test_cancellation_between_pages() {
    let gate = Arc::new(Semaphore::new(1)); // first page passes, second blocks
    let adapter = StubAdapter::new(
        ProviderKind::Shopify,
        vec![
            vec![checkout_record("1001", "+351911111111", dec!(10.00), "paid")],
            vec![checkout_record("1002", "+351922222222", dec!(12.00), "paid")],
        ],
    )
    .gated(gate.clone());
    let env = env_with_adapters(vec![Arc::new(adapter)]);

    let run_id = env
        .orchestrator
        .clone()
        .trigger(full_sync(env.operation_id))
        .unwrap();

    // Let the first page land, then cancel
    for _ in 0..100 {
        if env
            .sessions
            .get(run_id)
            .map(|s| s.platform.pages >= 1)
            .unwrap_or(false)
        {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    assert!(env.orchestrator.cancel(env.operation_id));
    gate.add_permits(10);

    let session = wait_terminal(&env.sessions, run_id).await;
    assert_eq!(session.phase, SyncPhase::Error);
    assert!(session.error.unwrap().contains("cancelled"));

    // The first page was fully applied, the second never was
    let orders = env
        .ledger
        .orders_for_operation(env.operation_id, 100, 0)
        .await
        .unwrap();
    assert_eq!(orders.len(), 1);
}

#[tokio::test]
async fn test_max_pages_caps_the_walk() {
    let adapter = StubAdapter::new(
        ProviderKind::Shopify,
        vec![
            vec![checkout_record("1001", "+351911111111", dec!(10.00), "paid")],
            vec![checkout_record("1002", "+351922222222", dec!(12.00), "paid")],
            vec![checkout_record("1003", "+351933333333", dec!(14.00), "paid")],
        ],
    );
    let env = env_with_adapters(vec![Arc::new(adapter)]);

    let run_id = env
        .orchestrator
        .clone()
        .trigger(SyncRequest {
            operation_id: env.operation_id,
            mode: SyncMode::Full,
            max_pages: Some(2),
            since: None,
        })
        .unwrap();
    let session = wait_terminal(&env.sessions, run_id).await;

    assert_eq!(session.phase, SyncPhase::Completed);
    assert_eq!(session.platform.pages, 2);
    assert_eq!(session.platform.processed, 2);
}

#[tokio::test]
async fn test_progress_is_monotonic_across_snapshots() {
    let adapter = StubAdapter::new(
        ProviderKind::Shopify,
        (0..5)
            .map(|i| {
                vec![checkout_record(
                    &format!("10{i}"),
                    "+351911111111",
                    dec!(10.00),
                    "paid",
                )]
            })
            .collect(),
    );
    let env = env_with_adapters(vec![Arc::new(adapter)]);
    let mut rx = env.sessions.subscribe();

    let run_id = env
        .orchestrator
        .clone()
        .trigger(full_sync(env.operation_id))
        .unwrap();
    wait_terminal(&env.sessions, run_id).await;

    let mut last_progress = 0u8;
    let mut seen_past_preparing = false;
    while let Ok(snapshot) = rx.try_recv() {
        if snapshot.phase != SyncPhase::Preparing {
            seen_past_preparing = true;
            assert!(
                snapshot.overall_progress >= last_progress,
                "progress regressed from {last_progress} to {}",
                snapshot.overall_progress
            );
            last_progress = snapshot.overall_progress;
        }
    }
    assert!(seen_past_preparing);
    assert_eq!(last_progress, 100);
}
