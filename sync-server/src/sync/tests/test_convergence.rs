use super::*;
use crate::config::VerificationMode;
use crate::webhooks::WebhookProcessor;
use shared::order::OrderStatus;
use shared::sync::SyncPhase;

fn webhook_processor(env: &TestEnv) -> WebhookProcessor {
    WebhookProcessor::new(
        env.ledger.clone(),
        env.integrations.clone(),
        env.cost_links.clone(),
        AdapterRegistry::standard(reqwest::Client::new(), 1),
        VerificationMode::Relaxed,
    )
}

fn shopify_webhook_body(id: u64, financial_status: &str) -> (HeaderMap, Vec<u8>) {
    let body = serde_json::to_vec(&serde_json::json!({
        "id": id,
        "email": "ana@example.com",
        "financial_status": financial_status,
        "total_price": "49.90",
        "currency": "EUR",
        "created_at": "2025-05-02T10:00:00Z",
        "customer": {"first_name": "Ana", "last_name": "Silva", "phone": "+351911111111"},
        "line_items": [{"sku": "abc123"}]
    }))
    .unwrap();
    let mut headers = HeaderMap::new();
    headers.insert("x-shopify-shop-domain", "store-shopify".parse().unwrap());
    (headers, body)
}

#[tokio::test]
async fn test_webhook_then_poll_converges_to_one_row() {
    let poll_adapter = StubAdapter::new(
        ProviderKind::Shopify,
        vec![vec![checkout_record("1001", "+351911111111", dec!(49.90), "fulfilled")]],
    );
    let env = env_with_adapters(vec![Arc::new(poll_adapter)]);
    let processor = webhook_processor(&env);

    // Webhook lands first with the earlier payment state
    let (headers, body) = shopify_webhook_body(1001, "paid");
    let outcome = processor
        .handle(ProviderKind::Shopify, &headers, &body)
        .await
        .unwrap();
    assert!(outcome.created);
    assert_eq!(outcome.operation_id, env.operation_id);

    // A later poll sees the same order, already fulfilled
    let run_id = env
        .orchestrator
        .clone()
        .trigger(full_sync(env.operation_id))
        .unwrap();
    let session = wait_terminal(&env.sessions, run_id).await;
    assert_eq!(session.phase, SyncPhase::Completed);
    assert_eq!(session.platform.new, 0);
    assert_eq!(session.platform.updated, 1);

    let orders = env
        .ledger
        .orders_for_operation(env.operation_id, 100, 0)
        .await
        .unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].status, OrderStatus::Shipped);
    assert_eq!(orders[0].total, dec!(49.90));
}

#[tokio::test]
async fn test_poll_then_webhook_does_not_revert_status() {
    let poll_adapter = StubAdapter::new(
        ProviderKind::Shopify,
        vec![vec![checkout_record("1001", "+351911111111", dec!(49.90), "fulfilled")]],
    );
    let env = env_with_adapters(vec![Arc::new(poll_adapter)]);
    let processor = webhook_processor(&env);

    let run_id = env
        .orchestrator
        .clone()
        .trigger(full_sync(env.operation_id))
        .unwrap();
    wait_terminal(&env.sessions, run_id).await;

    // A delayed webhook arrives with the stale pre-fulfillment state
    let (headers, body) = shopify_webhook_body(1001, "paid");
    let outcome = processor
        .handle(ProviderKind::Shopify, &headers, &body)
        .await
        .unwrap();
    assert!(!outcome.created);

    let orders = env
        .ledger
        .orders_for_operation(env.operation_id, 100, 0)
        .await
        .unwrap();
    assert_eq!(orders.len(), 1);
    // Fields merged, status unchanged: shipped does not fall back to confirmed
    assert_eq!(orders[0].status, OrderStatus::Shipped);
    assert_eq!(orders[0].customer.phone.as_deref(), Some("+351911111111"));
}
