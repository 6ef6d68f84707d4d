use super::*;
use crate::costs::{CostService, RecordingInvalidator};
use crate::sync::staging;
use shared::order::OrderStatus;

async fn stage(env: &TestEnv, record: &RawOrderRecord) -> shared::order::Order {
    staging::stage_record(
        env.ledger.as_ref(),
        env.cost_links.as_ref(),
        env.operation_id,
        env.store_id,
        record,
    )
    .await
    .unwrap()
    .order
}

fn cost_service(env: &TestEnv, invalidator: Arc<RecordingInvalidator>) -> CostService {
    CostService::new(env.ledger.clone(), env.cost_links.clone(), invalidator)
}

#[tokio::test]
async fn test_link_change_rewrites_eligible_orders() {
    let env = env_with_adapters(vec![]);
    seed_cost_link(&env, "abc123", dec!(10.00), dec!(5.00)).await;

    // Referenced directly, as part of a concatenation, and not at all
    let mut direct = checkout_record("1001", "+351911111111", dec!(49.90), "paid");
    direct.sku_list = vec!["ABC123".into()];
    let mut concatenated = checkout_record("1002", "+351922222222", dec!(30.00), "paid");
    concatenated.sku_list = vec!["abc123+xyz999".into()];
    let mut unrelated = checkout_record("1003", "+351933333333", dec!(15.00), "paid");
    unrelated.sku_list = vec!["other01".into()];

    let direct = stage(&env, &direct).await;
    assert_eq!(direct.product_cost, dec!(10.00));

    stage(&env, &concatenated).await;
    stage(&env, &unrelated).await;

    // Shipping rate changes from 5.00 to 7.50
    seed_cost_link(&env, "abc123", dec!(10.00), dec!(7.50)).await;
    let invalidator = Arc::new(RecordingInvalidator::default());
    let summary = cost_service(&env, invalidator.clone())
        .recalculate(env.operation_id, "ABC123")
        .await
        .unwrap();

    assert!(!summary.fallback);
    assert_eq!(summary.scanned, 2);

    // Confirmed status: product cost applies, shipping does not
    let direct = env
        .ledger
        .find_by_provider_order_id(env.operation_id, "1001")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(direct.status, OrderStatus::Confirmed);
    assert_eq!(direct.product_cost, dec!(10.00));
    assert_eq!(direct.shipping_cost, rust_decimal::Decimal::ZERO);

    let concatenated = env
        .ledger
        .find_by_provider_order_id(env.operation_id, "1002")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(concatenated.product_cost, dec!(10.00));

    let unrelated = env
        .ledger
        .find_by_provider_order_id(env.operation_id, "1003")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(unrelated.product_cost, rust_decimal::Decimal::ZERO);

    // Downstream aggregate cache invalidated for the operation
    assert_eq!(invalidator.keys.lock().clone(), vec![env.operation_id]);
}

#[tokio::test]
async fn test_shipping_rewrite_applies_to_shipped_not_cancelled() {
    let env = env_with_adapters(vec![]);
    seed_cost_link(&env, "abc123", dec!(10.00), dec!(5.00)).await;

    let mut shipped = checkout_record("2001", "+351911111111", dec!(49.90), "fulfilled");
    shipped.sku_list = vec!["abc123+xyz999".into()];
    let shipped = stage(&env, &shipped).await;
    assert_eq!(shipped.status, OrderStatus::Shipped);
    assert_eq!(shipped.shipping_cost, dec!(5.00));

    let mut cancelled = checkout_record("2002", "+351922222222", dec!(49.90), "cancelled");
    cancelled.sku_list = vec!["abc123".into()];
    let cancelled = stage(&env, &cancelled).await;
    assert_eq!(cancelled.shipping_cost, rust_decimal::Decimal::ZERO);

    seed_cost_link(&env, "abc123", dec!(10.00), dec!(7.50)).await;
    cost_service(&env, Arc::new(RecordingInvalidator::default()))
        .recalculate(env.operation_id, "abc123")
        .await
        .unwrap();

    let shipped = env
        .ledger
        .find_by_provider_order_id(env.operation_id, "2001")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(shipped.shipping_cost, dec!(7.50));

    let cancelled = env
        .ledger
        .find_by_provider_order_id(env.operation_id, "2002")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cancelled.shipping_cost, rust_decimal::Decimal::ZERO);
    assert_eq!(cancelled.product_cost, rust_decimal::Decimal::ZERO);
}

#[tokio::test]
async fn test_unreferenced_sku_falls_back_to_full_pass() {
    let env = env_with_adapters(vec![]);
    seed_cost_link(&env, "abc123", dec!(10.00), dec!(5.00)).await;

    let mut order = checkout_record("3001", "+351911111111", dec!(49.90), "paid");
    order.sku_list = vec!["abc123".into()];
    stage(&env, &order).await;

    // The changed SKU matches no stored order, but the full pass still
    // refreshes every order in the operation
    seed_cost_link(&env, "abc123", dec!(12.00), dec!(5.00)).await;
    let summary = cost_service(&env, Arc::new(RecordingInvalidator::default()))
        .recalculate(env.operation_id, "missing-sku")
        .await
        .unwrap();

    assert!(summary.fallback);
    assert_eq!(summary.scanned, 1);
    assert_eq!(summary.rewritten, 1);

    let order = env
        .ledger
        .find_by_provider_order_id(env.operation_id, "3001")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.product_cost, dec!(12.00));
}

#[tokio::test]
async fn test_costs_recomputed_not_accumulated() {
    let env = env_with_adapters(vec![]);
    seed_cost_link(&env, "abc123", dec!(10.00), dec!(5.00)).await;

    let mut order = checkout_record("4001", "+351911111111", dec!(49.90), "fulfilled");
    order.sku_list = vec!["abc123".into()];
    stage(&env, &order).await;

    // Repeated recalculations leave the same figures
    let service = cost_service(&env, Arc::new(RecordingInvalidator::default()));
    service.recalculate(env.operation_id, "abc123").await.unwrap();
    service.recalculate(env.operation_id, "abc123").await.unwrap();

    let order = env
        .ledger
        .find_by_provider_order_id(env.operation_id, "4001")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.product_cost, dec!(10.00));
    assert_eq!(order.shipping_cost, dec!(5.00));
}
