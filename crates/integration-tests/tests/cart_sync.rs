//! Synchronizer tests over HTTP against the mock storefront.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use theme_cart_core::{LineKey, Money, TriggerId};
use theme_cart_integration_tests::{MockStorefront, unreachable_config};
use theme_cart_storefront::CartConfig;
use theme_cart_storefront::cart::{
    CartEvent, CartStore, CartSynchronizer, HttpCartGateway, MutationOutcome, MutationRequest,
    ProductForm, SyncOptions,
};

fn synchronizer(config: &CartConfig) -> CartSynchronizer<HttpCartGateway> {
    let gateway = HttpCartGateway::new(config).unwrap();
    let store = Arc::new(CartStore::new(config.money_format.clone()));
    CartSynchronizer::new(gateway, store, SyncOptions::from(config))
}

/// Storefront with one tee line `abc` at quantity 1, and a hydrated synchronizer.
async fn hydrated_cart() -> (MockStorefront, CartSynchronizer<HttpCartGateway>) {
    let shop = MockStorefront::start().await;
    shop.add_variant(7, "Pineapple Tee", 999);
    shop.seed_line("abc", 7, 1);

    let sync = synchronizer(&shop.config());
    sync.hydrate().await.unwrap();
    shop.clear_requests();
    (shop, sync)
}

#[tokio::test]
async fn test_update_quantity_replaces_snapshot() {
    let (shop, sync) = hydrated_cart().await;
    assert_eq!(sync.store().item_count(), 1);

    let outcome = sync
        .mutate(
            &TriggerId::from("qty-abc"),
            MutationRequest::UpdateQuantity {
                key: LineKey::from("abc"),
                quantity: 3,
            },
            false,
        )
        .await;

    assert_eq!(outcome, MutationOutcome::Applied);
    assert_eq!(shop.routes(), vec!["POST /cart/change.js"]);

    let state = sync.store().current();
    assert_eq!(state.snapshot.item_count, 3);
    assert_eq!(state.snapshot.total_price, Money::from_minor(2997));
    assert_eq!(state.formatted_total, "$29.97");
    assert_eq!(state.ui.error, None);
    assert!(!state.ui.loading);
}

#[tokio::test]
async fn test_duplicate_submit_sends_one_request() {
    let (shop, sync) = hydrated_cart().await;
    shop.delay_next(Duration::from_millis(200));

    let trigger = TriggerId::from("product-form");
    let request = || MutationRequest::UpdateQuantity {
        key: LineKey::from("abc"),
        quantity: 2,
    };

    let (first, second) = tokio::join!(
        sync.mutate(&trigger, request(), false),
        sync.mutate(&trigger, request(), false),
    );

    assert_eq!(first, MutationOutcome::Applied);
    assert_eq!(second, MutationOutcome::Dropped);
    assert_eq!(shop.routes(), vec!["POST /cart/change.js"]);
    assert!(!sync.is_in_flight(&trigger));
}

#[tokio::test]
async fn test_rejected_change_keeps_snapshot() {
    let (shop, sync) = hydrated_cart().await;
    shop.set_stock(7, 2);
    let before = sync.store().snapshot();

    let outcome = sync
        .mutate(
            &TriggerId::from("qty-abc"),
            MutationRequest::UpdateQuantity {
                key: LineKey::from("abc"),
                quantity: 5,
            },
            false,
        )
        .await;

    let message = "All 2 Pineapple Tee are in your cart.";
    assert_eq!(outcome, MutationOutcome::Failed(message.to_string()));
    assert_eq!(sync.store().snapshot(), before);
    assert_eq!(sync.store().ui().error.as_deref(), Some(message));
    assert!(!sync.store().ui().loading);

    // The next mutation starts from a clean error
    let outcome = sync
        .increment_quantity(&TriggerId::from("qty-abc"), &LineKey::from("abc"))
        .await;
    assert_eq!(outcome, MutationOutcome::Applied);
    assert_eq!(sync.store().ui().error, None);
    assert_eq!(sync.store().item_count(), 2);
}

#[tokio::test]
async fn test_increment_and_decrement_round_trip() {
    let (shop, sync) = hydrated_cart().await;
    let trigger = TriggerId::from("qty-abc");
    let key = LineKey::from("abc");

    // Quantity 1 is the floor
    assert_eq!(
        sync.decrement_quantity(&trigger, &key).await,
        MutationOutcome::Skipped
    );
    assert!(shop.routes().is_empty());

    assert!(sync.increment_quantity(&trigger, &key).await.is_applied());
    assert!(sync.increment_quantity(&trigger, &key).await.is_applied());
    assert_eq!(sync.store().lookup(&key).unwrap().quantity, 3);

    assert!(sync.decrement_quantity(&trigger, &key).await.is_applied());
    assert_eq!(sync.store().lookup(&key).unwrap().quantity, 2);
    assert_eq!(sync.store().formatted_total(), "$19.98");

    let bodies: Vec<_> = shop
        .requests()
        .into_iter()
        .filter_map(|r| r.body)
        .map(|b| b["quantity"].as_u64().unwrap())
        .collect();
    assert_eq!(bodies, vec![2, 3, 2]);
}

#[tokio::test]
async fn test_remove_empties_cart() {
    let (_shop, sync) = hydrated_cart().await;

    let outcome = sync
        .remove(&TriggerId::from("remove-abc"), &LineKey::from("abc"))
        .await;

    assert_eq!(outcome, MutationOutcome::Applied);
    assert!(sync.store().snapshot().is_empty());
    assert_eq!(sync.store().formatted_total(), "$0.00");
}

#[tokio::test]
async fn test_product_form_add_opens_drawer() {
    let shop = MockStorefront::start().await;
    shop.add_variant(42, "Pineapple Hat", 2500);
    let sync = synchronizer(&shop.config());
    let mut events = sync.events();

    let request = ProductForm::from_urlencoded("id=42&quantity=2&properties%5BSize%5D=L")
        .unwrap()
        .into_request();
    let outcome = sync
        .mutate(&TriggerId::from("product-form"), request, true)
        .await;

    assert_eq!(outcome, MutationOutcome::Applied);
    assert_eq!(shop.routes(), vec!["POST /cart/add.js", "GET /cart.js"]);
    assert_eq!(events.recv().await.unwrap(), CartEvent::Updated { item_count: 2 });
    assert_eq!(events.recv().await.unwrap(), CartEvent::OpenDrawer);

    let snapshot = sync.store().snapshot();
    assert_eq!(snapshot.items[0].properties["Size"], "L");
    assert_eq!(sync.store().formatted_total(), "$50.00");
}

#[tokio::test]
async fn test_slow_storefront_times_out() {
    let shop = MockStorefront::start().await;
    shop.add_variant(7, "Pineapple Tee", 999);
    shop.seed_line("abc", 7, 1);

    let mut config = shop.config();
    config.request_timeout = Duration::from_millis(100);
    let sync = synchronizer(&config);
    sync.hydrate().await.unwrap();

    shop.delay_next(Duration::from_secs(2));
    let trigger = TriggerId::from("qty-abc");
    let outcome = sync
        .increment_quantity(&trigger, &LineKey::from("abc"))
        .await;

    // The synchronizer's limit wins over the HTTP client's
    assert_eq!(
        outcome,
        MutationOutcome::Failed("Cart request timed out after 100ms".to_string())
    );
    assert_eq!(sync.store().item_count(), 1);
    assert!(!sync.store().ui().loading);
    assert!(!sync.is_in_flight(&trigger));
}

#[tokio::test]
async fn test_hydrate_retries_after_failure() {
    let shop = MockStorefront::start().await;
    shop.add_variant(7, "Pineapple Tee", 999);
    shop.seed_line("abc", 7, 2);
    shop.fail_next(503, "Service Unavailable");

    let sync = synchronizer(&shop.config());
    sync.hydrate().await.unwrap();

    assert_eq!(shop.routes(), vec!["GET /cart.js", "GET /cart.js"]);
    assert_eq!(sync.store().item_count(), 2);
    // Hydration is not a mutation
    assert_eq!(sync.store().ui().error, None);
}

#[tokio::test]
async fn test_hydrate_gives_up_with_empty_cart() {
    let shop = MockStorefront::start().await;
    shop.fail_next(503, "Service Unavailable");

    let mut config = shop.config();
    config.hydrate_attempts = 1;
    let sync = synchronizer(&config);

    let err = sync.hydrate().await.unwrap_err();

    assert_eq!(err.status(), Some(503));
    assert!(sync.store().snapshot().is_empty());
    assert_eq!(sync.store().formatted_total(), "$0.00");
}

#[tokio::test]
async fn test_unreachable_storefront_fails_cleanly() {
    let sync = synchronizer(&unreachable_config().await);
    let trigger = TriggerId::from("qty-abc");

    let outcome = sync
        .mutate(
            &trigger,
            MutationRequest::UpdateQuantity {
                key: LineKey::from("abc"),
                quantity: 2,
            },
            false,
        )
        .await;

    let message = "Could not reach the store, please try again";
    assert_eq!(outcome, MutationOutcome::Failed(message.to_string()));
    let state = sync.store().current();
    assert!(state.snapshot.is_empty());
    assert_eq!(state.ui.error.as_deref(), Some(message));
    assert!(!state.ui.loading);
    assert!(!sync.is_in_flight(&trigger));
}
