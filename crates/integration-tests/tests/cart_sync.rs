//! Cart synchronization against the fake remote store.

#![allow(clippy::unwrap_used)]

use bazaar_core::{Cart, Color, ProductId, Size};
use bazaar_integration_tests::{Harness, Op, key};
use bazaar_storefront::cart::CartError;
use bazaar_storefront::error::StorefrontError;
use bazaar_storefront::session::Session;
use rust_decimal::Decimal;

async fn add(h: &Harness, product: &str, quantity: u32) -> bazaar_storefront::error::Result<()> {
    h.storefront
        .add_to_cart(
            &ProductId::new(product),
            quantity,
            Size::new("M"),
            Color::new("red"),
        )
        .await
}

// =============================================================================
// Merging
// =============================================================================

#[tokio::test]
async fn test_repeated_adds_merge_into_one_line() {
    let h = Harness::new();
    h.login("user-1").await;

    for quantity in [1, 2, 3] {
        add(&h, "A", quantity).await.unwrap();
    }

    let cart = h.storefront.cart().snapshot();
    assert_eq!(cart.lines().len(), 1);
    assert_eq!(cart.line(&key("A", "M", "red")).unwrap().quantity, 6);
    assert_eq!(h.store.server_cart(), cart);
}

#[tokio::test]
async fn test_same_product_other_size_is_separate_line() {
    let h = Harness::new();
    h.login("user-1").await;

    add(&h, "A", 1).await.unwrap();
    h.storefront
        .add_to_cart(&ProductId::new("A"), 1, Size::new("L"), Color::new("red"))
        .await
        .unwrap();

    assert_eq!(h.storefront.cart().snapshot().lines().len(), 2);
}

#[tokio::test]
async fn test_add_to_existing_cart_updates_totals() {
    let h = Harness::new();
    h.store.seed_line("A", "M", "red", 1);
    h.store.seed_line("B", "M", "red", 2);
    h.login("user-1").await;

    add(&h, "A", 1).await.unwrap();

    let cart = h.storefront.cart().snapshot();
    assert_eq!(cart.line(&key("A", "M", "red")).unwrap().quantity, 2);
    assert_eq!(cart.line(&key("B", "M", "red")).unwrap().quantity, 2);
    assert_eq!(cart.total(), Decimal::new(100 * 2 + 250 * 2, 0));
    assert_eq!(cart.count(), 4);
}

#[tokio::test]
async fn test_add_notifies_success() {
    let h = Harness::new();
    h.login("user-1").await;
    let mut notices = h.storefront.notifier().subscribe();

    add(&h, "A", 1).await.unwrap();

    assert_eq!(
        bazaar_integration_tests::drain(&mut notices),
        vec!["Added to cart"]
    );
}

// =============================================================================
// Removal and quantity
// =============================================================================

#[tokio::test]
async fn test_removing_last_line_leaves_empty_cart() {
    let h = Harness::new();
    h.store.seed_line("A", "M", "red", 3);
    h.login("user-1").await;

    h.storefront
        .remove_from_cart(&key("A", "M", "red"))
        .await
        .unwrap();

    let cart = h.storefront.cart().snapshot();
    assert_eq!(cart, Cart::empty());
    assert_eq!(cart.count(), 0);
    assert_eq!(cart.total(), Decimal::ZERO);
    assert!(h.store.server_cart().is_empty());
}

#[tokio::test]
async fn test_zero_or_negative_quantity_removes_line() {
    for quantity in [0, -3] {
        let h = Harness::new();
        h.store.seed_line("A", "M", "red", 2);
        h.store.seed_line("B", "M", "red", 1);
        h.login("user-1").await;
        h.store.reset_calls();
        let mut notices = h.storefront.notifier().subscribe();

        h.storefront
            .set_quantity(&key("A", "M", "red"), quantity)
            .await
            .unwrap();

        let cart = h.storefront.cart().snapshot();
        assert!(cart.line(&key("A", "M", "red")).is_none());
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(h.store.calls(), vec![Op::RemoveLine]);
        assert_eq!(
            bazaar_integration_tests::drain(&mut notices),
            vec!["Removed from cart"]
        );
    }
}

#[tokio::test]
async fn test_quantity_update_is_silent_on_success() {
    let h = Harness::new();
    h.store.seed_line("A", "M", "red", 1);
    h.login("user-1").await;
    let mut notices = h.storefront.notifier().subscribe();

    h.storefront
        .set_quantity(&key("A", "M", "red"), 4)
        .await
        .unwrap();

    assert_eq!(
        h.storefront
            .cart()
            .snapshot()
            .line(&key("A", "M", "red"))
            .unwrap()
            .quantity,
        4
    );
    assert!(bazaar_integration_tests::drain(&mut notices).is_empty());
}

// =============================================================================
// Failure and reconciliation
// =============================================================================

#[tokio::test]
async fn test_failed_add_reloads_remote_cart() {
    let h = Harness::new();
    h.store.seed_line("B", "M", "red", 1);
    h.login("user-1").await;
    h.store.fail(Op::AddLine);
    h.store.reset_calls();
    let mut notices = h.storefront.notifier().subscribe();

    let result = add(&h, "A", 1).await;

    assert!(matches!(
        result,
        Err(StorefrontError::Cart(CartError::Store(_)))
    ));
    assert_eq!(h.storefront.cart().snapshot(), h.store.server_cart());
    assert!(h.storefront.cart().snapshot().line(&key("A", "M", "red")).is_none());
    assert_eq!(h.store.calls(), vec![Op::GetProduct, Op::AddLine, Op::GetCart]);
    assert_eq!(
        bazaar_integration_tests::drain(&mut notices),
        vec!["Could not add to cart"]
    );
}

#[tokio::test]
async fn test_reload_picks_up_server_adjustments() {
    let h = Harness::new();
    h.store.seed_line("B", "M", "red", 1);
    h.login("user-1").await;
    h.store.cap_quantity(3);

    // Optimistically 5 locally; the server keeps only 3.
    add(&h, "A", 5).await.unwrap();
    assert_eq!(
        h.storefront.cart().snapshot().line(&key("A", "M", "red")).unwrap().quantity,
        5
    );

    h.store.fail(Op::RemoveLine);
    let result = h.storefront.remove_from_cart(&key("B", "M", "red")).await;
    assert!(result.is_err());

    let cart = h.storefront.cart().snapshot();
    assert_eq!(cart.line(&key("A", "M", "red")).unwrap().quantity, 3);
    assert_eq!(cart.line(&key("B", "M", "red")).unwrap().quantity, 1);
}

#[tokio::test]
async fn test_failed_reconcile_keeps_local_guess() {
    let h = Harness::new();
    h.login("user-1").await;
    h.store.fail(Op::AddLine);
    h.store.fail(Op::GetCart);

    assert!(add(&h, "A", 2).await.is_err());

    // The optimistic line stays until the next successful load.
    let cart = h.storefront.cart().snapshot();
    assert_eq!(cart.line(&key("A", "M", "red")).unwrap().quantity, 2);

    h.store.recover(Op::GetCart);
    h.storefront.refresh().await.unwrap();
    assert!(h.storefront.cart().snapshot().is_empty());
}

#[tokio::test]
async fn test_failed_quantity_update_notifies_and_reloads() {
    let h = Harness::new();
    h.store.seed_line("A", "M", "red", 1);
    h.login("user-1").await;
    h.store.fail(Op::UpdateQuantity);
    let mut notices = h.storefront.notifier().subscribe();

    assert!(h
        .storefront
        .set_quantity(&key("A", "M", "red"), 9)
        .await
        .is_err());

    assert_eq!(
        h.storefront.cart().snapshot().line(&key("A", "M", "red")).unwrap().quantity,
        1
    );
    assert_eq!(
        bazaar_integration_tests::drain(&mut notices),
        vec!["Could not update quantity"]
    );
}

#[tokio::test]
async fn test_load_failure_keeps_local_cart() {
    let h = Harness::new();
    h.store.seed_line("A", "M", "red", 1);
    h.login("user-1").await;
    h.store.fail(Op::GetCart);
    let mut notices = h.storefront.notifier().subscribe();

    assert!(h.storefront.cart().load(&h.storefront.session()).await.is_err());

    assert_eq!(h.storefront.cart().snapshot().count(), 1);
    assert_eq!(
        bazaar_integration_tests::drain(&mut notices),
        vec!["Could not load your cart"]
    );
}

// =============================================================================
// Validation
// =============================================================================

#[tokio::test]
async fn test_anonymous_add_is_refused_without_network_call() {
    let h = Harness::new();
    let mut notices = h.storefront.notifier().subscribe();

    let result = add(&h, "A", 1).await;

    assert!(matches!(
        result,
        Err(StorefrontError::Cart(CartError::NotAuthenticated))
    ));
    assert!(h.store.calls().is_empty());
    assert_eq!(
        bazaar_integration_tests::drain(&mut notices),
        vec!["Please log in to continue"]
    );
}

#[tokio::test]
async fn test_unavailable_option_is_refused() {
    let h = Harness::new();
    h.login("user-1").await;
    h.store.reset_calls();

    let result = h
        .storefront
        .add_to_cart(&ProductId::new("A"), 1, Size::new("XXL"), Color::new("red"))
        .await;
    assert!(matches!(
        result,
        Err(StorefrontError::Cart(CartError::UnavailableSize(_)))
    ));

    let result = h
        .storefront
        .add_to_cart(&ProductId::new("A"), 1, Size::new("M"), Color::new("green"))
        .await;
    assert!(matches!(
        result,
        Err(StorefrontError::Cart(CartError::UnavailableColor(_)))
    ));

    assert!(h.storefront.cart().snapshot().is_empty());
    assert_eq!(h.store.count(Op::AddLine), 0);
}

#[tokio::test]
async fn test_zero_quantity_add_is_refused() {
    let h = Harness::new();
    h.login("user-1").await;

    let result = add(&h, "A", 0).await;

    assert!(matches!(
        result,
        Err(StorefrontError::Cart(CartError::InvalidQuantity))
    ));
    assert_eq!(h.store.count(Op::AddLine), 0);
}

// =============================================================================
// Identity
// =============================================================================

#[tokio::test]
async fn test_logout_empties_cart_without_remote_call() {
    let h = Harness::new();
    h.store.seed_line("A", "M", "red", 2);
    h.login("user-1").await;
    assert_eq!(h.storefront.cart().snapshot().count(), 2);
    h.store.reset_calls();

    h.storefront
        .switch_session(Session::anonymous())
        .await
        .unwrap();

    assert!(h.storefront.cart().snapshot().is_empty());
    assert!(h.store.calls().is_empty());
}

#[tokio::test]
async fn test_subscribers_see_optimistic_change() {
    let h = Harness::new();
    h.login("user-1").await;
    let mut cart = h.storefront.cart().subscribe();
    cart.mark_unchanged();

    add(&h, "A", 1).await.unwrap();

    assert!(cart.has_changed().unwrap());
    assert_eq!(cart.borrow_and_update().count(), 1);
}
