//! Address registry against the fake remote store.

#![allow(clippy::unwrap_used)]

use bazaar_core::AddressId;
use bazaar_integration_tests::{Harness, Op, ScriptedConfirmation, address_input, drain};
use bazaar_storefront::addresses::{AddressError, PreConfirmed, RemoveOutcome};
use bazaar_storefront::error::StorefrontError;
use bazaar_storefront::session::Session;

fn id(raw: &str) -> AddressId {
    AddressId::new(raw)
}

// =============================================================================
// Defaults and selection
// =============================================================================

#[tokio::test]
async fn test_new_default_clears_other_defaults_and_is_selected() {
    let h = Harness::new();
    h.store.seed_address("addr1", "Asha", true);
    h.store.seed_address("addr2", "Ravi", false);
    h.login("user-1").await;
    assert_eq!(h.storefront.addresses().selected(), Some(id("addr1")));

    let addr3 = h
        .storefront
        .add_address(address_input("Meera", true))
        .await
        .unwrap();

    let snapshot = h.storefront.addresses().snapshot();
    let is_default = |raw: &str| snapshot.book.get(&id(raw)).unwrap().is_default;
    assert!(!is_default("addr1"));
    assert!(!is_default("addr2"));
    assert!(snapshot.book.get(&addr3.id).unwrap().is_default);
    assert_eq!(snapshot.selected, Some(addr3.id));
}

#[tokio::test]
async fn test_at_most_one_default_after_any_adds() {
    let h = Harness::new();
    h.store.seed_address("addr1", "Asha", true);
    h.login("user-1").await;

    for (n, is_default) in [true, false, true, true, false].into_iter().enumerate() {
        h.storefront
            .add_address(address_input(&format!("Customer {n}"), is_default))
            .await
            .unwrap();
        assert!(h.storefront.addresses().snapshot().book.default_count() <= 1);
    }
}

#[tokio::test]
async fn test_non_default_add_is_selected_and_keeps_default() {
    let h = Harness::new();
    h.store.seed_address("addr1", "Asha", true);
    h.login("user-1").await;
    let mut notices = h.storefront.notifier().subscribe();

    let added = h
        .storefront
        .add_address(address_input("Ravi", false))
        .await
        .unwrap();

    let snapshot = h.storefront.addresses().snapshot();
    assert_eq!(snapshot.selected, Some(added.id));
    assert!(snapshot.book.get(&id("addr1")).unwrap().is_default);
    assert_eq!(drain(&mut notices), vec!["Address saved"]);
}

#[tokio::test]
async fn test_load_selects_default_then_first() {
    let h = Harness::new();
    h.store.seed_address("addr1", "Asha", false);
    h.store.seed_address("addr2", "Ravi", true);
    h.login("user-1").await;
    assert_eq!(h.storefront.addresses().selected(), Some(id("addr2")));

    let h = Harness::new();
    h.store.seed_address("addr1", "Asha", false);
    h.store.seed_address("addr2", "Ravi", false);
    h.login("user-1").await;
    assert_eq!(h.storefront.addresses().selected(), Some(id("addr1")));
}

#[tokio::test]
async fn test_reload_keeps_listed_selection() {
    let h = Harness::new();
    h.store.seed_address("addr1", "Asha", true);
    h.store.seed_address("addr2", "Ravi", false);
    h.login("user-1").await;

    h.storefront.select_address(&id("addr2")).unwrap();
    h.storefront.refresh().await.unwrap();

    assert_eq!(h.storefront.addresses().selected(), Some(id("addr2")));
}

#[tokio::test]
async fn test_selecting_unknown_address_is_refused() {
    let h = Harness::new();
    h.store.seed_address("addr1", "Asha", true);
    h.login("user-1").await;
    let mut notices = h.storefront.notifier().subscribe();

    let result = h.storefront.select_address(&id("nope"));

    assert!(matches!(
        result,
        Err(StorefrontError::Address(AddressError::UnknownAddress(_)))
    ));
    assert_eq!(h.storefront.addresses().selected(), Some(id("addr1")));
    assert_eq!(
        drain(&mut notices),
        vec!["Please choose one of your saved addresses"]
    );
}

// =============================================================================
// Removal
// =============================================================================

#[tokio::test]
async fn test_declined_removal_makes_no_call() {
    let h = Harness::new();
    h.store.seed_address("addr1", "Asha", true);
    h.login("user-1").await;
    h.store.reset_calls();
    let confirmation = ScriptedConfirmation::new(false);

    let outcome = h
        .storefront
        .remove_address(&id("addr1"), &confirmation)
        .await
        .unwrap();

    assert_eq!(outcome, RemoveOutcome::Declined);
    assert_eq!(
        confirmation.prompts(),
        vec!["Are you sure you want to delete this address?"]
    );
    assert!(h.store.calls().is_empty());
    assert_eq!(h.storefront.addresses().snapshot().addresses().len(), 1);
}

#[tokio::test]
async fn test_removing_selected_address_clears_selection() {
    let h = Harness::new();
    h.store.seed_address("addr1", "Asha", true);
    h.store.seed_address("addr2", "Ravi", false);
    h.login("user-1").await;
    let mut notices = h.storefront.notifier().subscribe();

    let outcome = h
        .storefront
        .remove_address(&id("addr1"), &ScriptedConfirmation::new(true))
        .await
        .unwrap();

    assert_eq!(outcome, RemoveOutcome::Removed);
    let snapshot = h.storefront.addresses().snapshot();
    assert_eq!(snapshot.selected, None);
    assert_eq!(snapshot.addresses().len(), 1);
    assert_eq!(h.store.server_addresses().len(), 1);
    assert_eq!(drain(&mut notices), vec!["Address removed"]);
}

#[tokio::test]
async fn test_removing_other_address_keeps_selection() {
    let h = Harness::new();
    h.store.seed_address("addr1", "Asha", true);
    h.store.seed_address("addr2", "Ravi", false);
    h.login("user-1").await;

    h.storefront
        .remove_address(&id("addr2"), &PreConfirmed)
        .await
        .unwrap();

    assert_eq!(h.storefront.addresses().selected(), Some(id("addr1")));
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_failed_removal_shows_server_message_and_keeps_state() {
    let h = Harness::new();
    h.store.seed_address("addr1", "Asha", true);
    h.login("user-1").await;
    h.store
        .fail_with(Op::DeleteAddress, 409, "Address is used by an open order");
    let mut notices = h.storefront.notifier().subscribe();

    let result = h
        .storefront
        .remove_address(&id("addr1"), &PreConfirmed)
        .await;

    assert!(matches!(
        result,
        Err(StorefrontError::Address(AddressError::Store(_)))
    ));
    let snapshot = h.storefront.addresses().snapshot();
    assert_eq!(snapshot.addresses().len(), 1);
    assert_eq!(snapshot.selected, Some(id("addr1")));
    assert_eq!(drain(&mut notices), vec!["Address is used by an open order"]);
}

#[tokio::test]
async fn test_not_found_removal_shows_server_reason() {
    let h = Harness::new();
    h.store.seed_address("addr1", "Asha", true);
    h.login("user-1").await;
    h.store
        .fail_with(Op::DeleteAddress, 404, "Address was already deleted");
    let mut notices = h.storefront.notifier().subscribe();

    let result = h
        .storefront
        .remove_address(&id("addr1"), &PreConfirmed)
        .await;

    assert!(result.is_err());
    assert_eq!(h.storefront.addresses().snapshot().addresses().len(), 1);
    assert_eq!(drain(&mut notices), vec!["Address was already deleted"]);
}

#[tokio::test]
async fn test_rejected_credentials_on_add_show_server_reason() {
    let h = Harness::new();
    h.login("user-1").await;
    h.store
        .fail_with(Op::CreateAddress, 401, "Session expired, please log in again");
    let mut notices = h.storefront.notifier().subscribe();

    assert!(h
        .storefront
        .add_address(address_input("Asha", true))
        .await
        .is_err());

    assert_eq!(
        drain(&mut notices),
        vec!["Session expired, please log in again"]
    );
}

#[tokio::test]
async fn test_failed_add_falls_back_to_generic_message() {
    let h = Harness::new();
    h.login("user-1").await;
    h.store.fail(Op::CreateAddress);
    let mut notices = h.storefront.notifier().subscribe();

    assert!(h
        .storefront
        .add_address(address_input("Asha", true))
        .await
        .is_err());

    assert!(h.storefront.addresses().snapshot().addresses().is_empty());
    assert_eq!(drain(&mut notices), vec!["Could not save address"]);
}

#[tokio::test]
async fn test_anonymous_add_is_refused() {
    let h = Harness::new();
    let mut notices = h.storefront.notifier().subscribe();

    let result = h.storefront.add_address(address_input("Asha", true)).await;

    assert!(matches!(
        result,
        Err(StorefrontError::Address(AddressError::NotAuthenticated))
    ));
    assert!(h.store.calls().is_empty());
    assert_eq!(drain(&mut notices), vec!["Please log in to continue"]);
}

#[tokio::test]
async fn test_logout_drops_addresses_and_selection() {
    let h = Harness::new();
    h.store.seed_address("addr1", "Asha", true);
    h.login("user-1").await;

    h.storefront
        .switch_session(Session::anonymous())
        .await
        .unwrap();

    let snapshot = h.storefront.addresses().snapshot();
    assert!(snapshot.addresses().is_empty());
    assert_eq!(snapshot.selected, None);
}
