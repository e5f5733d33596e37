//! Unified error handling with Sentry integration.
//!
//! Component errors (`CartError`, `AddressError`, `TransitionError`,
//! `PaymentError`) live beside the component that raises them; by the time
//! one is returned, the component has already published the notice and
//! settled its local state. [`StorefrontError`] collects them for front ends
//! that want a single error type.

use thiserror::Error;

use crate::addresses::AddressError;
use crate::cart::CartError;
use crate::checkout::{PaymentError, TransitionError};
use crate::config::ConfigError;
use crate::remote::StoreError;

/// Application-level error type for storefront front ends.
#[derive(Debug, Error)]
pub enum StorefrontError {
    /// Configuration could not be loaded.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Remote store could not be reached or set up.
    #[error("Remote store error: {0}")]
    Store(#[from] StoreError),

    /// Cart operation failed.
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    /// Address operation failed.
    #[error("Address error: {0}")]
    Address(#[from] AddressError),

    /// Checkout step change was refused.
    #[error("Checkout error: {0}")]
    Transition(#[from] TransitionError),

    /// Payment handshake failed.
    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),
}

/// Result type alias for `StorefrontError`.
pub type Result<T> = std::result::Result<T, StorefrontError>;

/// Log a remote store failure and capture server-side faults to Sentry.
///
/// Rejected requests (4xx) are logged at `warn` only.
pub fn report_store_error(operation: &'static str, err: &StoreError) {
    if err.is_server_fault() {
        let event_id = sentry::capture_error(err);
        tracing::error!(
            operation,
            error = %err,
            sentry_event_id = %event_id,
            "Remote store failure"
        );
    } else {
        tracing::warn!(operation, error = %err, "Remote store rejected request");
    }
}

/// Set the Sentry user context from a user ID.
///
/// Call this after the session identity changes to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for checkout milestones.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("checkout", "Entered payment step", Some(&[("order_id", "order_123")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storefront_error_display() {
        let err = StorefrontError::from(TransitionError::EmptyCart);
        assert_eq!(err.to_string(), "Checkout error: cart is empty");

        let err = StorefrontError::from(StoreError::Unauthorized(None));
        assert_eq!(err.to_string(), "Remote store error: Unauthorized");
    }

    #[test]
    fn test_reporting_without_sentry_client_is_noop() {
        report_store_error(
            "get-cart",
            &StoreError::Api {
                status: 500,
                message: String::new(),
            },
        );
        add_breadcrumb("checkout", "test", Some(&[("k", "v")]));
    }
}
