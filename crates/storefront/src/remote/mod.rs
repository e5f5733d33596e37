//! The authoritative backend and its client.
//!
//! # Architecture
//!
//! - [`RemoteStore`] is the seam: the cart, address, and checkout components
//!   only ever see the trait, so tests run against in-memory fakes
//! - [`HttpRemoteStore`] is the production implementation (`reqwest`, JSON)
//! - The remote store is the source of truth; local state is a mirror
//!
//! # Operations
//!
//! - Catalog: `get-product` (cached, used to denormalize cart lines)
//! - Cart: `get-cart`, `add-line`, `remove-line`, `update-quantity`, `clear-cart`
//! - Address: `list-addresses`, `create-address`, `delete-address`
//! - Checkout: `create-order`, `verify-payment`

mod http;
pub mod types;

pub use http::HttpRemoteStore;
pub use types::*;

use async_trait::async_trait;
use bazaar_core::{
    Address, AddressId, AddressInput, Cart, LineKey, PaymentMethod, ProductId, ProductSummary,
    RemoteOrderId,
};
use thiserror::Error;

use crate::session::Credentials;

/// Errors that can occur when talking to the remote store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// HTTP request failed (connect, timeout, TLS).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Credentials rejected, with the server's reason if it gave one.
    #[error("Unauthorized")]
    Unauthorized(Option<String>),

    /// Resource not found, with the server's reason if it gave one.
    #[error("Not found: {}", .0.as_deref().unwrap_or("resource"))]
    NotFound(Option<String>),

    /// Rate limited by the server.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Response body did not match the expected shape.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Endpoint URL could not be built.
    #[error("Invalid endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
}

impl StoreError {
    /// The server's own error message, if it sent a non-empty one.
    #[must_use]
    pub fn server_message(&self) -> Option<&str> {
        let message = match self {
            Self::Api { message, .. }
            | Self::Unauthorized(Some(message))
            | Self::NotFound(Some(message)) => message,
            _ => return None,
        };
        (!message.trim().is_empty()).then_some(message.as_str())
    }

    /// Whether this is a fault on our side of the wire or the server's,
    /// as opposed to a rejected request.
    #[must_use]
    pub const fn is_server_fault(&self) -> bool {
        match self {
            Self::Http(_) | Self::Parse(_) | Self::Endpoint(_) => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Unauthorized(_) | Self::NotFound(_) | Self::RateLimited(_) => false,
        }
    }
}

/// The remote store's request surface.
///
/// Every cart, address, and checkout call takes the caller's credentials
/// explicitly.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Catalog data for one product.
    async fn get_product(&self, product_id: &ProductId) -> Result<ProductSummary, StoreError>;

    async fn get_cart(&self, credentials: &Credentials) -> Result<Cart, StoreError>;

    /// Add `quantity` units under `key`; the server merges with any existing line.
    async fn add_line(
        &self,
        credentials: &Credentials,
        key: &LineKey,
        quantity: u32,
    ) -> Result<(), StoreError>;

    async fn remove_line(&self, credentials: &Credentials, key: &LineKey)
    -> Result<(), StoreError>;

    async fn update_quantity(
        &self,
        credentials: &Credentials,
        key: &LineKey,
        quantity: u32,
    ) -> Result<(), StoreError>;

    async fn clear_cart(&self, credentials: &Credentials) -> Result<(), StoreError>;

    async fn list_addresses(&self, credentials: &Credentials) -> Result<Vec<Address>, StoreError>;

    async fn create_address(
        &self,
        credentials: &Credentials,
        input: &AddressInput,
    ) -> Result<Address, StoreError>;

    async fn delete_address(
        &self,
        credentials: &Credentials,
        address_id: &AddressId,
    ) -> Result<(), StoreError>;

    /// Create a pending order. The returned amount is the one to charge.
    async fn create_order(
        &self,
        credentials: &Credentials,
        address_id: &AddressId,
        method: PaymentMethod,
    ) -> Result<CreatedOrder, StoreError>;

    async fn verify_payment(
        &self,
        credentials: &Credentials,
        order_id: &RemoteOrderId,
        signature: &SignatureFields,
    ) -> Result<Verification, StoreError>;
}
