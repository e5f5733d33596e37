//! Checkout payloads exchanged with the remote store.

use bazaar_core::{Money, RemoteOrderId};
use serde::{Deserialize, Serialize};

/// A pending order created by the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedOrder {
    /// Remote order ID; also the gateway's order reference.
    #[serde(alias = "id")]
    pub order_id: RemoteOrderId,
    /// Amount to charge, computed by the server.
    pub amount: Money,
}

/// Signed payment reference returned by the gateway on completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureFields {
    /// Gateway-issued payment ID.
    pub payment_id: String,
    /// Order reference the gateway charged against.
    pub order_id: String,
    /// Signature over `order_id|payment_id`, checked by the server.
    pub signature: String,
}

/// Result of `verify-payment`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    pub verified: bool,
}
