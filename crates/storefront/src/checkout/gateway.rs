//! External payment SDK seam.
//!
//! The gateway owns its own interactive UI. This side only loads it, hands it
//! the order to charge and a [`GatewayCallback`], and waits for the callback
//! to resolve. A callback dropped without being resolved means the customer
//! closed the payment window.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bazaar_core::CurrencyCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{OnceCell, oneshot};
use tracing::{info, instrument, warn};

use crate::remote::SignatureFields;

/// Errors raised while loading or opening the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("gateway failed to load: {0}")]
    Load(String),

    #[error("gateway could not be opened: {0}")]
    Open(String),

    /// No public key configured.
    #[error("gateway is not configured")]
    NotConfigured,
}

/// Non-sensitive customer details shown prefilled in the gateway UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prefill {
    pub name: String,
    pub contact: String,
}

/// Parameters handed to the gateway for one charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayOptions {
    /// Public key ID.
    pub key: String,
    /// Amount in minor units (paise, cents).
    pub amount: i64,
    pub currency: CurrencyCode,
    /// Remote order the gateway charges against.
    pub order_id: String,
    /// Merchant name.
    pub name: String,
    pub description: String,
    pub prefill: Prefill,
}

/// Failure reported by the gateway itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayFailure {
    #[serde(default)]
    pub code: Option<String>,
    pub reason: String,
}

impl GatewayFailure {
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            code: None,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for GatewayFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} ({code})", self.reason),
            None => f.write_str(&self.reason),
        }
    }
}

/// What the gateway reports when the customer finishes.
pub type GatewayResult = Result<SignatureFields, GatewayFailure>;

/// One-shot completion handle passed to [`PaymentGateway::open`].
#[derive(Debug)]
pub struct GatewayCallback {
    tx: oneshot::Sender<GatewayResult>,
}

impl GatewayCallback {
    pub(crate) fn channel() -> (Self, oneshot::Receiver<GatewayResult>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// Report a completed payment with its signed reference.
    pub fn complete(self, fields: SignatureFields) {
        self.resolve(Ok(fields));
    }

    /// Report a payment the gateway declined or errored on.
    pub fn fail(self, failure: GatewayFailure) {
        self.resolve(Err(failure));
    }

    fn resolve(self, result: GatewayResult) {
        if self.tx.send(result).is_err() {
            warn!("Gateway callback resolved after the payment was abandoned");
        }
    }
}

/// An external, callback-driven payment SDK.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Make the SDK available. May be called more than once.
    async fn load(&self) -> Result<(), GatewayError>;

    /// Start the interactive payment flow. Returns once the UI is up; the
    /// outcome arrives later through `callback`.
    fn open(&self, options: GatewayOptions, callback: GatewayCallback) -> Result<(), GatewayError>;
}

/// Lazy, idempotent gateway loading. A failed load is not remembered, so
/// the next payment retries it.
pub struct GatewayLoader {
    gateway: Arc<dyn PaymentGateway>,
    loaded: OnceCell<()>,
}

impl GatewayLoader {
    #[must_use]
    pub fn new(gateway: Arc<dyn PaymentGateway>) -> Self {
        Self {
            gateway,
            loaded: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.loaded.initialized()
    }

    /// Load the gateway on first use and return it.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError` if the SDK could not be loaded.
    #[instrument(skip(self))]
    pub async fn ensure_loaded(&self) -> Result<&dyn PaymentGateway, GatewayError> {
        self.loaded
            .get_or_try_init(|| async {
                self.gateway.load().await?;
                info!("Payment gateway loaded");
                Ok::<(), GatewayError>(())
            })
            .await?;
        Ok(self.gateway.as_ref())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct CountingGateway {
        loads: AtomicUsize,
        fail_first: Mutex<bool>,
    }

    #[async_trait]
    impl PaymentGateway for CountingGateway {
        async fn load(&self) -> Result<(), GatewayError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            let mut fail = self.fail_first.lock().unwrap();
            if *fail {
                *fail = false;
                return Err(GatewayError::Load("script blocked".to_string()));
            }
            Ok(())
        }

        fn open(&self, _options: GatewayOptions, _callback: GatewayCallback) -> Result<(), GatewayError> {
            Ok(())
        }
    }

    fn gateway(fail_first: bool) -> Arc<CountingGateway> {
        Arc::new(CountingGateway {
            loads: AtomicUsize::new(0),
            fail_first: Mutex::new(fail_first),
        })
    }

    #[tokio::test]
    async fn test_loader_loads_once() {
        let inner = gateway(false);
        let loader = GatewayLoader::new(inner.clone());
        loader.ensure_loaded().await.unwrap();
        loader.ensure_loaded().await.unwrap();
        assert!(loader.is_loaded());
        assert_eq!(inner.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_loader_retries_after_failure() {
        let inner = gateway(true);
        let loader = GatewayLoader::new(inner.clone());
        assert!(matches!(
            loader.ensure_loaded().await,
            Err(GatewayError::Load(_))
        ));
        assert!(!loader.is_loaded());
        loader.ensure_loaded().await.unwrap();
        assert_eq!(inner.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_callback_delivers_result() {
        let (callback, rx) = GatewayCallback::channel();
        callback.fail(GatewayFailure::new("card declined"));
        let result = rx.await.unwrap();
        assert_eq!(result.unwrap_err().reason, "card declined");
    }

    #[tokio::test]
    async fn test_dropped_callback_closes_channel() {
        let (callback, rx) = GatewayCallback::channel();
        drop(callback);
        assert!(rx.await.is_err());
    }

    #[test]
    fn test_failure_display() {
        let failure = GatewayFailure {
            code: Some("BAD_REQUEST_ERROR".to_string()),
            reason: "Payment declined".to_string(),
        };
        assert_eq!(failure.to_string(), "Payment declined (BAD_REQUEST_ERROR)");
    }

    #[test]
    fn test_options_serialize_camel_case() {
        let options = GatewayOptions {
            key: "key_live_public".to_string(),
            amount: 50_000,
            currency: CurrencyCode::INR,
            order_id: "order_X".to_string(),
            name: "Bazaar".to_string(),
            description: "Order order_X".to_string(),
            prefill: Prefill {
                name: "Asha".to_string(),
                contact: "9999999999".to_string(),
            },
        };
        let json = serde_json::to_value(&options).unwrap();
        assert_eq!(json["orderId"], "order_X");
        assert_eq!(json["amount"], 50_000);
        assert_eq!(json["prefill"]["contact"], "9999999999");
    }
}
