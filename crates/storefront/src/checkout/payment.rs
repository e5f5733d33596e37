//! Order creation, gateway invocation and payment verification.
//!
//! [`PaymentHandshake::start`] creates the remote order and opens the
//! gateway; [`PaymentHandshake::finish`] waits for the gateway callback and
//! verifies it. Only a verified payment empties the cart and completes the
//! checkout, and only while its attempt is still the live one for the same
//! user. Pending remote orders are never cancelled from here.

use std::sync::Arc;

use bazaar_core::{
    Address, AddressId, CheckoutStep, CurrencyCode, Money, PaymentMethod, PaymentOutcome,
    RemoteOrderId,
};
use chrono::Utc;
use thiserror::Error;
use tokio::sync::{oneshot, watch};
use tracing::{error, info, instrument, warn};

use super::flow::{CheckoutFlow, OrderConfirmation, PaymentAttempt, TransitionError};
use super::gateway::{
    GatewayCallback, GatewayError, GatewayFailure, GatewayLoader, GatewayOptions, GatewayResult,
    PaymentGateway, Prefill,
};
use crate::addresses::AddressRegistry;
use crate::cart::{CartSynchronizer, LOGIN_REQUIRED};
use crate::config::{GatewayConfig, StorefrontConfig};
use crate::error::{add_breadcrumb, report_store_error};
use crate::notify::Notifier;
use crate::remote::{RemoteStore, StoreError};
use crate::session::{Credentials, Session};

/// Errors returned by the payment handshake.
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("not authenticated")]
    NotAuthenticated,

    /// Checkout is not at a step that can take payment.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("could not create order: {0}")]
    OrderCreation(StoreError),

    #[error("order amount {0} cannot be charged")]
    InvalidAmount(Money),

    /// The server priced the order in a currency the store does not sell in.
    #[error("order priced in {}, store currency is {}", .actual.code(), .expected.code())]
    CurrencyMismatch {
        expected: CurrencyCode,
        actual: CurrencyCode,
    },

    #[error("payment gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// The gateway reported a declined or errored payment.
    #[error("payment failed: {0}")]
    Declined(GatewayFailure),

    /// The customer closed the payment window.
    #[error("payment window closed")]
    Dismissed,

    /// The attempt was backed out of or replaced before it resolved.
    #[error("payment attempt {0} is no longer current")]
    Superseded(RemoteOrderId),

    #[error("gateway charged order {actual}, expected {expected}")]
    OrderMismatch {
        expected: RemoteOrderId,
        actual: String,
    },

    #[error("could not verify payment: {0}")]
    Verification(StoreError),

    #[error("payment signature rejected")]
    NotVerified,
}

impl PaymentError {
    /// Notice text for this error.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::NotAuthenticated => LOGIN_REQUIRED.to_string(),
            Self::Transition(e) => e.user_message().to_string(),
            Self::OrderCreation(_) => "Could not create order".to_string(),
            Self::InvalidAmount(_) | Self::CurrencyMismatch { .. } => {
                "Payment failed: invalid order amount".to_string()
            }
            Self::Gateway(_) => "Payment gateway failed to load".to_string(),
            Self::Declined(failure) => format!("Payment failed: {}", failure.reason),
            Self::Dismissed => "Payment cancelled".to_string(),
            Self::Superseded(_) => "This payment is no longer active".to_string(),
            Self::OrderMismatch { .. } | Self::Verification(_) | Self::NotVerified => {
                "Payment verification failed".to_string()
            }
        }
    }
}

/// Result of [`PaymentHandshake::start`].
#[derive(Debug)]
pub enum PaymentProgress {
    /// Offline method; the order is placed and checkout is complete.
    Placed(OrderConfirmation),
    /// The gateway UI is open; pass this to [`PaymentHandshake::finish`].
    AwaitingGateway(PendingPayment),
}

/// A gateway payment waiting for its callback.
#[derive(Debug)]
pub struct PendingPayment {
    credentials: Credentials,
    order_id: RemoteOrderId,
    amount: Money,
    method: PaymentMethod,
    address_id: AddressId,
    result: oneshot::Receiver<GatewayResult>,
}

impl PendingPayment {
    #[must_use]
    pub const fn order_id(&self) -> &RemoteOrderId {
        &self.order_id
    }

    /// Server-computed amount being charged.
    #[must_use]
    pub const fn amount(&self) -> Money {
        self.amount
    }

    fn confirmation(&self) -> OrderConfirmation {
        OrderConfirmation {
            order_id: self.order_id.clone(),
            amount: self.amount,
            method: self.method,
            address_id: self.address_id.clone(),
            placed_at: Utc::now(),
        }
    }
}

/// Drives one payment from order creation to verification.
pub struct PaymentHandshake {
    store: Arc<dyn RemoteStore>,
    gateway: GatewayLoader,
    cart: Arc<CartSynchronizer>,
    addresses: Arc<AddressRegistry>,
    flow: Arc<CheckoutFlow>,
    notifier: Notifier,
    session: watch::Receiver<Session>,
    config: GatewayConfig,
    currency: CurrencyCode,
}

impl PaymentHandshake {
    /// `session` follows the live session so that a payment resolving after
    /// a logout or user switch leaves the new state alone.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn RemoteStore>,
        gateway: Arc<dyn PaymentGateway>,
        cart: Arc<CartSynchronizer>,
        addresses: Arc<AddressRegistry>,
        flow: Arc<CheckoutFlow>,
        notifier: Notifier,
        session: watch::Receiver<Session>,
        config: &StorefrontConfig,
    ) -> Self {
        Self {
            store,
            gateway: GatewayLoader::new(gateway),
            cart,
            addresses,
            flow,
            notifier,
            session,
            config: config.gateway.clone(),
            currency: config.currency,
        }
    }

    /// Create the remote order and, for gateway payments, open the gateway.
    ///
    /// # Errors
    ///
    /// Validation errors (not logged in, not at the payment step, no
    /// address) make no network call. Order creation and gateway failures
    /// leave any created remote order pending, as does an order priced in
    /// a currency other than the configured one.
    #[instrument(skip(self, session), fields(user_id = ?session.user_id()))]
    pub async fn start(
        &self,
        session: &Session,
        method: PaymentMethod,
    ) -> Result<PaymentProgress, PaymentError> {
        let credentials = session
            .credentials()
            .ok_or_else(|| self.refuse(PaymentError::NotAuthenticated))?;
        match self.flow.step() {
            Some(CheckoutStep::Payment) => {}
            Some(step) => return Err(self.refuse(TransitionError::WrongStep(step).into())),
            None => return Err(self.refuse(TransitionError::NoSession.into())),
        }
        let address = self
            .addresses
            .selected_address()
            .ok_or_else(|| self.refuse(TransitionError::NoAddressSelected.into()))?;
        let key_id = if method.is_offline() {
            None
        } else {
            let key_id = self.config.key_id.clone();
            Some(key_id.ok_or_else(|| self.fail(GatewayError::NotConfigured.into()))?)
        };

        let order = match self.store.create_order(credentials, &address.id, method).await {
            Ok(order) => order,
            Err(e) => {
                report_store_error("create-order", &e);
                return Err(self.fail(PaymentError::OrderCreation(e)));
            }
        };
        info!(order_id = %order.order_id, amount = %order.amount, %method, "Order created");
        add_breadcrumb(
            "payment",
            "Order created",
            Some(&[("order_id", order.order_id.as_str()), ("method", method.as_str())]),
        );

        if order.amount.currency_code != self.currency {
            let err = PaymentError::CurrencyMismatch {
                expected: self.currency,
                actual: order.amount.currency_code,
            };
            error!(order_id = %order.order_id, error = %err, "Order left pending");
            sentry::capture_error(&err);
            return Err(self.fail(err));
        }
        if !self.is_live_user(credentials) {
            warn!(order_id = %order.order_id, "Order created for a session that has ended");
            return Err(PaymentError::Superseded(order.order_id));
        }
        let attempt = PaymentAttempt::pending(order.order_id.clone(), order.amount, method);
        if let Err(e) = self.flow.attach_attempt(attempt) {
            // The customer left the payment step while the order was created.
            warn!(order_id = %order.order_id, error = %e, "Order created for an abandoned checkout");
            return Err(PaymentError::Superseded(order.order_id));
        }

        let Some(key_id) = key_id else {
            let placed = OrderConfirmation {
                order_id: order.order_id,
                amount: order.amount,
                method,
                address_id: address.id,
                placed_at: Utc::now(),
            };
            self.settle(credentials, placed.clone(), "Order placed").await;
            return Ok(PaymentProgress::Placed(placed));
        };

        let Some(amount) = order.amount.minor_units() else {
            self.flow
                .set_attempt_outcome(&order.order_id, PaymentOutcome::Failed);
            return Err(self.fail(PaymentError::InvalidAmount(order.amount)));
        };
        let options = GatewayOptions {
            key: key_id,
            amount,
            currency: order.amount.currency_code,
            order_id: order.order_id.to_string(),
            name: self.config.store_name.clone(),
            description: format!("Order {}", order.order_id),
            prefill: prefill_from(&address),
        };

        let (callback, rx) = GatewayCallback::channel();
        let opened = match self.gateway.ensure_loaded().await {
            Ok(gateway) => gateway.open(options, callback),
            Err(e) => Err(e),
        };
        if let Err(e) = opened {
            error!(order_id = %order.order_id, error = %e, "Payment gateway unavailable");
            sentry::capture_error(&e);
            self.flow
                .set_attempt_outcome(&order.order_id, PaymentOutcome::Failed);
            return Err(self.fail(e.into()));
        }

        info!(order_id = %order.order_id, "Payment gateway opened");
        add_breadcrumb(
            "payment",
            "Gateway opened",
            Some(&[("order_id", order.order_id.as_str())]),
        );
        Ok(PaymentProgress::AwaitingGateway(PendingPayment {
            credentials: credentials.clone(),
            order_id: order.order_id,
            amount: order.amount,
            method,
            address_id: address.id,
            result: rx,
        }))
    }

    /// Wait for the gateway callback and verify the payment.
    ///
    /// # Errors
    ///
    /// `Dismissed` when the payment window was closed (no notice, the
    /// attempt stays pending) and `Superseded` when the attempt was backed
    /// out of first. Declines and verification failures mark the attempt
    /// failed and leave checkout at the payment step.
    ///
    /// A payment that verifies after its checkout was left (exit, logout,
    /// another user) still returns its confirmation, but the current cart
    /// and checkout are left untouched.
    #[instrument(skip_all, fields(order_id = %pending.order_id))]
    pub async fn finish(&self, mut pending: PendingPayment) -> Result<OrderConfirmation, PaymentError> {
        let result = match (&mut pending.result).await {
            Ok(result) => result,
            Err(_) => {
                info!("Payment window closed without completing");
                return Err(PaymentError::Dismissed);
            }
        };

        if !self.flow.is_current_attempt(&pending.order_id) {
            warn!("Ignoring gateway callback for a discarded payment attempt");
            return Err(PaymentError::Superseded(pending.order_id));
        }

        let fields = match result {
            Ok(fields) => fields,
            Err(failure) => {
                warn!(reason = %failure, "Gateway reported payment failure");
                return Err(self.fail_attempt(&pending, PaymentError::Declined(failure)));
            }
        };

        if fields.order_id != pending.order_id.as_str() {
            let err = PaymentError::OrderMismatch {
                expected: pending.order_id.clone(),
                actual: fields.order_id.clone(),
            };
            warn!(error = %err, "Gateway callback does not match the order");
            return Err(self.fail_attempt(&pending, err));
        }

        match self
            .store
            .verify_payment(&pending.credentials, &pending.order_id, &fields)
            .await
        {
            Ok(verification) if verification.verified => {}
            Ok(_) => {
                warn!(payment_id = %fields.payment_id, "Payment signature rejected");
                return Err(self.fail_attempt(&pending, PaymentError::NotVerified));
            }
            Err(e) => {
                report_store_error("verify-payment", &e);
                return Err(self.fail_attempt(&pending, PaymentError::Verification(e)));
            }
        }

        info!(payment_id = %fields.payment_id, "Payment verified");
        let confirmation = pending.confirmation();
        if !self
            .settle(&pending.credentials, confirmation.clone(), "Payment successful")
            .await
        {
            warn!("Payment verified after its checkout was left; current state kept");
            if self.is_live_user(&pending.credentials) {
                self.notifier.info(format!(
                    "Payment received for order {}",
                    pending.order_id
                ));
            }
        }
        Ok(confirmation)
    }

    /// Complete checkout and empty the cart, if the attempt is still live
    /// for the same user. Returns whether it was.
    async fn settle(
        &self,
        credentials: &Credentials,
        confirmation: OrderConfirmation,
        message: &str,
    ) -> bool {
        let order_id = confirmation.order_id.clone();
        // Both checks and the local updates run without yielding.
        if !self.is_live_user(credentials) || !self.flow.complete_attempt(confirmation) {
            return false;
        }
        add_breadcrumb("payment", message, Some(&[("order_id", order_id.as_str())]));
        self.notifier.success(message);
        if let Err(e) = self.cart.clear(credentials).await {
            warn!(error = %e, "Remote cart not cleared after a placed order");
        }
        true
    }

    fn is_live_user(&self, credentials: &Credentials) -> bool {
        self.session.borrow().user_id() == Some(credentials.user_id())
    }

    fn fail_attempt(&self, pending: &PendingPayment, err: PaymentError) -> PaymentError {
        self.flow
            .set_attempt_outcome(&pending.order_id, PaymentOutcome::Failed);
        self.fail(err)
    }

    /// Publish a validation error and hand it back.
    fn refuse(&self, err: PaymentError) -> PaymentError {
        warn!(error = %err, "Payment refused");
        self.notifier.error(err.user_message());
        err
    }

    /// Publish a failure notice and hand the error back.
    fn fail(&self, err: PaymentError) -> PaymentError {
        self.notifier.error(err.user_message());
        err
    }
}

fn prefill_from(address: &Address) -> Prefill {
    Prefill {
        name: address.full_name.clone(),
        contact: address.phone.clone(),
    }
}
