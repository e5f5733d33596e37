//! Checkout step state machine.
//!
//! The machine is driven only by customer actions and by the payment
//! handshake; nothing in it times out or polls.

use std::sync::Arc;

use bazaar_core::{
    AddressId, Cart, CheckoutStep, Money, PaymentMethod, PaymentOutcome, RemoteOrderId,
};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::addresses::AddressRegistry;
use crate::cart::CartSynchronizer;
use crate::error::add_breadcrumb;
use crate::notify::Notifier;

/// Refused step changes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("checkout has not started")]
    NoSession,

    #[error("cart is empty")]
    EmptyCart,

    #[error("no shipping address selected")]
    NoAddressSelected,

    #[error("already at the first step")]
    AtFirstStep,

    /// Leaving the payment step forward only happens through a verified payment.
    #[error("payment has not been completed")]
    AwaitingPayment,

    #[error("checkout is at the {0} step")]
    WrongStep(CheckoutStep),
}

impl TransitionError {
    /// Inline validation message for the customer.
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::NoSession => "Checkout has not started",
            Self::EmptyCart => "Your cart is empty",
            Self::NoAddressSelected => "Please select a shipping address",
            Self::AtFirstStep => "You are already at the first step",
            Self::AwaitingPayment => "Please complete payment to place your order",
            Self::WrongStep(_) => "Please continue to the payment step first",
        }
    }
}

/// A payment attempt against one remote order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentAttempt {
    pub order_id: RemoteOrderId,
    /// Server-computed amount being charged.
    pub amount: Money,
    pub method: PaymentMethod,
    pub outcome: PaymentOutcome,
    pub started_at: DateTime<Utc>,
}

impl PaymentAttempt {
    #[must_use]
    pub fn pending(order_id: RemoteOrderId, amount: Money, method: PaymentMethod) -> Self {
        Self {
            order_id,
            amount,
            method,
            outcome: PaymentOutcome::Pending,
            started_at: Utc::now(),
        }
    }
}

/// A placed order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderConfirmation {
    pub order_id: RemoteOrderId,
    pub amount: Money,
    pub method: PaymentMethod,
    pub address_id: AddressId,
    pub placed_at: DateTime<Utc>,
}

/// An in-progress checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub step: CheckoutStep,
    /// Cart as of the last step change.
    pub cart: Cart,
    pub selected_address: Option<AddressId>,
    pub payment: Option<PaymentAttempt>,
}

impl CheckoutSession {
    #[must_use]
    pub const fn new(cart: Cart, selected_address: Option<AddressId>) -> Self {
        Self {
            step: CheckoutStep::Cart,
            cart,
            selected_address,
            payment: None,
        }
    }

    /// Move one step forward, if the guard for the current step passes.
    ///
    /// # Errors
    ///
    /// - `EmptyCart` leaving `Cart` with no lines
    /// - `NoAddressSelected` leaving `Shipping` without a selection
    /// - `AwaitingPayment` at `Payment`
    pub fn advance(
        &mut self,
        cart: &Cart,
        selected_address: Option<&AddressId>,
    ) -> Result<CheckoutStep, TransitionError> {
        let next = match self.step {
            CheckoutStep::Cart if cart.is_empty() => return Err(TransitionError::EmptyCart),
            CheckoutStep::Cart => CheckoutStep::Shipping,
            CheckoutStep::Shipping if selected_address.is_none() => {
                return Err(TransitionError::NoAddressSelected);
            }
            CheckoutStep::Shipping => CheckoutStep::Payment,
            CheckoutStep::Payment => return Err(TransitionError::AwaitingPayment),
        };
        self.step = next;
        self.cart = cart.clone();
        self.selected_address = selected_address.cloned();
        Ok(next)
    }

    /// Move one step back. Leaving `Payment` drops any in-flight attempt
    /// without telling the remote store.
    ///
    /// # Errors
    ///
    /// Returns `AtFirstStep` at `Cart`.
    pub fn back(&mut self) -> Result<CheckoutStep, TransitionError> {
        let previous = match self.step {
            CheckoutStep::Cart => return Err(TransitionError::AtFirstStep),
            CheckoutStep::Shipping => CheckoutStep::Cart,
            CheckoutStep::Payment => {
                if let Some(attempt) = self.payment.take() {
                    info!(order_id = %attempt.order_id, "Payment attempt abandoned");
                }
                CheckoutStep::Shipping
            }
        };
        self.step = previous;
        Ok(previous)
    }

    /// The attempt for `order_id`, if it is still the live one.
    #[must_use]
    pub fn attempt(&self, order_id: &RemoteOrderId) -> Option<&PaymentAttempt> {
        if self.step != CheckoutStep::Payment {
            return None;
        }
        self.payment.as_ref().filter(|a| &a.order_id == order_id)
    }
}

/// Observable checkout state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CheckoutState {
    /// Browsing; no checkout in progress.
    #[default]
    Idle,
    Active(CheckoutSession),
    /// Terminal success.
    Completed(OrderConfirmation),
}

impl CheckoutState {
    #[must_use]
    pub const fn step(&self) -> Option<CheckoutStep> {
        match self {
            Self::Active(session) => Some(session.step),
            Self::Idle | Self::Completed(_) => None,
        }
    }

    #[must_use]
    pub const fn session(&self) -> Option<&CheckoutSession> {
        match self {
            Self::Active(session) => Some(session),
            Self::Idle | Self::Completed(_) => None,
        }
    }
}

/// Checkout state machine bound to the live cart and address selection.
pub struct CheckoutFlow {
    cart: Arc<CartSynchronizer>,
    addresses: Arc<AddressRegistry>,
    notifier: Notifier,
    state: watch::Sender<CheckoutState>,
}

impl CheckoutFlow {
    #[must_use]
    pub fn new(
        cart: Arc<CartSynchronizer>,
        addresses: Arc<AddressRegistry>,
        notifier: Notifier,
    ) -> Self {
        let (state, _) = watch::channel(CheckoutState::Idle);
        Self {
            cart,
            addresses,
            notifier,
            state,
        }
    }

    #[must_use]
    pub fn state(&self) -> CheckoutState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CheckoutState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn step(&self) -> Option<CheckoutStep> {
        self.state.borrow().step()
    }

    /// Start checkout at the `Cart` step. An active checkout is left as is.
    pub fn begin(&self) -> CheckoutStep {
        let cart = self.cart.snapshot();
        let selected = self.addresses.selected();
        let mut step = CheckoutStep::Cart;
        self.state.send_if_modified(|state| {
            if let CheckoutState::Active(session) = state {
                step = session.step;
                return false;
            }
            *state = CheckoutState::Active(CheckoutSession::new(cart, selected));
            true
        });
        add_breadcrumb("checkout", "Checkout started", None);
        step
    }

    /// Leave checkout and return to browsing.
    pub fn exit(&self) {
        self.state.send_replace(CheckoutState::Idle);
    }

    /// Advance one step.
    ///
    /// # Errors
    ///
    /// Returns the refused transition; the validation message has already
    /// been published and the step is unchanged.
    pub fn proceed(&self) -> Result<CheckoutStep, TransitionError> {
        let cart = self.cart.snapshot();
        let selected = self.addresses.selected();
        let result = self.transition(|session| session.advance(&cart, selected.as_ref()));
        if let Ok(step) = result {
            info!(%step, "Checkout advanced");
            add_breadcrumb("checkout", "Checkout advanced", Some(&[("step", &step.to_string())]));
        }
        result
    }

    /// Go back one step.
    ///
    /// # Errors
    ///
    /// Returns the refused transition; the step is unchanged.
    pub fn back(&self) -> Result<CheckoutStep, TransitionError> {
        let result = self.transition(CheckoutSession::back);
        if let Ok(step) = result {
            info!(%step, "Checkout went back");
        }
        result
    }

    /// Record a new payment attempt, replacing any previous one.
    pub(crate) fn attach_attempt(&self, attempt: PaymentAttempt) -> Result<(), TransitionError> {
        let mut result = Err(TransitionError::NoSession);
        self.state.send_if_modified(|state| {
            let CheckoutState::Active(session) = state else {
                return false;
            };
            if session.step != CheckoutStep::Payment {
                result = Err(TransitionError::WrongStep(session.step));
                return false;
            }
            if let Some(previous) = session.payment.replace(attempt) {
                info!(order_id = %previous.order_id, "Previous payment attempt replaced");
            }
            result = Ok(());
            true
        });
        result
    }

    /// Whether `order_id` is still the live attempt.
    pub(crate) fn is_current_attempt(&self, order_id: &RemoteOrderId) -> bool {
        self.state
            .borrow()
            .session()
            .is_some_and(|session| session.attempt(order_id).is_some())
    }

    /// Set the outcome of the live attempt for `order_id`, if it still is live.
    pub(crate) fn set_attempt_outcome(
        &self,
        order_id: &RemoteOrderId,
        outcome: PaymentOutcome,
    ) -> bool {
        self.state.send_if_modified(|state| {
            let CheckoutState::Active(session) = state else {
                return false;
            };
            if session.step != CheckoutStep::Payment {
                return false;
            }
            match session.payment.as_mut() {
                Some(attempt) if &attempt.order_id == order_id => {
                    attempt.outcome = outcome;
                    true
                }
                _ => false,
            }
        })
    }

    /// Enter the terminal success state if `confirmation` is for the live
    /// attempt. Returns whether checkout completed.
    pub(crate) fn complete_attempt(&self, confirmation: OrderConfirmation) -> bool {
        let order_id = confirmation.order_id.clone();
        let completed = self.state.send_if_modified(|state| {
            let is_live = state
                .session()
                .is_some_and(|session| session.attempt(&order_id).is_some());
            if is_live {
                *state = CheckoutState::Completed(confirmation);
            }
            is_live
        });
        if completed {
            info!(%order_id, "Checkout completed");
        }
        completed
    }

    fn transition(
        &self,
        apply: impl FnOnce(&mut CheckoutSession) -> Result<CheckoutStep, TransitionError>,
    ) -> Result<CheckoutStep, TransitionError> {
        let mut result = Err(TransitionError::NoSession);
        self.state.send_if_modified(|state| {
            let CheckoutState::Active(session) = state else {
                return false;
            };
            result = apply(session);
            result.is_ok()
        });
        if let Err(ref e) = result {
            warn!(error = %e, "Checkout transition refused");
            self.notifier.error(e.user_message());
        }
        result
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bazaar_core::{CartLine, Color, CurrencyCode, ProductId, Size};
    use rust_decimal::Decimal;

    use super::*;

    fn cart_with_one_line() -> Cart {
        let mut cart = Cart::empty();
        cart.merge_line(CartLine {
            product_id: ProductId::new("p1"),
            quantity: 1,
            size: Size::new("M"),
            color: Color::new("red"),
            title: "Tee".to_string(),
            unit_price: Decimal::new(500, 0),
            image_url: None,
        });
        cart
    }

    fn attempt(order_id: &str) -> PaymentAttempt {
        PaymentAttempt::pending(
            RemoteOrderId::new(order_id),
            Money::new(Decimal::new(500, 0), CurrencyCode::INR),
            PaymentMethod::Gateway,
        )
    }

    #[test]
    fn test_empty_cart_cannot_leave_cart_step() {
        let mut session = CheckoutSession::new(Cart::empty(), None);
        assert_eq!(
            session.advance(&Cart::empty(), None),
            Err(TransitionError::EmptyCart)
        );
        assert_eq!(session.step, CheckoutStep::Cart);
    }

    #[test]
    fn test_shipping_to_payment_requires_address() {
        let cart = cart_with_one_line();
        let mut session = CheckoutSession::new(cart.clone(), None);
        assert_eq!(session.advance(&cart, None), Ok(CheckoutStep::Shipping));
        assert_eq!(
            session.advance(&cart, None),
            Err(TransitionError::NoAddressSelected)
        );
        // Refused regardless of cart contents.
        assert_eq!(
            session.advance(&Cart::empty(), None),
            Err(TransitionError::NoAddressSelected)
        );
        assert_eq!(session.step, CheckoutStep::Shipping);

        let address = AddressId::new("addr1");
        assert_eq!(session.advance(&cart, Some(&address)), Ok(CheckoutStep::Payment));
        assert_eq!(session.selected_address, Some(address));
    }

    #[test]
    fn test_payment_cannot_advance_by_itself() {
        let cart = cart_with_one_line();
        let address = AddressId::new("addr1");
        let mut session = CheckoutSession::new(cart.clone(), None);
        session.advance(&cart, None).unwrap();
        session.advance(&cart, Some(&address)).unwrap();
        assert_eq!(
            session.advance(&cart, Some(&address)),
            Err(TransitionError::AwaitingPayment)
        );
    }

    #[test]
    fn test_back_from_payment_drops_attempt() {
        let cart = cart_with_one_line();
        let address = AddressId::new("addr1");
        let mut session = CheckoutSession::new(cart.clone(), None);
        session.advance(&cart, None).unwrap();
        session.advance(&cart, Some(&address)).unwrap();
        session.payment = Some(attempt("order_X"));
        assert!(session.attempt(&RemoteOrderId::new("order_X")).is_some());

        assert_eq!(session.back(), Ok(CheckoutStep::Shipping));
        assert!(session.payment.is_none());
        assert!(session.attempt(&RemoteOrderId::new("order_X")).is_none());
        assert_eq!(session.back(), Ok(CheckoutStep::Cart));
        assert_eq!(session.back(), Err(TransitionError::AtFirstStep));
    }

    #[test]
    fn test_attempt_lookup_requires_matching_order() {
        let mut session = CheckoutSession::new(cart_with_one_line(), None);
        session.step = CheckoutStep::Payment;
        session.payment = Some(attempt("order_A"));
        assert!(session.attempt(&RemoteOrderId::new("order_B")).is_none());
    }

    #[test]
    fn test_user_messages() {
        assert_eq!(
            TransitionError::NoAddressSelected.user_message(),
            "Please select a shipping address"
        );
        assert_eq!(TransitionError::EmptyCart.user_message(), "Your cart is empty");
    }
}
