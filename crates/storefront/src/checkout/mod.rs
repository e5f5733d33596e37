//! Checkout: the step state machine and the payment handshake.
//!
//! # Flow
//!
//! ```text
//! Cart ──proceed──▶ Shipping ──proceed (address selected)──▶ Payment
//!   ▲                 │  ▲                                     │
//!   └──────back───────┘  └───────────back (attempt dropped)────┘
//!                                                              │
//!                                     verified payment ───────▶ Completed
//! ```
//!
//! - [`flow`] - Pure transition rules and the observable [`CheckoutFlow`]
//! - [`gateway`] - The external payment SDK seam
//! - [`payment`] - Order creation, gateway invocation, verification

pub mod flow;
pub mod gateway;
pub mod payment;

pub use flow::{
    CheckoutFlow, CheckoutSession, CheckoutState, OrderConfirmation, PaymentAttempt,
    TransitionError,
};
pub use gateway::{
    GatewayCallback, GatewayError, GatewayFailure, GatewayLoader, GatewayOptions, GatewayResult,
    PaymentGateway, Prefill,
};
pub use payment::{PaymentError, PaymentHandshake, PaymentProgress, PendingPayment};
