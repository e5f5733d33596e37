//! Bazaar storefront engine.
//!
//! Client-side cart, address and checkout state kept in sync with a remote
//! store, plus the payment handshake with an external gateway.
//!
//! # Modules
//!
//! - [`cart`] - Optimistic cart mirrored to the remote store
//! - [`addresses`] - Saved addresses and the shipping selection
//! - [`checkout`] - Step state machine and payment handshake
//! - [`remote`] - Remote store trait and HTTP client
//! - [`state`] - [`Storefront`] facade for UI layers

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod addresses;
pub mod cart;
pub mod checkout;
pub mod config;
pub mod error;
pub mod notify;
pub mod remote;
pub mod session;
pub mod state;

pub use state::Storefront;
