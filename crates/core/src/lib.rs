//! Bazaar Core - Shared types library.
//!
//! This crate provides the data model shared by all Bazaar components:
//! - `storefront` - Cart/address synchronization and the checkout engine
//! - `cli` - Terminal front end that drives a storefront session
//!
//! # Architecture
//!
//! The core crate contains only types and pure state transitions - no I/O,
//! no HTTP clients, no async. The merge rule for cart lines and the
//! single-default rule for addresses live here so they can be tested without
//! a network.
//!
//! # Modules
//!
//! - [`types`] - Typed IDs, money, carts, addresses, and checkout enums

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
