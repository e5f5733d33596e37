//! Core types for Bazaar.
//!
//! This module provides type-safe wrappers for the cart and checkout domain.

pub mod address;
pub mod cart;
pub mod id;
pub mod price;
pub mod status;

pub use address::{Address, AddressBook, AddressInput, AddressKind};
pub use cart::{Cart, CartLine, Color, LineKey, ProductSummary, QuantityChange, Size};
pub use id::*;
pub use price::{CurrencyCode, Money};
pub use status::*;

/// A string that does not name any variant of a core enum.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseError {
    kind: &'static str,
    value: String,
}

impl ParseError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_owned(),
        }
    }
}
