//! Cart lines and the cart merge rule.
//!
//! A line is identified by its [`LineKey`] (product, size, color). Two lines
//! with the same key are always merged, and a line never holds a quantity
//! below one: any change that would drop it there removes the line instead.
//!
//! `total` and `count` are derived from the lines on every call and are never
//! stored.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::ProductId;

/// A size option offered by a product (e.g., "M", "42").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Size(String);

/// A color option offered by a product (e.g., "Navy").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Color(String);

macro_rules! option_value {
    ($name:ident) => {
        impl $name {
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

option_value!(Size);
option_value!(Color);

/// Uniqueness key of a cart line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineKey {
    pub product_id: ProductId,
    pub size: Size,
    pub color: Color,
}

impl LineKey {
    #[must_use]
    pub fn new(
        product_id: impl Into<ProductId>,
        size: impl Into<Size>,
        color: impl Into<Color>,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            size: size.into(),
            color: color.into(),
        }
    }
}

/// Catalog data the cart denormalizes onto a line at add time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSummary {
    pub id: ProductId,
    pub title: String,
    /// Price of a single unit.
    pub unit_price: Decimal,
    #[serde(default)]
    pub image_url: Option<String>,
    /// Sizes this product is sold in. Empty means unrestricted.
    #[serde(default)]
    pub sizes: Vec<Size>,
    /// Colors this product is sold in. Empty means unrestricted.
    #[serde(default)]
    pub colors: Vec<Color>,
}

impl ProductSummary {
    /// Whether the product can be bought in the given size.
    #[must_use]
    pub fn offers_size(&self, size: &Size) -> bool {
        self.sizes.is_empty() || self.sizes.contains(size)
    }

    /// Whether the product can be bought in the given color.
    #[must_use]
    pub fn offers_color(&self, color: &Color) -> bool {
        self.colors.is_empty() || self.colors.contains(color)
    }
}

/// One purchasable selection in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: ProductId,
    pub quantity: u32,
    pub size: Size,
    pub color: Color,
    pub title: String,
    pub unit_price: Decimal,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl CartLine {
    /// Build a line for `key` from catalog data.
    #[must_use]
    pub fn from_product(product: &ProductSummary, key: LineKey, quantity: u32) -> Self {
        Self {
            product_id: key.product_id,
            quantity,
            size: key.size,
            color: key.color,
            title: product.title.clone(),
            unit_price: product.unit_price,
            image_url: product.image_url.clone(),
        }
    }

    /// The key this line merges under.
    #[must_use]
    pub fn key(&self) -> LineKey {
        LineKey {
            product_id: self.product_id.clone(),
            size: self.size.clone(),
            color: self.color.clone(),
        }
    }

    #[must_use]
    pub fn matches(&self, key: &LineKey) -> bool {
        self.product_id == key.product_id && self.size == key.size && self.color == key.color
    }

    /// `unit_price × quantity`, saturating at the `Decimal` bounds.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price.saturating_mul(Decimal::from(self.quantity))
    }
}

/// Result of [`Cart::set_quantity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityChange {
    /// The line now holds the requested quantity.
    Updated { from: u32, to: u32 },
    /// The requested quantity was below one, so the line was removed.
    Removed,
    /// No line has this key.
    Missing,
}

/// Ordered collection of cart lines.
///
/// Order is insertion order and carries no meaning.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "CartWire")]
pub struct Cart {
    lines: Vec<CartLine>,
}

#[derive(Deserialize)]
struct CartWire {
    #[serde(default)]
    lines: Vec<CartLine>,
}

impl From<CartWire> for Cart {
    fn from(wire: CartWire) -> Self {
        let mut cart = Self::empty();
        for line in wire.lines {
            cart.merge_line(line);
        }
        cart
    }
}

impl Cart {
    /// The empty cart.
    #[must_use]
    pub const fn empty() -> Self {
        Self { lines: Vec::new() }
    }

    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    #[must_use]
    pub fn line(&self, key: &LineKey) -> Option<&CartLine> {
        self.lines.iter().find(|line| line.matches(key))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Sum of `unit_price × quantity` over all lines, saturating like
    /// [`Cart::count`].
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.lines
            .iter()
            .fold(Decimal::ZERO, |acc, line| acc.saturating_add(line.line_total()))
    }

    /// Sum of quantities over all lines.
    #[must_use]
    pub fn count(&self) -> u32 {
        self.lines
            .iter()
            .fold(0_u32, |acc, line| acc.saturating_add(line.quantity))
    }

    /// Merge `line` into the cart and return the resulting quantity for its
    /// key. A zero-quantity line is ignored.
    pub fn merge_line(&mut self, line: CartLine) -> u32 {
        let key = line.key();
        if let Some(existing) = self.lines.iter_mut().find(|l| l.matches(&key)) {
            existing.quantity = existing.quantity.saturating_add(line.quantity);
            return existing.quantity;
        }
        if line.quantity == 0 {
            return 0;
        }
        let quantity = line.quantity;
        self.lines.push(line);
        quantity
    }

    /// Remove the line for `key`, returning it if it was present.
    pub fn remove_line(&mut self, key: &LineKey) -> Option<CartLine> {
        let index = self.lines.iter().position(|line| line.matches(key))?;
        Some(self.lines.remove(index))
    }

    /// Set the quantity for `key`. Quantities below one remove the line.
    pub fn set_quantity(&mut self, key: &LineKey, quantity: i64) -> QuantityChange {
        if quantity < 1 {
            return if self.remove_line(key).is_some() {
                QuantityChange::Removed
            } else {
                QuantityChange::Missing
            };
        }
        let to = u32::try_from(quantity).unwrap_or(u32::MAX);
        match self.lines.iter_mut().find(|line| line.matches(key)) {
            Some(line) => {
                let from = line.quantity;
                line.quantity = to;
                QuantityChange::Updated { from, to }
            }
            None => QuantityChange::Missing,
        }
    }

    /// Remove every line.
    pub fn clear(&mut self) {
        self.lines.clear();
    }
}
