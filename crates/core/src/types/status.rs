//! Status enums for checkout and payment.

use serde::{Deserialize, Serialize};

use super::ParseError;

/// How the customer pays for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PaymentMethod {
    /// Online payment through the external gateway.
    #[default]
    #[serde(rename = "gateway")]
    Gateway,
    /// Pay on delivery; no gateway interaction.
    #[serde(rename = "cod")]
    CashOnDelivery,
}

impl PaymentMethod {
    /// Offline methods place the order without opening the gateway.
    #[must_use]
    pub const fn is_offline(self) -> bool {
        matches!(self, Self::CashOnDelivery)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gateway => "gateway",
            Self::CashOnDelivery => "cod",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gateway" | "online" => Ok(Self::Gateway),
            "cod" | "cash-on-delivery" => Ok(Self::CashOnDelivery),
            other => Err(ParseError::new("payment method", other)),
        }
    }
}

/// Outcome of a single payment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOutcome {
    #[default]
    Pending,
    Verified,
    Failed,
}

impl PaymentOutcome {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// One step of the checkout sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStep {
    Cart,
    Shipping,
    Payment,
}

impl std::fmt::Display for CheckoutStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Cart => "cart",
            Self::Shipping => "shipping",
            Self::Payment => "payment",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_method_wire_names() {
        assert_eq!(
            serde_json::to_string(&PaymentMethod::CashOnDelivery).unwrap(),
            "\"cod\""
        );
        assert_eq!(
            serde_json::from_str::<PaymentMethod>("\"gateway\"").unwrap(),
            PaymentMethod::Gateway
        );
    }

    #[test]
    fn test_only_cod_is_offline() {
        assert!(PaymentMethod::CashOnDelivery.is_offline());
        assert!(!PaymentMethod::Gateway.is_offline());
    }

    #[test]
    fn test_pending_is_not_terminal() {
        assert!(!PaymentOutcome::Pending.is_terminal());
        assert!(PaymentOutcome::Verified.is_terminal());
        assert!(PaymentOutcome::Failed.is_terminal());
    }
}
