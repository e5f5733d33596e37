//! Command implementations.

pub mod address;
pub mod cart;
pub mod checkout;

use bazaar_storefront::config::ConfigError;
use bazaar_storefront::error::StorefrontError;
use thiserror::Error;

/// Errors that end a command with a non-zero exit.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storefront(#[from] StorefrontError),

    /// No credentials in the environment.
    #[error("Not logged in: set BAZAAR_USER_ID and BAZAAR_ACCESS_TOKEN")]
    NotLoggedIn,

    /// No address given and none saved.
    #[error("No shipping address: pass --address or save one first")]
    NoAddress,
}
