//! Cart commands.

use bazaar_core::{LineKey, Money};
use bazaar_storefront::Storefront;
use tracing::info;

use super::CliError;

/// Log every cart line and the total.
#[allow(clippy::unnecessary_wraps)]
pub fn show(storefront: &Storefront) -> Result<(), CliError> {
    let cart = storefront.cart().snapshot();
    let currency = storefront.config().currency;
    if cart.is_empty() {
        info!("Your cart is empty");
        return Ok(());
    }
    for line in cart.lines() {
        info!(
            product_id = %line.product_id,
            size = %line.size,
            color = %line.color,
            quantity = line.quantity,
            line_total = %Money::new(line.line_total(), currency),
            "{}",
            line.title
        );
    }
    info!(
        items = cart.count(),
        total = %Money::new(cart.total(), currency),
        "Cart total"
    );
    Ok(())
}

pub async fn add(storefront: &Storefront, key: &LineKey, quantity: u32) -> Result<(), CliError> {
    storefront
        .add_to_cart(&key.product_id, quantity, key.size.clone(), key.color.clone())
        .await?;
    show(storefront)
}

pub async fn remove(storefront: &Storefront, key: &LineKey) -> Result<(), CliError> {
    storefront.remove_from_cart(key).await?;
    show(storefront)
}

pub async fn set(storefront: &Storefront, key: &LineKey, quantity: i64) -> Result<(), CliError> {
    storefront.set_quantity(key, quantity).await?;
    show(storefront)
}
