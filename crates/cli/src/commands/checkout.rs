//! Checkout command.

use bazaar_core::{AddressId, PaymentMethod};
use bazaar_storefront::Storefront;
use bazaar_storefront::checkout::PaymentProgress;
use bazaar_storefront::error::StorefrontError;
use tracing::info;

use super::CliError;

/// Walk the checkout steps and pay.
///
/// Without `--address` the address the registry settled on after loading
/// (the default, or the first saved) is used.
pub async fn run(
    storefront: &Storefront,
    address: Option<AddressId>,
    method: PaymentMethod,
) -> Result<(), CliError> {
    if let Some(id) = &address {
        storefront.select_address(id)?;
    }
    if storefront.addresses().selected().is_none() {
        return Err(CliError::NoAddress);
    }

    storefront.begin_checkout();
    storefront.proceed().map_err(StorefrontError::from)?;
    storefront.proceed().map_err(StorefrontError::from)?;

    let confirmation = match storefront.start_payment(method).await? {
        PaymentProgress::Placed(confirmation) => confirmation,
        PaymentProgress::AwaitingGateway(pending) => {
            info!(
                order_id = %pending.order_id(),
                amount = %pending.amount(),
                "Waiting for the payment gateway"
            );
            storefront.finish_payment(pending).await?
        }
    };

    info!(
        order_id = %confirmation.order_id,
        amount = %confirmation.amount,
        method = %confirmation.method,
        "Order placed"
    );
    Ok(())
}
