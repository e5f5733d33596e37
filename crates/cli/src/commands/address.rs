//! Address commands.

use bazaar_core::{AddressId, AddressInput};
use bazaar_storefront::Storefront;
use bazaar_storefront::addresses::{PreConfirmed, RemoveOutcome};
use tracing::info;

use super::CliError;
use crate::console::StdinConfirmation;

/// Log saved addresses, marking the default and the selection.
#[allow(clippy::unnecessary_wraps)]
pub fn list(storefront: &Storefront) -> Result<(), CliError> {
    let snapshot = storefront.addresses().snapshot();
    if snapshot.addresses().is_empty() {
        info!("No saved addresses");
    }
    for address in snapshot.addresses() {
        info!(
            id = %address.id,
            kind = ?address.kind,
            default = address.is_default,
            selected = snapshot.selected.as_ref() == Some(&address.id),
            "{}",
            address.one_line()
        );
    }
    Ok(())
}

pub async fn add(storefront: &Storefront, input: AddressInput) -> Result<(), CliError> {
    let address = storefront.add_address(input).await?;
    info!(id = %address.id, "{}", address.one_line());
    Ok(())
}

pub async fn remove(storefront: &Storefront, id: &AddressId, yes: bool) -> Result<(), CliError> {
    let outcome = if yes {
        storefront.remove_address(id, &PreConfirmed).await?
    } else {
        storefront.remove_address(id, &StdinConfirmation).await?
    };
    if outcome == RemoveOutcome::Declined {
        info!("Address kept");
    }
    Ok(())
}
