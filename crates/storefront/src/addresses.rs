//! Saved addresses and the current shipping selection.
//!
//! Unlike the cart there is no optimistic path: address changes are applied
//! locally only after the remote store accepts them. Selection is local state
//! and is only persisted through the order that eventually references it.

use std::sync::Arc;

use async_trait::async_trait;
use bazaar_core::{Address, AddressBook, AddressId, AddressInput};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::cart::LOGIN_REQUIRED;
use crate::error::report_store_error;
use crate::notify::Notifier;
use crate::remote::{RemoteStore, StoreError};
use crate::session::{Credentials, Session};

/// Errors returned by address operations.
#[derive(Debug, Error)]
pub enum AddressError {
    /// No logged-in user.
    #[error("not authenticated")]
    NotAuthenticated,

    /// The ID is not in the address list.
    #[error("unknown address: {0}")]
    UnknownAddress(AddressId),

    /// Remote store request failed.
    #[error("remote store error: {0}")]
    Store(#[from] StoreError),
}

/// Interactive acknowledgment gate (e.g., "Delete this address?").
#[async_trait]
pub trait Confirmation: Send + Sync {
    /// Ask the customer; `true` means go ahead.
    async fn confirm(&self, prompt: &str) -> bool;
}

/// Confirmation already given up front (e.g., a `--yes` flag).
#[derive(Debug, Clone, Copy, Default)]
pub struct PreConfirmed;

#[async_trait]
impl Confirmation for PreConfirmed {
    async fn confirm(&self, _prompt: &str) -> bool {
        true
    }
}

/// Outcome of [`AddressRegistry::remove`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    /// The customer declined; nothing was sent.
    Declined,
}

/// Address list plus selection, as observed by the UI.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AddressSnapshot {
    pub book: AddressBook,
    pub selected: Option<AddressId>,
}

impl AddressSnapshot {
    #[must_use]
    pub fn addresses(&self) -> &[Address] {
        self.book.addresses()
    }

    #[must_use]
    pub fn selected_address(&self) -> Option<&Address> {
        self.selected.as_ref().and_then(|id| self.book.get(id))
    }
}

/// Owner of the saved address list and the current selection.
pub struct AddressRegistry {
    store: Arc<dyn RemoteStore>,
    notifier: Notifier,
    state: watch::Sender<AddressSnapshot>,
}

impl AddressRegistry {
    #[must_use]
    pub fn new(store: Arc<dyn RemoteStore>, notifier: Notifier) -> Self {
        let (state, _) = watch::channel(AddressSnapshot::default());
        Self {
            store,
            notifier,
            state,
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> AddressSnapshot {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AddressSnapshot> {
        self.state.subscribe()
    }

    /// Currently selected address ID.
    #[must_use]
    pub fn selected(&self) -> Option<AddressId> {
        self.state.borrow().selected.clone()
    }

    /// Currently selected address.
    #[must_use]
    pub fn selected_address(&self) -> Option<Address> {
        self.state.borrow().selected_address().cloned()
    }

    /// Fetch saved addresses and settle the selection.
    ///
    /// A selection that is missing or no longer listed falls back to the
    /// default address, or the first one. Anonymous sessions get an empty list.
    ///
    /// # Errors
    ///
    /// Returns `AddressError::Store` if the list could not be fetched; local
    /// state is left as it was.
    #[instrument(skip_all, fields(user_id = ?session.user_id()))]
    pub async fn load(&self, session: &Session) -> Result<(), AddressError> {
        let Some(credentials) = session.credentials() else {
            self.reset();
            return Ok(());
        };

        match self.store.list_addresses(credentials).await {
            Ok(addresses) => {
                let book = AddressBook::from_list(addresses);
                self.state.send_modify(|state| {
                    let still_listed = state.selected.as_ref().is_some_and(|id| book.contains(id));
                    if !still_listed {
                        state.selected = book.preferred().map(|a| a.id.clone());
                    }
                    state.book = book;
                    debug!(
                        count = state.book.addresses().len(),
                        selected = ?state.selected,
                        "Addresses loaded"
                    );
                });
                Ok(())
            }
            Err(e) => {
                report_store_error("list-addresses", &e);
                self.notifier.error("Could not load your addresses");
                Err(e.into())
            }
        }
    }

    /// Save a new address and select it.
    ///
    /// A new default clears the flag on every other address locally, without
    /// waiting for a reload.
    ///
    /// # Errors
    ///
    /// Returns `AddressError::Store` if the remote store rejects the address;
    /// the server's message is shown verbatim when it sent one.
    #[instrument(skip_all, fields(user_id = ?session.user_id()))]
    pub async fn add(&self, session: &Session, input: AddressInput) -> Result<Address, AddressError> {
        let credentials = self.require_credentials(session)?;

        match self.store.create_address(credentials, &input).await {
            Ok(mut address) => {
                // Servers that omit the flag in the response still made it default.
                address.is_default |= input.is_default;
                self.state.send_modify(|state| {
                    state.selected = Some(address.id.clone());
                    state.book.insert(address.clone());
                });
                info!(address_id = %address.id, is_default = address.is_default, "Address saved");
                self.notifier.success("Address saved");
                Ok(address)
            }
            Err(e) => {
                report_store_error("create-address", &e);
                self.notifier
                    .error(e.server_message().unwrap_or("Could not save address"));
                Err(e.into())
            }
        }
    }

    /// Delete a saved address after the customer confirms.
    ///
    /// Removing the selected address clears the selection; another address
    /// is not picked automatically.
    ///
    /// # Errors
    ///
    /// Returns `AddressError::Store` if the remote store rejects the delete;
    /// local state is left as it was.
    #[instrument(skip(self, session, confirmation), fields(address_id = %address_id))]
    pub async fn remove(
        &self,
        session: &Session,
        address_id: &AddressId,
        confirmation: &dyn Confirmation,
    ) -> Result<RemoveOutcome, AddressError> {
        let credentials = self.require_credentials(session)?;

        if !confirmation
            .confirm("Are you sure you want to delete this address?")
            .await
        {
            debug!("Address removal declined");
            return Ok(RemoveOutcome::Declined);
        }

        match self.store.delete_address(credentials, address_id).await {
            Ok(()) => {
                self.state.send_modify(|state| {
                    state.book.remove(address_id);
                    if state.selected.as_ref() == Some(address_id) {
                        state.selected = None;
                    }
                });
                info!("Address removed");
                self.notifier.success("Address removed");
                Ok(RemoveOutcome::Removed)
            }
            Err(e) => {
                report_store_error("delete-address", &e);
                self.notifier
                    .error(e.server_message().unwrap_or("Could not remove address"));
                Err(e.into())
            }
        }
    }

    /// Select a listed address for shipping. Local only.
    ///
    /// # Errors
    ///
    /// Returns `AddressError::UnknownAddress` if the ID is not listed.
    pub fn select(&self, address_id: &AddressId) -> Result<(), AddressError> {
        let mut result = Ok(());
        self.state.send_if_modified(|state| {
            if !state.book.contains(address_id) {
                result = Err(AddressError::UnknownAddress(address_id.clone()));
                return false;
            }
            let changed = state.selected.as_ref() != Some(address_id);
            state.selected = Some(address_id.clone());
            changed
        });
        if let Err(ref e) = result {
            warn!(error = %e, "Address selection refused");
            self.notifier.error("Please choose one of your saved addresses");
        }
        result
    }

    /// Drop local state without a network call (identity change).
    pub(crate) fn reset(&self) {
        self.state.send_replace(AddressSnapshot::default());
    }

    fn require_credentials<'s>(
        &self,
        session: &'s Session,
    ) -> Result<&'s Credentials, AddressError> {
        session.credentials().ok_or_else(|| {
            self.notifier.error(LOGIN_REQUIRED);
            AddressError::NotAuthenticated
        })
    }
}
