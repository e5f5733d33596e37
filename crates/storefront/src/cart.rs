//! Client-held cart mirrored to the remote store.
//!
//! Mutations are applied locally first, then sent to the remote store. When a
//! request fails the local cart is not patched back by hand: the whole cart is
//! reloaded, because the server may have applied rules of its own (stock caps,
//! price changes) that no local inverse can reproduce.
//!
//! Mutations are not serialized against each other. A failed request and the
//! reload that follows it are the backstop for lost updates.

use std::sync::Arc;

use bazaar_core::{Cart, CartLine, Color, LineKey, ProductId, QuantityChange, Size};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::error::report_store_error;
use crate::notify::Notifier;
use crate::remote::{RemoteStore, StoreError};
use crate::session::{Credentials, Session};

pub const LOGIN_REQUIRED: &str = "Please log in to continue";

/// Errors returned by cart operations.
///
/// By the time one is returned the customer has been notified and the
/// local cart has been reconciled where needed.
#[derive(Debug, Error)]
pub enum CartError {
    /// No logged-in user.
    #[error("not authenticated")]
    NotAuthenticated,

    /// Requested quantity below one.
    #[error("quantity must be at least 1")]
    InvalidQuantity,

    /// Size not sold for this product.
    #[error("size {0} is not available")]
    UnavailableSize(Size),

    /// Color not sold for this product.
    #[error("color {0} is not available")]
    UnavailableColor(Color),

    /// Remote store request failed.
    #[error("remote store error: {0}")]
    Store(#[from] StoreError),
}

impl CartError {
    /// Text shown for validation failures.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::NotAuthenticated => LOGIN_REQUIRED.to_string(),
            Self::InvalidQuantity => "Quantity must be at least 1".to_string(),
            Self::UnavailableSize(size) => format!("Size {size} is not available"),
            Self::UnavailableColor(color) => format!("Color {color} is not available"),
            Self::Store(_) => "Cart update failed".to_string(),
        }
    }
}

/// Owner of the in-memory cart.
pub struct CartSynchronizer {
    store: Arc<dyn RemoteStore>,
    notifier: Notifier,
    cart: watch::Sender<Cart>,
}

impl CartSynchronizer {
    #[must_use]
    pub fn new(store: Arc<dyn RemoteStore>, notifier: Notifier) -> Self {
        let (cart, _) = watch::channel(Cart::empty());
        Self {
            store,
            notifier,
            cart,
        }
    }

    /// Current cart.
    #[must_use]
    pub fn snapshot(&self) -> Cart {
        self.cart.borrow().clone()
    }

    /// Observe every change to the cart.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Cart> {
        self.cart.subscribe()
    }

    /// Replace the local cart with the remote store's.
    ///
    /// Anonymous sessions get an empty cart with no network call.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Store` if the cart could not be fetched; the local
    /// cart is left as it was.
    #[instrument(skip_all, fields(user_id = ?session.user_id()))]
    pub async fn load(&self, session: &Session) -> Result<(), CartError> {
        let Some(credentials) = session.credentials() else {
            self.cart.send_replace(Cart::empty());
            return Ok(());
        };

        match self.store.get_cart(credentials).await {
            Ok(cart) => {
                debug!(lines = cart.lines().len(), "Cart loaded");
                self.cart.send_replace(cart);
                Ok(())
            }
            Err(e) => {
                report_store_error("get-cart", &e);
                self.notifier.error("Could not load your cart");
                Err(e.into())
            }
        }
    }

    /// Add `quantity` units of a product in the given size and color.
    ///
    /// Display fields are fetched from the catalog, the line is merged into the
    /// local cart, then the add is sent to the remote store.
    ///
    /// # Errors
    ///
    /// Validation errors leave the cart untouched. A failed add triggers a
    /// full reload before `CartError::Store` is returned.
    #[instrument(skip(self, session), fields(product_id = %product_id))]
    pub async fn add_line(
        &self,
        session: &Session,
        product_id: &ProductId,
        quantity: u32,
        size: Size,
        color: Color,
    ) -> Result<(), CartError> {
        let credentials = self.require_credentials(session)?;
        if quantity == 0 {
            return Err(self.refuse(CartError::InvalidQuantity));
        }

        let product = match self.store.get_product(product_id).await {
            Ok(product) => product,
            Err(e) => {
                report_store_error("get-product", &e);
                self.notifier.error("Could not add to cart");
                return Err(e.into());
            }
        };
        if !product.offers_size(&size) {
            return Err(self.refuse(CartError::UnavailableSize(size)));
        }
        if !product.offers_color(&color) {
            return Err(self.refuse(CartError::UnavailableColor(color)));
        }

        let key = LineKey {
            product_id: product_id.clone(),
            size,
            color,
        };
        let line = CartLine::from_product(&product, key.clone(), quantity);
        self.cart.send_modify(|cart| {
            let merged = cart.merge_line(line);
            debug!(quantity = merged, "Applied add optimistically");
        });

        match self.store.add_line(credentials, &key, quantity).await {
            Ok(()) => {
                info!(quantity, "Line added");
                self.notifier.success("Added to cart");
                Ok(())
            }
            Err(e) => {
                report_store_error("add-line", &e);
                self.notifier.error("Could not add to cart");
                self.reconcile(credentials).await;
                Err(e.into())
            }
        }
    }

    /// Remove the line for `key`.
    ///
    /// # Errors
    ///
    /// A failed remove triggers a full reload before `CartError::Store` is
    /// returned.
    #[instrument(skip(self, session), fields(product_id = %key.product_id))]
    pub async fn remove_line(&self, session: &Session, key: &LineKey) -> Result<(), CartError> {
        let credentials = self.require_credentials(session)?;

        self.cart.send_if_modified(|cart| cart.remove_line(key).is_some());

        match self.store.remove_line(credentials, key).await {
            Ok(()) => {
                info!("Line removed");
                self.notifier.success("Removed from cart");
                Ok(())
            }
            Err(e) => {
                report_store_error("remove-line", &e);
                self.notifier.error("Could not remove item");
                self.reconcile(credentials).await;
                Err(e.into())
            }
        }
    }

    /// Set the quantity for `key`. Anything below one removes the line.
    ///
    /// # Errors
    ///
    /// A failed update triggers a full reload before `CartError::Store` is
    /// returned.
    #[instrument(skip(self, session), fields(product_id = %key.product_id))]
    pub async fn set_quantity(
        &self,
        session: &Session,
        key: &LineKey,
        quantity: i64,
    ) -> Result<(), CartError> {
        if quantity < 1 {
            return self.remove_line(session, key).await;
        }
        let credentials = self.require_credentials(session)?;
        let quantity = u32::try_from(quantity).unwrap_or(u32::MAX);

        self.cart.send_if_modified(|cart| {
            let change = cart.set_quantity(key, i64::from(quantity));
            debug!(?change, "Applied quantity optimistically");
            matches!(change, QuantityChange::Updated { from, to } if from != to)
        });

        match self.store.update_quantity(credentials, key, quantity).await {
            Ok(()) => {
                info!(quantity, "Quantity updated");
                Ok(())
            }
            Err(e) => {
                report_store_error("update-quantity", &e);
                self.notifier.error("Could not update quantity");
                self.reconcile(credentials).await;
                Err(e.into())
            }
        }
    }

    /// Empty the cart locally and on the remote store.
    ///
    /// Only the payment handshake calls this, after a confirmed payment. The
    /// local cart stays empty even if the remote call fails.
    pub(crate) async fn clear(&self, credentials: &Credentials) -> Result<(), StoreError> {
        self.cart.send_replace(Cart::empty());
        self.store.clear_cart(credentials).await.inspect_err(|e| {
            report_store_error("clear-cart", e);
        })
    }

    /// Drop local state without a network call (identity change).
    pub(crate) fn reset(&self) {
        self.cart.send_replace(Cart::empty());
    }

    /// Re-fetch the authoritative cart after a failed mutation.
    async fn reconcile(&self, credentials: &Credentials) {
        match self.store.get_cart(credentials).await {
            Ok(cart) => {
                debug!("Cart reconciled with remote store");
                self.cart.send_replace(cart);
            }
            Err(e) => {
                // The mutation notice already went out; keep the local guess
                // until the next successful load.
                warn!(error = %e, "Cart reconciliation failed");
                report_store_error("get-cart", &e);
            }
        }
    }

    fn require_credentials<'s>(&self, session: &'s Session) -> Result<&'s Credentials, CartError> {
        session
            .credentials()
            .ok_or_else(|| self.refuse(CartError::NotAuthenticated))
    }

    /// Publish a validation error and hand it back.
    fn refuse(&self, err: CartError) -> CartError {
        warn!(error = %err, "Cart operation refused");
        self.notifier.error(err.user_message());
        err
    }
}
