//! Storefront state shared with the UI layer.

use std::sync::Arc;

use bazaar_core::{
    Address, AddressId, AddressInput, CheckoutStep, Color, LineKey, PaymentMethod, ProductId, Size,
};
use tokio::sync::watch;
use tracing::{info, instrument};

use crate::addresses::{AddressRegistry, Confirmation, RemoveOutcome};
use crate::cart::CartSynchronizer;
use crate::checkout::{
    CheckoutFlow, OrderConfirmation, PaymentGateway, PaymentHandshake, PaymentProgress,
    PendingPayment, TransitionError,
};
use crate::config::StorefrontConfig;
use crate::error::{Result, clear_sentry_user, set_sentry_user};
use crate::notify::Notifier;
use crate::remote::{HttpRemoteStore, RemoteStore};
use crate::session::Session;

/// Cart, addresses and checkout for one browsing session.
///
/// This struct is cheaply cloneable via `Arc`. Each component publishes its
/// own `watch` snapshot; the methods here pass the current session to them.
#[derive(Clone)]
pub struct Storefront {
    inner: Arc<StorefrontInner>,
}

struct StorefrontInner {
    config: StorefrontConfig,
    session: watch::Sender<Session>,
    notifier: Notifier,
    cart: Arc<CartSynchronizer>,
    addresses: Arc<AddressRegistry>,
    flow: Arc<CheckoutFlow>,
    payments: PaymentHandshake,
}

impl Storefront {
    /// Wire the components to a remote store and payment gateway.
    ///
    /// Starts anonymous; call [`Storefront::switch_session`] to log in.
    #[must_use]
    pub fn new(
        config: StorefrontConfig,
        store: Arc<dyn RemoteStore>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let notifier = Notifier::new();
        let cart = Arc::new(CartSynchronizer::new(store.clone(), notifier.clone()));
        let addresses = Arc::new(AddressRegistry::new(store.clone(), notifier.clone()));
        let flow = Arc::new(CheckoutFlow::new(
            cart.clone(),
            addresses.clone(),
            notifier.clone(),
        ));
        let (session, _) = watch::channel(Session::anonymous());
        let payments = PaymentHandshake::new(
            store,
            gateway,
            cart.clone(),
            addresses.clone(),
            flow.clone(),
            notifier.clone(),
            session.subscribe(),
            &config,
        );

        Self {
            inner: Arc::new(StorefrontInner {
                config,
                session,
                notifier,
                cart,
                addresses,
                flow,
                payments,
            }),
        }
    }

    /// Build against the HTTP remote store described by `config`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the HTTP client cannot be built.
    pub fn connect(config: StorefrontConfig, gateway: Arc<dyn PaymentGateway>) -> Result<Self> {
        let store = HttpRemoteStore::new(&config.api)?;
        Ok(Self::new(config, Arc::new(store), gateway))
    }

    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn notifier(&self) -> &Notifier {
        &self.inner.notifier
    }

    #[must_use]
    pub fn cart(&self) -> &CartSynchronizer {
        &self.inner.cart
    }

    #[must_use]
    pub fn addresses(&self) -> &AddressRegistry {
        &self.inner.addresses
    }

    #[must_use]
    pub fn checkout(&self) -> &CheckoutFlow {
        &self.inner.flow
    }

    #[must_use]
    pub fn payments(&self) -> &PaymentHandshake {
        &self.inner.payments
    }

    /// Current session.
    #[must_use]
    pub fn session(&self) -> Session {
        self.inner.session.borrow().clone()
    }

    #[must_use]
    pub fn subscribe_session(&self) -> watch::Receiver<Session> {
        self.inner.session.subscribe()
    }

    /// Replace the session and reload everything for the new identity.
    ///
    /// Local state is dropped before loading, so nothing of the previous
    /// user's cart, addresses or checkout survives the switch.
    ///
    /// # Errors
    ///
    /// Returns the first load failure. The other load still completes.
    #[instrument(skip_all, fields(user_id = ?session.user_id()))]
    pub async fn switch_session(&self, session: Session) -> Result<()> {
        self.inner.flow.exit();
        self.inner.cart.reset();
        self.inner.addresses.reset();

        match session.user_id() {
            Some(user_id) => set_sentry_user(user_id),
            None => clear_sentry_user(),
        }
        info!(authenticated = session.is_authenticated(), "Session changed");
        self.inner.session.send_replace(session);
        self.refresh().await
    }

    /// Reload cart and addresses for the current session.
    ///
    /// # Errors
    ///
    /// Returns the first load failure.
    pub async fn refresh(&self) -> Result<()> {
        let session = self.session();
        let (cart, addresses) = tokio::join!(
            self.inner.cart.load(&session),
            self.inner.addresses.load(&session)
        );
        cart?;
        addresses?;
        Ok(())
    }

    // =========================================================================
    // Cart
    // =========================================================================

    /// # Errors
    ///
    /// See [`CartSynchronizer::add_line`].
    pub async fn add_to_cart(
        &self,
        product_id: &ProductId,
        quantity: u32,
        size: Size,
        color: Color,
    ) -> Result<()> {
        let session = self.session();
        self.inner
            .cart
            .add_line(&session, product_id, quantity, size, color)
            .await?;
        Ok(())
    }

    /// # Errors
    ///
    /// See [`CartSynchronizer::remove_line`].
    pub async fn remove_from_cart(&self, key: &LineKey) -> Result<()> {
        let session = self.session();
        self.inner.cart.remove_line(&session, key).await?;
        Ok(())
    }

    /// # Errors
    ///
    /// See [`CartSynchronizer::set_quantity`].
    pub async fn set_quantity(&self, key: &LineKey, quantity: i64) -> Result<()> {
        let session = self.session();
        self.inner.cart.set_quantity(&session, key, quantity).await?;
        Ok(())
    }

    // =========================================================================
    // Addresses
    // =========================================================================

    /// # Errors
    ///
    /// See [`AddressRegistry::add`].
    pub async fn add_address(&self, input: AddressInput) -> Result<Address> {
        let session = self.session();
        Ok(self.inner.addresses.add(&session, input).await?)
    }

    /// # Errors
    ///
    /// See [`AddressRegistry::remove`].
    pub async fn remove_address(
        &self,
        address_id: &AddressId,
        confirmation: &dyn Confirmation,
    ) -> Result<RemoveOutcome> {
        let session = self.session();
        Ok(self
            .inner
            .addresses
            .remove(&session, address_id, confirmation)
            .await?)
    }

    /// # Errors
    ///
    /// See [`AddressRegistry::select`].
    pub fn select_address(&self, address_id: &AddressId) -> Result<()> {
        Ok(self.inner.addresses.select(address_id)?)
    }

    // =========================================================================
    // Checkout
    // =========================================================================

    pub fn begin_checkout(&self) -> CheckoutStep {
        self.inner.flow.begin()
    }

    /// # Errors
    ///
    /// See [`CheckoutFlow::proceed`].
    pub fn proceed(&self) -> std::result::Result<CheckoutStep, TransitionError> {
        self.inner.flow.proceed()
    }

    /// # Errors
    ///
    /// See [`CheckoutFlow::back`].
    pub fn back(&self) -> std::result::Result<CheckoutStep, TransitionError> {
        self.inner.flow.back()
    }

    pub fn exit_checkout(&self) {
        self.inner.flow.exit();
    }

    /// Create the order and open the gateway.
    ///
    /// # Errors
    ///
    /// See [`PaymentHandshake::start`].
    pub async fn start_payment(&self, method: PaymentMethod) -> Result<PaymentProgress> {
        let session = self.session();
        Ok(self.inner.payments.start(&session, method).await?)
    }

    /// # Errors
    ///
    /// See [`PaymentHandshake::finish`].
    pub async fn finish_payment(&self, pending: PendingPayment) -> Result<OrderConfirmation> {
        Ok(self.inner.payments.finish(pending).await?)
    }

    /// Run the whole payment handshake and wait for its outcome.
    ///
    /// # Errors
    ///
    /// See [`PaymentHandshake::start`] and [`PaymentHandshake::finish`].
    pub async fn pay(&self, method: PaymentMethod) -> Result<OrderConfirmation> {
        match self.start_payment(method).await? {
            PaymentProgress::Placed(confirmation) => Ok(confirmation),
            PaymentProgress::AwaitingGateway(pending) => self.finish_payment(pending).await,
        }
    }
}

impl std::fmt::Debug for Storefront {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storefront")
            .field("session", &*self.inner.session.borrow())
            .field("step", &self.inner.flow.step())
            .finish_non_exhaustive()
    }
}
