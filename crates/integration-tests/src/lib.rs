//! Test doubles for exercising the storefront engine end to end.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p bazaar-integration-tests
//! ```
//!
//! [`FakeStore`] keeps a server-side cart and address list, records every
//! call, can fail any operation on demand, and can cap line quantities the
//! way a stock check would. [`FakeGateway`] answers payment windows
//! according to a [`GatewayBehaviour`].

#![cfg_attr(not(test), forbid(unsafe_code))]
#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bazaar_core::{
    Address, AddressId, AddressInput, AddressKind, Cart, CartLine, Color, CurrencyCode, LineKey,
    Money, PaymentMethod, ProductId, ProductSummary, RemoteOrderId, Size, UserId,
};
use bazaar_storefront::Storefront;
use bazaar_storefront::addresses::Confirmation;
use bazaar_storefront::checkout::{
    GatewayCallback, GatewayError, GatewayFailure, GatewayOptions, PaymentGateway,
};
use bazaar_storefront::config::StorefrontConfig;
use bazaar_storefront::notify::Notice;
use bazaar_storefront::remote::{
    CreatedOrder, RemoteStore, SignatureFields, StoreError, Verification,
};
use bazaar_storefront::session::{Credentials, Session};
use rust_decimal::Decimal;
use secrecy::SecretString;
use tokio::sync::{Notify, broadcast};

// =============================================================================
// Fixtures
// =============================================================================

pub fn credentials(user_id: &str) -> Credentials {
    Credentials::new(
        UserId::new(user_id),
        SecretString::from(format!("tok-{user_id}-9fK2xQ7mLp")),
    )
}

pub fn session(user_id: &str) -> Session {
    Session::authenticated(credentials(user_id))
}

/// A product sold in S/M/L and red/blue.
pub fn product(id: &str, unit_price: i64) -> ProductSummary {
    ProductSummary {
        id: ProductId::new(id),
        title: format!("Product {id}"),
        unit_price: Decimal::new(unit_price, 0),
        image_url: None,
        sizes: vec![Size::new("S"), Size::new("M"), Size::new("L")],
        colors: vec![Color::new("red"), Color::new("blue")],
    }
}

pub fn key(product_id: &str, size: &str, color: &str) -> LineKey {
    LineKey::new(product_id, size, color)
}

pub fn address_input(full_name: &str, is_default: bool) -> AddressInput {
    AddressInput {
        kind: AddressKind::Home,
        full_name: full_name.to_string(),
        address: "12 MG Road".to_string(),
        city: "Bengaluru".to_string(),
        state: "KA".to_string(),
        pincode: "560001".to_string(),
        phone: "9999999999".to_string(),
        is_default,
    }
}

pub fn test_config() -> StorefrontConfig {
    StorefrontConfig::from_lookup(|key| match key {
        "BAZAAR_API_URL" => Some("http://store.test/api".to_string()),
        "BAZAAR_GATEWAY_KEY_ID" => Some("key_test_public".to_string()),
        "BAZAAR_STORE_NAME" => Some("Bazaar Test".to_string()),
        _ => None,
    })
    .unwrap()
}

/// Messages of every notice received so far.
pub fn drain(notices: &mut broadcast::Receiver<Notice>) -> Vec<String> {
    let mut messages = Vec::new();
    while let Ok(notice) = notices.try_recv() {
        messages.push(notice.message);
    }
    messages
}

// =============================================================================
// Remote store
// =============================================================================

/// Remote store operations, for call recording and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    GetProduct,
    GetCart,
    AddLine,
    RemoveLine,
    UpdateQuantity,
    ClearCart,
    ListAddresses,
    CreateAddress,
    DeleteAddress,
    CreateOrder,
    VerifyPayment,
}

#[derive(Default)]
struct StoreState {
    products: HashMap<ProductId, ProductSummary>,
    cart: Cart,
    addresses: Vec<Address>,
    next_id: u32,
    quantity_cap: Option<u32>,
    failures: HashMap<Op, (u16, String)>,
    calls: Vec<Op>,
    order_amount: Option<Money>,
    orders: Vec<(RemoteOrderId, AddressId, PaymentMethod)>,
}

/// In-memory remote store.
#[derive(Default)]
pub struct FakeStore {
    state: Mutex<StoreState>,
    verify_gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_product(self, product: ProductSummary) -> Self {
        self.state
            .lock()
            .unwrap()
            .products
            .insert(product.id.clone(), product);
        self
    }

    /// Fail `op` with a 503 and no message until [`FakeStore::recover`].
    pub fn fail(&self, op: Op) {
        self.fail_with(op, 503, "");
    }

    /// Statuses map to [`StoreError`] the way the HTTP client maps them.
    pub fn fail_with(&self, op: Op, status: u16, message: &str) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(op, (status, message.to_string()));
    }

    pub fn recover(&self, op: Op) {
        self.state.lock().unwrap().failures.remove(&op);
    }

    /// Cap every line's server-side quantity.
    pub fn cap_quantity(&self, cap: u32) {
        self.state.lock().unwrap().quantity_cap = Some(cap);
    }

    /// Charge a fixed amount instead of the server cart total.
    pub fn charge(&self, amount: Money) {
        self.state.lock().unwrap().order_amount = Some(amount);
    }

    /// Make `verify-payment` wait until the returned gate is notified.
    pub fn hold_verification(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.verify_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<Op> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, op: Op) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| **c == op)
            .count()
    }

    pub fn reset_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn server_cart(&self) -> Cart {
        self.state.lock().unwrap().cart.clone()
    }

    pub fn server_addresses(&self) -> Vec<Address> {
        self.state.lock().unwrap().addresses.clone()
    }

    pub fn orders(&self) -> Vec<(RemoteOrderId, AddressId, PaymentMethod)> {
        self.state.lock().unwrap().orders.clone()
    }

    /// Put a line straight into the server cart.
    pub fn seed_line(&self, product_id: &str, size: &str, color: &str, quantity: u32) {
        let mut state = self.state.lock().unwrap();
        let product = state.products[&ProductId::new(product_id)].clone();
        state.cart.merge_line(CartLine::from_product(
            &product,
            key(product_id, size, color),
            quantity,
        ));
    }

    /// Put an address straight into the server list.
    pub fn seed_address(&self, id: &str, full_name: &str, is_default: bool) {
        let address = Address::from_input(AddressId::new(id), address_input(full_name, is_default));
        self.state.lock().unwrap().addresses.push(address);
    }

    /// The signature the server accepts for a payment.
    pub fn signed(order_id: &RemoteOrderId, payment_id: &str) -> SignatureFields {
        SignatureFields {
            payment_id: payment_id.to_string(),
            order_id: order_id.to_string(),
            signature: format!("{order_id}|{payment_id}"),
        }
    }

    fn begin(&self, op: Op) -> Result<std::sync::MutexGuard<'_, StoreState>, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(op);
        if let Some((status, message)) = state.failures.get(&op) {
            let text = (!message.is_empty()).then(|| message.clone());
            return Err(match *status {
                401 | 403 => StoreError::Unauthorized(text),
                404 => StoreError::NotFound(text),
                status => StoreError::Api {
                    status,
                    message: message.clone(),
                },
            });
        }
        Ok(state)
    }
}

fn capped(quantity: u32, cap: Option<u32>) -> u32 {
    cap.map_or(quantity, |cap| quantity.min(cap))
}

#[async_trait]
impl RemoteStore for FakeStore {
    async fn get_product(&self, product_id: &ProductId) -> Result<ProductSummary, StoreError> {
        let state = self.begin(Op::GetProduct)?;
        state
            .products
            .get(product_id)
            .cloned()
            .ok_or(StoreError::NotFound(None))
    }

    async fn get_cart(&self, _credentials: &Credentials) -> Result<Cart, StoreError> {
        let state = self.begin(Op::GetCart)?;
        Ok(state.cart.clone())
    }

    async fn add_line(
        &self,
        _credentials: &Credentials,
        key: &LineKey,
        quantity: u32,
    ) -> Result<(), StoreError> {
        let mut state = self.begin(Op::AddLine)?;
        let product = state
            .products
            .get(&key.product_id)
            .cloned()
            .ok_or(StoreError::NotFound(None))?;
        let cap = state.quantity_cap;
        let merged = state
            .cart
            .merge_line(CartLine::from_product(&product, key.clone(), quantity));
        if capped(merged, cap) != merged {
            state.cart.set_quantity(key, i64::from(capped(merged, cap)));
        }
        Ok(())
    }

    async fn remove_line(&self, _credentials: &Credentials, key: &LineKey) -> Result<(), StoreError> {
        let mut state = self.begin(Op::RemoveLine)?;
        state.cart.remove_line(key);
        Ok(())
    }

    async fn update_quantity(
        &self,
        _credentials: &Credentials,
        key: &LineKey,
        quantity: u32,
    ) -> Result<(), StoreError> {
        let mut state = self.begin(Op::UpdateQuantity)?;
        let quantity = capped(quantity, state.quantity_cap);
        state.cart.set_quantity(key, i64::from(quantity));
        Ok(())
    }

    async fn clear_cart(&self, _credentials: &Credentials) -> Result<(), StoreError> {
        let mut state = self.begin(Op::ClearCart)?;
        state.cart.clear();
        Ok(())
    }

    async fn list_addresses(&self, _credentials: &Credentials) -> Result<Vec<Address>, StoreError> {
        let state = self.begin(Op::ListAddresses)?;
        Ok(state.addresses.clone())
    }

    async fn create_address(
        &self,
        _credentials: &Credentials,
        input: &AddressInput,
    ) -> Result<Address, StoreError> {
        let mut state = self.begin(Op::CreateAddress)?;
        state.next_id += 1;
        let address = Address::from_input(
            AddressId::new(format!("addr_new{}", state.next_id)),
            input.clone(),
        );
        if address.is_default {
            for other in &mut state.addresses {
                other.is_default = false;
            }
        }
        state.addresses.push(address.clone());
        Ok(address)
    }

    async fn delete_address(
        &self,
        _credentials: &Credentials,
        address_id: &AddressId,
    ) -> Result<(), StoreError> {
        let mut state = self.begin(Op::DeleteAddress)?;
        let before = state.addresses.len();
        state.addresses.retain(|a| &a.id != address_id);
        if state.addresses.len() == before {
            return Err(StoreError::NotFound(Some("Address not found".to_string())));
        }
        Ok(())
    }

    async fn create_order(
        &self,
        _credentials: &Credentials,
        address_id: &AddressId,
        method: PaymentMethod,
    ) -> Result<CreatedOrder, StoreError> {
        let mut state = self.begin(Op::CreateOrder)?;
        state.next_id += 1;
        let order_id = RemoteOrderId::new(format!("order_{}", state.next_id));
        let amount = state
            .order_amount
            .unwrap_or_else(|| Money::new(state.cart.total(), CurrencyCode::INR));
        state
            .orders
            .push((order_id.clone(), address_id.clone(), method));
        Ok(CreatedOrder { order_id, amount })
    }

    async fn verify_payment(
        &self,
        _credentials: &Credentials,
        order_id: &RemoteOrderId,
        fields: &SignatureFields,
    ) -> Result<Verification, StoreError> {
        drop(self.begin(Op::VerifyPayment)?);
        let expected = Self::signed(order_id, &fields.payment_id);
        let gate = self.verify_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(Verification {
            verified: fields.signature == expected.signature,
        })
    }
}

// =============================================================================
// Payment gateway
// =============================================================================

/// How [`FakeGateway`] answers a payment window.
#[derive(Debug, Clone)]
pub enum GatewayBehaviour {
    /// Pay with a correctly signed reference.
    Pay,
    /// Pay with this payload as-is.
    Respond(SignatureFields),
    /// Report a declined payment.
    Decline(String),
    /// Close the window without paying.
    Dismiss,
    /// Keep the callback for the test to resolve.
    Hold,
}

struct GatewayState {
    behaviour: GatewayBehaviour,
    load_failures: usize,
    loads: usize,
    opened: Vec<GatewayOptions>,
    held: VecDeque<GatewayCallback>,
}

pub struct FakeGateway {
    state: Mutex<GatewayState>,
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self::new(GatewayBehaviour::Pay)
    }
}

impl FakeGateway {
    pub fn new(behaviour: GatewayBehaviour) -> Self {
        Self {
            state: Mutex::new(GatewayState {
                behaviour,
                load_failures: 0,
                loads: 0,
                opened: Vec::new(),
                held: VecDeque::new(),
            }),
        }
    }

    pub fn behave(&self, behaviour: GatewayBehaviour) {
        self.state.lock().unwrap().behaviour = behaviour;
    }

    /// Fail the next `count` loads.
    pub fn fail_loads(&self, count: usize) {
        self.state.lock().unwrap().load_failures = count;
    }

    pub fn loads(&self) -> usize {
        self.state.lock().unwrap().loads
    }

    pub fn opened(&self) -> Vec<GatewayOptions> {
        self.state.lock().unwrap().opened.clone()
    }

    /// Oldest held callback.
    pub fn take_callback(&self) -> Option<GatewayCallback> {
        self.state.lock().unwrap().held.pop_front()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn load(&self) -> Result<(), GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.loads += 1;
        if state.load_failures > 0 {
            state.load_failures -= 1;
            return Err(GatewayError::Load("checkout script unavailable".to_string()));
        }
        Ok(())
    }

    fn open(&self, options: GatewayOptions, callback: GatewayCallback) -> Result<(), GatewayError> {
        let mut state = self.state.lock().unwrap();
        let order_id = RemoteOrderId::new(options.order_id.clone());
        state.opened.push(options);
        match state.behaviour.clone() {
            GatewayBehaviour::Pay => callback.complete(FakeStore::signed(&order_id, "pay_1")),
            GatewayBehaviour::Respond(fields) => callback.complete(fields),
            GatewayBehaviour::Decline(reason) => callback.fail(GatewayFailure::new(reason)),
            GatewayBehaviour::Dismiss => drop(callback),
            GatewayBehaviour::Hold => state.held.push_back(callback),
        }
        Ok(())
    }
}

// =============================================================================
// Confirmation
// =============================================================================

/// Answers every prompt the same way and records the prompts.
pub struct ScriptedConfirmation {
    answer: bool,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedConfirmation {
    pub const fn new(answer: bool) -> Self {
        Self {
            answer,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Confirmation for ScriptedConfirmation {
    async fn confirm(&self, prompt: &str) -> bool {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.answer
    }
}

// =============================================================================
// Harness
// =============================================================================

/// A storefront wired to fakes.
pub struct Harness {
    pub store: Arc<FakeStore>,
    pub gateway: Arc<FakeGateway>,
    pub storefront: Storefront,
}

impl Harness {
    /// Store with products `A` (100) and `B` (250).
    pub fn new() -> Self {
        let store = FakeStore::new()
            .with_product(product("A", 100))
            .with_product(product("B", 250));
        Self::with_store(store)
    }

    pub fn with_store(store: FakeStore) -> Self {
        let store = Arc::new(store);
        let gateway = Arc::new(FakeGateway::default());
        let storefront = Storefront::new(test_config(), store.clone(), gateway.clone());
        Self {
            store,
            gateway,
            storefront,
        }
    }

    pub async fn login(&self, user_id: &str) {
        self.storefront
            .switch_session(session(user_id))
            .await
            .unwrap();
    }

    /// Log in with one cart line and a default address, and walk checkout
    /// to the payment step.
    pub async fn at_payment_step(&self) {
        self.store.seed_line("A", "M", "red", 1);
        self.store.seed_address("addr1", "Asha Rao", true);
        self.login("user-1").await;
        self.storefront.begin_checkout();
        self.storefront.proceed().unwrap();
        self.storefront.proceed().unwrap();
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
