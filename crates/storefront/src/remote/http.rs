//! HTTP implementation of [`RemoteStore`].
//!
//! Uses `reqwest` 0.13 with JSON bodies. Product summaries are cached using
//! `moka` (5-minute TTL); cart, address, and order calls never are.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bazaar_core::{
    Address, AddressId, AddressInput, Cart, LineKey, PaymentMethod, ProductId, ProductSummary,
    RemoteOrderId,
};
use moka::future::Cache;
use reqwest::{Method, RequestBuilder, StatusCode};
use secrecy::ExposeSecret;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::field::Empty;
use tracing::{Span, debug, instrument};
use url::Url;
use uuid::Uuid;

use super::{CreatedOrder, RemoteStore, SignatureFields, StoreError, Verification};
use crate::config::RemoteStoreConfig;
use crate::session::Credentials;

/// The HTTP header name for request IDs.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

const PRODUCT_CACHE_CAPACITY: u64 = 1000;
const PRODUCT_CACHE_TTL: Duration = Duration::from_secs(300);
const LOGGED_BODY_CHARS: usize = 500;

/// Client for the remote store REST API.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct HttpRemoteStore {
    inner: Arc<HttpRemoteStoreInner>,
}

struct HttpRemoteStoreInner {
    client: reqwest::Client,
    base_url: Url,
    products: Cache<ProductId, ProductSummary>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LineBody<'a> {
    #[serde(flatten)]
    key: &'a LineKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    quantity: Option<u32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateOrderBody<'a> {
    address_id: &'a AddressId,
    method: PaymentMethod,
}

impl HttpRemoteStore {
    /// Create a new remote store client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(config: &RemoteStoreConfig) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        let products = Cache::builder()
            .max_capacity(PRODUCT_CACHE_CAPACITY)
            .time_to_live(PRODUCT_CACHE_TTL)
            .build();

        Ok(Self {
            inner: Arc::new(HttpRemoteStoreInner {
                client,
                base_url: config.base_url.clone(),
                products,
            }),
        })
    }

    /// Build an endpoint URL from path segments. Segments are percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, StoreError> {
        endpoint_url(&self.inner.base_url, segments)
    }

    fn request(
        &self,
        method: Method,
        segments: &[&str],
        credentials: Option<&Credentials>,
    ) -> Result<RequestBuilder, StoreError> {
        let url = self.endpoint(segments)?;
        let request_id = tag_request();
        debug!(%method, %url, "remote store request");

        let mut builder = self
            .inner
            .client
            .request(method, url)
            .header(REQUEST_ID_HEADER, &request_id);
        if let Some(credentials) = credentials {
            builder = builder.bearer_auth(credentials.token().expose_secret());
        }
        Ok(builder)
    }

    /// Send a request and return the body of a successful response.
    async fn send(&self, builder: RequestBuilder) -> Result<String, StoreError> {
        let response = builder.send().await?;
        let status = response.status();

        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());

        let body = response.text().await?;

        if !status.is_success() {
            let err = error_from_status(status, retry_after, &body);
            if err.is_server_fault() {
                tracing::error!(
                    status = %status,
                    body = %truncate(&body, LOGGED_BODY_CHARS),
                    "Remote store returned non-success status"
                );
            } else {
                debug!(status = %status, error = %err, "Remote store rejected request");
            }
            return Err(err);
        }

        Ok(body)
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, StoreError> {
        let body = self.send(builder).await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %truncate(&body, LOGGED_BODY_CHARS),
                "Failed to parse remote store response"
            );
            StoreError::Parse(e)
        })
    }

    /// Send a request whose response body is irrelevant.
    async fn send_empty(&self, builder: RequestBuilder) -> Result<(), StoreError> {
        self.send(builder).await.map(|_| ())
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    #[instrument(skip(self), fields(request_id = Empty, product_id = %product_id))]
    async fn get_product(&self, product_id: &ProductId) -> Result<ProductSummary, StoreError> {
        if let Some(product) = self.inner.products.get(product_id).await {
            debug!("Cache hit for product");
            return Ok(product);
        }

        let builder = self.request(Method::GET, &["products", product_id.as_str()], None)?;
        let product: ProductSummary = self.send_json(builder).await?;

        self.inner
            .products
            .insert(product_id.clone(), product.clone())
            .await;

        Ok(product)
    }

    #[instrument(skip_all, fields(request_id = Empty, user_id = %credentials.user_id()))]
    async fn get_cart(&self, credentials: &Credentials) -> Result<Cart, StoreError> {
        let builder = self.request(Method::GET, &["cart"], Some(credentials))?;
        self.send_json(builder).await
    }

    #[instrument(skip(self, credentials), fields(request_id = Empty, user_id = %credentials.user_id()))]
    async fn add_line(
        &self,
        credentials: &Credentials,
        key: &LineKey,
        quantity: u32,
    ) -> Result<(), StoreError> {
        let builder = self
            .request(Method::POST, &["cart", "lines"], Some(credentials))?
            .json(&LineBody {
                key,
                quantity: Some(quantity),
            });
        self.send_empty(builder).await
    }

    #[instrument(skip(self, credentials), fields(request_id = Empty, user_id = %credentials.user_id()))]
    async fn remove_line(
        &self,
        credentials: &Credentials,
        key: &LineKey,
    ) -> Result<(), StoreError> {
        let builder = self
            .request(Method::POST, &["cart", "lines", "remove"], Some(credentials))?
            .json(&LineBody {
                key,
                quantity: None,
            });
        self.send_empty(builder).await
    }

    #[instrument(skip(self, credentials), fields(request_id = Empty, user_id = %credentials.user_id()))]
    async fn update_quantity(
        &self,
        credentials: &Credentials,
        key: &LineKey,
        quantity: u32,
    ) -> Result<(), StoreError> {
        let builder = self
            .request(Method::PATCH, &["cart", "lines"], Some(credentials))?
            .json(&LineBody {
                key,
                quantity: Some(quantity),
            });
        self.send_empty(builder).await
    }

    #[instrument(skip_all, fields(request_id = Empty, user_id = %credentials.user_id()))]
    async fn clear_cart(&self, credentials: &Credentials) -> Result<(), StoreError> {
        let builder = self.request(Method::DELETE, &["cart"], Some(credentials))?;
        self.send_empty(builder).await
    }

    #[instrument(skip_all, fields(request_id = Empty, user_id = %credentials.user_id()))]
    async fn list_addresses(&self, credentials: &Credentials) -> Result<Vec<Address>, StoreError> {
        let builder = self.request(Method::GET, &["addresses"], Some(credentials))?;
        self.send_json(builder).await
    }

    #[instrument(skip_all, fields(request_id = Empty, user_id = %credentials.user_id()))]
    async fn create_address(
        &self,
        credentials: &Credentials,
        input: &AddressInput,
    ) -> Result<Address, StoreError> {
        let builder = self
            .request(Method::POST, &["addresses"], Some(credentials))?
            .json(input);
        self.send_json(builder).await
    }

    #[instrument(skip(self, credentials), fields(request_id = Empty, user_id = %credentials.user_id()))]
    async fn delete_address(
        &self,
        credentials: &Credentials,
        address_id: &AddressId,
    ) -> Result<(), StoreError> {
        let builder = self.request(
            Method::DELETE,
            &["addresses", address_id.as_str()],
            Some(credentials),
        )?;
        self.send_empty(builder).await
    }

    #[instrument(skip(self, credentials), fields(request_id = Empty, user_id = %credentials.user_id()))]
    async fn create_order(
        &self,
        credentials: &Credentials,
        address_id: &AddressId,
        method: PaymentMethod,
    ) -> Result<CreatedOrder, StoreError> {
        let builder = self
            .request(Method::POST, &["orders"], Some(credentials))?
            .json(&CreateOrderBody { address_id, method });
        self.send_json(builder).await
    }

    // The signature itself stays out of the span.
    #[instrument(skip(self, credentials, signature), fields(request_id = Empty, payment_id = %signature.payment_id))]
    async fn verify_payment(
        &self,
        credentials: &Credentials,
        order_id: &RemoteOrderId,
        signature: &SignatureFields,
    ) -> Result<Verification, StoreError> {
        let builder = self
            .request(
                Method::POST,
                &["orders", order_id.as_str(), "verify"],
                Some(credentials),
            )?
            .json(signature);
        self.send_json(builder).await
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// A fresh request id, recorded on the calling span.
fn tag_request() -> String {
    let request_id = Uuid::new_v4().to_string();
    Span::current().record("request_id", &request_id);
    request_id
}

fn endpoint_url(base: &Url, segments: &[&str]) -> Result<Url, StoreError> {
    let mut url = base.clone();
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|()| StoreError::Endpoint(url::ParseError::RelativeUrlWithCannotBeABaseBase))?;
        path.pop_if_empty().extend(segments);
    }
    Ok(url)
}

/// Map a non-success status to a `StoreError`.
fn error_from_status(status: StatusCode, retry_after: Option<u64>, body: &str) -> StoreError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            StoreError::Unauthorized(server_message(body))
        }
        StatusCode::NOT_FOUND => StoreError::NotFound(server_message(body)),
        StatusCode::TOO_MANY_REQUESTS => StoreError::RateLimited(retry_after.unwrap_or(1)),
        _ => StoreError::Api {
            status: status.as_u16(),
            message: server_message(body).unwrap_or_default(),
        },
    }
}

/// Extract `message` (or `error`) from a JSON error body.
fn server_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["message", "error"]
        .iter()
        .find_map(|field| value.get(field).and_then(serde_json::Value::as_str))
        .map(str::to_string)
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
