//! Remote cart gateway over the storefront AJAX endpoints.
//!
//! | Operation     | Method | Path              | Response            |
//! |---------------|--------|-------------------|---------------------|
//! | Add one/many  | POST   | `/cart/add.js`    | added line(s) only  |
//! | Update/remove | POST   | `/cart/change.js` | full cart snapshot  |
//! | Snapshot      | GET    | `/cart.js`        | full cart snapshot  |
//!
//! Adds do not return the cart, so the gateway follows every successful add
//! with a snapshot fetch; callers only ever see full snapshots.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use theme_cart_core::LineKey;
use tracing::{debug, instrument};
use url::Url;

use super::error::GatewayError;
use super::types::{AddManyBody, CartSnapshot, ChangeBody, LineInput};
use crate::config::CartConfig;

/// Extra time the HTTP client allows on top of the configured request
/// timeout, so the synchronizer's own limit always fires first.
const CLIENT_TIMEOUT_GRACE: Duration = Duration::from_secs(1);

/// Typed access to the storefront cart.
#[async_trait]
pub trait CartGateway: Send + Sync {
    /// Add one line and return the resulting cart.
    async fn add_one(&self, line: &LineInput) -> Result<CartSnapshot, GatewayError>;

    /// Add several lines in one request and return the resulting cart.
    async fn add_many(&self, lines: &[LineInput]) -> Result<CartSnapshot, GatewayError>;

    /// Set a line's quantity; 0 removes the line.
    async fn update_quantity(
        &self,
        key: &LineKey,
        quantity: u32,
    ) -> Result<CartSnapshot, GatewayError>;

    /// Remove a line. Same request as a quantity-0 update.
    async fn remove(&self, key: &LineKey) -> Result<CartSnapshot, GatewayError> {
        self.update_quantity(key, 0).await
    }

    /// Fetch the current cart.
    async fn get_snapshot(&self) -> Result<CartSnapshot, GatewayError>;
}

#[async_trait]
impl<G: CartGateway + ?Sized> CartGateway for Arc<G> {
    async fn add_one(&self, line: &LineInput) -> Result<CartSnapshot, GatewayError> {
        (**self).add_one(line).await
    }

    async fn add_many(&self, lines: &[LineInput]) -> Result<CartSnapshot, GatewayError> {
        (**self).add_many(lines).await
    }

    async fn update_quantity(
        &self,
        key: &LineKey,
        quantity: u32,
    ) -> Result<CartSnapshot, GatewayError> {
        (**self).update_quantity(key, quantity).await
    }

    async fn remove(&self, key: &LineKey) -> Result<CartSnapshot, GatewayError> {
        (**self).remove(key).await
    }

    async fn get_snapshot(&self) -> Result<CartSnapshot, GatewayError> {
        (**self).get_snapshot().await
    }
}

// =============================================================================
// HttpCartGateway
// =============================================================================

/// `reqwest` implementation of [`CartGateway`].
///
/// Keeps a cookie jar so every call addresses the same storefront cart. The
/// jar starts with `cart=<token>` when [`CartConfig::cart_token`] is set,
/// which resumes an existing cart across processes.
#[derive(Clone)]
pub struct HttpCartGateway {
    inner: Arc<HttpCartGatewayInner>,
}

struct HttpCartGatewayInner {
    client: reqwest::Client,
    add_url: Url,
    change_url: Url,
    cart_url: Url,
}

impl HttpCartGateway {
    /// Create a gateway for the configured storefront.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint URLs cannot be built or the HTTP
    /// client fails to initialize.
    pub fn new(config: &CartConfig) -> Result<Self, GatewayError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        // The storefront answers theme AJAX calls with JSON errors only when this is set
        headers.insert("X-Requested-With", HeaderValue::from_static("XMLHttpRequest"));

        let base = &config.storefront_url;

        let jar = Arc::new(Jar::default());
        if let Some(token) = &config.cart_token {
            jar.add_cookie_str(&format!("cart={token}; Path=/"), base);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .cookie_provider(jar)
            .timeout(config.request_timeout + CLIENT_TIMEOUT_GRACE)
            .build()?;

        Ok(Self {
            inner: Arc::new(HttpCartGatewayInner {
                client,
                add_url: base.join("/cart/add.js")?,
                change_url: base.join("/cart/change.js")?,
                cart_url: base.join("/cart.js")?,
            }),
        })
    }

    /// POST a JSON body and return the raw success body.
    async fn post<B: Serialize + Sync + ?Sized>(
        &self,
        url: &Url,
        body: &B,
    ) -> Result<String, GatewayError> {
        let response = self
            .inner
            .client
            .post(url.clone())
            .json(body)
            .send()
            .await
            .map_err(transport)?;
        read_body(response).await
    }

    async fn get(&self, url: &Url) -> Result<String, GatewayError> {
        let response = self
            .inner
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(transport)?;
        read_body(response).await
    }
}

/// Read a response body, turning non-success statuses into [`GatewayError::Status`].
async fn read_body(response: reqwest::Response) -> Result<String, GatewayError> {
    let status = response.status();
    let body = response.text().await.map_err(transport)?;

    if !status.is_success() {
        tracing::error!(
            status = %status,
            body = %body.chars().take(500).collect::<String>(),
            "Storefront cart endpoint returned non-success status"
        );
        return Err(GatewayError::from_response(status.as_u16(), &body));
    }

    Ok(body)
}

/// Log the full transport failure; the returned error carries no URL.
fn transport(e: reqwest::Error) -> GatewayError {
    tracing::error!(error = %e, "Storefront cart request failed");
    GatewayError::from(e)
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, GatewayError> {
    serde_json::from_str(body).map_err(|e| {
        tracing::error!(
            error = %e,
            body = %body.chars().take(500).collect::<String>(),
            "Failed to parse storefront cart response"
        );
        GatewayError::Decode(e)
    })
}

#[async_trait]
impl CartGateway for HttpCartGateway {
    #[instrument(skip(self, line), fields(variant_id = %line.id, quantity = line.quantity))]
    async fn add_one(&self, line: &LineInput) -> Result<CartSnapshot, GatewayError> {
        // Response is the added line, not the cart
        self.post(&self.inner.add_url, line).await?;
        debug!("Line added, fetching cart");
        self.get_snapshot().await
    }

    #[instrument(skip(self, lines), fields(lines = lines.len()))]
    async fn add_many(&self, lines: &[LineInput]) -> Result<CartSnapshot, GatewayError> {
        self.post(&self.inner.add_url, &AddManyBody { items: lines })
            .await?;
        debug!("Lines added, fetching cart");
        self.get_snapshot().await
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn update_quantity(
        &self,
        key: &LineKey,
        quantity: u32,
    ) -> Result<CartSnapshot, GatewayError> {
        let body = self
            .post(&self.inner.change_url, &ChangeBody { id: key, quantity })
            .await?;
        decode(&body)
    }

    #[instrument(skip(self))]
    async fn get_snapshot(&self) -> Result<CartSnapshot, GatewayError> {
        let body = self.get(&self.inner.cart_url).await?;
        decode(&body)
    }
}
