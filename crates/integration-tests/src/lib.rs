//! Integration tests for the theme cart.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p theme-cart-integration-tests
//! ```
//!
//! # Mock Storefront
//!
//! [`MockStorefront`] serves the three cart endpoints from an in-process
//! `axum` server bound to an ephemeral port. It keeps a real cart (merging
//! lines by variant and properties, enforcing stock limits), records every
//! request with its JSON body and `cart` cookie, and can fail or delay the
//! next request. Every response sets `cart=`[`MOCK_CART_TOKEN`].
//!
//! ```rust,ignore
//! let shop = MockStorefront::start().await;
//! shop.add_variant(7, "Pineapple Tee", 999);
//!
//! let gateway = HttpCartGateway::new(&shop.config())?;
//! let cart = gateway.add_one(&LineInput::new(VariantId::new(7), 2)).await?;
//! assert_eq!(shop.requests().len(), 2);
//! ```

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::extract::State;
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use theme_cart_storefront::CartConfig;
use tokio::task::JoinHandle;
use url::Url;

/// Cart token the mock storefront hands out.
pub const MOCK_CART_TOKEN: &str = "mock-cart";

/// A request received by the mock storefront.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: &'static str,
    pub path: &'static str,
    pub body: Option<Value>,
    /// Value of the `cart` cookie, if the client sent one.
    pub cart_cookie: Option<String>,
}

impl RecordedRequest {
    /// `"POST /cart/add.js"` style summary.
    #[must_use]
    pub fn route(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

#[derive(Debug, Clone)]
struct Variant {
    title: String,
    price: i64,
    stock: Option<u32>,
}

#[derive(Debug, Clone)]
struct Line {
    key: String,
    id: u64,
    quantity: u32,
    properties: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct MockCart {
    variants: BTreeMap<u64, Variant>,
    lines: Vec<Line>,
    requests: Vec<RecordedRequest>,
    fail_next: Option<(u16, String)>,
    delay_next: Option<Duration>,
}

type Shared = Arc<Mutex<MockCart>>;

/// In-process storefront serving `/cart/add.js`, `/cart/change.js` and `/cart.js`.
pub struct MockStorefront {
    addr: SocketAddr,
    cart: Shared,
    task: JoinHandle<()>,
}

impl MockStorefront {
    /// Bind to an ephemeral port and start serving.
    ///
    /// # Panics
    ///
    /// Panics if the listener cannot be bound.
    pub async fn start() -> Self {
        let cart: Shared = Arc::default();

        let app = Router::new()
            .route("/cart/add.js", post(add))
            .route("/cart/change.js", post(change))
            .route("/cart.js", get(show))
            .layer(axum::middleware::map_response(set_cart_cookie))
            .with_state(Arc::clone(&cart));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock storefront");
        let addr = listener.local_addr().expect("mock storefront address");

        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, cart, task }
    }

    /// Base URL of the mock storefront.
    ///
    /// # Panics
    ///
    /// Never in practice; the address is always a valid URL.
    #[must_use]
    pub fn url(&self) -> Url {
        Url::parse(&format!("http://{}/", self.addr)).expect("mock storefront url")
    }

    /// Cart configuration pointing at this storefront, with short timings.
    #[must_use]
    pub fn config(&self) -> CartConfig {
        let mut config = CartConfig::new(self.url());
        config.request_timeout = Duration::from_secs(2);
        config.drawer_delay = Duration::ZERO;
        config.hydrate_backoff = Duration::from_millis(10);
        config
    }

    /// Register a variant that can be added.
    pub fn add_variant(&self, id: u64, title: &str, price: i64) {
        self.lock().variants.insert(
            id,
            Variant {
                title: title.to_string(),
                price,
                stock: None,
            },
        );
    }

    /// Limit how many units of a variant the cart may hold.
    pub fn set_stock(&self, id: u64, stock: u32) {
        if let Some(variant) = self.lock().variants.get_mut(&id) {
            variant.stock = Some(stock);
        }
    }

    /// Put a line straight into the cart under a chosen key.
    pub fn seed_line(&self, key: &str, id: u64, quantity: u32) {
        self.lock().lines.push(Line {
            key: key.to_string(),
            id,
            quantity,
            properties: BTreeMap::new(),
        });
    }

    /// Answer the next request with this status and raw body.
    pub fn fail_next(&self, status: u16, body: &str) {
        self.lock().fail_next = Some((status, body.to_string()));
    }

    /// Hold the next request for `delay` before answering.
    pub fn delay_next(&self, delay: Duration) {
        self.lock().delay_next = Some(delay);
    }

    /// Requests received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    /// Request summaries (`"GET /cart.js"`) received so far.
    #[must_use]
    pub fn routes(&self) -> Vec<String> {
        self.lock().requests.iter().map(RecordedRequest::route).collect()
    }

    /// Forget recorded requests.
    pub fn clear_requests(&self) {
        self.lock().requests.clear();
    }

    /// The cart as `/cart.js` would return it.
    #[must_use]
    pub fn cart_json(&self) -> Value {
        self.lock().snapshot()
    }

    fn lock(&self) -> MutexGuard<'_, MockCart> {
        self.cart.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Configuration for a local port that nothing listens on.
///
/// # Panics
///
/// Panics if no ephemeral port can be reserved.
pub async fn unreachable_config() -> CartConfig {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("reserve port");
    let addr = listener.local_addr().expect("reserved address");
    drop(listener);

    let url = Url::parse(&format!("http://{addr}/")).expect("unreachable url");
    let mut config = CartConfig::new(url);
    config.request_timeout = Duration::from_secs(2);
    config.drawer_delay = Duration::ZERO;
    config.hydrate_attempts = 1;
    config
}

impl Drop for MockStorefront {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// =============================================================================
// Cart Model
// =============================================================================

impl MockCart {
    fn line_json(&self, line: &Line) -> Value {
        let (title, price) = self
            .variants
            .get(&line.id)
            .map_or(("Unknown", 0), |v| (v.title.as_str(), v.price));
        let properties = if line.properties.is_empty() {
            Value::Null
        } else {
            json!(line.properties)
        };
        json!({
            "key": line.key,
            "id": line.id,
            "quantity": line.quantity,
            "price": price,
            "line_price": price * i64::from(line.quantity),
            "title": title,
            "properties": properties,
            "available": true,
        })
    }

    fn snapshot(&self) -> Value {
        let items: Vec<Value> = self.lines.iter().map(|l| self.line_json(l)).collect();
        let item_count: u32 = self.lines.iter().map(|l| l.quantity).sum();
        let total_price: i64 = self
            .lines
            .iter()
            .map(|l| {
                self.variants.get(&l.id).map_or(0, |v| v.price) * i64::from(l.quantity)
            })
            .sum();
        json!({
            "token": MOCK_CART_TOKEN,
            "items": items,
            "item_count": item_count,
            "total_price": total_price,
            "currency": "USD",
        })
    }

    fn quantity_of(&self, id: u64) -> u32 {
        self.lines
            .iter()
            .filter(|l| l.id == id)
            .map(|l| l.quantity)
            .sum()
    }

    /// Check stock for a variant whose total would become `wanted`.
    fn check_stock(&self, id: u64, wanted: u32) -> Result<(), Response> {
        let Some(variant) = self.variants.get(&id) else {
            return Err(cart_error(StatusCode::NOT_FOUND, "Cannot find variant"));
        };
        if let Some(stock) = variant.stock
            && wanted > stock
        {
            return Err(cart_error(
                StatusCode::UNPROCESSABLE_ENTITY,
                &format!("All {stock} {} are in your cart.", variant.title),
            ));
        }
        Ok(())
    }

    fn add_line(&mut self, id: u64, quantity: u32, properties: BTreeMap<String, String>) -> Line {
        let key = line_key(id, &properties);
        if let Some(line) = self.lines.iter_mut().find(|l| l.key == key) {
            line.quantity += quantity;
            return line.clone();
        }
        let line = Line {
            key,
            id,
            quantity,
            properties,
        };
        self.lines.push(line.clone());
        line
    }
}

fn line_key(id: u64, properties: &BTreeMap<String, String>) -> String {
    if properties.is_empty() {
        return format!("{id}:default");
    }
    let props = properties
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(";");
    format!("{id}:{props}")
}

fn cart_error(status: StatusCode, description: &str) -> Response {
    (
        status,
        Json(json!({
            "status": status.as_u16(),
            "message": "Cart Error",
            "description": description,
        })),
    )
        .into_response()
}

struct AddInput {
    id: u64,
    quantity: u32,
    properties: BTreeMap<String, String>,
}

fn parse_add_input(value: &Value) -> Option<AddInput> {
    let id = match value.get("id")? {
        Value::Number(n) => n.as_u64()?,
        Value::String(s) => s.parse().ok()?,
        _ => return None,
    };
    let quantity = value
        .get("quantity")
        .and_then(Value::as_u64)
        .map_or(Some(1), |q| u32::try_from(q).ok())?;
    let properties = value
        .get("properties")
        .and_then(Value::as_object)
        .map(|props| {
            props
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default();
    Some(AddInput {
        id,
        quantity,
        properties,
    })
}

// =============================================================================
// Handlers
// =============================================================================

async fn set_cart_cookie(mut response: Response) -> Response {
    response.headers_mut().insert(
        SET_COOKIE,
        HeaderValue::from_static("cart=mock-cart; Path=/"),
    );
    response
}

fn cart_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|pair| pair.trim().strip_prefix("cart="))
        .map(str::to_string)
}

/// Record the request and apply any injected delay or failure.
async fn intake(
    cart: &Shared,
    method: &'static str,
    path: &'static str,
    headers: &HeaderMap,
    body: Option<Value>,
) -> Result<(), Response> {
    let (delay, failure) = {
        let mut cart = cart.lock().unwrap_or_else(PoisonError::into_inner);
        cart.requests.push(RecordedRequest {
            method,
            path,
            body,
            cart_cookie: cart_cookie(headers),
        });
        (cart.delay_next.take(), cart.fail_next.take())
    };

    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    if let Some((status, body)) = failure {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return Err((status, body).into_response());
    }
    Ok(())
}

async fn add(State(cart): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if let Err(response) =
        intake(&cart, "POST", "/cart/add.js", &headers, Some(body.clone())).await
    {
        return response;
    }

    let bundle = body.get("items").and_then(Value::as_array).cloned();
    let raw_lines = bundle.clone().unwrap_or_else(|| vec![body.clone()]);

    let Some(inputs) = raw_lines
        .iter()
        .map(parse_add_input)
        .collect::<Option<Vec<_>>>()
    else {
        return cart_error(StatusCode::BAD_REQUEST, "Invalid line");
    };

    let mut cart = cart.lock().unwrap_or_else(PoisonError::into_inner);
    for input in &inputs {
        let wanted = cart.quantity_of(input.id) + input.quantity;
        if let Err(response) = cart.check_stock(input.id, wanted) {
            return response;
        }
    }

    let added: Vec<Value> = inputs
        .into_iter()
        .map(|input| {
            let line = cart.add_line(input.id, input.quantity, input.properties);
            cart.line_json(&line)
        })
        .collect();

    if bundle.is_some() {
        Json(json!({ "items": added })).into_response()
    } else {
        Json(added.into_iter().next().unwrap_or(Value::Null)).into_response()
    }
}

async fn change(
    State(cart): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Err(response) =
        intake(&cart, "POST", "/cart/change.js", &headers, Some(body.clone())).await
    {
        return response;
    }

    let key = body.get("id").and_then(Value::as_str).unwrap_or_default();
    let Some(quantity) = body
        .get("quantity")
        .and_then(Value::as_u64)
        .and_then(|q| u32::try_from(q).ok())
    else {
        return cart_error(StatusCode::BAD_REQUEST, "Missing quantity");
    };

    let mut cart = cart.lock().unwrap_or_else(PoisonError::into_inner);
    let Some(position) = cart.lines.iter().position(|l| l.key == key) else {
        return cart_error(StatusCode::BAD_REQUEST, "Cannot find line");
    };

    if quantity == 0 {
        cart.lines.remove(position);
    } else {
        let id = cart.lines.get(position).map_or(0, |l| l.id);
        let current = cart.lines.get(position).map_or(0, |l| l.quantity);
        let wanted = cart.quantity_of(id) - current + quantity;
        if let Err(response) = cart.check_stock(id, wanted) {
            return response;
        }
        if let Some(line) = cart.lines.get_mut(position) {
            line.quantity = quantity;
        }
    }

    Json(cart.snapshot()).into_response()
}

async fn show(State(cart): State<Shared>, headers: HeaderMap) -> Response {
    if let Err(response) = intake(&cart, "GET", "/cart.js", &headers, None).await {
        return response;
    }
    let cart = cart.lock().unwrap_or_else(PoisonError::into_inner);
    Json(cart.snapshot()).into_response()
}
