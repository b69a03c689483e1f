//! Cart configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_URL` - Base URL of the storefront (e.g., <https://your-store.myshopify.com>)
//!
//! ## Optional
//! - `CART_REQUEST_TIMEOUT_MS` - Per-request timeout (default: 10000)
//! - `CART_DRAWER_DELAY_MS` - Delay before opening the drawer after an add (default: 50)
//! - `CART_HYDRATE_ATTEMPTS` - Initial cart fetch attempts (default: 3, minimum 1)
//! - `CART_HYDRATE_BACKOFF_MS` - Pause between hydration attempts (default: 250)
//! - `SHOP_MONEY_FORMAT` - Shop money template, e.g. `${{amount}}`
//! - `CART_TOKEN` - Existing cart to resume; sent as the `cart` cookie

use std::time::Duration;

use theme_cart_core::MoneyFormat;
use thiserror::Error;
use url::Url;

const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_DRAWER_DELAY_MS: u64 = 50;
const DEFAULT_HYDRATE_ATTEMPTS: u32 = 3;
const DEFAULT_HYDRATE_BACKOFF_MS: u64 = 250;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Cart client configuration.
#[derive(Debug, Clone)]
pub struct CartConfig {
    /// Storefront base URL; cart endpoints are resolved against it
    pub storefront_url: Url,
    /// Upper bound for a single cart request
    pub request_timeout: Duration,
    /// Delay between a successful add and the drawer-open signal
    pub drawer_delay: Duration,
    /// Number of attempts for the initial cart fetch
    pub hydrate_attempts: u32,
    /// Pause between hydration attempts
    pub hydrate_backoff: Duration,
    /// Shop money template; `None` uses the fixed `$0.00` format
    pub money_format: Option<MoneyFormat>,
    /// Cart to resume instead of starting a fresh one
    pub cart_token: Option<String>,
}

impl CartConfig {
    /// Create a configuration with default timings for the given storefront.
    #[must_use]
    pub fn new(storefront_url: Url) -> Self {
        Self {
            storefront_url,
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            drawer_delay: Duration::from_millis(DEFAULT_DRAWER_DELAY_MS),
            hydrate_attempts: DEFAULT_HYDRATE_ATTEMPTS,
            hydrate_backoff: Duration::from_millis(DEFAULT_HYDRATE_BACKOFF_MS),
            money_format: None,
            cart_token: None,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw_url = lookup("STOREFRONT_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("STOREFRONT_URL".to_string()))?;
        let storefront_url = Url::parse(raw_url.trim()).map_err(|e| {
            ConfigError::InvalidEnvVar("STOREFRONT_URL".to_string(), e.to_string())
        })?;
        if storefront_url.cannot_be_a_base()
            || !matches!(storefront_url.scheme(), "http" | "https")
        {
            return Err(ConfigError::InvalidEnvVar(
                "STOREFRONT_URL".to_string(),
                "must be an absolute http(s) URL".to_string(),
            ));
        }

        let request_timeout = Duration::from_millis(parse_or_default(
            &lookup,
            "CART_REQUEST_TIMEOUT_MS",
            DEFAULT_REQUEST_TIMEOUT_MS,
        )?);
        let drawer_delay = Duration::from_millis(parse_or_default(
            &lookup,
            "CART_DRAWER_DELAY_MS",
            DEFAULT_DRAWER_DELAY_MS,
        )?);
        let hydrate_attempts =
            parse_or_default(&lookup, "CART_HYDRATE_ATTEMPTS", DEFAULT_HYDRATE_ATTEMPTS)?;
        if hydrate_attempts == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "CART_HYDRATE_ATTEMPTS".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let hydrate_backoff = Duration::from_millis(parse_or_default(
            &lookup,
            "CART_HYDRATE_BACKOFF_MS",
            DEFAULT_HYDRATE_BACKOFF_MS,
        )?);

        let money_format = lookup("SHOP_MONEY_FORMAT").and_then(|template| {
            MoneyFormat::parse(&template)
                .inspect_err(|e| {
                    tracing::warn!(error = %e, "Ignoring SHOP_MONEY_FORMAT, using default format");
                })
                .ok()
        });

        let cart_token = lookup("CART_TOKEN")
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty());

        Ok(Self {
            storefront_url,
            request_timeout,
            drawer_delay,
            hydrate_attempts,
            hydrate_backoff,
            money_format,
            cart_token,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Parse an optional variable, falling back to a default when unset.
fn parse_or_default<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
        None => Ok(default),
    }
}
