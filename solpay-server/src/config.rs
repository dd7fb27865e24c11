//! Server and payer configuration.
//!
//! Loads configuration from a TOML file with support for environment variable
//! expansion in string values. Variables use `$VAR` or `${VAR}` syntax.
//!
//! # Example Configuration
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 3000
//! rpc_url = "https://api.devnet.solana.com"
//! recipient = "$SHOP_ADDRESS"
//! public_url = "https://shop.example"
//!
//! [merchant]
//! label = "Cookies Inc"
//! icon = "https://shop.example/icon.svg"
//! message = "Thanks for your order!"
//!
//! [[products]]
//! id = "box-of-cookies"
//! name = "Box of Cookies"
//! price = "0.05"
//!
//! [poller]
//! interval_ms = 500
//! timeout_secs = 120
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` - Path to configuration file (default: `config.toml`)
//! - `HOST` - Override server bind address
//! - `PORT` - Override server port

use serde::{Deserialize, Serialize};
use solpay::catalog::Product;
use solpay::poller::PollerConfig;
use solpay::{Address, Catalog, PaymentAsset};
use solpay_http::server::MerchantInfo;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (default: `0.0.0.0`).
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Server port (default: `3000`).
    #[serde(default = "default_port")]
    pub port: u16,

    /// JSON-RPC endpoint of the ledger.
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// Merchant address credited by every payment.
    /// Supports `$VAR` / `${VAR}` for environment variable expansion.
    #[serde(default)]
    pub recipient: String,

    /// Asset payments are made in (default: native SOL).
    #[serde(default)]
    pub asset: PaymentAsset,

    /// Public base URL, used to log the `solana:` link at startup.
    #[serde(default)]
    pub public_url: Option<Url>,

    /// Merchant text.
    #[serde(default)]
    pub merchant: MerchantConfig,

    /// Product table. Empty means the built-in cookie catalog.
    #[serde(default)]
    pub products: Vec<Product>,

    /// Confirmation polling used by the payer.
    #[serde(default)]
    pub poller: PollerSettings,
}

/// Merchant text shown by wallets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MerchantConfig {
    /// Shop name.
    pub label: String,
    /// Absolute icon URL.
    pub icon: String,
    /// Message attached to issued transactions.
    pub message: String,
}

impl Default for MerchantConfig {
    fn default() -> Self {
        Self {
            label: "Cookies Inc".to_owned(),
            icon: "https://freesvg.org/img/1370962427.png".to_owned(),
            message: "Thanks for your order! 🍪".to_owned(),
        }
    }
}

impl From<MerchantConfig> for MerchantInfo {
    fn from(config: MerchantConfig) -> Self {
        Self {
            label: config.label,
            icon: config.icon,
            message: config.message,
        }
    }
}

/// Poll cadence and budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerSettings {
    /// Delay between ledger queries, in milliseconds.
    pub interval_ms: u64,
    /// Give up after this many queries.
    pub max_attempts: Option<u32>,
    /// Give up after this many seconds.
    pub timeout_secs: Option<u64>,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            max_attempts: None,
            timeout_secs: Some(120),
        }
    }
}

impl From<PollerSettings> for PollerConfig {
    fn from(settings: PollerSettings) -> Self {
        Self {
            interval: Duration::from_millis(settings.interval_ms.max(1)),
            max_attempts: settings.max_attempts,
            timeout: settings.timeout_secs.map(Duration::from_secs),
            ..Self::default()
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(std::net::Ipv4Addr::new(0, 0, 0, 0))
}

const fn default_port() -> u16 {
    3000
}

fn default_rpc_url() -> String {
    "https://api.devnet.solana.com".to_owned()
}

impl ServerConfig {
    /// Loads configuration from `path`, or defaults if the file is missing.
    ///
    /// After loading, `HOST` and `PORT` env vars override the file values.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let content = if Path::new(path).exists() {
            std::fs::read_to_string(path)?
        } else {
            String::new()
        };
        let mut config = Self::parse(&content)?;

        if let Ok(host) = std::env::var("HOST")
            && let Ok(addr) = host.parse()
        {
            config.host = addr;
        }
        if let Ok(port) = std::env::var("PORT")
            && let Ok(p) = port.parse()
        {
            config.port = p;
        }

        Ok(config)
    }

    /// Parses TOML after expanding environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the expanded text is not a valid configuration.
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(&expand_env_vars(content))
    }

    /// The merchant address.
    ///
    /// # Errors
    ///
    /// Returns an error if the recipient is unset, still an unresolved
    /// variable, or not a valid address.
    pub fn recipient(&self) -> Result<Address, String> {
        let raw = self.recipient.trim();
        if raw.is_empty() || raw.starts_with('$') {
            return Err("recipient not resolved (missing env var?)".to_owned());
        }
        raw.parse().map_err(|e| format!("Invalid recipient: {e}"))
    }

    /// The product table.
    ///
    /// # Errors
    ///
    /// Returns an error on duplicate ids or negative prices.
    pub fn catalog(&self) -> Result<Catalog, solpay::ValidationError> {
        if self.products.is_empty() {
            Ok(Catalog::default())
        } else {
            Catalog::new(self.products.iter().cloned())
        }
    }
}

/// Expands `$VAR` and `${VAR}` patterns in a string from environment variables.
///
/// Unresolved variables are left as-is.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' {
            result.push(ch);
            continue;
        }
        let braced = chars.next_if_eq(&'{').is_some();
        let mut name = String::new();
        while let Some(&c) = chars.peek() {
            if braced && c == '}' {
                chars.next();
                break;
            }
            if !braced && !c.is_ascii_alphanumeric() && c != '_' {
                break;
            }
            name.push(c);
            chars.next();
        }

        match std::env::var(&name) {
            Ok(value) if !name.is_empty() => result.push_str(&value),
            _ if braced => {
                result.push_str("${");
                result.push_str(&name);
                if !name.is_empty() {
                    result.push('}');
                }
            }
            _ => {
                result.push('$');
                result.push_str(&name);
            }
        }
    }

    result
}
