//! Solana Pay transaction-request server and command-line payer.
//!
//! # Usage
//!
//! ```bash
//! # Serve the transaction-request endpoint (config.toml in current directory)
//! cargo run -p solpay-server --release -- serve
//!
//! # Pay for two boxes of cookies with a local key pair
//! cargo run -p solpay-server -- pay \
//!     --endpoint https://shop.example/api/checkout \
//!     --keypair ~/.config/solana/id.json \
//!     --item box-of-cookies=2
//!
//! # Configure logging level
//! RUST_LOG=debug cargo run -p solpay-server -- serve
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` - Path to TOML configuration file (default: `config.toml`)
//! - `HOST` - Override bind address (default: `0.0.0.0`)
//! - `PORT` - Override port (default: `3000`)
//! - `PAYER_KEYPAIR` - Key file path or base58 secret for `pay`
//! - `RUST_LOG` - Log level filter (default: `info`)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::Method;
use axum::{Json, Router};
use clap::{Parser, Subcommand};
use solpay::checkout::{Checkout, CheckoutConfig, CheckoutStatus, LocalTransactionSource};
use solpay::ledger::RpcLedger;
use solpay::recorder::{InMemoryIntentStore, IntentRecorder};
use solpay::submit::KeypairWallet;
use solpay::{LedgerClient, Selection, TransactionBuilder};
use solpay_http::client::HttpTransactionSource;
use solpay_http::link::transaction_request_url;
use solpay_http::server::{CHECKOUT_PATH, CheckoutState, checkout_router};
use solana_signer::Signer;
use tower_http::cors;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use url::Url;

use solpay_server::config::ServerConfig;
use solpay_server::util::{SigDown, load_keypair};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "CONFIG", default_value = "config.toml", global = true)]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the transaction-request endpoint (default)
    Serve,

    /// Pay for a selection through a remote endpoint and wait for confirmation
    Pay {
        /// Full URL of the transaction-request endpoint
        #[arg(short, long)]
        endpoint: Url,

        /// Key file path or base58 secret of the paying wallet
        #[arg(short, long, env = "PAYER_KEYPAIR", hide_env_values = true)]
        keypair: String,

        /// Product and quantity, e.g. `box-of-cookies=2`; repeatable
        #[arg(short, long = "item", value_parser = parse_item, required = true)]
        items: Vec<(String, u64)>,
    },
}

fn parse_item(raw: &str) -> Result<(String, u64), String> {
    let (id, quantity) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected <product>=<quantity>, got {raw:?}"))?;
    let quantity = quantity
        .trim()
        .parse()
        .map_err(|e| format!("invalid quantity {quantity:?}: {e}"))?;
    Ok((id.trim().to_owned(), quantity))
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let _ = rustls::crypto::ring::default_provider().install_default();

    let cli = Cli::parse();
    let result = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&cli.config).await,
        Command::Pay {
            endpoint,
            keypair,
            items,
        } => pay(&cli.config, endpoint, &keypair, items).await,
    };
    if let Err(e) = result {
        tracing::error!("solpay-server failed: {e}");
        std::process::exit(1);
    }
}

async fn serve(config_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::load_from(config_path)?;
    let recipient = config.recipient()?;
    let catalog = config.catalog()?;
    tracing::info!(
        host = %config.host,
        port = config.port,
        rpc = %config.rpc_url,
        %recipient,
        products = catalog.products().count(),
        "Loaded configuration"
    );

    let ledger: Arc<dyn LedgerClient> = Arc::new(RpcLedger::from_url(&config.rpc_url));
    let recorder: Arc<dyn IntentRecorder> = Arc::new(InMemoryIntentStore::new());
    let builder = TransactionBuilder::new(ledger, recipient, config.asset);
    let engine = LocalTransactionSource::new(Arc::new(catalog), builder).with_recorder(recorder);
    let state = Arc::new(CheckoutState {
        engine,
        merchant: config.merchant.clone().into(),
    });

    if let Some(public_url) = &config.public_url {
        let endpoint = public_url.join(CHECKOUT_PATH)?;
        tracing::info!(link = %transaction_request_url(&endpoint), "Transaction request link");
    }

    let app = Router::new()
        .merge(checkout_router(state))
        .route("/health", axum::routing::get(health))
        .layer(TraceLayer::new_for_http())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers(cors::Any),
        );

    let sig_down = SigDown::try_new()?;
    let shutdown = sig_down.cancellation_token();

    let addr = SocketAddr::new(config.host, config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

async fn pay(
    config_path: &str,
    endpoint: Url,
    keypair: &str,
    items: Vec<(String, u64)>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::load_from(config_path)?;
    let keypair = Arc::new(load_keypair(keypair)?);
    let mut selection = Selection::new();
    for (id, quantity) in items {
        selection.add(id, quantity)?;
    }

    let ledger = RpcLedger::from_url(&config.rpc_url);
    let wallet = KeypairWallet::new(Arc::clone(&keypair), Arc::clone(ledger.client()));
    let source = HttpTransactionSource::new(endpoint).with_timeout(Duration::from_secs(30));

    let metadata = source.metadata().await?;
    tracing::info!(
        merchant = %metadata.label,
        payer = %keypair.pubkey(),
        "Starting checkout"
    );

    let checkout_config = CheckoutConfig {
        poller: config.poller.into(),
        ..CheckoutConfig::default()
    };
    let mut checkout = Checkout::new(ledger, wallet, source, selection, checkout_config);

    let sig_down = SigDown::try_new()?;
    let shutdown = sig_down.cancellation_token();
    let cancel = checkout.cancel_token();
    tokio::spawn(async move {
        shutdown.cancelled().await;
        cancel.cancel();
    });

    let status = loop {
        let status = checkout.step().await?;
        tracing::info!(%status, "Checkout");
        if status.is_terminal() {
            break status;
        }
    };
    sig_down.release().await;

    let session = checkout.session();
    match status {
        CheckoutStatus::Confirmed => {
            if let Some(signature) = session.signature {
                tracing::info!(%signature, "Payment confirmed");
            }
            Ok(())
        }
        CheckoutStatus::Failed => Err(session
            .last_error
            .as_ref()
            .map_or_else(|| "checkout failed".to_owned(), ToString::to_string)
            .into()),
        other => Err(format!("checkout ended as {other}").into()),
    }
}

/// Health check endpoint.
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
