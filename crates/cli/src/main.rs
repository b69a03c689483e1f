//! Theme Cart CLI - inspect and change a storefront cart from the terminal.
//!
//! # Usage
//!
//! ```bash
//! # Show the current cart
//! cart-cli show
//!
//! # Add two of a variant with a line property
//! cart-cli add 39897499729985 -q 2 -p Engraving=AW
//!
//! # Set, bump or remove a line by key
//! cart-cli update 39897499729985:5c0e6e1f9f4e 3
//! cart-cli inc 39897499729985:5c0e6e1f9f4e
//! cart-cli dec 39897499729985:5c0e6e1f9f4e
//! cart-cli remove 39897499729985:5c0e6e1f9f4e
//!
//! # Keep working on the cart printed by an earlier run
//! cart-cli --cart c1-7f3a show
//! ```
//!
//! Every command hydrates the cart first, runs at most one mutation through
//! the synchronizer and prints the resulting cart with its token. Configuration
//! comes from the environment (see `theme_cart_storefront::config`).

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "cart-cli")]
#[command(author, version, about = "Storefront cart tools")]
struct Cli {
    /// Cart token to resume (defaults to `CART_TOKEN`)
    #[arg(long, global = true, value_name = "TOKEN")]
    cart: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the current cart
    Show,
    /// Add a variant to the cart
    Add {
        /// Variant ID
        variant: String,

        /// Quantity to add
        #[arg(short, long, default_value = "1")]
        quantity: String,

        /// Line property as `name=value` (repeatable)
        #[arg(short, long = "property", value_name = "NAME=VALUE")]
        properties: Vec<String>,
    },
    /// Set the quantity of a line
    Update {
        /// Line key
        key: String,
        /// New quantity (0 removes the line)
        quantity: u32,
    },
    /// Remove a line
    Remove {
        /// Line key
        key: String,
    },
    /// Increase a line's quantity by one
    Inc {
        /// Line key
        key: String,
    },
    /// Decrease a line's quantity by one (never below 1)
    Dec {
        /// Line key
        key: String,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let session = commands::cart::Session::connect(cli.cart).await?;

    match cli.command {
        Commands::Show => {}
        Commands::Add {
            variant,
            quantity,
            properties,
        } => session.add(&variant, &quantity, &properties).await?,
        Commands::Update { key, quantity } => session.update(&key, quantity).await?,
        Commands::Remove { key } => session.remove(&key).await?,
        Commands::Inc { key } => session.increment(&key).await?,
        Commands::Dec { key } => session.decrement(&key).await?,
    }

    session.print();
    Ok(())
}
