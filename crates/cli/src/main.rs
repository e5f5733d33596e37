//! Bazaar CLI - Drive the storefront engine from a terminal.
//!
//! # Usage
//!
//! ```bash
//! # Show the cart
//! bazaar cart show
//!
//! # Add two medium red tees
//! bazaar cart add tee-classic --size M --color red --quantity 2
//!
//! # Save a default address
//! bazaar address add --full-name "Asha Rao" --address "12 MG Road" \
//!     --city Bengaluru --state KA --pincode 560001 --phone 9999999999 --default
//!
//! # Check out with cash on delivery
//! bazaar checkout --address addr_1 --method cod
//! ```
//!
//! # Commands
//!
//! - `cart` - Show and change the cart
//! - `address` - Manage saved addresses
//! - `checkout` - Place an order for the current cart
//!
//! The session comes from `BAZAAR_USER_ID` / `BAZAAR_ACCESS_TOKEN`.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use bazaar_core::{AddressKind, PaymentMethod};
use bazaar_storefront::Storefront;
use bazaar_storefront::config::{StorefrontConfig, credentials_from_lookup};
use bazaar_storefront::notify::{Notice, NoticeLevel};
use bazaar_storefront::session::Session;
use clap::{Args, Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod console;

use commands::CliError;
use console::ConsoleGateway;

#[derive(Parser)]
#[command(name = "bazaar")]
#[command(author, version, about = "Bazaar storefront CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show and change the cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Manage saved addresses
    Address {
        #[command(subcommand)]
        action: AddressAction,
    },
    /// Place an order for the current cart
    Checkout {
        /// Shipping address ID (defaults to the preferred address)
        #[arg(short, long)]
        address: Option<String>,

        /// Payment method (`gateway`, `cod`)
        #[arg(short, long, default_value = "gateway")]
        method: PaymentMethod,
    },
}

/// Identifies one cart line.
#[derive(Args)]
struct LineArgs {
    /// Product ID
    product: String,

    #[arg(short, long)]
    size: String,

    #[arg(short, long)]
    color: String,
}

#[derive(Subcommand)]
enum CartAction {
    /// List cart lines and the total
    Show,
    /// Add a product
    Add {
        #[command(flatten)]
        line: LineArgs,

        #[arg(short, long, default_value_t = 1)]
        quantity: u32,
    },
    /// Remove a line
    Remove {
        #[command(flatten)]
        line: LineArgs,
    },
    /// Set the quantity of a line (zero or less removes it)
    Set {
        #[command(flatten)]
        line: LineArgs,

        #[arg(allow_negative_numbers = true)]
        quantity: i64,
    },
}

#[derive(Subcommand)]
enum AddressAction {
    /// List saved addresses
    List,
    /// Save a new address
    Add(NewAddress),
    /// Delete a saved address
    Remove {
        /// Address ID
        id: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Args)]
struct NewAddress {
    #[arg(long)]
    full_name: String,

    /// Street address
    #[arg(long)]
    address: String,

    #[arg(long)]
    city: String,

    #[arg(long)]
    state: String,

    #[arg(long)]
    pincode: String,

    #[arg(long)]
    phone: String,

    /// Address type (`home`, `work`, `other`)
    #[arg(long, default_value = "home")]
    kind: AddressKind,

    /// Make this the default address
    #[arg(long)]
    default: bool,
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &StorefrontConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR => sentry_tracing::EventFilter::Event,
        tracing::Level::WARN | tracing::Level::INFO => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

fn init_tracing() {
    // Defaults to info level for our crates if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "bazaar_storefront=info,bazaar=info".into());
    let json = std::env::var("BAZAAR_LOG_JSON").is_ok_and(|v| v == "1");

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing();

    let result = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = StorefrontConfig::from_env()?;
    let _sentry_guard = init_sentry(&config);

    let credentials =
        credentials_from_lookup(|key| std::env::var(key).ok())?.ok_or(CliError::NotLoggedIn)?;
    let storefront = Storefront::connect(config, Arc::new(ConsoleGateway))?;
    let mut notices = storefront.notifier().subscribe();

    let result = async {
        storefront
            .switch_session(Session::authenticated(credentials))
            .await?;
        match cli.command {
            Commands::Cart { action } => match action {
                CartAction::Show => commands::cart::show(&storefront),
                CartAction::Add { line, quantity } => {
                    commands::cart::add(&storefront, &line.into(), quantity).await
                }
                CartAction::Remove { line } => {
                    commands::cart::remove(&storefront, &line.into()).await
                }
                CartAction::Set { line, quantity } => {
                    commands::cart::set(&storefront, &line.into(), quantity).await
                }
            },
            Commands::Address { action } => match action {
                AddressAction::List => commands::address::list(&storefront),
                AddressAction::Add(address) => {
                    commands::address::add(&storefront, address.into()).await
                }
                AddressAction::Remove { id, yes } => {
                    commands::address::remove(&storefront, &id.into(), yes).await
                }
            },
            Commands::Checkout { address, method } => {
                commands::checkout::run(&storefront, address.map(Into::into), method).await
            }
        }
    }
    .await;

    drain_notices(&mut notices);
    result
}

/// Log notices the engine published while the command ran.
fn drain_notices(notices: &mut broadcast::Receiver<Notice>) {
    while let Ok(notice) = notices.try_recv() {
        match notice.level {
            NoticeLevel::Success | NoticeLevel::Info => tracing::info!("{}", notice.message),
            NoticeLevel::Error => tracing::warn!("{}", notice.message),
        }
    }
}

impl From<LineArgs> for bazaar_core::LineKey {
    fn from(args: LineArgs) -> Self {
        Self::new(args.product, args.size, args.color)
    }
}

impl From<NewAddress> for bazaar_core::AddressInput {
    fn from(args: NewAddress) -> Self {
        Self {
            kind: args.kind,
            full_name: args.full_name,
            address: args.address,
            city: args.city,
            state: args.state,
            pincode: args.pincode,
            phone: args.phone,
            is_default: args.default,
        }
    }
}
