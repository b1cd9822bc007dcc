//! TCG Inventory - card ownership ledger CLI
//!
//! Every command opens the SQLite ledger, runs one operation and exits.
//! Purchases and sales trigger a best-effort price refresh when a price
//! oracle is configured; a failing oracle never undoes the operation.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tcg_inventory::formatters::{
    format_gains, format_history, format_inventory, format_price, format_receipt,
    format_refresh, format_transaction,
};
use tcg_inventory::{
    inventory_report, realized_gains, transaction_history, CardId, HistoryFilter,
    HttpPriceOracle, Inventory, NewCard, SqliteStore,
};

type Ledger = Inventory<SqliteStore>;
type Oracle = Option<HttpPriceOracle>;

/// Trading card inventory ledger - purchases, sales, transfers and prices
#[derive(Parser, Debug)]
#[command(name = "tcg_inventory")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the SQLite database file
    #[arg(short, long, global = true, default_value_t = default_db_path())]
    database: String,

    /// Base URL of the last-sold price service (price lookups are skipped if unset)
    #[arg(long, global = true, env = "TCG_ORACLE_URL")]
    oracle_url: Option<String>,

    /// Give up on a price lookup after this many seconds
    #[arg(long, global = true, env = "TCG_ORACLE_TIMEOUT_SECS", default_value_t = 10)]
    oracle_timeout_secs: u64,

    #[command(subcommand)]
    command: Command,
}

/// Card printing: name, set and condition
#[derive(clap::Args, Debug)]
struct CardArgs {
    /// Card name
    name: String,

    /// Set name
    #[arg(short, long, default_value = "")]
    set: String,

    /// Condition (NM, LP, MP, ...)
    #[arg(short, long, default_value = "NM")]
    condition: String,
}

impl CardArgs {
    fn new_card(&self) -> NewCard {
        NewCard::new(&self.name, &self.set, &self.condition)
    }

    fn id(&self) -> CardId {
        self.new_card().id()
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register a new user
    AddUser {
        username: String,
        /// Display name (defaults to the username)
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    /// Remove a user who owns no cards
    RemoveUser { username: String },
    /// Record a purchase
    Buy {
        user: String,
        #[command(flatten)]
        card: CardArgs,
        #[arg(short, long, default_value_t = 1)]
        quantity: i64,
        /// Price paid per copy
        #[arg(short, long)]
        price: f64,
    },
    /// Record a sale
    Sell {
        user: String,
        #[command(flatten)]
        card: CardArgs,
        #[arg(short, long, default_value_t = 1)]
        quantity: i64,
        /// Price received per copy (defaults to the last sold price)
        #[arg(short, long)]
        price: Option<f64>,
    },
    /// Move cards from one user to another
    Transfer {
        from: String,
        to: String,
        #[command(flatten)]
        card: CardArgs,
        #[arg(short, long, default_value_t = 1)]
        quantity: i64,
        /// Price paid per copy by the recipient, if any
        #[arg(short, long)]
        price: Option<f64>,
    },
    /// Show a user's cards
    Inventory { user: String },
    /// Show the transaction log, newest first
    History {
        /// Only transactions involving this user
        #[arg(long, conflicts_with = "card")]
        user: Option<String>,
        /// Only transactions of this card name, across sets and conditions
        #[arg(long)]
        card: Option<String>,
        /// Narrow --card to one set (condition defaults to NM)
        #[arg(long, requires = "card")]
        set: Option<String>,
        /// Narrow --card to one condition (set defaults to none)
        #[arg(long, requires = "card")]
        condition: Option<String>,
    },
    /// Show realized gains from a user's sales
    Gains { user: String },
    /// Look up the last sold price for any search text
    Price {
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },
    /// Refresh the stored price of a card
    Refresh {
        #[command(flatten)]
        card: CardArgs,
    },
}

/// Returns the default database path: ~/.local/share/tcg_inventory/inventory.db
fn default_db_path() -> String {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tcg_inventory")
        .join("inventory.db")
        .to_string_lossy()
        .to_string()
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let db_path = PathBuf::from(&args.database);
    log::debug!("Database path: {}", db_path.display());

    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::error!("Failed to create database directory: {}", e);
                std::process::exit(1);
            }
            log::info!("Created directory: {}", parent.display());
        }
    }

    let store = match SqliteStore::open(&db_path) {
        Ok(store) => store,
        Err(e) => {
            log::error!("Failed to open database {}: {}", db_path.display(), e);
            std::process::exit(1);
        }
    };

    let inventory = Inventory::new(store)
        .with_oracle_timeout(Duration::from_secs(args.oracle_timeout_secs));
    let oracle: Oracle = args.oracle_url.as_deref().map(HttpPriceOracle::new);
    if let Some(oracle) = &oracle {
        log::debug!("Price oracle: {}", oracle.base_url());
    }

    if let Err(e) = run(&inventory, &oracle, args.command).await {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(inventory: &Ledger, oracle: &Oracle, command: Command) -> tcg_inventory::Result<()> {
    match command {
        Command::AddUser {
            username,
            name,
            email,
        } => {
            let user =
                inventory.register_user(&username, name.as_deref().unwrap_or(""), email.as_deref())?;
            println!("Added user {} ({})", user.username, user.display_name);
        }
        Command::RemoveUser { username } => {
            inventory.remove_user(&username)?;
            println!("Removed user {}", username);
        }
        Command::Buy {
            user,
            card,
            quantity,
            price,
        } => {
            let transaction = inventory.purchase(&user, &card.new_card(), quantity, price)?;
            print!("{}", format_transaction(&transaction));
            refresh_after(inventory, oracle, &transaction.card_id).await;
        }
        Command::Sell {
            user,
            card,
            quantity,
            price: Some(price),
        } => {
            let receipt = inventory.sell(&user, &card.id(), quantity, price)?;
            print!("{}", format_receipt(&receipt));
            refresh_after(inventory, oracle, &receipt.transaction.card_id).await;
        }
        Command::Sell {
            user,
            card,
            quantity,
            price: None,
        } => {
            let card_id = card.id();
            let (receipt, refresh) = inventory
                .sell_at_market(oracle, &user, &card_id, quantity)
                .await?;
            print!("{}", format_refresh(card_id.as_str(), &refresh));
            print!("{}", format_receipt(&receipt));
        }
        Command::Transfer {
            from,
            to,
            card,
            quantity,
            price,
        } => {
            let transaction = inventory.transfer(&from, &to, &card.id(), quantity, price)?;
            print!("{}", format_transaction(&transaction));
        }
        Command::Inventory { user } => {
            let report = inventory_report(inventory.store(), &user)?;
            print!("{}", format_inventory(&report));
        }
        Command::History {
            user,
            card,
            set,
            condition,
        } => {
            let filter = match (user, card) {
                (Some(user), _) => HistoryFilter::User(user),
                (None, Some(name)) if set.is_none() && condition.is_none() => {
                    HistoryFilter::CardName(name)
                }
                (None, Some(name)) => HistoryFilter::Card(CardId::for_card(
                    &name,
                    set.as_deref().unwrap_or(""),
                    condition.as_deref().unwrap_or("NM"),
                )),
                (None, None) => HistoryFilter::All,
            };
            let transactions = transaction_history(inventory.store(), &filter)?;
            print!("{}", format_history(&transactions));
        }
        Command::Gains { user } => {
            let summary = realized_gains(inventory.store(), &user)?;
            print!("{}", format_gains(&summary));
        }
        Command::Price { query } => {
            let query = query.join(" ");
            if oracle.is_none() {
                log::warn!("No price oracle configured (set --oracle-url or TCG_ORACLE_URL)");
            }
            let found = inventory.search_price(oracle, &query).await;
            print!("{}", format_price(&query, found.as_ref()));
        }
        Command::Refresh { card } => {
            let card = inventory.card(&card.id())?;
            let refresh = inventory.refresh_price(oracle, &card.id).await;
            print!("{}", format_refresh(&card.to_string(), &refresh));
        }
    }
    Ok(())
}

/// Best-effort price refresh once a ledger write has committed
async fn refresh_after(inventory: &Ledger, oracle: &Oracle, card_id: &CardId) {
    if oracle.is_none() {
        return;
    }
    let refresh = inventory.refresh_price(oracle, card_id).await;
    print!("{}", format_refresh(card_id.as_str(), &refresh));
}
