use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;

use debt_sync::auth::{AuthProvider, SessionAuth};
use debt_sync::config::{Backend, Config};
use debt_sync::debts::{Debt, DebtPatch, DebtStatus, Debts, NewDebt, Priority};
use debt_sync::logging;
use debt_sync::preferences::{Currency, FileKeyValueStore, PreferenceStore};
use debt_sync::remote::{MemoryStore, PostgrestStore, RemoteStore, SqliteStore};

#[derive(Parser, Debug)]
#[command(name = "debts")]
#[command(about = "Track what you owe")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/debts/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Storage backend, overriding the config file
  #[arg(short, long, value_enum)]
  backend: Option<Backend>,

  /// User id to act as, overriding the config file
  #[arg(short, long)]
  user: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List debts ordered by creditor
  #[command(alias = "ls")]
  List {
    /// Only show debts with this status
    #[arg(short, long)]
    status: Option<DebtStatus>,
  },
  /// Record a new debt
  Add {
    creditor: String,
    amount: f64,
    #[arg(short, long, default_value = "medium")]
    priority: Priority,
    #[arg(short, long)]
    description: Option<String>,
    /// Due date as YYYY-MM-DD
    #[arg(long)]
    due: Option<NaiveDate>,
  },
  /// Change fields of a debt
  Update {
    id: String,
    #[arg(long)]
    creditor: Option<String>,
    #[arg(long)]
    amount: Option<f64>,
    #[arg(short, long)]
    status: Option<DebtStatus>,
    #[arg(short, long)]
    priority: Option<Priority>,
    #[arg(short, long)]
    description: Option<String>,
    #[arg(long)]
    due: Option<NaiveDate>,
  },
  /// Mark a debt as paid
  Pay { id: String },
  /// Delete a debt
  #[command(alias = "rm")]
  Delete { id: String },
  /// Show totals
  Totals,
  /// Show or set the display currency
  Currency { currency: Option<Currency> },
}

fn open_store(config: &Config, backend: Backend) -> Result<Arc<dyn RemoteStore>> {
  let store: Arc<dyn RemoteStore> = match backend {
    Backend::Postgrest => Arc::new(PostgrestStore::new(
      config.postgrest()?,
      Config::get_api_key()?,
      Config::get_access_token(),
    )?),
    Backend::Sqlite => {
      let store = match &config.sqlite.path {
        Some(path) => SqliteStore::open_at(path),
        None => SqliteStore::open(),
      };
      Arc::new(store.map_err(|e| eyre!(e))?)
    }
    Backend::Memory => Arc::new(MemoryStore::new()),
  };
  Ok(store)
}

fn print_debt(debt: &Debt, currency: Currency) {
  let due = debt
    .due_date
    .map(|d| format!("  due {}", d))
    .unwrap_or_default();
  println!(
    "{:<34} {:<20} {:>14}  {:<7} {:<6}{}",
    debt.id,
    debt.creditor,
    currency.format(debt.amount),
    debt.status,
    debt.priority,
    due
  );
  if let Some(description) = &debt.description {
    println!("{:<34} {}", "", description);
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(&logging::default_log_dir()?)?;

  let preferences = PreferenceStore::new(FileKeyValueStore::open_default().map_err(|e| eyre!(e))?);
  if let Command::Currency { currency } = &args.command {
    match currency {
      Some(currency) => {
        preferences
          .update(|p| p.currency = *currency)
          .map_err(|e| eyre!(e))?;
        println!("Currency set to {}", currency);
      }
      None => println!("{}", preferences.load().currency),
    }
    return Ok(());
  }
  let currency = preferences.load().currency;

  let auth = Arc::new(SessionAuth::signed_out());
  if let Some(id) = args.user {
    let email = config.user.as_ref().map(|u| u.email.clone()).unwrap_or_default();
    auth.sign_in(debt_sync::auth::User { id, email });
  } else if let Some(user) = config.user.clone() {
    auth.sign_in(user.into());
  }
  if auth.current_user().is_none() {
    return Err(eyre!("No user configured. Set `user.id` in the config file or pass --user."));
  }

  let backend = args.backend.unwrap_or(config.backend);
  let store = open_store(&config, backend)?;
  let debts = Debts::new(store, auth, config.cache.options());

  let outcome = run(&debts, args.command, currency).await;
  outcome.map_err(|e| eyre!(e.user_message()))
}

async fn run(debts: &Debts, command: Command, currency: Currency) -> debt_sync::Result<()> {
  match command {
    Command::List { status } => {
      let rows = debts.fetch().await?;
      let rows: Vec<&Debt> = rows
        .iter()
        .filter(|d| status.map_or(true, |s| d.status == s))
        .collect();
      if rows.is_empty() {
        println!("No debts");
      }
      for debt in rows {
        print_debt(debt, currency);
      }
    }
    Command::Add {
      creditor,
      amount,
      priority,
      description,
      due,
    } => {
      let mut new = NewDebt::new(creditor, amount, priority);
      new.description = description;
      new.due_date = due;
      let debt = debts.create(new).await?;
      print_debt(&debt, currency);
    }
    Command::Update {
      id,
      creditor,
      amount,
      status,
      priority,
      description,
      due,
    } => {
      let patch = DebtPatch {
        creditor,
        amount,
        status,
        priority,
        description,
        due_date: due,
      };
      let debt = debts.update(&id, patch).await?;
      print_debt(&debt, currency);
    }
    Command::Pay { id } => {
      let debt = debts.update(&id, DebtPatch::status(DebtStatus::Paid)).await?;
      print_debt(&debt, currency);
    }
    Command::Delete { id } => {
      debts.delete(&id).await?;
      println!("Deleted {}", id);
    }
    Command::Totals => {
      debts.fetch().await?;
      let totals = debts.totals();
      println!("Total    {:>3}  {:>14}", totals.count, currency.format(totals.total));
      println!(
        "Pending  {:>3}  {:>14}",
        totals.pending_count,
        currency.format(totals.pending)
      );
      println!("Paid     {:>3}  {:>14}", totals.paid_count, currency.format(totals.paid));
    }
    // Handled before a store is opened
    Command::Currency { .. } => {}
  }
  Ok(())
}
