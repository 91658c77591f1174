use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use score_ledger_core::{
    build_trend, format_date, history_total, parse_date, submit, Catalog, ItemKind, LedgerStore,
};
use score_ledger_store_csv::CsvStore;
use serde_json::Value;
use time::{Date, OffsetDateTime};

const CLI_CONTRACT_VERSION: &str = "cli.v1";

#[derive(Debug, Parser)]
#[command(name = "scl")]
#[command(about = "Daily score ledger CLI")]
struct Cli {
    /// Ledger table file; created on first submission if absent.
    #[arg(long, default_value = "./score_ledger.csv")]
    ledger: PathBuf,

    /// JSON catalog file overriding the built-in reward/penalty catalog.
    #[arg(long)]
    catalog: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Catalog {
        #[command(subcommand)]
        command: CatalogCommand,
    },
    Submit(SubmitArgs),
    Status,
    Trend,
}

#[derive(Debug, Subcommand)]
enum CatalogCommand {
    List,
}

#[derive(Debug, Args)]
struct SubmitArgs {
    /// Calendar date of the submission, YYYY-MM-DD; defaults to today.
    #[arg(long)]
    date: Option<String>,

    #[arg(long = "reward")]
    rewards: Vec<String>,

    #[arg(long = "penalty")]
    penalties: Vec<String>,
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert("contract_version".into(), CLI_CONTRACT_VERSION.into());
            Value::Object(object)
        }
        other => serde_json::json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "result": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    let wrapped = with_contract_version(value);
    println!("{}", serde_json::to_string_pretty(&wrapped)?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let catalog = load_catalog(cli.catalog.as_deref())?;

    match cli.command {
        Command::Catalog { command } => run_catalog(command, &catalog),
        Command::Submit(args) => {
            let mut store = CsvStore::open(&cli.ledger)?;
            run_submit(&args, &catalog, &mut store)
        }
        Command::Status => {
            let store = CsvStore::open(&cli.ledger)?;
            run_status(&store)
        }
        Command::Trend => {
            let store = CsvStore::open(&cli.ledger)?;
            run_trend(&store)
        }
    }
}

fn load_catalog(path: Option<&Path>) -> Result<Catalog> {
    let catalog = match path {
        Some(path) => {
            let body = fs::read_to_string(path)
                .with_context(|| format!("failed to read catalog file {}", path.display()))?;
            serde_json::from_str(&body)
                .with_context(|| format!("failed to parse catalog file {}", path.display()))?
        }
        None => Catalog::builtin(),
    };
    catalog.validate().context("catalog configuration is invalid")?;
    Ok(catalog)
}

fn run_catalog(command: CatalogCommand, catalog: &Catalog) -> Result<()> {
    match command {
        CatalogCommand::List => emit_json(serde_json::json!({
            "rewards": catalog.items(ItemKind::Reward),
            "penalties": catalog.items(ItemKind::Penalty),
        })),
    }
}

fn run_submit(args: &SubmitArgs, catalog: &Catalog, store: &mut CsvStore) -> Result<()> {
    let date = match args.date.as_deref() {
        Some(raw) => parse_date(raw).with_context(|| format!("invalid --date value {raw:?}"))?,
        None => local_today(),
    };

    let outcome = submit(store, catalog, date, &args.rewards, &args.penalties)?;
    let records = store.load_all()?;

    emit_json(serde_json::json!({
        "date": format_date(outcome.date)?,
        "merged": outcome.merged,
        "day_total": outcome.day_total,
        "prior_cumulative": outcome.prior_cumulative,
        "cumulative_total": outcome.cumulative_total,
        "history_total": history_total(&records),
    }))
}

fn run_status(store: &CsvStore) -> Result<()> {
    let records = store.load_all()?;
    emit_json(serde_json::json!({
        "ledger": store.path(),
        "record_count": records.len(),
        "cumulative_total": store.last_cumulative()?,
        "history_total": history_total(&records),
    }))
}

fn run_trend(store: &CsvStore) -> Result<()> {
    let records = store.load_all()?;
    match build_trend(&records) {
        Some(series) => emit_json(serde_json::json!({
            "no_data": false,
            "daily": series.daily,
            "cumulative": series.cumulative,
        })),
        None => emit_json(serde_json::json!({ "no_data": true })),
    }
}

/// The single local "today" the ledger keys on. Falls back to the UTC
/// calendar day when the local offset cannot be determined.
fn local_today() -> Date {
    OffsetDateTime::now_local().map_or_else(|_| OffsetDateTime::now_utc().date(), |now| now.date())
}
