use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};

use std::path::PathBuf;

use sales_margin::{
    costs, CostMatcher, CostStore, ReportParser, SalesCollection, SortBy, SqliteStore,
    DEFAULT_BATCH_SIZE, DEFAULT_HEADER_MARKER, DEFAULT_TOTAL_MARKER,
};

#[derive(Parser)]
#[command(version, about = "Reconciles a sales report against stored unit costs and reports per-item margins")]
struct Args {
    /// Cost database file
    #[arg(long, env = "SALES_MARGIN_DB", default_value = "costs.sqlite", global = true)]
    db: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse a sales report, fill in unit costs and print margins
    Report {
        /// Sales report (.csv, .xlsx, .xls, .xlsb or .ods)
        file: PathBuf,
        /// Also save the results (.csv or .xlsx)
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = SortKey::Code)]
        sort_by: SortKey,
        /// First-column label of the report's header row
        #[arg(long, default_value = DEFAULT_HEADER_MARKER)]
        header_marker: String,
        /// First-column label of the report's grand-total row
        #[arg(long, default_value = DEFAULT_TOTAL_MARKER)]
        total_marker: String,
        /// Item codes per cost lookup
        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,
    },
    /// Import unit costs (item code, cost in USD) into the database
    ImportCosts { file: PathBuf },
    /// Save the stored unit costs (.csv or .xlsx)
    ExportCosts { file: PathBuf },
    /// Print the stored USD exchange rate
    Rate,
    /// Store a new USD exchange rate
    SetRate {
        #[arg(allow_negative_numbers = true)]
        rate: f64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SortKey {
    Code,
    Revenue,
    Margin,
}

impl From<SortKey> for SortBy {
    fn from(key: SortKey) -> Self {
        match key {
            SortKey::Code => SortBy::Code,
            SortKey::Revenue => SortBy::Revenue,
            SortKey::Margin => SortBy::Margin,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "sales_margin=info".to_string()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let store = SqliteStore::open(&args.db)
        .with_context(|| format!("opening cost database {}", args.db.display()))?;

    match args.command {
        Command::Report {
            file,
            output,
            sort_by,
            header_marker,
            total_marker,
            batch_size,
        } => {
            let rows = ReportParser::with_markers(header_marker, total_marker)
                .read(&file)
                .with_context(|| format!("reading sales report {}", file.display()))?;
            let rate = store.exchange_rate()?;
            if rate <= 0.0 {
                warn!("exchange rate is not set, so RUB costs and margins stay at zero (use `set-rate`)");
            }
            let mut sales = SalesCollection::new(rate);
            sales.ingest(rows);
            CostMatcher::new(batch_size).fill(&store, &mut sales)?;
            sales.set_sort_by(sort_by.into());
            print!("{sales}");
            if let Some(output) = output {
                sales.save(&output)?;
            }
        }
        Command::ImportCosts { file } => {
            let count = costs::import_costs(&store, &file)
                .with_context(|| format!("importing costs from {}", file.display()))?;
            println!("Imported {count} costs");
        }
        Command::ExportCosts { file } => {
            let count = costs::export_costs(&store, &file)?;
            println!("Exported {count} costs to {}", file.display());
        }
        Command::Rate => {
            println!("{}", store.exchange_rate()?);
        }
        Command::SetRate { rate } => {
            if !(rate > 0.0) {
                bail!("exchange rate must be greater than zero, got {rate}");
            }
            store.set_exchange_rate(rate)?;
            info!(rate, "exchange rate updated");
        }
    }
    Ok(())
}
