use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use tracing::info;

use peer_bank_normalizer::{
    available_periods, compare, config::Config, reconcile, credentials, export, logging, AuditTrail, Bank,
    ComparisonQuery, CredentialStore, Currency, ReconciliationChecker, StandardizedSegment,
};
use rust_decimal::Decimal;

#[derive(Parser)]
#[command(name = "peer-bank-normalizer")]
#[command(about = "Normalize Hong Kong peer bank disclosures into a comparable segment grid")]
#[command(version)]
struct Cli {
    /// Config file (default: $NORMALIZER_CONFIG, then config/normalizer.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load every bank's profile disclosures for the seed periods
    Seed,
    /// Drop all documents and data, then reseed the baseline
    Reset,
    /// Ingest documents; bank and period come from the filename unless given
    Ingest {
        files: Vec<PathBuf>,
        #[arg(long)]
        bank: Option<Bank>,
        #[arg(long)]
        period: Option<String>,
    },
    /// Print the comparison grid
    Compare {
        #[command(flatten)]
        grid: GridArgs,
    },
    /// Write the comparison grid as CSV
    Export {
        #[command(flatten)]
        grid: GridArgs,
        /// Output file (default: stdout)
        #[arg(long, short)]
        out: Option<PathBuf>,
    },
    /// Check segment sums against Group totals
    Reconcile {
        #[arg(long)]
        period: Option<String>,
        /// Override the configured tolerance (percent)
        #[arg(long)]
        tolerance: Option<f64>,
    },
    /// Show the full audit trail of a data point
    Audit { point_id: String },
    /// Store the assistant API key
    SetApiKey { key: String },
    /// List ingested documents
    Documents,
    /// List periods holding data, newest first
    Periods,
}

#[derive(clap::Args)]
struct GridArgs {
    #[arg(long, default_value = "2025 1H")]
    period: String,
    #[arg(long, default_value = "group")]
    segment: StandardizedSegment,
    #[arg(long, default_value = "HKD")]
    currency: Currency,
    /// Banks to include (comma-separated codes or names)
    #[arg(long, value_delimiter = ',')]
    banks: Vec<Bank>,
}

impl GridArgs {
    fn query(&self) -> ComparisonQuery {
        ComparisonQuery::new(&self.period, self.segment, self.currency).with_banks(&self.banks)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    logging::init_logging(config.log_json);

    let store = config.open_store()?;
    info!(database = ?config.database_path, "store opened");

    match cli.command {
        Commands::Seed => {
            println!("🌱 Seeding peer bank disclosures...");
            let ingestor = config.ingestor(store.clone())?;
            for report in ingestor.seed()? {
                println!("  ✓ {}", report.summary());
            }
            println!("✅ {} points stored", store.count_points()?);
        }

        Commands::Reset => {
            println!("♻️  Resetting to the seeded baseline...");
            let ingestor = config.ingestor(store.clone())?;
            let reports = ingestor.reset()?;
            println!(
                "✅ {} documents reseeded, {} points stored",
                reports.len(),
                store.count_points()?
            );
        }

        Commands::Ingest { files, bank, period } => {
            if files.is_empty() {
                return Err(anyhow!("No files given"));
            }
            let ingestor = config.ingestor(store.clone())?;

            for path in &files {
                let blob = fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
                let filename = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| path.to_string_lossy().to_string());

                let result = ingestor.ingest_with(&blob, &filename, bank, period.as_deref());

                match result {
                    Ok(report) => {
                        println!("📥 {}", report.summary());
                        for failure in &report.failures {
                            println!("   ⚠️  {}", failure);
                        }
                        for flag in &report.flags {
                            println!("   🚩 {}", flag.describe());
                        }
                    }
                    Err(e) => println!("❌ {:#}", e),
                }
            }
        }

        Commands::Compare { grid } => {
            let grid = compare(&store, &grid.query(), &config.display_rates)?;
            println!(
                "📊 {} | {} | {}",
                grid.period,
                grid.segment,
                grid.display_currency.code()
            );

            let header: Vec<String> = grid.banks.iter().map(|b| format!("{:>22}", b.display_name())).collect();
            println!("{:<24}{}", "", header.join(""));
            for (section, rows) in grid.sections() {
                println!("{}", section.title());
                for row in rows {
                    let cells: Vec<String> = row.cells.iter().map(|c| {
                        let text = c.as_ref().map_or("-".to_string(), |c| {
                            if c.has_warnings { format!("{} *", c.display) } else { c.display.clone() }
                        });
                        format!("{:>22}", text)
                    }).collect();
                    println!("  {:<22}{}", row.metric, cells.join(""));
                }
            }

            let warned: Vec<_> = grid
                .rows
                .iter()
                .flat_map(|row| row.cells.iter().flatten().map(move |c| (row, c)))
                .filter(|(_, c)| c.has_warnings)
                .collect();
            if !warned.is_empty() {
                println!("\n* normalization warnings (run `audit <point-id>`):");
                for (row, cell) in warned {
                    println!("  {} {}: {}", cell.bank.code(), row.metric, cell.citation.point_id);
                }
            }
        }

        Commands::Export { grid, out } => {
            let grid = compare(&store, &grid.query(), &config.display_rates)?;
            match out {
                Some(path) => {
                    let file = fs::File::create(&path).with_context(|| format!("Failed to create {:?}", path))?;
                    export::export_csv(&grid, file)?;
                    println!("✅ Exported {} rows to {:?}", grid.rows.len(), path);
                }
                None => export::export_csv(&grid, std::io::stdout())?,
            }
        }

        Commands::Reconcile { period, tolerance } => {
            let checker = match tolerance {
                Some(t) => ReconciliationChecker::with_tolerance(
                    Decimal::try_from(t).context("Invalid tolerance")?,
                ),
                None => config.checker()?,
            };
            let report = reconcile(&store, period.as_deref(), &checker)?;
            println!("🔍 {}", report.summary());
            if report.checked == 0 && report.not_checkable == 0 {
                println!("   (no segment data held for {})", period.as_deref().unwrap_or("any period"));
            }
            for flag in &report.flags {
                println!("   🚩 {}", flag.describe());
            }
        }

        Commands::Audit { point_id } => {
            let trail = AuditTrail::load(&store, &point_id, &config.checker()?)?
                .ok_or_else(|| anyhow!("No data point {}", point_id))?;
            for line in trail.render() {
                println!("{}", line);
            }
        }

        Commands::SetApiKey { key } => {
            CredentialStore::new(store.clone()).set_api_key(&key)?;
            println!("🔑 API key saved ({})", credentials::mask(&key));
        }

        Commands::Documents => {
            for doc in store.documents()? {
                println!(
                    "{} {:<10} {:<6} {:>8} {:<10} {:<8} {}{}",
                    doc.upload_date,
                    doc.status.as_str(),
                    doc.doc_type.as_str(),
                    doc.size_label(),
                    doc.bank.code(),
                    doc.period,
                    doc.name,
                    if doc.failed_records > 0 {
                        format!(" ({} failed)", doc.failed_records)
                    } else {
                        String::new()
                    }
                );
            }
        }

        Commands::Periods => {
            for period in available_periods(&store)? {
                println!("{}", period);
            }
        }
    }

    Ok(())
}
