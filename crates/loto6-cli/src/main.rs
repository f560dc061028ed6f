use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use loto6_core::{DrawRecord, NumberStats};
use loto6_sync::{load_history, run_sync_once, PlanRequest, SyncConfig, SyncRunSummary};

#[derive(Debug, Parser)]
#[command(name = "loto6")]
#[command(about = "LOTO6 draw history sync")]
struct Cli {
    /// Store file; overrides LOTO6_STORE_PATH.
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Print results as JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch year pages and merge them into the store (default).
    Sync(SyncArgs),
    /// Frequency and gap for every ball.
    Stats,
    /// Newest draws in the store.
    Latest {
        #[arg(short = 'n', long, default_value_t = 20)]
        count: usize,
    },
}

#[derive(Debug, Args, Default)]
struct SyncArgs {
    /// Rescan from the epoch year regardless of the store.
    #[arg(long, conflicts_with = "from_year")]
    full: bool,

    /// Pin the first year fetched; clamped to the epoch and the current year.
    #[arg(long)]
    from_year: Option<i32>,
}

impl SyncArgs {
    fn plan_request(&self) -> PlanRequest {
        match (self.full, self.from_year) {
            (true, _) => PlanRequest::Full,
            (false, Some(year)) => PlanRequest::FromYear(year),
            (false, None) => PlanRequest::Auto,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let mut config = SyncConfig::from_env();
    if let Some(store) = cli.store {
        config.store_path = store;
    }

    match cli.command.unwrap_or(Commands::Sync(SyncArgs::default())) {
        Commands::Sync(args) => {
            config.plan = args.plan_request();
            let summary = run_sync_once(config).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("{}", summary_line(&summary));
            }
            let failed = summary.failed_years();
            if !failed.is_empty() {
                eprintln!("years with fetch errors: {failed:?}");
            }
        }
        Commands::Stats => {
            let records = load_history(&config.store_path).await?;
            let stats = NumberStats::from_history(&records);
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("draws: {}", stats.draws);
                println!("ball  freq  gap");
                for stat in stats.hottest() {
                    println!("{:>4}  {:>4}  {:>3}", stat.ball, stat.frequency, stat.gap);
                }
            }
        }
        Commands::Latest { count } => {
            let records = load_history(&config.store_path).await?;
            let latest = &records[..count.min(records.len())];
            if cli.json {
                println!("{}", serde_json::to_string_pretty(latest)?);
            } else {
                for record in latest {
                    println!("{}", format_draw(record));
                }
            }
        }
    }

    Ok(())
}

fn summary_line(summary: &SyncRunSummary) -> String {
    let newest = summary
        .newest
        .as_ref()
        .map(|r| format!("{} ({})", r.round, r.date))
        .unwrap_or_else(|| "none".to_string());
    format!(
        "sync complete: run_id={} years={}..={} fetched={} added={} replaced={} total={} newest={} store={}",
        summary.run_id,
        summary.plan.start,
        summary.plan.end,
        summary.fetched_records,
        summary.added,
        summary.replaced,
        summary.total_records,
        newest,
        summary.store_path
    )
}

fn format_draw(record: &DrawRecord) -> String {
    let numbers = record
        .numbers
        .iter()
        .map(|n| format!("{n:02}"))
        .collect::<Vec<_>>()
        .join(" ");
    let bonus = record
        .bonus
        .map(|b| format!("{b:02}"))
        .unwrap_or_else(|| "-".to_string());
    format!("第{}回 {}  {}  ({})", record.round, record.date, numbers, bonus)
}
