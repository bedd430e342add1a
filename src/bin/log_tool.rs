use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono_tz::Tz;
use clap::{Parser, Subcommand};
use doorbell::{
    config::DoorbellConfig,
    upload::{FirebaseSink, LogRecord, RecordFeed, RemoteSink},
};
use tokio::fs;
use tracing::{debug, info, warn};

/// Inspect the doorbell's remote log from a terminal.
#[derive(Parser, Debug)]
#[command(name = "doorbell-log")]
#[command(about = "Fetch, watch, count or clear records in the doorbell log collection")]
struct Args {
    /// Path to doorbell configuration file (for sink settings)
    #[arg(short = 'c', long, default_value = "doorbell.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the newest record and optionally save its image
    Latest {
        /// Write the decoded image to this file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// IANA time zone for the timestamp
        #[arg(short, long, default_value = "UTC")]
        timezone: String,

        /// Print the raw record as JSON
        #[arg(long)]
        json: bool,
    },
    /// Follow the collection and print each new record as it arrives
    Watch {
        /// Save each image into this directory as <key>.jpg
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// IANA time zone for timestamps
        #[arg(short, long, default_value = "UTC")]
        timezone: String,

        /// Poll interval in milliseconds
        #[arg(short, long, default_value_t = 2000)]
        interval_ms: u64,
    },
    /// Print the number of records in the collection
    Count,
    /// Delete every record in the collection
    Clear {
        /// Required to actually delete
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let config = DoorbellConfig::load_from_file(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config.display()))?;
    let sink = FirebaseSink::new(&config.sink)?;

    match args.command {
        Command::Latest {
            output,
            timezone,
            json,
        } => {
            let tz = parse_timezone(&timezone)?;
            show_latest(&sink, tz, output, json).await
        }
        Command::Watch {
            output_dir,
            timezone,
            interval_ms,
        } => {
            let tz = parse_timezone(&timezone)?;
            if let Some(dir) = &output_dir {
                fs::create_dir_all(dir)
                    .await
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
            }
            watch(&sink, tz, output_dir, Duration::from_millis(interval_ms.max(100))).await
        }
        Command::Count => {
            let count = sink.child_count().await?;
            println!("{}", count);
            Ok(())
        }
        Command::Clear { yes } => {
            if !yes {
                eprintln!(
                    "Refusing to delete records in '{}' without --yes",
                    sink.collection()
                );
                std::process::exit(2);
            }
            sink.delete_all().await?;
            info!("Cleared collection {}", sink.collection());
            println!("Cleared '{}'", sink.collection());
            Ok(())
        }
    }
}

async fn show_latest(
    sink: &FirebaseSink,
    tz: Tz,
    output: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let (key, record) = match sink.latest_record().await? {
        Some(latest) => latest,
        None => {
            println!("No records in '{}'", sink.collection());
            return Ok(());
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    let image = print_record(&key, &record, tz);
    if let (Some(bytes), Some(path)) = (image, output) {
        save_image(&path, &bytes).await?;
    }

    Ok(())
}

/// Poll the newest record until interrupted, printing every change once
async fn watch(
    sink: &FirebaseSink,
    tz: Tz,
    output_dir: Option<PathBuf>,
    every: Duration,
) -> Result<()> {
    println!("Watching '{}' (Ctrl-C to stop)", sink.collection());
    let mut feed = RecordFeed::new();
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                debug!("Watch interrupted");
                return Ok(());
            }
            _ = ticker.tick() => {}
        }

        let latest = match sink.latest_record().await {
            Ok(latest) => latest,
            Err(e) => {
                warn!("Failed to fetch latest record: {}", e);
                continue;
            }
        };

        if let Some((key, record)) = feed.observe(latest) {
            let image = print_record(&key, &record, tz);
            if let (Some(bytes), Some(dir)) = (image, &output_dir) {
                save_image(&dir.join(format!("{}.jpg", key)), &bytes).await?;
            }
        }
    }
}

/// Print a record summary and hand back its decoded image
fn print_record(key: &str, record: &LogRecord, tz: Tz) -> Option<Vec<u8>> {
    println!("Record:    {}", key);
    println!(
        "Timestamp: {}",
        record
            .formatted_timestamp(tz)
            .unwrap_or_else(|| "unknown".to_string())
    );
    let image = record.image_bytes();
    match &image {
        Some(bytes) => println!("Image:     {} bytes", bytes.len()),
        None => println!("No image"),
    }
    image
}

async fn save_image(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Saved to {}", path.display());
    Ok(())
}

fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse()
        .map_err(|e| anyhow!("Unknown time zone '{}': {}", name, e))
}
