//! CLI parser and command dispatch.

mod commands;
mod helpers;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{LoadOptions, Settings};

#[derive(Parser)]
#[command(name = "netprune")]
#[command(about = "Resumable connection cleanup and search crawling")]
#[command(version)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Config file path (default: <data-dir>/netprune.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the database, cookies and CSV files
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Run the browser without a window
    #[arg(long, global = true)]
    headless: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Remove connections for pending profiles
    Remove {
        /// Locate every control but never confirm a removal (max 5 profiles)
        #[arg(long)]
        dry_run: bool,
        /// Process this single profile URL instead of the pending queue
        #[arg(long)]
        url: Option<String>,
        /// Only process the first N pending profiles
        #[arg(long)]
        profiles: Option<usize>,
    },

    /// Crawl search results into a CSV of profiles
    Crawl {
        /// Search results URL (default: first-degree connections)
        #[arg(long)]
        search_url: Option<String>,
        /// Output CSV (default: <data-dir>/profiles.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Crawl 2 pages and write nothing
        #[arg(long)]
        dry_run: bool,
        /// Maximum number of result pages
        #[arg(long)]
        max_pages: Option<u32>,
        /// Also queue every discovered profile for removal
        #[arg(long)]
        enqueue: bool,
    },

    /// Queue profile URLs from a CSV file for removal
    Load {
        /// CSV with a URL column (default: <data-dir>/urls_to_remove.csv)
        #[arg(long)]
        input_csv: Option<PathBuf>,
    },

    /// Show counts per status
    Status,
}

/// Verbosity from raw arguments, for logging setup before parsing.
pub fn verbosity() -> u8 {
    std::env::args()
        .skip(1)
        .map(|arg| match arg.as_str() {
            "--verbose" => 1,
            short if short.starts_with('-') && !short.starts_with("--") => {
                let flags = &short[1..];
                if !flags.is_empty() && flags.chars().all(|c| c == 'v') {
                    flags.len() as u8
                } else {
                    0
                }
            }
            _ => 0,
        })
        .fold(0u8, |acc, n| acc.saturating_add(n))
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
        data_dir: cli.data_dir,
    };
    let mut settings = Settings::load(&options)?;
    if cli.headless {
        settings.browser.headless = true;
    }

    match cli.command {
        Commands::Remove {
            dry_run,
            url,
            profiles,
        } => commands::cmd_remove(&settings, dry_run, url, profiles).await,
        Commands::Crawl {
            search_url,
            output,
            dry_run,
            max_pages,
            enqueue,
        } => {
            commands::cmd_crawl(&settings, search_url, output, dry_run, max_pages, enqueue).await
        }
        Commands::Load { input_csv } => commands::cmd_load(&settings, input_csv),
        Commands::Status => commands::cmd_status(&settings),
    }
}
