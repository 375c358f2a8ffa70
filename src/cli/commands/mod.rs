//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod config_cmd;
mod dataset;
mod download;
mod scrape;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{load_settings_with_options, LoadOptions};
use crate::services::dataset::{ConvertOptions, DEFAULT_CHUNK_SIZE};

#[derive(Parser)]
#[command(name = "ambientmix")]
#[command(about = "Ambient mix scraper, track downloader and dataset tools")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Resolve relative paths from current working directory instead of config file location
    #[arg(long, global = true)]
    cwd: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl ambient-mixer.com into a JSON array of mixes
    Scrape {
        /// Output file (default: from config, mixes.json)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Directory holding resumable crawl state
        #[arg(long)]
        job_dir: Option<PathBuf>,
        /// Concurrent requests
        #[arg(long)]
        concurrency: Option<usize>,
        /// Stop after this many fetched pages (0 = unlimited)
        #[arg(short, long)]
        limit: Option<u64>,
        /// Discard saved crawl state and start from the first listing page
        #[arg(long)]
        fresh: bool,
    },

    /// Download the audio files referenced by scraped tracks
    Download {
        /// Tracks file (JSON array of id_audio/name_audio/url_audio)
        tracks: PathBuf,
        /// Directory the audio files and tracks.json are written to
        output_dir: PathBuf,
        /// Prefix for each entry's src in tracks.json
        web_root: String,
        /// Parallel downloads (default: from config, 10)
        #[arg(long)]
        concurrent_requests: Option<usize>,
        /// Read tracks from a scraped mixes file instead
        #[arg(long)]
        from_mixes: bool,
    },

    /// Turn scraped mixes into training data
    Dataset {
        #[command(subcommand)]
        command: DatasetCommands,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum DatasetCommands {
    /// Convert mixes into chat conversations (JSON Lines)
    Convert {
        /// Scraped mixes file
        input: PathBuf,
        /// Output JSON Lines file
        output: PathBuf,
        /// Omit the system prompt
        #[arg(long)]
        no_system_prompt: bool,
        /// List the available track names in the system prompt
        #[arg(long)]
        list_tracks: bool,
        /// Only keep mixes built from the N most common tracks
        #[arg(long, default_value = "250")]
        max_tracks: usize,
        /// Minimum words for the title to be used
        #[arg(long, default_value = "2")]
        min_title_words: usize,
        /// Minimum words for the description to be used
        #[arg(long, default_value = "5")]
        min_description_words: usize,
        /// Keep digits in the user prompt
        #[arg(long)]
        keep_digits: bool,
        /// Drop mixes whose prompt is shorter than this
        #[arg(long, default_value = "10")]
        min_chars: usize,
    },

    /// Write description review prompts in chunks
    Prompts {
        /// Scraped mixes file
        input: PathBuf,
        /// Directory for the <start>.txt prompt files
        output_dir: PathBuf,
        /// Descriptions per prompt
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,
    },

    /// Interactively review a conversation dataset
    Clean {
        /// Dataset to review
        input: PathBuf,
        /// Where kept conversations are written
        output: PathBuf,
        /// Continue after the conversations already in the output
        #[arg(long)]
        resume: bool,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective settings
    Show {
        /// Print as TOML instead of JSON
        #[arg(long)]
        toml: bool,
    },
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
        use_cwd: cli.cwd,
    };
    let (settings, config) = load_settings_with_options(options).await?;

    // Only a crawl writes the log file; the other tools would truncate it.
    let log_file = match cli.command {
        Commands::Scrape { .. } => settings.log_file.as_deref(),
        _ => None,
    };
    crate::logging::init(cli.verbose, log_file)?;

    match cli.command {
        Commands::Scrape {
            output,
            job_dir,
            concurrency,
            limit,
            fresh,
        } => {
            let overrides = scrape::ScrapeOverrides {
                output,
                job_dir,
                concurrency,
                limit,
                fresh,
            };
            scrape::cmd_scrape(&settings, overrides).await
        }
        Commands::Download {
            tracks,
            output_dir,
            web_root,
            concurrent_requests,
            from_mixes,
        } => {
            download::cmd_download(
                &settings,
                &tracks,
                &output_dir,
                &web_root,
                concurrent_requests,
                from_mixes,
            )
            .await
        }
        Commands::Dataset { command } => match command {
            DatasetCommands::Convert {
                input,
                output,
                no_system_prompt,
                list_tracks,
                max_tracks,
                min_title_words,
                min_description_words,
                keep_digits,
                min_chars,
            } => {
                let options = ConvertOptions {
                    system_prompt: !no_system_prompt,
                    list_tracks,
                    max_tracks,
                    min_title_words,
                    min_description_words,
                    remove_digits: !keep_digits,
                    min_chars,
                };
                dataset::cmd_convert(&input, &output, &options)
            }
            DatasetCommands::Prompts {
                input,
                output_dir,
                chunk_size,
            } => dataset::cmd_prompts(&input, &output_dir, chunk_size),
            DatasetCommands::Clean {
                input,
                output,
                resume,
            } => dataset::cmd_clean(&input, &output, resume),
        },
        Commands::Config { command } => match command {
            ConfigCommands::Show { toml } => config_cmd::cmd_config_show(&settings, &config, toml),
        },
    }
}
