use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use log::LevelFilter;
use std::sync::Arc;
use std::time::Duration;

mod cancel;
mod classifier;
mod client;
mod config;
mod error;
mod models;
mod split;


use crate::cancel::CancellationToken;
use crate::classifier::OpenAiClassifier;
use crate::client::{PlaylistSource, SpotifyClient};
use crate::config::{
    Config, CredentialProvider, EnvCredentialProvider, StaticCredentialProvider, load_config,
};
use crate::split::{GroupStatus, PlaylistOutcome, RetryPolicy, SplitConfig, SplitOptions, Splitter};

#[derive(Parser)]
#[command(name = "playlist-splitter")]
#[command(about = "Split Spotify playlists into themed sub-playlists with a language model")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Quiet mode - only warnings and errors
    #[arg(short = 'q', long = "quiet", global = true)]
    quiet: bool,

    /// Verbose mode - include per-page and per-window details
    #[arg(short = 'v', long = "verbose", global = true)]
    verbose: bool,

    /// Spotify access token (defaults to the SPOTIFY_TOKEN environment variable)
    #[arg(long = "token", global = true)]
    token: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Split one or more playlists into new playlists
    Split(SplitArgs),
    /// List the current user's playlists
    List,
}

#[derive(Args)]
struct SplitArgs {
    /// Spotify IDs of the playlists to split
    #[arg(required = true)]
    playlist_ids: Vec<String>,

    /// Path to a split configuration JSON file
    #[arg(short = 'c', long = "config")]
    config_file: Option<String>,

    /// Number of playlists to split each source into
    #[arg(short = 'g', long = "groups")]
    groups: Option<usize>,

    /// Style instructions for the classifier
    #[arg(short = 's', long = "style")]
    style: Option<String>,

    /// Prefix for created playlist names ("{source}" uses the source name)
    #[arg(long = "prefix")]
    prefix: Option<String>,

    /// Create the new playlists as private
    #[arg(long = "private")]
    private: bool,

    /// Enable debug mode - print proposed playlists instead of creating them
    #[arg(short = 'd', long = "debug")]
    debug: bool,

    /// Cancel outstanding work after this many seconds
    #[arg(long = "deadline-secs")]
    deadline_secs: Option<u64>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);

    // Load configuration from .env
    let config = load_config()?;
    let credentials: Arc<dyn CredentialProvider> = match cli.token {
        Some(token) => Arc::new(StaticCredentialProvider(token)),
        None => Arc::new(EnvCredentialProvider::new()),
    };
    let client = SpotifyClient::new(&config, credentials);

    // Test the token first
    let user_id = match client.current_user_id() {
        Ok(id) => id,
        Err(e) => {
            eprintln!("✗ Spotify authorization failed: {e}");
            return Err(anyhow::anyhow!("Authorization required: {}", e));
        }
    };
    log::info!("Authorized as {user_id}");

    match cli.command {
        Command::List => list_playlists(&client),
        Command::Split(args) => split_playlists(&config, &client, args),
    }
}

fn init_logging(quiet: bool, verbose: bool) {
    let level = if quiet {
        LevelFilter::Warn
    } else if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn list_playlists(client: &SpotifyClient) -> Result<()> {
    let playlists = client.list_playlists()?;
    println!("Found {} playlists:", playlists.len());
    for playlist in &playlists {
        let tracks = playlist
            .tracks
            .as_ref()
            .map(|t| t.total.to_string())
            .unwrap_or_else(|| "?".to_string());
        let owner = playlist
            .owner
            .as_ref()
            .map(|o| format!(", owned by {}", o.id))
            .unwrap_or_default();
        println!("  {}  {} ({} tracks{})", playlist.id, playlist.name, tracks, owner);
    }
    Ok(())
}

fn split_playlists(config: &Config, client: &SpotifyClient, args: SplitArgs) -> Result<()> {
    let mut split_config = match &args.config_file {
        Some(path) => SplitConfig::load_from_file(path)?,
        None => SplitConfig::default(),
    };
    if let Some(groups) = args.groups {
        split_config.group_count = groups;
    }
    if let Some(style) = args.style {
        split_config.style = style;
    }
    if args.prefix.is_some() {
        split_config.name_prefix = args.prefix;
    }
    if args.private {
        split_config.public = false;
    }
    split_config.validate()?;

    let options = SplitOptions {
        directive: split_config.directive(),
        public: split_config.public,
        name_prefix: split_config.name_prefix.clone(),
        dry_run: args.debug,
        write_pause: config.write_pause,
        retry: RetryPolicy {
            max_retries: config.max_fetch_retries,
            ..RetryPolicy::default()
        },
    };

    let cancel = CancellationToken::new();
    if let Some(secs) = args.deadline_secs {
        cancel.cancel_after(Duration::from_secs(secs));
    }

    let classifier = OpenAiClassifier::new(config);
    let splitter = Splitter::new(client, client, &classifier, options);

    println!(
        "Splitting {} playlists into {} groups each...",
        args.playlist_ids.len(),
        split_config.group_count
    );
    let started = chrono::Local::now();
    let outcomes = splitter.run_all(&args.playlist_ids, &cancel);

    print_summary(&outcomes, args.debug, started);

    let failed = outcomes.iter().filter(|o| !o.is_success()).count();
    if failed > 0 {
        return Err(anyhow::anyhow!(
            "{}/{} playlists failed",
            failed,
            outcomes.len()
        ));
    }
    Ok(())
}

fn print_summary(
    outcomes: &[PlaylistOutcome],
    dry_run: bool,
    started: chrono::DateTime<chrono::Local>,
) {
    println!(
        "\n=== SPLIT SUMMARY ({}, {}s) ===",
        started.format("%Y-%m-%d %H:%M:%S"),
        (chrono::Local::now() - started).num_seconds()
    );

    for outcome in outcomes {
        let status = match (&outcome.failure, outcome.is_degraded()) {
            (Some(_), _) => "✗",
            (None, true) => "⚠",
            (None, false) => "✓",
        };
        println!(
            "\n{} {} ({} tracks, {})",
            status, outcome.playlist_id, outcome.track_count, outcome.state
        );
        if let Some(reason) = &outcome.failure {
            println!("   Error: {reason}");
        }
        if outcome.skipped_pages > 0 {
            println!("   {} pages could not be fetched", outcome.skipped_pages);
        }
        if outcome.invalid_indices > 0 {
            println!(
                "   {} invalid track indices from the classifier were ignored",
                outcome.invalid_indices
            );
        }
        if outcome.duplicate_tracks > 0 {
            println!(
                "   {} tracks were placed in more than one playlist",
                outcome.duplicate_tracks
            );
        }
        if outcome.unassigned_tracks > 0 {
            println!(
                "   {} tracks were not placed in any playlist",
                outcome.unassigned_tracks
            );
        }

        for group in &outcome.groups {
            let detail = match &group.status {
                GroupStatus::Planned => "would be created".to_string(),
                GroupStatus::Created => format!(
                    "created with ID: {}",
                    group.playlist_id.as_deref().unwrap_or("?")
                ),
                GroupStatus::Partial { written, total } => format!(
                    "PARTIAL - only {}/{} tracks written to {}",
                    written,
                    total,
                    group.playlist_id.as_deref().unwrap_or("?")
                ),
                GroupStatus::Failed(reason) => format!("failed: {reason}"),
            };
            println!("   - {} [{} tracks] {}", group.name, group.track_count, detail);
            if dry_run && !group.description.is_empty() {
                println!("       {}", group.description);
            }
        }
    }

    let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
    println!(
        "\nSuccessfully processed {}/{} playlists",
        succeeded,
        outcomes.len()
    );
}
