use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use streamscout::client::{HelixClient, TwitchApi};
use streamscout::config::Settings;
use streamscout::error::ScoutError;
use streamscout::logging;
use streamscout::scraper::Scraper;
use streamscout::types::{ExportConfig, ExportFormat, SearchCriteria};

#[derive(Parser)]
#[command(name = "streamscout")]
#[command(about = "Find Twitch streamers and extract contact information")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Test authentication against the Twitch API
    Auth,
    /// Search for game ids by name
    Games {
        /// Game name to search for
        query: String,
    },
    /// Search for streamers matching criteria and export the results
    Search {
        /// Game/category name to filter by
        #[arg(long, short = 'g')]
        game: Option<String>,
        /// Twitch game ID (alternative to --game)
        #[arg(long)]
        game_id: Option<String>,
        /// Minimum viewer count
        #[arg(long, short = 'm', default_value_t = 0)]
        min_viewers: u64,
        /// Maximum viewer count
        #[arg(long, short = 'M')]
        max_viewers: Option<u64>,
        /// Broadcast language (ISO 639-1)
        #[arg(long, short = 'l', default_value = "de")]
        language: String,
        /// Only collect channels that are currently live
        #[arg(long)]
        live_only: bool,
        /// Maximum streamers to collect
        #[arg(long, short = 'n', default_value_t = 100)]
        limit: usize,
        /// Output file path
        #[arg(long, short = 'o', default_value = "streamers.csv")]
        output: PathBuf,
        /// Output format: csv, json
        #[arg(long, short = 'f', default_value = "csv")]
        format: String,
        /// Show detailed progress
        #[arg(long, short = 'v')]
        verbose: bool,
    },
}

fn print_credentials_help() {
    eprintln!("Please ensure these environment variables are set:");
    eprintln!("  TWITCH_CLIENT_ID=your_client_id");
    eprintln!("  TWITCH_CLIENT_SECRET=your_client_secret");
}

fn load_settings() -> Result<Settings, i32> {
    match Settings::from_env() {
        Ok(settings) => Ok(settings),
        Err(e) => {
            eprintln!("✗ {e}");
            print_credentials_help();
            Err(2)
        }
    }
}

async fn run_auth() -> i32 {
    let settings = match load_settings() {
        Ok(settings) => settings,
        Err(code) => return code,
    };
    let rate_limit = settings.rate_limit_requests;

    let client = match HelixClient::new(settings) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("✗ Failed to build HTTP client: {e}");
            return 1;
        }
    };

    match client.authenticate().await {
        Ok(credential) => {
            let expires_in_days = credential.remaining_lifetime().as_secs() / 86_400;
            println!("✓ Authentication successful");
            println!("  Token expires in: {expires_in_days} days");
            println!("  Rate limit: {rate_limit} requests/minute");
            0
        }
        Err(e) => {
            eprintln!("✗ Authentication failed");
            eprintln!("✗ {e}");
            print_credentials_help();
            2
        }
    }
}

async fn run_games(query: &str) -> i32 {
    let settings = match load_settings() {
        Ok(settings) => settings,
        Err(code) => return code,
    };

    let client = match HelixClient::new(settings) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("✗ Failed to build HTTP client: {e}");
            return 1;
        }
    };

    match client.search_games(query).await {
        Ok(games) if games.is_empty() => {
            println!("! No games found for \"{query}\"");
            0
        }
        Ok(games) => {
            println!("\nSearch results for \"{query}\":\n");
            println!("{:<12} Name", "ID");
            for game in games.iter().take(10) {
                println!("{:<12} {}", game.id, game.name);
            }
            println!("\nUse --game-id {} with the search command.", games[0].id);
            0
        }
        Err(e @ ScoutError::Authentication(_)) => {
            eprintln!("✗ {e}");
            2
        }
        Err(e) => {
            eprintln!("✗ {e}");
            1
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_search(
    game: Option<String>,
    game_id: Option<String>,
    min_viewers: u64,
    max_viewers: Option<u64>,
    language: String,
    live_only: bool,
    limit: usize,
    output: PathBuf,
    format: String,
) -> i32 {
    let format: ExportFormat = match format.parse() {
        Ok(format) => format,
        Err(e) => {
            eprintln!("✗ {e}");
            return 3;
        }
    };

    let settings = match load_settings() {
        Ok(settings) => settings,
        Err(code) => return code,
    };

    let mut criteria = SearchCriteria {
        min_viewers,
        max_viewers,
        game_name: game,
        game_id,
        language: Some(language),
        include_offline: !live_only,
        limit,
    };
    if let Err(e) = criteria.validate() {
        eprintln!("✗ {e}");
        return 3;
    }

    let client = match HelixClient::new(settings) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("✗ Failed to build HTTP client: {e}");
            return 1;
        }
    };

    // Resolve the game name to an id before collection starts.
    if criteria.game_id.is_none() {
        if let Some(name) = criteria.game_name.clone() {
            println!("ℹ Looking up game ID for \"{name}\"...");
            match client.get_game_id(&name).await {
                Ok(Some(id)) => criteria.game_id = Some(id),
                Ok(None) => {
                    eprintln!("✗ Game not found: \"{name}\"");
                    eprintln!("ℹ Use \"streamscout games <name>\" to search for games.");
                    return 1;
                }
                Err(e @ ScoutError::Authentication(_)) => {
                    eprintln!("✗ {e}");
                    return 2;
                }
                Err(e) => {
                    eprintln!("✗ {e}");
                    return 1;
                }
            }
        }
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("stop requested, finishing the current page");
                eprintln!("\n! Stop requested, finishing the current page...");
                cancel.cancel();
            }
        });
    }

    let api: Arc<dyn TwitchApi> = Arc::new(client);
    let scraper = Scraper::with_cancellation(api, cancel);
    let progress = scraper.progress();
    let export_config = ExportConfig {
        format,
        output_path: output.clone(),
    };

    println!("🔎 Collecting streamers...");
    let state = match scraper.collect(&criteria, Some(&export_config)).await {
        Ok(state) => state,
        Err(failure) => {
            return match failure.error {
                ScoutError::Authentication(_) => {
                    eprintln!("✗ Authentication failed. Check your credentials.");
                    2
                }
                ScoutError::Cancelled => {
                    let merged = failure.state.records.len();
                    eprintln!("✗ Cancelled with {merged} records collected (not exported)");
                    130
                }
                ref e => {
                    eprintln!("✗ {e}");
                    eprintln!(
                        "  {} records were collected before the failure.",
                        failure.state.records.len()
                    );
                    1
                }
            };
        }
    };

    let streamers = &state.streamers;
    if streamers.is_empty() {
        println!("! No streamers found matching criteria.");
        return 0;
    }

    let live = streamers.iter().filter(|s| s.is_live).count();
    let with_email = streamers.iter().filter(|s| !s.emails.is_empty()).count();
    let with_social = streamers.iter().filter(|s| s.social_links.any()).count();
    let snapshot = progress.snapshot();

    info!(
        total = streamers.len(),
        live,
        errored = snapshot.errored,
        "search finished"
    );
    println!();
    println!("✓ Found {} streamers", streamers.len());
    println!("  - Live: {live}");
    println!("  - Offline: {}", streamers.len() - live);
    println!("  - With email: {with_email}");
    println!("  - With social links: {with_social}");
    if snapshot.errored > 0 {
        println!("  - Dropped with errors: {}", snapshot.errored);
    }
    println!();
    println!("✓ Exported to: {}", output.display());
    0
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let verbose = matches!(cli.command, Commands::Search { verbose: true, .. });
    logging::init_logging(verbose);

    let code = match cli.command {
        Commands::Auth => run_auth().await,
        Commands::Games { query } => run_games(&query).await,
        Commands::Search {
            game,
            game_id,
            min_viewers,
            max_viewers,
            language,
            live_only,
            limit,
            output,
            format,
            verbose: _,
        } => {
            run_search(
                game,
                game_id,
                min_viewers,
                max_viewers,
                language,
                live_only,
                limit,
                output,
                format,
            )
            .await
        }
    };

    std::process::exit(code);
}
