//! `echona` - operator CLI for the Echona upstream clients.
//!
//! # Commands
//! - `echona health` - Spotify readiness and analysis service probe
//! - `echona search <query>` - track search with user-token fallback
//! - `echona analyze --type text --text "..."` - submit a mood analysis
//! - `echona authorize-url <state>` - print the Spotify consent URL

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use clap::Parser;
use echona_music_client::config::{AppConfig, ConfigLoader};
use echona_music_client::spotify::HealthStatus;
use echona_music_client::{
    AnalysisClient, AnalysisKind, AnalysisRequest, SearchRequest, SpotifyClient,
};
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "echona", version, about = "Resilient Spotify and mood-analysis client")]
struct Cli {
    /// Configuration file (defaults to ./echona.toml, then the user config dir).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// Report Spotify and analysis service readiness.
    Health,

    /// Search for tracks.
    Search(SearchArgs),

    /// Submit text or a face image for mood analysis.
    Analyze(AnalyzeArgs),

    /// Print the Spotify authorization URL for the configured app.
    AuthorizeUrl(AuthorizeArgs),
}

#[derive(Debug, Parser)]
struct SearchArgs {
    /// Search terms.
    #[arg(required = true)]
    query: Vec<String>,

    /// Search as this user first; falls back to app credentials on 401/403.
    #[arg(long, value_name = "TOKEN")]
    user_token: Option<String>,

    /// Print the raw result JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Parser)]
struct AnalyzeArgs {
    /// Analysis kind: `face` or `text`.
    #[arg(long = "type", value_name = "KIND")]
    kind: String,

    /// Text to analyze.
    #[arg(long)]
    text: Option<String>,

    /// File holding the base64 image to analyze.
    #[arg(long, value_name = "PATH")]
    image_file: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct AuthorizeArgs {
    /// Opaque value echoed back on the callback.
    state: String,

    /// Scope to request; repeatable. Defaults to user-read-email and user-read-private.
    #[arg(long = "scope", value_name = "SCOPE")]
    scopes: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    match cli.cmd {
        Command::Health => run_health(&config).await,
        Command::Search(args) => run_search(&config, args).await,
        Command::Analyze(args) => run_analyze(&config, args).await,
        Command::AuthorizeUrl(args) => run_authorize_url(&config, &args),
    }
}

fn init_logging() {
    let default_level = "warn";
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(default_level))
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_config(path: Option<&PathBuf>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => ConfigLoader::new()
            .with_file(path)
            .load()
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => ConfigLoader::load_default().context("failed to load configuration")?,
    };
    tracing::debug!(environment = ?config.environment, "configuration loaded");
    Ok(config)
}

async fn run_health(config: &AppConfig) -> Result<()> {
    let spotify = SpotifyClient::new(config).context("failed to build HTTP client")?;
    let analysis = AnalysisClient::new(config).context("failed to build HTTP client")?;

    let spotify_health = spotify.service_health().await;
    let analysis_health = match analysis.health().await {
        Ok(upstream) => json!({ "status": "ok", "upstream": upstream }),
        Err(err) => json!({
            "status": "degraded",
            "error": err.kind(),
            "message": err.caller_message(),
        }),
    };

    let report = json!({
        "spotify": spotify_health,
        "analysis": analysis_health,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    if spotify_health.status == HealthStatus::Degraded || analysis_health["status"] != "ok" {
        bail!("one or more services are degraded");
    }
    Ok(())
}

async fn run_search(config: &AppConfig, args: SearchArgs) -> Result<()> {
    let query = args.query.join(" ");
    if query.trim().is_empty() {
        bail!("search query must not be empty");
    }
    let request = match args.user_token {
        Some(token) => SearchRequest::as_user(query, token),
        None => SearchRequest::anonymous(query),
    };

    let client = SpotifyClient::new(config).context("failed to build HTTP client")?;
    let results = client.search(&request).await.context("search failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }
    if results.tracks.items.is_empty() {
        println!("no tracks found");
    }
    for (idx, track) in results.tracks.items.iter().enumerate() {
        println!("{:>2}. {} by {} ({})", idx + 1, track.name, track.artist_names(), track.uri);
    }
    Ok(())
}

async fn run_analyze(config: &AppConfig, args: AnalyzeArgs) -> Result<()> {
    let request = build_analysis_request(args)?;
    let client = AnalysisClient::new(config).context("failed to build HTTP client")?;

    let verdict = client.analyze(&request).await.context("analysis failed")?;
    println!("{}", serde_json::to_string_pretty(&verdict)?);
    Ok(())
}

fn build_analysis_request(args: AnalyzeArgs) -> Result<AnalysisRequest> {
    let kind = AnalysisKind::from_str(&args.kind)?;
    let image = match args.image_file {
        Some(path) => Some(
            std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read image from {}", path.display()))?
                .trim()
                .to_string(),
        ),
        None => None,
    };
    let request = AnalysisRequest {
        kind,
        image,
        text: args.text,
    };
    request.validate()?;
    Ok(request)
}

fn run_authorize_url(config: &AppConfig, args: &AuthorizeArgs) -> Result<()> {
    if !config.spotify.is_configured() {
        bail!(
            "Spotify is not configured; missing {}",
            config.spotify.missing_fields().join(", ")
        );
    }
    let client = SpotifyClient::new(config).context("failed to build HTTP client")?;
    let scopes: Vec<&str> = args.scopes.iter().map(String::as_str).collect();
    let url = client
        .authorize_url(&args.state, &scopes)
        .context("invalid accounts URL")?;
    println!("{url}");
    Ok(())
}
