//! Milo Node CLI
//!
//! Command-line interface for running and querying a Milo node.

use clap::{Parser, Subcommand};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use milo_node::search::{connect_embedder, connect_index, SqliteSearchClient};
use milo_node::{
    ApiServer, AppState, ChatPipeline, Error, HealthResponse, MetricsService, MiloConfig,
    OpenAiCompletionClient, RateLimitService, Result, SearchOrchestrator, SearchRequest,
    StudentProfile,
};

#[derive(Parser)]
#[command(name = "milo")]
#[command(author, version, about = "Milo alumni search node", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "milo.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "milo.toml")]
        output: String,
    },

    /// Start the HTTP API
    Serve {
        /// HTTP API listen address (overrides api.listen_address)
        #[arg(long)]
        api_addr: Option<String>,
    },

    /// Run one search and print the results as JSON
    Search {
        query: String,
        #[arg(long)]
        major: Option<String>,
        #[arg(long)]
        interests: Option<String>,
        #[arg(long)]
        skills: Option<String>,
        #[arg(long)]
        location: Option<String>,
        /// Overrides search.top_k
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Check node health
    Health {
        /// API endpoint to check
        #[arg(long, default_value = "http://localhost:8080")]
        endpoint: String,
    },
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    match cli.command {
        Commands::Init { output } => {
            info!("Writing default configuration to: {}", output);
            MiloConfig::default().save(&output)?;
            info!("Configuration saved successfully");
        }

        Commands::Serve { api_addr } => {
            let mut config = load_config(&cli.config)?;
            if let Some(addr) = api_addr {
                config.api.listen_address = addr;
            }
            info!("Starting Milo node...");

            let orchestrator = build_orchestrator(&config).await?;
            let completion = Arc::new(OpenAiCompletionClient::new(&config.completion)?);
            let chat = ChatPipeline::new(completion, orchestrator.clone(), &config.chat);

            let app_state = AppState {
                orchestrator,
                chat,
                metrics: MetricsService::new(),
                rate_limiter: Arc::new(RateLimitService::new(config.rate_limit.clone())),
                start_time: Instant::now(),
            };

            let addr = config.api.listen_address.clone();
            let api_server = ApiServer::with_state(config.api.clone(), app_state);
            info!("Press Ctrl+C to stop");

            api_server
                .run_until(&addr, async {
                    if let Err(e) = signal::ctrl_c().await {
                        error!("Failed to listen for shutdown signal: {}", e);
                    }
                    info!("Received shutdown signal");
                })
                .await?;
            info!("Node stopped");
        }

        Commands::Search {
            query,
            major,
            interests,
            skills,
            location,
            top_k,
        } => {
            let config = load_config(&cli.config)?;
            let orchestrator = build_orchestrator(&config).await?;

            let profile = StudentProfile {
                major,
                interests,
                skills,
                location,
            };
            let mut request = SearchRequest::new(query);
            if profile != StudentProfile::default() {
                request = request.with_profile(profile);
            }

            let results = match top_k {
                Some(top_k) => {
                    let mut limits = orchestrator.limits();
                    limits.top_k = top_k;
                    limits.validate()?;
                    orchestrator.with_limits(limits).search_request(&request).await
                }
                None => orchestrator.search_request(&request).await,
            };
            println!("{}", serde_json::to_string_pretty(&results)?);
        }

        Commands::Health { endpoint } => {
            info!("Checking node health at: {}", endpoint);
            match check_health(&endpoint).await {
                Ok(response) => {
                    info!("Node status: {}", response.status);
                    info!("Version: {}", response.version);
                    info!("Uptime: {} seconds", response.uptime);
                }
                Err(e) => {
                    error!("Health check failed: {}", e);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

fn load_config(path: &str) -> Result<MiloConfig> {
    if Path::new(path).exists() {
        info!("Loading configuration from: {}", path);
        MiloConfig::load(path)
    } else {
        info!("Using default configuration");
        Ok(MiloConfig::default())
    }
}

/// Connect every search collaborator named in `config`.
///
/// An embedder or index that fails to initialise disables semantic search;
/// only the relational store is required.
async fn build_orchestrator(config: &MiloConfig) -> Result<SearchOrchestrator> {
    let embedder = connect_embedder(&config.embedding);
    let index = connect_index(&config.vector_index);

    info!("Opening alumni database: {}", config.relational.database_url);
    let store = Arc::new(SqliteSearchClient::connect(&config.relational).await?);

    Ok(SearchOrchestrator::new(embedder, index, store)
        .with_config(&config.search)
        .with_dimensions(config.embedding.dimensions))
}

async fn check_health(endpoint: &str) -> Result<HealthResponse> {
    let url = format!("{}/health", endpoint.trim_end_matches('/'));
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .map_err(|e| Error::Api(format!("HTTP client: {}", e)))?;

    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| Error::Api(format!("Connection failed: {}", e)))?
        .error_for_status()
        .map_err(|e| Error::Api(e.to_string()))?;

    response
        .json()
        .await
        .map_err(|e| Error::Api(format!("JSON parse error: {}", e)))
}
