mod cli;
mod config;
mod executor;
mod llm;
mod parser;
mod pipeline;
mod plan;
mod prompt;
mod tools;
mod types;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use config::AppConfig;
use llm::tgi::TgiGenerator;
use pipeline::Pipeline;
use tools::gmaps::GoogleMapsClient;
use types::RequestContext;

/// Answers place questions by compiling model-emitted call plans and
/// running them against the Google Places API.
#[derive(Parser, Debug)]
#[command(name = "placepilot", version, about)]
struct Args {
    /// One-shot query; omit to start an interactive session.
    query: Option<String>,

    /// Alternate config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Client IP to geolocate "near me" queries against.
    #[arg(long)]
    client_ip: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("placepilot=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => AppConfig::load_from_path(path)?,
        None => {
            // Auto-generate the config file on first run.
            let config_path = AppConfig::config_path()?;
            if !config_path.exists() {
                let path = AppConfig::save_default()?;
                println!("[Config] Created default config: {}", path.display());
                println!("[Config] Edit it to set your endpoints and API key.");
            }
            AppConfig::load()?
        }
    };

    let places = Arc::new(GoogleMapsClient::new(config.places_api_key()?));
    let registry = Arc::new(tools::create_default_registry(places)?);

    let token = config.model_token();
    let plan_model = Arc::new(TgiGenerator::new(
        config.models.plan_endpoint.clone(),
        token.clone(),
    ));
    let summary_model = Arc::new(TgiGenerator::new(
        config.models.summary_endpoint.clone(),
        token,
    ));
    let pipeline = Pipeline::new(registry, plan_model, summary_model, config.pipeline);

    let ctx = match args.client_ip {
        Some(ip) => RequestContext::with_client_ip(ip),
        None => RequestContext::default(),
    };

    match args.query {
        Some(query) => cli::run_query(&pipeline, &query, ctx).await,
        None => cli::run_interactive(&pipeline, ctx).await,
    }
}
