use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use concierge_gateway::agent::Orchestrator;
use concierge_gateway::capabilities::{
    calendar_capabilities, email_capabilities, fact_capabilities, CapabilityRegistry,
};
use concierge_gateway::channels::WhatsAppChannel;
use concierge_gateway::db::{self, HistoryRepo, ProfileRepo};
use concierge_gateway::gateway::OpenAiGateway;
use concierge_gateway::providers::GoogleAuth;
use concierge_gateway::server::{self, AppState};
use concierge_gateway::Config;

/// Concierge - `WhatsApp` assistant gateway
#[derive(Parser)]
#[command(name = "concierge", version, about)]
struct Cli {
    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,concierge_gateway=info",
        1 => "info,concierge_gateway=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load()?;
    let port = cli.port.unwrap_or(config.port);

    tracing::info!(
        model = %config.openai.model,
        port,
        turn_budget = config.agent.turn_budget,
        "starting concierge gateway"
    );

    let pool = db::init(&config.database_path)?;
    let history = HistoryRepo::new(pool.clone(), config.agent.history_policy());
    let profiles = ProfileRepo::new(pool);

    let mut registry = CapabilityRegistry::new();
    registry.register_all(fact_capabilities(profiles.clone()));
    if let Some(ref google) = config.google {
        let auth = Arc::new(GoogleAuth::new(
            google.client_id.clone(),
            google.client_secret.clone(),
            google.refresh_token.clone(),
        ));
        registry.register_all(calendar_capabilities(Arc::clone(&auth)));
        registry.register_all(email_capabilities(auth));
    } else {
        tracing::warn!("Google credentials not set; calendar and email capabilities disabled");
    }
    tracing::info!(capabilities = registry.len(), "capability registry ready");

    let mut gateway =
        OpenAiGateway::new(config.openai.api_key.clone(), config.openai.model.clone());
    if let Some(ref base_url) = config.openai.base_url {
        gateway = gateway.with_base_url(base_url);
    }

    let delivery = Arc::new(WhatsAppChannel::new(
        config.whatsapp.access_token.clone(),
        config.whatsapp.phone_number_id.clone(),
    ));

    let orchestrator = Orchestrator::new(
        Arc::new(gateway),
        Arc::new(registry),
        history,
        profiles,
        config.agent.turn_budget,
    );

    let state = Arc::new(AppState::new(
        orchestrator,
        delivery,
        config.whatsapp.verify_token.clone(),
    ));

    tracing::info!("concierge gateway ready");
    server::run(state, port).await?;

    Ok(())
}
