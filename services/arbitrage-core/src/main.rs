mod aggregator;
mod clock;
mod coordinator;
mod errors;
mod http;
#[macro_use]
mod logging;
mod metrics;
mod orchestrator;
mod price_cache;
mod queue;
mod risk;
mod scanner;
mod scoring;

use adapters::{testing::StaticOracle, OpaqueSigner};
use anyhow::{Context, Result};
use config::OrchestratorConfig;
use orchestrator::{ChainHandle, Orchestrator};
use std::collections::HashMap;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Exit codes per §6.3: 0 clean shutdown, 1 fatal init error, 2
/// configuration error, 130 SIGINT-style cancellation. This binary's only
/// shutdown trigger is SIGINT or an HTTP task crash, so 0 is reserved for a
/// future operator-initiated stop path and unused today.
#[allow(dead_code)]
const EXIT_OK: u8 = 0;
const EXIT_FATAL_INIT: u8 = 1;
const EXIT_CONFIG: u8 = 2;
const EXIT_SIGINT: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();

    match run().await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            error!(error = %err, "fatal error during startup");
            ExitCode::from(EXIT_FATAL_INIT)
        }
    }
}

async fn run() -> Result<u8> {
    log_success!("starting arbitrage-core");

    let config = load_config()?;
    if let Err(err) = config.validate() {
        error!(error = %err, "configuration invalid");
        return Ok(EXIT_CONFIG);
    }

    let oracle = Arc::new(StaticOracle::new(HashMap::new()));
    let signer = OpaqueSigner(std::env::var("ARB_SIGNER_KEY").unwrap_or_else(|_| "dev-signer".to_string()));
    let wallet = std::env::var("ARB_WALLET_ADDRESS").unwrap_or_else(|_| "0x0".to_string());

    let chains = provision_chains().context("failed to provision chain adapters")?;
    if chains.is_empty() {
        warn!("no chains configured; orchestrator will idle with nothing to scan");
    }

    let orchestrator = Arc::new(Orchestrator::new(config, chains, oracle, signer, wallet));

    orchestrator.start().await.context("orchestrator failed to start")?;
    log_success!("orchestrator started");

    let api_token = std::env::var("ARB_API_TOKEN").unwrap_or_else(|_| "dev-token".to_string());
    let http_port: u16 = std::env::var("ARB_HTTP_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8080);
    let http_server = http::HttpServer::new(orchestrator.clone(), http_port, http::ApiToken(api_token));
    let http_handle = tokio::spawn(http_server.serve());

    let shutdown = tokio::signal::ctrl_c();
    tokio::select! {
        result = http_handle => {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(err)) => error!(error = %err, "http server exited with an error"),
                Err(err) => error!(error = %err, "http server task panicked"),
            }
            orchestrator.stop().await;
            Ok(EXIT_FATAL_INIT)
        }
        _ = shutdown => {
            info!("received shutdown signal");
            orchestrator.stop().await;
            Ok(EXIT_SIGINT)
        }
    }
}

fn load_config() -> Result<OrchestratorConfig> {
    match std::env::var("ARB_CONFIG_PATH") {
        Ok(path) => OrchestratorConfig::from_file(&path).with_context(|| format!("failed to load config from {path}")),
        Err(_) => Ok(OrchestratorConfig::from_env()),
    }
}

/// Provisions chain adapters named in `ARB_CHAINS` (comma-separated). This
/// binary ships no real chain/venue adapters (§6.1/§6.2 are consumed
/// interfaces); it wires the in-memory test doubles so the process is
/// runnable end-to-end without external RPC access. A deployment wires its
/// own `ChainAdapter`/`VenueAdapter` implementations in their place.
fn provision_chains() -> Result<Vec<ChainHandle>> {
    use adapters::testing::{InMemoryChainAdapter, InMemoryVenueAdapter};
    use adapters::VenueAdapter;
    use types::ChainId;

    let chain_names: Vec<String> = std::env::var("ARB_CHAINS")
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    let mut chains = Vec::new();
    for name in chain_names {
        let mut venues: HashMap<String, Arc<dyn VenueAdapter>> = HashMap::new();
        venues.insert("default".to_string(), Arc::new(InMemoryVenueAdapter::new()));
        chains.push(ChainHandle {
            chain: ChainId::new(name),
            adapter: Arc::new(InMemoryChainAdapter::new()),
            venues,
        });
    }
    Ok(chains)
}
