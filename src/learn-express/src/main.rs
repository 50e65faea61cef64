//! LearnExpress — adaptive learning personalization engine.
//!
//! Main entry point that initializes all subsystems and starts the server.

use clap::Parser;
use learn_api::ApiServer;
use learn_core::config::AppConfig;
use learn_core::event_bus::NoOpSink;
use learn_core::fingerprint::scheme_fingerprint;
use learn_mastery::MasteryTracker;
use learn_pipeline::{checkpoint, UpdateEngine};
use learn_policy::PolicyAgent;
use learn_store::Store;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "learn-express")]
#[command(about = "Adaptive learning personalization engine")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "LEARN_EXPRESS__NODE_ID")]
    node_id: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "LEARN_EXPRESS__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Store backend: memory or redis (overrides config)
    #[arg(long, env = "LEARN_EXPRESS__STORE__BACKEND")]
    store_backend: Option<String>,

    /// Skip the checkpoint restore (start with an empty value table)
    #[arg(long, default_value_t = false)]
    fresh: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "learn_express=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("LearnExpress starting up");

    // Load configuration
    let mut config = AppConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    // Apply CLI overrides
    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    if let Some(backend) = cli.store_backend {
        config.store.backend = backend;
    }

    // Invalid numeric configuration would corrupt trained-table
    // semantics; fail fast.
    config.validate()?;

    let fingerprint = scheme_fingerprint(&config.discretizer);
    info!(
        node_id = %config.node_id,
        http_port = config.api.http_port,
        store = %config.store.backend,
        fingerprint = %fingerprint,
        "Configuration loaded"
    );

    // Initialize the store
    let store = Arc::new(Store::from_config(&config.store).await.unwrap_or_else(|e| {
        error!(error = %e, "Failed to initialize store");
        panic!("store initialization required: {}", e);
    }));

    // Initialize the policy agent and mastery tracker
    let agent = Arc::new(PolicyAgent::new(config.policy.clone()));
    let mastery = Arc::new(MasteryTracker::new(
        config.mastery.clone(),
        config.assessment.clone(),
    ));

    // Warm-start from the last checkpoint. A fingerprint mismatch means
    // the discretization changed under a trained table: fatal.
    if cli.fresh {
        info!("Skipping checkpoint restore (--fresh)");
    } else {
        let restored = checkpoint::restore_or_init(&agent, &store, &fingerprint).await?;
        info!(entries = restored, "Value table ready");
    }

    // Start the background update engine
    let engine = UpdateEngine::start(
        &config,
        agent.clone(),
        mastery,
        store.clone(),
        Arc::new(NoOpSink),
    )?;

    // Start API server
    let api_server = ApiServer::new(config.clone(), engine.clone());

    // Start metrics exporter
    if let Err(e) = api_server.start_metrics().await {
        error!(error = %e, "Failed to start metrics exporter");
    }

    // Checkpoint once more on shutdown so an orderly stop loses nothing.
    let engine_for_shutdown = engine.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received; checkpointing value table");
            if let Err(e) = engine_for_shutdown.checkpoint_now().await {
                error!(error = %e, "Final checkpoint failed");
            }
            std::process::exit(0);
        }
    });

    info!("LearnExpress is ready to serve traffic");

    // Start HTTP server (blocks until shutdown)
    api_server.start_http().await?;

    Ok(())
}
