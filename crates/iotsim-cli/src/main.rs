//! Binary entry point for the virtual IoT device simulation engine.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use iotsim_api::server::ServerState;
use iotsim_core::config::Settings;
use iotsim_core::logging::init_tracing;
use iotsim_devices::{DeviceManager, HttpMetricsWriter, MetricsWriter, ModelRegistry, NoopMetricsWriter, WebhookRegistry};

/// Run a fleet of virtual and proxy IoT devices and serve the control API.
#[derive(Parser, Debug)]
#[command(name = "iotsim")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to bind the HTTP control surface to. Overrides SERVICE_PORT.
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory to load device model JSON files from. Overrides DEVICE_MODEL_PATH.
    #[arg(long)]
    model_dir: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut settings = Settings::from_env();
    if let Some(port) = args.port {
        settings.service_port = port;
    }
    if let Some(dir) = args.model_dir {
        settings.device_model_path = dir;
    }

    init_tracing(&settings.log_level);

    let registry = ModelRegistry::new(&settings.device_model_path);
    match registry.load_from_disk().await {
        Ok(count) => tracing::info!(count, dir = %settings.device_model_path, "loaded device models"),
        Err(e) => tracing::warn!(error = %e, dir = %settings.device_model_path, "failed to load device models"),
    }

    let metrics: Arc<dyn MetricsWriter> = match &settings.metrics_sink_url {
        Some(url) => {
            tracing::info!(%url, "writing metrics to configured sink");
            Arc::new(HttpMetricsWriter::new(
                url.clone(),
                settings.metrics_sink_token.clone(),
                settings.metrics_sink_org.clone(),
                settings.metrics_sink_bucket.clone(),
            ))
        }
        None => {
            tracing::info!("no METRICS_SINK_URL configured, metrics are discarded");
            Arc::new(NoopMetricsWriter)
        }
    };

    let webhook_registry = WebhookRegistry::new();
    let manager = DeviceManager::new(
        registry.clone(),
        settings.max_devices_per_instance,
        metrics,
        webhook_registry,
    );
    manager.start_stats_task().await;

    let state = ServerState::new(manager, registry);
    let addr: SocketAddr = ([0, 0, 0, 0], settings.service_port).into();
    iotsim_api::run(addr, state).await
}
