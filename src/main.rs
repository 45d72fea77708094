// src/main.rs
use std::sync::Arc;

use carton_pack::api;
use carton_pack::config::AppConfig;
use carton_pack::service::{InMemoryCatalog, PackingService};

#[tokio::main]
async fn main() {
    // .env may set RUST_LOG, so load it before the logger.
    let dotenv_result = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(err) = dotenv_result {
        if !matches!(err, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            log::warn!("⚠️ Could not load .env: {}", err);
        }
    }

    let app_config = AppConfig::from_env();
    let packing_config = app_config.optimizer.packing_config();
    log::debug!("Packing configuration: {:?}", packing_config);

    let service = Arc::new(PackingService::new(InMemoryCatalog::new(), packing_config));

    log::info!("🚀 Carton packing service starting...");
    if let Err(err) = api::start_api_server(app_config.api, service).await {
        log::error!("❌ API server stopped: {}", err);
        std::process::exit(1);
    }
}
