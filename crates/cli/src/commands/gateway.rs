//! `clinq serve` — Start the HTTP API server.

use clinq_config::AppConfig;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    if !config.has_api_key() {
        tracing::warn!("No model API key configured; /v1/ask will answer 503 until one is set");
    }
    super::ensure_database_dir(&config.storage.database)?;

    println!("clinq gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Database:  {}", config.storage.database);

    clinq_gateway::start(config).await?;

    Ok(())
}
