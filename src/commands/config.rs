//! Configuration command handlers

use std::collections::BTreeMap;
use tracing::{error, info};

use crate::core::AppConfig;
use crate::AppState;

/// Get current application configuration
pub async fn get_config(state: &AppState) -> AppConfig {
    state.config.read().await.clone()
}

/// Configuration rendered as environment variables, sorted by key
pub async fn get_config_env(state: &AppState) -> BTreeMap<String, String> {
    state
        .config
        .read()
        .await
        .to_env_vars()
        .into_iter()
        .collect()
}

/// Change the concurrent download limit for this session
pub async fn set_max_concurrent_downloads(state: &AppState, value: usize) -> Result<(), String> {
    info!("🔧 Updating max concurrent downloads to {}", value);

    let mut candidate = state.config.read().await.clone();
    candidate.max_concurrent_downloads = value;
    if let Err(e) = candidate.validate() {
        error!("❌ Rejected configuration update: {}", e);
        return Err(e.to_string());
    }

    state
        .download_runtime
        .set_max_concurrent(value)
        .await
        .map_err(|e| e.to_string())?;
    *state.config.write().await = candidate;
    Ok(())
}
