use std::path::Path;

use tracing::{info, warn};

const COMMON_ENV: &str = "config/common.env";
const SECRETS_ENV: &str = ".secrets.env";

/// Layered configuration: the common file, then the profile overlay,
/// then local secrets. Later files override earlier ones; missing files
/// are skipped.
pub fn load_environment() -> Result<(), Box<dyn std::error::Error>> {
    let profile = dotenvy::var("ROCKET_PROFILE").unwrap_or_else(|_| "development".to_string());

    let profile_env = match profile.as_str() {
        "production" => "config/prod.env",
        _ => "config/dev.env",
    };

    for env_file in [COMMON_ENV, profile_env, SECRETS_ENV] {
        load_env_file(env_file)?;
    }

    Ok(())
}

fn load_env_file(path: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !Path::new(path).exists() {
        warn!("Environment file {} not found, skipping", path);
        return Ok(());
    }

    dotenvy::from_filename_override(path)?;
    info!("Loaded environment from: {}", path);
    Ok(())
}
