//! Configuration resolution for simcat-catalog
//!
//! Text-embedding API key priority: `SIMCAT_OPENAI_API_KEY` → `OPENAI_API_KEY` → TOML.

use simcat_common::config::TextConfig;
use tracing::{info, warn};

/// Primary API key environment variable
pub const API_KEY_ENV_VAR: &str = "SIMCAT_OPENAI_API_KEY";

/// Fallback API key environment variable
pub const FALLBACK_API_KEY_ENV_VAR: &str = "OPENAI_API_KEY";

/// Resolve the text-embedding API key
///
/// Returns `None` when no source holds a usable key; the service still
/// starts and the text-embedding endpoints answer 503.
pub fn resolve_text_api_key(text_config: &TextConfig) -> Option<String> {
    let env_key = std::env::var(API_KEY_ENV_VAR)
        .ok()
        .filter(|k| is_valid_key(k))
        .map(|k| (k, "environment (SIMCAT_OPENAI_API_KEY)"))
        .or_else(|| {
            std::env::var(FALLBACK_API_KEY_ENV_VAR)
                .ok()
                .filter(|k| is_valid_key(k))
                .map(|k| (k, "environment (OPENAI_API_KEY)"))
        });

    let toml_key = text_config
        .api_key
        .as_ref()
        .filter(|k| is_valid_key(k))
        .cloned();

    // Warn if multiple sources (potential misconfiguration)
    if env_key.is_some() && toml_key.is_some() {
        warn!("Text-embedding API key found in environment and TOML. Using environment.");
    }

    if let Some((key, source)) = env_key {
        info!("Text-embedding API key loaded from {}", source);
        return Some(key.trim().to_string());
    }

    if let Some(key) = toml_key {
        info!("Text-embedding API key loaded from TOML config");
        return Some(key.trim().to_string());
    }

    warn!(
        "Text-embedding API key not configured; book embedding and text search are disabled. \
         Set {} or text.api_key in the config file.",
        API_KEY_ENV_VAR
    );
    None
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
