//! Global config singleton (§1). Loaded once from `settings.json` plus a
//! companion `pools.json` for the humanization pools; server and tests both
//! call `ensure_loaded()` so the first caller does the work and later
//! callers share the instance. Grounded on `config::ensure_loaded`'s shape —
//! `OnceLock`, JSON-first with env overrides,
//! a `Default` fallback when no file is present.

use std::path::PathBuf;
use std::sync::OnceLock;

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Cached config loaded from `settings.json` + environment overrides.
pub struct Config {
    /// Directory holding `fleet.db` (SQLite, created on first open).
    pub data_dir: PathBuf,
    /// `redis://` connection string backing the task queue.
    pub redis_url: String,
    /// 32-byte (hex or base64) key encrypting session blobs at rest.
    pub vault_key: String,
    /// Model id tried first for every LLM call, absent a campaign override.
    pub default_llm_model: String,
    pub llm_api_key: String,
    pub llm_base_url: String,
    /// Extra model tried before `dialogue::llm::DEFAULT_FALLBACK_CHAIN`
    /// when no campaign-specific fallback is configured.
    pub llm_fallback_model: Option<String>,
    /// Outbound HTTP proxy used only for LLM traffic, never account traffic.
    pub llm_http_proxy: Option<String>,
    /// Hard cap on concurrently running account workers.
    pub max_fleet_size: u32,
    /// HTTPS endpoint proxies are health-checked against (§4.2).
    pub proxy_health_check_url: String,
    /// Warm-up/background-activity pools (channels, reaction weights).
    pub pools: Pools,
}

/// Operator-editable warm-up/background-activity pools, loaded from
/// `pools.json` so tuning humanization doesn't require a rebuild (§9
/// "Humanization is a contract, not a hint").
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Pools {
    pub warmup_channels: Vec<String>,
    pub background_channels: Vec<String>,
    pub reaction_emoji: Vec<String>,
}

impl Default for Pools {
    fn default() -> Self {
        Self {
            warmup_channels: vec!["@durov".into(), "@telegram".into()],
            background_channels: vec!["@durov".into(), "@telegram".into()],
            reaction_emoji: vec!["👍".into(), "🔥".into(), "❤".into(), "😁".into()],
        }
    }
}

/// Ensure config is loaded (idempotent). Reads `settings.json`/`pools.json`
/// from the current working directory on first call; returns the same
/// instance afterwards.
pub fn ensure_loaded() -> &'static Config {
    CONFIG.get_or_init(|| {
        let settings_path = config_root().join("settings.json");
        let pools_path = config_root().join("pools.json");
        load_config_from(&settings_path, &pools_path)
    })
}

fn config_root() -> PathBuf {
    std::env::var("FLEET_CONFIG_DIR").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("."))
}

fn load_config_from(settings_path: &std::path::Path, pools_path: &std::path::Path) -> Config {
    let root: serde_json::Value = std::fs::read_to_string(settings_path)
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or(serde_json::Value::Null);

    let str_field = |key: &str, default: &str| -> String {
        std::env::var(format!("FLEET_{}", key.to_uppercase()))
            .ok()
            .or_else(|| root.get(key).and_then(|v| v.as_str()).map(str::to_string))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| default.to_string())
    };
    let opt_str_field = |key: &str| -> Option<String> {
        std::env::var(format!("FLEET_{}", key.to_uppercase()))
            .ok()
            .or_else(|| root.get(key).and_then(|v| v.as_str()).map(str::to_string))
            .filter(|s| !s.is_empty())
    };

    let data_dir = PathBuf::from(str_field("data_dir", "./data"));
    let redis_url = str_field("redis_url", "redis://127.0.0.1:6379");
    let vault_key = str_field("vault_key", "");
    let default_llm_model = str_field("default_llm_model", "gpt-4o-mini");
    let llm_api_key = str_field("llm_api_key", "");
    let llm_base_url = str_field("llm_base_url", "https://api.openai.com/v1");
    let llm_fallback_model = opt_str_field("llm_fallback_model");
    let llm_http_proxy = opt_str_field("llm_http_proxy");
    let proxy_health_check_url = str_field("proxy_health_check_url", "https://www.google.com/generate_204");
    let max_fleet_size = std::env::var("FLEET_MAX_FLEET_SIZE")
        .ok()
        .and_then(|s| s.parse().ok())
        .or_else(|| root.get("max_fleet_size").and_then(|v| v.as_u64()).map(|v| v as u32))
        .unwrap_or(200);

    let pools = std::fs::read_to_string(pools_path)
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default();

    Config {
        data_dir,
        redis_url,
        vault_key,
        default_llm_model,
        llm_api_key,
        llm_base_url,
        llm_fallback_model,
        llm_http_proxy,
        max_fleet_size,
        proxy_health_check_url,
        pools,
    }
}

impl Default for Config {
    fn default() -> Self {
        load_config_from(std::path::Path::new("/nonexistent"), std::path::Path::new("/nonexistent"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_files_fall_back_to_defaults() {
        let config = Config::default();
        assert_eq!(config.default_llm_model, "gpt-4o-mini");
        assert_eq!(config.max_fleet_size, 200);
        assert!(!config.pools.reaction_emoji.is_empty());
    }
}
