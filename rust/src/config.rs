use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

pub const CONFIG_FILE_NAME: &str = "plantops_config.json";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub remote_base_url: Option<String>,
    pub disable_network: Option<bool>,
    // Only the HTTP remote applies this; the sync layer itself never times out.
    pub request_timeout_ms: Option<u64>,
    pub actor_id: Option<String>,
    pub chat_cache: Option<bool>,
}

/// Missing or malformed config falls back to defaults.
pub fn load_sync_config(data_dir: &str) -> SyncConfig {
    let path = Path::new(data_dir).join(CONFIG_FILE_NAME);
    let Ok(bytes) = std::fs::read(&path) else {
        return SyncConfig::default();
    };
    match serde_json::from_slice::<SyncConfig>(&bytes) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(path = %path.display(), err = %e, "ignoring malformed config");
            SyncConfig::default()
        }
    }
}

impl SyncConfig {
    pub fn network_enabled(&self) -> bool {
        // Used to keep tests deterministic and offline.
        if let Some(disable) = self.disable_network {
            return !disable;
        }
        std::env::var("PLANTOPS_DISABLE_NETWORK").ok().as_deref() != Some("1")
    }

    pub fn chat_cache_enabled(&self) -> bool {
        self.chat_cache.unwrap_or(true)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    pub fn remote_base_url(&self) -> Option<&str> {
        self.remote_base_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_sync_config(dir.path().to_str().unwrap());
        assert!(config.remote_base_url().is_none());
        assert!(config.chat_cache_enabled());
        assert!(config.request_timeout().is_none());
    }

    #[test]
    fn reads_known_keys_and_ignores_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().to_str().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"{"remote_base_url":" https://ops.plant.local/api ","disable_network":true,"request_timeout_ms":2500,"chat_cache":false,"unknown":1}"#,
        )
        .unwrap();

        let config = load_sync_config(data_dir);
        assert_eq!(config.remote_base_url(), Some("https://ops.plant.local/api"));
        assert!(!config.network_enabled());
        assert!(!config.chat_cache_enabled());
        assert_eq!(config.request_timeout(), Some(Duration::from_millis(2500)));

        std::fs::write(dir.path().join(CONFIG_FILE_NAME), b"{not json").unwrap();
        assert!(load_sync_config(data_dir).remote_base_url.is_none());
    }
}
