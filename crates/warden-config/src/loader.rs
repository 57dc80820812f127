use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::schema::WardenConfig;

/// Loads the Warden configuration from disk with env-var overrides.
pub struct ConfigLoader {
    config: Arc<RwLock<WardenConfig>>,
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > WARDEN_CONFIG env > ~/.warden/warden.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("WARDEN_CONFIG") {
            return PathBuf::from(p);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".warden")
            .join("warden.toml")
    }

    /// Load the config from disk, falling back to defaults.
    pub fn load(path: Option<&Path>) -> warden_core::Result<Self> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            let raw = std::fs::read_to_string(&config_path)?;
            toml::from_str::<WardenConfig>(&raw).map_err(|e| {
                warden_core::WardenError::Config(format!(
                    "failed to parse {}: {}",
                    config_path.display(),
                    e
                ))
            })?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            WardenConfig::default()
        };

        let config = Self::apply_env_overrides(config);

        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
            }
            Err(e) => {
                return Err(warden_core::WardenError::Config(e));
            }
        }

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path,
        })
    }

    /// Get a read snapshot of the current config.
    pub fn get(&self) -> WardenConfig {
        self.config.read().clone()
    }

    /// Path the config was loaded from (or would have been).
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Apply env var overrides (WARDEN_SERVER_LISTEN, WARDEN_LOG_LEVEL, etc.)
    fn apply_env_overrides(mut config: WardenConfig) -> WardenConfig {
        if let Ok(v) = std::env::var("WARDEN_SERVER_LISTEN") {
            config.server.listen = v;
        }
        if let Ok(v) = std::env::var("WARDEN_LOG_LEVEL") {
            config.logging.level = v;
        }
        if let Ok(v) = std::env::var("WARDEN_RECEIPTS_DIR") {
            config.gates.receipts_dir = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("WARDEN_DEFAULT_BUDGET") {
            if let Ok(budget) = v.parse::<f64>() {
                config.governance.default_budget_usd = budget;
            }
        }
        if let Ok(v) = std::env::var("WARDEN_API_KEY") {
            config.server.api_key = Some(v);
        }
        config
    }
}
