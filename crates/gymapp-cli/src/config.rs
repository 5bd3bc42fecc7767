use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use gymapp_api_client::config::MIN_TIMEOUT_MS;
use gymapp_api_client::{ApiClientConfig, AppVariant};
use gymapp_session_core::DEFAULT_ENTRY_ROUTE;

pub const ENV_SESSION_DIR: &str = "GYMAPP_SESSION_DIR";
pub const ENV_ENTRY_ROUTE: &str = "GYMAPP_ENTRY_ROUTE";

#[derive(Debug, Clone)]
pub struct CliConfig {
    pub api: ApiClientConfig,
    pub session_dir: PathBuf,
    pub entry_route: String,
    pub exchange_timeout: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub base_url: Option<String>,
    pub variant: Option<String>,
    pub session_dir: Option<PathBuf>,
}

impl CliConfig {
    /// Environment first, then flags on top.
    pub fn resolve(overrides: CliOverrides) -> anyhow::Result<Self> {
        Self::from_lookup(overrides, |key| std::env::var(key).ok())
    }

    pub fn from_lookup(
        overrides: CliOverrides,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        let env_non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let mut api =
            ApiClientConfig::from_lookup(&lookup).context("resolve api client config")?;
        if let Some(base_url) = overrides.base_url {
            api.base_url = base_url;
        }
        if let Some(raw) = overrides.variant {
            api.variant = AppVariant::parse(&raw)
                .with_context(|| format!("unknown app variant `{raw}`"))?;
        }

        let session_dir = overrides
            .session_dir
            .or_else(|| env_non_empty(ENV_SESSION_DIR).map(PathBuf::from))
            .or_else(default_session_dir)
            .context("no session directory; set GYMAPP_SESSION_DIR")?;
        let entry_route =
            env_non_empty(ENV_ENTRY_ROUTE).unwrap_or_else(|| DEFAULT_ENTRY_ROUTE.to_string());

        // The exchange shares the request timeout with every other backend call.
        let exchange_timeout = Duration::from_millis(api.timeout_ms.max(MIN_TIMEOUT_MS));

        Ok(Self {
            api,
            session_dir,
            entry_route,
            exchange_timeout,
        })
    }
}

fn default_session_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("gymapp"))
}
