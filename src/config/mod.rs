//! Application configuration
//!
//! Loaded once before boot and read-only afterwards. Everything has a default
//! so an empty JSON object is a valid configuration.

use crate::error::{Result, TrellisError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::Path;
use strum_macros::{Display, EnumString};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub max_connections: Option<usize>,
    pub certificate: Option<Certificate>,
    pub views: Option<ViewsConfig>,
    pub routes: RoutesConfig,
    /// Drive the lifecycle automatically (`true`) or stage by stage.
    pub auto: bool,
    pub environment: Environment,
    /// Filter substituted for `false` policy entries, as `"Name"` or `"Name.action"`.
    pub security_filter: Option<String>,
    pub hooks: HooksConfig,
    pub http: HttpConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 1337,
            max_connections: None,
            certificate: None,
            views: None,
            routes: RoutesConfig::default(),
            auto: true,
            environment: Environment::Development,
            security_filter: None,
            hooks: HooksConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Certificate {
    pub cert_path: String,
    pub key_path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewsConfig {
    pub path: Option<String>,
    pub engine: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutesConfig {
    pub handlers: ShortcutHandlers,
    pub rest: Option<RouteTemplate>,
    pub crud: Option<RouteTemplate>,
    /// Sort routes by url, descending, before mounting.
    pub sort: bool,
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            handlers: ShortcutHandlers::default(),
            rest: None,
            crud: None,
            sort: true,
        }
    }
}

/// Default handler paths for the `view` and `redirect` route shortcuts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShortcutHandlers {
    pub view: Option<String>,
    pub redirect: Option<String>,
}

/// Template used to synthesize routes for every registered model.
///
/// `actions` maps an action name to a `"<method> <url>"` pattern where
/// `{model}` is replaced by the normalized model name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteTemplate {
    pub controller: String,
    pub actions: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HooksConfig {
    pub timeout_ms: Option<u64>,
    /// Abort boot when a hook fails instead of continuing with the next stage.
    pub abort_on_error: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub log_requests: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { log_requests: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Environment {
    Development,
    Test,
    Staging,
    Production,
}

impl Environment {
    /// Production-like environments fail closed on policy errors.
    pub fn is_production_like(&self) -> bool {
        matches!(self, Environment::Staging | Environment::Production)
    }
}

impl AppConfig {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: AppConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        tracing::debug!("Configuration read from {}", path.display());
        Self::from_json_str(&raw)
    }

    /// Override `host`, `port` and `environment` from `HOST`, `PORT` and `APP_ENV`.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(host) = env::var("HOST") {
            self.host = host;
        }
        if let Ok(port) = env::var("PORT") {
            self.port = port
                .parse()
                .map_err(|_| TrellisError::invalid_config(format!("PORT '{}' is not a port", port)))?;
        }
        if let Ok(name) = env::var("APP_ENV") {
            self.environment = name.parse().map_err(|_| {
                TrellisError::invalid_config(format!("APP_ENV '{}' is not an environment", name))
            })?;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_connections == Some(0) {
            return Err(TrellisError::invalid_config("max_connections must be positive"));
        }
        let templates = [("rest", &self.routes.rest), ("crud", &self.routes.crud)];
        for (kind, template) in templates {
            let Some(template) = template else { continue };
            for (action, pattern) in &template.actions {
                if pattern.split_whitespace().last().is_none_or(|url| !url.starts_with('/')) {
                    return Err(TrellisError::invalid_config(format!(
                        "{} template action '{}' has no url: '{}'",
                        kind, action, pattern
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn hook_timeout(&self) -> Option<std::time::Duration> {
        self.hooks.timeout_ms.map(std::time::Duration::from_millis)
    }
}
