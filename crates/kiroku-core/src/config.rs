use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use directories::ProjectDirs;
use kiroku_api::{ApiClient, AuthContext, ClientIdentity, ReqwestTransport};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::KirokuError;

const DEFAULT_CONFIG: &str = include_str!("../../../config/default.toml");

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub client: ClientConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub page_size: Option<u32>,
    pub cursor_param: String,
    pub limit_param: String,
    /// Prefix for the `Authorization` value, e.g. `Bearer`.
    pub auth_scheme: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub app_name: String,
    pub bundle_id: String,
    pub build: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive.
    pub filter: String,
}

impl AppConfig {
    /// Load config: user file (if exists) merged over built-in defaults.
    pub fn load() -> Result<Self, KirokuError> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self, KirokuError> {
        let mut merged = parse_table(DEFAULT_CONFIG)?;
        if path.exists() {
            let user_str = std::fs::read_to_string(path)?;
            merge_tables(&mut merged, parse_table(&user_str)?);
        }
        toml::Value::Table(merged)
            .try_into()
            .map_err(|e: toml::de::Error| KirokuError::Config(e.to_string()))
    }

    /// Save current config to the user config file.
    pub fn save(&self) -> Result<(), KirokuError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), KirokuError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| KirokuError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Path to user config file (XDG on Linux, AppData on Windows).
    pub fn config_path() -> PathBuf {
        ProjectDirs::from("app", "", "kiroku")
            .map(|d| d.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    pub fn base_url(&self) -> Result<Url, KirokuError> {
        let url = Url::parse(&self.api.base_url)
            .map_err(|e| KirokuError::Config(format!("invalid base_url `{}`: {e}", self.api.base_url)))?;
        if url.cannot_be_a_base() {
            return Err(KirokuError::Config(format!(
                "base_url `{}` cannot carry a path",
                self.api.base_url
            )));
        }
        Ok(url)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    pub fn identity(&self) -> ClientIdentity {
        ClientIdentity {
            app_name: self.client.app_name.clone(),
            bundle_id: self.client.bundle_id.clone(),
            build: self.client.build.clone(),
            ..ClientIdentity::default()
        }
    }

    /// Build the shared HTTP client described by this config.
    pub fn api_client(&self, auth: AuthContext) -> Result<Arc<ApiClient<ReqwestTransport>>, KirokuError> {
        let transport = ReqwestTransport::new(self.timeout())
            .map_err(|e| KirokuError::Transport(e.to_string()))?;
        let mut client =
            ApiClient::new(self.base_url()?, transport, auth).with_identity(self.identity());
        if let Some(scheme) = &self.api.auth_scheme {
            client = client.with_auth_scheme(scheme.clone());
        }
        Ok(Arc::new(client))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("built-in default config is valid TOML")
    }
}

fn parse_table(source: &str) -> Result<toml::Table, KirokuError> {
    source
        .parse::<toml::Table>()
        .map_err(|e| KirokuError::Config(e.to_string()))
}

/// Overlay `user` onto `base`, descending into nested tables.
fn merge_tables(base: &mut toml::Table, user: toml::Table) {
    for (key, value) in user {
        if let toml::Value::Table(incoming) = value {
            if let Some(toml::Value::Table(existing)) = base.get_mut(&key) {
                merge_tables(existing, incoming);
                continue;
            }
            base.insert(key, toml::Value::Table(incoming));
        } else {
            base.insert(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_parses() {
        let config = AppConfig::default();
        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(config.api.page_size, Some(25));
        assert_eq!(config.api.cursor_param, "cursor");
        assert_eq!(config.api.auth_scheme, None);
        assert_eq!(config.logging.filter, "kiroku=info");
        assert!(config.base_url().is_ok());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.api.base_url, AppConfig::default().api.base_url);
    }

    #[test]
    fn test_partial_user_file_merges_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[api]\nbase_url = \"http://localhost:8080/api/\"\n\n[logging]\nfilter = \"kiroku=debug\"\n",
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.api.base_url, "http://localhost:8080/api/");
        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(config.client.app_name, "Kiroku");
        assert_eq!(config.logging.filter, "kiroku=debug");
    }

    #[test]
    fn test_auth_scheme_is_opt_in() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[api]\nauth_scheme = \"Bearer\"\n").unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.api.auth_scheme.as_deref(), Some("Bearer"));
        assert_eq!(config.api.cursor_param, "cursor");
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = AppConfig::default();
        config.api.page_size = Some(50);
        config.client.build = "417".into();
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.api.page_size, Some(50));
        assert_eq!(loaded.client.build, "417");
    }

    #[test]
    fn test_invalid_user_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[api]\ntimeout_secs = \"soon\"\n").unwrap();

        assert!(matches!(
            AppConfig::load_from(&path),
            Err(KirokuError::Config(_))
        ));
    }

    #[test]
    fn test_rejects_non_base_url() {
        let mut config = AppConfig::default();
        config.api.base_url = "mailto:someone@example.com".into();
        assert!(matches!(config.base_url(), Err(KirokuError::Config(_))));

        config.api.base_url = "not a url".into();
        assert!(matches!(config.base_url(), Err(KirokuError::Config(_))));
    }

    #[test]
    fn test_identity_from_config() {
        let mut config = AppConfig::default();
        config.client.build = "99".into();
        let ua = config.identity().user_agent("reqwest/0.12");
        assert!(ua.starts_with("Kiroku/"));
        assert!(ua.contains("(app.kiroku; build:99; "));
    }
}
