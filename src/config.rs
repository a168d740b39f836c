use std::collections::HashMap;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::fs;
use anyhow::{Context, Result};

/// Environment variable that overrides the configured dashboard password.
pub const PASSWORD_ENV: &str = "RGPH5_DASHBOARD_PASSWORD";

/// Password used when neither the environment nor the config file sets one.
pub const DEFAULT_PASSWORD: &str = "rgph5";

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub input: InputConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    pub data_dir: PathBuf,
    pub logo: Option<PathBuf>,
    /// Forces the source CRS when the data file does not declare one.
    pub source_epsg: Option<u32>,
    /// Extra attribute aliases, keyed by lowercase source name.
    #[serde(default)]
    pub aliases: HashMap<String, String>,
}

#[derive(Deserialize, Clone)]
pub struct AuthConfig {
    pub password: Option<String>,
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,
}

// Keeps the password out of logs.
impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("session_ttl_secs", &self.session_ttl_secs)
            .finish()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            password: None,
            session_ttl_secs: default_session_ttl(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GeolocationMode {
    /// Browser rewrites the page URL with `lat`/`lon`, the server reads them back.
    #[default]
    Query,
    /// A map control locates the user entirely in the browser.
    Client,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
    #[serde(default = "default_max_upload")]
    pub max_upload_bytes: usize,
    #[serde(default)]
    pub geolocation: GeolocationMode,
    #[serde(default = "default_title")]
    pub title: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: default_static_dir(),
            max_upload_bytes: default_max_upload(),
            geolocation: GeolocationMode::default(),
            title: default_title(),
        }
    }
}

fn default_session_ttl() -> u64 {
    8 * 60 * 60
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8501
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("static")
}

fn default_max_upload() -> usize {
    10 * 1024 * 1024
}

fn default_title() -> String {
    "RGPH5 - Zones de dénombrement".to_string()
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)
            .with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }

    /// Config pointing at `data_dir` with every other setting defaulted.
    pub fn for_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            input: InputConfig {
                data_dir: data_dir.into(),
                logo: None,
                source_epsg: None,
                aliases: HashMap::new(),
            },
            auth: AuthConfig::default(),
            server: ServerConfig::default(),
        }
    }

    /// The secret the access gate compares against: environment first,
    /// then the config file, then the built-in default.
    pub fn resolve_password(&self) -> String {
        self.resolve_password_with(std::env::var(PASSWORD_ENV).ok())
    }

    fn resolve_password_with(&self, env_value: Option<String>) -> String {
        env_value
            .filter(|v| !v.is_empty())
            .or_else(|| self.auth.password.clone())
            .unwrap_or_else(|| DEFAULT_PASSWORD.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let config = AppConfig::from_toml("[input]\ndata_dir = \"data\"\n").unwrap();
        assert_eq!(config.input.data_dir, PathBuf::from("data"));
        assert_eq!(config.server.port, 8501);
        assert_eq!(config.server.geolocation, GeolocationMode::Query);
        assert_eq!(config.auth.session_ttl_secs, 8 * 60 * 60);
        assert!(config.input.aliases.is_empty());
    }

    #[test]
    fn full_config_parses() {
        let config = AppConfig::from_toml(
            r#"
            [input]
            data_dir = "zones"
            source_epsg = 32630
            [input.aliases]
            nom_se = "idse_new"

            [auth]
            password = "secret"

            [server]
            port = 9000
            geolocation = "client"
            "#,
        )
        .unwrap();
        assert_eq!(config.input.source_epsg, Some(32630));
        assert_eq!(config.input.aliases.get("nom_se").map(String::as_str), Some("idse_new"));
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.geolocation, GeolocationMode::Client);
    }

    #[test]
    fn password_priority_is_env_then_file_then_default() {
        let mut config = AppConfig::for_data_dir("data");
        assert_eq!(config.resolve_password_with(None), DEFAULT_PASSWORD);

        config.auth.password = Some("from-file".into());
        assert_eq!(config.resolve_password_with(None), "from-file");
        assert_eq!(config.resolve_password_with(Some("from-env".into())), "from-env");
        assert_eq!(config.resolve_password_with(Some(String::new())), "from-file");
    }

    #[test]
    fn debug_output_redacts_password() {
        let mut config = AppConfig::for_data_dir("data");
        config.auth.password = Some("hunter2".into());
        let printed = format!("{:?}", config.auth);
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("REDACTED"));
    }
}
