use std::net::SocketAddr;

use clap::Parser;
use serde::Deserialize;

#[derive(Parser, Debug)]
#[command(name = "spendtrack", about = "Spendtrack - personal expense tracking service")]
pub struct CliArgs {
    /// Path to config file
    #[arg(short, long, default_value = "spendtrack.toml")]
    pub config: String,

    /// Port to listen on (overrides config file)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Log level (overrides config file)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Directory holding the per-year database files (overrides config file)
    #[arg(short, long)]
    pub data_dir: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_server")]
    pub server: ServerConfig,

    #[serde(default = "default_logging")]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default = "default_storage")]
    pub storage: StorageConfig,

    #[serde(default)]
    pub currency: CurrencyConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AuthConfig {
    /// When true, all API endpoints (except /health and /metrics) require authentication.
    #[serde(default)]
    pub enabled: bool,

    /// Static API keys. Each key has a name (for audit) and a role.
    #[serde(default)]
    pub api_keys: Vec<ApiKeyEntry>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiKeyEntry {
    pub name: String,
    pub key: String,
    #[serde(default = "default_role")]
    pub role: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// "sqlite" (one database file per year under `data_dir`) or "memory".
    #[serde(default = "default_backend")]
    pub backend: String,

    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CurrencyConfig {
    /// exchangerate-api.com key. Without one the service either refuses to
    /// start or, with `bypass_on_missing_key`, skips conversion entirely.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_base_currency")]
    pub base_currency: String,

    #[serde(default = "default_currency_endpoint")]
    pub endpoint: String,

    #[serde(default)]
    pub bypass_on_missing_key: bool,
}

fn default_role() -> String {
    "reader".to_string()
}

fn default_server() -> ServerConfig {
    ServerConfig {
        host: default_host(),
        port: default_port(),
    }
}

fn default_logging() -> LoggingConfig {
    LoggingConfig {
        level: default_log_level(),
        json: false,
    }
}

fn default_storage() -> StorageConfig {
    StorageConfig {
        backend: default_backend(),
        data_dir: default_data_dir(),
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_backend() -> String {
    "sqlite".to_string()
}

fn default_data_dir() -> String {
    ".".to_string()
}

fn default_base_currency() -> String {
    "SGD".to_string()
}

fn default_currency_endpoint() -> String {
    "https://v6.exchangerate-api.com/v6".to_string()
}

impl Default for CurrencyConfig {
    fn default() -> Self {
        CurrencyConfig {
            api_key: None,
            base_currency: default_base_currency(),
            endpoint: default_currency_endpoint(),
            bypass_on_missing_key: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: default_server(),
            logging: default_logging(),
            auth: AuthConfig::default(),
            storage: default_storage(),
            currency: CurrencyConfig::default(),
        }
    }
}

impl Config {
    pub fn load(cli: &CliArgs) -> Self {
        let mut config = match std::fs::read_to_string(&cli.config) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                eprintln!("Warning: Failed to parse config file: {}", e);
                Config::default()
            }),
            Err(_) => Config::default(),
        };

        // CLI overrides
        if let Some(port) = cli.port {
            config.server.port = port;
        }
        if let Some(ref level) = cli.log_level {
            config.logging.level = level.clone();
        }
        if let Some(ref dir) = cli.data_dir {
            config.storage.data_dir = dir.clone();
        }

        config
    }

    pub fn listen_addr(&self) -> SocketAddr {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .expect("Invalid listen address")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_gets_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.storage.backend, "sqlite");
        assert_eq!(config.currency.base_currency, "SGD");
        assert!(!config.currency.bypass_on_missing_key);
        assert!(!config.auth.enabled);
    }

    #[test]
    fn partial_sections_fill_in() {
        let config: Config = toml::from_str(
            r#"
            [storage]
            backend = "memory"

            [currency]
            api_key = "k-123"
            base_currency = "EUR"
            "#,
        )
        .unwrap();
        assert_eq!(config.storage.backend, "memory");
        assert_eq!(config.storage.data_dir, ".");
        assert_eq!(config.currency.api_key.as_deref(), Some("k-123"));
        assert_eq!(config.currency.base_currency, "EUR");
        assert_eq!(config.currency.endpoint, "https://v6.exchangerate-api.com/v6");
    }

    #[test]
    fn api_key_role_defaults_to_reader() {
        let config: Config = toml::from_str(
            r#"
            [auth]
            enabled = true

            [[auth.api_keys]]
            name = "dashboard"
            key = "secret"
            "#,
        )
        .unwrap();
        assert_eq!(config.auth.api_keys[0].role, "reader");
    }
}
