use crate::kafka::{ADMIN_TIMEOUT, DEFAULT_FETCH_LIMIT, FETCH_DEADLINE, PRODUCE_TIMEOUT};

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
pub const DEFAULT_BOOTSTRAP_SERVERS: &str = "localhost:19092";
pub const DEFAULT_CLIENT_ID: &str = "knep-demo-client";

#[derive(thiserror::Error, Debug)]
pub enum KnepConfigError {
    #[error("failed to load config")]
    InvalidConfigError(#[from] config::ConfigError),
    #[error("could not find config file {0}")]
    ConfigFileNotFound(String),
    #[error("unknown SASL mechanism '{0}'")]
    UnknownSaslMechanism(String),
    #[error("invalid connection profile")]
    InvalidProfile(#[from] serde_json::Error),
    #[error("a connection profile is required")]
    MissingProfile,
}

/// Loads environment variables from a .env file if it exists.
///
/// Looks in the current directory first, then in the parent directory. When
/// neither exists the process environment is used as is.
pub fn load_dotenv() {
    if Path::new(".env").exists() {
        match dotenvy::dotenv() {
            Ok(_) => info!("Loaded environment variables from .env file"),
            Err(e) => warn!("Found .env file but failed to load it: {}", e),
        }
        return;
    }

    if Path::new("../.env").exists() {
        match dotenvy::from_path("../.env") {
            Ok(_) => info!("Loaded environment variables from ../.env file"),
            Err(e) => warn!("Found ../.env file but failed to load it: {}", e),
        }
        return;
    }

    debug!("No .env file found, using system environment variables only");
}

/// SASL mechanism used to authenticate against the brokers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SaslMechanism {
    #[default]
    #[serde(rename = "oauthbearer")]
    OAuthBearer,
    #[serde(rename = "plain")]
    Plain,
    #[serde(rename = "scram-sha-256")]
    ScramSha256,
    #[serde(rename = "scram-sha-512")]
    ScramSha512,
}

impl SaslMechanism {
    /// The wire name, as accepted in a connection profile.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OAuthBearer => "oauthbearer",
            Self::Plain => "plain",
            Self::ScramSha256 => "scram-sha-256",
            Self::ScramSha512 => "scram-sha-512",
        }
    }

    /// The value librdkafka expects for `sasl.mechanisms`.
    pub fn librdkafka_name(&self) -> &'static str {
        match self {
            Self::OAuthBearer => "OAUTHBEARER",
            Self::Plain => "PLAIN",
            Self::ScramSha256 => "SCRAM-SHA-256",
            Self::ScramSha512 => "SCRAM-SHA-512",
        }
    }
}

impl fmt::Display for SaslMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SaslMechanism {
    type Err = KnepConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "oauthbearer" => Ok(Self::OAuthBearer),
            "plain" => Ok(Self::Plain),
            "scram-sha-256" => Ok(Self::ScramSha256),
            "scram-sha-512" => Ok(Self::ScramSha512),
            _ => Err(KnepConfigError::UnknownSaslMechanism(s.to_string())),
        }
    }
}

/// Where and how to connect to the kafka cluster.
///
/// With `OAuthBearer` the caller's bearer token is the credential and
/// `username`/`password` are ignored. With any other mechanism the
/// username/password pair is the credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionProfile {
    pub bootstrap_addresses: Vec<String>,
    pub use_tls: bool,
    pub auth_mechanism: SaslMechanism,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for ConnectionProfile {
    fn default() -> Self {
        ConnectionProfile {
            bootstrap_addresses: split_bootstrap_servers(DEFAULT_BOOTSTRAP_SERVERS),
            use_tls: false,
            auth_mechanism: SaslMechanism::OAuthBearer,
            client_id: DEFAULT_CLIENT_ID.to_string(),
            username: None,
            password: None,
        }
    }
}

impl ConnectionProfile {
    /// The bootstrap addresses as librdkafka's comma-separated list.
    pub fn bootstrap_servers(&self) -> String {
        self.bootstrap_addresses.join(",")
    }
}

pub fn split_bootstrap_servers(servers: &str) -> Vec<String> {
    servers
        .split(',')
        .map(str::trim)
        .filter(|address| !address.is_empty())
        .map(str::to_string)
        .collect()
}

/// A partial connection profile, as sent by a caller or read from the config
/// file. Every field that is set replaces the corresponding field of the
/// profile it is merged over.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileOverrides {
    #[serde(default, alias = "bootstrap_servers", skip_serializing_if = "Option::is_none")]
    pub bootstrap_servers: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl: Option<bool>,
    #[serde(default, alias = "sasl_mechanism", skip_serializing_if = "Option::is_none")]
    pub sasl_mechanism: Option<SaslMechanism>,
    #[serde(default, alias = "client_id", skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl ProfileOverrides {
    /// Parse the JSON form of a profile.
    pub fn from_json(json: &str) -> Result<Self, KnepConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn merge_over(&self, base: &ConnectionProfile) -> ConnectionProfile {
        ConnectionProfile {
            bootstrap_addresses: self
                .bootstrap_servers
                .as_deref()
                .map(split_bootstrap_servers)
                .unwrap_or_else(|| base.bootstrap_addresses.clone()),
            use_tls: self.ssl.unwrap_or(base.use_tls),
            auth_mechanism: self.sasl_mechanism.unwrap_or(base.auth_mechanism),
            client_id: self
                .client_id
                .clone()
                .unwrap_or_else(|| base.client_id.clone()),
            username: self.username.clone().or_else(|| base.username.clone()),
            password: self.password.clone().or_else(|| base.password.clone()),
        }
    }
}

fn default_admin_timeout_ms() -> u64 {
    ADMIN_TIMEOUT.as_millis() as u64
}

fn default_produce_timeout_ms() -> u64 {
    PRODUCE_TIMEOUT.as_millis() as u64
}

fn default_fetch_deadline_ms() -> u64 {
    FETCH_DEADLINE.as_millis() as u64
}

fn default_fetch_limit() -> usize {
    DEFAULT_FETCH_LIMIT
}

#[derive(Debug, Clone, Deserialize)]
pub struct KafkaConfig {
    #[serde(default)]
    pub profile: ProfileOverrides,
    #[serde(default = "default_admin_timeout_ms")]
    pub admin_timeout_ms: u64,
    #[serde(default = "default_produce_timeout_ms")]
    pub produce_timeout_ms: u64,
    #[serde(default = "default_fetch_deadline_ms")]
    pub fetch_deadline_ms: u64,
    #[serde(default = "default_fetch_limit")]
    pub default_fetch_limit: usize,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        KafkaConfig {
            profile: ProfileOverrides::default(),
            admin_timeout_ms: default_admin_timeout_ms(),
            produce_timeout_ms: default_produce_timeout_ms(),
            fetch_deadline_ms: default_fetch_deadline_ms(),
            default_fetch_limit: default_fetch_limit(),
        }
    }
}

impl KafkaConfig {
    /// The process-wide default profile: the configured overrides merged over
    /// the built-in defaults.
    pub fn default_profile(&self) -> ConnectionProfile {
        self.profile.merge_over(&ConnectionProfile::default())
    }

    pub fn admin_timeout(&self) -> Duration {
        Duration::from_millis(self.admin_timeout_ms)
    }

    pub fn produce_timeout(&self) -> Duration {
        Duration::from_millis(self.produce_timeout_ms)
    }

    pub fn fetch_deadline(&self) -> Duration {
        Duration::from_millis(self.fetch_deadline_ms)
    }
}

fn default_service_name() -> String {
    "KNEP Demo Client API".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,
    #[serde(default = "default_environment")]
    pub environment: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            name: default_service_name(),
            environment: default_environment(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub kafka: KafkaConfig,
    #[serde(default)]
    pub service: ServiceConfig,
}

impl AppConfig {
    /// Load `config.yaml` from the working directory if present.
    pub fn from_default_path() -> Result<Self, KnepConfigError> {
        load_config(None)
    }

    /// Load the file at `config_path`, which must exist.
    pub fn from_path(config_path: &Path) -> Result<Self, KnepConfigError> {
        let path = config_path.to_str().ok_or_else(|| {
            KnepConfigError::ConfigFileNotFound(config_path.display().to_string())
        })?;
        load_config(Some(path))
    }
}

/// Load the application config.
///
/// Sources, lowest precedence first: the YAML file, `KNEP__`-prefixed
/// environment variables (`KNEP__KAFKA__ADMIN_TIMEOUT_MS`), and finally
/// `KAFKA_BOOTSTRAP` for the default bootstrap servers. An explicit path must
/// exist; the default path is optional.
#[instrument(err)]
pub fn load_config(config_path: Option<&str>) -> Result<AppConfig, KnepConfigError> {
    let file = match config_path {
        Some(path) => {
            if !Path::new(path).exists() {
                return Err(KnepConfigError::ConfigFileNotFound(path.to_string()));
            }
            File::with_name(path).required(true)
        }
        None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
    };

    let config = Config::builder()
        .add_source(file)
        .add_source(
            Environment::with_prefix("KNEP")
                .separator("__")
                .try_parsing(true),
        )
        .set_override_option(
            "kafka.profile.bootstrap_servers",
            std::env::var("KAFKA_BOOTSTRAP").ok(),
        )?
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;
    debug!(
        kafka.bootstrap = %app_config.kafka.default_profile().bootstrap_servers(),
        "loaded config"
    );
    Ok(app_config)
}
