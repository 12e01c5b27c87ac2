//! Turn a caller's bearer token and a connection profile into the settings
//! of a kafka client.
//!
//! Nothing here touches the network. A malformed profile is passed through
//! as is and surfaces later as a connection failure.
use crate::conf::{ConnectionProfile, SaslMechanism};

use std::error::Error;
use std::fmt;

use rdkafka::client::{ClientContext, OAuthToken};
use rdkafka::config::{ClientConfig, RDKafkaLogLevel};
use rdkafka::consumer::ConsumerContext;
use tracing::trace;

// librdkafka wants an expiry for every token. The broker decides whether the
// token is still valid; this only controls when librdkafka would ask again.
const TOKEN_LIFETIME_MS: i64 = 60 * 60 * 1000;

/// An opaque, short-lived credential proving the caller's identity.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        BearerToken(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(<redacted>)")
    }
}

/// The SASL part of a client configuration.
#[derive(Clone, PartialEq, Eq)]
pub enum SaslConfig {
    /// Hand the bearer token to the broker, unmodified.
    OAuthBearer { token: BearerToken },
    /// Static username/password for PLAIN and SCRAM.
    Credentials {
        mechanism: SaslMechanism,
        username: String,
        password: String,
    },
}

impl SaslConfig {
    pub fn mechanism(&self) -> SaslMechanism {
        match self {
            Self::OAuthBearer { .. } => SaslMechanism::OAuthBearer,
            Self::Credentials { mechanism, .. } => *mechanism,
        }
    }
}

impl fmt::Debug for SaslConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OAuthBearer { token } => f
                .debug_struct("OAuthBearer")
                .field("token", token)
                .finish(),
            Self::Credentials {
                mechanism,
                username,
                ..
            } => f
                .debug_struct("Credentials")
                .field("mechanism", mechanism)
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

/// Everything needed to build a kafka client for one caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerClientConfig {
    pub bootstrap_servers: String,
    pub use_tls: bool,
    pub client_id: String,
    pub sasl: SaslConfig,
}

/// Build the client configuration for `bearer_token` and `profile`.
///
/// For `oauthbearer` the token is the credential; for the other mechanisms
/// the profile's username/password are used (empty when unset) and the token
/// is dropped.
pub fn build_client_config(bearer_token: &str, profile: &ConnectionProfile) -> BrokerClientConfig {
    let sasl = match profile.auth_mechanism {
        SaslMechanism::OAuthBearer => SaslConfig::OAuthBearer {
            token: BearerToken::new(bearer_token),
        },
        mechanism @ (SaslMechanism::Plain
        | SaslMechanism::ScramSha256
        | SaslMechanism::ScramSha512) => SaslConfig::Credentials {
            mechanism,
            username: profile.username.clone().unwrap_or_default(),
            password: profile.password.clone().unwrap_or_default(),
        },
    };
    BrokerClientConfig {
        bootstrap_servers: profile.bootstrap_servers(),
        use_tls: profile.use_tls,
        client_id: profile.client_id.clone(),
        sasl,
    }
}

impl BrokerClientConfig {
    pub fn security_protocol(&self) -> &'static str {
        if self.use_tls {
            "SASL_SSL"
        } else {
            "SASL_PLAINTEXT"
        }
    }

    /// The librdkafka properties shared by every session role.
    pub fn to_client_config(&self) -> ClientConfig {
        let mut client_config = ClientConfig::new();
        client_config
            // Uncomment the following to get logs from kafka (RUST_LOG doesn't work):
            // .set("debug", "broker,security")
            .set("bootstrap.servers", &self.bootstrap_servers)
            .set("client.id", &self.client_id)
            .set("security.protocol", self.security_protocol())
            .set("sasl.mechanisms", self.sasl.mechanism().librdkafka_name())
            .set_log_level(RDKafkaLogLevel::Error);

        if let SaslConfig::Credentials {
            username, password, ..
        } = &self.sasl
        {
            client_config
                .set("sasl.username", username)
                .set("sasl.password", password);
        }
        client_config
    }

    /// The client context handing the bearer token to librdkafka.
    pub fn context(&self) -> GatewayClientContext {
        let token = match &self.sasl {
            SaslConfig::OAuthBearer { token } => Some(token.clone()),
            SaslConfig::Credentials { .. } => None,
        };
        GatewayClientContext {
            token,
            principal_name: self.client_id.clone(),
        }
    }
}

/// Client context shared by the admin, consumer and producer roles.
///
/// Its token provider is one-shot: it always returns the token it was built
/// with and never fetches or refreshes one itself.
pub struct GatewayClientContext {
    token: Option<BearerToken>,
    principal_name: String,
}

impl ClientContext for GatewayClientContext {
    const ENABLE_REFRESH_OAUTH_TOKEN: bool = true;

    fn generate_oauth_token(
        &self,
        _oauthbearer_config: Option<&str>,
    ) -> Result<OAuthToken, Box<dyn Error>> {
        let token = self
            .token
            .as_ref()
            .ok_or("no bearer token configured for OAUTHBEARER")?;
        trace!(principal = %self.principal_name, "handing bearer token to librdkafka");
        Ok(OAuthToken {
            token: token.as_str().to_string(),
            principal_name: self.principal_name.clone(),
            lifetime_ms: chrono::Utc::now().timestamp_millis() + TOKEN_LIFETIME_MS,
        })
    }
}

impl ConsumerContext for GatewayClientContext {}
