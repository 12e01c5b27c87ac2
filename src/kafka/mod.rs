//! The bridge between a caller's bearer token and the kafka cluster.
//!
//! Every operation builds its own client from the caller's token and the
//! connection profile, performs one action and disconnects. Nothing is
//! shared between calls except the read-only defaults held by
//! [`KafkaGateway`].
mod admin;
mod base;
mod client;
mod consumer;
mod credentials;
mod producer;

pub use admin::{list_topics, probe_connection, ClusterSummary, ProbeResult};
pub use base::{
    ErrorKind, KafkaGatewayError, ADMIN_TIMEOUT, DEFAULT_FETCH_LIMIT, FETCH_DEADLINE,
    PRODUCE_TIMEOUT,
};
pub use client::{create_client, ClientHandle};
pub use consumer::{
    collect_bounded, fetch_messages, ConsumedMessage, FetchOutcome, HeaderEntry, HeaderValue,
};
pub use credentials::{
    build_client_config, BearerToken, BrokerClientConfig, GatewayClientContext, SaslConfig,
};
pub use producer::{produce_message, ProduceRequest, ProduceResult};

use crate::conf::{ConnectionProfile, KafkaConfig};

use std::time::Duration;

/// Startup defaults shared, read-only, by all operations.
///
/// A caller may pass its own profile to any operation; otherwise the default
/// profile is used.
#[derive(Debug, Clone)]
pub struct KafkaGateway {
    default_profile: ConnectionProfile,
    admin_timeout: Duration,
    produce_timeout: Duration,
    fetch_deadline: Duration,
}

impl Default for KafkaGateway {
    fn default() -> Self {
        KafkaGateway {
            default_profile: ConnectionProfile::default(),
            admin_timeout: ADMIN_TIMEOUT,
            produce_timeout: PRODUCE_TIMEOUT,
            fetch_deadline: FETCH_DEADLINE,
        }
    }
}

impl KafkaGateway {
    pub fn new(config: &KafkaConfig) -> Self {
        KafkaGateway {
            default_profile: config.default_profile(),
            admin_timeout: config.admin_timeout(),
            produce_timeout: config.produce_timeout(),
            fetch_deadline: config.fetch_deadline(),
        }
    }

    pub fn with_admin_timeout(mut self, admin_timeout: Duration) -> Self {
        self.admin_timeout = admin_timeout;
        self
    }

    pub fn default_profile(&self) -> &ConnectionProfile {
        &self.default_profile
    }

    pub fn fetch_deadline(&self) -> Duration {
        self.fetch_deadline
    }

    fn resolve<'a>(&'a self, profile: Option<&'a ConnectionProfile>) -> &'a ConnectionProfile {
        profile.unwrap_or(&self.default_profile)
    }

    pub async fn list_topics(
        &self,
        bearer_token: &str,
        profile: Option<&ConnectionProfile>,
    ) -> Result<Vec<String>, KafkaGatewayError> {
        list_topics(bearer_token, self.resolve(profile), self.admin_timeout).await
    }

    pub async fn fetch_messages(
        &self,
        bearer_token: &str,
        topic: &str,
        max_messages: usize,
        profile: Option<&ConnectionProfile>,
    ) -> Result<Vec<ConsumedMessage>, KafkaGatewayError> {
        fetch_messages(
            bearer_token,
            topic,
            max_messages,
            self.resolve(profile),
            self.fetch_deadline,
        )
        .await
    }

    pub async fn probe_connection(
        &self,
        bearer_token: &str,
        profile: &ConnectionProfile,
    ) -> ProbeResult {
        probe_connection(bearer_token, profile, self.admin_timeout).await
    }

    pub async fn produce_message(
        &self,
        bearer_token: &str,
        topic: &str,
        request: &ProduceRequest,
        profile: Option<&ConnectionProfile>,
    ) -> Result<ProduceResult, KafkaGatewayError> {
        produce_message(
            bearer_token,
            topic,
            request,
            self.resolve(profile),
            self.produce_timeout,
        )
        .await
    }
}
