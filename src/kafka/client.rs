//! Ephemeral, per-request kafka client handles.
//!
//! A handle belongs to exactly one caller and one operation. Handles are
//! never pooled: each carries the bearer token of a distinct caller, and
//! sharing one would let a request act under someone else's identity.
use crate::kafka::{
    base::KafkaGatewayError,
    credentials::{BrokerClientConfig, GatewayClientContext},
};

use std::time::Duration;

use rdkafka::{
    admin::AdminClient, consumer::StreamConsumer, error::KafkaResult,
    producer::FutureProducer,
};
use tracing::{debug, instrument};

/// Build a handle for `config`. No connection is attempted.
pub fn create_client(config: BrokerClientConfig) -> ClientHandle {
    ClientHandle { config }
}

/// A handle from which one session of a given role can be opened.
///
/// Opening a session is where librdkafka starts talking to the brokers; the
/// owning operation must hand the session to [`release`] on every exit path.
#[derive(Debug)]
pub struct ClientHandle {
    config: BrokerClientConfig,
}

impl ClientHandle {
    pub(crate) fn admin(&self) -> KafkaResult<AdminClient<GatewayClientContext>> {
        self.config
            .to_client_config()
            .create_with_context(self.config.context())
    }

    pub(crate) fn consumer(
        &self,
        group_id: &str,
    ) -> KafkaResult<StreamConsumer<GatewayClientContext>> {
        let mut client_config = self.config.to_client_config();
        client_config
            .set("group.id", group_id)
            .set("auto.offset.reset", "earliest")
            // offsets are never committed: every fetch replays from the start
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false")
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", "6000");
        client_config.create_with_context(self.config.context())
    }

    pub(crate) fn producer(
        &self,
        message_timeout: Duration,
    ) -> KafkaResult<FutureProducer<GatewayClientContext>> {
        let mut client_config = self.config.to_client_config();
        client_config
            .set("message.timeout.ms", message_timeout.as_millis().to_string())
            .set("acks", "all")
            .set("linger.ms", "0");
        client_config.create_with_context(self.config.context())
    }
}

/// Disconnect a session.
///
/// Dropping a librdkafka client blocks until its threads have shut down and,
/// for a consumer, until it has left its group, so the drop runs on the
/// blocking pool. Returns once the session is gone.
#[instrument(skip(session))]
pub(crate) async fn release<S>(session: S, role: &'static str) -> Result<(), KafkaGatewayError>
where
    S: Send + 'static,
{
    tokio::task::spawn_blocking(move || drop(session)).await?;
    debug!("session released");
    Ok(())
}
