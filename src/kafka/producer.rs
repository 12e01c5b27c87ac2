//! Publishing a single message.
use crate::{
    conf::ConnectionProfile,
    kafka::{
        base::KafkaGatewayError,
        client::{create_client, release},
        credentials::build_client_config,
    },
    utils::o11y::logging::as_error,
};

use std::collections::BTreeMap;
use std::time::Duration;

use rdkafka::{
    message::{Header, OwnedHeaders},
    producer::FutureRecord,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

/// A message to publish.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProduceRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default)]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<i32>,
}

/// Where the broker put a published message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProduceResult {
    pub topic: String,
    pub partition: i32,
    pub offset: String,
    pub timestamp: String,
}

fn validate(topic: &str, request: &ProduceRequest) -> Result<(), KafkaGatewayError> {
    if topic.trim().is_empty() {
        return Err(KafkaGatewayError::Validation(
            "Topic name is required".to_string(),
        ));
    }
    if request.value.is_empty() {
        return Err(KafkaGatewayError::Validation(
            "Message value is required".to_string(),
        ));
    }
    Ok(())
}

fn build_record<'a>(topic: &'a str, request: &'a ProduceRequest) -> FutureRecord<'a, str, str> {
    let mut record = FutureRecord::to(topic).payload(request.value.as_str());
    if let Some(key) = request.key.as_deref() {
        record = record.key(key);
    }
    if let Some(partition) = request.partition {
        record = record.partition(partition);
    }
    if let Some(headers) = request.headers.as_ref().filter(|headers| !headers.is_empty()) {
        let owned_headers = headers.iter().fold(
            OwnedHeaders::new_with_capacity(headers.len()),
            |owned_headers, (key, value)| {
                owned_headers.insert(Header {
                    key: key.as_str(),
                    value: Some(value.as_str()),
                })
            },
        );
        record = record.headers(owned_headers);
    }
    record
}

/// Publish one message to `topic` and report where it landed.
///
/// An empty value is rejected before any client is built. Delivery is
/// bounded by `timeout` (librdkafka's `message.timeout.ms`). The producer is
/// disconnected on every path once the delivery report is in.
#[instrument(
    skip_all,
    fields(kafka.topic = %topic, kafka.partition = ?request.partition),
    err
)]
pub async fn produce_message(
    bearer_token: &str,
    topic: &str,
    request: &ProduceRequest,
    profile: &ConnectionProfile,
    timeout: Duration,
) -> Result<ProduceResult, KafkaGatewayError> {
    validate(topic, request)?;

    let handle = create_client(build_client_config(bearer_token, profile));
    let producer = handle
        .producer(timeout)
        .inspect_err(as_error!("failed to create producer"))?;

    let delivered = producer
        .send(build_record(topic, request), timeout)
        .await
        .map_err(|(error, _message)| KafkaGatewayError::from(error));

    let released = release(producer, "producer").await;
    let (partition, offset) = delivered.inspect_err(as_error!("failed to deliver message"))?;
    released?;

    info!(
        kafka.partition = partition,
        kafka.offset = offset,
        "message delivered"
    );
    Ok(ProduceResult {
        topic: topic.to_string(),
        partition,
        // i64 offsets go out as strings so no JSON reader rounds them
        offset: offset.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use rdkafka::message::Headers;

    fn request(value: &str) -> ProduceRequest {
        ProduceRequest {
            value: value.to_string(),
            ..ProduceRequest::default()
        }
    }

    #[test]
    fn explicit_partition_is_set_on_the_record() {
        let request = ProduceRequest {
            key: Some("order-1".to_string()),
            partition: Some(2),
            ..request("payload")
        };
        let record = build_record("orders", &request);
        assert_eq!(record.topic, "orders");
        assert_eq!(record.partition, Some(2));
        assert_eq!(record.key, Some("order-1"));
        assert_eq!(record.payload, Some("payload"));
        assert!(record.headers.is_none());
    }

    #[test]
    fn unpinned_record_leaves_partitioning_to_librdkafka() {
        let request = request("payload");
        let record = build_record("orders", &request);
        assert_eq!(record.partition, None);
        assert_eq!(record.key, None);
    }

    #[test]
    fn headers_are_attached() {
        let mut headers = BTreeMap::new();
        headers.insert("source".to_string(), "web".to_string());
        headers.insert("trace-id".to_string(), "abc".to_string());
        let request = ProduceRequest {
            headers: Some(headers),
            ..request("payload")
        };
        let record = build_record("orders", &request);
        let headers = record.headers.unwrap();
        assert_eq!(headers.count(), 2);
        let first = headers.get(0);
        assert_eq!(first.key, "source");
        assert_eq!(first.value, Some(&b"web"[..]));
    }

    #[test]
    fn request_wire_form() {
        let request: ProduceRequest = serde_json::from_str(
            r#"{"key": "k", "value": "v", "headers": {"h": "1"}, "partition": 2}"#,
        )
        .unwrap();
        assert_eq!(request.key.as_deref(), Some("k"));
        assert_eq!(request.value, "v");
        assert_eq!(request.partition, Some(2));
        assert_eq!(request.headers.unwrap()["h"], "1");
    }

    #[tokio::test]
    async fn empty_value_is_rejected_before_connecting() {
        let profile = ConnectionProfile {
            bootstrap_addresses: vec!["127.0.0.1:1".to_string()],
            ..ConnectionProfile::default()
        };
        let started = std::time::Instant::now();
        let result =
            produce_message("token", "orders", &request(""), &profile, Duration::from_secs(30))
                .await;
        assert!(matches!(result, Err(KafkaGatewayError::Validation(_))));
        assert!(started.elapsed() < Duration::from_secs(1));

        let result =
            produce_message("token", " ", &request("v"), &profile, Duration::from_secs(30)).await;
        assert!(matches!(result, Err(KafkaGatewayError::Validation(_))));
    }

    #[tokio::test]
    async fn undeliverable_message_is_a_connection_error() {
        let profile = ConnectionProfile {
            bootstrap_addresses: vec!["127.0.0.1:1".to_string()],
            ..ConnectionProfile::default()
        };
        let started = std::time::Instant::now();
        let result =
            produce_message("token", "orders", &request("v"), &profile, Duration::from_secs(1))
                .await;
        // librdkafka gives up after message.timeout.ms and the delivery
        // failure comes back through send()
        assert!(matches!(result, Err(KafkaGatewayError::Connection(_))));
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
