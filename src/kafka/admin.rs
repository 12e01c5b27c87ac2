//! Administrative operations: listing topics and probing a cluster.
use crate::{
    conf::ConnectionProfile,
    kafka::{
        base::KafkaGatewayError,
        client::{create_client, release},
        credentials::build_client_config,
    },
    utils::o11y::logging::{as_error, as_warning},
};

use std::time::Duration;

use rdkafka::metadata::Metadata;
use serde::Serialize;
use tracing::{debug, info, instrument};

/// Open an administrative session, run `extract` over the cluster metadata
/// and disconnect.
///
/// The metadata request blocks, so it runs on the blocking pool together with
/// the session; the session is released whether or not the request worked.
async fn with_cluster_metadata<T, F>(
    bearer_token: &str,
    profile: &ConnectionProfile,
    timeout: Duration,
    extract: F,
) -> Result<T, KafkaGatewayError>
where
    T: Send + 'static,
    F: FnOnce(&Metadata) -> T + Send + 'static,
{
    let handle = create_client(build_client_config(bearer_token, profile));
    let admin = handle
        .admin()
        .inspect_err(as_error!("failed to create admin client"))?;

    let (admin, result) = tokio::task::spawn_blocking(move || {
        let result = admin
            .inner()
            .fetch_metadata(None, timeout)
            .map(|metadata| extract(&metadata));
        (admin, result)
    })
    .await?;

    let released = release(admin, "admin").await;
    let value = result?;
    released?;
    Ok(value)
}

/// List the names of the topics visible to the caller, sorted.
#[instrument(skip_all, fields(kafka.bootstrap = %profile.bootstrap_servers()), err)]
pub async fn list_topics(
    bearer_token: &str,
    profile: &ConnectionProfile,
    timeout: Duration,
) -> Result<Vec<String>, KafkaGatewayError> {
    let topics = with_cluster_metadata(bearer_token, profile, timeout, topic_names)
        .await
        .inspect_err(as_error!("failed to list topics"))?;
    info!(count = topics.len(), "listed topics");
    Ok(topics)
}

fn topic_names(metadata: &Metadata) -> Vec<String> {
    let mut names: Vec<String> = metadata
        .topics()
        .iter()
        .map(|topic| topic.name().to_string())
        .collect();
    names.sort();
    names
}

/// What the cluster looked like when probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterSummary {
    pub broker_count: usize,
    pub topic_count: usize,
}

fn summarize(metadata: &Metadata) -> ClusterSummary {
    ClusterSummary {
        broker_count: metadata.brokers().len(),
        topic_count: metadata.topics().len(),
    }
}

/// Outcome of a connection probe. A failed probe is a normal result, not an
/// error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: String,
}

impl ProbeResult {
    fn succeeded(summary: ClusterSummary) -> Self {
        ProbeResult {
            success: true,
            message: format!(
                "Connection successful: {} broker(s) and {} topic(s) visible",
                summary.broker_count, summary.topic_count
            ),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    fn failed(error: &KafkaGatewayError) -> Self {
        ProbeResult {
            success: false,
            message: "Connection failed".to_string(),
            error: Some(error.to_string()),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Check that the cluster is reachable with the caller's credentials.
///
/// Never fails: any error is reported in the returned [`ProbeResult`].
#[instrument(skip_all, fields(kafka.bootstrap = %profile.bootstrap_servers()))]
pub async fn probe_connection(
    bearer_token: &str,
    profile: &ConnectionProfile,
    timeout: Duration,
) -> ProbeResult {
    match with_cluster_metadata(bearer_token, profile, timeout, summarize)
        .await
        .inspect_err(as_warning!("connection probe failed"))
    {
        Ok(summary) => {
            debug!(?summary, "connection probe succeeded");
            ProbeResult::succeeded(summary)
        }
        Err(error) => ProbeResult::failed(&error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_result_shapes() {
        let ok = ProbeResult::succeeded(ClusterSummary {
            broker_count: 3,
            topic_count: 7,
        });
        assert!(ok.success);
        assert!(ok.message.starts_with("Connection successful"));
        assert!(ok.error.is_none());
        let json = serde_json::to_value(&ok).unwrap();
        assert!(json.get("error").is_none());
        assert!(chrono::DateTime::parse_from_rfc3339(&ok.timestamp).is_ok());

        let failed = ProbeResult::failed(&KafkaGatewayError::Validation("broker unreachable".into()));
        assert!(!failed.success);
        assert_eq!(failed.message, "Connection failed");
        assert_eq!(failed.error.as_deref(), Some("broker unreachable"));
    }
}
