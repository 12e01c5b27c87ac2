//! JSON envelopes handed back to the boundary layer.
//!
//! Successful responses are `{success: true, <payload fields>, timestamp}`,
//! failures `{success: false, error, timestamp}`. Timestamps are ISO-8601.
use crate::kafka::{ConsumedMessage, ErrorKind, KafkaGatewayError, ProduceResult};

use serde::Serialize;

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(flatten)]
    pub payload: T,
    pub timestamp: String,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(payload: T) -> Self {
        ApiResponse {
            success: true,
            payload,
            timestamp: now(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TopicsPayload {
    pub topics: Vec<String>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessagesPayload {
    pub messages: Vec<ConsumedMessage>,
    pub count: usize,
    pub topic: String,
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProducePayload {
    pub topic: String,
    pub partition: i32,
    pub offset: String,
    pub message: String,
}

pub fn topics(topics: Vec<String>) -> ApiResponse<TopicsPayload> {
    let count = topics.len();
    ApiResponse::ok(TopicsPayload { topics, count })
}

pub fn messages(
    topic: &str,
    limit: usize,
    messages: Vec<ConsumedMessage>,
) -> ApiResponse<MessagesPayload> {
    let count = messages.len();
    ApiResponse::ok(MessagesPayload {
        messages,
        count,
        topic: topic.to_string(),
        limit,
    })
}

pub fn produced(result: ProduceResult) -> ApiResponse<ProducePayload> {
    ApiResponse {
        success: true,
        payload: ProducePayload {
            topic: result.topic,
            partition: result.partition,
            offset: result.offset,
            message: "Message sent successfully".to_string(),
        },
        timestamp: result.timestamp,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    pub timestamp: String,
    #[serde(skip)]
    pub status: u16,
}

/// HTTP status the boundary should answer with for a failure of `kind`.
pub fn status_code(kind: ErrorKind) -> u16 {
    match kind {
        ErrorKind::Auth => 401,
        ErrorKind::Config | ErrorKind::Validation => 400,
        ErrorKind::Connection => 500,
    }
}

pub fn error(error: &KafkaGatewayError) -> ErrorResponse {
    ErrorResponse {
        success: false,
        error: error.to_string(),
        topic: None,
        timestamp: now(),
        status: status_code(error.kind()),
    }
}

pub fn topic_error(topic: &str, error: &KafkaGatewayError) -> ErrorResponse {
    ErrorResponse {
        topic: Some(topic.to_string()),
        ..self::error(error)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusEnvironment {
    pub kafka_bootstrap: String,
    pub environment: String,
}

/// Liveness payload. Needs no credentials and opens no kafka session.
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub service: String,
    pub timestamp: String,
    pub environment: StatusEnvironment,
}

pub fn status(service: &str, kafka_bootstrap: &str, environment: &str) -> StatusResponse {
    StatusResponse {
        status: "ok".to_string(),
        service: service.to_string(),
        timestamp: now(),
        environment: StatusEnvironment {
            kafka_bootstrap: kafka_bootstrap.to_string(),
            environment: environment.to_string(),
        },
    }
}
