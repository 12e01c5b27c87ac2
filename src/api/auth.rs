//! Bearer token extraction for the boundary layer.
use crate::kafka::KafkaGatewayError;

const BEARER_PREFIX: &str = "Bearer ";

/// Pull the bearer token out of an `Authorization` header value.
///
/// Only the `Bearer <token>` form is accepted. The token itself is opaque
/// and is neither decoded nor verified here; the brokers do that.
pub fn extract_bearer_token(authorization: Option<&str>) -> Result<&str, KafkaGatewayError> {
    authorization
        .and_then(|value| value.strip_prefix(BEARER_PREFIX))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| KafkaGatewayError::Auth("Authorization token required".to_string()))
}
