use knep_demo::{
    api::{self, auth::extract_bearer_token, response},
    conf::{self, AppConfig, ProfileOverrides},
    kafka::{KafkaGateway, KafkaGatewayError, ProduceRequest},
    utils::o11y::logging::build_subscriber,
};

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, error};

/// Talk to a kafka cluster on behalf of a bearer-token holder
#[derive(Parser)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Bearer token presented to the brokers
    #[arg(long, env = "KNEP_ACCESS_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Full `Authorization` header value, e.g. "Bearer <token>". Takes
    /// precedence over --token
    #[arg(long)]
    authorization: Option<String>,

    /// Connection profile as JSON, merged over the configured default
    /// (e.g. '{"bootstrapServers": "broker:9092", "saslMechanism": "plain"}')
    #[arg(long, value_name = "JSON")]
    profile: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Report service liveness; needs no credentials
    Status,

    /// List the topics visible to the caller
    Topics,

    /// Read up to LIMIT messages from the start of a topic
    Messages {
        topic: String,

        /// Maximum number of messages to return
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Check that the cluster described by --profile is reachable
    Probe,

    /// Publish one message to a topic
    Produce {
        topic: String,

        #[arg(long)]
        value: String,

        #[arg(long)]
        key: Option<String>,

        /// Pin the message to a partition
        #[arg(long)]
        partition: Option<i32>,

        /// Message header, repeatable
        #[arg(long = "header", value_name = "KEY=VALUE", value_parser = parse_header)]
        headers: Vec<(String, String)>,
    },
}

fn parse_header(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("invalid header '{s}', expected KEY=VALUE"))
}

fn init_logging() {
    match build_subscriber() {
        Ok(subscriber) => {
            if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
                eprintln!("failed to set global subscriber: {e}");
            }
        }
        Err(e) => eprintln!("failed to build subscriber: {e}"),
    }
}

fn emit<T: Serialize>(value: &T, success: bool) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            error!(error.message = %e, "failed to serialize response");
            return ExitCode::FAILURE;
        }
    }
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn emit_error(topic: Option<&str>, error: &KafkaGatewayError) -> ExitCode {
    let failure = match topic {
        Some(topic) => response::topic_error(topic, error),
        None => response::error(error),
    };
    debug!(status = failure.status, "request failed");
    emit(&failure, false)
}

impl Cli {
    fn bearer_token(&self) -> Result<String, KafkaGatewayError> {
        let header = match (&self.authorization, &self.token) {
            (Some(authorization), _) => Some(authorization.clone()),
            (None, Some(token)) => Some(format!("Bearer {token}")),
            (None, None) => None,
        };
        extract_bearer_token(header.as_deref()).map(str::to_string)
    }

    fn overrides(&self) -> Result<Option<ProfileOverrides>, KafkaGatewayError> {
        Ok(self
            .profile
            .as_deref()
            .map(ProfileOverrides::from_json)
            .transpose()?)
    }

    /// Token and caller profile for an operation that talks to the brokers.
    fn session(
        &self,
        gateway: &KafkaGateway,
    ) -> Result<(String, Option<ProfileOverrides>), KafkaGatewayError> {
        let token = self.bearer_token()?;
        let overrides = self.overrides()?;
        debug!(
            custom_profile = overrides.is_some(),
            kafka.bootstrap = %gateway.default_profile().bootstrap_servers(),
            "resolved caller"
        );
        Ok((token, overrides))
    }

    async fn run(self, config: AppConfig) -> ExitCode {
        let gateway = KafkaGateway::new(&config.kafka);
        let default = gateway.default_profile();

        match &self.command {
            Command::Status => {
                let status = response::status(
                    &config.service.name,
                    &default.bootstrap_servers(),
                    &config.service.environment,
                );
                emit(&status, true)
            }
            Command::Topics => {
                let (token, overrides) = match self.session(&gateway) {
                    Ok(session) => session,
                    Err(e) => return emit_error(None, &e),
                };
                let profile = api::caller_profile(overrides.as_ref(), default);
                match gateway.list_topics(&token, profile.as_ref()).await {
                    Ok(topics) => emit(&response::topics(topics), true),
                    Err(e) => emit_error(None, &e),
                }
            }
            Command::Messages { topic, limit } => {
                let (token, overrides) = match self.session(&gateway) {
                    Ok(session) => session,
                    Err(e) => return emit_error(Some(topic.as_str()), &e),
                };
                let profile = api::caller_profile(overrides.as_ref(), default);
                let limit = limit.unwrap_or(config.kafka.default_fetch_limit);
                match gateway
                    .fetch_messages(&token, topic, limit, profile.as_ref())
                    .await
                {
                    Ok(messages) => emit(&response::messages(topic, limit, messages), true),
                    Err(e) => emit_error(Some(topic.as_str()), &e),
                }
            }
            Command::Probe => {
                let (token, profile) = match self.session(&gateway).and_then(|(token, overrides)| {
                    let profile = api::require_profile(overrides.as_ref(), default)?;
                    Ok((token, profile))
                }) {
                    Ok(session) => session,
                    Err(e) => return emit_error(None, &e),
                };
                let result = gateway.probe_connection(&token, &profile).await;
                let success = result.success;
                emit(&result, success)
            }
            Command::Produce {
                topic,
                value,
                key,
                partition,
                headers,
            } => {
                let (token, overrides) = match self.session(&gateway) {
                    Ok(session) => session,
                    Err(e) => return emit_error(Some(topic.as_str()), &e),
                };
                let profile = api::caller_profile(overrides.as_ref(), default);
                let request = ProduceRequest {
                    key: key.clone(),
                    value: value.clone(),
                    headers: (!headers.is_empty())
                        .then(|| headers.iter().cloned().collect::<BTreeMap<_, _>>()),
                    partition: *partition,
                };
                match gateway
                    .produce_message(&token, topic, &request, profile.as_ref())
                    .await
                {
                    Ok(result) => emit(&response::produced(result), true),
                    Err(e) => emit_error(Some(topic.as_str()), &e),
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    conf::load_dotenv();

    let cli = Cli::parse();
    let loaded = match cli.config.as_deref() {
        Some(path) => AppConfig::from_path(path),
        None => AppConfig::from_default_path(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(e) => return emit_error(None, &KafkaGatewayError::from(e)),
    };
    cli.run(config).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_arguments() {
        assert_eq!(
            parse_header("trace-id=a=b").unwrap(),
            ("trace-id".to_string(), "a=b".to_string())
        );
        assert!(parse_header("no-separator").is_err());
    }

    #[test]
    fn token_sources() {
        let cli = Cli::parse_from(["knep-demo", "--token", "abc", "topics"]);
        assert_eq!(cli.bearer_token().unwrap(), "abc");

        let cli = Cli::parse_from(["knep-demo", "--authorization", "Bearer xyz", "topics"]);
        assert_eq!(cli.bearer_token().unwrap(), "xyz");

        let cli = Cli::parse_from(["knep-demo", "--authorization", "Basic xyz", "topics"]);
        assert!(matches!(cli.bearer_token(), Err(KafkaGatewayError::Auth(_))));
    }

    #[test]
    fn produce_arguments() {
        let cli = Cli::parse_from([
            "knep-demo", "produce", "orders", "--value", "v", "--partition", "2", "--header",
            "source=cli",
        ]);
        match cli.command {
            Command::Produce {
                topic,
                partition,
                headers,
                ..
            } => {
                assert_eq!(topic, "orders");
                assert_eq!(partition, Some(2));
                assert_eq!(headers, vec![("source".to_string(), "cli".to_string())]);
            }
            _ => panic!("expected produce"),
        }
    }
}
