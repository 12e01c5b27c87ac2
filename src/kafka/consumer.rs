//! Bounded message fetching.
//!
//! A fetch subscribes to one topic from the earliest retained offset under a
//! fresh consumer group, then collects records until either `max_messages`
//! have arrived or the deadline passes. Because the group is new on every
//! call, nothing is committed and every call replays from the start.
use crate::{
    conf::ConnectionProfile,
    kafka::{
        base::KafkaGatewayError,
        client::{create_client, release},
        credentials::build_client_config,
    },
    utils::o11y::logging::as_error,
};

use std::collections::{btree_map::Entry, BTreeMap};
use std::time::Duration;

use futures::{Stream, StreamExt};
use rdkafka::{
    consumer::Consumer,
    message::{Headers, Message},
};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, instrument, trace};
use uuid::Uuid;

/// A header value: text when the bytes are valid UTF-8, raw bytes otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum HeaderValue {
    Text(String),
    Bytes(Vec<u8>),
}

impl HeaderValue {
    fn from_bytes(bytes: &[u8]) -> Self {
        match std::str::from_utf8(bytes) {
            Ok(text) => HeaderValue::Text(text.to_string()),
            Err(_) => HeaderValue::Bytes(bytes.to_vec()),
        }
    }
}

/// Every value a record carries for one header key. A key seen once maps to
/// its value; a repeated key maps to all of its values, in record order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum HeaderEntry {
    Single(Option<HeaderValue>),
    Repeated(Vec<Option<HeaderValue>>),
}

impl HeaderEntry {
    fn push(&mut self, value: Option<HeaderValue>) {
        match self {
            Self::Repeated(values) => values.push(value),
            Self::Single(first) => {
                let first = first.take();
                *self = Self::Repeated(vec![first, value]);
            }
        }
    }
}

/// A record as handed back to callers.
///
/// The offset and timestamp are strings so that 64-bit values survive JSON
/// consumers that only have doubles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsumedMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: String,
    pub key: Option<String>,
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, HeaderEntry>>,
    pub timestamp: Option<String>,
}

impl ConsumedMessage {
    pub fn from_message<M: Message>(message: &M) -> Self {
        let headers = message.headers().map(|headers| {
            let mut entries: BTreeMap<String, HeaderEntry> = BTreeMap::new();
            for header in headers.iter() {
                let value = header.value.map(HeaderValue::from_bytes);
                match entries.entry(header.key.to_string()) {
                    Entry::Vacant(entry) => {
                        entry.insert(HeaderEntry::Single(value));
                    }
                    Entry::Occupied(mut entry) => entry.get_mut().push(value),
                }
            }
            entries
        });
        ConsumedMessage {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset().to_string(),
            key: message
                .key()
                .map(|key| String::from_utf8_lossy(key).into_owned()),
            value: message
                .payload()
                .map(|payload| String::from_utf8_lossy(payload).into_owned()),
            headers,
            timestamp: message
                .timestamp()
                .to_millis()
                .map(|millis| millis.to_string()),
        }
    }
}

/// Which bound ended a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    CountReached,
    DeadlineReached,
    StreamEnded,
}

/// Collect items from `stream` until `max_items` have been seen or
/// `deadline` passes, whichever happens first.
///
/// Both bounds are polled from a single `select!`, so exactly one of them
/// ends the collection; once the deadline has fired no further item is
/// appended. The first error from the stream is returned as is.
pub async fn collect_bounded<S, T, E>(
    stream: S,
    max_items: usize,
    deadline: Instant,
) -> Result<(Vec<T>, FetchOutcome), E>
where
    S: Stream<Item = Result<T, E>>,
{
    let mut items = Vec::with_capacity(max_items.min(1024));
    if max_items == 0 {
        return Ok((items, FetchOutcome::CountReached));
    }

    let mut stream = std::pin::pin!(stream);
    let timer = tokio::time::sleep_until(deadline);
    tokio::pin!(timer);

    loop {
        tokio::select! {
            biased;
            _ = &mut timer => return Ok((items, FetchOutcome::DeadlineReached)),
            next = stream.next() => match next {
                Some(Ok(item)) => {
                    items.push(item);
                    if items.len() >= max_items {
                        return Ok((items, FetchOutcome::CountReached));
                    }
                }
                Some(Err(error)) => return Err(error),
                None => return Ok((items, FetchOutcome::StreamEnded)),
            },
        }
    }
}

/// Fetch up to `max_messages` records of `topic`, giving up on waiting for
/// more once `deadline` (measured from the start of the call) has elapsed.
///
/// Returns fewer records, possibly none, when the topic runs dry before the
/// deadline. The consumer is unsubscribed and disconnected before returning,
/// whichever bound fired and on error.
#[instrument(
    skip_all,
    fields(kafka.topic = %topic, kafka.limit = max_messages, kafka.group_id = tracing::field::Empty),
    err
)]
pub async fn fetch_messages(
    bearer_token: &str,
    topic: &str,
    max_messages: usize,
    profile: &ConnectionProfile,
    deadline: Duration,
) -> Result<Vec<ConsumedMessage>, KafkaGatewayError> {
    let deadline = Instant::now() + deadline;
    if max_messages == 0 {
        debug!("nothing to fetch");
        return Ok(Vec::new());
    }

    let group_id = format!("web-consumer-{}", Uuid::new_v4());
    tracing::Span::current().record("kafka.group_id", group_id.as_str());

    let handle = create_client(build_client_config(bearer_token, profile));
    let consumer = handle
        .consumer(&group_id)
        .inspect_err(as_error!("failed to create consumer"))?;

    let collected = match consumer
        .subscribe(&[topic])
        .inspect_err(as_error!("failed to subscribe to topic"))
    {
        Ok(()) => {
            let stream = consumer
                .stream()
                .map(|delivery| delivery.map(|message| ConsumedMessage::from_message(&message)));
            collect_bounded(stream, max_messages, deadline).await
        }
        Err(error) => Err(error),
    };

    consumer.unsubscribe();
    let released = release(consumer, "consumer").await;

    let (messages, outcome) = collected.inspect_err(as_error!("failed to consume messages"))?;
    released?;

    for message in &messages {
        trace!(
            kafka.partition = message.partition,
            kafka.offset = %message.offset,
            "collected message"
        );
    }
    info!(count = messages.len(), ?outcome, "fetched messages");
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::kafka::base::FETCH_DEADLINE;

    use futures::stream;
    use rdkafka::message::{Header, OwnedHeaders, OwnedMessage, Timestamp};

    fn owned(offset: i64, key: Option<&str>, value: Option<&str>) -> OwnedMessage {
        OwnedMessage::new(
            value.map(|v| v.as_bytes().to_vec()),
            key.map(|k| k.as_bytes().to_vec()),
            "orders".to_string(),
            Timestamp::CreateTime(1_700_000_000_123),
            2,
            offset,
            None,
        )
    }

    #[test]
    fn large_offsets_keep_every_digit() {
        let message = ConsumedMessage::from_message(&owned(9007199254740993, None, Some("v")));
        assert_eq!(message.offset, "9007199254740993");
        assert_eq!(message.offset.parse::<i64>().unwrap(), 9007199254740993);

        let message = ConsumedMessage::from_message(&owned(i64::MAX, None, None));
        assert_eq!(message.offset.parse::<i64>().unwrap(), i64::MAX);
    }

    #[test]
    fn records_are_normalized() {
        let message = ConsumedMessage::from_message(&owned(42, Some("k"), Some("hello")));
        assert_eq!(message.topic, "orders");
        assert_eq!(message.partition, 2);
        assert_eq!(message.offset, "42");
        assert_eq!(message.key.as_deref(), Some("k"));
        assert_eq!(message.value.as_deref(), Some("hello"));
        assert_eq!(message.timestamp.as_deref(), Some("1700000000123"));
        assert!(message.headers.is_none());

        let message = ConsumedMessage::from_message(&owned(0, None, None));
        assert!(message.key.is_none());
        assert!(message.value.is_none());
        let json = serde_json::to_value(&message).unwrap();
        assert!(json["key"].is_null());
        assert!(json["value"].is_null());
        assert!(json.get("headers").is_none());
    }

    #[test]
    fn missing_timestamp_is_none() {
        let message = OwnedMessage::new(
            None,
            None,
            "t".to_string(),
            Timestamp::NotAvailable,
            0,
            1,
            None,
        );
        assert!(ConsumedMessage::from_message(&message).timestamp.is_none());
    }

    #[test]
    fn headers_are_passed_through() {
        let headers = OwnedHeaders::new()
            .insert(Header {
                key: "trace-id",
                value: Some("abc"),
            })
            .insert(Header {
                key: "blob",
                value: Some(&[0xff_u8, 0x00][..]),
            })
            .insert(Header::<&str> {
                key: "empty",
                value: None,
            });
        let message = OwnedMessage::new(
            Some(b"v".to_vec()),
            None,
            "t".to_string(),
            Timestamp::NotAvailable,
            0,
            1,
            Some(headers),
        );
        let headers = ConsumedMessage::from_message(&message).headers.unwrap();
        assert_eq!(
            headers["trace-id"],
            HeaderEntry::Single(Some(HeaderValue::Text("abc".to_string())))
        );
        assert_eq!(
            headers["blob"],
            HeaderEntry::Single(Some(HeaderValue::Bytes(vec![0xff, 0x00])))
        );
        assert_eq!(headers["empty"], HeaderEntry::Single(None));
    }

    #[test]
    fn repeated_header_keys_keep_every_value() {
        let headers = OwnedHeaders::new()
            .insert(Header {
                key: "k",
                value: Some("first"),
            })
            .insert(Header {
                key: "other",
                value: Some("x"),
            })
            .insert(Header {
                key: "k",
                value: Some("second"),
            })
            .insert(Header::<&str> {
                key: "k",
                value: None,
            });
        let message = OwnedMessage::new(
            Some(b"v".to_vec()),
            None,
            "t".to_string(),
            Timestamp::NotAvailable,
            0,
            1,
            Some(headers),
        );
        let headers = ConsumedMessage::from_message(&message).headers.unwrap();
        assert_eq!(headers.len(), 2);
        assert_eq!(
            headers["k"],
            HeaderEntry::Repeated(vec![
                Some(HeaderValue::Text("first".to_string())),
                Some(HeaderValue::Text("second".to_string())),
                None,
            ])
        );
        assert_eq!(
            headers["other"],
            HeaderEntry::Single(Some(HeaderValue::Text("x".to_string())))
        );

        let json = serde_json::to_value(&headers).unwrap();
        assert_eq!(json["k"], serde_json::json!(["first", "second", null]));
        assert_eq!(json["other"], serde_json::json!("x"));
    }

    #[tokio::test(start_paused = true)]
    async fn count_bound_stops_at_the_limit() {
        let deadline = Instant::now() + FETCH_DEADLINE;
        let items = stream::iter((0..100).map(Ok::<_, String>));
        let (collected, outcome) = collect_bounded(items, 10, deadline).await.unwrap();
        assert_eq!(collected, (0..10).collect::<Vec<_>>());
        assert_eq!(outcome, FetchOutcome::CountReached);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_returns_what_arrived() {
        // three records, then a subscription that stays quiet
        let start = Instant::now();
        let deadline = start + FETCH_DEADLINE;
        let items = stream::iter((0..3).map(Ok::<_, String>)).chain(stream::pending());
        let (collected, outcome) = collect_bounded(items, 10, deadline).await.unwrap();
        assert_eq!(collected, vec![0, 1, 2]);
        assert_eq!(outcome, FetchOutcome::DeadlineReached);
        assert!(Instant::now() >= deadline);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_topic_times_out_empty() {
        let deadline = Instant::now() + FETCH_DEADLINE;
        let items = stream::pending::<Result<u8, String>>();
        let (collected, outcome) = collect_bounded(items, 5, deadline).await.unwrap();
        assert!(collected.is_empty());
        assert_eq!(outcome, FetchOutcome::DeadlineReached);
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_is_appended_after_the_deadline() {
        let start = Instant::now();
        let deadline = start + Duration::from_millis(100);
        // one record before the deadline, one long after it
        let items = stream::iter(vec![(0_u64, 1), (500, 2)]).then(move |(at, item)| async move {
            tokio::time::sleep_until(start + Duration::from_millis(at)).await;
            Ok::<_, String>(item)
        });
        let (collected, outcome) = collect_bounded(items, 10, deadline).await.unwrap();
        assert_eq!(collected, vec![1]);
        assert_eq!(outcome, FetchOutcome::DeadlineReached);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_limit_returns_immediately() {
        let deadline = Instant::now() + FETCH_DEADLINE;
        let items = stream::iter((0..5).map(Ok::<_, String>));
        let (collected, outcome) = collect_bounded(items, 0, deadline).await.unwrap();
        assert!(collected.is_empty());
        assert_eq!(outcome, FetchOutcome::CountReached);
    }

    #[tokio::test(start_paused = true)]
    async fn first_error_is_returned() {
        let deadline = Instant::now() + FETCH_DEADLINE;
        let items = stream::iter(vec![Ok(1), Err("broken".to_string()), Ok(3)]);
        let result = collect_bounded(items, 10, deadline).await;
        assert_eq!(result.unwrap_err(), "broken");
    }

    #[tokio::test(start_paused = true)]
    async fn ended_stream_returns_what_arrived() {
        let deadline = Instant::now() + FETCH_DEADLINE;
        let items = stream::iter((0..4).map(Ok::<_, String>));
        let (collected, outcome) = collect_bounded(items, 10, deadline).await.unwrap();
        assert_eq!(collected.len(), 4);
        assert_eq!(outcome, FetchOutcome::StreamEnded);
    }

    #[tokio::test]
    async fn zero_limit_fetch_opens_no_session() {
        // an unreachable cluster would fail or time out if a session were opened
        let profile = ConnectionProfile {
            bootstrap_addresses: vec!["127.0.0.1:1".to_string()],
            ..ConnectionProfile::default()
        };
        let started = std::time::Instant::now();
        let messages = fetch_messages("token", "t", 0, &profile, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(messages.is_empty());
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
