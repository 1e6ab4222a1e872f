//! Client for the upstream member messages API.

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use member_qa_retrieval::RawRecord;
use reqwest::Client;
use serde_json::{Map, Value};
use tracing::{debug, error, info};

use crate::config::MessagesConfig;
use crate::error::MessagesError;

/// Fields that usually hold the message list in an envelope object.
const ENVELOPE_KEYS: &[&str] = &["items", "messages", "data"];

/// Fields tried, in order, for the member's name.
const IDENTITY_KEYS: &[&str] = &["user_name", "member_name", "name"];

/// Fetches member messages and turns them into raw records.
#[derive(Debug, Clone)]
pub struct MessagesClient {
    client: Client,
    base_url: String,
}

impl MessagesClient {
    pub fn new(config: &MessagesConfig) -> Result<Self, MessagesError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn messages_url(&self) -> String {
        format!("{}/messages/", self.base_url)
    }

    /// Fetch all messages.
    ///
    /// Messages without a member name, a timestamp or text are skipped.
    pub async fn fetch(&self) -> Result<Vec<RawRecord>, MessagesError> {
        let url = self.messages_url();
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MessagesError::Status {
                status: status.as_u16(),
                url,
                body,
            });
        }

        let bytes = response.bytes().await?;
        let payload: Value = serde_json::from_slice(&bytes)?;

        let items = extract_items(payload);
        let total = items.len();
        let records: Vec<RawRecord> = items.iter().filter_map(to_raw_record).collect();
        info!(
            "Fetched {} messages from {url} ({} skipped)",
            records.len(),
            total - records.len()
        );
        Ok(records)
    }

    /// Fetch all messages, logging failures and returning an empty list.
    pub async fn fetch_or_empty(&self) -> Vec<RawRecord> {
        match self.fetch().await {
            Ok(records) => records,
            Err(e) => {
                error!("Failed to fetch member messages: {e}");
                Vec::new()
            }
        }
    }
}

/// Accept a list, an envelope object holding a list, or a single message.
fn extract_items(payload: Value) -> Vec<Value> {
    match payload {
        Value::Array(items) => items,
        Value::Object(mut map) => {
            let key = ENVELOPE_KEYS
                .iter()
                .copied()
                .find(|k| map.get(*k).is_some_and(Value::is_array))
                .map(str::to_string)
                .or_else(|| {
                    map.iter()
                        .find(|(_, v)| v.is_array())
                        .map(|(k, _)| k.clone())
                });

            match key.and_then(|k| map.remove(&k)) {
                Some(Value::Array(items)) => items,
                _ => vec![Value::Object(map)],
            }
        }
        other => vec![other],
    }
}

fn to_raw_record(item: &Value) -> Option<RawRecord> {
    let Some(fields) = item.as_object() else {
        debug!("Skipping non-object message: {item}");
        return None;
    };

    let identity = IDENTITY_KEYS
        .iter()
        .find_map(|k| non_empty_str(fields, k));
    let text = non_empty_str(fields, "message");
    let timestamp = non_empty_str(fields, "timestamp").and_then(parse_timestamp);

    let (Some(identity), Some(text), Some(timestamp)) = (identity, text, timestamp) else {
        debug!("Skipping incomplete message: {item}");
        return None;
    };

    let record = RawRecord::new(identity, timestamp, text);
    Some(match fields.get("id") {
        Some(Value::String(id)) => record.with_source_id(id.as_str()),
        Some(Value::Number(id)) => record.with_source_id(id.to_string()),
        _ => record,
    })
}

fn non_empty_str<'a>(fields: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    fields
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

/// RFC 3339, or a naive ISO 8601 date-time taken as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw).ok().or_else(|| {
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc().fixed_offset())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tracing_test::traced_test;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> MessagesClient {
        MessagesClient::new(&MessagesConfig {
            base_url: format!("{}/", server.uri()),
            timeout_secs: 5,
        })
        .unwrap()
    }

    fn message(name: &str, text: &str) -> Value {
        json!({
            "id": "b1e9bb83-18be-4b90-bbb8-83b7428e8e21",
            "user_id": "cd3a350e-dbd2-408f-afa0-16a072f56d23",
            "user_name": name,
            "timestamp": "2025-05-05T07:47:20.159073+00:00",
            "message": text
        })
    }

    async fn serve(body: ResponseTemplate) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/messages/"))
            .respond_with(body)
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_fetch_envelope_payload() {
        let server = serve(ResponseTemplate::new(200).set_body_json(json!({
            "total": 2,
            "items": [
                message("Sophia Al-Farsi", "Please book a private jet to Paris for this Friday."),
                message("Fatima El-Tahir", "Can you find me an antiques dealer in Marrakech?"),
            ]
        })))
        .await;

        let records = client(&server).fetch().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].identity, "Sophia Al-Farsi");
        assert_eq!(records[1].text, "Can you find me an antiques dealer in Marrakech?");
        assert_eq!(
            records[1].source_id.as_deref(),
            Some("b1e9bb83-18be-4b90-bbb8-83b7428e8e21")
        );
        assert_eq!(
            records[0].timestamp.to_rfc3339(),
            "2025-05-05T07:47:20.159073+00:00"
        );
    }

    #[tokio::test]
    async fn test_fetch_list_payload() {
        let server = serve(
            ResponseTemplate::new(200)
                .set_body_json(json!([message("Layla Kawaguchi", "Reserve sushi in Shibuya.")])),
        )
        .await;

        let records = client(&server).fetch().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].identity, "Layla Kawaguchi");
    }

    #[tokio::test]
    async fn test_fetch_single_object_payload() {
        let server = serve(
            ResponseTemplate::new(200)
                .set_body_json(message("Armand Dupont", "Two opera tickets in Milan, please.")),
        )
        .await;

        let records = client(&server).fetch().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].text, "Two opera tickets in Milan, please.");
    }

    #[tokio::test]
    #[traced_test]
    async fn test_incomplete_messages_are_skipped() {
        let server = serve(ResponseTemplate::new(200).set_body_json(json!([
            { "member_name": "Hans Müller", "timestamp": "2025-01-01T09:00:00", "message": "Hi", "id": 7 },
            { "user_name": "No Text", "timestamp": "2025-01-01T09:00:00Z" },
            { "message": "Nobody sent this", "timestamp": "2025-01-01T09:00:00Z" },
            { "user_name": "Bad Time", "timestamp": "yesterday", "message": "Hello" },
            "not an object",
        ])))
        .await;

        let records = client(&server).fetch().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].identity, "Hans Müller");
        assert_eq!(records[0].source_id.as_deref(), Some("7"));
        assert_eq!(records[0].timestamp.to_rfc3339(), "2025-01-01T09:00:00+00:00");
        assert!(logs_contain("Skipping incomplete message"));
        assert!(logs_contain("(4 skipped)"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_http_error_status() {
        let server = serve(ResponseTemplate::new(503).set_body_string("down")).await;
        let client = client(&server);

        let err = client.fetch().await.unwrap_err();
        assert!(matches!(err, MessagesError::Status { status: 503, .. }));
        assert!(client.fetch_or_empty().await.is_empty());
        assert!(logs_contain("Failed to fetch member messages"));
    }

    #[tokio::test]
    async fn test_invalid_json() {
        let server = serve(ResponseTemplate::new(200).set_body_string("<html>")).await;
        let client = client(&server);

        assert!(matches!(
            client.fetch().await.unwrap_err(),
            MessagesError::Json(_)
        ));
        assert!(client.fetch_or_empty().await.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_host_yields_empty() {
        let client = MessagesClient::new(&MessagesConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 1,
        })
        .unwrap();
        assert!(client.fetch_or_empty().await.is_empty());
    }

    #[test]
    fn test_extract_items_prefers_known_envelope_keys() {
        let items = extract_items(json!({
            "alerts": [1],
            "messages": [message("A", "b")],
        }));
        assert_eq!(items.len(), 1);
        assert!(items[0].is_object());
    }

    #[test]
    fn test_extract_items_without_list_wraps_object() {
        let items = extract_items(json!({ "user_name": "A" }));
        assert_eq!(items, vec![json!({ "user_name": "A" })]);
    }
}
