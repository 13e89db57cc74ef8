use crate::config::ClientConfig;
use crate::errors::{Error, Result};
use crate::metrics::{
    HTTP_FAILURES_TOTAL, REQUESTS_TOTAL, REQUEST_LATENCY_SECONDS, TRANSPORT_FAILURES_TOTAL,
};
use crate::model::{
    Ack, ApiKeyResponse, Channel, ExportQuery, Fields, KeyScope, NewChannel, NewWorkflow, Reading,
    ReadingsQuery, SeriesDataPoint, SeriesQuery, Workflow,
};
use crate::transport::{ApiRequest, ApiResponse, HttpTransport, Transport};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, warn};

/// Typed operations against the gateway API.
///
/// The client holds no state besides its transport. Authenticated calls take
/// the API key as an argument and attach it as the `x-api-key` header; the key
/// is never inspected, cached or validated here.
#[derive(Debug, Clone)]
pub struct ApiClient<T = HttpTransport> {
    transport: T,
}

impl ApiClient<HttpTransport> {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        Ok(Self::with_transport(HttpTransport::new(config)?))
    }

    pub fn from_env() -> Result<Self> {
        Self::new(&ClientConfig::from_env())
    }
}

impl<T: Transport> ApiClient<T> {
    pub fn with_transport(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn create_channel(
        &self,
        name: &str,
        description: Option<&str>,
        allowed_fields: &[String],
    ) -> Result<Channel> {
        let body = NewChannel {
            name: name.to_string(),
            description: description.map(str::to_string),
            allowed_fields: allowed_fields.to_vec(),
        };
        self.fetch_json(ApiRequest::post(&["api", "channels"], serde_json::to_value(body)?))
            .await
    }

    pub async fn get_channel(&self, id: &str) -> Result<Channel> {
        self.fetch_json(ApiRequest::get(&["api", "channels", id])).await
    }

    pub async fn create_api_key(&self, channel_id: &str, scope: KeyScope) -> Result<ApiKeyResponse> {
        self.fetch_json(ApiRequest::post(
            &["api", "channels", channel_id, "keys"],
            json!({ "scope": scope }),
        ))
        .await
    }

    /// Submits one reading. The backend answers `202 {"ok": true}`.
    pub async fn post_reading(&self, api_key: &str, fields: &Fields) -> Result<Ack> {
        let request =
            ApiRequest::post(&["api", "readings"], serde_json::to_value(fields)?).with_api_key(api_key);
        self.fetch_json(request).await
    }

    /// Latest reading of the key's channel, or `None` when it has none yet.
    ///
    /// Only a success response with an empty or `null` body maps to `None`;
    /// a 404 stays an error so a missing channel is not mistaken for an
    /// empty one.
    pub async fn get_latest_reading(&self, api_key: &str) -> Result<Option<Reading>> {
        let response = self
            .send(ApiRequest::get(&["api", "readings", "latest"]).with_api_key(api_key))
            .await?;

        if response.status == 204 || response.body.trim().is_empty() {
            return Ok(None);
        }
        decode(&response)
    }

    pub async fn get_readings(&self, api_key: &str, query: ReadingsQuery) -> Result<Vec<Reading>> {
        let mut request = ApiRequest::get(&["api", "readings"])
            .with_api_key(api_key)
            .with_query("limit", query.limit);
        if let Some(since) = query.since {
            request = request.with_query("since", timestamp_param(since));
        }
        self.fetch_json(request).await
    }

    /// `get_readings` with the default limit of 100 and no `since` filter.
    pub async fn get_recent_readings(&self, api_key: &str) -> Result<Vec<Reading>> {
        self.get_readings(api_key, ReadingsQuery::default()).await
    }

    pub async fn get_series(&self, api_key: &str, query: &SeriesQuery) -> Result<Vec<SeriesDataPoint>> {
        let mut request = ApiRequest::get(&["api", "charts", "series"])
            .with_api_key(api_key)
            .with_query("field", &query.field)
            .with_query("limit", query.limit);
        if let Some(since) = query.since {
            request = request.with_query("since", timestamp_param(since));
        }
        self.fetch_json(request).await
    }

    pub async fn create_workflow(&self, api_key: &str, workflow: &NewWorkflow) -> Result<Workflow> {
        let request = ApiRequest::post(&["api", "workflows"], serde_json::to_value(workflow)?)
            .with_api_key(api_key);
        self.fetch_json(request).await
    }

    pub async fn get_workflows(&self, api_key: &str) -> Result<Vec<Workflow>> {
        self.fetch_json(ApiRequest::get(&["api", "workflows"]).with_api_key(api_key))
            .await
    }

    /// Raw CSV export, returned exactly as the backend sent it.
    pub async fn export_csv(&self, api_key: &str, query: ExportQuery) -> Result<String> {
        let request = ApiRequest::get(&["api", "export", "csv"])
            .with_api_key(api_key)
            .with_query("limit", query.limit);
        Ok(self.send(request).await?.body)
    }

    async fn fetch_json<R: DeserializeOwned>(&self, request: ApiRequest) -> Result<R> {
        let response = self.send(request).await?;
        decode(&response)
    }

    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let method = request.method.clone();
        let path = request.display_path();

        REQUESTS_TOTAL.inc();
        let timer = REQUEST_LATENCY_SECONDS.start_timer();
        debug!("Sending {} {}", method, path);

        let outcome = self.transport.execute(request).await;
        timer.observe_duration();

        match outcome {
            Ok(response) if response.is_success() => Ok(response),
            Ok(response) => {
                HTTP_FAILURES_TOTAL.inc();
                let err = http_error(&response);
                warn!("{} {} failed: {}", method, path, err);
                Err(err)
            }
            Err(e) => {
                if e.is_transport() {
                    TRANSPORT_FAILURES_TOTAL.inc();
                }
                warn!("{} {} failed: {}", method, path, e);
                Err(e)
            }
        }
    }
}

fn decode<R: DeserializeOwned>(response: &ApiResponse) -> Result<R> {
    serde_json::from_str(&response.body).map_err(Error::Decode)
}

fn timestamp_param(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn http_error(response: &ApiResponse) -> Error {
    Error::Http {
        status: response.status,
        message: backend_message(&response.body),
    }
}

/// Backend-supplied failure text: the `error` or `message` field of a JSON
/// object body, otherwise the raw body.
fn backend_message(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        for key in ["error", "message"] {
            if let Some(Value::String(text)) = map.get(key) {
                return Some(text.clone());
            }
        }
    }

    Some(body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Action, ComparisonOp, Rule};
    use chrono::TimeZone;
    use reqwest::Method;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeTransport {
        requests: Mutex<Vec<ApiRequest>>,
        responses: Mutex<VecDeque<ApiResponse>>,
    }

    impl FakeTransport {
        fn replying(status: u16, body: &str) -> Self {
            let fake = Self::default();
            fake.push(status, body);
            fake
        }

        fn push(&self, status: u16, body: &str) {
            self.responses.lock().unwrap().push_back(ApiResponse {
                status,
                body: body.to_string(),
            });
        }

        fn last_request(&self) -> ApiRequest {
            self.requests.lock().unwrap().last().cloned().unwrap()
        }
    }

    impl Transport for FakeTransport {
        async fn execute(&self, request: ApiRequest) -> Result<ApiResponse> {
            self.requests.lock().unwrap().push(request);
            Ok(self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .expect("no response queued"))
        }
    }

    const CHANNEL_JSON: &str = r#"{
        "id": "ch_1",
        "name": "Demo Channel",
        "description": "IoT sensor channel",
        "allowed_fields": ["temperature", "humidity"],
        "max_fields": 8,
        "min_write_interval_seconds": 15,
        "min_read_interval_seconds": 5,
        "created_at": "2024-05-01T12:00:00Z"
    }"#;

    fn client(status: u16, body: &str) -> ApiClient<FakeTransport> {
        ApiClient::with_transport(FakeTransport::replying(status, body))
    }

    #[tokio::test]
    async fn test_create_channel_request() {
        let client = client(201, CHANNEL_JSON);
        let fields = vec!["temperature".to_string(), "humidity".to_string()];

        let channel = client
            .create_channel("Demo Channel", Some("IoT sensor channel"), &fields)
            .await
            .unwrap();
        assert_eq!(channel.allowed_fields, fields);

        let request = client.transport().last_request();
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.display_path(), "/api/channels");
        assert_eq!(request.api_key, None);
        assert_eq!(
            request.body,
            Some(json!({
                "name": "Demo Channel",
                "description": "IoT sensor channel",
                "allowedFields": ["temperature", "humidity"]
            }))
        );
    }

    #[tokio::test]
    async fn test_create_channel_passes_empty_fields_through() {
        let client = client(400, r#"{"error": "allowedFields must not be empty"}"#);

        let err = client.create_channel("Empty", None, &[]).await.unwrap_err();
        assert_eq!(err.status(), Some(400));
        assert_eq!(err.message(), Some("allowedFields must not be empty"));

        let request = client.transport().last_request();
        assert_eq!(request.body, Some(json!({"name": "Empty", "allowedFields": []})));
    }

    #[tokio::test]
    async fn test_get_channel_not_found() {
        let client = client(404, r#"{"message": "channel not found"}"#);

        let err = client.get_channel("missing").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(client.transport().last_request().display_path(), "/api/channels/missing");
    }

    #[tokio::test]
    async fn test_create_api_key_sends_scope() {
        let client = client(201, r#"{"key": "k_1", "scope": "read", "channelId": "ch_1"}"#);

        let key = client.create_api_key("ch_1", KeyScope::Read).await.unwrap();
        assert_eq!(key.key, "k_1");
        assert_eq!(key.scope, KeyScope::Read);

        let request = client.transport().last_request();
        assert_eq!(request.display_path(), "/api/channels/ch_1/keys");
        assert_eq!(request.body, Some(json!({"scope": "read"})));
    }

    #[tokio::test]
    async fn test_create_api_key_default_scope_is_readwrite() {
        let client = client(201, r#"{"key": "k_2", "scope": "readwrite", "channelId": "ch_1"}"#);

        let key = client
            .create_api_key("ch_1", KeyScope::default())
            .await
            .unwrap();
        assert_eq!(key.scope, KeyScope::ReadWrite);

        let request = client.transport().last_request();
        assert_eq!(request.body, Some(json!({"scope": "readwrite"})));
    }

    #[tokio::test]
    async fn test_post_reading_puts_key_in_header() {
        let client = client(202, r#"{"ok": true}"#);
        let fields = Fields::from([("temperature".to_string(), 24.5)]);

        let ack = client.post_reading("k_1", &fields).await.unwrap();
        assert!(ack.ok);

        let request = client.transport().last_request();
        assert_eq!(request.api_key.as_deref(), Some("k_1"));
        assert_eq!(request.body, Some(json!({"temperature": 24.5})));
    }

    #[tokio::test]
    async fn test_latest_reading_absent() {
        for (status, body) in [(200, "null"), (200, ""), (204, "")] {
            let client = client(status, body);
            assert_eq!(client.get_latest_reading("k_1").await.unwrap(), None);
        }
    }

    #[tokio::test]
    async fn test_latest_reading_present() {
        let client = client(
            200,
            r#"{"ts": "2024-05-01T12:00:05Z", "fields": {"temperature": 24.5}}"#,
        );

        let reading = client.get_latest_reading("k_1").await.unwrap().unwrap();
        assert_eq!(reading.fields["temperature"], 24.5);
    }

    #[tokio::test]
    async fn test_latest_reading_not_found_is_error() {
        let client = client(404, "");
        let err = client.get_latest_reading("k_1").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.message(), None);
    }

    #[tokio::test]
    async fn test_readings_query_defaults() {
        let client = client(200, "[]");

        client.get_recent_readings("k_1").await.unwrap();
        let request = client.transport().last_request();
        assert_eq!(request.query, vec![("limit", "100".to_string())]);
    }

    #[tokio::test]
    async fn test_readings_query_with_since() {
        let client = client(200, "[]");
        let since = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        client
            .get_readings("k_1", ReadingsQuery { limit: 10, since: Some(since) })
            .await
            .unwrap();
        let request = client.transport().last_request();
        assert_eq!(
            request.query,
            vec![
                ("limit", "10".to_string()),
                ("since", "2024-05-01T12:00:00.000Z".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_series_query() {
        let client = client(
            200,
            r#"[{"ts": "2024-05-01T12:00:00Z", "value": 21.0}, {"ts": "2024-05-01T12:00:15Z", "value": 21.5}]"#,
        );

        let points = client
            .get_series("k_1", &SeriesQuery::new("temperature"))
            .await
            .unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].value, 21.5);

        let request = client.transport().last_request();
        assert_eq!(request.display_path(), "/api/charts/series");
        assert_eq!(
            request.query,
            vec![("field", "temperature".to_string()), ("limit", "50".to_string())]
        );
    }

    #[tokio::test]
    async fn test_create_workflow_body() {
        let client = client(
            201,
            r#"{
                "id": "wf_1",
                "channel_id": "ch_1",
                "name": "Too hot",
                "enabled": true,
                "rule": {"field": "temperature", "op": ">", "value": 30},
                "action": {"type": "webhook", "url": "https://example.test"},
                "created_at": "2024-05-01T12:00:00Z"
            }"#,
        );
        let workflow = NewWorkflow::new(
            "Too hot",
            Rule {
                field: "temperature".to_string(),
                op: ComparisonOp::Gt,
                value: 30.0,
            },
            Action::webhook("https://example.test"),
        );

        let created = client.create_workflow("k_1", &workflow).await.unwrap();
        assert!(created.enabled);
        assert_eq!(created.rule.op, ComparisonOp::Gt);

        let request = client.transport().last_request();
        assert_eq!(
            request.body,
            Some(json!({
                "name": "Too hot",
                "enabled": true,
                "rule": {"field": "temperature", "op": ">", "value": 30.0},
                "action": {"type": "webhook", "url": "https://example.test"}
            }))
        );
    }

    #[tokio::test]
    async fn test_export_csv_is_returned_verbatim() {
        let csv = "ts,temperature\n2024-05-01T12:00:00Z,24.5\n";
        let client = client(200, csv);

        let body = client.export_csv("k_1", ExportQuery::default()).await.unwrap();
        assert_eq!(body, csv);

        let request = client.transport().last_request();
        assert_eq!(request.display_path(), "/api/export/csv");
        assert_eq!(request.query, vec![("limit", "1000".to_string())]);
    }

    #[tokio::test]
    async fn test_rate_limited_message_from_raw_body() {
        let client = client(429, "slow down\n");
        let err = client.get_workflows("k_1").await.unwrap_err();
        assert!(err.is_rate_limited());
        assert_eq!(err.message(), Some("slow down"));
    }

    #[tokio::test]
    async fn test_malformed_success_body_is_decode_error() {
        let client = client(200, r#"{"unexpected": true}"#);
        let err = client.get_channel("ch_1").await.unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn test_backend_message_prefers_error_field() {
        assert_eq!(
            backend_message(r#"{"error": "invalid key", "message": "other"}"#),
            Some("invalid key".to_string())
        );
        assert_eq!(
            backend_message(r#"{"code": 7}"#),
            Some(r#"{"code": 7}"#.to_string())
        );
        assert_eq!(backend_message("  "), None);
    }
}
