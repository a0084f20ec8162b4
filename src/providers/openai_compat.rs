//! OpenAI-compatible completion client
//!
//! Talks to any endpoint implementing the chat completions format. Two
//! flavours are supported:
//! - `open_ai`: `POST {base}/chat/completions` with a bearer token
//! - `azure`: `POST {base}/openai/deployments/{engine}/chat/completions?api-version=...`
//!   with an `api-key` header

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};

use crate::config::{ApiType, ClientSettings, ModelConfig, ProviderConfig};
use crate::conversation::Message;

use super::{CompletionClient, CompletionError};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

impl From<&Message> for ChatMessage {
    fn from(msg: &Message) -> Self {
        Self {
            role: msg.role.as_str().to_string(),
            content: msg.content.clone(),
        }
    }
}

/// Chat completion request
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    frequency_penalty: f32,
    presence_penalty: f32,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    stop: &'a [String],
}

/// Chat completion response
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// Error response from API
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// Completion client for OpenAI and Azure OpenAI deployments
pub struct OpenAiCompatClient {
    provider: ProviderConfig,
    model: ModelConfig,
    client: Client,
}

impl OpenAiCompatClient {
    pub fn new(
        provider: ProviderConfig,
        model: ModelConfig,
        settings: &ClientSettings,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(settings.timeout()).build()?;

        Ok(Self {
            provider,
            model,
            client,
        })
    }

    fn endpoint(&self) -> String {
        let base = &self.provider.api_base;
        match self.provider.api_type {
            ApiType::OpenAi => format!("{base}/chat/completions"),
            ApiType::Azure => format!(
                "{base}/openai/deployments/{}/chat/completions?api-version={}",
                self.provider.engine.as_deref().unwrap_or_default(),
                self.provider.api_version
            ),
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.provider.api_type {
            ApiType::OpenAi => request.bearer_auth(&self.provider.api_key),
            ApiType::Azure => request.header("api-key", &self.provider.api_key),
        }
    }

    fn build_request<'a>(&'a self, messages: &[Message]) -> ChatCompletionRequest<'a> {
        ChatCompletionRequest {
            // Azure picks the model from the deployment in the URL
            model: match self.provider.api_type {
                ApiType::OpenAi => Some(self.model.name.as_str()),
                ApiType::Azure => None,
            },
            messages: messages.iter().map(ChatMessage::from).collect(),
            max_tokens: self.model.max_reply_tokens,
            temperature: self.model.temperature,
            frequency_penalty: self.model.frequency_penalty,
            presence_penalty: self.model.presence_penalty,
            stop: &self.model.stop,
        }
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompatClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, CompletionError> {
        let request = self.build_request(messages);

        tracing::debug!(
            "Requesting completion from {} ({} messages)",
            self.model.name,
            request.messages.len()
        );

        let response = self
            .authorize(self.client.post(self.endpoint()))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(classify_failure(status, &body));
        }

        parse_reply(&body)
    }
}

/// Map a non-success HTTP answer to a typed failure
fn classify_failure(status: StatusCode, body: &str) -> CompletionError {
    let message = serde_json::from_str::<ErrorResponse>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| format!("HTTP {status}: {body}"));

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CompletionError::Auth(message),
        StatusCode::TOO_MANY_REQUESTS => CompletionError::RateLimit(message),
        s if s.is_server_error() => CompletionError::Network(message),
        s => CompletionError::Rejected {
            status: s.as_u16(),
            message,
        },
    }
}

fn parse_reply(body: &str) -> Result<String, CompletionError> {
    let completion: ChatCompletionResponse = serde_json::from_str(body).map_err(|e| {
        CompletionError::MalformedResponse(format!("Failed to parse response: {e} - Body: {body}"))
    })?;

    if let Some(usage) = &completion.usage {
        tracing::debug!(
            "Completion used {} prompt + {} reply tokens",
            usage.prompt_tokens,
            usage.completion_tokens
        );
    }

    let choice = completion
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| CompletionError::MalformedResponse("No choices in response".to_string()))?;

    if choice.finish_reason.as_deref() == Some("length") {
        tracing::warn!("Reply was cut off at the max_tokens limit");
    }

    choice
        .message
        .content
        .ok_or_else(|| CompletionError::MalformedResponse("Reply has no content".to_string()))
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::time::Duration;

    use axum::http::{HeaderMap, Uri};
    use axum::response::IntoResponse;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    use super::*;
    use crate::conversation::Role;

    fn provider(api_type: ApiType) -> ProviderConfig {
        ProviderConfig {
            api_key: "test-key".to_string(),
            api_base: "https://example.test/v1".to_string(),
            api_type,
            engine: Some("chat-deploy".to_string()),
            api_version: "2023-05-15".to_string(),
        }
    }

    fn client(api_type: ApiType) -> OpenAiCompatClient {
        OpenAiCompatClient::new(
            provider(api_type),
            ModelConfig::default(),
            &ClientSettings::default(),
        )
        .unwrap()
    }

    fn local_client(
        api_type: ApiType,
        addr: SocketAddr,
        settings: &ClientSettings,
    ) -> OpenAiCompatClient {
        let provider = ProviderConfig {
            api_base: format!("http://{addr}/v1"),
            ..provider(api_type)
        };
        OpenAiCompatClient::new(provider, ModelConfig::default(), settings).unwrap()
    }

    async fn serve(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        addr
    }

    fn reply(content: &str) -> Json<Value> {
        Json(json!({
            "choices": [{
                "message": { "role": "assistant", "content": content },
                "finish_reason": "stop"
            }]
        }))
    }

    /// Answers with a JSON description of what it received
    async fn echo(headers: HeaderMap, uri: Uri, Json(body): Json<Value>) -> Json<Value> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };
        let seen = json!({
            "authorization": header("authorization"),
            "api_key": header("api-key"),
            "uri": uri.to_string(),
            "body": body,
        });
        reply(&seen.to_string())
    }

    fn echo_server() -> Router {
        Router::new()
            .route("/v1/chat/completions", post(echo))
            .route("/v1/openai/deployments/:engine/chat/completions", post(echo))
    }

    async fn round_trip(api_type: ApiType) -> Value {
        let addr = serve(echo_server()).await;
        let client = local_client(api_type, addr, &ClientSettings::default());
        let messages = [
            Message::new(Role::System, "seed"),
            Message::new(Role::User, "hello"),
        ];

        let reply = client.complete(&messages).await.unwrap();
        serde_json::from_str(&reply).unwrap()
    }

    #[tokio::test]
    async fn test_openai_sends_bearer_token() {
        let seen = round_trip(ApiType::OpenAi).await;

        assert_eq!(seen["authorization"], "Bearer test-key");
        assert!(seen["api_key"].is_null());
        assert_eq!(seen["uri"], "/v1/chat/completions");
        assert_eq!(seen["body"]["model"], "gpt-3.5-turbo-0125");
        assert_eq!(seen["body"]["stop"], json!(["Human:", "AI:"]));
        assert_eq!(seen["body"]["messages"][1]["content"], "hello");
    }

    #[tokio::test]
    async fn test_azure_sends_api_key_header() {
        let seen = round_trip(ApiType::Azure).await;

        assert_eq!(seen["api_key"], "test-key");
        assert!(seen["authorization"].is_null());
        assert_eq!(
            seen["uri"],
            "/v1/openai/deployments/chat-deploy/chat/completions?api-version=2023-05-15"
        );
        assert!(seen["body"].get("model").is_none());
        assert_eq!(seen["body"]["stop"], json!(["Human:", "AI:"]));
    }

    #[tokio::test]
    async fn test_rate_limited_answer() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                let body = json!({ "error": { "message": "Slow down" } });
                (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response()
            }),
        );
        let addr = serve(app).await;
        let client = local_client(ApiType::OpenAi, addr, &ClientSettings::default());

        match client.complete(&[Message::new(Role::User, "hi")]).await {
            Err(CompletionError::RateLimit(msg)) => assert_eq!(msg, "Slow down"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_slow_provider_times_out() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                reply("too late")
            }),
        );
        let addr = serve(app).await;
        let settings = ClientSettings {
            timeout_secs: 1,
            ..ClientSettings::default()
        };
        let client = local_client(ApiType::OpenAi, addr, &settings);

        match client.complete(&[Message::new(Role::User, "hi")]).await {
            Err(CompletionError::Network(msg)) => assert!(msg.contains("timed out")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_endpoints() {
        assert_eq!(
            client(ApiType::OpenAi).endpoint(),
            "https://example.test/v1/chat/completions"
        );
        assert_eq!(
            client(ApiType::Azure).endpoint(),
            "https://example.test/v1/openai/deployments/chat-deploy/chat/completions?api-version=2023-05-15"
        );
    }

    #[test]
    fn test_request_carries_generation_settings() {
        let client = client(ApiType::OpenAi);
        let messages = vec![
            Message::new(Role::System, "seed"),
            Message::new(Role::User, "Tell me a fact"),
        ];

        let json = serde_json::to_value(client.build_request(&messages)).unwrap();
        assert_eq!(json["model"], "gpt-3.5-turbo-0125");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "Tell me a fact");
        assert_eq!(json["max_tokens"], 1000);
        assert_eq!(json["frequency_penalty"], 1.0);
        assert_eq!(json["stop"], serde_json::json!(["Human:", "AI:"]));
    }

    #[test]
    fn test_azure_request_omits_model() {
        let client = client(ApiType::Azure);
        let json = serde_json::to_value(client.build_request(&[])).unwrap();
        assert!(json.get("model").is_none());
    }

    #[test]
    fn test_parse_reply() {
        let body = r#"{
            "choices": [{"message": {"role": "assistant", "content": "Dinosaurs had feathers."}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 5, "total_tokens": 17}
        }"#;
        assert_eq!(parse_reply(body).unwrap(), "Dinosaurs had feathers.");
    }

    #[test]
    fn test_parse_reply_failures() {
        assert!(matches!(
            parse_reply("not json"),
            Err(CompletionError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_reply(r#"{"choices": []}"#),
            Err(CompletionError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_reply(r#"{"choices": [{"message": {"content": null}}]}"#),
            Err(CompletionError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_classify_failure() {
        let api_body = r#"{"error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}}"#;

        match classify_failure(StatusCode::UNAUTHORIZED, api_body) {
            CompletionError::Auth(msg) => assert_eq!(msg, "Incorrect API key provided"),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(
            classify_failure(StatusCode::TOO_MANY_REQUESTS, ""),
            CompletionError::RateLimit(_)
        ));
        assert!(matches!(
            classify_failure(StatusCode::BAD_GATEWAY, "upstream down"),
            CompletionError::Network(_)
        ));
        match classify_failure(StatusCode::BAD_REQUEST, "oops") {
            CompletionError::Rejected { status, message } => {
                assert_eq!(status, 400);
                assert!(message.contains("oops"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
