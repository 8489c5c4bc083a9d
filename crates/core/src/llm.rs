use crate::traits::LanguageModel;
use crate::QaError;
use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";
pub const API_KEY_VAR: &str = "OPENAI_API_KEY";

const SERVICE: &str = "openai";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Chat completions client for OpenAI and API-compatible servers.
///
/// Each call is a single attempt; network and quota failures come back as
/// [`QaError::Upstream`] for the caller to handle.
#[derive(Clone)]
pub struct OpenAiChatModel {
    http_client: Client,
    api_key: String,
    endpoint: Url,
    model: String,
    temperature: f32,
}

impl std::fmt::Debug for OpenAiChatModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiChatModel")
            .field("endpoint", &self.endpoint.as_str())
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .finish_non_exhaustive()
    }
}

impl OpenAiChatModel {
    /// Fails with [`QaError::MissingCredential`] when the key is absent or blank.
    pub fn new(api_key: Option<&str>, base_url: &str, model: impl Into<String>) -> Result<Self, QaError> {
        let api_key = api_key
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(QaError::MissingCredential(API_KEY_VAR))?;

        let base = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))?;
        let endpoint = base.join("chat/completions")?;

        Ok(Self {
            http_client: Client::new(),
            api_key: api_key.to_string(),
            endpoint,
            model: model.into(),
            temperature: 0.0,
        })
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    async fn generate(&self, prompt: &str) -> Result<String, QaError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
        };

        let response = self
            .http_client
            .post(self.endpoint.clone())
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|error| QaError::upstream(SERVICE, error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = match response.text().await {
                Ok(body) => body,
                Err(error) => format!("<body unreadable: {error}>"),
            };
            return Err(QaError::upstream(SERVICE, format!("{status}: {body}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|error| QaError::upstream(SERVICE, format!("unreadable response: {error}")))?;

        let answer = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| QaError::upstream(SERVICE, "response contained no choices"))?;

        debug!(model = %self.model, chars = answer.len(), "chat completion received");
        Ok(answer.trim().to_string())
    }
}
