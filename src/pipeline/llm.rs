//! Model interaction: build the multimodal request, send it, read the answer.
//!
//! One run makes exactly one chat-completion call. The request carries a
//! single user message whose content is the analysis prompt followed by one
//! `image_url` part per encoded image, in sample order:
//!
//! ```json
//! {"model": "…", "max_tokens": 1000,
//!  "messages": [{"role": "user", "content": [
//!     {"type": "text", "text": "Analyze these document images…"},
//!     {"type": "image_url", "image_url": {"url": "data:image/jpeg;base64,…"}}]}]}
//! ```
//!
//! There is no retry: a network failure or non-2xx status is returned as
//! [`AnalysisError::Transport`] straight away. The raw response body is kept
//! as a [`ResponseEnvelope`] so the caller can persist it verbatim;
//! [`extract_text`] validates the `choices[0].message.content` path and turns
//! any gap into [`AnalysisError::MalformedResponse`].

use crate::config::{mask_secret, AnalysisConfig};
use crate::error::AnalysisError;
use crate::pipeline::encode::EncodedImage;
use crate::prompts::build_prompt;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Longest slice of an error body quoted in a transport error.
const ERROR_BODY_PREVIEW: usize = 500;

// ── Request ──────────────────────────────────────────────────────────────

/// Chat-completion request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: Vec<ContentPart>,
}

/// One element of a multimodal message's `content` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// Assemble the request: prompt first, then the images in the order given.
pub fn build_request<S: AsRef<str>>(
    model: &str,
    max_tokens: usize,
    images: &[EncodedImage],
    material_types: &[S],
) -> ChatRequest {
    let mut content = Vec::with_capacity(images.len() + 1);
    content.push(ContentPart::Text {
        text: build_prompt(material_types),
    });
    content.extend(images.iter().map(|img| ContentPart::ImageUrl {
        image_url: ImageUrl {
            url: img.data_url(),
        },
    }));

    ChatRequest {
        model: model.to_string(),
        messages: vec![ChatMessage {
            role: "user".to_string(),
            content,
        }],
        max_tokens,
    }
}

// ── Response ─────────────────────────────────────────────────────────────

/// The response body exactly as the endpoint returned it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseEnvelope(pub serde_json::Value);

impl ResponseEnvelope {
    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_value(self) -> serde_json::Value {
        self.0
    }
}

impl From<serde_json::Value> for ResponseEnvelope {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

#[derive(Debug, Deserialize)]
struct Completion {
    choices: Option<Vec<Choice>>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<AssistantMessage>,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

/// Pull `choices[0].message.content` out of `envelope`.
pub fn extract_text(envelope: &ResponseEnvelope) -> Result<String, AnalysisError> {
    let malformed = |detail: String| {
        warn!("Error extracting analysis from LLM response: {}", detail);
        debug!(
            "Response structure: {}",
            serde_json::to_string_pretty(envelope.as_value()).unwrap_or_default()
        );
        AnalysisError::MalformedResponse { detail }
    };

    let completion: Completion = serde_json::from_value(envelope.as_value().clone())
        .map_err(|e| malformed(format!("unexpected response shape: {e}")))?;

    let choices = completion
        .choices
        .ok_or_else(|| malformed("missing `choices`".into()))?;
    let first = choices
        .into_iter()
        .next()
        .ok_or_else(|| malformed("`choices` is empty".into()))?;
    let message = first
        .message
        .ok_or_else(|| malformed("missing `choices[0].message`".into()))?;
    message
        .content
        .ok_or_else(|| malformed("missing `choices[0].message.content`".into()))
}

// ── Client ───────────────────────────────────────────────────────────────

/// Sends one analysis request for a batch of encoded images.
#[async_trait]
pub trait VisionClient: Send + Sync {
    async fn analyze(
        &self,
        images: &[EncodedImage],
        material_types: &[String],
    ) -> Result<ResponseEnvelope, AnalysisError>;
}

/// [`VisionClient`] for an OpenAI-style `/chat/completions` endpoint with
/// bearer-token authentication.
#[derive(Clone)]
pub struct ChatCompletionsClient {
    http: reqwest::Client,
    api_key: String,
    api_url: String,
    model: String,
    max_tokens: usize,
}

impl fmt::Debug for ChatCompletionsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatCompletionsClient")
            .field("api_key", &mask_secret(&self.api_key))
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl ChatCompletionsClient {
    /// Build a client from `config`; fails without a non-empty API key.
    pub fn from_config(config: &AnalysisConfig) -> Result<Self, AnalysisError> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(AnalysisError::MissingApiKey)?
            .to_string();

        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder.build().map_err(|e| AnalysisError::Transport {
            url: config.api_url.clone(),
            status: None,
            reason: e.to_string(),
        })?;

        Ok(Self {
            http,
            api_key,
            api_url: config.api_url.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }

    fn transport_error(&self, status: Option<u16>, reason: String) -> AnalysisError {
        AnalysisError::Transport {
            url: self.api_url.clone(),
            status,
            reason,
        }
    }
}

#[async_trait]
impl VisionClient for ChatCompletionsClient {
    async fn analyze(
        &self,
        images: &[EncodedImage],
        material_types: &[String],
    ) -> Result<ResponseEnvelope, AnalysisError> {
        info!("Sending {} images to LLM for analysis", images.len());
        let request = build_request(&self.model, self.max_tokens, images, material_types);
        let start = Instant::now();

        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(None, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let preview: String = body.chars().take(ERROR_BODY_PREVIEW).collect();
            warn!("LLM API returned HTTP {}: {}", status, preview);
            return Err(self.transport_error(Some(status.as_u16()), preview));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(Some(status.as_u16()), e.to_string()))?;
        let value: serde_json::Value =
            serde_json::from_slice(&body).map_err(|e| AnalysisError::MalformedResponse {
                detail: format!("response body is not JSON: {e}"),
            })?;

        debug!(
            "LLM responded with HTTP {} in {:?} ({} bytes)",
            status,
            start.elapsed(),
            body.len()
        );
        Ok(ResponseEnvelope(value))
    }
}
