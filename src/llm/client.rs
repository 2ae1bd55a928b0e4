//! Model collaborator boundary: traits, the HTTP client, and a mock.
//!
//! The pipeline only ever sees [`TextModel`] and [`ImageModel`]; transport
//! details stay behind this module. [`MockTextModel`] queues canned responses
//! for tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::{Client as HttpClient, StatusCode};
use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;

/// One text-generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRequest {
    pub system: String,
    pub prompt: String,
    /// Extended-reasoning token budget, when the backend supports it
    pub reasoning_budget: Option<u32>,
}

impl TextRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
            reasoning_budget: None,
        }
    }

    pub fn with_reasoning_budget(mut self, tokens: Option<u32>) -> Self {
        self.reasoning_budget = tokens;
        self
    }
}

/// Text-generation collaborator: send a request, receive free text that is
/// expected (but not guaranteed) to contain JSON.
#[async_trait]
pub trait TextModel: Send + Sync {
    async fn complete(&self, request: TextRequest) -> Result<String, ModelError>;
}

/// Image-generation collaborator: prompt in, optional image bytes out.
#[async_trait]
pub trait ImageModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<Option<Vec<u8>>, ModelError>;
}

/// Errors at the model boundary.
///
/// `is_retryable` distinguishes transient transport failures from responses
/// that will fail the same way on retry.
#[derive(Debug)]
pub enum ModelError {
    MissingApiKey,
    Http(reqwest::Error),
    Timeout,
    Api { status: StatusCode, message: String },
    Malformed(String),
    MockQueueEmpty,
}

impl ModelError {
    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ModelError::Timeout
        } else {
            ModelError::Http(err)
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            ModelError::Timeout | ModelError::Http(_) => true,
            ModelError::Api { status, .. } => status.is_server_error(),
            ModelError::MissingApiKey | ModelError::Malformed(_) | ModelError::MockQueueEmpty => {
                false
            }
        }
    }
}

impl std::fmt::Display for ModelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelError::MissingApiKey => write!(f, "MEALPLAN_API_KEY is not set"),
            ModelError::Http(err) => write!(f, "http error: {err}"),
            ModelError::Timeout => write!(f, "model request timed out"),
            ModelError::Api { status, message } => {
                write!(f, "model api error {status}: {message}")
            }
            ModelError::Malformed(msg) => write!(f, "malformed model response: {msg}"),
            ModelError::MockQueueEmpty => write!(f, "mock model response queue is empty"),
        }
    }
}

impl std::error::Error for ModelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ModelError::Http(err) => Some(err),
            _ => None,
        }
    }
}

/// Chat-completions HTTP implementation of [`TextModel`].
#[derive(Clone)]
pub struct HttpTextModel {
    http: HttpClient,
    cfg: ModelConfig,
}

impl HttpTextModel {
    pub fn new(cfg: ModelConfig) -> Result<Self, ModelError> {
        let http = HttpClient::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(ModelError::from_reqwest)?;
        Ok(Self { http, cfg })
    }

    fn resolve_api_key(&self) -> Result<String, ModelError> {
        if let Some(key) = &self.cfg.api_key {
            return Ok(key.clone());
        }
        std::env::var("MEALPLAN_API_KEY").map_err(|_| ModelError::MissingApiKey)
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.cfg.base_url.trim_end_matches('/')
        )
    }

    fn build_api_request(&self, request: &TextRequest) -> ApiRequest {
        ApiRequest {
            model: self.cfg.model.clone(),
            messages: vec![
                ApiMessage {
                    role: "system".into(),
                    content: request.system.clone(),
                },
                ApiMessage {
                    role: "user".into(),
                    content: request.prompt.clone(),
                },
            ],
            max_reasoning_tokens: request.reasoning_budget.or(self.cfg.reasoning_budget),
        }
    }
}

#[async_trait]
impl TextModel for HttpTextModel {
    async fn complete(&self, request: TextRequest) -> Result<String, ModelError> {
        let api_key = self.resolve_api_key()?;
        let api_request = self.build_api_request(&request);

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&api_request)
            .send()
            .await
            .map_err(ModelError::from_reqwest)?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(ModelError::from_reqwest)?;

        if !status.is_success() {
            let message = serde_json::from_slice::<ApiErrorEnvelope>(&bytes)
                .map(|env| env.error.message)
                .unwrap_or_else(|_| String::from_utf8_lossy(&bytes).into_owned());
            return Err(ModelError::Api { status, message });
        }

        let parsed: ApiResponse = serde_json::from_slice(&bytes)
            .map_err(|e| ModelError::Malformed(format!("invalid completion envelope: {e}")))?;

        parsed
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .ok_or_else(|| ModelError::Malformed("completion carried no content".to_string()))
    }
}

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_reasoning_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

/// Response-side message; `content` may be null for refusals.
#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Queue-backed [`TextModel`] for tests: responses are popped in FIFO order
/// and every request is recorded for inspection.
#[derive(Default)]
pub struct MockTextModel {
    responses: Mutex<VecDeque<Result<String, ModelError>>>,
    calls: Mutex<Vec<TextRequest>>,
}

impl MockTextModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, response: Result<String, ModelError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn push_text(&self, text: impl Into<String>) {
        self.push_response(Ok(text.into()));
    }

    pub fn push_error(&self, message: impl Into<String>) {
        self.push_response(Err(ModelError::Api {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }));
    }

    pub fn calls(&self) -> Vec<TextRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextModel for MockTextModel {
    async fn complete(&self, request: TextRequest) -> Result<String, ModelError> {
        self.calls.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(ModelError::MockQueueEmpty))
    }
}
