//! Inference client abstraction.
//!
//! The `InferenceClient` trait hides the wire call to one candidate so the failover loop in
//! [`super::ModelGateway`] can be exercised without a live provider.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use parking_lot::Mutex;

use crate::normalizer::JPEG_CONTENT_TYPE;

/// Prompt plus inline image, sent unchanged to every candidate of one capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceRequest {
    pub prompt: String,
    pub mime_type: String,
    /// Base64 (standard alphabet) image bytes
    pub image_base64: String,
}

impl InferenceRequest {
    pub fn jpeg(prompt: &str, jpeg: &[u8]) -> Self {
        Self {
            prompt: prompt.to_string(),
            mime_type: JPEG_CONTENT_TYPE.to_string(),
            image_base64: STANDARD.encode(jpeg),
        }
    }

    /// `generateContent` request body.
    pub fn to_body(&self) -> serde_json::Value {
        json!({
            "contents": [{
                "parts": [
                    { "text": self.prompt },
                    { "inline_data": { "mime_type": self.mime_type, "data": self.image_base64 } }
                ]
            }]
        })
    }
}

/// Raw response from one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceResponse {
    pub status: u16,
    pub body: String,
}

impl InferenceResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Model text at `candidates[0].content.parts[0].text`, if present and not blank.
    pub fn embedded_text(&self) -> Option<String> {
        let value: serde_json::Value = serde_json::from_str(&self.body).ok()?;
        let text = value.pointer("/candidates/0/content/parts/0/text")?.as_str()?;
        if text.trim().is_empty() {
            None
        } else {
            Some(text.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("request to {candidate} failed: {source}")]
    Transport {
        candidate: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("attempt against {candidate} timed out after {timeout:?}")]
    Timeout { candidate: String, timeout: Duration },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Send one request to one candidate.
    ///
    /// Any HTTP status is an `Ok`; classification belongs to the caller. `Err` means the
    /// candidate could not be reached or did not answer in time.
    async fn generate(
        &self,
        candidate: &str,
        request: &InferenceRequest,
        timeout: Duration,
    ) -> Result<InferenceResponse, InferenceError>;
}

// ============================================================================
// Production Implementation using reqwest
// ============================================================================

/// Client for the Gemini `generateContent` API.
#[derive(Clone)]
pub struct ReqwestInferenceClient {
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
}

impl ReqwestInferenceClient {
    pub fn new(base_url: Url, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key: api_key.into(),
        }
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}/v1beta/{}", self.base_url.as_str().trim_end_matches('/'), path)
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.client
    }

    pub(crate) fn api_key(&self) -> &str {
        &self.api_key
    }
}

#[async_trait]
impl InferenceClient for ReqwestInferenceClient {
    #[tracing::instrument(skip(self, request), fields(image_len = request.image_base64.len()))]
    async fn generate(
        &self,
        candidate: &str,
        request: &InferenceRequest,
        timeout: Duration,
    ) -> Result<InferenceResponse, InferenceError> {
        let url = self.endpoint(&format!("models/{candidate}:generateContent"));

        let transport = |source: reqwest::Error| {
            if source.is_timeout() {
                InferenceError::Timeout {
                    candidate: candidate.to_string(),
                    timeout,
                }
            } else {
                InferenceError::Transport {
                    candidate: candidate.to_string(),
                    source,
                }
            }
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request.to_body())
            .timeout(timeout)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(transport)?;

        tracing::debug!(status, response_len = body.len(), "Inference request completed");

        Ok(InferenceResponse { status, body })
    }
}

// ============================================================================
// Test/Mock Implementation
// ============================================================================

struct MockReply {
    delay: Option<Duration>,
    result: Result<InferenceResponse, InferenceError>,
}

/// Record of a call made to the mock client.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub candidate: String,
    pub prompt: String,
    pub image_base64: String,
    pub timeout: Duration,
}

/// Scripted inference client.
///
/// Replies are queued per candidate and consumed in FIFO order. A candidate with no queued
/// reply fails with a transport-style error.
#[derive(Clone, Default)]
pub struct MockInferenceClient {
    replies: Arc<Mutex<HashMap<String, VecDeque<MockReply>>>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
}

impl MockInferenceClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_response(&self, candidate: &str, result: Result<InferenceResponse, InferenceError>) {
        self.push(candidate, None, result);
    }

    /// Queue a reply that only arrives after `delay`.
    pub fn add_delayed_response(&self, candidate: &str, delay: Duration, result: Result<InferenceResponse, InferenceError>) {
        self.push(candidate, Some(delay), result);
    }

    /// Queue a 200 response carrying `text` at the model-text path.
    pub fn add_text(&self, candidate: &str, text: &str) {
        self.add_response(candidate, Ok(Self::text_response(text)));
    }

    /// Queue a bare status response.
    pub fn add_status(&self, candidate: &str, status: u16, body: &str) {
        self.add_response(
            candidate,
            Ok(InferenceResponse {
                status,
                body: body.to_string(),
            }),
        );
    }

    pub fn text_response(text: &str) -> InferenceResponse {
        InferenceResponse {
            status: 200,
            body: json!({
                "candidates": [{ "content": { "parts": [{ "text": text }], "role": "model" } }]
            })
            .to_string(),
        }
    }

    pub fn get_calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Candidates in the order they were tried.
    pub fn called_candidates(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.candidate.clone()).collect()
    }

    fn push(&self, candidate: &str, delay: Option<Duration>, result: Result<InferenceResponse, InferenceError>) {
        self.replies
            .lock()
            .entry(candidate.to_string())
            .or_default()
            .push_back(MockReply { delay, result });
    }
}

#[async_trait]
impl InferenceClient for MockInferenceClient {
    async fn generate(
        &self,
        candidate: &str,
        request: &InferenceRequest,
        timeout: Duration,
    ) -> Result<InferenceResponse, InferenceError> {
        self.calls.lock().push(MockCall {
            candidate: candidate.to_string(),
            prompt: request.prompt.clone(),
            image_base64: request.image_base64.clone(),
            timeout,
        });

        let reply = self.replies.lock().get_mut(candidate).and_then(VecDeque::pop_front);

        match reply {
            Some(MockReply { delay, result }) => {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                result
            }
            None => Err(InferenceError::Other(anyhow::anyhow!(
                "No mock response configured for {candidate}"
            ))),
        }
    }
}
