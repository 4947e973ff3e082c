//! Ordered-candidate failover against the inference service.
//!
//! One capture walks the candidate list strictly in order, one attempt at a time:
//!
//! - a 2xx response carrying model text is delivered immediately
//! - a retryable status, an empty 2xx body, a transport fault or a timeout moves on to the
//!   next candidate (a different endpoint *is* the retry; the same one is never repeated)
//! - any other status aborts the walk and surfaces the raw error text
//!
//! Worst-case latency is therefore `candidates × attempt_timeout`. Cancellation is observed
//! only between attempts; an attempt in flight always runs to completion or timeout.

pub mod client;
pub mod discovery;
pub mod prompt;

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::GatewayConfig;
use crate::verdict::{ABORT_MARKER, SERVICE_UNAVAILABLE_SENTINEL};
use client::{InferenceClient, InferenceError, InferenceRequest};
use discovery::CandidateDirectory;

/// What to do with one candidate's response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Deliver,
    RetryNext,
    Abort,
}

impl Disposition {
    fn as_str(&self) -> &'static str {
        match self {
            Disposition::Deliver => "deliver",
            Disposition::RetryNext => "retry_next",
            Disposition::Abort => "abort",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FailoverPolicy {
    pub attempt_timeout: Duration,
    /// Non-2xx statuses treated as transient. Everything else non-2xx is terminal.
    pub retryable_statuses: BTreeSet<u16>,
}

impl FailoverPolicy {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            attempt_timeout: config.attempt_timeout,
            retryable_statuses: config.retryable_statuses.clone(),
        }
    }

    pub fn classify(&self, status: u16) -> Disposition {
        if (200..300).contains(&status) {
            Disposition::Deliver
        } else if self.retryable_statuses.contains(&status) {
            Disposition::RetryNext
        } else {
            Disposition::Abort
        }
    }
}

/// Terminal state of one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayOutcome {
    /// A candidate answered with model text.
    Delivered { candidate: String, text: String, attempts: usize },
    /// A candidate rejected the request outright; remaining candidates were skipped.
    Aborted {
        candidate: String,
        status: u16,
        error_text: String,
        attempts: usize,
    },
    /// Every candidate failed transiently.
    Exhausted { attempts: usize },
    /// Cancelled at an attempt boundary.
    Cancelled { attempts: usize },
    /// The photo never reached the gateway.
    NotDispatched { reason: String },
}

impl GatewayOutcome {
    pub fn attempts(&self) -> usize {
        match self {
            GatewayOutcome::Delivered { attempts, .. }
            | GatewayOutcome::Aborted { attempts, .. }
            | GatewayOutcome::Exhausted { attempts }
            | GatewayOutcome::Cancelled { attempts } => *attempts,
            GatewayOutcome::NotDispatched { .. } => 0,
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, GatewayOutcome::Delivered { .. })
    }

    /// The text handed to the verdict parser.
    ///
    /// Delivered text is passed through, an abort becomes `AI Error <status>: <body>`, and
    /// every outcome without an answer becomes the service-unavailable sentinel.
    pub fn to_text(&self) -> Cow<'_, str> {
        match self {
            GatewayOutcome::Delivered { text, .. } => Cow::Borrowed(text),
            GatewayOutcome::Aborted { status, error_text, .. } => {
                Cow::Owned(format!("{ABORT_MARKER} {status}: {}", error_text.trim()))
            }
            GatewayOutcome::Exhausted { .. } | GatewayOutcome::Cancelled { .. } | GatewayOutcome::NotDispatched { .. } => {
                Cow::Borrowed(SERVICE_UNAVAILABLE_SENTINEL)
            }
        }
    }
}

pub struct ModelGateway {
    client: Arc<dyn InferenceClient>,
    directory: Arc<CandidateDirectory>,
    policy: FailoverPolicy,
    prompt: String,
}

impl ModelGateway {
    pub fn new(
        client: Arc<dyn InferenceClient>,
        directory: Arc<CandidateDirectory>,
        policy: FailoverPolicy,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            client,
            directory,
            policy,
            prompt: prompt.into(),
        }
    }

    pub fn directory(&self) -> &Arc<CandidateDirectory> {
        &self.directory
    }

    /// Dispatch the transport-form photo with failover across the current candidate list.
    #[instrument(skip_all, fields(image_len = transport_jpeg.len()))]
    pub async fn dispatch(&self, transport_jpeg: &[u8], cancel: &CancellationToken) -> GatewayOutcome {
        let candidates = self.directory.current().await;
        let request = InferenceRequest::jpeg(&self.prompt, transport_jpeg);
        let timeout = self.policy.attempt_timeout;
        let mut attempts = 0;

        for candidate in candidates.iter() {
            if cancel.is_cancelled() {
                info!(attempts, "Dispatch cancelled before next candidate");
                return GatewayOutcome::Cancelled { attempts };
            }

            attempts += 1;
            let started = Instant::now();

            let result = match tokio::time::timeout(timeout, self.client.generate(candidate, &request, timeout)).await {
                Ok(result) => result,
                Err(_) => Err(InferenceError::Timeout {
                    candidate: candidate.to_string(),
                    timeout,
                }),
            };

            let response = match result {
                Ok(response) => response,
                Err(e) => {
                    warn!(candidate, attempt = attempts, error = %e, "Candidate unreachable, trying next");
                    record_attempt(Disposition::RetryNext);
                    continue;
                }
            };

            let disposition = self.policy.classify(response.status);
            record_attempt(disposition);
            debug!(
                candidate,
                attempt = attempts,
                status = response.status,
                disposition = disposition.as_str(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Candidate responded"
            );

            match disposition {
                Disposition::Deliver => match response.embedded_text() {
                    Some(text) => {
                        info!(candidate, attempts, "Verdict text delivered");
                        return GatewayOutcome::Delivered {
                            candidate: candidate.to_string(),
                            text,
                            attempts,
                        };
                    }
                    None => {
                        warn!(candidate, attempt = attempts, "Success response carried no model text, trying next");
                    }
                },
                Disposition::RetryNext => {
                    warn!(candidate, attempt = attempts, status = response.status, "Transient failure, trying next candidate");
                }
                Disposition::Abort => {
                    warn!(candidate, attempts, status = response.status, "Terminal failure, aborting dispatch");
                    return GatewayOutcome::Aborted {
                        candidate: candidate.to_string(),
                        status: response.status,
                        error_text: response.body,
                        attempts,
                    };
                }
            }
        }

        warn!(attempts, candidates = candidates.len(), "All candidates exhausted");
        GatewayOutcome::Exhausted { attempts }
    }
}

fn record_attempt(disposition: Disposition) {
    metrics::counter!("storeaudit_gateway_attempts_total", "disposition" => disposition.as_str()).increment(1);
}
