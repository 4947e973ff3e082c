//! One capture, end to end: normalize, dispatch with failover, parse, persist.
//!
//! Every capture that decodes produces exactly one audit record, whether or not any model
//! answered. The only way out without a record is a photo that cannot be decoded (it never
//! became a capture) or a persistence failure, which is reported as [`PipelineError::NotSaved`]
//! and never as a verdict.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::gateway::{GatewayOutcome, ModelGateway};
use crate::normalizer::{ImageNormalizer, NormalizeError};
use crate::persistence::{AuditRecord, PersistenceError, PersistenceWriter};
use crate::types::Capture;
use crate::verdict::{Status, Verdict};

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The upload is not a usable photo; nothing was dispatched or recorded.
    #[error("invalid photo: {0}")]
    InvalidImage(#[source] NormalizeError),

    /// A decoded photo could not be re-encoded for the archive. Not the uploader's fault.
    #[error("archive form could not be built: {0}")]
    Archive(#[source] NormalizeError),

    #[error("audit record not saved: {0}")]
    NotSaved(#[from] PersistenceError),

    #[error("photo processing task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// What the submitting actor is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// A model judged the checkpoint compliant
    Pass,
    /// A model judged the checkpoint non-compliant
    Fail,
    /// No model verdict; the recorded FAIL asks the actor to resubmit
    SystemError,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Pass => "pass",
            Outcome::Fail => "fail",
            Outcome::SystemError => "system_error",
        }
    }
}

/// A recorded capture.
#[derive(Debug, Clone)]
pub struct Submission {
    pub verdict: Verdict,
    pub record: AuditRecord,
    /// Whether the verdict came from genuine model text
    pub delivered: bool,
}

impl Submission {
    pub fn outcome(&self) -> Outcome {
        match (self.delivered, self.verdict.status) {
            (false, _) => Outcome::SystemError,
            (true, Status::Pass) => Outcome::Pass,
            (true, Status::Fail) => Outcome::Fail,
        }
    }
}

struct Encoded {
    archive: Vec<u8>,
    transport: Result<Vec<u8>, NormalizeError>,
}

#[derive(Clone)]
pub struct AuditPipeline {
    normalizer: ImageNormalizer,
    gateway: Arc<ModelGateway>,
    writer: PersistenceWriter,
}

impl AuditPipeline {
    pub fn new(normalizer: ImageNormalizer, gateway: Arc<ModelGateway>, writer: PersistenceWriter) -> Self {
        Self {
            normalizer,
            gateway,
            writer,
        }
    }

    pub fn gateway(&self) -> &Arc<ModelGateway> {
        &self.gateway
    }

    #[instrument(skip_all, fields(store_code = %capture.actor.store_code, upload_len = capture.image.len()))]
    pub async fn submit(&self, capture: Capture, cancel: &CancellationToken) -> Result<Submission, PipelineError> {
        let encoded = self.encode(&capture).await??;

        let outcome = match &encoded.transport {
            Ok(transport) => self.gateway.dispatch(transport, cancel).await,
            Err(e) => {
                warn!(error = %e, "Transport form unavailable, skipping inference");
                GatewayOutcome::NotDispatched { reason: e.to_string() }
            }
        };

        let verdict = Verdict::parse(&outcome.to_text());
        let delivered = outcome.is_delivered();

        let record = self
            .writer
            .write(&capture.actor, &verdict, encoded.archive, capture.captured_at)
            .await?;

        let submission = Submission {
            verdict,
            record,
            delivered,
        };
        let result = submission.outcome();
        metrics::counter!("storeaudit_submissions_total", "outcome" => result.as_str()).increment(1);
        info!(
            outcome = result.as_str(),
            attempts = outcome.attempts(),
            category = %submission.verdict.category,
            "Capture recorded"
        );

        Ok(submission)
    }

    /// Decode once and build both forms off the async runtime.
    ///
    /// The archive form is built first and independently, so a capture whose transport form
    /// fails is still archived.
    async fn encode(&self, capture: &Capture) -> Result<Result<Encoded, PipelineError>, tokio::task::JoinError> {
        let normalizer = self.normalizer.clone();
        let bytes = capture.image.clone();

        tokio::task::spawn_blocking(move || -> Result<Encoded, PipelineError> {
            let image = normalizer.decode(&bytes).map_err(PipelineError::InvalidImage)?;
            let archive = normalizer.to_archive_form(&image).map_err(PipelineError::Archive)?;
            let transport = normalizer.to_transport_form(&image);
            Ok(Encoded { archive, transport })
        })
        .await
    }
}
