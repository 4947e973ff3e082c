//! Per-capture data shared across the pipeline.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The field actor a capture is attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub store_code: String,
    pub manager_name: String,
}

/// One photo submission. Lives only for the duration of one pipeline run.
#[derive(Debug, Clone)]
pub struct Capture {
    /// Uploaded photo bytes, any supported image format
    pub image: Bytes,
    pub captured_at: DateTime<Utc>,
    pub actor: Actor,
}

impl Capture {
    /// A capture stamped with the current time.
    pub fn now(image: Bytes, actor: Actor) -> Self {
        Self {
            image,
            captured_at: Utc::now(),
            actor,
        }
    }
}
