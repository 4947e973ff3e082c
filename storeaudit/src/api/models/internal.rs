use serde::{Deserialize, Serialize};

/// Candidate list after a forced refresh, in dispatch order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidatesResponse {
    pub candidates: Vec<String>,
}
