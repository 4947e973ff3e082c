use serde::{Deserialize, Serialize};

use crate::roster::RosterEntry;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionCreate {
    pub store_code: String,
}

/// The actor captures will be attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SessionResponse {
    pub store_code: String,
    pub manager_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
}

impl From<RosterEntry> for SessionResponse {
    fn from(entry: RosterEntry) -> Self {
        Self {
            store_code: entry.store_code,
            manager_name: entry.manager_name,
            group_id: entry.group_id,
        }
    }
}
