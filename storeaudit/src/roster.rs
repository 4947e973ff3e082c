//! Store roster: resolves a store code to the manager a capture is attributed to.
//!
//! The roster file is a CSV with a header row. Columns used:
//!
//! | Column           | Meaning                                     |
//! |------------------|---------------------------------------------|
//! | `Store Code`     | lookup key, compared as trimmed text        |
//! | `SM Name - USER` | manager display name, `Manager` when blank  |
//! | `Cluster`        | optional group id                           |
//!
//! Other columns are ignored. The parsed file is cached process-wide for the configured TTL.

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use moka::future::Cache;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::types::Actor;

const STORE_CODE_COLUMN: &str = "Store Code";
const MANAGER_COLUMN: &str = "SM Name - USER";
const GROUP_COLUMN: &str = "Cluster";
const DEFAULT_MANAGER: &str = "Manager";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RosterEntry {
    pub store_code: String,
    pub manager_name: String,
    pub group_id: Option<String>,
}

impl RosterEntry {
    pub fn actor(&self) -> Actor {
        Actor {
            store_code: self.store_code.clone(),
            manager_name: self.manager_name.clone(),
        }
    }
}

#[async_trait]
pub trait Roster: Send + Sync {
    /// `None` for an unknown store code.
    async fn lookup(&self, store_code: &str) -> anyhow::Result<Option<RosterEntry>>;

    /// Drop cached roster data so the next lookup reloads it.
    async fn invalidate(&self);
}

type Entries = Arc<HashMap<String, RosterEntry>>;

/// Roster backed by a CSV file.
pub struct CsvRoster {
    path: PathBuf,
    cache: Cache<(), Entries>,
}

impl CsvRoster {
    pub fn new(path: PathBuf, ttl: Duration) -> Self {
        Self {
            path,
            cache: Cache::builder().max_capacity(1).time_to_live(ttl).build(),
        }
    }

    async fn entries(&self) -> anyhow::Result<Entries> {
        self.cache
            .try_get_with((), async {
                let text = tokio::fs::read_to_string(&self.path)
                    .await
                    .with_context(|| format!("failed to read roster {}", self.path.display()))?;
                let entries = parse_roster(&text)?;
                debug!(stores = entries.len(), path = %self.path.display(), "Loaded store roster");
                Ok::<_, anyhow::Error>(Arc::new(entries))
            })
            .await
            .map_err(|e| anyhow!("{e:#}"))
    }
}

#[async_trait]
impl Roster for CsvRoster {
    #[instrument(skip(self))]
    async fn lookup(&self, store_code: &str) -> anyhow::Result<Option<RosterEntry>> {
        let entries = self.entries().await?;
        Ok(entries.get(store_code.trim()).cloned())
    }

    async fn invalidate(&self) {
        self.cache.invalidate(&()).await;
    }
}

fn parse_roster(text: &str) -> anyhow::Result<HashMap<String, RosterEntry>> {
    // Spreadsheet exports often lead with a byte-order mark
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());

    let header = reader.headers().context("failed to read roster header")?.clone();
    if header.iter().all(str::is_empty) {
        return Err(anyhow!("roster is empty"));
    }

    let column = |name: &str| header.iter().position(|h| h == name);
    let code_idx = column(STORE_CODE_COLUMN).ok_or_else(|| anyhow!("roster has no '{STORE_CODE_COLUMN}' column"))?;
    let manager_idx = column(MANAGER_COLUMN);
    let group_idx = column(GROUP_COLUMN);

    let mut entries = HashMap::new();
    for (n, row) in reader.records().enumerate() {
        let row = row.with_context(|| format!("malformed roster row {}", n + 1))?;
        let field = |idx: Option<usize>| {
            idx.and_then(|i| row.get(i))
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let Some(store_code) = field(Some(code_idx)) else {
            continue;
        };
        let entry = RosterEntry {
            manager_name: field(manager_idx).unwrap_or_else(|| DEFAULT_MANAGER.to_string()),
            group_id: field(group_idx),
            store_code: store_code.clone(),
        };
        // First row wins for duplicated codes
        entries.entry(store_code).or_insert(entry);
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const ROSTER: &str = "\
Store Code , SM Name - USER ,Cluster,City
 S042 ,Asha Rao,North-1,Pune
S043,,North-1,Pune
\"S044\",\"Iyer, Meera\",,Chennai
";

    fn roster_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_parse_trims_headers_and_values() {
        let entries = parse_roster(ROSTER).unwrap();

        assert_eq!(
            entries["S042"],
            RosterEntry {
                store_code: "S042".to_string(),
                manager_name: "Asha Rao".to_string(),
                group_id: Some("North-1".to_string()),
            }
        );
        assert_eq!(entries["S043"].manager_name, DEFAULT_MANAGER);
        assert_eq!(entries["S044"].manager_name, "Iyer, Meera");
        assert_eq!(entries["S044"].group_id, None);
    }

    #[test]
    fn test_parse_accepts_byte_order_mark() {
        let entries = parse_roster("\u{feff}Store Code,SM Name - USER\nS1,Asha\n").unwrap();
        assert_eq!(entries["S1"].manager_name, "Asha");
    }

    #[test]
    fn test_parse_quoted_field_spanning_lines() {
        let entries = parse_roster("Store Code,SM Name - USER,Cluster\nS1,\"Asha\nRao\",West\nS2,Ravi,East\n").unwrap();

        assert_eq!(entries["S1"].manager_name, "Asha\nRao");
        assert_eq!(entries["S1"].group_id.as_deref(), Some("West"));
        assert_eq!(entries["S2"].manager_name, "Ravi");
    }

    #[test]
    fn test_parse_requires_store_code_column() {
        assert!(parse_roster("Name,City\nA,B\n").is_err());
        assert!(parse_roster("").is_err());
    }

    #[tokio::test]
    async fn test_lookup_known_and_unknown_codes() {
        let file = roster_file(ROSTER);
        let roster = CsvRoster::new(file.path().to_path_buf(), Duration::from_secs(60));

        let entry = roster.lookup(" S042").await.unwrap().unwrap();
        assert_eq!(entry.actor().manager_name, "Asha Rao");
        assert!(roster.lookup("S999").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cached_until_invalidated() {
        let file = roster_file("Store Code,SM Name - USER\nS1,First\n");
        let roster = CsvRoster::new(file.path().to_path_buf(), Duration::from_secs(3600));
        assert_eq!(roster.lookup("S1").await.unwrap().unwrap().manager_name, "First");

        std::fs::write(file.path(), "Store Code,SM Name - USER\nS1,Second\n").unwrap();
        assert_eq!(roster.lookup("S1").await.unwrap().unwrap().manager_name, "First");

        roster.invalidate().await;
        assert_eq!(roster.lookup("S1").await.unwrap().unwrap().manager_name, "Second");
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let roster = CsvRoster::new(PathBuf::from("/nonexistent/stores.csv"), Duration::from_secs(60));
        let err = roster.lookup("S1").await.unwrap_err();
        assert!(err.to_string().contains("failed to read roster"));
    }
}
