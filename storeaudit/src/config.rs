//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The file path
//! defaults to `config.yaml` but can be specified via `-f` or the `STOREAUDIT_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! 1. **YAML config file** - base configuration (default: `config.yaml`)
//! 2. **Environment variables** - variables prefixed with `STOREAUDIT_` override YAML values,
//!    nested fields use double underscores (`STOREAUDIT_GATEWAY__ATTEMPT_TIMEOUT=20s`)
//! 3. **Provider secrets** - `GOOGLE_API_KEY`, `SUPABASE_URL` and `SUPABASE_KEY` are read
//!    verbatim so deployments can reuse the names the providers document
//!
//! ## Example
//!
//! ```yaml
//! port: 3000
//! gateway:
//!   attempt_timeout: 30s
//!   candidates: [gemini-2.0-flash, gemini-1.5-flash, gemini-1.5-pro]
//!   discovery:
//!     enabled: true
//!     prefer: flash
//!     refresh_interval: 10m
//! storage:
//!   type: supabase
//!   bucket: audit-photos
//! records:
//!   type: supabase
//!   table: audit_logs
//! roster:
//!   path: stores.csv
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt, path::PathBuf, time::Duration};
use url::Url;

use crate::errors::Error;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "STOREAUDIT_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Largest accepted photo upload, in bytes
    pub max_upload_bytes: usize,
    /// Expose Prometheus metrics at `/internal/metrics`
    pub enable_metrics: bool,
    /// Inference service and failover policy
    pub gateway: GatewayConfig,
    /// Photo size and quality bounds
    pub normalizer: NormalizerConfig,
    /// Shared Supabase project credentials, used by the supabase storage and record backends
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supabase: Option<SupabaseCredentials>,
    /// Where archive photos are uploaded
    pub storage: StorageConfig,
    /// Where audit records are inserted
    pub records: RecordsConfig,
    /// Store roster used to resolve store codes to managers
    pub roster: RosterConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_upload_bytes: 20 * 1024 * 1024,
            enable_metrics: false,
            gateway: GatewayConfig::default(),
            normalizer: NormalizerConfig::default(),
            supabase: None,
            storage: StorageConfig::default(),
            records: RecordsConfig::default(),
            roster: RosterConfig::default(),
        }
    }
}

/// Inference service connection and the ordered-candidate failover policy.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    /// Base URL of the inference API
    pub base_url: Url,
    /// API key (usually supplied via `GOOGLE_API_KEY`)
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Static candidates in priority order. Also the fallback when discovery fails.
    pub candidates: Vec<String>,
    /// Timeout for a single dispatch attempt
    #[serde(with = "humantime_serde")]
    pub attempt_timeout: Duration,
    /// Non-2xx statuses that move on to the next candidate. Any other non-2xx aborts.
    pub retryable_statuses: BTreeSet<u16>,
    /// Instruction prompt override. The built-in rulebook prompt is used when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Candidate discovery from the provider's model catalogue
    pub discovery: DiscoveryConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".parse().expect("valid default URL"),
            api_key: None,
            candidates: vec![
                "gemini-2.0-flash".to_string(),
                "gemini-1.5-flash".to_string(),
                "gemini-1.5-pro".to_string(),
            ],
            attempt_timeout: Duration::from_secs(30),
            retryable_statuses: [404, 429, 500, 502, 503, 504].into_iter().collect(),
            prompt: None,
            discovery: DiscoveryConfig::default(),
        }
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &redacted(&self.api_key))
            .field("candidates", &self.candidates)
            .field("attempt_timeout", &self.attempt_timeout)
            .field("retryable_statuses", &self.retryable_statuses)
            .field("prompt", &self.prompt.as_ref().map(|_| "<custom>"))
            .field("discovery", &self.discovery)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiscoveryConfig {
    pub enabled: bool,
    /// Catalogue models whose name contains this substring are tried first
    pub prefer: String,
    /// How long a discovered candidate list is reused before the catalogue is listed again
    #[serde(with = "humantime_serde")]
    pub refresh_interval: Duration,
    /// Upper bound on the candidate list, which bounds worst-case latency
    pub max_candidates: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            prefer: "flash".to_string(),
            refresh_interval: Duration::from_secs(600),
            max_candidates: 4,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct NormalizerConfig {
    /// Longest edge, in pixels, of both encoded forms
    pub max_edge: u32,
    /// JPEG quality of the form sent for inference
    pub transport_quality: u8,
    /// JPEG quality of the archived evidence
    pub archive_quality: u8,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            max_edge: 800,
            transport_quality: 85,
            archive_quality: 50,
        }
    }
}

#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SupabaseCredentials {
    pub url: Option<Url>,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl fmt::Debug for SupabaseCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupabaseCredentials")
            .field("url", &self.url.as_ref().map(Url::as_str))
            .field("api_key", &redacted(&self.api_key))
            .finish()
    }
}

fn redacted(secret: &Option<String>) -> Option<&'static str> {
    secret.as_ref().map(|_| "[REDACTED]")
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum StorageConfig {
    /// Supabase storage bucket
    Supabase {
        #[serde(default = "default_bucket")]
        bucket: String,
    },
    /// Local directory, for development
    Local {
        path: PathBuf,
        /// Base URL the directory is served from
        public_base_url: Url,
    },
}

fn default_bucket() -> String {
    "audit-photos".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Supabase { bucket: default_bucket() }
    }
}

#[derive(Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum RecordsConfig {
    /// Supabase (PostgREST) table
    Supabase {
        #[serde(default = "default_table")]
        table: String,
    },
    /// Direct PostgreSQL connection; migrations are applied on startup
    Postgres { url: String },
}

impl fmt::Debug for RecordsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordsConfig::Supabase { table } => f.debug_struct("Supabase").field("table", table).finish(),
            RecordsConfig::Postgres { url } => f
                .debug_struct("Postgres")
                .field("url", &without_password(url))
                .finish(),
        }
    }
}

/// Connection string with any password masked.
fn without_password(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("redacted"));
            }
            parsed.to_string()
        }
        Err(_) => "<unparseable>".to_string(),
    }
}

fn default_table() -> String {
    "audit_logs".to_string()
}

impl Default for RecordsConfig {
    fn default() -> Self {
        RecordsConfig::Supabase { table: default_table() }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RosterConfig {
    pub path: PathBuf,
    /// How long a loaded roster is reused before the file is read again
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("stores.csv"),
            ttl: Duration::from_secs(300),
        }
    }
}

impl Config {
    /// Load configuration from the YAML file and environment, then validate it.
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;

        config
            .validate()
            .map_err(|e| figment::Error::from(format!("Invalid configuration: {}", e.user_message())))?;

        Ok(config)
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            .merge(Yaml::file(&args.config))
            .merge(Env::prefixed("STOREAUDIT_").ignore(&["CONFIG"]).split("__"))
            .merge(Env::raw().only(&["GOOGLE_API_KEY"]).map(|_| "gateway.api_key".into()))
            .merge(Env::raw().only(&["SUPABASE_URL"]).map(|_| "supabase.url".into()))
            .merge(Env::raw().only(&["SUPABASE_KEY"]).map(|_| "supabase.api_key".into()))
    }

    /// Reject configurations the service cannot run with.
    pub fn validate(&self) -> Result<(), Error> {
        let bad = |message: String| Err(Error::BadRequest { message });

        if self.gateway.api_key.as_deref().is_none_or(str::is_empty) {
            return bad("gateway.api_key is required (set GOOGLE_API_KEY)".to_string());
        }
        if self.gateway.attempt_timeout.is_zero() {
            return bad("gateway.attempt_timeout must be greater than zero".to_string());
        }
        if self.gateway.candidates.is_empty() && !self.gateway.discovery.enabled {
            return bad("gateway.candidates must not be empty when discovery is disabled".to_string());
        }
        if self.gateway.discovery.enabled && self.gateway.discovery.max_candidates == 0 {
            return bad("gateway.discovery.max_candidates must be at least 1".to_string());
        }
        if let Some(status) = self.gateway.retryable_statuses.iter().find(|s| (200..300).contains(*s)) {
            return bad(format!("gateway.retryable_statuses cannot contain success status {status}"));
        }

        for (name, quality) in [
            ("transport_quality", self.normalizer.transport_quality),
            ("archive_quality", self.normalizer.archive_quality),
        ] {
            if !(1..=100).contains(&quality) {
                return bad(format!("normalizer.{name} must be within 1..=100, got {quality}"));
            }
        }
        if self.normalizer.max_edge == 0 {
            return bad("normalizer.max_edge must be greater than zero".to_string());
        }

        let needs_supabase =
            matches!(self.storage, StorageConfig::Supabase { .. }) || matches!(self.records, RecordsConfig::Supabase { .. });
        if needs_supabase && self.supabase_credentials().is_none() {
            return bad("supabase.url and supabase.api_key are required (set SUPABASE_URL and SUPABASE_KEY)".to_string());
        }

        Ok(())
    }

    /// Supabase URL and key, when both are configured.
    pub fn supabase_credentials(&self) -> Option<(Url, String)> {
        let creds = self.supabase.as_ref()?;
        match (&creds.url, &creds.api_key) {
            (Some(url), Some(key)) if !key.is_empty() => Some((url.clone(), key.clone())),
            _ => None,
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
