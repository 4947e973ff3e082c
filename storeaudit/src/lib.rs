//! # storeaudit: photo audits for retail checkpoints
//!
//! Field staff photograph a retail checkpoint (trial room, staff grooming, store entrance,
//! merchandise display) and receive an automated compliance verdict. Every submission is
//! durably logged for supervisory review, including the ones no model managed to judge.
//!
//! ## Pipeline
//!
//! Each capture runs once through four stages, sequentially and without shared mutable
//! state:
//!
//! 1. [`normalizer`]: decode the upload and produce two bounded JPEG encodings, a transport
//!    form for inference and a lower-quality archive form kept as evidence.
//! 2. [`gateway`]: send the transport form and the instruction prompt to an ordered list of
//!    inference candidates, one attempt each under a per-attempt timeout. Transient failures
//!    (rate limits, overload, unknown model, transport faults) move on to the next candidate;
//!    terminal rejections abort immediately. When every candidate fails transiently the
//!    gateway returns a reserved sentinel.
//! 3. [`verdict`]: turn whatever text came back into a `{category, PASS|FAIL, reason}`
//!    verdict. The parser never fails and every fallback is FAIL, so an unanswered request is
//!    never recorded as compliant.
//! 4. [`persistence`]: upload the archive photo and append an audit record. A failure here is
//!    reported as "not saved", never as a FAIL verdict.
//!
//! [`pipeline`] wires the stages together; [`api`] exposes them over HTTP behind a
//! store-code roster ([`roster`]).
//!
//! ## Configuration
//!
//! See [`config`]. Inference and Supabase credentials come from `GOOGLE_API_KEY`,
//! `SUPABASE_URL` and `SUPABASE_KEY`; their absence is a startup error.
//!
//! ## Running
//!
//! ```bash
//! GOOGLE_API_KEY=... SUPABASE_URL=... SUPABASE_KEY=... storeaudit -f config.yaml
//! ```

pub mod api;
pub mod config;
pub mod errors;
pub mod gateway;
pub mod normalizer;
pub mod persistence;
pub mod pipeline;
pub mod roster;
pub mod telemetry;
pub mod types;
pub mod verdict;

#[cfg(test)]
mod test_utils;

use anyhow::{Context, anyhow};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, debug, info};

use crate::config::{RecordsConfig, StorageConfig};
use crate::gateway::{
    FailoverPolicy, ModelGateway,
    client::ReqwestInferenceClient,
    discovery::{CandidateDirectory, FetchModels},
    prompt::DEFAULT_PROMPT,
};
use crate::normalizer::ImageNormalizer;
use crate::persistence::{
    ObjectStore, PersistenceWriter, RecordStore, local::LocalObjectStore, postgres::PostgresRecordStore,
    supabase::{SupabaseObjectStore, SupabaseRecordStore},
};
use crate::pipeline::AuditPipeline;
use crate::roster::{CsvRoster, Roster};

pub use config::Config;

/// Shared state handed to every handler.
///
/// # Example
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .pipeline(pipeline)
///     .roster(roster)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub pipeline: AuditPipeline,
    pub roster: Arc<dyn Roster>,
    /// Cancelled on shutdown; in-flight captures stop at their next attempt boundary
    #[builder(default)]
    pub shutdown: CancellationToken,
}

/// Build the audit pipeline and its collaborators from configuration.
pub async fn build_pipeline(config: &Config) -> anyhow::Result<AuditPipeline> {
    let api_key = config
        .gateway
        .api_key
        .clone()
        .ok_or_else(|| anyhow!("gateway.api_key is not configured"))?;
    let client = Arc::new(ReqwestInferenceClient::new(config.gateway.base_url.clone(), api_key));

    let candidates = config.gateway.candidates.clone();
    let directory = if config.gateway.discovery.enabled {
        let fetcher: Arc<dyn FetchModels> = client.clone();
        CandidateDirectory::discovering(candidates, fetcher, &config.gateway.discovery)
    } else {
        CandidateDirectory::fixed(candidates)
    };

    let prompt = config.gateway.prompt.clone().unwrap_or_else(|| DEFAULT_PROMPT.to_string());
    let gateway = ModelGateway::new(
        client,
        Arc::new(directory),
        FailoverPolicy::from_config(&config.gateway),
        prompt,
    );

    let supabase = || {
        config
            .supabase_credentials()
            .ok_or_else(|| anyhow!("supabase.url and supabase.api_key are required"))
    };

    let objects: Arc<dyn ObjectStore> = match &config.storage {
        StorageConfig::Supabase { bucket } => {
            let (url, key) = supabase()?;
            Arc::new(SupabaseObjectStore::new(&url, &key, bucket.clone()))
        }
        StorageConfig::Local { path, public_base_url } => {
            Arc::new(LocalObjectStore::new(path.clone(), public_base_url.clone()))
        }
    };

    let records: Arc<dyn RecordStore> = match &config.records {
        RecordsConfig::Supabase { table } => {
            let (url, key) = supabase()?;
            Arc::new(SupabaseRecordStore::new(&url, &key, table.clone()))
        }
        RecordsConfig::Postgres { url } => Arc::new(
            PostgresRecordStore::connect(url)
                .await
                .context("failed to connect to the audit record database")?,
        ),
    };

    Ok(AuditPipeline::new(
        ImageNormalizer::new(&config.normalizer),
        Arc::new(gateway),
        PersistenceWriter::new(objects, records),
    ))
}

/// Build the application router.
pub fn build_router(state: &AppState) -> Router {
    let api_routes = Router::new()
        .route("/sessions", post(api::handlers::sessions::create_session))
        .route("/audits", post(api::handlers::audits::submit_audit))
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes));

    let internal_routes = Router::new()
        .route("/candidates/refresh", post(api::handlers::internal::refresh_candidates))
        .route("/roster/refresh", post(api::handlers::internal::refresh_roster));

    let mut router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .nest("/api/v1", api_routes)
        .nest("/internal", internal_routes)
        .with_state(state.clone());

    if state.config.enable_metrics {
        // Installs the global recorder, so the pipeline and gateway counters are rendered too
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    )
}

pub struct Application {
    router: Router,
    config: Config,
    shutdown: CancellationToken,
}

impl Application {
    /// Create a new application instance with all collaborators initialized.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting storeaudit with configuration: {:#?}", config);

        let pipeline = build_pipeline(&config).await?;
        let roster: Arc<dyn Roster> = Arc::new(CsvRoster::new(config.roster.path.clone(), config.roster.ttl));

        let state = AppState::builder().config(config).pipeline(pipeline).roster(roster).build();
        Ok(Self::from_state(state))
    }

    pub fn from_state(state: AppState) -> Self {
        Self {
            router: build_router(&state),
            config: state.config,
            shutdown: state.shutdown,
        }
    }

    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router.into_make_service()).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "storeaudit listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        let token = self.shutdown.clone();
        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(async move {
                shutdown.await;
                token.cancel();
            })
            .await?;

        info!("Server stopped");
        Ok(())
    }
}
