//! Test harness: the full router over scripted inference and in-memory stores.

use axum_test::TestServer;
use image::{DynamicImage, ImageFormat};
use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, GatewayConfig};
use crate::gateway::client::MockInferenceClient;
use crate::gateway::discovery::CandidateDirectory;
use crate::gateway::{FailoverPolicy, ModelGateway};
use crate::normalizer::ImageNormalizer;
use crate::persistence::PersistenceWriter;
use crate::persistence::in_memory::{InMemoryObjectStore, InMemoryRecordStore};
use crate::pipeline::AuditPipeline;
use crate::roster::CsvRoster;
use crate::{AppState, Application};

pub const TEST_ROSTER: &str = "\
Store Code,SM Name - USER,Cluster
S042,Asha Rao,North-1
S043,,North-1
";

pub struct TestContext {
    pub server: TestServer,
    pub inference: MockInferenceClient,
    pub objects: Arc<InMemoryObjectStore>,
    pub records: Arc<InMemoryRecordStore>,
    pub roster_path: PathBuf,
    _roster_file: tempfile::NamedTempFile,
}

pub fn create_test_config() -> Config {
    Config {
        gateway: GatewayConfig {
            api_key: Some("test-key".to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub async fn create_test_app(candidates: &[&str]) -> TestContext {
    let config = create_test_config();

    let inference = MockInferenceClient::new();
    let objects = Arc::new(InMemoryObjectStore::new("https://cdn.test"));
    let records = Arc::new(InMemoryRecordStore::new());

    let mut roster_file = tempfile::NamedTempFile::new().expect("Failed to create roster file");
    roster_file
        .write_all(TEST_ROSTER.as_bytes())
        .expect("Failed to write roster file");
    let roster_path = roster_file.path().to_path_buf();

    let gateway = ModelGateway::new(
        Arc::new(inference.clone()),
        Arc::new(CandidateDirectory::fixed(candidates.iter().map(|c| c.to_string()).collect())),
        FailoverPolicy::from_config(&config.gateway),
        "test prompt",
    );
    let pipeline = AuditPipeline::new(
        ImageNormalizer::new(&config.normalizer),
        Arc::new(gateway),
        PersistenceWriter::new(objects.clone(), records.clone()),
    );

    let state = AppState::builder()
        .config(config)
        .pipeline(pipeline)
        .roster(Arc::new(CsvRoster::new(roster_path.clone(), Duration::from_secs(3600))))
        .build();

    TestContext {
        server: Application::from_state(state).into_test_server(),
        inference,
        objects,
        records,
        roster_path,
        _roster_file: roster_file,
    }
}

/// A 1024x768 PNG.
pub fn test_photo() -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::new_rgb8(1024, 768)
        .write_to(&mut out, ImageFormat::Png)
        .expect("Failed to encode test photo");
    out.into_inner()
}
