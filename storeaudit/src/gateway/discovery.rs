//! Candidate list resolution.
//!
//! The directory serves the ordered candidate list the gateway walks. With discovery enabled
//! the provider's model catalogue is listed and the result is cached process-wide for the
//! configured refresh interval; `invalidate` forces the next lookup to list again. Listing
//! failures are not cached and fall back to the configured static list.

use anyhow::anyhow;
use async_trait::async_trait;
use moka::future::Cache;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::client::ReqwestInferenceClient;
use crate::config::DiscoveryConfig;

/// Ordered, read-only list of distinct candidate model identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateList {
    models: Vec<String>,
}

impl CandidateList {
    /// Blank and repeated identifiers are dropped; the first occurrence keeps its position.
    pub fn new(models: Vec<String>) -> Self {
        let mut distinct: Vec<String> = Vec::with_capacity(models.len());
        for model in models {
            let model = model.trim();
            if !model.is_empty() && !distinct.iter().any(|m| m == model) {
                distinct.push(model.to_string());
            }
        }
        Self { models: distinct }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.models.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.models
    }
}

/// One entry of the provider's model catalogue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogueModel {
    /// Model identifier without the `models/` prefix
    pub name: String,
    pub supports_generate_content: bool,
}

/// Lists the models an inference provider currently offers.
#[async_trait]
pub trait FetchModels: Send + Sync {
    async fn fetch(&self) -> anyhow::Result<Vec<CatalogueModel>>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelsResponse {
    #[serde(default)]
    models: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelEntry {
    name: String,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}

#[async_trait]
impl FetchModels for ReqwestInferenceClient {
    async fn fetch(&self) -> anyhow::Result<Vec<CatalogueModel>> {
        let url = self.endpoint("models");
        debug!("Fetching model catalogue from {}", url);

        let response = self
            .http()
            .get(&url)
            .query(&[("pageSize", "1000")])
            .header("x-goog-api-key", self.api_key())
            .timeout(Duration::from_secs(30))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Model catalogue request failed: {} - {}", status, body));
        }

        let body_text = response.text().await?;
        let parsed: ModelsResponse =
            serde_json::from_str(&body_text).map_err(|e| anyhow!("error decoding model catalogue: {}", e))?;

        Ok(parsed
            .models
            .into_iter()
            .map(|entry| CatalogueModel {
                name: entry.name.trim_start_matches("models/").to_string(),
                supports_generate_content: entry.supported_generation_methods.iter().any(|m| m == "generateContent"),
            })
            .collect())
    }
}

struct Discovery {
    fetcher: Arc<dyn FetchModels>,
    prefer: String,
    max_candidates: usize,
}

pub struct CandidateDirectory {
    fallback: Arc<CandidateList>,
    discovery: Option<Discovery>,
    cache: Cache<(), Arc<CandidateList>>,
}

impl CandidateDirectory {
    /// A directory that always serves `candidates`.
    pub fn fixed(candidates: Vec<String>) -> Self {
        Self {
            fallback: Arc::new(CandidateList::new(candidates)),
            discovery: None,
            cache: Cache::builder().max_capacity(1).build(),
        }
    }

    /// A directory that lists the catalogue via `fetcher`, falling back to `fallback`.
    pub fn discovering(fallback: Vec<String>, fetcher: Arc<dyn FetchModels>, config: &DiscoveryConfig) -> Self {
        Self {
            fallback: Arc::new(CandidateList::new(fallback)),
            discovery: Some(Discovery {
                fetcher,
                prefer: config.prefer.to_lowercase(),
                max_candidates: config.max_candidates.max(1),
            }),
            cache: Cache::builder()
                .max_capacity(1)
                .time_to_live(config.refresh_interval)
                .build(),
        }
    }

    /// The candidate list to walk for the next capture.
    #[instrument(skip(self))]
    pub async fn current(&self) -> Arc<CandidateList> {
        let Some(discovery) = &self.discovery else {
            return self.fallback.clone();
        };

        // Concurrent callers share one listing; errors are not cached
        let resolved = self
            .cache
            .try_get_with((), async {
                let models = discovery.fetcher.fetch().await?;
                let list = rank_candidates(models, &discovery.prefer, &self.fallback, discovery.max_candidates);
                debug!(candidates = ?list.as_slice(), "Discovered candidate list");
                Ok::<_, anyhow::Error>(Arc::new(list))
            })
            .await;

        match resolved {
            Ok(list) => list,
            Err(e) => {
                warn!(error = %e, "Model discovery failed, using configured candidates");
                self.fallback.clone()
            }
        }
    }

    /// Drop the cached list so the next `current()` lists the catalogue again.
    pub async fn invalidate(&self) {
        self.cache.invalidate(&()).await;
    }
}

/// Preferred catalogue models first, then the static list, then the remaining catalogue models.
fn rank_candidates(models: Vec<CatalogueModel>, prefer: &str, fallback: &CandidateList, max: usize) -> CandidateList {
    let usable: Vec<String> = models
        .into_iter()
        .filter(|m| m.supports_generate_content)
        .map(|m| m.name)
        .collect();

    let (preferred, others): (Vec<String>, Vec<String>) =
        usable.into_iter().partition(|name| name.to_lowercase().contains(prefer));

    let mut ordered: Vec<String> = Vec::new();
    for name in preferred
        .into_iter()
        .chain(fallback.iter().map(str::to_string))
        .chain(others)
    {
        if ordered.len() == max {
            break;
        }
        if !ordered.contains(&name) {
            ordered.push(name);
        }
    }

    CandidateList::new(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn model(name: &str, generate: bool) -> CatalogueModel {
        CatalogueModel {
            name: name.to_string(),
            supports_generate_content: generate,
        }
    }

    struct StubFetcher {
        responses: Mutex<Vec<anyhow::Result<Vec<CatalogueModel>>>>,
        calls: AtomicUsize,
    }

    impl StubFetcher {
        fn new(responses: Vec<anyhow::Result<Vec<CatalogueModel>>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl FetchModels for StubFetcher {
        async fn fetch(&self) -> anyhow::Result<Vec<CatalogueModel>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock();
            if responses.is_empty() {
                return Err(anyhow!("no stub response"));
            }
            responses.remove(0)
        }
    }

    fn discovery_config(max_candidates: usize) -> DiscoveryConfig {
        DiscoveryConfig {
            enabled: true,
            prefer: "Flash".to_string(),
            refresh_interval: Duration::from_secs(600),
            max_candidates,
        }
    }

    #[test]
    fn test_rank_prefers_matching_models_then_static_list() {
        let fallback = CandidateList::new(vec!["gemini-1.5-pro".to_string(), "gemini-1.5-flash".to_string()]);
        let ranked = rank_candidates(
            vec![
                model("embedding-001", false),
                model("gemini-1.5-pro", true),
                model("gemini-2.0-flash", true),
                model("gemini-1.5-flash", true),
                model("gemini-exp", true),
            ],
            "flash",
            &fallback,
            10,
        );

        assert_eq!(
            ranked.as_slice(),
            ["gemini-2.0-flash", "gemini-1.5-flash", "gemini-1.5-pro", "gemini-exp"]
        );
    }

    #[test]
    fn test_rank_caps_list_length() {
        let fallback = CandidateList::new(vec!["pro".to_string()]);
        let ranked = rank_candidates(
            vec![model("a-flash", true), model("b-flash", true), model("c-flash", true)],
            "flash",
            &fallback,
            2,
        );
        assert_eq!(ranked.as_slice(), ["a-flash", "b-flash"]);
    }

    #[tokio::test]
    async fn test_fixed_directory_serves_static_list() {
        let directory = CandidateDirectory::fixed(vec!["a".to_string(), "b".to_string()]);
        let list = directory.current().await;
        assert_eq!(list.as_slice(), ["a", "b"]);
    }

    #[test]
    fn test_candidate_list_drops_repeats_keeping_first_position() {
        let list = CandidateList::new(vec![
            "b".to_string(),
            "a".to_string(),
            " b ".to_string(),
            String::new(),
            "c".to_string(),
            "a".to_string(),
        ]);
        assert_eq!(list.as_slice(), ["b", "a", "c"]);
        assert_eq!(list.len(), 3);
    }

    #[tokio::test]
    async fn test_discovery_fallback_list_has_no_repeats() {
        let fetcher = StubFetcher::new(vec![Err(anyhow!("catalogue down"))]);
        let directory = CandidateDirectory::discovering(
            vec!["gemini-1.5-pro".to_string(), "gemini-1.5-pro".to_string()],
            fetcher,
            &discovery_config(4),
        );

        assert_eq!(directory.current().await.as_slice(), ["gemini-1.5-pro"]);
    }

    #[tokio::test]
    async fn test_discovered_list_is_cached_until_invalidated() {
        let fetcher = StubFetcher::new(vec![
            Ok(vec![model("gemini-2.0-flash", true)]),
            Ok(vec![model("gemini-2.5-flash", true)]),
        ]);
        let directory = CandidateDirectory::discovering(vec!["gemini-1.5-pro".to_string()], fetcher.clone(), &discovery_config(4));

        let first = directory.current().await;
        let again = directory.current().await;
        assert_eq!(first.as_slice(), ["gemini-2.0-flash", "gemini-1.5-pro"]);
        assert_eq!(first, again);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);

        directory.invalidate().await;
        let refreshed = directory.current().await;
        assert_eq!(refreshed.as_slice(), ["gemini-2.5-flash", "gemini-1.5-pro"]);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_discovery_failure_falls_back_and_is_not_cached() {
        let fetcher = StubFetcher::new(vec![Err(anyhow!("catalogue down")), Ok(vec![model("gemini-2.0-flash", true)])]);
        let directory = CandidateDirectory::discovering(vec!["gemini-1.5-pro".to_string()], fetcher.clone(), &discovery_config(4));

        let fallback = directory.current().await;
        assert_eq!(fallback.as_slice(), ["gemini-1.5-pro"]);

        let discovered = directory.current().await;
        assert_eq!(discovered.as_slice(), ["gemini-2.0-flash", "gemini-1.5-pro"]);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_reqwest_catalogue_listing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1beta/models"))
            .and(query_param("pageSize", "1000"))
            .and(header("x-goog-api-key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "models": [
                    { "name": "models/gemini-1.5-flash", "supportedGenerationMethods": ["generateContent", "countTokens"] },
                    { "name": "models/text-embedding-004", "supportedGenerationMethods": ["embedContent"] }
                ]
            })))
            .mount(&server)
            .await;

        let client = ReqwestInferenceClient::new(server.uri().parse().unwrap(), "secret");
        let models = client.fetch().await.unwrap();

        assert_eq!(
            models,
            vec![model("gemini-1.5-flash", true), model("text-embedding-004", false)]
        );
    }

    #[tokio::test]
    async fn test_reqwest_catalogue_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_string("API key not valid"))
            .mount(&server)
            .await;

        let client = ReqwestInferenceClient::new(server.uri().parse().unwrap(), "bad");
        let err = client.fetch().await.unwrap_err();
        assert!(err.to_string().contains("403"));
    }
}
