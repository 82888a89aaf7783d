//! Wikipedia Client
//!
//! Searches page titles through the MediaWiki API and fetches plain-text
//! intro extracts for them.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::KnowledgeSource;
use crate::error::{AdvisorError, Result, check_status};
use crate::model::Summary;

const SERVICE: &str = "Wikipedia";

#[derive(Clone, Debug)]
pub struct WikipediaConfig {
    /// Site root, e.g. `https://en.wikipedia.org`
    pub base_url: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for WikipediaConfig {
    fn default() -> Self {
        Self {
            base_url: "https://en.wikipedia.org".into(),
            timeout_secs: 20,
        }
    }
}

pub struct WikipediaClient {
    client: reqwest::Client,
    api_url: String,
}

impl WikipediaClient {
    pub fn new(config: WikipediaConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("climate-advisor/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AdvisorError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_url: format!("{}/w/api.php", config.base_url.trim_end_matches('/')),
        })
    }

    async fn search_titles(&self, query: &str, limit: usize) -> Result<Vec<String>> {
        let limit = limit.to_string();
        let response = self
            .client
            .get(&self.api_url)
            .query(&[
                ("action", "query"),
                ("list", "search"),
                ("format", "json"),
                ("srsearch", query),
                ("srlimit", limit.as_str()),
            ])
            .send()
            .await?;

        let body: SearchResponse = check_status(SERVICE, response).await?.json().await?;
        Ok(body
            .query
            .map(|q| q.search.into_iter().map(|h| h.title).collect())
            .unwrap_or_default())
    }

    async fn extract(&self, title: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(&self.api_url)
            .query(&[
                ("action", "query"),
                ("prop", "extracts"),
                ("exintro", "1"),
                ("explaintext", "1"),
                ("redirects", "1"),
                ("format", "json"),
                ("titles", title),
            ])
            .send()
            .await?;

        let body: ExtractResponse = check_status(SERVICE, response).await?.json().await?;
        Ok(body
            .query
            .and_then(|q| q.pages.into_values().find_map(|p| p.extract))
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty()))
    }
}

#[async_trait]
impl KnowledgeSource for WikipediaClient {
    async fn lookup(&self, query: &str, limit: usize) -> Result<Vec<Summary>> {
        let titles = self.search_titles(query, limit).await?;
        tracing::debug!(query, hits = titles.len(), "Wikipedia search");

        let mut summaries = Vec::with_capacity(titles.len());
        for title in titles {
            // Pages without an intro (disambiguation, missing) are skipped.
            if let Some(text) = self.extract(&title).await? {
                summaries.push(Summary { title, text });
            }
        }
        Ok(summaries)
    }

    fn name(&self) -> &str {
        SERVICE
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    query: Option<SearchQuery>,
}

#[derive(Deserialize)]
struct SearchQuery {
    search: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    title: String,
}

#[derive(Deserialize)]
struct ExtractResponse {
    query: Option<ExtractQuery>,
}

#[derive(Deserialize)]
struct ExtractQuery {
    pages: std::collections::HashMap<String, ExtractPage>,
}

#[derive(Deserialize)]
struct ExtractPage {
    extract: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client(server: &MockServer) -> WikipediaClient {
        WikipediaClient::new(WikipediaConfig {
            base_url: server.uri(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_lookup_searches_then_fetches_extracts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .and(query_param("list", "search"))
            .and(query_param("srsearch", "photosynthesis"))
            .and(query_param("srlimit", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "query": {"search": [{"title": "Photosynthesis"}, {"title": "Photosystem"}]}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .and(query_param("titles", "Photosynthesis"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "query": {"pages": {"24544": {"title": "Photosynthesis", "extract": "Light to sugar."}}}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .and(query_param("titles", "Photosystem"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "query": {"pages": {"-1": {"title": "Photosystem", "missing": ""}}}
            })))
            .mount(&server)
            .await;

        let summaries = client(&server).await.lookup("photosynthesis", 2).await.unwrap();
        assert_eq!(summaries, vec![Summary::new("Photosynthesis", "Light to sugar.")]);
    }

    #[tokio::test]
    async fn test_lookup_no_hits() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"query": {"search": []}})))
            .mount(&server)
            .await;

        assert!(client(&server).await.lookup("zzzz", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client(&server).await.lookup("soil", 3).await.unwrap_err();
        assert!(err.is_transient());
    }
}
