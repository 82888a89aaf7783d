//! NOAA Climate Data Online
//!
//! Thin client for the CDO v2 web API. Every call is a single request; no
//! pagination or retries.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AdvisorError, Result, check_status};
use crate::model::{ClimateTable, Observation};

const SERVICE: &str = "NOAA";

#[derive(Clone, Debug)]
pub struct NoaaConfig {
    /// CDO access token, sent in the `token` header
    pub token: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl NoaaConfig {
    pub const DEFAULT_BASE_URL: &'static str = "https://www.ncei.noaa.gov/cdo-web/api/v2";

    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            base_url: Self::DEFAULT_BASE_URL.into(),
            timeout_secs: 30,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

/// Parameters of a `/data` request
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataQuery {
    pub dataset_id: String,
    /// Comma-separated datatype codes, e.g. `TMAX,TMIN,PRCP`
    pub datatype_id: String,
    pub location_id: String,
    pub start_date: String,
    pub end_date: String,
    #[serde(default = "default_units")]
    pub units: String,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_units() -> String {
    "metric".into()
}

const fn default_limit() -> u32 {
    1000
}

impl DataQuery {
    /// Daily summaries from the Global Historical Climatology Network
    pub fn daily_summaries(
        location_id: impl Into<String>,
        start_date: impl Into<String>,
        end_date: impl Into<String>,
    ) -> Self {
        Self {
            dataset_id: "GHCND".into(),
            datatype_id: "TMAX,TMIN,PRCP".into(),
            location_id: location_id.into(),
            start_date: start_date.into(),
            end_date: end_date.into(),
            units: default_units(),
            limit: default_limit(),
        }
    }

    fn params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("datasetid", self.dataset_id.clone()),
            ("datatypeid", self.datatype_id.clone()),
            ("locationid", self.location_id.clone()),
            ("startdate", self.start_date.clone()),
            ("enddate", self.end_date.clone()),
            ("units", self.units.clone()),
            ("limit", self.limit.to_string()),
        ]
    }
}

#[derive(Deserialize)]
struct DataResponse {
    #[serde(default)]
    results: Vec<Observation>,
}

pub struct NoaaClient {
    client: reqwest::Client,
    config: NoaaConfig,
}

impl NoaaClient {
    pub fn new(config: NoaaConfig) -> Result<Self> {
        if config.token.trim().is_empty() {
            return Err(AdvisorError::Config("NOAA token is empty".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AdvisorError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    async fn request(&self, endpoint: &str, params: &[(&str, String)]) -> Result<Value> {
        tracing::debug!(endpoint, "NOAA request");
        let response = self
            .client
            .get(format!("{}/{}", self.config.base_url, endpoint))
            .header("token", &self.config.token)
            .query(params)
            .send()
            .await?;

        Ok(check_status(SERVICE, response).await?.json().await?)
    }

    pub async fn datasets(&self) -> Result<Value> {
        self.request("datasets", &[]).await
    }

    pub async fn datatypes(&self, dataset_id: Option<&str>) -> Result<Value> {
        let params: Vec<_> = dataset_id
            .map(|id| ("datasetid", id.to_string()))
            .into_iter()
            .collect();
        self.request("datatypes", &params).await
    }

    pub async fn locations(
        &self,
        dataset_id: Option<&str>,
        location_category_id: Option<&str>,
    ) -> Result<Value> {
        let mut params = Vec::new();
        if let Some(id) = dataset_id {
            params.push(("datasetid", id.to_string()));
        }
        if let Some(id) = location_category_id {
            params.push(("locationcategoryid", id.to_string()));
        }
        self.request("locations", &params).await
    }

    /// Raw observations; an answer without `results` means no data
    pub async fn data(&self, query: &DataQuery) -> Result<Vec<Observation>> {
        let body = self.request("data", &query.params()).await?;
        let parsed: DataResponse = serde_json::from_value(body)?;
        Ok(parsed.results)
    }

    /// TMAX/TMIN/PRCP for a location, pivoted by day
    pub async fn daily_summaries(
        &self,
        location_id: &str,
        start_date: &str,
        end_date: &str,
    ) -> Result<ClimateTable> {
        let query = DataQuery::daily_summaries(location_id, start_date, end_date);
        let observations = self.data(&query).await?;
        tracing::info!(location_id, count = observations.len(), "NOAA daily summaries");
        Ok(ClimateTable::pivot(&observations))
    }
}
