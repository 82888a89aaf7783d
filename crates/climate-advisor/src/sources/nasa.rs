//! NASA Earth API
//!
//! Landsat asset metadata and imagery links for a point on the ground.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AdvisorError, Result, check_status};

const SERVICE: &str = "NASA";

#[derive(Clone, Debug)]
pub struct NasaConfig {
    /// Sent as the `api_key` query parameter
    pub api_key: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl NasaConfig {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.nasa.gov/planetary/earth";

    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: Self::DEFAULT_BASE_URL.into(),
            timeout_secs: 60,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

/// Location and scene of an Earth request
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EarthQuery {
    pub lon: f64,
    pub lat: f64,
    /// `YYYY-MM-DD`
    pub date: String,
    /// Width and height of the scene in degrees
    #[serde(default = "default_dim")]
    pub dim: f64,
}

const fn default_dim() -> f64 {
    0.025
}

impl EarthQuery {
    pub fn new(lon: f64, lat: f64, date: impl Into<String>) -> Self {
        Self {
            lon,
            lat,
            date: date.into(),
            dim: default_dim(),
        }
    }

    fn validate(&self) -> Result<()> {
        if !(-180.0..=180.0).contains(&self.lon) || !(-90.0..=90.0).contains(&self.lat) {
            return Err(AdvisorError::InvalidRequest(format!(
                "Coordinates out of range: lon={}, lat={}",
                self.lon, self.lat
            )));
        }
        if self.dim <= 0.0 {
            return Err(AdvisorError::InvalidRequest("dim must be positive".into()));
        }
        Ok(())
    }
}

pub struct NasaEarthClient {
    client: reqwest::Client,
    config: NasaConfig,
}

impl NasaEarthClient {
    pub fn new(config: NasaConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(AdvisorError::Config("NASA API key is empty".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AdvisorError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    fn params(&self, query: &EarthQuery) -> Vec<(&'static str, String)> {
        vec![
            ("lon", query.lon.to_string()),
            ("lat", query.lat.to_string()),
            ("date", query.date.clone()),
            ("dim", query.dim.to_string()),
            ("api_key", self.config.api_key.clone()),
        ]
    }

    /// Landsat asset metadata (closest scene to the date)
    pub async fn landsat_asset(&self, query: &EarthQuery) -> Result<Value> {
        query.validate()?;
        let response = self
            .client
            .get(format!("{}/assets", self.config.base_url))
            .query(&self.params(query))
            .send()
            .await?;

        Ok(check_status(SERVICE, response).await?.json().await?)
    }

    /// URL of the imagery for the query, after redirects
    pub async fn landsat_imagery_url(&self, query: &EarthQuery, cloud_score: bool) -> Result<String> {
        query.validate()?;
        let mut params = self.params(query);
        params.push(("cloud_score", cloud_score.to_string()));

        let response = self
            .client
            .get(format!("{}/imagery", self.config.base_url))
            .query(&params)
            .send()
            .await?;

        let response = check_status(SERVICE, response).await?;
        Ok(response.url().to_string())
    }
}
