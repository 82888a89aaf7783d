//! Copernicus Climate Data Store
//!
//! Submits ERA5 reanalysis retrieval requests. The CDS queues the job and
//! answers with its state; downloading the result file is left to the caller.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AdvisorError, Result, check_status};

const SERVICE: &str = "Copernicus";

/// ERA5 single-level dataset
pub const ERA5_DATASET: &str = "reanalysis-era5-single-levels";

/// ERA5 variables relevant to crops and soils
pub const AGRICULTURE_VARIABLES: [&str; 9] = [
    "2m_temperature",
    "total_precipitation",
    "surface_solar_radiation_downwards",
    "leaf_area_index_high_vegetation",
    "leaf_area_index_low_vegetation",
    "soil_temperature_level_1",
    "soil_temperature_level_2",
    "volumetric_soil_water_layer_1",
    "volumetric_soil_water_layer_2",
];

#[derive(Clone, Debug)]
pub struct CopernicusConfig {
    pub uid: String,
    pub api_key: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl CopernicusConfig {
    pub const DEFAULT_BASE_URL: &'static str = "https://cds.climate.copernicus.eu/api/v2";

    pub fn new(uid: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
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

/// One ERA5 retrieval request
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Era5Request {
    pub product_type: String,
    #[serde(rename = "variable")]
    pub variables: Vec<String>,
    pub year: Vec<String>,
    pub month: Vec<String>,
    pub day: Vec<String>,
    pub time: Vec<String>,
    /// North, West, South, East
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<[f64; 4]>,
    pub format: String,
}

impl Era5Request {
    /// Agricultural variables for one day and hour
    pub fn agriculture(year: u16, month: u8, day: u8, hour: u8) -> Self {
        Self {
            product_type: "reanalysis".into(),
            variables: AGRICULTURE_VARIABLES.iter().map(ToString::to_string).collect(),
            year: vec![year.to_string()],
            month: vec![format!("{month:02}")],
            day: vec![format!("{day:02}")],
            time: vec![format!("{hour:02}:00")],
            area: None,
            format: "netcdf".into(),
        }
    }

    #[must_use]
    pub fn with_area(mut self, north: f64, west: f64, south: f64, east: f64) -> Self {
        self.area = Some([north, west, south, east]);
        self
    }

    pub fn validate(&self) -> Result<()> {
        for (field, values) in [
            ("variable", &self.variables),
            ("year", &self.year),
            ("month", &self.month),
            ("day", &self.day),
            ("time", &self.time),
        ] {
            if values.is_empty() {
                return Err(AdvisorError::InvalidRequest(format!("{field} must not be empty")));
            }
        }
        if let Some([north, _, south, _]) = self.area {
            if north < south {
                return Err(AdvisorError::InvalidRequest(
                    "area north edge lies below its south edge".into(),
                ));
            }
        }
        Ok(())
    }
}

pub struct CopernicusClient {
    client: reqwest::Client,
    config: CopernicusConfig,
}

impl CopernicusClient {
    pub fn new(config: CopernicusConfig) -> Result<Self> {
        if config.uid.trim().is_empty() || config.api_key.trim().is_empty() {
            return Err(AdvisorError::Config("Copernicus UID and API key are required".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AdvisorError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    /// Queue an ERA5 retrieval; returns the job description
    pub async fn retrieve(&self, request: &Era5Request) -> Result<Value> {
        request.validate()?;
        tracing::info!(dataset = ERA5_DATASET, variables = request.variables.len(), "Submitting ERA5 request");

        let response = self
            .client
            .post(format!("{}/resources/{}", self.config.base_url, ERA5_DATASET))
            .basic_auth(&self.config.uid, Some(&self.config.api_key))
            .json(request)
            .send()
            .await?;

        Ok(check_status(SERVICE, response).await?.json().await?)
    }

    /// State of a queued job
    pub async fn task(&self, request_id: &str) -> Result<Value> {
        let response = self
            .client
            .get(format!("{}/tasks/{}", self.config.base_url, request_id))
            .basic_auth(&self.config.uid, Some(&self.config.api_key))
            .send()
            .await?;

        Ok(check_status(SERVICE, response).await?.json().await?)
    }
}
