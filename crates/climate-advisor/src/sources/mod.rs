//! Climate Data Sources
//!
//! Single-call wrappers around public weather and earth-observation APIs.

pub mod copernicus;
pub mod nasa;
pub mod noaa;

pub use copernicus::{CopernicusClient, CopernicusConfig, Era5Request};
pub use nasa::{EarthQuery, NasaConfig, NasaEarthClient};
pub use noaa::{DataQuery, NoaaClient, NoaaConfig};
