//! Application State

use std::sync::Arc;

use agent_core::{ChatService, LlmProvider};
use climate_advisor::sources::{CopernicusClient, NasaEarthClient, NoaaClient};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Sessions plus the agent that answers them
    pub chat: Arc<ChatService>,

    /// LLM provider (Groq or Ollama), kept for health checks
    pub provider: Arc<dyn LlmProvider>,

    pub noaa: Arc<NoaaClient>,
    pub nasa: Arc<NasaEarthClient>,
    pub copernicus: Arc<CopernicusClient>,
}
