//! Service Kit - Agent Tools
//!
//! Domain-specific tools that implement `agent_core::Tool` for the
//! agriculture assistant.

mod calculator;
mod reasoning;
mod wikipedia;

pub use calculator::CalculatorTool;
pub use reasoning::ReasoningTool;
pub use wikipedia::WikipediaTool;
