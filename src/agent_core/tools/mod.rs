//! Built-in tools exposed to the model.

pub mod market_data;

use std::sync::Arc;

use crate::agent_core::errors::AgentError;
use crate::agent_core::tool_registry::ToolRegistry;
use crate::config::MarketDataConfig;

pub use market_data::TopCryptocurrenciesTool;

/// Registry with every built-in tool.
pub fn build_default_registry(market_data: &MarketDataConfig) -> Result<ToolRegistry, AgentError> {
    ToolRegistry::builder()
        .register(Arc::new(TopCryptocurrenciesTool::new(market_data)?))
        .build()
}
