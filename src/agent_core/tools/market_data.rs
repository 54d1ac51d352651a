//! `get_top_cryptocurrencies`: top assets by market cap from a CoinGecko-style
//! `/coins/markets` endpoint.
//!
//! Read-only and unauthenticated. One request per call, no retries.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::agent_core::errors::AgentError;
use crate::agent_core::tool_registry::{ParamSpec, ParamType, Tool, ToolOutput, ToolSpec};
use crate::config::MarketDataConfig;

/// Registered tool name.
pub const TOOL_NAME: &str = "get_top_cryptocurrencies";

/// Upper bound for the `limit` argument.
const MAX_LIMIT: u32 = 25;

/// Width of the `=` rules framing the display table.
const RULE_WIDTH: usize = 80;

// ─── Wire Types ─────────────────────────────────────────────────────────────

/// One entry of the `/coins/markets` response. Every field may be null.
#[derive(Debug, Deserialize)]
struct MarketCoin {
    name: Option<String>,
    symbol: Option<String>,
    current_price: Option<f64>,
    market_cap: Option<f64>,
    price_change_percentage_24h: Option<f64>,
    total_volume: Option<f64>,
}

/// A ranked, display-formatted quote.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CryptoQuote {
    pub rank: u32,
    pub name: String,
    pub symbol: String,
    pub current_price: String,
    pub market_cap: String,
    #[serde(rename = "24h_change")]
    pub change_24h: String,
    #[serde(rename = "24h_volume")]
    pub volume_24h: String,
}

// ─── Tool ───────────────────────────────────────────────────────────────────

/// Fetches the top-N assets by market capitalization with live prices.
pub struct TopCryptocurrenciesTool {
    http: reqwest::Client,
    base_url: String,
    vs_currency: String,
    default_limit: u32,
    spec: ToolSpec,
}

impl TopCryptocurrenciesTool {
    pub fn new(config: &MarketDataConfig) -> Result<Self, AgentError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AgentError::ToolExecutionError {
                tool: TOOL_NAME.to_string(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        let mut parameters = BTreeMap::new();
        parameters.insert(
            "limit".to_string(),
            ParamSpec {
                param_type: ParamType::Integer,
                description: format!(
                    "How many assets to return (1-{MAX_LIMIT}, default {})",
                    config.limit
                ),
                required: false,
            },
        );

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            vs_currency: config.vs_currency.clone(),
            default_limit: config.limit.clamp(1, MAX_LIMIT),
            spec: ToolSpec {
                name: TOOL_NAME.to_string(),
                description: format!(
                    "Get the top {} cryptocurrencies by market cap with current prices and 24h change",
                    config.limit
                ),
                parameters,
            },
        })
    }

    fn requested_limit(&self, arguments: &serde_json::Map<String, serde_json::Value>) -> u32 {
        arguments
            .get("limit")
            .and_then(|v| v.as_u64())
            .map(|n| n.clamp(1, u64::from(MAX_LIMIT)) as u32)
            .unwrap_or(self.default_limit)
    }

    async fn fetch(&self, limit: u32) -> Result<Vec<MarketCoin>, AgentError> {
        let url = format!("{}/coins/markets", self.base_url);
        let fail = |reason: String| AgentError::ToolExecutionError {
            tool: TOOL_NAME.to_string(),
            reason,
        };

        let per_page = limit.to_string();
        let response = self
            .http
            .get(&url)
            .query(&[
                ("vs_currency", self.vs_currency.as_str()),
                ("order", "market_cap_desc"),
                ("per_page", per_page.as_str()),
                ("page", "1"),
                ("sparkline", "false"),
                ("price_change_percentage", "24h"),
            ])
            .send()
            .await
            .map_err(|e| fail(format!("failed to fetch cryptocurrency data: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(fail(format!("market data API returned HTTP {}: {body}", status.as_u16())));
        }

        response
            .json::<Vec<MarketCoin>>()
            .await
            .map_err(|e| fail(format!("unexpected market data response: {e}")))
    }
}

#[async_trait]
impl Tool for TopCryptocurrenciesTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn call(
        &self,
        arguments: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<ToolOutput, AgentError> {
        let limit = self.requested_limit(arguments);
        let coins = self.fetch(limit).await?;
        let quotes = rank_quotes(coins, limit as usize);

        tracing::info!(requested = limit, returned = quotes.len(), "fetched market data");

        let content = serde_json::json!({
            "success": true,
            "data": quotes,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        Ok(ToolOutput {
            content,
            display: render_table(&quotes),
        })
    }
}

// ─── Formatting ─────────────────────────────────────────────────────────────

/// Rank and format raw coins, keeping at most `limit` entries.
fn rank_quotes(coins: Vec<MarketCoin>, limit: usize) -> Vec<CryptoQuote> {
    coins
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(i, coin)| CryptoQuote {
            rank: i as u32 + 1,
            name: coin.name.unwrap_or_else(|| "N/A".into()),
            symbol: coin
                .symbol
                .map(|s| s.to_uppercase())
                .unwrap_or_else(|| "N/A".into()),
            current_price: format_usd(coin.current_price.unwrap_or(0.0), 2),
            market_cap: format_usd(coin.market_cap.unwrap_or(0.0), 0),
            change_24h: format!("{:.2}%", coin.price_change_percentage_24h.unwrap_or(0.0)),
            volume_24h: format_usd(coin.total_volume.unwrap_or(0.0), 0),
        })
        .collect()
}

/// `1234567.891` with 2 decimals → `$1,234,567.89`.
pub fn format_usd(value: f64, decimals: usize) -> String {
    let formatted = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match formatted.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (formatted.as_str(), None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, digit) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if value < 0.0 && formatted.bytes().any(|b| b.is_ascii_digit() && b != b'0') {
        "-"
    } else {
        ""
    };
    match frac_part {
        Some(frac) => format!("{sign}${grouped}.{frac}"),
        None => format!("{sign}${grouped}"),
    }
}

/// Fixed-width ranked table for the transcript.
pub fn render_table(quotes: &[CryptoQuote]) -> String {
    let mut lines = Vec::with_capacity(quotes.len() + 3);
    lines.push(format!(
        "Top {} Cryptocurrencies by Market Cap:",
        quotes.len()
    ));
    lines.push("=".repeat(RULE_WIDTH));
    for q in quotes {
        lines.push(format!(
            "{:2}. {:15} ({:6}) | Price: {:>12} | 24h: {:>8} | MCap: {}",
            q.rank, q.name, q.symbol, q.current_price, q.change_24h, q.market_cap
        ));
    }
    lines.push("=".repeat(RULE_WIDTH));
    lines.join("\n")
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_usd() {
        assert_eq!(format_usd(1234567.891, 2), "$1,234,567.89");
        assert_eq!(format_usd(999.0, 2), "$999.00");
        assert_eq!(format_usd(1000.0, 0), "$1,000");
        assert_eq!(format_usd(0.0, 2), "$0.00");
        assert_eq!(format_usd(0.000123, 2), "$0.00");
        assert_eq!(format_usd(-1500.5, 2), "-$1,500.50");
        assert_eq!(format_usd(1_000_000_000_000.0, 0), "$1,000,000,000,000");
    }

    #[test]
    fn test_rank_quotes_formats_and_truncates() {
        let coins: Vec<MarketCoin> = serde_json::from_value(json!([
            {"name": "Bitcoin", "symbol": "btc", "current_price": 64250.5,
             "market_cap": 1265000000000.0, "price_change_percentage_24h": -1.234,
             "total_volume": 35000000000.0},
            {"name": "Ethereum", "symbol": "eth", "current_price": 3100.0,
             "market_cap": 372000000000.0, "price_change_percentage_24h": 2.5,
             "total_volume": 15000000000.0},
            {"name": null, "symbol": null, "current_price": null,
             "market_cap": null, "price_change_percentage_24h": null,
             "total_volume": null}
        ]))
        .unwrap();

        let quotes = rank_quotes(coins, 2);
        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes[0].rank, 1);
        assert_eq!(quotes[0].symbol, "BTC");
        assert_eq!(quotes[0].current_price, "$64,250.50");
        assert_eq!(quotes[0].change_24h, "-1.23%");
        assert_eq!(quotes[1].market_cap, "$372,000,000,000");
    }

    #[test]
    fn test_null_fields_fall_back() {
        let coins: Vec<MarketCoin> = serde_json::from_value(json!([{}])).unwrap();
        let quotes = rank_quotes(coins, 10);
        assert_eq!(quotes[0].name, "N/A");
        assert_eq!(quotes[0].symbol, "N/A");
        assert_eq!(quotes[0].current_price, "$0.00");
    }

    #[test]
    fn test_quote_serializes_with_24h_keys() {
        let quote = CryptoQuote {
            rank: 1,
            name: "Bitcoin".into(),
            symbol: "BTC".into(),
            current_price: "$1.00".into(),
            market_cap: "$1".into(),
            change_24h: "0.00%".into(),
            volume_24h: "$1".into(),
        };
        let value = serde_json::to_value(&quote).unwrap();
        assert_eq!(value["24h_change"], "0.00%");
        assert_eq!(value["24h_volume"], "$1");
    }

    #[test]
    fn test_render_table() {
        let quotes = vec![CryptoQuote {
            rank: 1,
            name: "Bitcoin".into(),
            symbol: "BTC".into(),
            current_price: "$64,250.50".into(),
            market_cap: "$1,265,000,000,000".into(),
            change_24h: "-1.23%".into(),
            volume_24h: "$35,000,000,000".into(),
        }];
        let table = render_table(&quotes);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "Top 1 Cryptocurrencies by Market Cap:");
        assert_eq!(lines[1], "=".repeat(80));
        assert!(lines[2].starts_with(" 1. Bitcoin         (BTC   ) | Price:   $64,250.50"));
        assert!(lines[2].ends_with("| MCap: $1,265,000,000,000"));
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_requested_limit_clamped() {
        let tool = TopCryptocurrenciesTool::new(&MarketDataConfig::default()).unwrap();
        let args = |v: serde_json::Value| v.as_object().cloned().unwrap_or_default();

        assert_eq!(tool.requested_limit(&args(json!({}))), 10);
        assert_eq!(tool.requested_limit(&args(json!({"limit": 3}))), 3);
        assert_eq!(tool.requested_limit(&args(json!({"limit": 500}))), MAX_LIMIT);
        assert_eq!(tool.requested_limit(&args(json!({"limit": 0}))), 1);
    }

    #[test]
    fn test_spec_declares_optional_limit() {
        let tool = TopCryptocurrenciesTool::new(&MarketDataConfig::default()).unwrap();
        let schema = tool.spec().parameters_schema();
        assert_eq!(schema["properties"]["limit"]["type"], "integer");
        assert_eq!(schema["required"], json!([]));
    }
}
