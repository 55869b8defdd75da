use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle event of a trade action on the exchange.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EventKind {
    Executed,
    Cancelled,
    Created,
    Other,
}

impl EventKind {
    /// Resolve a raw exchange event name. Anything unrecognized is `Other`.
    pub fn from_event_name(name: &str) -> Self {
        match name {
            "OrderExecuted" => EventKind::Executed,
            "OrderCancelled" => EventKind::Cancelled,
            "OrderCreated" => EventKind::Created,
            _ => EventKind::Other,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Executed => write!(f, "EXECUTED"),
            EventKind::Cancelled => write!(f, "CANCELLED"),
            EventKind::Created => write!(f, "CREATED"),
            EventKind::Other => write!(f, "OTHER"),
        }
    }
}

/// A trade action after mapping. Rebuilt from scratch on every poll.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeRecord {
    pub id: String,
    /// Seconds since epoch.
    pub timestamp: i64,
    pub event_kind: EventKind,
    pub is_long: bool,
    pub market_symbol: String,
    pub size_delta_usd: f64,
    pub collateral_delta_usd: Option<f64>,
    pub execution_price: Option<f64>,
    pub trigger_price: Option<f64>,
    pub acceptable_price: Option<f64>,
    pub price_impact_usd: Option<f64>,
    pub pnl_usd: f64,
    pub order_type: Option<u32>,
    pub tx_hash: Option<String>,
}

/// An open leveraged position.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PositionRecord {
    pub key: String,
    pub market_symbol: String,
    pub is_long: bool,
    pub size_in_usd: f64,
    pub collateral_usd: f64,
    pub entry_price: f64,
    pub mark_price: f64,
    pub unrealized_pnl: f64,
    pub unrealized_pnl_percentage: f64,
    pub leverage: f64,
    pub liquidation_price: f64,
}

/// A pending (not yet executed) order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderRecord {
    pub key: String,
    pub order_type: Option<u32>,
    pub is_long: bool,
    pub market_symbol: String,
    pub size_delta_usd: f64,
    pub trigger_price: f64,
    pub acceptable_price: f64,
    /// Native token (ETH) amount.
    pub execution_fee: f64,
    pub is_frozen: bool,
}

/// Derived performance figures for a set of trades. Never persisted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct PerformanceMetrics {
    pub total_pnl: f64,
    pub win_rate: f64,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub average_profit: f64,
    pub average_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub roi: f64,
    pub apy: f64,
    /// `f64::INFINITY` when there are winners and no losers
    /// (serialized as `null` by serde_json).
    pub profit_factor: f64,
}

/// One point of the cumulative P&L chart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeriesPoint {
    pub index: usize,
    pub timestamp: i64,
    pub date: String,
    pub pnl: f64,
    pub cumulative_pnl: f64,
    pub market: String,
}

/// Usage of one telemetry source for one calendar day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct UsageDayRecord {
    /// `YYYY-MM-DD`
    pub date: String,
    pub cost: f64,
    pub requests: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Combined cost and token totals across both telemetry sources.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct UsageSummary {
    pub total_cost: f64,
    pub total_requests: u64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_tokens: u64,
    pub days_observed: usize,
    pub avg_daily_cost: f64,
    pub cost_per_million_tokens: f64,
    pub adjustment_usd: f64,
}

/// A single agent "thought" as stored by the trading agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Thought {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// Response body of the proxy's thoughts endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ThoughtsDocument {
    #[serde(default)]
    pub thoughts: Vec<Thought>,
    #[serde(default)]
    pub last_updated: Option<String>,
}
