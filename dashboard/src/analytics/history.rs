use serde::Serialize;

use crate::types::TradeRecord;

/// Trade list for the history table with its quick stats.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HistoryView {
    pub trades: Vec<TradeRecord>,
    pub count: usize,
    pub average_size_usd: f64,
    pub total_pnl_usd: f64,
}

/// Newest first. Trades sharing a timestamp keep their input order.
pub fn history_view(trades: &[TradeRecord]) -> HistoryView {
    let mut sorted = trades.to_vec();
    sorted.sort_by_key(|t| std::cmp::Reverse(t.timestamp));

    let total_size: f64 = sorted.iter().map(|t| t.size_delta_usd).sum();
    let total_pnl_usd: f64 = sorted.iter().map(|t| t.pnl_usd).sum();

    HistoryView {
        count: sorted.len(),
        average_size_usd: total_size / sorted.len().max(1) as f64,
        total_pnl_usd,
        trades: sorted,
    }
}
