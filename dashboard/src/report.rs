use std::fmt;

use crate::analytics::window::DateWindow;
use crate::types::{PerformanceMetrics, UsageSummary};

/// Console summary printed by `--once`.
#[derive(Debug, Clone)]
pub struct DashboardReport {
    pub window: DateWindow,
    pub metrics: PerformanceMetrics,
    pub final_pnl: f64,
    pub open_positions: usize,
    pub unrealized_pnl: f64,
    pub pending_orders: usize,
    pub usage: UsageSummary,
    pub latest_thought: Option<String>,
}

fn signed(value: f64) -> String {
    if value >= 0.0 {
        format!("+${value:.2}")
    } else {
        format!("-${:.2}", value.abs())
    }
}

impl fmt::Display for DashboardReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = &self.metrics;
        let profit_factor = if m.profit_factor.is_infinite() {
            "inf".to_string()
        } else {
            format!("{:.2}", m.profit_factor)
        };
        let thought = self
            .latest_thought
            .as_deref()
            .map(|t| t.chars().take(60).collect::<String>())
            .unwrap_or_else(|| "-".to_string());

        write!(
            f,
            "\
╔══════════════════════════════════════════╗
║   VEGA TRADING DASHBOARD                 ║
╠══════════════════════════════════════════╣
║  Period:      {}
║  Total P&L:   {} (chart {})
║  Trades:      {} (W:{} L:{} = {:.0}%)
║  Avg Win:     ${:.2}  Avg Loss: ${:.2}
║  Largest:     {} / {}
║  ROI:         {:.2}%  APY: {:.2}%
║  Profit F.:   {}
║  Positions:   {} open ({} unrealized)
║  Orders:      {} pending
║  Model Cost:  ${:.2} over {} days (${:.2}/day)
║  Tokens:      {} (${:.2}/M)
║  Thought:     {}
╚══════════════════════════════════════════╝",
            self.window.label(),
            signed(m.total_pnl),
            signed(self.final_pnl),
            m.total_trades,
            m.winning_trades,
            m.losing_trades,
            m.win_rate,
            m.average_profit,
            m.average_loss,
            signed(m.largest_win),
            signed(m.largest_loss),
            m.roi,
            m.apy,
            profit_factor,
            self.open_positions,
            signed(self.unrealized_pnl),
            self.pending_orders,
            self.usage.total_cost,
            self.usage.days_observed,
            self.usage.avg_daily_cost,
            self.usage.total_tokens,
            self.usage.cost_per_million_tokens,
            thought,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_renders_signed_values() {
        let report = DashboardReport {
            window: DateWindow::Week,
            metrics: PerformanceMetrics {
                total_pnl: -12.5,
                total_trades: 2,
                profit_factor: f64::INFINITY,
                ..Default::default()
            },
            final_pnl: -12.5,
            open_positions: 1,
            unrealized_pnl: 3.0,
            pending_orders: 0,
            usage: UsageSummary::default(),
            latest_thought: Some("Holding ETH long".into()),
        };

        let text = report.to_string();
        assert!(text.contains("Last 7 days"));
        assert!(text.contains("-$12.50"));
        assert!(text.contains("+$3.00 unrealized"));
        assert!(text.contains("Profit F.:   inf"));
        assert!(text.contains("Holding ETH long"));
    }
}
