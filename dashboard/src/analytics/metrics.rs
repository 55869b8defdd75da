use crate::types::{EventKind, PerformanceMetrics, TradeRecord};

use super::mapper::FALLBACK_LEVERAGE;

const SECS_PER_DAY: f64 = 86_400.0;
/// Floor for `1 + roi/100` so a loss beyond -100% never reaches `powf`
/// with a non-positive base.
const MIN_RETURN_RATE: f64 = 0.01;
const APY_FLOOR: f64 = -99.0;
const APY_CEILING: f64 = 10_000.0;

/// Trades that count towards win/loss accounting. Flat trades are neither.
pub fn is_counted(trade: &TradeRecord) -> bool {
    trade.event_kind == EventKind::Executed && trade.pnl_usd != 0.0
}

/// Capital deployed by a trade: its collateral when known, otherwise the
/// notional size at the fallback leverage.
fn invested(trade: &TradeRecord) -> f64 {
    match trade.collateral_delta_usd {
        Some(collateral) if collateral != 0.0 => collateral.abs(),
        _ => (trade.size_delta_usd / FALLBACK_LEVERAGE).abs(),
    }
}

/// Win/loss statistics, ROI and annualized return over `trades`.
///
/// The input is expected to be window-filtered already. Every field is 0
/// when no trade qualifies.
pub fn compute_metrics(trades: &[TradeRecord]) -> PerformanceMetrics {
    let executed: Vec<&TradeRecord> = trades.iter().filter(|t| is_counted(t)).collect();
    if executed.is_empty() {
        return PerformanceMetrics::default();
    }

    let total_pnl: f64 = executed.iter().map(|t| t.pnl_usd).sum();

    let wins: Vec<f64> = executed.iter().map(|t| t.pnl_usd).filter(|p| *p > 0.0).collect();
    let losses: Vec<f64> = executed.iter().map(|t| t.pnl_usd).filter(|p| *p < 0.0).collect();

    let gross_profit: f64 = wins.iter().sum();
    let gross_loss: f64 = losses.iter().sum::<f64>().abs();

    let average_profit = if wins.is_empty() { 0.0 } else { gross_profit / wins.len() as f64 };
    let average_loss = if losses.is_empty() { 0.0 } else { gross_loss / losses.len() as f64 };

    let largest_win = wins.iter().copied().fold(0.0, f64::max);
    let largest_loss = losses.iter().copied().fold(0.0, f64::min);

    let total_invested: f64 = executed.iter().map(|t| invested(t)).sum();
    let roi = if total_invested > 0.0 { total_pnl / total_invested * 100.0 } else { 0.0 };

    let apy = if total_invested > 0.0 {
        annualize(roi, period_days(&executed))
    } else {
        0.0
    };

    let profit_factor = if gross_loss > 0.0 {
        gross_profit / gross_loss
    } else if gross_profit > 0.0 {
        f64::INFINITY
    } else {
        0.0
    };

    PerformanceMetrics {
        total_pnl,
        win_rate: wins.len() as f64 / executed.len() as f64 * 100.0,
        total_trades: executed.len(),
        winning_trades: wins.len(),
        losing_trades: losses.len(),
        average_profit,
        average_loss,
        largest_win,
        largest_loss,
        roi,
        apy,
        profit_factor,
    }
}

/// Observed trading period in days, never less than one.
fn period_days(executed: &[&TradeRecord]) -> f64 {
    let min_ts = executed.iter().map(|t| t.timestamp).min().unwrap_or(0);
    let max_ts = executed.iter().map(|t| t.timestamp).max().unwrap_or(0);
    ((max_ts - min_ts) as f64 / SECS_PER_DAY).max(1.0)
}

/// Compound `roi` (percent) over a year, clamped to `[-99, 10000]`.
pub fn annualize(roi: f64, period_days: f64) -> f64 {
    let return_rate = (1.0 + roi / 100.0).max(MIN_RETURN_RATE);
    let apy = (return_rate.powf(365.0 / period_days.max(1.0)) - 1.0) * 100.0;
    if apy.is_nan() {
        return 0.0;
    }
    apy.clamp(APY_FLOOR, APY_CEILING)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade(pnl: f64, ts: i64, kind: EventKind) -> TradeRecord {
        TradeRecord {
            id: format!("{ts}-{pnl}"),
            timestamp: ts,
            event_kind: kind,
            is_long: true,
            market_symbol: "ETH".into(),
            size_delta_usd: 1000.0,
            collateral_delta_usd: Some(200.0),
            execution_price: Some(3000.0),
            trigger_price: None,
            acceptable_price: None,
            price_impact_usd: None,
            pnl_usd: pnl,
            order_type: Some(2),
            tx_hash: None,
        }
    }

    fn assert_all_zero(m: &PerformanceMetrics) {
        assert_eq!(*m, PerformanceMetrics::default());
        assert_eq!(m.total_trades, 0);
        assert_eq!(m.apy, 0.0);
        assert_eq!(m.profit_factor, 0.0);
    }

    #[test]
    fn test_empty_input_is_all_zero() {
        assert_all_zero(&compute_metrics(&[]));
    }

    #[test]
    fn test_all_zero_pnl_is_all_zero() {
        let trades = vec![
            trade(0.0, 1000, EventKind::Executed),
            trade(0.0, 2000, EventKind::Executed),
            trade(50.0, 3000, EventKind::Cancelled),
        ];
        assert_all_zero(&compute_metrics(&trades));
    }

    #[test]
    fn test_win_and_loss() {
        let trades = vec![
            trade(100.0, 1000, EventKind::Executed),
            trade(-40.0, 2000, EventKind::Executed),
        ];
        let m = compute_metrics(&trades);

        assert_eq!(m.total_pnl, 60.0);
        assert_eq!(m.win_rate, 50.0);
        assert_eq!(m.total_trades, 2);
        assert_eq!(m.largest_win, 100.0);
        assert_eq!(m.largest_loss, -40.0);
        assert_eq!(m.average_profit, 100.0);
        assert_eq!(m.average_loss, 40.0);
        assert_eq!(m.profit_factor, 2.5);
        // 60 / (200 + 200)
        assert!((m.roi - 15.0).abs() < 1e-9);
        assert!(m.apy > 0.0 && m.apy <= APY_CEILING);
    }

    #[test]
    fn test_loss_beyond_total_capital_clamps_apy() {
        let mut heavy_loss = trade(-300.0, 1000, EventKind::Executed);
        heavy_loss.collateral_delta_usd = Some(200.0);
        let m = compute_metrics(&[heavy_loss]);

        assert!((m.roi + 150.0).abs() < 1e-9);
        assert_eq!(m.apy, APY_FLOOR);
        assert!(!m.apy.is_nan());
    }

    #[test]
    fn test_missing_collateral_uses_fallback_leverage() {
        let mut t = trade(10.0, 1000, EventKind::Executed);
        t.collateral_delta_usd = None;
        t.size_delta_usd = 500.0;
        // invested = 500 / 5 = 100
        assert!((compute_metrics(&[t.clone()]).roi - 10.0).abs() < 1e-9);

        t.collateral_delta_usd = Some(0.0);
        assert!((compute_metrics(&[t]).roi - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_capital_means_no_returns() {
        let mut t = trade(25.0, 1000, EventKind::Executed);
        t.collateral_delta_usd = None;
        t.size_delta_usd = 0.0;
        let m = compute_metrics(&[t]);
        assert_eq!(m.roi, 0.0);
        assert_eq!(m.apy, 0.0);
        assert_eq!(m.total_pnl, 25.0);
    }

    #[test]
    fn test_profit_factor_without_losses_is_infinite() {
        let m = compute_metrics(&[trade(5.0, 1, EventKind::Executed)]);
        assert!(m.profit_factor.is_infinite());

        let m = compute_metrics(&[trade(-5.0, 1, EventKind::Executed)]);
        assert_eq!(m.profit_factor, 0.0);
    }

    #[test]
    fn test_counts_and_averages_invariants() {
        let trades = vec![
            trade(12.0, 10, EventKind::Executed),
            trade(-3.0, 20, EventKind::Executed),
            trade(0.0, 30, EventKind::Executed),
            trade(-7.5, 40, EventKind::Executed),
            trade(99.0, 50, EventKind::Created),
            trade(1.0, 60, EventKind::Other),
        ];
        let m = compute_metrics(&trades);

        assert_eq!(m.total_trades, 3);
        assert!(m.winning_trades + m.losing_trades <= m.total_trades);
        assert!(m.average_profit >= 0.0);
        assert!(m.average_loss >= 0.0);
        assert_eq!(m.largest_loss, -7.5);
    }

    #[test]
    fn test_annualize_period_floor() {
        // Sub-day periods are treated as one day
        assert_eq!(annualize(0.0, 0.1), 0.0);
        assert_eq!(annualize(50.0, 0.5), APY_CEILING);
        assert!((annualize(10.0, 365.0) - 10.0).abs() < 1e-9);
    }
}
