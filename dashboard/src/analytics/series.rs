use chrono::DateTime;

use crate::types::{EventKind, SeriesPoint, TradeRecord};

const DATE_LABEL_FORMAT: &str = "%m/%d %H:%M";

fn date_label(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.format(DATE_LABEL_FORMAT).to_string())
        .unwrap_or_default()
}

/// Running-total realized P&L, one point per executed trade, oldest first.
///
/// Ties on timestamp keep their input order.
pub fn build_series(trades: &[TradeRecord]) -> Vec<SeriesPoint> {
    let mut executed: Vec<&TradeRecord> = trades
        .iter()
        .filter(|t| t.event_kind == EventKind::Executed && t.pnl_usd.is_finite())
        .collect();
    executed.sort_by_key(|t| t.timestamp);

    let mut cumulative = 0.0;
    executed
        .into_iter()
        .enumerate()
        .map(|(i, trade)| {
            cumulative += trade.pnl_usd;
            SeriesPoint {
                index: i + 1,
                timestamp: trade.timestamp,
                date: date_label(trade.timestamp),
                pnl: trade.pnl_usd,
                cumulative_pnl: cumulative,
                market: trade.market_symbol.clone(),
            }
        })
        .collect()
}

/// Cumulative P&L at the end of the series, 0 when empty.
pub fn final_pnl(series: &[SeriesPoint]) -> f64 {
    series.last().map(|p| p.cumulative_pnl).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade(id: &str, pnl: f64, ts: i64, kind: EventKind) -> TradeRecord {
        TradeRecord {
            id: id.into(),
            timestamp: ts,
            event_kind: kind,
            is_long: false,
            market_symbol: "BTC".into(),
            size_delta_usd: 100.0,
            collateral_delta_usd: None,
            execution_price: None,
            trigger_price: None,
            acceptable_price: None,
            price_impact_usd: None,
            pnl_usd: pnl,
            order_type: None,
            tx_hash: None,
        }
    }

    fn sample() -> Vec<TradeRecord> {
        vec![
            trade("c", 5.0, 3_000, EventKind::Executed),
            trade("a", 10.0, 1_000, EventKind::Executed),
            trade("x", 99.0, 1_500, EventKind::Cancelled),
            trade("b1", -4.0, 2_000, EventKind::Executed),
            trade("b2", 1.5, 2_000, EventKind::Executed),
            trade("nan", f64::NAN, 2_500, EventKind::Executed),
        ]
    }

    #[test]
    fn test_series_sorted_with_running_sum() {
        let series = build_series(&sample());
        let pnls: Vec<f64> = series.iter().map(|p| p.pnl).collect();
        assert_eq!(pnls, vec![10.0, -4.0, 1.5, 5.0]);

        let cumulative: Vec<f64> = series.iter().map(|p| p.cumulative_pnl).collect();
        assert_eq!(cumulative, vec![10.0, 6.0, 7.5, 12.5]);
        assert_eq!(series[0].index, 1);
        assert_eq!(series[3].index, 4);
        assert_eq!(final_pnl(&series), 12.5);
    }

    #[test]
    fn test_running_sum_invariant() {
        let series = build_series(&sample());
        for pair in series.windows(2) {
            assert_eq!(pair[1].cumulative_pnl, pair[0].cumulative_pnl + pair[1].pnl);
        }
    }

    #[test]
    fn test_build_series_is_idempotent() {
        let trades = sample();
        assert_eq!(build_series(&trades), build_series(&trades));
    }

    #[test]
    fn test_empty_and_date_label() {
        assert!(build_series(&[]).is_empty());
        assert_eq!(final_pnl(&[]), 0.0);

        // 2024-03-05 14:07:00 UTC
        let series = build_series(&[trade("d", 1.0, 1_709_647_620, EventKind::Executed)]);
        assert_eq!(series[0].date, "03/05 14:07");
    }
}
