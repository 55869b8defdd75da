//! Pure aggregation over already-fetched data. Nothing in here does I/O.

pub mod decimals;
pub mod history;
pub mod mapper;
pub mod metrics;
pub mod pricing;
pub mod series;
pub mod thoughts;
pub mod usage;
pub mod window;

pub use decimals::{normalize, RawAmount};
pub use history::{history_view, HistoryView};
pub use mapper::{map_order, map_orders, map_position, map_positions, map_trade, map_trades, MapContext, MarketDirectory, MarketInfo};
pub use metrics::compute_metrics;
pub use series::{build_series, final_pnl};
pub use thoughts::latest_thoughts;
pub use usage::{aggregate_usage, aggregate_usage_with_adjustment, filter_usage_days, provider_days, router_days, UsageView};
pub use window::{cutoff_timestamp, filter_by_window, DateWindow};
