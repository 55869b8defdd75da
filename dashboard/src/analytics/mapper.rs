//! Raw exchange payloads and their mapping into display records.
//!
//! Every optional field gets exactly one resolution order here, so code
//! downstream of the mapper never has to check for presence again.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use super::decimals::{normalize, normalize_opt, RawAmount, NATIVE_DECIMALS, PERCENT_DECIMALS, USD_DECIMALS};
use crate::types::{EventKind, OrderRecord, PositionRecord, TradeRecord};

/// Raw timestamps above Jan 1 2100 (in seconds) are milliseconds.
pub const MAX_PLAUSIBLE_SECS: i64 = 4_102_444_800;

/// Leverage assumed when a trade carries no collateral figure.
pub const FALLBACK_LEVERAGE: f64 = 5.0;

/// Collateral share of size that must remain for a position to stay open.
pub const MAINTENANCE_MARGIN: f64 = 0.01;

const UNKNOWN_MARKET: &str = "Unknown";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTransaction {
    pub hash: Option<String>,
    pub block_number: Option<u64>,
}

/// A trade action in the exchange SDK's shape. Everything is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTrade {
    pub id: Option<String>,
    pub transaction: Option<RawTransaction>,
    pub timestamp: Option<RawAmount>,
    pub event_name: Option<String>,
    pub order_type: Option<u32>,
    pub market_address: Option<String>,
    pub market_symbol: Option<String>,
    pub is_long: Option<bool>,
    pub size_delta_usd: Option<RawAmount>,
    pub collateral_delta_usd: Option<RawAmount>,
    pub trigger_price: Option<RawAmount>,
    pub acceptable_price: Option<RawAmount>,
    pub execution_price: Option<RawAmount>,
    pub price_impact_usd: Option<RawAmount>,
    pub pnl_usd: Option<RawAmount>,
    pub base_pnl_usd: Option<RawAmount>,
}

impl RawTrade {
    fn tx_hash(&self) -> Option<&str> {
        self.transaction
            .as_ref()
            .and_then(|t| t.hash.as_deref())
            .filter(|h| !h.is_empty())
    }

    /// A record is identifiable when it has an id or a transaction hash.
    pub fn has_identity(&self) -> bool {
        self.id.as_deref().is_some_and(|id| !id.is_empty()) || self.tx_hash().is_some()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPosition {
    pub key: Option<String>,
    pub market_address: Option<String>,
    pub market_symbol: Option<String>,
    pub is_long: Option<bool>,
    pub size_in_usd: Option<RawAmount>,
    pub collateral_usd: Option<RawAmount>,
    pub entry_price: Option<RawAmount>,
    pub mark_price: Option<RawAmount>,
    pub pnl: Option<RawAmount>,
    /// Basis points.
    pub pnl_percentage: Option<RawAmount>,
    /// Basis points, 10000 = 1x.
    pub leverage: Option<RawAmount>,
    pub liquidation_price: Option<RawAmount>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOrder {
    pub key: Option<String>,
    pub order_type: Option<u32>,
    pub market_address: Option<String>,
    pub market_symbol: Option<String>,
    pub is_long: Option<bool>,
    pub size_delta_usd: Option<RawAmount>,
    pub trigger_price: Option<RawAmount>,
    pub acceptable_price: Option<RawAmount>,
    pub execution_fee: Option<RawAmount>,
    pub is_frozen: Option<bool>,
}

/// Market metadata needed to label and scale records.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketInfo {
    pub symbol: String,
    pub index_token_decimals: u32,
}

/// Market token address -> metadata. Addresses are matched case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct MarketDirectory {
    markets: HashMap<String, MarketInfo>,
}

impl MarketDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, market_address: &str, info: MarketInfo) {
        self.markets.insert(market_address.to_lowercase(), info);
    }

    pub fn get(&self, market_address: &str) -> Option<&MarketInfo> {
        self.markets.get(&market_address.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.markets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }

    /// Directory lookup first, then the symbol carried inline, then "Unknown".
    pub fn resolve_symbol(&self, market_address: Option<&str>, inline: Option<&str>) -> String {
        market_address
            .and_then(|addr| self.get(addr))
            .map(|m| m.symbol.clone())
            .or_else(|| inline.filter(|s| !s.is_empty()).map(String::from))
            .unwrap_or_else(|| UNKNOWN_MARKET.to_string())
    }
}

/// Everything the mapper needs besides the raw record itself.
pub struct MapContext<'a> {
    pub markets: &'a MarketDirectory,
    /// Fallback instant (epoch seconds) for records without a timestamp.
    pub now: i64,
}

/// Seconds since epoch, correcting values that were written in milliseconds.
pub fn normalize_timestamp(raw: i64) -> i64 {
    if raw > MAX_PLAUSIBLE_SECS {
        raw / 1000
    } else {
        raw
    }
}

fn usd(raw: Option<&RawAmount>) -> Option<f64> {
    raw.map(|r| normalize(r.0, USD_DECIMALS))
}

/// `pnlUsd` when present and non-zero, else `basePnlUsd` when present and
/// non-zero, else 0.
fn resolve_pnl(raw: &RawTrade) -> f64 {
    [raw.pnl_usd.as_ref(), raw.base_pnl_usd.as_ref()]
        .into_iter()
        .flatten()
        .find(|amount| !amount.is_zero())
        .map(|amount| normalize(amount.0, USD_DECIMALS))
        .unwrap_or(0.0)
}

pub fn map_trade(raw: &RawTrade, ctx: &MapContext<'_>) -> TradeRecord {
    let tx_hash = raw.tx_hash().map(String::from);

    let id = raw
        .id
        .clone()
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| format!("{}-{}", tx_hash.as_deref().unwrap_or("unknown"), ctx.now));

    let timestamp = raw
        .timestamp
        .as_ref()
        .map(|t| normalize_timestamp(normalize(t.0, 0) as i64))
        .unwrap_or(ctx.now);

    TradeRecord {
        id,
        timestamp,
        event_kind: raw
            .event_name
            .as_deref()
            .map(EventKind::from_event_name)
            .unwrap_or(EventKind::Other),
        is_long: raw.is_long.unwrap_or(false),
        market_symbol: ctx
            .markets
            .resolve_symbol(raw.market_address.as_deref(), raw.market_symbol.as_deref()),
        size_delta_usd: normalize_opt(raw.size_delta_usd.as_ref(), USD_DECIMALS).abs(),
        collateral_delta_usd: usd(raw.collateral_delta_usd.as_ref()),
        execution_price: usd(raw.execution_price.as_ref()),
        trigger_price: usd(raw.trigger_price.as_ref()),
        acceptable_price: usd(raw.acceptable_price.as_ref()),
        price_impact_usd: usd(raw.price_impact_usd.as_ref()),
        pnl_usd: resolve_pnl(raw),
        order_type: raw.order_type,
        tx_hash,
    }
}

/// Map a batch, silently dropping records with no id and no tx hash.
pub fn map_trades(raws: &[RawTrade], ctx: &MapContext<'_>) -> Vec<TradeRecord> {
    let trades: Vec<TradeRecord> = raws
        .iter()
        .filter(|raw| raw.has_identity())
        .map(|raw| map_trade(raw, ctx))
        .collect();

    if trades.len() < raws.len() {
        debug!("Dropped {} trade records without identity", raws.len() - trades.len());
    }
    trades
}

/// Unrealized PnL is recomputed from entry/mark because the collaborator's
/// figure can lag the mark price.
pub fn map_position(raw: &RawPosition, ctx: &MapContext<'_>) -> PositionRecord {
    let is_long = raw.is_long.unwrap_or(false);
    let size_in_usd = normalize_opt(raw.size_in_usd.as_ref(), USD_DECIMALS);
    let collateral_usd = normalize_opt(raw.collateral_usd.as_ref(), USD_DECIMALS);
    let entry_price = normalize_opt(raw.entry_price.as_ref(), USD_DECIMALS);
    let mark_price = normalize_opt(raw.mark_price.as_ref(), USD_DECIMALS);
    let reported_pnl = normalize_opt(raw.pnl.as_ref(), USD_DECIMALS);
    // Basis points to percent
    let reported_pct = normalize_opt(raw.pnl_percentage.as_ref(), 2);

    let (unrealized_pnl, unrealized_pnl_percentage) =
        if entry_price > 0.0 && mark_price > 0.0 && size_in_usd > 0.0 {
            let direction = if is_long { 1.0 } else { -1.0 };
            let pnl = (mark_price - entry_price) / entry_price * size_in_usd * direction;
            let pct = if collateral_usd > 0.0 {
                pnl / collateral_usd * 100.0
            } else {
                reported_pct
            };
            (pnl, pct)
        } else {
            (reported_pnl, reported_pct)
        };

    let leverage = match raw.leverage.as_ref() {
        Some(bps) if !bps.is_zero() => normalize(bps.0, PERCENT_DECIMALS),
        _ if collateral_usd > 0.0 => size_in_usd / collateral_usd,
        _ => 0.0,
    };

    PositionRecord {
        key: raw.key.clone().unwrap_or_default(),
        market_symbol: ctx
            .markets
            .resolve_symbol(raw.market_address.as_deref(), raw.market_symbol.as_deref()),
        is_long,
        size_in_usd,
        collateral_usd,
        entry_price,
        mark_price,
        unrealized_pnl,
        unrealized_pnl_percentage,
        leverage,
        liquidation_price: match raw.liquidation_price.as_ref() {
            Some(price) if !price.is_zero() => normalize(price.0, USD_DECIMALS),
            _ => estimate_liquidation_price(is_long, size_in_usd, collateral_usd, entry_price),
        },
    }
}

/// Mark price at which collateral plus PnL falls to the maintenance margin.
/// Fees and funding are ignored. 0 when any input is missing.
pub fn estimate_liquidation_price(is_long: bool, size_in_usd: f64, collateral_usd: f64, entry_price: f64) -> f64 {
    if size_in_usd <= 0.0 || collateral_usd <= 0.0 || entry_price <= 0.0 {
        return 0.0;
    }
    let buffer = collateral_usd - size_in_usd * MAINTENANCE_MARGIN;
    let move_usd = entry_price * buffer / size_in_usd;
    if is_long {
        (entry_price - move_usd).max(0.0)
    } else {
        entry_price + move_usd
    }
}

pub fn map_positions(raws: &[RawPosition], ctx: &MapContext<'_>) -> Vec<PositionRecord> {
    raws.iter()
        .filter(|raw| raw.key.as_deref().is_some_and(|k| !k.is_empty()))
        .map(|raw| map_position(raw, ctx))
        .collect()
}

pub fn map_order(raw: &RawOrder, ctx: &MapContext<'_>) -> OrderRecord {
    OrderRecord {
        key: raw.key.clone().unwrap_or_default(),
        order_type: raw.order_type,
        is_long: raw.is_long.unwrap_or(false),
        market_symbol: ctx
            .markets
            .resolve_symbol(raw.market_address.as_deref(), raw.market_symbol.as_deref()),
        size_delta_usd: normalize_opt(raw.size_delta_usd.as_ref(), USD_DECIMALS),
        trigger_price: normalize_opt(raw.trigger_price.as_ref(), USD_DECIMALS),
        acceptable_price: normalize_opt(raw.acceptable_price.as_ref(), USD_DECIMALS),
        execution_fee: normalize_opt(raw.execution_fee.as_ref(), NATIVE_DECIMALS),
        is_frozen: raw.is_frozen.unwrap_or(false),
    }
}

pub fn map_orders(raws: &[RawOrder], ctx: &MapContext<'_>) -> Vec<OrderRecord> {
    raws.iter()
        .filter(|raw| raw.key.as_deref().is_some_and(|k| !k.is_empty()))
        .map(|raw| map_order(raw, ctx))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ETH_MARKET: &str = "0x70d95587d40A2caf56bd97485aB3Eec10Bee6336";

    fn directory() -> MarketDirectory {
        let mut markets = MarketDirectory::new();
        markets.insert(
            ETH_MARKET,
            MarketInfo { symbol: "ETH".into(), index_token_decimals: 18 },
        );
        markets
    }

    /// Dollars expressed at 30 decimals.
    fn usd30(dollars: i64) -> String {
        format!("{dollars}{}", "0".repeat(30))
    }

    #[test]
    fn test_map_trade_full_record() {
        let raw: RawTrade = serde_json::from_value(json!({
            "id": "0xabc:12",
            "transaction": { "hash": "0xabc", "blockNumber": 100 },
            "timestamp": 1_720_000_000,
            "eventName": "OrderExecuted",
            "orderType": 2,
            "marketAddress": ETH_MARKET.to_lowercase(),
            "isLong": true,
            "sizeDeltaUsd": usd30(1500),
            "collateralDeltaUsd": usd30(300),
            "executionPrice": usd30(3100),
            "triggerPrice": "0",
            "pnlUsd": usd30(-42),
        }))
        .unwrap();

        let markets = directory();
        let ctx = MapContext { markets: &markets, now: 1_730_000_000 };
        let trade = map_trade(&raw, &ctx);

        assert_eq!(trade.id, "0xabc:12");
        assert_eq!(trade.timestamp, 1_720_000_000);
        assert_eq!(trade.event_kind, EventKind::Executed);
        assert_eq!(trade.market_symbol, "ETH");
        assert_eq!(trade.size_delta_usd, 1500.0);
        assert_eq!(trade.collateral_delta_usd, Some(300.0));
        assert_eq!(trade.execution_price, Some(3100.0));
        assert_eq!(trade.trigger_price, Some(0.0));
        assert_eq!(trade.pnl_usd, -42.0);
        assert_eq!(trade.tx_hash.as_deref(), Some("0xabc"));
    }

    #[test]
    fn test_millisecond_timestamp_is_corrected() {
        assert_eq!(normalize_timestamp(4_200_000_000_000), 4_200_000_000);
        assert_eq!(normalize_timestamp(MAX_PLAUSIBLE_SECS), MAX_PLAUSIBLE_SECS);

        let raw: RawTrade = serde_json::from_value(json!({
            "id": "t1",
            "timestamp": "4200000000000",
        }))
        .unwrap();
        let markets = MarketDirectory::new();
        let trade = map_trade(&raw, &MapContext { markets: &markets, now: 0 });
        assert_eq!(trade.timestamp, 4_200_000_000);
    }

    #[test]
    fn test_pnl_falls_back_to_base_pnl() {
        let markets = MarketDirectory::new();
        let ctx = MapContext { markets: &markets, now: 0 };

        let zero_pnl: RawTrade = serde_json::from_value(json!({
            "id": "a", "pnlUsd": "0", "basePnlUsd": usd30(7),
        }))
        .unwrap();
        assert_eq!(map_trade(&zero_pnl, &ctx).pnl_usd, 7.0);

        let neither: RawTrade = serde_json::from_value(json!({ "id": "b" })).unwrap();
        assert_eq!(map_trade(&neither, &ctx).pnl_usd, 0.0);
    }

    #[test]
    fn test_partial_record_gets_defaults() {
        let raw: RawTrade = serde_json::from_value(json!({
            "transaction": { "hash": "0xfeed" },
            "eventName": "OrderUpdated",
        }))
        .unwrap();
        let markets = MarketDirectory::new();
        let trade = map_trade(&raw, &MapContext { markets: &markets, now: 1_700_000_000 });

        assert_eq!(trade.id, "0xfeed-1700000000");
        assert_eq!(trade.timestamp, 1_700_000_000);
        assert_eq!(trade.event_kind, EventKind::Other);
        assert_eq!(trade.market_symbol, "Unknown");
        assert_eq!(trade.size_delta_usd, 0.0);
        assert_eq!(trade.collateral_delta_usd, None);
        assert!(!trade.is_long);
    }

    #[test]
    fn test_map_trades_drops_unidentifiable_records() {
        let raws = vec![
            RawTrade { id: Some("keep".into()), ..Default::default() },
            RawTrade::default(),
            RawTrade { id: Some(String::new()), ..Default::default() },
        ];
        let markets = MarketDirectory::new();
        let trades = map_trades(&raws, &MapContext { markets: &markets, now: 0 });
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].id, "keep");
    }

    #[test]
    fn test_position_pnl_is_recomputed() {
        let raw: RawPosition = serde_json::from_value(json!({
            "key": "pos-1",
            "marketAddress": ETH_MARKET,
            "isLong": false,
            "sizeInUsd": usd30(1000),
            "collateralUsd": usd30(200),
            "entryPrice": usd30(2000),
            "markPrice": usd30(1900),
            "pnl": usd30(1),
            "leverage": "50000",
        }))
        .unwrap();
        let markets = directory();
        let position = map_position(&raw, &MapContext { markets: &markets, now: 0 });

        // Short, price fell 5% on $1000 notional
        assert!((position.unrealized_pnl - 50.0).abs() < 1e-9);
        assert!((position.unrealized_pnl_percentage - 25.0).abs() < 1e-9);
        assert_eq!(position.leverage, 5.0);
        assert_eq!(position.market_symbol, "ETH");
        // No reported liquidation price: 2000 + 2000 * (200 - 10) / 1000
        assert!((position.liquidation_price - 2380.0).abs() < 1e-9);
    }

    #[test]
    fn test_reported_liquidation_price_wins() {
        let raw: RawPosition = serde_json::from_value(json!({
            "key": "pos-3",
            "isLong": true,
            "sizeInUsd": usd30(1000),
            "collateralUsd": usd30(200),
            "entryPrice": usd30(2000),
            "liquidationPrice": usd30(1650),
        }))
        .unwrap();
        let markets = MarketDirectory::new();
        let position = map_position(&raw, &MapContext { markets: &markets, now: 0 });
        assert_eq!(position.liquidation_price, 1650.0);
    }

    #[test]
    fn test_estimate_liquidation_price() {
        assert!((estimate_liquidation_price(true, 1000.0, 200.0, 2500.0) - 2025.0).abs() < 1e-9);
        assert!((estimate_liquidation_price(false, 1000.0, 200.0, 2500.0) - 2975.0).abs() < 1e-9);
        // Over-collateralized long cannot be liquidated above zero
        assert_eq!(estimate_liquidation_price(true, 100.0, 500.0, 2500.0), 0.0);
        assert_eq!(estimate_liquidation_price(true, 0.0, 200.0, 2500.0), 0.0);
    }

    #[test]
    fn test_position_without_prices_keeps_reported_pnl() {
        let raw: RawPosition = serde_json::from_value(json!({
            "key": "pos-2",
            "sizeInUsd": usd30(1000),
            "collateralUsd": usd30(250),
            "pnl": usd30(-12),
            "pnlPercentage": "-480",
        }))
        .unwrap();
        let markets = MarketDirectory::new();
        let position = map_position(&raw, &MapContext { markets: &markets, now: 0 });

        assert_eq!(position.unrealized_pnl, -12.0);
        assert_eq!(position.unrealized_pnl_percentage, -4.8);
        assert_eq!(position.leverage, 4.0);
    }

    #[test]
    fn test_map_order() {
        let raw: RawOrder = serde_json::from_value(json!({
            "key": "ord-1",
            "orderType": 3,
            "marketSymbol": "BTC",
            "isLong": true,
            "sizeDeltaUsd": usd30(500),
            "triggerPrice": usd30(60000),
            "executionFee": "1000000000000000",
        }))
        .unwrap();
        let markets = MarketDirectory::new();
        let order = map_order(&raw, &MapContext { markets: &markets, now: 0 });

        assert_eq!(order.market_symbol, "BTC");
        assert_eq!(order.trigger_price, 60000.0);
        assert_eq!(order.execution_fee, 0.001);
        assert!(!order.is_frozen);
    }
}
