//! GMX v2 collaborator: market catalog and mark prices from the oracle REST
//! API, account activity from the subsquid GraphQL indexer.
//!
//! Everything returned here is in the SDK's raw shape with amounts on the
//! 30-decimal USD scale; turning it into display records is the mapper's job.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ethers::types::I256;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::analytics::decimals::RawAmount;
use crate::analytics::mapper::{MarketDirectory, MarketInfo, RawOrder, RawPosition, RawTrade};
use crate::error::{read_json, FetchError};

/// Markets are listed rarely; reload the catalog once an hour.
const CATALOG_TTL: Duration = Duration::from_secs(3600);
const MAX_HISTORY_PAGES: usize = 10;
const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

const TRADE_ACTIONS_QUERY: &str = r#"
query TradeActions($account: String!, $limit: Int!, $offset: Int!) {
  tradeActions(
    where: { account_eq: $account }
    orderBy: timestamp_DESC
    limit: $limit
    offset: $offset
  ) {
    id
    eventName
    orderType
    marketAddress
    isLong
    sizeDeltaUsd
    triggerPrice
    acceptablePrice
    executionPrice
    priceImpactUsd
    pnlUsd
    basePnlUsd
    initialCollateralDeltaAmount
    collateralTokenPriceMin
    collateralTokenPriceMax
    timestamp
    transaction { hash }
  }
}"#;

const POSITIONS_QUERY: &str = r#"
query Positions($account: String!) {
  positions(where: { account_eq: $account, sizeInUsd_gt: "0" }) {
    key: positionKey
    market
    collateralToken
    isLong
    sizeInUsd
    collateralAmount
    entryPrice
  }
}"#;

const ORDERS_QUERY: &str = r#"
query Orders($account: String!) {
  orders(where: { account_eq: $account, status_eq: Created }) {
    key: id
    orderType
    marketAddress
    isLong
    sizeDeltaUsd
    triggerPrice
    acceptablePrice
    executionFee
    isFrozen
  }
}"#;

#[derive(Debug, Clone, Deserialize)]
pub struct TokenInfo {
    pub symbol: String,
    pub address: String,
    pub decimals: u32,
}

#[derive(Debug, Deserialize)]
struct TokensResponse {
    tokens: Vec<TokenInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketEntry {
    pub market_token: String,
    pub index_token: String,
    pub long_token: String,
    pub short_token: String,
}

#[derive(Debug, Deserialize)]
struct MarketsResponse {
    markets: Vec<MarketEntry>,
}

/// Oracle price of one token, on the contract scale (`30 - decimals`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticker {
    pub token_address: String,
    #[serde(default)]
    pub token_symbol: String,
    pub min_price: RawAmount,
    pub max_price: RawAmount,
}

impl Ticker {
    fn mid(&self) -> RawAmount {
        mid_price(self.min_price, self.max_price)
    }
}

fn mid_price(min: RawAmount, max: RawAmount) -> RawAmount {
    let sum = min.0.checked_add(max.0).unwrap_or(max.0);
    RawAmount(sum / I256::from(2i64))
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

/// Subsquid reports collateral as a token amount plus the collateral
/// token's price at execution, not in USD.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SquidTradeAction {
    #[serde(flatten)]
    trade: RawTrade,
    initial_collateral_delta_amount: Option<RawAmount>,
    collateral_token_price_min: Option<RawAmount>,
    collateral_token_price_max: Option<RawAmount>,
}

impl SquidTradeAction {
    /// Amount and contract price have complementary decimals, so their
    /// product lands on the 30-decimal USD scale.
    fn into_raw(self) -> RawTrade {
        let mut trade = self.trade;
        if trade.collateral_delta_usd.is_none() {
            trade.collateral_delta_usd = match (
                self.initial_collateral_delta_amount,
                self.collateral_token_price_min,
                self.collateral_token_price_max,
            ) {
                (Some(amount), Some(min), Some(max)) => {
                    amount.0.checked_mul(mid_price(min, max).0).map(RawAmount)
                }
                _ => None,
            };
        }
        trade
    }
}

#[derive(Debug, Deserialize)]
struct TradeActionsData {
    #[serde(rename = "tradeActions")]
    trade_actions: Vec<SquidTradeAction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SquidPosition {
    key: Option<String>,
    market: Option<String>,
    collateral_token: Option<String>,
    is_long: Option<bool>,
    size_in_usd: Option<RawAmount>,
    collateral_amount: Option<RawAmount>,
    entry_price: Option<RawAmount>,
}

#[derive(Debug, Deserialize)]
struct PositionsData {
    positions: Vec<SquidPosition>,
}

#[derive(Debug, Deserialize)]
struct OrdersData {
    orders: Vec<RawOrder>,
}

/// Tokens and markets known to the oracle, keyed by lowercase address.
#[derive(Debug, Default)]
pub struct MarketCatalog {
    pub directory: MarketDirectory,
    tokens: HashMap<String, TokenInfo>,
    index_tokens: HashMap<String, String>,
}

impl MarketCatalog {
    pub fn from_parts(tokens: Vec<TokenInfo>, markets: Vec<MarketEntry>) -> Self {
        let tokens: HashMap<String, TokenInfo> = tokens
            .into_iter()
            .map(|t| (t.address.to_lowercase(), t))
            .collect();

        let mut directory = MarketDirectory::new();
        let mut index_tokens = HashMap::new();

        for market in markets {
            let index = market.index_token.to_lowercase();
            let info = if index == ZERO_ADDRESS {
                // Swap-only market: label it by its pool tokens
                let symbol_of = |addr: &str| {
                    tokens
                        .get(&addr.to_lowercase())
                        .map(|t| t.symbol.clone())
                        .unwrap_or_else(|| "?".to_string())
                };
                Some(MarketInfo {
                    symbol: format!("{}-{}", symbol_of(&market.long_token), symbol_of(&market.short_token)),
                    index_token_decimals: 0,
                })
            } else {
                tokens.get(&index).map(|t| MarketInfo {
                    symbol: t.symbol.clone(),
                    index_token_decimals: t.decimals,
                })
            };

            match info {
                Some(info) => {
                    directory.insert(&market.market_token, info);
                    index_tokens.insert(market.market_token.to_lowercase(), index);
                }
                None => debug!("Skipping market {} with unknown index token", market.market_token),
            }
        }

        Self { directory, tokens, index_tokens }
    }

    fn index_decimals(&self, market: Option<&str>) -> u32 {
        market
            .and_then(|m| self.directory.get(m))
            .map(|m| m.index_token_decimals)
            .unwrap_or(0)
    }

    fn token_decimals(&self, token: &str) -> Option<u32> {
        self.tokens.get(&token.to_lowercase()).map(|t| t.decimals)
    }

    /// Contract prices carry `30 - index decimals` decimals; lift them onto
    /// the plain 30-decimal USD scale.
    fn usd_price(&self, market: Option<&str>, price: Option<RawAmount>) -> Option<RawAmount> {
        let price = price?;
        let places = self.index_decimals(market);
        let scaled = price.shifted(places);
        if scaled.is_none() {
            warn!(
                "Dropping price {} for market {}: overflows at 10^{}",
                price.0,
                market.unwrap_or("?"),
                places
            );
        }
        scaled
    }
}

/// Handle on the exchange data sources. Cheap to clone.
#[derive(Clone)]
pub struct GmxClient {
    http: reqwest::Client,
    oracle_url: String,
    subsquid_url: String,
    account: Option<String>,
    page_size: usize,
    catalog: Arc<RwLock<Option<(Instant, Arc<MarketCatalog>)>>>,
}

impl GmxClient {
    pub fn new(oracle_url: &str, subsquid_url: &str, account: Option<String>, page_size: usize) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http,
            oracle_url: oracle_url.trim_end_matches('/').to_string(),
            subsquid_url: subsquid_url.to_string(),
            account: account.filter(|a| !a.is_empty()),
            page_size: page_size.max(1),
            catalog: Arc::new(RwLock::new(None)),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.account.is_some()
    }

    /// Market catalog, reloaded from the oracle when older than an hour.
    pub async fn catalog(&self) -> Result<Arc<MarketCatalog>, FetchError> {
        if let Some((loaded_at, catalog)) = self.catalog.read().await.as_ref() {
            if loaded_at.elapsed() < CATALOG_TTL {
                return Ok(catalog.clone());
            }
        }

        let tokens: TokensResponse = self.oracle_get("tokens").await?;
        let markets: MarketsResponse = self.oracle_get("markets").await?;
        let catalog = Arc::new(MarketCatalog::from_parts(tokens.tokens, markets.markets));
        info!("Loaded GMX catalog: {} markets", catalog.directory.len());

        *self.catalog.write().await = Some((Instant::now(), catalog.clone()));
        Ok(catalog)
    }

    pub async fn tickers(&self) -> Result<HashMap<String, RawAmount>, FetchError> {
        let tickers: Vec<Ticker> = self.oracle_get("prices/tickers").await?;
        Ok(tickers
            .iter()
            .map(|t| (t.token_address.to_lowercase(), t.mid()))
            .collect())
    }

    /// Trade actions for the account, newest first.
    pub async fn trade_actions(&self, catalog: &MarketCatalog) -> Result<Vec<RawTrade>, FetchError> {
        let Some(account) = self.account.as_deref() else {
            return Ok(Vec::new());
        };

        let mut trades = Vec::new();
        for page in 0..MAX_HISTORY_PAGES {
            let data: TradeActionsData = self
                .graphql(
                    TRADE_ACTIONS_QUERY,
                    json!({ "account": account, "limit": self.page_size, "offset": page * self.page_size }),
                )
                .await?;
            let fetched = data.trade_actions.len();
            trades.extend(data.trade_actions.into_iter().map(SquidTradeAction::into_raw));
            if fetched < self.page_size {
                break;
            }
        }
        debug!("Fetched {} trade actions", trades.len());

        for trade in &mut trades {
            let market = trade.market_address.clone();
            let market = market.as_deref();
            trade.execution_price = catalog.usd_price(market, trade.execution_price);
            trade.trigger_price = catalog.usd_price(market, trade.trigger_price);
            trade.acceptable_price = catalog.usd_price(market, trade.acceptable_price);
        }
        Ok(trades)
    }

    /// Open positions, with mark prices and collateral valued at the oracle mid.
    pub async fn positions(&self, catalog: &MarketCatalog) -> Result<Vec<RawPosition>, FetchError> {
        let Some(account) = self.account.as_deref() else {
            return Ok(Vec::new());
        };

        let data: PositionsData = self.graphql(POSITIONS_QUERY, json!({ "account": account })).await?;
        if data.positions.is_empty() {
            return Ok(Vec::new());
        }
        let prices = self.tickers().await?;

        Ok(data
            .positions
            .into_iter()
            .map(|p| {
                let market = p.market.as_deref();
                let mark_price = market
                    .and_then(|m| catalog.index_tokens.get(&m.to_lowercase()))
                    .and_then(|index| prices.get(index))
                    .copied();
                let collateral_usd = collateral_value(catalog, &prices, &p);

                RawPosition {
                    key: p.key.clone(),
                    market_address: p.market.clone(),
                    market_symbol: None,
                    is_long: p.is_long,
                    size_in_usd: p.size_in_usd,
                    collateral_usd,
                    entry_price: catalog.usd_price(market, p.entry_price),
                    mark_price: catalog.usd_price(market, mark_price),
                    pnl: None,
                    pnl_percentage: None,
                    leverage: None,
                    liquidation_price: None,
                }
            })
            .collect())
    }

    /// Orders waiting to be executed.
    pub async fn pending_orders(&self, catalog: &MarketCatalog) -> Result<Vec<RawOrder>, FetchError> {
        let Some(account) = self.account.as_deref() else {
            return Ok(Vec::new());
        };

        let data: OrdersData = self.graphql(ORDERS_QUERY, json!({ "account": account })).await?;
        Ok(data
            .orders
            .into_iter()
            .map(|mut order| {
                let market = order.market_address.clone();
                order.trigger_price = catalog.usd_price(market.as_deref(), order.trigger_price);
                order.acceptable_price = catalog.usd_price(market.as_deref(), order.acceptable_price);
                order
            })
            .collect())
    }

    async fn oracle_get<T: DeserializeOwned>(&self, path: &str) -> Result<T, FetchError> {
        let url = format!("{}/{}", self.oracle_url, path);
        let resp = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await?;
        read_json(resp).await
    }

    async fn graphql<T: DeserializeOwned>(&self, query: &str, variables: serde_json::Value) -> Result<T, FetchError> {
        let resp = self
            .http
            .post(&self.subsquid_url)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;
        let body: GraphQlResponse<T> = read_json(resp).await?;

        if let Some(first) = body.errors.first() {
            return Err(FetchError::Decode(format!("GraphQL error: {}", first.message)));
        }
        body.data
            .ok_or_else(|| FetchError::Decode("GraphQL response without data".into()))
    }
}

/// `amount * price` of the collateral token. The token amount and its
/// contract price have complementary decimals, so the product is already
/// on the 30-decimal USD scale.
fn collateral_value(
    catalog: &MarketCatalog,
    prices: &HashMap<String, RawAmount>,
    position: &SquidPosition,
) -> Option<RawAmount> {
    let token = position.collateral_token.as_deref()?;
    catalog.token_decimals(token)?;
    let price = prices.get(&token.to_lowercase())?;
    let amount = position.collateral_amount?;
    amount.0.checked_mul(price.0).map(RawAmount)
}
