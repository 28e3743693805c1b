//! Binance spot REST backend.
//!
//! Handles:
//! - HMAC-signed account and order endpoints
//! - Market metadata (tick size, lot step, minimums) cached at startup
//! - Post-only placement via `LIMIT_MAKER`, with the "would take"
//!   rejection reported as a canceled order instead of an error

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::{Client, Method, StatusCode};
use rust_decimal::Decimal;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::auth;
use super::types::*;
use super::ExchangeGateway;
use crate::error::GatewayError;
use crate::trading::{Credentials, TradingPair};

pub const MAINNET_URL: &str = "https://api.binance.com";
pub const TESTNET_URL: &str = "https://testnet.binance.vision";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const RECV_WINDOW_MS: u64 = 5000;
const DEPTH_LIMIT: u32 = 5;

/// Error code Binance uses for rejected new orders, including LIMIT_MAKER
/// orders that would cross the book.
const NEW_ORDER_REJECTED: i64 = -2010;

/// Binance spot gateway for one trading pair.
pub struct BinanceGateway {
    http: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    pair: TradingPair,
    symbol: String,
    market: RwLock<Option<Market>>,
}

/// Error body returned by the API.
#[derive(Debug, Clone, Deserialize)]
struct ApiError {
    code: i64,
    msg: String,
}

impl ApiError {
    fn is_post_only_rejection(&self) -> bool {
        self.code == NEW_ORDER_REJECTED && self.msg.contains("immediately match")
    }
}

/// Failure of a single request, keeping the API error body when there is one.
#[derive(Debug)]
enum RequestFailure {
    Api { status: StatusCode, error: ApiError },
    Gateway(GatewayError),
}

impl From<RequestFailure> for GatewayError {
    fn from(failure: RequestFailure) -> Self {
        match failure {
            RequestFailure::Api { status, error } => {
                GatewayError::Exchange(format!("{} (code {}, HTTP {})", error.msg, error.code, status))
            }
            RequestFailure::Gateway(e) => e,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AccountInfo {
    balances: Vec<AssetBalance>,
}

#[derive(Debug, Deserialize)]
struct AssetBalance {
    asset: String,
    free: Decimal,
    locked: Decimal,
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: Decimal,
}

#[derive(Debug, Deserialize)]
struct Depth {
    bids: Vec<(Decimal, Decimal)>,
    asks: Vec<(Decimal, Decimal)>,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
struct SymbolInfo {
    symbol: String,
    filters: Vec<SymbolFilter>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "filterType")]
enum SymbolFilter {
    #[serde(rename = "PRICE_FILTER", rename_all = "camelCase")]
    Price { min_price: Decimal, tick_size: Decimal },
    #[serde(rename = "LOT_SIZE", rename_all = "camelCase")]
    LotSize { min_qty: Decimal, step_size: Decimal },
    #[serde(rename = "NOTIONAL", rename_all = "camelCase")]
    Notional { min_notional: Decimal },
    #[serde(rename = "MIN_NOTIONAL", rename_all = "camelCase")]
    MinNotional { min_notional: Decimal },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderAck {
    order_id: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BinanceOrder {
    order_id: u64,
    status: String,
    side: String,
    #[serde(rename = "type")]
    order_type: String,
    orig_qty: Decimal,
    executed_qty: Decimal,
    price: Decimal,
    #[serde(default)]
    time: Option<i64>,
}

impl BinanceOrder {
    fn into_order(self) -> Result<Order, GatewayError> {
        let side = match self.side.as_str() {
            "BUY" => OrderSide::Buy,
            "SELL" => OrderSide::Sell,
            other => {
                return Err(GatewayError::Unexpected(format!("unknown order side {}", other)))
            }
        };

        Ok(Order {
            id: self.order_id.to_string(),
            status: map_status(&self.status)?,
            side,
            amount: self.orig_qty,
            filled: self.executed_qty,
            price: self.price,
            fee: None,
            datetime: self.time.and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
            post_only: self.order_type == "LIMIT_MAKER",
        })
    }
}

fn map_status(status: &str) -> Result<OrderStatus, GatewayError> {
    match status {
        "NEW" | "PARTIALLY_FILLED" => Ok(OrderStatus::Open),
        "FILLED" => Ok(OrderStatus::Closed),
        "CANCELED" | "PENDING_CANCEL" | "REJECTED" | "EXPIRED" | "EXPIRED_IN_MATCH" => {
            Ok(OrderStatus::Canceled)
        }
        other => Err(GatewayError::Unexpected(format!("unknown order status {}", other))),
    }
}

/// Zero minimums mean the exchange does not enforce that bound.
fn nonzero_limit(min: Decimal) -> Limit {
    if min.is_zero() {
        Limit::default()
    } else {
        Limit::min(min)
    }
}

fn market_from_info(symbol: &str, info: ExchangeInfo) -> Result<Market, GatewayError> {
    let symbol_info = info
        .symbols
        .into_iter()
        .find(|s| s.symbol == symbol)
        .ok_or_else(|| GatewayError::Exchange(format!("symbol {} not listed", symbol)))?;

    let mut precision = MarketPrecision {
        amount: Decimal::ZERO,
        price: Decimal::ZERO,
    };
    let mut limits = MarketLimits::default();

    for filter in symbol_info.filters {
        match filter {
            SymbolFilter::Price { min_price, tick_size } => {
                precision.price = tick_size.normalize();
                limits.price = nonzero_limit(min_price);
            }
            SymbolFilter::LotSize { min_qty, step_size } => {
                precision.amount = step_size.normalize();
                limits.amount = nonzero_limit(min_qty);
            }
            SymbolFilter::Notional { min_notional } | SymbolFilter::MinNotional { min_notional } => {
                limits.cost = nonzero_limit(min_notional);
            }
            SymbolFilter::Other => {}
        }
    }

    Ok(Market {
        symbol: symbol.to_string(),
        precision,
        limits,
    })
}

fn build_signed_query(params: &[(&str, String)], timestamp_ms: i64, secret: &str) -> String {
    let mut query: Vec<String> = params.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    query.push(format!("recvWindow={}", RECV_WINDOW_MS));
    query.push(format!("timestamp={}", timestamp_ms));
    let query = query.join("&");
    let signature = auth::sign(&query, secret);
    format!("{}&signature={}", query, signature)
}

fn side_param(side: OrderSide) -> &'static str {
    match side {
        OrderSide::Buy => "BUY",
        OrderSide::Sell => "SELL",
    }
}

impl BinanceGateway {
    /// Create a gateway for `pair`.
    pub fn new(pair: TradingPair, credentials: Credentials, testnet: bool) -> Result<Self> {
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = if testnet { TESTNET_URL } else { MAINNET_URL };
        let symbol = format!("{}{}", pair.base, pair.quote);

        Ok(Self {
            http,
            base_url: base_url.to_string(),
            api_key: credentials.api_key,
            api_secret: credentials.api_secret,
            pair,
            symbol,
            market: RwLock::new(None),
        })
    }

    async fn public_get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &str,
    ) -> Result<T, RequestFailure> {
        let url = format!("{}{}?{}", self.base_url, path, query);
        debug!(url = %url, "Calling");
        self.send(self.http.get(&url)).await
    }

    async fn signed<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, RequestFailure> {
        let query = build_signed_query(params, Utc::now().timestamp_millis(), &self.api_secret);
        let url = format!("{}{}?{}", self.base_url, path, query);
        debug!(method = %method, path = %path, "Calling");
        let request = self
            .http
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.api_key);
        self.send(request).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, RequestFailure> {
        let resp = request
            .send()
            .await
            .map_err(|e| RequestFailure::Gateway(GatewayError::Network(e.to_string())))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| RequestFailure::Gateway(GatewayError::Network(e.to_string())))?;

        if status.is_server_error()
            || status == StatusCode::TOO_MANY_REQUESTS
            || status == StatusCode::IM_A_TEAPOT
        {
            return Err(RequestFailure::Gateway(GatewayError::Network(format!(
                "{} - {}",
                status, body
            ))));
        }

        if !status.is_success() {
            return match serde_json::from_str::<ApiError>(&body) {
                Ok(error) => Err(RequestFailure::Api { status, error }),
                Err(_) => Err(RequestFailure::Gateway(GatewayError::Exchange(format!(
                    "{} - {}",
                    status, body
                )))),
            };
        }

        serde_json::from_str(&body).map_err(|e| {
            RequestFailure::Gateway(GatewayError::Unexpected(format!(
                "failed to decode response: {} - {}",
                e, body
            )))
        })
    }

    fn rejected_post_only(side: OrderSide, amount: Decimal, price: Decimal) -> Order {
        Order {
            id: String::new(),
            status: OrderStatus::Canceled,
            side,
            amount,
            filled: Decimal::ZERO,
            price,
            fee: None,
            datetime: Some(Utc::now()),
            post_only: true,
        }
    }
}

#[async_trait]
impl ExchangeGateway for BinanceGateway {
    async fn load_markets(&self) -> Result<(), GatewayError> {
        let info: ExchangeInfo = self
            .public_get("/api/v3/exchangeInfo", &format!("symbol={}", self.symbol))
            .await?;
        let market = market_from_info(&self.symbol, info)?;

        info!(
            symbol = %market.symbol,
            tick = %market.precision.price,
            step = %market.precision.amount,
            "Market loaded"
        );

        *self.market.write().await = Some(market);
        Ok(())
    }

    async fn fetch_balance(&self) -> Result<Balance, GatewayError> {
        let account: AccountInfo = self.signed(Method::GET, "/api/v3/account", &[]).await?;

        let mut balance = Balance::default();
        for currency in [&self.pair.base, &self.pair.quote] {
            let (free, used) = account
                .balances
                .iter()
                .find(|b| &b.asset == currency)
                .map(|b| (b.free, b.locked))
                .unwrap_or((Decimal::ZERO, Decimal::ZERO));

            balance.free.insert(currency.clone(), free);
            balance.used.insert(currency.clone(), used);
            balance.total.insert(currency.clone(), free + used);
        }

        Ok(balance)
    }

    async fn get_last_price(&self) -> Result<Decimal, GatewayError> {
        let ticker: TickerPrice = self
            .public_get("/api/v3/ticker/price", &format!("symbol={}", self.symbol))
            .await?;
        Ok(ticker.price)
    }

    async fn get_order_book(&self) -> Result<OrderBook, GatewayError> {
        let depth: Depth = self
            .public_get(
                "/api/v3/depth",
                &format!("symbol={}&limit={}", self.symbol, DEPTH_LIMIT),
            )
            .await?;
        Ok(OrderBook {
            bids: depth.bids,
            asks: depth.asks,
        })
    }

    async fn get_market(&self) -> Result<Market, GatewayError> {
        if let Some(market) = self.market.read().await.as_ref() {
            return Ok(market.clone());
        }

        self.load_markets().await?;
        self.market
            .read()
            .await
            .clone()
            .ok_or_else(|| GatewayError::Unexpected("market metadata unavailable".to_string()))
    }

    async fn create_order(
        &self,
        side: OrderSide,
        amount: Decimal,
        price: Decimal,
        post_only: bool,
    ) -> Result<Order, GatewayError> {
        let quantity = self.decimal_to_precision(amount, PrecisionKind::Amount).await?;

        let mut params = vec![
            ("symbol", self.symbol.clone()),
            ("side", side_param(side).to_string()),
        ];
        if post_only {
            params.push(("type", "LIMIT_MAKER".to_string()));
        } else {
            params.push(("type", "LIMIT".to_string()));
            params.push(("timeInForce", "GTC".to_string()));
        }
        params.push(("quantity", quantity.normalize().to_string()));
        params.push(("price", price.normalize().to_string()));
        params.push(("newOrderRespType", "ACK".to_string()));

        let ack: OrderAck = match self.signed(Method::POST, "/api/v3/order", &params).await {
            Ok(ack) => ack,
            Err(RequestFailure::Api { error, .. }) if post_only && error.is_post_only_rejection() => {
                debug!(msg = %error.msg, "Post-only order rejected");
                return Ok(Self::rejected_post_only(side, quantity, price));
            }
            Err(e) => return Err(e.into()),
        };

        self.fetch_order(&ack.order_id.to_string()).await
    }

    async fn fetch_order(&self, id: &str) -> Result<Order, GatewayError> {
        let params = [("symbol", self.symbol.clone()), ("orderId", id.to_string())];
        let order: BinanceOrder = self.signed(Method::GET, "/api/v3/order", &params).await?;
        order.into_order()
    }

    async fn cancel_order(&self, id: &str) -> Result<(), GatewayError> {
        info!(order_id = %id, "Cancel order");
        let params = [("symbol", self.symbol.clone()), ("orderId", id.to_string())];
        let _: IgnoredAny = self.signed(Method::DELETE, "/api/v3/order", &params).await?;
        Ok(())
    }
}
