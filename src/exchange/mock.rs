//! Scripted in-memory gateway for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::types::*;
use super::ExchangeGateway;
use crate::error::GatewayError;

/// A recorded gateway call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    FetchBalance,
    LastPrice,
    OrderBook,
    Market,
    CreateOrder {
        side: OrderSide,
        amount: Decimal,
        price: Decimal,
        post_only: bool,
    },
    FetchOrder(String),
    CancelOrder(String),
}

#[derive(Default)]
struct MockState {
    balance: Balance,
    last_price: Decimal,
    order_book: OrderBook,
    market: Option<Market>,
    load_markets_error: Option<GatewayError>,
    create_responses: VecDeque<Result<Order, GatewayError>>,
    orders: HashMap<String, Order>,
    calls: Vec<Call>,
}

pub struct MockGateway {
    state: Mutex<MockState>,
}

pub fn test_market() -> Market {
    Market {
        symbol: "ETH/USDT".to_string(),
        precision: MarketPrecision {
            amount: dec!(0.0001),
            price: dec!(0.01),
        },
        limits: MarketLimits {
            amount: Limit::min(dec!(0.001)),
            price: Limit::min(dec!(0.01)),
            cost: Limit::min(dec!(5)),
        },
    }
}

pub fn order(id: &str, status: OrderStatus, side: OrderSide, amount: Decimal, price: Decimal) -> Order {
    Order {
        id: id.to_string(),
        status,
        side,
        amount,
        filled: Decimal::ZERO,
        price,
        fee: None,
        datetime: None,
        post_only: false,
    }
}

impl MockGateway {
    pub fn new() -> Self {
        let state = MockState {
            market: Some(test_market()),
            ..Default::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn set_holdings(&self, base: (&str, Decimal), quote: (&str, Decimal)) {
        self.with_state(|s| {
            for (currency, amount) in [base, quote] {
                s.balance.free.insert(currency.to_string(), amount);
                s.balance.used.insert(currency.to_string(), Decimal::ZERO);
                s.balance.total.insert(currency.to_string(), amount);
            }
        });
    }

    pub fn set_last_price(&self, price: Decimal) {
        self.with_state(|s| s.last_price = price);
    }

    pub fn set_order_book(&self, bids: Vec<BookLevel>, asks: Vec<BookLevel>) {
        self.with_state(|s| s.order_book = OrderBook { bids, asks });
    }

    /// `None` makes `get_market` fail as unexpected.
    pub fn set_market(&self, market: Option<Market>) {
        self.with_state(|s| s.market = market);
    }

    /// Make the next `load_markets` call fail.
    pub fn fail_load_markets(&self, error: GatewayError) {
        self.with_state(|s| s.load_markets_error = Some(error));
    }

    /// Queue the result of the next `create_order` call.
    pub fn push_create_response(&self, response: Result<Order, GatewayError>) {
        self.with_state(|s| s.create_responses.push_back(response));
    }

    /// Remote state returned by `fetch_order`.
    pub fn set_remote_order(&self, order: Order) {
        self.with_state(|s| {
            s.orders.insert(order.id.clone(), order);
        });
    }

    pub fn calls(&self) -> Vec<Call> {
        self.with_state(|s| s.calls.clone())
    }

    pub fn created_orders(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::CreateOrder { .. }))
            .collect()
    }

    fn record(&self, call: Call) {
        self.with_state(|s| s.calls.push(call));
    }
}

#[async_trait]
impl ExchangeGateway for MockGateway {
    async fn load_markets(&self) -> Result<(), GatewayError> {
        match self.with_state(|s| s.load_markets_error.take()) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn fetch_balance(&self) -> Result<Balance, GatewayError> {
        self.record(Call::FetchBalance);
        Ok(self.with_state(|s| s.balance.clone()))
    }

    async fn get_last_price(&self) -> Result<Decimal, GatewayError> {
        self.record(Call::LastPrice);
        Ok(self.with_state(|s| s.last_price))
    }

    async fn get_order_book(&self) -> Result<OrderBook, GatewayError> {
        self.record(Call::OrderBook);
        Ok(self.with_state(|s| s.order_book.clone()))
    }

    async fn get_market(&self) -> Result<Market, GatewayError> {
        self.record(Call::Market);
        self.with_state(|s| s.market.clone())
            .ok_or_else(|| GatewayError::Unexpected("no market".to_string()))
    }

    async fn create_order(
        &self,
        side: OrderSide,
        amount: Decimal,
        price: Decimal,
        post_only: bool,
    ) -> Result<Order, GatewayError> {
        self.record(Call::CreateOrder {
            side,
            amount,
            price,
            post_only,
        });
        let response = self.with_state(|s| s.create_responses.pop_front());
        let response = response.unwrap_or_else(|| {
            Ok(order("auto", OrderStatus::Open, side, amount, price))
        });
        if let Ok(order) = &response {
            self.set_remote_order(order.clone());
        }
        response
    }

    async fn fetch_order(&self, id: &str) -> Result<Order, GatewayError> {
        self.record(Call::FetchOrder(id.to_string()));
        self.with_state(|s| s.orders.get(id).cloned())
            .ok_or_else(|| GatewayError::Exchange(format!("Order does not exist: {}", id)))
    }

    async fn cancel_order(&self, id: &str) -> Result<(), GatewayError> {
        self.record(Call::CancelOrder(id.to_string()));
        self.with_state(|s| {
            if let Some(order) = s.orders.get_mut(id) {
                order.status = OrderStatus::Canceled;
            }
        });
        Ok(())
    }
}
