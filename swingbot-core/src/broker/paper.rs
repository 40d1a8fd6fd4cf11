//! In-memory paper broker.
//!
//! Fills against the latest quote midpoint (or last bar close), keeps cash
//! and positions consistent, and records every call so tests can assert on
//! exactly what was submitted. Fill behaviour and failures are injectable.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{Broker, BrokerError};
use crate::domain::{
    AccountSnapshot, Bar, OrderId, OrderKind, OrderQuantity, OrderRequest, OrderResult, OrderSide,
    OrderStatus, PositionSnapshot, Quote, Timeframe,
};

/// How submitted orders fill.
#[derive(Debug, Clone, PartialEq)]
pub enum FillMode {
    /// Every order fills on submission.
    Immediate,
    /// Nothing ever fills; orders rest until canceled.
    Never,
    /// Every submission is rejected with this reason.
    Reject(String),
    /// Orders fill on the n-th status poll.
    AfterPolls(u32),
    /// Market orders fill immediately; limit orders never fill.
    MarketOnly,
    /// A buy limit fills once its price is at or above this level, a sell
    /// limit once at or below it. Market orders fill immediately.
    MarketableAt(f64),
    /// Orders report this fraction filled and then rest.
    Partial(f64),
}

#[derive(Debug, Clone)]
struct PaperOrder {
    request: OrderRequest,
    result: OrderResult,
    polls: u32,
    fill_price: f64,
}

#[derive(Debug, Default)]
struct Failures {
    account: Option<BrokerError>,
    positions: Option<BrokerError>,
    bars: BTreeSet<String>,
    quotes: BTreeSet<String>,
}

#[derive(Debug)]
struct PaperState {
    cash: f64,
    last_equity: f64,
    positions: BTreeMap<String, PositionSnapshot>,
    bars: HashMap<String, Vec<Bar>>,
    quotes: HashMap<String, Quote>,
    orders: BTreeMap<u64, PaperOrder>,
    next_id: u64,
    fill_mode: FillMode,
    failures: Failures,
    submissions: Vec<OrderRequest>,
    cancellations: Vec<OrderId>,
    cancel_all_calls: usize,
    close_all_calls: usize,
}

#[derive(Debug)]
pub struct PaperBroker {
    state: Mutex<PaperState>,
}

impl PaperBroker {
    /// Cash-only account whose prior close equals the starting cash.
    pub fn new(cash: f64) -> Self {
        Self {
            state: Mutex::new(PaperState {
                cash,
                last_equity: cash,
                positions: BTreeMap::new(),
                bars: HashMap::new(),
                quotes: HashMap::new(),
                orders: BTreeMap::new(),
                next_id: 1,
                fill_mode: FillMode::Immediate,
                failures: Failures::default(),
                submissions: Vec::new(),
                cancellations: Vec::new(),
                cancel_all_calls: 0,
                close_all_calls: 0,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, PaperState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_fill_mode(self, mode: FillMode) -> Self {
        self.set_fill_mode(mode);
        self
    }

    pub fn set_fill_mode(&self, mode: FillMode) {
        self.state().fill_mode = mode;
    }

    pub fn set_last_equity(&self, last_equity: f64) {
        self.state().last_equity = last_equity;
    }

    pub fn set_bars(&self, symbol: &str, bars: Vec<Bar>) {
        let mut st = self.state();
        if let Some(close) = bars.last().map(|b| b.close) {
            if let Some(p) = st.positions.get_mut(symbol) {
                p.current_price = close;
            }
        }
        st.bars.insert(symbol.to_string(), bars);
    }

    pub fn set_quote(&self, symbol: &str, quote: Quote) {
        self.state().quotes.insert(symbol.to_string(), quote);
    }

    /// Seed a held position.
    pub fn add_position(&self, symbol: &str, qty: f64, avg_entry_price: f64, current_price: f64) {
        self.state().positions.insert(
            symbol.to_string(),
            PositionSnapshot {
                symbol: symbol.to_string(),
                qty,
                avg_entry_price,
                current_price,
                unrealized_plpc: (current_price - avg_entry_price) / avg_entry_price,
            },
        );
    }

    pub fn fail_account(&self, err: Option<BrokerError>) {
        self.state().failures.account = err;
    }

    pub fn fail_positions(&self, err: Option<BrokerError>) {
        self.state().failures.positions = err;
    }

    pub fn fail_bars(&self, symbol: &str) {
        self.state().failures.bars.insert(symbol.to_string());
    }

    pub fn fail_quote(&self, symbol: &str) {
        self.state().failures.quotes.insert(symbol.to_string());
    }

    /// Every request passed to `submit_order`, in order, including rejected ones.
    pub fn submissions(&self) -> Vec<OrderRequest> {
        self.state().submissions.clone()
    }

    pub fn cancellations(&self) -> Vec<OrderId> {
        self.state().cancellations.clone()
    }

    pub fn cancel_all_calls(&self) -> usize {
        self.state().cancel_all_calls
    }

    pub fn close_all_calls(&self) -> usize {
        self.state().close_all_calls
    }

    pub fn position(&self, symbol: &str) -> Option<PositionSnapshot> {
        self.state().positions.get(symbol).cloned()
    }

    pub fn cash(&self) -> f64 {
        self.state().cash
    }
}

impl PaperState {
    fn reference_price(&self, symbol: &str) -> Option<f64> {
        self.quotes
            .get(symbol)
            .and_then(Quote::mid)
            .or_else(|| self.bars.get(symbol).and_then(|b| b.last()).map(|b| b.close))
            .or_else(|| self.positions.get(symbol).map(|p| p.current_price))
            .filter(|p| p.is_finite() && *p > 0.0)
    }

    fn equity(&self) -> f64 {
        self.cash + self.positions.values().map(|p| p.market_value()).sum::<f64>()
    }

    fn fills_on_submit(&self, req: &OrderRequest) -> bool {
        let is_market = req.order_type == OrderKind::Market;
        match &self.fill_mode {
            FillMode::Immediate => true,
            FillMode::MarketOnly => is_market,
            FillMode::MarketableAt(level) => {
                is_market
                    || req.limit_price.is_some_and(|lp| match req.side {
                        OrderSide::Buy => lp >= *level,
                        OrderSide::Sell => lp <= *level,
                    })
            }
            FillMode::Never | FillMode::Reject(_) | FillMode::AfterPolls(_) | FillMode::Partial(_) => {
                false
            }
        }
    }

    /// Book `qty` shares at `price` against cash and positions.
    fn apply_fill(&mut self, symbol: &str, side: OrderSide, qty: f64, price: f64) {
        match side {
            OrderSide::Buy => {
                self.cash -= qty * price;
                let pos = self
                    .positions
                    .entry(symbol.to_string())
                    .or_insert_with(|| PositionSnapshot {
                        symbol: symbol.to_string(),
                        qty: 0.0,
                        avg_entry_price: price,
                        current_price: price,
                        unrealized_plpc: 0.0,
                    });
                let cost = pos.qty * pos.avg_entry_price + qty * price;
                pos.qty += qty;
                pos.avg_entry_price = cost / pos.qty;
                pos.current_price = price;
            }
            OrderSide::Sell => {
                self.cash += qty * price;
                if let Some(pos) = self.positions.get_mut(symbol) {
                    pos.qty -= qty;
                    pos.current_price = price;
                    if pos.qty <= 1e-9 {
                        self.positions.remove(symbol);
                    }
                }
            }
        }
    }

    fn fill_order(&mut self, id: u64, fraction: f64) {
        let Some(order) = self.orders.get(&id).cloned() else {
            return;
        };
        let total = order.request_shares();
        let target = total * fraction;
        let delta = target - order.result.filled_qty;
        if delta > 0.0 {
            self.apply_fill(&order.request.symbol, order.request.side, delta, order.fill_price);
        }
        if let Some(o) = self.orders.get_mut(&id) {
            o.result.filled_qty = target;
            o.result.filled_avg_price = Some(o.fill_price);
            o.result.status = if fraction >= 1.0 {
                OrderStatus::Filled
            } else {
                OrderStatus::PartiallyFilled
            };
        }
    }
}

impl PaperOrder {
    fn request_shares(&self) -> f64 {
        match self.request.quantity {
            OrderQuantity::Shares(q) => q,
            OrderQuantity::Notional(n) => n / self.fill_price,
        }
    }
}

fn parse_id(order_id: &OrderId) -> Result<u64, BrokerError> {
    order_id
        .0
        .strip_prefix("paper-")
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| BrokerError::NotFound(order_id.to_string()))
}

impl Broker for PaperBroker {
    fn get_account(&self) -> Result<AccountSnapshot, BrokerError> {
        let st = self.state();
        if let Some(err) = &st.failures.account {
            return Err(err.clone());
        }
        let equity = st.equity();
        Ok(AccountSnapshot {
            equity,
            cash: st.cash,
            buying_power: st.cash.max(0.0),
            last_equity: st.last_equity,
        })
    }

    fn list_positions(&self) -> Result<Vec<PositionSnapshot>, BrokerError> {
        let st = self.state();
        if let Some(err) = &st.failures.positions {
            return Err(err.clone());
        }
        Ok(st
            .positions
            .values()
            .map(|p| PositionSnapshot {
                unrealized_plpc: p.pct_change_at(p.current_price).unwrap_or(0.0),
                ..p.clone()
            })
            .collect())
    }

    fn get_bars(
        &self,
        symbol: &str,
        _timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Bar>, BrokerError> {
        let st = self.state();
        if st.failures.bars.contains(symbol) {
            return Err(BrokerError::Network(format!("bars for {symbol} unavailable")));
        }
        let bars = st
            .bars
            .get(symbol)
            .ok_or_else(|| BrokerError::NotFound(format!("no bars for {symbol}")))?;
        let start = bars.len().saturating_sub(limit);
        Ok(bars[start..].to_vec())
    }

    fn get_latest_quote(&self, symbol: &str) -> Result<Quote, BrokerError> {
        let st = self.state();
        if st.failures.quotes.contains(symbol) {
            return Err(BrokerError::Network(format!("quote for {symbol} unavailable")));
        }
        if let Some(q) = st.quotes.get(symbol) {
            return Ok(*q);
        }
        // Synthesize a one-cent market around the last close.
        let close = st
            .bars
            .get(symbol)
            .and_then(|b| b.last())
            .map(|b| b.close)
            .ok_or_else(|| BrokerError::NotFound(format!("no quote for {symbol}")))?;
        Ok(Quote {
            bid: close - 0.005,
            ask: close + 0.005,
        })
    }

    fn submit_order(&self, request: &OrderRequest) -> Result<OrderResult, BrokerError> {
        let mut st = self.state();
        st.submissions.push(request.clone());

        if let FillMode::Reject(reason) = &st.fill_mode {
            return Err(BrokerError::rejected(reason.clone()));
        }
        if request.quantity.is_empty() {
            return Err(BrokerError::rejected("quantity must be positive"));
        }
        if request.order_type == OrderKind::Limit && request.limit_price.is_none() {
            return Err(BrokerError::rejected("limit order without limit price"));
        }
        let fill_price = match request.order_type {
            OrderKind::Limit => request.limit_price,
            OrderKind::Market => st.reference_price(&request.symbol),
        }
        .ok_or_else(|| BrokerError::rejected(format!("no price for {}", request.symbol)))?;

        let id = st.next_id;
        st.next_id += 1;
        let order_id = OrderId::new(format!("paper-{id}"));
        let fills_now = st.fills_on_submit(request);
        let partial = match st.fill_mode {
            FillMode::Partial(f) => Some(f.clamp(0.0, 1.0)),
            _ => None,
        };
        st.orders.insert(
            id,
            PaperOrder {
                request: request.clone(),
                result: OrderResult {
                    order_id: order_id.clone(),
                    status: OrderStatus::Submitted,
                    filled_qty: 0.0,
                    filled_avg_price: None,
                },
                polls: 0,
                fill_price,
            },
        );
        if fills_now {
            st.fill_order(id, 1.0);
        } else if let Some(f) = partial {
            st.fill_order(id, f);
        }

        st.orders
            .get(&id)
            .map(|o| o.result.clone())
            .ok_or_else(|| BrokerError::Other("order vanished".into()))
    }

    fn get_order(&self, order_id: &OrderId) -> Result<OrderResult, BrokerError> {
        let id = parse_id(order_id)?;
        let mut st = self.state();
        let mode = st.fill_mode.clone();
        let order = st
            .orders
            .get_mut(&id)
            .ok_or_else(|| BrokerError::NotFound(order_id.to_string()))?;
        order.polls += 1;
        let due = matches!(mode, FillMode::AfterPolls(n) if order.polls >= n)
            && !order.result.status.is_terminal();
        if due {
            st.fill_order(id, 1.0);
        }
        st.orders
            .get(&id)
            .map(|o| o.result.clone())
            .ok_or_else(|| BrokerError::NotFound(order_id.to_string()))
    }

    fn cancel_order(&self, order_id: &OrderId) -> Result<(), BrokerError> {
        let id = parse_id(order_id)?;
        let mut st = self.state();
        st.cancellations.push(order_id.clone());
        let order = st
            .orders
            .get_mut(&id)
            .ok_or_else(|| BrokerError::NotFound(order_id.to_string()))?;
        if !order.result.status.is_terminal() {
            order.result.status = OrderStatus::Canceled;
        }
        Ok(())
    }

    fn cancel_all_orders(&self) -> Result<usize, BrokerError> {
        let mut st = self.state();
        st.cancel_all_calls += 1;
        let mut n = 0;
        for order in st.orders.values_mut() {
            if !order.result.status.is_terminal() {
                order.result.status = OrderStatus::Canceled;
                n += 1;
            }
        }
        Ok(n)
    }

    fn close_all_positions(&self) -> Result<Vec<OrderResult>, BrokerError> {
        let mut st = self.state();
        st.close_all_calls += 1;
        let held: Vec<PositionSnapshot> = st.positions.values().cloned().collect();
        let mut results = Vec::with_capacity(held.len());
        for pos in held {
            let price = st.reference_price(&pos.symbol).unwrap_or(pos.current_price);
            let id = st.next_id;
            st.next_id += 1;
            st.apply_fill(&pos.symbol, OrderSide::Sell, pos.qty, price);
            results.push(OrderResult {
                order_id: OrderId::new(format!("paper-{id}")),
                status: OrderStatus::Filled,
                filled_qty: pos.qty,
                filled_avg_price: Some(price),
            });
        }
        Ok(results)
    }
}
