//! The limit order book for a single symbol: two `BTreeMap`-keyed,
//! price-time-priority ladders plus the sweep that matches an incoming
//! order against one of them.
//!
//! Prices are `Decimal`, never an integer tick count, and the sweep
//! stops at the first non-marketable level instead of walking every
//! level on the opposite side unconditionally -- without that check a
//! LIMIT BUY at 90 could cross and trade against a resting ask at 100,
//! which is exactly the trade-through this sweep is built to prevent.

use crate::errors::EngineError;
use crate::events::BookDelta;
use crate::fees::FeeCalculator;
use crate::instrument::SymbolConfig;
use crate::orders::{Order, OrderId, Side};
use crate::trade::Trade;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

fn level_quantity(level: &VecDeque<Order>) -> Decimal {
    level.iter().map(|o| o.quantity_remaining).sum()
}

/// Buy and sell ladders for one symbol, plus an `order_id -> (side,
/// price)` index so `cancel` doesn't need a linear scan over every
/// price level.
pub struct OrderBook {
    pub symbol: String,
    pub bids: BTreeMap<Decimal, VecDeque<Order>>,
    pub asks: BTreeMap<Decimal, VecDeque<Order>>,
    index: HashMap<OrderId, (Side, Decimal)>,
}

impl OrderBook {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            index: HashMap::new(),
        }
    }

    fn side_ladder(&self, side: Side) -> &BTreeMap<Decimal, VecDeque<Order>> {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    pub fn best_bid(&self) -> Option<(Decimal, Decimal)> {
        self.bids.iter().next_back().map(|(&p, lvl)| (p, level_quantity(lvl)))
    }

    pub fn best_ask(&self) -> Option<(Decimal, Decimal)> {
        self.asks.iter().next().map(|(&p, lvl)| (p, level_quantity(lvl)))
    }

    pub fn is_crossed(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some((bid, _)), Some((ask, _))) => bid >= ask,
            _ => false,
        }
    }

    /// Top `depth` levels each side: bids highest-first, asks lowest-first.
    pub fn snapshot_depth(&self, depth: usize) -> (Vec<(Decimal, Decimal)>, Vec<(Decimal, Decimal)>) {
        let bids = self
            .bids
            .iter()
            .rev()
            .take(depth)
            .map(|(&p, lvl)| (p, level_quantity(lvl)))
            .collect();
        let asks = self
            .asks
            .iter()
            .take(depth)
            .map(|(&p, lvl)| (p, level_quantity(lvl)))
            .collect();
        (bids, asks)
    }

    /// Rests `order` at its `limit_price`. Panics if the order has none;
    /// callers must only rest orders that passed `OrderKind::requires_limit_price`.
    pub fn add_resting(&mut self, order: Order) -> BookDelta {
        let side = order.side;
        let price = order
            .limit_price
            .expect("add_resting requires a limit price");
        let order_id = order.order_id;
        let symbol = order.symbol.clone();

        let ladder = match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        let level = ladder.entry(price).or_insert_with(VecDeque::new);
        level.push_back(order);
        let new_aggregate_quantity = level_quantity(level);
        self.index.insert(order_id, (side, price));

        BookDelta {
            symbol,
            side,
            price,
            new_aggregate_quantity,
        }
    }

    /// Removes a resting order by id. `NotFound` if it isn't resting
    /// (already filled, already cancelled, or never existed).
    pub fn cancel(&mut self, order_id: OrderId) -> Result<(Order, BookDelta), EngineError> {
        let (side, price) = self
            .index
            .remove(&order_id)
            .ok_or_else(|| EngineError::NotFound(order_id.to_string()))?;

        let ladder = match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        let level = ladder
            .get_mut(&price)
            .expect("book/index desync: price level missing");
        let pos = level
            .iter()
            .position(|o| o.order_id == order_id)
            .expect("book/index desync: order missing from its level");
        let order = level.remove(pos).expect("position just checked");
        let new_aggregate_quantity = level_quantity(level);
        if level.is_empty() {
            ladder.remove(&price);
        }

        let delta = BookDelta {
            symbol: order.symbol.clone(),
            side,
            price,
            new_aggregate_quantity,
        };
        Ok((order, delta))
    }

    /// Every resting order, in no particular cross-level order. Used
    /// only to build a warm-restart snapshot.
    pub fn resting_orders(&self) -> Vec<Order> {
        self.bids
            .values()
            .chain(self.asks.values())
            .flat_map(|level| level.iter().cloned())
            .collect()
    }

    /// Read-only sum of quantity obtainable by `taker_side` within
    /// `limit_price` (`None` = unbounded). Used for the FOK pre-check,
    /// which must observe zero side effects when it fails.
    pub fn available_liquidity(&self, taker_side: Side, limit_price: Option<Decimal>) -> Decimal {
        let ladder = self.side_ladder(taker_side.opposite());
        let mut total = Decimal::ZERO;
        match taker_side {
            Side::Buy => {
                for (&price, level) in ladder.iter() {
                    if let Some(bound) = limit_price {
                        if price > bound {
                            break;
                        }
                    }
                    total += level_quantity(level);
                }
            }
            Side::Sell => {
                for (&price, level) in ladder.iter().rev() {
                    if let Some(bound) = limit_price {
                        if price < bound {
                            break;
                        }
                    }
                    total += level_quantity(level);
                }
            }
        }
        total
    }

    /// Matches `incoming` against the opposite ladder in price-time
    /// priority, up to `incoming.limit_price` (unbounded if `None`, the
    /// MARKET case). Mutates both `incoming` and every resting order it
    /// touches in place; the caller decides what happens to any
    /// leftover quantity (rest it, cancel it, or -- for FOK -- never
    /// call this at all unless `available_liquidity` already cleared).
    pub fn match_sweep(
        &mut self,
        incoming: &mut Order,
        cfg: &SymbolConfig,
        trade_ids: &AtomicU64,
    ) -> (Vec<Trade>, Vec<BookDelta>) {
        let taker_side = incoming.side;
        let bound = incoming.effective_limit();
        let symbol = incoming.symbol.clone();
        let mut trades = Vec::new();
        let mut touched_prices: Vec<Decimal> = Vec::new();
        let mut levels_to_remove: Vec<Decimal> = Vec::new();

        let opposite = taker_side.opposite();
        let ladder = match opposite {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };

        let mut filled_order_ids: Vec<OrderId> = Vec::new();

        {
            let mut visit = |price: Decimal, level: &mut VecDeque<Order>| -> bool {
                if incoming.quantity_remaining.is_zero() {
                    return false;
                }
                if let Some(bound) = bound {
                    let marketable = match taker_side {
                        Side::Buy => price <= bound,
                        Side::Sell => price >= bound,
                    };
                    if !marketable {
                        return false;
                    }
                }
                touched_prices.push(price);
                while let Some(resting) = level.front_mut() {
                    if incoming.quantity_remaining.is_zero() {
                        break;
                    }
                    let trade_qty = incoming.quantity_remaining.min(resting.quantity_remaining);
                    let (maker_fee, taker_fee) = FeeCalculator::fees(cfg, price, trade_qty);
                    trades.push(Trade {
                        trade_id: trade_ids.fetch_add(1, Ordering::Relaxed),
                        symbol: symbol.clone(),
                        price,
                        quantity: trade_qty,
                        maker_order_id: resting.order_id,
                        taker_order_id: incoming.order_id,
                        maker_side: resting.side,
                        maker_fee,
                        taker_fee,
                        timestamp: SystemTime::now(),
                    });
                    incoming.fill(trade_qty);
                    resting.fill(trade_qty);
                    if resting.is_filled() {
                        filled_order_ids.push(resting.order_id);
                        level.pop_front();
                    }
                }
                if level.is_empty() {
                    levels_to_remove.push(price);
                }
                true
            };

            match opposite {
                Side::Buy => {
                    for (&price, level) in ladder.iter_mut().rev() {
                        if !visit(price, level) {
                            break;
                        }
                    }
                }
                Side::Sell => {
                    for (&price, level) in ladder.iter_mut() {
                        if !visit(price, level) {
                            break;
                        }
                    }
                }
            }
        }

        for price in &levels_to_remove {
            ladder.remove(price);
        }
        for id in &filled_order_ids {
            self.index.remove(id);
        }

        let deltas = touched_prices
            .into_iter()
            .map(|price| {
                let qty = self
                    .side_ladder(opposite)
                    .get(&price)
                    .map(level_quantity)
                    .unwrap_or(Decimal::ZERO);
                BookDelta {
                    symbol: symbol.clone(),
                    side: opposite,
                    price,
                    new_aggregate_quantity: qty,
                }
            })
            .collect();

        (trades, deltas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::OrderKind;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn cfg() -> SymbolConfig {
        SymbolConfig::with_defaults("BTC-USD")
    }

    fn resting(side: Side, price: Decimal, qty: Decimal, ts: u64) -> Order {
        Order {
            order_id: Uuid::new_v4(),
            symbol: "BTC-USD".into(),
            side,
            kind: OrderKind::Limit,
            limit_price: Some(price),
            stop_price: None,
            quantity_original: qty,
            quantity_remaining: qty,
            timestamp_accepted: ts,
            status: crate::orders::OrderStatus::Accepted,
        }
    }

    fn taker(side: Side, kind: OrderKind, price: Option<Decimal>, qty: Decimal) -> Order {
        Order {
            order_id: Uuid::new_v4(),
            symbol: "BTC-USD".into(),
            side,
            kind,
            limit_price: price,
            stop_price: None,
            quantity_original: qty,
            quantity_remaining: qty,
            timestamp_accepted: 0,
            status: crate::orders::OrderStatus::Accepted,
        }
    }

    /// S1: simple limit match leaving a resting remainder.
    #[test]
    fn s1_simple_limit_match() {
        let mut book = OrderBook::new("BTC-USD");
        let counter = AtomicU64::new(1);
        let a = resting(Side::Sell, dec!(100), dec!(5), 1);
        let a_id = a.order_id;
        book.add_resting(a);

        let mut b = taker(Side::Buy, OrderKind::Limit, Some(dec!(100)), dec!(3));
        let (trades, _deltas) = book.match_sweep(&mut b, &cfg(), &counter);

        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].price, dec!(100));
        assert_eq!(trades[0].quantity, dec!(3));
        assert_eq!(trades[0].maker_order_id, a_id);
        assert_eq!(trades[0].maker_fee, dec!(0.03));
        assert_eq!(trades[0].taker_fee, dec!(0.06));
        assert_eq!(book.asks.get(&dec!(100)).unwrap()[0].quantity_remaining, dec!(2));
        assert!(book.bids.is_empty());
    }

    /// S2: a market buy walks two price levels without skipping either,
    /// and never trades the farther level before the nearer one.
    #[test]
    fn s2_trade_through_protection() {
        let mut book = OrderBook::new("BTC-USD");
        let counter = AtomicU64::new(1);
        book.add_resting(resting(Side::Sell, dec!(100), dec!(1), 1));
        book.add_resting(resting(Side::Sell, dec!(101), dec!(10), 2));

        let mut order = taker(Side::Buy, OrderKind::Market, None, dec!(5));
        let (trades, _) = book.match_sweep(&mut order, &cfg(), &counter);

        assert_eq!(trades.len(), 2);
        assert_eq!((trades[0].price, trades[0].quantity), (dec!(100), dec!(1)));
        assert_eq!((trades[1].price, trades[1].quantity), (dec!(101), dec!(4)));
        assert_eq!(book.asks.get(&dec!(101)).unwrap()[0].quantity_remaining, dec!(6));
    }

    /// S3: FOK liquidity check is read-only and leaves the book untouched.
    #[test]
    fn s3_fok_precheck_does_not_mutate() {
        let mut book = OrderBook::new("BTC-USD");
        book.add_resting(resting(Side::Sell, dec!(100), dec!(2), 1));
        book.add_resting(resting(Side::Sell, dec!(101), dec!(2), 2));

        let available = book.available_liquidity(Side::Buy, Some(dec!(101)));
        assert_eq!(available, dec!(4));
        assert!(available < dec!(5));
        // book is untouched: still two resting levels.
        assert_eq!(book.asks.len(), 2);
    }

    /// S4: IOC sweeps what it can and leaves the residual for the
    /// caller to cancel rather than rest.
    #[test]
    fn s4_ioc_partial_fill() {
        let mut book = OrderBook::new("BTC-USD");
        let counter = AtomicU64::new(1);
        book.add_resting(resting(Side::Sell, dec!(100), dec!(2), 1));
        book.add_resting(resting(Side::Sell, dec!(101), dec!(2), 2));

        let mut order = taker(Side::Buy, OrderKind::Ioc, Some(dec!(101)), dec!(5));
        let (trades, _) = book.match_sweep(&mut order, &cfg(), &counter);

        assert_eq!(trades.len(), 2);
        assert_eq!(order.quantity_remaining, dec!(1));
        assert!(book.asks.is_empty());
    }

    /// S6: two resting bids at the same price fill strictly FIFO.
    #[test]
    fn s6_fifo_fairness_at_one_price() {
        let mut book = OrderBook::new("BTC-USD");
        let counter = AtomicU64::new(1);
        let a = resting(Side::Buy, dec!(100), dec!(2), 1);
        let a_id = a.order_id;
        let b = resting(Side::Buy, dec!(100), dec!(2), 2);
        let b_id = b.order_id;
        book.add_resting(a);
        book.add_resting(b);

        let mut sell = taker(Side::Sell, OrderKind::Limit, Some(dec!(100)), dec!(3));
        let (trades, _) = book.match_sweep(&mut sell, &cfg(), &counter);

        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].maker_order_id, a_id);
        assert_eq!(trades[0].quantity, dec!(2));
        assert_eq!(trades[1].maker_order_id, b_id);
        assert_eq!(trades[1].quantity, dec!(1));
        assert_eq!(book.bids.get(&dec!(100)).unwrap()[0].quantity_remaining, dec!(1));
    }

    /// A limit order priced below the best ask must not cross: the
    /// sweep must check marketability against the incoming price before
    /// touching a level, not just walk every level on the opposite side.
    #[test]
    fn non_marketable_limit_rests_without_matching() {
        let mut book = OrderBook::new("BTC-USD");
        let counter = AtomicU64::new(1);
        book.add_resting(resting(Side::Sell, dec!(100), dec!(5), 1));

        let mut buy = taker(Side::Buy, OrderKind::Limit, Some(dec!(90)), dec!(3));
        let (trades, _) = book.match_sweep(&mut buy, &cfg(), &counter);

        assert!(trades.is_empty());
        assert_eq!(buy.quantity_remaining, dec!(3));
    }

    #[test]
    fn cancel_removes_order_and_empty_level() {
        let mut book = OrderBook::new("BTC-USD");
        let order = resting(Side::Buy, dec!(101), dec!(10), 1);
        let id = order.order_id;
        book.add_resting(order);

        let (cancelled, delta) = book.cancel(id).unwrap();
        assert_eq!(cancelled.order_id, id);
        assert_eq!(delta.new_aggregate_quantity, Decimal::ZERO);
        assert!(!book.bids.contains_key(&dec!(101)));
    }

    #[test]
    fn cancel_nonexistent_order_is_not_found() {
        let mut book = OrderBook::new("BTC-USD");
        book.add_resting(resting(Side::Sell, dec!(99), dec!(5), 1));

        let err = book.cancel(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[test]
    fn book_is_never_left_crossed_by_a_marketable_limit() {
        let mut book = OrderBook::new("BTC-USD");
        let counter = AtomicU64::new(1);
        book.add_resting(resting(Side::Sell, dec!(105), dec!(5), 1));

        let mut crossing_buy = taker(Side::Buy, OrderKind::Limit, Some(dec!(110)), dec!(3));
        let (trades, _) = book.match_sweep(&mut crossing_buy, &cfg(), &counter);

        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].price, dec!(105));
        assert!(!book.is_crossed());
    }
}
