//! Tracks armed STOP_MARKET / STOP_LIMIT / TAKE_PROFIT orders and decides
//! which of them a new last-trade price triggers.
//!
//! Shaped as a second book of pending orders with a linear `cancel`
//! scan, the same way `OrderBook::cancel` removes a resting order --
//! except this one is keyed by trigger condition instead of price.
//!
//! Trigger direction is derived from `(kind, side)` alone, resolving the
//! question of whether a caller must specify it separately: a stop
//! (STOP_MARKET/STOP_LIMIT) is a protective order, so a SELL stop
//! triggers on prices falling to or through its `stop_price` and a BUY
//! stop triggers on prices rising to or through it; TAKE_PROFIT is the
//! mirror image of that, since it exists to lock in a favorable move.

use crate::errors::EngineError;
use crate::orders::{Order, OrderId, OrderKind, Side};
use rust_decimal::Decimal;

#[derive(PartialEq)]
enum Direction {
    Above,
    Below,
}

pub struct StopMonitor {
    #[allow(dead_code)]
    symbol: String,
    stops: Vec<Order>,
    max_cascade_depth: usize,
}

impl StopMonitor {
    pub fn new(symbol: impl Into<String>, max_cascade_depth: usize) -> Self {
        Self {
            symbol: symbol.into(),
            stops: Vec::new(),
            max_cascade_depth,
        }
    }

    pub fn max_cascade_depth(&self) -> usize {
        self.max_cascade_depth
    }

    pub fn arm(&mut self, order: Order) {
        debug_assert!(order.kind.is_stop());
        self.stops.push(order);
    }

    pub fn cancel(&mut self, order_id: OrderId) -> Result<Order, EngineError> {
        let pos = self
            .stops
            .iter()
            .position(|o| o.order_id == order_id)
            .ok_or_else(|| EngineError::NotFound(order_id.to_string()))?;
        Ok(self.stops.remove(pos))
    }

    pub fn armed_count(&self) -> usize {
        self.stops.len()
    }

    /// Every armed stop, in arming order. Used only to build a
    /// warm-restart snapshot.
    pub fn armed_orders(&self) -> Vec<Order> {
        self.stops.clone()
    }

    fn triggers(order: &Order, last_price: Decimal) -> bool {
        let stop_price = match order.stop_price {
            Some(p) => p,
            None => return false,
        };
        match (order.kind, order.side) {
            (OrderKind::StopMarket | OrderKind::StopLimit, Side::Sell) => last_price <= stop_price,
            (OrderKind::StopMarket | OrderKind::StopLimit, Side::Buy) => last_price >= stop_price,
            (OrderKind::TakeProfit, Side::Sell) => last_price >= stop_price,
            (OrderKind::TakeProfit, Side::Buy) => last_price <= stop_price,
            _ => false,
        }
    }

    /// Whether an order's trigger condition fires on a rising
    /// (`Above`) or falling (`Below`) price move; determines which
    /// direction its `stop_price` is sorted in by `pop_triggered`.
    fn direction(order: &Order) -> Direction {
        match (order.kind, order.side) {
            (OrderKind::StopMarket | OrderKind::StopLimit, Side::Sell) => Direction::Below,
            (OrderKind::StopMarket | OrderKind::StopLimit, Side::Buy) => Direction::Above,
            (OrderKind::TakeProfit, Side::Sell) => Direction::Above,
            (OrderKind::TakeProfit, Side::Buy) => Direction::Below,
            _ => Direction::Above,
        }
    }

    /// Removes and returns every armed order that `last_price` now
    /// triggers, ordered by `stop_price` in the direction of the price
    /// move that triggered it -- closer to the pre-trigger price first
    /// -- with FIFO (`timestamp_accepted`) as the tie-break within an
    /// equal `stop_price`. Callers activate each and feed the
    /// resulting new last-trade price back in for the next round.
    pub fn pop_triggered(&mut self, last_price: Decimal) -> Vec<Order> {
        let (mut triggered, remaining): (Vec<_>, Vec<_>) = self
            .stops
            .drain(..)
            .partition(|o| Self::triggers(o, last_price));
        self.stops = remaining;

        triggered.sort_by(|a, b| {
            let key = |o: &Order| {
                let price = o.stop_price.unwrap_or(Decimal::ZERO);
                match Self::direction(o) {
                    Direction::Above => price,
                    Direction::Below => -price,
                }
            };
            key(a).cmp(&key(b)).then(a.timestamp_accepted.cmp(&b.timestamp_accepted))
        });
        triggered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::OrderStatus;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn stop(kind: OrderKind, side: Side, stop_price: Decimal) -> Order {
        stop_at(kind, side, stop_price, 1)
    }

    fn stop_at(kind: OrderKind, side: Side, stop_price: Decimal, ts: u64) -> Order {
        Order {
            order_id: Uuid::new_v4(),
            symbol: "BTC-USD".into(),
            side,
            kind,
            limit_price: None,
            stop_price: Some(stop_price),
            quantity_original: dec!(1),
            quantity_remaining: dec!(1),
            timestamp_accepted: ts,
            status: OrderStatus::Armed,
        }
    }

    #[test]
    fn sell_stop_triggers_on_price_falling_through() {
        let mut mon = StopMonitor::new("BTC-USD", 64);
        mon.arm(stop(OrderKind::StopMarket, Side::Sell, dec!(99)));

        assert!(mon.pop_triggered(dec!(100)).is_empty());
        let triggered = mon.pop_triggered(dec!(99));
        assert_eq!(triggered.len(), 1);
        assert_eq!(mon.armed_count(), 0);
    }

    #[test]
    fn buy_take_profit_triggers_on_price_falling_through() {
        let mut mon = StopMonitor::new("BTC-USD", 64);
        mon.arm(stop(OrderKind::TakeProfit, Side::Buy, dec!(95)));

        assert!(mon.pop_triggered(dec!(96)).is_empty());
        assert_eq!(mon.pop_triggered(dec!(95)).len(), 1);
    }

    /// A single falling price crossing several SELL-stop levels at once
    /// must activate them highest-`stop_price`-first -- closest to the
    /// pre-trigger price -- not in arming order.
    #[test]
    fn falling_price_triggers_sell_stops_highest_stop_price_first() {
        let mut mon = StopMonitor::new("BTC-USD", 64);
        // armed lowest-first, the opposite of expected activation order.
        mon.arm(stop(OrderKind::StopMarket, Side::Sell, dec!(95)));
        mon.arm(stop(OrderKind::StopMarket, Side::Sell, dec!(99)));
        mon.arm(stop(OrderKind::StopMarket, Side::Sell, dec!(97)));

        let triggered = mon.pop_triggered(dec!(90));
        let prices: Vec<Decimal> = triggered.iter().map(|o| o.stop_price.unwrap()).collect();
        assert_eq!(prices, vec![dec!(99), dec!(97), dec!(95)]);
    }

    /// A single rising price crossing several BUY-stop levels at once
    /// must activate them lowest-`stop_price`-first.
    #[test]
    fn rising_price_triggers_buy_stops_lowest_stop_price_first() {
        let mut mon = StopMonitor::new("BTC-USD", 64);
        mon.arm(stop(OrderKind::StopMarket, Side::Buy, dec!(105)));
        mon.arm(stop(OrderKind::StopMarket, Side::Buy, dec!(101)));
        mon.arm(stop(OrderKind::StopMarket, Side::Buy, dec!(103)));

        let triggered = mon.pop_triggered(dec!(110));
        let prices: Vec<Decimal> = triggered.iter().map(|o| o.stop_price.unwrap()).collect();
        assert_eq!(prices, vec![dec!(101), dec!(103), dec!(105)]);
    }

    /// Two stops at the same `stop_price` fire in arming (FIFO) order.
    #[test]
    fn equal_stop_price_breaks_tie_by_arming_order() {
        let mut mon = StopMonitor::new("BTC-USD", 64);
        let first = stop_at(OrderKind::StopMarket, Side::Sell, dec!(99), 1);
        let first_id = first.order_id;
        let second = stop_at(OrderKind::StopMarket, Side::Sell, dec!(99), 2);
        let second_id = second.order_id;
        mon.arm(first);
        mon.arm(second);

        let triggered = mon.pop_triggered(dec!(99));
        assert_eq!(triggered[0].order_id, first_id);
        assert_eq!(triggered[1].order_id, second_id);
    }

    #[test]
    fn cancel_removes_armed_order() {
        let mut mon = StopMonitor::new("BTC-USD", 64);
        let o = stop(OrderKind::StopMarket, Side::Sell, dec!(99));
        let id = o.order_id;
        mon.arm(o);

        let cancelled = mon.cancel(id).unwrap();
        assert_eq!(cancelled.order_id, id);
        assert_eq!(mon.armed_count(), 0);
    }

    #[test]
    fn cancel_unknown_is_not_found() {
        let mut mon = StopMonitor::new("BTC-USD", 64);
        assert!(matches!(mon.cancel(Uuid::new_v4()), Err(EngineError::NotFound(_))));
    }
}
