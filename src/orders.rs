//! Order data model: sides, kinds, status, and the resting `Order` the
//! book owns while it lives.
//!
//! Covers the full matching-kind set (market, limit, IOC, FOK, and the
//! three stop variants), with prices/quantities carried as
//! `rust_decimal::Decimal` for exact fixed-point arithmetic rather than
//! raw integer ticks.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type OrderId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// A tagged-variant sum type: the kind plus which optional price
/// fields are present is decided once, at this type's construction,
/// rather than re-validated downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    Market,
    Limit,
    Ioc,
    Fok,
    StopMarket,
    StopLimit,
    TakeProfit,
}

impl OrderKind {
    /// Stop kinds are armed by the `StopMonitor` instead of matched
    /// immediately against the book.
    pub fn is_stop(self) -> bool {
        matches!(
            self,
            OrderKind::StopMarket | OrderKind::StopLimit | OrderKind::TakeProfit
        )
    }

    /// Whether this kind carries a `limit_price`.
    pub fn requires_limit_price(self) -> bool {
        matches!(
            self,
            OrderKind::Limit | OrderKind::Ioc | OrderKind::Fok | OrderKind::StopLimit | OrderKind::TakeProfit
        )
    }

    /// Whether this kind carries a `stop_price`.
    pub fn requires_stop_price(self) -> bool {
        self.is_stop()
    }

    /// The kind a triggered stop order becomes once activated:
    /// `STOP_MARKET -> MARKET`, `STOP_LIMIT`/`TAKE_PROFIT -> LIMIT`
    /// (keeping the original `limit_price`).
    pub fn activation_kind(self) -> OrderKind {
        match self {
            OrderKind::StopMarket => OrderKind::Market,
            OrderKind::StopLimit | OrderKind::TakeProfit => OrderKind::Limit,
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Accepted,
    Partial,
    Filled,
    Cancelled,
    Rejected,
    Armed,
    Triggered,
}

/// A live order. The `OrderBook` exclusively owns resting orders; the
/// `StopMonitor` exclusively owns `Armed` stop orders (see
/// `stop_monitor::StopOrder`, which wraps this plus trigger metadata).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub symbol: String,
    pub side: Side,
    pub kind: OrderKind,
    pub limit_price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub quantity_original: Decimal,
    pub quantity_remaining: Decimal,
    pub timestamp_accepted: u64,
    pub status: OrderStatus,
}

impl Order {
    /// Deduct `qty` from `quantity_remaining`, updating `status` to
    /// `Partial` or `Filled` as appropriate. `qty` must not exceed
    /// `quantity_remaining`.
    pub fn fill(&mut self, qty: Decimal) {
        debug_assert!(qty > Decimal::ZERO && qty <= self.quantity_remaining);
        self.quantity_remaining -= qty;
        self.status = if self.quantity_remaining.is_zero() {
            OrderStatus::Filled
        } else {
            OrderStatus::Partial
        };
    }

    pub fn is_filled(&self) -> bool {
        self.quantity_remaining.is_zero()
    }

    /// Price at which this order would walk the book unbounded: used to
    /// give MARKET orders a sentinel "marketable at any price" bound
    /// without special-casing the sweep's comparison logic.
    pub fn effective_limit(&self) -> Option<Decimal> {
        self.limit_price
    }
}
