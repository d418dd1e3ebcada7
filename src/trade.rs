use crate::orders::{OrderId, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// A trade represents a matched transaction between two orders.
///
/// - The price comes from the maker's order (the resting order).
/// - Quantity is the amount filled.
/// - The taker is the incoming order that triggered the trade.
///
/// `quantity` is deducted from both participants' `quantity_remaining`
/// atomically with this value being constructed -- see
/// `orderbook::OrderBook::match_sweep`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: u64,
    pub symbol: String,
    pub price: Decimal,
    pub quantity: Decimal,
    pub maker_order_id: OrderId,
    pub taker_order_id: OrderId,
    /// Side of the resting (maker) order. The taker is the opposite side.
    pub maker_side: Side,
    pub maker_fee: Decimal,
    pub taker_fee: Decimal,
    pub timestamp: SystemTime,
}

impl Trade {
    pub fn timestamp_nanos(&self) -> u128 {
        self.timestamp
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
    }
}
