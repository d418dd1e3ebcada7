//! Fan-out of trade, depth (book-delta), and BBO events to subscribed
//! market-data consumers.
//!
//! One `tokio::sync::broadcast` channel per `(symbol, topic)`, rather
//! than a single pair of global channels keyed by symbol in the payload.
//! `broadcast` already gives exactly the delivery contract wanted here:
//! in-order delivery within a channel, and a slow subscriber that falls
//! behind gets `RecvError::Lagged(n)` on its next `recv()` instead of
//! blocking the publisher -- the `lagged(n)` notification is the
//! channel's own drop-oldest behavior, not something we build by hand.

use crate::orders::Side;
use crate::trade::Trade;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// Per-(symbol, side, price) change, published on the `depth` topic.
/// `new_aggregate_quantity == 0` means the level was removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookDelta {
    pub symbol: String,
    pub side: Side,
    pub price: Decimal,
    pub new_aggregate_quantity: Decimal,
}

/// Best bid/offer for a symbol; either side may be absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BboEvent {
    pub symbol: String,
    pub bid: Option<(Decimal, Decimal)>,
    pub ask: Option<(Decimal, Decimal)>,
}

/// The three broadcast channels kept for one symbol.
struct SymbolChannels {
    trades: broadcast::Sender<Trade>,
    depth: broadcast::Sender<BookDelta>,
    bbo: broadcast::Sender<BboEvent>,
}

impl SymbolChannels {
    fn new(capacity: usize) -> Self {
        Self {
            trades: broadcast::channel(capacity).0,
            depth: broadcast::channel(capacity).0,
            bbo: broadcast::channel(capacity).0,
        }
    }
}

/// Fan-out hub: one `SymbolChannels` per symbol, created lazily on
/// first publish or subscribe.
#[derive(Clone)]
pub struct EventBus {
    channels: Arc<RwLock<HashMap<String, SymbolChannels>>>,
    capacity: usize,
}

impl EventBus {
    /// `capacity` bounds each subscriber's buffer; once exceeded the
    /// oldest unread events are dropped and the subscriber sees
    /// `RecvError::Lagged` on its next `recv()`.
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            capacity,
        }
    }

    async fn ensure_symbol(&self, symbol: &str) {
        if !self.channels.read().await.contains_key(symbol) {
            let mut w = self.channels.write().await;
            w.entry(symbol.to_string())
                .or_insert_with(|| SymbolChannels::new(self.capacity));
        }
    }

    pub async fn publish_trade(&self, trade: Trade) {
        self.ensure_symbol(&trade.symbol).await;
        let r = self.channels.read().await;
        if let Some(chans) = r.get(&trade.symbol) {
            // No subscribers is not an error: publishing is fire-and-forget.
            let _ = chans.trades.send(trade);
        }
    }

    pub async fn publish_depth(&self, delta: BookDelta) {
        self.ensure_symbol(&delta.symbol).await;
        let r = self.channels.read().await;
        if let Some(chans) = r.get(&delta.symbol) {
            let _ = chans.depth.send(delta);
        }
    }

    pub async fn publish_bbo(&self, bbo: BboEvent) {
        self.ensure_symbol(&bbo.symbol).await;
        let r = self.channels.read().await;
        if let Some(chans) = r.get(&bbo.symbol) {
            let _ = chans.bbo.send(bbo);
        }
    }

    pub async fn subscribe_trades(&self, symbol: &str) -> broadcast::Receiver<Trade> {
        self.ensure_symbol(symbol).await;
        self.channels.read().await.get(symbol).unwrap().trades.subscribe()
    }

    pub async fn subscribe_depth(&self, symbol: &str) -> broadcast::Receiver<BookDelta> {
        self.ensure_symbol(symbol).await;
        self.channels.read().await.get(symbol).unwrap().depth.subscribe()
    }

    pub async fn subscribe_bbo(&self, symbol: &str) -> broadcast::Receiver<BboEvent> {
        self.ensure_symbol(symbol).await;
        self.channels.read().await.get(symbol).unwrap().bbo.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
