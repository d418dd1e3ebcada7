//! Shared application state: one lane per registered symbol, the event
//! bus they publish to, and the trade store they persist through.
//!
//! A symbol-keyed map of lane handles backed by the persistent
//! `Store`, rather than a single `OrderBook` behind a `Mutex` plus an
//! in-memory trade log -- one lane per symbol, each serializing its
//! own mutations independently of every other symbol.

use crate::events::EventBus;
use crate::instrument::SymbolRegistry;
use crate::lane::{spawn_lane, LaneHandle};
use crate::snapshot::BookSnapshot;
use crate::store::{Store, StoreError};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Default stop-activation cascade ceiling.
pub const DEFAULT_MAX_CASCADE_DEPTH: usize = 64;

#[derive(Clone)]
pub struct AppState {
    pub registry: SymbolRegistry,
    lanes: Arc<HashMap<String, LaneHandle>>,
    pub events: EventBus,
    pub store: Arc<Mutex<Store>>,
    max_cascade_depth: usize,
}

impl AppState {
    /// Opens the trade store at `store_path`, then spawns one lane per
    /// symbol in `registry`. `snapshots`, if given, is consulted for a
    /// per-symbol warm-restart `BookSnapshot` to restore before the lane
    /// starts serving requests.
    pub async fn new(
        store_path: impl AsRef<Path>,
        registry: SymbolRegistry,
        shutdown: CancellationToken,
        mut snapshots: HashMap<String, BookSnapshot>,
    ) -> Result<Self, StoreError> {
        Self::with_max_cascade_depth(
            store_path,
            registry,
            shutdown,
            &mut snapshots,
            DEFAULT_MAX_CASCADE_DEPTH,
        )
        .await
    }

    pub async fn with_max_cascade_depth(
        store_path: impl AsRef<Path>,
        registry: SymbolRegistry,
        shutdown: CancellationToken,
        snapshots: &mut HashMap<String, BookSnapshot>,
        max_cascade_depth: usize,
    ) -> Result<Self, StoreError> {
        let store = Arc::new(Mutex::new(Store::open(store_path)?));
        let events = EventBus::default();
        let trade_ids = Arc::new(AtomicU64::new(1));
        let timestamps = Arc::new(AtomicU64::new(1));

        let mut lanes = HashMap::new();
        for cfg in registry.symbols() {
            let restore = snapshots.remove(&cfg.symbol);
            let handle = spawn_lane(
                cfg.clone(),
                max_cascade_depth,
                trade_ids.clone(),
                timestamps.clone(),
                events.clone(),
                store.clone(),
                shutdown.clone(),
                restore,
            );
            lanes.insert(cfg.symbol.clone(), handle);
        }

        Ok(Self {
            registry,
            lanes: Arc::new(lanes),
            events,
            store,
            max_cascade_depth,
        })
    }

    /// Convenience constructor for tests: default pairs, no snapshots.
    pub async fn test_default(store_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::new(
            store_path,
            SymbolRegistry::with_default_pairs(),
            CancellationToken::new(),
            HashMap::new(),
        )
        .await
    }

    pub fn lane(&self, symbol: &str) -> Option<&LaneHandle> {
        self.lanes.get(symbol)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.lanes.keys().map(|s| s.as_str())
    }

    pub fn max_cascade_depth(&self) -> usize {
        self.max_cascade_depth
    }

    /// Exports every lane's resting orders and armed stops, keyed by
    /// symbol. Used on graceful shutdown to write warm-restart
    /// snapshots to disk.
    pub async fn export_all_snapshots(&self) -> HashMap<String, BookSnapshot> {
        let mut out = HashMap::new();
        for (symbol, lane) in self.lanes.iter() {
            if let Some(snap) = lane.export_snapshot().await {
                out.insert(symbol.clone(), snap);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_state_has_a_lane_for_each_default_pair() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::test_default(dir.path()).await.unwrap();
        assert!(state.lane("BTC-USD").is_some());
        assert!(state.lane("ETH-USD").is_some());
        assert!(state.lane("DOGE-USD").is_none());
    }
}
