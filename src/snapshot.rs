//! Warm-restart snapshot of one symbol's book: every resting order plus
//! every armed stop, serialized to JSON so `Order::timestamp_accepted`
//! (the FIFO tie-break) survives a restart intact instead of being
//! reassigned on reload.
//!
//! Mirrors the serialize-with-serde_json-to-disk idiom already used
//! for the trade store's cursor encoding (`store.rs`).

use crate::orders::Order;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub symbol: String,
    pub resting_orders: Vec<Order>,
    pub armed_stops: Vec<Order>,
}

impl BookSnapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let raw = self.to_json().map_err(io::Error::other)?;
        std::fs::write(path, raw)
    }

    pub fn load(path: impl AsRef<Path>) -> io::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw).map_err(io::Error::other)
    }
}
