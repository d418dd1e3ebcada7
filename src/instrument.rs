//! Symbol configuration: tick grids, decimal scales, and fee overrides.
//!
//! A small registry keyed by symbol code rather than a fixed enum of
//! hard-coded pairs, so new symbols can be configured without a
//! recompile.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default maker fee rate (0.01%), overridable per symbol.
pub const DEFAULT_MAKER_RATE: Decimal = dec!(0.0001);
/// Default taker fee rate (0.02%), overridable per symbol.
pub const DEFAULT_TAKER_RATE: Decimal = dec!(0.0002);

/// Configuration for one trading symbol: the tick grid and decimal
/// scales prices/quantities must respect, plus fee-rate overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolConfig {
    /// Symbol code, e.g. `"BTC-USD"`.
    pub symbol: String,
    /// Smallest permissible price increment. A price is on-grid iff
    /// `price % tick_size == 0`.
    pub tick_size: Decimal,
    /// Number of decimal places prices are quantized to.
    pub price_scale: u32,
    /// Number of decimal places quantities are quantized to.
    pub qty_scale: u32,
    /// Maker fee rate, applied to notional. Defaults to
    /// [`DEFAULT_MAKER_RATE`] when omitted from a config file.
    #[serde(default = "default_maker_rate")]
    pub maker_rate: Decimal,
    /// Taker fee rate, applied to notional. Defaults to
    /// [`DEFAULT_TAKER_RATE`] when omitted from a config file.
    #[serde(default = "default_taker_rate")]
    pub taker_rate: Decimal,
}

fn default_maker_rate() -> Decimal {
    DEFAULT_MAKER_RATE
}

fn default_taker_rate() -> Decimal {
    DEFAULT_TAKER_RATE
}

impl SymbolConfig {
    /// A symbol with the crate's default fee rates and a `0.01` tick.
    pub fn with_defaults(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            tick_size: dec!(0.01),
            price_scale: 2,
            qty_scale: 8,
            maker_rate: DEFAULT_MAKER_RATE,
            taker_rate: DEFAULT_TAKER_RATE,
        }
    }

    /// True iff `price` lies on this symbol's tick grid (a positive
    /// integer multiple of `tick_size`).
    pub fn on_tick_grid(&self, price: Decimal) -> bool {
        if price <= Decimal::ZERO || self.tick_size <= Decimal::ZERO {
            return false;
        }
        (price / self.tick_size).fract().is_zero()
    }

    /// Quantize `price` to this symbol's price scale.
    pub fn quantize_price(&self, price: Decimal) -> Decimal {
        price.round_dp(self.price_scale)
    }

    /// Quantize `qty` to this symbol's quantity scale.
    pub fn quantize_qty(&self, qty: Decimal) -> Decimal {
        qty.round_dp(self.qty_scale)
    }
}

/// Registry of known symbols. The matching engine consults this to
/// validate incoming requests (unknown symbol => `UnknownSymbol`) and
/// to look up tick grids and fee rates.
#[derive(Debug, Clone, Default)]
pub struct SymbolRegistry {
    symbols: HashMap<String, SymbolConfig>,
}

impl SymbolRegistry {
    pub fn new() -> Self {
        Self {
            symbols: HashMap::new(),
        }
    }

    /// The registry seeded with the crate's two default spot pairs.
    pub fn with_default_pairs() -> Self {
        let mut reg = Self::new();
        reg.insert(SymbolConfig::with_defaults("BTC-USD"));
        reg.insert(SymbolConfig::with_defaults("ETH-USD"));
        reg
    }

    pub fn insert(&mut self, config: SymbolConfig) {
        self.symbols.insert(config.symbol.clone(), config);
    }

    pub fn get(&self, symbol: &str) -> Option<&SymbolConfig> {
        self.symbols.get(symbol)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.contains_key(symbol)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &SymbolConfig> {
        self.symbols.values()
    }

    /// Load additional (or overriding) symbol configs from a JSON file:
    /// a top-level array of [`SymbolConfig`] values. Mirrors the
    /// serialize-to-disk-with-serde_json idiom already used by the
    /// trade store and the book snapshot loader.
    pub fn load_from_json(&mut self, raw: &str) -> serde_json::Result<()> {
        let configs: Vec<SymbolConfig> = serde_json::from_str(raw)?;
        for c in configs {
            self.insert(c);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pairs_are_registered() {
        let reg = SymbolRegistry::with_default_pairs();
        assert!(reg.contains("BTC-USD"));
        assert!(reg.contains("ETH-USD"));
        assert!(!reg.contains("DOGE-USD"));
    }

    #[test]
    fn tick_grid_rejects_off_grid_prices() {
        let cfg = SymbolConfig::with_defaults("BTC-USD");
        assert!(cfg.on_tick_grid(dec!(100.00)));
        assert!(cfg.on_tick_grid(dec!(100.01)));
        assert!(!cfg.on_tick_grid(dec!(100.005)));
        assert!(!cfg.on_tick_grid(dec!(0)));
        assert!(!cfg.on_tick_grid(dec!(-1)));
    }

    #[test]
    fn load_from_json_overrides_fee_rates() {
        let mut reg = SymbolRegistry::with_default_pairs();
        let raw = r#"[{"symbol":"BTC-USD","tick_size":"0.5","price_scale":1,"qty_scale":4,"maker_rate":"0.0002","taker_rate":"0.0004"}]"#;
        reg.load_from_json(raw).unwrap();
        let cfg = reg.get("BTC-USD").unwrap();
        assert_eq!(cfg.tick_size, dec!(0.5));
        assert_eq!(cfg.maker_rate, dec!(0.0002));
    }
}
