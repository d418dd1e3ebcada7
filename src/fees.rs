//! Pure fee computation: `fees(price, quantity) -> (maker_fee, taker_fee)`.
//!
//! Notional-based maker/taker rates, with `instrument::SymbolConfig`
//! carrying the per-symbol overrides.

use crate::instrument::SymbolConfig;
use rust_decimal::Decimal;

/// Stateless fee computation for one trade. Maker/taker rates are
/// resolved from the symbol's configuration (falling back to the
/// crate-wide defaults), applied to the trade's notional
/// (`price * quantity`), then rounded to the symbol's price scale.
pub struct FeeCalculator;

impl FeeCalculator {
    /// Computes `(maker_fee, taker_fee)` for a trade of `quantity` units
    /// at `price`, using `cfg`'s fee rates. Never fails: there is no
    /// invalid input this function can observe.
    pub fn fees(cfg: &SymbolConfig, price: Decimal, quantity: Decimal) -> (Decimal, Decimal) {
        let notional = price * quantity;
        let maker_fee = (notional * cfg.maker_rate).round_dp(cfg.price_scale);
        let taker_fee = (notional * cfg.taker_rate).round_dp(cfg.price_scale);
        (maker_fee, taker_fee)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn fee_identity_matches_spec_rates() {
        let cfg = SymbolConfig::with_defaults("BTC-USD");
        let (maker_fee, taker_fee) = FeeCalculator::fees(&cfg, dec!(100), dec!(3));
        // notional = 300; maker = 300 * 0.0001 = 0.03; taker = 300 * 0.0002 = 0.06
        assert_eq!(maker_fee, dec!(0.03));
        assert_eq!(taker_fee, dec!(0.06));
    }

    #[test]
    fn overridden_rates_are_respected() {
        let mut cfg = SymbolConfig::with_defaults("BTC-USD");
        cfg.maker_rate = dec!(0.0005);
        cfg.taker_rate = dec!(0.001);
        let (maker_fee, taker_fee) = FeeCalculator::fees(&cfg, dec!(200), dec!(2));
        assert_eq!(maker_fee, dec!(0.2));
        assert_eq!(taker_fee, dec!(0.4));
    }
}
