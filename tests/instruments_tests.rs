use matching_core::instrument::{SymbolConfig, SymbolRegistry, DEFAULT_MAKER_RATE, DEFAULT_TAKER_RATE};
use rust_decimal_macros::dec;

#[test]
fn default_pairs_are_seeded_with_crate_default_rates() {
    let reg = SymbolRegistry::with_default_pairs();
    let btc = reg.get("BTC-USD").unwrap();
    assert_eq!(btc.maker_rate, DEFAULT_MAKER_RATE);
    assert_eq!(btc.taker_rate, DEFAULT_TAKER_RATE);
    assert!(reg.contains("ETH-USD"));
    assert!(!reg.contains("SOL-USD"));
}

#[test]
fn unknown_symbol_lookup_returns_none() {
    let reg = SymbolRegistry::with_default_pairs();
    assert!(reg.get("SOL-USD").is_none());
}

#[test]
fn on_tick_grid_respects_configured_tick_size() {
    let mut cfg = SymbolConfig::with_defaults("SOL-USD");
    cfg.tick_size = dec!(0.05);
    assert!(cfg.on_tick_grid(dec!(10.05)));
    assert!(cfg.on_tick_grid(dec!(10.10)));
    assert!(!cfg.on_tick_grid(dec!(10.07)));
}

#[test]
fn quantize_price_and_qty_round_to_configured_scale() {
    let mut cfg = SymbolConfig::with_defaults("SOL-USD");
    cfg.price_scale = 1;
    cfg.qty_scale = 2;
    assert_eq!(cfg.quantize_price(dec!(10.049)), dec!(10.0));
    assert_eq!(cfg.quantize_qty(dec!(1.239)), dec!(1.24));
}

#[test]
fn registry_new_is_empty_and_insert_populates_it() {
    let mut reg = SymbolRegistry::new();
    assert!(!reg.contains("BTC-USD"));
    reg.insert(SymbolConfig::with_defaults("BTC-USD"));
    assert!(reg.contains("BTC-USD"));
    assert_eq!(reg.symbols().count(), 1);
}

#[test]
fn load_from_json_can_add_a_brand_new_symbol() {
    let mut reg = SymbolRegistry::with_default_pairs();
    let raw = r#"[{"symbol":"SOL-USD","tick_size":"0.01","price_scale":2,"qty_scale":3,"maker_rate":"0.0001","taker_rate":"0.0002"}]"#;
    reg.load_from_json(raw).unwrap();
    assert!(reg.contains("SOL-USD"));
    assert_eq!(reg.symbols().count(), 3);
}

#[test]
fn load_from_json_rejects_malformed_payload() {
    let mut reg = SymbolRegistry::with_default_pairs();
    assert!(reg.load_from_json("not json").is_err());
}
