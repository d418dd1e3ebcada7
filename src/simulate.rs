//! Noisy order-flow simulation harness, driven against the engine over
//! REST. An ambient integration-smoke tool (`Commands::Simulate` in
//! `main.rs`), not part of the matching core itself.

use rand::Rng;
use rand_distr::{Distribution, Exp, Exp1, Normal};
use reqwest::{Client, ClientBuilder};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use serde_json::json;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Clone)]
pub struct SimConfig {
    pub api_base: String,
    pub symbol: String,
    pub run_secs: Option<u64>,
    /// Poisson order-arrival rate (orders/sec), λ.
    pub attack_rate_hz: f64,
    /// Std-dev of the per-tick mid-price drift, N(0, σ).
    pub noise_sigma: f64,
    /// Average order size (unit-exponential draw scaled by this mean).
    pub mean_qty: f64,
}

#[derive(Deserialize)]
struct Ack {
    trades: Vec<AckTrade>,
}

#[derive(Deserialize)]
struct AckTrade {
    price: Decimal,
    quantity: Decimal,
}

/// Noisy limit-order simulation loop: alternates random-walk limit
/// quotes around a drifting mid-price, tracking inventory/P&L from the
/// trades each post generates.
pub async fn run_simulation(cfg: SimConfig, cancel_token: CancellationToken) -> anyhow::Result<()> {
    let client: Client = ClientBuilder::new().timeout(Duration::from_secs(5)).build()?;

    let ia = Exp::new(cfg.attack_rate_hz).expect("attack_rate_hz must be > 0");
    let drift = Normal::new(0.0, cfg.noise_sigma.max(f64::MIN_POSITIVE)).expect("noise_sigma >= 0");
    let size = Exp1;

    let mut inventory: Decimal = Decimal::ZERO;
    let mut pnl: Decimal = Decimal::ZERO;
    let mut mid: f64 = 50.0;
    let start = Instant::now();
    let spread = 1.0_f64;

    loop {
        if let Some(max_secs) = cfg.run_secs {
            if start.elapsed().as_secs() >= max_secs {
                break;
            }
        }

        let wait_secs: f64 = ia.sample(&mut rand::rng());
        tokio::select! {
            _ = cancel_token.cancelled() => {
                info!("received shutdown; exiting simulation loop");
                break;
            }
            _ = sleep(Duration::from_secs_f64(wait_secs)) => {}
        }

        let unit: f64 = size.sample(&mut rand::rng());
        let qty = (unit * cfg.mean_qty).max(1.0);
        let qty_dec = Decimal::from_f64(qty).unwrap_or(dec!(1)).round_dp(4);

        mid += drift.sample(&mut rand::rng());

        let (price, side) = if rand::rng().random_bool(0.5) {
            (mid - spread, "buy")
        } else {
            (mid + spread, "sell")
        };
        let price_dec = Decimal::from_f64(price.max(0.01)).unwrap_or(dec!(1)).round_dp(2);

        match client
            .post(format!("{}/orders", cfg.api_base))
            .json(&json!({
                "symbol": cfg.symbol,
                "side": side,
                "kind": "limit",
                "limit_price": price_dec.to_string(),
                "quantity": qty_dec.to_string(),
            }))
            .send()
            .await
        {
            Ok(resp) => {
                if let Err(e) = resp.error_for_status_ref() {
                    warn!(error = %e, "order post returned non-success");
                    continue;
                }
                match resp.json::<Ack>().await {
                    Ok(ack) => {
                        for t in ack.trades {
                            if side == "buy" {
                                inventory -= t.quantity;
                                pnl += t.price * t.quantity;
                            } else {
                                inventory += t.quantity;
                                pnl -= t.price * t.quantity;
                            }
                        }
                        info!(
                            elapsed = format_args!("{:.1}s", start.elapsed().as_secs_f64()),
                            side,
                            qty = %qty_dec,
                            price = %price_dec,
                            mid = format_args!("{:.2}", mid),
                            %inventory,
                            %pnl,
                            "sim tick"
                        );
                    }
                    Err(e) => warn!(error = %e, "failed to parse Ack JSON"),
                }
            }
            Err(e) => {
                warn!(error = %e, "HTTP request failed");
                continue;
            }
        }
    }

    info!(%inventory, %pnl, "simulation done");
    Ok(())
}
