//! A market-maker bot: posts a resting buy a little below the book's
//! mid-price and a resting sell a little above it, refreshing its
//! quotes whenever the midpoint moves.
//!
//! Drives a WS-driven midpoint watch, a `tokio::time::interval`
//! quoting loop, and a cancel-then-repost cycle, using this crate's
//! `Decimal`/`OrderKind`/plain-`String`-symbol wire schema.

use crate::errors::MarketMakerError;
use crate::api::{OrderAck, WsFrame};
use futures_util::StreamExt;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tokio::{sync::watch, time};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as WsMsg};
use tokio_util::sync::CancellationToken;

/// How far from the midpoint to quote.
const SPREAD: Decimal = dec!(2);
/// How often (ms) to refresh quotes.
const PACE_MS: u64 = 500;

#[derive(Deserialize, Serialize)]
struct NewOrder {
    symbol: String,
    side: &'static str,
    kind: &'static str,
    quantity: Decimal,
    limit_price: Decimal,
}

/// Starts the market-maker loop against a REST+WS API at `api_base` for
/// `symbol`.
///
/// 1. Connects to `ws://{api_base}/ws/{symbol}` and watches depth
///    snapshots for the top bid/ask.
/// 2. Every `PACE_MS` ms, if the midpoint moved since the last quote:
///    cancels the previous bid/ask and posts fresh ones `SPREAD` either
///    side of the new mid.
pub async fn run_market_maker(
    api_base: &str,
    symbol: String,
    token: CancellationToken,
) -> Result<(), MarketMakerError> {
    let ws_url = format!(
        "ws://{host}/ws/{symbol}",
        host = api_base.trim_start_matches("http://"),
    );
    tracing::warn!("market maker: connecting to: {:?}", ws_url);
    let ws_stream = loop {
        match connect_async(&ws_url).await {
            Ok((stream, _)) => {
                tracing::info!("market maker: ws connected successfully");
                break stream;
            }
            Err(e) => {
                tracing::warn!("market maker: ws connect failed: {}; retrying...", e);
                tokio::time::sleep(std::time::Duration::from_millis(100)).await
            }
        }
    };

    let (_write, read) = ws_stream.split();

    let (mid_tx, mid_rx) = watch::channel(None::<Decimal>);

    let frames = read.filter_map(|msg| async move {
        match msg {
            Ok(WsMsg::Text(txt)) => match serde_json::from_str::<WsFrame>(&txt) {
                Ok(frame) => Some(frame),
                Err(e) => {
                    tracing::warn!("invalid WS frame: {e}");
                    None
                }
            },
            _ => None,
        }
    });
    tokio::spawn(async move {
        tokio::pin!(frames);
        while let Some(frame) = frames.next().await {
            if let WsFrame::Depth(depth) = frame {
                if let (Some((bb, _)), Some((aa, _))) = (depth.bids.first(), depth.asks.first()) {
                    let mid = (*bb + *aa) / dec!(2);
                    let _ = mid_tx.send(Some(mid));
                }
            }
        }
    });

    let client = reqwest::Client::new();
    let mut outstanding: Vec<uuid::Uuid> = Vec::new();
    let mut interval = time::interval(time::Duration::from_millis(PACE_MS));
    let mut last_mid: Option<Decimal> = None;

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                tracing::info!("market maker: shutdown requested, tearing down...");
                break;
            }
            _ = interval.tick() => {
                let mid_opt = *mid_rx.borrow();
                let Some(mid_price) = mid_opt else { continue };
                if Some(mid_price) == last_mid {
                    continue;
                }

                for id in outstanding.drain(..) {
                    let _ = client
                        .delete(format!("{}/orders/{}/{}", api_base, symbol, id))
                        .send()
                        .await;
                }

                let bid_price = (mid_price - SPREAD).max(dec!(0.01));
                tracing::info!(%bid_price, "placing bid");
                if let Ok(resp) = client
                    .post(format!("{}/orders", api_base))
                    .json(&NewOrder {
                        symbol: symbol.clone(),
                        side: "buy",
                        kind: "limit",
                        quantity: dec!(1),
                        limit_price: bid_price,
                    })
                    .send()
                    .await
                {
                    if let Ok(ack) = resp.json::<OrderAck>().await {
                        outstanding.push(ack.order_id);
                    }
                }

                let ask_price = mid_price + SPREAD;
                tracing::info!(%ask_price, "placing ask");
                if let Ok(resp) = client
                    .post(format!("{}/orders", api_base))
                    .json(&NewOrder {
                        symbol: symbol.clone(),
                        side: "sell",
                        kind: "limit",
                        quantity: dec!(1),
                        limit_price: ask_price,
                    })
                    .send()
                    .await
                {
                    if let Ok(ack) = resp.json::<OrderAck>().await {
                        outstanding.push(ack.order_id);
                    }
                }

                last_mid = Some(mid_price);
            }
        }
    }
    Ok(())
}
