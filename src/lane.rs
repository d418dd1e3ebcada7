//! Per-symbol actor: the lane owns one symbol's `MatchingEngine`
//! exclusively, so every mutating operation on that symbol is strictly
//! serialized through its mpsc inbox. `api.rs` never touches an
//! `OrderBook` directly -- it only ever goes through a `LaneHandle`.
//!
//! Uses the same `tokio::spawn`-plus-`CancellationToken` shutdown
//! pattern as the HTTP server, market maker, and simulator tasks in
//! `main.rs`, applied here as "one task per symbol" rather than "one
//! task per bot".

use crate::engine::{BboSnapshot, CancelResult, MatchingEngine, OrderRequest, SubmitResult};
use crate::errors::EngineError;
use crate::events::{BboEvent, EventBus};
use crate::instrument::SymbolConfig;
use crate::orders::OrderId;
use crate::store::Store;
use rust_decimal::Decimal;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::warn;

enum LaneCommand {
    Submit {
        req: OrderRequest,
        reply: oneshot::Sender<Result<SubmitResult, EngineError>>,
    },
    Cancel {
        order_id: OrderId,
        reply: oneshot::Sender<Result<CancelResult, EngineError>>,
    },
    Depth {
        levels: usize,
        reply: oneshot::Sender<(Vec<(Decimal, Decimal)>, Vec<(Decimal, Decimal)>)>,
    },
    Bbo {
        reply: oneshot::Sender<BboSnapshot>,
    },
    ExportSnapshot {
        reply: oneshot::Sender<crate::snapshot::BookSnapshot>,
    },
}

/// A cheaply-cloneable front for one symbol's lane actor.
#[derive(Clone)]
pub struct LaneHandle {
    symbol: String,
    tx: mpsc::Sender<LaneCommand>,
}

impl LaneHandle {
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub async fn submit(&self, req: OrderRequest) -> Result<SubmitResult, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(LaneCommand::Submit { req, reply })
            .await
            .map_err(|_| EngineError::InvalidRequest("lane is shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::InvalidRequest("lane dropped the reply".into()))?
    }

    pub async fn cancel(&self, order_id: OrderId) -> Result<CancelResult, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(LaneCommand::Cancel { order_id, reply })
            .await
            .map_err(|_| EngineError::InvalidRequest("lane is shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::InvalidRequest("lane dropped the reply".into()))?
    }

    pub async fn depth(&self, levels: usize) -> (Vec<(Decimal, Decimal)>, Vec<(Decimal, Decimal)>) {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(LaneCommand::Depth { levels, reply }).await.is_err() {
            return (Vec::new(), Vec::new());
        }
        rx.await.unwrap_or_default()
    }

    pub async fn bbo(&self) -> BboSnapshot {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(LaneCommand::Bbo { reply }).await.is_err() {
            return BboSnapshot { bid: None, ask: None };
        }
        rx.await.unwrap_or(BboSnapshot { bid: None, ask: None })
    }

    /// Exports this lane's resting orders and armed stops for warm-restart
    /// persistence. Returns `None` if the lane has already shut down.
    pub async fn export_snapshot(&self) -> Option<crate::snapshot::BookSnapshot> {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(LaneCommand::ExportSnapshot { reply }).await.is_err() {
            return None;
        }
        rx.await.ok()
    }
}

/// Spawns the actor task for one symbol and returns a handle to it.
/// `trade_ids`/`timestamps` are shared across every lane so ids stay
/// globally unique; `events` and `store` are likewise shared singletons.
pub fn spawn_lane(
    cfg: SymbolConfig,
    max_cascade_depth: usize,
    trade_ids: Arc<AtomicU64>,
    timestamps: Arc<AtomicU64>,
    events: EventBus,
    store: Arc<Mutex<Store>>,
    shutdown: CancellationToken,
    restore: Option<crate::snapshot::BookSnapshot>,
) -> LaneHandle {
    let symbol = cfg.symbol.clone();
    let (tx, mut rx) = mpsc::channel::<LaneCommand>(1024);

    tokio::spawn(async move {
        let mut engine = MatchingEngine::new(cfg, max_cascade_depth, trade_ids, timestamps);
        if let Some(snapshot) = restore {
            engine.restore_from_snapshot(snapshot);
        }

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                cmd = rx.recv() => {
                    let Some(cmd) = cmd else { break };
                    match cmd {
                        LaneCommand::Submit { req, reply } => {
                            let outcome = engine.submit(req);
                            if let Ok(result) = &outcome {
                                publish_outcome(&events, &store, &engine, result).await;
                            }
                            let _ = reply.send(outcome);
                        }
                        LaneCommand::Cancel { order_id, reply } => {
                            let outcome = engine.cancel(order_id);
                            if let Ok(result) = &outcome {
                                if let Some(delta) = result.delta.clone() {
                                    events.publish_depth(delta).await;
                                    maybe_publish_bbo(&events, &engine).await;
                                }
                            }
                            let _ = reply.send(outcome);
                        }
                        LaneCommand::Depth { levels, reply } => {
                            let _ = reply.send(engine.book().snapshot_depth(levels));
                        }
                        LaneCommand::Bbo { reply } => {
                            let _ = reply.send(BboSnapshot {
                                bid: engine.book().best_bid(),
                                ask: engine.book().best_ask(),
                            });
                        }
                        LaneCommand::ExportSnapshot { reply } => {
                            let _ = reply.send(engine.export_snapshot());
                        }
                    }
                }
            }
        }
    });

    LaneHandle { symbol, tx }
}

async fn publish_outcome(
    events: &EventBus,
    store: &Arc<Mutex<Store>>,
    engine: &MatchingEngine,
    result: &SubmitResult,
) {
    if !result.trades.is_empty() {
        let mut store = store.lock().await;
        for trade in &result.trades {
            if let Err(e) = store.insert_trade(trade) {
                warn!(error = %e, trade_id = trade.trade_id, "failed to persist trade");
            }
        }
    }
    for trade in &result.trades {
        events.publish_trade(trade.clone()).await;
    }
    for delta in &result.deltas {
        events.publish_depth(delta.clone()).await;
    }
    if result.bbo_before.bid != result.bbo_after.bid || result.bbo_before.ask != result.bbo_after.ask {
        events
            .publish_bbo(BboEvent {
                symbol: engine.symbol.clone(),
                bid: result.bbo_after.bid,
                ask: result.bbo_after.ask,
            })
            .await;
    }
}

async fn maybe_publish_bbo(events: &EventBus, engine: &MatchingEngine) {
    events
        .publish_bbo(BboEvent {
            symbol: engine.symbol.clone(),
            bid: engine.book().best_bid(),
            ask: engine.book().best_ask(),
        })
        .await;
}
