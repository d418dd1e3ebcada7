//! `MatchingEngine` ties one symbol's `OrderBook` and `StopMonitor`
//! together: validates an inbound request, builds an `Order`, dispatches
//! it by kind, and folds any stop-order cascade the resulting trade
//! triggers back into the same response.
//!
//! One `MatchingEngine` is owned exclusively by one symbol's lane actor
//! (see `lane.rs`), which drives a single `OrderBook` directly plus the
//! stop book and the fee/id bookkeeping a bare book lacks. The
//! per-request dispatch shape (validate, match by kind, decide what
//! happens to any residual) mirrors a `match_order`/`match_buy`/
//! `match_sell` split over a `TimeInForce`-style enum, adapted here to
//! this crate's `OrderKind`.

use crate::errors::EngineError;
use crate::events::BookDelta;
use crate::instrument::SymbolConfig;
use crate::orderbook::OrderBook;
use crate::orders::{Order, OrderId, OrderKind, OrderStatus, Side};
use crate::stop_monitor::StopMonitor;
use crate::trade::Trade;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// What the book looked like before and after, so the lane can decide
/// whether a BBO event is due without recomputing the book twice.
#[derive(Debug, Clone)]
pub struct BboSnapshot {
    pub bid: Option<(Decimal, Decimal)>,
    pub ask: Option<(Decimal, Decimal)>,
}

/// Inbound order, as decoded off the wire by `api.rs` before any
/// engine-side validation has run.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub kind: OrderKind,
    pub limit_price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub quantity: Decimal,
}

/// Everything a `submit` call produced: the order's resulting state,
/// every trade it (and any cascade it set off) generated, and every
/// book-depth delta those trades and residual-resting caused.
#[derive(Debug, Clone)]
pub struct SubmitResult {
    pub order: Order,
    pub trades: Vec<Trade>,
    pub deltas: Vec<BookDelta>,
    pub bbo_before: BboSnapshot,
    pub bbo_after: BboSnapshot,
    /// Set when a stop cascade hit `max_cascade_depth`; the original
    /// order's own outcome above is unaffected, but some armed stops
    /// were left un-evaluated against the latest price.
    pub cascade_overflow: bool,
}

#[derive(Debug, Clone)]
pub struct CancelResult {
    pub order: Order,
    pub delta: Option<BookDelta>,
}

pub struct MatchingEngine {
    pub symbol: String,
    cfg: SymbolConfig,
    book: OrderBook,
    stops: StopMonitor,
    last_price: Option<Decimal>,
    trade_ids: Arc<AtomicU64>,
    timestamps: Arc<AtomicU64>,
}

impl MatchingEngine {
    pub fn new(
        cfg: SymbolConfig,
        max_cascade_depth: usize,
        trade_ids: Arc<AtomicU64>,
        timestamps: Arc<AtomicU64>,
    ) -> Self {
        let symbol = cfg.symbol.clone();
        Self {
            book: OrderBook::new(symbol.clone()),
            stops: StopMonitor::new(symbol.clone(), max_cascade_depth),
            symbol,
            cfg,
            last_price: None,
            trade_ids,
            timestamps,
        }
    }

    /// Convenience constructor for tests and the simulation tooling:
    /// fresh, unshared id counters.
    pub fn standalone(cfg: SymbolConfig, max_cascade_depth: usize) -> Self {
        Self::new(
            cfg,
            max_cascade_depth,
            Arc::new(AtomicU64::new(1)),
            Arc::new(AtomicU64::new(1)),
        )
    }

    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    pub fn last_price(&self) -> Option<Decimal> {
        self.last_price
    }

    fn bbo_snapshot(&self) -> BboSnapshot {
        BboSnapshot {
            bid: self.book.best_bid(),
            ask: self.book.best_ask(),
        }
    }

    fn next_order_id(&self) -> OrderId {
        OrderId::new_v4()
    }

    fn next_timestamp(&self) -> u64 {
        self.timestamps.fetch_add(1, Ordering::Relaxed)
    }

    fn validate(&self, req: &OrderRequest) -> Result<(), EngineError> {
        if req.symbol != self.symbol {
            return Err(EngineError::UnknownSymbol(req.symbol.clone()));
        }
        if req.quantity <= Decimal::ZERO {
            return Err(EngineError::InvalidRequest("quantity must be positive".into()));
        }
        if req.kind.requires_limit_price() && req.limit_price.is_none() {
            return Err(EngineError::InvalidRequest(format!(
                "{:?} requires a limit_price",
                req.kind
            )));
        }
        if req.kind.requires_stop_price() && req.stop_price.is_none() {
            return Err(EngineError::InvalidRequest(format!(
                "{:?} requires a stop_price",
                req.kind
            )));
        }
        if let Some(p) = req.limit_price {
            if !self.cfg.on_tick_grid(p) {
                return Err(EngineError::InvalidRequest(format!(
                    "limit_price {p} is not on the {} tick grid",
                    self.cfg.tick_size
                )));
            }
        }
        Ok(())
    }

    /// Accepts a new order: validates it, builds the `Order`, and
    /// dispatches by kind. Stop kinds are armed; the rest are matched
    /// immediately per their residual policy. Any trade produced feeds
    /// the stop-cascade loop before the result is returned.
    pub fn submit(&mut self, req: OrderRequest) -> Result<SubmitResult, EngineError> {
        self.validate(&req)?;

        let bbo_before = self.bbo_snapshot();
        let mut order = Order {
            order_id: self.next_order_id(),
            symbol: req.symbol,
            side: req.side,
            kind: req.kind,
            limit_price: req.limit_price,
            stop_price: req.stop_price,
            quantity_original: req.quantity,
            quantity_remaining: req.quantity,
            timestamp_accepted: self.next_timestamp(),
            status: OrderStatus::Accepted,
        };

        let mut trades = Vec::new();
        let mut deltas = Vec::new();

        if order.kind.is_stop() {
            order.status = OrderStatus::Armed;
            self.stops.arm(order.clone());
        } else {
            let (own_trades, own_deltas) = self.execute_immediate(&mut order);
            trades.extend(own_trades);
            deltas.extend(own_deltas);
        }

        let mut cascade_overflow = false;
        if let Some(price) = trades.last().map(|t: &Trade| t.price) {
            self.last_price = Some(price);
            let (cascade_trades, cascade_deltas, overflow) = self.run_cascade(price);
            trades.extend(cascade_trades);
            deltas.extend(cascade_deltas);
            cascade_overflow = overflow;
        }

        let bbo_after = self.bbo_snapshot();
        Ok(SubmitResult {
            order,
            trades,
            deltas,
            bbo_before,
            bbo_after,
            cascade_overflow,
        })
    }

    /// Runs the sweep-then-residual-policy for one of the four
    /// immediately-executed kinds (MARKET, LIMIT, IOC, FOK) or a
    /// just-triggered stop (already remapped to MARKET/LIMIT by
    /// `OrderKind::activation_kind`). Mutates `order.status` in place.
    fn execute_immediate(&mut self, order: &mut Order) -> (Vec<Trade>, Vec<BookDelta>) {
        if order.kind == OrderKind::Fok {
            let available = self
                .book
                .available_liquidity(order.side, order.limit_price);
            if available < order.quantity_remaining {
                order.status = OrderStatus::Rejected;
                return (Vec::new(), Vec::new());
            }
        }

        let (trades, deltas) = self
            .book
            .match_sweep(order, &self.cfg, &self.trade_ids);

        if order.quantity_remaining.is_zero() {
            order.status = OrderStatus::Filled;
            return (trades, deltas);
        }

        match order.kind {
            OrderKind::Limit => {
                let mut deltas = deltas;
                order.status = if trades.is_empty() {
                    OrderStatus::Accepted
                } else {
                    OrderStatus::Partial
                };
                deltas.push(self.book.add_resting(order.clone()));
                (trades, deltas)
            }
            // MARKET, IOC, and FOK (post pre-check, liquidity ran out
            // mid-sweep) never rest a residual.
            _ => {
                order.status = if trades.is_empty() {
                    OrderStatus::Rejected
                } else {
                    OrderStatus::Cancelled
                };
                (trades, deltas)
            }
        }
    }

    /// Drains and executes newly-triggered stop orders against
    /// `last_price`, repeating as each execution's own last trade may
    /// trigger further stops, until no more trigger or
    /// `max_cascade_depth` rounds have run. Always returns every trade
    /// and delta produced by rounds that did execute -- a cascade that
    /// hits the depth ceiling still surfaces its completed fills, it
    /// just stops activating further stops and leaves them `Armed`
    /// rather than silently dropping the work already committed to the
    /// book.
    fn run_cascade(&mut self, mut last_price: Decimal) -> (Vec<Trade>, Vec<BookDelta>, bool) {
        let mut all_trades = Vec::new();
        let mut all_deltas = Vec::new();
        let mut rounds = 0usize;

        loop {
            let triggered = self.stops.pop_triggered(last_price);
            if triggered.is_empty() {
                break;
            }
            if rounds >= self.stops.max_cascade_depth() {
                // Depth ceiling hit: put this round's stops back,
                // still armed, rather than executing or losing them.
                for order in triggered {
                    self.stops.arm(order);
                }
                return (all_trades, all_deltas, true);
            }
            rounds += 1;
            for mut order in triggered {
                order.kind = order.kind.activation_kind();
                let (trades, deltas) = self.execute_immediate(&mut order);
                if let Some(t) = trades.last() {
                    last_price = t.price;
                }
                all_trades.extend(trades);
                all_deltas.extend(deltas);
            }
        }

        (all_trades, all_deltas, false)
    }

    /// Captures every resting and armed order for warm-restart
    /// persistence. `timestamp_accepted` travels with each order, so
    /// FIFO priority survives the round trip.
    pub fn export_snapshot(&self) -> crate::snapshot::BookSnapshot {
        crate::snapshot::BookSnapshot {
            symbol: self.symbol.clone(),
            resting_orders: self.book.resting_orders(),
            armed_stops: self.stops.armed_orders(),
        }
    }

    /// Rehydrates a fresh engine from a snapshot taken earlier. Must
    /// only be called on a just-constructed engine with an empty book.
    pub fn restore_from_snapshot(&mut self, snapshot: crate::snapshot::BookSnapshot) {
        for order in snapshot.resting_orders {
            self.book.add_resting(order);
        }
        for order in snapshot.armed_stops {
            self.stops.arm(order);
        }
    }

    pub fn cancel(&mut self, order_id: OrderId) -> Result<CancelResult, EngineError> {
        if let Ok((mut order, delta)) = self.book.cancel(order_id) {
            order.status = OrderStatus::Cancelled;
            return Ok(CancelResult {
                order,
                delta: Some(delta),
            });
        }
        let mut order = self.stops.cancel(order_id)?;
        order.status = OrderStatus::Cancelled;
        Ok(CancelResult { order, delta: None })
    }
}
