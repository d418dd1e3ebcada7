//! Thin HTTP/WebSocket adapter around the matching core: deserializes a
//! request, calls the symbol's lane, serializes the response. No
//! matching logic lives here.
//!
//! The `LoggedJson` extractor, `TraceLayer` wiring, and `WsFrame`
//! tagged-enum shape are a thin routing layer over a `LaneHandle`;
//! no handler ever locks an `OrderBook` directly.

use serde::{
    Deserialize, Serialize,
    de::{self, DeserializeOwned},
};
use serde_json::json;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{error, info, warn};

use axum::{
    Json, Router,
    body::Bytes,
    extract::{
        FromRequest, Path, Query, Request, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    engine::OrderRequest,
    errors::EngineError,
    orders::{OrderId, OrderKind, OrderStatus, Side},
    state::AppState,
    trade::Trade,
};

type ApiErr = (StatusCode, Json<serde_json::Value>);
fn err(status: StatusCode, msg: impl Into<String>) -> ApiErr {
    (status, Json(json!({ "error": msg.into() })))
}

fn engine_err_status(e: &EngineError) -> StatusCode {
    match e {
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::UnknownSymbol(_) => StatusCode::BAD_REQUEST,
        EngineError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        EngineError::InsufficientLiquidity => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::CascadeOverflow(_) => StatusCode::CONFLICT,
        EngineError::SubscriberLagged(_) => StatusCode::OK,
    }
}

fn engine_err_response(e: EngineError) -> ApiErr {
    err(engine_err_status(&e), e.to_string())
}

pub struct LoggedJson<T>(pub T);

impl<S, T> FromRequest<S> for LoggedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiErr;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let method = req.method().clone();
        let uri = req.uri().clone();
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| err(StatusCode::BAD_REQUEST, e.to_string()))?;

        match serde_json::from_slice::<T>(&bytes) {
            Ok(val) => Ok(LoggedJson(val)),
            Err(e) => {
                let preview = String::from_utf8_lossy(&bytes);
                let preview = &preview[..preview.len().min(4096)];
                warn!(
                    error = %e,
                    %method,
                    uri = %uri,
                    body_preview = %preview,
                    "order rejected: JSON deserialization failed"
                );
                Err(err(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))
            }
        }
    }
}

fn default_limit() -> usize {
    100
}
#[derive(Deserialize)]
pub struct TradesQuery {
    #[serde(default = "default_limit")]
    limit: usize,
    after: Option<String>,
}

#[derive(Serialize)]
pub struct TradesPage {
    items: Vec<Trade>,
    next: Option<String>,
}

#[derive(Deserialize)]
pub struct DepthQuery {
    #[serde(default = "default_depth")]
    depth: usize,
}
fn default_depth() -> usize {
    20
}

/// Request body for `POST /orders`:
/// `{symbol, side, kind, quantity, limit_price?, stop_price?}`, all
/// numeric fields fixed-point decimal strings (via `rust_decimal`'s
/// `serde-str` feature).
#[derive(Deserialize)]
pub struct NewOrder {
    pub symbol: String,
    pub side: Side,
    pub kind: OrderKind,
    pub quantity: Decimal,
    pub limit_price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
}

fn log_rejected(payload: &NewOrder, reason: &str) {
    warn!(
        reason,
        side = ?payload.side,
        kind = ?payload.kind,
        symbol = %payload.symbol,
        quantity = %payload.quantity,
        "order rejected"
    );
}

/// A websocket message: either a depth snapshot, a single trade, or a
/// best-bid/offer update, internally tagged as
/// `{"type": "...", "data": {...}}`.
#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type", content = "data")]
pub enum WsFrame {
    Depth(DepthSnapshot),
    Trade(Trade),
    Bbo(BboWire),
}

#[derive(Serialize, Deserialize, Debug)]
pub struct DepthSnapshot {
    pub symbol: String,
    pub bids: Vec<(Decimal, Decimal)>,
    pub asks: Vec<(Decimal, Decimal)>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct BboWire {
    pub symbol: String,
    pub bid: Option<(Decimal, Decimal)>,
    pub ask: Option<(Decimal, Decimal)>,
}

/// Response for `POST /orders`:
/// `{accepted|rejected|armed, order_id, order_status, trades[], cascade_overflow}`.
#[derive(Serialize)]
pub struct OrderAck {
    pub status: &'static str,
    pub order_id: OrderId,
    pub order_status: OrderStatus,
    pub trades: Vec<Trade>,
    pub cascade_overflow: bool,
}

fn ack_status(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Rejected => "rejected",
        OrderStatus::Armed => "armed",
        _ => "accepted",
    }
}

async fn submit(state: &AppState, payload: NewOrder) -> Result<OrderAck, ApiErr> {
    if payload.quantity <= Decimal::ZERO {
        log_rejected(&payload, "quantity must be > 0");
        return Err(err(StatusCode::BAD_REQUEST, "quantity must be > 0"));
    }
    let Some(lane) = state.lane(&payload.symbol) else {
        log_rejected(&payload, "unsupported symbol");
        return Err(err(StatusCode::BAD_REQUEST, "unsupported symbol"));
    };

    let req = OrderRequest {
        symbol: payload.symbol,
        side: payload.side,
        kind: payload.kind,
        limit_price: payload.limit_price,
        stop_price: payload.stop_price,
        quantity: payload.quantity,
    };

    let result = lane.submit(req).await.map_err(engine_err_response)?;
    Ok(OrderAck {
        status: ack_status(result.order.status),
        order_id: result.order.order_id,
        order_status: result.order.status,
        trades: result.trades,
        cascade_overflow: result.cascade_overflow,
    })
}

/// `POST /orders` -- submits a new order of any kind. Stop kinds are
/// armed rather than matched; the response's `status` is `"armed"` in
/// that case.
pub async fn create_order(
    State(state): State<AppState>,
    LoggedJson(payload): LoggedJson<NewOrder>,
) -> Result<Json<OrderAck>, ApiErr> {
    submit(&state, payload).await.map(Json)
}

/// `DELETE /orders/{symbol}/{id}` -- cancels a resting order or an
/// armed stop.
pub async fn cancel_order(
    State(state): State<AppState>,
    Path((symbol, order_id)): Path<(String, Uuid)>,
) -> Result<impl IntoResponse, ApiErr> {
    let Some(lane) = state.lane(&symbol) else {
        return Err(err(StatusCode::BAD_REQUEST, "unsupported symbol"));
    };
    match lane.cancel(order_id).await {
        Ok(_) => {
            info!(%order_id, symbol, "order cancelled");
            Ok((StatusCode::OK, Json(json!({ "status": "ok" }))))
        }
        Err(e @ EngineError::NotFound(_)) => {
            warn!(%order_id, symbol, "cancel failed: not found");
            Err(engine_err_response(e))
        }
        Err(e) => Err(engine_err_response(e)),
    }
}

/// `GET /book/{symbol}?depth=n` -- top `n` (price, qty) levels per side.
pub async fn get_depth(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(q): Query<DepthQuery>,
) -> Result<Json<DepthSnapshot>, ApiErr> {
    let Some(lane) = state.lane(&symbol) else {
        return Err(err(StatusCode::BAD_REQUEST, "unsupported symbol"));
    };
    let (bids, asks) = lane.depth(q.depth).await;
    Ok(Json(DepthSnapshot { symbol, bids, asks }))
}

/// `GET /bbo/{symbol}` -- best bid/offer, either side possibly absent.
pub async fn get_bbo(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<BboWire>, ApiErr> {
    let Some(lane) = state.lane(&symbol) else {
        return Err(err(StatusCode::BAD_REQUEST, "unsupported symbol"));
    };
    let bbo = lane.bbo().await;
    Ok(Json(BboWire {
        symbol,
        bid: bbo.bid,
        ask: bbo.ask,
    }))
}

/// `GET /trades/{symbol}?limit=n&after=cursor` -- paginated recent
/// trade history, oldest-to-newest within the page.
pub async fn get_trade_log(
    Path(symbol): Path<String>,
    State(state): State<AppState>,
    Query(q): Query<TradesQuery>,
) -> Result<Json<TradesPage>, ApiErr> {
    if !state.registry.contains(&symbol) {
        return Err(err(StatusCode::BAD_REQUEST, "unsupported symbol"));
    }
    let limit = q.limit.min(1000);
    let (items, next) = {
        let store = state.store.lock().await;
        store
            .page_trade_asc(&symbol, q.after.as_deref(), limit)
            .map_err(|e| err(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
    };
    Ok(Json(TradesPage { items, next }))
}

/// `GET /ws/{symbol}` -- upgrades to a WebSocket that streams an
/// initial depth snapshot, then every subsequent trade/depth/bbo event
/// for that symbol.
pub async fn ws_handler(
    Path(symbol): Path<String>,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, symbol))
}

async fn send_frame(socket: &mut WebSocket, frame: &WsFrame) -> bool {
    let Ok(text) = serde_json::to_string(frame) else {
        return true;
    };
    if let Err(e) = socket.send(Message::Text(text.into())).await {
        error!("WebSocket send failed: {:?}", e);
        return false;
    }
    true
}

pub async fn handle_socket(mut socket: WebSocket, state: AppState, symbol: String) {
    let Some(lane) = state.lane(&symbol) else {
        let _ = socket.close().await;
        return;
    };

    let mut trade_rx = state.events.subscribe_trades(&symbol).await;
    let mut depth_rx = state.events.subscribe_depth(&symbol).await;
    let mut bbo_rx = state.events.subscribe_bbo(&symbol).await;

    let (bids, asks) = lane.depth(50).await;
    let initial = WsFrame::Depth(DepthSnapshot {
        symbol: symbol.clone(),
        bids,
        asks,
    });
    if !send_frame(&mut socket, &initial).await {
        return;
    }

    loop {
        tokio::select! {
            trade = trade_rx.recv() => {
                match trade {
                    Ok(trade) => {
                        if !send_frame(&mut socket, &WsFrame::Trade(trade)).await { break; }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!(symbol, lagged = n, "trade subscriber lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            delta = depth_rx.recv() => {
                match delta {
                    Ok(delta) => {
                        // A single delta is one price level; WS clients get a
                        // full top-of-book refresh so they never need to track
                        // per-level diffs themselves.
                        let (bids, asks) = lane.depth(50).await;
                        let frame = WsFrame::Depth(DepthSnapshot { symbol: delta.symbol, bids, asks });
                        if !send_frame(&mut socket, &frame).await { break; }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!(symbol, lagged = n, "depth subscriber lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            bbo = bbo_rx.recv() => {
                match bbo {
                    Ok(bbo) => {
                        let frame = WsFrame::Bbo(BboWire { symbol: bbo.symbol, bid: bbo.bid, ask: bbo.ask });
                        if !send_frame(&mut socket, &frame).await { break; }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!(symbol, lagged = n, "bbo subscriber lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
}

/// Constructs the application's `Router` with all routes and shared state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/{symbol}/{id}", delete(cancel_order))
        .route("/trades/{symbol}", get(get_trade_log))
        .route("/book/{symbol}", get(get_depth))
        .route("/bbo/{symbol}", get(get_bbo))
        .route("/ws/{symbol}", get(ws_handler))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(
                    DefaultMakeSpan::new()
                        .include_headers(false)
                        .level(tracing::Level::TRACE),
                )
                .on_response(DefaultOnResponse::new().level(tracing::Level::TRACE)),
        )
        .with_state(state)
}
