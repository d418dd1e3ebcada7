use thiserror::Error;

/// Errors the matching core surfaces to its callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Bad field combination, non-positive quantity, unknown kind, or
    /// price off the tick grid.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    /// Cancel of an unknown order (or an order on the wrong symbol).
    #[error("order not found: {0}")]
    NotFound(String),

    /// FOK cannot be fully filled, or MARKET hit an empty opposite side.
    #[error("insufficient liquidity")]
    InsufficientLiquidity,

    /// Stop-activation cascade exceeded its configured depth ceiling;
    /// any remaining stops are left `Armed`.
    #[error("cascade depth exceeded (limit {0})")]
    CascadeOverflow(usize),

    /// Informational only: never returned from `submit`/`cancel`, only
    /// observed on the event-subscription side.
    #[error("subscriber lagged by {0} events")]
    SubscriberLagged(u64),
}

#[derive(Error, Debug)]
pub enum MarketMakerError {
    #[error("connection error: {0}")]
    ConnectError(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}
