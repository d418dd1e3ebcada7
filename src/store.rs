use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use bincode::error::{DecodeError, EncodeError};
use parity_db::{BTreeIterator, ColId, Db, Options};
use serde_json::{self};
use std::path::Path;
use thiserror::Error;

use crate::trade::Trade;

// Versioned, opaque cursor encoded as URL-safe base64 JSON.
//
// Every trade carries a globally unique, monotonically-increasing
// `trade_id` (shared across symbols via the matching engine's atomic
// counter), so that alone is a sufficient tie-breaker -- no need to
// also sort on `(ts_nanos, maker_id, taker_id, price, quantity)`.
#[derive(serde::Serialize, serde::Deserialize)]
struct Cursor {
    v: u8, // cursor schema version; must be 1
    trade_id: u64,
}

/// Errors from the key/value store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("ParityDB error: {0}")]
    Parity(#[from] parity_db::Error),
    #[error("Serialization/Deserialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("UTF-8 conversion error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Bincode encode error: {0}")]
    BincodeEncode(#[from] EncodeError),

    #[error("Bincode decode error: {0}")]
    BincodeDecode(#[from] DecodeError),

    #[error("Invalid cursor")]
    BadCursor,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A simple ParityDB-backed store for trades.
///
/// Key layout (big-endian for lexicographic ordering):
/// `"{symbol}:" + trade_id(u64)`
///
/// `trade_id` is assigned by a single shared counter across every
/// symbol's lane, so keys sort chronologically within each `{symbol}:`
/// prefix without any further tie-breaking.
pub struct Store {
    db: Db,
}

impl Store {
    /// Open (or create) a ParityDB at `path`, with a single column and B-tree index.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let mut opts = Options::with_columns(path.as_ref(), 1);
        // enable B-tree index on column 0 for prefix scans
        opts.columns[0].btree_index = true;
        let db = Db::open_or_create(&opts)?;
        Ok(Store { db })
    }

    #[inline]
    fn prefix(symbol: &str) -> Vec<u8> {
        let mut k = Vec::with_capacity(symbol.len() + 1);
        k.extend_from_slice(symbol.as_bytes());
        k.push(b':');
        k
    }

    #[inline]
    fn encode_key(symbol: &str, trade_id: u64) -> Vec<u8> {
        let mut key = Self::prefix(symbol);
        key.extend_from_slice(&trade_id.to_be_bytes());
        key
    }

    #[inline]
    fn encode_cursor(trade_id: u64) -> String {
        B64.encode(serde_json::to_vec(&Cursor { v: 1, trade_id }).unwrap())
    }

    #[inline]
    fn decode_cursor(s: &str) -> StoreResult<Cursor> {
        let bytes = B64.decode(s).map_err(|_| StoreError::BadCursor)?;
        let c: Cursor = serde_json::from_slice(&bytes).map_err(|_| StoreError::BadCursor)?;
        if c.v != 1 {
            return Err(StoreError::BadCursor);
        }
        Ok(c)
    }

    /// Insert a trade into the store under the composite key described above.
    pub fn insert_trade(&mut self, trade: &Trade) -> StoreResult<()> {
        let config = bincode::config::standard();
        let col: ColId = 0;
        let key = Self::encode_key(&trade.symbol, trade.trade_id);
        let value = bincode::serde::encode_to_vec(trade, config)?;
        self.db.commit(vec![(col, key, Some(value))])?;
        Ok(())
    }

    /// Page forward (ascending time) for a symbol, starting *strictly after* `after`.
    ///
    /// Returns `(items, next_cursor)`. `next_cursor` is `Some(_)` only if there is at least
    /// one more item beyond the returned page (look-ahead pagination).
    pub fn page_trade_asc(
        &self,
        symbol: &str,
        after: Option<&str>,
        limit: usize,
    ) -> StoreResult<(Vec<Trade>, Option<String>)> {
        let col: ColId = 0;
        let mut it: BTreeIterator<'_> = self.db.iter(col)?;
        let prefix = Self::prefix(symbol);

        let after_decoded = match after {
            None => None,
            Some(s) => Some(Self::decode_cursor(s)?),
        };

        if let Some(ref c) = after_decoded {
            // Validate that the exact key exists for this symbol, then start strictly after it.
            let full = Self::encode_key(symbol, c.trade_id);
            it.seek(&full)?;
            match it.next()? {
                Some((k, _)) if k == full => {
                    // positioned just after 'after'
                }
                _ => return Err(StoreError::BadCursor),
            }
        } else {
            it.seek(&prefix)?;
        }

        // Look-ahead read: limit + 1 to know if there is another page.
        let mut items = Vec::with_capacity(limit.min(256));
        let mut last_cursor_for_page: Option<String> = None;
        let mut read = 0usize;

        while read < limit + 1 {
            match it.next()? {
                Some((k, v)) if k.starts_with(&prefix) => {
                    let (trade, _): (Trade, usize) =
                        bincode::serde::decode_from_slice(&v, bincode::config::standard())?;
                    if items.len() < limit {
                        last_cursor_for_page = Some(Self::encode_cursor(trade.trade_id));
                        items.push(trade);
                    }
                    read += 1;
                }
                _ => break,
            }
        }

        // Only expose a `next` cursor if there was at least one more record beyond this page.
        let next = if read > limit && !items.is_empty() {
            last_cursor_for_page
        } else {
            None
        };

        Ok((items, next))
    }

    /// Delete all trades for a given symbol (using the exact colonized prefix).
    pub fn delete_trades(&mut self, symbol: &str) -> StoreResult<()> {
        let col: ColId = 0;
        let mut iter = self.db.iter(col)?;
        let prefix = Self::prefix(symbol);
        iter.seek(&prefix)?;

        let mut batch = Vec::new();
        while let Some((key, _)) = iter.next()? {
            if !key.starts_with(&prefix) {
                break;
            }
            batch.push((col, key.to_vec(), None));
        }
        if !batch.is_empty() {
            self.db.commit(batch)?;
        }
        Ok(())
    }

    pub fn iter_trades(&self) -> Result<impl Iterator<Item = Trade>, StoreError> {
        let config = bincode::config::standard();
        let mut iter = self.db.iter(0).map_err(StoreError::Parity)?;

        iter.seek_to_first().map_err(StoreError::Parity)?;
        Ok(std::iter::from_fn(move || match iter.next() {
            Ok(Some((_key, raw))) => {
                let (decoded, _): (Trade, usize) =
                    bincode::serde::decode_from_slice(&raw[..], config).unwrap();
                Some(decoded)
            }
            _ => None,
        }))
    }
}
