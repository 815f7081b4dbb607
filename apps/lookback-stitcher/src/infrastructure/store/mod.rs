//! SQLite Record Store
//!
//! Durable buffer for recorded live events. One row per event identity,
//! book levels flattened into fixed `bids_{i}_{price|amount}` and
//! `asks_{i}_{price|amount}` columns. Timestamps are stored as integer
//! microseconds since the Unix epoch.
//!
//! The connection sits behind a mutex, so each insert and each range query
//! runs alone: a query sees every insert committed before it started.

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::{Type, Value};
use rusqlite::{Connection, OpenFlags, Row, params, params_from_iter};

use crate::application::ports::{RecordStore, StoreError};
use crate::domain::event::{
    BookLevels, BookSide, LevelField, MAX_BOOK_LEVELS, MarketEvent, PriceLevel, flat_slots,
};

// =============================================================================
// Storage Schema
// =============================================================================

const TABLE: &str = "market_events";

/// Identity and metadata columns, in storage order. Level columns follow.
const BASE_COLUMNS: [&str; 8] = [
    "dtype",
    "symbol",
    "exchange",
    "name",
    "depth",
    "interval_ms",
    "timestamp_us",
    "local_timestamp_us",
];

const PRAGMAS: &str = r"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA temp_store = MEMORY;
";

fn level_columns() -> impl Iterator<Item = String> {
    flat_slots().map(|slot| slot.key())
}

fn schema() -> String {
    let levels: String = level_columns()
        .map(|column| format!("    {column} REAL,\n"))
        .collect();

    format!(
        r"
CREATE TABLE IF NOT EXISTS {TABLE} (
    dtype TEXT NOT NULL,
    symbol TEXT NOT NULL,
    exchange TEXT NOT NULL,
    name TEXT NOT NULL,
    depth INTEGER,
    interval_ms INTEGER NOT NULL,
    timestamp_us INTEGER NOT NULL,
    local_timestamp_us INTEGER NOT NULL,
{levels}    PRIMARY KEY (dtype, symbol, exchange, name, timestamp_us)
);

CREATE INDEX IF NOT EXISTS idx_{TABLE}_timestamp ON {TABLE}(timestamp_us);
"
    )
}

fn all_columns() -> Vec<String> {
    BASE_COLUMNS
        .iter()
        .map(ToString::to_string)
        .chain(level_columns())
        .collect()
}

fn insert_sql() -> String {
    let columns = all_columns();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    format!(
        "INSERT OR IGNORE INTO {TABLE} ({}) VALUES ({})",
        columns.join(", "),
        placeholders.join(", ")
    )
}

fn select_sql() -> String {
    format!(
        "SELECT {} FROM {TABLE} WHERE timestamp_us >= ?1 ORDER BY timestamp_us, rowid",
        all_columns().join(", ")
    )
}

// =============================================================================
// Error Mapping
// =============================================================================

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::InvalidColumnType(..)
            | rusqlite::Error::IntegralValueOutOfRange(..) => Self::Corrupt(e.to_string()),
            other => Self::Unavailable(other.to_string()),
        }
    }
}

fn conversion_error(column: usize, ty: Type, reason: impl Into<String>) -> rusqlite::Error {
    let reason: String = reason.into();
    rusqlite::Error::FromSqlConversionFailure(column, ty, reason.into())
}

// =============================================================================
// SQLite Record Store
// =============================================================================

/// SQLite-backed [`RecordStore`].
pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
    insert_sql: String,
    select_sql: String,
}

impl SqliteRecordStore {
    /// Open or create a store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the file cannot be opened or the
    /// schema cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Unavailable(format!("{}: {e}", parent.display())))?;
            }
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)?;
        conn.execute_batch(PRAGMAS)?;

        let store = Self::with_connection(conn)?;
        tracing::info!(path = %path.display(), "Record store opened");
        Ok(store)
    }

    /// Open a private in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(&schema())?;
        Ok(Self {
            conn: Mutex::new(conn),
            insert_sql: insert_sql(),
            select_sql: select_sql(),
        })
    }

    /// Drop every recorded event.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be recreated.
    pub fn reset(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute_batch(&format!("DROP TABLE IF EXISTS {TABLE};"))?;
        conn.execute_batch(&schema())?;
        tracing::info!("Record store reset");
        Ok(())
    }

    /// Number of stored events.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn len(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock();
        let count: i64 =
            conn.query_row(&format!("SELECT COUNT(*) FROM {TABLE}"), params![], |row| row.get(0))?;
        usize::try_from(count).map_err(|e| StoreError::Corrupt(e.to_string()))
    }

    /// Whether the store holds no events.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

impl RecordStore for SqliteRecordStore {
    fn insert(&self, event: &MarketEvent) -> Result<bool, StoreError> {
        let values = event_values(event)?;
        let conn = self.conn.lock();
        let changed = conn
            .prepare_cached(&self.insert_sql)?
            .execute(params_from_iter(values))?;
        Ok(changed == 1)
    }

    fn query_range(&self, from: DateTime<Utc>) -> Result<Vec<MarketEvent>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&self.select_sql)?;
        let events = stmt
            .query_map(params![from.timestamp_micros()], row_to_event)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }
}

// =============================================================================
// Row Conversion
// =============================================================================

fn event_values(event: &MarketEvent) -> Result<Vec<Value>, StoreError> {
    let interval = i64::try_from(event.interval_ms)
        .map_err(|_| StoreError::Corrupt(format!("interval {} out of range", event.interval_ms)))?;

    let mut values = vec![
        Value::Text(event.data_type.clone()),
        Value::Text(event.symbol.clone()),
        Value::Text(event.exchange.clone()),
        Value::Text(event.name.clone()),
        event.depth.map_or(Value::Null, |d| Value::Integer(i64::from(d))),
        Value::Integer(interval),
        Value::Integer(event.timestamp.timestamp_micros()),
        Value::Integer(event.local_timestamp.timestamp_micros()),
    ];
    values.extend(
        event
            .flattened_levels()
            .into_iter()
            .map(|(_, value)| value.map_or(Value::Null, Value::Real)),
    );
    Ok(values)
}

fn timestamp_at(row: &Row<'_>, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    let micros: i64 = row.get(column)?;
    DateTime::from_timestamp_micros(micros).ok_or_else(|| {
        conversion_error(column, Type::Integer, format!("timestamp {micros} out of range"))
    })
}

fn levels_at(row: &Row<'_>, side: BookSide, first_column: usize) -> rusqlite::Result<BookLevels> {
    let mut levels = BookLevels::default();
    for index in 0..MAX_BOOK_LEVELS {
        let price_column = first_column + index * LevelField::ALL.len();
        let price: Option<f64> = row.get(price_column)?;
        let amount: Option<f64> = row.get(price_column + 1)?;

        let level = match (price, amount) {
            (Some(price), Some(amount)) => Some(PriceLevel::new(price, amount)),
            (None, None) => None,
            _ => {
                return Err(conversion_error(
                    price_column,
                    Type::Real,
                    format!("half-filled {} level {index}", side.as_str()),
                ));
            }
        };
        levels.set(index, level);
    }
    Ok(levels)
}

fn row_to_event(row: &Row<'_>) -> rusqlite::Result<MarketEvent> {
    let depth = row
        .get::<_, Option<i64>>(4)?
        .map(|d| u32::try_from(d).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(4, d)))
        .transpose()?;
    let interval: i64 = row.get(5)?;
    let interval_ms =
        u64::try_from(interval).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(5, interval))?;

    let per_side = MAX_BOOK_LEVELS * LevelField::ALL.len();
    let bids_start = BASE_COLUMNS.len();

    Ok(MarketEvent {
        data_type: row.get(0)?,
        symbol: row.get(1)?,
        exchange: row.get(2)?,
        name: row.get(3)?,
        interval_ms,
        depth,
        timestamp: timestamp_at(row, 6)?,
        local_timestamp: timestamp_at(row, 7)?,
        bids: levels_at(row, BookSide::Bids, bids_start)?,
        asks: levels_at(row, BookSide::Asks, bids_start + per_side)?,
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, TimeZone};

    use super::*;

    fn event(symbol: &str, minute: i64) -> MarketEvent {
        let ts = Utc.with_ymd_and_hms(2023, 5, 10, 12, 0, 0).unwrap() + TimeDelta::minutes(minute);
        let (bids, _) = BookLevels::from_levels([PriceLevel::new(27_500.5, 1200.0)]);
        let (asks, _) = BookLevels::from_levels([
            PriceLevel::new(27_501.0, 300.0),
            PriceLevel::new(27_501.5, 50.0),
        ]);
        MarketEvent {
            data_type: "book_snapshot".to_string(),
            symbol: symbol.to_string(),
            exchange: "deribit".to_string(),
            name: "quote_1m".to_string(),
            interval_ms: 60_000,
            depth: Some(1),
            timestamp: ts,
            local_timestamp: ts + TimeDelta::milliseconds(42),
            bids,
            asks,
        }
    }

    #[test]
    fn flattened_columns_follow_slot_order() {
        let columns = all_columns();
        assert_eq!(columns.len(), BASE_COLUMNS.len() + 2 * MAX_BOOK_LEVELS * 2);
        assert_eq!(columns[8], "bids_0_price");
        assert_eq!(columns[9], "bids_0_amount");
        assert_eq!(columns[18], "asks_0_price");
        assert_eq!(columns.last().map(String::as_str), Some("asks_4_amount"));
    }

    #[test]
    fn insert_is_idempotent() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        let e = event("BTC-PERPETUAL", 0);

        assert!(store.insert(&e).unwrap());
        assert!(!store.insert(&e).unwrap());
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn identity_includes_symbol() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        assert!(store.insert(&event("BTC-PERPETUAL", 0)).unwrap());
        assert!(store.insert(&event("ETH-PERPETUAL", 0)).unwrap());
        assert_eq!(store.len().unwrap(), 2);
    }

    #[test]
    fn query_range_is_inclusive_and_ordered() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        for minute in [3, 1, 2, 0] {
            store.insert(&event("BTC-PERPETUAL", minute)).unwrap();
        }

        let from = Utc.with_ymd_and_hms(2023, 5, 10, 12, 1, 0).unwrap();
        let events = store.query_range(from).unwrap();
        let timestamps: Vec<_> = events.iter().map(|e| e.timestamp).collect();
        assert_eq!(
            timestamps,
            [from, from + TimeDelta::minutes(1), from + TimeDelta::minutes(2)]
        );
    }

    #[test]
    fn round_trips_levels_and_metadata() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        let original = event("BTC-PERPETUAL", 5);
        store.insert(&original).unwrap();

        let stored = store.query_range(original.timestamp).unwrap();
        assert_eq!(stored, vec![original]);
    }

    #[test]
    fn reset_clears_events() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        store.insert(&event("BTC-PERPETUAL", 0)).unwrap();
        store.reset().unwrap();
        assert!(store.is_empty().unwrap());
        assert!(store.insert(&event("BTC-PERPETUAL", 0)).unwrap());
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("records.db");

        {
            let store = SqliteRecordStore::open(&path).unwrap();
            store.insert(&event("BTC-PERPETUAL", 0)).unwrap();
        }

        let store = SqliteRecordStore::open(&path).unwrap();
        assert_eq!(store.len().unwrap(), 1);
        assert!(!store.insert(&event("BTC-PERPETUAL", 0)).unwrap());
    }

    #[test]
    fn half_filled_level_is_corrupt() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        store.insert(&event("BTC-PERPETUAL", 0)).unwrap();
        store
            .conn
            .lock()
            .execute_batch(&format!("UPDATE {TABLE} SET bids_0_amount = NULL"))
            .unwrap();

        let err = store
            .query_range(Utc.with_ymd_and_hms(2023, 5, 10, 0, 0, 0).unwrap())
            .unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }
}
