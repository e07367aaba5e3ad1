//! SQLite price-panel adapter.
//!
//! Reads a `prices` table in the same long format as the CSV panel. The
//! schema helpers exist so a panel can be imported once and reused across
//! runs.

use crate::domain::error::FactorlabError;
use crate::domain::ohlcv::OhlcvBar;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::path::Path;

fn db_error(e: impl std::fmt::Display) -> FactorlabError {
    FactorlabError::Database {
        reason: e.to_string(),
    }
}

fn date_param(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format("%Y-%m-%d").to_string())
}

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteAdapter {
    /// Opens (or creates) the database file with a pool of `pool_size` connections.
    pub fn open(db_path: &Path, pool_size: u32) -> Result<Self, FactorlabError> {
        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .build(manager)
            .map_err(db_error)?;
        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, FactorlabError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager).map_err(db_error)?;
        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, FactorlabError> {
        self.pool.get().map_err(db_error)
    }

    pub fn initialize_schema(&self) -> Result<(), FactorlabError> {
        self.conn()?
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS prices (
                    ticker TEXT NOT NULL,
                    date TEXT NOT NULL,
                    open REAL NOT NULL,
                    high REAL NOT NULL,
                    low REAL NOT NULL,
                    close REAL NOT NULL,
                    volume INTEGER NOT NULL,
                    PRIMARY KEY (ticker, date)
                );
                CREATE INDEX IF NOT EXISTS idx_prices_date ON prices(date);",
            )
            .map_err(db_error)
    }

    pub fn insert_bars(&self, bars: &[OhlcvBar]) -> Result<(), FactorlabError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(db_error)?;

        for bar in bars {
            tx.execute(
                "INSERT OR REPLACE INTO prices (ticker, date, open, high, low, close, volume)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    bar.code,
                    bar.date.format("%Y-%m-%d").to_string(),
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume
                ],
            )
            .map_err(db_error)?;
        }

        tx.commit().map_err(db_error)
    }
}

impl DataPort for SqliteAdapter {
    fn fetch_bars(
        &self,
        codes: Option<&[String]>,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<OhlcvBar>, FactorlabError> {
        let conn = self.conn()?;

        // NULL bounds disable the date filter
        let query = "SELECT ticker, date, open, high, low, close, volume
                     FROM prices
                     WHERE (?1 IS NULL OR date >= ?1) AND (?2 IS NULL OR date <= ?2)
                     ORDER BY ticker ASC, date ASC";

        let mut stmt = conn.prepare(query).map_err(db_error)?;
        let rows = stmt
            .query_map(params![date_param(start_date), date_param(end_date)], |row| {
                let date_str: String = row.get(1)?;
                let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        1,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?;
                Ok(OhlcvBar {
                    code: row.get(0)?,
                    date,
                    open: row.get(2)?,
                    high: row.get(3)?,
                    low: row.get(4)?,
                    close: row.get(5)?,
                    volume: row.get(6)?,
                })
            })
            .map_err(db_error)?;

        let mut bars = Vec::new();
        for row in rows {
            let bar = row.map_err(db_error)?;
            if codes.is_none_or(|c| c.contains(&bar.code)) {
                bars.push(bar);
            }
        }

        tracing::info!(bars = bars.len(), "loaded price panel from sqlite");
        Ok(bars)
    }

    fn list_symbols(&self) -> Result<Vec<String>, FactorlabError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT DISTINCT ticker FROM prices ORDER BY ticker")
            .map_err(db_error)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(db_error)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(db_error)
    }

    fn get_data_range(
        &self,
        code: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, FactorlabError> {
        let conn = self.conn()?;
        let (min, max, count): (Option<String>, Option<String>, i64) = conn
            .query_row(
                "SELECT MIN(date), MAX(date), COUNT(*) FROM prices WHERE ticker = ?1",
                params![code.to_uppercase()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(db_error)?;

        match (min, max) {
            (Some(min), Some(max)) if count > 0 => {
                let parse = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(db_error);
                Ok(Some((parse(&min)?, parse(&max)?, count as usize)))
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(code: &str, day: u32, close: f64) -> OhlcvBar {
        OhlcvBar {
            code: code.into(),
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1000,
        }
    }

    fn seeded() -> SqliteAdapter {
        let adapter = SqliteAdapter::in_memory().unwrap();
        adapter.initialize_schema().unwrap();
        adapter
            .insert_bars(&[
                bar("MSFT", 3, 30.0),
                bar("AAPL", 2, 10.0),
                bar("AAPL", 3, 11.0),
                bar("MSFT", 2, 29.0),
                bar("AAPL", 4, 12.0),
            ])
            .unwrap();
        adapter
    }

    #[test]
    fn open_file_database_persists() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("prices.db");
        {
            let adapter = SqliteAdapter::open(&path, 2).unwrap();
            adapter.initialize_schema().unwrap();
            adapter.insert_bars(&[bar("AAPL", 2, 10.0)]).unwrap();
        }
        let reopened = SqliteAdapter::open(&path, 0).unwrap();
        assert_eq!(reopened.list_symbols().unwrap(), vec!["AAPL"]);
    }

    #[test]
    fn fetch_bars_orders_by_ticker_then_date() {
        let adapter = seeded();
        let bars = adapter.fetch_bars(None, None, None).unwrap();
        let keys: Vec<(String, u32)> = bars
            .iter()
            .map(|b| (b.code.clone(), chrono::Datelike::day(&b.date)))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("AAPL".to_string(), 2),
                ("AAPL".to_string(), 3),
                ("AAPL".to_string(), 4),
                ("MSFT".to_string(), 2),
                ("MSFT".to_string(), 3),
            ]
        );
        assert_eq!(bars[0].high, 11.0);
    }

    #[test]
    fn fetch_bars_filters() {
        let adapter = seeded();
        let start = NaiveDate::from_ymd_opt(2024, 1, 3);
        let bars = adapter.fetch_bars(None, start, start).unwrap();
        assert_eq!(bars.len(), 2);

        let only = vec!["MSFT".to_string()];
        let bars = adapter.fetch_bars(Some(&only), None, None).unwrap();
        assert_eq!(bars.len(), 2);
        assert!(bars.iter().all(|b| b.code == "MSFT"));
    }

    #[test]
    fn list_symbols_and_range() {
        let adapter = seeded();
        assert_eq!(adapter.list_symbols().unwrap(), vec!["AAPL", "MSFT"]);
        assert_eq!(
            adapter.get_data_range("aapl").unwrap(),
            Some((
                NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 4).unwrap(),
                3
            ))
        );
        assert_eq!(adapter.get_data_range("XYZ").unwrap(), None);
    }
}
