//! SQLite data adapter.

use crate::domain::error::FactorTraderError;
use crate::domain::price_series::PricePoint;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

fn pool_error(e: r2d2::Error) -> FactorTraderError {
    FactorTraderError::DataSource {
        reason: e.to_string(),
    }
}

fn query_error(e: rusqlite::Error) -> FactorTraderError {
    FactorTraderError::DataSource {
        reason: format!("query failed: {e}"),
    }
}

fn parse_stored_date(value: &str) -> Result<NaiveDate, FactorTraderError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|e| FactorTraderError::DataSource {
        reason: format!("invalid stored date '{value}': {e}"),
    })
}

impl SqliteAdapter {
    /// Opens the database named by `[data] path`.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, FactorTraderError> {
        let db_path = config
            .get_string("data", "path")
            .ok_or_else(|| FactorTraderError::ConfigMissing {
                section: "data".into(),
                key: "path".into(),
            })?;

        let pool_size = config.get_int("data", "pool_size", 4).max(1) as u32;
        Self::open(&db_path, pool_size)
    }

    pub fn open(db_path: &str, pool_size: u32) -> Result<Self, FactorTraderError> {
        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_error)?;

        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, FactorTraderError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(pool_error)?;

        Ok(Self { pool })
    }

    pub fn initialize_schema(&self) -> Result<(), FactorTraderError> {
        let conn = self.pool.get().map_err(pool_error)?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS prices (
                code TEXT NOT NULL,
                date TEXT NOT NULL,
                close REAL NOT NULL,
                dividend REAL NOT NULL DEFAULT 0,
                PRIMARY KEY (code, date)
            );
            CREATE INDEX IF NOT EXISTS idx_prices_date ON prices(date);",
        )
        .map_err(query_error)?;

        Ok(())
    }

    pub fn insert_prices(&self, code: &str, points: &[PricePoint]) -> Result<(), FactorTraderError> {
        let mut conn = self.pool.get().map_err(pool_error)?;
        let tx = conn.transaction().map_err(query_error)?;

        for point in points {
            tx.execute(
                "INSERT OR REPLACE INTO prices (code, date, close, dividend)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    code,
                    point.date.format("%Y-%m-%d").to_string(),
                    point.close,
                    point.dividend
                ],
            )
            .map_err(query_error)?;
        }

        tx.commit().map_err(query_error)?;
        Ok(())
    }
}

impl DataPort for SqliteAdapter {
    fn fetch_prices(
        &self,
        code: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PricePoint>, FactorTraderError> {
        let conn = self.pool.get().map_err(pool_error)?;

        let start_str = start_date.format("%Y-%m-%d").to_string();
        let end_str = end_date.format("%Y-%m-%d").to_string();

        let query = "SELECT date, close, dividend
                     FROM prices
                     WHERE code = ?1 AND date >= ?2 AND date <= ?3
                     ORDER BY date ASC";

        let mut stmt = conn.prepare(query).map_err(query_error)?;
        let rows = stmt
            .query_map(params![code, start_str, end_str], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, Option<f64>>(2)?,
                ))
            })
            .map_err(query_error)?;

        let mut points = Vec::new();
        for row in rows {
            let (date_str, close, dividend) = row.map_err(query_error)?;
            let date = parse_stored_date(&date_str)?;
            points.push(PricePoint::new(date, close).with_dividend(dividend.unwrap_or(0.0)));
        }

        Ok(points)
    }

    fn list_symbols(&self) -> Result<Vec<String>, FactorTraderError> {
        let conn = self.pool.get().map_err(pool_error)?;

        let mut stmt = conn
            .prepare("SELECT DISTINCT code FROM prices ORDER BY code")
            .map_err(query_error)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(query_error)?;

        let mut symbols = Vec::new();
        for row in rows {
            symbols.push(row.map_err(query_error)?);
        }

        Ok(symbols)
    }

    fn get_data_range(
        &self,
        code: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, FactorTraderError> {
        let conn = self.pool.get().map_err(pool_error)?;

        let result: (Option<String>, Option<String>, i64) = conn
            .query_row(
                "SELECT MIN(date), MAX(date), COUNT(*) FROM prices WHERE code = ?1",
                params![code],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(query_error)?;

        match result {
            (Some(min_str), Some(max_str), count) if count > 0 => Ok(Some((
                parse_stored_date(&min_str)?,
                parse_stored_date(&max_str)?,
                count as usize,
            ))),
            _ => Ok(None),
        }
    }
}
