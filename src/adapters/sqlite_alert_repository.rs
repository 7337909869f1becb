//! SQLite alert repository backed by an r2d2 connection pool.
//!
//! Table and column names follow the bot that writes these records, so an
//! existing database can be pointed at directly. `initialize_schema` only
//! creates what is missing.

use crate::domain::alert::{
    Alert, AlertId, AlertKind, Bound, Holding, IndicatorAlert, IndicatorCondition, OwnerId, PercentAlert,
    PortfolioLimit, PriceAlert, PriceCondition, RiskAlert, Timeframe, VolumeAlert, WatchlistEntry,
};
use crate::domain::engine_config::SqliteConfig;
use crate::domain::error::EngineError;
use crate::ports::alert_repository::{AlertRepository, AlertSession};
use crate::ports::notification_port::RetentionPolicy;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, Row};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tracing::warn;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS alerts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    symbol TEXT NOT NULL,
    condition TEXT NOT NULL,
    target_price REAL NOT NULL,
    repeat INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS percent_alerts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    symbol TEXT NOT NULL,
    base_price REAL NOT NULL,
    threshold_percent REAL NOT NULL,
    repeat INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS volume_alerts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    symbol TEXT NOT NULL,
    multiplier REAL NOT NULL,
    timeframe TEXT NOT NULL DEFAULT '1h',
    repeat INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS risk_alerts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    symbol TEXT NOT NULL,
    stop_price REAL NOT NULL,
    take_price REAL NOT NULL,
    repeat INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS custom_alerts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    symbol TEXT NOT NULL,
    price_condition TEXT NOT NULL,
    price_value REAL NOT NULL,
    indicator TEXT NOT NULL DEFAULT 'rsi',
    rsi_condition TEXT,
    rsi_value REAL,
    timeframe TEXT NOT NULL DEFAULT '1h',
    repeat INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS portfolio (
    user_id INTEGER NOT NULL,
    symbol TEXT NOT NULL,
    quantity REAL NOT NULL,
    PRIMARY KEY (user_id, symbol)
);
CREATE TABLE IF NOT EXISTS portfolio_limits (
    user_id INTEGER PRIMARY KEY,
    loss_limit REAL,
    profit_target REAL,
    repeat_loss INTEGER NOT NULL DEFAULT 0,
    repeat_profit INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS watchlist (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    symbol TEXT NOT NULL,
    base_price REAL,
    threshold_percent REAL,
    timeframe TEXT NOT NULL DEFAULT '1h',
    UNIQUE (user_id, symbol)
);
CREATE TABLE IF NOT EXISTS users (
    user_id INTEGER PRIMARY KEY,
    autodelete INTEGER
);
CREATE INDEX IF NOT EXISTS idx_alerts_symbol ON alerts(symbol);
CREATE INDEX IF NOT EXISTS idx_custom_alerts_symbol ON custom_alerts(symbol);
CREATE INDEX IF NOT EXISTS idx_portfolio_user ON portfolio(user_id);
";

fn table(kind: AlertKind) -> &'static str {
    match kind {
        AlertKind::Price => "alerts",
        AlertKind::Percent => "percent_alerts",
        AlertKind::Volume => "volume_alerts",
        AlertKind::Risk => "risk_alerts",
        AlertKind::Indicator => "custom_alerts",
        AlertKind::PortfolioLimit => "portfolio_limits",
        AlertKind::Watchlist => "watchlist",
    }
}

fn symbols_query(kind: AlertKind) -> &'static str {
    match kind {
        AlertKind::Price => "SELECT DISTINCT symbol FROM alerts",
        AlertKind::Percent => "SELECT DISTINCT symbol FROM percent_alerts",
        AlertKind::Volume => "SELECT DISTINCT symbol FROM volume_alerts",
        AlertKind::Risk => "SELECT DISTINCT symbol FROM risk_alerts",
        AlertKind::Indicator => "SELECT DISTINCT symbol FROM custom_alerts",
        AlertKind::PortfolioLimit => {
            "SELECT DISTINCT p.symbol FROM portfolio p
             JOIN portfolio_limits l ON l.user_id = p.user_id
             WHERE l.loss_limit IS NOT NULL OR l.profit_target IS NOT NULL"
        }
        AlertKind::Watchlist => {
            "SELECT DISTINCT symbol FROM watchlist
             WHERE threshold_percent > 0 AND base_price IS NOT NULL"
        }
    }
}

pub struct SqliteAlertRepository {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteAlertRepository {
    pub fn from_config(config: &SqliteConfig) -> Result<Self, EngineError> {
        let manager = SqliteConnectionManager::file(&config.path);
        let pool = Pool::builder()
            .max_size(config.pool_size)
            .build(manager)
            .map_err(|e: r2d2::Error| EngineError::persistence(e))?;
        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, EngineError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e: r2d2::Error| EngineError::persistence(e))?;
        Ok(Self { pool })
    }

    pub fn initialize_schema(&self) -> Result<(), EngineError> {
        self.connection()?
            .execute_batch(SCHEMA)
            .map_err(|e: rusqlite::Error| EngineError::persistence(e))
    }

    fn connection(&self) -> Result<PooledConnection<SqliteConnectionManager>, EngineError> {
        self.pool.get().map_err(|e: r2d2::Error| EngineError::persistence(e))
    }
}

impl AlertRepository for SqliteAlertRepository {
    fn session(&self) -> Result<Box<dyn AlertSession + '_>, EngineError> {
        Ok(Box::new(SqliteSession {
            conn: self.connection()?,
        }))
    }
}

impl RetentionPolicy for SqliteAlertRepository {
    fn retention(&self, owner: OwnerId) -> Result<Option<Duration>, EngineError> {
        let minutes: Option<Option<i64>> = self
            .connection()?
            .query_row(
                "SELECT autodelete FROM users WHERE user_id = ?1",
                params![owner],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e: rusqlite::Error| EngineError::persistence(e))?;
        Ok(minutes
            .flatten()
            .filter(|m| *m > 0)
            .map(|m| Duration::from_secs((m as u64).saturating_mul(60))))
    }
}

/// One pooled connection, returned to the pool on drop.
struct SqliteSession {
    conn: PooledConnection<SqliteConnectionManager>,
}

/// A row that decoded but whose fields do not make a valid alert.
type Decoded = Result<Alert, (AlertId, String)>;

impl SqliteSession {
    fn query<F>(&self, sql: &str, decode: F) -> Result<Vec<Decoded>, EngineError>
    where
        F: Fn(&Row<'_>) -> rusqlite::Result<Decoded>,
    {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e: rusqlite::Error| EngineError::persistence(e))?;
        // A column that fails to convert condemns its row only; the id
        // column is an INTEGER PRIMARY KEY and always converts.
        let rows = stmt
            .query_map([], |row| match decode(row) {
                Ok(decoded) => Ok(decoded),
                Err(e) => Ok(Err((row.get(0)?, e.to_string()))),
            })
            .map_err(|e: rusqlite::Error| EngineError::persistence(e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e: rusqlite::Error| EngineError::persistence(e))
    }

    fn execute(&self, sql: &str, params: impl rusqlite::Params) -> Result<(), EngineError> {
        self.conn
            .execute(sql, params)
            .map(|_| ())
            .map_err(|e: rusqlite::Error| EngineError::persistence(e))
    }

    fn portfolio_limits(&self) -> Result<Vec<Decoded>, EngineError> {
        let mut holdings: HashMap<OwnerId, Vec<Holding>> = HashMap::new();
        {
            let mut stmt = self
                .conn
                .prepare("SELECT user_id, symbol, quantity FROM portfolio ORDER BY user_id, symbol")
                .map_err(|e: rusqlite::Error| EngineError::persistence(e))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, OwnerId>(0)?,
                        Holding {
                            symbol: row.get(1)?,
                            quantity: row.get(2)?,
                        },
                    ))
                })
                .map_err(|e: rusqlite::Error| EngineError::persistence(e))?;
            for row in rows {
                let (owner, holding) = row.map_err(|e: rusqlite::Error| EngineError::persistence(e))?;
                holdings.entry(owner).or_default().push(holding);
            }
        }

        self.query(
            "SELECT user_id, loss_limit, profit_target, repeat_loss, repeat_profit
             FROM portfolio_limits
             WHERE loss_limit IS NOT NULL OR profit_target IS NOT NULL
             ORDER BY user_id",
            |row| {
                let owner: OwnerId = row.get(0)?;
                Ok(Ok(Alert::PortfolioLimit(PortfolioLimit {
                    owner,
                    loss_limit: row.get(1)?,
                    profit_target: row.get(2)?,
                    repeat_loss: row.get::<_, i64>(3)? != 0,
                    repeat_profit: row.get::<_, i64>(4)? != 0,
                    holdings: holdings.get(&owner).cloned().unwrap_or_default(),
                })))
            },
        )
    }
}

fn decode_price(row: &Row<'_>) -> rusqlite::Result<Decoded> {
    let id: AlertId = row.get(0)?;
    let condition: String = row.get(3)?;
    Ok(match condition.parse::<PriceCondition>() {
        Ok(condition) => Ok(Alert::Price(PriceAlert {
            id,
            owner: row.get(1)?,
            symbol: row.get(2)?,
            condition,
            target: row.get(4)?,
            repeat: row.get::<_, i64>(5)? != 0,
        })),
        Err(reason) => Err((id, reason)),
    })
}

fn decode_percent(row: &Row<'_>) -> rusqlite::Result<Decoded> {
    Ok(Ok(Alert::Percent(PercentAlert {
        id: row.get(0)?,
        owner: row.get(1)?,
        symbol: row.get(2)?,
        base_price: row.get(3)?,
        threshold_pct: row.get(4)?,
        repeat: row.get::<_, i64>(5)? != 0,
    })))
}

fn decode_volume(row: &Row<'_>) -> rusqlite::Result<Decoded> {
    let id: AlertId = row.get(0)?;
    let timeframe: String = row.get(4)?;
    Ok(match timeframe.parse::<Timeframe>() {
        Ok(timeframe) => Ok(Alert::Volume(VolumeAlert {
            id,
            owner: row.get(1)?,
            symbol: row.get(2)?,
            multiplier: row.get(3)?,
            timeframe,
            repeat: row.get::<_, i64>(5)? != 0,
        })),
        Err(reason) => Err((id, reason)),
    })
}

fn decode_risk(row: &Row<'_>) -> rusqlite::Result<Decoded> {
    Ok(Ok(Alert::Risk(RiskAlert {
        id: row.get(0)?,
        owner: row.get(1)?,
        symbol: row.get(2)?,
        stop_price: row.get(3)?,
        take_price: row.get(4)?,
        repeat: row.get::<_, i64>(5)? != 0,
    })))
}

/// `rsi_condition` holds either a comparison operator (then `indicator` and
/// `rsi_value` complete it) or a bare legacy form such as `macd` or `ema>50`.
fn decode_indicator(row: &Row<'_>) -> rusqlite::Result<Decoded> {
    let id: AlertId = row.get(0)?;
    let price_condition: String = row.get(3)?;
    let indicator: String = row.get(5)?;
    let op: Option<String> = row.get(6)?;
    let value: Option<f64> = row.get(7)?;
    let timeframe: String = row.get(8)?;

    let condition = match op.as_deref().map(str::trim) {
        Some(op @ (">" | "<" | ">=" | "<=")) => IndicatorCondition::parse(&indicator, Some(op), value),
        Some(legacy) => IndicatorCondition::parse(legacy, None, None),
        None => IndicatorCondition::parse(&indicator, None, None),
    };
    let parsed = (|| -> Result<(PriceCondition, IndicatorCondition, Timeframe), String> {
        Ok((price_condition.parse()?, condition?, timeframe.parse()?))
    })();

    Ok(match parsed {
        Ok((price_condition, indicator, timeframe)) => Ok(Alert::Indicator(IndicatorAlert {
            id,
            owner: row.get(1)?,
            symbol: row.get(2)?,
            price_condition,
            price_value: row.get(4)?,
            indicator,
            timeframe,
            repeat: row.get::<_, i64>(9)? != 0,
        })),
        Err(reason) => Err((id, reason)),
    })
}

fn decode_watchlist(row: &Row<'_>) -> rusqlite::Result<Decoded> {
    let id: AlertId = row.get(0)?;
    let timeframe: String = row.get(5)?;
    Ok(match timeframe.parse::<Timeframe>() {
        Ok(timeframe) => Ok(Alert::Watchlist(WatchlistEntry {
            id,
            owner: row.get(1)?,
            symbol: row.get(2)?,
            base_price: row.get(3)?,
            threshold_pct: row.get(4)?,
            timeframe,
        })),
        Err(reason) => Err((id, reason)),
    })
}

impl AlertSession for SqliteSession {
    fn list(&self, kind: AlertKind) -> Result<Vec<Alert>, EngineError> {
        let decoded = match kind {
            AlertKind::Price => self.query(
                "SELECT id, user_id, symbol, condition, target_price, repeat FROM alerts ORDER BY id",
                decode_price,
            )?,
            AlertKind::Percent => self.query(
                "SELECT id, user_id, symbol, base_price, threshold_percent, repeat
                 FROM percent_alerts ORDER BY id",
                decode_percent,
            )?,
            AlertKind::Volume => self.query(
                "SELECT id, user_id, symbol, multiplier, timeframe, repeat FROM volume_alerts ORDER BY id",
                decode_volume,
            )?,
            AlertKind::Risk => self.query(
                "SELECT id, user_id, symbol, stop_price, take_price, repeat FROM risk_alerts ORDER BY id",
                decode_risk,
            )?,
            AlertKind::Indicator => self.query(
                "SELECT id, user_id, symbol, price_condition, price_value, indicator,
                        rsi_condition, rsi_value, timeframe, repeat
                 FROM custom_alerts ORDER BY id",
                decode_indicator,
            )?,
            AlertKind::PortfolioLimit => self.portfolio_limits()?,
            AlertKind::Watchlist => self.query(
                "SELECT id, user_id, symbol, base_price, threshold_percent, timeframe
                 FROM watchlist
                 WHERE threshold_percent > 0 AND base_price IS NOT NULL
                 ORDER BY id",
                decode_watchlist,
            )?,
        };

        let mut alerts = Vec::with_capacity(decoded.len());
        for row in decoded {
            match row {
                Ok(alert) => alerts.push(alert),
                Err((id, reason)) => {
                    warn!(kind = %kind, alert_id = id, reason = %reason, "undecodable alert row ignored");
                }
            }
        }
        Ok(alerts)
    }

    fn distinct_symbols(&self, kinds: &[AlertKind]) -> Result<BTreeSet<String>, EngineError> {
        let mut symbols = BTreeSet::new();
        for kind in kinds {
            let mut stmt = self
                .conn
                .prepare(symbols_query(*kind))
                .map_err(|e: rusqlite::Error| EngineError::persistence(e))?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(|e: rusqlite::Error| EngineError::persistence(e))?;
            for row in rows {
                symbols.insert(row.map_err(|e: rusqlite::Error| EngineError::persistence(e))?);
            }
        }
        Ok(symbols)
    }

    fn delete(&self, kind: AlertKind, id: AlertId) -> Result<(), EngineError> {
        let key = if kind == AlertKind::PortfolioLimit { "user_id" } else { "id" };
        self.execute(
            &format!("DELETE FROM {} WHERE {} = ?1", table(kind), key),
            params![id],
        )
    }

    fn reset_baseline(&self, kind: AlertKind, id: AlertId, new_base: f64) -> Result<(), EngineError> {
        match kind {
            AlertKind::Percent | AlertKind::Watchlist => self.execute(
                &format!("UPDATE {} SET base_price = ?1 WHERE id = ?2", table(kind)),
                params![new_base, id],
            ),
            other => Err(EngineError::persistence(format!("{} alerts have no baseline", other))),
        }
    }

    fn clear_bound(&self, owner: OwnerId, bound: Bound) -> Result<(), EngineError> {
        let sql = match bound {
            Bound::Loss => "UPDATE portfolio_limits SET loss_limit = NULL WHERE user_id = ?1",
            Bound::Profit => "UPDATE portfolio_limits SET profit_target = NULL WHERE user_id = ?1",
        };
        self.execute(sql, params![owner])
    }
}
