// =============================================================================
// Repository — durable append-only event log over SQLite
// =============================================================================
//
// Follows this codebase's `rusqlite`-backed state store: schema created with
// `execute_batch` on open, writes wrapped in an explicit transaction. Fills,
// rejections, and regime changes are written immediately so they survive a
// crash; tick snapshots are batched and flushed only every `snapshot_every_k`
// ticks, trading a small replay window for write throughput.

use rusqlite::{params, Connection};

use crate::error::EngineResult;
use crate::types::{Side, Signal, Symbol};

pub struct Repository {
    conn: Connection,
    snapshot_every_k: u64,
    ticks_since_snapshot: u64,
}

impl Repository {
    pub fn open(path: &str, snapshot_every_k: u64) -> EngineResult<Self> {
        let conn = Connection::open(path)?;
        let repo = Self { conn, snapshot_every_k, ticks_since_snapshot: 0 };
        repo.init()?;
        Ok(repo)
    }

    fn init(&self) -> EngineResult<()> {
        self.conn.execute_batch(
            "BEGIN;
            CREATE TABLE IF NOT EXISTS decisions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tick INTEGER NOT NULL,
                symbol TEXT NOT NULL,
                signal TEXT NOT NULL,
                confidence REAL NOT NULL,
                action TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS fills (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tick INTEGER NOT NULL,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                quantity REAL NOT NULL,
                fill_price REAL NOT NULL,
                commission REAL NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS rejections (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tick INTEGER NOT NULL,
                symbol TEXT NOT NULL,
                reason TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS regime_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tick INTEGER NOT NULL,
                symbol TEXT NOT NULL,
                regime TEXT NOT NULL,
                trend_strength REAL NOT NULL,
                vol_ratio REAL NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tick INTEGER NOT NULL,
                equity REAL NOT NULL,
                cash REAL NOT NULL,
                open_positions INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS learning_state (
                symbol TEXT NOT NULL,
                strategy_id TEXT NOT NULL,
                weight REAL NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (symbol, strategy_id)
            );
            COMMIT;",
        )?;
        Ok(())
    }

    pub fn record_decision(&self, tick: u64, symbol: &Symbol, signal: Signal, confidence: f64, action: &str) -> EngineResult<()> {
        self.conn.execute(
            "INSERT INTO decisions (tick, symbol, signal, confidence, action, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![tick as i64, symbol.as_str(), signal.to_string(), confidence, action, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn record_fill(&self, tick: u64, symbol: &Symbol, side: Side, quantity: f64, fill_price: f64, commission: f64) -> EngineResult<()> {
        self.conn.execute(
            "INSERT INTO fills (tick, symbol, side, quantity, fill_price, commission, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![tick as i64, symbol.as_str(), side.to_string(), quantity, fill_price, commission, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn record_rejection(&self, tick: u64, symbol: &Symbol, reason: &str) -> EngineResult<()> {
        self.conn.execute(
            "INSERT INTO rejections (tick, symbol, reason, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![tick as i64, symbol.as_str(), reason, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn record_regime_change(&self, tick: u64, symbol: &Symbol, regime: &str, trend_strength: f64, vol_ratio: f64) -> EngineResult<()> {
        self.conn.execute(
            "INSERT INTO regime_history (tick, symbol, regime, trend_strength, vol_ratio, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![tick as i64, symbol.as_str(), regime, trend_strength, vol_ratio, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn record_weight(&self, symbol: &Symbol, strategy_id: &str, weight: f64) -> EngineResult<()> {
        self.conn.execute(
            "INSERT INTO learning_state (symbol, strategy_id, weight, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(symbol, strategy_id) DO UPDATE SET weight = excluded.weight, updated_at = excluded.updated_at",
            params![symbol.as_str(), strategy_id, weight, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Buffer a tick-end snapshot; flushed to disk once every
    /// `snapshot_every_k` ticks have accumulated.
    pub fn maybe_snapshot(&mut self, tick: u64, equity: f64, cash: f64, open_positions: u32) -> EngineResult<bool> {
        self.ticks_since_snapshot += 1;
        if self.ticks_since_snapshot < self.snapshot_every_k {
            return Ok(false);
        }
        self.ticks_since_snapshot = 0;
        self.conn.execute(
            "INSERT INTO snapshots (tick, equity, cash, open_positions, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![tick as i64, equity, cash, open_positions, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(true)
    }

    pub fn load_weights(&self) -> EngineResult<Vec<(Symbol, String, f64)>> {
        let mut stmt = self.conn.prepare("SELECT symbol, strategy_id, weight FROM learning_state")?;
        let rows = stmt.query_map([], |row| {
            let symbol: String = row.get(0)?;
            let strategy_id: String = row.get(1)?;
            let weight: f64 = row.get(2)?;
            Ok((Symbol::new(symbol), strategy_id, weight))
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}
