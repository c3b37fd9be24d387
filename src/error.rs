// =============================================================================
// Error taxonomy for the Helios decision engine
// =============================================================================
//
// Strategies and data calls never propagate these past their bounded
// wrapper (see StrategyRunner, Engine::step). Only PersistenceError and
// BrokerFatal are allowed to escape to the engine and trigger shutdown.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("config error: {0}")]
    Config(String),

    #[error("market data unavailable for {symbol}")]
    DataUnavailable { symbol: String },

    #[error("strategy {strategy} timed out on {symbol}")]
    ExecutionTimeout { symbol: String, strategy: String },

    #[error("rejected: {reason}")]
    Rejection { reason: String },

    #[error("insufficient data for {symbol}")]
    InsufficientData { symbol: String },

    #[error("persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("broker fatal error: {0}")]
    BrokerFatal(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
