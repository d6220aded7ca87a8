//! Confluence-RS: a multi-timeframe confluence decision engine
//!
//! This crate turns streaming OHLC bars into managed trades:
//! - [ta-rs](https://github.com/greyblake/ta-rs) for technical analysis
//! - `tracing` for structured decision logs
//!
//! # Features
//!
//! - **Market Context**: higher-timeframe trend and strength gating
//! - **Pattern Models**: liquidity sweeps, retracements, turning points, institutional zones
//! - **Entry Analysis**: lower-timeframe confirmation with ATR-based stops and tiered targets
//! - **Risk Sizing**: margin-aware lot sizing with a risk step-down ladder
//! - **Position Ledger**: idempotent partial-exit lifecycle with volatility-driven stops
//! - **Execution**: pluggable venue gateway, plus an in-process paper venue
//!
//! # Example
//!
//! ```no_run
//! use confluence_rs::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let config = EngineConfig::from_env()?;
//!     let feed = InMemoryFeed::new();
//!     let gateway = PaperGateway::new(10_000.0);
//!     let mut engine = TradingEngine::new(config, gateway, feed, EventLog::new())?;
//!     engine.on_tick(chrono::Utc::now());
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod exchange;
pub mod indicators;
pub mod patterns;
pub mod portfolio;
pub mod report;
pub mod strategy;

// Re-export commonly used types
pub mod prelude {
    pub use crate::analysis::*;
    pub use crate::config::*;
    pub use crate::data::*;
    pub use crate::engine::*;
    pub use crate::error::*;
    pub use crate::exchange::*;
    pub use crate::indicators::*;
    pub use crate::patterns::*;
    pub use crate::portfolio::*;
    pub use crate::report::*;
    pub use crate::strategy::*;

    pub use anyhow::{Context, Result};
}

/// Result type alias
pub type Result<T> = anyhow::Result<T>;
