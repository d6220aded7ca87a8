//! Market analysis
//!
//! Volatility regime, higher-timeframe context and lower-timeframe entry
//! confirmation.

pub mod context;
pub mod entry;
pub mod volatility;

pub use context::*;
pub use entry::*;
pub use volatility::*;
