//! Data management module
//!
//! Bars, quotes and the feed abstraction the engine reads them through.

pub mod candle;
pub mod feed;
pub mod storage;
pub mod timeframe;

pub use candle::*;
pub use feed::*;
pub use storage::*;
pub use timeframe::*;
