//! Execution venue integration
//!
//! The engine talks to a venue only through [`ExecutionGateway`].
//! [`PaperGateway`] is an in-process venue for tests and replays.

pub mod gateway;
pub mod order;
pub mod paper;

pub use gateway::*;
pub use order::*;
pub use paper::*;
