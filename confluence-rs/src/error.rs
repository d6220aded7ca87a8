//! Typed errors for the engine and the execution venue

use crate::exchange::Ticket;
use thiserror::Error;

/// Engine-level failures.
///
/// Only [`EngineError::InvalidConfig`] is fatal; it is raised before any
/// component is constructed.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration rejected at startup
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A ledger row already exists for this ticket
    #[error("ticket {0} is already tracked")]
    DuplicateTicket(Ticket),

    /// Indicator could not be constructed (bad period)
    #[error("indicator error: {0}")]
    Indicator(String),

    /// Stop / take-profit prices violate the ordering invariant
    #[error("invalid signal levels: {0}")]
    InvalidLevels(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Failures reported by an [`ExecutionGateway`](crate::exchange::ExecutionGateway).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    /// Venue refused the request
    #[error("request rejected: {0}")]
    Rejected(String),

    /// No confirmation within the venue's deadline; the request may or may not have executed
    #[error("request timed out")]
    Timeout,

    #[error("venue disconnected: {0}")]
    Disconnected(String),

    #[error("unknown instrument {0}")]
    InstrumentUnknown(String),
}
