//! Venue capability consumed by the engine

use crate::error::GatewayError;
use crate::exchange::{InstrumentSpec, OrderRequest, PositionSnapshot, Ticket};
use crate::portfolio::AccountSnapshot;

/// Order placement and position maintenance at a venue.
///
/// Calls block until the venue answers or the implementation's own timeout
/// fires. A [`GatewayError::Timeout`] means the outcome is unknown: callers
/// reconcile through [`ExecutionGateway::query_position`] instead of
/// resending.
pub trait ExecutionGateway {
    fn open_market_order(&mut self, request: &OrderRequest) -> Result<Ticket, GatewayError>;

    fn modify_stop_target(
        &mut self,
        ticket: Ticket,
        stop_loss: f64,
        take_profit: f64,
    ) -> Result<(), GatewayError>;

    fn close_partial(&mut self, ticket: Ticket, volume: f64) -> Result<(), GatewayError>;

    /// `Ok(None)` once the position no longer exists
    fn query_position(&mut self, ticket: Ticket) -> Result<Option<PositionSnapshot>, GatewayError>;

    fn account(&mut self) -> Result<AccountSnapshot, GatewayError>;

    fn instrument(&mut self, symbol: &str) -> Result<InstrumentSpec, GatewayError>;
}

impl<G: ExecutionGateway + ?Sized> ExecutionGateway for &mut G {
    fn open_market_order(&mut self, request: &OrderRequest) -> Result<Ticket, GatewayError> {
        (**self).open_market_order(request)
    }

    fn modify_stop_target(
        &mut self,
        ticket: Ticket,
        stop_loss: f64,
        take_profit: f64,
    ) -> Result<(), GatewayError> {
        (**self).modify_stop_target(ticket, stop_loss, take_profit)
    }

    fn close_partial(&mut self, ticket: Ticket, volume: f64) -> Result<(), GatewayError> {
        (**self).close_partial(ticket, volume)
    }

    fn query_position(&mut self, ticket: Ticket) -> Result<Option<PositionSnapshot>, GatewayError> {
        (**self).query_position(ticket)
    }

    fn account(&mut self) -> Result<AccountSnapshot, GatewayError> {
        (**self).account()
    }

    fn instrument(&mut self, symbol: &str) -> Result<InstrumentSpec, GatewayError> {
        (**self).instrument(symbol)
    }
}
