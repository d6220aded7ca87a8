//! In-process simulated venue

use crate::data::Quote;
use crate::error::GatewayError;
use crate::exchange::{round_lots, ExecutionGateway, InstrumentSpec, OrderRequest, PositionSnapshot, Ticket};
use crate::portfolio::AccountSnapshot;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Gateway calls made so far, by kind
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CallCounter {
    pub open: usize,
    pub modify: usize,
    pub close: usize,
    pub query: usize,
}

impl CallCounter {
    /// Calls that change venue state
    pub fn mutating(&self) -> usize {
        self.open + self.modify + self.close
    }
}

/// A stop or target executed by [`PaperGateway::settle`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fill {
    pub ticket: Ticket,
    pub price: f64,
    pub volume: f64,
    pub profit: f64,
}

#[derive(Debug, Clone, Default)]
struct Faults {
    open: Option<GatewayError>,
    modify: Option<GatewayError>,
    close: Option<GatewayError>,
    lose_close_confirmation: bool,
}

/// Simulated venue.
///
/// Orders fill at the last quote set with [`PaperGateway::set_quote`]:
/// longs at the ask, shorts at the bid. Stops and targets only execute when
/// [`PaperGateway::settle`] is called, so the caller decides whether the
/// engine sees a price before the venue does.
#[derive(Debug, Clone)]
pub struct PaperGateway {
    balance: f64,
    next_ticket: Ticket,
    positions: BTreeMap<Ticket, PositionSnapshot>,
    instruments: HashMap<String, InstrumentSpec>,
    quotes: HashMap<String, Quote>,
    calls: CallCounter,
    faults: Faults,
    fills: Vec<Fill>,
}

impl PaperGateway {
    /// Venue with `balance` in cash and spot gold listed
    pub fn new(balance: f64) -> Self {
        let mut instruments = HashMap::new();
        let gold = InstrumentSpec::xauusd();
        instruments.insert(gold.symbol.clone(), gold);
        Self {
            balance,
            next_ticket: 1,
            positions: BTreeMap::new(),
            instruments,
            quotes: HashMap::new(),
            calls: CallCounter::default(),
            faults: Faults::default(),
            fills: Vec::new(),
        }
    }

    pub fn add_instrument(&mut self, spec: InstrumentSpec) {
        self.instruments.insert(spec.symbol.clone(), spec);
    }

    pub fn set_quote(&mut self, symbol: &str, quote: Quote) {
        self.quotes.insert(symbol.to_string(), quote);
    }

    pub fn calls(&self) -> CallCounter {
        self.calls
    }

    pub fn fills(&self) -> &[Fill] {
        &self.fills
    }

    pub fn positions(&self) -> impl Iterator<Item = &PositionSnapshot> {
        self.positions.values()
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn fail_next_open(&mut self, error: GatewayError) {
        self.faults.open = Some(error);
    }

    pub fn fail_next_modify(&mut self, error: GatewayError) {
        self.faults.modify = Some(error);
    }

    pub fn fail_next_close(&mut self, error: GatewayError) {
        self.faults.close = Some(error);
    }

    /// Execute the next close but answer with a timeout
    pub fn lose_next_close_confirmation(&mut self) {
        self.faults.lose_close_confirmation = true;
    }

    /// Execute stops and targets of `symbol` positions against the last quote
    pub fn settle(&mut self, symbol: &str) -> Vec<Fill> {
        let Some(quote) = self.quotes.get(symbol).copied() else {
            return Vec::new();
        };
        let triggered: Vec<(Ticket, f64)> = self
            .positions
            .values()
            .filter(|p| p.symbol == symbol)
            .filter_map(|p| {
                let price = quote.exit_price(p.direction);
                let stopped = p.stop_loss > 0.0 && p.direction.opposite().reached(price, p.stop_loss);
                let target = p.take_profit > 0.0 && p.direction.reached(price, p.take_profit);
                (stopped || target).then_some((p.ticket, price))
            })
            .collect();

        let mut fills = Vec::new();
        for (ticket, price) in triggered {
            if let Some(fill) = self.close_at(ticket, f64::INFINITY, price) {
                debug!(ticket, price, profit = fill.profit, "paper stop/target executed");
                fills.push(fill);
            }
        }
        fills
    }

    fn spec(&self, symbol: &str) -> Result<&InstrumentSpec, GatewayError> {
        self.instruments
            .get(symbol)
            .ok_or_else(|| GatewayError::InstrumentUnknown(symbol.to_string()))
    }

    fn quote(&self, symbol: &str) -> Result<Quote, GatewayError> {
        self.quotes
            .get(symbol)
            .copied()
            .ok_or_else(|| GatewayError::Rejected(format!("no price for {symbol}")))
    }

    fn floating(&self, position: &PositionSnapshot) -> f64 {
        let (Ok(spec), Some(quote)) = (self.spec(&position.symbol), self.quotes.get(&position.symbol)) else {
            return 0.0;
        };
        let price = quote.exit_price(position.direction);
        (price - position.open_price) * position.direction.sign() * position.volume * spec.value_per_point()
    }

    fn used_margin(&self) -> f64 {
        self.positions
            .values()
            .filter_map(|p| self.spec(&p.symbol).ok().map(|s| s.margin_required(p.volume)))
            .sum()
    }

    /// Close up to `volume` lots of `ticket` at `price` and book the profit
    fn close_at(&mut self, ticket: Ticket, volume: f64, price: f64) -> Option<Fill> {
        let position = self.positions.get(&ticket)?;
        let value_per_point = self.spec(&position.symbol).ok()?.value_per_point();
        let volume = volume.min(position.volume);
        let profit = (price - position.open_price) * position.direction.sign() * volume * value_per_point;
        let remaining = round_lots(position.volume - volume);

        if remaining <= 0.0 {
            self.positions.remove(&ticket);
        } else if let Some(position) = self.positions.get_mut(&ticket) {
            position.volume = remaining;
        }
        self.balance += profit;
        let fill = Fill {
            ticket,
            price,
            volume,
            profit,
        };
        self.fills.push(fill);
        Some(fill)
    }
}

impl ExecutionGateway for PaperGateway {
    fn open_market_order(&mut self, request: &OrderRequest) -> Result<Ticket, GatewayError> {
        self.calls.open += 1;
        if let Some(error) = self.faults.open.take() {
            return Err(error);
        }
        let spec = self.spec(&request.symbol)?.clone();
        let quote = self.quote(&request.symbol)?;

        let volume = spec.normalize_volume(request.volume);
        if volume <= 0.0 {
            return Err(GatewayError::Rejected(format!("invalid volume {}", request.volume)));
        }
        let account = self.account_snapshot();
        if spec.margin_required(volume) > account.free_margin {
            return Err(GatewayError::Rejected("not enough money".to_string()));
        }

        let ticket = self.next_ticket;
        self.next_ticket += 1;
        let open_price = quote.entry_price(request.direction);
        self.positions.insert(
            ticket,
            PositionSnapshot {
                ticket,
                symbol: request.symbol.clone(),
                direction: request.direction,
                volume,
                open_price,
                stop_loss: request.stop_loss,
                take_profit: request.take_profit,
                profit: 0.0,
                opened_at: quote.time,
            },
        );
        debug!(ticket, symbol = %request.symbol, volume, open_price, "paper order filled");
        Ok(ticket)
    }

    fn modify_stop_target(&mut self, ticket: Ticket, stop_loss: f64, take_profit: f64) -> Result<(), GatewayError> {
        self.calls.modify += 1;
        if let Some(error) = self.faults.modify.take() {
            return Err(error);
        }
        let position = self
            .positions
            .get_mut(&ticket)
            .ok_or_else(|| GatewayError::Rejected(format!("position {ticket} not found")))?;
        position.stop_loss = stop_loss;
        position.take_profit = take_profit;
        Ok(())
    }

    fn close_partial(&mut self, ticket: Ticket, volume: f64) -> Result<(), GatewayError> {
        self.calls.close += 1;
        if let Some(error) = self.faults.close.take() {
            return Err(error);
        }
        let position = self
            .positions
            .get(&ticket)
            .ok_or_else(|| GatewayError::Rejected(format!("position {ticket} not found")))?;
        if volume <= 0.0 {
            return Err(GatewayError::Rejected(format!("invalid volume {volume}")));
        }
        let price = self.quote(&position.symbol)?.exit_price(position.direction);
        self.close_at(ticket, volume, price);

        if std::mem::take(&mut self.faults.lose_close_confirmation) {
            return Err(GatewayError::Timeout);
        }
        Ok(())
    }

    fn query_position(&mut self, ticket: Ticket) -> Result<Option<PositionSnapshot>, GatewayError> {
        self.calls.query += 1;
        Ok(self.positions.get(&ticket).map(|p| PositionSnapshot {
            profit: self.floating(p),
            ..p.clone()
        }))
    }

    fn account(&mut self) -> Result<AccountSnapshot, GatewayError> {
        Ok(self.account_snapshot())
    }

    fn instrument(&mut self, symbol: &str) -> Result<InstrumentSpec, GatewayError> {
        self.spec(symbol).cloned()
    }
}

impl PaperGateway {
    fn account_snapshot(&self) -> AccountSnapshot {
        let floating: f64 = self.positions.values().map(|p| self.floating(p)).sum();
        let equity = self.balance + floating;
        let margin = self.used_margin();
        AccountSnapshot {
            balance: self.balance,
            equity,
            margin,
            free_margin: equity - margin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::Direction;
    use chrono::{TimeZone, Utc};

    fn quote(bid: f64) -> Quote {
        Quote::new(bid, bid + 0.5, Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap())
    }

    fn long_order(volume: f64) -> OrderRequest {
        OrderRequest {
            symbol: "XAUUSD".to_string(),
            direction: Direction::Long,
            volume,
            stop_loss: 1980.0,
            take_profit: 2020.0,
            comment: "test".to_string(),
        }
    }

    fn venue() -> PaperGateway {
        let mut venue = PaperGateway::new(10_000.0);
        venue.set_quote("XAUUSD", quote(1999.5));
        venue
    }

    #[test]
    fn test_open_fills_at_ask_and_holds_margin() {
        let mut venue = venue();
        let ticket = venue.open_market_order(&long_order(0.5)).unwrap();
        let position = venue.query_position(ticket).unwrap().unwrap();
        assert_eq!(position.open_price, 2000.0);
        assert_eq!(position.volume, 0.5);

        let account = venue.account().unwrap();
        assert_eq!(account.margin, 500.0);
        assert!((account.equity - (10_000.0 - 25.0)).abs() < 1e-6);
    }

    #[test]
    fn test_unknown_instrument_and_no_money() {
        let mut venue = venue();
        let mut order = long_order(0.5);
        order.symbol = "EURUSD".to_string();
        assert_eq!(
            venue.open_market_order(&order),
            Err(GatewayError::InstrumentUnknown("EURUSD".to_string()))
        );
        assert!(matches!(
            venue.open_market_order(&long_order(50.0)),
            Err(GatewayError::Rejected(_))
        ));
        assert_eq!(venue.calls().open, 2);
    }

    #[test]
    fn test_partial_close_books_profit() {
        let mut venue = venue();
        let ticket = venue.open_market_order(&long_order(0.5)).unwrap();
        venue.set_quote("XAUUSD", quote(2010.0));
        venue.close_partial(ticket, 0.2).unwrap();

        let position = venue.query_position(ticket).unwrap().unwrap();
        assert!((position.volume - 0.3).abs() < 1e-9);
        assert!((venue.balance() - 10_200.0).abs() < 1e-6);
    }

    #[test]
    fn test_lost_confirmation_still_executes() {
        let mut venue = venue();
        let ticket = venue.open_market_order(&long_order(0.5)).unwrap();
        venue.lose_next_close_confirmation();
        assert_eq!(venue.close_partial(ticket, 0.2), Err(GatewayError::Timeout));
        let position = venue.query_position(ticket).unwrap().unwrap();
        assert!((position.volume - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_settle_executes_stop() {
        let mut venue = venue();
        let ticket = venue.open_market_order(&long_order(0.5)).unwrap();
        assert!(venue.settle("XAUUSD").is_empty());

        venue.set_quote("XAUUSD", quote(1979.0));
        let fills = venue.settle("XAUUSD");
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].ticket, ticket);
        assert!(venue.query_position(ticket).unwrap().is_none());
        assert!((venue.balance() - (10_000.0 - 1050.0)).abs() < 1e-6);
    }

    #[test]
    fn test_injected_failure_is_one_shot() {
        let mut venue = venue();
        venue.fail_next_open(GatewayError::Disconnected("link down".to_string()));
        assert!(venue.open_market_order(&long_order(0.5)).is_err());
        assert!(venue.open_market_order(&long_order(0.5)).is_ok());
        assert_eq!(venue.calls().mutating(), 2);
    }
}
