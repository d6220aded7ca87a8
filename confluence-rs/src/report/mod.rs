//! Trade event reporting
//!
//! The engine emits [`TradeEvent`]s to a [`ReportCollector`] and never waits
//! on it. Statistics and notifications are built on top by the host.

use crate::exchange::Ticket;
use crate::portfolio::RiskEvent;
use crate::strategy::EntrySignal;
use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TradeEvent {
    TradeOpened {
        signal: EntrySignal,
        ticket: Ticket,
        volume: f64,
    },
    TradeClosed {
        ticket: Ticket,
        exit_price: f64,
        realized_pnl: f64,
    },
    RiskSteppedDown {
        from: f64,
        to: f64,
    },
    CannotTrade {
        reason: String,
    },
}

impl From<RiskEvent> for TradeEvent {
    fn from(event: RiskEvent) -> Self {
        match event {
            RiskEvent::SteppedDown { from, to } => TradeEvent::RiskSteppedDown { from, to },
            RiskEvent::CannotTrade { reason } => TradeEvent::CannotTrade { reason },
        }
    }
}

impl fmt::Display for TradeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeEvent::TradeOpened {
                signal,
                ticket,
                volume,
            } => write!(
                f,
                "OPEN   #{ticket} {} {} {volume:.2} @ {:.2} sl {:.2} tp {:.2}/{:.2}/{:.2} [{}]",
                signal.direction,
                signal.symbol,
                signal.entry_price,
                signal.stop_loss,
                signal.tp1,
                signal.tp2,
                signal.tp3,
                signal.confirmations.join(",")
            ),
            TradeEvent::TradeClosed {
                ticket,
                exit_price,
                realized_pnl,
            } => write!(f, "CLOSE  #{ticket} @ {exit_price:.2} pnl {realized_pnl:.2}"),
            TradeEvent::RiskSteppedDown { from, to } => write!(f, "RISK   {from}% -> {to}%"),
            TradeEvent::CannotTrade { reason } => write!(f, "SKIP   {reason}"),
        }
    }
}

/// Receiver of trade events
pub trait ReportCollector {
    fn record(&mut self, event: TradeEvent);
}

impl<R: ReportCollector + ?Sized> ReportCollector for &mut R {
    fn record(&mut self, event: TradeEvent) {
        (**self).record(event)
    }
}

/// Keeps every event in memory
#[derive(Debug, Default, Clone)]
pub struct EventLog {
    events: Vec<TradeEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[TradeEvent] {
        &self.events
    }

    pub fn opened(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, TradeEvent::TradeOpened { .. }))
            .count()
    }

    pub fn closed(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, TradeEvent::TradeClosed { .. }))
            .count()
    }

    /// Sum of realized PnL over closed trades
    pub fn realized_pnl(&self) -> f64 {
        self.events
            .iter()
            .map(|e| match e {
                TradeEvent::TradeClosed { realized_pnl, .. } => *realized_pnl,
                _ => 0.0,
            })
            .sum()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Format the log as a plain-text report
    pub fn format(&self) -> String {
        let mut out = String::from("Trade Log\n=========\n");
        for event in &self.events {
            out.push_str(&event.to_string());
            out.push('\n');
        }
        out.push_str(&format!(
            "\nOpened: {}\nClosed: {}\nRealized PnL: ${:.2}\n",
            self.opened(),
            self.closed(),
            self.realized_pnl()
        ));
        out
    }
}

impl ReportCollector for EventLog {
    fn record(&mut self, event: TradeEvent) {
        self.events.push(event);
    }
}

/// Logs every event through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ReportCollector for TracingReporter {
    fn record(&mut self, event: TradeEvent) {
        match &event {
            TradeEvent::CannotTrade { .. } | TradeEvent::RiskSteppedDown { .. } => {
                warn!(event = %event, "risk event")
            }
            _ => info!(event = %event, "trade event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_log_totals() {
        let mut log = EventLog::new();
        log.record(TradeEvent::RiskSteppedDown { from: 10.0, to: 5.0 });
        log.record(TradeEvent::TradeClosed {
            ticket: 1,
            exit_price: 2010.0,
            realized_pnl: 150.0,
        });
        log.record(TradeEvent::TradeClosed {
            ticket: 2,
            exit_price: 1990.0,
            realized_pnl: -50.0,
        });

        assert_eq!(log.closed(), 2);
        assert_eq!(log.opened(), 0);
        assert_eq!(log.realized_pnl(), 100.0);
        let report = log.format();
        assert!(report.contains("RISK   10% -> 5%"));
        assert!(report.contains("Realized PnL: $100.00"));
    }

    #[test]
    fn test_risk_event_conversion() {
        let event: TradeEvent = RiskEvent::CannotTrade {
            reason: "margin".to_string(),
        }
        .into();
        assert_eq!(
            event,
            TradeEvent::CannotTrade {
                reason: "margin".to_string()
            }
        );
    }
}
