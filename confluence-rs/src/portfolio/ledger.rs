//! Position ledger and the partial-exit lifecycle
//!
//! Every tick each active row is reconciled against the venue, then walked
//! through its TP1 / TP2 / TP3 transitions and the volatility stop. Each
//! sub-action has its own flag, so re-running a tick at an unchanged price
//! sends nothing. At most one close request goes out per position per tick.

use crate::analysis::VolatilityTracker;
use crate::config::LifecycleConfig;
use crate::data::MarketDataFeed;
use crate::error::{EngineError, GatewayError};
use crate::exchange::{round_lots, ExecutionGateway, InstrumentSpec, PositionSnapshot, Ticket};
use crate::portfolio::{PendingClose, PositionStage, TargetTier, TrackedPosition};
use crate::report::TradeEvent;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

const VOLUME_EPSILON: f64 = 1e-9;

/// Authoritative table of tracked positions, keyed by ticket
#[derive(Debug, Clone)]
pub struct PositionLedger {
    config: LifecycleConfig,
    volatility_multiplier: f64,
    positions: BTreeMap<Ticket, TrackedPosition>,
    instruments: HashMap<String, InstrumentSpec>,
}

impl PositionLedger {
    pub fn new(config: LifecycleConfig, volatility_multiplier: f64) -> Self {
        Self {
            config,
            volatility_multiplier,
            positions: BTreeMap::new(),
            instruments: HashMap::new(),
        }
    }

    pub fn register(&mut self, position: TrackedPosition) -> Result<(), EngineError> {
        if self.positions.contains_key(&position.ticket) {
            return Err(EngineError::DuplicateTicket(position.ticket));
        }
        info!(
            ticket = position.ticket,
            symbol = %position.symbol,
            direction = %position.direction,
            volume = position.volume,
            model = %position.model,
            "position registered"
        );
        self.positions.insert(position.ticket, position);
        Ok(())
    }

    pub fn get(&self, ticket: Ticket) -> Option<&TrackedPosition> {
        self.positions.get(&ticket)
    }

    pub fn positions(&self) -> impl Iterator<Item = &TrackedPosition> {
        self.positions.values()
    }

    /// Number of rows still open at the venue
    pub fn open_count(&self) -> usize {
        self.positions.values().filter(|p| p.active).count()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn unrealized_pnl(&self) -> f64 {
        self.positions
            .values()
            .filter(|p| p.active)
            .map(|p| p.unrealized_pnl)
            .sum()
    }

    /// Drop rows deactivated on an earlier tick
    fn evict(&mut self) {
        self.positions.retain(|ticket, p| {
            if !p.active {
                debug!(ticket, "position evicted");
            }
            p.active
        });
    }

    fn instrument<G: ExecutionGateway + ?Sized>(
        &mut self,
        gateway: &mut G,
        symbol: &str,
    ) -> Option<InstrumentSpec> {
        if let Some(spec) = self.instruments.get(symbol) {
            return Some(spec.clone());
        }
        match gateway.instrument(symbol) {
            Ok(spec) => {
                self.instruments.insert(symbol.to_string(), spec.clone());
                Some(spec)
            }
            Err(error) => {
                warn!(symbol, action = "instrument", %error, "instrument lookup failed");
                None
            }
        }
    }

    /// Run one lifecycle pass over every position
    pub fn tick<G: ExecutionGateway + ?Sized>(
        &mut self,
        gateway: &mut G,
        feed: &dyn MarketDataFeed,
        volatility: &VolatilityTracker,
        now: DateTime<Utc>,
    ) -> Vec<TradeEvent> {
        self.evict();
        let mut events = Vec::new();

        let tickets: Vec<(Ticket, String)> = self
            .positions
            .values()
            .map(|p| (p.ticket, p.symbol.clone()))
            .collect();

        for (ticket, symbol) in tickets {
            let Some(spec) = self.instrument(gateway, &symbol) else {
                continue;
            };
            let Some(position) = self.positions.get_mut(&ticket) else {
                continue;
            };
            let quote = feed.bid_ask(&symbol);
            if let Some(quote) = quote {
                position.last_price = quote.exit_price(position.direction);
            }

            let mut step = Lifecycle {
                config: &self.config,
                volatility_multiplier: self.volatility_multiplier,
                spec: &spec,
                volatility,
                gateway: &mut *gateway,
                now,
                events: &mut events,
            };

            match step.gateway.query_position(ticket) {
                Ok(Some(snapshot)) => step.reconcile(position, &snapshot),
                Ok(None) => {
                    step.close_out(position);
                    continue;
                }
                Err(error) => {
                    warn!(ticket, action = "query", %error, "position query failed");
                    continue;
                }
            }

            if quote.is_none() {
                debug!(ticket, symbol = %symbol, "no quote, lifecycle deferred");
                continue;
            }
            step.advance(position);
        }
        events
    }
}

/// One position's pass through the state machine
struct Lifecycle<'a, G: ?Sized> {
    config: &'a LifecycleConfig,
    volatility_multiplier: f64,
    spec: &'a InstrumentSpec,
    volatility: &'a VolatilityTracker,
    gateway: &'a mut G,
    now: DateTime<Utc>,
    events: &'a mut Vec<TradeEvent>,
}

impl<G: ExecutionGateway + ?Sized> Lifecycle<'_, G> {
    /// Align the row with the venue's volume
    fn reconcile(&mut self, position: &mut TrackedPosition, snapshot: &PositionSnapshot) {
        position.unrealized_pnl = snapshot.profit;
        let pending = position.pending_close.take();

        if snapshot.volume < position.remaining_volume - VOLUME_EPSILON {
            let closed = round_lots(position.remaining_volume - snapshot.volume);
            let price = pending.map_or(position.last_price, |p| p.price);
            position.realized_pnl += position.pnl_at(price, closed, self.spec.value_per_point());
            position.remaining_volume = snapshot.volume;

            match pending {
                Some(pending) => {
                    info!(
                        ticket = position.ticket,
                        tier = ?pending.tier,
                        closed,
                        "unconfirmed close reconciled from venue volume"
                    );
                    mark_closed(position, pending.tier);
                }
                None => debug!(ticket = position.ticket, closed, "volume reduced at venue"),
            }
        } else if let Some(pending) = pending {
            debug!(
                ticket = position.ticket,
                tier = ?pending.tier,
                "close did not execute, will resend"
            );
        }
    }

    /// Venue no longer holds the position
    fn close_out(&mut self, position: &mut TrackedPosition) {
        let direction = position.direction;
        let exit = if direction.opposite().reached(position.last_price, position.current_stop) {
            position.current_stop
        } else if direction.reached(position.last_price, position.current_tp) {
            position.current_tp
        } else {
            position.last_price
        };
        position.realized_pnl +=
            position.pnl_at(exit, position.remaining_volume, self.spec.value_per_point());
        self.deactivate(position, exit);
    }

    fn deactivate(&mut self, position: &mut TrackedPosition, exit_price: f64) {
        position.remaining_volume = 0.0;
        position.unrealized_pnl = 0.0;
        position.pending_close = None;
        position.active = false;
        position.closed_at = Some(self.now);
        info!(
            ticket = position.ticket,
            exit_price,
            realized_pnl = position.realized_pnl,
            "position closed"
        );
        self.events.push(TradeEvent::TradeClosed {
            ticket: position.ticket,
            exit_price,
            realized_pnl: position.realized_pnl,
        });
    }

    fn advance(&mut self, position: &mut TrackedPosition) {
        let price = position.last_price;
        let direction = position.direction;
        position.unrealized_pnl =
            position.pnl_at(price, position.remaining_volume, self.spec.value_per_point());
        let mut close_sent = false;

        // TP1: partial close, breakeven stop, target promoted to TP2
        if !position.tp1_hit && direction.reached(price, position.tp1) {
            position.tp1_hit = true;
            info!(ticket = position.ticket, price, "tp1 reached");
        }
        if position.tp1_hit {
            if !position.tp1_closed {
                let volume = self
                    .spec
                    .normalize_volume(position.remaining_volume * self.config.tp1_close_fraction);
                close_sent = self.partial(position, TargetTier::Tp1, volume);
            }
            if !position.breakeven_set {
                let breakeven = position.breakeven_stop(self.config.breakeven_buffer_r);
                let stop = if position.is_tighter_stop(breakeven, 0.0) {
                    breakeven
                } else {
                    position.current_stop
                };
                let target = position.tp2;
                if self.modify(position, stop, target, "breakeven") {
                    position.breakeven_set = true;
                }
            }
        }
        if !position.active {
            return;
        }

        // TP2: close half (or all without a third tier), stop to TP2, target TP3
        let tp1_done = position.tp1_closed && position.breakeven_set && !close_sent;
        if tp1_done && !position.tp2_hit && direction.reached(price, position.tp2) {
            position.tp2_hit = true;
            info!(ticket = position.ticket, price, "tp2 reached");
        }
        if position.tp2_hit {
            if !position.tp2_closed && !close_sent {
                let volume = if self.config.use_tp3 {
                    self.spec
                        .normalize_volume(position.remaining_volume * self.config.tp2_close_fraction)
                } else {
                    position.remaining_volume
                };
                close_sent = self.partial(position, TargetTier::Tp2, volume);
            }
            if position.active && self.config.use_tp3 && !position.tp2_modified {
                let stop = if self.config.move_sl_to_tp2 {
                    position.tp2
                } else {
                    position.current_stop
                };
                let target = position.tp3;
                if self.modify(position, stop, target, "tp2 stop") {
                    position.tp2_modified = true;
                    position.sl_moved_to_tp2 = self.config.move_sl_to_tp2;
                }
            }
        }
        if !position.active {
            return;
        }

        // TP3: close the rest
        let tp2_done =
            self.config.use_tp3 && position.tp2_closed && position.tp2_modified && !close_sent;
        if tp2_done && !position.tp3_hit && direction.reached(price, position.tp3) {
            position.tp3_hit = true;
            info!(ticket = position.ticket, price, "tp3 reached");
        }
        if position.tp3_hit && !close_sent {
            let volume = position.remaining_volume;
            self.partial(position, TargetTier::Tp3, volume);
        }
        if !position.active {
            return;
        }

        self.volatility_stop(position);
    }

    /// Tighten the stop to a volatility-widened distance from price
    fn volatility_stop(&mut self, position: &mut TrackedPosition) {
        let stage = position.stage();
        if !matches!(stage, PositionStage::Open | PositionStage::PartialTp1)
            || position.sl_moved_to_tp2
        {
            return;
        }
        if !self
            .volatility
            .is_high_volatility(&position.symbol, self.volatility_multiplier)
        {
            return;
        }

        let price = position.last_price;
        let direction = position.direction;
        let anchor = price - direction.sign() * position.risk_distance();
        let candidate = self
            .volatility
            .volatility_adjusted_stop(&position.symbol, anchor, price, direction);
        if direction.is_beyond(price, candidate)
            && position.is_tighter_stop(candidate, self.spec.tick_size)
        {
            let target = position.current_tp;
            self.modify(position, candidate, target, "volatility stop");
        }
    }

    /// Send a close for `tier`; returns whether a request went out
    fn partial(&mut self, position: &mut TrackedPosition, tier: TargetTier, volume: f64) -> bool {
        if volume <= 0.0 {
            debug!(ticket = position.ticket, ?tier, "close below minimum volume, skipped");
            mark_closed(position, tier);
            return false;
        }
        let volume = volume.min(position.remaining_volume);
        let price = position.last_price;

        match self.gateway.close_partial(position.ticket, volume) {
            Ok(()) => {
                position.realized_pnl += position.pnl_at(price, volume, self.spec.value_per_point());
                position.remaining_volume = round_lots(position.remaining_volume - volume);
                mark_closed(position, tier);
                info!(
                    ticket = position.ticket,
                    ?tier,
                    volume,
                    price,
                    remaining = position.remaining_volume,
                    "partial close"
                );
                if position.remaining_volume <= VOLUME_EPSILON {
                    self.deactivate(position, price);
                } else {
                    position.unrealized_pnl = position.pnl_at(
                        price,
                        position.remaining_volume,
                        self.spec.value_per_point(),
                    );
                }
            }
            Err(error) => {
                log_failure(position.ticket, "close", &error);
                position.pending_close = Some(PendingClose {
                    tier,
                    volume,
                    before: position.remaining_volume,
                    price,
                });
            }
        }
        true
    }

    fn modify(
        &mut self,
        position: &mut TrackedPosition,
        stop: f64,
        target: f64,
        action: &'static str,
    ) -> bool {
        match self.gateway.modify_stop_target(position.ticket, stop, target) {
            Ok(()) => {
                info!(
                    ticket = position.ticket,
                    action,
                    from = position.current_stop,
                    stop,
                    target,
                    "stop/target moved"
                );
                position.current_stop = stop;
                position.current_tp = target;
                true
            }
            Err(error) => {
                log_failure(position.ticket, action, &error);
                false
            }
        }
    }
}

fn mark_closed(position: &mut TrackedPosition, tier: TargetTier) {
    match tier {
        TargetTier::Tp1 => position.tp1_closed = true,
        TargetTier::Tp2 => position.tp2_closed = true,
        TargetTier::Tp3 => {}
    }
}

fn log_failure(ticket: Ticket, action: &str, error: &GatewayError) {
    match error {
        GatewayError::Timeout => warn!(ticket, action, %error, "venue did not confirm, will reconcile"),
        _ => warn!(ticket, action, %error, "venue request failed, retrying next tick"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{InMemoryFeed, Quote, Timeframe};
    use crate::exchange::{OrderRequest, PaperGateway};
    use crate::strategy::{Direction, EntrySignal};
    use crate::config::StrategyConfig;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 12, 0, 0).unwrap()
    }

    struct Harness {
        ledger: PositionLedger,
        venue: PaperGateway,
        feed: InMemoryFeed,
        volatility: VolatilityTracker,
        ticket: Ticket,
    }

    impl Harness {
        /// Long 0.5 lots at 2000 with stop 1980 and targets 2020/2040/2060
        fn long(config: LifecycleConfig) -> Self {
            Self::open(Direction::Long, config)
        }

        /// 0.5 lots at 2000 with a 20 point stop and 1R/2R/3R targets
        fn open(direction: Direction, config: LifecycleConfig) -> Self {
            let mut venue = PaperGateway::new(10_000.0);
            let mut feed = InMemoryFeed::new();
            let quote = Quote::new(1999.5, 2000.0, now());
            venue.set_quote("XAUUSD", quote);
            feed.set_quote("XAUUSD", quote);

            let signal = EntrySignal::from_risk_multiples(
                "XAUUSD",
                direction,
                2000.0,
                2000.0 - direction.sign() * 20.0,
                [1.0, 2.0, 3.0],
                now(),
                Timeframe::M15,
            )
            .unwrap();
            let ticket = venue
                .open_market_order(&OrderRequest {
                    symbol: "XAUUSD".to_string(),
                    direction,
                    volume: 0.5,
                    stop_loss: signal.stop_loss,
                    take_profit: signal.tp1,
                    comment: String::new(),
                })
                .unwrap();
            let mut ledger = PositionLedger::new(config, 1.5);
            ledger
                .register(TrackedPosition::from_signal(ticket, &signal, 0.5, now()))
                .unwrap();
            Self {
                ledger,
                venue,
                feed,
                volatility: VolatilityTracker::new(&StrategyConfig::default()),
                ticket,
            }
        }

        fn price(&mut self, bid: f64) {
            let quote = Quote::new(bid, bid + 0.5, now());
            self.venue.set_quote("XAUUSD", quote);
            self.feed.set_quote("XAUUSD", quote);
        }

        fn tick(&mut self) -> Vec<TradeEvent> {
            self.ledger.tick(&mut self.venue, &self.feed, &self.volatility, now())
        }

        fn position(&self) -> &TrackedPosition {
            self.ledger.get(self.ticket).unwrap()
        }
    }

    #[test]
    fn test_duplicate_ticket_rejected() {
        let mut harness = Harness::long(LifecycleConfig::default());
        let copy = harness.position().clone();
        assert!(matches!(
            harness.ledger.register(copy),
            Err(EngineError::DuplicateTicket(_))
        ));
    }

    #[test]
    fn test_tp1_applies_once() {
        let mut harness = Harness::long(LifecycleConfig::default());
        harness.price(2021.0);
        harness.tick();

        let calls = harness.venue.calls();
        assert_eq!(calls.close, 1);
        assert_eq!(calls.modify, 1);
        let position = harness.position();
        assert!(position.tp1_hit && position.tp1_closed && position.breakeven_set);
        assert!((position.remaining_volume - 0.34).abs() < 1e-9);
        assert!((position.current_stop - 2002.0).abs() < 1e-9);
        assert_eq!(position.current_tp, position.tp2);
        assert_eq!(position.stage(), PositionStage::PartialTp1);

        harness.tick();
        harness.tick();
        assert_eq!(harness.venue.calls().mutating(), calls.mutating());
    }

    #[test]
    fn test_full_ladder_closes_position() {
        let mut harness = Harness::long(LifecycleConfig::default());
        harness.price(2021.0);
        harness.tick();
        harness.price(2041.0);
        harness.tick();
        let position = harness.position();
        assert!(position.tp2_hit && position.sl_moved_to_tp2);
        assert!((position.remaining_volume - 0.17).abs() < 1e-9);
        assert_eq!(position.current_stop, position.tp2);

        harness.price(2061.0);
        let events = harness.tick();
        assert!(matches!(events[..], [TradeEvent::TradeClosed { .. }]));
        assert!(!harness.position().active);
        assert_eq!(harness.venue.positions().count(), 0);

        harness.tick();
        assert!(harness.ledger.is_empty());
    }

    #[test]
    fn test_short_ladder_mirrors_long() {
        let mut harness = Harness::open(Direction::Short, LifecycleConfig::default());
        assert_eq!(harness.position().tp3, 1940.0);

        // shorts exit at the ask, half a point above the bid
        harness.price(1979.0);
        harness.tick();
        let position = harness.position();
        assert!(position.tp1_closed && position.breakeven_set);
        assert!((position.remaining_volume - 0.34).abs() < 1e-9);
        assert!((position.current_stop - 1998.0).abs() < 1e-9);
        assert_eq!(position.current_tp, position.tp2);

        let calls = harness.venue.calls();
        harness.tick();
        assert_eq!(harness.venue.calls().mutating(), calls.mutating());

        harness.price(1959.0);
        harness.tick();
        let position = harness.position();
        assert!(position.tp2_closed && position.sl_moved_to_tp2);
        assert!((position.remaining_volume - 0.17).abs() < 1e-9);
        assert_eq!(position.current_stop, 1960.0);
        assert_eq!(position.current_tp, position.tp3);

        harness.price(1939.0);
        let events = harness.tick();
        assert!(matches!(events[..], [TradeEvent::TradeClosed { .. }]));
        let position = harness.position();
        assert!(position.tp3_hit && !position.active);
        assert_eq!(position.remaining_volume, 0.0);
        assert!(position.realized_pnl > 0.0);
        assert_eq!(harness.venue.calls().close, 3);
        assert_eq!(harness.venue.calls().modify, 2);
    }

    #[test]
    fn test_gap_through_two_targets_closes_one_tier_per_tick() {
        let mut harness = Harness::long(LifecycleConfig::default());
        harness.price(2045.0);
        harness.tick();
        assert_eq!(harness.venue.calls().close, 1);
        assert!(!harness.position().tp2_hit);

        harness.tick();
        assert_eq!(harness.venue.calls().close, 2);
        assert!(harness.position().tp2_closed);
    }

    #[test]
    fn test_failed_close_retries_next_tick() {
        let mut harness = Harness::long(LifecycleConfig::default());
        harness
            .venue
            .fail_next_close(GatewayError::Rejected("requote".to_string()));
        harness.price(2021.0);
        harness.tick();
        assert!(!harness.position().tp1_closed);
        assert!(harness.position().breakeven_set);

        harness.tick();
        assert!(harness.position().tp1_closed);
        assert_eq!(harness.venue.calls().close, 2);
        assert!((harness.position().remaining_volume - 0.34).abs() < 1e-9);
    }

    #[test]
    fn test_lost_confirmation_is_not_resent() {
        let mut harness = Harness::long(LifecycleConfig::default());
        harness.venue.lose_next_close_confirmation();
        harness.price(2021.0);
        harness.tick();
        assert!(harness.position().pending_close.is_some());

        harness.tick();
        let position = harness.position();
        assert!(position.tp1_closed);
        assert!(position.pending_close.is_none());
        assert!((position.remaining_volume - 0.34).abs() < 1e-9);
        assert_eq!(harness.venue.calls().close, 1);
    }

    #[test]
    fn test_venue_stop_out_is_reconciled() {
        let mut harness = Harness::long(LifecycleConfig::default());
        harness.price(1979.0);
        harness.venue.settle("XAUUSD");
        let events = harness.tick();

        match &events[..] {
            [TradeEvent::TradeClosed {
                exit_price,
                realized_pnl,
                ..
            }] => {
                assert_eq!(*exit_price, 1980.0);
                assert!((realized_pnl + 1000.0).abs() < 1e-6);
            }
            other => panic!("unexpected events {other:?}"),
        }
        assert_eq!(harness.ledger.open_count(), 0);
    }

    #[test]
    fn test_without_tp3_tp2_closes_everything() {
        let config = LifecycleConfig {
            use_tp3: false,
            ..LifecycleConfig::default()
        };
        let mut harness = Harness::long(config);
        harness.price(2021.0);
        harness.tick();
        harness.price(2041.0);
        let events = harness.tick();
        assert_eq!(events.len(), 1);
        assert!(!harness.position().active);
        assert!(!harness.position().tp3_hit);
    }

    #[test]
    fn test_volatility_stop_only_tightens() {
        let mut harness = Harness::long(LifecycleConfig::default());
        harness.volatility.set_snapshot(
            "XAUUSD",
            crate::analysis::VolatilitySnapshot {
                current: 16.0,
                baseline: 10.0,
                refreshed_at: now(),
            },
        );
        // widened distance is 32: from 2010 that is 1978, looser than 1980
        harness.price(2010.0);
        harness.tick();
        assert_eq!(harness.venue.calls().modify, 0);

        harness.price(2019.0);
        harness.tick();
        assert_eq!(harness.venue.calls().modify, 1);
        assert!((harness.position().current_stop - 1987.0).abs() < 1e-6);

        harness.tick();
        harness.price(2015.0);
        harness.tick();
        assert_eq!(harness.venue.calls().modify, 1);
    }
}
