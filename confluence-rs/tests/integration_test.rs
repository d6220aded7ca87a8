//! Integration tests for confluence-rs

use chrono::{DateTime, Duration, TimeZone, Utc};
use confluence_rs::prelude::*;
use std::cell::Cell;
use std::rc::Rc;

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
}

/// Steadily trending bars on `timeframe`
fn trending(timeframe: Timeframe, count: usize, start: f64, step: f64) -> Vec<Candle> {
    (0..count)
        .map(|i| {
            let close = start + step * i as f64;
            let open = close - step * 0.5;
            Candle::new(
                open,
                open.max(close) + 1.0,
                open.min(close) - 1.0,
                close,
                100.0,
                base_time() - timeframe.duration() * (count - i) as i32,
                "XAUUSD".to_string(),
                timeframe,
            )
        })
        .collect()
}

/// Zig-zag uptrend on M15 ending in a bullish breakout bar
fn rising_m15(count: usize) -> Vec<Candle> {
    (0..count)
        .map(|i| {
            let drift = i as f64 * 0.5;
            let wiggle = if i % 4 == 2 { -1.5 } else { 0.0 };
            let close = 2000.0 + drift + wiggle;
            let open = close - 0.4;
            Candle::new(
                open,
                close + 0.3,
                open - 0.3,
                close,
                1.0,
                base_time() - Duration::minutes(15 * (count - i) as i64),
                "XAUUSD".to_string(),
                Timeframe::M15,
            )
        })
        .collect()
}

/// Detector that confirms every signal
struct AlwaysConfirm;

impl PatternDetector for AlwaysConfirm {
    fn name(&self) -> &'static str {
        "always"
    }

    fn rescan(&mut self, _feed: &dyn MarketDataFeed, _symbol: &str, _now: DateTime<Utc>) {}

    fn validate(&self, _signal: &EntrySignal) -> bool {
        true
    }

    fn candidate_count(&self) -> usize {
        1
    }
}

/// Detector with a limited number of uses, shared with the test body
struct Limited(Rc<Cell<usize>>);

impl PatternDetector for Limited {
    fn name(&self) -> &'static str {
        "limited"
    }

    fn rescan(&mut self, _feed: &dyn MarketDataFeed, _symbol: &str, _now: DateTime<Utc>) {}

    fn validate(&self, _signal: &EntrySignal) -> bool {
        self.0.get() > 0
    }

    fn commit(&mut self, _signal: &EntrySignal) {
        self.0.set(self.0.get().saturating_sub(1));
    }

    fn candidate_count(&self) -> usize {
        self.0.get()
    }
}

fn quote(bid: f64) -> Quote {
    Quote::new(bid, bid + 0.3, base_time())
}

fn engine_with(
    secondary_step: f64,
) -> TradingEngine<PaperGateway, InMemoryFeed, EventLog> {
    engine_confirmed_by(secondary_step, PaperGateway::new(10_000.0), Box::new(AlwaysConfirm))
}

fn engine_confirmed_by(
    secondary_step: f64,
    mut gateway: PaperGateway,
    detector: Box<dyn PatternDetector>,
) -> TradingEngine<PaperGateway, InMemoryFeed, EventLog> {
    let mut feed = InMemoryFeed::new();
    feed.add_candles(trending(Timeframe::H4, 260, 1500.0, 2.0));
    let secondary_start = if secondary_step > 0.0 { 1000.0 } else { 2600.0 };
    feed.add_candles(trending(Timeframe::D1, 260, secondary_start, secondary_step));
    feed.add_candles(rising_m15(80));
    feed.set_quote("XAUUSD", quote(2039.5));

    gateway.set_quote("XAUUSD", quote(2039.5));

    TradingEngine::new(EngineConfig::default(), gateway, feed, EventLog::new())
        .unwrap()
        .with_detector(detector)
}

fn set_price(engine: &mut TradingEngine<PaperGateway, InMemoryFeed, EventLog>, bid: f64) {
    engine.feed_mut().set_quote("XAUUSD", quote(bid));
    engine.gateway_mut().set_quote("XAUUSD", quote(bid));
}

#[test]
fn test_engine_opens_and_manages_a_trade() {
    let mut engine = engine_with(2.0);
    let summary = engine.on_tick(base_time());

    assert!(summary.context_refreshed);
    assert!(engine.context().unwrap().valid);
    let ticket = summary.opened.expect("trade opened");
    assert_eq!(engine.ledger().open_count(), 1);
    assert_eq!(engine.reporter().opened(), 1);

    let position = engine.ledger().get(ticket).unwrap().clone();
    assert_eq!(position.direction, Direction::Long);
    assert!((position.entry_price - 2039.8).abs() < 1e-9);
    assert_eq!(position.model, "always");
    assert!(position.tp1 < position.tp2 && position.tp2 < position.tp3);

    // same price, no new bar: nothing more is sent
    let summary = engine.on_tick(base_time());
    assert!(!summary.entry_evaluated);
    assert_eq!(engine.gateway().calls().mutating(), 1);

    set_price(&mut engine, position.tp1 + 0.5);
    engine.on_tick(base_time());
    let managed = engine.ledger().get(ticket).unwrap();
    assert!(managed.tp1_hit && managed.tp1_closed && managed.breakeven_set);
    assert!(managed.remaining_volume < position.volume);
    assert_eq!(engine.gateway().calls().close, 1);
    assert_eq!(engine.gateway().calls().modify, 1);
}

#[test]
fn test_disagreeing_context_blocks_entries() {
    let mut engine = engine_with(-2.0);
    let summary = engine.on_tick(base_time());

    let context = engine.context().unwrap();
    assert_eq!(context.trend, Trend::Undefined);
    assert!(!context.valid);
    assert!(summary.entry_evaluated);
    assert_eq!(summary.rejection, Some(RejectReason::InvalidContext));
    assert!(summary.opened.is_none());
    assert_eq!(engine.gateway().calls().open, 0);
}

#[test]
fn test_failed_open_leaves_no_row() {
    let mut engine = engine_with(2.0);
    engine
        .gateway_mut()
        .fail_next_open(GatewayError::Rejected("market closed".to_string()));
    let summary = engine.on_tick(base_time());

    assert!(summary.opened.is_none());
    assert!(engine.ledger().is_empty());
    assert_eq!(engine.reporter().opened(), 0);
}

#[test]
fn test_candidates_survive_trades_that_never_open() {
    // venue refuses the order
    let uses = Rc::new(Cell::new(1));
    let mut gateway = PaperGateway::new(10_000.0);
    gateway.fail_next_open(GatewayError::Disconnected("link down".to_string()));
    let mut engine = engine_confirmed_by(2.0, gateway, Box::new(Limited(uses.clone())));
    let summary = engine.on_tick(base_time());
    assert!(summary.opened.is_none());
    assert_eq!(engine.gateway().calls().open, 1);
    assert_eq!(uses.get(), 1);

    // margin leaves no size at any rung
    let uses = Rc::new(Cell::new(1));
    let mut gateway = PaperGateway::new(10_000.0);
    gateway.add_instrument(InstrumentSpec {
        margin_per_lot: 200_000.0,
        ..InstrumentSpec::xauusd()
    });
    let mut engine = engine_confirmed_by(2.0, gateway, Box::new(Limited(uses.clone())));
    let summary = engine.on_tick(base_time());
    assert!(summary.opened.is_none());
    assert_eq!(engine.gateway().calls().open, 0);
    assert_eq!(uses.get(), 1);

    // an opened trade uses the candidate up
    let uses = Rc::new(Cell::new(1));
    let mut engine = engine_confirmed_by(
        2.0,
        PaperGateway::new(10_000.0),
        Box::new(Limited(uses.clone())),
    );
    let summary = engine.on_tick(base_time());
    let ticket = summary.opened.expect("trade opened");
    assert_eq!(engine.ledger().get(ticket).unwrap().model, "limited");
    assert_eq!(uses.get(), 0);
}

#[test]
fn test_scenario_risk_sizing() {
    let mut sizer = RiskSizer::new(RiskConfig::default());
    let account = AccountSnapshot::new(10_000.0);
    let result = sizer.calculate_lot_size(2000.0, 1980.0, &account, &InstrumentSpec::xauusd());
    assert_eq!(result.volume, 0.5);

    let heavy = InstrumentSpec {
        margin_per_lot: 200_000.0,
        ..InstrumentSpec::xauusd()
    };
    let result = sizer.calculate_lot_size(2000.0, 1980.0, &account, &heavy);
    assert_eq!(result.volume, 0.0);
    let steps: Vec<(f64, f64)> = result
        .events
        .iter()
        .filter_map(|e| match e {
            RiskEvent::SteppedDown { from, to } => Some((*from, *to)),
            _ => None,
        })
        .collect();
    assert_eq!(steps, vec![(10.0, 5.0), (5.0, 2.0), (2.0, 1.0)]);
    assert!(matches!(result.events.last(), Some(RiskEvent::CannotTrade { .. })));
}

#[test]
fn test_sizer_never_returns_below_minimum() {
    let spec = InstrumentSpec::xauusd();
    for balance in (1..400).map(|b| b as f64 * 2.5) {
        let mut sizer = RiskSizer::new(RiskConfig::default());
        let result = sizer.calculate_lot_size(2000.0, 1990.0, &AccountSnapshot::new(balance), &spec);
        assert!(result.volume == 0.0 || result.volume >= spec.volume_min);
    }
}

/// Ledger with one 0.5 lot long at 2000, stop 1980
fn ledger_setup() -> (PositionLedger, PaperGateway, InMemoryFeed, Ticket) {
    let mut venue = PaperGateway::new(10_000.0);
    let mut feed = InMemoryFeed::new();
    let open_quote = Quote::new(1999.5, 2000.0, base_time());
    venue.set_quote("XAUUSD", open_quote);
    feed.set_quote("XAUUSD", open_quote);

    let signal = EntrySignal::from_risk_multiples(
        "XAUUSD",
        Direction::Long,
        2000.0,
        1980.0,
        [1.0, 2.0, 3.0],
        base_time(),
        Timeframe::M15,
    )
    .unwrap();
    let ticket = venue
        .open_market_order(&OrderRequest {
            symbol: "XAUUSD".to_string(),
            direction: Direction::Long,
            volume: 0.5,
            stop_loss: signal.stop_loss,
            take_profit: signal.tp1,
            comment: "test".to_string(),
        })
        .unwrap();
    let mut ledger = PositionLedger::new(LifecycleConfig::default(), 1.5);
    ledger
        .register(TrackedPosition::from_signal(ticket, &signal, 0.5, base_time()))
        .unwrap();
    (ledger, venue, feed, ticket)
}

fn move_to(venue: &mut PaperGateway, feed: &mut InMemoryFeed, bid: f64) {
    let quote = Quote::new(bid, bid + 0.5, base_time());
    venue.set_quote("XAUUSD", quote);
    feed.set_quote("XAUUSD", quote);
}

#[test]
fn test_scenario_tp1_once() {
    let (mut ledger, mut venue, mut feed, ticket) = ledger_setup();
    let volatility = VolatilityTracker::new(&StrategyConfig::default());

    move_to(&mut venue, &mut feed, 2020.5);
    ledger.tick(&mut venue, &feed, &volatility, base_time());
    let after_first = venue.calls();
    assert_eq!(after_first.close, 1);
    assert_eq!(after_first.modify, 1);

    let position = ledger.get(ticket).unwrap();
    assert!((position.remaining_volume - 0.34).abs() < 1e-9);
    assert!(position.current_stop > position.entry_price);

    for _ in 0..5 {
        ledger.tick(&mut venue, &feed, &volatility, base_time());
    }
    assert_eq!(venue.calls().mutating(), after_first.mutating());
}

#[test]
fn test_lifecycle_volume_and_flags_are_monotonic() {
    let (mut ledger, mut venue, mut feed, ticket) = ledger_setup();
    let volatility = VolatilityTracker::new(&StrategyConfig::default());

    let path = [2005.0, 2021.0, 2021.0, 2030.0, 2041.0, 2041.0, 2035.0, 2050.0, 2061.0, 2061.0];
    let mut last_volume = 0.5;
    let mut last_flags = (false, false, false);
    for bid in path {
        move_to(&mut venue, &mut feed, bid);
        ledger.tick(&mut venue, &feed, &volatility, base_time());
        let Some(position) = ledger.get(ticket) else {
            break;
        };
        assert!(position.remaining_volume <= last_volume + 1e-12);
        assert!(position.remaining_volume >= 0.0);

        let flags = (position.tp1_hit, position.tp2_hit, position.tp3_hit);
        assert!(flags.0 >= last_flags.0 && flags.1 >= last_flags.1 && flags.2 >= last_flags.2);
        assert!(!flags.1 || flags.0);
        assert!(!flags.2 || flags.1);
        last_volume = position.remaining_volume;
        last_flags = flags;
    }
    assert!(ledger.is_empty() || ledger.open_count() == 0);
}

#[test]
fn test_scenario_strict_turning_point() {
    let lows: Vec<f64> = (0..11).map(|i: i64| 1900.0 + (i - 5).abs() as f64).collect();
    let bars: Vec<Candle> = lows
        .iter()
        .enumerate()
        .map(|(i, &low)| {
            Candle::new(
                low + 2.0,
                low + 4.0,
                low,
                low + 2.0,
                1.0,
                base_time() + Duration::hours(i as i64),
                "XAUUSD".to_string(),
                Timeframe::H1,
            )
        })
        .collect();
    assert!(is_swing_low(&bars, 5, 5));

    let mut tied = bars.clone();
    tied[8].low = 1900.0;
    assert!(!is_swing_low(&tied, 5, 5));
}

#[test]
fn test_scenario_disagreeing_context_rejects_entry() {
    let bullish = TimeframeTrend {
        timeframe: Timeframe::H4,
        trend: Trend::Bullish,
        strength: 0.9,
    };
    let bearish = TimeframeTrend {
        timeframe: Timeframe::D1,
        trend: Trend::Bearish,
        strength: 0.9,
    };
    let context = MarketContext::combine(bullish, bearish, 0.5, None, base_time());
    assert_eq!(context.trend, Trend::Undefined);
    assert!(!context.valid);

    let mut feed = InMemoryFeed::new();
    feed.add_candles(rising_m15(80));
    feed.set_quote("XAUUSD", quote(2039.5));
    let analyzer = EntryAnalyzer::new(&StrategyConfig::default());
    assert_eq!(
        analyzer.analyze_entry(&context, &feed, "XAUUSD", base_time()),
        Err(RejectReason::InvalidContext)
    );
}

#[test]
fn test_signal_targets_are_ordered() {
    for direction in [Direction::Long, Direction::Short] {
        let stop = 2000.0 - direction.sign() * 12.5;
        let signal = EntrySignal::from_risk_multiples(
            "XAUUSD",
            direction,
            2000.0,
            stop,
            [1.0, 2.0, 3.0],
            base_time(),
            Timeframe::M5,
        )
        .unwrap();
        let d1 = (signal.entry_price - signal.tp1).abs();
        let d2 = (signal.entry_price - signal.tp2).abs();
        let d3 = (signal.entry_price - signal.tp3).abs();
        assert!(d1 < d2 && d2 < d3);
        assert!(direction.is_beyond(signal.tp1, signal.entry_price));
    }

    let bad = EntrySignal::new(
        "XAUUSD",
        Direction::Short,
        2000.0,
        2010.0,
        1990.0,
        1995.0,
        1980.0,
        base_time(),
        Timeframe::M5,
    );
    assert!(matches!(bad, Err(EngineError::InvalidLevels(_))));
}

#[test]
fn test_consumed_candidate_never_validates_again() {
    let mut feed = InMemoryFeed::new();
    let shape = [
        (1930.0, 1910.0),
        (1920.0, 1905.0),
        (1915.0, 1900.0),
        (1950.0, 1912.0),
        (1975.0, 1940.0),
        (1990.0, 1965.0),
        (2000.0, 1980.0),
        (1995.0, 1970.0),
        (1975.0, 1950.0),
        (1960.0, 1944.0),
    ];
    feed.add_candles(shape.iter().enumerate().map(|(i, &(high, low))| {
        let mid = (high + low) / 2.0;
        Candle::new(
            mid,
            high,
            low,
            mid,
            1.0,
            base_time() + Duration::hours(i as i64),
            "XAUUSD".to_string(),
            Timeframe::H1,
        )
    }));

    let config = PatternConfig {
        retracement: RetracementConfig {
            order: 2,
            ..RetracementConfig::default()
        },
        ..PatternConfig::default()
    };
    let models = ModelToggles {
        liquidity: false,
        retracement: true,
        turning_points: false,
        institutional: false,
    };
    let mut validator = SignalValidator::new(PatternLibrary::from_config(&config, &models));
    validator
        .library_mut()
        .rescan(&feed, "XAUUSD", base_time() + Duration::hours(10));

    let signal = || {
        EntrySignal::from_risk_multiples(
            "XAUUSD",
            Direction::Long,
            1945.0,
            1935.0,
            [1.0, 2.0, 3.0],
            base_time() + Duration::hours(10),
            Timeframe::M15,
        )
        .unwrap()
    };
    let confirmed = validator.validate(signal()).unwrap();
    assert_eq!(confirmed.model_name, "retracement");
    assert!(validator.validate(signal()).is_ok());

    validator.commit(&confirmed);
    assert_eq!(
        validator.validate(signal()),
        Err(RejectReason::NoPatternConfluence)
    );
}

#[test]
fn test_paper_venue_stop_out_reaches_report() {
    let (mut ledger, mut venue, mut feed, _) = ledger_setup();
    let volatility = VolatilityTracker::new(&StrategyConfig::default());
    let mut log = EventLog::new();

    move_to(&mut venue, &mut feed, 1975.0);
    venue.settle("XAUUSD");
    for event in ledger.tick(&mut venue, &feed, &volatility, base_time()) {
        log.record(event);
    }
    assert_eq!(log.closed(), 1);
    assert!(log.realized_pnl() < 0.0);
    assert!(log.format().contains("CLOSE"));
}
