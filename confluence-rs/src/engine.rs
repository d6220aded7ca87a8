//! Tick-driven trading engine
//!
//! [`TradingEngine::on_tick`] is the single entry point: the host calls it on
//! every price update and the engine does everything else synchronously.

use crate::analysis::{ContextAnalyzer, EntryAnalyzer, MarketContext, VolatilityTracker};
use crate::config::EngineConfig;
use crate::data::{MarketDataFeed, NewBarGate};
use crate::error::EngineError;
use crate::exchange::{ExecutionGateway, OrderRequest, Ticket};
use crate::patterns::{PatternDetector, PatternLibrary};
use crate::portfolio::{
    AccountSnapshot, PositionLedger, RiskSizer, RiskState, SessionTracker, TrackedPosition,
};
use crate::report::{ReportCollector, TradeEvent};
use crate::strategy::{RejectReason, SignalValidator};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, error, info, warn};

/// What one tick did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickSummary {
    pub session_rolled: bool,
    /// Events sent to the reporter
    pub events: usize,
    pub context_refreshed: bool,
    /// An entry timeframe closed a bar and entries were considered
    pub entry_evaluated: bool,
    /// Gate or reason that stopped an entry
    pub skipped: Option<String>,
    pub rejection: Option<RejectReason>,
    pub opened: Option<Ticket>,
}

/// Orchestrates analysis, validation, sizing, execution and position upkeep
/// for one symbol.
pub struct TradingEngine<G, F, R> {
    config: EngineConfig,
    gateway: G,
    feed: F,
    reporter: R,
    volatility: VolatilityTracker,
    context: ContextAnalyzer,
    entry: EntryAnalyzer,
    validator: SignalValidator,
    sizer: RiskSizer,
    ledger: PositionLedger,
    session: SessionTracker,
    entry_gate: NewBarGate,
}

impl<G, F, R> TradingEngine<G, F, R>
where
    G: ExecutionGateway,
    F: MarketDataFeed,
    R: ReportCollector,
{
    /// Validate `config` and build every component; nothing is built when
    /// the configuration is rejected.
    pub fn new(config: EngineConfig, gateway: G, feed: F, reporter: R) -> crate::Result<Self> {
        config.validate()?;
        let timezone: Tz = config.risk.session_timezone.parse().map_err(|_| {
            EngineError::InvalidConfig(format!(
                "unknown session timezone {}",
                config.risk.session_timezone
            ))
        })?;

        let strategy = &config.strategy;
        let library = PatternLibrary::from_config(&config.patterns, &strategy.models);
        info!(
            symbol = %strategy.symbol,
            primary = %strategy.primary_timeframe,
            secondary = %strategy.secondary_timeframe,
            models = ?library.names(),
            risk = config.risk.risk_percent,
            "engine initialized"
        );

        Ok(Self {
            volatility: VolatilityTracker::new(strategy),
            context: ContextAnalyzer::new(strategy),
            entry: EntryAnalyzer::new(strategy),
            validator: SignalValidator::new(library),
            sizer: RiskSizer::new(config.risk.clone()),
            ledger: PositionLedger::new(config.lifecycle.clone(), strategy.volatility_multiplier),
            session: SessionTracker::new(timezone),
            entry_gate: NewBarGate::new(),
            config,
            gateway,
            feed,
            reporter,
        })
    }

    /// Add a host-defined detector next to the configured models
    pub fn with_detector(mut self, detector: Box<dyn PatternDetector>) -> Self {
        self.validator.library_mut().push(detector);
        self
    }

    /// Run one control-loop pass at `now`
    pub fn on_tick(&mut self, now: DateTime<Utc>) -> TickSummary {
        let symbol = self.config.strategy.symbol.clone();
        let mut summary = TickSummary::default();

        if self.feed.bid_ask(&symbol).is_none() {
            debug!(symbol = %symbol, "no quote this tick");
        }

        let account = match self.gateway.account() {
            Ok(account) => Some(account),
            Err(error) => {
                warn!(action = "account", %error, "account query failed");
                None
            }
        };
        if let Some(account) = &account {
            summary.session_rolled = self.session.observe(now, account);
            if summary.session_rolled && self.config.risk.reset_risk_each_session {
                self.sizer.reset();
            }
        }

        let events = self
            .ledger
            .tick(&mut self.gateway, &self.feed, &self.volatility, now);
        for event in events {
            self.report(&mut summary, event);
        }

        self.volatility.refresh(&self.feed, &symbol, now);
        summary.context_refreshed =
            self.context
                .refresh(&self.feed, &symbol, now, self.volatility.ratio(&symbol));
        self.validator.library_mut().rescan(&self.feed, &symbol, now);

        let mut new_bar = false;
        for &timeframe in self.entry.timeframes() {
            // every gate has to see the bar
            new_bar |= self
                .entry_gate
                .is_new_bar(timeframe, self.feed.latest_bar_time(&symbol, timeframe));
        }
        if new_bar {
            summary.entry_evaluated = true;
            match account {
                Some(account) => self.try_entry(&symbol, now, &account, &mut summary),
                None => summary.skipped = Some("account unavailable".to_string()),
            }
        }
        summary
    }

    fn try_entry(
        &mut self,
        symbol: &str,
        now: DateTime<Utc>,
        account: &AccountSnapshot,
        summary: &mut TickSummary,
    ) {
        if let Some(gate) = self
            .sizer
            .entry_blocked(&self.session, account, self.ledger.open_count())
        {
            info!(symbol, gate, "entry skipped");
            summary.skipped = Some(gate.to_string());
            return;
        }

        let candidate = match self.context.current() {
            Some(context) => self.entry.analyze_entry(context, &self.feed, symbol, now),
            None => Err(RejectReason::InvalidContext),
        };
        let signal = match candidate.and_then(|signal| self.validator.validate(signal)) {
            Ok(signal) => signal,
            Err(reason) => {
                debug!(symbol, %reason, "no entry");
                summary.rejection = Some(reason);
                return;
            }
        };

        let instrument = match self.gateway.instrument(symbol) {
            Ok(instrument) => instrument,
            Err(error) => {
                warn!(symbol, action = "instrument", %error, "instrument lookup failed");
                summary.skipped = Some(error.to_string());
                return;
            }
        };
        let sizing = self
            .sizer
            .calculate_lot_size(signal.entry_price, signal.stop_loss, account, &instrument);
        for event in sizing.events {
            self.report(summary, event.into());
        }
        if sizing.volume <= 0.0 {
            summary.skipped = Some("position size is zero".to_string());
            return;
        }

        let request = OrderRequest {
            symbol: symbol.to_string(),
            direction: signal.direction,
            volume: sizing.volume,
            stop_loss: signal.stop_loss,
            take_profit: signal.tp1,
            comment: signal.model_name.clone(),
        };
        let ticket = match self.gateway.open_market_order(&request) {
            Ok(ticket) => ticket,
            Err(error) => {
                error!(symbol, action = "open", %error, volume = sizing.volume, "order failed");
                summary.skipped = Some(error.to_string());
                return;
            }
        };
        self.validator.commit(&signal);

        let position = TrackedPosition::from_signal(ticket, &signal, sizing.volume, now);
        if let Err(error) = self.ledger.register(position) {
            error!(ticket, %error, "position not tracked");
            return;
        }
        info!(
            ticket,
            symbol,
            direction = %signal.direction,
            volume = sizing.volume,
            risk = sizing.risk_percent,
            model = %signal.model_name,
            "trade opened"
        );
        summary.opened = Some(ticket);
        self.report(
            summary,
            TradeEvent::TradeOpened {
                signal,
                ticket,
                volume: sizing.volume,
            },
        );
    }

    fn report(&mut self, summary: &mut TickSummary, event: TradeEvent) {
        summary.events += 1;
        self.reporter.record(event);
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn gateway_mut(&mut self) -> &mut G {
        &mut self.gateway
    }

    pub fn feed(&self) -> &F {
        &self.feed
    }

    pub fn feed_mut(&mut self) -> &mut F {
        &mut self.feed
    }

    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    pub fn ledger(&self) -> &PositionLedger {
        &self.ledger
    }

    pub fn risk_state(&self) -> &RiskState {
        self.sizer.state()
    }

    /// Restore the configured risk percent
    pub fn reset_risk(&mut self) {
        self.sizer.reset();
    }

    pub fn context(&self) -> Option<&MarketContext> {
        self.context.current()
    }

    pub fn volatility(&self) -> &VolatilityTracker {
        &self.volatility
    }

    pub fn patterns(&self) -> &PatternLibrary {
        self.validator.library()
    }

    pub fn session(&self) -> &SessionTracker {
        &self.session
    }

    pub fn into_parts(self) -> (G, F, R) {
        (self.gateway, self.feed, self.reporter)
    }
}
