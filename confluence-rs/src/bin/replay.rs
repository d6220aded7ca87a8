//! Replay stored candles through the engine against the paper venue.
//!
//! ```text
//! replay --candles xauusd_m5.json --balance 10000 --spread 0.3
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use confluence_rs::prelude::*;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "replay", about = "Replay base-timeframe candles through the confluence engine")]
struct Cli {
    /// JSON array of candles, all of one symbol and timeframe
    #[arg(long)]
    candles: PathBuf,

    /// Engine config JSON; defaults plus environment overrides when omitted
    #[arg(long, env = "CONFLUENCE_CONFIG")]
    config: Option<PathBuf>,

    /// Starting paper balance
    #[arg(long, default_value_t = 10_000.0)]
    balance: f64,

    /// Spread added to the close to form the ask
    #[arg(long, default_value_t = 0.3)]
    spread: f64,

    /// Log as JSON lines
    #[arg(long, default_value_t = false)]
    json: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn load_candles(path: &PathBuf) -> Result<Vec<Candle>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading candles from {}", path.display()))?;
    let mut candles: Vec<Candle> = serde_json::from_str(&raw).context("parsing candle JSON")?;
    candles.sort_by_key(|c| c.timestamp);
    Ok(candles)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    let config = match &cli.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::from_env()?,
    };
    let candles = load_candles(&cli.candles)?;
    let Some(first) = candles.first() else {
        bail!("no candles in {}", cli.candles.display());
    };
    let base = first.timeframe;
    let symbol = config.strategy.symbol.clone();
    if first.symbol != symbol {
        bail!("candles are {} but the engine trades {}", first.symbol, symbol);
    }

    let mut feed = InMemoryFeed::new();
    feed.add_candles(candles.iter().cloned());
    for timeframe in config.timeframes() {
        if timeframe > base {
            feed.add_candles(resample(&candles, timeframe));
        }
    }
    info!(symbol = %symbol, base = %base, bars = candles.len(), "replay loaded");

    let gateway = PaperGateway::new(cli.balance);
    let mut engine = TradingEngine::new(config, gateway, feed, EventLog::new())?;

    for candle in &candles {
        let now = candle.close_time();
        let quote = Quote::new(candle.close, candle.close + cli.spread, now);
        engine.feed_mut().set_clock(now);
        engine.feed_mut().set_quote(&symbol, quote);
        engine.gateway_mut().set_quote(&symbol, quote);

        engine.on_tick(now);
        engine.gateway_mut().settle(&symbol);
    }
    // let the ledger see the final venue state
    if let Some(last) = candles.last() {
        engine.on_tick(last.close_time());
    }

    let (gateway, _, log) = engine.into_parts();
    println!("{}", log.format());
    println!("Ending Balance: ${:.2}", gateway.balance());
    Ok(())
}
