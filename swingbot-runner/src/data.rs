//! Bar sources for the paper broker: per-symbol CSV files or seeded
//! synthetic random walks.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use tracing::{debug, info};

use swingbot_core::broker::PaperBroker;
use swingbot_core::domain::{bar::is_strictly_ascending, Bar, Quote, Timeframe};

use crate::error::RunnerError;

#[derive(Debug, Deserialize)]
struct CsvBar {
    timestamp: DateTime<Utc>,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

/// Read `timestamp,open,high,low,close,volume` rows. Timestamps are RFC 3339
/// and must be strictly ascending.
pub fn load_csv_bars(path: &Path) -> Result<Vec<Bar>, RunnerError> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| RunnerError::parse(path, e))?;
    let mut bars = Vec::new();
    for (i, row) in reader.deserialize::<CsvBar>().enumerate() {
        let row = row.map_err(|e| RunnerError::BadBars {
            path: path.to_path_buf(),
            row: i + 1,
            reason: e.to_string(),
        })?;
        let bar = Bar::new(row.timestamp, row.open, row.high, row.low, row.close, row.volume);
        if !bar.is_sane() {
            return Err(RunnerError::BadBars {
                path: path.to_path_buf(),
                row: i + 1,
                reason: "inconsistent OHLCV values".to_string(),
            });
        }
        bars.push(bar);
    }
    if !is_strictly_ascending(&bars) {
        return Err(RunnerError::BadBars {
            path: path.to_path_buf(),
            row: 0,
            reason: "timestamps must be strictly ascending".to_string(),
        });
    }
    debug!(path = %path.display(), bars = bars.len(), "loaded csv bars");
    Ok(bars)
}

/// Load `<dir>/<SYMBOL>.csv` for each symbol.
pub fn load_bars_dir(
    dir: &Path,
    symbols: &[String],
) -> Result<BTreeMap<String, Vec<Bar>>, RunnerError> {
    symbols
        .iter()
        .map(|s| {
            let bars = load_csv_bars(&dir.join(format!("{s}.csv")))?;
            Ok((s.clone(), bars))
        })
        .collect()
}

/// Deterministic random walk ending at `end`, one bar per `timeframe`.
///
/// The seed is mixed with the symbol through BLAKE3 so each symbol gets its
/// own path and the same inputs always give the same bars.
pub fn synthetic_bars(
    symbol: &str,
    count: usize,
    seed: u64,
    timeframe: Timeframe,
    end: DateTime<Utc>,
) -> Vec<Bar> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&seed.to_le_bytes());
    hasher.update(symbol.as_bytes());
    let mut rng = StdRng::from_seed(*hasher.finalize().as_bytes());

    let step = timeframe.duration();
    let start = end - step * i32::try_from(count).unwrap_or(i32::MAX);
    let mut price = rng.gen_range(20.0..200.0_f64);
    let mut bars = Vec::with_capacity(count);
    for i in 0..count {
        let ret: f64 = rng.gen_range(-0.012..0.012);
        let open = price;
        let close = price * (1.0 + ret);
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.004));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.004));
        let volume = rng.gen_range(50_000..2_000_000u64) as f64;
        let ts = start + step * (i as i32 + 1);
        bars.push(Bar::new(ts, open, high, low, close, volume));
        price = close;
    }
    bars
}

/// Feed bars into the paper broker, with a one-cent quote around each last
/// close so spread checks have something to look at.
pub fn seed_paper_broker(broker: &PaperBroker, bars: BTreeMap<String, Vec<Bar>>) {
    for (symbol, bars) in bars {
        if let Some(last) = bars.last() {
            broker.set_quote(
                &symbol,
                Quote {
                    bid: last.close - 0.005,
                    ask: last.close + 0.005,
                },
            );
        }
        info!(symbol = %symbol, bars = bars.len(), "seeded paper broker");
        broker.set_bars(&symbol, bars);
    }
}

/// End of the synthetic series: the last whole bar before `now`.
pub fn synthetic_end(now: DateTime<Utc>, timeframe: Timeframe) -> DateTime<Utc> {
    let step = timeframe.duration().num_seconds().max(1);
    let secs = now.timestamp() - now.timestamp().rem_euclid(step);
    DateTime::from_timestamp(secs, 0).unwrap_or(now)
}
