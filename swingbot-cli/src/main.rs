//! Swingbot CLI: single-cycle runs against the paper broker.
//!
//! Commands:
//! - `run`: one evaluation cycle per configured account, then exit
//! - `check-config`: validate a config file and print its fingerprint
//! - `report`: daily P&L summary per account

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};

use swingbot_core::audit::{AuditSink, FanoutAuditSink, TracingAuditSink};
use swingbot_core::broker::{Broker, PaperBroker};
use swingbot_core::domain::AccountSnapshot;
use swingbot_core::execution::ThreadSleeper;
use swingbot_runner::{
    daily_summary, load_bars_dir, render_report, run_all_accounts, seed_paper_broker,
    synthetic_bars, synthetic_end, AccountConfig, AccountHandle, BotConfig, JsonlAuditSink,
    StateStore,
};

#[derive(Parser)]
#[command(
    name = "swingbot",
    about = "Swingbot: single-cycle swing trading decision engine"
)]
struct Cli {
    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    /// Log filter when SWINGBOT_LOG is unset.
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one evaluation cycle for every account (or one with --account).
    Run {
        /// Path to the bot config (TOML, or JSON by extension).
        #[arg(long)]
        config: PathBuf,

        /// Only run this account.
        #[arg(long)]
        account: Option<String>,

        /// Directory of <SYMBOL>.csv bar files for the paper broker.
        #[arg(long, conflicts_with = "synthetic")]
        bars_dir: Option<PathBuf>,

        /// Feed the paper broker seeded synthetic bars.
        #[arg(long, default_value_t = false)]
        synthetic: bool,

        /// Seed for --synthetic.
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Evaluation time (RFC 3339). Defaults to now.
        #[arg(long)]
        at: Option<DateTime<Utc>>,

        /// Carry cooldowns, trailing marks and halts across invocations.
        #[arg(long)]
        state_file: Option<PathBuf>,

        /// Append audit records to this JSON-lines file.
        #[arg(long)]
        audit_out: Option<PathBuf>,
    },
    /// Validate a config file and print its fingerprint.
    CheckConfig {
        #[arg(long)]
        config: PathBuf,
    },
    /// Print the daily P&L summary for each account.
    Report {
        #[arg(long)]
        config: PathBuf,

        /// JSON object of account name -> {equity, cash, buying_power,
        /// last_equity}. Without it, paper accounts report their starting cash.
        #[arg(long)]
        snapshots: Option<PathBuf>,

        /// Print JSON instead of text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_format).map_err(anyhow::Error::msg)?;

    match cli.command {
        Commands::Run {
            config,
            account,
            bars_dir,
            synthetic,
            seed,
            at,
            state_file,
            audit_out,
        } => run_cycle(RunArgs {
            config,
            account,
            bars_dir,
            synthetic,
            seed,
            at,
            state_file,
            audit_out,
        }),
        Commands::CheckConfig { config } => check_config(&config),
        Commands::Report {
            config,
            snapshots,
            json,
        } => run_report(&config, snapshots.as_deref(), json),
    }
}

fn init_tracing(log_level: &str, format: LogFormat) -> Result<(), String> {
    let filter = std::env::var("SWINGBOT_LOG").unwrap_or_else(|_| log_level.to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_new(filter)
        .map_err(|err| format!("invalid log filter: {err}"))?;

    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init(),
    }
    Ok(())
}

struct RunArgs {
    config: PathBuf,
    account: Option<String>,
    bars_dir: Option<PathBuf>,
    synthetic: bool,
    seed: u64,
    at: Option<DateTime<Utc>>,
    state_file: Option<PathBuf>,
    audit_out: Option<PathBuf>,
}

fn run_cycle(args: RunArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    let now = args.at.unwrap_or_else(Utc::now);

    let accounts: Vec<&AccountConfig> = match &args.account {
        Some(name) => match config.account(name) {
            Some(a) => vec![a],
            None => bail!("account '{name}' is not in {}", args.config.display()),
        },
        None => config.accounts.iter().collect(),
    };
    if args.bars_dir.is_none() && !args.synthetic {
        bail!("the paper broker needs bars: pass --bars-dir <DIR> or --synthetic");
    }

    let brokers = accounts
        .iter()
        .map(|a| paper_broker(&config, a, &args, now))
        .collect::<Result<Vec<_>>>()?;
    let handles: Vec<AccountHandle<'_>> = accounts
        .iter()
        .zip(&brokers)
        .map(|(a, broker)| AccountHandle {
            account: *a,
            broker: broker as &dyn Broker,
        })
        .collect();

    let mut store = match &args.state_file {
        Some(path) => StateStore::load(path)?,
        None => StateStore::new(),
    };

    let jsonl = args.audit_out.as_ref().map(JsonlAuditSink::new);
    let mut sinks: Vec<&dyn AuditSink> = vec![&TracingAuditSink];
    if let Some(sink) = &jsonl {
        sinks.push(sink);
    }
    let sink = FanoutAuditSink::new(sinks);

    info!(
        accounts = handles.len(),
        fingerprint = %config.fingerprint(),
        at = %now,
        "starting run"
    );
    let runs = run_all_accounts(&handles, &config, &mut store, &sink, &ThreadSleeper, now);

    if let Some(path) = &args.state_file {
        store.save(path)?;
    }

    let mut failed = 0;
    for run in &runs {
        match &run.result {
            Ok(report) => println!("{}", serde_json::to_string_pretty(report)?),
            Err(err) => {
                failed += 1;
                warn!(account = %run.account, error = %err, "account skipped");
            }
        }
    }

    let summaries: Vec<_> = accounts
        .iter()
        .zip(&brokers)
        .filter_map(|(a, b)| b.get_account().ok().map(|s| daily_summary(&a.name, &s)))
        .collect();
    eprint!("{}", render_report(&summaries));

    if failed == runs.len() && !runs.is_empty() {
        bail!("every account cycle failed");
    }
    Ok(())
}

/// Paper broker for `account`, seeded with its symbols' bars.
fn paper_broker(
    config: &BotConfig,
    account: &AccountConfig,
    args: &RunArgs,
    now: DateTime<Utc>,
) -> Result<PaperBroker> {
    let broker = PaperBroker::new(account.paper_cash);
    let symbols = config.symbols_for(account);
    let bars = match &args.bars_dir {
        Some(dir) => load_bars_dir(dir, symbols)
            .with_context(|| format!("loading bars for account {}", account.name))?,
        None => {
            let end = synthetic_end(now, config.data.timeframe);
            symbols
                .iter()
                .map(|s| {
                    let bars =
                        synthetic_bars(s, config.data.bar_limit, args.seed, config.data.timeframe, end);
                    (s.clone(), bars)
                })
                .collect::<BTreeMap<_, _>>()
        }
    };
    seed_paper_broker(&broker, bars);
    Ok(broker)
}

fn check_config(path: &Path) -> Result<()> {
    let config = load_config(path)?;
    println!("config ok: {}", path.display());
    println!("fingerprint: {}", config.fingerprint());
    println!(
        "policy: {:?}, timeframe: {}, bars: {} (min {})",
        config.strategy.policy,
        config.data.timeframe,
        config.data.bar_limit,
        config.strategy.indicators.min_bars()
    );
    for account in &config.accounts {
        println!(
            "account {}: {}",
            account.name,
            config.symbols_for(account).join(", ")
        );
    }
    Ok(())
}

fn run_report(path: &Path, snapshots: Option<&Path>, json: bool) -> Result<()> {
    let config = load_config(path)?;
    let known: BTreeMap<String, AccountSnapshot> = match snapshots {
        Some(p) => {
            let text = std::fs::read_to_string(p)
                .with_context(|| format!("reading {}", p.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing {}", p.display()))?
        }
        None => BTreeMap::new(),
    };

    let summaries: Vec<_> = config
        .accounts
        .iter()
        .map(|a| {
            let snapshot = known.get(&a.name).cloned().unwrap_or(AccountSnapshot {
                equity: a.paper_cash,
                cash: a.paper_cash,
                buying_power: a.paper_cash,
                last_equity: a.paper_cash,
            });
            daily_summary(&a.name, &snapshot)
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    } else {
        print!("{}", render_report(&summaries));
    }
    Ok(())
}

fn load_config(path: &Path) -> Result<BotConfig> {
    BotConfig::load(path).with_context(|| format!("loading config {}", path.display()))
}
