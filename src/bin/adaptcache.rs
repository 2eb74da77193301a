use adaptcache::{
    AdaptiveCache, BackendError, BackendLoad, CacheContext, CacheSettings, CallerTier, GetOptions, SeasonPhase,
    Strategy, TimeOfDay,
};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

fn parse_enum<T: DeserializeOwned>(s: &str) -> Result<T, String> {
    serde_json::from_value(serde_json::Value::String(s.to_ascii_lowercase().replace('_', "-")))
        .map_err(|e| format!("invalid value '{s}': {e}"))
}

#[derive(clap::Args, Debug, Clone)]
struct ContextArgs {
    #[arg(long, help = "A live event is in progress")]
    live: bool,
    #[arg(long, value_parser = parse_enum::<SeasonPhase>, default_value = "regular", help = "preseason|regular|postseason|offseason")]
    phase: SeasonPhase,
    #[arg(long, value_parser = parse_enum::<CallerTier>, default_value = "standard", help = "standard|premium")]
    tier: CallerTier,
    #[arg(long, value_parser = parse_enum::<BackendLoad>, default_value = "normal", help = "normal|high")]
    load: BackendLoad,
    #[arg(long, help = "Local hour (0-23) used for the time-of-day bucket; defaults to now")]
    hour: Option<u32>,
}

impl ContextArgs {
    fn context(&self) -> CacheContext {
        let tod = self.hour.map_or_else(TimeOfDay::now_local, TimeOfDay::from_hour);
        CacheContext::builder()
            .live_event(self.live)
            .phase(self.phase)
            .tier(self.tier)
            .load(self.load)
            .time_of_day(tod)
            .build()
    }
}

#[derive(Parser, Debug)]
#[command(name = "adaptcache", version, about = "Adaptive cache inspection and simulation", long_about = None)]
struct Cli {
    #[arg(long, help = "Path to a settings file (TOML). Falls back to ADAPTCACHE_CONFIG, then ./adaptcache.toml.")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Show config, rules, strategy and effective TTL for a key")]
    Explain {
        key: String,
        #[command(flatten)]
        ctx: ContextArgs,
    },
    #[command(about = "Print the effective settings as TOML")]
    Config,
    #[command(about = "Run a concurrent workload against a fake backend and print stats as JSON")]
    Simulate {
        #[arg(long, default_value_t = 16)]
        callers: usize,
        #[arg(long, default_value_t = 20)]
        rounds: usize,
        #[arg(long, default_value_t = 25, help = "Fake backend latency in milliseconds")]
        latency_ms: u64,
        #[arg(long, default_value_t = 0, help = "Every Nth backend call fails with 503; 0 disables")]
        fail_every: u64,
        #[arg(long, help = "Override the minimum spacing between backend calls")]
        spacing_ms: Option<u64>,
        #[arg(long, help = "Force one strategy for every call")]
        strategy: Option<Strategy>,
        #[command(flatten)]
        ctx: ContextArgs,
    },
}

const SIM_KEYS: [&str; 6] = [
    "live_scores|game=101",
    "games|week=3",
    "odds|game=101",
    "teams|id=12",
    "standings|conf=afc",
    "historical|season=2019",
];

async fn simulate(
    cache: AdaptiveCache,
    callers: usize,
    rounds: usize,
    latency: Duration,
    fail_every: u64,
    strategy: Option<Strategy>,
    ctx: CacheContext,
) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    let backend_calls = Arc::new(AtomicU64::new(0));
    let failures = Arc::new(AtomicU64::new(0));
    let mut tasks = Vec::with_capacity(callers);
    for caller in 0..callers {
        let cache = cache.clone();
        let backend_calls = Arc::clone(&backend_calls);
        let failures = Arc::clone(&failures);
        tasks.push(tokio::spawn(async move {
            for round in 0..rounds {
                let key = SIM_KEYS[(caller + round) % SIM_KEYS.len()];
                let calls = Arc::clone(&backend_calls);
                let fetch = move || {
                    let n = calls.fetch_add(1, Ordering::Relaxed) + 1;
                    async move {
                        tokio::time::sleep(latency).await;
                        if fail_every > 0 && n % fail_every == 0 {
                            return Err(BackendError::from_status(503, "simulated outage", None));
                        }
                        Ok(serde_json::json!({ "call": n }))
                    }
                };
                let opts = GetOptions { strategy, ..GetOptions::default() };
                if cache.get::<serde_json::Value, _, _>(key, &ctx, opts, fetch).await.is_err() {
                    failures.fetch_add(1, Ordering::Relaxed);
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }));
    }
    for t in tasks {
        t.await?;
    }
    Ok(serde_json::json!({
        "requests": serde_json::to_value(cache.stats())?,
        "store": serde_json::to_value(cache.store_stats())?,
        "executor": serde_json::to_value(cache.executor_stats())?,
        "backend_calls": backend_calls.load(Ordering::Relaxed),
        "failed_requests": failures.load(Ordering::Relaxed),
    }))
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut settings = CacheSettings::load(cli.config.as_deref())?;
    match cli.command {
        Commands::Config => {
            println!("{}", settings.to_toml_string()?);
        }
        Commands::Explain { key, ctx } => {
            let cache = AdaptiveCache::with_settings(settings)?;
            let ex = cache.explain(&key, &ctx.context(), None);
            println!("{}", serde_json::to_string_pretty(&ex)?);
        }
        Commands::Simulate { callers, rounds, latency_ms, fail_every, spacing_ms, strategy, ctx } => {
            if let Some(ms) = spacing_ms {
                settings.min_request_spacing_ms = ms;
            }
            let rt = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
            let report = rt.block_on(async move {
                let cache = AdaptiveCache::with_settings(settings)?;
                let daemon = cache.start_daemon();
                let report = simulate(
                    cache,
                    callers,
                    rounds,
                    Duration::from_millis(latency_ms),
                    fail_every,
                    strategy,
                    ctx.context(),
                )
                .await;
                daemon.shutdown().await;
                report
            })?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

fn main() {
    if std::env::var_os("ADAPTCACHE_LOG_DIR").is_some()
        && let Err(e) = adaptcache::logger::configure_from_env()
    {
        eprintln!("warning: logging not configured: {e}");
    }
    if let Err(e) = run(Cli::parse()) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
