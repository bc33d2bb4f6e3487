//! Agenda CLI
//!
//! Demonstrations and a load generator for the Agenda memoizing cache.

mod backend;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use agenda_cache::{CacheConfig, CacheStats, LoadingCache, ManualClock, MemoCache, Ttl};

use crate::backend::{BackendUnavailable, SimulatedBackend};

/// Agenda - memoizing TTL cache for the booking data layer
#[derive(Parser)]
#[command(name = "agenda")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk through expiry, coalescing, failure sharing and invalidation
    Demo,

    /// Drive concurrent fetches through a cache backed by a simulated table
    Bench(BenchArgs),

    /// Populate namespaced keys and show what a prefix invalidation removes
    Invalidate {
        /// Prefix to invalidate (omit to clear everything)
        #[arg(short, long)]
        prefix: Option<String>,
    },
}

/// Upper bound on `bench --requests`; each request runs on its own task.
const MAX_BENCH_REQUESTS: u64 = 1_000_000;

#[derive(Args, Debug)]
struct BenchArgs {
    /// Number of distinct keys
    #[arg(short, long, default_value = "100")]
    keys: u64,
    /// Number of fetches to issue
    #[arg(
        short,
        long,
        default_value = "10000",
        value_parser = clap::value_parser!(u64).range(1..=MAX_BENCH_REQUESTS)
    )]
    requests: u64,
    /// Simulated backend latency in milliseconds
    #[arg(long, default_value = "25")]
    latency_ms: u64,
    /// Entry TTL in milliseconds (defaults to AGENDA_CACHE_DEFAULT_TTL_MS)
    #[arg(long, allow_hyphen_values = true)]
    ttl_ms: Option<i64>,
    /// Probability that a backend load fails
    #[arg(long, default_value = "0.0")]
    failure_rate: f64,
    /// Seed for key selection and failures
    #[arg(long, default_value = "42")]
    seed: u64,
    /// Print statistics as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _ = dotenvy::dotenv();

    init_logging(cli.verbose, cli.json_logs);

    let config = CacheConfig::from_env().context("Failed to read cache configuration")?;
    debug!(?config, "cache configuration");

    match cli.command {
        Commands::Demo => cmd_demo().await,
        Commands::Bench(args) => cmd_bench(args, config).await,
        Commands::Invalidate { prefix } => cmd_invalidate(prefix.as_deref(), config),
    }
}

fn init_logging(verbose: bool, json: bool) {
    let filter = if verbose {
        "agenda=debug,info"
    } else {
        "agenda=info,warn"
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}

fn check(label: &str, ok: bool) {
    if ok {
        println!("  {} {}", "✓".green().bold(), label);
    } else {
        println!("  {} {}", "✗".red().bold(), label);
    }
}

/// Runs the reference scenarios against a simulated clock.
async fn cmd_demo() -> Result<()> {
    println!("{}", "Expiry".cyan().bold());
    let clock = ManualClock::new();
    let numbers: MemoCache<i64, String> =
        MemoCache::with_clock(CacheConfig::default(), Arc::new(clock.clone()));
    numbers.set("a", 42, 1_000);
    check("set(\"a\", 42, 1000) then get(\"a\") = 42", numbers.get("a") == Some(42));
    clock.advance_millis(1_100);
    check("after 1100ms get(\"a\") is absent", numbers.get("a").is_none());
    numbers.set("z", 1, -5);
    check("negative TTL is stale on next read", numbers.get("z").is_none());

    println!();
    println!("{}", "Coalescing".cyan().bold());
    let cache: MemoCache<String, BackendUnavailable> = MemoCache::new();
    let second_invoked = Arc::new(std::sync::atomic::AtomicBool::new(false));

    let first = tokio::spawn({
        let cache = cache.clone();
        async move {
            cache
                .get_or_compute(
                    "b",
                    || async {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok("hello".to_string())
                    },
                    5_000,
                )
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;

    let flag = Arc::clone(&second_invoked);
    let second = cache
        .get_or_compute(
            "b",
            move || async move {
                flag.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok("other".to_string())
            },
            5_000,
        )
        .await?;
    let first = first.await.context("first caller panicked")??;
    check(
        &format!("both callers received {:?}", second),
        first == second && second == "hello",
    );
    check(
        "second operation was never invoked",
        !second_invoked.load(std::sync::atomic::Ordering::SeqCst),
    );

    println!();
    println!("{}", "Failure sharing".cyan().bold());
    let failing = || async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        Err::<String, _>(BackendUnavailable { key: "c".into() })
    };
    let (a, b) = tokio::join!(
        cache.get_or_compute("c", failing, 5_000),
        cache.get_or_compute("c", || async { Ok("unused".to_string()) }, 5_000),
    );
    match (a, b) {
        (Err(a), Err(b)) => {
            check(&format!("both callers saw: {}", a), a.same_failure(&b));
        }
        _ => check("both callers should have failed", false),
    }
    check("failure was not cached", cache.get("c").is_none());
    let retried = cache
        .get_or_compute("c", || async { Ok("recovered".to_string()) }, 5_000)
        .await?;
    check("next caller runs a fresh operation", retried == "recovered");

    println!();
    println!("{}", "Invalidation".cyan().bold());
    for key in ["user:1", "user:2", "order:1"] {
        cache.set(key, key.to_uppercase(), 60_000);
    }
    cache.invalidate(Some("user:"));
    check(
        "invalidate(\"user:\") keeps order:1 only",
        cache.get("user:1").is_none() && cache.get("user:2").is_none() && cache.get("order:1").is_some(),
    );
    cache.invalidate(None);
    cache.invalidate(None);
    check("invalidate() twice leaves an empty cache", cache.is_empty());

    Ok(())
}

/// Issues `requests` concurrent fetches over `keys` ids.
async fn cmd_bench(args: BenchArgs, config: CacheConfig) -> Result<()> {
    anyhow::ensure!(args.keys > 0, "--keys must be at least 1");

    let ttl = args.ttl_ms.map(Ttl::from_millis).unwrap_or(config.default_ttl);
    let backend = Arc::new(SimulatedBackend::new(
        Duration::from_millis(args.latency_ms),
        args.failure_rate,
        args.seed,
    ));
    let store = MemoCache::with_config(config);
    let bookings = LoadingCache::with_cache(store, Arc::clone(&backend), "booking:").with_ttl(ttl);

    info!(
        keys = args.keys,
        requests = args.requests,
        %ttl,
        "starting bench"
    );

    let pb = if args.json {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(args.requests);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
                .context("Invalid progress template")?
                .progress_chars("#>-"),
        );
        pb
    };

    let mut rng = ChaCha8Rng::seed_from_u64(args.seed);
    let started = Instant::now();

    let mut handles = Vec::new();
    for _ in 0..args.requests {
        let id = rng.gen_range(0..args.keys).to_string();
        let bookings = bookings.clone();
        handles.push(tokio::spawn(async move { bookings.fetch(&id).await.is_ok() }));
    }

    let mut failed = 0u64;
    for handle in handles {
        if !handle.await.context("fetch task panicked")? {
            failed += 1;
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    let elapsed = started.elapsed();
    let stats = bookings.cache().stats();

    if args.json {
        let report = serde_json::json!({
            "elapsed_ms": elapsed.as_millis() as u64,
            "backend_calls": backend.calls(),
            "failed_requests": failed,
            "stats": stats,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_stats(&stats, backend.calls(), failed, elapsed);
    }

    Ok(())
}

fn print_stats(stats: &CacheStats, backend_calls: u64, failed: u64, elapsed: Duration) {
    println!("{}", "Bench results".cyan().bold());
    println!("  elapsed:        {:.2?}", elapsed);
    println!("  backend calls:  {}", backend_calls.to_string().yellow());
    println!("  hits:           {}", stats.hits);
    println!("  coalesced:      {}", stats.coalesced);
    println!("  computed:       {}", stats.computed);
    println!("  failures:       {}", stats.failures);
    println!("  failed fetches: {}", failed);
    println!("  entries:        {} ({} valid)", stats.total_entries, stats.valid_entries);
    println!(
        "  served w/o load: {}",
        format!("{:.1}%", stats.hit_ratio() * 100.0).green().bold()
    );
}

/// Shows which namespaced keys survive an invalidation.
fn cmd_invalidate(prefix: Option<&str>, config: CacheConfig) -> Result<()> {
    let cache: MemoCache<String, std::convert::Infallible> = MemoCache::with_config(config);
    let keys = [
        "staff:1",
        "staff:2",
        "service:1",
        "booking:2024-05-01:1",
        "booking:2024-05-02:1",
    ];
    for key in keys {
        cache.set_default(key, format!("value of {key}"));
    }

    let removed = cache.invalidate(prefix);
    println!(
        "{} removed {} of {} entries",
        match prefix {
            Some(p) => format!("invalidate({p:?})"),
            None => "invalidate()".to_string(),
        }
        .cyan()
        .bold(),
        removed,
        keys.len()
    );

    for key in keys {
        if cache.get(key).is_some() {
            println!("  {} {}", "kept".green(), key);
        } else {
            println!("  {} {}", "gone".red(), key);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_bench() {
        let cli = Cli::try_parse_from([
            "agenda", "bench", "--keys", "5", "--requests", "50", "--ttl-ms", "-1", "--json",
        ])
        .unwrap();
        match cli.command {
            Commands::Bench(args) => {
                assert_eq!(args.keys, 5);
                assert_eq!(args.requests, 50);
                assert_eq!(args.ttl_ms, Some(-1));
                assert!(args.json);
            }
            _ => panic!("expected bench"),
        }
    }

    #[test]
    fn test_cli_rejects_unbounded_requests() {
        let too_many = (MAX_BENCH_REQUESTS + 1).to_string();
        assert!(Cli::try_parse_from(["agenda", "bench", "--requests", too_many.as_str()]).is_err());
        assert!(Cli::try_parse_from(["agenda", "bench", "--requests", "0"]).is_err());
    }

    #[test]
    fn test_cli_parses_invalidate() {
        let cli = Cli::try_parse_from(["agenda", "-v", "invalidate", "--prefix", "staff:"]).unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Invalidate { prefix } => assert_eq!(prefix.as_deref(), Some("staff:")),
            _ => panic!("expected invalidate"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_bench_runs() {
        let args = BenchArgs {
            keys: 3,
            requests: 30,
            latency_ms: 10,
            ttl_ms: None,
            failure_rate: 0.0,
            seed: 1,
            json: true,
        };
        cmd_bench(args, CacheConfig::default()).await.unwrap();
    }

    #[test]
    fn test_invalidate_runs() {
        cmd_invalidate(Some("booking:"), CacheConfig::default()).unwrap();
        cmd_invalidate(None, CacheConfig::default()).unwrap();
    }
}
