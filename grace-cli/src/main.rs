//! Grace CLI
//!
//! Command-line interface for locating views through the reload-aware cache.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use grace_core::error::Result as GraceResult;
use grace_core::traits::PageResolver;
use grace_core::types::{CacheKey, PageSource};
use grace_views::{CachingPageLocator, ConventionPageResolver, LocatorConfig};

/// Grace - cached view resolution
#[derive(Parser)]
#[command(name = "grace")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Locate views under one or more application roots
    Locate {
        /// View paths to look up (relative paths use --controller)
        #[arg(required = true)]
        views: Vec<String>,
        /// Application root containing views/ and plugins/ (repeatable)
        #[arg(short, long, required = true)]
        root: Vec<PathBuf>,
        /// Plugin namespace to search first
        #[arg(short, long)]
        namespace: Option<String>,
        /// Controller the views belong to
        #[arg(short, long)]
        controller: Option<String>,
        /// Treat the names as templates (partial views)
        #[arg(short, long)]
        template: bool,
        /// Precompiled page as URI=TYPE (repeatable)
        #[arg(long, value_name = "URI=TYPE")]
        precompiled: Vec<String>,
        /// Locator configuration file (JSON)
        #[arg(long, env = "GRACE_VIEWS_CONFIG")]
        config: Option<PathBuf>,
        /// Cache timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<i64>,
        /// Disable reloading; resolve every view once
        #[arg(long)]
        no_reload: bool,
        /// Look each view up this many times
        #[arg(long, default_value = "1")]
        repeat: usize,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Measure single-flight behavior against a slow resolver
    Bench {
        /// Concurrent threads
        #[arg(short, long, default_value = "8")]
        threads: usize,
        /// Lookups per thread
        #[arg(short, long, default_value = "200")]
        rounds: usize,
        /// Distinct views looked up
        #[arg(short, long, default_value = "16")]
        keys: usize,
        /// Resolver latency in milliseconds
        #[arg(short, long, default_value = "20")]
        delay_ms: u64,
        /// Cache timeout in milliseconds
        #[arg(long, default_value = "50")]
        timeout_ms: i64,
        /// Serve stale lookups while a refresh runs
        #[arg(long)]
        stale: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "grace=debug,info"
    } else {
        "grace=info,warn"
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Locate {
            views,
            root,
            namespace,
            controller,
            template,
            precompiled,
            config,
            timeout_ms,
            no_reload,
            repeat,
            json,
        } => {
            let config = load_config(config, timeout_ms, no_reload)?;
            let request = LocateRequest {
                namespace: namespace.as_deref(),
                controller: controller.as_deref(),
                template,
                repeat,
                json,
            };
            cmd_locate(&views, root, &precompiled, config, &request)
        }
        Commands::Bench {
            threads,
            rounds,
            keys,
            delay_ms,
            timeout_ms,
            stale,
        } => cmd_bench(threads, rounds, keys, delay_ms, timeout_ms, stale),
    }
}

/// File (or defaults), then environment, then flags.
fn load_config(path: Option<PathBuf>, timeout_ms: Option<i64>, no_reload: bool) -> Result<LocatorConfig> {
    let base = match path {
        Some(path) => LocatorConfig::from_json_file(&path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => LocatorConfig::default(),
    };
    let mut config = base.with_env().context("Invalid environment configuration")?;
    if let Some(timeout) = timeout_ms {
        config.cache_timeout_millis = timeout;
    }
    if no_reload {
        config.reload_enabled = false;
    }
    debug!(?config, "locator configuration");
    Ok(config)
}

struct LocateRequest<'a> {
    namespace: Option<&'a str>,
    controller: Option<&'a str>,
    template: bool,
    repeat: usize,
    json: bool,
}

/// Locate views
fn cmd_locate(
    views: &[String],
    roots: Vec<PathBuf>,
    precompiled: &[String],
    config: LocatorConfig,
    request: &LocateRequest<'_>,
) -> Result<()> {
    let resolver = roots
        .into_iter()
        .fold(ConventionPageResolver::new(), |r, root| r.with_root(root));
    for spec in precompiled {
        let Some((uri, type_name)) = spec.split_once('=') else {
            bail!("Invalid --precompiled '{}': expected URI=TYPE", spec);
        };
        resolver
            .register_precompiled(uri, request.namespace, type_name)
            .with_context(|| format!("Invalid precompiled page '{}'", uri))?;
    }

    let locator = CachingPageLocator::new(resolver, config);
    let mut results = Vec::with_capacity(views.len());

    for view in views {
        let mut page = None;
        for _ in 0..request.repeat.max(1) {
            let found = if request.template {
                locator.find_template(request.controller, view, request.namespace)
            } else {
                locator.find_view(request.controller, view, request.namespace)
            };
            page = found.with_context(|| format!("Failed to locate '{}'", view))?;
        }
        results.push((view.as_str(), page));
    }

    let stats = locator.stats();
    if request.json {
        let found: Vec<_> = results
            .iter()
            .map(|(view, page)| serde_json::json!({ "view": view, "page": page }))
            .collect();
        let out = serde_json::json!({ "results": found, "stats": stats });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    for (view, page) in &results {
        match page {
            Some(PageSource::Precompiled { uri, type_name }) => {
                println!("{} {} -> {} {}", "✓".green(), view, uri, format!("[{}]", type_name).dimmed());
            }
            Some(PageSource::Resource { path, .. }) => {
                println!("{} {} -> {}", "✓".green(), view, path.display());
            }
            None => println!("{} {} {}", "✗".red(), view, "not found".yellow()),
        }
    }

    println!("\n{}", "Cache:".cyan().bold());
    println!("   {} {}", "Entries:".dimmed(), stats.entries);
    println!("   {} {}", "Resolutions:".dimmed(), stats.computations);
    println!("   {} {}", "Hits:".dimmed(), stats.hits());
    if stats.failures > 0 {
        println!("   {} {}", "Failures:".red(), stats.failures);
    }

    Ok(())
}

/// Resolver that sleeps, then answers with a precomputed resource page.
struct SlowResolver {
    delay: Duration,
    calls: AtomicUsize,
}

impl PageResolver for SlowResolver {
    fn resolve(&self, key: &CacheKey) -> GraceResult<Option<PageSource>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        thread::sleep(self.delay);
        let uri = key.path().unwrap_or_default().to_string();
        Ok(Some(PageSource::Resource {
            path: PathBuf::from(format!("/bench/views{}", uri)),
            uri,
            last_modified_millis: 1,
        }))
    }
}

/// Total lookups a benchmark run performs.
fn bench_lookups(threads: usize, rounds: usize) -> Result<usize> {
    if threads == 0 || rounds == 0 {
        bail!("--threads and --rounds must be positive");
    }
    match threads.checked_mul(rounds) {
        Some(total) => Ok(total),
        None => bail!("--threads x --rounds overflows ({} x {})", threads, rounds),
    }
}

/// Run the single-flight benchmark
fn cmd_bench(
    threads: usize,
    rounds: usize,
    keys: usize,
    delay_ms: u64,
    timeout_ms: i64,
    stale: bool,
) -> Result<()> {
    if keys == 0 {
        bail!("--keys must be positive");
    }
    let lookups = bench_lookups(threads, rounds)?;

    println!(
        "{} {} threads x {} lookups over {} views",
        "📊 Benchmarking".cyan().bold(),
        threads,
        rounds,
        keys
    );

    let resolver = Arc::new(SlowResolver {
        delay: Duration::from_millis(delay_ms),
        calls: AtomicUsize::new(0),
    });
    let config = LocatorConfig {
        reload_enabled: true,
        cache_timeout_millis: timeout_ms,
        tolerate_stale: stale,
    };
    let locator = CachingPageLocator::new(Arc::clone(&resolver), config);

    let pb = ProgressBar::new(lookups as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("   [{bar:40.cyan/blue}] {pos}/{len}")?
            .progress_chars("#>-"),
    );

    let start = Instant::now();
    thread::scope(|scope| -> Result<()> {
        let workers: Vec<_> = (0..threads)
            .map(|t| {
                let locator = &locator;
                let pb = pb.clone();
                scope.spawn(move || -> GraceResult<()> {
                    for i in 0..rounds {
                        let uri = format!("/bench/view{}", (t + i) % keys);
                        locator.find_page(&uri, None)?;
                        pb.inc(1);
                    }
                    Ok(())
                })
            })
            .collect();
        for worker in workers {
            match worker.join() {
                Ok(result) => result.context("Lookup failed")?,
                Err(_) => bail!("Benchmark worker panicked"),
            }
        }
        Ok(())
    })?;
    pb.finish();
    let elapsed = start.elapsed();

    let calls = resolver.calls.load(Ordering::Relaxed);
    let stats = locator.stats();

    println!("\n{}", "📈 Results:".green().bold());
    println!("   Lookups: {}", lookups);
    println!("   Resolver calls: {}", calls);
    println!(
        "   Fresh: {}  Stale: {}  Coalesced: {}",
        stats.fresh_hits, stats.stale_hits, stats.coalesced
    );
    println!("   Elapsed: {:?}", elapsed);
    println!(
        "   Throughput: {:.0} lookups/sec",
        lookups as f64 / elapsed.as_secs_f64()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bench_lookups() {
        assert_eq!(bench_lookups(8, 200).unwrap(), 1_600);
        assert!(bench_lookups(0, 200).is_err());
        assert!(bench_lookups(usize::MAX, 2).is_err());
    }
}
