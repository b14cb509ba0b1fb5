mod cache;
mod config;
mod error;
mod fetch;
mod worker;

#[cfg(test)]
mod testing;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{ArgAction, Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::cache::{CacheStore, SqliteStore};
use crate::config::Config;
use crate::fetch::{HttpFetcher, Request};
use crate::worker::ServiceHost;

#[derive(Parser, Debug)]
#[command(name = "shellcache")]
#[command(about = "Offline cache for a web app shell")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/shellcache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Increase log verbosity (-v info, -vv debug, -vvv trace)
  #[arg(short, long, action = ArgAction::Count)]
  verbose: u8,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Fetch the configured assets into a new cache generation
  Install,
  /// Activate the configured version, purging every other generation
  Activate,
  /// Send one request through the cache and write the body to stdout
  Fetch {
    /// Path relative to the origin, or an absolute URL
    path: String,
    /// Treat the request as a top-level navigation (always GET)
    #[arg(long, conflicts_with_all = ["method", "data"])]
    navigate: bool,
    /// HTTP method
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
    /// Request body
    #[arg(short, long)]
    data: Option<String>,
  },
  /// List cache generations and their entries
  Status,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;
  let _log_guard = init_logging(args.verbose, config.log_dir.as_deref())?;

  let store = Arc::new(SqliteStore::open(config.cache_path.as_deref())?);
  let fetcher = Arc::new(HttpFetcher::new(&config.network)?);
  let host = ServiceHost::new(store, fetcher);

  match args.command {
    Command::Install => install(&host, &config).await,
    Command::Activate => activate(&host, &config).await,
    Command::Fetch {
      path,
      navigate,
      method,
      data,
    } => fetch(&host, &config, &path, navigate, &method, data).await,
    Command::Status => status(host.store(), &config),
  }
}

/// Log to stderr, and to a daily file when a log directory is configured.
fn init_logging(verbose: u8, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
  let level = match verbose {
    0 => "warn",
    1 => "info",
    2 => "debug",
    _ => "trace",
  };
  let filter = EnvFilter::try_from_default_env()
    .unwrap_or_else(|_| EnvFilter::new(format!("shellcache={}", level)));
  let stderr = fmt::layer().with_writer(std::io::stderr);

  let Some(dir) = log_dir else {
    tracing_subscriber::registry()
      .with(filter)
      .with(stderr)
      .try_init()
      .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;
    return Ok(None);
  };

  std::fs::create_dir_all(dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;
  let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(
    dir,
    "shellcache.log",
  ));

  tracing_subscriber::registry()
    .with(filter)
    .with(stderr)
    .with(fmt::layer().with_ansi(false).with_writer(writer))
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  Ok(Some(guard))
}

type Host = ServiceHost<SqliteStore, HttpFetcher>;

async fn install(host: &Host, config: &Config) -> Result<()> {
  let worker_config = config.worker_config()?;
  host.resume_previous(&worker_config).await?;

  let worker = host.register(worker_config).await?;
  println!(
    "{}: {} assets cached, {}",
    worker.version(),
    worker.config().manifest.len(),
    worker.state()
  );
  if host.waiting().is_some() {
    println!("run `shellcache activate` to take over from the previous version");
  }
  Ok(())
}

async fn activate(host: &Host, config: &Config) -> Result<()> {
  let worker = host.start(config.worker_config()?).await?;
  // start() leaves a new version waiting when skip_waiting is off
  host.promote().await?;
  println!("{}: {}", worker.version(), worker.state());
  Ok(())
}

async fn fetch(
  host: &Host,
  config: &Config,
  path: &str,
  navigate: bool,
  method: &str,
  data: Option<String>,
) -> Result<()> {
  let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
    .map_err(|e| eyre!("Invalid method {}: {}", method, e))?;
  let url = config.resolve(path)?;
  let mut request = if navigate {
    Request::navigate(url)
  } else {
    Request::new(method, url)
  };
  if let Some(data) = data {
    request = request.with_body(data);
  }

  // Serving must not depend on registration succeeding
  if let Err(e) = host.start(config.worker_config()?).await {
    warn!(error = %e, "Interceptor unavailable, fetching without cache");
  }

  let result = host.handle_fetch(&request).await;
  host.settle().await;
  let served = result?;

  info!(
    url = %request.url,
    status = served.data.status,
    source = served.source.as_str(),
    cached_at = ?served.cached_at,
    content_type = ?served.data.header("content-type"),
    "Request served"
  );
  let mut stdout = std::io::stdout().lock();
  stdout
    .write_all(&served.data.body)
    .and_then(|_| stdout.flush())
    .map_err(|e| eyre!("Failed to write response body: {}", e))?;
  Ok(())
}

fn status(store: &SqliteStore, config: &Config) -> Result<()> {
  let generations = store.list_generations()?;
  if generations.is_empty() {
    println!("no cache generations");
    return Ok(());
  }

  for generation in generations {
    let marker = if generation == config.version { "*" } else { " " };
    let keys = store.keys(&generation)?;
    println!("{} {} ({} entries)", marker, generation, keys.len());
    for key in keys {
      println!("    {}", key);
    }
  }
  Ok(())
}
