//! `vigil` binary: serve the query API, ingest collector output, and apply
//! operator corrections.
//!
//! Reads `vigil.toml` (or the path given with `--config`) layered with
//! `VIGIL_*` environment variables; nested keys use `__`, e.g.
//! `VIGIL_ENGINE__MATCHER__MATCH_THRESHOLD=0.85`.
//!
//! # Password hash generation
//!
//! To generate the argon2 PHC string for `auth_password_hash`:
//!
//! ```text
//! cargo run -p vigil-server --bin vigil -- hash-password
//! ```

use std::{
  io::{BufRead, Write as _},
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;
use vigil_core::{entity::EntityMapping, event::EventStatus, store::EventStore};
use vigil_engine::{Engine, worker};
use vigil_ingest::SourceDescriptor;
use vigil_server::{AppState, ServerConfig, auth, collect};
use vigil_store_sqlite::SqliteStore;

#[derive(Parser)]
#[command(author, version, about = "Vigil incident deduplication engine")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "vigil.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Serve the JSON query API.
  Serve,

  /// Deduplicate JSON-lines collector output into the store.
  Ingest {
    /// Files to read, one collector per file.
    #[arg(required = true)]
    files:       Vec<PathBuf>,
    /// Collector category recorded on every source.
    #[arg(long, default_value = "news")]
    source_type: String,
    /// Confidence used when a payload states none.
    #[arg(long, default_value_t = 0.5)]
    credibility: f64,
  },

  /// Load alias → canonical entity mappings from a JSON array.
  ImportMappings { file: PathBuf },

  /// Move an event forward through active → contained → resolved.
  SetStatus { event_id: Uuid, status: EventStatus },

  /// Correct an event's date.
  CorrectDate { event_id: Uuid, date: NaiveDate },

  /// Print an event's attribute history as JSON.
  History { event_id: Uuid },

  /// Print the argon2 hash for a password entered on stdin and exit.
  HashPassword,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Helper mode: hash a password and exit.
  if let Command::HashPassword = cli.command {
    print!("Password: ");
    std::io::stdout().flush().ok();
    let password = read_password_line(std::io::stdin().lock())?;
    let hash = auth::hash_password(&password)
      .map_err(|e| anyhow::anyhow!("argon2 error: {e}"))?;
    println!("{hash}");
    return Ok(());
  }

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(
      config::Environment::with_prefix("VIGIL")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true),
    )
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  // Expand `~` in store path.
  let store_path = expand_tilde(&server_cfg.store_path);
  if let Some(parent) = store_path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {parent:?}"))?;
  }

  // Open SQLite store.
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  let store = Arc::new(store);

  match cli.command {
    Command::Serve => serve(store, &server_cfg).await,
    Command::Ingest { files, source_type, credibility } => {
      let source = SourceDescriptor {
        credibility,
        ..SourceDescriptor::named(source_type)
      };
      ingest(store, &server_cfg, files, source).await
    }
    Command::ImportMappings { file } => import_mappings(store.as_ref(), &file).await,
    Command::SetStatus { event_id, status } => {
      let engine = Engine::new(store, server_cfg.engine.clone());
      let view = engine
        .transition_status(event_id, status)
        .await
        .with_context(|| format!("failed to set status of {event_id}"))?;
      println!("{}", serde_json::to_string_pretty(&view)?);
      Ok(())
    }
    Command::CorrectDate { event_id, date } => {
      let engine = Engine::new(store, server_cfg.engine.clone());
      let view = engine
        .correct_event_date(event_id, date)
        .await
        .with_context(|| format!("failed to correct date of {event_id}"))?;
      println!("{}", serde_json::to_string_pretty(&view)?);
      Ok(())
    }
    Command::History { event_id } => {
      let entries = store
        .history(event_id)
        .await
        .with_context(|| format!("failed to read history of {event_id}"))?;
      println!("{}", serde_json::to_string_pretty(&entries)?);
      Ok(())
    }
    // Handled before the config is loaded.
    Command::HashPassword => Ok(()),
  }
}

async fn serve(store: Arc<SqliteStore>, cfg: &ServerConfig) -> anyhow::Result<()> {
  let auth = cfg
    .auth()
    .context("`serve` requires auth_username and auth_password_hash")?;
  let state = AppState { store, auth: Arc::new(auth) };

  let app = vigil_server::router(state);
  let address = format!("{}:{}", cfg.host, cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(async {
      tokio::signal::ctrl_c().await.ok();
    })
    .await
    .context("server error")?;

  Ok(())
}

async fn ingest(
  store: Arc<SqliteStore>,
  cfg: &ServerConfig,
  files: Vec<PathBuf>,
  source: SourceDescriptor,
) -> anyhow::Result<()> {
  let cancel = CancellationToken::new();
  tokio::spawn({
    let cancel = cancel.clone();
    async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        tracing::warn!("interrupt received; finishing the current candidate");
        cancel.cancel();
      }
    }
  });

  let (tx, rx) = worker::channel(cfg.queue_capacity);
  let mut collectors = collect::spawn(files, source, tx, cancel.clone());

  let engine = Engine::new(store, cfg.engine.clone());
  let report = worker::Worker::new(engine, rx, cancel)
    .run()
    .await
    .context("ingest aborted")?;

  while let Some(joined) = collectors.join_next().await {
    match joined {
      Ok(Ok(_)) => {}
      Ok(Err(e)) => tracing::error!(error = %e, "collector failed"),
      Err(e) => tracing::error!(error = %e, "collector panicked"),
    }
  }

  println!("{report}");
  for failure in &report.failures {
    println!(
      "failed  {} {} {}",
      failure.candidate,
      failure.url.as_deref().unwrap_or("-"),
      failure.reason
    );
  }
  for advisory in report.advisories() {
    println!("review  {advisory}");
  }
  Ok(())
}

async fn import_mappings(store: &SqliteStore, file: &Path) -> anyhow::Result<()> {
  let text = tokio::fs::read_to_string(file)
    .await
    .with_context(|| format!("failed to read {file:?}"))?;
  let mappings: Vec<EntityMapping> =
    serde_json::from_str(&text).with_context(|| format!("failed to parse {file:?}"))?;

  let count = mappings.len();
  for mapping in mappings {
    store
      .put_entity_mapping(mapping)
      .await
      .context("failed to store mapping")?;
  }
  tracing::info!(count, "imported entity mappings");
  Ok(())
}

/// Read one line as a password. Terminal input is echoed.
fn read_password_line(mut input: impl BufRead) -> anyhow::Result<String> {
  let mut line = String::new();
  input.read_line(&mut line)?;
  Ok(
    line
      .trim_end_matches('\n')
      .trim_end_matches('\r')
      .to_string(),
  )
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
