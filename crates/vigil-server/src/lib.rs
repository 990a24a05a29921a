//! HTTP front end and ingest plumbing for Vigil.
//!
//! Serves the [`vigil_api`] query router behind HTTP Basic auth, and provides
//! the file collectors that feed the engine's intake queue.

pub mod auth;
pub mod collect;
pub mod error;

pub use error::Error;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Json, Router,
  extract::Request,
  middleware::{self, Next},
  response::Response,
  routing::get,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;
use vigil_core::store::EventStore;
use vigil_engine::{EngineConfig, worker};

use auth::{AuthConfig, Authenticated};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime configuration, deserialised from `vigil.toml` and `VIGIL_*`
/// environment variables.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
  pub host:               String,
  pub port:               u16,
  pub store_path:         PathBuf,
  /// Required by `serve` only.
  pub auth_username:      Option<String>,
  pub auth_password_hash: Option<String>,
  /// Depth of the queue between collectors and the worker.
  pub queue_capacity:     usize,
  pub engine:             EngineConfig,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:               "127.0.0.1".to_string(),
      port:               8470,
      store_path:         PathBuf::from("~/.local/share/vigil/vigil.db"),
      auth_username:      None,
      auth_password_hash: None,
      queue_capacity:     worker::DEFAULT_CAPACITY,
      engine:             EngineConfig::default(),
    }
  }
}

impl ServerConfig {
  /// The configured credentials, if both halves are present.
  pub fn auth(&self) -> Option<AuthConfig> {
    Some(AuthConfig {
      username:      self.auth_username.clone()?,
      password_hash: self.auth_password_hash.clone()?,
    })
  }
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state for the auth layer.
pub struct AppState<S> {
  pub store: Arc<S>,
  pub auth:  Arc<AuthConfig>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self { store: self.store.clone(), auth: self.auth.clone() }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the full HTTP router: `/health` is open, everything under `/api`
/// requires Basic auth.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: EventStore + 'static,
{
  let api = vigil_api::api_router(state.store.clone())
    .route_layer(middleware::from_fn_with_state(state, require_auth));

  Router::new()
    .route("/health", get(health))
    .nest("/api", api)
    .layer(TraceLayer::new_for_http())
}

async fn require_auth(_: Authenticated, req: Request, next: Next) -> Response {
  next.run(req).await
}

async fn health() -> Json<Value> { Json(json!({ "status": "ok" })) }

// ─── Integration tests ────────────────────────────────────────────────────────
