//! HTTP Basic auth for the API routes.
//!
//! One operator account, configured as a username plus an argon2 PHC hash.

use argon2::{
  Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
  password_hash::{self, SaltString},
};
use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, header, request::Parts},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use rand_core::OsRng;
use vigil_core::store::EventStore;

use crate::{AppState, error::Error};

/// The operator account.
#[derive(Clone)]
pub struct AuthConfig {
  pub username:      String,
  /// PHC string produced by argon2, e.g. `$argon2id$v=19$…`
  pub password_hash: String,
}

impl AuthConfig {
  /// Whether `username`/`password` match this account. A malformed stored
  /// hash never matches.
  pub fn verify(&self, username: &str, password: &str) -> bool {
    if username != self.username {
      return false;
    }
    let Ok(hash) = PasswordHash::new(&self.password_hash) else {
      tracing::error!("auth_password_hash is not a valid PHC string");
      return false;
    };
    Argon2::default()
      .verify_password(password.as_bytes(), &hash)
      .is_ok()
  }
}

/// Produce the PHC string to put in `auth_password_hash`.
pub fn hash_password(password: &str) -> Result<String, password_hash::Error> {
  let salt = SaltString::generate(&mut OsRng);
  Ok(
    Argon2::default()
      .hash_password(password.as_bytes(), &salt)?
      .to_string(),
  )
}

/// Decode `Authorization: Basic …` into `(username, password)`.
fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
  let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
  let decoded = B64.decode(value.strip_prefix("Basic ")?).ok()?;
  let decoded = String::from_utf8(decoded).ok()?;
  let (username, password) = decoded.split_once(':')?;
  Some((username.to_owned(), password.to_owned()))
}

pub fn verify_auth(headers: &HeaderMap, config: &AuthConfig) -> Result<(), Error> {
  match basic_credentials(headers) {
    Some((username, password)) if config.verify(&username, &password) => Ok(()),
    Some((username, _)) => {
      tracing::warn!(%username, "rejected credentials");
      Err(Error::Unauthorized)
    }
    None => Err(Error::Unauthorized),
  }
}

/// Extracting this proves the request carried valid credentials.
pub struct Authenticated;

impl<S> FromRequestParts<AppState<S>> for Authenticated
where
  S: EventStore + 'static,
{
  type Rejection = Error;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    verify_auth(&parts.headers, &state.auth).map(|()| Authenticated)
  }
}
