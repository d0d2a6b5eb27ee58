//! Who may use the load API.

use std::collections::HashMap;
use std::fmt;

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use thiserror::Error;

use crate::config::AuthConfig;

/// Caller identity established by a [`PermissionGate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    Anonymous,
    Named(String),
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::Anonymous => f.write_str("anonymous"),
            Actor::Named(id) => f.write_str(id),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PermissionError {
    #[error("missing bearer token")]
    MissingToken,
    #[error("unknown bearer token")]
    UnknownToken,
}

/// Decides whether a request may create or inspect load jobs.
pub trait PermissionGate: Send + Sync {
    fn check(&self, headers: &HeaderMap) -> Result<Actor, PermissionError>;
}

/// Bearer-token gate. With no tokens configured every caller is allowed.
#[derive(Debug, Clone, Default)]
pub struct TokenGate {
    /// token -> actor id
    tokens: HashMap<String, String>,
}

impl TokenGate {
    /// Gate that lets everyone through.
    pub fn open() -> Self {
        Self::default()
    }

    pub fn from_config(auth: Option<&AuthConfig>) -> Self {
        let mut gate = Self::open();
        if let Some(auth) = auth {
            for (actor, token) in &auth.tokens {
                gate = gate.with_token(actor, token);
            }
        }
        gate
    }

    pub fn with_token(mut self, actor: impl Into<String>, token: impl Into<String>) -> Self {
        self.tokens.insert(token.into(), actor.into());
        self
    }

    pub fn is_open(&self) -> bool {
        self.tokens.is_empty()
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

impl PermissionGate for TokenGate {
    fn check(&self, headers: &HeaderMap) -> Result<Actor, PermissionError> {
        if self.is_open() {
            return Ok(Actor::Anonymous);
        }
        let token = bearer_token(headers).ok_or(PermissionError::MissingToken)?;
        self.tokens
            .get(token)
            .map(|actor| Actor::Named(actor.clone()))
            .ok_or(PermissionError::UnknownToken)
    }
}
