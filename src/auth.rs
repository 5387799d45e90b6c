//! # Channel Authentication
//!
//! Identity verification at channel acceptance. The streaming endpoint takes
//! the credential out-of-band (a `token` query parameter on the upgrade
//! request) and resolves it to a principal before any audio is accepted; a
//! session never observes an unverified peer.
//!
//! ## Close Codes:
//! Rejections map to distinct WebSocket close codes so the peer can tell
//! auth failure apart from runtime failure:
//! - `4401`: no credential supplied
//! - `4403`: credential does not resolve to a known principal
//! - `4423`: principal exists but is inactive

use crate::config::AuthConfig;
use std::collections::HashMap;
use std::fmt;

/// Close code for a missing credential.
pub const CLOSE_MISSING_CREDENTIAL: u16 = 4401;
/// Close code for an unknown or invalid credential.
pub const CLOSE_INVALID_IDENTITY: u16 = 4403;
/// Close code for a valid credential bound to an inactive principal.
pub const CLOSE_INACTIVE_PRINCIPAL: u16 = 4423;

/// Verified principal, set once at channel acceptance and immutable for the
/// session's lifetime.
#[derive(Debug, Clone)]
pub struct Identity {
    pub principal: String,
}

/// Why a credential was rejected. Always fatal: the channel never becomes
/// active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    MissingToken,
    InvalidToken,
    InactivePrincipal,
}

impl AuthError {
    pub fn close_code(&self) -> u16 {
        match self {
            AuthError::MissingToken => CLOSE_MISSING_CREDENTIAL,
            AuthError::InvalidToken => CLOSE_INVALID_IDENTITY,
            AuthError::InactivePrincipal => CLOSE_INACTIVE_PRINCIPAL,
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::MissingToken => write!(f, "missing credential"),
            AuthError::InvalidToken => write!(f, "invalid identity"),
            AuthError::InactivePrincipal => write!(f, "inactive principal"),
        }
    }
}

impl std::error::Error for AuthError {}

/// Resolves a raw credential into a verified [`Identity`].
///
/// The identity store behind this is out of scope for the streaming core;
/// implementations only promise that a returned identity is active.
pub trait IdentityVerifier: Send + Sync {
    fn verify(&self, token: Option<&str>) -> Result<Identity, AuthError>;
}

struct TokenEntry {
    principal: String,
    active: bool,
}

/// Verifier backed by the static token table in the configuration file.
pub struct ConfigTokenVerifier {
    tokens: HashMap<String, TokenEntry>,
}

impl ConfigTokenVerifier {
    pub fn new(config: &AuthConfig) -> Self {
        let tokens = config
            .tokens
            .iter()
            .map(|entry| {
                (
                    entry.token.clone(),
                    TokenEntry {
                        principal: entry.principal.clone(),
                        active: entry.active,
                    },
                )
            })
            .collect();
        Self { tokens }
    }
}

impl IdentityVerifier for ConfigTokenVerifier {
    fn verify(&self, token: Option<&str>) -> Result<Identity, AuthError> {
        let token = match token {
            Some(t) if !t.is_empty() => t,
            _ => return Err(AuthError::MissingToken),
        };

        let entry = self.tokens.get(token).ok_or(AuthError::InvalidToken)?;
        if !entry.active {
            return Err(AuthError::InactivePrincipal);
        }

        Ok(Identity {
            principal: entry.principal.clone(),
        })
    }
}
