//! Request identity and role checks.
//!
//! Identities come from bearer tokens configured in `AUTH_TOKENS`
//! (`user_id:ROLE:token`, comma separated). Tokens are compared in
//! constant time.

use anyhow::{bail, Result};
use axum::http::{header, HeaderMap};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use subtle::ConstantTimeEq;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Moderator,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Moderator => "MODERATOR",
            Role::Admin => "ADMIN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "USER" => Ok(Role::User),
            "MODERATOR" => Ok(Role::Moderator),
            "ADMIN" => Ok(Role::Admin),
            other => bail!("Unknown role: '{}'", other),
        }
    }
}

/// The authenticated caller of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: String,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Unauthorized")]
    Unauthenticated,

    #[error("Forbidden - Admin access required")]
    Forbidden,
}

/// Resolves the caller of a request from its headers.
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, headers: &HeaderMap) -> Option<Identity>;
}

/// Require an identity holding exactly `role`.
pub fn require_role(identity: Option<Identity>, role: Role) -> Result<Identity, AuthError> {
    let identity = identity.ok_or(AuthError::Unauthenticated)?;
    if identity.role != role {
        return Err(AuthError::Forbidden);
    }
    Ok(identity)
}

/// Constant-time string comparison for bearer tokens
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[derive(Debug, Clone)]
struct TokenEntry {
    token: String,
    identity: Identity,
}

/// Static bearer-token table.
#[derive(Debug, Clone, Default)]
pub struct TokenResolver {
    entries: Vec<TokenEntry>,
}

impl TokenResolver {
    /// Parse `user_id:ROLE:token` entries. Any malformed entry fails the
    /// whole table so a typo cannot silently lock someone out.
    pub fn from_entries(entries: &[String]) -> Result<Self> {
        let mut parsed = Vec::with_capacity(entries.len());

        for raw in entries {
            let mut parts = raw.splitn(3, ':');
            let (user_id, role, token) = match (parts.next(), parts.next(), parts.next()) {
                (Some(user_id), Some(role), Some(token))
                    if !user_id.is_empty() && !token.is_empty() =>
                {
                    (user_id, role, token)
                }
                _ => bail!("Invalid AUTH_TOKENS entry (expected user_id:ROLE:token)"),
            };

            parsed.push(TokenEntry {
                token: token.to_string(),
                identity: Identity {
                    user_id: user_id.to_string(),
                    role: role.parse()?,
                },
            });
        }

        Ok(Self { entries: parsed })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lookup(&self, token: &str) -> Option<Identity> {
        // Check every entry so timing does not reveal the match position
        let mut found = None;
        for entry in &self.entries {
            if constant_time_compare(&entry.token, token) && found.is_none() {
                found = Some(entry.identity.clone());
            }
        }
        found
    }
}

impl IdentityResolver for TokenResolver {
    fn resolve(&self, headers: &HeaderMap) -> Option<Identity> {
        let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
        let token = value.strip_prefix("Bearer ")?.trim();
        if token.is_empty() {
            return None;
        }
        self.lookup(token)
    }
}
