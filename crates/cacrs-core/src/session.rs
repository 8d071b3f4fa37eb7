//! Identity verification and server-side sessions.
//!
//! Identity tokens are signed JWTs carrying `sub` and `email`. They are
//! verified before a session is issued; the session token handed back to
//! the client is opaque and lives only in this process.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::config::AuthConfig;
use crate::error::{Error, Result};
use crate::models::{User, UserRole, UserStatus};
use crate::store::CaseRepository;

/// Claims required from an identity token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityClaims {
    pub sub: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub exp: u64,
}

/// Verifies identity token signatures and standard claims.
pub struct IdentityVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl IdentityVerifier {
    /// Shared-secret (HS256) verifier.
    pub fn hs256(secret: &[u8], audience: Option<&str>, issuer: Option<&str>) -> Self {
        Self::with_key(
            DecodingKey::from_secret(secret),
            Algorithm::HS256,
            audience,
            issuer,
        )
    }

    /// Public-key (RS256) verifier from a PEM document.
    pub fn rs256_pem(pem: &[u8], audience: Option<&str>, issuer: Option<&str>) -> Result<Self> {
        Ok(Self::with_key(
            DecodingKey::from_rsa_pem(pem)?,
            Algorithm::RS256,
            audience,
            issuer,
        ))
    }

    fn with_key(
        key: DecodingKey,
        algorithm: Algorithm,
        audience: Option<&str>,
        issuer: Option<&str>,
    ) -> Self {
        let mut validation = Validation::new(algorithm);
        validation.set_required_spec_claims(&["exp", "sub"]);
        match audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }
        if let Some(iss) = issuer {
            validation.set_issuer(&[iss]);
        }
        Self { key, validation }
    }

    /// Build the verifier described by the configuration. The public key
    /// takes precedence over the shared secret.
    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        let audience = config.audience.as_deref();
        let issuer = config.issuer.as_deref();
        if let Some(path) = &config.public_key_path {
            let pem = std::fs::read(path)?;
            return Self::rs256_pem(&pem, audience, issuer);
        }
        match std::env::var(&config.secret_env) {
            Ok(secret) if !secret.is_empty() => {
                Ok(Self::hs256(secret.as_bytes(), audience, issuer))
            }
            _ => Err(Error::Config(format!(
                "no identity verification key: set auth.public_key_path or {}",
                config.secret_env
            ))),
        }
    }

    /// Allowed clock skew, in seconds, when checking `exp`.
    #[must_use]
    pub fn with_leeway(mut self, seconds: u64) -> Self {
        self.validation.leeway = seconds;
        self
    }

    pub fn verify(&self, token: &str) -> Result<IdentityClaims> {
        let claims = decode::<IdentityClaims>(token, &self.key, &self.validation)?.claims;
        if claims.sub.trim().is_empty() || claims.email.trim().is_empty() {
            return Err(Error::Auth("identity token lacks subject or email".to_string()));
        }
        Ok(claims)
    }
}

/// An open session. It lasts as long as the identity token it was opened with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: String,
    pub user: User,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Issues and resolves sessions for verified identities.
pub struct SessionManager {
    repo: Arc<dyn CaseRepository>,
    verifier: IdentityVerifier,
    admin_emails: Vec<String>,
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionManager {
    pub fn new(
        repo: Arc<dyn CaseRepository>,
        verifier: IdentityVerifier,
        admin_emails: Vec<String>,
    ) -> Self {
        Self {
            repo,
            verifier,
            admin_emails,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    fn is_admin_email(&self, email: &str) -> bool {
        self.admin_emails
            .iter()
            .any(|admin| admin.eq_ignore_ascii_case(email))
    }

    /// Verify an identity token and open a session for its user.
    ///
    /// Known users keep their role. New users become admin when their email
    /// is listed in the configuration, analyst otherwise.
    pub async fn login(&self, credential: &str) -> Result<Session> {
        let claims = self.verifier.verify(credential.trim())?;
        let expires_at = i64::try_from(claims.exp)
            .ok()
            .and_then(|exp| DateTime::from_timestamp(exp, 0))
            .ok_or_else(|| {
                Error::Auth(format!("identity token exp out of range: {}", claims.exp))
            })?;
        let email = claims.email.trim().to_string();

        let user = match self.repo.find_user_by_email(&email).await? {
            Some(existing) => {
                if existing.status == UserStatus::Blocked {
                    tracing::warn!(email = %email, "Blocked user attempted to sign in");
                    return Err(Error::Auth(format!("account {email} is blocked")));
                }
                existing
            }
            None => {
                let role = if self.is_admin_email(&email) {
                    UserRole::Admin
                } else {
                    UserRole::Analyst
                };
                let user = User {
                    id: claims.sub.clone(),
                    email: email.clone(),
                    role,
                    status: UserStatus::Active,
                };
                self.repo.upsert_user(&user).await?;
                tracing::info!(email = %email, role = role.as_str(), "Registered new user");
                user
            }
        };

        let now = Utc::now();
        let session = Session {
            token: uuid::Uuid::new_v4().to_string(),
            user,
            created_at: now,
            expires_at,
        };
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, open| !open.is_expired(now));
        let pruned = before - sessions.len();
        if pruned > 0 {
            tracing::debug!(pruned, "Dropped expired sessions");
        }
        sessions.insert(session.token.clone(), session.clone());
        drop(sessions);
        tracing::info!(
            user_id = %session.user.id,
            expires_at = %session.expires_at,
            "Session opened"
        );
        Ok(session)
    }

    /// Current user of a session. Role and status are re-read from the
    /// repository; a blocked user or an expired session loses the session.
    pub async fn get(&self, token: &str) -> Result<Option<User>> {
        let Some(session) = self.sessions.read().await.get(token).cloned() else {
            return Ok(None);
        };
        if session.is_expired(Utc::now()) {
            self.sessions.write().await.remove(token);
            tracing::debug!(user_id = %session.user.id, "Session expired");
            return Ok(None);
        }
        let current = self.repo.find_user_by_email(&session.user.email).await?;
        match current {
            Some(user) if user.status == UserStatus::Active => Ok(Some(user)),
            _ => {
                self.sessions.write().await.remove(token);
                Ok(None)
            }
        }
    }

    /// Close a session. Returns whether it existed.
    pub async fn logout(&self, token: &str) -> bool {
        self.sessions.write().await.remove(token).is_some()
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
