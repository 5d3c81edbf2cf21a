//! Credential lookup for target music platforms.
//!
//! Tokens are written by the account-linking flow elsewhere in the product;
//! this module only reads them and rejects anything missing or expired.

use async_trait::async_trait;
use bridge_traits::{
    platform::MusicPlatform,
    time::{Clock, SystemClock},
};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::error::{AuthError, Result};
use crate::types::{AccessToken, UserId};

/// Source of valid platform access tokens.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Return a usable token for `user_id` on `platform`.
    ///
    /// # Errors
    ///
    /// - [`AuthError::NotAuthenticated`] when the user never linked the platform
    /// - [`AuthError::TokenExpired`] when the stored token is no longer valid
    /// - [`AuthError::Storage`] when the backing store cannot be read
    async fn get_valid_access_token(
        &self,
        user_id: &UserId,
        platform: MusicPlatform,
    ) -> Result<AccessToken>;
}

/// SQLite-backed credential provider reading `platform_credentials`.
pub struct SqliteCredentialProvider {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

#[derive(sqlx::FromRow)]
struct CredentialRow {
    access_token: String,
    expires_at: Option<i64>,
}

impl SqliteCredentialProvider {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock))
    }

    pub fn with_clock(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    /// Store or replace a token. Used by account linking and by tests.
    pub async fn store_token(
        &self,
        user_id: &UserId,
        platform: MusicPlatform,
        token: &AccessToken,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO platform_credentials (user_id, platform, access_token, expires_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(user_id, platform) DO UPDATE SET
                access_token = excluded.access_token,
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id.to_string())
        .bind(platform.as_str())
        .bind(token.secret())
        .bind(token.expires_at().map(|t| t.timestamp()))
        .bind(self.clock.unix_timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| AuthError::Storage(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl CredentialProvider for SqliteCredentialProvider {
    #[instrument(skip(self), fields(user_id = %user_id, platform = %platform))]
    async fn get_valid_access_token(
        &self,
        user_id: &UserId,
        platform: MusicPlatform,
    ) -> Result<AccessToken> {
        let row: Option<CredentialRow> = sqlx::query_as(
            "SELECT access_token, expires_at FROM platform_credentials WHERE user_id = ? AND platform = ?",
        )
        .bind(user_id.to_string())
        .bind(platform.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AuthError::Storage(e.to_string()))?;

        let row = row.ok_or_else(|| {
            warn!("No stored credentials");
            AuthError::NotAuthenticated {
                user_id: user_id.to_string(),
                platform: platform.display_name().to_string(),
            }
        })?;

        let expires_at = row
            .expires_at
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0));
        let token = AccessToken::new(row.access_token, expires_at);

        if token.is_expired_at(self.clock.now()) {
            warn!(expires_at = ?expires_at, "Stored access token has expired");
            return Err(AuthError::TokenExpired {
                user_id: user_id.to_string(),
                platform: platform.display_name().to_string(),
                expires_at: expires_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
            });
        }

        debug!("Access token loaded");
        Ok(token)
    }
}
