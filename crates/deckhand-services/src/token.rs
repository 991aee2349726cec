//! Download token broker.
//!
//! Issues short-lived, high-entropy bearer tokens that authorize one file
//! download without placing long-lived credentials in a URL, and consumes
//! them atomically through the token store. Token values are never
//! logged; log lines carry an 8-character prefix at most.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use uuid::Uuid;

use deckhand_core::models::{DownloadToken, IssuedToken, TokenPayload, TokenResource};
use deckhand_core::{AppError, TokenStore};

/// Tokens are 32 random bytes, hex encoded.
pub const TOKEN_LEN: usize = 64;

pub struct DownloadTokenBroker {
    store: Arc<dyn TokenStore>,
    default_ttl: Duration,
}

impl DownloadTokenBroker {
    pub fn new(store: Arc<dyn TokenStore>, default_ttl: Duration) -> Self {
        Self { store, default_ttl }
    }

    /// Mint and persist a token for one resource. `ttl` falls back to the
    /// broker default when absent.
    pub async fn issue(
        &self,
        user_id: Uuid,
        resource_type: TokenResource,
        resource_id: Uuid,
        file_path: &str,
        ttl: Option<Duration>,
    ) -> Result<IssuedToken, AppError> {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let now = Utc::now();
        let expires_at = now
            + chrono::Duration::from_std(ttl)
                .map_err(|e| AppError::Internal(format!("Invalid token TTL: {}", e)))?;

        let token = DownloadToken {
            token: generate_token(),
            user_id,
            resource_type,
            resource_id,
            file_path: file_path.to_string(),
            expires_at,
            used: false,
            used_at: None,
            created_at: now,
        };

        self.store.insert(&token).await?;

        tracing::info!(
            user_id = %user_id,
            resource_type = %resource_type,
            resource_id = %resource_id,
            token_prefix = %&token.token[..8],
            "Download token issued"
        );

        Ok(IssuedToken {
            download_url: download_url(&token.token),
            expires_at,
            token: token.token,
        })
    }

    /// Validate and consume in one atomic unit. Returns the payload for a
    /// valid token, None for anything else (unknown, expired, used).
    /// Malformed values are rejected before the store is touched.
    pub async fn validate_and_consume(
        &self,
        token: &str,
        allow_multi_use: bool,
    ) -> Result<Option<TokenPayload>, AppError> {
        if !is_well_formed(token) {
            tracing::debug!("Rejected malformed download token");
            return Ok(None);
        }

        let consumed = self
            .store
            .consume(token, allow_multi_use, Utc::now())
            .await?;

        match consumed {
            Some(row) => {
                tracing::info!(
                    user_id = %row.user_id,
                    resource_type = %row.resource_type,
                    resource_id = %row.resource_id,
                    token_prefix = %&token[..8],
                    "Download token accepted"
                );
                Ok(Some(row.payload()))
            }
            None => {
                tracing::debug!(token_prefix = %&token[..8], "Download token rejected");
                Ok(None)
            }
        }
    }

    /// Bulk revocation when a user session is invalidated.
    pub async fn revoke_for_user(&self, user_id: Uuid) -> Result<u64, AppError> {
        let revoked = self.store.delete_for_user(user_id).await?;
        if revoked > 0 {
            tracing::info!(user_id = %user_id, revoked, "Revoked download tokens for user");
        }
        Ok(revoked)
    }

    /// Bulk revocation when a resource is deleted.
    pub async fn revoke_for_resource(
        &self,
        resource_type: TokenResource,
        resource_id: Uuid,
    ) -> Result<u64, AppError> {
        let revoked = self
            .store
            .delete_for_resource(resource_type, resource_id)
            .await?;
        if revoked > 0 {
            tracing::info!(
                resource_type = %resource_type,
                resource_id = %resource_id,
                revoked,
                "Revoked download tokens for resource"
            );
        }
        Ok(revoked)
    }

    /// Delete expired tokens and used tokens older than `used_retention`.
    pub async fn sweep(&self, used_retention: Duration) -> Result<u64, AppError> {
        let now = Utc::now();
        let cutoff = now
            - chrono::Duration::from_std(used_retention)
                .map_err(|e| AppError::Internal(format!("Invalid retention window: {}", e)))?;
        self.store.delete_stale(now, cutoff).await
    }
}

/// `/backups/download/{token}` - the single-use-by-default capability URL.
pub fn download_url(token: &str) -> String {
    format!("/backups/download/{}", token)
}

fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: Vec<u8> = (0..TOKEN_LEN / 2).map(|_| rng.random()).collect();
    hex::encode(bytes)
}

/// Cheap shape check before any storage round trip: exact length, all
/// lowercase hex.
fn is_well_formed(token: &str) -> bool {
    token.len() == TOKEN_LEN
        && token
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
