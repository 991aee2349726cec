use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

/// Resource class a download token grants access to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "snake_case")]
pub enum TokenResource {
    Backup,
    File,
    Export,
}

impl TokenResource {
    /// Per-resource-type reuse policy. Backup archives are large and
    /// downloads may be resumed, so their tokens stay valid until expiry
    /// without ever being marked used. File and export tokens are strictly
    /// single-use.
    pub fn allows_multi_use(&self) -> bool {
        matches!(self, TokenResource::Backup)
    }
}

impl Display for TokenResource {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            TokenResource::Backup => write!(f, "backup"),
            TokenResource::File => write!(f, "file"),
            TokenResource::Export => write!(f, "export"),
        }
    }
}

impl FromStr for TokenResource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "backup" => Ok(TokenResource::Backup),
            "file" => Ok(TokenResource::File),
            "export" => Ok(TokenResource::Export),
            _ => Err(anyhow::anyhow!("Invalid token resource type: {}", s)),
        }
    }
}

/// A persisted download token: a short-lived bearer capability for one
/// file. The token string itself is the primary key; it is high-entropy
/// and never logged.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DownloadToken {
    pub token: String,
    pub user_id: Uuid,
    pub resource_type: TokenResource,
    pub resource_id: Uuid,
    pub file_path: String,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl DownloadToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// What a successful validate-and-consume hands back to the caller.
    pub fn payload(&self) -> TokenPayload {
        TokenPayload {
            user_id: self.user_id,
            resource_type: self.resource_type,
            resource_id: self.resource_id,
            file_path: self.file_path.clone(),
        }
    }
}

/// The authorization payload carried by a valid token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPayload {
    pub user_id: Uuid,
    pub resource_type: TokenResource,
    pub resource_id: Uuid,
    pub file_path: String,
}

/// Result of minting a token: the secret value, its expiry, and the
/// download URL it is redeemable at.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub download_url: String,
}
