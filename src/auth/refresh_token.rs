/// Refresh Token Management
///
/// Refresh tokens are:
/// - 32 bytes from the OS random source, URL-safe base64 encoded
/// - Kept only as a SHA-256 digest (the plaintext goes to the client)
/// - Single-use: a successful redemption deletes the record
/// - One per account: issuing a new token replaces the previous one
///
/// Every operation runs under one mutex guarding the whole map, so a
/// redemption's check-and-delete is atomic with respect to concurrent
/// redemptions and issuances.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::account::AccountId;
use crate::auth::password::constant_time_eq;
use crate::error::TokenError;

const REFRESH_TOKEN_BYTES: usize = 32;

/// Generate a new refresh token (43 URL-safe characters)
pub fn generate_refresh_token() -> Result<String, TokenError> {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    OsRng.try_fill_bytes(&mut bytes).map_err(|e| {
        tracing::error!(error = %e, "Failed to generate refresh token");
        TokenError::RandomSourceFailed(e.to_string())
    })?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

fn hash_token(token: &str) -> [u8; 32] {
    Sha256::digest(token.as_bytes()).into()
}

#[derive(Debug, Clone)]
struct RefreshRecord {
    token_hash: [u8; 32],
    expires_at: DateTime<Utc>,
}

/// Outstanding refresh token per account
#[derive(Debug, Default)]
pub struct RefreshStore {
    records: Mutex<HashMap<AccountId, RefreshRecord>>,
}

impl RefreshStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Records are always written whole, so a poisoned map is still consistent
    fn records(&self) -> MutexGuard<'_, HashMap<AccountId, RefreshRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `token` as the only redeemable refresh token for `account_id`
    pub fn put(&self, account_id: AccountId, token: &str, expires_at: DateTime<Utc>) {
        let record = RefreshRecord {
            token_hash: hash_token(token),
            expires_at,
        };

        if self.records().insert(account_id, record).is_some() {
            tracing::debug!(account_id = %account_id, "Superseded outstanding refresh token");
        }
    }

    /// Consume the refresh token for `account_id` if it matches and has not
    /// expired at `now`. State is left untouched on failure.
    pub fn redeem(&self, account_id: AccountId, presented: &str, now: DateTime<Utc>) -> bool {
        let presented_hash = hash_token(presented);
        let mut records = self.records();

        let Some(record) = records.get(&account_id) else {
            tracing::warn!(account_id = %account_id, "No outstanding refresh token");
            return false;
        };

        if !constant_time_eq(&record.token_hash, &presented_hash) {
            tracing::warn!(account_id = %account_id, "Refresh token mismatch");
            return false;
        }

        if record.expires_at < now {
            tracing::info!(account_id = %account_id, "Refresh token expired");
            return false;
        }

        records.remove(&account_id);
        true
    }

    /// Drop the outstanding refresh token for `account_id`
    pub fn revoke(&self, account_id: AccountId) -> bool {
        let revoked = self.records().remove(&account_id).is_some();
        if revoked {
            tracing::info!(account_id = %account_id, "Refresh token revoked");
        }
        revoked
    }

    /// Remove every record expired at `now`, returning how many were removed
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut records = self.records();
        let before = records.len();
        records.retain(|_, record| record.expires_at >= now);
        before - records.len()
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }
}
