/// JWT Claims structure
///
/// Wire claims of an access token: `id` (account id as a UUID string),
/// `exp` (Unix seconds), `iss` and `aud`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::account::AccountId;
use crate::error::TokenError;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AccessClaims {
    pub id: String,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

impl AccessClaims {
    pub fn new(
        account_id: AccountId,
        issuer: &str,
        audience: &str,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: account_id.to_string(),
            exp: expires_at.timestamp(),
            iss: issuer.to_string(),
            aud: audience.to_string(),
        }
    }

    /// Extract the account id from the `id` claim
    ///
    /// # Errors
    /// `InvalidClaims` if the claim is not a UUID
    pub fn account_id(&self) -> Result<AccountId, TokenError> {
        self.id
            .parse()
            .map_err(|e| TokenError::InvalidClaims(format!("id claim: {}", e)))
    }

    /// A token stays valid through the whole second named by `exp`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.exp < now.timestamp()
    }
}
