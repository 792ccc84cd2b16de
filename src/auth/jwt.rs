/// JWT Token Engine
///
/// Issues HS256 access tokens paired with single-use refresh tokens, and
/// verifies access tokens without consulting any server-side state.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::account::AccountId;
use crate::auth::claims::AccessClaims;
use crate::auth::clock::{Clock, SystemClock};
use crate::auth::refresh_token::{generate_refresh_token, RefreshStore};
use crate::configuration::TokenSettings;
use crate::error::{ConfigError, TokenError};

const SIGNING_ALGORITHM: Algorithm = Algorithm::HS256;

/// Result of a successful issuance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Expiry of the access token (the refresh token shares it)
    pub expires_at: DateTime<Utc>,
}

/// Access/refresh token lifecycle
pub trait Tokenization: Send + Sync {
    /// Sign a new access token for `account_id` and replace its refresh token
    fn issue_token(&self, account_id: AccountId) -> Result<TokenPair, TokenError>;

    /// `Ok(true)` for an authentic, unexpired token. `Ok(false)` when the
    /// token is well-formed HS256 but was not signed with our secret.
    fn verify_token(&self, token: &str) -> Result<bool, TokenError>;

    /// Recover the account id from a valid access token
    fn resolve_account_id(&self, token: &str) -> Result<AccountId, TokenError>;

    /// Consume the refresh token. Callers reissue on success.
    fn redeem_refresh(&self, account_id: AccountId, presented: &str) -> bool;

    fn revoke_refresh(&self, account_id: AccountId) -> bool;

    /// Drop refresh records that can no longer be redeemed
    fn purge_expired_refresh(&self) -> usize;
}

/// HS256 [`Tokenization`] owning its refresh store
pub struct TokenEngine<C = SystemClock> {
    issuer: String,
    audience: String,
    ttl: Duration,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    refresh_store: RefreshStore,
    clock: C,
}

impl<C> fmt::Debug for TokenEngine<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenEngine")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("ttl", &self.ttl)
            .field("outstanding_refresh_tokens", &self.refresh_store.len())
            .finish()
    }
}

impl TokenEngine<SystemClock> {
    pub fn new(settings: &TokenSettings) -> Result<Self, ConfigError> {
        Self::with_clock(settings, SystemClock)
    }
}

impl<C: Clock> TokenEngine<C> {
    /// # Errors
    /// `ConfigError` when `settings` fails [`TokenSettings::validate`]
    pub fn with_clock(settings: &TokenSettings, clock: C) -> Result<Self, ConfigError> {
        settings.validate()?;

        let mut validation = Validation::new(SIGNING_ALGORITHM);
        validation.set_issuer(&[&settings.issuer]);
        validation.set_audience(&[&settings.audience]);
        // Expiry is checked against the injected clock instead
        validation.validate_exp = false;
        validation.leeway = 0;

        Ok(Self {
            issuer: settings.issuer.clone(),
            audience: settings.audience.clone(),
            ttl: settings.ttl(),
            encoding_key: EncodingKey::from_secret(settings.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(settings.secret.as_bytes()),
            validation,
            refresh_store: RefreshStore::new(),
            clock,
        })
    }

    pub fn refresh_store(&self) -> &RefreshStore {
        &self.refresh_store
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn decode_claims(&self, token: &str) -> Result<AccessClaims, TokenError> {
        ensure_signing_algorithm(token)?;

        let claims = decode::<AccessClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::warn!("JWT validation error: {}", e);
                match e.kind() {
                    ErrorKind::InvalidSignature => TokenError::BadSignature,
                    ErrorKind::InvalidAlgorithm | ErrorKind::MissingAlgorithm => {
                        TokenError::UnexpectedSigningMethod(e.to_string())
                    }
                    ErrorKind::ExpiredSignature => TokenError::Expired,
                    ErrorKind::InvalidIssuer
                    | ErrorKind::InvalidAudience
                    | ErrorKind::MissingRequiredClaim(_)
                    | ErrorKind::ImmatureSignature
                    | ErrorKind::Json(_) => TokenError::InvalidClaims(e.to_string()),
                    _ => TokenError::MalformedToken,
                }
            })?;

        if claims.is_expired_at(self.clock.now()) {
            tracing::info!(exp = claims.exp, "Access token has expired");
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }
}

/// Reject any token whose header does not name the expected MAC scheme
/// before the signature is looked at.
fn ensure_signing_algorithm(token: &str) -> Result<(), TokenError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 || segments[0].is_empty() {
        return Err(TokenError::MalformedToken);
    }

    let raw_header = URL_SAFE_NO_PAD
        .decode(segments[0])
        .map_err(|_| TokenError::MalformedToken)?;
    let header: serde_json::Value =
        serde_json::from_slice(&raw_header).map_err(|_| TokenError::MalformedToken)?;

    let alg = header
        .get("alg")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| TokenError::UnexpectedSigningMethod("missing".to_string()))?;

    match Algorithm::from_str(alg) {
        Ok(algorithm) if algorithm == SIGNING_ALGORITHM => Ok(()),
        _ => {
            tracing::warn!(alg = alg, "Unexpected signing method");
            Err(TokenError::UnexpectedSigningMethod(alg.to_string()))
        }
    }
}

impl<C: Clock> Tokenization for TokenEngine<C> {
    fn issue_token(&self, account_id: AccountId) -> Result<TokenPair, TokenError> {
        let expires_at = self
            .clock
            .now()
            .checked_add_signed(self.ttl)
            .ok_or_else(|| TokenError::SigningFailed("expiry out of range".to_string()))?;
        let claims = AccessClaims::new(account_id, &self.issuer, &self.audience, expires_at);

        let access_token = encode(&Header::new(SIGNING_ALGORITHM), &claims, &self.encoding_key)
            .map_err(|e| {
                tracing::error!(error = %e, "Error signing token");
                TokenError::SigningFailed(e.to_string())
            })?;

        let refresh_token = generate_refresh_token()?;
        self.refresh_store.put(account_id, &refresh_token, expires_at);

        tracing::debug!(account_id = %account_id, expires_at = %expires_at, "Issued token pair");

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_at,
        })
    }

    fn verify_token(&self, token: &str) -> Result<bool, TokenError> {
        match self.decode_claims(token) {
            Ok(_) => Ok(true),
            Err(TokenError::BadSignature) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn resolve_account_id(&self, token: &str) -> Result<AccountId, TokenError> {
        let claims = self.decode_claims(token).map_err(|e| match e {
            TokenError::BadSignature => TokenError::MalformedToken,
            other => other,
        })?;

        claims.account_id()
    }

    fn redeem_refresh(&self, account_id: AccountId, presented: &str) -> bool {
        self.refresh_store
            .redeem(account_id, presented, self.clock.now())
    }

    fn revoke_refresh(&self, account_id: AccountId) -> bool {
        self.refresh_store.revoke(account_id)
    }

    fn purge_expired_refresh(&self) -> usize {
        self.refresh_store.purge_expired(self.clock.now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::clock::ManualClock;
    use std::sync::Arc;

    const SECRET: &str = "test-secret-key-at-least-32-characters-long";

    fn get_test_config() -> TokenSettings {
        TokenSettings {
            secret: SECRET.to_string(),
            issuer: "test".to_string(),
            audience: "test-clients".to_string(),
            ttl_seconds: 3600,
        }
    }

    fn engine_with_manual_clock(ttl_seconds: i64) -> (TokenEngine<Arc<ManualClock>>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let settings = TokenSettings {
            ttl_seconds,
            ..get_test_config()
        };
        (TokenEngine::with_clock(&settings, clock.clone()).unwrap(), clock)
    }

    fn unsigned_token(header: &str, claims: &serde_json::Value) -> String {
        format!(
            "{}.{}.",
            URL_SAFE_NO_PAD.encode(header),
            URL_SAFE_NO_PAD.encode(claims.to_string())
        )
    }

    fn forged_claims(account_id: AccountId) -> serde_json::Value {
        serde_json::json!({
            "id": account_id.to_string(),
            "exp": (Utc::now() + Duration::days(365)).timestamp(),
            "iss": "test",
            "aud": "test-clients",
        })
    }

    #[test]
    fn test_issue_and_resolve_account_id() {
        let engine = TokenEngine::new(&get_test_config()).unwrap();
        let account_id = AccountId::generate();

        let pair = engine.issue_token(account_id).expect("Failed to issue token");

        assert!(engine.verify_token(&pair.access_token).unwrap());
        assert_eq!(engine.resolve_account_id(&pair.access_token).unwrap(), account_id);
        assert_ne!(pair.access_token, pair.refresh_token);
    }

    #[test]
    fn test_issued_token_expiry_matches_ttl() {
        let (engine, clock) = engine_with_manual_clock(600);

        let pair = engine.issue_token(AccountId::generate()).unwrap();

        assert_eq!(pair.expires_at, clock.now() + Duration::seconds(600));
    }

    #[test]
    fn test_token_expires_after_ttl() {
        let (engine, clock) = engine_with_manual_clock(1);
        let account_id = AccountId::generate();
        let pair = engine.issue_token(account_id).unwrap();

        assert!(engine.verify_token(&pair.access_token).unwrap());

        clock.advance(Duration::seconds(2));

        assert_eq!(engine.verify_token(&pair.access_token), Err(TokenError::Expired));
        assert_eq!(engine.resolve_account_id(&pair.access_token), Err(TokenError::Expired));
    }

    #[test]
    fn test_token_expires_in_real_time() {
        let settings = TokenSettings {
            ttl_seconds: 1,
            ..get_test_config()
        };
        let engine = TokenEngine::new(&settings).unwrap();
        let pair = engine.issue_token(AccountId::generate()).unwrap();

        assert!(engine.verify_token(&pair.access_token).unwrap());

        std::thread::sleep(std::time::Duration::from_millis(2100));

        assert_eq!(engine.verify_token(&pair.access_token), Err(TokenError::Expired));
    }

    #[test]
    fn test_invalid_token() {
        let engine = TokenEngine::new(&get_test_config()).unwrap();

        assert_eq!(engine.verify_token("invalid.token.here"), Err(TokenError::MalformedToken));
        assert_eq!(engine.verify_token(""), Err(TokenError::MalformedToken));
        assert_eq!(engine.verify_token("only.two"), Err(TokenError::MalformedToken));
    }

    #[test]
    fn test_tampered_token() {
        let engine = TokenEngine::new(&get_test_config()).unwrap();
        let pair = engine.issue_token(AccountId::generate()).unwrap();

        let (unsigned, signature) = pair.access_token.rsplit_once('.').unwrap();
        let mut forged_signature = signature.to_string();
        let replacement = if forged_signature.starts_with('A') { "B" } else { "A" };
        forged_signature.replace_range(0..1, replacement);
        let tampered = format!("{}.{}", unsigned, forged_signature);

        assert_eq!(engine.verify_token(&tampered), Ok(false));
        assert_eq!(engine.resolve_account_id(&tampered), Err(TokenError::MalformedToken));
    }

    #[test]
    fn test_token_from_other_secret_is_rejected() {
        let other = TokenEngine::new(&TokenSettings {
            secret: "a-completely-different-secret-value!!".to_string(),
            ..get_test_config()
        }).unwrap();
        let engine = TokenEngine::new(&get_test_config()).unwrap();
        let pair = other.issue_token(AccountId::generate()).unwrap();

        assert_eq!(engine.verify_token(&pair.access_token), Ok(false));
    }

    #[test]
    fn test_wrong_issuer() {
        let other = TokenEngine::new(&TokenSettings {
            issuer: "wrong-issuer".to_string(),
            ..get_test_config()
        }).unwrap();
        let engine = TokenEngine::new(&get_test_config()).unwrap();
        let pair = other.issue_token(AccountId::generate()).unwrap();

        assert!(matches!(
            engine.verify_token(&pair.access_token),
            Err(TokenError::InvalidClaims(_))
        ));
    }

    #[test]
    fn test_wrong_audience() {
        let other = TokenEngine::new(&TokenSettings {
            audience: "someone-else".to_string(),
            ..get_test_config()
        }).unwrap();
        let engine = TokenEngine::new(&get_test_config()).unwrap();
        let pair = other.issue_token(AccountId::generate()).unwrap();

        assert!(matches!(
            engine.resolve_account_id(&pair.access_token),
            Err(TokenError::InvalidClaims(_))
        ));
    }

    #[test]
    fn test_alg_none_is_rejected() {
        let engine = TokenEngine::new(&get_test_config()).unwrap();
        let token = unsigned_token(
            r#"{"alg":"none","typ":"JWT"}"#,
            &forged_claims(AccountId::generate()),
        );

        assert_eq!(
            engine.verify_token(&token),
            Err(TokenError::UnexpectedSigningMethod("none".to_string()))
        );
        assert!(matches!(
            engine.resolve_account_id(&token),
            Err(TokenError::UnexpectedSigningMethod(_))
        ));
    }

    #[test]
    fn test_missing_alg_is_rejected() {
        let engine = TokenEngine::new(&get_test_config()).unwrap();
        let token = unsigned_token(r#"{"typ":"JWT"}"#, &forged_claims(AccountId::generate()));

        assert!(matches!(
            engine.verify_token(&token),
            Err(TokenError::UnexpectedSigningMethod(_))
        ));
    }

    #[test]
    fn test_other_hmac_algorithm_is_rejected() {
        let engine = TokenEngine::new(&get_test_config()).unwrap();
        let token = encode(
            &Header::new(Algorithm::HS512),
            &forged_claims(AccountId::generate()),
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        assert_eq!(
            engine.verify_token(&token),
            Err(TokenError::UnexpectedSigningMethod("HS512".to_string()))
        );
    }

    #[test]
    fn test_non_uuid_id_claim() {
        let engine = TokenEngine::new(&get_test_config()).unwrap();
        let mut claims = forged_claims(AccountId::generate());
        claims["id"] = serde_json::json!("not-a-uuid");
        let token = encode(
            &Header::new(SIGNING_ALGORITHM),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        assert!(engine.verify_token(&token).unwrap());
        assert!(matches!(
            engine.resolve_account_id(&token),
            Err(TokenError::InvalidClaims(_))
        ));
    }

    #[test]
    fn test_non_string_id_claim() {
        let engine = TokenEngine::new(&get_test_config()).unwrap();
        let mut claims = forged_claims(AccountId::generate());
        claims["id"] = serde_json::json!(42);
        let token = encode(
            &Header::new(SIGNING_ALGORITHM),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        assert!(matches!(
            engine.resolve_account_id(&token),
            Err(TokenError::InvalidClaims(_))
        ));
    }

    #[test]
    fn test_refresh_is_single_use() {
        let engine = TokenEngine::new(&get_test_config()).unwrap();
        let account_id = AccountId::generate();
        let pair = engine.issue_token(account_id).unwrap();

        assert!(engine.redeem_refresh(account_id, &pair.refresh_token));
        assert!(!engine.redeem_refresh(account_id, &pair.refresh_token));
    }

    #[test]
    fn test_reissue_supersedes_refresh_token() {
        let engine = TokenEngine::new(&get_test_config()).unwrap();
        let account_id = AccountId::generate();
        let first = engine.issue_token(account_id).unwrap();
        let second = engine.issue_token(account_id).unwrap();

        assert!(!engine.redeem_refresh(account_id, &first.refresh_token));
        assert!(engine.redeem_refresh(account_id, &second.refresh_token));
    }

    #[test]
    fn test_refresh_token_bound_to_account() {
        let engine = TokenEngine::new(&get_test_config()).unwrap();
        let alice = AccountId::generate();
        let bob = AccountId::generate();
        let pair = engine.issue_token(alice).unwrap();

        assert!(!engine.redeem_refresh(bob, &pair.refresh_token));
        assert!(engine.redeem_refresh(alice, &pair.refresh_token));
    }

    #[test]
    fn test_refresh_token_expires_with_clock() {
        let (engine, clock) = engine_with_manual_clock(60);
        let account_id = AccountId::generate();
        let pair = engine.issue_token(account_id).unwrap();

        clock.advance(Duration::seconds(61));

        assert!(!engine.redeem_refresh(account_id, &pair.refresh_token));
    }

    #[test]
    fn test_revoke_refresh() {
        let engine = TokenEngine::new(&get_test_config()).unwrap();
        let account_id = AccountId::generate();
        let pair = engine.issue_token(account_id).unwrap();

        assert!(engine.revoke_refresh(account_id));
        assert!(!engine.redeem_refresh(account_id, &pair.refresh_token));
        assert!(engine.refresh_store().is_empty());
    }

    #[test]
    fn test_engine_rejects_empty_secret() {
        let result = TokenEngine::new(&TokenSettings {
            secret: String::new(),
            ..get_test_config()
        });
        assert!(matches!(result, Err(ConfigError::MissingRequired(_))));
    }

    #[test]
    fn test_engine_rejects_out_of_range_ttl() {
        for ttl_seconds in [0, -1, i64::MAX] {
            let result = TokenEngine::new(&TokenSettings {
                ttl_seconds,
                ..get_test_config()
            });
            assert!(
                matches!(result, Err(ConfigError::InvalidValue(_))),
                "ttl_seconds = {} was accepted",
                ttl_seconds
            );
        }
    }

    #[test]
    fn test_purge_expired_refresh_uses_engine_clock() {
        let (engine, clock) = engine_with_manual_clock(60);
        for _ in 0..3 {
            engine.issue_token(AccountId::generate()).unwrap();
        }

        assert_eq!(engine.purge_expired_refresh(), 0);
        clock.advance(Duration::seconds(61));
        let survivor = AccountId::generate();
        let pair = engine.issue_token(survivor).unwrap();

        assert_eq!(engine.purge_expired_refresh(), 3);
        assert_eq!(engine.refresh_store().len(), 1);
        assert!(engine.redeem_refresh(survivor, &pair.refresh_token));
    }
}
