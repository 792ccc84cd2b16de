/// Session Facade
///
/// The contract request handlers use: sign-up, sign-in, refresh, sign-out and
/// the authenticated-route guard. Every internal failure is mapped to an
/// [`AppError`] whose HTTP form reveals only bad input / unauthorized /
/// internal fault.

use std::sync::Arc;

use crate::account::{Account, AccountId};
use crate::auth::{
    Cryptography, PasswordCryptography, TokenEngine, TokenPair, Tokenization, DUMMY_CREDENTIAL,
};
use crate::configuration::TokenSettings;
use crate::error::{AppError, AuthError, ConfigError, DatabaseError};
use crate::repository::AccountRepository;
use crate::validators::{is_valid_email, is_valid_name, is_valid_password};

pub struct SessionService<C = PasswordCryptography, T = TokenEngine> {
    accounts: Arc<dyn AccountRepository>,
    cryptography: C,
    tokenization: T,
}

impl SessionService {
    /// Production wiring: Argon2id hashing and an HS256 token engine
    pub fn new(accounts: Arc<dyn AccountRepository>, settings: &TokenSettings) -> Result<Self, ConfigError> {
        Ok(Self::with_components(
            accounts,
            PasswordCryptography::new(),
            TokenEngine::new(settings)?,
        ))
    }
}

impl<C: Cryptography, T: Tokenization> SessionService<C, T> {
    pub fn with_components(accounts: Arc<dyn AccountRepository>, cryptography: C, tokenization: T) -> Self {
        Self {
            accounts,
            cryptography,
            tokenization,
        }
    }

    pub fn tokenization(&self) -> &T {
        &self.tokenization
    }

    /// Register a new account
    ///
    /// # Errors
    /// - `Validation` for malformed name/email/password
    /// - `Auth(DuplicateEmail)` if the email is taken, either by the lookup
    ///   or by the repository's uniqueness constraint on insert
    pub async fn sign_up(&self, name: &str, email: &str, password: &str) -> Result<Account, AppError> {
        let name = is_valid_name(name)?;
        let email = is_valid_email(email)?;
        is_valid_password(password)?;

        if self.accounts.find_by_email(&email).await?.is_some() {
            tracing::warn!("Sign-up rejected: email already registered");
            return Err(AuthError::DuplicateEmail.into());
        }

        let credential = self.cryptography.hash_password(password)?;
        let account = Account::new(name, email, credential);

        match self.accounts.insert(account).await {
            Ok(account) => {
                tracing::info!(account_id = %account.id, "Account registered");
                Ok(account)
            }
            Err(DatabaseError::UniqueConstraintViolation(constraint)) => {
                tracing::warn!(constraint = %constraint, "Sign-up lost race on unique email");
                Err(AuthError::DuplicateEmail.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Authenticate with email and password, returning a fresh token pair
    ///
    /// Unknown email and wrong password are indistinguishable to the caller.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<TokenPair, AppError> {
        let Some(account) = self.accounts.find_by_email(email.trim()).await? else {
            // Same KDF cost as a password mismatch; the outcome is discarded
            let _ = self.cryptography.verify_password(password, &DUMMY_CREDENTIAL);
            tracing::warn!("Sign-in rejected: unknown email");
            return Err(AuthError::InvalidCredentials.into());
        };

        if !self.cryptography.verify_password(password, &account.password)? {
            tracing::warn!(account_id = %account.id, "Sign-in rejected: password mismatch");
            return Err(AuthError::InvalidCredentials.into());
        }

        let tokens = self.tokenization.issue_token(account.id)?;
        tracing::info!(account_id = %account.id, "Signed in");
        Ok(tokens)
    }

    /// Exchange a refresh token for a new token pair (rotation, not extension)
    pub fn refresh(&self, account_id: AccountId, presented: &str) -> Result<TokenPair, AppError> {
        if !self.tokenization.redeem_refresh(account_id, presented) {
            tracing::warn!(account_id = %account_id, "Refresh rejected");
            return Err(AuthError::InvalidRefreshToken.into());
        }

        let tokens = self.tokenization.issue_token(account_id)?;
        tracing::info!(account_id = %account_id, "Token refreshed");
        Ok(tokens)
    }

    /// Guard for protected routes
    pub fn authenticate(&self, token: &str) -> Result<AccountId, AppError> {
        match self.tokenization.verify_token(token) {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!("Access token signature mismatch");
                return Err(AuthError::Unauthorized.into());
            }
            Err(e) => {
                tracing::warn!(error = %e, "Access token rejected");
                return Err(AuthError::Unauthorized.into());
            }
        }

        self.tokenization.resolve_account_id(token).map_err(|e| {
            tracing::warn!(error = %e, "Access token carries no usable account id");
            AppError::from(AuthError::Unauthorized)
        })
    }

    /// Revoke the outstanding refresh token. Issued access tokens stay valid
    /// until they expire.
    pub fn sign_out(&self, account_id: AccountId) -> bool {
        self.tokenization.revoke_refresh(account_id)
    }

    /// Drop refresh records past their expiry, returning how many went
    pub fn purge_expired_refresh(&self) -> usize {
        let purged = self.tokenization.purge_expired_refresh();
        if purged > 0 {
            tracing::info!(purged = purged, "Purged expired refresh tokens");
        }
        purged
    }
}
