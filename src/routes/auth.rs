/// Authentication Routes
///
/// Sign-up, sign-in, token refresh, sign-out and current-account lookup.

use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::account::{Account, AccountId};
use crate::auth::TokenPair;
use crate::error::{AppError, AuthError, ErrorContext};
use crate::session::SessionService;

/// Header carrying the refresh token on `/api/auth/refresh`
pub const REFRESH_TOKEN_HEADER: &str = "Token";
/// Header carrying the account id on `/api/auth/refresh`
pub const ACCOUNT_ID_HEADER: &str = "UserId";

#[derive(Deserialize)]
pub struct SignUpRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

/// Common response envelope
#[derive(Serialize)]
pub struct Envelope<T> {
    pub status: u16,
    pub message: String,
    pub data: Vec<T>,
}

impl<T> Envelope<T> {
    fn new(status: u16, message: &str, data: Vec<T>) -> Self {
        Self {
            status,
            message: message.to_string(),
            data,
        }
    }
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub refresh: String,
    /// RFC 3339 expiry of the access token
    pub expiry: String,
}

impl From<TokenPair> for TokenResponse {
    fn from(pair: TokenPair) -> Self {
        Self {
            token: pair.access_token,
            refresh: pair.refresh_token,
            expiry: pair.expires_at.to_rfc3339(),
        }
    }
}

/// Public view of an account; the stored credential is never included
#[derive(Serialize)]
pub struct AccountResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub created_at: String,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id.to_string(),
            name: account.name,
            email: account.email,
            created_at: account.created_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
pub struct MeResponse {
    pub id: String,
}

fn required_header<'a>(req: &'a HttpRequest, name: &'static str) -> Result<&'a str, AuthError> {
    req.headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(AuthError::MissingHeader(name))
}

/// POST /api/auth/signup
///
/// # Errors
/// - 400: validation error
/// - 409: email already registered
/// - 500: internal error
pub async fn sign_up(
    form: web::Json<SignUpRequest>,
    sessions: web::Data<SessionService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("sign_up");

    let account = sessions
        .sign_up(&form.name, &form.email, &form.password)
        .await?;

    tracing::info!(
        request_id = %context.request_id,
        operation = %context.operation,
        account_id = %account.id,
        "Sign-up successful"
    );

    Ok(HttpResponse::Created().json(Envelope::new(
        201,
        "Sign-up successful",
        vec![AccountResponse::from(account)],
    )))
}

/// POST /api/auth/signin
///
/// # Errors
/// - 401: unknown email or wrong password (same response for both)
/// - 500: internal error
pub async fn sign_in(
    form: web::Json<SignInRequest>,
    sessions: web::Data<SessionService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("sign_in");

    let tokens = sessions.sign_in(&form.email, &form.password).await?;

    tracing::info!(
        request_id = %context.request_id,
        operation = %context.operation,
        "Sign-in successful"
    );

    Ok(HttpResponse::Ok().json(Envelope::new(
        200,
        "Sign-in successful",
        vec![TokenResponse::from(tokens)],
    )))
}

/// POST /api/auth/refresh
///
/// Expects the refresh token in the `Token` header and the account id in
/// `UserId`. The presented token is consumed; both tokens are reissued.
///
/// # Errors
/// - 400: missing header
/// - 401: invalid, expired, superseded or already used refresh token
pub async fn refresh(
    req: HttpRequest,
    sessions: web::Data<SessionService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("token_refresh");

    let presented = required_header(&req, REFRESH_TOKEN_HEADER)?;
    let account_id: AccountId = required_header(&req, ACCOUNT_ID_HEADER)?
        .parse()
        .map_err(|_| AuthError::InvalidRefreshToken)?;

    let tokens = sessions.refresh(account_id, presented)?;

    tracing::info!(
        request_id = %context.request_id,
        operation = %context.operation,
        account_id = %account_id,
        "Token refreshed successfully"
    );

    Ok(HttpResponse::Ok().json(Envelope::new(
        200,
        "Token refreshed successfully",
        vec![TokenResponse::from(tokens)],
    )))
}

/// POST /api/auth/signout
///
/// **Requires valid access token.** Revokes the outstanding refresh token.
pub async fn sign_out(
    account_id: web::ReqData<AccountId>,
    sessions: web::Data<SessionService>,
) -> HttpResponse {
    let account_id = account_id.into_inner();
    sessions.sign_out(account_id);
    tracing::info!(account_id = %account_id, "Signed out");
    HttpResponse::NoContent().finish()
}

/// GET /api/auth/me
///
/// **Requires valid access token.** Returns the authenticated account id.
pub async fn me(account_id: web::ReqData<AccountId>) -> HttpResponse {
    HttpResponse::Ok().json(MeResponse {
        id: account_id.into_inner().to_string(),
    })
}
