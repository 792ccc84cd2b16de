mod auth;
mod health_check;

pub use auth::{me, refresh, sign_in, sign_out, sign_up, ACCOUNT_ID_HEADER, REFRESH_TOKEN_HEADER};
pub use health_check::health_check;
