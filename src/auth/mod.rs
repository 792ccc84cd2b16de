/// Authentication module
///
/// Password hashing, JWT access token issuance/validation, and the
/// single-use refresh token store.

mod claims;
mod clock;
mod jwt;
mod password;
mod refresh_token;

pub use claims::AccessClaims;
pub use clock::{Clock, SystemClock};
#[cfg(test)]
pub(crate) use clock::ManualClock;
pub use jwt::{TokenEngine, TokenPair, Tokenization};
pub use password::{Cryptography, PasswordCryptography};
pub(crate) use password::DUMMY_CREDENTIAL;
pub use refresh_token::{generate_refresh_token, RefreshStore};
