/// Account persistence
///
/// Implementations must enforce email uniqueness themselves and report a
/// violation as `DatabaseError::UniqueConstraintViolation`. The session layer
/// treats that as authoritative over its own lookup.

mod memory;
mod postgres;

use async_trait::async_trait;

use crate::account::Account;
use crate::error::DatabaseError;

pub use memory::InMemoryAccountRepository;
pub use postgres::PgAccountRepository;

#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, DatabaseError>;

    async fn insert(&self, account: Account) -> Result<Account, DatabaseError>;
}
