use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::AccountRepository;
use crate::account::Account;
use crate::error::DatabaseError;

type AccountRow = (Uuid, String, String, String, DateTime<Utc>, DateTime<Utc>);

/// Postgres-backed accounts (`migrations/` holds the schema)
#[derive(Debug, Clone)]
pub struct PgAccountRepository {
    pool: PgPool,
}

impl PgAccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn into_account((id, name, email, password, created_at, updated_at): AccountRow) -> Account {
    Account {
        id: id.into(),
        name,
        email,
        password,
        created_at,
        updated_at,
    }
}

#[async_trait]
impl AccountRepository for PgAccountRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, DatabaseError> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT id, name, email, password, created_at, updated_at
            FROM accounts
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to retrieve account by email");
            DatabaseError::from(e)
        })?;

        Ok(row.map(into_account))
    }

    async fn insert(&self, account: Account) -> Result<Account, DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, name, email, password, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(*account.id.as_uuid())
        .bind(&account.name)
        .bind(&account.email)
        .bind(&account.password)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from)?;

        Ok(account)
    }
}
