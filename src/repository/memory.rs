use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::AccountRepository;
use crate::account::Account;
use crate::error::DatabaseError;

/// Accounts keyed by email, for tests and single-process deployments
#[derive(Debug, Default)]
pub struct InMemoryAccountRepository {
    accounts: RwLock<HashMap<String, Account>>,
}

impl InMemoryAccountRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.accounts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.accounts.read().await.is_empty()
    }
}

#[async_trait]
impl AccountRepository for InMemoryAccountRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, DatabaseError> {
        Ok(self.accounts.read().await.get(email).cloned())
    }

    async fn insert(&self, account: Account) -> Result<Account, DatabaseError> {
        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&account.email) {
            return Err(DatabaseError::UniqueConstraintViolation(
                "accounts_email_key".to_string(),
            ));
        }
        accounts.insert(account.email.clone(), account.clone());
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(email: &str) -> Account {
        Account::new("Test User".to_string(), email.to_string(), "salt.hash".to_string())
    }

    #[tokio::test]
    async fn insert_then_find_by_email() {
        let repo = InMemoryAccountRepository::new();
        let stored = repo.insert(account("a@example.com")).await.unwrap();

        let found = repo.find_by_email("a@example.com").await.unwrap().unwrap();
        assert_eq!(found.id, stored.id);
        assert!(repo.find_by_email("b@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_email() {
        let repo = InMemoryAccountRepository::new();
        repo.insert(account("a@example.com")).await.unwrap();

        let result = repo.insert(account("a@example.com")).await;

        assert!(matches!(result, Err(DatabaseError::UniqueConstraintViolation(_))));
        assert_eq!(repo.len().await, 1);
    }
}
