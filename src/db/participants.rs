//! Participant bank registry lookups, consumed read-only by submission
//! validation.

use sqlx::Row;

use super::DatabaseManager;
use crate::error::Result;

impl DatabaseManager {
    pub async fn is_active_participant(&self, bank_code: &str) -> Result<bool> {
        let row = sqlx::query("SELECT active FROM participants WHERE bank_code = $1")
            .bind(bank_code)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.map(|r| r.try_get::<bool, _>("active").unwrap_or(false)).unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::test_db;

    #[tokio::test]
    async fn unknown_bank_code_is_not_active() {
        let Some(db) = test_db().await else { return };
        assert!(!db.is_active_participant("NOPE-BANK-CODE").await.unwrap());
    }
}
