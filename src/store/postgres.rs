//! Attribute store over `account_attributes` with a transactional outbox.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::{info_span, Instrument};
use uuid::Uuid;

use crate::policy::attributes::{AttributeStore, ChangeKind};

pub(crate) fn kind_as_str(kind: ChangeKind) -> &'static str {
    match kind {
        ChangeKind::Inserted => "inserted",
        ChangeKind::Updated => "updated",
        ChangeKind::Deleted => "deleted",
    }
}

pub(crate) fn kind_from_str(kind: &str) -> Option<ChangeKind> {
    match kind {
        "inserted" => Some(ChangeKind::Inserted),
        "updated" => Some(ChangeKind::Updated),
        "deleted" => Some(ChangeKind::Deleted),
        _ => None,
    }
}

#[derive(Clone)]
pub struct PgAttributeStore {
    pool: PgPool,
}

impl PgAttributeStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AttributeStore for PgAttributeStore {
    async fn get(&self, account_id: Uuid, key: &str) -> Result<Option<String>> {
        let query = "SELECT value FROM account_attributes WHERE account_id = $1 AND key = $2";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(account_id)
            .bind(key)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to read account attribute")?;

        Ok(row.map(|row| row.get("value")))
    }

    async fn set(&self, account_id: Uuid, key: &str, value: Option<String>) -> Result<()> {
        // The attribute write and its change notification must commit
        // together, or the reconciler could miss a mutation.
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin attribute transaction")?;

        let kind = match value {
            Some(ref value) => {
                let query = r"
                    INSERT INTO account_attributes (account_id, key, value, updated_at)
                    VALUES ($1, $2, $3, NOW())
                    ON CONFLICT (account_id, key)
                    DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()
                    RETURNING (xmax = 0) AS inserted
                ";
                let span = info_span!(
                    "db.query",
                    db.system = "postgresql",
                    db.operation = "INSERT",
                    db.statement = query
                );
                let row = sqlx::query(query)
                    .bind(account_id)
                    .bind(key)
                    .bind(value)
                    .fetch_one(&mut *tx)
                    .instrument(span)
                    .await
                    .context("failed to upsert account attribute")?;

                if row.get::<bool, _>("inserted") {
                    ChangeKind::Inserted
                } else {
                    ChangeKind::Updated
                }
            }
            None => {
                let query =
                    "DELETE FROM account_attributes WHERE account_id = $1 AND key = $2 RETURNING key";
                let span = info_span!(
                    "db.query",
                    db.system = "postgresql",
                    db.operation = "DELETE",
                    db.statement = query
                );
                let row = sqlx::query(query)
                    .bind(account_id)
                    .bind(key)
                    .fetch_optional(&mut *tx)
                    .instrument(span)
                    .await
                    .context("failed to delete account attribute")?;

                if row.is_none() {
                    // Nothing removed, nothing to announce.
                    tx.commit()
                        .await
                        .context("failed to commit attribute no-op")?;
                    return Ok(());
                }
                ChangeKind::Deleted
            }
        };

        let query = r"
            INSERT INTO attribute_change_events (id, account_id, key, kind, new_value)
            VALUES ($1, $2, $3, $4, $5)
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(Uuid::now_v7())
            .bind(account_id)
            .bind(key)
            .bind(kind_as_str(kind))
            .bind(value)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to enqueue attribute change event")?;

        tx.commit()
            .await
            .context("failed to commit attribute transaction")?;

        Ok(())
    }
}
