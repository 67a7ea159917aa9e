//! Attribute definition registry and idempotent provisioning.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::policy::attributes::{
    AttributeDefinition, AttributeValue, DefinitionRegistry, REQUIRE_PASSWORD_CHANGE, VALUE_NO,
    VALUE_YES,
};

#[derive(Clone)]
pub struct PgDefinitionRegistry {
    pool: PgPool,
}

impl PgDefinitionRegistry {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DefinitionRegistry for PgDefinitionRegistry {
    async fn find_by_name(&self, name: &str) -> Result<Option<AttributeDefinition>> {
        let query = r"
            SELECT d.id AS definition_id,
                   d.name AS definition_name,
                   v.id AS value_id,
                   v.name AS value_name,
                   v.display_order,
                   v.is_pre_selected
            FROM attribute_definitions d
            LEFT JOIN attribute_definition_values v ON v.definition_id = d.id
            WHERE LOWER(d.name) = LOWER($1)
            ORDER BY v.display_order ASC
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let rows = sqlx::query(query)
            .bind(name)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to load attribute definition")?;

        let Some(first) = rows.first() else {
            return Ok(None);
        };

        let mut definition = AttributeDefinition {
            id: first.get("definition_id"),
            name: first.get("definition_name"),
            values: Vec::with_capacity(rows.len()),
        };
        for row in &rows {
            // LEFT JOIN leaves the value columns NULL for a value-less definition.
            let value_id: Option<Uuid> = row.get("value_id");
            let Some(value_id) = value_id else { continue };
            definition.values.push(AttributeValue {
                id: value_id,
                name: row.get("value_name"),
                display_order: row.get("display_order"),
                is_pre_selected: row.get("is_pre_selected"),
            });
        }

        Ok(Some(definition))
    }
}

/// Provision the `RequirePasswordChange` definition with its `Yes`/`No`
/// values if it does not exist yet. Safe to run on every startup.
pub async fn ensure_definition(pool: &PgPool) -> Result<()> {
    let registry = PgDefinitionRegistry::new(pool.clone());
    if registry
        .find_by_name(REQUIRE_PASSWORD_CHANGE)
        .await?
        .is_some()
    {
        return Ok(());
    }

    let mut tx = pool
        .begin()
        .await
        .context("failed to begin definition transaction")?;

    let definition_id = Uuid::new_v4();
    let query = r"
        INSERT INTO attribute_definitions (id, name)
        VALUES ($1, $2)
        ON CONFLICT (name) DO NOTHING
        RETURNING id
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(definition_id)
        .bind(REQUIRE_PASSWORD_CHANGE)
        .fetch_optional(&mut *tx)
        .instrument(span)
        .await
        .context("failed to insert attribute definition")?;

    // A concurrent starter won the race; its values are authoritative.
    let Some(row) = row else {
        tx.rollback()
            .await
            .context("failed to roll back definition race")?;
        return Ok(());
    };
    let definition_id: Uuid = row.get("id");

    let query = r"
        INSERT INTO attribute_definition_values
            (id, definition_id, name, display_order, is_pre_selected)
        VALUES ($1, $2, $3, $4, $5)
    ";
    // `Yes` sorts first and is pre-selected: flagging an account from a UI
    // defaults to requiring the change.
    let values = [
        (VALUE_YES, i32::MIN, true),
        (VALUE_NO, i32::MAX, false),
    ];
    for (name, display_order, is_pre_selected) in values {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(Uuid::new_v4())
            .bind(definition_id)
            .bind(name)
            .bind(display_order)
            .bind(is_pre_selected)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to insert attribute definition value")?;
    }

    tx.commit()
        .await
        .context("failed to commit definition transaction")?;

    info!(definition = REQUIRE_PASSWORD_CHANGE, "provisioned attribute definition");

    Ok(())
}
