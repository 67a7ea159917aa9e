//! Schema bootstrap.
//!
//! The service owns its tables and creates them on startup; statements are
//! idempotent so repeated starts and rolling restarts are safe.

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::{info_span, Instrument};

const STATEMENTS: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS accounts (
        id UUID PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS account_sessions (
        session_hash BYTEA PRIMARY KEY,
        account_id UUID NOT NULL REFERENCES accounts (id) ON DELETE CASCADE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        expires_at TIMESTAMPTZ NOT NULL,
        last_seen_at TIMESTAMPTZ
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS attribute_definitions (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL UNIQUE
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS attribute_definition_values (
        id UUID PRIMARY KEY,
        definition_id UUID NOT NULL REFERENCES attribute_definitions (id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        display_order INTEGER NOT NULL,
        is_pre_selected BOOLEAN NOT NULL DEFAULT FALSE
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS account_attributes (
        account_id UUID NOT NULL,
        key TEXT NOT NULL,
        value TEXT NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (account_id, key)
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS attribute_change_events (
        id UUID PRIMARY KEY,
        account_id UUID NOT NULL,
        key TEXT NOT NULL,
        kind TEXT NOT NULL,
        new_value TEXT,
        status TEXT NOT NULL DEFAULT 'pending',
        attempts INTEGER NOT NULL DEFAULT 0,
        last_error TEXT,
        next_attempt_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    ",
    r"
    CREATE INDEX IF NOT EXISTS attribute_change_events_pending_idx
    ON attribute_change_events (next_attempt_at, created_at)
    WHERE status = 'pending'
    ",
];

/// Create all tables and indexes if they do not exist yet.
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    for statement in STATEMENTS {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DDL",
            db.statement = statement
        );
        sqlx::query(statement)
            .execute(pool)
            .instrument(span)
            .await
            .context("failed to apply schema statement")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::STATEMENTS;

    #[test]
    fn statements_are_idempotent() {
        for statement in STATEMENTS {
            assert!(
                statement.contains("IF NOT EXISTS"),
                "schema statement must be idempotent: {statement}"
            );
        }
    }
}
