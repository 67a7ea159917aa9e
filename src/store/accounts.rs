//! Account directory, password storage, and session-backed authentication.
//!
//! Passwords are stored as argon2 hashes; session tokens are random values
//! handed to the caller while only their SHA-256 hash touches the database.

use anyhow::{anyhow, Context, Result};
use argon2::password_hash::{rand_core::OsRng as HashOsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use async_trait::async_trait;
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Row};
use tracing::{info_span, Instrument};
use uuid::Uuid;

use crate::policy::accounts::{Account, AccountDirectory, AuthOutcome, Authenticator};

/// Outcome when attempting to create a new account.
#[derive(Debug)]
pub enum CreateOutcome {
    Created(Account),
    Conflict,
}

#[derive(Clone)]
pub struct PgAccountDirectory {
    pool: PgPool,
}

impl PgAccountDirectory {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_where(&self, clause: &str, bind: &str) -> Result<Option<Account>> {
        let query = format!("SELECT id, username, email FROM accounts WHERE {clause}");
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(bind)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to look up account")?;

        Ok(row.map(|row| Account {
            id: row.get("id"),
            username: row.get("username"),
            email: row.get("email"),
        }))
    }
}

#[async_trait]
impl AccountDirectory for PgAccountDirectory {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>> {
        let query = "SELECT id, username, email FROM accounts WHERE id = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to look up account by id")?;

        Ok(row.map(|row| Account {
            id: row.get("id"),
            username: row.get("username"),
            email: row.get("email"),
        }))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Account>> {
        self.find_where("LOWER(username) = LOWER($1)", username.trim())
            .await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        self.find_where("LOWER(email) = LOWER($1)", email.trim())
            .await
    }
}

/// Create an account with an argon2-hashed password.
pub async fn create_account(
    pool: &PgPool,
    username: &str,
    email: &str,
    password: &SecretString,
) -> Result<CreateOutcome> {
    let password_hash = hash_password(password)?;

    let query = r"
        INSERT INTO accounts (id, username, email, password_hash)
        VALUES ($1, $2, $3, $4)
        RETURNING id, username, email
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(Uuid::new_v4())
        .bind(username.trim())
        .bind(email.trim().to_lowercase())
        .bind(password_hash)
        .fetch_one(pool)
        .instrument(span)
        .await;

    match row {
        Ok(row) => Ok(CreateOutcome::Created(Account {
            id: row.get("id"),
            username: row.get("username"),
            email: row.get("email"),
        })),
        Err(err) if is_unique_violation(&err) => Ok(CreateOutcome::Conflict),
        Err(err) => Err(err).context("failed to insert account"),
    }
}

/// Replace an account's password hash.
pub async fn set_password(pool: &PgPool, account_id: Uuid, password: &SecretString) -> Result<()> {
    let password_hash = hash_password(password)?;

    let query = r"
        UPDATE accounts
        SET password_hash = $2,
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(account_id)
        .bind(password_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update password hash")?;
    Ok(())
}

pub struct PgAuthenticator {
    pool: PgPool,
    session_ttl_seconds: i64,
}

impl PgAuthenticator {
    #[must_use]
    pub fn new(pool: PgPool, session_ttl_seconds: i64) -> Self {
        Self {
            pool,
            session_ttl_seconds,
        }
    }
}

#[async_trait]
impl Authenticator for PgAuthenticator {
    async fn sign_in(&self, account: &Account, password: &SecretString) -> Result<AuthOutcome> {
        let query = "SELECT password_hash FROM accounts WHERE id = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(account.id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to read password hash")?;

        let Some(row) = row else {
            return Ok(AuthOutcome::Rejected);
        };

        let stored: String = row.get("password_hash");
        if !verify_password(password, &stored) {
            return Ok(AuthOutcome::Rejected);
        }

        let session_token = insert_session(&self.pool, account.id, self.session_ttl_seconds).await?;
        Ok(AuthOutcome::Granted { session_token })
    }

    async fn sign_out(&self, session_token: &str) -> Result<()> {
        // Idempotent; it's fine if no rows are deleted.
        let query = "DELETE FROM account_sessions WHERE session_hash = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(hash_session_token(session_token))
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete session")?;
        Ok(())
    }
}

async fn insert_session(pool: &PgPool, account_id: Uuid, ttl_seconds: i64) -> Result<String> {
    // Generate a random token, store only its hash, and return the raw
    // value so the caller can hand it to the client.
    let query = r"
        INSERT INTO account_sessions (session_hash, account_id, expires_at)
        VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );

    for _ in 0..3 {
        let token = generate_session_token()?;
        let result = sqlx::query(query)
            .bind(hash_session_token(&token))
            .bind(account_id)
            .bind(ttl_seconds)
            .execute(pool)
            .instrument(span.clone())
            .await;

        match result {
            Ok(_) => return Ok(token),
            Err(err) if is_unique_violation(&err) => {}
            Err(err) => return Err(err).context("failed to insert session"),
        }
    }

    Err(anyhow!("failed to generate unique session token"))
}

fn generate_session_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate session token")?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

/// Hash a session token so raw values never touch the database.
fn hash_session_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

fn hash_password(password: &SecretString) -> Result<String> {
    let salt = SaltString::generate(&mut HashOsRng);
    Argon2::default()
        .hash_password(password.expose_secret().as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| anyhow!("failed to hash password: {err}"))
}

fn verify_password(password: &SecretString, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.expose_secret().as_bytes(), &parsed)
        .is_ok()
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}
