//! SQLite Persistent Storage
//!
//! Provides durable storage for payment intents, mint records and
//! withdrawals that survives service restarts. The mint table is the
//! payment id → queue id mapping that keeps webhook minting exactly-once.
//! Uses connection pooling via r2d2 for concurrent access.

use async_trait::async_trait;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;

use super::traits::{resolve_claim, PaymentStore, StorageError, StorageResult, WithdrawalStore};
use crate::types::payment::{MintClaim, MintRecord, MintStatus, PaymentIntent, PaymentStatus};
use crate::types::withdrawal::{WithdrawalRecord, WithdrawalStatus};

/// SQLite-backed store with connection pooling
pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
}

fn db_err(e: rusqlite::Error) -> StorageError {
    StorageError::Database(e.to_string())
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.extended_code == 1555 || err.extended_code == 2067
    )
}

/// Primary key or burn queue id already taken
fn withdrawal_conflict(e: rusqlite::Error, record: &WithdrawalRecord) -> StorageError {
    if !is_constraint_violation(&e) {
        return db_err(e);
    }
    match &record.burn_queue_id {
        Some(queue_id) if e.to_string().contains("burn_queue_id") => {
            StorageError::Duplicate(format!("burn queue id: {}", queue_id))
        }
        _ => StorageError::Duplicate(format!("withdrawal: {}", record.id)),
    }
}

fn parse_column<T: FromStr>(value: String, column: &str) -> rusqlite::Result<T> {
    value.parse().map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("invalid {}: {}", column, value).into(),
        )
    })
}

impl SqliteStore {
    /// Create a new store with the given database path
    ///
    /// Creates the database file and runs migrations if needed.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StorageError> {
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let manager = SqliteConnectionManager::file(db_path)
            .with_init(|c| c.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;"));
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations()?;

        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self, StorageError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations()?;

        Ok(store)
    }

    /// Get a connection from the pool
    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, StorageError> {
        self.pool
            .get()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<(), StorageError> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS payment_intents (
                id TEXT PRIMARY KEY,
                amount_brl TEXT NOT NULL,
                recipient_address TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                notification_url TEXT,
                idempotency_key TEXT NOT NULL UNIQUE,
                qr_code TEXT,
                qr_code_base64 TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS mints (
                payment_id TEXT PRIMARY KEY,
                recipient_address TEXT NOT NULL,
                token_amount INTEGER NOT NULL,
                status TEXT NOT NULL,
                queue_id TEXT,
                error TEXT,
                attempts INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS withdrawals (
                id TEXT PRIMARY KEY,
                user_address TEXT NOT NULL,
                pix_key TEXT NOT NULL,
                amount TEXT NOT NULL,
                token_amount INTEGER NOT NULL,
                status TEXT NOT NULL,
                burn_queue_id TEXT,
                error TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_intents_status ON payment_intents(status);
            CREATE INDEX IF NOT EXISTS idx_mints_status ON mints(status);
            CREATE INDEX IF NOT EXISTS idx_withdrawals_user ON withdrawals(user_address COLLATE NOCASE);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_withdrawals_burn_queue
                ON withdrawals(burn_queue_id) WHERE burn_queue_id IS NOT NULL;
            "#,
        )
        .map_err(db_err)?;

        Ok(())
    }

    fn row_to_intent(row: &rusqlite::Row) -> rusqlite::Result<PaymentIntent> {
        let amount: String = row.get("amount_brl")?;
        let status: String = row.get("status")?;

        Ok(PaymentIntent {
            id: row.get("id")?,
            amount_brl: parse_column::<Decimal>(amount, "amount_brl")?,
            recipient_address: row.get("recipient_address")?,
            status: parse_column::<PaymentStatus>(status, "status")?,
            notification_url: row.get("notification_url")?,
            idempotency_key: row.get("idempotency_key")?,
            qr_code: row.get("qr_code")?,
            qr_code_base64: row.get("qr_code_base64")?,
            created_at: row.get::<_, i64>("created_at")? as u64,
            updated_at: row.get::<_, i64>("updated_at")? as u64,
        })
    }

    fn row_to_mint(row: &rusqlite::Row) -> rusqlite::Result<MintRecord> {
        let status: String = row.get("status")?;

        Ok(MintRecord {
            payment_id: row.get("payment_id")?,
            recipient_address: row.get("recipient_address")?,
            token_amount: row.get::<_, i64>("token_amount")? as u64,
            status: parse_column::<MintStatus>(status, "status")?,
            queue_id: row.get("queue_id")?,
            error: row.get("error")?,
            attempts: row.get::<_, i64>("attempts")? as u32,
            created_at: row.get::<_, i64>("created_at")? as u64,
            updated_at: row.get::<_, i64>("updated_at")? as u64,
        })
    }

    fn row_to_withdrawal(row: &rusqlite::Row) -> rusqlite::Result<WithdrawalRecord> {
        let amount: String = row.get("amount")?;
        let status: String = row.get("status")?;

        Ok(WithdrawalRecord {
            id: row.get("id")?,
            user_address: row.get("user_address")?,
            pix_key: row.get("pix_key")?,
            amount: parse_column::<Decimal>(amount, "amount")?,
            token_amount: row.get::<_, i64>("token_amount")? as u64,
            status: parse_column::<WithdrawalStatus>(status, "status")?,
            burn_queue_id: row.get("burn_queue_id")?,
            error: row.get("error")?,
            created_at: row.get::<_, i64>("created_at")? as u64,
            updated_at: row.get::<_, i64>("updated_at")? as u64,
        })
    }

    // Synchronous helper methods for the trait implementations

    fn insert_intent_sync(&self, intent: &PaymentIntent) -> Result<(), StorageError> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO payment_intents (
                id, amount_brl, recipient_address, status, notification_url,
                idempotency_key, qr_code, qr_code_base64, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                intent.id,
                intent.amount_brl.to_string(),
                intent.recipient_address,
                intent.status.to_string(),
                intent.notification_url,
                intent.idempotency_key,
                intent.qr_code,
                intent.qr_code_base64,
                intent.created_at as i64,
                intent.updated_at as i64,
            ],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                return StorageError::Duplicate(format!("payment: {}", intent.id));
            }
            db_err(e)
        })?;

        Ok(())
    }

    fn get_intent_sync(&self, id: &str) -> Result<Option<PaymentIntent>, StorageError> {
        let conn = self.conn()?;

        conn.query_row(
            "SELECT * FROM payment_intents WHERE id = ?1",
            params![id],
            |row| Self::row_to_intent(row),
        )
        .optional()
        .map_err(db_err)
    }

    fn get_intent_by_key_sync(&self, key: &str) -> Result<Option<PaymentIntent>, StorageError> {
        let conn = self.conn()?;

        conn.query_row(
            "SELECT * FROM payment_intents WHERE idempotency_key = ?1",
            params![key],
            |row| Self::row_to_intent(row),
        )
        .optional()
        .map_err(db_err)
    }

    fn update_intent_status_sync(
        &self,
        id: &str,
        status: PaymentStatus,
    ) -> Result<PaymentIntent, StorageError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;

        let mut intent = tx
            .query_row(
                "SELECT * FROM payment_intents WHERE id = ?1",
                params![id],
                |row| Self::row_to_intent(row),
            )
            .optional()
            .map_err(db_err)?
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;

        if intent.apply_status(status) {
            tx.execute(
                "UPDATE payment_intents SET status = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, intent.status.to_string(), intent.updated_at as i64],
            )
            .map_err(db_err)?;
        }
        tx.commit().map_err(db_err)?;

        Ok(intent)
    }

    fn claim_mint_sync(
        &self,
        payment_id: &str,
        recipient_address: &str,
        token_amount: u64,
    ) -> Result<MintClaim, StorageError> {
        let mut conn = self.conn()?;
        // IMMEDIATE takes the write lock before the read
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;

        let existing = tx
            .query_row(
                "SELECT * FROM mints WHERE payment_id = ?1",
                params![payment_id],
                |row| Self::row_to_mint(row),
            )
            .optional()
            .map_err(db_err)?;

        let claim = resolve_claim(existing, payment_id, recipient_address, token_amount);
        if let MintClaim::Claimed(record) = &claim {
            tx.execute(
                r#"
                INSERT INTO mints (
                    payment_id, recipient_address, token_amount, status, queue_id,
                    error, attempts, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ON CONFLICT(payment_id) DO UPDATE SET
                    status = excluded.status,
                    error = excluded.error,
                    attempts = excluded.attempts,
                    updated_at = excluded.updated_at
                "#,
                params![
                    record.payment_id,
                    record.recipient_address,
                    record.token_amount as i64,
                    record.status.to_string(),
                    record.queue_id,
                    record.error,
                    record.attempts as i64,
                    record.created_at as i64,
                    record.updated_at as i64,
                ],
            )
            .map_err(db_err)?;
        }
        tx.commit().map_err(db_err)?;

        Ok(claim)
    }

    fn update_mint_sync<F>(&self, payment_id: &str, apply: F) -> Result<MintRecord, StorageError>
    where
        F: FnOnce(&mut MintRecord),
    {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;

        let mut record = tx
            .query_row(
                "SELECT * FROM mints WHERE payment_id = ?1",
                params![payment_id],
                |row| Self::row_to_mint(row),
            )
            .optional()
            .map_err(db_err)?
            .ok_or_else(|| StorageError::NotFound(format!("mint for payment {}", payment_id)))?;

        apply(&mut record);

        tx.execute(
            r#"
            UPDATE mints SET status = ?2, queue_id = ?3, error = ?4, updated_at = ?5
            WHERE payment_id = ?1
            "#,
            params![
                record.payment_id,
                record.status.to_string(),
                record.queue_id,
                record.error,
                record.updated_at as i64,
            ],
        )
        .map_err(db_err)?;
        tx.commit().map_err(db_err)?;

        Ok(record)
    }

    fn get_mint_sync(&self, payment_id: &str) -> Result<Option<MintRecord>, StorageError> {
        let conn = self.conn()?;

        conn.query_row(
            "SELECT * FROM mints WHERE payment_id = ?1",
            params![payment_id],
            |row| Self::row_to_mint(row),
        )
        .optional()
        .map_err(db_err)
    }

    fn insert_withdrawal_sync(&self, record: &WithdrawalRecord) -> Result<(), StorageError> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO withdrawals (
                id, user_address, pix_key, amount, token_amount, status,
                burn_queue_id, error, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                record.id,
                record.user_address,
                record.pix_key,
                record.amount.to_string(),
                record.token_amount as i64,
                record.status.to_string(),
                record.burn_queue_id,
                record.error,
                record.created_at as i64,
                record.updated_at as i64,
            ],
        )
        .map_err(|e| withdrawal_conflict(e, record))?;

        Ok(())
    }

    fn update_withdrawal_sync(&self, record: &WithdrawalRecord) -> Result<(), StorageError> {
        let conn = self.conn()?;

        let rows_affected = conn
            .execute(
                r#"
            UPDATE withdrawals SET
                status = ?2,
                burn_queue_id = ?3,
                error = ?4,
                updated_at = ?5
            WHERE id = ?1
            "#,
                params![
                    record.id,
                    record.status.to_string(),
                    record.burn_queue_id,
                    record.error,
                    record.updated_at as i64,
                ],
            )
            .map_err(|e| withdrawal_conflict(e, record))?;

        if rows_affected == 0 {
            return Err(StorageError::NotFound(record.id.clone()));
        }

        Ok(())
    }

    fn get_withdrawal_sync(&self, id: &str) -> Result<Option<WithdrawalRecord>, StorageError> {
        let conn = self.conn()?;

        conn.query_row(
            "SELECT * FROM withdrawals WHERE id = ?1",
            params![id],
            |row| Self::row_to_withdrawal(row),
        )
        .optional()
        .map_err(db_err)
    }

    fn list_withdrawals_sync(&self, user_address: &str) -> Result<Vec<WithdrawalRecord>, StorageError> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(
                r#"
            SELECT * FROM withdrawals
            WHERE user_address = ?1 COLLATE NOCASE
            ORDER BY created_at DESC
            "#,
            )
            .map_err(db_err)?;

        let records = stmt
            .query_map(params![user_address], |row| Self::row_to_withdrawal(row))
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;

        Ok(records)
    }
}

#[async_trait]
impl PaymentStore for SqliteStore {
    async fn insert_intent(&self, intent: &PaymentIntent) -> StorageResult<()> {
        self.insert_intent_sync(intent)
    }

    async fn get_intent(&self, id: &str) -> StorageResult<Option<PaymentIntent>> {
        self.get_intent_sync(id)
    }

    async fn get_intent_by_key(&self, key: &str) -> StorageResult<Option<PaymentIntent>> {
        self.get_intent_by_key_sync(key)
    }

    async fn update_intent_status(
        &self,
        id: &str,
        status: PaymentStatus,
    ) -> StorageResult<PaymentIntent> {
        self.update_intent_status_sync(id, status)
    }

    async fn claim_mint(
        &self,
        payment_id: &str,
        recipient_address: &str,
        token_amount: u64,
    ) -> StorageResult<MintClaim> {
        self.claim_mint_sync(payment_id, recipient_address, token_amount)
    }

    async fn complete_mint(&self, payment_id: &str, queue_id: &str) -> StorageResult<MintRecord> {
        self.update_mint_sync(payment_id, |r| r.mark_submitted(queue_id.to_string()))
    }

    async fn fail_mint(&self, payment_id: &str, error: &str) -> StorageResult<MintRecord> {
        self.update_mint_sync(payment_id, |r| r.mark_failed(error.to_string()))
    }

    async fn hold_mint(&self, payment_id: &str, error: &str) -> StorageResult<MintRecord> {
        self.update_mint_sync(payment_id, |r| r.mark_unknown(error.to_string()))
    }

    async fn get_mint(&self, payment_id: &str) -> StorageResult<Option<MintRecord>> {
        self.get_mint_sync(payment_id)
    }
}

#[async_trait]
impl WithdrawalStore for SqliteStore {
    async fn insert_withdrawal(&self, record: &WithdrawalRecord) -> StorageResult<()> {
        self.insert_withdrawal_sync(record)
    }

    async fn update_withdrawal(&self, record: &WithdrawalRecord) -> StorageResult<()> {
        self.update_withdrawal_sync(record)
    }

    async fn get_withdrawal(&self, id: &str) -> StorageResult<Option<WithdrawalRecord>> {
        self.get_withdrawal_sync(id)
    }

    async fn list_withdrawals(&self, user_address: &str) -> StorageResult<Vec<WithdrawalRecord>> {
        self.list_withdrawals_sync(user_address)
    }
}
