//! Database operations for `sync_runs` and `sync_run_storefronts`.
//!
//! The in-memory job tracker answers "what is happening right now"; these
//! tables answer "what happened" across restarts. Status transitions are
//! guarded in SQL (`WHERE status = …`) so a crashed or duplicated caller
//! cannot move a run backwards.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `sync_runs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SyncRunRow {
    pub id: i64,
    pub public_id: Uuid,
    /// What started the run: `"api"`, `"cli"`, or `"scheduler"`.
    pub trigger_source: String,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub offers_seen: i32,
    pub offers_synced: i32,
    pub offers_failed: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A row from the `sync_run_storefronts` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SyncRunStorefrontRow {
    pub id: i64,
    pub sync_run_id: i64,
    pub storefront: String,
    pub status: String,
    pub offers_seen: i32,
    pub offers_synced: i32,
    pub offers_failed: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// sync_runs operations
// ---------------------------------------------------------------------------

/// Creates a new sync run in `queued` status.
///
/// Generates a UUID in Rust and binds it to `public_id`. Returns the full
/// newly-created row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_sync_run(pool: &PgPool, trigger_source: &str) -> Result<SyncRunRow, DbError> {
    let public_id = Uuid::new_v4();

    let row = sqlx::query_as::<_, SyncRunRow>(
        "INSERT INTO sync_runs (public_id, trigger_source, status) \
         VALUES ($1, $2, 'queued') \
         RETURNING id, public_id, trigger_source, status, started_at, completed_at, \
                   offers_seen, offers_synced, offers_failed, error_message, created_at",
    )
    .bind(public_id)
    .bind(trigger_source)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Marks a run as `running` and sets `started_at = NOW()`.
///
/// # Errors
///
/// Returns [`DbError::InvalidSyncRunTransition`] when the run is not
/// `queued`, or [`DbError::Sqlx`] if the update fails.
pub async fn start_sync_run(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE sync_runs \
         SET status = 'running', started_at = NOW() \
         WHERE id = $1 AND status = 'queued'",
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidSyncRunTransition {
            id,
            expected_status: "queued",
        });
    }

    Ok(())
}

/// Marks a run as `succeeded`, recording the final offer counters.
///
/// # Errors
///
/// Returns [`DbError::InvalidSyncRunTransition`] when the run is not
/// `running`, or [`DbError::Sqlx`] if the update fails.
pub async fn complete_sync_run(
    pool: &PgPool,
    id: i64,
    offers_seen: i32,
    offers_synced: i32,
    offers_failed: i32,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE sync_runs \
         SET status = 'succeeded', completed_at = NOW(), \
             offers_seen = $1, offers_synced = $2, offers_failed = $3 \
         WHERE id = $4 AND status = 'running'",
    )
    .bind(offers_seen)
    .bind(offers_synced)
    .bind(offers_failed)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidSyncRunTransition {
            id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// Marks a run as `failed`, sets `completed_at = NOW()` and `error_message`.
///
/// # Errors
///
/// Returns [`DbError::InvalidSyncRunTransition`] when the run is not
/// `running`, or [`DbError::Sqlx`] if the update fails.
pub async fn fail_sync_run(pool: &PgPool, id: i64, error_message: &str) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE sync_runs \
         SET status = 'failed', completed_at = NOW(), error_message = $1 \
         WHERE id = $2 AND status = 'running'",
    )
    .bind(error_message)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidSyncRunTransition {
            id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// Marks a run as `cancelled`, recording whatever counters it reached.
///
/// # Errors
///
/// Returns [`DbError::InvalidSyncRunTransition`] when the run is not
/// `running`, or [`DbError::Sqlx`] if the update fails.
pub async fn cancel_sync_run(
    pool: &PgPool,
    id: i64,
    offers_seen: i32,
    offers_synced: i32,
    offers_failed: i32,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE sync_runs \
         SET status = 'cancelled', completed_at = NOW(), \
             offers_seen = $1, offers_synced = $2, offers_failed = $3 \
         WHERE id = $4 AND status = 'running'",
    )
    .bind(offers_seen)
    .bind(offers_synced)
    .bind(offers_failed)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidSyncRunTransition {
            id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// Fetches a single run by its internal `id`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists with the given `id`, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_sync_run(pool: &PgPool, id: i64) -> Result<SyncRunRow, DbError> {
    let row = sqlx::query_as::<_, SyncRunRow>(
        "SELECT id, public_id, trigger_source, status, started_at, completed_at, \
                offers_seen, offers_synced, offers_failed, error_message, created_at \
         FROM sync_runs \
         WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}

/// Returns the most recent `limit` runs, ordered by `created_at DESC`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_sync_runs(pool: &PgPool, limit: i64) -> Result<Vec<SyncRunRow>, DbError> {
    let rows = sqlx::query_as::<_, SyncRunRow>(
        "SELECT id, public_id, trigger_source, status, started_at, completed_at, \
                offers_seen, offers_synced, offers_failed, error_message, created_at \
         FROM sync_runs \
         ORDER BY created_at DESC, id DESC \
         LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

// ---------------------------------------------------------------------------
// sync_run_storefronts operations
// ---------------------------------------------------------------------------

/// Inserts or updates the per-storefront result row for a sync run.
///
/// Conflicts on `(sync_run_id, storefront)` update `status`, the counters,
/// and `error_message` in place.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_sync_run_storefront(
    pool: &PgPool,
    run_id: i64,
    storefront: &str,
    status: &str,
    offers_seen: i32,
    offers_synced: i32,
    offers_failed: i32,
    error_message: Option<&str>,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO sync_run_storefronts \
             (sync_run_id, storefront, status, offers_seen, offers_synced, \
              offers_failed, error_message) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         ON CONFLICT (sync_run_id, storefront) DO UPDATE SET \
             status        = EXCLUDED.status, \
             offers_seen   = EXCLUDED.offers_seen, \
             offers_synced = EXCLUDED.offers_synced, \
             offers_failed = EXCLUDED.offers_failed, \
             error_message = EXCLUDED.error_message",
    )
    .bind(run_id)
    .bind(storefront)
    .bind(status)
    .bind(offers_seen)
    .bind(offers_synced)
    .bind(offers_failed)
    .bind(error_message)
    .execute(pool)
    .await?;

    Ok(())
}

/// Returns all storefront-level result rows for a given sync run.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_sync_run_storefronts(
    pool: &PgPool,
    run_id: i64,
) -> Result<Vec<SyncRunStorefrontRow>, DbError> {
    let rows = sqlx::query_as::<_, SyncRunStorefrontRow>(
        "SELECT id, sync_run_id, storefront, status, offers_seen, offers_synced, \
                offers_failed, error_message, created_at \
         FROM sync_run_storefronts \
         WHERE sync_run_id = $1",
    )
    .bind(run_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
