//! Database operations for `canonical_products` and `storefront_links`.
//!
//! Both upserts are single-statement `INSERT … ON CONFLICT` forms keyed by
//! their natural keys, so a crashed or re-run sync converges to the same end
//! state without a read-then-write transaction per record.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::PgPool;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `canonical_products` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CanonicalProductRow {
    pub id: i64,
    pub vendor_code: String,
    pub name: String,
    /// `TRUE` while `name` is the vendor code standing in for a missing
    /// display name.
    pub name_is_placeholder: bool,
    pub description: Option<String>,
    pub category: Option<String>,
    /// JSON array of image URLs.
    pub images: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A row from the `storefront_links` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StorefrontLinkRow {
    pub id: i64,
    pub product_id: i64,
    pub storefront: String,
    pub offer_id: String,
    pub sku: Option<String>,
    pub primary_id: Option<String>,
    pub price: Option<Decimal>,
    pub currency_code: Option<String>,
    pub stock_available: i64,
    pub stock_reserved: i64,
    pub status: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// canonical_products operations
// ---------------------------------------------------------------------------

/// Updates to a product's shared fields. `None` means "leave the stored value
/// untouched" — the writer maps empty or placeholder values to `None` before
/// calling, which is what keeps one storefront's sparse data from erasing
/// another storefront's good data.
#[derive(Debug, Clone, Default)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub images: Option<Vec<String>>,
}

/// Upserts a canonical product by vendor code.
///
/// On first sighting the row is created; a `None` name falls back to the
/// vendor code itself and is flagged `name_is_placeholder`. On conflict,
/// each patch field updates the row only when `Some`; a real name clears the
/// placeholder flag.
///
/// Returns the internal `id` of the upserted row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_canonical_product(
    pool: &PgPool,
    vendor_code: &str,
    patch: &ProductPatch,
) -> Result<i64, DbError> {
    let images = patch.images.as_ref().map(|urls| json!(urls));

    let id: i64 = sqlx::query_scalar::<_, i64>(
        "INSERT INTO canonical_products \
             (vendor_code, name, name_is_placeholder, description, category, images) \
         VALUES ($1, COALESCE($2, $1), $2 IS NULL, $3, $4, COALESCE($5, '[]'::jsonb)) \
         ON CONFLICT (vendor_code) DO UPDATE SET \
             name                = COALESCE($2, canonical_products.name), \
             name_is_placeholder = CASE WHEN $2 IS NOT NULL THEN FALSE \
                                        ELSE canonical_products.name_is_placeholder END, \
             description         = COALESCE($3, canonical_products.description), \
             category            = COALESCE($4, canonical_products.category), \
             images              = COALESCE($5, canonical_products.images), \
             updated_at          = NOW() \
         RETURNING id",
    )
    .bind(vendor_code)
    .bind(&patch.name)
    .bind(&patch.description)
    .bind(&patch.category)
    .bind(images)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

/// Fetches a product by its vendor code, if present.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_product_by_vendor_code(
    pool: &PgPool,
    vendor_code: &str,
) -> Result<Option<CanonicalProductRow>, DbError> {
    let row = sqlx::query_as::<_, CanonicalProductRow>(
        "SELECT id, vendor_code, name, name_is_placeholder, description, category, \
                images, created_at, updated_at \
         FROM canonical_products \
         WHERE vendor_code = $1",
    )
    .bind(vendor_code)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Total number of canonical products.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_products(pool: &PgPool) -> Result<i64, DbError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM canonical_products")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

// ---------------------------------------------------------------------------
// storefront_links operations
// ---------------------------------------------------------------------------

/// Storefront-local fields for a link row. These are authoritative from the
/// storefront and always overwrite on conflict — freshness wins here, unlike
/// the product's shared fields.
#[derive(Debug, Clone)]
pub struct LinkFields {
    pub offer_id: String,
    pub sku: Option<String>,
    pub primary_id: Option<String>,
    /// Decimal string, bound as `TEXT` and cast to `NUMERIC(12,2)` inside the
    /// statement so the database performs the coercion consistently.
    pub price: Option<String>,
    pub currency_code: Option<String>,
    pub stock_available: i64,
    pub stock_reserved: i64,
    pub status: Option<String>,
}

/// Upserts the link between a canonical product and one storefront listing.
///
/// Conflicts on `(product_id, storefront)` overwrite every storefront-local
/// field and refresh `last_synced_at`. The independent
/// `(storefront, offer_id)` uniqueness is enforced by a table constraint; a
/// violation surfaces as [`DbError::Sqlx`] for the caller to count.
///
/// Returns the internal `id` of the upserted row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_storefront_link(
    pool: &PgPool,
    product_id: i64,
    storefront: &str,
    fields: &LinkFields,
) -> Result<i64, DbError> {
    let id: i64 = sqlx::query_scalar::<_, i64>(
        "INSERT INTO storefront_links \
             (product_id, storefront, offer_id, sku, primary_id, price, currency_code, \
              stock_available, stock_reserved, status, last_synced_at) \
         VALUES ($1, $2, $3, $4, $5, $6::numeric(12,2), $7, $8, $9, $10, NOW()) \
         ON CONFLICT (product_id, storefront) DO UPDATE SET \
             offer_id        = EXCLUDED.offer_id, \
             sku             = EXCLUDED.sku, \
             primary_id      = EXCLUDED.primary_id, \
             price           = EXCLUDED.price, \
             currency_code   = EXCLUDED.currency_code, \
             stock_available = EXCLUDED.stock_available, \
             stock_reserved  = EXCLUDED.stock_reserved, \
             status          = EXCLUDED.status, \
             last_synced_at  = NOW(), \
             updated_at      = NOW() \
         RETURNING id",
    )
    .bind(product_id)
    .bind(storefront)
    .bind(&fields.offer_id)
    .bind(&fields.sku)
    .bind(&fields.primary_id)
    .bind(&fields.price)
    .bind(&fields.currency_code)
    .bind(fields.stock_available)
    .bind(fields.stock_reserved)
    .bind(&fields.status)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

/// Fetches the link for one (product, storefront) pair, if present.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_link(
    pool: &PgPool,
    product_id: i64,
    storefront: &str,
) -> Result<Option<StorefrontLinkRow>, DbError> {
    let row = sqlx::query_as::<_, StorefrontLinkRow>(
        "SELECT id, product_id, storefront, offer_id, sku, primary_id, price, \
                currency_code, stock_available, stock_reserved, status, \
                last_synced_at, created_at, updated_at \
         FROM storefront_links \
         WHERE product_id = $1 AND storefront = $2",
    )
    .bind(product_id)
    .bind(storefront)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Returns every link for one storefront. Used by the price push to resolve
/// offers back to their marketplace identifiers.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_links_for_storefront(
    pool: &PgPool,
    storefront: &str,
) -> Result<Vec<StorefrontLinkRow>, DbError> {
    let rows = sqlx::query_as::<_, StorefrontLinkRow>(
        "SELECT id, product_id, storefront, offer_id, sku, primary_id, price, \
                currency_code, stock_available, stock_reserved, status, \
                last_synced_at, created_at, updated_at \
         FROM storefront_links \
         WHERE storefront = $1 \
         ORDER BY offer_id",
    )
    .bind(storefront)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
