//! Idempotent persistence of merged offers.
//!
//! Every offer goes through the find-or-create-by-natural-key upserts in
//! `catsync-db`; re-running the writer with identical input converges to the
//! same store state. Offers without a vendor code cannot be reconciled and
//! are skipped with a counted warning; a single record's write failure is
//! counted and never aborts the rest of the batch.

use catsync_core::MergedOffer;
use sqlx::PgPool;

use crate::linker;

/// How many skipped/failed offers are logged per batch before the log goes
/// quiet and only the counters keep moving.
const WRITE_LOG_SAMPLE: usize = 5;

#[derive(Debug, Default)]
pub struct WriteStats {
    pub synced: usize,
    pub missing_vendor_code: usize,
    pub failed: usize,
}

/// Persists a batch of merged offers for one storefront.
///
/// `on_progress` is called with the number of offers handled so far after
/// every offer, successful or not.
pub async fn persist_merged_offers<P>(
    pool: &PgPool,
    storefront: &str,
    offers: &[MergedOffer],
    mut on_progress: P,
) -> WriteStats
where
    P: FnMut(usize),
{
    let mut stats = WriteStats::default();

    for (index, offer) in offers.iter().enumerate() {
        match offer.vendor_code() {
            None => {
                stats.missing_vendor_code += 1;
                if stats.missing_vendor_code <= WRITE_LOG_SAMPLE {
                    tracing::warn!(
                        storefront,
                        primary_id = %offer.primary_id,
                        "offer has no vendor code and cannot be reconciled — skipping"
                    );
                }
            }
            Some(vendor_code) => {
                match linker::link_offer(pool, storefront, vendor_code, offer).await {
                    Ok(_) => stats.synced += 1,
                    Err(e) => {
                        stats.failed += 1;
                        if stats.failed <= WRITE_LOG_SAMPLE {
                            tracing::error!(
                                storefront,
                                vendor_code,
                                error = %e,
                                "failed to persist offer — continuing with the batch"
                            );
                        }
                    }
                }
            }
        }
        on_progress(index + 1);
    }

    stats
}
