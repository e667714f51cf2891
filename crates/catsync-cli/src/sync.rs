//! Foreground catalog sync.

use std::sync::Arc;

use catsync_engine::{SyncEngine, SyncOptions};

/// Runs a sync for all enabled storefronts (or one, when `storefront` is
/// given) and prints the summary. Exits non-zero when the run fails
/// outright; a degraded run (some offers errored) still succeeds.
pub async fn run(
    pool: sqlx::PgPool,
    config: Arc<catsync_core::AppConfig>,
    storefront: Option<String>,
    max_offers: Option<usize>,
) -> anyhow::Result<()> {
    let registry = catsync_core::load_storefronts(&config.storefronts_path)?;
    let engine = SyncEngine::new(pool, config, registry.storefronts);

    let options = SyncOptions {
        storefront,
        max_offers,
        trigger_source: "cli".to_owned(),
    };
    let summary = engine.run_once(options).await?;

    println!(
        "sync finished: {} offers seen, {} synced, {} errors in {}ms",
        summary.total, summary.synced, summary.errors, summary.elapsed_ms
    );
    if summary.missing_vendor_code > 0 {
        println!(
            "  {} offers skipped — no vendor code to reconcile by",
            summary.missing_vendor_code
        );
    }
    if summary.unmatched_offers > 0 {
        println!(
            "  {} offers had no facet match under any key strategy",
            summary.unmatched_offers
        );
    }
    if summary.failed_facet_batches > 0 {
        println!(
            "  {} facet batches failed after retries (degraded data)",
            summary.failed_facet_batches
        );
    }
    for storefront in &summary.storefronts {
        println!(
            "  [{}] {}: {} seen, {} synced, {} errors{}",
            storefront.status,
            storefront.storefront,
            storefront.seen,
            storefront.synced,
            storefront.errors,
            storefront
                .error_message
                .as_deref()
                .map(|m| format!(" — {m}"))
                .unwrap_or_default()
        );
    }

    Ok(())
}
