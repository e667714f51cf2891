//! Batched price write-back.
//!
//! The inbound request names offers by vendor code; marketplace APIs key
//! price writes by their own identifiers, so each update is enriched from
//! the stored storefront link before being chunked to the adapter's batch
//! ceiling and written with the same pacing discipline as the reads.

use std::collections::HashMap;
use std::time::Duration;

use catsync_core::PriceTag;
use catsync_market::{PriceUpdate, PriceUpdateError, PriceUpdateOutcome};

use crate::sync::SyncEngine;
use crate::EngineError;

/// One requested price change, as supplied by the caller.
#[derive(Debug, Clone)]
pub struct PriceChange {
    pub offer_id: String,
    pub price: PriceTag,
}

impl SyncEngine {
    /// Pushes price changes to one storefront's marketplace.
    ///
    /// Offers with no stored link on that storefront are reported as
    /// per-offer errors rather than failing the push. A chunk that fails
    /// after the adapter's retries fails the whole call — unlike a sync
    /// read, a half-applied write should be visible to the caller.
    ///
    /// # Errors
    ///
    /// - [`EngineError::UnknownStorefront`] for an unconfigured slug.
    /// - [`EngineError::Market`] for credential or transport failures.
    /// - [`EngineError::Db`] when the link lookup fails.
    pub async fn push_prices(
        &self,
        storefront_slug: &str,
        changes: Vec<PriceChange>,
    ) -> Result<PriceUpdateOutcome, EngineError> {
        let storefront = self.storefront_by_slug(storefront_slug)?;
        let adapter = self.build_adapter(storefront)?;

        let links = catsync_db::list_links_for_storefront(self.pool(), storefront_slug).await?;
        let by_offer: HashMap<&str, &catsync_db::StorefrontLinkRow> =
            links.iter().map(|l| (l.offer_id.as_str(), l)).collect();

        let mut outcome = PriceUpdateOutcome::default();
        let mut updates = Vec::with_capacity(changes.len());
        for change in changes {
            match by_offer.get(change.offer_id.as_str()) {
                Some(link) => updates.push(PriceUpdate {
                    offer_id: change.offer_id,
                    sku: link.sku.clone(),
                    primary_id: link.primary_id.clone(),
                    price: change.price,
                }),
                None => outcome.errors.push(PriceUpdateError {
                    offer_id: change.offer_id,
                    message: format!("offer is not linked on storefront '{storefront_slug}'"),
                }),
            }
        }

        let ceiling = self
            .config()
            .market_batch_size
            .min(adapter.batch_ceiling())
            .max(1);
        let delay_ms = self.config().market_inter_batch_delay_ms;

        let mut first = true;
        for chunk in updates.chunks(ceiling) {
            if !first && delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
            first = false;
            let batch_outcome = adapter.update_prices(chunk).await?;
            outcome.absorb(batch_outcome);
        }

        tracing::info!(
            storefront = storefront_slug,
            updated = outcome.updated,
            errors = outcome.errors.len(),
            "price push finished"
        );
        Ok(outcome)
    }
}
