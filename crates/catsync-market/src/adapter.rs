//! The marketplace adapter seam.
//!
//! One generic sync engine drives N marketplaces; everything
//! marketplace-specific (endpoints, auth headers, identifier quirks, batch
//! ceilings) lives behind [`MarketplaceAdapter`]. Adapters normalize wire
//! payloads into the neutral record types from `catsync-core` and are
//! expected to run every call through
//! [`retry_with_backoff`](crate::retry::retry_with_backoff).

use async_trait::async_trait;

use catsync_core::{
    AttributesRecord, ImageRecord, ListedOffer, Marketplace, PriceRecord, PriceTag, StockRecord,
};

use crate::error::MarketError;
use crate::paginate::Page;

/// A batched price write-back request for one offer.
///
/// Carries all three identifiers because marketplaces disagree about which
/// one keys a price write: ozon takes the merchant offer id, wildberries the
/// marketplace-assigned numeric id.
#[derive(Debug, Clone)]
pub struct PriceUpdate {
    pub offer_id: String,
    pub sku: Option<String>,
    pub primary_id: Option<String>,
    pub price: PriceTag,
}

/// Per-offer failure inside an otherwise accepted price write-back.
#[derive(Debug, Clone)]
pub struct PriceUpdateError {
    pub offer_id: String,
    pub message: String,
}

/// Result of one `update_prices` batch.
#[derive(Debug, Default)]
pub struct PriceUpdateOutcome {
    pub updated: usize,
    pub errors: Vec<PriceUpdateError>,
}

impl PriceUpdateOutcome {
    pub fn absorb(&mut self, other: PriceUpdateOutcome) {
        self.updated += other.updated;
        self.errors.extend(other.errors);
    }
}

/// One storefront's connection to its marketplace API.
///
/// All `ids` parameters receive listing `primary_id` values; the facet
/// responses may come back keyed by any identifier the marketplace chooses
/// to echo, which is why every returned record carries its own `keys` and
/// the merger joins by candidate-key priority rather than position.
#[async_trait]
pub trait MarketplaceAdapter: Send + Sync {
    fn marketplace(&self) -> Marketplace;

    /// Storefront (seller account) name, for logging and link rows.
    fn storefront(&self) -> &str;

    /// The marketplace's per-call identifier ceiling for batched facet
    /// lookups. The engine clamps its configured batch size to this.
    fn batch_ceiling(&self) -> usize;

    /// One page of the offer listing.
    async fn list_offers(
        &self,
        cursor: Option<String>,
        page_size: u32,
    ) -> Result<Page<ListedOffer>, MarketError>;

    /// One page of descriptive metadata for a batch of ids.
    async fn attributes(
        &self,
        ids: &[String],
        cursor: Option<String>,
        page_size: u32,
    ) -> Result<Page<AttributesRecord>, MarketError>;

    /// Image URLs for a batch of ids.
    async fn images(&self, ids: &[String]) -> Result<Vec<ImageRecord>, MarketError>;

    /// Stock levels for a batch of ids. A marketplace that reports one row
    /// per warehouse returns multiple records per id; the merger sums them.
    async fn stocks(&self, ids: &[String]) -> Result<Vec<StockRecord>, MarketError>;

    /// One page of prices for a batch of ids.
    async fn prices(
        &self,
        ids: &[String],
        cursor: Option<String>,
    ) -> Result<Page<PriceRecord>, MarketError>;

    /// Batched price write-back. Same retry discipline as the reads; the
    /// engine chunks `updates` to the batch ceiling before calling.
    async fn update_prices(
        &self,
        updates: &[PriceUpdate],
    ) -> Result<PriceUpdateOutcome, MarketError>;
}
