//! Marketplace access layer: the adapter seam plus the generic fetch
//! machinery (cursor pagination, retry with backoff, batched fan-out) and
//! the multi-key facet merger.

mod adapter;
mod adapters;
mod error;
pub mod batch;
pub mod merge;
pub mod paginate;
pub mod retry;

pub use adapter::{
    MarketplaceAdapter, PriceUpdate, PriceUpdateError, PriceUpdateOutcome,
};
pub use adapters::{build_adapter, OzonAdapter, WildberriesAdapter};
pub use batch::{chunk_ids, run_batched, BatchOutcome, BatchProgress, FailedBatch};
pub use error::MarketError;
pub use merge::{merge_offer, merge_offers, FacetIndex, FacetSet, KeyStrategy, MergeDiagnostics};
pub use paginate::{fetch_all_pages, Page, PageLimits, Paginated};
pub use retry::retry_with_backoff;
