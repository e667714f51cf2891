//! The external catalog synchronization engine: single-flight job tracking,
//! per-storefront orchestration, cross-catalog product linking, and
//! idempotent persistence of reconciled offers.

use thiserror::Error;

pub mod job;
pub mod linker;
pub mod prices;
pub mod sync;
pub mod writer;

pub use catsync_db::DbError;
pub use catsync_market::MarketError;

pub use job::{
    JobError, JobHandle, JobProgress, JobRegistry, JobSnapshot, JobStage, StorefrontSummary,
    SyncSummary,
};
pub use prices::PriceChange;
pub use sync::{AdapterFactory, SyncEngine, SyncOptions};
pub use writer::WriteStats;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown storefront '{0}'")]
    UnknownStorefront(String),

    #[error("no enabled storefronts are configured")]
    NoStorefronts,

    #[error(transparent)]
    Job(#[from] JobError),

    #[error(transparent)]
    Market(#[from] MarketError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("{0}")]
    SyncFailed(String),
}
