//! The generic catalog sync engine.
//!
//! One background task per job walks every enabled storefront sequentially:
//! listing pagination, batched facet fan-out, multi-key merge, idempotent
//! persistence. A failure inside one storefront is recorded against that
//! storefront and the job moves on; only a failure before any storefront
//! starts is job-fatal. Progress lands in the [`JobRegistry`] after every
//! page walk, completed batch, and persisted offer; the durable
//! `sync_runs` tables record the same lifecycle across restarts.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use sqlx::PgPool;

use catsync_core::{AppConfig, StorefrontConfig};
use catsync_market::{
    chunk_ids, fetch_all_pages, merge_offers, run_batched, FacetSet, MarketError,
    MarketplaceAdapter, MergeDiagnostics, PageLimits,
};

use crate::job::{JobHandle, JobRegistry, StorefrontSummary, SyncSummary};
use crate::{writer, EngineError};

/// Per-trigger parameters.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Restrict the run to one storefront (matched by slug).
    pub storefront: Option<String>,
    /// Fetch at most this many offers per storefront ("first N only").
    pub max_offers: Option<usize>,
    /// What started the run: `"api"`, `"cli"`, or `"scheduler"`.
    pub trigger_source: String,
}

/// Counters for one storefront's slice of a run.
#[derive(Debug, Default)]
struct StorefrontOutcome {
    seen: usize,
    synced: usize,
    failed_writes: usize,
    missing_vendor_code: usize,
    unmatched: usize,
    failed_batches: usize,
}

impl StorefrontOutcome {
    fn errors(&self) -> usize {
        self.failed_writes + self.missing_vendor_code
    }
}

/// Pluggable adapter construction, replaced in tests with scripted adapters.
pub type AdapterFactory = Arc<
    dyn Fn(&StorefrontConfig, &AppConfig) -> Result<Arc<dyn MarketplaceAdapter>, MarketError>
        + Send
        + Sync,
>;

pub struct SyncEngine {
    pool: PgPool,
    config: Arc<AppConfig>,
    storefronts: Vec<StorefrontConfig>,
    registry: JobRegistry,
    adapter_factory: AdapterFactory,
}

impl SyncEngine {
    #[must_use]
    pub fn new(pool: PgPool, config: Arc<AppConfig>, storefronts: Vec<StorefrontConfig>) -> Self {
        Self::with_adapter_factory(
            pool,
            config,
            storefronts,
            Arc::new(|storefront, config| catsync_market::build_adapter(storefront, config)),
        )
    }

    #[must_use]
    pub fn with_adapter_factory(
        pool: PgPool,
        config: Arc<AppConfig>,
        storefronts: Vec<StorefrontConfig>,
        adapter_factory: AdapterFactory,
    ) -> Self {
        let retention = std::time::Duration::from_secs(config.job_retention_secs);
        Self {
            pool,
            config,
            storefronts,
            registry: JobRegistry::new(retention),
            adapter_factory,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub(crate) fn config(&self) -> &AppConfig {
        &self.config
    }

    pub(crate) fn storefront_by_slug(
        &self,
        slug: &str,
    ) -> Result<&StorefrontConfig, EngineError> {
        self.storefronts
            .iter()
            .filter(|s| s.enabled)
            .find(|s| s.slug() == slug)
            .ok_or_else(|| EngineError::UnknownStorefront(slug.to_owned()))
    }

    pub(crate) fn build_adapter(
        &self,
        storefront: &StorefrontConfig,
    ) -> Result<Arc<dyn MarketplaceAdapter>, MarketError> {
        (self.adapter_factory)(storefront, &self.config)
    }

    /// Resolves the target storefronts and constructs their adapters —
    /// configuration errors (unknown storefront, missing credentials) are
    /// surfaced here, synchronously, before any job starts.
    fn prepare_targets(
        &self,
        options: &SyncOptions,
    ) -> Result<Vec<(String, Arc<dyn MarketplaceAdapter>)>, EngineError> {
        let targets: Vec<&StorefrontConfig> = match &options.storefront {
            Some(slug) => vec![self.storefront_by_slug(slug)?],
            None => self.storefronts.iter().filter(|s| s.enabled).collect(),
        };

        if targets.is_empty() {
            return Err(EngineError::NoStorefronts);
        }

        targets
            .into_iter()
            .map(|storefront| {
                let adapter = self.build_adapter(storefront)?;
                Ok((storefront.slug(), adapter))
            })
            .collect()
    }

    /// Accepts a job if none is running and spawns its background task. The
    /// caller polls the registry for progress; this returns as soon as the
    /// job is accepted.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Job`] when a job is already running or retained.
    /// - [`EngineError::UnknownStorefront`] / [`EngineError::NoStorefronts`] /
    ///   [`EngineError::Market`] for configuration problems, surfaced
    ///   synchronously without touching the job slot.
    pub fn try_start(self: &Arc<Self>, options: SyncOptions) -> Result<(), EngineError> {
        let targets = self.prepare_targets(&options)?;
        let handle = self.registry.try_start()?;

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let _ = engine.run_job(handle, targets, options).await;
        });
        Ok(())
    }

    /// Runs a sync in the foreground and returns its summary. Same
    /// single-flight discipline as [`Self::try_start`].
    ///
    /// # Errors
    ///
    /// Everything [`Self::try_start`] returns, plus a job-fatal failure of
    /// the run itself.
    pub async fn run_once(&self, options: SyncOptions) -> Result<SyncSummary, EngineError> {
        let targets = self.prepare_targets(&options)?;
        let handle = self.registry.try_start()?;
        self.run_job(handle, targets, options).await
    }

    async fn run_job(
        &self,
        handle: JobHandle,
        targets: Vec<(String, Arc<dyn MarketplaceAdapter>)>,
        options: SyncOptions,
    ) -> Result<SyncSummary, EngineError> {
        let started = Instant::now();

        let run = match catsync_db::create_sync_run(&self.pool, &options.trigger_source).await {
            Ok(run) => run,
            Err(e) => {
                let message = format!("failed to create sync run: {e}");
                tracing::error!(error = %e, "sync job aborted before start");
                handle.fail(message);
                return Err(e.into());
            }
        };
        if let Err(e) = catsync_db::start_sync_run(&self.pool, run.id).await {
            let message = format!("failed to start sync run: {e}");
            tracing::error!(error = %e, run_id = run.id, "sync job aborted before start");
            handle.fail(message);
            return Err(e.into());
        }

        tracing::info!(
            run_id = run.id,
            trigger = %options.trigger_source,
            storefronts = targets.len(),
            "sync job started"
        );

        let cancel = handle.cancel_token();
        let mut summary = SyncSummary::default();
        let mut failed_storefronts = 0usize;
        let mut cancelled = false;
        let storefront_count = targets.len();

        for (slug, adapter) in targets {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            record_storefront(&self.pool, run.id, &slug, "running", &StorefrontOutcome::default(), None)
                .await;

            match self.sync_storefront(&handle, &slug, &adapter, &options).await {
                Ok(outcome) => {
                    summary.total += outcome.seen;
                    summary.synced += outcome.synced;
                    summary.errors += outcome.errors();
                    summary.missing_vendor_code += outcome.missing_vendor_code;
                    summary.unmatched_offers += outcome.unmatched;
                    summary.failed_facet_batches += outcome.failed_batches;
                    summary.storefronts.push(StorefrontSummary {
                        storefront: slug.clone(),
                        status: "succeeded".to_owned(),
                        seen: outcome.seen,
                        synced: outcome.synced,
                        errors: outcome.errors(),
                        error_message: None,
                    });
                    record_storefront(&self.pool, run.id, &slug, "succeeded", &outcome, None).await;
                }
                Err(EngineError::Market(MarketError::Cancelled)) => {
                    record_storefront(
                        &self.pool,
                        run.id,
                        &slug,
                        "cancelled",
                        &StorefrontOutcome::default(),
                        None,
                    )
                    .await;
                    cancelled = true;
                    break;
                }
                // Catastrophic per-storefront failure: record it and move on
                // to the next storefront.
                Err(e) => {
                    failed_storefronts += 1;
                    let message = e.to_string();
                    tracing::error!(storefront = %slug, error = %message, "storefront sync failed");
                    summary.storefronts.push(StorefrontSummary {
                        storefront: slug.clone(),
                        status: "failed".to_owned(),
                        seen: 0,
                        synced: 0,
                        errors: 0,
                        error_message: Some(message.clone()),
                    });
                    record_storefront(
                        &self.pool,
                        run.id,
                        &slug,
                        "failed",
                        &StorefrontOutcome::default(),
                        Some(&message),
                    )
                    .await;
                }
            }
        }

        summary.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let (seen, synced, errors) = summary_counters(&summary);

        if cancelled {
            if let Err(e) = catsync_db::cancel_sync_run(&self.pool, run.id, seen, synced, errors).await
            {
                tracing::error!(run_id = run.id, error = %e, "failed to record cancelled sync run");
            }
            tracing::info!(run_id = run.id, "sync job cancelled");
            handle.finish_cancelled();
            return Ok(summary);
        }

        if failed_storefronts == storefront_count {
            let message = format!("all {failed_storefronts} storefronts failed");
            if let Err(e) = catsync_db::fail_sync_run(&self.pool, run.id, &message).await {
                tracing::error!(run_id = run.id, error = %e, "failed to record failed sync run");
            }
            handle.fail(message.clone());
            return Err(EngineError::SyncFailed(message));
        }

        if let Err(e) = catsync_db::complete_sync_run(&self.pool, run.id, seen, synced, errors).await
        {
            tracing::error!(run_id = run.id, error = %e, "failed to record completed sync run");
        }
        tracing::info!(
            run_id = run.id,
            total = summary.total,
            synced = summary.synced,
            errors = summary.errors,
            elapsed_ms = summary.elapsed_ms,
            "sync job completed"
        );
        handle.complete(summary.clone());
        Ok(summary)
    }

    /// Syncs one storefront end to end: listing → facets → merge → persist.
    async fn sync_storefront(
        &self,
        handle: &JobHandle,
        slug: &str,
        adapter: &Arc<dyn MarketplaceAdapter>,
        options: &SyncOptions,
    ) -> Result<StorefrontOutcome, EngineError> {
        let cancel = handle.cancel_token();
        let page_size = self.config.market_page_size;

        handle.set_stage("listing", 0, 0);
        let limits = PageLimits {
            max_pages: self.config.market_max_pages,
            max_items: options.max_offers,
            inter_page_delay_ms: self.config.market_inter_page_delay_ms,
        };
        let listing = fetch_all_pages(
            &limits,
            &cancel,
            &format!("{slug} offer listing"),
            |cursor| adapter.list_offers(cursor, page_size),
        )
        .await?;
        let offers = listing.items;
        tracing::info!(
            storefront = slug,
            offers = offers.len(),
            pages = listing.pages,
            "offer listing fetched"
        );

        // Facet calls take the listing's primary ids, deduplicated in order.
        let mut seen_ids = HashSet::new();
        let ids: Vec<String> = offers
            .iter()
            .map(|o| o.primary_id.trim().to_owned())
            .filter(|id| !id.is_empty() && seen_ids.insert(id.clone()))
            .collect();

        let ceiling = self.config.market_batch_size.min(adapter.batch_ceiling()).max(1);
        let batches = chunk_ids(&ids, ceiling);
        let inner_limits = PageLimits {
            max_pages: self.config.market_max_pages,
            max_items: None,
            inter_page_delay_ms: self.config.market_inter_page_delay_ms,
        };

        let mut failed_batches = 0usize;

        let (attributes, failed) = self
            .fan_out(handle, "attributes", &batches, |batch| {
                let inner_limits = inner_limits.clone();
                let cancel = cancel.clone();
                async move {
                    let paginated =
                        fetch_all_pages(&inner_limits, &cancel, "attributes", |cursor| {
                            adapter.attributes(&batch, cursor, page_size)
                        })
                        .await?;
                    Ok(paginated.items)
                }
            })
            .await?;
        failed_batches += failed;

        let (images, failed) = self
            .fan_out(handle, "images", &batches, |batch| async move {
                adapter.images(&batch).await
            })
            .await?;
        failed_batches += failed;

        let (stocks, failed) = self
            .fan_out(handle, "stocks", &batches, |batch| async move {
                adapter.stocks(&batch).await
            })
            .await?;
        failed_batches += failed;

        let (prices, failed) = self
            .fan_out(handle, "prices", &batches, |batch| {
                let inner_limits = inner_limits.clone();
                let cancel = cancel.clone();
                async move {
                    let paginated = fetch_all_pages(&inner_limits, &cancel, "prices", |cursor| {
                        adapter.prices(&batch, cursor)
                    })
                    .await?;
                    Ok(paginated.items)
                }
            })
            .await?;
        failed_batches += failed;

        let facets = FacetSet::from_records(&attributes, &images, &stocks, &prices);
        let mut diag = MergeDiagnostics::default();
        let merged = merge_offers(&offers, &facets, &mut diag);

        handle.set_stage("saving", 0, merged.len());
        let progress = handle.clone();
        let stats =
            writer::persist_merged_offers(&self.pool, slug, &merged, |n| progress.advance(n))
                .await;

        Ok(StorefrontOutcome {
            seen: merged.len(),
            synced: stats.synced,
            failed_writes: stats.failed,
            missing_vendor_code: stats.missing_vendor_code,
            unmatched: diag.unmatched,
            failed_batches,
        })
    }

    /// Drives one facet's batches through the fan-out coordinator, feeding
    /// batch completions into the job progress.
    async fn fan_out<T, F, Fut>(
        &self,
        handle: &JobHandle,
        label: &str,
        batches: &[Vec<String>],
        call: F,
    ) -> Result<(Vec<T>, usize), MarketError>
    where
        F: Fn(Vec<String>) -> Fut,
        Fut: Future<Output = Result<Vec<T>, MarketError>>,
    {
        handle.set_stage(label, 0, batches.len());
        let progress = handle.clone();
        let outcome = run_batched(
            batches.to_vec(),
            self.config.market_max_concurrent_batches,
            self.config.market_inter_batch_delay_ms,
            &handle.cancel_token(),
            move |p| progress.advance(p.completed_batches),
            call,
        )
        .await?;

        let failed = outcome.failed.len();
        if failed > 0 {
            tracing::warn!(
                facet = label,
                failed_batches = failed,
                "facet fetch degraded — some batches failed after retries"
            );
        }
        Ok((outcome.ok.into_iter().flatten().collect(), failed))
    }
}

fn summary_counters(summary: &SyncSummary) -> (i32, i32, i32) {
    let clamp = |n: usize| i32::try_from(n).unwrap_or(i32::MAX);
    (
        clamp(summary.total),
        clamp(summary.synced),
        clamp(summary.errors),
    )
}

/// Best-effort per-storefront result row; a bookkeeping failure must never
/// take the sync down.
async fn record_storefront(
    pool: &PgPool,
    run_id: i64,
    slug: &str,
    status: &str,
    outcome: &StorefrontOutcome,
    error_message: Option<&str>,
) {
    let clamp = |n: usize| i32::try_from(n).unwrap_or(i32::MAX);
    if let Err(e) = catsync_db::upsert_sync_run_storefront(
        pool,
        run_id,
        slug,
        status,
        clamp(outcome.seen),
        clamp(outcome.synced),
        clamp(outcome.errors()),
        error_message,
    )
    .await
    {
        tracing::error!(
            run_id,
            storefront = slug,
            error = %e,
            "failed to record storefront result"
        );
    }
}
