//! End-to-end engine tests over scripted adapters and a real database.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;

use catsync_core::{
    AppConfig, AttributesRecord, Environment, ImageRecord, ListedOffer, Marketplace, PriceRecord,
    PriceTag, StockLevel, StockRecord, StorefrontConfig,
};
use catsync_engine::{JobStage, SyncEngine, SyncOptions};
use catsync_market::{
    MarketError, MarketplaceAdapter, Page, PriceUpdate, PriceUpdateOutcome,
};

fn test_config() -> Arc<AppConfig> {
    Arc::new(AppConfig {
        database_url: "postgres://unused".to_owned(),
        env: Environment::Test,
        bind_addr: "127.0.0.1:0".parse().expect("addr"),
        log_level: "info".to_owned(),
        storefronts_path: "./config/storefronts.yaml".into(),
        db_max_connections: 5,
        db_min_connections: 1,
        db_acquire_timeout_secs: 5,
        market_request_timeout_secs: 5,
        market_user_agent: "catsync-test".to_owned(),
        market_page_size: 2,
        market_max_pages: 50,
        market_batch_size: 10,
        market_max_concurrent_batches: 2,
        market_inter_page_delay_ms: 0,
        market_inter_batch_delay_ms: 0,
        market_max_retries: 0,
        market_backoff_base_ms: 0,
        job_retention_secs: 300,
        sync_cron: None,
    })
}

fn storefront(name: &str) -> StorefrontConfig {
    StorefrontConfig {
        name: name.to_owned(),
        marketplace: Marketplace::Ozon,
        enabled: true,
        api_key_env: "UNUSED".to_owned(),
        client_id_env: Some("UNUSED".to_owned()),
        base_url: None,
        notes: None,
    }
}

fn offer(primary_id: &str, offer_id: &str, name: &str) -> ListedOffer {
    ListedOffer {
        primary_id: primary_id.to_owned(),
        offer_id: offer_id.to_owned(),
        sku: None,
        name: name.to_owned(),
        status: "active".to_owned(),
        price_hint: None,
        images: vec![],
    }
}

fn price(key: &str, value: &str) -> PriceRecord {
    PriceRecord {
        keys: vec![key.to_owned()],
        price: PriceTag {
            value: value.to_owned(),
            currency_code: "RUB".to_owned(),
        },
    }
}

/// A scripted in-memory adapter: pages the listing two offers at a time and
/// answers facet calls from fixed data, optionally failing the stock facet.
#[derive(Default)]
struct ScriptedAdapter {
    storefront: String,
    offers: Vec<ListedOffer>,
    attributes: Vec<AttributesRecord>,
    stocks: Vec<StockRecord>,
    prices: Vec<PriceRecord>,
    fail_stocks: bool,
}

#[async_trait]
impl MarketplaceAdapter for ScriptedAdapter {
    fn marketplace(&self) -> Marketplace {
        Marketplace::Ozon
    }

    fn storefront(&self) -> &str {
        &self.storefront
    }

    fn batch_ceiling(&self) -> usize {
        100
    }

    async fn list_offers(
        &self,
        cursor: Option<String>,
        page_size: u32,
    ) -> Result<Page<ListedOffer>, MarketError> {
        let start: usize = cursor.map_or(0, |c| c.parse().expect("numeric cursor"));
        let end = (start + page_size as usize).min(self.offers.len());
        let items = self.offers[start..end].to_vec();
        let next_cursor = (end < self.offers.len()).then(|| end.to_string());
        Ok(Page { items, next_cursor })
    }

    async fn attributes(
        &self,
        ids: &[String],
        _cursor: Option<String>,
        _page_size: u32,
    ) -> Result<Page<AttributesRecord>, MarketError> {
        let items = self
            .attributes
            .iter()
            .filter(|a| a.keys.iter().any(|k| ids.contains(k)) || a.keys.is_empty())
            .cloned()
            .collect();
        Ok(Page {
            items,
            next_cursor: None,
        })
    }

    async fn images(&self, _ids: &[String]) -> Result<Vec<ImageRecord>, MarketError> {
        Ok(vec![])
    }

    async fn stocks(&self, _ids: &[String]) -> Result<Vec<StockRecord>, MarketError> {
        if self.fail_stocks {
            return Err(MarketError::UnexpectedStatus {
                status: 500,
                url: "scripted://stocks".to_owned(),
            });
        }
        Ok(self.stocks.clone())
    }

    async fn prices(
        &self,
        _ids: &[String],
        _cursor: Option<String>,
    ) -> Result<Page<PriceRecord>, MarketError> {
        Ok(Page {
            items: self.prices.clone(),
            next_cursor: None,
        })
    }

    async fn update_prices(
        &self,
        updates: &[PriceUpdate],
    ) -> Result<PriceUpdateOutcome, MarketError> {
        Ok(PriceUpdateOutcome {
            updated: updates.len(),
            errors: vec![],
        })
    }
}

fn engine_with_adapters(
    pool: PgPool,
    storefronts: Vec<StorefrontConfig>,
    adapters: HashMap<String, Arc<ScriptedAdapter>>,
) -> Arc<SyncEngine> {
    let adapters = Arc::new(adapters);
    Arc::new(SyncEngine::with_adapter_factory(
        pool,
        test_config(),
        storefronts,
        Arc::new(move |storefront, _config| {
            let adapter = adapters
                .get(&storefront.slug())
                .expect("scripted adapter for storefront");
            Ok(Arc::clone(adapter) as Arc<dyn MarketplaceAdapter>)
        }),
    ))
}

fn options() -> SyncOptions {
    SyncOptions {
        storefront: None,
        max_offers: None,
        trigger_source: "cli".to_owned(),
    }
}

#[sqlx::test(migrations = "../../migrations")]
async fn two_storefronts_link_one_product_with_independent_prices(pool: PgPool) {
    let adapters = HashMap::from([
        (
            "ozon-main".to_owned(),
            Arc::new(ScriptedAdapter {
                storefront: "ozon-main".to_owned(),
                offers: vec![offer("111", "VC-100", "Widget Pro")],
                prices: vec![price("VC-100", "500.00")],
                ..ScriptedAdapter::default()
            }),
        ),
        (
            "wb-main".to_owned(),
            Arc::new(ScriptedAdapter {
                storefront: "wb-main".to_owned(),
                offers: vec![offer("222", "VC-100", "Widget Pro")],
                prices: vec![price("VC-100", "520.00")],
                ..ScriptedAdapter::default()
            }),
        ),
    ]);
    let engine = engine_with_adapters(
        pool.clone(),
        vec![storefront("Ozon Main"), storefront("WB Main")],
        adapters,
    );

    let summary = engine.run_once(options()).await.expect("sync should succeed");

    assert_eq!(summary.total, 2);
    assert_eq!(summary.synced, 2);
    assert_eq!(summary.errors, 0);
    assert_eq!(summary.total, summary.synced + summary.errors);

    assert_eq!(catsync_db::count_products(&pool).await.expect("count"), 1);
    let product = catsync_db::get_product_by_vendor_code(&pool, "VC-100")
        .await
        .expect("query")
        .expect("product exists");
    assert_eq!(product.name, "Widget Pro");

    let a = catsync_db::get_link(&pool, product.id, "ozon-main")
        .await
        .expect("query")
        .expect("ozon link");
    let b = catsync_db::get_link(&pool, product.id, "wb-main")
        .await
        .expect("query")
        .expect("wb link");
    assert_eq!(a.price, Some(rust_decimal::Decimal::new(50_000, 2)));
    assert_eq!(b.price, Some(rust_decimal::Decimal::new(52_000, 2)));
}

#[sqlx::test(migrations = "../../migrations")]
async fn offers_without_vendor_code_are_counted_not_fatal(pool: PgPool) {
    let adapters = HashMap::from([(
        "ozon-main".to_owned(),
        Arc::new(ScriptedAdapter {
            storefront: "ozon-main".to_owned(),
            offers: vec![
                offer("111", "VC-100", "Widget"),
                offer("222", "", "Nameless thing"),
            ],
            ..ScriptedAdapter::default()
        }),
    )]);
    let engine = engine_with_adapters(pool.clone(), vec![storefront("Ozon Main")], adapters);

    let summary = engine.run_once(options()).await.expect("sync should succeed");

    assert_eq!(summary.total, 2);
    assert_eq!(summary.synced, 1);
    assert_eq!(summary.errors, 1);
    assert_eq!(summary.missing_vendor_code, 1);
    assert_eq!(summary.total, summary.synced + summary.errors);
    assert_eq!(catsync_db::count_products(&pool).await.expect("count"), 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn failed_stock_facet_degrades_instead_of_failing(pool: PgPool) {
    let adapters = HashMap::from([(
        "ozon-main".to_owned(),
        Arc::new(ScriptedAdapter {
            storefront: "ozon-main".to_owned(),
            offers: vec![offer("111", "VC-100", "Widget")],
            fail_stocks: true,
            ..ScriptedAdapter::default()
        }),
    )]);
    let engine = engine_with_adapters(pool.clone(), vec![storefront("Ozon Main")], adapters);

    let summary = engine.run_once(options()).await.expect("degraded, not failed");

    assert_eq!(summary.synced, 1);
    assert!(summary.failed_facet_batches > 0);

    let product = catsync_db::get_product_by_vendor_code(&pool, "VC-100")
        .await
        .expect("query")
        .expect("product exists");
    let link = catsync_db::get_link(&pool, product.id, "ozon-main")
        .await
        .expect("query")
        .expect("link exists");
    assert_eq!(link.stock_available, 0, "missing stock facet defaults to 0");
}

#[sqlx::test(migrations = "../../migrations")]
async fn placeholder_name_is_upgraded_on_a_later_sync(pool: PgPool) {
    // First cycle: no display name anywhere.
    let adapters = HashMap::from([(
        "ozon-main".to_owned(),
        Arc::new(ScriptedAdapter {
            storefront: "ozon-main".to_owned(),
            offers: vec![offer("111", "VC-100", "")],
            ..ScriptedAdapter::default()
        }),
    )]);
    let engine = engine_with_adapters(pool.clone(), vec![storefront("Ozon Main")], adapters);
    engine.run_once(options()).await.expect("first sync");

    let product = catsync_db::get_product_by_vendor_code(&pool, "VC-100")
        .await
        .expect("query")
        .expect("product exists");
    assert_eq!(product.name, "VC-100");
    assert!(product.name_is_placeholder);

    // Second cycle: the attribute facet now carries a real name.
    let adapters = HashMap::from([(
        "ozon-main".to_owned(),
        Arc::new(ScriptedAdapter {
            storefront: "ozon-main".to_owned(),
            offers: vec![offer("111", "VC-100", "")],
            attributes: vec![AttributesRecord {
                keys: vec!["VC-100".to_owned()],
                name: Some("Widget Pro".to_owned()),
                description: None,
                category: None,
                images: vec![],
                cover: None,
            }],
            ..ScriptedAdapter::default()
        }),
    )]);
    let engine = engine_with_adapters(pool.clone(), vec![storefront("Ozon Main")], adapters);
    engine.run_once(options()).await.expect("second sync");

    let product = catsync_db::get_product_by_vendor_code(&pool, "VC-100")
        .await
        .expect("query")
        .expect("product exists");
    assert_eq!(product.name, "Widget Pro");
    assert!(!product.name_is_placeholder);
}

#[sqlx::test(migrations = "../../migrations")]
async fn completed_job_is_observable_with_consistent_counters(pool: PgPool) {
    let adapters = HashMap::from([(
        "ozon-main".to_owned(),
        Arc::new(ScriptedAdapter {
            storefront: "ozon-main".to_owned(),
            offers: (0..5)
                .map(|i| offer(&format!("{i}"), &format!("VC-{i}"), "Widget"))
                .collect(),
            ..ScriptedAdapter::default()
        }),
    )]);
    let engine = engine_with_adapters(pool.clone(), vec![storefront("Ozon Main")], adapters);

    assert_eq!(engine.registry().snapshot().stage, JobStage::Idle);

    engine.run_once(options()).await.expect("sync");

    let snapshot = engine.registry().snapshot();
    assert_eq!(snapshot.stage, JobStage::Completed);
    let result = snapshot.result.expect("terminal result retained");
    assert_eq!(result.total, result.synced + result.errors);
    assert_eq!(result.total, 5);

    // The durable history recorded the same run.
    let runs = catsync_db::list_sync_runs(&pool, 10).await.expect("runs");
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, "succeeded");
    assert_eq!(runs[0].offers_seen, 5);
    assert_eq!(runs[0].trigger_source, "cli");
}

#[sqlx::test(migrations = "../../migrations")]
async fn rerunning_an_identical_sync_is_idempotent(pool: PgPool) {
    let build = || {
        HashMap::from([(
            "ozon-main".to_owned(),
            Arc::new(ScriptedAdapter {
                storefront: "ozon-main".to_owned(),
                offers: vec![offer("111", "VC-100", "Widget")],
                prices: vec![price("VC-100", "500.00")],
                ..ScriptedAdapter::default()
            }),
        )])
    };

    let engine = engine_with_adapters(pool.clone(), vec![storefront("Ozon Main")], build());
    engine.run_once(options()).await.expect("first run");
    let engine = engine_with_adapters(pool.clone(), vec![storefront("Ozon Main")], build());
    engine.run_once(options()).await.expect("second run");

    assert_eq!(catsync_db::count_products(&pool).await.expect("count"), 1);
    let product = catsync_db::get_product_by_vendor_code(&pool, "VC-100")
        .await
        .expect("query")
        .expect("product exists");
    let links = catsync_db::list_links_for_storefront(&pool, "ozon-main")
        .await
        .expect("links");
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].product_id, product.id);
}

#[sqlx::test(migrations = "../../migrations")]
async fn unknown_storefront_is_rejected_synchronously(pool: PgPool) {
    let engine = engine_with_adapters(
        pool,
        vec![storefront("Ozon Main")],
        HashMap::from([(
            "ozon-main".to_owned(),
            Arc::new(ScriptedAdapter {
                storefront: "ozon-main".to_owned(),
                ..ScriptedAdapter::default()
            }),
        )]),
    );

    let result = engine
        .run_once(SyncOptions {
            storefront: Some("nope".to_owned()),
            max_offers: None,
            trigger_source: "cli".to_owned(),
        })
        .await;

    assert!(result.is_err());
    assert_eq!(
        engine.registry().snapshot().stage,
        JobStage::Idle,
        "a rejected trigger must not occupy the job slot"
    );
}
