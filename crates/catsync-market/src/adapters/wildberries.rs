//! Adapter for the wildberries seller APIs.
//!
//! Authentication is a single `Authorization` token. The content API
//! paginates card listings with an `{updatedAt, nmID}` cursor object, encoded
//! here into the engine's opaque string cursor as `updatedAt|nmID`. Stocks
//! are reported per warehouse and summed downstream by the merger; several
//! endpoints answer 200 with an `{error, errorText}` envelope instead of an
//! HTTP error status, which is surfaced as [`MarketError::ApiError`] so the
//! retry executor's message heuristic can still catch throttling.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use catsync_core::{
    AppConfig, AttributesRecord, ImageRecord, ListedOffer, Marketplace, PriceRecord, PriceTag,
    StockLevel, StockRecord, StorefrontConfig,
};

use crate::adapter::{MarketplaceAdapter, PriceUpdateError, PriceUpdate, PriceUpdateOutcome};
use crate::error::MarketError;
use crate::paginate::Page;
use crate::retry::retry_with_backoff;

use super::{credential_from_env, parse_base_url, read_json_response, scalar_field, Scalar};

const DEFAULT_BASE_URL: &str = "https://content-api.wildberries.ru";

/// Card and media endpoints cap batches at 100 ids per call.
const BATCH_CEILING: usize = 100;

pub struct WildberriesAdapter {
    client: reqwest::Client,
    base_url: reqwest::Url,
    token: String,
    storefront: String,
    max_retries: u32,
    backoff_base_ms: u64,
}

impl WildberriesAdapter {
    /// Creates an adapter with an explicit token and base URL — the test seam
    /// for pointing at a wiremock server.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Http`] if the `reqwest::Client` cannot be
    /// constructed, or [`MarketError::InvalidBaseUrl`] for a malformed base.
    pub fn new(
        storefront: &str,
        token: &str,
        base_url: &str,
        timeout_secs: u64,
        user_agent: &str,
        max_retries: u32,
        backoff_base_ms: u64,
    ) -> Result<Self, MarketError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()?;

        Ok(Self {
            client,
            base_url: parse_base_url(base_url)?,
            token: token.to_owned(),
            storefront: storefront.to_owned(),
            max_retries,
            backoff_base_ms,
        })
    }

    /// Creates the adapter for a configured storefront, reading the token
    /// from the env var named in the registry entry.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::MissingCredentials`] when the token env var is
    /// unset.
    pub fn from_storefront(
        storefront: &StorefrontConfig,
        config: &AppConfig,
    ) -> Result<Self, MarketError> {
        let token = credential_from_env(&storefront.name, &storefront.api_key_env)?;
        let base_url = storefront.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);

        Self::new(
            &storefront.name,
            &token,
            base_url,
            config.market_request_timeout_secs,
            &config.market_user_agent,
            config.market_max_retries,
            config.market_backoff_base_ms,
        )
    }

    async fn request_json(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value, MarketError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| MarketError::InvalidBaseUrl {
                url: path.to_owned(),
                reason: e.to_string(),
            })?;

        retry_with_backoff(self.max_retries, self.backoff_base_ms, || {
            let url = url.clone();
            let method = method.clone();
            let body = body.cloned();
            async move {
                let mut request = self
                    .client
                    .request(method, url.clone())
                    .header(reqwest::header::AUTHORIZATION, &self.token);
                if let Some(body) = &body {
                    request = request.json(body);
                }
                let response = request.send().await?;
                let value =
                    read_json_response(Marketplace::Wildberries, url.as_str(), response).await?;
                Self::check_envelope(&value)?;
                Ok(value)
            }
        })
        .await
    }

    /// Several wildberries endpoints answer 200 with `{"error": true,
    /// "errorText": "..."}` instead of an HTTP error status.
    fn check_envelope(value: &serde_json::Value) -> Result<(), MarketError> {
        if value.get("error").and_then(serde_json::Value::as_bool) == Some(true) {
            let message = value
                .get("errorText")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("unknown error")
                .to_owned();
            return Err(MarketError::ApiError {
                marketplace: Marketplace::Wildberries.to_string(),
                message,
            });
        }
        Ok(())
    }

    fn decode<T: serde::de::DeserializeOwned>(
        context: &str,
        value: serde_json::Value,
    ) -> Result<T, MarketError> {
        serde_json::from_value(value).map_err(|e| MarketError::Deserialize {
            context: context.to_owned(),
            source: e,
        })
    }

    /// Builds the cards-list cursor object from the opaque `updatedAt|nmID`
    /// string the previous page produced.
    fn decode_cursor(cursor: Option<&str>, limit: u32) -> serde_json::Value {
        match cursor.and_then(|c| c.split_once('|')) {
            Some((updated_at, nm_id)) => json!({
                "limit": limit,
                "updatedAt": updated_at,
                "nmID": nm_id.parse::<i64>().unwrap_or_default(),
            }),
            None => json!({"limit": limit}),
        }
    }

    async fn fetch_cards(
        &self,
        cursor: Option<String>,
        page_size: u32,
        nm_ids: Option<&[String]>,
    ) -> Result<(Vec<Card>, Option<String>), MarketError> {
        let mut filter = json!({"withPhoto": -1});
        if let Some(ids) = nm_ids {
            let numeric: Vec<i64> = ids.iter().filter_map(|id| id.parse().ok()).collect();
            filter["nmIDs"] = json!(numeric);
        }
        let body = json!({
            "settings": {
                "cursor": Self::decode_cursor(cursor.as_deref(), page_size),
                "filter": filter,
            }
        });
        let value = self
            .request_json(reqwest::Method::POST, "content/v2/get/cards/list", Some(&body))
            .await?;
        let envelope: CardsResponse = Self::decode("content/v2/get/cards/list", value)?;

        // The API signals the last page by returning fewer cards than asked.
        let next_cursor = if envelope.cards.len() < page_size as usize {
            None
        } else {
            envelope.cursor.as_ref().and_then(|c| {
                let updated_at = c.updated_at.as_deref()?;
                Some(format!("{updated_at}|{}", c.nm_id.unwrap_or_default()))
            })
        };

        Ok((envelope.cards, next_cursor))
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct CardsResponse {
    #[serde(default)]
    cards: Vec<Card>,
    #[serde(default)]
    cursor: Option<CardsCursor>,
}

#[derive(Debug, Deserialize)]
struct CardsCursor {
    #[serde(default, rename = "updatedAt")]
    updated_at: Option<String>,
    #[serde(default, rename = "nmID")]
    nm_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Card {
    #[serde(default, rename = "nmID")]
    nm_id: Option<Scalar>,
    #[serde(default, rename = "vendorCode")]
    vendor_code: Option<Scalar>,
    #[serde(default)]
    title: Option<Scalar>,
    #[serde(default)]
    description: Option<Scalar>,
    #[serde(default, rename = "subjectName")]
    subject_name: Option<Scalar>,
    #[serde(default)]
    photos: Vec<CardPhoto>,
}

#[derive(Debug, Deserialize)]
struct CardPhoto {
    #[serde(default)]
    big: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct MediaResponse {
    #[serde(default)]
    data: Vec<MediaItem>,
}

#[derive(Debug, Deserialize)]
struct MediaItem {
    #[serde(default, rename = "nmID")]
    nm_id: Option<Scalar>,
    #[serde(default)]
    photos: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WarehousesResponse(Vec<Warehouse>);

#[derive(Debug, Deserialize)]
struct Warehouse {
    #[serde(default)]
    id: i64,
}

#[derive(Debug, Default, Deserialize)]
struct WarehouseStocksResponse {
    #[serde(default)]
    stocks: Vec<WarehouseStockRow>,
}

#[derive(Debug, Deserialize)]
struct WarehouseStockRow {
    #[serde(default)]
    sku: Option<Scalar>,
    #[serde(default)]
    amount: i64,
}

#[derive(Debug, Default, Deserialize)]
struct GoodsResponse {
    #[serde(default)]
    data: GoodsData,
}

#[derive(Debug, Default, Deserialize)]
struct GoodsData {
    #[serde(default, rename = "listGoods")]
    list_goods: Vec<Goods>,
}

#[derive(Debug, Deserialize)]
struct Goods {
    #[serde(default, rename = "nmID")]
    nm_id: Option<Scalar>,
    #[serde(default, rename = "vendorCode")]
    vendor_code: Option<Scalar>,
    #[serde(default, rename = "currencyIsoCode4217")]
    currency: Option<Scalar>,
    #[serde(default)]
    sizes: Vec<GoodsSize>,
}

#[derive(Debug, Deserialize)]
struct GoodsSize {
    #[serde(default, rename = "discountedPrice")]
    discounted_price: Option<Scalar>,
    #[serde(default)]
    price: Option<Scalar>,
}

fn card_images(photos: &[CardPhoto]) -> Vec<String> {
    photos.iter().filter_map(|p| p.big.clone()).collect()
}

#[async_trait]
impl MarketplaceAdapter for WildberriesAdapter {
    fn marketplace(&self) -> Marketplace {
        Marketplace::Wildberries
    }

    fn storefront(&self) -> &str {
        &self.storefront
    }

    fn batch_ceiling(&self) -> usize {
        BATCH_CEILING
    }

    async fn list_offers(
        &self,
        cursor: Option<String>,
        page_size: u32,
    ) -> Result<Page<ListedOffer>, MarketError> {
        let (cards, next_cursor) = self.fetch_cards(cursor, page_size, None).await?;

        let items = cards
            .into_iter()
            .map(|card| {
                let nm_id = scalar_field(card.nm_id).unwrap_or_default();
                ListedOffer {
                    primary_id: nm_id.clone(),
                    offer_id: scalar_field(card.vendor_code).unwrap_or_default(),
                    sku: Some(nm_id),
                    name: scalar_field(card.title).unwrap_or_default(),
                    status: "active".to_owned(),
                    price_hint: None,
                    images: card_images(&card.photos),
                }
            })
            .collect();

        Ok(Page { items, next_cursor })
    }

    async fn attributes(
        &self,
        ids: &[String],
        cursor: Option<String>,
        page_size: u32,
    ) -> Result<Page<AttributesRecord>, MarketError> {
        let (cards, next_cursor) = self.fetch_cards(cursor, page_size, Some(ids)).await?;

        let items = cards
            .into_iter()
            .map(|card| {
                let nm_id = scalar_field(card.nm_id);
                let vendor_code = scalar_field(card.vendor_code);
                AttributesRecord {
                    images: card_images(&card.photos),
                    keys: [vendor_code, nm_id].into_iter().flatten().collect(),
                    name: scalar_field(card.title),
                    description: scalar_field(card.description),
                    category: scalar_field(card.subject_name),
                    cover: None,
                }
            })
            .collect();

        Ok(Page { items, next_cursor })
    }

    async fn images(&self, ids: &[String]) -> Result<Vec<ImageRecord>, MarketError> {
        let numeric: Vec<i64> = ids.iter().filter_map(|id| id.parse().ok()).collect();
        let body = json!({"nmIDs": numeric});
        let value = self
            .request_json(reqwest::Method::POST, "content/v3/media/get", Some(&body))
            .await?;
        let envelope: MediaResponse = Self::decode("content/v3/media/get", value)?;

        Ok(envelope
            .data
            .into_iter()
            .map(|item| ImageRecord {
                keys: scalar_field(item.nm_id).into_iter().collect(),
                urls: item.photos,
            })
            .collect())
    }

    async fn stocks(&self, ids: &[String]) -> Result<Vec<StockRecord>, MarketError> {
        let value = self
            .request_json(reqwest::Method::GET, "api/v3/warehouses", None)
            .await?;
        let warehouses: WarehousesResponse = Self::decode("api/v3/warehouses", value)?;

        // One stocks call per seller warehouse; rows for the same sku are
        // summed by the merger, not here.
        let mut records = Vec::new();
        for warehouse in warehouses.0 {
            let body = json!({"skus": ids});
            let path = format!("api/v3/stocks/{}", warehouse.id);
            let value = self
                .request_json(reqwest::Method::POST, &path, Some(&body))
                .await?;
            let stocks: WarehouseStocksResponse = Self::decode(&path, value)?;
            for row in stocks.stocks {
                let Some(sku) = scalar_field(row.sku) else {
                    continue;
                };
                records.push(StockRecord {
                    keys: vec![sku],
                    level: StockLevel {
                        available: row.amount,
                        reserved: 0,
                    },
                });
            }
        }
        Ok(records)
    }

    async fn prices(
        &self,
        ids: &[String],
        cursor: Option<String>,
    ) -> Result<Page<PriceRecord>, MarketError> {
        let limit: usize = 1000;
        let offset: usize = cursor
            .as_deref()
            .and_then(|c| c.parse().ok())
            .unwrap_or_default();
        let path = format!("api/v2/list/goods/filter?limit={limit}&offset={offset}");
        let value = self.request_json(reqwest::Method::GET, &path, None).await?;
        let envelope: GoodsResponse = Self::decode("api/v2/list/goods/filter", value)?;

        let fetched = envelope.data.list_goods.len();
        // The filter endpoint cannot be keyed by id; narrow its pages to the
        // requested batch client-side.
        let wanted: std::collections::HashSet<&str> = ids.iter().map(String::as_str).collect();
        let items: Vec<PriceRecord> = envelope
            .data
            .list_goods
            .into_iter()
            .filter_map(|goods| {
                let nm_id = scalar_field(goods.nm_id)?;
                let vendor_code = scalar_field(goods.vendor_code);
                if !wanted.contains(nm_id.as_str())
                    && !vendor_code
                        .as_deref()
                        .is_some_and(|code| wanted.contains(code))
                {
                    return None;
                }
                let size = goods.sizes.into_iter().next()?;
                let value = scalar_field(size.discounted_price).or_else(|| scalar_field(size.price))?;
                Some(PriceRecord {
                    keys: [vendor_code, Some(nm_id)].into_iter().flatten().collect(),
                    price: PriceTag {
                        value,
                        currency_code: scalar_field(goods.currency).unwrap_or_default(),
                    },
                })
            })
            .collect();

        let next_cursor = (fetched == limit).then(|| (offset + limit).to_string());

        Ok(Page { items, next_cursor })
    }

    async fn update_prices(
        &self,
        updates: &[PriceUpdate],
    ) -> Result<PriceUpdateOutcome, MarketError> {
        let mut outcome = PriceUpdateOutcome::default();

        let data: Vec<serde_json::Value> = updates
            .iter()
            .filter_map(|u| {
                let nm_id: i64 = u
                    .sku
                    .as_deref()
                    .or(u.primary_id.as_deref())
                    .and_then(|id| id.parse().ok())?;
                let price: f64 = u.price.value.parse().ok()?;
                Some(json!({"nmID": nm_id, "price": price}))
            })
            .collect();

        // Offers without a numeric id cannot be priced on this marketplace.
        for update in updates {
            let has_numeric = update
                .sku
                .as_deref()
                .or(update.primary_id.as_deref())
                .is_some_and(|id| id.parse::<i64>().is_ok());
            if !has_numeric || update.price.value.parse::<f64>().is_err() {
                outcome.errors.push(PriceUpdateError {
                    offer_id: update.offer_id.clone(),
                    message: "offer has no numeric marketplace id or parsable price".to_owned(),
                });
            }
        }

        if data.is_empty() {
            return Ok(outcome);
        }

        let body = json!({"data": data});
        self.request_json(reqwest::Method::POST, "api/v2/upload/task", Some(&body))
            .await?;
        outcome.updated += data.len();
        Ok(outcome)
    }
}

#[cfg(test)]
#[path = "wildberries_test.rs"]
mod tests;
