//! Adapter for the ozon seller API.
//!
//! All endpoints are JSON-over-POST authenticated with `Client-Id` and
//! `Api-Key` headers. Listing and price lookups paginate with an opaque
//! `last_id`/`cursor` token; facet lookups are batched by `product_id`.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use catsync_core::{
    AppConfig, AttributesRecord, ImageRecord, ListedOffer, Marketplace, PriceRecord, PriceTag,
    StockLevel, StockRecord, StorefrontConfig,
};

use crate::adapter::{MarketplaceAdapter, PriceUpdate, PriceUpdateError, PriceUpdateOutcome};
use crate::error::MarketError;
use crate::paginate::Page;
use crate::retry::retry_with_backoff;

use super::{credential_from_env, parse_base_url, read_json_response, scalar_field, Scalar};

const DEFAULT_BASE_URL: &str = "https://api-seller.ozon.ru";

/// The seller API accepts at most 1000 product ids per facet call.
const BATCH_CEILING: usize = 1000;

pub struct OzonAdapter {
    client: reqwest::Client,
    base_url: reqwest::Url,
    client_id: String,
    api_key: String,
    storefront: String,
    max_retries: u32,
    backoff_base_ms: u64,
}

impl OzonAdapter {
    /// Creates an adapter with explicit credentials and base URL — the test
    /// seam for pointing at a wiremock server.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Http`] if the `reqwest::Client` cannot be
    /// constructed, or [`MarketError::InvalidBaseUrl`] for a malformed base.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        storefront: &str,
        client_id: &str,
        api_key: &str,
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
            client_id: client_id.to_owned(),
            api_key: api_key.to_owned(),
            storefront: storefront.to_owned(),
            max_retries,
            backoff_base_ms,
        })
    }

    /// Creates the adapter for a configured storefront, reading credentials
    /// from the env vars named in the registry entry.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::MissingCredentials`] when a credential env var
    /// is unset. Storefront validation guarantees `client_id_env` is present
    /// for ozon entries.
    pub fn from_storefront(
        storefront: &StorefrontConfig,
        config: &AppConfig,
    ) -> Result<Self, MarketError> {
        let client_id_var = storefront.client_id_env.as_deref().unwrap_or_default();
        let client_id = credential_from_env(&storefront.name, client_id_var)?;
        let api_key = credential_from_env(&storefront.name, &storefront.api_key_env)?;
        let base_url = storefront.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);

        Self::new(
            &storefront.name,
            &client_id,
            &api_key,
            base_url,
            config.market_request_timeout_secs,
            &config.market_user_agent,
            config.market_max_retries,
            config.market_backoff_base_ms,
        )
    }

    /// POSTs `body` to `path` with auth headers, retrying transient failures,
    /// and returns the parsed JSON body.
    async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
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
            let body = body.clone();
            async move {
                let response = self
                    .client
                    .post(url.clone())
                    .header("Client-Id", &self.client_id)
                    .header("Api-Key", &self.api_key)
                    .json(&body)
                    .send()
                    .await?;
                read_json_response(Marketplace::Ozon, url.as_str(), response).await
            }
        })
        .await
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
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct ProductListResponse {
    #[serde(default)]
    result: ProductListResult,
}

#[derive(Debug, Default, Deserialize)]
struct ProductListResult {
    #[serde(default)]
    items: Vec<ProductListItem>,
    #[serde(default)]
    last_id: String,
}

#[derive(Debug, Deserialize)]
struct ProductListItem {
    #[serde(default)]
    product_id: Option<Scalar>,
    #[serde(default)]
    offer_id: Option<Scalar>,
    #[serde(default)]
    archived: bool,
}

#[derive(Debug, Default, Deserialize)]
struct AttributesResponse {
    #[serde(default)]
    result: Vec<AttributesItem>,
    #[serde(default)]
    last_id: String,
}

#[derive(Debug, Deserialize)]
struct AttributesItem {
    #[serde(default)]
    id: Option<Scalar>,
    #[serde(default)]
    offer_id: Option<Scalar>,
    #[serde(default)]
    sku: Option<Scalar>,
    #[serde(default)]
    name: Option<Scalar>,
    #[serde(default)]
    description_category_id: Option<Scalar>,
    #[serde(default)]
    primary_image: Option<Scalar>,
    #[serde(default)]
    images: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PicturesResponse {
    #[serde(default)]
    items: Vec<PicturesItem>,
}

#[derive(Debug, Deserialize)]
struct PicturesItem {
    #[serde(default)]
    product_id: Option<Scalar>,
    #[serde(default)]
    primary_photo: Vec<String>,
    #[serde(default)]
    photo: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StocksResponse {
    #[serde(default)]
    result: StocksResult,
}

#[derive(Debug, Default, Deserialize)]
struct StocksResult {
    #[serde(default)]
    items: Vec<StocksItem>,
}

#[derive(Debug, Deserialize)]
struct StocksItem {
    #[serde(default)]
    product_id: Option<Scalar>,
    #[serde(default)]
    offer_id: Option<Scalar>,
    #[serde(default)]
    stocks: Vec<WarehouseStock>,
}

#[derive(Debug, Deserialize)]
struct WarehouseStock {
    #[serde(default)]
    present: i64,
    #[serde(default)]
    reserved: i64,
}

#[derive(Debug, Default, Deserialize)]
struct PricesResponse {
    #[serde(default)]
    items: Vec<PricesItem>,
    #[serde(default)]
    cursor: String,
}

#[derive(Debug, Deserialize)]
struct PricesItem {
    #[serde(default)]
    product_id: Option<Scalar>,
    #[serde(default)]
    offer_id: Option<Scalar>,
    #[serde(default)]
    price: Option<PriceBody>,
}

#[derive(Debug, Deserialize)]
struct PriceBody {
    #[serde(default)]
    price: Option<Scalar>,
    #[serde(default)]
    currency_code: Option<Scalar>,
}

#[derive(Debug, Default, Deserialize)]
struct ImportPricesResponse {
    #[serde(default)]
    result: Vec<ImportPricesItem>,
}

#[derive(Debug, Deserialize)]
struct ImportPricesItem {
    #[serde(default)]
    offer_id: Option<Scalar>,
    #[serde(default)]
    updated: bool,
    #[serde(default)]
    errors: Vec<ImportPriceError>,
}

#[derive(Debug, Deserialize)]
struct ImportPriceError {
    #[serde(default)]
    message: String,
}

fn candidate_keys(parts: &[Option<String>]) -> Vec<String> {
    parts.iter().flatten().cloned().collect()
}

#[async_trait]
impl MarketplaceAdapter for OzonAdapter {
    fn marketplace(&self) -> Marketplace {
        Marketplace::Ozon
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
        let body = json!({
            "filter": {"visibility": "ALL"},
            "last_id": cursor.unwrap_or_default(),
            "limit": page_size,
        });
        let value = self.post_json("v3/product/list", &body).await?;
        let envelope: ProductListResponse = Self::decode("v3/product/list", value)?;

        let items: Vec<ListedOffer> = envelope
            .result
            .items
            .into_iter()
            .map(|item| ListedOffer {
                primary_id: scalar_field(item.product_id).unwrap_or_default(),
                offer_id: scalar_field(item.offer_id).unwrap_or_default(),
                sku: None,
                // The listing endpoint returns ids only; names and images
                // arrive via the attribute facet.
                name: String::new(),
                status: (if item.archived { "archived" } else { "active" }).to_owned(),
                price_hint: None,
                images: vec![],
            })
            .collect();

        let next_cursor = if items.is_empty() {
            None
        } else {
            Some(envelope.result.last_id).filter(|c| !c.is_empty())
        };

        Ok(Page { items, next_cursor })
    }

    async fn attributes(
        &self,
        ids: &[String],
        cursor: Option<String>,
        page_size: u32,
    ) -> Result<Page<AttributesRecord>, MarketError> {
        let body = json!({
            "filter": {"product_id": ids},
            "last_id": cursor.unwrap_or_default(),
            "limit": page_size,
        });
        let value = self.post_json("v4/product/info/attributes", &body).await?;
        let envelope: AttributesResponse = Self::decode("v4/product/info/attributes", value)?;

        let items: Vec<AttributesRecord> = envelope
            .result
            .into_iter()
            .map(|item| {
                let offer = scalar_field(item.offer_id);
                let sku = scalar_field(item.sku);
                let id = scalar_field(item.id);
                AttributesRecord {
                    keys: candidate_keys(&[offer, sku, id]),
                    name: scalar_field(item.name),
                    description: None,
                    category: scalar_field(item.description_category_id),
                    images: item.images,
                    cover: scalar_field(item.primary_image),
                }
            })
            .collect();

        let next_cursor = if items.is_empty() {
            None
        } else {
            Some(envelope.last_id).filter(|c| !c.is_empty())
        };

        Ok(Page { items, next_cursor })
    }

    async fn images(&self, ids: &[String]) -> Result<Vec<ImageRecord>, MarketError> {
        let body = json!({"product_id": ids});
        let value = self.post_json("v2/product/pictures/info", &body).await?;
        let envelope: PicturesResponse = Self::decode("v2/product/pictures/info", value)?;

        Ok(envelope
            .items
            .into_iter()
            .map(|item| {
                let mut urls = item.primary_photo;
                urls.extend(item.photo);
                ImageRecord {
                    keys: candidate_keys(&[scalar_field(item.product_id)]),
                    urls,
                }
            })
            .collect())
    }

    async fn stocks(&self, ids: &[String]) -> Result<Vec<StockRecord>, MarketError> {
        let body = json!({
            "filter": {"product_id": ids},
            "limit": ids.len(),
        });
        let value = self.post_json("v3/product/info/stocks", &body).await?;
        let envelope: StocksResponse = Self::decode("v3/product/info/stocks", value)?;

        // One record per warehouse row; the merger sums rows per key.
        let mut records = Vec::new();
        for item in envelope.result.items {
            let keys = candidate_keys(&[
                scalar_field(item.offer_id),
                scalar_field(item.product_id),
            ]);
            for warehouse in item.stocks {
                records.push(StockRecord {
                    keys: keys.clone(),
                    level: StockLevel {
                        available: warehouse.present,
                        reserved: warehouse.reserved,
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
        let body = json!({
            "filter": {"product_id": ids, "visibility": "ALL"},
            "cursor": cursor.unwrap_or_default(),
            "limit": ids.len(),
        });
        let value = self.post_json("v5/product/info/prices", &body).await?;
        let envelope: PricesResponse = Self::decode("v5/product/info/prices", value)?;

        let items: Vec<PriceRecord> = envelope
            .items
            .into_iter()
            .filter_map(|item| {
                let price = item.price?;
                let value = scalar_field(price.price)?;
                let currency_code = scalar_field(price.currency_code).unwrap_or_default();
                Some(PriceRecord {
                    keys: candidate_keys(&[
                        scalar_field(item.offer_id),
                        scalar_field(item.product_id),
                    ]),
                    price: PriceTag {
                        value,
                        currency_code,
                    },
                })
            })
            .collect();

        let next_cursor = if items.is_empty() {
            None
        } else {
            Some(envelope.cursor).filter(|c| !c.is_empty())
        };

        Ok(Page { items, next_cursor })
    }

    async fn update_prices(
        &self,
        updates: &[PriceUpdate],
    ) -> Result<PriceUpdateOutcome, MarketError> {
        let prices: Vec<serde_json::Value> = updates
            .iter()
            .map(|u| {
                json!({
                    "offer_id": u.offer_id,
                    "price": u.price.value,
                    "currency_code": u.price.currency_code,
                })
            })
            .collect();
        let body = json!({"prices": prices});
        let value = self.post_json("v1/product/import/prices", &body).await?;
        let envelope: ImportPricesResponse = Self::decode("v1/product/import/prices", value)?;

        let mut outcome = PriceUpdateOutcome::default();
        for item in envelope.result {
            if item.updated {
                outcome.updated += 1;
            } else {
                let offer_id = scalar_field(item.offer_id).unwrap_or_default();
                let message = item
                    .errors
                    .into_iter()
                    .map(|e| e.message)
                    .collect::<Vec<_>>()
                    .join("; ");
                outcome.errors.push(PriceUpdateError { offer_id, message });
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
#[path = "ozon_test.rs"]
mod tests;
