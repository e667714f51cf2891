//! Concrete marketplace adapters.

mod ozon;
mod wildberries;

pub use ozon::OzonAdapter;
pub use wildberries::WildberriesAdapter;

use std::sync::Arc;

use catsync_core::{AppConfig, Marketplace, StorefrontConfig};
use serde::Deserialize;

use crate::adapter::MarketplaceAdapter;
use crate::error::MarketError;

/// Builds the adapter for one storefront, reading its credentials from the
/// environment variables the storefront registry names.
///
/// # Errors
///
/// Returns [`MarketError::MissingCredentials`] when a named env var is unset
/// and [`MarketError::InvalidBaseUrl`] when a base-url override is malformed.
pub fn build_adapter(
    storefront: &StorefrontConfig,
    config: &AppConfig,
) -> Result<Arc<dyn MarketplaceAdapter>, MarketError> {
    match storefront.marketplace {
        Marketplace::Ozon => Ok(Arc::new(OzonAdapter::from_storefront(storefront, config)?)),
        Marketplace::Wildberries => Ok(Arc::new(WildberriesAdapter::from_storefront(
            storefront, config,
        )?)),
    }
}

/// Reads the env var named by `var`, mapping absence to
/// [`MarketError::MissingCredentials`].
pub(crate) fn credential_from_env(storefront: &str, var: &str) -> Result<String, MarketError> {
    std::env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| MarketError::MissingCredentials {
            storefront: storefront.to_owned(),
            var: var.to_owned(),
        })
}

/// Parses a base URL, normalising to exactly one trailing slash so relative
/// joins append instead of replacing the last path segment.
pub(crate) fn parse_base_url(raw: &str) -> Result<reqwest::Url, MarketError> {
    let normalised = format!("{}/", raw.trim_end_matches('/'));
    reqwest::Url::parse(&normalised).map_err(|e| MarketError::InvalidBaseUrl {
        url: raw.to_owned(),
        reason: e.to_string(),
    })
}

/// Classifies an HTTP response and parses the body as JSON.
///
/// 429 becomes [`MarketError::RateLimited`] (honouring `Retry-After` when
/// present), any other non-2xx becomes [`MarketError::UnexpectedStatus`]
/// (5xx statuses are retried upstream, 4xx are not), and an unparseable body
/// becomes [`MarketError::Deserialize`].
pub(crate) async fn read_json_response(
    marketplace: Marketplace,
    url: &str,
    response: reqwest::Response,
) -> Result<serde_json::Value, MarketError> {
    let status = response.status();

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(60);
        return Err(MarketError::RateLimited {
            marketplace: marketplace.to_string(),
            retry_after_secs,
        });
    }

    if !status.is_success() {
        return Err(MarketError::UnexpectedStatus {
            status: status.as_u16(),
            url: url.to_owned(),
        });
    }

    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| MarketError::Deserialize {
        context: url.to_owned(),
        source: e,
    })
}

/// An identifier or money amount a marketplace may serialize as either a
/// JSON string or a number. Empty strings and `null` are "absent" — they
/// must never coerce to zero.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum Scalar {
    Str(String),
    Int(i64),
    Float(f64),
    Null(()),
}

impl Scalar {
    pub(crate) fn into_non_empty(self) -> Option<String> {
        match self {
            Scalar::Str(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_owned())
            }
            Scalar::Int(i) => Some(i.to_string()),
            Scalar::Float(f) => Some(f.to_string()),
            Scalar::Null(()) => None,
        }
    }
}

pub(crate) fn scalar_field(value: Option<Scalar>) -> Option<String> {
    value.and_then(Scalar::into_non_empty)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Probe {
        #[serde(default)]
        id: Option<Scalar>,
    }

    #[test]
    fn scalar_parses_string_and_number_identically() {
        let from_str: Probe = serde_json::from_str(r#"{"id": "987"}"#).unwrap();
        let from_num: Probe = serde_json::from_str(r#"{"id": 987}"#).unwrap();
        assert_eq!(scalar_field(from_str.id), Some("987".to_owned()));
        assert_eq!(scalar_field(from_num.id), Some("987".to_owned()));
    }

    #[test]
    fn scalar_treats_empty_null_and_missing_as_absent() {
        let empty: Probe = serde_json::from_str(r#"{"id": ""}"#).unwrap();
        let null: Probe = serde_json::from_str(r#"{"id": null}"#).unwrap();
        let missing: Probe = serde_json::from_str("{}").unwrap();
        assert_eq!(scalar_field(empty.id), None);
        assert_eq!(scalar_field(null.id), None);
        assert_eq!(scalar_field(missing.id), None);
    }

    #[test]
    fn scalar_never_coerces_absent_to_zero() {
        let empty: Probe = serde_json::from_str(r#"{"id": "  "}"#).unwrap();
        assert_ne!(scalar_field(empty.id), Some("0".to_owned()));
    }

    #[test]
    fn parse_base_url_normalises_trailing_slash() {
        let url = parse_base_url("https://api-seller.ozon.ru").unwrap();
        assert_eq!(url.as_str(), "https://api-seller.ozon.ru/");
        let url = parse_base_url("https://api-seller.ozon.ru///").unwrap();
        assert_eq!(url.as_str(), "https://api-seller.ozon.ru/");
    }

    #[test]
    fn parse_base_url_rejects_garbage() {
        assert!(matches!(
            parse_base_url("not a url"),
            Err(MarketError::InvalidBaseUrl { .. })
        ));
    }
}
