use serde::{Deserialize, Serialize};

/// One entry from a storefront's paginated offer listing, normalized to a
/// marketplace-neutral shape by the adapter that fetched it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListedOffer {
    /// Storefront-internal product id, stored as a string to avoid precision
    /// loss on 64-bit numeric ids.
    pub primary_id: String,
    /// Merchant-assigned code for the offer. This doubles as the vendor code
    /// that unifies the same physical product across storefronts.
    pub offer_id: String,
    /// Marketplace-assigned numeric id, when the listing exposes one.
    pub sku: Option<String>,
    /// Listing-provided display name; may be empty on sparse listings.
    pub name: String,
    /// Marketplace-local status string (e.g. `"active"`, `"archived"`).
    pub status: String,
    /// Price as reported inline by the listing. The price facet overrides
    /// this whenever it produced a value for the offer.
    pub price_hint: Option<PriceTag>,
    /// Images embedded in the listing payload itself.
    pub images: Vec<String>,
}

impl ListedOffer {
    /// Candidate join keys in lookup priority order: trimmed `offer_id`,
    /// then `sku`, then `primary_id`. Empty components are dropped.
    #[must_use]
    pub fn join_keys(&self) -> Vec<&str> {
        let mut keys = Vec::with_capacity(3);
        let offer = self.offer_id.trim();
        if !offer.is_empty() {
            keys.push(offer);
        }
        if let Some(sku) = self.sku.as_deref() {
            let sku = sku.trim();
            if !sku.is_empty() && !keys.contains(&sku) {
                keys.push(sku);
            }
        }
        let primary = self.primary_id.trim();
        if !primary.is_empty() && !keys.contains(&primary) {
            keys.push(primary);
        }
        keys
    }

    /// The merchant vendor code, when the listing carries a usable one.
    #[must_use]
    pub fn vendor_code(&self) -> Option<&str> {
        let trimmed = self.offer_id.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }
}

/// Attribute-facet record: descriptive metadata keyed by whatever identifiers
/// the marketplace chose to echo back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributesRecord {
    /// Identifiers this record can be joined under.
    pub keys: Vec<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub images: Vec<String>,
    /// Single cover-photo field some marketplaces report instead of a list.
    pub cover: Option<String>,
}

/// Image-facet record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRecord {
    pub keys: Vec<String>,
    pub urls: Vec<String>,
}

/// Stock counts for one offer, possibly one warehouse's worth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub available: i64,
    pub reserved: i64,
}

impl StockLevel {
    /// Sum two warehouse rows into one aggregate level.
    #[must_use]
    pub fn plus(self, other: StockLevel) -> StockLevel {
        StockLevel {
            available: self.available.saturating_add(other.available),
            reserved: self.reserved.saturating_add(other.reserved),
        }
    }
}

/// Stock-facet record. A marketplace that reports per-warehouse rows emits
/// one record per warehouse; the merger sums rows sharing a key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockRecord {
    pub keys: Vec<String>,
    pub level: StockLevel,
}

/// A price with its currency, value kept as a decimal string exactly as the
/// marketplace returned it. Persistence casts to `NUMERIC(12,2)` in the DB
/// layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceTag {
    pub value: String,
    pub currency_code: String,
}

/// Price-facet record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceRecord {
    pub keys: Vec<String>,
    pub price: PriceTag,
}

/// The reconciled join of a [`ListedOffer`] with every facet record that
/// matched one of its keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergedOffer {
    pub primary_id: String,
    pub offer_id: String,
    pub sku: Option<String>,
    pub name: String,
    /// `true` when no real display name was available anywhere and `name`
    /// fell back to the offer id. A later sync with a real name clears the
    /// stored placeholder.
    pub name_is_placeholder: bool,
    pub description: Option<String>,
    pub category: Option<String>,
    pub images: Vec<String>,
    pub price: Option<PriceTag>,
    pub stock: Option<StockLevel>,
    pub status: String,
}

impl MergedOffer {
    /// The merchant vendor code used for cross-storefront linking, when the
    /// offer carries a usable one.
    #[must_use]
    pub fn vendor_code(&self) -> Option<&str> {
        let trimmed = self.offer_id.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listed(offer_id: &str, sku: Option<&str>, primary_id: &str) -> ListedOffer {
        ListedOffer {
            primary_id: primary_id.to_string(),
            offer_id: offer_id.to_string(),
            sku: sku.map(ToOwned::to_owned),
            name: "Widget".to_string(),
            status: "active".to_string(),
            price_hint: None,
            images: vec![],
        }
    }

    #[test]
    fn join_keys_in_priority_order() {
        let offer = listed("VC-100", Some("987654"), "111222");
        assert_eq!(offer.join_keys(), vec!["VC-100", "987654", "111222"]);
    }

    #[test]
    fn join_keys_trims_and_drops_empty_components() {
        let offer = listed("  VC-100 ", Some("   "), "111222");
        assert_eq!(offer.join_keys(), vec!["VC-100", "111222"]);
    }

    #[test]
    fn join_keys_deduplicates_identical_ids() {
        // Some APIs echo the offer id in the sku slot.
        let offer = listed("VC-100", Some("VC-100"), "VC-100");
        assert_eq!(offer.join_keys(), vec!["VC-100"]);
    }

    #[test]
    fn vendor_code_absent_when_offer_id_blank() {
        let offer = listed("  ", None, "111222");
        assert!(offer.vendor_code().is_none());
    }

    #[test]
    fn stock_level_plus_sums_warehouses() {
        let a = StockLevel {
            available: 5,
            reserved: 1,
        };
        let b = StockLevel {
            available: 7,
            reserved: 0,
        };
        assert_eq!(
            a.plus(b),
            StockLevel {
                available: 12,
                reserved: 1
            }
        );
    }

    #[test]
    fn stock_level_plus_saturates() {
        let a = StockLevel {
            available: i64::MAX,
            reserved: 0,
        };
        let b = StockLevel {
            available: 1,
            reserved: 0,
        };
        assert_eq!(a.plus(b).available, i64::MAX);
    }

    #[test]
    fn serde_roundtrip_merged_offer() {
        let merged = MergedOffer {
            primary_id: "111222".to_string(),
            offer_id: "VC-100".to_string(),
            sku: Some("987654".to_string()),
            name: "Widget Pro".to_string(),
            name_is_placeholder: false,
            description: Some("A widget".to_string()),
            category: Some("widgets".to_string()),
            images: vec!["https://cdn.example.com/1.jpg".to_string()],
            price: Some(PriceTag {
                value: "499.00".to_string(),
                currency_code: "RUB".to_string(),
            }),
            stock: Some(StockLevel {
                available: 3,
                reserved: 1,
            }),
            status: "active".to_string(),
        };
        let json = serde_json::to_string(&merged).expect("serialization failed");
        let decoded: MergedOffer = serde_json::from_str(&json).expect("deserialization failed");
        assert_eq!(decoded.offer_id, merged.offer_id);
        assert_eq!(decoded.price, merged.price);
        assert_eq!(decoded.stock, merged.stock);
    }
}
