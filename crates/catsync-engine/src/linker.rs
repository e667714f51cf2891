//! Cross-catalog product linking.
//!
//! Resolves a merged offer to its canonical product (creating on first
//! sighting of the vendor code) and its per-storefront link. Shared product
//! fields only move forward: a field is patched when the new value is
//! present and non-trivial, so one storefront's sparse listing cannot erase
//! what another storefront already contributed. Link-local fields
//! (price, stock, status) are authoritative from the storefront and always
//! take the latest fetch.

use catsync_core::MergedOffer;
use catsync_db::{LinkFields, ProductPatch};
use sqlx::PgPool;

use crate::DbError;

/// Builds the shared-field patch for the canonical product. `None` fields
/// leave the stored value untouched.
///
/// A placeholder name (the offer id standing in for a missing display name)
/// is never written over a product's stored name — the product would end up
/// "named" its own code.
#[must_use]
pub fn product_patch(offer: &MergedOffer) -> ProductPatch {
    let name = (!offer.name_is_placeholder)
        .then(|| offer.name.trim())
        .filter(|n| !n.is_empty())
        .map(str::to_owned);

    ProductPatch {
        name,
        description: offer.description.clone(),
        category: offer.category.clone(),
        images: (!offer.images.is_empty()).then(|| offer.images.clone()),
    }
}

/// Builds the storefront-local link fields. These overwrite unconditionally.
#[must_use]
pub fn link_fields(offer: &MergedOffer) -> LinkFields {
    LinkFields {
        offer_id: offer.offer_id.clone(),
        sku: offer.sku.clone(),
        primary_id: Some(offer.primary_id.clone()).filter(|id| !id.is_empty()),
        price: offer.price.as_ref().map(|p| p.value.clone()),
        currency_code: offer.price.as_ref().map(|p| p.currency_code.clone()),
        stock_available: offer.stock.map_or(0, |s| s.available),
        stock_reserved: offer.stock.map_or(0, |s| s.reserved),
        status: Some(offer.status.clone()).filter(|s| !s.is_empty()),
    }
}

/// Resolves the canonical product and upserts the storefront link for one
/// merged offer. The caller guarantees `vendor_code` is present and
/// non-empty.
///
/// # Errors
///
/// Returns [`DbError`] when either upsert fails; the writer counts the
/// failure and moves on.
pub async fn link_offer(
    pool: &PgPool,
    storefront: &str,
    vendor_code: &str,
    offer: &MergedOffer,
) -> Result<i64, DbError> {
    let product_id =
        catsync_db::upsert_canonical_product(pool, vendor_code, &product_patch(offer)).await?;
    catsync_db::upsert_storefront_link(pool, product_id, storefront, &link_fields(offer)).await?;
    Ok(product_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use catsync_core::{PriceTag, StockLevel};

    fn merged(name: &str, placeholder: bool) -> MergedOffer {
        MergedOffer {
            primary_id: "111222".to_string(),
            offer_id: "VC-100".to_string(),
            sku: Some("987654".to_string()),
            name: name.to_string(),
            name_is_placeholder: placeholder,
            description: None,
            category: None,
            images: vec![],
            price: Some(PriceTag {
                value: "500.00".to_string(),
                currency_code: "RUB".to_string(),
            }),
            stock: Some(StockLevel {
                available: 5,
                reserved: 1,
            }),
            status: "active".to_string(),
        }
    }

    #[test]
    fn real_name_is_patched() {
        let patch = product_patch(&merged("Widget Pro", false));
        assert_eq!(patch.name.as_deref(), Some("Widget Pro"));
    }

    #[test]
    fn placeholder_name_is_never_patched() {
        let patch = product_patch(&merged("VC-100", true));
        assert_eq!(patch.name, None);
    }

    #[test]
    fn blank_name_is_never_patched() {
        let patch = product_patch(&merged("   ", false));
        assert_eq!(patch.name, None);
    }

    #[test]
    fn empty_image_list_leaves_stored_images_alone() {
        let patch = product_patch(&merged("Widget", false));
        assert_eq!(patch.images, None);
    }

    #[test]
    fn non_empty_images_are_patched_wholesale() {
        let mut offer = merged("Widget", false);
        offer.images = vec!["a.jpg".to_string()];
        let patch = product_patch(&offer);
        assert_eq!(patch.images, Some(vec!["a.jpg".to_string()]));
    }

    #[test]
    fn link_fields_carry_price_stock_and_status() {
        let fields = link_fields(&merged("Widget", false));
        assert_eq!(fields.offer_id, "VC-100");
        assert_eq!(fields.price.as_deref(), Some("500.00"));
        assert_eq!(fields.currency_code.as_deref(), Some("RUB"));
        assert_eq!(fields.stock_available, 5);
        assert_eq!(fields.stock_reserved, 1);
        assert_eq!(fields.status.as_deref(), Some("active"));
    }

    #[test]
    fn link_fields_default_stock_to_zero_when_facet_missing() {
        let mut offer = merged("Widget", false);
        offer.stock = None;
        offer.price = None;
        let fields = link_fields(&offer);
        assert_eq!(fields.stock_available, 0);
        assert_eq!(fields.price, None, "no price facet means NULL, not zero");
    }
}
