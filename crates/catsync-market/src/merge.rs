//! Multi-key reconciliation of facet responses into unified offers.
//!
//! Facet endpoints are not guaranteed to echo the same identifier a listing
//! carries: attributes may come back keyed by offer id, stocks by SKU, prices
//! by the storefront-internal id. Each facet is loaded into a [`FacetIndex`]
//! where one record is reachable under every candidate key, and each listing
//! item is resolved against the index through an ordered list of
//! [`KeyStrategy`] values — exact offer id first, exact secondary id next,
//! substring containment strictly last.

use std::collections::HashMap;

use catsync_core::{
    AttributesRecord, ImageRecord, ListedOffer, MergedOffer, PriceRecord, PriceTag, StockLevel,
    StockRecord,
};

/// How many unmatched / containment-matched offers are logged per merge pass.
/// Everything past the sample is still counted, just not logged.
const DIAGNOSTIC_LOG_SAMPLE: usize = 5;

/// Returns the trimmed string when it is non-empty. Empty strings and
/// whitespace behave exactly like an absent value — never like zero or a
/// usable key.
fn non_empty(s: &str) -> Option<&str> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

fn opt_non_empty(s: Option<&str>) -> Option<&str> {
    s.and_then(non_empty)
}

// ---------------------------------------------------------------------------
// FacetIndex
// ---------------------------------------------------------------------------

/// One lookup map per facet. A record is inserted under every candidate key
/// it was reported with; a later record for an occupied key is combined into
/// the existing one rather than replacing it.
#[derive(Debug)]
pub struct FacetIndex<T> {
    entries: HashMap<String, T>,
    combine: fn(&mut T, &T),
}

impl<T: Clone> FacetIndex<T> {
    pub fn new(combine: fn(&mut T, &T)) -> Self {
        Self {
            entries: HashMap::new(),
            combine,
        }
    }

    /// Indexes `value` under every non-empty key in `keys`. Occupied keys are
    /// combined via the index's combine function.
    pub fn insert(&mut self, keys: &[String], value: &T) {
        for key in keys {
            let Some(key) = non_empty(key) else { continue };
            if let Some(existing) = self.entries.get_mut(key) {
                (self.combine)(existing, value);
            } else {
                self.entries.insert(key.to_owned(), value.clone());
            }
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&T> {
        self.entries.get(key)
    }

    /// Substring-containment lookup: a stored key that contains `id`, or that
    /// `id` contains. Last-resort only; can in principle join two unrelated
    /// offers whose codes are substrings of each other, which is why every
    /// hit is flagged in [`MergeDiagnostics`].
    fn containment_lookup(&self, id: &str) -> Option<&T> {
        self.entries
            .iter()
            .find(|(key, _)| key.contains(id) || id.contains(key.as_str()))
            .map(|(_, value)| value)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Later attribute records fill in or overwrite fields, but only with
/// non-empty values — a known name or image list is never clobbered by an
/// empty one.
fn combine_attributes(existing: &mut AttributesRecord, new: &AttributesRecord) {
    if opt_non_empty(new.name.as_deref()).is_some() {
        existing.name.clone_from(&new.name);
    }
    if opt_non_empty(new.description.as_deref()).is_some() {
        existing.description.clone_from(&new.description);
    }
    if opt_non_empty(new.category.as_deref()).is_some() {
        existing.category.clone_from(&new.category);
    }
    if !new.images.is_empty() {
        existing.images.clone_from(&new.images);
    }
    if opt_non_empty(new.cover.as_deref()).is_some() {
        existing.cover.clone_from(&new.cover);
    }
}

/// Stock rows accumulate: one marketplace reports a row per warehouse and the
/// totals are the sum.
fn combine_stock(existing: &mut StockLevel, new: &StockLevel) {
    *existing = existing.plus(*new);
}

fn combine_images(existing: &mut Vec<String>, new: &Vec<String>) {
    if !new.is_empty() {
        existing.clone_from(new);
    }
}

fn combine_price(existing: &mut PriceTag, new: &PriceTag) {
    if non_empty(&new.value).is_some() {
        existing.clone_from(new);
    }
}

/// All four facet indexes for one storefront's fetch cycle.
#[derive(Debug)]
pub struct FacetSet {
    pub attributes: FacetIndex<AttributesRecord>,
    pub images: FacetIndex<Vec<String>>,
    pub stocks: FacetIndex<StockLevel>,
    pub prices: FacetIndex<PriceTag>,
}

impl FacetSet {
    #[must_use]
    pub fn from_records(
        attributes: &[AttributesRecord],
        images: &[ImageRecord],
        stocks: &[StockRecord],
        prices: &[PriceRecord],
    ) -> Self {
        let mut attr_index = FacetIndex::new(combine_attributes);
        for record in attributes {
            attr_index.insert(&record.keys, record);
        }

        let mut image_index = FacetIndex::new(combine_images);
        for record in images {
            image_index.insert(&record.keys, &record.urls);
        }

        let mut stock_index = FacetIndex::new(combine_stock);
        for record in stocks {
            stock_index.insert(&record.keys, &record.level);
        }

        let mut price_index = FacetIndex::new(combine_price);
        for record in prices {
            price_index.insert(&record.keys, &record.price);
        }

        Self {
            attributes: attr_index,
            images: image_index,
            stocks: stock_index,
            prices: price_index,
        }
    }
}

// ---------------------------------------------------------------------------
// Key resolution
// ---------------------------------------------------------------------------

/// Ordered key-resolution strategies. Tried strictly in declaration order;
/// [`KeyStrategy::Containment`] is the documented last resort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStrategy {
    /// Exact match on the trimmed merchant offer id.
    ExactOfferId,
    /// Exact match on the trimmed SKU, then the storefront-internal id.
    ExactSecondaryId,
    /// Substring containment in either direction.
    Containment,
}

pub const KEY_STRATEGIES: [KeyStrategy; 3] = [
    KeyStrategy::ExactOfferId,
    KeyStrategy::ExactSecondaryId,
    KeyStrategy::Containment,
];

/// Resolves `offer` against one facet index, trying each strategy in order.
pub fn resolve<'a, T: Clone>(
    index: &'a FacetIndex<T>,
    offer: &ListedOffer,
) -> Option<(&'a T, KeyStrategy)> {
    for strategy in KEY_STRATEGIES {
        let hit = match strategy {
            KeyStrategy::ExactOfferId => non_empty(&offer.offer_id).and_then(|id| index.get(id)),
            KeyStrategy::ExactSecondaryId => opt_non_empty(offer.sku.as_deref())
                .and_then(|id| index.get(id))
                .or_else(|| non_empty(&offer.primary_id).and_then(|id| index.get(id))),
            KeyStrategy::Containment => offer
                .join_keys()
                .into_iter()
                .find_map(|id| index.containment_lookup(id)),
        };
        if let Some(value) = hit {
            return Some((value, strategy));
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Merging
// ---------------------------------------------------------------------------

/// Counters describing one merge pass, surfaced in the sync summary and used
/// to rate-limit diagnostic logging.
#[derive(Debug, Default)]
pub struct MergeDiagnostics {
    /// Offers for which at least one facet resolved.
    pub matched: usize,
    /// Offers no facet matched under any strategy.
    pub unmatched: usize,
    /// Facet hits that needed the substring fallback.
    pub containment_matches: usize,
    /// Offers whose name fell back to the offer id.
    pub placeholder_names: usize,
    logged_unmatched: usize,
    logged_containment: usize,
}

impl MergeDiagnostics {
    fn note_unmatched(&mut self, offer: &ListedOffer) {
        self.unmatched += 1;
        if self.logged_unmatched < DIAGNOSTIC_LOG_SAMPLE {
            self.logged_unmatched += 1;
            tracing::warn!(
                offer_id = %offer.offer_id,
                sku = ?offer.sku,
                primary_id = %offer.primary_id,
                "no facet matched this offer under any key strategy"
            );
        }
    }

    fn note_containment(&mut self, offer: &ListedOffer) {
        self.containment_matches += 1;
        if self.logged_containment < DIAGNOSTIC_LOG_SAMPLE {
            self.logged_containment += 1;
            tracing::warn!(
                offer_id = %offer.offer_id,
                "facet matched only via substring containment — verify identifiers"
            );
        }
    }
}

/// Joins one listing item with every facet record that resolves for it.
///
/// Field precedence follows the reconciliation contract: a facet value
/// overrides the listing's own guess only when non-empty. Name resolution is
/// facet display name → listing name → the offer id itself as an absolute
/// last resort, flagged so the placeholder is replaced once a later sync sees
/// a real name. Image resolution takes the first non-empty source wholesale
/// (image facet → listing-embedded → attribute images → cover photo), never
/// mixing partial sources into one list.
pub fn merge_offer(
    offer: &ListedOffer,
    facets: &FacetSet,
    diag: &mut MergeDiagnostics,
) -> MergedOffer {
    let attributes = resolve(&facets.attributes, offer);
    let image_urls = resolve(&facets.images, offer);
    let stock = resolve(&facets.stocks, offer);
    let price = resolve(&facets.prices, offer);

    let mut any_match = false;
    let mut containment = false;
    for strategy in [
        attributes.as_ref().map(|(_, s)| *s),
        image_urls.as_ref().map(|(_, s)| *s),
        stock.as_ref().map(|(_, s)| *s),
        price.as_ref().map(|(_, s)| *s),
    ]
    .into_iter()
    .flatten()
    {
        any_match = true;
        containment |= strategy == KeyStrategy::Containment;
    }
    if any_match {
        diag.matched += 1;
        if containment {
            diag.note_containment(offer);
        }
    } else {
        diag.note_unmatched(offer);
    }

    let attrs = attributes.map(|(a, _)| a);

    let facet_name = attrs.and_then(|a| opt_non_empty(a.name.as_deref()));
    let listing_name = non_empty(&offer.name);
    let (name, name_is_placeholder) = match facet_name.or(listing_name) {
        Some(real) => (real.to_owned(), false),
        None => {
            diag.placeholder_names += 1;
            (offer.offer_id.trim().to_owned(), true)
        }
    };

    let images = first_image_source(offer, attrs, image_urls.map(|(urls, _)| urls));

    MergedOffer {
        primary_id: offer.primary_id.clone(),
        offer_id: offer.offer_id.trim().to_owned(),
        sku: offer.sku.clone(),
        name,
        name_is_placeholder,
        description: attrs.and_then(|a| opt_non_empty(a.description.as_deref()).map(str::to_owned)),
        category: attrs.and_then(|a| opt_non_empty(a.category.as_deref()).map(str::to_owned)),
        images,
        price: price
            .map(|(p, _)| p.clone())
            .or_else(|| offer.price_hint.clone()),
        stock: stock.map(|(s, _)| *s),
        status: offer.status.clone(),
    }
}

/// First non-empty image source wins and is taken wholesale.
fn first_image_source(
    offer: &ListedOffer,
    attrs: Option<&AttributesRecord>,
    facet_urls: Option<&Vec<String>>,
) -> Vec<String> {
    if let Some(urls) = facet_urls {
        if !urls.is_empty() {
            return urls.clone();
        }
    }
    if !offer.images.is_empty() {
        return offer.images.clone();
    }
    if let Some(a) = attrs {
        if !a.images.is_empty() {
            return a.images.clone();
        }
        if let Some(cover) = opt_non_empty(a.cover.as_deref()) {
            return vec![cover.to_owned()];
        }
    }
    Vec::new()
}

/// Merges a whole listing. Order-independent: every join goes through keyed
/// maps, so out-of-order batch completion upstream cannot change the result.
pub fn merge_offers(
    offers: &[ListedOffer],
    facets: &FacetSet,
    diag: &mut MergeDiagnostics,
) -> Vec<MergedOffer> {
    offers
        .iter()
        .map(|offer| merge_offer(offer, facets, diag))
        .collect()
}
