//! # Filter Compiler
//!
//! Turns `SearchParams` into a `VenueFilter`: a conjunction of independent
//! predicates. An absent input contributes no predicate, so missing filters
//! widen the result set rather than narrowing it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Category, GeoPoint, SpecialOffer, Venue};
use crate::params::SearchParams;

/// Subcategory value meaning "every subcategory".
pub const ALL_SUBCATEGORIES: &str = "all";

/// Inclusive map viewport. No antimeridian wrapping: `sw_lng <= lng <= ne_lng`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapBounds {
    pub ne_lat: f64,
    pub ne_lng: f64,
    pub sw_lat: f64,
    pub sw_lng: f64,
}

impl MapBounds {
    pub fn contains(&self, point: GeoPoint) -> bool {
        (self.sw_lat..=self.ne_lat).contains(&point.latitude)
            && (self.sw_lng..=self.ne_lng).contains(&point.longitude)
    }
}

/// How the `tags` parameter narrows results. Tag *ranking* is `sort=tag_count`
/// and is independent of this setting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagFilterMode {
    /// Tags are carried through but never exclude a venue
    #[default]
    Advisory,
    /// Venue must carry at least one requested tag
    Any,
    /// Venue must carry every requested tag
    All,
}

/// Normalized predicate over venues. Text needles are stored lowercased.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VenueFilter {
    pub category_id: Option<Uuid>,
    pub sub_category: Option<String>,
    /// Matched against region1..region4 and the address
    pub region: Option<String>,
    /// Matched against name and description
    pub text: Option<String>,
    pub bounds: Option<MapBounds>,
    /// OR-matched against the venue's offers
    pub special_offers: Vec<SpecialOffer>,
    pub tags: Vec<String>,
    pub tag_mode: TagFilterMode,
}

impl VenueFilter {
    /// `category` is the result of looking up `params.category`; an unknown
    /// key arrives as `None` and drops the category predicate entirely.
    pub fn compile(params: &SearchParams, category: Option<&Category>, tag_mode: TagFilterMode) -> Self {
        let category_id = category.map(|c| c.id);
        let sub_category = category_id.and(params.sub_category.as_deref()).and_then(|sub| {
            if sub.eq_ignore_ascii_case(ALL_SUBCATEGORIES) {
                None
            } else {
                Some(sub.to_string())
            }
        });

        Self {
            category_id,
            sub_category,
            region: params.region.as_deref().map(str::to_lowercase),
            text: params.q.as_deref().map(str::to_lowercase),
            bounds: params.bounds,
            special_offers: params.special_offers.clone(),
            tags: params.tags.clone(),
            tag_mode,
        }
    }

    /// True when any predicate other than free text is present. Only
    /// non-structural searches may take the store's proximity shortcut.
    pub fn is_structural(&self) -> bool {
        self.category_id.is_some()
            || self.sub_category.is_some()
            || self.region.is_some()
            || self.bounds.is_some()
            || !self.special_offers.is_empty()
            || self.narrows_by_tags()
    }

    pub fn narrows_by_tags(&self) -> bool {
        self.tag_mode != TagFilterMode::Advisory && !self.tags.is_empty()
    }

    pub fn matches(&self, venue: &Venue) -> bool {
        if let Some(id) = self.category_id {
            if venue.category_id != id {
                return false;
            }
        }
        if let Some(sub) = &self.sub_category {
            if !venue
                .sub_category
                .as_deref()
                .is_some_and(|s| s.eq_ignore_ascii_case(sub))
            {
                return false;
            }
        }
        if let Some(needle) = &self.region {
            let hit = venue
                .region
                .names()
                .chain(std::iter::once(venue.address.as_str()))
                .any(|hay| hay.to_lowercase().contains(needle));
            if !hit {
                return false;
            }
        }
        if let Some(needle) = &self.text {
            if !venue.name.to_lowercase().contains(needle)
                && !venue.description.to_lowercase().contains(needle)
            {
                return false;
            }
        }
        if let Some(bounds) = &self.bounds {
            if !bounds.contains(venue.location()) {
                return false;
            }
        }
        if !self.special_offers.is_empty()
            && !venue
                .special_offers
                .iter()
                .any(|o| self.special_offers.contains(o))
        {
            return false;
        }
        match self.tag_mode {
            TagFilterMode::Advisory => true,
            _ if self.tags.is_empty() => true,
            TagFilterMode::Any => self.tags.iter().any(|t| venue.has_tag(t)),
            TagFilterMode::All => self.tags.iter().all(|t| venue.has_tag(t)),
        }
    }
}
