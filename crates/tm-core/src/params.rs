//! # Search Parameters
//!
//! Raw query-string values and their lenient conversion into `SearchParams`.
//!
//! Numeric parsing is permissive on purpose: a malformed latitude or longitude
//! becomes 0 and a malformed page or limit becomes 1, instead of rejecting the
//! request. Existing clients send such values and rely on getting results back.

use tracing::debug;

use crate::filter::MapBounds;
use crate::models::{GeoPoint, SpecialOffer};
use crate::ranking::SortKey;

/// Query string exactly as the client sent it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSearchParams {
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub q: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
    pub category: Option<String>,
    pub sub_category: Option<String>,
    pub region: Option<String>,
    pub ne_lat: Option<String>,
    pub ne_lng: Option<String>,
    pub sw_lat: Option<String>,
    pub sw_lng: Option<String>,
    pub sort: Option<String>,
    /// Comma-separated; repeated `tags` keys are joined
    pub tags: Option<String>,
    /// Comma-separated, e.g. `Discount,Special Gift`; repeated keys are joined
    pub special_offer_type: Option<String>,
}

impl RawSearchParams {
    /// Folds decoded query pairs. List keys may repeat (`tags=a&tags=b`) or
    /// carry a comma-separated value; for scalar keys the last value wins.
    /// Unknown keys are ignored.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut raw = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_str() {
                "latitude" => &mut raw.latitude,
                "longitude" => &mut raw.longitude,
                "q" => &mut raw.q,
                "page" => &mut raw.page,
                "limit" => &mut raw.limit,
                "category" => &mut raw.category,
                "subCategory" => &mut raw.sub_category,
                "region" => &mut raw.region,
                "neLat" => &mut raw.ne_lat,
                "neLng" => &mut raw.ne_lng,
                "swLat" => &mut raw.sw_lat,
                "swLng" => &mut raw.sw_lng,
                "sort" => &mut raw.sort,
                "tags" | "tags[]" => {
                    append_list(&mut raw.tags, value);
                    continue;
                }
                "specialOfferType" | "specialOfferType[]" => {
                    append_list(&mut raw.special_offer_type, value);
                    continue;
                }
                other => {
                    debug!(key = other, "ignoring unknown search parameter");
                    continue;
                }
            };
            *slot = Some(value);
        }
        raw
    }
}

fn append_list(slot: &mut Option<String>, value: String) {
    match slot {
        Some(existing) => {
            existing.push(',');
            existing.push_str(&value);
        }
        None => *slot = Some(value),
    }
}

/// Typed search request. The orchestrator is a function of this struct alone.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchParams {
    pub origin: GeoPoint,
    pub q: Option<String>,
    pub category: Option<String>,
    pub sub_category: Option<String>,
    pub region: Option<String>,
    pub bounds: Option<MapBounds>,
    pub tags: Vec<String>,
    pub special_offers: Vec<SpecialOffer>,
    pub sort: SortKey,
    pub page: u32,
    /// `None` means the configured default
    pub limit: Option<u32>,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            origin: GeoPoint::new(0.0, 0.0),
            q: None,
            category: None,
            sub_category: None,
            region: None,
            bounds: None,
            tags: Vec::new(),
            special_offers: Vec::new(),
            sort: SortKey::Distance,
            page: 1,
            limit: None,
        }
    }
}

impl SearchParams {
    pub fn from_raw(raw: RawSearchParams) -> Self {
        let origin = GeoPoint::new(
            lenient_f64("latitude", raw.latitude.as_deref()),
            lenient_f64("longitude", raw.longitude.as_deref()),
        );

        let bounds = match (
            strict_f64(raw.ne_lat.as_deref()),
            strict_f64(raw.ne_lng.as_deref()),
            strict_f64(raw.sw_lat.as_deref()),
            strict_f64(raw.sw_lng.as_deref()),
        ) {
            (Some(ne_lat), Some(ne_lng), Some(sw_lat), Some(sw_lng)) => Some(MapBounds {
                ne_lat,
                ne_lng,
                sw_lat,
                sw_lng,
            }),
            _ => None,
        };

        let special_offers = split_list(raw.special_offer_type.as_deref())
            .into_iter()
            .filter_map(|s| match s.parse::<SpecialOffer>() {
                Ok(offer) => Some(offer),
                Err(_) => {
                    debug!(offer = %s, "ignoring unknown special offer type");
                    None
                }
            })
            .collect();

        Self {
            origin,
            q: non_blank(raw.q),
            category: non_blank(raw.category),
            sub_category: non_blank(raw.sub_category),
            region: non_blank(raw.region),
            bounds,
            tags: split_list(raw.tags.as_deref()),
            special_offers,
            sort: SortKey::parse_lenient(raw.sort.as_deref()),
            page: raw.page.as_deref().map_or(1, |s| lenient_u32("page", s)),
            limit: raw.limit.as_deref().map(|s| lenient_u32("limit", s)),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn split_list(value: Option<&str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in value.unwrap_or_default().split(',') {
        let item = item.trim();
        if !item.is_empty() && !out.iter().any(|seen| seen.eq_ignore_ascii_case(item)) {
            out.push(item.to_string());
        }
    }
    out
}

fn strict_f64(value: Option<&str>) -> Option<f64> {
    value
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

fn lenient_f64(field: &str, value: Option<&str>) -> f64 {
    match value {
        None => 0.0,
        Some(s) => strict_f64(Some(s)).unwrap_or_else(|| {
            debug!(field, value = s, "malformed coordinate, using 0");
            0.0
        }),
    }
}

fn lenient_u32(field: &str, value: &str) -> u32 {
    match value.trim().parse::<u32>() {
        Ok(v) => v,
        Err(_) => {
            debug!(field, value, "malformed number, using 1");
            1
        }
    }
}
