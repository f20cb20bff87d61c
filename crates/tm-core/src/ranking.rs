//! # Ranker
//!
//! Comparators over a filtered, aggregated candidate set.
//!
//! Every comparator ends with the same tie-break: distance to the caller
//! ascending, then venue id ascending. That makes each ordering total, so a
//! fixed query always ranks identically and adjacent pages never overlap.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::geo::haversine_km;
use crate::models::{GeoPoint, Venue};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// Nearest first
    #[default]
    Distance,
    /// Highest rating first
    Rating,
    /// Most bookmarked first
    Bookmark,
    /// Most reviewed first
    Review,
    /// Newest first
    Recent,
    /// Most requested tags matched first
    TagCount,
}

impl SortKey {
    /// Unknown or missing values fall back to `Distance`.
    pub fn parse_lenient(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("rating") => Self::Rating,
            Some("bookmark") | Some("bookmarks") => Self::Bookmark,
            Some("review") | Some("reviews") => Self::Review,
            Some("recent") | Some("latest") => Self::Recent,
            Some("tag_count") | Some("tagcount") => Self::TagCount,
            _ => Self::Distance,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Distance => "distance",
            Self::Rating => "rating",
            Self::Bookmark => "bookmark",
            Self::Review => "review",
            Self::Recent => "recent",
            Self::TagCount => "tag_count",
        }
    }
}

/// A venue with the per-request metrics the comparators read.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedVenue {
    #[serde(flatten)]
    pub venue: Venue,
    pub distance_km: f64,
    pub bookmark_count: u64,
    pub review_count: u64,
    pub tag_matches: usize,
}

impl RankedVenue {
    pub fn new(venue: Venue, origin: GeoPoint, requested_tags: &[String]) -> Self {
        let distance_km = haversine_km(origin, venue.location());
        Self::with_distance(venue, distance_km, requested_tags)
    }

    /// For rows whose distance the store already computed.
    pub fn with_distance(venue: Venue, distance_km: f64, requested_tags: &[String]) -> Self {
        let tag_matches = requested_tags.iter().filter(|t| venue.has_tag(t)).count();
        Self {
            venue,
            distance_km,
            bookmark_count: 0,
            review_count: 0,
            tag_matches,
        }
    }

    fn rating(&self) -> f64 {
        let r = self.venue.rating;
        if r.is_finite() {
            r
        } else {
            0.0
        }
    }
}

pub fn compare(key: SortKey, a: &RankedVenue, b: &RankedVenue) -> Ordering {
    let primary = match key {
        SortKey::Distance => Ordering::Equal,
        SortKey::Rating => b.rating().total_cmp(&a.rating()),
        SortKey::Bookmark => b.bookmark_count.cmp(&a.bookmark_count),
        SortKey::Review => b.review_count.cmp(&a.review_count),
        SortKey::Recent => b.venue.created_at.cmp(&a.venue.created_at),
        SortKey::TagCount => b.tag_matches.cmp(&a.tag_matches),
    };
    primary
        .then_with(|| a.distance_km.total_cmp(&b.distance_km))
        .then_with(|| a.venue.id.cmp(&b.venue.id))
}

/// Sorts the full candidate set in place. Never call this on a single page.
pub fn rank(items: &mut [RankedVenue], key: SortKey) {
    items.sort_by(|a, b| compare(key, a, b));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Region;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn venue_at(lat: f64, lng: f64, rating: f64) -> Venue {
        Venue {
            id: Uuid::now_v7(),
            name: "v".into(),
            address: String::new(),
            description: String::new(),
            category_id: Uuid::nil(),
            sub_category: None,
            latitude: lat,
            longitude: lng,
            rating,
            region: Region::default(),
            tags: vec![],
            special_offers: vec![],
            images: vec![],
            created_at: Utc::now(),
        }
    }

    fn ranked(venues: Vec<Venue>) -> Vec<RankedVenue> {
        venues
            .into_iter()
            .map(|v| RankedVenue::new(v, GeoPoint::new(37.5, 127.0), &[]))
            .collect()
    }

    #[test]
    fn unknown_sort_falls_back_to_distance() {
        assert_eq!(SortKey::parse_lenient(None), SortKey::Distance);
        assert_eq!(SortKey::parse_lenient(Some("popularity")), SortKey::Distance);
        assert_eq!(SortKey::parse_lenient(Some(" Rating ")), SortKey::Rating);
        assert_eq!(SortKey::parse_lenient(Some("tag_count")), SortKey::TagCount);
    }

    #[test]
    fn distance_is_non_decreasing() {
        let mut items = ranked(vec![
            venue_at(35.1, 129.0, 1.0),
            venue_at(37.5, 127.0, 1.0),
            venue_at(37.6, 127.1, 1.0),
        ]);
        rank(&mut items, SortKey::Distance);
        assert!(items.windows(2).all(|w| w[0].distance_km <= w[1].distance_km));
        assert_eq!(items[0].distance_km, 0.0);
    }

    #[test]
    fn rating_is_non_increasing_with_nan_as_zero() {
        let mut items = ranked(vec![
            venue_at(37.5, 127.0, 3.0),
            venue_at(37.5, 127.0, f64::NAN),
            venue_at(37.5, 127.0, 4.5),
            venue_at(37.5, 127.0, 0.5),
        ]);
        rank(&mut items, SortKey::Rating);
        let ratings: Vec<f64> = items.iter().map(RankedVenue::rating).collect();
        assert_eq!(ratings, vec![4.5, 3.0, 0.5, 0.0]);
    }

    #[test]
    fn counts_sort_descending() {
        let mut items = ranked(vec![
            venue_at(37.5, 127.0, 0.0),
            venue_at(37.5, 127.0, 0.0),
            venue_at(37.5, 127.0, 0.0),
        ]);
        for (i, item) in items.iter_mut().enumerate() {
            item.bookmark_count = i as u64;
            item.review_count = 10 - i as u64;
        }
        rank(&mut items, SortKey::Bookmark);
        assert!(items.windows(2).all(|w| w[0].bookmark_count >= w[1].bookmark_count));
        rank(&mut items, SortKey::Review);
        assert!(items.windows(2).all(|w| w[0].review_count >= w[1].review_count));
    }

    #[test]
    fn recent_puts_newest_first() {
        let mut old = venue_at(37.5, 127.0, 0.0);
        old.created_at = Utc::now() - Duration::days(30);
        let new = venue_at(37.5, 127.0, 0.0);
        let new_id = new.id;
        let mut items = ranked(vec![old, new]);
        rank(&mut items, SortKey::Recent);
        assert_eq!(items[0].venue.id, new_id);
    }

    #[test]
    fn tag_count_counts_requested_tags() {
        let mut a = venue_at(37.5, 127.0, 0.0);
        a.tags = vec!["Vegan".into()];
        let mut b = venue_at(37.5, 127.0, 0.0);
        b.tags = vec!["vegan".into(), "quiet".into()];
        let b_id = b.id;
        let wanted = vec!["vegan".to_string(), "QUIET".to_string()];
        let origin = GeoPoint::new(37.5, 127.0);
        let mut items = vec![RankedVenue::new(a, origin, &wanted), RankedVenue::new(b, origin, &wanted)];
        rank(&mut items, SortKey::TagCount);
        assert_eq!(items[0].venue.id, b_id);
        assert_eq!(items[0].tag_matches, 2);
        assert_eq!(items[1].tag_matches, 1);
    }

    #[test]
    fn ties_break_by_distance_then_id() {
        let mut items = ranked(vec![
            venue_at(37.6, 127.0, 4.0),
            venue_at(37.5, 127.0, 4.0),
            venue_at(37.5, 127.0, 4.0),
        ]);
        rank(&mut items, SortKey::Rating);
        assert_eq!(items[2].venue.latitude, 37.6);
        assert!(items[0].venue.id < items[1].venue.id);
    }
}
