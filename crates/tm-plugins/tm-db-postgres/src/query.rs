//! SQL fragments shared by the venue queries.

use sqlx::{Postgres, QueryBuilder};
use tm_core::filter::{TagFilterMode, VenueFilter};

pub(crate) const VENUE_COLUMNS: &str = "id, name, address, description, category_id, sub_category, \
     latitude, longitude, rating, region1, region2, region3, region4, tags, special_offers, images, created_at";

/// Great-circle distance in km from the point bound at `$1`/`$2` to the row.
pub(crate) const DISTANCE_KM: &str = "(2 * 6371.0 * asin(least(1.0, sqrt(\
     power(sin(radians(latitude - $1) / 2), 2) \
     + cos(radians($1)) * cos(radians(latitude)) * power(sin(radians(longitude - $2) / 2), 2)))))";

/// Wraps a needle for a substring ILIKE, escaping LIKE metacharacters.
pub(crate) fn like_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

/// Appends `WHERE ...` for every predicate present in the filter.
pub(crate) fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &VenueFilter) {
    qb.push(" WHERE TRUE");

    if let Some(id) = filter.category_id {
        qb.push(" AND category_id = ").push_bind(id);
    }
    if let Some(sub) = &filter.sub_category {
        qb.push(" AND lower(sub_category) = ")
            .push_bind(sub.to_lowercase());
    }
    if let Some(region) = &filter.region {
        let pattern = like_pattern(region);
        qb.push(" AND (");
        for (i, column) in ["region1", "region2", "region3", "region4", "address"].iter().enumerate() {
            if i > 0 {
                qb.push(" OR ");
            }
            qb.push(*column).push(" ILIKE ").push_bind(pattern.clone());
        }
        qb.push(")");
    }
    if let Some(text) = &filter.text {
        let pattern = like_pattern(text);
        qb.push(" AND (name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR description ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(b) = filter.bounds {
        qb.push(" AND latitude BETWEEN ")
            .push_bind(b.sw_lat)
            .push(" AND ")
            .push_bind(b.ne_lat)
            .push(" AND longitude BETWEEN ")
            .push_bind(b.sw_lng)
            .push(" AND ")
            .push_bind(b.ne_lng);
    }
    if !filter.special_offers.is_empty() {
        let offers: Vec<String> = filter.special_offers.iter().map(|o| o.as_str().to_string()).collect();
        qb.push(" AND special_offers && ").push_bind(offers).push("::text[]");
    }
    if filter.narrows_by_tags() {
        let mut tags: Vec<String> = filter.tags.iter().map(|t| t.to_lowercase()).collect();
        tags.sort();
        tags.dedup();
        let wanted = tags.len() as i64;
        match filter.tag_mode {
            TagFilterMode::Any => {
                qb.push(" AND EXISTS (SELECT 1 FROM unnest(tags) t WHERE lower(t) = ANY(")
                    .push_bind(tags)
                    .push("))");
            }
            TagFilterMode::All => {
                qb.push(" AND (SELECT count(DISTINCT lower(t)) FROM unnest(tags) t WHERE lower(t) = ANY(")
                    .push_bind(tags)
                    .push(")) = ")
                    .push_bind(wanted);
            }
            TagFilterMode::Advisory => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tm_core::filter::MapBounds;
    use tm_core::SpecialOffer;
    use uuid::Uuid;

    fn sql_for(filter: &VenueFilter) -> String {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT id FROM venues");
        push_filter(&mut qb, filter);
        qb.sql().to_string()
    }

    #[test]
    fn empty_filter_has_no_predicates() {
        assert_eq!(sql_for(&VenueFilter::default()), "SELECT id FROM venues WHERE TRUE");
    }

    #[test]
    fn region_searches_every_level_and_the_address() {
        let sql = sql_for(&VenueFilter {
            region: Some("gangnam".into()),
            ..Default::default()
        });
        for column in ["region1", "region2", "region3", "region4", "address"] {
            assert!(sql.contains(&format!("{column} ILIKE $")), "{column} missing in {sql}");
        }
    }

    #[test]
    fn structural_predicates_are_anded() {
        let sql = sql_for(&VenueFilter {
            category_id: Some(Uuid::now_v7()),
            sub_category: Some("korean".into()),
            bounds: Some(MapBounds { ne_lat: 38.0, ne_lng: 128.0, sw_lat: 37.0, sw_lng: 126.0 }),
            special_offers: vec![SpecialOffer::SpecialGift],
            ..Default::default()
        });
        assert!(sql.contains("category_id = $1"));
        assert!(sql.contains("lower(sub_category) = $2"));
        assert!(sql.contains("latitude BETWEEN $3 AND $4"));
        assert!(sql.contains("longitude BETWEEN $5 AND $6"));
        assert!(sql.contains("special_offers && $7::text[]"));
    }

    #[test]
    fn advisory_tags_add_nothing() {
        let sql = sql_for(&VenueFilter {
            tags: vec!["spicy".into()],
            tag_mode: TagFilterMode::Advisory,
            ..Default::default()
        });
        assert!(!sql.contains("unnest"));
    }

    #[test]
    fn all_tags_compares_distinct_count() {
        let sql = sql_for(&VenueFilter {
            tags: vec!["spicy".into(), "cozy".into()],
            tag_mode: TagFilterMode::All,
            ..Default::default()
        });
        assert!(sql.contains("count(DISTINCT lower(t))"));
        assert!(sql.ends_with("= $2"));
    }

    #[test]
    fn like_metacharacters_are_escaped() {
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }
}
