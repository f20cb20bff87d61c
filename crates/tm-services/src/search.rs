//! # Search Orchestrator
//!
//! Composes filter compilation, store lookup, aggregation, ranking and
//! pagination into one request/response cycle.
//!
//! Two paths share the ranking contract of `tm_core::ranking`:
//! - filtered listing: the whole filtered set is materialized, aggregated,
//!   ranked and then sliced;
//! - pure proximity listing (no structural predicate, `sort=distance`): the
//!   store returns one distance-ordered page directly.
//!
//! Both return identical `PageMeta`.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, instrument};
use uuid::Uuid;

use tm_core::filter::{TagFilterMode, VenueFilter};
use tm_core::pagination::{paginate, PageMeta, PageRequest, DEFAULT_PAGE_LIMIT};
use tm_core::params::SearchParams;
use tm_core::ranking::{rank, RankedVenue, SortKey};
use tm_core::{Result, VenueRepo};

/// Category key meaning "no category filter".
const ALL_CATEGORIES: &str = "all";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchSettings {
    pub default_limit: u32,
    pub max_limit: u32,
    pub tag_filter: TagFilterMode,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_PAGE_LIMIT,
            max_limit: 100,
            tag_filter: TagFilterMode::Advisory,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResponse {
    pub restaurants: Vec<RankedVenue>,
    pub metadata: PageMeta,
}

pub struct SearchService {
    venues: Arc<dyn VenueRepo>,
    settings: SearchSettings,
}

impl SearchService {
    pub fn new(venues: Arc<dyn VenueRepo>, settings: SearchSettings) -> Self {
        Self { venues, settings }
    }

    pub fn page_request(&self, params: &SearchParams) -> PageRequest {
        PageRequest::new(params.page, params.limit.unwrap_or(self.settings.default_limit))
            .with_max_limit(self.settings.max_limit)
    }

    #[instrument(skip_all, fields(sort = params.sort.as_str(), page = params.page))]
    pub async fn search(&self, params: &SearchParams) -> Result<SearchResponse> {
        let request = self.page_request(params);

        let category = match params.category.as_deref() {
            Some(key) if !key.eq_ignore_ascii_case(ALL_CATEGORIES) => {
                let found = self.venues.find_category(key).await?;
                if found.is_none() {
                    debug!(category = key, "unknown category, not filtering on it");
                }
                found
            }
            _ => None,
        };

        let filter = VenueFilter::compile(params, category.as_ref(), self.settings.tag_filter);

        if params.sort == SortKey::Distance && !filter.is_structural() {
            self.proximity_listing(params, &filter, request).await
        } else {
            self.filtered_listing(params, &filter, request).await
        }
    }

    async fn filtered_listing(
        &self,
        params: &SearchParams,
        filter: &VenueFilter,
        request: PageRequest,
    ) -> Result<SearchResponse> {
        let venues = self.venues.find_venues(filter).await?;
        debug!(candidates = venues.len(), "filtered listing");

        let mut ranked: Vec<RankedVenue> = venues
            .into_iter()
            .map(|v| RankedVenue::new(v, params.origin, &params.tags))
            .collect();
        self.aggregate(&mut ranked).await?;
        rank(&mut ranked, params.sort);

        let page = paginate(ranked, request);
        Ok(SearchResponse {
            restaurants: page.items,
            metadata: page.meta,
        })
    }

    async fn proximity_listing(
        &self,
        params: &SearchParams,
        filter: &VenueFilter,
        request: PageRequest,
    ) -> Result<SearchResponse> {
        let nearest = self
            .venues
            .find_nearest(
                params.origin,
                filter.text.clone(),
                request.skip(),
                u64::from(request.limit()),
            )
            .await?;
        debug!(total = nearest.total, "proximity listing");

        let mut ranked: Vec<RankedVenue> = nearest
            .venues
            .into_iter()
            .map(|(v, distance)| RankedVenue::with_distance(v, distance, &params.tags))
            .collect();
        self.aggregate(&mut ranked).await?;

        let metadata = PageMeta::new(request, nearest.total, ranked.len());
        Ok(SearchResponse {
            restaurants: ranked,
            metadata,
        })
    }

    /// Attaches bookmark and review counts with one grouped lookup per metric.
    pub async fn aggregate(&self, items: &mut [RankedVenue]) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        let ids: Vec<Uuid> = items.iter().map(|r| r.venue.id).collect();
        let bookmarks = self.venues.count_bookmarks(&ids).await?;
        let reviews = self.venues.count_reviews(&ids).await?;

        for item in items.iter_mut() {
            item.bookmark_count = bookmarks.get(&item.venue.id).copied().unwrap_or(0);
            item.review_count = reviews.get(&item.venue.id).copied().unwrap_or(0);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use chrono::Utc;
    use tm_core::models::{Category, GeoPoint, Region, Venue};
    use tm_core::{AppError, MockVenueRepo, NearestPage};

    fn venue(name: &str, category_id: Uuid, lat: f64) -> Venue {
        Venue {
            id: Uuid::now_v7(),
            name: name.into(),
            address: String::new(),
            description: String::new(),
            category_id,
            sub_category: None,
            latitude: lat,
            longitude: 127.0,
            rating: 0.0,
            region: Region::default(),
            tags: vec![],
            special_offers: vec![],
            images: vec![],
            created_at: Utc::now(),
        }
    }

    fn food() -> Category {
        Category {
            id: Uuid::now_v7(),
            key: "food".into(),
            name: "Food".into(),
            sub_categories: vec![],
        }
    }

    #[tokio::test]
    async fn filtered_listing_aggregates_then_ranks() {
        let food = food();
        let near = venue("near", food.id, 37.50);
        let far = venue("far", food.id, 37.60);
        let (near_id, far_id) = (near.id, far.id);

        let mut repo = MockVenueRepo::new();
        let category = food.clone();
        repo.expect_find_category()
            .withf(|key| key == "food")
            .times(1)
            .returning(move |_| Ok(Some(category.clone())));
        repo.expect_find_venues()
            .withf(move |f| f.category_id == Some(food.id))
            .times(1)
            .returning(move |_| Ok(vec![near.clone(), far.clone()]));
        repo.expect_count_bookmarks()
            .times(1)
            .returning(move |_| Ok(HashMap::from([(far_id, 3)])));
        repo.expect_count_reviews()
            .times(1)
            .returning(move |_| Ok(HashMap::from([(near_id, 1)])));
        repo.expect_find_nearest().never();

        let service = SearchService::new(Arc::new(repo), SearchSettings::default());
        let params = SearchParams {
            origin: GeoPoint::new(37.5, 127.0),
            category: Some("food".into()),
            sort: SortKey::Bookmark,
            ..Default::default()
        };
        let response = service.search(&params).await.unwrap();

        assert_eq!(response.restaurants[0].venue.id, far_id);
        assert_eq!(response.restaurants[0].bookmark_count, 3);
        assert_eq!(response.restaurants[0].review_count, 0);
        assert_eq!(response.restaurants[1].review_count, 1);
        assert_eq!(response.metadata.total_count, 2);
        assert!(!response.metadata.has_more);
    }

    #[tokio::test]
    async fn pure_proximity_uses_store_ordering() {
        let a = venue("a", Uuid::nil(), 37.5);
        let a_id = a.id;

        let mut repo = MockVenueRepo::new();
        repo.expect_find_category().never();
        repo.expect_find_venues().never();
        repo.expect_find_nearest()
            .withf(|_, text, offset, limit| text.as_deref() == Some("bbq") && *offset == 10 && *limit == 10)
            .times(1)
            .returning(move |_, _, _, _| Ok(NearestPage { venues: vec![(a.clone(), 1.25)], total: 11 }));
        repo.expect_count_bookmarks().returning(|_| Ok(HashMap::new()));
        repo.expect_count_reviews().returning(|_| Ok(HashMap::new()));

        let service = SearchService::new(Arc::new(repo), SearchSettings::default());
        let params = SearchParams {
            q: Some("BBQ".into()),
            page: 2,
            ..Default::default()
        };
        let response = service.search(&params).await.unwrap();

        assert_eq!(response.restaurants.len(), 1);
        assert_eq!(response.restaurants[0].venue.id, a_id);
        assert_eq!(response.restaurants[0].distance_km, 1.25);
        assert_eq!(response.metadata.current_page, 2);
        assert_eq!(response.metadata.total_pages, 2);
        assert!(!response.metadata.has_more);
    }

    #[tokio::test]
    async fn unknown_category_widens_to_proximity() {
        let mut repo = MockVenueRepo::new();
        repo.expect_find_category().returning(|_| Ok(None));
        repo.expect_find_nearest()
            .times(1)
            .returning(|_, _, _, _| Ok(NearestPage { venues: vec![], total: 0 }));

        let service = SearchService::new(Arc::new(repo), SearchSettings::default());
        let params = SearchParams {
            category: Some("spaceship".into()),
            ..Default::default()
        };
        let response = service.search(&params).await.unwrap();
        assert!(response.restaurants.is_empty());
        assert_eq!(response.metadata.total_pages, 0);
    }

    #[test]
    fn limit_is_clamped_by_settings() {
        let service = SearchService::new(
            Arc::new(MockVenueRepo::new()),
            SearchSettings { default_limit: 20, max_limit: 50, ..Default::default() },
        );
        let default = service.page_request(&SearchParams::default());
        assert_eq!(default.limit(), 20);
        let huge = service.page_request(&SearchParams { limit: Some(1000), ..Default::default() });
        assert_eq!(huge.limit(), 50);
        let zero = service.page_request(&SearchParams { limit: Some(0), ..Default::default() });
        assert_eq!(zero.limit(), 1);
    }

    #[tokio::test]
    async fn store_failure_returns_no_partial_results() {
        let mut repo = MockVenueRepo::new();
        repo.expect_find_venues()
            .returning(|_| Ok(vec![venue("x", Uuid::nil(), 37.5)]));
        repo.expect_count_bookmarks()
            .returning(|_| Err(anyhow::anyhow!("connection reset")));

        let service = SearchService::new(Arc::new(repo), SearchSettings::default());
        let params = SearchParams { sort: SortKey::Rating, ..Default::default() };
        let err = service.search(&params).await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }
}
