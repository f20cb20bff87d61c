use std::sync::Arc;

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use tm_core::{AppError, BookmarkRepo, Category, Result, Venue, VenueRepo};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VenueDetail {
    #[serde(flatten)]
    pub venue: Venue,
    pub bookmark_count: u64,
    pub review_count: u64,
    /// Always false for anonymous viewers
    pub bookmarked: bool,
}

pub struct VenueService {
    venues: Arc<dyn VenueRepo>,
    bookmarks: Arc<dyn BookmarkRepo>,
}

impl VenueService {
    pub fn new(venues: Arc<dyn VenueRepo>, bookmarks: Arc<dyn BookmarkRepo>) -> Self {
        Self { venues, bookmarks }
    }

    pub async fn detail(&self, id: Uuid, viewer: Option<Uuid>) -> Result<VenueDetail> {
        let venue = self
            .venues
            .get_venue(id)
            .await?
            .ok_or_else(|| AppError::not_found("Venue", id))?;

        let bookmark_count = self.venues.count_bookmarks(&[id]).await?.get(&id).copied().unwrap_or(0);
        let review_count = self.venues.count_reviews(&[id]).await?.get(&id).copied().unwrap_or(0);
        let bookmarked = match viewer {
            Some(user_id) => self.bookmarks.is_bookmarked(user_id, id).await?,
            None => false,
        };

        Ok(VenueDetail {
            venue,
            bookmark_count,
            review_count,
            bookmarked,
        })
    }

    pub async fn create(&self, venue: Venue) -> Result<Venue> {
        venue.validate()?;
        self.venues.insert_venue(venue.clone()).await?;
        info!(venue_id = %venue.id, name = %venue.name, "venue created");
        Ok(venue)
    }

    pub async fn create_category(&self, category: Category) -> Result<Category> {
        let key = category.key.trim().to_lowercase();
        if key.is_empty() {
            return Err(AppError::validation("key", "must not be empty"));
        }
        if self.venues.find_category(&key).await?.is_some() {
            return Err(AppError::Conflict(format!("category `{key}` already exists")));
        }
        let category = Category { key, ..category };
        self.venues.insert_category(category.clone()).await?;
        Ok(category)
    }
}
