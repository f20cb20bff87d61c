use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use tm_core::{AppError, Bookmark, BookmarkOutcome, BookmarkRepo, Result, VenueRepo};

/// What the client sees after a bookmark toggle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkState {
    pub venue_id: Uuid,
    pub bookmarked: bool,
    pub bookmark_count: u64,
}

pub struct BookmarkService {
    venues: Arc<dyn VenueRepo>,
    bookmarks: Arc<dyn BookmarkRepo>,
}

impl BookmarkService {
    pub fn new(venues: Arc<dyn VenueRepo>, bookmarks: Arc<dyn BookmarkRepo>) -> Self {
        Self { venues, bookmarks }
    }

    /// Bookmarking twice returns the existing state rather than an error.
    pub async fn add(&self, user_id: Uuid, venue_id: Uuid, now: DateTime<Utc>) -> Result<BookmarkState> {
        self.ensure_venue(venue_id).await?;
        if self.bookmarks.add_bookmark(user_id, venue_id, now).await? == BookmarkOutcome::AlreadyExists {
            debug!(%user_id, %venue_id, "venue already bookmarked");
        }
        self.state(venue_id, true).await
    }

    pub async fn remove(&self, user_id: Uuid, venue_id: Uuid) -> Result<BookmarkState> {
        self.ensure_venue(venue_id).await?;
        self.bookmarks.remove_bookmark(user_id, venue_id).await?;
        self.state(venue_id, false).await
    }

    pub async fn list(&self, user_id: Uuid) -> Result<Vec<Bookmark>> {
        Ok(self.bookmarks.list_bookmarks(user_id).await?)
    }

    async fn ensure_venue(&self, venue_id: Uuid) -> Result<()> {
        match self.venues.get_venue(venue_id).await? {
            Some(_) => Ok(()),
            None => Err(AppError::not_found("Venue", venue_id)),
        }
    }

    async fn state(&self, venue_id: Uuid, bookmarked: bool) -> Result<BookmarkState> {
        let counts = self.venues.count_bookmarks(&[venue_id]).await?;
        Ok(BookmarkState {
            venue_id,
            bookmarked,
            bookmark_count: counts.get(&venue_id).copied().unwrap_or(0),
        })
    }
}
