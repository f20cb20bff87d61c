//! Review creation, editing and removal.
//!
//! Rating recomputation itself happens inside the `ReviewRepo` write so that
//! a review and its venue's average never disagree.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use tm_core::{AppError, Result, Review, ReviewRepo, VenueRepo};

pub const MAX_REVIEW_IMAGES: usize = 5;
pub const MAX_REVIEW_CHARS: usize = 2000;

/// Body of a create or update request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewInput {
    /// Kept wide so out-of-range values get a field error instead of a decode failure
    pub rating: i64,
    pub content: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Validated form of `ReviewInput`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewDraft {
    pub rating: u8,
    pub content: String,
    pub images: Vec<String>,
    pub tags: Vec<String>,
}

impl ReviewInput {
    pub fn validate(self) -> Result<ReviewDraft> {
        let rating = u8::try_from(self.rating)
            .ok()
            .filter(|r| (1..=5).contains(r))
            .ok_or_else(|| AppError::validation("rating", "must be an integer from 1 to 5"))?;

        let content = self.content.trim().to_string();
        if content.is_empty() {
            return Err(AppError::validation("content", "must not be empty"));
        }
        if content.chars().count() > MAX_REVIEW_CHARS {
            return Err(AppError::validation(
                "content",
                format!("must be at most {MAX_REVIEW_CHARS} characters"),
            ));
        }

        if self.images.len() > MAX_REVIEW_IMAGES {
            return Err(AppError::validation(
                "images",
                format!("at most {MAX_REVIEW_IMAGES} images per review"),
            ));
        }
        if let Some(bad) = self
            .images
            .iter()
            .find(|url| !(url.starts_with("https://") || url.starts_with("http://")))
        {
            return Err(AppError::validation("images", format!("`{bad}` is not an http(s) URL")));
        }

        let mut tags: Vec<String> = Vec::new();
        for tag in self.tags.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
            if !tags.iter().any(|seen| seen.eq_ignore_ascii_case(tag)) {
                tags.push(tag.to_string());
            }
        }

        Ok(ReviewDraft {
            rating,
            content,
            images: self.images,
            tags,
        })
    }
}

pub struct ReviewService {
    venues: Arc<dyn VenueRepo>,
    reviews: Arc<dyn ReviewRepo>,
}

impl ReviewService {
    pub fn new(venues: Arc<dyn VenueRepo>, reviews: Arc<dyn ReviewRepo>) -> Self {
        Self { venues, reviews }
    }

    pub async fn create(
        &self,
        user_id: Uuid,
        venue_id: Uuid,
        input: ReviewInput,
        now: DateTime<Utc>,
    ) -> Result<Review> {
        let draft = input.validate()?;
        if self.venues.get_venue(venue_id).await?.is_none() {
            return Err(AppError::not_found("Venue", venue_id));
        }

        let review = Review {
            id: Uuid::now_v7(),
            venue_id,
            user_id,
            rating: draft.rating,
            content: draft.content,
            images: draft.images,
            tags: draft.tags,
            created_at: now,
            updated_at: now,
        };
        self.reviews.create_review(review.clone()).await?;
        info!(review_id = %review.id, %venue_id, rating = review.rating, "review created");
        Ok(review)
    }

    pub async fn update(
        &self,
        user_id: Uuid,
        review_id: Uuid,
        input: ReviewInput,
        now: DateTime<Utc>,
    ) -> Result<Review> {
        let existing = self.owned_review(user_id, review_id).await?;
        let draft = input.validate()?;

        let review = Review {
            rating: draft.rating,
            content: draft.content,
            images: draft.images,
            tags: draft.tags,
            updated_at: now,
            ..existing
        };
        self.reviews.update_review(review.clone()).await?;
        info!(%review_id, rating = review.rating, "review updated");
        Ok(review)
    }

    pub async fn delete(&self, user_id: Uuid, review_id: Uuid) -> Result<()> {
        let review = self.owned_review(user_id, review_id).await?;
        if !self.reviews.delete_review(review.id).await? {
            // Lost a race with another delete of the same review.
            return Err(AppError::Forbidden("review is not accessible".into()));
        }
        info!(%review_id, venue_id = %review.venue_id, "review deleted");
        Ok(())
    }

    pub async fn list(&self, venue_id: Uuid) -> Result<Vec<Review>> {
        if self.venues.get_venue(venue_id).await?.is_none() {
            return Err(AppError::not_found("Venue", venue_id));
        }
        Ok(self.reviews.list_reviews(venue_id).await?)
    }

    /// Missing and foreign reviews produce the same error, so review ids
    /// cannot be discovered through this path.
    async fn owned_review(&self, user_id: Uuid, review_id: Uuid) -> Result<Review> {
        match self.reviews.get_review(review_id).await? {
            Some(review) if review.user_id == user_id => Ok(review),
            _ => Err(AppError::Forbidden("review is not accessible".into())),
        }
    }
}
