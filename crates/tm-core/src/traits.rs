//! # Core Traits (Ports)
//!
//! Any plugin must implement these traits to be used by the binary.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::filter::VenueFilter;
use crate::models::{Bookmark, Category, GeoPoint, MembershipTier, Review, SerialNumber, User, Venue};

/// One page of a distance-ordered listing computed by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NearestPage {
    /// Venues with their distance in km, nearest first, ties by id
    pub venues: Vec<(Venue, f64)>,
    /// Matching venues across all pages
    pub total: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookmarkOutcome {
    Created,
    AlreadyExists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedeemOutcome {
    Redeemed(MembershipTier),
    NotFound,
    AlreadyUsed,
    Expired,
}

/// Venue lookups and the grouped counts the search engine aggregates.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait VenueRepo: Send + Sync {
    async fn find_category(&self, key: &str) -> anyhow::Result<Option<Category>>;
    async fn insert_category(&self, category: Category) -> anyhow::Result<()>;

    async fn insert_venue(&self, venue: Venue) -> anyhow::Result<()>;
    async fn get_venue(&self, id: Uuid) -> anyhow::Result<Option<Venue>>;

    /// Every venue matching the filter, unordered.
    async fn find_venues(&self, filter: &VenueFilter) -> anyhow::Result<Vec<Venue>>;

    /// Distance-ordered page, optionally narrowed by a name/description needle.
    async fn find_nearest(
        &self,
        origin: GeoPoint,
        text: Option<String>,
        offset: u64,
        limit: u64,
    ) -> anyhow::Result<NearestPage>;

    /// One grouped lookup; venues without bookmarks may be absent from the map.
    async fn count_bookmarks(&self, venue_ids: &[Uuid]) -> anyhow::Result<HashMap<Uuid, u64>>;
    /// One grouped lookup; venues without reviews may be absent from the map.
    async fn count_reviews(&self, venue_ids: &[Uuid]) -> anyhow::Result<HashMap<Uuid, u64>>;
}

/// Review persistence. Every write recomputes the parent venue's rating in
/// the same atomic unit.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ReviewRepo: Send + Sync {
    async fn create_review(&self, review: Review) -> anyhow::Result<()>;
    async fn get_review(&self, id: Uuid) -> anyhow::Result<Option<Review>>;
    async fn update_review(&self, review: Review) -> anyhow::Result<()>;
    /// Returns false when no such review existed.
    async fn delete_review(&self, id: Uuid) -> anyhow::Result<bool>;
    /// Newest first.
    async fn list_reviews(&self, venue_id: Uuid) -> anyhow::Result<Vec<Review>>;
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait BookmarkRepo: Send + Sync {
    /// Idempotent on (user, venue).
    async fn add_bookmark(
        &self,
        user_id: Uuid,
        venue_id: Uuid,
        at: DateTime<Utc>,
    ) -> anyhow::Result<BookmarkOutcome>;
    async fn remove_bookmark(&self, user_id: Uuid, venue_id: Uuid) -> anyhow::Result<bool>;
    async fn is_bookmarked(&self, user_id: Uuid, venue_id: Uuid) -> anyhow::Result<bool>;
    /// Newest first.
    async fn list_bookmarks(&self, user_id: Uuid) -> anyhow::Result<Vec<Bookmark>>;
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MembershipRepo: Send + Sync {
    /// Fails as a whole if any code already exists.
    async fn insert_serials(&self, serials: Vec<SerialNumber>) -> anyhow::Result<()>;
    async fn get_serial(&self, code: &str) -> anyhow::Result<Option<SerialNumber>>;

    /// Marks the code used, binds it to the user and upgrades the user's tier
    /// as one atomic unit. Concurrent calls for one code yield exactly one
    /// `Redeemed`.
    async fn redeem_serial(
        &self,
        code: &str,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> anyhow::Result<RedeemOutcome>;
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn insert_user(&self, user: User) -> anyhow::Result<()>;
    async fn get_user(&self, id: Uuid) -> anyhow::Result<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
}

/// Identity contract. The core trusts the user id once a session verifies.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Produces a PHC-format hash for storage.
    fn hash_password(&self, password: &str) -> anyhow::Result<String>;

    /// Verifies a password against a stored hash.
    async fn verify_password(&self, password: &str, hash: &str) -> bool;

    /// Issues a signed, expiring session token for the user.
    fn issue_session(&self, user_id: Uuid, now: DateTime<Utc>) -> anyhow::Result<String>;

    /// Returns the user id if the token is authentic and unexpired.
    fn verify_session(&self, token: &str, now: DateTime<Utc>) -> Option<Uuid>;
}
