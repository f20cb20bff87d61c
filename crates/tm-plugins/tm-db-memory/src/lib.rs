//! # tm-db-memory
//!
//! In-process implementation of every `tm-core` persistence port.
//! One `RwLock` guards the whole state, so each write (review plus rating
//! recomputation, serial redemption plus tier upgrade) is applied atomically.
//! Data lives only as long as the process.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use tm_core::filter::VenueFilter;
use tm_core::geo::haversine_km;
use tm_core::models::{
    average_rating, Bookmark, Category, GeoPoint, Review, SerialNumber, SerialState, User, Venue,
};
use tm_core::traits::{
    BookmarkOutcome, BookmarkRepo, MembershipRepo, NearestPage, RedeemOutcome, ReviewRepo, UserRepo,
    VenueRepo,
};

#[derive(Default)]
struct State {
    categories: HashMap<Uuid, Category>,
    venues: HashMap<Uuid, Venue>,
    reviews: HashMap<Uuid, Review>,
    bookmarks: HashMap<(Uuid, Uuid), Bookmark>,
    serials: HashMap<String, SerialNumber>,
    users: HashMap<Uuid, User>,
}

impl State {
    fn recompute_rating(&mut self, venue_id: Uuid) {
        let ratings: Vec<u8> = self
            .reviews
            .values()
            .filter(|r| r.venue_id == venue_id)
            .map(|r| r.rating)
            .collect();
        if let Some(venue) = self.venues.get_mut(&venue_id) {
            venue.rating = average_rating(&ratings);
            debug!(%venue_id, rating = venue.rating, reviews = ratings.len(), "venue rating recomputed");
        }
    }

    fn count_by_venue<'a>(venue_ids: impl Iterator<Item = &'a Uuid>, wanted: &[Uuid]) -> HashMap<Uuid, u64> {
        let wanted: HashSet<&Uuid> = wanted.iter().collect();
        let mut counts = HashMap::with_capacity(wanted.len());
        for id in venue_ids.filter(|id| wanted.contains(id)) {
            *counts.entry(*id).or_insert(0) += 1;
        }
        counts
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VenueRepo for MemoryStore {
    async fn find_category(&self, key: &str) -> anyhow::Result<Option<Category>> {
        let state = self.state.read().await;
        Ok(state
            .categories
            .values()
            .find(|c| c.key.eq_ignore_ascii_case(key))
            .cloned())
    }

    async fn insert_category(&self, category: Category) -> anyhow::Result<()> {
        let mut state = self.state.write().await;
        if state.categories.values().any(|c| c.key == category.key) {
            anyhow::bail!("category key `{}` already exists", category.key);
        }
        state.categories.insert(category.id, category);
        Ok(())
    }

    async fn insert_venue(&self, venue: Venue) -> anyhow::Result<()> {
        let mut state = self.state.write().await;
        if state.venues.contains_key(&venue.id) {
            anyhow::bail!("venue {} already exists", venue.id);
        }
        state.venues.insert(venue.id, venue);
        Ok(())
    }

    async fn get_venue(&self, id: Uuid) -> anyhow::Result<Option<Venue>> {
        Ok(self.state.read().await.venues.get(&id).cloned())
    }

    async fn find_venues(&self, filter: &VenueFilter) -> anyhow::Result<Vec<Venue>> {
        let state = self.state.read().await;
        Ok(state
            .venues
            .values()
            .filter(|v| filter.matches(v))
            .cloned()
            .collect())
    }

    async fn find_nearest(
        &self,
        origin: GeoPoint,
        text: Option<String>,
        offset: u64,
        limit: u64,
    ) -> anyhow::Result<NearestPage> {
        let needle = text.map(|t| t.to_lowercase());
        let state = self.state.read().await;

        let mut hits: Vec<(Venue, f64)> = state
            .venues
            .values()
            .filter(|v| {
                needle.as_deref().map_or(true, |n| {
                    v.name.to_lowercase().contains(n) || v.description.to_lowercase().contains(n)
                })
            })
            .map(|v| (v.clone(), haversine_km(origin, v.location())))
            .collect();
        hits.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.id.cmp(&b.0.id)));

        let total = hits.len() as u64;
        let venues = hits
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .collect();
        Ok(NearestPage { venues, total })
    }

    async fn count_bookmarks(&self, venue_ids: &[Uuid]) -> anyhow::Result<HashMap<Uuid, u64>> {
        let state = self.state.read().await;
        Ok(State::count_by_venue(state.bookmarks.keys().map(|(_, venue)| venue), venue_ids))
    }

    async fn count_reviews(&self, venue_ids: &[Uuid]) -> anyhow::Result<HashMap<Uuid, u64>> {
        let state = self.state.read().await;
        Ok(State::count_by_venue(state.reviews.values().map(|r| &r.venue_id), venue_ids))
    }
}

#[async_trait]
impl ReviewRepo for MemoryStore {
    async fn create_review(&self, review: Review) -> anyhow::Result<()> {
        let mut state = self.state.write().await;
        if !state.venues.contains_key(&review.venue_id) {
            anyhow::bail!("venue {} does not exist", review.venue_id);
        }
        let venue_id = review.venue_id;
        state.reviews.insert(review.id, review);
        state.recompute_rating(venue_id);
        Ok(())
    }

    async fn get_review(&self, id: Uuid) -> anyhow::Result<Option<Review>> {
        Ok(self.state.read().await.reviews.get(&id).cloned())
    }

    async fn update_review(&self, review: Review) -> anyhow::Result<()> {
        let mut state = self.state.write().await;
        if !state.reviews.contains_key(&review.id) {
            anyhow::bail!("review {} does not exist", review.id);
        }
        let venue_id = review.venue_id;
        state.reviews.insert(review.id, review);
        state.recompute_rating(venue_id);
        Ok(())
    }

    async fn delete_review(&self, id: Uuid) -> anyhow::Result<bool> {
        let mut state = self.state.write().await;
        match state.reviews.remove(&id) {
            Some(review) => {
                state.recompute_rating(review.venue_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_reviews(&self, venue_id: Uuid) -> anyhow::Result<Vec<Review>> {
        let state = self.state.read().await;
        let mut reviews: Vec<Review> = state
            .reviews
            .values()
            .filter(|r| r.venue_id == venue_id)
            .cloned()
            .collect();
        reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(reviews)
    }
}

#[async_trait]
impl BookmarkRepo for MemoryStore {
    async fn add_bookmark(
        &self,
        user_id: Uuid,
        venue_id: Uuid,
        at: DateTime<Utc>,
    ) -> anyhow::Result<BookmarkOutcome> {
        let mut state = self.state.write().await;
        if !state.venues.contains_key(&venue_id) {
            anyhow::bail!("venue {venue_id} does not exist");
        }
        if state.bookmarks.contains_key(&(user_id, venue_id)) {
            return Ok(BookmarkOutcome::AlreadyExists);
        }
        state.bookmarks.insert(
            (user_id, venue_id),
            Bookmark {
                user_id,
                venue_id,
                created_at: at,
            },
        );
        Ok(BookmarkOutcome::Created)
    }

    async fn remove_bookmark(&self, user_id: Uuid, venue_id: Uuid) -> anyhow::Result<bool> {
        Ok(self
            .state
            .write()
            .await
            .bookmarks
            .remove(&(user_id, venue_id))
            .is_some())
    }

    async fn is_bookmarked(&self, user_id: Uuid, venue_id: Uuid) -> anyhow::Result<bool> {
        Ok(self
            .state
            .read()
            .await
            .bookmarks
            .contains_key(&(user_id, venue_id)))
    }

    async fn list_bookmarks(&self, user_id: Uuid) -> anyhow::Result<Vec<Bookmark>> {
        let state = self.state.read().await;
        let mut bookmarks: Vec<Bookmark> = state
            .bookmarks
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        bookmarks.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.venue_id.cmp(&b.venue_id)));
        Ok(bookmarks)
    }
}

#[async_trait]
impl MembershipRepo for MemoryStore {
    async fn insert_serials(&self, serials: Vec<SerialNumber>) -> anyhow::Result<()> {
        let mut state = self.state.write().await;
        if let Some(dup) = serials.iter().find(|s| state.serials.contains_key(&s.code)) {
            anyhow::bail!("serial {} already exists", dup.code);
        }
        for serial in serials {
            state.serials.insert(serial.code.clone(), serial);
        }
        Ok(())
    }

    async fn get_serial(&self, code: &str) -> anyhow::Result<Option<SerialNumber>> {
        Ok(self.state.read().await.serials.get(code).cloned())
    }

    async fn redeem_serial(
        &self,
        code: &str,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> anyhow::Result<RedeemOutcome> {
        let mut guard = self.state.write().await;
        let State { serials, users, .. } = &mut *guard;

        let Some(serial) = serials.get_mut(code) else {
            return Ok(RedeemOutcome::NotFound);
        };
        if serial.state == SerialState::Used {
            return Ok(RedeemOutcome::AlreadyUsed);
        }
        if serial.is_expired(now) {
            return Ok(RedeemOutcome::Expired);
        }
        let Some(user) = users.get_mut(&user_id) else {
            anyhow::bail!("user {user_id} does not exist");
        };

        serial.state = SerialState::Used;
        serial.redeemed_by = Some(user_id);
        serial.redeemed_at = Some(now);
        user.membership = serial.tier;
        Ok(RedeemOutcome::Redeemed(serial.tier))
    }
}

#[async_trait]
impl UserRepo for MemoryStore {
    async fn insert_user(&self, user: User) -> anyhow::Result<()> {
        let mut state = self.state.write().await;
        if state.users.values().any(|u| u.email == user.email) {
            anyhow::bail!("email {} already registered", user.email);
        }
        state.users.insert(user.id, user);
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }
}
