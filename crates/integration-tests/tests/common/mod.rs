//! Shared fixtures: an in-memory store wired through the real services.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tm_api::AppState;
use tm_auth_simple::SimpleAuthProvider;
use tm_core::{
    AuthProvider, Category, GeoPoint, MembershipTier, Region, SpecialOffer, User, UserRepo, Venue,
    VenueRepo,
};
use tm_db_memory::MemoryStore;
use tm_services::SearchSettings;
use uuid::Uuid;

/// Seoul City Hall.
pub const ORIGIN: GeoPoint = GeoPoint::new(37.5665, 126.9780);

pub const PASSWORD: &str = "correct horse battery";

pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub auth: Arc<SimpleAuthProvider>,
    pub state: AppState,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_search(SearchSettings::default())
    }

    pub fn with_search(search: SearchSettings) -> Self {
        let store = Arc::new(MemoryStore::new());
        let auth = Arc::new(
            SimpleAuthProvider::new(b"integration-secret", Duration::hours(1)).expect("auth provider"),
        );
        let state = AppState::new(store.clone(), auth.clone(), search);
        Self { store, auth, state }
    }

    pub async fn category(&self, key: &str) -> Category {
        let category = Category {
            id: Uuid::now_v7(),
            key: key.into(),
            name: key.to_uppercase(),
            sub_categories: vec!["korean".into(), "italian".into()],
        };
        self.store.insert_category(category.clone()).await.unwrap();
        category
    }

    pub async fn insert(&self, venue: Venue) -> Venue {
        self.store.insert_venue(venue.clone()).await.unwrap();
        venue
    }

    /// Creates a user with `PASSWORD` and returns it with a live session token.
    pub async fn user(&self, email: &str) -> (User, String) {
        let user = User {
            id: Uuid::now_v7(),
            email: email.into(),
            password_hash: self.auth.hash_password(PASSWORD).unwrap(),
            name: "Tester".into(),
            country: Some("KR".into()),
            gender: None,
            birth_year: Some(1990),
            birth_month: Some(5),
            birth_day: Some(17),
            avatar_url: None,
            membership: MembershipTier::Free,
            created_at: Utc::now(),
        };
        self.store.insert_user(user.clone()).await.unwrap();
        let token = self.auth.issue_session(user.id, Utc::now()).unwrap();
        (user, token)
    }
}

/// A venue `step` hundred metres north of `ORIGIN`, roughly.
pub fn venue(name: &str, category: &Category, step: u32) -> Venue {
    venue_at(name, category, ORIGIN.latitude + f64::from(step) * 0.001, ORIGIN.longitude)
}

pub fn venue_at(name: &str, category: &Category, latitude: f64, longitude: f64) -> Venue {
    Venue {
        id: Uuid::now_v7(),
        name: name.into(),
        address: "Sejong-daero 110".into(),
        description: format!("{name} serves the neighbourhood"),
        category_id: category.id,
        sub_category: Some("korean".into()),
        latitude,
        longitude,
        rating: 0.0,
        region: Region {
            region1: Some("Seoul".into()),
            region2: Some("Jung-gu".into()),
            region3: Some("Taepyeongno".into()),
            region4: None,
        },
        tags: Vec::new(),
        special_offers: Vec::<SpecialOffer>::new(),
        images: Vec::new(),
        created_at: Utc::now(),
    }
}

pub fn days_ago(days: i64) -> DateTime<Utc> {
    Utc::now() - Duration::days(days)
}
