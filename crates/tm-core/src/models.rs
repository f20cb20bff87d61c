//! # Domain Models
//!
//! These structs represent the core entities of Tastemap.
//! We use UUID v7 for time-ordered, globally unique identification.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// A coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Latitude in [-90, 90] and longitude in [-180, 180].
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Promotions a venue may advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpecialOffer {
    #[serde(rename = "Discount")]
    Discount,
    #[serde(rename = "Special Gift")]
    SpecialGift,
}

impl SpecialOffer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discount => "Discount",
            Self::SpecialGift => "Special Gift",
        }
    }
}

impl fmt::Display for SpecialOffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpecialOffer {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "discount" => Ok(Self::Discount),
            "specialgift" => Ok(Self::SpecialGift),
            _ => Err(AppError::validation("specialOfferType", format!("unknown offer `{s}`"))),
        }
    }
}

/// Administrative area names, coarse to fine (province, city, district, neighbourhood).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub region1: Option<String>,
    pub region2: Option<String>,
    pub region3: Option<String>,
    pub region4: Option<String>,
}

impl Region {
    pub fn names(&self) -> impl Iterator<Item = &str> {
        [&self.region1, &self.region2, &self.region3, &self.region4]
            .into_iter()
            .filter_map(|r| r.as_deref())
    }
}

/// A top-level venue category (e.g. "food", "cafe") and the subcategory keys filed under it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: Uuid,
    /// Stable key used in query strings
    pub key: String,
    pub name: String,
    pub sub_categories: Vec<String>,
}

/// A restaurant, shop or other place with a location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Venue {
    pub id: Uuid,
    pub name: String,
    pub address: String,
    pub description: String,
    pub category_id: Uuid,
    pub sub_category: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    /// Mean of all review ratings, 0.0 when the venue has no reviews
    pub rating: f64,
    #[serde(flatten)]
    pub region: Region,
    pub tags: Vec<String>,
    pub special_offers: Vec<SpecialOffer>,
    /// URLs handed out by the media collaborator
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Venue {
    pub fn location(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }

    /// Checks the coordinate and rating ranges before a venue is stored.
    pub fn validate(&self) -> crate::Result<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::validation("name", "must not be empty"));
        }
        if !self.location().is_valid() {
            return Err(AppError::validation(
                "location",
                format!("({}, {}) is outside the valid range", self.latitude, self.longitude),
            ));
        }
        if !(0.0..=5.0).contains(&self.rating) {
            return Err(AppError::validation("rating", "must be between 0 and 5"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: Uuid,
    pub venue_id: Uuid,
    pub user_id: Uuid,
    /// 1 to 5 stars
    pub rating: u8,
    pub content: String,
    pub images: Vec<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    pub user_id: Uuid,
    pub venue_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipTier {
    #[default]
    Free,
    Standard,
    Premium,
}

impl MembershipTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Standard => "standard",
            Self::Premium => "premium",
        }
    }
}

impl fmt::Display for MembershipTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MembershipTier {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "standard" => Ok(Self::Standard),
            "premium" => Ok(Self::Premium),
            other => Err(AppError::validation("membership", format!("unknown tier `{other}`"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerialState {
    Unused,
    Used,
}

/// A one-time membership code. Moves from `Unused` to `Used` exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerialNumber {
    pub code: String,
    pub tier: MembershipTier,
    pub expires_at: Option<DateTime<Utc>>,
    pub state: SerialState,
    pub redeemed_by: Option<Uuid>,
    pub redeemed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl SerialNumber {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    /// Argon2 PHC string, never sent to clients
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub name: String,
    pub country: Option<String>,
    pub gender: Option<String>,
    pub birth_year: Option<i32>,
    pub birth_month: Option<u32>,
    pub birth_day: Option<u32>,
    pub avatar_url: Option<String>,
    pub membership: MembershipTier,
    pub created_at: DateTime<Utc>,
}

/// Mean star rating of a venue's reviews; 0.0 when there are none.
pub fn average_rating(ratings: &[u8]) -> f64 {
    if ratings.is_empty() {
        return 0.0;
    }
    let sum: u32 = ratings.iter().map(|&r| u32::from(r)).sum();
    f64::from(sum) / ratings.len() as f64
}
