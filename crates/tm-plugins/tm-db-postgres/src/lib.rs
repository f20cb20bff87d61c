//! # tm-db-postgres
//!
//! PostgreSQL implementation of the Tastemap repository ports. Rows are
//! mapped by hand onto the `tm-core` models; every multi-statement write
//! runs inside one transaction.

mod query;

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnection, PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tm_core::filter::VenueFilter;
use tm_core::{
    Bookmark, BookmarkOutcome, BookmarkRepo, Category, GeoPoint, MembershipRepo, MembershipTier,
    NearestPage, RedeemOutcome, Region, Review, ReviewRepo, SerialNumber, SerialState, SpecialOffer,
    User, UserRepo, Venue, VenueRepo,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::query::{like_pattern, push_filter, DISTANCE_KM, VENUE_COLUMNS};

/// Rows per multi-VALUES insert, well under the bind parameter ceiling.
const SERIAL_CHUNK: usize = 1000;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await
            .context("connecting to postgres")?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the embedded migrations.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("running migrations")?;
        Ok(())
    }
}

fn venue_from_row(row: &PgRow) -> anyhow::Result<Venue> {
    let special_offers = row
        .try_get::<Vec<String>, _>("special_offers")?
        .iter()
        .filter_map(|raw| match raw.parse::<SpecialOffer>() {
            Ok(offer) => Some(offer),
            Err(_) => {
                warn!(offer = %raw, "skipping unknown special offer");
                None
            }
        })
        .collect();

    Ok(Venue {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        address: row.try_get("address")?,
        description: row.try_get("description")?,
        category_id: row.try_get("category_id")?,
        sub_category: row.try_get("sub_category")?,
        latitude: row.try_get("latitude")?,
        longitude: row.try_get("longitude")?,
        rating: row.try_get("rating")?,
        region: Region {
            region1: row.try_get("region1")?,
            region2: row.try_get("region2")?,
            region3: row.try_get("region3")?,
            region4: row.try_get("region4")?,
        },
        tags: row.try_get("tags")?,
        special_offers,
        images: row.try_get("images")?,
        created_at: row.try_get("created_at")?,
    })
}

fn category_from_row(row: &PgRow) -> anyhow::Result<Category> {
    Ok(Category {
        id: row.try_get("id")?,
        key: row.try_get("key")?,
        name: row.try_get("name")?,
        sub_categories: row.try_get("sub_categories")?,
    })
}

fn review_from_row(row: &PgRow) -> anyhow::Result<Review> {
    let rating: i16 = row.try_get("rating")?;
    Ok(Review {
        id: row.try_get("id")?,
        venue_id: row.try_get("venue_id")?,
        user_id: row.try_get("user_id")?,
        rating: u8::try_from(rating).context("review rating out of range")?,
        content: row.try_get("content")?,
        images: row.try_get("images")?,
        tags: row.try_get("tags")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn serial_from_row(row: &PgRow) -> anyhow::Result<SerialNumber> {
    let state = match row.try_get::<String, _>("state")?.as_str() {
        "used" => SerialState::Used,
        _ => SerialState::Unused,
    };
    Ok(SerialNumber {
        code: row.try_get("code")?,
        tier: row.try_get::<String, _>("tier")?.parse()?,
        expires_at: row.try_get("expires_at")?,
        state,
        redeemed_by: row.try_get("redeemed_by")?,
        redeemed_at: row.try_get("redeemed_at")?,
        created_at: row.try_get("created_at")?,
    })
}

fn user_from_row(row: &PgRow) -> anyhow::Result<User> {
    let to_u32 = |v: Option<i32>| v.and_then(|n| u32::try_from(n).ok());
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        name: row.try_get("name")?,
        country: row.try_get("country")?,
        gender: row.try_get("gender")?,
        birth_year: row.try_get("birth_year")?,
        birth_month: to_u32(row.try_get("birth_month")?),
        birth_day: to_u32(row.try_get("birth_day")?),
        avatar_url: row.try_get("avatar_url")?,
        membership: row.try_get::<String, _>("membership")?.parse()?,
        created_at: row.try_get("created_at")?,
    })
}

fn grouped_counts(rows: Vec<PgRow>) -> anyhow::Result<HashMap<Uuid, u64>> {
    rows.iter()
        .map(|row| {
            let id: Uuid = row.try_get("venue_id")?;
            let n: i64 = row.try_get("n")?;
            Ok((id, u64::try_from(n).unwrap_or_default()))
        })
        .collect()
}

/// Serializes writers on one venue so the average sees every committed review.
async fn lock_venue(conn: &mut PgConnection, venue_id: Uuid) -> anyhow::Result<()> {
    let found = sqlx::query("SELECT id FROM venues WHERE id = $1 FOR UPDATE")
        .bind(venue_id)
        .fetch_optional(&mut *conn)
        .await?;
    if found.is_none() {
        anyhow::bail!("venue {venue_id} does not exist");
    }
    Ok(())
}

async fn recompute_rating(conn: &mut PgConnection, venue_id: Uuid) -> anyhow::Result<()> {
    sqlx::query(
        "UPDATE venues SET rating = COALESCE(\
             (SELECT AVG(rating)::float8 FROM reviews WHERE venue_id = $1), 0) \
         WHERE id = $1",
    )
    .bind(venue_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[async_trait]
impl VenueRepo for PgStore {
    async fn find_category(&self, key: &str) -> anyhow::Result<Option<Category>> {
        let row = sqlx::query("SELECT id, key, name, sub_categories FROM categories WHERE key = lower($1)")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(category_from_row).transpose()
    }

    async fn insert_category(&self, category: Category) -> anyhow::Result<()> {
        sqlx::query("INSERT INTO categories (id, key, name, sub_categories) VALUES ($1, $2, $3, $4)")
            .bind(category.id)
            .bind(category.key)
            .bind(category.name)
            .bind(category.sub_categories)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_venue(&self, venue: Venue) -> anyhow::Result<()> {
        let offers: Vec<String> = venue.special_offers.iter().map(|o| o.as_str().to_string()).collect();
        sqlx::query(
            "INSERT INTO venues (id, name, address, description, category_id, sub_category, latitude, longitude, \
             rating, region1, region2, region3, region4, tags, special_offers, images, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
        )
        .bind(venue.id)
        .bind(venue.name)
        .bind(venue.address)
        .bind(venue.description)
        .bind(venue.category_id)
        .bind(venue.sub_category)
        .bind(venue.latitude)
        .bind(venue.longitude)
        .bind(venue.rating)
        .bind(venue.region.region1)
        .bind(venue.region.region2)
        .bind(venue.region.region3)
        .bind(venue.region.region4)
        .bind(venue.tags)
        .bind(offers)
        .bind(venue.images)
        .bind(venue.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_venue(&self, id: Uuid) -> anyhow::Result<Option<Venue>> {
        let sql = format!("SELECT {VENUE_COLUMNS} FROM venues WHERE id = $1");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(venue_from_row).transpose()
    }

    async fn find_venues(&self, filter: &VenueFilter) -> anyhow::Result<Vec<Venue>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {VENUE_COLUMNS} FROM venues"));
        push_filter(&mut qb, filter);
        debug!(sql = qb.sql(), "find_venues");

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(venue_from_row).collect()
    }

    async fn find_nearest(
        &self,
        origin: GeoPoint,
        text: Option<String>,
        offset: u64,
        limit: u64,
    ) -> anyhow::Result<NearestPage> {
        let pattern = text.as_deref().map(like_pattern);

        let sql = format!(
            "SELECT {VENUE_COLUMNS}, {DISTANCE_KM} AS distance_km FROM venues \
             WHERE ($3::text IS NULL OR name ILIKE $3 OR description ILIKE $3) \
             ORDER BY distance_km ASC, id ASC LIMIT $4 OFFSET $5"
        );
        let rows = sqlx::query(&sql)
            .bind(origin.latitude)
            .bind(origin.longitude)
            .bind(pattern.clone())
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .bind(i64::try_from(offset).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM venues WHERE ($1::text IS NULL OR name ILIKE $1 OR description ILIKE $1)",
        )
        .bind(pattern)
        .fetch_one(&self.pool)
        .await?;

        let venues = rows
            .iter()
            .map(|row| Ok((venue_from_row(row)?, row.try_get::<f64, _>("distance_km")?)))
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(NearestPage {
            venues,
            total: u64::try_from(total).unwrap_or_default(),
        })
    }

    async fn count_bookmarks(&self, venue_ids: &[Uuid]) -> anyhow::Result<HashMap<Uuid, u64>> {
        let rows = sqlx::query(
            "SELECT venue_id, COUNT(*) AS n FROM bookmarks WHERE venue_id = ANY($1) GROUP BY venue_id",
        )
        .bind(venue_ids.to_vec())
        .fetch_all(&self.pool)
        .await?;
        grouped_counts(rows)
    }

    async fn count_reviews(&self, venue_ids: &[Uuid]) -> anyhow::Result<HashMap<Uuid, u64>> {
        let rows = sqlx::query(
            "SELECT venue_id, COUNT(*) AS n FROM reviews WHERE venue_id = ANY($1) GROUP BY venue_id",
        )
        .bind(venue_ids.to_vec())
        .fetch_all(&self.pool)
        .await?;
        grouped_counts(rows)
    }
}

#[async_trait]
impl ReviewRepo for PgStore {
    /// Inserts the review and refreshes the venue rating in one transaction.
    async fn create_review(&self, review: Review) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        lock_venue(&mut tx, review.venue_id).await?;

        sqlx::query(
            "INSERT INTO reviews (id, venue_id, user_id, rating, content, images, tags, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(review.id)
        .bind(review.venue_id)
        .bind(review.user_id)
        .bind(i16::from(review.rating))
        .bind(review.content)
        .bind(review.images)
        .bind(review.tags)
        .bind(review.created_at)
        .bind(review.updated_at)
        .execute(&mut *tx)
        .await?;

        recompute_rating(&mut tx, review.venue_id).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_review(&self, id: Uuid) -> anyhow::Result<Option<Review>> {
        let row = sqlx::query("SELECT * FROM reviews WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(review_from_row).transpose()
    }

    async fn update_review(&self, review: Review) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        lock_venue(&mut tx, review.venue_id).await?;

        let updated = sqlx::query(
            "UPDATE reviews SET rating = $2, content = $3, images = $4, tags = $5, updated_at = $6 WHERE id = $1",
        )
        .bind(review.id)
        .bind(i16::from(review.rating))
        .bind(review.content)
        .bind(review.images)
        .bind(review.tags)
        .bind(review.updated_at)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            anyhow::bail!("review {} does not exist", review.id);
        }

        recompute_rating(&mut tx, review.venue_id).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete_review(&self, id: Uuid) -> anyhow::Result<bool> {
        let mut tx = self.pool.begin().await?;

        let venue_id: Option<Uuid> = sqlx::query_scalar("SELECT venue_id FROM reviews WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(venue_id) = venue_id else {
            return Ok(false);
        };
        lock_venue(&mut tx, venue_id).await?;

        let deleted = sqlx::query("DELETE FROM reviews WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        recompute_rating(&mut tx, venue_id).await?;
        tx.commit().await?;
        Ok(deleted.rows_affected() > 0)
    }

    async fn list_reviews(&self, venue_id: Uuid) -> anyhow::Result<Vec<Review>> {
        let rows = sqlx::query("SELECT * FROM reviews WHERE venue_id = $1 ORDER BY created_at DESC, id DESC")
            .bind(venue_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(review_from_row).collect()
    }
}

#[async_trait]
impl BookmarkRepo for PgStore {
    async fn add_bookmark(
        &self,
        user_id: Uuid,
        venue_id: Uuid,
        at: DateTime<Utc>,
    ) -> anyhow::Result<BookmarkOutcome> {
        let inserted = sqlx::query(
            "INSERT INTO bookmarks (user_id, venue_id, created_at) VALUES ($1, $2, $3) \
             ON CONFLICT (user_id, venue_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(venue_id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(if inserted.rows_affected() == 1 {
            BookmarkOutcome::Created
        } else {
            BookmarkOutcome::AlreadyExists
        })
    }

    async fn remove_bookmark(&self, user_id: Uuid, venue_id: Uuid) -> anyhow::Result<bool> {
        let deleted = sqlx::query("DELETE FROM bookmarks WHERE user_id = $1 AND venue_id = $2")
            .bind(user_id)
            .bind(venue_id)
            .execute(&self.pool)
            .await?;
        Ok(deleted.rows_affected() > 0)
    }

    async fn is_bookmarked(&self, user_id: Uuid, venue_id: Uuid) -> anyhow::Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM bookmarks WHERE user_id = $1 AND venue_id = $2)",
        )
        .bind(user_id)
        .bind(venue_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn list_bookmarks(&self, user_id: Uuid) -> anyhow::Result<Vec<Bookmark>> {
        let rows = sqlx::query(
            "SELECT user_id, venue_id, created_at FROM bookmarks WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(Bookmark {
                    user_id: row.try_get("user_id")?,
                    venue_id: row.try_get("venue_id")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl MembershipRepo for PgStore {
    async fn insert_serials(&self, serials: Vec<SerialNumber>) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        for chunk in serials.chunks(SERIAL_CHUNK) {
            let mut qb = QueryBuilder::<Postgres>::new(
                "INSERT INTO serial_numbers (code, tier, expires_at, state, created_at) ",
            );
            qb.push_values(chunk, |mut row, serial| {
                row.push_bind(serial.code.clone())
                    .push_bind(serial.tier.as_str())
                    .push_bind(serial.expires_at)
                    .push_bind("unused")
                    .push_bind(serial.created_at);
            });
            qb.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_serial(&self, code: &str) -> anyhow::Result<Option<SerialNumber>> {
        let row = sqlx::query("SELECT * FROM serial_numbers WHERE code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(serial_from_row).transpose()
    }

    /// The conditional UPDATE takes the row lock; a concurrent redeemer
    /// re-evaluates the predicate after the winner commits and matches nothing.
    async fn redeem_serial(
        &self,
        code: &str,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> anyhow::Result<RedeemOutcome> {
        let mut tx = self.pool.begin().await?;

        let claimed: Option<String> = sqlx::query_scalar(
            "UPDATE serial_numbers SET state = 'used', redeemed_by = $2, redeemed_at = $3 \
             WHERE code = $1 AND state = 'unused' AND (expires_at IS NULL OR expires_at > $3) \
             RETURNING tier",
        )
        .bind(code)
        .bind(user_id)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(tier) = claimed else {
            let existing = sqlx::query("SELECT * FROM serial_numbers WHERE code = $1")
                .bind(code)
                .fetch_optional(&mut *tx)
                .await?;
            tx.rollback().await?;
            return Ok(match existing.as_ref().map(serial_from_row).transpose()? {
                None => RedeemOutcome::NotFound,
                Some(serial) if serial.state == SerialState::Used => RedeemOutcome::AlreadyUsed,
                Some(_) => RedeemOutcome::Expired,
            });
        };
        let tier: MembershipTier = tier.parse()?;

        let upgraded = sqlx::query("UPDATE users SET membership = $1 WHERE id = $2")
            .bind(tier.as_str())
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        if upgraded.rows_affected() == 0 {
            tx.rollback().await?;
            anyhow::bail!("user {user_id} does not exist");
        }

        tx.commit().await?;
        Ok(RedeemOutcome::Redeemed(tier))
    }
}

#[async_trait]
impl UserRepo for PgStore {
    async fn insert_user(&self, user: User) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO users (id, email, password_hash, name, country, gender, birth_year, birth_month, \
             birth_day, avatar_url, membership, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(user.id)
        .bind(user.email)
        .bind(user.password_hash)
        .bind(user.name)
        .bind(user.country)
        .bind(user.gender)
        .bind(user.birth_year)
        .bind(user.birth_month.and_then(|m| i32::try_from(m).ok()))
        .bind(user.birth_day.and_then(|d| i32::try_from(d).ok()))
        .bind(user.avatar_url)
        .bind(user.membership.as_str())
        .bind(user.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE lower(email) = lower($1)")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }
}

#[cfg(test)]
mod tests {
    //! Live tests need a disposable database:
    //! `TASTEMAP_TEST_DATABASE_URL=postgres://... cargo test -- --ignored`

    use super::*;
    use std::sync::Arc;
    use tm_core::filter::{MapBounds, TagFilterMode};
    use tm_core::geo::haversine_km;

    async fn store() -> PgStore {
        let url = std::env::var("TASTEMAP_TEST_DATABASE_URL").expect("TASTEMAP_TEST_DATABASE_URL");
        let store = PgStore::connect(&url, 16, Duration::from_secs(5)).await.unwrap();
        store.migrate().await.unwrap();
        store
    }

    fn user(email: &str) -> User {
        User {
            id: Uuid::now_v7(),
            email: email.into(),
            password_hash: "x".into(),
            name: "tester".into(),
            country: None,
            gender: None,
            birth_year: None,
            birth_month: None,
            birth_day: None,
            avatar_url: None,
            membership: MembershipTier::Free,
            created_at: Utc::now(),
        }
    }

    async fn category(store: &PgStore) -> Category {
        let category = Category {
            id: Uuid::now_v7(),
            key: format!("cat-{}", Uuid::now_v7()),
            name: "Food".into(),
            sub_categories: vec![],
        };
        store.insert_category(category.clone()).await.unwrap();
        category
    }

    fn venue(category: &Category, name: &str, latitude: f64, longitude: f64) -> Venue {
        Venue {
            id: Uuid::now_v7(),
            name: name.into(),
            address: String::new(),
            description: String::new(),
            category_id: category.id,
            sub_category: None,
            latitude,
            longitude,
            rating: 0.0,
            region: Region::default(),
            tags: vec![],
            special_offers: vec![],
            images: vec![],
            created_at: Utc::now(),
        }
    }

    fn review(venue_id: Uuid, user_id: Uuid, rating: u8) -> Review {
        Review {
            id: Uuid::now_v7(),
            venue_id,
            user_id,
            rating,
            content: "ok".into(),
            images: vec![],
            tags: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    async fn rating_of(store: &PgStore, venue_id: Uuid) -> f64 {
        store.get_venue(venue_id).await.unwrap().unwrap().rating
    }

    /// A point in the Southern Ocean unique to one test run, so rows left by
    /// other runs never sit closer to the origin than the ones under test.
    fn lonely_origin() -> GeoPoint {
        let seed = Uuid::new_v4().as_u128();
        GeoPoint::new(
            -60.0 + (seed % 10_000) as f64 / 1_000.0,
            -150.0 + ((seed >> 64) % 10_000) as f64 / 1_000.0,
        )
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore = "requires postgres"]
    async fn concurrent_redemption_has_one_winner() {
        let store = Arc::new(store().await);
        let code = Uuid::new_v4().simple().to_string()[..16].to_uppercase();
        store
            .insert_serials(vec![SerialNumber {
                code: code.clone(),
                tier: MembershipTier::Premium,
                expires_at: None,
                state: SerialState::Unused,
                redeemed_by: None,
                redeemed_at: None,
                created_at: Utc::now(),
            }])
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let u = user(&format!("{}-{i}@example.com", Uuid::now_v7()));
            store.insert_user(u.clone()).await.unwrap();
            let store = store.clone();
            let code = code.clone();
            handles.push(tokio::spawn(async move {
                store.redeem_serial(&code, u.id, Utc::now()).await.unwrap()
            }));
        }

        let mut winners = 0;
        for h in handles {
            match h.await.unwrap() {
                RedeemOutcome::Redeemed(tier) => {
                    assert_eq!(tier, MembershipTier::Premium);
                    winners += 1;
                }
                other => assert_eq!(other, RedeemOutcome::AlreadyUsed),
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    #[ignore = "requires postgres"]
    async fn bookmark_insert_is_idempotent() {
        let store = store().await;
        let category = category(&store).await;
        let mut venue = venue(&category, "Hanok", 37.5, 127.0);
        venue.special_offers = vec![SpecialOffer::Discount];
        store.insert_venue(venue.clone()).await.unwrap();
        let u = user(&format!("{}@example.com", Uuid::now_v7()));
        store.insert_user(u.clone()).await.unwrap();

        let first = store.add_bookmark(u.id, venue.id, Utc::now()).await.unwrap();
        let second = store.add_bookmark(u.id, venue.id, Utc::now()).await.unwrap();
        assert_eq!(first, BookmarkOutcome::Created);
        assert_eq!(second, BookmarkOutcome::AlreadyExists);

        let counts = store.count_bookmarks(&[venue.id]).await.unwrap();
        assert_eq!(counts.get(&venue.id), Some(&1));
    }

    #[tokio::test]
    #[ignore = "requires postgres"]
    async fn nearest_orders_by_distance_then_id() {
        let store = store().await;
        let category = category(&store).await;
        let origin = lonely_origin();
        let marker = format!("m{}", Uuid::new_v4().simple());

        let mut inserted = Vec::new();
        for (step, name) in [(0, "noodle"), (1, "grill"), (2, "noodle"), (2, "bakery"), (4, "noodle"), (5, "grill")] {
            let v = venue(
                &category,
                &format!("{marker} {name}"),
                origin.latitude + f64::from(step) * 0.001,
                origin.longitude,
            );
            store.insert_venue(v.clone()).await.unwrap();
            inserted.push(v);
        }
        let mut expected: Vec<(Uuid, f64)> = inserted
            .iter()
            .map(|v| (v.id, haversine_km(origin, v.location())))
            .collect();
        expected.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

        let page = store.find_nearest(origin, None, 0, 6).await.unwrap();
        assert!(page.total >= 6);
        let got: Vec<Uuid> = page.venues.iter().map(|(v, _)| v.id).collect();
        assert_eq!(got, expected.iter().map(|e| e.0).collect::<Vec<_>>());
        for ((_, km), (_, want)) in page.venues.iter().zip(&expected) {
            assert!((km - want).abs() < 1e-6, "sql distance {km} vs {want}");
        }

        let second = store.find_nearest(origin, None, 2, 2).await.unwrap();
        let got: Vec<Uuid> = second.venues.iter().map(|(v, _)| v.id).collect();
        assert_eq!(got, vec![expected[2].0, expected[3].0]);

        let noodles = store
            .find_nearest(origin, Some(format!("{} NOODLE", marker.to_uppercase())), 0, 10)
            .await
            .unwrap();
        assert_eq!(noodles.total, 3);
        assert!(noodles.venues.iter().all(|(v, _)| v.name.ends_with("noodle")));
        assert!(noodles.venues.windows(2).all(|w| w[0].1 <= w[1].1));

        let beyond = store
            .find_nearest(origin, Some(format!("{marker} noodle")), 3, 10)
            .await
            .unwrap();
        assert!(beyond.venues.is_empty());
        assert_eq!(beyond.total, 3);
    }

    #[tokio::test]
    #[ignore = "requires postgres"]
    async fn sql_filter_agrees_with_in_memory_matching() {
        let store = store().await;
        let category = category(&store).await;

        let mut seoul = venue(&category, "Jongno Tavern", 37.57, 126.99);
        seoul.region.region1 = Some("Seoul".into());
        seoul.region.region2 = Some("Jongno-gu".into());
        seoul.tags = vec!["Spicy".into(), "cozy".into()];
        seoul.special_offers = vec![SpecialOffer::Discount];

        let mut gangnam = venue(&category, "Sinsa Bistro", 37.52, 127.02);
        gangnam.address = "Gangnam-daero 1".into();
        gangnam.tags = vec!["spicy".into()];
        gangnam.special_offers = vec![SpecialOffer::SpecialGift];

        let mut busan = venue(&category, "Haeundae 100%_Grill", 35.16, 129.16);
        busan.region.region1 = Some("Busan".into());
        busan.tags = vec!["cozy".into(), "quiet".into()];

        let bare = venue(&category, "Nameless", 36.0, 128.0);

        let all = vec![seoul, gangnam, busan, bare];
        for v in &all {
            store.insert_venue(v.clone()).await.unwrap();
        }

        let scoped = |f: VenueFilter| VenueFilter {
            category_id: Some(category.id),
            ..f
        };
        let filters = [
            scoped(VenueFilter::default()),
            scoped(VenueFilter { region: Some("seoul".into()), ..Default::default() }),
            scoped(VenueFilter { region: Some("gangnam".into()), ..Default::default() }),
            scoped(VenueFilter { text: Some("100%_".into()), ..Default::default() }),
            scoped(VenueFilter {
                bounds: Some(MapBounds { ne_lat: 38.0, ne_lng: 127.5, sw_lat: 37.0, sw_lng: 126.5 }),
                ..Default::default()
            }),
            scoped(VenueFilter {
                special_offers: vec![SpecialOffer::Discount, SpecialOffer::SpecialGift],
                ..Default::default()
            }),
            scoped(VenueFilter {
                tags: vec!["SPICY".into(), "cozy".into()],
                tag_mode: TagFilterMode::All,
                ..Default::default()
            }),
            scoped(VenueFilter {
                tags: vec!["spicy".into(), "Spicy".into()],
                tag_mode: TagFilterMode::All,
                ..Default::default()
            }),
            scoped(VenueFilter {
                tags: vec!["quiet".into(), "missing".into()],
                tag_mode: TagFilterMode::Any,
                ..Default::default()
            }),
        ];

        for filter in filters {
            let mut want: Vec<Uuid> = all.iter().filter(|v| filter.matches(v)).map(|v| v.id).collect();
            let mut got: Vec<Uuid> = store
                .find_venues(&filter)
                .await
                .unwrap()
                .iter()
                .map(|v| v.id)
                .collect();
            want.sort();
            got.sort();
            assert_eq!(got, want, "filter {filter:?}");
        }
    }

    #[tokio::test]
    #[ignore = "requires postgres"]
    async fn rating_follows_review_writes() {
        let store = store().await;
        let category = category(&store).await;
        let place = venue(&category, "Gwangjang", 37.57, 127.0);
        store.insert_venue(place.clone()).await.unwrap();
        let alice = user(&format!("{}@example.com", Uuid::now_v7()));
        let bob = user(&format!("{}@example.com", Uuid::now_v7()));
        store.insert_user(alice.clone()).await.unwrap();
        store.insert_user(bob.clone()).await.unwrap();

        let five = review(place.id, alice.id, 5);
        let mut three = review(place.id, bob.id, 3);
        store.create_review(five.clone()).await.unwrap();
        store.create_review(three.clone()).await.unwrap();
        assert_eq!(rating_of(&store, place.id).await, 4.0);

        three.rating = 1;
        store.update_review(three.clone()).await.unwrap();
        assert_eq!(rating_of(&store, place.id).await, 3.0);

        assert!(store.delete_review(three.id).await.unwrap());
        assert_eq!(rating_of(&store, place.id).await, 5.0);

        assert!(store.delete_review(five.id).await.unwrap());
        assert_eq!(rating_of(&store, place.id).await, 0.0);
        assert!(!store.delete_review(five.id).await.unwrap());

        let counts = store.count_reviews(&[place.id]).await.unwrap();
        assert!(counts.get(&place.id).is_none());
    }
}
