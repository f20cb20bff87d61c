use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use tm_core::{AppError, AuthProvider, MembershipTier, Result, User, UserRepo};

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub token: String,
    pub user: User,
}

/// Profile fields accepted when an account is created.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub name: String,
    pub country: Option<String>,
    pub gender: Option<String>,
    pub birth_year: Option<i32>,
    pub birth_month: Option<u32>,
    pub birth_day: Option<u32>,
}

pub struct AccountService {
    users: Arc<dyn UserRepo>,
    auth: Arc<dyn AuthProvider>,
}

impl AccountService {
    pub fn new(users: Arc<dyn UserRepo>, auth: Arc<dyn AuthProvider>) -> Self {
        Self { users, auth }
    }

    /// Unknown email and wrong password are indistinguishable to the caller.
    pub async fn login(&self, request: LoginRequest, now: DateTime<Utc>) -> Result<Session> {
        let invalid = || AppError::Unauthorized("invalid email or password".into());

        let email = request.email.trim().to_lowercase();
        let user = self.users.find_user_by_email(&email).await?.ok_or_else(invalid)?;
        if !self.auth.verify_password(&request.password, &user.password_hash).await {
            return Err(invalid());
        }

        let token = self.auth.issue_session(user.id, now)?;
        info!(user_id = %user.id, "session issued");
        Ok(Session { token, user })
    }

    pub async fn register(&self, new_user: NewUser, now: DateTime<Utc>) -> Result<User> {
        let email = new_user.email.trim().to_lowercase();
        if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
            return Err(AppError::validation("email", "must be an email address"));
        }
        if new_user.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::validation(
                "password",
                format!("must be at least {MIN_PASSWORD_LEN} characters"),
            ));
        }
        if let Some(month) = new_user.birth_month {
            if !(1..=12).contains(&month) {
                return Err(AppError::validation("birthMonth", "must be 1 to 12"));
            }
        }
        if let Some(day) = new_user.birth_day {
            if !(1..=31).contains(&day) {
                return Err(AppError::validation("birthDay", "must be 1 to 31"));
            }
        }
        if self.users.find_user_by_email(&email).await?.is_some() {
            return Err(AppError::Conflict(format!("{email} is already registered")));
        }

        let user = User {
            id: Uuid::now_v7(),
            email,
            password_hash: self.auth.hash_password(&new_user.password)?,
            name: new_user.name.trim().to_string(),
            country: new_user.country,
            gender: new_user.gender,
            birth_year: new_user.birth_year,
            birth_month: new_user.birth_month,
            birth_day: new_user.birth_day,
            avatar_url: None,
            membership: MembershipTier::Free,
            created_at: now,
        };
        self.users.insert_user(user.clone()).await?;
        info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    pub async fn profile(&self, user_id: Uuid) -> Result<User> {
        self.users
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User", user_id))
    }
}
