//! # Membership
//!
//! Serial-number issuance (admin side) and redemption (user side).
//! Redemption atomicity is the store's job; this layer validates input and
//! maps outcomes onto `AppError`.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use tm_core::{
    AppError, MembershipRepo, MembershipTier, RedeemOutcome, Result, SerialNumber, SerialState, UserRepo,
};

pub const SERIAL_CODE_LEN: usize = 16;
pub const MAX_BATCH_SIZE: usize = 10_000;

/// Parameters for one admin issuance run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialBatch {
    pub tier: MembershipTier,
    pub count: usize,
    /// `None` issues codes that never expire
    pub valid_for: Option<Duration>,
}

pub struct MembershipService {
    serials: Arc<dyn MembershipRepo>,
    users: Arc<dyn UserRepo>,
}

impl MembershipService {
    pub fn new(serials: Arc<dyn MembershipRepo>, users: Arc<dyn UserRepo>) -> Self {
        Self { serials, users }
    }

    pub async fn issue_batch(&self, batch: SerialBatch, now: DateTime<Utc>) -> Result<Vec<SerialNumber>> {
        if batch.tier == MembershipTier::Free {
            return Err(AppError::validation("tier", "serials must grant a paid tier"));
        }
        if batch.count == 0 || batch.count > MAX_BATCH_SIZE {
            return Err(AppError::validation(
                "count",
                format!("must be between 1 and {MAX_BATCH_SIZE}"),
            ));
        }

        let expires_at = batch.valid_for.map(|d| now + d);
        let mut codes = HashSet::with_capacity(batch.count);
        while codes.len() < batch.count {
            codes.insert(generate_code());
        }

        let serials: Vec<SerialNumber> = codes
            .into_iter()
            .map(|code| SerialNumber {
                code,
                tier: batch.tier,
                expires_at,
                state: SerialState::Unused,
                redeemed_by: None,
                redeemed_at: None,
                created_at: now,
            })
            .collect();

        self.serials.insert_serials(serials.clone()).await?;
        info!(count = serials.len(), tier = %batch.tier, "issued serial batch");
        Ok(serials)
    }

    pub async fn redeem(&self, user_id: Uuid, code: &str, now: DateTime<Utc>) -> Result<MembershipTier> {
        let code = normalize_code(code);
        if code.is_empty() {
            return Err(AppError::validation("code", "must not be empty"));
        }
        if self.users.get_user(user_id).await?.is_none() {
            return Err(AppError::not_found("User", user_id));
        }

        match self.serials.redeem_serial(&code, user_id, now).await? {
            RedeemOutcome::Redeemed(tier) => {
                info!(%user_id, %tier, "serial redeemed");
                Ok(tier)
            }
            RedeemOutcome::NotFound => Err(AppError::not_found("Serial number", code)),
            RedeemOutcome::AlreadyUsed => {
                warn!(%user_id, "attempt to redeem a used serial");
                Err(AppError::Conflict("serial number already used".into()))
            }
            RedeemOutcome::Expired => Err(AppError::Conflict("serial number expired".into())),
        }
    }
}

/// Uppercase alphanumeric code drawn from a random v4 UUID.
pub fn generate_code() -> String {
    Uuid::new_v4().simple().to_string()[..SERIAL_CODE_LEN].to_ascii_uppercase()
}

/// Codes are case-insensitive and may be typed with dashes or spaces.
pub fn normalize_code(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}
