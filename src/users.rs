//! User directory.
//!
//! Read access to the account tables plus role and subscription
//! updates. Passwords never leave this module; only whether one is set.
//!
//! `role` and `"subscriptionTier"` are Postgres enum columns (`"Role"`,
//! `"SubscriptionTier"`): reads cast them to `text`, writes cast the
//! bound text parameter back to the enum type.

use crate::auth::Role;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SubscriptionTier {
    Free,
    Pro,
    Ultra,
    Enterprise,
}

impl SubscriptionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionTier::Free => "FREE",
            SubscriptionTier::Pro => "PRO",
            SubscriptionTier::Ultra => "ULTRA",
            SubscriptionTier::Enterprise => "ENTERPRISE",
        }
    }
}

impl fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionTier {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "FREE" => Ok(SubscriptionTier::Free),
            "PRO" => Ok(SubscriptionTier::Pro),
            "ULTRA" => Ok(SubscriptionTier::Ultra),
            "ENTERPRISE" => Ok(SubscriptionTier::Enterprise),
            other => anyhow::bail!("Unknown subscription tier: '{}'", other),
        }
    }
}

/// Admin-facing view of one account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub email_verified: Option<DateTime<Utc>>,
    pub role: Role,
    pub subscription_tier: SubscriptionTier,
    pub subscription_ends: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub has_password: bool,
    pub accounts_count: i64,
}

impl UserSummary {
    /// Tier in force at `now`. A subscription past its end date reads as
    /// FREE.
    pub fn effective_tier(&self, now: DateTime<Utc>) -> SubscriptionTier {
        match self.subscription_ends {
            Some(ends) if ends < now => SubscriptionTier::Free,
            _ => self.subscription_tier,
        }
    }
}

/// Account store behind the admin routes.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Every user, newest first
    async fn all_users(&self) -> Result<Vec<UserSummary>>;

    async fn user_count(&self) -> Result<i64>;

    async fn user_by_id(&self, id: &str) -> Result<Option<UserSummary>>;

    /// Returns false when no such user exists.
    async fn update_role(&self, id: &str, role: Role) -> Result<bool>;

    /// Effective tier for a user. An expired subscription is downgraded
    /// to FREE in the store as well.
    async fn subscription_tier(&self, id: &str) -> Result<Option<SubscriptionTier>>;
}

// ==================== Postgres ====================

/// Columns of `"User"` in the shape of [`UserRow`].
const SELECT_USERS: &str = r#"
    SELECT u.id,
           u.email,
           u.name,
           u."emailVerified" AS email_verified,
           u.role::text AS role,
           u."subscriptionTier"::text AS subscription_tier,
           u."subscriptionEnds" AS subscription_ends,
           u."createdAt" AS created_at,
           u."updatedAt" AS updated_at,
           (u.password IS NOT NULL) AS has_password,
           (SELECT COUNT(*) FROM "Account" a WHERE a."userId" = u.id) AS accounts_count
    FROM "User" u
"#;

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: String,
    email: String,
    name: Option<String>,
    email_verified: Option<NaiveDateTime>,
    role: String,
    subscription_tier: String,
    subscription_ends: Option<NaiveDateTime>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
    has_password: bool,
    accounts_count: i64,
}

impl From<UserRow> for UserSummary {
    fn from(row: UserRow) -> Self {
        let role = row.role.parse().unwrap_or_else(|_| {
            warn!("User {} has unknown role '{}', treating as USER", row.id, row.role);
            Role::User
        });
        let subscription_tier = row.subscription_tier.parse().unwrap_or_else(|_| {
            warn!(
                "User {} has unknown tier '{}', treating as FREE",
                row.id, row.subscription_tier
            );
            SubscriptionTier::Free
        });

        Self {
            id: row.id,
            email: row.email,
            name: row.name,
            email_verified: row.email_verified.map(|t| t.and_utc()),
            role,
            subscription_tier,
            subscription_ends: row.subscription_ends.map(|t| t.and_utc()),
            created_at: row.created_at.and_utc(),
            updated_at: row.updated_at.and_utc(),
            has_password: row.has_password,
            accounts_count: row.accounts_count,
        }
    }
}

const UPDATE_ROLE: &str =
    r#"UPDATE "User" SET role = $1::"Role", "updatedAt" = NOW() WHERE id = $2"#;

const DOWNGRADE_SUBSCRIPTION: &str = r#"UPDATE "User" SET "subscriptionTier" = $1::"SubscriptionTier", "subscriptionEnds" = NULL, "updatedAt" = NOW() WHERE id = $2"#;

#[derive(Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    /// Create a lazily connecting pool; the first query opens the
    /// connection.
    pub fn connect_lazy(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .connect_lazy(database_url)
            .context("Invalid DATABASE_URL")?;

        info!("User directory configured (PostgreSQL)");
        Ok(Self { pool })
    }

}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn all_users(&self) -> Result<Vec<UserSummary>> {
        let sql = format!(r#"{} ORDER BY u."createdAt" DESC"#, SELECT_USERS);
        let rows: Vec<UserRow> = sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch users")?;

        Ok(rows.into_iter().map(UserSummary::from).collect())
    }

    async fn user_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM "User""#)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count users")?;

        Ok(count)
    }

    async fn user_by_id(&self, id: &str) -> Result<Option<UserSummary>> {
        let sql = format!("{} WHERE u.id = $1", SELECT_USERS);
        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user by ID")?;

        Ok(row.map(UserSummary::from))
    }

    async fn update_role(&self, id: &str, role: Role) -> Result<bool> {
        let result = sqlx::query(UPDATE_ROLE)
            .bind(role.as_str())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update user role")?;

        let updated = result.rows_affected() > 0;
        if updated {
            info!("Updated role of user {} to {}", id, role);
        }
        Ok(updated)
    }

    async fn subscription_tier(&self, id: &str) -> Result<Option<SubscriptionTier>> {
        let Some(user) = self.user_by_id(id).await? else {
            return Ok(None);
        };

        let tier = user.effective_tier(Utc::now());
        if tier != user.subscription_tier {
            sqlx::query(DOWNGRADE_SUBSCRIPTION)
            .bind(tier.as_str())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to downgrade expired subscription")?;
            info!("Downgraded expired subscription of user {} to {}", id, tier);
        }

        Ok(Some(tier))
    }
}
