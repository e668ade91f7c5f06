use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::daily_log::{DailyLog, DailyLogPatch};
use crate::models::message::{MessageDirection, MessageLog};
use crate::models::user::User;
use crate::services::twilio::normalize_phone;

/// Persistence seam for the webhook pipeline. Backed by [`PgStore`] in
/// production; tests inject an in-memory double.
#[async_trait]
pub trait CoachStore: Send + Sync {
    async fn get_user_by_phone(&self, phone: &str) -> AppResult<Option<User>>;

    /// Get-or-create keyed on the normalized phone. Safe under concurrent
    /// first contact: losers of the insert race re-read the winner's row.
    async fn create_user(&self, phone: &str, name: Option<&str>) -> AppResult<User>;

    async fn log_message(
        &self,
        user_id: Uuid,
        direction: MessageDirection,
        body: &str,
    ) -> AppResult<MessageLog>;

    async fn get_daily_log(&self, user_id: Uuid, date: NaiveDate) -> AppResult<Option<DailyLog>>;

    /// Insert-or-merge the day's record. Supplied patch fields overwrite,
    /// absent ones keep their stored value; `updated_at` always advances.
    async fn upsert_daily_log(
        &self,
        user_id: Uuid,
        date: NaiveDate,
        patch: DailyLogPatch,
    ) -> AppResult<DailyLog>;
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CoachStore for PgStore {
    async fn get_user_by_phone(&self, phone: &str) -> AppResult<Option<User>> {
        let normalized = normalize_phone(phone);
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE phone = $1")
            .bind(&normalized)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn create_user(&self, phone: &str, name: Option<&str>) -> AppResult<User> {
        let normalized = normalize_phone(phone);
        let inserted = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, phone, name, timezone)
            VALUES ($1, $2, $3, 'UTC')
            ON CONFLICT (phone) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&normalized)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(user) = inserted {
            return Ok(user);
        }

        // Lost the insert race; the winner's row must be readable now.
        self.get_user_by_phone(&normalized).await?.ok_or_else(|| {
            AppError::Conflict(format!("User {} disappeared during creation", normalized))
        })
    }

    async fn log_message(
        &self,
        user_id: Uuid,
        direction: MessageDirection,
        body: &str,
    ) -> AppResult<MessageLog> {
        let entry = sqlx::query_as::<_, MessageLog>(
            r#"
            INSERT INTO messages (id, user_id, direction, body)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(direction)
        .bind(body)
        .fetch_one(&self.pool)
        .await?;

        Ok(entry)
    }

    async fn get_daily_log(&self, user_id: Uuid, date: NaiveDate) -> AppResult<Option<DailyLog>> {
        let log = sqlx::query_as::<_, DailyLog>(
            "SELECT * FROM daily_logs WHERE user_id = $1 AND log_date = $2",
        )
        .bind(user_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;

        Ok(log)
    }

    async fn upsert_daily_log(
        &self,
        user_id: Uuid,
        date: NaiveDate,
        patch: DailyLogPatch,
    ) -> AppResult<DailyLog> {
        // Single conditional statement: Postgres serializes writers on the
        // (user_id, log_date) key, so concurrent patches with disjoint
        // fields both land instead of the later read-modify-write winning.
        let log = sqlx::query_as::<_, DailyLog>(
            r#"
            INSERT INTO daily_logs (id, user_id, log_date, morning_json, evening_json, plan_text)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id, log_date) DO UPDATE SET
                morning_json = COALESCE($4, daily_logs.morning_json),
                evening_json = COALESCE($5, daily_logs.evening_json),
                plan_text = COALESCE($6, daily_logs.plan_text),
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(date)
        .bind(patch.morning)
        .bind(patch.evening)
        .bind(patch.plan_text)
        .fetch_one(&self.pool)
        .await?;

        Ok(log)
    }
}
