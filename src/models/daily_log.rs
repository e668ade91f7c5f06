use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One record per (user, calendar day). Holds the morning check-in payload,
/// an optional evening payload, and the generated plan text.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DailyLog {
    pub id: Uuid,
    pub user_id: Uuid,
    pub log_date: NaiveDate,
    pub morning_json: Option<serde_json::Value>,
    pub evening_json: Option<serde_json::Value>,
    pub plan_text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields to merge into a day's record. `None` leaves the stored value
/// untouched, so the two-phase write (check-in first, plan afterwards)
/// never clobbers the earlier phase.
#[derive(Debug, Clone, Default)]
pub struct DailyLogPatch {
    pub morning: Option<serde_json::Value>,
    pub evening: Option<serde_json::Value>,
    pub plan_text: Option<String>,
}
