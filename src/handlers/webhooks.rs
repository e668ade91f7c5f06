use std::collections::HashMap;
use std::sync::Arc;

use axum::{extract::State, Form, Json};
use chrono::{NaiveDate, Utc};
use serde_json::{json, Value};

use crate::db::store::CoachStore;
use crate::error::{AppError, AppResult};
use crate::models::checkin::MorningCheckin;
use crate::models::daily_log::DailyLogPatch;
use crate::models::message::MessageDirection;
use crate::models::user::User;
use crate::services::checkin::ExtractorChain;
use crate::services::plan::DailyCoach;
use crate::services::twilio::{self, MessagingGateway};
use crate::AppState;

pub const PLAN_GREETING: &str = "Good morning! Here's your personalized daily plan:\n\n";

/// The whole inbound-message pipeline with every collaborator injected:
/// normalize -> get-or-create user -> audit -> extract -> (plan | general)
/// -> send -> audit. A single pass; the terminal state is always a reply.
pub struct CheckinPipeline {
    store: Arc<dyn CoachStore>,
    gateway: Arc<dyn MessagingGateway>,
    extractors: ExtractorChain,
    coach: DailyCoach,
}

/// What one inbound message produced.
#[derive(Debug)]
pub struct PipelineOutcome {
    pub reply: String,
    pub message_sid: Option<String>,
    pub checkin_recorded: bool,
}

impl CheckinPipeline {
    pub fn new(
        store: Arc<dyn CoachStore>,
        gateway: Arc<dyn MessagingGateway>,
        extractors: ExtractorChain,
        coach: DailyCoach,
    ) -> Self {
        Self {
            store,
            gateway,
            extractors,
            coach,
        }
    }

    pub async fn handle(&self, payload: &HashMap<String, String>) -> AppResult<PipelineOutcome> {
        let incoming = twilio::parse_incoming(payload);
        if incoming.from.is_empty() || incoming.body.is_empty() {
            return Err(AppError::Validation("Invalid message data".into()));
        }

        tracing::info!(from = %incoming.from, sid = %incoming.message_sid, "Received message");

        let user = match self.store.get_user_by_phone(&incoming.from).await? {
            Some(user) => user,
            None => {
                let name = incoming.profile_name.trim();
                self.store
                    .create_user(&incoming.from, (!name.is_empty()).then_some(name))
                    .await?
            }
        };

        self.store
            .log_message(user.id, MessageDirection::Inbound, &incoming.body)
            .await?;

        let (reply, checkin_recorded) = match self.extractors.extract(&incoming.body).await {
            Some(checkin) => {
                let plan = self.record_checkin(&user, &checkin).await?;
                (compose_plan_reply(&plan), true)
            }
            None => {
                let reply = self
                    .coach
                    .general_reply(&incoming.body, user.name.as_deref())
                    .await;
                (reply, false)
            }
        };

        // A failed send degrades the outcome but never the request: the
        // webhook transport re-delivers on 5xx and would double-log.
        let message_sid = match self.gateway.send(&user.phone, &reply).await {
            Ok(sid) => {
                self.store
                    .log_message(user.id, MessageDirection::Outbound, &reply)
                    .await?;
                tracing::info!(sid = %sid, "Response sent");
                Some(sid)
            }
            Err(err) => {
                tracing::warn!(error = %err, "Failed to send response");
                None
            }
        };

        Ok(PipelineOutcome {
            reply,
            message_sid,
            checkin_recorded,
        })
    }

    /// Two-phase write: the raw check-in lands before plan generation starts,
    /// so a generation failure can't lose the self-report. Each phase is a
    /// field-merge upsert on the same (user, day) record.
    async fn record_checkin(&self, user: &User, checkin: &MorningCheckin) -> AppResult<String> {
        let today = self.today();
        let morning = serde_json::to_value(checkin).map_err(anyhow::Error::from)?;

        self.store
            .upsert_daily_log(
                user.id,
                today,
                DailyLogPatch {
                    morning: Some(morning),
                    ..Default::default()
                },
            )
            .await?;

        let plan = self.coach.daily_plan(checkin, user.name.as_deref()).await;

        self.store
            .upsert_daily_log(
                user.id,
                today,
                DailyLogPatch {
                    plan_text: Some(plan.clone()),
                    ..Default::default()
                },
            )
            .await?;

        Ok(plan)
    }

    /// Calendar-date bucket for "today". Always the UTC day, even though
    /// users carry a timezone column: switching to per-user bucketing would
    /// re-key existing rows and needs a product call first.
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

pub fn compose_plan_reply(plan: &str) -> String {
    format!("{}{}", PLAN_GREETING, plan)
}

pub async fn receive_whatsapp(
    State(state): State<AppState>,
    Form(payload): Form<HashMap<String, String>>,
) -> AppResult<Json<Value>> {
    let outcome = state.pipeline.handle(&payload).await?;

    tracing::info!(
        checkin = outcome.checkin_recorded,
        delivered = outcome.message_sid.is_some(),
        reply_len = outcome.reply.len(),
        "Webhook processed"
    );

    Ok(Json(json!({
        "status": "success",
        "message_sid": outcome.message_sid,
    })))
}

pub async fn webhook_status() -> Json<Value> {
    Json(json!({ "status": "WhatsApp webhook endpoint is active" }))
}
