use std::sync::Arc;

use crate::models::checkin::MorningCheckin;
use crate::services::claude::TextGenerator;

const PLAN_SYSTEM_PROMPT: &str = "\
You are a supportive, direct life coach. Your role is to help users create actionable daily plans \
based on their morning check-ins.

Key principles:
- Be encouraging but realistic
- Provide specific, actionable advice
- Consider their sleep, mood, and energy levels
- Keep responses concise but comprehensive
- End with a motivational line

Format your response as a daily plan with:
1. 3 priorities (specific tasks)
2. 2 wellness activities (health/wellbeing focused)
3. 1 motivational line

Be direct and supportive in your tone.";

const GENERAL_SYSTEM_PROMPT: &str = "\
You are a supportive, direct life coach. Respond to user messages with helpful, encouraging \
advice. Keep responses concise and actionable. If the user hasn't provided a morning check-in, \
gently remind them about the format.";

pub const PLAN_FALLBACK: &str =
    "I'm having trouble generating your daily plan right now. Please try again later.";

pub const GENERAL_FALLBACK: &str = "I'm here to help! Please send me your morning check-in in \
this format: Sleep __h | Mood __ | Energy __ | Notes: __";

/// Coach persona over the text-generation seam. Both methods always return
/// non-empty text: provider failures degrade to fixed fallback strings.
pub struct DailyCoach {
    llm: Arc<dyn TextGenerator>,
}

impl DailyCoach {
    pub fn new(llm: Arc<dyn TextGenerator>) -> Self {
        Self { llm }
    }

    /// Plan text for a validated check-in. The 3/2/1 structure is requested
    /// of the generator, not enforced on its output.
    pub async fn daily_plan(&self, checkin: &MorningCheckin, user_name: Option<&str>) -> String {
        let user_prompt = format!(
            "Based on this morning check-in, create a personalized daily plan:\n\n\
             Sleep: {}\n\
             Mood: {}\n\
             Energy: {}\n\
             Notes: {}\n\n\
             {}\
             Please provide a daily plan with 3 priorities, 2 wellness activities, and 1 motivational line.",
            hours_or_unreported(checkin.sleep_hours),
            scale_or_unreported(checkin.mood),
            scale_or_unreported(checkin.energy),
            checkin.notes,
            name_line(user_name),
        );

        self.complete_or(PLAN_SYSTEM_PROMPT, &user_prompt, 500, PLAN_FALLBACK)
            .await
    }

    /// Conversational reply for anything that wasn't a check-in.
    pub async fn general_reply(&self, message: &str, user_name: Option<&str>) -> String {
        let user_prompt = format!(
            "User message: {}\n\n\
             {}\
             Respond as their supportive coach. If this isn't a morning check-in, remind them \
             about the format: \"Sleep __h | Mood __ | Energy __ | Notes: __\"",
            message,
            name_line(user_name),
        );

        self.complete_or(GENERAL_SYSTEM_PROMPT, &user_prompt, 300, GENERAL_FALLBACK)
            .await
    }

    async fn complete_or(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        max_tokens: u32,
        fallback: &str,
    ) -> String {
        match self.llm.complete(system_prompt, user_prompt, max_tokens, 0.7).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => fallback.to_string(),
            Err(err) => {
                tracing::warn!(error = %err, "Generation unavailable, using fallback");
                fallback.to_string()
            }
        }
    }
}

fn name_line(user_name: Option<&str>) -> String {
    user_name
        .map(|name| format!("User's name: {}\n\n", name))
        .unwrap_or_default()
}

fn hours_or_unreported(value: Option<f64>) -> String {
    value
        .map(|v| format!("{} hours", v))
        .unwrap_or_else(|| "not reported".into())
}

fn scale_or_unreported(value: Option<i32>) -> String {
    value
        .map(|v| format!("{}/10", v))
        .unwrap_or_else(|| "not reported".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    struct FailingGenerator;

    #[async_trait]
    impl TextGenerator for FailingGenerator {
        async fn complete(
            &self,
            _system_prompt: &str,
            _user_prompt: &str,
            _max_tokens: u32,
            _temperature: f32,
        ) -> anyhow::Result<String> {
            anyhow::bail!("provider unavailable")
        }
    }

    struct CapturingGenerator {
        prompts: Mutex<Vec<String>>,
        response: &'static str,
    }

    #[async_trait]
    impl TextGenerator for CapturingGenerator {
        async fn complete(
            &self,
            _system_prompt: &str,
            user_prompt: &str,
            _max_tokens: u32,
            _temperature: f32,
        ) -> anyhow::Result<String> {
            self.prompts.lock().await.push(user_prompt.to_string());
            Ok(self.response.to_string())
        }
    }

    fn checkin() -> MorningCheckin {
        MorningCheckin {
            sleep_hours: Some(6.5),
            mood: None,
            energy: Some(4),
            notes: "rough night".into(),
        }
    }

    #[tokio::test]
    async fn test_plan_degrades_to_fallback_on_provider_failure() {
        let coach = DailyCoach::new(Arc::new(FailingGenerator));
        let plan = coach.daily_plan(&checkin(), Some("Alex")).await;
        assert_eq!(plan, PLAN_FALLBACK);

        let reply = coach.general_reply("hey", None).await;
        assert_eq!(reply, GENERAL_FALLBACK);
    }

    #[tokio::test]
    async fn test_blank_completion_falls_back() {
        let generator = Arc::new(CapturingGenerator {
            prompts: Mutex::new(Vec::new()),
            response: "   ",
        });
        let coach = DailyCoach::new(generator);
        let plan = coach.daily_plan(&checkin(), None).await;
        assert_eq!(plan, PLAN_FALLBACK);
    }

    #[tokio::test]
    async fn test_plan_prompt_renders_missing_fields_as_unreported() {
        let generator = Arc::new(CapturingGenerator {
            prompts: Mutex::new(Vec::new()),
            response: "1. Ship the report",
        });
        let coach = DailyCoach::new(generator.clone());

        let plan = coach.daily_plan(&checkin(), Some("Alex")).await;
        assert_eq!(plan, "1. Ship the report");

        let prompts = generator.prompts.lock().await;
        let prompt = &prompts[0];
        assert!(prompt.contains("Sleep: 6.5 hours"));
        assert!(prompt.contains("Mood: not reported"));
        assert!(prompt.contains("Energy: 4/10"));
        assert!(prompt.contains("Notes: rough night"));
        assert!(prompt.contains("User's name: Alex"));
    }
}
