use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;

use crate::models::checkin::MorningCheckin;
use crate::services::claude::TextGenerator;

const EXTRACTION_SYSTEM_PROMPT: &str = "\
You extract structured data from short, informal morning check-ins.

Return ONLY strict JSON (no markdown, no prose) with keys: \"sleep\" (number in hours, e.g., 6.5), \
\"mood\" (integer 1-10), \"energy\" (integer 1-10), and \"notes\" (string with remaining info). \
If a field is not mentioned, use null for that field. Keep notes concise.";

/// One extraction strategy. Strategies never fail loudly; a miss is `None`.
#[async_trait]
pub trait CheckinExtractor: Send + Sync {
    async fn extract(&self, message: &str) -> Option<MorningCheckin>;
}

/// Ordered strategies, short-circuiting on the first hit.
pub struct ExtractorChain {
    extractors: Vec<Box<dyn CheckinExtractor>>,
}

impl ExtractorChain {
    pub fn new(extractors: Vec<Box<dyn CheckinExtractor>>) -> Self {
        Self { extractors }
    }

    pub async fn extract(&self, message: &str) -> Option<MorningCheckin> {
        for extractor in &self.extractors {
            if let Some(checkin) = extractor.extract(message).await {
                return Some(checkin);
            }
        }
        None
    }
}

/// Deterministic matcher for the fixed template
/// `Sleep <number>[h] | Mood <int> | Energy <int> | Notes: <rest>`.
///
/// Anchored: reordered fields or leading chatter are a miss, not a partial
/// record.
pub struct StrictCheckinParser;

fn checkin_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?is)\A\s*sleep\s+(\d+(?:\.\d+)?)h?\s*\|\s*mood\s+(\d+)\s*\|\s*energy\s+(\d+)\s*\|\s*notes:\s*(.+)\z",
        )
        .expect("check-in pattern must compile")
    })
}

#[async_trait]
impl CheckinExtractor for StrictCheckinParser {
    async fn extract(&self, message: &str) -> Option<MorningCheckin> {
        let caps = checkin_pattern().captures(message)?;
        let sleep = caps[1].parse::<f64>().ok()?;
        let mood = caps[2].parse::<i32>().ok()?;
        let energy = caps[3].parse::<i32>().ok()?;

        Some(MorningCheckin {
            sleep_hours: Some(sleep),
            mood: Some(mood),
            energy: Some(energy),
            notes: caps[4].trim().to_string(),
        })
    }
}

/// AI-assisted fallback for free-form check-ins. Everything that can go
/// wrong with the provider or its output degrades to `None`; the pipeline
/// treats that as "not a check-in".
pub struct FlexibleCheckinExtractor {
    llm: Arc<dyn TextGenerator>,
}

impl FlexibleCheckinExtractor {
    pub fn new(llm: Arc<dyn TextGenerator>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl CheckinExtractor for FlexibleCheckinExtractor {
    async fn extract(&self, message: &str) -> Option<MorningCheckin> {
        let user_prompt = format!("Parse this check-in: {}", message);
        let raw = match self
            .llm
            .complete(EXTRACTION_SYSTEM_PROMPT, &user_prompt, 120, 0.0)
            .await
        {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(error = %err, "Check-in extraction call failed");
                return None;
            }
        };

        parse_flexible_output(&raw)
    }
}

/// Output contract for the generative result: isolate the first
/// brace-balanced JSON object, coerce field types, and accept only if at
/// least one numeric field or a non-empty note survived.
fn parse_flexible_output(raw: &str) -> Option<MorningCheckin> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let data: serde_json::Value = serde_json::from_str(first_json_object(raw)?).ok()?;

    let sleep_hours = data.get("sleep").and_then(|v| v.as_f64());
    let mood = data
        .get("mood")
        .and_then(|v| v.as_f64())
        .map(|v| v.round() as i32);
    let energy = data
        .get("energy")
        .and_then(|v| v.as_f64())
        .map(|v| v.round() as i32);
    let notes = data
        .get("notes")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .trim()
        .to_string();

    let has_numeric = sleep_hours.is_some() || mood.is_some() || energy.is_some();
    if !has_numeric && notes.is_empty() {
        return None;
    }

    Some(MorningCheckin {
        sleep_hours,
        mood,
        energy,
        notes,
    })
}

/// First brace-balanced `{...}` substring. String- and escape-aware, so
/// braces inside JSON string values don't unbalance the scan even when the
/// model wraps its answer in prose or a markdown fence.
fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in text.as_bytes().iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }

    None
}
