use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;

const SEND_TIMEOUT: Duration = Duration::from_secs(15);

/// Named fields from an inbound Twilio WhatsApp webhook, absent values
/// defaulted to empty strings. The pipeline validates `from`/`body` itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IncomingMessage {
    pub from: String,
    pub body: String,
    pub message_sid: String,
    pub profile_name: String,
    pub wa_id: String,
}

pub fn parse_incoming(payload: &HashMap<String, String>) -> IncomingMessage {
    let field = |name: &str| payload.get(name).cloned().unwrap_or_default();

    IncomingMessage {
        from: field("From"),
        body: field("Body"),
        message_sid: field("MessageSid"),
        profile_name: field("ProfileName"),
        wa_id: field("WaId"),
    }
}

/// Canonical phone form: no `whatsapp:` transport prefix, no whitespace,
/// exactly one leading `+`. Idempotent, so callers can normalize defensively.
pub fn normalize_phone(input: &str) -> String {
    let trimmed = input.trim();
    let without_prefix = trimmed.strip_prefix("whatsapp:").unwrap_or(trimmed);
    let clean: String = without_prefix.chars().filter(|c| !c.is_whitespace()).collect();

    if clean.starts_with('+') {
        clean
    } else {
        format!("+{}", clean)
    }
}

/// Outbound delivery seam.
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    /// Deliver `body` to a user handle, returning the provider message SID.
    async fn send(&self, to: &str, body: &str) -> anyhow::Result<String>;
}

pub struct TwilioGateway {
    client: reqwest::Client,
    account_sid: String,
    auth_token: String,
    whatsapp_number: String,
}

impl TwilioGateway {
    pub fn new(account_sid: String, auth_token: String, whatsapp_number: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            account_sid,
            auth_token,
            whatsapp_number,
        }
    }
}

#[async_trait]
impl MessagingGateway for TwilioGateway {
    async fn send(&self, to: &str, body: &str) -> anyhow::Result<String> {
        let url = format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            self.account_sid
        );
        let to_whatsapp = format!("whatsapp:{}", normalize_phone(to));
        let params = [
            ("From", self.whatsapp_number.as_str()),
            ("To", to_whatsapp.as_str()),
            ("Body", body),
        ];

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            anyhow::bail!("Twilio API error {}: {}", status, detail);
        }

        let payload: serde_json::Value = response.json().await?;
        payload["sid"]
            .as_str()
            .map(str::to_string)
            .context("Twilio response missing message sid")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_incoming_extracts_named_fields() {
        let mut payload = HashMap::new();
        payload.insert("From".to_string(), "whatsapp:+15550100".to_string());
        payload.insert("Body".to_string(), "hello".to_string());
        payload.insert("MessageSid".to_string(), "SM123".to_string());
        payload.insert("ProfileName".to_string(), "Alex".to_string());
        payload.insert("WaId".to_string(), "15550100".to_string());

        let msg = parse_incoming(&payload);
        assert_eq!(msg.from, "whatsapp:+15550100");
        assert_eq!(msg.body, "hello");
        assert_eq!(msg.message_sid, "SM123");
        assert_eq!(msg.profile_name, "Alex");
        assert_eq!(msg.wa_id, "15550100");
    }

    #[test]
    fn test_parse_incoming_defaults_missing_fields() {
        let payload = HashMap::new();
        let msg = parse_incoming(&payload);
        assert_eq!(msg, IncomingMessage::default());
    }

    #[test]
    fn test_normalize_strips_prefix_and_whitespace() {
        assert_eq!(normalize_phone("whatsapp:+1 555 0100"), "+15550100");
        assert_eq!(normalize_phone("+15550100"), "+15550100");
    }

    #[test]
    fn test_normalize_prepends_plus() {
        assert_eq!(normalize_phone("15550100"), "+15550100");
        assert_eq!(normalize_phone("whatsapp:15550100"), "+15550100");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for raw in ["whatsapp:+1 555 0100", "15550100", "  +44 20 7946 0958 "] {
            let once = normalize_phone(raw);
            assert_eq!(normalize_phone(&once), once);
        }
    }
}
