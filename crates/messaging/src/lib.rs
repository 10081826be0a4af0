use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use ledger_core::MessageId;
use parking_lot::RwLock;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

pub const TWILIO_API_BASE: &str = "https://api.twilio.com";

pub trait MessageSender: Send + Sync {
    async fn send_message(&self, to: &str, body: &str) -> Result<MessageId>;
}

#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
    pub api_base: String,
}

impl TwilioConfig {
    pub fn new(account_sid: String, auth_token: String, from_number: String) -> Self {
        Self {
            account_sid,
            auth_token,
            from_number,
            api_base: TWILIO_API_BASE.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TwilioMessageResponse {
    sid: String,
}

#[derive(Debug, Deserialize)]
struct TwilioErrorResponse {
    code: Option<i64>,
    message: Option<String>,
}

/// Sends SMS through the Twilio Messages REST resource.
#[derive(Debug, Clone)]
pub struct TwilioMessenger {
    client: Client,
    config: TwilioConfig,
}

impl TwilioMessenger {
    pub fn new(config: TwilioConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(6))
            .timeout(Duration::from_secs(20))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self { client, config })
    }

    pub fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.config.api_base.trim_end_matches('/'),
            self.config.account_sid
        )
    }
}

impl MessageSender for TwilioMessenger {
    async fn send_message(&self, to: &str, body: &str) -> Result<MessageId> {
        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&[
                ("To", to),
                ("From", self.config.from_number.as_str()),
                ("Body", body),
            ])
            .send()
            .await
            .context("twilio request failed")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .json::<TwilioErrorResponse>()
                .await
                .ok()
                .map(|err| {
                    format!(
                        "{} (code {})",
                        err.message.unwrap_or_default(),
                        err.code.map(|code| code.to_string()).unwrap_or_default()
                    )
                })
                .unwrap_or_default();
            bail!("twilio rejected message with status {}: {}", status, detail);
        }

        let payload = response
            .json::<TwilioMessageResponse>()
            .await
            .context("failed to parse twilio response")?;

        info!(to = %to, sid = %payload.sid, "sms sent");
        Ok(MessageId(payload.sid))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentMessage {
    pub id: MessageId,
    pub to: String,
    pub body: String,
}

/// Keeps outbound messages in memory instead of delivering them.
#[derive(Debug, Clone, Default)]
pub struct OutboxMessenger {
    sent: Arc<RwLock<Vec<SentMessage>>>,
    failing: bool,
}

impl OutboxMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.read().clone()
    }
}

impl MessageSender for OutboxMessenger {
    async fn send_message(&self, to: &str, body: &str) -> Result<MessageId> {
        if self.failing {
            bail!("outbox is configured to reject messages");
        }

        let id = MessageId(format!("outbox-{}", Uuid::new_v4()));
        warn!(to = %to, id = %id, "no sms provider configured, message kept in outbox");
        self.sent.write().push(SentMessage {
            id: id.clone(),
            to: to.to_string(),
            body: body.to_string(),
        });
        Ok(id)
    }
}

#[derive(Debug, Clone)]
pub enum Messenger {
    Twilio(TwilioMessenger),
    Outbox(OutboxMessenger),
}

impl Messenger {
    pub fn twilio(config: TwilioConfig) -> Result<Self> {
        Ok(Self::Twilio(TwilioMessenger::new(config)?))
    }

    pub fn outbox() -> Self {
        Self::Outbox(OutboxMessenger::new())
    }

    pub fn backend(&self) -> &'static str {
        match self {
            Messenger::Twilio(_) => "twilio",
            Messenger::Outbox(_) => "outbox",
        }
    }
}

impl MessageSender for Messenger {
    async fn send_message(&self, to: &str, body: &str) -> Result<MessageId> {
        match self {
            Messenger::Twilio(messenger) => messenger.send_message(to, body).await,
            Messenger::Outbox(messenger) => messenger.send_message(to, body).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::extract::Form;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::post;
    use axum::{Json, Router};

    use super::*;

    async fn fake_messages(
        headers: HeaderMap,
        Form(form): Form<HashMap<String, String>>,
    ) -> axum::response::Response {
        let authorized = headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .map(|value| value.starts_with("Basic "))
            .unwrap_or(false);
        if !authorized {
            return StatusCode::UNAUTHORIZED.into_response();
        }

        if form.get("To").map(String::as_str) == Some("+15550000") {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "code": 21211,
                    "message": "The 'To' number is not a valid phone number."
                })),
            )
                .into_response();
        }

        assert_eq!(form.get("From").map(String::as_str), Some("+15551234"));
        (
            StatusCode::CREATED,
            Json(serde_json::json!({ "sid": "SM0123", "body": form.get("Body") })),
        )
            .into_response()
    }

    async fn spawn_fake_twilio() -> String {
        let app = Router::new().route(
            "/2010-04-01/Accounts/AC123/Messages.json",
            post(fake_messages),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn messenger(api_base: String) -> TwilioMessenger {
        TwilioMessenger::new(TwilioConfig {
            account_sid: "AC123".to_string(),
            auth_token: "secret".to_string(),
            from_number: "+15551234".to_string(),
            api_base,
        })
        .unwrap()
    }

    #[test]
    fn builds_messages_url_under_account() {
        let messenger = messenger("https://api.twilio.com/".to_string());
        assert_eq!(
            messenger.messages_url(),
            "https://api.twilio.com/2010-04-01/Accounts/AC123/Messages.json"
        );
    }

    #[tokio::test]
    async fn twilio_returns_message_sid() {
        let base = spawn_fake_twilio().await;
        let id = messenger(base)
            .send_message("+15559876", "hello")
            .await
            .unwrap();
        assert_eq!(id, MessageId("SM0123".to_string()));
    }

    #[tokio::test]
    async fn twilio_rejection_is_an_error() {
        let base = spawn_fake_twilio().await;
        let err = messenger(base)
            .send_message("+15550000", "hello")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("400"));
        assert!(err.to_string().contains("21211"));
    }

    #[tokio::test]
    async fn outbox_records_and_fails_on_demand() {
        let outbox = OutboxMessenger::new();
        outbox.send_message("+15559876", "ping").await.unwrap();
        assert_eq!(outbox.sent().len(), 1);
        assert_eq!(outbox.sent()[0].body, "ping");

        let failing = Messenger::Outbox(OutboxMessenger::failing());
        assert!(failing.send_message("+15559876", "ping").await.is_err());
    }
}
