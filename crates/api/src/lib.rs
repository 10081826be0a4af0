pub mod config;

use std::sync::Arc;

use anyhow::Result;
use axum::extract::rejection::FormRejection;
use axum::extract::{Form, Json, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use ledger_core::{reply, InboundMessage, LedgerError};
use ledger_handler::LedgerHandler;
use ledger_messaging::Messenger;
use ledger_observability::AppMetrics;
use ledger_storage::Store;
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

pub use crate::config::LedgerConfig;

pub type Handler = LedgerHandler<Store, Messenger>;

#[derive(Clone)]
pub struct ApiState {
    pub handler: Arc<Handler>,
    pub metrics: Arc<AppMetrics>,
    pub prompt_to: Option<String>,
    pub max_body_bytes: usize,
}

impl ApiState {
    pub fn new(store: Store, messenger: Messenger, config: &LedgerConfig) -> Self {
        let metrics = AppMetrics::shared();
        let handler = LedgerHandler::new(
            Arc::new(store),
            Arc::new(messenger),
            metrics.clone(),
            config.utc_offset,
        );

        Self {
            handler: Arc::new(handler),
            metrics,
            prompt_to: config.prompt_to.clone(),
            max_body_bytes: config.max_body_bytes,
        }
    }
}

/// Inbound provider callback. Twilio posts capitalised field names.
#[derive(Debug, Clone, Deserialize)]
struct InboundSms {
    #[serde(rename = "Body", default)]
    body: String,
    #[serde(rename = "From", default)]
    from: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct DailyPromptRequest {
    to: Option<String>,
}

#[derive(Debug, Serialize)]
struct DailyPromptResponse {
    message_id: String,
    to: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp_utc: String,
    metrics: ledger_observability::MetricsSnapshot,
    capabilities: HealthCapabilities,
}

#[derive(Debug, Serialize)]
struct HealthCapabilities {
    storage: &'static str,
    messaging: &'static str,
    daily_prompt_configured: bool,
}

pub async fn build_app(config: &LedgerConfig) -> Result<Router> {
    let store = match config.database_url.as_deref() {
        Some(database_url) => Store::sqlite(database_url).await?,
        None => Store::memory(),
    };

    let messenger = match config.twilio.clone() {
        Some(twilio) => Messenger::twilio(twilio)?,
        None => {
            warn!("twilio credentials missing, outbound sms stays in the outbox");
            Messenger::outbox()
        }
    };

    Ok(build_router(ApiState::new(store, messenger, config)))
}

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sms", post(sms_webhook))
        .route("/v1/prompt/daily", post(daily_prompt))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(RequestBodyLimitLayer::new(state.max_body_bytes))
        .with_state(state)
}

async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let payload = HealthResponse {
        status: "ok",
        timestamp_utc: chrono::Utc::now().to_rfc3339(),
        metrics: state.metrics.snapshot(),
        capabilities: HealthCapabilities {
            storage: state.handler.store().backend(),
            messaging: state.handler.messenger().backend(),
            daily_prompt_configured: state.prompt_to.is_some(),
        },
    };
    (StatusCode::OK, Json(payload))
}

async fn sms_webhook(
    State(state): State<ApiState>,
    form: Result<Form<InboundSms>, FormRejection>,
) -> Response {
    let form = match form {
        Ok(Form(form)) => form,
        Err(rejection) => {
            let err = LedgerError::Unhandled(rejection.body_text());
            state.metrics.inc_failure(err.as_code());
            warn!(error = %err, "unreadable sms callback");
            return twiml_message(reply::GENERIC_ERROR);
        }
    };

    let reply = state
        .handler
        .handle_message(InboundMessage {
            sender: form.from,
            body: form.body,
        })
        .await;

    twiml_message(&reply)
}

async fn daily_prompt(State(state): State<ApiState>, body: String) -> Response {
    let request = if body.trim().is_empty() {
        DailyPromptRequest::default()
    } else {
        match serde_json::from_str::<DailyPromptRequest>(&body) {
            Ok(request) => request,
            Err(_) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({
                        "error": "invalid_json",
                        "message": "body must be empty or {\"to\": \"<number>\"}"
                    })),
                )
                    .into_response();
            }
        }
    };

    let Some(to) = request
        .to
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .or_else(|| state.prompt_to.clone())
    else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": "missing_destination",
                "message": "set LEDGER_PROMPT_TO or pass a \"to\" number"
            })),
        )
            .into_response();
    };

    match state.handler.send_daily_prompt(&to).await {
        Ok(message_id) => (
            StatusCode::OK,
            Json(DailyPromptResponse {
                message_id: message_id.0,
                to,
            }),
        )
            .into_response(),
        Err(err) => (
            StatusCode::BAD_GATEWAY,
            Json(serde_json::json!({
                "error": "prompt_failed",
                "kind": err.as_code(),
                "message": err.to_string()
            })),
        )
            .into_response(),
    }
}

fn twiml_message(reply: &str) -> Response {
    let body = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response><Message>{}</Message></Response>",
        xml_escape(reply)
    );

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/xml; charset=utf-8")],
        body,
    )
        .into_response()
}

fn xml_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
