use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{Datelike, TimeZone, Utc};
use ledger_api::{build_app, build_router, ApiState, LedgerConfig};
use ledger_core::reply;
use ledger_messaging::{Messenger, OutboxMessenger};
use ledger_storage::{MemoryStore, SqliteStore, Store};
use rust_decimal::Decimal;
use serde_json::json;
use tower::ServiceExt;

struct Harness {
    app: Router,
    store: MemoryStore,
    outbox: OutboxMessenger,
}

fn harness(config: LedgerConfig) -> Harness {
    harness_with(config, OutboxMessenger::new())
}

fn harness_with(config: LedgerConfig, outbox: OutboxMessenger) -> Harness {
    let store = MemoryStore::new();
    let state = ApiState::new(
        Store::Memory(store.clone()),
        Messenger::Outbox(outbox.clone()),
        &config,
    );

    Harness {
        app: build_router(state),
        store,
        outbox,
    }
}

fn sms(body: &str, from: &str) -> Request<Body> {
    let form = format!(
        "Body={}&From={}",
        body.replace(' ', "+").replace('/', "%2F"),
        from.replace('+', "%2B")
    );
    Request::builder()
        .method("POST")
        .uri("/sms")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(form))
        .unwrap()
}

fn twiml(text: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response><Message>{}</Message></Response>",
        text
    )
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, String) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn health_reports_backends() {
    let app = build_app(&LedgerConfig::default())
        .await
        .expect("app should build");

    let (status, body) = send(
        &app,
        Request::builder().uri("/health").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(parsed["status"], "ok");
    assert_eq!(parsed["capabilities"]["storage"], "memory");
    assert_eq!(parsed["capabilities"]["messaging"], "outbox");
    assert_eq!(parsed["capabilities"]["daily_prompt_configured"], false);
}

#[tokio::test]
async fn amount_is_recorded_against_sender() {
    let h = harness(LedgerConfig::default());

    let (status, body) = send(&h.app, sms("50", "+15551230000")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, twiml(reply::ENTRY_RECORDED));
    let entries = h.store.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].sender, "+15551230000");
    assert_eq!(entries[0].amount, Decimal::from(50));
}

#[tokio::test]
async fn total_sums_every_entry() {
    let h = harness(LedgerConfig::default());

    send(&h.app, sms("100", "+15551230000")).await;
    send(&h.app, sms("25.5", "+15551239999")).await;
    let (_, body) = send(&h.app, sms("TOTAL", "+15551230000")).await;

    assert_eq!(body, twiml("Total cash collected: $125.50"));
}

#[tokio::test]
async fn month_query_only_counts_that_month() {
    let h = harness(LedgerConfig::default());
    let at = |y, m, d| Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap();
    h.store
        .insert_cash_entry_at("+15551230000", Decimal::new(1000, 2), at(2023, 2, 28))
        .unwrap();
    h.store
        .insert_cash_entry_at("+15551230000", Decimal::new(4025, 2), at(2023, 3, 1))
        .unwrap();
    h.store
        .insert_cash_entry_at("+15551230000", Decimal::new(975, 2), at(2023, 3, 31))
        .unwrap();
    h.store
        .insert_cash_entry_at("+15551230000", Decimal::new(500, 2), at(2023, 4, 1))
        .unwrap();

    for input in ["March 2023", "Mar 2023", "03/2023", "3/2023", "03/15/2023"] {
        let (_, body) = send(&h.app, sms(input, "+15551230000")).await;
        assert_eq!(body, twiml("Total cash for March 2023: $50.00"), "input {input:?}");
    }
}

#[tokio::test]
async fn bare_month_defaults_to_current_year() {
    let h = harness(LedgerConfig::default());
    let before = Utc::now().year();
    let (_, body) = send(&h.app, sms("january", "+15551230000")).await;
    let after = Utc::now().year();

    let replies: Vec<String> = [before, after]
        .iter()
        .map(|year| twiml(&format!("Total cash for January {year}: $0.00")))
        .collect();
    assert!(replies.contains(&body), "unexpected reply {body}");
}

#[tokio::test]
async fn unrecognised_text_gets_guidance() {
    let h = harness(LedgerConfig::default());

    let (status, body) = send(&h.app, sms("hello there", "+15551230000")).await;

    assert_eq!(status, StatusCode::OK);
    let expected = reply::INVALID_INPUT
        .replace('"', "&quot;")
        .replace('\'', "&apos;");
    assert_eq!(body, twiml(&expected));
    assert!(h.store.entries().is_empty());
}

#[tokio::test]
async fn storage_outage_still_replies() {
    // Dropping the table simulates a broken datastore behind a live pool.
    let sqlite = SqliteStore::connect("sqlite::memory:").await.unwrap();
    sqlx::query("DROP TABLE cash_entries")
        .execute(sqlite.pool())
        .await
        .unwrap();
    let state = ApiState::new(
        Store::Sqlite(sqlite),
        Messenger::outbox(),
        &LedgerConfig::default(),
    );
    let app = build_router(state);

    let (status, body) = send(&app, sms("04/2023", "+15551230000")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, twiml(reply::MONTH_TOTAL_ERROR));

    let (_, body) = send(&app, sms("12", "+15551230000")).await;
    assert_eq!(body, twiml(reply::RECORD_ERROR));

    let (_, body) = send(&app, sms("total", "+15551230000")).await;
    assert_eq!(body, twiml(reply::TOTAL_ERROR));
}

#[tokio::test]
async fn daily_prompt_uses_configured_destination() {
    let config = LedgerConfig {
        prompt_to: Some("+15559990000".to_string()),
        ..LedgerConfig::default()
    };
    let h = harness(config);

    let request = Request::builder()
        .method("POST")
        .uri("/v1/prompt/daily")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&h.app, request).await;

    assert_eq!(status, StatusCode::OK);
    let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(parsed["to"], "+15559990000");
    let sent = h.outbox.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].body, reply::DAILY_PROMPT);
    assert_eq!(parsed["message_id"], sent[0].id.0.as_str());
}

#[tokio::test]
async fn daily_prompt_accepts_explicit_destination() {
    let h = harness(LedgerConfig::default());

    let request = Request::builder()
        .method("POST")
        .uri("/v1/prompt/daily")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "to": "+15557770000" }).to_string()))
        .unwrap();
    let (status, _) = send(&h.app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.outbox.sent()[0].to, "+15557770000");
}

#[tokio::test]
async fn daily_prompt_without_destination_is_rejected() {
    let h = harness(LedgerConfig::default());

    let request = Request::builder()
        .method("POST")
        .uri("/v1/prompt/daily")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&h.app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("missing_destination"));
    assert!(h.outbox.sent().is_empty());
}

#[tokio::test]
async fn daily_prompt_delivery_failure_surfaces_as_bad_gateway() {
    let config = LedgerConfig {
        prompt_to: Some("+15559990000".to_string()),
        ..LedgerConfig::default()
    };
    let h = harness_with(config, OutboxMessenger::failing());

    let request = Request::builder()
        .method("POST")
        .uri("/v1/prompt/daily")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&h.app, request).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(parsed["error"], "prompt_failed");
    assert_eq!(parsed["kind"], "messaging");
}
