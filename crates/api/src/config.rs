use std::env;

use chrono::FixedOffset;
use ledger_messaging::TwilioConfig;

const DEFAULT_BIND: &str = "0.0.0.0:8080";
const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024;

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub bind: String,
    pub database_url: Option<String>,
    pub utc_offset: FixedOffset,
    pub prompt_to: Option<String>,
    pub twilio: Option<TwilioConfig>,
    pub max_body_bytes: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            database_url: None,
            utc_offset: ledger_core::utc_offset(),
            prompt_to: None,
            twilio: None,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl LedgerConfig {
    pub fn from_env() -> Self {
        let bind = env::var("LEDGER_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
        let database_url = non_empty_var("LEDGER_DATABASE_URL");
        let utc_offset = ledger_core::offset_from_minutes(
            env::var("LEDGER_UTC_OFFSET_MINUTES")
                .ok()
                .and_then(|value| value.trim().parse::<i32>().ok())
                .unwrap_or(0),
        );
        let prompt_to = non_empty_var("LEDGER_PROMPT_TO");
        let max_body_bytes = env::var("LEDGER_MAX_BODY_BYTES")
            .ok()
            .and_then(|value| value.trim().parse::<usize>().ok())
            .unwrap_or(DEFAULT_MAX_BODY_BYTES);

        Self {
            bind,
            database_url,
            utc_offset,
            prompt_to,
            twilio: twilio_config_from_env(),
            max_body_bytes,
        }
    }
}

fn twilio_config_from_env() -> Option<TwilioConfig> {
    let account_sid = non_empty_var("TWILIO_ACCOUNT_SID")?;
    let auth_token = non_empty_var("TWILIO_AUTH_TOKEN")?;
    let from_number = non_empty_var("TWILIO_FROM_NUMBER")?;
    let mut config = TwilioConfig::new(account_sid, auth_token, from_number);
    if let Some(api_base) = non_empty_var("TWILIO_API_BASE") {
        config.api_base = api_base;
    }
    Some(config)
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
