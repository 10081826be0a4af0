use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Datelike, FixedOffset, Utc};
use clap::{Parser, Subcommand};
use ledger_core::{classify_in, offset_from_minutes, InboundMessage};
use ledger_handler::LedgerHandler;
use ledger_messaging::{Messenger, TwilioConfig};
use ledger_observability::{init_tracing, AppMetrics};
use ledger_storage::Store;

#[derive(Debug, Parser)]
#[command(name = "ledger")]
#[command(about = "Cash ledger SMS tools")]
struct Cli {
    #[arg(long, env = "LEDGER_DATABASE_URL")]
    database_url: Option<String>,

    #[arg(
        long,
        env = "LEDGER_UTC_OFFSET_MINUTES",
        default_value_t = 0,
        allow_hyphen_values = true
    )]
    utc_offset_minutes: i32,

    #[arg(long, env = "TWILIO_ACCOUNT_SID", hide_env_values = true)]
    twilio_account_sid: Option<String>,

    #[arg(long, env = "TWILIO_AUTH_TOKEN", hide_env_values = true)]
    twilio_auth_token: Option<String>,

    #[arg(long, env = "TWILIO_FROM_NUMBER")]
    twilio_from_number: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print how a message would be understood, as JSON.
    Classify {
        text: String,
        #[arg(long)]
        year: Option<i32>,
    },
    /// Run one message through the handler and print the reply.
    Message {
        #[arg(long = "from")]
        sender: String,
        body: String,
    },
    /// Send the daily prompt. Exits non-zero when delivery fails.
    SendPrompt {
        #[arg(long, env = "LEDGER_PROMPT_TO")]
        to: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("ledger_cli");
    let cli = Cli::parse();
    let offset = offset_from_minutes(cli.utc_offset_minutes);

    match &cli.command {
        Command::Classify { text, year } => {
            let year = year.unwrap_or_else(|| current_year(offset));
            let intent = classify_in(text, year, offset);
            println!("{}", serde_json::to_string_pretty(&intent)?);
        }
        Command::Message { sender, body } => {
            let handler = build_handler(&cli, offset, Messenger::outbox()).await?;
            let reply = handler
                .handle_message(InboundMessage {
                    sender: sender.clone(),
                    body: body.clone(),
                })
                .await;
            println!("{reply}");
        }
        Command::SendPrompt { to } => {
            let to = to
                .as_deref()
                .context("no destination: pass --to or set LEDGER_PROMPT_TO")?;
            let messenger = Messenger::twilio(twilio_config(&cli)?)?;
            let handler = build_handler(&cli, offset, messenger).await?;
            let message_id = handler.send_daily_prompt(to).await?;
            println!("{message_id}");
        }
    }

    Ok(())
}

fn current_year(offset: FixedOffset) -> i32 {
    Utc::now().with_timezone(&offset).year()
}

fn twilio_config(cli: &Cli) -> Result<TwilioConfig> {
    let missing = "TWILIO_ACCOUNT_SID, TWILIO_AUTH_TOKEN and TWILIO_FROM_NUMBER are required";
    Ok(TwilioConfig::new(
        cli.twilio_account_sid.clone().context(missing)?,
        cli.twilio_auth_token.clone().context(missing)?,
        cli.twilio_from_number.clone().context(missing)?,
    ))
}

async fn build_handler(
    cli: &Cli,
    offset: FixedOffset,
    messenger: Messenger,
) -> Result<LedgerHandler<Store, Messenger>> {
    let store = match cli.database_url.as_deref() {
        Some(database_url) => Store::sqlite(database_url)
            .await
            .with_context(|| format!("failed opening ledger at {}", database_url))?,
        None => Store::memory(),
    };

    Ok(LedgerHandler::new(
        Arc::new(store),
        Arc::new(messenger),
        AppMetrics::shared(),
        offset,
    ))
}
