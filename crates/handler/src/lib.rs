use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Datelike, FixedOffset, Utc};
use futures::FutureExt;
use ledger_core::reply;
use ledger_core::{classify_checked, InboundMessage, Intent, LedgerError, MessageId, SumFilter};
use ledger_messaging::MessageSender;
use ledger_observability::AppMetrics;
use ledger_storage::CashLedger;
use tracing::{debug, error, info, instrument};

/// Turns inbound texts into ledger operations and reply texts, and sends the
/// daily prompt.
#[derive(Clone)]
pub struct LedgerHandler<S, M>
where
    S: CashLedger,
    M: MessageSender,
{
    store: Arc<S>,
    messenger: Arc<M>,
    metrics: Arc<AppMetrics>,
    offset: FixedOffset,
}

impl<S, M> LedgerHandler<S, M>
where
    S: CashLedger,
    M: MessageSender,
{
    pub fn new(
        store: Arc<S>,
        messenger: Arc<M>,
        metrics: Arc<AppMetrics>,
        offset: FixedOffset,
    ) -> Self {
        Self {
            store,
            messenger,
            metrics,
            offset,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn messenger(&self) -> &Arc<M> {
        &self.messenger
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub async fn handle_message(&self, message: InboundMessage) -> String {
        self.handle_message_at(message, Utc::now()).await
    }

    /// Always yields exactly one reply. Storage failures and panics are
    /// logged and mapped to the fixed error replies.
    #[instrument(skip(self, message, now), fields(sender = %message.sender))]
    pub async fn handle_message_at(&self, message: InboundMessage, now: DateTime<Utc>) -> String {
        let started = Instant::now();
        self.metrics.inc_message();
        debug!(body = %message.body, "inbound message");

        let reference_year = now.with_timezone(&self.offset).year();
        let outcome = AssertUnwindSafe(self.dispatch(&message, reference_year))
            .catch_unwind()
            .await;

        let reply = match outcome {
            Ok(Ok(reply)) => reply,
            Ok(Err(err)) => self.unexpected_failure(err),
            Err(panic) => self.unexpected_failure(LedgerError::Unhandled(panic_message(&*panic))),
        };

        self.metrics.observe_latency(started.elapsed());
        reply
    }

    async fn dispatch(
        &self,
        message: &InboundMessage,
        reference_year: i32,
    ) -> Result<String, LedgerError> {
        let (intent, rule) = classify_checked(&message.body, reference_year, self.offset)?;
        info!(
            intent = intent.as_code(),
            rule = rule.unwrap_or("none"),
            reference_year,
            "message classified"
        );

        let reply = match intent {
            Intent::Total => match self.store.sum_amounts(SumFilter::All).await {
                Ok(sum) => {
                    self.metrics.inc_total_query();
                    reply::total_reply(sum)
                }
                Err(err) => self.persistence_failure(err, reply::TOTAL_ERROR),
            },
            Intent::CashEntry { amount } => {
                match self.store.insert_cash_entry(&message.sender, amount).await {
                    Ok(entry) => {
                        self.metrics.inc_entry_recorded();
                        info!(entry_id = %entry.id, amount = %entry.amount, "cash entry recorded");
                        reply::ENTRY_RECORDED.to_string()
                    }
                    Err(err) => self.persistence_failure(err, reply::RECORD_ERROR),
                }
            }
            Intent::MonthQuery(query) => {
                match self.store.sum_amounts(SumFilter::for_month(&query)).await {
                    Ok(sum) => {
                        self.metrics.inc_month_query();
                        reply::month_total_reply(&query.display_label, sum)
                    }
                    Err(err) => self.persistence_failure(err, reply::MONTH_TOTAL_ERROR),
                }
            }
            Intent::Invalid { reason } => {
                self.metrics.inc_invalid_input();
                info!(reason = %reason, "message not understood");
                reply::INVALID_INPUT.to_string()
            }
        };

        Ok(reply)
    }

    fn persistence_failure(&self, err: anyhow::Error, reply: &'static str) -> String {
        let err = LedgerError::persistence(err);
        self.metrics.inc_failure(err.as_code());
        error!(error = %err, "ledger storage call failed");
        reply.to_string()
    }

    fn unexpected_failure(&self, err: LedgerError) -> String {
        self.metrics.inc_failure(err.as_code());
        error!(error = %err, kind = err.as_code(), "message handling failed");
        reply::GENERIC_ERROR.to_string()
    }

    /// Sends the fixed daily prompt. Failures are returned to the caller,
    /// which owns reporting them.
    #[instrument(skip(self))]
    pub async fn send_daily_prompt(&self, to: &str) -> Result<MessageId, LedgerError> {
        let to = to.trim();
        if to.is_empty() {
            return Err(LedgerError::Messaging(
                "no destination for the daily prompt".to_string(),
            ));
        }

        match self.messenger.send_message(to, reply::DAILY_PROMPT).await {
            Ok(id) => {
                self.metrics.inc_prompt_sent();
                info!(message_id = %id, "daily prompt sent");
                Ok(id)
            }
            Err(err) => {
                let err = LedgerError::messaging(err);
                self.metrics.inc_failure(err.as_code());
                error!(error = %err, "daily prompt failed");
                Err(err)
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
