use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceCell<()> = OnceCell::new();

#[derive(Debug, Default)]
pub struct AppMetrics {
    messages_total: AtomicU64,
    entries_recorded_total: AtomicU64,
    total_queries_total: AtomicU64,
    month_queries_total: AtomicU64,
    invalid_inputs_total: AtomicU64,
    failures_total: AtomicU64,
    prompts_sent_total: AtomicU64,
    total_latency_millis: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub messages_total: u64,
    pub entries_recorded_total: u64,
    pub total_queries_total: u64,
    pub month_queries_total: u64,
    pub invalid_inputs_total: u64,
    pub failures_total: u64,
    pub prompts_sent_total: u64,
    pub avg_latency_millis: f64,
}

impl AppMetrics {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_message(&self) {
        self.messages_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("ledger_messages_total").increment(1);
    }

    pub fn inc_entry_recorded(&self) {
        self.entries_recorded_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("ledger_entries_recorded_total").increment(1);
    }

    pub fn inc_total_query(&self) {
        self.total_queries_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("ledger_total_queries_total").increment(1);
    }

    pub fn inc_month_query(&self) {
        self.month_queries_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("ledger_month_queries_total").increment(1);
    }

    pub fn inc_invalid_input(&self) {
        self.invalid_inputs_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("ledger_invalid_inputs_total").increment(1);
    }

    pub fn inc_failure(&self, kind: &'static str) {
        self.failures_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("ledger_failures_total", "kind" => kind).increment(1);
    }

    pub fn inc_prompt_sent(&self) {
        self.prompts_sent_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("ledger_prompts_sent_total").increment(1);
    }

    pub fn observe_latency(&self, duration: Duration) {
        self.total_latency_millis
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let messages = self.messages_total.load(Ordering::Relaxed);
        let latency = self.total_latency_millis.load(Ordering::Relaxed);

        MetricsSnapshot {
            messages_total: messages,
            entries_recorded_total: self.entries_recorded_total.load(Ordering::Relaxed),
            total_queries_total: self.total_queries_total.load(Ordering::Relaxed),
            month_queries_total: self.month_queries_total.load(Ordering::Relaxed),
            invalid_inputs_total: self.invalid_inputs_total.load(Ordering::Relaxed),
            failures_total: self.failures_total.load(Ordering::Relaxed),
            prompts_sent_total: self.prompts_sent_total.load(Ordering::Relaxed),
            avg_latency_millis: if messages == 0 {
                0.0
            } else {
                latency as f64 / messages as f64
            },
        }
    }
}

pub fn init_tracing(service_name: &str) {
    TRACING_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}=info,ledger_handler=info,ledger_api=info,ledger_messaging=info",
                service_name
            ))
        });

        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .with_span_list(true)
            .init();
    });
}
