use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const UNRECOGNIZED_INPUT: &str = "unrecognized input";

/// A single recorded dollar amount. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashEntry {
    pub id: Uuid,
    pub sender: String,
    pub amount: Decimal,
    pub recorded_at: DateTime<Utc>,
}

/// Month resolved from user input.
///
/// `month` is 1-based (January = 1). The range is half-open:
/// an entry belongs to the month when
/// `start_inclusive <= recorded_at < end_exclusive`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthQuery {
    pub year: i32,
    pub month: u32,
    pub start_inclusive: DateTime<Utc>,
    pub end_exclusive: DateTime<Utc>,
    pub display_label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Intent {
    Total,
    CashEntry { amount: Decimal },
    MonthQuery(MonthQuery),
    Invalid { reason: String },
}

impl Intent {
    pub fn invalid() -> Self {
        Self::Invalid {
            reason: UNRECOGNIZED_INPUT.to_string(),
        }
    }

    pub fn as_code(&self) -> &'static str {
        match self {
            Self::Total => "total",
            Self::CashEntry { .. } => "cash_entry",
            Self::MonthQuery(_) => "month_query",
            Self::Invalid { .. } => "invalid",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SumFilter {
    All,
    Range {
        start_inclusive: DateTime<Utc>,
        end_exclusive: DateTime<Utc>,
    },
}

impl SumFilter {
    pub fn for_month(query: &MonthQuery) -> Self {
        Self::Range {
            start_inclusive: query.start_inclusive,
            end_exclusive: query.end_exclusive,
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        match self {
            Self::All => true,
            Self::Range {
                start_inclusive,
                end_exclusive,
            } => *start_inclusive <= at && at < *end_exclusive,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub sender: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
