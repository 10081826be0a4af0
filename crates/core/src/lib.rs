pub mod error;
pub mod intent;
pub mod models;
pub mod reply;

pub use error::LedgerError;
pub use intent::{
    classify, classify_checked, classify_in, classify_with_rule, month_query, offset_from_minutes,
    utc_offset,
};
pub use models::*;
