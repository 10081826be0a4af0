//! User-facing reply texts. These strings are matched verbatim by callers and
//! integration tests, so change them only together with their consumers.

use rust_decimal::{Decimal, RoundingStrategy};

pub const ENTRY_RECORDED: &str = "Your cash entry has been recorded.";
pub const RECORD_ERROR: &str =
    "Sorry, there was an error recording your cash entry. Please try again.";
pub const TOTAL_ERROR: &str = "Sorry, there was an error retrieving the total cash collected.";
pub const MONTH_TOTAL_ERROR: &str = "Sorry, there was an error retrieving the monthly total.";
pub const GENERIC_ERROR: &str = "Sorry, something went wrong. Please try again later.";
pub const INVALID_INPUT: &str = "Sorry, I didn't understand that. Send a cash amount (e.g. 45 or 45.50), \"total\" for the overall total, or a month (e.g. March 2023, Mar 2023, 03/2023 or 03/15/2023) for a monthly total.";
pub const DAILY_PROMPT: &str =
    "How much cash did you collect today? Reply with the amount (e.g. 45.50).";

pub fn total_reply(sum: Decimal) -> String {
    format!("Total cash collected: ${}", dollars(sum))
}

pub fn month_total_reply(display_label: &str, sum: Decimal) -> String {
    format!("Total cash for {}: ${}", display_label, dollars(sum))
}

/// Two decimal places, half away from zero.
pub fn dollars(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    format!("{:.2}", rounded)
}
