use chrono::{DateTime, Datelike, FixedOffset, Month, NaiveDate, Offset, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;

use crate::error::LedgerError;
use crate::models::{Intent, MonthQuery};

pub const TOTAL_KEYWORD: &str = "total";
const MAX_OFFSET_MINUTES: i32 = 14 * 60;
/// Range bounds must stay four-digit years so stored timestamps sort as text.
const STORABLE_YEARS: std::ops::RangeInclusive<i32> = 0..=9999;

static AMOUNT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]+(\.[0-9]+)?$").expect("valid regex"));
static MONTH_NAME_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z]+) ([0-9]{4})$").expect("valid regex"));
static PADDED_MONTH_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]{2})/([0-9]{4})$").expect("valid regex"));
static MONTH_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]{1,2})/([0-9]{4})$").expect("valid regex"));
static PADDED_MONTH_DAY_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]{2})/([0-9]{2})/([0-9]{4})$").expect("valid regex"));
static MONTH_DAY_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]{1,2})/([0-9]{1,2})/([0-9]{4})$").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleFamily {
    Keyword,
    Amount,
    Date,
}

#[derive(Debug, Clone, Copy)]
pub struct RuleContext {
    pub reference_year: i32,
    pub offset: FixedOffset,
}

/// One matcher in the classification table. Rules are tried in table order
/// against the trimmed input and the first `Some` wins.
pub struct ClassificationRule {
    pub name: &'static str,
    pub family: RuleFamily,
    matcher: fn(&str, &RuleContext) -> Option<Intent>,
}

impl ClassificationRule {
    pub fn apply(&self, trimmed: &str, ctx: &RuleContext) -> Option<Intent> {
        (self.matcher)(trimmed, ctx)
    }
}

static RULES: [ClassificationRule; 10] = [
    ClassificationRule {
        name: "total_keyword",
        family: RuleFamily::Keyword,
        matcher: match_total,
    },
    ClassificationRule {
        name: "plain_amount",
        family: RuleFamily::Amount,
        matcher: match_amount,
    },
    ClassificationRule {
        name: "long_month_year",
        family: RuleFamily::Date,
        matcher: match_long_month_year,
    },
    ClassificationRule {
        name: "short_month_year",
        family: RuleFamily::Date,
        matcher: match_short_month_year,
    },
    ClassificationRule {
        name: "padded_month_year",
        family: RuleFamily::Date,
        matcher: match_padded_month_year,
    },
    ClassificationRule {
        name: "month_year",
        family: RuleFamily::Date,
        matcher: match_month_year,
    },
    ClassificationRule {
        name: "padded_month_day_year",
        family: RuleFamily::Date,
        matcher: match_padded_month_day_year,
    },
    ClassificationRule {
        name: "month_day_year",
        family: RuleFamily::Date,
        matcher: match_month_day_year,
    },
    ClassificationRule {
        name: "long_month_reference_year",
        family: RuleFamily::Date,
        matcher: match_long_month_reference_year,
    },
    ClassificationRule {
        name: "short_month_reference_year",
        family: RuleFamily::Date,
        matcher: match_short_month_reference_year,
    },
];

pub fn rules() -> &'static [ClassificationRule] {
    &RULES
}

/// Classifies `text` with month boundaries computed in UTC.
pub fn classify(text: &str, reference_year: i32) -> Intent {
    classify_in(text, reference_year, utc_offset())
}

pub fn classify_in(text: &str, reference_year: i32, offset: FixedOffset) -> Intent {
    classify_with_rule(text, reference_year, offset).0
}

/// Like [`classify_in`] but also reports the name of the rule that matched.
pub fn classify_with_rule(
    text: &str,
    reference_year: i32,
    offset: FixedOffset,
) -> (Intent, Option<&'static str>) {
    let ctx = RuleContext {
        reference_year,
        offset,
    };
    let trimmed = text.trim();

    RULES
        .iter()
        .find_map(|rule| rule.apply(trimmed, &ctx).map(|intent| (intent, Some(rule.name))))
        .unwrap_or_else(|| (Intent::invalid(), None))
}

/// Evaluates every rule family and fails if more than one family claims the
/// input. Within a family the first matching rule wins, as in [`classify_in`].
pub fn classify_checked(
    text: &str,
    reference_year: i32,
    offset: FixedOffset,
) -> Result<(Intent, Option<&'static str>), LedgerError> {
    let ctx = RuleContext {
        reference_year,
        offset,
    };
    let trimmed = text.trim();
    let mut hits: Vec<(&ClassificationRule, Intent)> = Vec::new();

    for rule in RULES.iter() {
        if hits.iter().any(|(hit, _)| hit.family == rule.family) {
            continue;
        }
        if let Some(intent) = rule.apply(trimmed, &ctx) {
            hits.push((rule, intent));
        }
    }

    if hits.len() > 1 {
        let names = hits.iter().map(|(rule, _)| rule.name).collect::<Vec<_>>();
        return Err(LedgerError::ClassificationAmbiguity(format!(
            "{:?} matched rules {}",
            trimmed,
            names.join(", ")
        )));
    }

    Ok(hits
        .pop()
        .map(|(rule, intent)| (intent, Some(rule.name)))
        .unwrap_or_else(|| (Intent::invalid(), None)))
}

/// Resolves a calendar month into a half-open interval starting at local
/// midnight on the 1st and ending at local midnight on the 1st of the next
/// month, both expressed in UTC.
pub fn month_query(year: i32, month: u32, offset: FixedOffset) -> Option<MonthQuery> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year.checked_add(1)?, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };

    let start_inclusive = local_midnight(first, offset)?;
    let end_exclusive = local_midnight(next, offset)?;
    if !STORABLE_YEARS.contains(&start_inclusive.year())
        || !STORABLE_YEARS.contains(&end_exclusive.year())
    {
        return None;
    }

    Some(MonthQuery {
        year,
        month,
        start_inclusive,
        end_exclusive,
        display_label: first.format("%B %Y").to_string(),
    })
}

pub fn utc_offset() -> FixedOffset {
    Utc.fix()
}

/// Fixed offset east of UTC, clamped to the ±14h range real zones use.
pub fn offset_from_minutes(minutes: i32) -> FixedOffset {
    let minutes = minutes.clamp(-MAX_OFFSET_MINUTES, MAX_OFFSET_MINUTES);
    FixedOffset::east_opt(minutes * 60).unwrap_or_else(utc_offset)
}

fn local_midnight(date: NaiveDate, offset: FixedOffset) -> Option<DateTime<Utc>> {
    offset
        .from_local_datetime(&date.and_hms_opt(0, 0, 0)?)
        .single()
        .map(|at| at.with_timezone(&Utc))
}

fn match_total(trimmed: &str, _ctx: &RuleContext) -> Option<Intent> {
    trimmed
        .eq_ignore_ascii_case(TOTAL_KEYWORD)
        .then_some(Intent::Total)
}

fn match_amount(trimmed: &str, _ctx: &RuleContext) -> Option<Intent> {
    if !AMOUNT.is_match(trimmed) {
        return None;
    }
    // Anything Decimal cannot hold without rounding falls through to Invalid.
    let amount = Decimal::from_str_exact(trimmed).ok()?;
    Some(Intent::CashEntry { amount })
}

#[derive(Clone, Copy)]
enum NameForm {
    Long,
    Short,
}

fn month_from_name(name: &str, form: NameForm) -> Option<u32> {
    let mut month = Month::January;
    for _ in 0..12 {
        let full = month.name();
        let candidate = match form {
            NameForm::Long => full,
            NameForm::Short => &full[..3],
        };
        if candidate.eq_ignore_ascii_case(name) {
            return Some(month.number_from_month());
        }
        month = month.succ();
    }
    None
}

fn parse_year(digits: &str) -> Option<i32> {
    digits.parse().ok()
}

fn named_month(trimmed: &str, form: NameForm, ctx: &RuleContext) -> Option<Intent> {
    let caps = MONTH_NAME_YEAR.captures(trimmed)?;
    let month = month_from_name(&caps[1], form)?;
    let year = parse_year(&caps[2])?;
    month_query(year, month, ctx.offset).map(Intent::MonthQuery)
}

fn numeric_month(re: &Regex, trimmed: &str, ctx: &RuleContext) -> Option<Intent> {
    let caps = re.captures(trimmed)?;
    let month = caps[1].parse::<u32>().ok()?;
    let year = parse_year(&caps[2])?;
    month_query(year, month, ctx.offset).map(Intent::MonthQuery)
}

fn numeric_date(re: &Regex, trimmed: &str, ctx: &RuleContext) -> Option<Intent> {
    let caps = re.captures(trimmed)?;
    let month = caps[1].parse::<u32>().ok()?;
    let day = caps[2].parse::<u32>().ok()?;
    let year = parse_year(&caps[3])?;
    // The day only has to exist; the query covers the whole month.
    NaiveDate::from_ymd_opt(year, month, day)?;
    month_query(year, month, ctx.offset).map(Intent::MonthQuery)
}

fn match_long_month_year(trimmed: &str, ctx: &RuleContext) -> Option<Intent> {
    named_month(trimmed, NameForm::Long, ctx)
}

fn match_short_month_year(trimmed: &str, ctx: &RuleContext) -> Option<Intent> {
    named_month(trimmed, NameForm::Short, ctx)
}

fn match_padded_month_year(trimmed: &str, ctx: &RuleContext) -> Option<Intent> {
    numeric_month(&PADDED_MONTH_YEAR, trimmed, ctx)
}

fn match_month_year(trimmed: &str, ctx: &RuleContext) -> Option<Intent> {
    numeric_month(&MONTH_YEAR, trimmed, ctx)
}

fn match_padded_month_day_year(trimmed: &str, ctx: &RuleContext) -> Option<Intent> {
    numeric_date(&PADDED_MONTH_DAY_YEAR, trimmed, ctx)
}

fn match_month_day_year(trimmed: &str, ctx: &RuleContext) -> Option<Intent> {
    numeric_date(&MONTH_DAY_YEAR, trimmed, ctx)
}

fn with_reference_year(trimmed: &str, ctx: &RuleContext) -> String {
    format!("{} {}", trimmed, ctx.reference_year)
}

fn match_long_month_reference_year(trimmed: &str, ctx: &RuleContext) -> Option<Intent> {
    named_month(&with_reference_year(trimmed, ctx), NameForm::Long, ctx)
}

fn match_short_month_reference_year(trimmed: &str, ctx: &RuleContext) -> Option<Intent> {
    named_month(&with_reference_year(trimmed, ctx), NameForm::Short, ctx)
}
