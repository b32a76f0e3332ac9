//! Condition evaluation for string and date fields.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::rules::field::MessageView;
use crate::rules::model::{Condition, DatePredicate, StringPredicate};

impl Condition {
    /// Evaluate against a message, relative to `now` for date conditions.
    ///
    /// A field the message does not carry never matches.
    pub fn evaluate(&self, view: &MessageView<'_>, now: DateTime<Utc>) -> bool {
        let Some(raw) = view.extract(self.field()) else {
            return false;
        };

        match self {
            Self::Text {
                predicate, value, ..
            } => compare_text(*predicate, &raw, value),
            Self::Age {
                predicate,
                amount,
                unit,
            } => {
                let Some(received) = parse_message_date(&raw) else {
                    debug!(message_id = view.id(), date = %raw, "Unparseable message date");
                    return false;
                };
                let Some(compare_point) = unit
                    .window(*amount)
                    .and_then(|window| now.checked_sub_signed(window))
                else {
                    return false;
                };
                match predicate {
                    DatePredicate::LessThan => received > compare_point,
                    DatePredicate::GreaterThan => received < compare_point,
                }
            }
        }
    }

    /// Evaluate relative to the current time.
    pub fn evaluate_now(&self, view: &MessageView<'_>) -> bool {
        self.evaluate(view, Utc::now())
    }
}

fn compare_text(predicate: StringPredicate, field_value: &str, value: &str) -> bool {
    let field_value = field_value.to_lowercase();
    let value = value.to_lowercase();
    match predicate {
        StringPredicate::Contains => field_value.contains(&value),
        StringPredicate::NotContains => !field_value.contains(&value),
        StringPredicate::Equals => field_value == value,
        StringPredicate::NotEquals => field_value != value,
    }
}

/// Parse a provider date into an instant.
///
/// Accepts an RFC 2822 header (`Tue, 23 Jul 2024 10:00:00 +0000`, with or
/// without a trailing `(UTC)` comment) or an epoch-milliseconds string.
pub fn parse_message_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if raw.bytes().all(|b| b.is_ascii_digit()) {
        let millis: i64 = raw.parse().ok()?;
        return DateTime::from_timestamp_millis(millis);
    }

    let header = match raw.rfind('(') {
        Some(idx) if raw.ends_with(')') => raw[..idx].trim_end(),
        _ => raw,
    };
    DateTime::parse_from_rfc2822(header)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
