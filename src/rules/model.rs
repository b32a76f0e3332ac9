//! Typed rule model: fields, predicates, conditions, actions.
//!
//! Everything here is validated. Raw rule files are turned into these types
//! by `rules::loader`; nothing downstream ever sees a free-form predicate
//! string.

use std::fmt;
use std::str::FromStr;

use chrono::Duration;
use serde::Serialize;

/// Lowercase and fold spaces/hyphens into underscores, so `"Less than"`,
/// `"less-than"` and `"less_than"` all compare equal.
pub(crate) fn normalize_token(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

/// Logical message attribute a condition inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Sender,
    Subject,
    Recipient,
    Date,
    Body,
}

impl FromStr for Field {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "sender" | "from" => Ok(Self::Sender),
            "subject" => Ok(Self::Subject),
            "recipient" | "to" => Ok(Self::Recipient),
            "date" | "received" | "date_received" => Ok(Self::Date),
            "body" | "message" | "snippet" => Ok(Self::Body),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sender => "sender",
            Self::Subject => "subject",
            Self::Recipient => "recipient",
            Self::Date => "date",
            Self::Body => "body",
        })
    }
}

/// The string-valued subset of [`Field`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TextField {
    Sender,
    Subject,
    Recipient,
    Body,
}

impl From<TextField> for Field {
    fn from(field: TextField) -> Self {
        match field {
            TextField::Sender => Field::Sender,
            TextField::Subject => Field::Subject,
            TextField::Recipient => Field::Recipient,
            TextField::Body => Field::Body,
        }
    }
}

/// Comparison operators for string fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StringPredicate {
    Contains,
    NotContains,
    Equals,
    NotEquals,
}

impl FromStr for StringPredicate {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "contains" => Ok(Self::Contains),
            "not_contains" | "does_not_contain" => Ok(Self::NotContains),
            "equals" | "equal" => Ok(Self::Equals),
            "not_equals" | "not_equal" | "does_not_equal" => Ok(Self::NotEquals),
            _ => Err(()),
        }
    }
}

/// Comparison operators for the date field.
///
/// `LessThan` reads "received less than N units ago" (newer than),
/// `GreaterThan` reads "received more than N units ago" (older than).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DatePredicate {
    LessThan,
    GreaterThan,
}

impl FromStr for DatePredicate {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "less_than" | "newer_than" => Ok(Self::LessThan),
            "greater_than" | "older_than" => Ok(Self::GreaterThan),
            _ => Err(()),
        }
    }
}

/// Unit for date conditions. A month is always 30 days.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgeUnit {
    #[default]
    Days,
    Months,
}

/// Longest age window a date condition may span (100 years).
pub const MAX_AGE_DAYS: i64 = 36_500;

impl AgeUnit {
    pub fn days(self) -> i64 {
        match self {
            Self::Days => 1,
            Self::Months => 30,
        }
    }

    /// `amount` of this unit as a duration, or `None` past `MAX_AGE_DAYS`.
    pub fn window(self, amount: u32) -> Option<Duration> {
        let days = i64::from(amount) * self.days();
        if days > MAX_AGE_DAYS {
            return None;
        }
        Duration::try_days(days)
    }
}

impl FromStr for AgeUnit {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "day" | "days" => Ok(Self::Days),
            "month" | "months" => Ok(Self::Months),
            _ => Err(()),
        }
    }
}

/// How a rule combines its conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregate {
    All,
    Any,
}

impl FromStr for Aggregate {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "all" => Ok(Self::All),
            "any" => Ok(Self::Any),
            _ => Err(()),
        }
    }
}

/// A single test against one message field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Condition {
    Text {
        field: TextField,
        predicate: StringPredicate,
        value: String,
    },
    Age {
        predicate: DatePredicate,
        amount: u32,
        unit: AgeUnit,
    },
}

impl Condition {
    pub fn text(field: TextField, predicate: StringPredicate, value: impl Into<String>) -> Self {
        Self::Text {
            field,
            predicate,
            value: value.into(),
        }
    }

    pub fn age(predicate: DatePredicate, amount: u32, unit: AgeUnit) -> Self {
        Self::Age {
            predicate,
            amount,
            unit,
        }
    }

    /// The message field this condition reads.
    pub fn field(&self) -> Field {
        match self {
            Self::Text { field, .. } => (*field).into(),
            Self::Age { .. } => Field::Date,
        }
    }

    /// Length of the age window for date conditions.
    pub fn window(&self) -> Option<Duration> {
        match self {
            Self::Age { amount, unit, .. } => unit.window(*amount),
            Self::Text { .. } => None,
        }
    }
}

/// What to do with a message when a rule matches. Opaque to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    MarkAsRead,
    MarkAsUnread,
    MoveMessage { destination: String },
}

impl Action {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::MarkAsRead => "mark_as_read",
            Self::MarkAsUnread => "mark_as_unread",
            Self::MoveMessage { .. } => "move_message",
        }
    }

    /// The read-state this action sets, if it is a read-state action.
    pub fn read_state(&self) -> Option<bool> {
        match self {
            Self::MarkAsRead => Some(true),
            Self::MarkAsUnread => Some(false),
            Self::MoveMessage { .. } => None,
        }
    }
}

/// A validated rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rule {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub conditions: Vec<Condition>,
    pub predicate: Aggregate,
    pub actions: Vec<Action>,
}

impl Rule {
    pub fn new(predicate: Aggregate) -> Self {
        Self {
            name: None,
            conditions: Vec::new(),
            predicate,
            actions: Vec::new(),
        }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }
}
