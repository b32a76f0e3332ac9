//! Rule source — reads the JSON rules file and validates it into typed rules.
//!
//! Loading is all-or-nothing: one bad rule fails the whole file, so a run
//! never proceeds with a partial rule set.

use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::error::RulesError;
use crate::rules::model::{
    Action, AgeUnit, Aggregate, Condition, DatePredicate, Field, MAX_AGE_DAYS, Rule,
    StringPredicate, TextField, normalize_token,
};

// ── Raw deserialization types ───────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawRule {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    conditions: Vec<RawCondition>,
    predicate: String,
    #[serde(default)]
    actions: Vec<RawAction>,
}

#[derive(Debug, Deserialize)]
struct RawCondition {
    field: String,
    predicate: String,
    value: Value,
    #[serde(default)]
    unit: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawAction {
    #[serde(alias = "action")]
    r#type: String,
    #[serde(default)]
    value: Option<Value>,
    #[serde(default)]
    destination: Option<String>,
}

// ── Public API ──────────────────────────────────────────────────────

/// Load and validate rules from a JSON file.
pub fn load_rules(path: &Path) -> Result<Vec<Rule>, RulesError> {
    let content = std::fs::read_to_string(path).map_err(|e| RulesError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let rules = parse_rules(&content)?;
    info!(path = %path.display(), count = rules.len(), "Rules loaded");
    Ok(rules)
}

/// Parse and validate rules from a JSON string.
pub fn parse_rules(json: &str) -> Result<Vec<Rule>, RulesError> {
    let raw: Vec<RawRule> =
        serde_json::from_str(json).map_err(|e| RulesError::Parse(e.to_string()))?;

    raw.into_iter()
        .enumerate()
        .map(|(idx, rule)| validate_rule(idx, rule))
        .collect()
}

// ── Validation ──────────────────────────────────────────────────────

fn validate_rule(idx: usize, raw: RawRule) -> Result<Rule, RulesError> {
    let predicate: Aggregate =
        raw.predicate
            .parse()
            .map_err(|_| RulesError::InvalidPredicate {
                rule: idx,
                predicate: raw.predicate.clone(),
                context: "rule predicate must be 'all' or 'any'".into(),
            })?;

    let conditions = raw
        .conditions
        .into_iter()
        .map(|c| validate_condition(idx, c))
        .collect::<Result<Vec<_>, _>>()?;

    let actions = raw
        .actions
        .into_iter()
        .map(|a| validate_action(idx, a))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Rule {
        name: raw.name,
        conditions,
        predicate,
        actions,
    })
}

fn validate_condition(idx: usize, raw: RawCondition) -> Result<Condition, RulesError> {
    let field: Field = raw.field.parse().map_err(|_| RulesError::InvalidField {
        rule: idx,
        field: raw.field.clone(),
    })?;

    let text_field = match field {
        Field::Sender => TextField::Sender,
        Field::Subject => TextField::Subject,
        Field::Recipient => TextField::Recipient,
        Field::Body => TextField::Body,
        Field::Date => return validate_age_condition(idx, raw),
    };

    let predicate: StringPredicate =
        raw.predicate
            .parse()
            .map_err(|_| RulesError::InvalidPredicate {
                rule: idx,
                predicate: raw.predicate.clone(),
                context: format!("not a string predicate for field '{field}'"),
            })?;

    let value = match raw.value {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        other => {
            return Err(RulesError::InvalidValue {
                rule: idx,
                field: field.to_string(),
                reason: format!("expected a string, got {other}"),
            });
        }
    };

    Ok(Condition::text(text_field, predicate, value))
}

fn validate_age_condition(idx: usize, raw: RawCondition) -> Result<Condition, RulesError> {
    let predicate: DatePredicate =
        raw.predicate
            .parse()
            .map_err(|_| RulesError::InvalidPredicate {
                rule: idx,
                predicate: raw.predicate.clone(),
                context: "date conditions take 'less_than' or 'greater_than'".into(),
            })?;

    let invalid = |reason: String| RulesError::InvalidValue {
        rule: idx,
        field: "date".into(),
        reason,
    };

    let (amount, embedded_unit) = match &raw.value {
        Value::Number(n) => {
            let amount = n
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| invalid(format!("'{n}' is not a non-negative whole number")))?;
            (amount, None)
        }
        Value::String(s) => parse_amount_with_unit(s).ok_or_else(|| {
            invalid(format!("'{s}' is not of the form '<number> [days|months]'"))
        })?,
        other => return Err(invalid(format!("expected a number, got {other}"))),
    };

    let unit = match raw.unit.as_deref() {
        Some(u) => u
            .parse::<AgeUnit>()
            .map_err(|_| invalid(format!("unknown unit '{u}'")))?,
        None => embedded_unit.unwrap_or_default(),
    };

    if unit.window(amount).is_none() {
        return Err(invalid(format!(
            "age window of {amount} {unit:?} exceeds {MAX_AGE_DAYS} days"
        )));
    }

    Ok(Condition::age(predicate, amount, unit))
}

/// `"7"`, `"7 days"`, `"2 months"`.
fn parse_amount_with_unit(s: &str) -> Option<(u32, Option<AgeUnit>)> {
    let mut parts = s.split_whitespace();
    let amount = parts.next()?.parse().ok()?;
    let unit = match parts.next() {
        Some(u) => Some(u.parse().ok()?),
        None => None,
    };
    if parts.next().is_some() {
        return None;
    }
    Some((amount, unit))
}

fn validate_action(idx: usize, raw: RawAction) -> Result<Action, RulesError> {
    let invalid = |reason: String| RulesError::InvalidAction { rule: idx, reason };

    let flag = |value: &Option<Value>| -> Result<bool, RulesError> {
        match value {
            None => Ok(true),
            Some(Value::Bool(b)) => Ok(*b),
            Some(other) => Err(invalid(format!(
                "'{}' takes a boolean value, got {other}",
                raw.r#type
            ))),
        }
    };

    match normalize_token(&raw.r#type).as_str() {
        "mark_as_read" | "mark_read" => Ok(if flag(&raw.value)? {
            Action::MarkAsRead
        } else {
            Action::MarkAsUnread
        }),
        "mark_as_unread" | "mark_unread" => Ok(if flag(&raw.value)? {
            Action::MarkAsUnread
        } else {
            Action::MarkAsRead
        }),
        "move_message" | "move" | "move_to" => {
            let destination = raw
                .destination
                .clone()
                .or_else(|| match &raw.value {
                    Some(Value::String(s)) => Some(s.clone()),
                    _ => None,
                })
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .ok_or_else(|| invalid("move_message requires a destination label".into()))?;
            Ok(Action::MoveMessage { destination })
        }
        _ => Err(invalid(format!("unknown action type '{}'", raw.r#type))),
    }
}
