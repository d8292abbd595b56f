//! Filter compiler
//!
//! Turns a `QueryDescriptor` into something executable:
//! - pushdown: a `FilterExpr` tree rendered into a parameterized WHERE clause
//! - in-memory: a `Predicate` evaluated against materialized records
//!
//! Both strategies go through the same `Term` normalization so that ill-typed
//! conditions behave identically (they match nothing) whichever runs.

use rusqlite::types::Value as SqlValue;
use std::cmp::Ordering;

use crate::codec;
use crate::interface::ClipboardRecord;
use crate::query::{canonical_timestamp, Condition, Field, FieldKind, Operator, QueryDescriptor, Value, WILDCARD};

/// Where filter logic runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterStrategy {
    /// Compound WHERE clause executed by SQLite
    #[default]
    Pushdown,
    /// Full scan, then predicate + slice in Rust
    InMemory,
}

/// Normalized, type-checked condition
#[derive(Debug, Clone, PartialEq)]
enum Term {
    MatchNone,
    Eq { field: Field, value: Value },
    Contains { field: Field, needle: String },
    AnyOf { field: Field, values: Vec<Value> },
}

impl Term {
    fn from_condition(condition: &Condition) -> Term {
        let field = condition.field;
        match (condition.op, &condition.value) {
            (Operator::Eq, value) if value.fits(field) => Term::Eq {
                field,
                value: value.clone(),
            },
            (Operator::Like, Value::Text(pattern)) if field.kind() == FieldKind::Text => {
                Term::Contains {
                    field,
                    needle: strip_wildcards(pattern),
                }
            }
            (Operator::In, Value::List(values)) => {
                // Members of the wrong type can never be equal to the field
                let values: Vec<Value> = values.iter().filter(|v| v.fits(field)).cloned().collect();
                if values.is_empty() {
                    Term::MatchNone
                } else {
                    Term::AnyOf { field, values }
                }
            }
            _ => Term::MatchNone,
        }
    }
}

fn strip_wildcards(pattern: &str) -> String {
    pattern.chars().filter(|&c| c != WILDCARD).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Pushdown
// ─────────────────────────────────────────────────────────────────────────────

/// Compound boolean expression handed to the backend
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    MatchNone,
    Eq { field: Field, value: Value },
    Contains { field: Field, needle: String },
    And(Box<FilterExpr>, Box<FilterExpr>),
    Or(Box<FilterExpr>, Box<FilterExpr>),
}

impl FilterExpr {
    fn and(self, other: FilterExpr) -> FilterExpr {
        FilterExpr::And(Box::new(self), Box::new(other))
    }

    fn or(self, other: FilterExpr) -> FilterExpr {
        FilterExpr::Or(Box::new(self), Box::new(other))
    }

    fn from_term(term: Term) -> FilterExpr {
        match term {
            Term::MatchNone => FilterExpr::MatchNone,
            Term::Eq { field, value } => FilterExpr::Eq { field, value },
            Term::Contains { field, needle } => FilterExpr::Contains { field, needle },
            // Non-empty by construction; a single member collapses to one Eq
            Term::AnyOf { field, values } => values
                .into_iter()
                .map(|value| FilterExpr::Eq { field, value })
                .reduce(FilterExpr::or)
                .unwrap_or(FilterExpr::MatchNone),
        }
    }

    /// Render as SQL, appending bound values to `params`.
    /// Placeholders are numbered from `params.len() + 1`.
    pub fn to_sql(&self, params: &mut Vec<SqlValue>) -> String {
        match self {
            FilterExpr::MatchNone => "0".to_string(),
            FilterExpr::Eq { field, value } => {
                params.push(sql_value(*field, value));
                format!("{} = ?{}", field.column(), params.len())
            }
            FilterExpr::Contains { field, needle } => {
                let stored = codec::escape(needle);
                params.push(SqlValue::Text(format!(
                    "%{}%",
                    escape_like_wildcards(&stored)
                )));
                format!("{} LIKE ?{} ESCAPE '\\'", field.column(), params.len())
            }
            FilterExpr::And(left, right) => {
                let l = left.to_sql(params);
                let r = right.to_sql(params);
                format!("({l} AND {r})")
            }
            FilterExpr::Or(left, right) => {
                // A chain of equalities on one column goes out as a flat IN list
                // so long membership sets stay within SQLite's expression depth
                if let Some((field, values)) = self.same_field_alternatives() {
                    let placeholders: Vec<String> = values
                        .into_iter()
                        .map(|value| {
                            params.push(sql_value(field, value));
                            format!("?{}", params.len())
                        })
                        .collect();
                    return format!("{} IN ({})", field.column(), placeholders.join(", "));
                }
                let l = left.to_sql(params);
                let r = right.to_sql(params);
                format!("({l} OR {r})")
            }
        }
    }

    /// Operands of an OR tree made only of `Eq` on a single field, left to right
    fn same_field_alternatives(&self) -> Option<(Field, Vec<&Value>)> {
        let mut field = None;
        let mut values = Vec::new();
        let mut pending = vec![self];
        while let Some(expr) = pending.pop() {
            match expr {
                FilterExpr::Or(left, right) => {
                    pending.push(&**right);
                    pending.push(&**left);
                }
                FilterExpr::Eq { field: f, value } if field.map_or(true, |seen| seen == *f) => {
                    field = Some(*f);
                    values.push(value);
                }
                _ => return None,
            }
        }
        field.map(|f| (f, values))
    }
}

/// Build the pushdown tree. `None` means every record matches.
pub fn compile_pushdown(descriptor: &QueryDescriptor) -> Option<FilterExpr> {
    descriptor
        .conditions()
        .iter()
        .map(Term::from_condition)
        .map(FilterExpr::from_term)
        .reduce(FilterExpr::and)
}

/// Bound parameter for `value` as it sits in `field`'s column
fn sql_value(field: Field, value: &Value) -> SqlValue {
    match value {
        Value::Integer(i) => SqlValue::Integer(*i),
        Value::Text(s) if field.is_escaped() => SqlValue::Text(codec::escape(s).into_owned()),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Timestamp(ts) => SqlValue::Text(canonical_timestamp(ts)),
        Value::ItemType(t) => SqlValue::Text(t.as_str().to_string()),
        // Unreachable after normalization; never equal to a scalar column
        Value::List(_) => SqlValue::Null,
    }
}

/// Escape `%`, `_` and `\` so they match literally under `ESCAPE '\'`
pub fn escape_like_wildcards(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' | '_' | '\\' => {
                result.push('\\');
                result.push(c);
            }
            _ => result.push(c),
        }
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory
// ─────────────────────────────────────────────────────────────────────────────

/// Record predicate: every term must hold
#[derive(Debug, Clone)]
pub struct Predicate {
    terms: Vec<Term>,
}

/// Build the in-memory evaluator
pub fn compile_predicate(descriptor: &QueryDescriptor) -> Predicate {
    Predicate {
        terms: descriptor.conditions().iter().map(Term::from_condition).collect(),
    }
}

impl Predicate {
    pub fn matches(&self, record: &ClipboardRecord) -> bool {
        self.terms.iter().all(|term| match term {
            Term::MatchNone => false,
            Term::Eq { field, value } => field_equals(record, *field, value),
            Term::Contains { field, needle } => text_of(record, *field)
                .map(|haystack| contains_ignore_ascii_case(haystack, needle))
                .unwrap_or(false),
            Term::AnyOf { field, values } => values.iter().any(|v| field_equals(record, *field, v)),
        })
    }

    /// Filter, order most recent first, then slice `[offset, offset + limit)`
    pub fn apply(&self, records: Vec<ClipboardRecord>, limit: Option<usize>, offset: usize) -> Vec<ClipboardRecord> {
        let mut matched: Vec<ClipboardRecord> = records.into_iter().filter(|r| self.matches(r)).collect();
        matched.sort_by(recent_first);
        paginate(matched, limit, offset)
    }
}

/// Text view of a text field. Absent optional text reads as "".
fn text_of(record: &ClipboardRecord, field: Field) -> Option<&str> {
    match field {
        Field::Content => Some(&record.content),
        Field::MatchValue => Some(&record.match_value),
        Field::SearchValue => Some(record.search_value.as_deref().unwrap_or("")),
        Field::MetaData => Some(record.meta_data.as_deref().unwrap_or("")),
        _ => None,
    }
}

fn field_equals(record: &ClipboardRecord, field: Field, value: &Value) -> bool {
    match (field, value) {
        (Field::Id, Value::Integer(id)) => record.id == *id,
        (Field::ItemType, Value::ItemType(t)) => record.item_type == *t,
        (Field::CopyDate, Value::Timestamp(ts)) => {
            canonical_timestamp(&record.copy_date) == canonical_timestamp(ts)
        }
        (Field::IsFavorite, Value::Bool(b)) => record.is_favorite == *b,
        (_, Value::Text(s)) => text_of(record, field) == Some(s.as_str()),
        _ => false,
    }
}

/// ASCII case folding, matching SQLite's built-in LIKE
fn contains_ignore_ascii_case(haystack: &str, needle: &str) -> bool {
    haystack
        .to_ascii_lowercase()
        .contains(&needle.to_ascii_lowercase())
}

/// Ordering used by both strategies: newest copy first, ties by id descending
pub fn recent_first(a: &ClipboardRecord, b: &ClipboardRecord) -> Ordering {
    b.copy_date
        .cmp(&a.copy_date)
        .then_with(|| b.id.cmp(&a.id))
}

/// Apply `offset` then `limit` to an ordered sequence
pub fn paginate<T>(items: Vec<T>, limit: Option<usize>, offset: usize) -> Vec<T> {
    items
        .into_iter()
        .skip(offset)
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}
