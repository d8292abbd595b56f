//! Fluent query builder
//!
//! `ClipboardQueryBuilder` accumulates conditions and pagination into a frozen
//! `QueryDescriptor`. Every `with_*` taking an `Option` is a no-op on `None`,
//! so optional UI filters compose without branching at the call site.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::interface::ItemType;

/// Wildcard marker wrapped around `like` values
pub const WILDCARD: char = '%';

/// Filterable record field, mapped 1:1 to a backend column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Id,
    ItemType,
    Content,
    CopyDate,
    IsFavorite,
    MatchValue,
    SearchValue,
    MetaData,
}

/// Value type a field holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    ItemType,
    Text,
    Timestamp,
    Bool,
}

impl Field {
    pub fn column(&self) -> &'static str {
        match self {
            Field::Id => "id",
            Field::ItemType => "item_type",
            Field::Content => "content",
            Field::CopyDate => "copy_date",
            Field::IsFavorite => "is_favorite",
            Field::MatchValue => "match_value",
            Field::SearchValue => "search_value",
            Field::MetaData => "meta_data",
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            Field::Id => FieldKind::Integer,
            Field::ItemType => FieldKind::ItemType,
            Field::Content | Field::MatchValue | Field::SearchValue | Field::MetaData => {
                FieldKind::Text
            }
            Field::CopyDate => FieldKind::Timestamp,
            Field::IsFavorite => FieldKind::Bool,
        }
    }

    /// Text columns that pass through the codec at rest
    pub fn is_escaped(&self) -> bool {
        self.kind() == FieldKind::Text
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Like,
    In,
}

/// Condition operand
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Integer(i64),
    Text(String),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    ItemType(ItemType),
    List(Vec<Value>),
}

impl Value {
    /// Whether this value can be compared against `field`
    pub fn fits(&self, field: Field) -> bool {
        matches!(
            (field.kind(), self),
            (FieldKind::Integer, Value::Integer(_))
                | (FieldKind::ItemType, Value::ItemType(_))
                | (FieldKind::Text, Value::Text(_))
                | (FieldKind::Timestamp, Value::Timestamp(_))
                | (FieldKind::Bool, Value::Bool(_))
        )
    }
}

/// Canonical ISO-8601 form used at rest and for timestamp equality
pub fn canonical_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// A single field/operator/value filter term
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub field: Field,
    pub op: Operator,
    pub value: Value,
}

impl Condition {
    pub fn new(field: Field, op: Operator, value: Value) -> Self {
        Self { field, op, value }
    }
}

/// Immutable output of the builder
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryDescriptor {
    conditions: Vec<Condition>,
    limit: Option<i64>,
    offset: Option<i64>,
}

impl QueryDescriptor {
    /// Descriptor with no conditions; matches every record
    pub fn all() -> Self {
        Self::default()
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// `None` when unbounded (absent or negative)
    pub fn limit(&self) -> Option<usize> {
        self.limit.and_then(|l| usize::try_from(l).ok())
    }

    /// Clamped to zero
    pub fn offset(&self) -> usize {
        self.offset
            .and_then(|o| usize::try_from(o).ok())
            .unwrap_or(0)
    }
}

/// Builder for `QueryDescriptor`
#[derive(Debug, Clone, Default)]
pub struct ClipboardQueryBuilder {
    conditions: Vec<Condition>,
    limit: Option<i64>,
    offset: Option<i64>,
}

impl ClipboardQueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, field: Field, op: Operator, value: Value) -> Self {
        self.conditions.push(Condition::new(field, op, value));
        self
    }

    /// Pagination. A negative limit means unbounded. Overwrites earlier calls.
    pub fn with_limit(mut self, limit: i64, offset: i64) -> Self {
        self.limit = Some(limit);
        self.offset = Some(offset);
        self
    }

    pub fn with_id(self, id: Option<i64>) -> Self {
        match id {
            Some(id) => self.push(Field::Id, Operator::Eq, Value::Integer(id)),
            None => self,
        }
    }

    /// Membership over the type enum. An empty slice matches nothing.
    pub fn with_item_types(self, item_types: Option<&[ItemType]>) -> Self {
        match item_types {
            Some(types) => {
                let values = types.iter().copied().map(Value::ItemType).collect();
                self.push(Field::ItemType, Operator::In, Value::List(values))
            }
            None => self,
        }
    }

    pub fn with_content(self, content: Option<&str>) -> Self {
        match content {
            Some(c) => self.push(Field::Content, Operator::Eq, Value::Text(c.to_string())),
            None => self,
        }
    }

    pub fn with_match_value(self, match_value: Option<&str>) -> Self {
        match match_value {
            Some(m) => self.push(Field::MatchValue, Operator::Eq, Value::Text(m.to_string())),
            None => self,
        }
    }

    /// Case-insensitive substring match on content
    pub fn with_containing_content(self, content: Option<&str>) -> Self {
        match content {
            Some(c) => self.push(Field::Content, Operator::Like, Value::Text(wrap_wildcards(c))),
            None => self,
        }
    }

    /// Case-insensitive substring match on the precomputed search key
    pub fn with_containing_search_value(self, search_value: Option<&str>) -> Self {
        match search_value {
            Some(s) => self.push(
                Field::SearchValue,
                Operator::Like,
                Value::Text(wrap_wildcards(s)),
            ),
            None => self,
        }
    }

    pub fn with_favorites(self, include: Option<bool>) -> Self {
        match include {
            Some(f) => self.push(Field::IsFavorite, Operator::Eq, Value::Bool(f)),
            None => self,
        }
    }

    pub fn with_copy_date(self, copy_date: Option<DateTime<Utc>>) -> Self {
        match copy_date {
            Some(ts) => self.push(Field::CopyDate, Operator::Eq, Value::Timestamp(ts)),
            None => self,
        }
    }

    /// Append a raw condition
    pub fn with_condition(self, condition: Condition) -> Self {
        self.push(condition.field, condition.op, condition.value)
    }

    /// Snapshot the current state. The builder stays usable.
    pub fn build(&self) -> QueryDescriptor {
        QueryDescriptor {
            conditions: self.conditions.clone(),
            limit: self.limit,
            offset: self.offset,
        }
    }
}

fn wrap_wildcards(needle: &str) -> String {
    format!("{WILDCARD}{needle}{WILDCARD}")
}
