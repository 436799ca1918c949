#![forbid(unsafe_code)]

use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum EntityKind {
    UserTasks,
    Messages,
    Transactions,
    Other(String),
}

impl EntityKind {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "user_tasks" => Self::UserTasks,
            "messages" => Self::Messages,
            "transactions" => Self::Transactions,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::UserTasks => "user_tasks",
            Self::Messages => "messages",
            Self::Transactions => "transactions",
            Self::Other(name) => name.as_str(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Created,
    Updated,
    Deleted,
}

impl Operation {
    /// Accepts both the change-feed wire names (`INSERT`/`UPDATE`/`DELETE`) and our own.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "insert" | "created" => Some(Self::Created),
            "update" | "updated" => Some(Self::Updated),
            "delete" | "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

/// A row-level change pushed by the backend. Treated as a hint to resynchronize; the rows are
/// schema-coupled to the backend tables and may lag what a refetch returns.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeEvent {
    pub entity_kind: EntityKind,
    pub operation: Operation,
    pub new: Value,
    pub old: Value,
}

impl ChangeEvent {
    pub fn new(entity_kind: EntityKind, operation: Operation, new: Value, old: Value) -> Self {
        Self {
            entity_kind,
            operation,
            new,
            old,
        }
    }

    /// The row the event is about: `new`, or `old` for deletes that carry no new row.
    pub fn row(&self) -> &Value {
        if self.new.is_object() {
            &self.new
        } else {
            &self.old
        }
    }

    pub fn row_id(&self) -> Option<String> {
        match self.row().get("id")? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Equality filter on one column of the changed row, e.g. `user_id=eq.<id>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedFilter {
    pub column: String,
    pub value: String,
}

impl FeedFilter {
    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let (column, rest) = raw.trim().split_once('=')?;
        let value = rest.strip_prefix("eq.")?;
        if column.trim().is_empty() {
            return None;
        }
        Some(Self::eq(column.trim(), value))
    }

    pub fn render(&self) -> String {
        format!("{}=eq.{}", self.column, self.value)
    }

    pub fn matches(&self, row: &Value) -> bool {
        match row.get(&self.column) {
            Some(Value::String(s)) => *s == self.value,
            Some(Value::Number(n)) => n.to_string() == self.value,
            Some(Value::Bool(b)) => b.to_string() == self.value,
            _ => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchSpec {
    pub entity_kind: EntityKind,
    pub filter: Option<FeedFilter>,
}

impl WatchSpec {
    pub fn new(entity_kind: EntityKind, filter: Option<FeedFilter>) -> Self {
        Self {
            entity_kind,
            filter,
        }
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        if self.entity_kind != event.entity_kind {
            return false;
        }
        match &self.filter {
            None => true,
            Some(filter) => filter.matches(event.row()),
        }
    }
}

/// Watch specs for everything that belongs to one user.
pub fn user_watch_specs(user_id: &str) -> Vec<WatchSpec> {
    [
        EntityKind::UserTasks,
        EntityKind::Messages,
        EntityKind::Transactions,
    ]
    .into_iter()
    .map(|kind| WatchSpec::new(kind, Some(FeedFilter::eq("user_id", user_id))))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filter_round_trips_and_matches_string_or_number_columns() {
        let filter = FeedFilter::parse("user_id=eq.42").expect("parse");
        assert_eq!(filter.render(), "user_id=eq.42");
        assert!(filter.matches(&json!({"user_id": 42})));
        assert!(filter.matches(&json!({"user_id": "42"})));
        assert!(!filter.matches(&json!({"user_id": "43"})));
        assert!(!filter.matches(&json!({})));
        assert!(FeedFilter::parse("user_id=42").is_none());
    }

    #[test]
    fn delete_events_match_on_old_row() {
        let spec = WatchSpec::new(EntityKind::Messages, Some(FeedFilter::eq("user_id", "u1")));
        let event = ChangeEvent::new(
            EntityKind::Messages,
            Operation::Deleted,
            Value::Null,
            json!({"id": 7, "user_id": "u1"}),
        );
        assert!(spec.matches(&event));
        assert_eq!(event.row_id().as_deref(), Some("7"));

        let other_kind = ChangeEvent::new(
            EntityKind::Transactions,
            Operation::Created,
            json!({"user_id": "u1"}),
            Value::Null,
        );
        assert!(!spec.matches(&other_kind));
    }

    #[test]
    fn operation_parses_wire_names() {
        assert_eq!(Operation::parse("INSERT"), Some(Operation::Created));
        assert_eq!(Operation::parse("update"), Some(Operation::Updated));
        assert_eq!(Operation::parse("DELETE"), Some(Operation::Deleted));
        assert_eq!(Operation::parse("*"), None);
        assert_eq!(EntityKind::parse("user_tasks"), EntityKind::UserTasks);
        assert_eq!(EntityKind::parse("platforms").as_str(), "platforms");
    }
}
