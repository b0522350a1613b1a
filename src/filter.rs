//! The filter DSL.
//!
//! Clients describe WHERE conditions as nested JSON objects:
//!
//! ```text
//! { "name": { "_ilike": "%foo%" } }
//! { "status": { "_in": ["active", "trial"] } }
//! { "roles": { "name": { "_eq": "admin" } } }
//! { "_and": [ {...}, {...} ] }
//! { "_or":  [ {...}, {...} ] }
//! { "_not": {...} }
//! ```
//!
//! A [`Filter`] keeps its keys in document order, so the same document always
//! compiles to the same SQL and the same argument order.
//!
//! A scalar `null` operand is bound as SQL `NULL`, so `{"x": {"_eq": null}}`
//! compiles to `"x" = $1` and matches no rows. There is no `IS NULL`
//! operator.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::error::Error;
use crate::operator::Operator;
use crate::value::Value;

pub const NOT: &str = "_not";
pub const AND: &str = "_and";
pub const OR: &str = "_or";

/// An ordered filter object.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Filter {
    entries: Vec<(String, Node)>,
}

/// A node inside a filter object.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Object(Filter),
    List(Vec<Node>),
    Value(Value),
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON filter document.
    pub fn from_json(input: &str) -> Result<Self, Error> {
        let json: serde_json::Value =
            serde_json::from_str(input).map_err(|e| Error::Filter(e.to_string()))?;
        Filter::try_from(json)
    }

    /// `{ column: { op: operand } }`
    pub fn field(column: impl Into<String>, op: Operator, operand: impl Into<Node>) -> Self {
        Filter::new().and_field(column, op, operand)
    }

    /// Add `op: operand` under `column`, merging with any operators already
    /// present for that column.
    pub fn and_field(mut self, column: impl Into<String>, op: Operator, operand: impl Into<Node>) -> Self {
        let column = column.into();
        let operand = operand.into();
        match self.get_mut(&column) {
            Some(Node::Object(inner)) => inner.set(op.suffix(), operand),
            _ => self.set(column, Node::Object(Filter::new().with(op.suffix(), operand))),
        }
        self
    }

    /// `{ relation: inner }`
    pub fn relation(name: impl Into<String>, inner: Filter) -> Self {
        Filter::new().with(name, Node::Object(inner))
    }

    pub fn and(children: impl IntoIterator<Item = Filter>) -> Self {
        Filter::new().with(AND, Node::List(children.into_iter().map(Node::Object).collect()))
    }

    pub fn or(children: impl IntoIterator<Item = Filter>) -> Self {
        Filter::new().with(OR, Node::List(children.into_iter().map(Node::Object).collect()))
    }

    pub fn not(child: Filter) -> Self {
        Filter::new().with(NOT, Node::Object(child))
    }

    /// Set `key`, replacing an existing entry in place.
    pub fn with(mut self, key: impl Into<String>, node: impl Into<Node>) -> Self {
        self.set(key, node);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, node: impl Into<Node>) {
        let key = key.into();
        let node = node.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = node,
            None => self.entries.push((key, node)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Node> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    fn get_mut(&mut self, key: &str) -> Option<&mut Node> {
        self.entries.iter_mut().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.entries
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

impl Node {
    pub fn list<T: Into<Node>>(items: impl IntoIterator<Item = T>) -> Self {
        Node::List(items.into_iter().map(Into::into).collect())
    }

    pub fn as_object(&self) -> Option<&Filter> {
        match self {
            Node::Object(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Node]> {
        match self {
            Node::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Node::Object(f) => f.to_json(),
            Node::List(items) => serde_json::Value::Array(items.iter().map(Node::to_json).collect()),
            Node::Value(v) => v.to_json(),
        }
    }
}

impl TryFrom<serde_json::Value> for Filter {
    type Error = Error;

    fn try_from(json: serde_json::Value) -> Result<Self, Self::Error> {
        match Node::from(json) {
            Node::Object(filter) => Ok(filter),
            _ => Err(Error::Filter("a filter must be a JSON object".to_string())),
        }
    }
}

impl From<serde_json::Value> for Node {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Object(map) => Node::Object(Filter {
                entries: map.into_iter().map(|(k, v)| (k, Node::from(v))).collect(),
            }),
            serde_json::Value::Array(items) => Node::List(items.into_iter().map(Node::from).collect()),
            scalar => Node::Value(Value::from_json(&scalar).unwrap_or(Value::Null)),
        }
    }
}

impl From<Filter> for Node {
    fn from(filter: Filter) -> Self {
        Node::Object(filter)
    }
}

impl From<Value> for Node {
    fn from(value: Value) -> Self {
        Node::Value(value)
    }
}

macro_rules! node_from_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Node {
                fn from(v: $ty) -> Self {
                    Node::Value(Value::from(v))
                }
            }
        )*
    };
}

node_from_value!(bool, i32, i64, u64, f64, &str, String, Uuid, DateTime<Utc>);

impl<T: Into<Node>> From<Vec<T>> for Node {
    fn from(items: Vec<T>) -> Self {
        Node::list(items)
    }
}

impl Serialize for Filter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Filter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        Filter::try_from(json).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_keeps_document_order() {
        let filter = Filter::from_json(r#"{"zeta": {"_eq": 1}, "alpha": {"_eq": 2}, "mid": {"_eq": 3}}"#)
            .unwrap();
        assert_eq!(filter.keys().collect::<Vec<_>>(), vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_parse_rejects_non_objects() {
        assert!(Filter::from_json("[1, 2]").is_err());
        assert!(Filter::from_json("not json").is_err());
    }

    #[test]
    fn test_builder_matches_json() {
        let built = Filter::field("name", Operator::ILike, "%foo%")
            .and_field("age", Operator::Gte, 18i64)
            .and_field("name", Operator::NotLike, "%bar%");
        let parsed = Filter::from_json(
            r#"{"name": {"_ilike": "%foo%", "_nlike": "%bar%"}, "age": {"_gte": 18}}"#,
        )
        .unwrap();
        assert_eq!(built, parsed);
    }

    #[test]
    fn test_combinators_to_json() {
        let filter = Filter::or([
            Filter::field("a", Operator::Eq, "x"),
            Filter::not(Filter::field("b", Operator::In, vec!["y", "z"])),
        ]);
        assert_eq!(
            filter.to_string(),
            r#"{"_or":[{"a":{"_eq":"x"}},{"_not":{"b":{"_in":["y","z"]}}}]}"#
        );
    }

    #[test]
    fn test_serde_round_trip() {
        let filter: Filter = serde_json::from_str(r#"{"roles": {"name": {"_eq": "admin"}}}"#).unwrap();
        let json = serde_json::to_string(&filter).unwrap();
        assert_eq!(json, r#"{"roles":{"name":{"_eq":"admin"}}}"#);
    }
}
