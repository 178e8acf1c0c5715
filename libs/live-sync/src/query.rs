//! Query identity and the three-state result every binding observes.

use serde_json::{Map, Value};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::{LiveSyncError, ServiceError};

/// Identifies one live query: a function name plus its arguments.
///
/// Two keys are equal when their names match and their arguments are
/// structurally equal, independent of object key order. Equality and
/// hashing go through a canonical JSON rendering computed once.
#[derive(Clone)]
pub struct QueryKey {
    name: Arc<str>,
    args: Value,
    fingerprint: Arc<str>,
}

impl QueryKey {
    pub fn new(name: impl Into<Arc<str>>, args: Value) -> Self {
        let mut fingerprint = String::new();
        write_canonical(&args, &mut fingerprint);
        Self {
            name: name.into(),
            args,
            fingerprint: fingerprint.into(),
        }
    }

    /// Key for a query that takes no arguments (`{}`).
    pub fn without_args(name: impl Into<Arc<str>>) -> Self {
        Self::new(name, Value::Object(Map::new()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &Value {
        &self.args
    }

    /// String argument by field name, if present.
    pub fn arg_str(&self, field: &str) -> Option<&str> {
        self.args.get(field).and_then(Value::as_str)
    }
}

impl PartialEq for QueryKey {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.fingerprint == other.fingerprint
    }
}

impl Eq for QueryKey {}

impl Hash for QueryKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.fingerprint.hash(state);
    }
}

impl fmt::Debug for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.fingerprint)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.fingerprint)
    }
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut fields: Vec<_> = map.iter().collect();
            fields.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (k, v)) in fields.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(k.clone()).to_string());
                out.push(':');
                write_canonical(v, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, v) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(v, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// What a binding currently shows for its query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult<T> {
    Loading,
    Value(T),
    Error(ServiceError),
}

impl<T> QueryResult<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ServiceError> {
        match self {
            Self::Error(e) => Some(e),
            _ => None,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> QueryResult<U> {
        match self {
            Self::Loading => QueryResult::Loading,
            Self::Value(v) => QueryResult::Value(f(v)),
            Self::Error(e) => QueryResult::Error(e),
        }
    }

    /// `Ok(None)` while loading, the value once available, or the
    /// subscription failure attributed to `key`.
    pub fn into_result(self, key: &QueryKey) -> Result<Option<T>, LiveSyncError> {
        match self {
            Self::Loading => Ok(None),
            Self::Value(v) => Ok(Some(v)),
            Self::Error(e) => Err(LiveSyncError::subscription(key.name(), e)),
        }
    }
}

/// One mutation invocation as sent to the data service.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationCall {
    pub name: String,
    pub args: Value,
}

impl MutationCall {
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn keys_compare_structurally() {
        let a = QueryKey::new("posts:byAuthor", json!({"authorId": "a@x.com", "limit": 10}));
        let b = QueryKey::new("posts:byAuthor", json!({"limit": 10, "authorId": "a@x.com"}));
        let c = QueryKey::new("posts:byAuthor", json!({"authorId": "b@y.com", "limit": 10}));
        let d = QueryKey::new("posts:list", json!({"authorId": "a@x.com", "limit": 10}));

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);

        let set: HashSet<_> = [a, b, c, d].into_iter().collect();
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn nested_objects_are_canonicalised() {
        let a = QueryKey::new("q", json!({"f": {"y": [1, {"b": 2, "a": 1}], "x": null}}));
        let b = QueryKey::new("q", json!({"f": {"x": null, "y": [1, {"a": 1, "b": 2}]}}));
        assert_eq!(a, b);
        assert_eq!(format!("{a:?}"), r#"q({"f":{"x":null,"y":[1,{"a":1,"b":2}]}})"#);
    }

    #[test]
    fn empty_args_key() {
        let key = QueryKey::without_args("posts:list");
        assert_eq!(key, QueryKey::new("posts:list", json!({})));
        assert_eq!(key.arg_str("authorId"), None);
    }

    #[test]
    fn query_result_into_result() {
        let key = QueryKey::without_args("posts:list");
        assert_eq!(QueryResult::<u32>::Loading.into_result(&key), Ok(None));
        assert_eq!(QueryResult::Value(3).into_result(&key), Ok(Some(3)));
        let err = QueryResult::<u32>::Error(ServiceError::unavailable("down"))
            .into_result(&key)
            .unwrap_err();
        assert!(matches!(err, LiveSyncError::Subscription { .. }));
    }
}
