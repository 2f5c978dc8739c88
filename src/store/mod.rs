//! Document store interface consumed by the catalog
//!
//! The catalog needs four things from its store: lookup by id, ordered
//! queries over a named secondary index, selector-based finds, and
//! idempotent creation of index definitions. Indexes are defined with native
//! map functions instead of view scripts shipped to the store.
//!
//! # Modules
//!
//! - [`sqlite`]: Embedded SQLite implementation

pub mod sqlite;

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;
use serde_json::Value;

use crate::error::StoreError;

pub use sqlite::SqliteStore;

/// Ids of index definitions start with this prefix. Stores may return such
/// rows from listings; the catalog filters them out.
pub const DESIGN_PREFIX: &str = "_design/";

pub fn is_design_id(id: &str) -> bool {
    id.starts_with(DESIGN_PREFIX)
}

/// Key of a secondary-index row, compared element by element
pub type IndexKey = Vec<i64>;

/// Native map function: emits zero or more `(key, value)` rows per document
pub type MapFn = Arc<dyn Fn(&Value) -> Vec<(IndexKey, Value)> + Send + Sync>;

/// A stored JSON document
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub body: Value,
}

/// A row of a secondary-index query
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub id: String,
    pub key: IndexKey,
    pub value: Value,
    /// Present when the query asked for `include_docs`
    pub doc: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    pub limit: Option<usize>,
    pub descending: bool,
    pub include_docs: bool,
    /// First key to return (inclusive), in the iteration direction
    pub start_key: Option<IndexKey>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Condition on a single field of a selector
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Field equals the value
    Eq(Value),
    /// Field is an array containing every value
    All(Vec<Value>),
    /// Field is present and not null
    Exists,
}

impl Condition {
    fn matches(&self, field: Option<&Value>) -> bool {
        match (self, field) {
            (Condition::Eq(expected), Some(actual)) => expected == actual,
            (Condition::All(expected), Some(Value::Array(actual))) => {
                expected.iter().all(|value| actual.contains(value))
            }
            (Condition::Exists, Some(actual)) => !actual.is_null(),
            _ => false,
        }
    }
}

/// Conjunction of field conditions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selector {
    conditions: Vec<(String, Condition)>,
}

impl Selector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, condition: Condition) -> Self {
        self.conditions.push((field.into(), condition));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Whether `doc` satisfies every condition. Dotted field names address
    /// nested objects.
    pub fn matches(&self, doc: &Value) -> bool {
        self.conditions
            .iter()
            .all(|(field, condition)| condition.matches(field_value(doc, field)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FindRequest {
    /// Name of the index expected to serve the request
    pub use_index: Option<String>,
    pub selector: Selector,
    pub sort: Vec<(String, SortOrder)>,
    pub skip: usize,
    pub limit: usize,
}

/// Body of an index definition
#[derive(Clone)]
pub enum DesignDoc {
    /// Named views, each computed by a native map function
    Views(BTreeMap<String, MapFn>),
    /// Selector index over the listed fields
    Index { fields: Vec<String> },
}

impl fmt::Debug for DesignDoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DesignDoc::Views(views) => f
                .debug_tuple("Views")
                .field(&views.keys().collect::<Vec<_>>())
                .finish(),
            DesignDoc::Index { fields } => {
                f.debug_struct("Index").field("fields", fields).finish()
            }
        }
    }
}

/// Operations the catalog consumes from a document store
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch one document, `None` when absent
    async fn get_by_id(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, StoreError>;

    /// Query view `view` of design document `design`
    ///
    /// Rows are ordered by key, then by document id. Fails with
    /// `StoreError::NotFound` when the design document or view is missing.
    async fn query(
        &self,
        collection: &str,
        design: &str,
        view: &str,
        options: QueryOptions,
    ) -> Result<Vec<Row>, StoreError>;

    /// Documents matching a selector, sorted, then `skip`/`limit` applied
    async fn find(
        &self,
        collection: &str,
        request: FindRequest,
    ) -> Result<Vec<Document>, StoreError>;

    /// Every document of the collection, ordered by id
    async fn all_docs(&self, collection: &str) -> Result<Vec<Document>, StoreError>;

    /// Register an index definition
    ///
    /// Fails with `StoreError::Conflict` when `id` already exists.
    async fn create_design_doc(
        &self,
        collection: &str,
        id: &str,
        doc: DesignDoc,
    ) -> Result<(), StoreError>;
}

/// Resolve a dotted field path inside a JSON document
pub fn field_value<'a>(doc: &'a Value, field: &str) -> Option<&'a Value> {
    field
        .split('.')
        .try_fold(doc, |value, segment| value.get(segment))
}

/// Order JSON values: null < booleans < numbers < strings < arrays < objects
pub fn collate(a: &Value, b: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or_default();
            let y = y.as_f64().unwrap_or_default();
            x.total_cmp(&y)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x
            .iter()
            .zip(y)
            .map(|(x, y)| collate(x, y))
            .find(|ordering| ordering.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Order documents by a list of sort fields; absent fields sort as null
pub fn compare_by_fields(a: &Value, b: &Value, sort: &[(String, SortOrder)]) -> Ordering {
    sort.iter()
        .map(|(field, order)| {
            let ordering = collate(
                field_value(a, field).unwrap_or(&Value::Null),
                field_value(b, field).unwrap_or(&Value::Null),
            );
            match order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        })
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(Condition::Eq(json!("webapp")), json!({"type": "webapp"}), true)]
    #[case(Condition::Eq(json!("webapp")), json!({"type": "konnector"}), false)]
    #[case(Condition::Eq(json!("webapp")), json!({}), false)]
    #[case(Condition::All(vec![json!("a"), json!("b")]), json!({"type": ["a", "b", "c"]}), true)]
    #[case(Condition::All(vec![json!("a"), json!("d")]), json!({"type": ["a", "b", "c"]}), false)]
    #[case(Condition::All(vec![json!("a")]), json!({"type": "a"}), false)]
    #[case(Condition::Exists, json!({"type": "x"}), true)]
    #[case(Condition::Exists, json!({"type": null}), false)]
    #[case(Condition::Exists, json!({}), false)]
    fn selector_matches_returns_expected(
        #[case] condition: Condition,
        #[case] doc: Value,
        #[case] expected: bool,
    ) {
        let selector = Selector::new().with("type", condition);
        assert_eq!(selector.matches(&doc), expected);
    }

    #[test]
    fn empty_selector_matches_everything() {
        assert!(Selector::new().matches(&json!({"anything": 1})));
    }

    #[test]
    fn field_value_follows_dotted_paths() {
        let doc = json!({"meta": {"name": "drive"}});
        assert_eq!(field_value(&doc, "meta.name"), Some(&json!("drive")));
        assert_eq!(field_value(&doc, "meta.missing"), None);
    }

    #[rstest]
    #[case(json!(null), json!(false), Ordering::Less)]
    #[case(json!(2), json!(10), Ordering::Less)]
    #[case(json!("b"), json!("a"), Ordering::Greater)]
    #[case(json!(10), json!("1"), Ordering::Less)]
    #[case(json!([1, 2]), json!([1, 2, 0]), Ordering::Less)]
    #[case(json!([1, 3]), json!([1, 2, 9]), Ordering::Greater)]
    fn collate_returns_expected(#[case] a: Value, #[case] b: Value, #[case] expected: Ordering) {
        assert_eq!(collate(&a, &b), expected);
    }

    #[test]
    fn compare_by_fields_applies_direction_per_field() {
        let sort = vec![
            ("type".to_string(), SortOrder::Asc),
            ("slug".to_string(), SortOrder::Desc),
        ];
        let a = json!({"type": "webapp", "slug": "a"});
        let b = json!({"type": "webapp", "slug": "b"});
        let c = json!({"type": "konnector", "slug": "z"});

        assert_eq!(compare_by_fields(&a, &b, &sort), Ordering::Greater);
        assert_eq!(compare_by_fields(&c, &a, &sort), Ordering::Less);
    }
}
