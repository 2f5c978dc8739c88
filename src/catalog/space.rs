//! Spaces, their collections and the index definitions they need
//!
//! A space owns three collections of one document store: apps, published
//! versions and pending versions. Version lookups go through per-app views
//! keyed by the version ordering key, created lazily on first use.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::DateTime;
use serde_json::Value;
use tracing::debug;

use crate::error::StoreError;
use crate::store::{
    DESIGN_PREFIX, DesignDoc, Document, DocumentStore, FindRequest, IndexKey, MapFn,
    QueryOptions, Row,
};
use crate::version::channel::Channel;
use crate::version::classifier::{channel_of, classify};

/// Design document holding one "versions created since" view per channel
pub const BY_DATE_DESIGN: &str = "_design/by-date";

/// Index serving the maintenance listing
pub const MAINTENANCE_INDEX: AppIndex = AppIndex {
    name: "apps-index-by-maintenance",
    fields: &["maintenance_activated"],
};

/// Selector index over the apps collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppIndex {
    pub name: &'static str,
    pub fields: &'static [&'static str],
}

impl AppIndex {
    fn design(&self) -> DesignDoc {
        DesignDoc::Index {
            fields: self.fields.iter().map(|f| f.to_string()).collect(),
        }
    }
}

/// Handle on one collection of a document store
#[derive(Clone)]
pub struct Collection {
    store: Arc<dyn DocumentStore>,
    name: String,
}

impl Collection {
    pub fn new(store: Arc<dyn DocumentStore>, name: impl Into<String>) -> Self {
        Self {
            store,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn get(&self, id: &str) -> Result<Option<Document>, StoreError> {
        self.store.get_by_id(&self.name, id).await
    }

    pub async fn query(
        &self,
        design: &str,
        view: &str,
        options: QueryOptions,
    ) -> Result<Vec<Row>, StoreError> {
        self.store.query(&self.name, design, view, options).await
    }

    pub async fn find(&self, request: FindRequest) -> Result<Vec<Document>, StoreError> {
        self.store.find(&self.name, request).await
    }

    pub async fn all_docs(&self) -> Result<Vec<Document>, StoreError> {
        self.store.all_docs(&self.name).await
    }

    /// Create a design document; an existing one with the same id is kept
    pub async fn ensure_design(&self, id: &str, doc: DesignDoc) -> Result<(), StoreError> {
        match self.store.create_design_doc(&self.name, id, doc).await {
            Ok(()) => {
                debug!("Created design document {} on {}", id, self.name);
                Ok(())
            }
            Err(StoreError::Conflict(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// A named partition of the catalog
#[derive(Clone)]
pub struct Space {
    name: String,
    prefix: String,
    apps: Collection,
    versions: Collection,
    pending: Collection,
}

impl Space {
    pub fn new(
        name: impl Into<String>,
        prefix: impl Into<String>,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        let prefix = prefix.into();
        Self {
            name: name.into(),
            apps: Collection::new(Arc::clone(&store), collection_name(&prefix, "apps")),
            versions: Collection::new(Arc::clone(&store), collection_name(&prefix, "versions")),
            pending: Collection::new(store, collection_name(&prefix, "pending")),
            prefix,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Prefix of every collection and cache key of this space
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn apps(&self) -> &Collection {
        &self.apps
    }

    /// Published versions
    pub fn versions(&self) -> &Collection {
        &self.versions
    }

    pub fn pending(&self) -> &Collection {
        &self.pending
    }

    /// Create the app indexes and the by-date views. Safe to run repeatedly.
    pub async fn prepare(&self, app_indexes: &[AppIndex]) -> Result<(), StoreError> {
        for index in app_indexes.iter().chain([&MAINTENANCE_INDEX]) {
            self.apps.ensure_design(index.name, index.design()).await?;
        }
        self.versions
            .ensure_design(BY_DATE_DESIGN, by_date_design())
            .await?;

        debug!("Prepared space {:?}", self.name);
        Ok(())
    }

    pub async fn ensure_versions_views(&self, slug: &str) -> Result<(), StoreError> {
        self.versions
            .ensure_design(&versions_design_id(slug), versions_design(slug))
            .await
    }
}

fn collection_name(prefix: &str, suffix: &str) -> String {
    if prefix.is_empty() {
        suffix.to_string()
    } else {
        format!("{}-{}", prefix, suffix)
    }
}

pub fn versions_design_id(slug: &str) -> String {
    format!("{}versions-{}-v2", DESIGN_PREFIX, slug)
}

/// Per-app version views, one per channel
///
/// Each view emits `(ordering key, version string)` for the app's versions
/// visible in the channel, so a descending query with limit 1 yields the
/// latest version.
pub fn versions_design(slug: &str) -> DesignDoc {
    DesignDoc::Views(
        Channel::ALL
            .into_iter()
            .map(|channel| (channel.as_str().to_string(), version_view(slug, channel)))
            .collect(),
    )
}

fn version_view(slug: &str, channel: Channel) -> MapFn {
    let slug = slug.to_string();
    Arc::new(move |doc: &Value| {
        if doc.get("slug").and_then(Value::as_str) != Some(slug.as_str()) {
            return Vec::new();
        }
        let Some(version) = doc.get("version").and_then(Value::as_str) else {
            return Vec::new();
        };

        let classification = classify(version);
        if !classification.channel.is_visible_in(channel) {
            return Vec::new();
        }

        let key = classification
            .key
            .with_timestamp(created_at_millis(doc))
            .to_index_key();
        vec![(key, Value::String(version.to_string()))]
    })
}

/// Store-wide views of versions by creation date, one per channel
pub fn by_date_design() -> DesignDoc {
    let views: BTreeMap<String, MapFn> = Channel::ALL
        .into_iter()
        .map(|channel| {
            let map: MapFn = Arc::new(move |doc: &Value| {
                let Some(version) = doc.get("version").and_then(Value::as_str) else {
                    return Vec::new();
                };
                if channel_of(version) != channel {
                    return Vec::new();
                }
                let key: IndexKey = vec![created_at_millis(doc)];
                vec![(key, doc.get("slug").cloned().unwrap_or(Value::Null))]
            });
            (channel.as_str().to_string(), map)
        })
        .collect();
    DesignDoc::Views(views)
}

/// `created_at` of a stored document in milliseconds, 0 when unreadable
fn created_at_millis(doc: &Value) -> i64 {
    doc.get("created_at")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|date| date.timestamp_millis())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MockDocumentStore;
    use rstest::rstest;
    use serde_json::json;

    fn views_of(design: DesignDoc) -> BTreeMap<String, MapFn> {
        match design {
            DesignDoc::Views(views) => views,
            DesignDoc::Index { .. } => panic!("expected views"),
        }
    }

    fn version_doc(slug: &str, version: &str) -> Value {
        json!({
            "slug": slug,
            "version": version,
            "created_at": "2024-01-02T03:04:05Z",
        })
    }

    #[rstest]
    #[case("", "apps")]
    #[case("mespace", "mespace-apps")]
    fn collection_names_carry_the_prefix(#[case] prefix: &str, #[case] expected: &str) {
        let space = Space::new("test", prefix, Arc::new(MockDocumentStore::new()));
        assert_eq!(space.apps().name(), expected);
    }

    #[test]
    fn versions_design_id_is_per_app() {
        assert_eq!(versions_design_id("drive"), "_design/versions-drive-v2");
    }

    #[rstest]
    #[case("1.0.0", "stable", true)]
    #[case("1.0.0", "beta", true)]
    #[case("1.0.0", "dev", true)]
    #[case("1.0.0-beta.1", "stable", false)]
    #[case("1.0.0-beta.1", "beta", true)]
    #[case("1.0.0-beta.1", "dev", true)]
    #[case("1.0.0-dev.abc", "stable", false)]
    #[case("1.0.0-dev.abc", "beta", false)]
    #[case("1.0.0-dev.abc", "dev", true)]
    fn version_views_emit_visible_versions(
        #[case] version: &str,
        #[case] view: &str,
        #[case] emitted: bool,
    ) {
        let views = views_of(versions_design("drive"));
        let rows = views[view](&version_doc("drive", version));
        assert_eq!(!rows.is_empty(), emitted);
    }

    #[test]
    fn version_views_ignore_other_apps() {
        let views = views_of(versions_design("drive"));
        assert!(views["dev"](&version_doc("photos", "1.0.0")).is_empty());
    }

    #[test]
    fn version_view_key_is_the_ordering_key_with_creation_time() {
        let views = views_of(versions_design("drive"));
        let rows = views["stable"](&version_doc("drive", "1.10.2"));

        let millis = DateTime::parse_from_rfc3339("2024-01-02T03:04:05Z")
            .unwrap()
            .timestamp_millis();
        assert_eq!(rows, vec![(vec![1, 10, 2, 1, 0, millis], json!("1.10.2"))]);
    }

    #[test]
    fn by_date_views_emit_exact_channel_only() {
        let views = views_of(by_date_design());
        let doc = version_doc("drive", "1.0.0-beta.1");

        assert!(views["stable"](&doc).is_empty());
        assert!(views["dev"](&doc).is_empty());
        assert_eq!(views["beta"](&doc)[0].1, json!("drive"));
    }

    #[tokio::test]
    async fn ensure_design_treats_conflict_as_success() {
        let mut store = MockDocumentStore::new();
        store
            .expect_create_design_doc()
            .withf(|collection, id, _| collection == "apps" && id == "idx")
            .times(1)
            .returning(|_, id, _| Err(StoreError::Conflict(id.to_string())));
        let collection = Collection::new(Arc::new(store), "apps");

        let result = collection
            .ensure_design("idx", DesignDoc::Index { fields: vec![] })
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn ensure_design_propagates_other_failures() {
        let mut store = MockDocumentStore::new();
        store
            .expect_create_design_doc()
            .returning(|_, _, _| Err(StoreError::LockPoisoned));
        let collection = Collection::new(Arc::new(store), "apps");

        let result = collection
            .ensure_design("idx", DesignDoc::Index { fields: vec![] })
            .await;

        assert!(matches!(result, Err(StoreError::LockPoisoned)));
    }

    #[tokio::test]
    async fn prepare_creates_app_indexes_and_by_date_views() {
        let mut store = MockDocumentStore::new();
        store
            .expect_create_design_doc()
            .withf(|collection, id, _| collection == "p-apps" && id == "apps-index-by-slug")
            .times(1)
            .returning(|_, _, _| Ok(()));
        store
            .expect_create_design_doc()
            .withf(|collection, id, _| collection == "p-apps" && id == MAINTENANCE_INDEX.name)
            .times(1)
            .returning(|_, _, _| Ok(()));
        store
            .expect_create_design_doc()
            .withf(|collection, id, _| collection == "p-versions" && id == BY_DATE_DESIGN)
            .times(1)
            .returning(|_, _, _| Ok(()));
        let space = Space::new("p", "p", Arc::new(store));

        let slug_index = AppIndex {
            name: "apps-index-by-slug",
            fields: &["slug"],
        };

        space.prepare(&[slug_index]).await.unwrap();
    }
}
