//! Catalog over a temporary SQLite store, with seeding shortcuts

use std::sync::Arc;

use serde_json::{Value, json};
use tempfile::TempDir;

use app_catalog::cache::{MemoryCache, VersionCache};
use app_catalog::catalog::{Catalog, Space};
use app_catalog::store::{DocumentStore, SqliteStore};

pub struct TestCatalog {
    // Keeps the database file alive for the duration of the test
    _temp_dir: TempDir,
    pub store: Arc<SqliteStore>,
    pub space: Space,
    pub catalog: Catalog,
}

/// Create a prepared catalog with one space and in-memory cache slots
pub async fn create_test_catalog(prefix: &str) -> TestCatalog {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(SqliteStore::open(&temp_dir.path().join("catalog.db")).unwrap());
    let space = Space::new(
        "test",
        prefix,
        Arc::clone(&store) as Arc<dyn DocumentStore>,
    );
    let catalog = Catalog::new(VersionCache::new(
        Arc::new(MemoryCache::new(128)),
        Arc::new(MemoryCache::new(128)),
    ));
    catalog.prepare_space(&space).await.unwrap();

    TestCatalog {
        _temp_dir: temp_dir,
        store,
        space,
        catalog,
    }
}

/// Creation date on day `day` of January 2024
pub fn january(day: u32) -> String {
    format!("2024-01-{:02}T00:00:00Z", day)
}

impl TestCatalog {
    /// Store an app; `extra` members are merged into the document
    pub async fn put_app(&self, slug: &str, extra: Value) {
        let mut body = json!({
            "slug": slug,
            "type": "webapp",
            "editor": "cozy",
            "name": slug,
            "created_at": january(1),
        });
        if let (Value::Object(fields), Value::Object(extra)) = (&mut body, extra) {
            fields.extend(extra);
        }
        self.store
            .put_document(self.space.apps().name(), slug, &body)
            .await
            .unwrap();
    }

    pub async fn publish(&self, slug: &str, version: &str, day: u32) {
        self.put_version(self.space.versions().name(), slug, version, day, json!({}))
            .await;
    }

    pub async fn publish_with_manifest(&self, slug: &str, version: &str, day: u32, manifest: Value) {
        self.put_version(self.space.versions().name(), slug, version, day, manifest)
            .await;
    }

    pub async fn submit(&self, slug: &str, version: &str, day: u32) {
        self.put_version(self.space.pending().name(), slug, version, day, json!({}))
            .await;
    }

    async fn put_version(
        &self,
        collection: &str,
        slug: &str,
        version: &str,
        day: u32,
        manifest: Value,
    ) {
        let body = json!({
            "slug": slug,
            "editor": "cozy",
            "type": "webapp",
            "version": version,
            "created_at": january(day),
            "url": format!("https://apps.example.org/{}/{}.tar.gz", slug, version),
            "size": 1024,
            "sha256": "00",
            "manifest": manifest,
        });
        self.store
            .put_document(collection, &format!("{}-{}", slug, version), &body)
            .await
            .unwrap();
    }
}
