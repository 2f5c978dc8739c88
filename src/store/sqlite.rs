//! SQLite implementation of the document store
//!
//! Documents are JSON bodies keyed by `(collection, id)`. Index definitions
//! hold native map functions, so they live in memory for the lifetime of the
//! store handle and are re-registered by the catalog on startup or lazily on
//! first query.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use rusqlite::Connection;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::store::{
    DesignDoc, Document, DocumentStore, FindRequest, QueryOptions, Row, compare_by_fields,
};

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    designs: RwLock<HashMap<(String, String), DesignDoc>>,
}

impl SqliteStore {
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        info!("Opening document store at {:?}", db_path);

        let conn = Connection::open(db_path)?;

        // Enable WAL mode for better concurrency
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        Self::create_schema(&conn)?;
        debug!("Document store schema ready");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            designs: RwLock::new(HashMap::new()),
        })
    }

    fn create_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                rev INTEGER NOT NULL DEFAULT 1,
                body TEXT NOT NULL,
                PRIMARY KEY (collection, id)
            )
            "#,
            [],
        )?;
        Ok(())
    }

    /// Run blocking database work off the async executor
    async fn run<T, F>(&self, work: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|_| StoreError::LockPoisoned)?;
            work(&conn)
        })
        .await?
    }

    fn design(&self, collection: &str, id: &str) -> Result<Option<DesignDoc>, StoreError> {
        let designs = self.designs.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(designs
            .get(&(collection.to_string(), id.to_string()))
            .cloned())
    }

    /// Insert or replace a document, bumping its revision
    ///
    /// `_id` and `_rev` members of `body` are ignored; they are derived from
    /// the row on read.
    pub async fn put_document(
        &self,
        collection: &str,
        id: &str,
        body: &Value,
    ) -> Result<(), StoreError> {
        let mut body = body.clone();
        if let Value::Object(map) = &mut body {
            map.remove("_id");
            map.remove("_rev");
        }
        let serialized = serde_json::to_string(&body)?;
        let collection = collection.to_string();
        let id = id.to_string();

        self.run(move |conn| {
            conn.execute(
                r#"
                INSERT INTO documents (collection, id, rev, body)
                VALUES (?1, ?2, 1, ?3)
                ON CONFLICT(collection, id) DO UPDATE SET rev = rev + 1, body = excluded.body
                "#,
                (&collection, &id, &serialized),
            )?;
            debug!("Saved document {}/{}", collection, id);
            Ok(())
        })
        .await
    }

    /// Delete a document, returning whether it existed
    pub async fn delete_document(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let collection = collection.to_string();
        let id = id.to_string();

        self.run(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
                (&collection, &id),
            )?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn load_documents(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        let collection = collection.to_string();

        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, rev, body FROM documents WHERE collection = ?1 ORDER BY id",
            )?;
            let rows = stmt
                .query_map([&collection], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(id, rev, body)| {
                    let body = with_identity(&id, rev, serde_json::from_str(&body)?);
                    Ok(Document { id, body })
                })
                .collect::<Result<Vec<_>, StoreError>>()
        })
        .await
    }
}

fn with_identity(id: &str, rev: i64, mut body: Value) -> Value {
    if let Value::Object(map) = &mut body {
        map.insert("_id".to_string(), Value::String(id.to_string()));
        map.insert("_rev".to_string(), Value::String(format!("{}-sqlite", rev)));
    }
    body
}

#[async_trait::async_trait]
impl DocumentStore for SqliteStore {
    async fn get_by_id(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        let collection = collection.to_string();
        let id = id.to_string();

        self.run(move |conn| {
            let result = conn.query_row(
                "SELECT rev, body FROM documents WHERE collection = ?1 AND id = ?2",
                (&collection, &id),
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            );

            match result {
                Ok((rev, body)) => Ok(Some(Document {
                    body: with_identity(&id, rev, serde_json::from_str(&body)?),
                    id,
                })),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn query(
        &self,
        collection: &str,
        design: &str,
        view: &str,
        options: QueryOptions,
    ) -> Result<Vec<Row>, StoreError> {
        let Some(DesignDoc::Views(views)) = self.design(collection, design)? else {
            return Err(StoreError::NotFound(format!("{}/{}", collection, design)));
        };
        let Some(map) = views.get(view).cloned() else {
            return Err(StoreError::NotFound(format!(
                "{}/{}/{}",
                collection, design, view
            )));
        };

        let include_docs = options.include_docs;
        let mut rows: Vec<Row> = self
            .load_documents(collection)
            .await?
            .into_iter()
            .flat_map(|doc| {
                let emitted = map(&doc.body);
                emitted.into_iter().map(move |(key, value)| Row {
                    id: doc.id.clone(),
                    key,
                    value,
                    doc: include_docs.then(|| doc.body.clone()),
                })
            })
            .collect();

        rows.sort_by(|a, b| a.key.cmp(&b.key).then_with(|| a.id.cmp(&b.id)));
        if options.descending {
            rows.reverse();
        }

        if let Some(start) = &options.start_key {
            rows.retain(|row| {
                if options.descending {
                    row.key <= *start
                } else {
                    row.key >= *start
                }
            });
        }

        if let Some(limit) = options.limit {
            rows.truncate(limit);
        }

        Ok(rows)
    }

    async fn find(
        &self,
        collection: &str,
        request: FindRequest,
    ) -> Result<Vec<Document>, StoreError> {
        if let Some(index) = &request.use_index {
            if !matches!(self.design(collection, index)?, Some(DesignDoc::Index { .. })) {
                warn!(
                    "Index {} is not defined on {}, scanning all documents",
                    index, collection
                );
            }
        }

        let mut docs: Vec<Document> = self
            .load_documents(collection)
            .await?
            .into_iter()
            .filter(|doc| request.selector.matches(&doc.body))
            .collect();

        // Stable sort: ties stay in id order
        docs.sort_by(|a, b| compare_by_fields(&a.body, &b.body, &request.sort));

        Ok(docs
            .into_iter()
            .skip(request.skip)
            .take(request.limit)
            .collect())
    }

    async fn all_docs(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        self.load_documents(collection).await
    }

    async fn create_design_doc(
        &self,
        collection: &str,
        id: &str,
        doc: DesignDoc,
    ) -> Result<(), StoreError> {
        let mut designs = self.designs.write().map_err(|_| StoreError::LockPoisoned)?;
        let key = (collection.to_string(), id.to_string());
        if designs.contains_key(&key) {
            return Err(StoreError::Conflict(format!("{}/{}", collection, id)));
        }

        debug!("Registered design document {}/{}: {:?}", collection, id, doc);
        designs.insert(key, doc);
        Ok(())
    }
}
