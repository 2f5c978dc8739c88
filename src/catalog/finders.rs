//! Catalog lookups: apps, versions, latest and last-N resolution
//!
//! Every entry point validates its identifiers before touching the cache or
//! the store. Store failures are propagated unchanged; cache failures are
//! never visible here.

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::cache::VersionCache;
use crate::catalog::query::SortField;
use crate::catalog::space::{
    BY_DATE_DESIGN, Collection, MAINTENANCE_INDEX, Space, by_date_design, versions_design_id,
};
use crate::catalog::types::{App, AppVersions, Version, app_id, compute_label, version_id};
use crate::error::{CatalogError, StoreError};
use crate::store::{Condition, FindRequest, QueryOptions, Row, Selector, is_design_id};
use crate::version::channel::Channel;
use crate::version::classifier::{is_valid_slug, is_valid_version};
use crate::version::history::select_last_n;

/// Upper bound on the versions read for one app
const VERSIONS_QUERY_LIMIT: usize = 2000;

/// Upper bound on the apps of the maintenance listing
const MAINTENANCE_LIMIT: usize = 1000;

/// Read/query engine over the spaces of a registry
#[derive(Clone)]
pub struct Catalog {
    cache: VersionCache,
}

impl Catalog {
    pub fn new(cache: VersionCache) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &VersionCache {
        &self.cache
    }

    /// Create the app indexes and by-date views of a space
    pub async fn prepare_space(&self, space: &Space) -> Result<(), CatalogError> {
        let indexes: Vec<_> = SortField::ALL.iter().map(SortField::index).collect();
        space.prepare(&indexes).await?;
        Ok(())
    }

    /// Fetch an app with its computed fields
    ///
    /// Version lists are those seen from `channel`; the latest version is
    /// always the latest stable one.
    pub async fn find_app(
        &self,
        space: &Space,
        slug: &str,
        channel: Channel,
    ) -> Result<App, CatalogError> {
        validate_slug(slug)?;

        let id = app_id(slug);
        let Some(doc) = space.apps().get(&id).await? else {
            return Err(CatalogError::AppNotFound(slug.to_string()));
        };
        let app = decode(&doc.id, doc.body)?;

        self.populate_app(space, app, channel, Channel::Stable)
            .await
    }

    /// Fill the computed fields of an app read from the store
    pub(crate) async fn populate_app(
        &self,
        space: &Space,
        mut app: App,
        versions_channel: Channel,
        latest_channel: Channel,
    ) -> Result<App, CatalogError> {
        app.apply_default_commitment();

        let versions = self
            .find_app_versions(space, &app.slug, versions_channel, true)
            .await?;
        let latest = match self
            .find_latest_version(space, &app.slug, latest_channel)
            .await
        {
            Ok(version) => Some(version),
            Err(CatalogError::VersionNotFound(_)) => None,
            Err(e) => return Err(e),
        };

        app.label = Some(compute_label(&app, latest.as_ref()));
        app.latest_version = latest;
        app.versions = Some(versions);
        Ok(app)
    }

    /// Version strings of an app by channel, oldest first
    ///
    /// With `concat`, less stable lists also carry the more stable releases
    /// visible from `channel`.
    pub async fn find_app_versions(
        &self,
        space: &Space,
        slug: &str,
        channel: Channel,
        concat: bool,
    ) -> Result<AppVersions, CatalogError> {
        validate_slug(slug)?;

        let versions = match self.cache.get_versions(space.prefix(), slug, channel).await {
            Some(versions) => versions,
            None => {
                let rows = self
                    .query_versions_view(
                        space,
                        slug,
                        Channel::Dev,
                        QueryOptions {
                            limit: Some(VERSIONS_QUERY_LIMIT),
                            ..QueryOptions::default()
                        },
                    )
                    .await?;
                let ordered = rows
                    .into_iter()
                    .filter_map(|row| match row.value {
                        Value::String(version) => Some(version),
                        _ => None,
                    })
                    .collect();

                let versions = AppVersions::partition(ordered);
                self.cache
                    .put_versions(space.prefix(), slug, channel, &versions)
                    .await;
                versions
            }
        };

        Ok(if concat {
            versions.concatenated(channel)
        } else {
            versions
        })
    }

    /// Latest version of an app visible in `channel`
    ///
    /// The result never carries the storage id, revision or attachment stubs.
    pub async fn find_latest_version(
        &self,
        space: &Space,
        slug: &str,
        channel: Channel,
    ) -> Result<Version, CatalogError> {
        validate_slug(slug)?;

        if let Some(version) = self.cache.get_latest(space.prefix(), slug, channel).await {
            return Ok(version);
        }

        let rows = self
            .query_versions_view(
                space,
                slug,
                channel,
                QueryOptions {
                    limit: Some(1),
                    descending: true,
                    include_docs: true,
                    start_key: None,
                },
            )
            .await?;

        let Some(Row {
            id, doc: Some(doc), ..
        }) = rows.into_iter().next()
        else {
            return Err(CatalogError::VersionNotFound(format!("{}@{}", slug, channel)));
        };

        let latest = decode::<Version>(&id, doc)?.without_storage_identity();
        self.cache
            .put_latest(space.prefix(), slug, channel, &latest)
            .await;
        Ok(latest)
    }

    /// Look a version up in the pending collection, then the published one
    pub async fn find_version(
        &self,
        space: &Space,
        slug: &str,
        version: &str,
    ) -> Result<Version, CatalogError> {
        validate_version_id(slug, version)?;
        lookup_version(slug, version, &[space.pending(), space.versions()]).await
    }

    pub async fn find_pending_version(
        &self,
        space: &Space,
        slug: &str,
        version: &str,
    ) -> Result<Version, CatalogError> {
        validate_version_id(slug, version)?;
        lookup_version(slug, version, &[space.pending()]).await
    }

    pub async fn find_published_version(
        &self,
        space: &Space,
        slug: &str,
        version: &str,
    ) -> Result<Version, CatalogError> {
        validate_version_id(slug, version)?;
        lookup_version(slug, version, &[space.versions()]).await
    }

    /// The last `n_minor` versions of each of the last `n_major` majors of a
    /// channel, newest first
    ///
    /// Fails with `VersionNotFound` when the channel has no version at all.
    /// Running out of previous versions ends the walk early without error.
    pub async fn find_last_n_versions(
        &self,
        space: &Space,
        slug: &str,
        channel: Channel,
        n_major: usize,
        n_minor: usize,
    ) -> Result<Vec<Version>, CatalogError> {
        let versions = self.find_app_versions(space, slug, channel, true).await?;
        let latest = self.find_latest_version(space, slug, channel).await?;

        let candidates = versions.for_channel(channel);
        if candidates.is_empty() {
            return Err(CatalogError::VersionNotFound(format!("{}@{}", slug, channel)));
        }

        let selected = select_last_n(&latest.version, candidates, n_major, n_minor);
        debug!(
            "Selected {} versions of {} on {} ({} majors x {} minors)",
            selected.len(),
            slug,
            channel,
            n_major,
            n_minor
        );

        self.fetch_versions(space, slug, &selected).await
    }

    /// Full records of a channel's own versions, oldest first
    pub async fn get_app_channel_versions(
        &self,
        space: &Space,
        slug: &str,
        channel: Channel,
    ) -> Result<Vec<Version>, CatalogError> {
        let versions = self.find_app_versions(space, slug, channel, false).await?;
        self.fetch_versions(space, slug, versions.for_channel(channel))
            .await
    }

    /// Published versions of `channel` created at or after `since`, oldest
    /// first
    ///
    /// Fails with `VersionNotFound` when no version of the channel, of any
    /// app, was created since then.
    pub async fn find_versions_since(
        &self,
        space: &Space,
        slug: &str,
        channel: Channel,
        since: DateTime<Utc>,
    ) -> Result<Vec<Version>, CatalogError> {
        validate_slug(slug)?;

        let options = QueryOptions {
            include_docs: true,
            start_key: Some(vec![since.timestamp_millis()]),
            ..QueryOptions::default()
        };
        let collection = space.versions();
        let rows = match collection
            .query(BY_DATE_DESIGN, channel.as_str(), options.clone())
            .await
        {
            Err(StoreError::NotFound(_)) => {
                collection
                    .ensure_design(BY_DATE_DESIGN, by_date_design())
                    .await?;
                collection
                    .query(BY_DATE_DESIGN, channel.as_str(), options)
                    .await?
            }
            result => result?,
        };

        if rows.is_empty() {
            return Err(CatalogError::VersionNotFound(format!(
                "{}@{} since {}",
                slug, channel, since
            )));
        }

        rows.into_iter()
            .filter(|row| row.value.as_str() == Some(slug))
            .filter_map(|row| row.doc.map(|doc| (row.id, doc)))
            .map(|(id, doc)| decode(&id, doc))
            .collect()
    }

    /// Every version awaiting publication in a space
    pub async fn get_pending_versions(&self, space: &Space) -> Result<Vec<Version>, CatalogError> {
        space
            .pending()
            .all_docs()
            .await?
            .into_iter()
            .filter(|doc| !is_design_id(&doc.id))
            .map(|doc| decode(&doc.id, doc.body))
            .collect()
    }

    /// Apps whose maintenance flag is set, with their computed fields
    pub async fn get_apps_in_maintenance(&self, space: &Space) -> Result<Vec<App>, CatalogError> {
        let docs = space
            .apps()
            .find(FindRequest {
                use_index: Some(MAINTENANCE_INDEX.name.to_string()),
                selector: Selector::new()
                    .with("maintenance_activated", Condition::Eq(Value::Bool(true))),
                sort: Vec::new(),
                skip: 0,
                limit: MAINTENANCE_LIMIT,
            })
            .await?;

        let apps = docs
            .into_iter()
            .filter(|doc| !is_design_id(&doc.id))
            .map(|doc| decode::<App>(&doc.id, doc.body))
            .collect::<Result<Vec<_>, _>>()?;

        try_join_all(
            apps.into_iter()
                .map(|app| self.populate_app(space, app, Channel::Stable, Channel::Stable)),
        )
        .await
    }

    /// Query one of the app's version views, creating them when missing
    async fn query_versions_view(
        &self,
        space: &Space,
        slug: &str,
        channel: Channel,
        options: QueryOptions,
    ) -> Result<Vec<Row>, CatalogError> {
        let design = versions_design_id(slug);
        let collection = space.versions();

        match collection
            .query(&design, channel.as_str(), options.clone())
            .await
        {
            Err(StoreError::NotFound(_)) => {
                debug!("Creating version views of {} in {:?}", slug, space.name());
                space.ensure_versions_views(slug).await?;
                Ok(collection.query(&design, channel.as_str(), options).await?)
            }
            result => Ok(result?),
        }
    }

    /// Re-fetch version strings as full records, keeping their order
    async fn fetch_versions(
        &self,
        space: &Space,
        slug: &str,
        versions: &[String],
    ) -> Result<Vec<Version>, CatalogError> {
        // Stored version strings are trusted; only caller input is validated
        let collections = [space.pending(), space.versions()];
        try_join_all(
            versions
                .iter()
                .map(|version| lookup_version(slug, version, &collections)),
        )
        .await
    }
}

fn validate_slug(slug: &str) -> Result<(), CatalogError> {
    if is_valid_slug(slug) {
        Ok(())
    } else {
        Err(CatalogError::InvalidSlug(slug.to_string()))
    }
}

fn validate_version_id(slug: &str, version: &str) -> Result<(), CatalogError> {
    validate_slug(slug)?;
    if is_valid_version(version) {
        Ok(())
    } else {
        Err(CatalogError::InvalidVersion(version.to_string()))
    }
}

/// First match across `collections`, in order
async fn lookup_version(
    slug: &str,
    version: &str,
    collections: &[&Collection],
) -> Result<Version, CatalogError> {
    let id = version_id(slug, version);
    for collection in collections {
        if let Some(doc) = collection.get(&id).await? {
            return decode(&doc.id, doc.body);
        }
    }
    Err(CatalogError::VersionNotFound(id))
}

pub(crate) fn decode<T: DeserializeOwned>(id: &str, body: Value) -> Result<T, CatalogError> {
    serde_json::from_value(body).map_err(|source| CatalogError::MalformedDocument {
        id: id.to_string(),
        source,
    })
}
