//! Filtered, sorted and paginated app listings
//!
//! Sort fields and filter names are closed allow-lists. Each sort field is
//! served by its own prebuilt index; anything outside the lists falls back
//! to the default or is ignored.

use std::collections::BTreeMap;

use futures::future::try_join_all;
use serde_json::Value;
use tracing::debug;

use crate::catalog::finders::{Catalog, decode};
use crate::catalog::space::{AppIndex, Space};
use crate::catalog::types::App;
use crate::error::CatalogError;
use crate::store::{Condition, FindRequest, Selector, SortOrder, is_design_id};
use crate::version::channel::Channel;

/// Page size when none is requested
pub const DEFAULT_LIMIT: usize = 50;

/// Larger page sizes are clamped to this value
pub const MAX_LIMIT: usize = 200;

/// Cursor returned once the listing is exhausted
pub const END_OF_LIST: i64 = -1;

/// Indexes living in the apps collection: one per sort field plus the
/// maintenance index
const APP_INDEX_COUNT: usize = SortField::ALL.len() + 1;

/// Allow-listed sort fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    Slug,
    Type,
    Editor,
    CreatedAt,
}

impl SortField {
    pub const ALL: [SortField; 4] = [
        SortField::Slug,
        SortField::Type,
        SortField::Editor,
        SortField::CreatedAt,
    ];

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.as_str() == name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortField::Slug => "slug",
            SortField::Type => "type",
            SortField::Editor => "editor",
            SortField::CreatedAt => "created_at",
        }
    }

    /// Index serving listings sorted by this field
    pub fn index(&self) -> AppIndex {
        match self {
            SortField::Slug => AppIndex {
                name: "apps-index-by-slug",
                fields: &["slug"],
            },
            SortField::Type => AppIndex {
                name: "apps-index-by-type",
                fields: &["type", "slug"],
            },
            SortField::Editor => AppIndex {
                name: "apps-index-by-editor",
                fields: &["editor", "slug"],
            },
            SortField::CreatedAt => AppIndex {
                name: "apps-index-by-created_at",
                fields: &["created_at", "slug"],
            },
        }
    }
}

/// Sort field and direction of a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort {
    pub field: SortField,
    pub order: SortOrder,
}

impl Sort {
    /// Parse `field` or `-field`; an unknown or empty field sorts by slug,
    /// keeping the requested direction
    pub fn parse(sort: &str) -> Self {
        let (order, name) = match sort.strip_prefix('-') {
            Some(name) => (SortOrder::Desc, name),
            None => (SortOrder::Asc, sort),
        };
        let field = SortField::parse(name).unwrap_or_else(|| {
            if !name.is_empty() {
                debug!("Unknown sort field {:?}, sorting by slug", name);
            }
            SortField::default()
        });
        Self { field, order }
    }
}

/// Allow-listed filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterField {
    Type,
    Editor,
    Tags,
    Locales,
}

impl FilterField {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "type" => Some(FilterField::Type),
            "editor" => Some(FilterField::Editor),
            "tags" => Some(FilterField::Tags),
            "locales" => Some(FilterField::Locales),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterField::Type => "type",
            FilterField::Editor => "editor",
            FilterField::Tags => "tags",
            FilterField::Locales => "locales",
        }
    }

    /// Multi-valued fields take a comma-separated list and must contain all
    /// of it; the others compare for equality
    pub fn condition(&self, value: &str) -> Condition {
        match self {
            FilterField::Tags | FilterField::Locales => Condition::All(
                value
                    .split(',')
                    .map(|item| Value::String(item.to_string()))
                    .collect(),
            ),
            FilterField::Type | FilterField::Editor => {
                Condition::Eq(Value::String(value.to_string()))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppsListOptions {
    /// Page size, 0 for the default
    pub limit: usize,
    /// Offset of the first app to return
    pub cursor: usize,
    /// `field` or `-field` for a descending sort
    pub sort: String,
    pub filters: BTreeMap<String, String>,
    pub latest_version_channel: Channel,
    pub versions_channel: Channel,
}

impl Default for AppsListOptions {
    fn default() -> Self {
        Self {
            limit: 0,
            cursor: 0,
            sort: String::new(),
            filters: BTreeMap::new(),
            latest_version_channel: Channel::Stable,
            versions_channel: Channel::Stable,
        }
    }
}

fn page_size(limit: usize) -> usize {
    match limit {
        0 => DEFAULT_LIMIT,
        limit => limit.min(MAX_LIMIT),
    }
}

/// Translate listing options into a find request over the apps collection
pub fn build_find_request(options: &AppsListOptions) -> FindRequest {
    let sort = Sort::parse(&options.sort);
    let index = sort.field.index();

    let mut selector = Selector::new();
    for (name, value) in &options.filters {
        match FilterField::parse(name) {
            Some(filter) => selector = selector.with(filter.as_str(), filter.condition(value)),
            None => debug!("Ignoring unknown filter {:?}", name),
        }
    }
    if selector.is_empty() {
        selector = selector.with(sort.field.as_str(), Condition::Exists);
    }

    FindRequest {
        use_index: Some(index.name.to_string()),
        selector,
        sort: index
            .fields
            .iter()
            .map(|field| (field.to_string(), sort.order))
            .collect(),
        skip: options.cursor,
        limit: page_size(options.limit) + APP_INDEX_COUNT + 1,
    }
}

impl Catalog {
    /// One page of a space's apps, with computed fields
    ///
    /// Returns the cursor of the next page, or [`END_OF_LIST`] when there is
    /// none. An empty listing is not an error.
    pub async fn list_apps(
        &self,
        space: &Space,
        options: &AppsListOptions,
    ) -> Result<(i64, Vec<App>), CatalogError> {
        let limit = page_size(options.limit);
        let request = build_find_request(options);

        let mut apps = space
            .apps()
            .find(request)
            .await?
            .into_iter()
            .filter(|doc| !is_design_id(&doc.id))
            .map(|doc| decode::<App>(&doc.id, doc.body))
            .collect::<Result<Vec<_>, _>>()?;

        if apps.is_empty() {
            return Ok((END_OF_LIST, apps));
        }

        // One extra row was requested, so a full page alone means the end
        let cursor = if apps.len() > limit {
            apps.truncate(limit);
            (options.cursor + apps.len()) as i64
        } else {
            END_OF_LIST
        };

        let apps = try_join_all(apps.into_iter().map(|app| {
            self.populate_app(
                space,
                app,
                options.versions_channel,
                options.latest_version_channel,
            )
        }))
        .await?;

        Ok((cursor, apps))
    }
}
