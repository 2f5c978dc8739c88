//! Catalog documents and computed aggregates

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::version::classifier::{channel_of, classify};
use crate::version::channel::Channel;

/// Permission doctypes with this prefix grant access to remote services
const REMOTE_DOCTYPE_PREFIX: &str = "io.cozy.remote";

/// Document id of an app
pub fn app_id(slug: &str) -> String {
    slug.to_lowercase()
}

/// Document id of a version: `<slug>-<version>`
pub fn version_id(slug: &str, version: &str) -> String {
    format!("{}-{}", app_id(slug), version)
}

/// Who committed to keeping user data private
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataUsageCommitment {
    UserReserved,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitmentBy {
    /// The registry operator
    Operator,
    Editor,
    None,
}

/// Trust label shown next to an app
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Label {
    A,
    B,
    C,
    D,
}

/// An application entry of a space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct App {
    #[serde(rename = "_id", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(rename = "_rev", default, skip_serializing_if = "String::is_empty")]
    pub rev: String,
    pub slug: String,
    #[serde(rename = "type", default)]
    pub app_type: String,
    #[serde(default)]
    pub editor: String,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub locales: Vec<String>,
    #[serde(default)]
    pub maintenance_activated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance_options: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_usage_commitment: Option<DataUsageCommitment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_usage_commitment_by: Option<CommitmentBy>,

    // Computed on every read, never taken from the stored document
    #[serde(skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub label: Option<Label>,
    #[serde(skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub latest_version: Option<Version>,
    #[serde(skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub versions: Option<AppVersions>,
}

impl App {
    /// Fill in the data usage commitment when the document carries none
    pub fn apply_default_commitment(&mut self) {
        self.data_usage_commitment
            .get_or_insert(DataUsageCommitment::None);
        self.data_usage_commitment_by.get_or_insert(CommitmentBy::None);
    }
}

/// A published or pending release of an app
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    #[serde(rename = "_id", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(rename = "_rev", default, skip_serializing_if = "String::is_empty")]
    pub rev: String,
    pub slug: String,
    #[serde(default)]
    pub editor: String,
    #[serde(rename = "type", default)]
    pub app_type: String,
    pub version: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub sha256: String,
    #[serde(default)]
    pub manifest: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tar_prefix: Option<String>,
    #[serde(
        rename = "_attachments",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub attachments: Option<Map<String, Value>>,
}

impl Version {
    /// Drop the storage id, revision and attachment stubs
    pub fn without_storage_identity(mut self) -> Self {
        self.id.clear();
        self.rev.clear();
        self.attachments = None;
        self
    }

    /// Whether the manifest asks for a permission on a remote doctype
    pub fn requests_remote_access(&self) -> bool {
        self.manifest
            .get("permissions")
            .and_then(Value::as_object)
            .is_some_and(|permissions| {
                permissions.values().any(|permission| {
                    permission
                        .get("type")
                        .and_then(Value::as_str)
                        .is_some_and(|doctype| doctype.starts_with(REMOTE_DOCTYPE_PREFIX))
                })
            })
    }
}

/// Version strings of an app split by channel, each oldest first
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AppVersions {
    pub has_versions: bool,
    #[serde(default)]
    pub stable: Vec<String>,
    #[serde(default)]
    pub beta: Vec<String>,
    #[serde(default)]
    pub dev: Vec<String>,
}

impl AppVersions {
    /// Split an ordered list of every version of an app by channel
    pub fn partition(ordered: Vec<String>) -> Self {
        let mut versions = Self {
            has_versions: !ordered.is_empty(),
            ..Self::default()
        };
        for version in ordered {
            match channel_of(&version) {
                Channel::Stable => versions.stable.push(version),
                Channel::Beta => versions.beta.push(version),
                Channel::Dev => versions.dev.push(version),
            }
        }
        versions
    }

    pub fn for_channel(&self, channel: Channel) -> &[String] {
        match channel {
            Channel::Stable => &self.stable,
            Channel::Beta => &self.beta,
            Channel::Dev => &self.dev,
        }
    }

    /// Lists as seen from `channel`, where less stable channels also carry
    /// every more stable release
    ///
    /// The stable list is always filled. The beta list holds stable + beta
    /// when `channel` is beta or dev, and the dev list holds every version
    /// when `channel` is dev. Lists not visible from `channel` are empty.
    pub fn concatenated(&self, channel: Channel) -> Self {
        let beta = if Channel::Beta.is_visible_in(channel) {
            merge_ordered(&[&self.beta, &self.stable])
        } else {
            Vec::new()
        };
        let dev = if channel == Channel::Dev {
            merge_ordered(&[&self.dev, &self.beta, &self.stable])
        } else {
            Vec::new()
        };

        Self {
            has_versions: self.has_versions,
            stable: self.stable.clone(),
            beta,
            dev,
        }
    }
}

/// Merge ordered lists into one list ordered by version key
///
/// The sort is stable so entries with equal keys keep their list order.
fn merge_ordered(lists: &[&[String]]) -> Vec<String> {
    let mut merged: Vec<String> = lists.iter().flat_map(|list| list.iter().cloned()).collect();
    merged.sort_by_key(|version| classify(version).key);
    merged
}

/// Compute the trust label of an app from its commitment and latest release
pub fn compute_label(app: &App, latest: Option<&Version>) -> Label {
    match (app.data_usage_commitment, app.data_usage_commitment_by) {
        (Some(DataUsageCommitment::UserReserved), Some(CommitmentBy::Operator)) => Label::A,
        (Some(DataUsageCommitment::UserReserved), Some(CommitmentBy::Editor)) => Label::B,
        _ if latest.is_some_and(Version::requests_remote_access) => Label::D,
        _ => Label::C,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn strings(versions: &[&str]) -> Vec<String> {
        versions.iter().map(|s| s.to_string()).collect()
    }

    fn version_with_manifest(manifest: Value) -> Version {
        serde_json::from_value(json!({
            "slug": "drive",
            "version": "1.0.0",
            "created_at": "2024-01-01T00:00:00Z",
            "manifest": manifest,
        }))
        .unwrap()
    }

    #[test]
    fn partition_splits_by_channel_keeping_order() {
        let versions = AppVersions::partition(strings(&[
            "1.0.0",
            "1.1.0-beta.1",
            "1.1.0-dev.abc",
            "1.1.0",
        ]));

        assert_eq!(
            versions,
            AppVersions {
                has_versions: true,
                stable: strings(&["1.0.0", "1.1.0"]),
                beta: strings(&["1.1.0-beta.1"]),
                dev: strings(&["1.1.0-dev.abc"]),
            }
        );
    }

    #[test]
    fn partition_of_empty_list_has_no_versions() {
        assert!(!AppVersions::partition(Vec::new()).has_versions);
    }

    #[rstest]
    #[case(Channel::Stable, &["1.0.0", "1.1.0"], &[], &[])]
    #[case(
        Channel::Beta,
        &["1.0.0", "1.1.0"],
        &["1.0.0", "1.1.0-beta.1", "1.1.0"],
        &[]
    )]
    #[case(
        Channel::Dev,
        &["1.0.0", "1.1.0"],
        &["1.0.0", "1.1.0-beta.1", "1.1.0"],
        &["1.0.0", "1.1.0-dev.abc", "1.1.0-beta.1", "1.1.0"]
    )]
    fn concatenated_inherits_more_stable_releases(
        #[case] channel: Channel,
        #[case] stable: &[&str],
        #[case] beta: &[&str],
        #[case] dev: &[&str],
    ) {
        let versions = AppVersions::partition(strings(&[
            "1.0.0",
            "1.1.0-beta.1",
            "1.1.0-dev.abc",
            "1.1.0",
        ]));

        let concatenated = versions.concatenated(channel);

        assert_eq!(concatenated.stable, strings(stable));
        assert_eq!(concatenated.beta, strings(beta));
        assert_eq!(concatenated.dev, strings(dev));
    }

    #[test]
    fn computed_fields_are_ignored_when_reading_a_stored_app() {
        let app: App = serde_json::from_value(json!({
            "slug": "drive",
            "label": "A",
            "latest_version": {"slug": "drive", "version": "9.9.9", "created_at": "2024-01-01T00:00:00Z"},
            "versions": {"has_versions": true},
        }))
        .unwrap();

        assert_eq!(app.label, None);
        assert_eq!(app.latest_version, None);
        assert_eq!(app.versions, None);
    }

    #[test]
    fn without_storage_identity_clears_id_rev_and_attachments() {
        let mut version = version_with_manifest(json!({}));
        version.id = "drive-1.0.0".to_string();
        version.rev = "1-abc".to_string();
        version.attachments = Some(Map::new());

        let stripped = version.without_storage_identity();
        let serialized = serde_json::to_value(&stripped).unwrap();

        assert!(serialized.get("_id").is_none());
        assert!(serialized.get("_rev").is_none());
        assert!(serialized.get("_attachments").is_none());
    }

    #[rstest]
    #[case(Some(DataUsageCommitment::UserReserved), Some(CommitmentBy::Operator), json!({}), Label::A)]
    #[case(Some(DataUsageCommitment::UserReserved), Some(CommitmentBy::Editor), json!({}), Label::B)]
    #[case(Some(DataUsageCommitment::None), Some(CommitmentBy::None), json!({}), Label::C)]
    #[case(
        Some(DataUsageCommitment::None),
        Some(CommitmentBy::None),
        json!({"permissions": {"remote": {"type": "io.cozy.remote.requests"}}}),
        Label::D
    )]
    #[case(
        Some(DataUsageCommitment::UserReserved),
        Some(CommitmentBy::Operator),
        json!({"permissions": {"remote": {"type": "io.cozy.remote.requests"}}}),
        Label::A
    )]
    fn compute_label_returns_expected(
        #[case] commitment: Option<DataUsageCommitment>,
        #[case] by: Option<CommitmentBy>,
        #[case] manifest: Value,
        #[case] expected: Label,
    ) {
        let mut app: App = serde_json::from_value(json!({"slug": "drive"})).unwrap();
        app.data_usage_commitment = commitment;
        app.data_usage_commitment_by = by;
        let latest = version_with_manifest(manifest);

        assert_eq!(compute_label(&app, Some(&latest)), expected);
    }

    #[test]
    fn compute_label_without_latest_version_is_c() {
        let mut app: App = serde_json::from_value(json!({"slug": "drive"})).unwrap();
        app.apply_default_commitment();

        assert_eq!(compute_label(&app, None), Label::C);
    }
}
