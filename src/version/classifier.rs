//! Version classification and ordering
//!
//! Version strings are not required to be strict semver. The channel is
//! read from marker substrings and the ordering key from the first three
//! dot-separated numeric components:
//!
//! - `1.2.3` -> stable, key (1, 2, 3, 1, 0)
//! - `1.2.3-beta.2` -> beta, key (1, 2, 3, 0, 2)
//! - `1.2.3-dev.abc123` -> dev, key (1, 2, 3, 0, 0)
//! - `latest` -> stable, key (0, 0, 0, 1, 0)

use std::sync::LazyLock;

use regex::Regex;

use crate::version::channel::Channel;

const DEV_MARKER: &str = "-dev.";
const BETA_MARKER: &str = "-beta.";

static SLUG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9\-]*$").expect("slug pattern"));

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(0|[1-9][0-9]{0,4})\.(0|[1-9][0-9]{0,4})\.(0|[1-9][0-9]{0,4})(-dev\.[a-z0-9]{1,40}|-beta\.(0|[1-9][0-9]{0,4}))?$",
    )
    .expect("version pattern")
});

/// Check an application slug before it reaches the store or the cache
pub fn is_valid_slug(slug: &str) -> bool {
    SLUG_RE.is_match(slug)
}

/// Check a version string before it reaches the store or the cache
pub fn is_valid_version(version: &str) -> bool {
    VERSION_RE.is_match(version)
}

/// Total order over version strings
///
/// Field order is the comparison order: numeric triple, then a stable
/// release after every pre-release with the same triple, then the beta
/// sequence number, then the creation timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct OrderingKey {
    pub major: i64,
    pub minor: i64,
    pub patch: i64,
    /// 1 for stable, 0 otherwise
    pub code: i64,
    /// Beta pre-release sequence (`beta.N`), 0 for stable and dev
    pub sequence: i64,
    /// Creation time in milliseconds since the UNIX epoch
    pub timestamp: i64,
}

impl OrderingKey {
    pub fn with_timestamp(self, timestamp: i64) -> Self {
        Self { timestamp, ..self }
    }

    /// The numeric triple only
    pub fn triple(&self) -> (i64, i64, i64) {
        (self.major, self.minor, self.patch)
    }

    /// Flatten into a secondary-index key
    pub fn to_index_key(&self) -> Vec<i64> {
        vec![
            self.major,
            self.minor,
            self.patch,
            self.code,
            self.sequence,
            self.timestamp,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub channel: Channel,
    pub key: OrderingKey,
}

/// Get the channel of a version string from its marker substrings
pub fn channel_of(version: &str) -> Channel {
    if version.contains(DEV_MARKER) {
        Channel::Dev
    } else if version.contains(BETA_MARKER) {
        Channel::Beta
    } else {
        Channel::Stable
    }
}

/// Classify a version string into its channel and ordering key
///
/// Never fails: an unparseable numeric triple yields (0, 0, 0), the lowest
/// possible key. The timestamp component is left at 0.
pub fn classify(version: &str) -> Classification {
    let channel = channel_of(version);
    let parts: Vec<&str> = version.split('.').collect();

    let (major, minor, patch) = parse_triple(&parts).unwrap_or((0, 0, 0));

    let sequence = match channel {
        Channel::Beta => parts
            .get(3)
            .and_then(|s| leading_number(s))
            .unwrap_or(0),
        _ => 0,
    };

    Classification {
        channel,
        key: OrderingKey {
            major,
            minor,
            patch,
            code: if channel == Channel::Stable { 1 } else { 0 },
            sequence,
            timestamp: 0,
        },
    }
}

fn parse_triple(parts: &[&str]) -> Option<(i64, i64, i64)> {
    if parts.len() < 3 {
        return None;
    }
    let major = leading_number(parts[0])?;
    let minor = leading_number(parts[1])?;
    // The patch component may carry a `-suffix`
    let patch = leading_number(parts[2].split('-').next().unwrap_or_default())?;
    Some((major, minor, patch))
}

/// Parse the leading run of ASCII digits, ignoring whatever follows
fn leading_number(s: &str) -> Option<i64> {
    let end = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    s[..end].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1.2.3", Channel::Stable)]
    #[case("1.2.3-beta.1", Channel::Beta)]
    #[case("1.2.3-dev.abc", Channel::Dev)]
    #[case("1.2.3-beta.1-dev.abc", Channel::Dev)] // dev marker wins
    #[case("1.2.3-beta", Channel::Stable)] // marker needs the trailing dot
    #[case("1.2.3-rc.1", Channel::Stable)]
    #[case("garbage", Channel::Stable)]
    fn channel_of_uses_marker_substrings(#[case] version: &str, #[case] expected: Channel) {
        assert_eq!(channel_of(version), expected);
    }

    #[rstest]
    #[case("1.2.3", (1, 2, 3, 1, 0))]
    #[case("1.2.3-beta.4", (1, 2, 3, 0, 4))]
    #[case("1.2.3-dev.7", (1, 2, 3, 0, 0))]
    #[case("10.20.30", (10, 20, 30, 1, 0))]
    #[case("1.2", (0, 0, 0, 1, 0))]
    #[case("v1.2.3", (0, 0, 0, 1, 0))]
    #[case("1.x.3", (0, 0, 0, 1, 0))]
    #[case("", (0, 0, 0, 1, 0))]
    #[case("1.2.3-beta.x", (1, 2, 3, 0, 0))]
    fn classify_returns_expected_key(
        #[case] version: &str,
        #[case] expected: (i64, i64, i64, i64, i64),
    ) {
        let key = classify(version).key;
        assert_eq!(
            (key.major, key.minor, key.patch, key.code, key.sequence),
            expected
        );
    }

    #[test]
    fn unparseable_version_has_the_lowest_numeric_key() {
        let broken = classify("not-a-version").key;
        let lowest = classify("0.0.0").key;
        assert_eq!(broken.triple(), (0, 0, 0));
        assert!(broken <= lowest);
    }

    #[rstest]
    #[case("1.2.3-beta.1", "1.2.3-beta.2")]
    #[case("1.2.3-beta.2", "1.2.3")]
    #[case("1.2.3-dev.abc", "1.2.3")]
    #[case("1.9.0", "1.10.0")]
    #[case("1.10.0", "2.0.0")]
    #[case("1.2.3", "1.2.4-beta.1")]
    fn ordering_is_numeric_then_channel_then_sequence(
        #[case] lower: &str,
        #[case] higher: &str,
    ) {
        assert!(classify(lower).key < classify(higher).key);
    }

    #[test]
    fn timestamp_breaks_remaining_ties() {
        let earlier = classify("1.0.0-dev.aaa").key.with_timestamp(1_000);
        let later = classify("1.0.0-dev.bbb").key.with_timestamp(2_000);
        assert!(earlier < later);
    }

    #[rstest]
    #[case("my-app", true)]
    #[case("app2", true)]
    #[case("My-App", false)]
    #[case("my_app", false)]
    #[case("-app", false)]
    #[case("", false)]
    fn is_valid_slug_returns_expected(#[case] slug: &str, #[case] expected: bool) {
        assert_eq!(is_valid_slug(slug), expected);
    }

    #[rstest]
    #[case("1.0.0", true)]
    #[case("0.12.3", true)]
    #[case("1.0.0-beta.2", true)]
    #[case("1.0.0-dev.3f2a9c", true)]
    #[case("01.0.0", false)]
    #[case("1.0", false)]
    #[case("1.0.0-rc.1", false)]
    #[case("1.0.0-beta.", false)]
    fn is_valid_version_returns_expected(#[case] version: &str, #[case] expected: bool) {
        assert_eq!(is_valid_version(version), expected);
    }
}
