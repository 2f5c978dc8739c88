//! Release channels

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

/// Release maturity tier of a version
///
/// Ordered by stability: `Stable > Beta > Dev`. A release of a more stable
/// channel is also a valid candidate for every less stable channel.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Dev,
    Beta,
    Stable,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Stable, Channel::Beta, Channel::Dev];

    /// Returns the string representation of the channel
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Stable => "stable",
            Channel::Beta => "beta",
            Channel::Dev => "dev",
        }
    }

    /// Whether a release of `self` may be served to a `requested` channel
    pub fn is_visible_in(&self, requested: Channel) -> bool {
        *self >= requested
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Channel {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stable" => Ok(Channel::Stable),
            "beta" => Ok(Channel::Beta),
            "dev" => Ok(Channel::Dev),
            _ => Err(CatalogError::InvalidChannel(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("stable", Some(Channel::Stable))]
    #[case("beta", Some(Channel::Beta))]
    #[case("dev", Some(Channel::Dev))]
    #[case("Stable", None)]
    #[case("", None)]
    fn from_str_returns_expected(#[case] input: &str, #[case] expected: Option<Channel>) {
        assert_eq!(input.parse::<Channel>().ok(), expected);
    }

    #[rstest]
    #[case(Channel::Stable, Channel::Dev, true)]
    #[case(Channel::Stable, Channel::Beta, true)]
    #[case(Channel::Beta, Channel::Beta, true)]
    #[case(Channel::Beta, Channel::Stable, false)]
    #[case(Channel::Dev, Channel::Beta, false)]
    #[case(Channel::Dev, Channel::Dev, true)]
    fn is_visible_in_follows_stability_order(
        #[case] release: Channel,
        #[case] requested: Channel,
        #[case] expected: bool,
    ) {
        assert_eq!(release.is_visible_in(requested), expected);
    }

    #[test]
    fn serializes_as_lowercase_name() {
        assert_eq!(
            serde_json::to_string(&Channel::Beta).unwrap(),
            "\"beta\"".to_string()
        );
    }
}
