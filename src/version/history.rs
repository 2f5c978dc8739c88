//! Windowing over a channel's version history
//!
//! Given the full version list of a channel and its latest version, select
//! the last N majors and, within each, the last M versions.

use crate::version::classifier::{OrderingKey, classify};

/// Highest version with the same major whose numeric triple is strictly
/// lower than `current`'s
pub fn previous_minor<'a>(current: &str, versions: &'a [String]) -> Option<&'a str> {
    let current = classify(current).key;
    highest_where(versions, |key| {
        key.major == current.major && key.triple() < current.triple()
    })
}

/// Highest version with a strictly lower major than `current`
pub fn previous_major<'a>(current: &str, versions: &'a [String]) -> Option<&'a str> {
    let current = classify(current).key;
    highest_where(versions, |key| key.major < current.major)
}

/// Select up to `n_minor` versions for each of up to `n_major` majors,
/// newest first, starting from `latest`
///
/// Stops without error when no previous version or previous major exists,
/// so the result may hold fewer entries than requested.
pub fn select_last_n(
    latest: &str,
    versions: &[String],
    n_major: usize,
    n_minor: usize,
) -> Vec<String> {
    let mut selected = Vec::new();
    if n_major == 0 || n_minor == 0 {
        return selected;
    }

    let mut major_start = latest.to_string();
    for _ in 0..n_major {
        let mut minor = major_start.clone();
        selected.push(minor.clone());

        for _ in 1..n_minor {
            let Some(previous) = previous_minor(&minor, versions) else {
                break;
            };
            minor = previous.to_string();
            selected.push(minor.clone());
        }

        match previous_major(&major_start, versions) {
            Some(previous) => major_start = previous.to_string(),
            None => break,
        }
    }

    selected
}

fn highest_where<'a>(
    versions: &'a [String],
    predicate: impl Fn(&OrderingKey) -> bool,
) -> Option<&'a str> {
    versions
        .iter()
        .map(|v| (classify(v).key, v))
        .filter(|(key, _)| predicate(key))
        // max_by_key keeps the last of equal keys, i.e. the most recent entry
        .max_by_key(|(key, _)| *key)
        .map(|(_, v)| v.as_str())
}
