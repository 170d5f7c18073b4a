//! Tag parsing and semantic-version selection.
//!
//! Tags are normalised by dropping a single leading `v`/`V` (`v1.4.0` ->
//! `1.4.0`). The channel of a version is decided purely by the presence of a
//! pre-release component, never by where the version came from.

use std::cmp::Ordering;

use semver::Version;
use vcdn_schema::Channel;

/// Strip one leading `v`/`V` when it precedes a digit.
pub fn strip_tag_prefix(tag: &str) -> &str {
    let tag = tag.trim();
    match tag.strip_prefix(['v', 'V']) {
        Some(rest) if rest.starts_with(|c: char| c.is_ascii_digit()) => rest,
        _ => tag,
    }
}

/// Parse a tag as a semantic version, tolerating the `v` prefix.
pub fn parse_semver(tag: &str) -> Option<Version> {
    Version::parse(strip_tag_prefix(tag)).ok()
}

/// Channel implied by a version id.
///
/// Unparseable ids fall back to looking for a `-` suffix.
pub fn channel_of(version_id: &str) -> Channel {
    let is_pre = match parse_semver(version_id) {
        Some(v) => !v.pre.is_empty(),
        None => strip_tag_prefix(version_id).contains('-'),
    };
    if is_pre { Channel::Beta } else { Channel::Stable }
}

/// `(major, minor)` when `version_id` is a valid, non-prerelease semver.
pub fn stable_alias_parts(version_id: &str) -> Option<(u64, u64)> {
    parse_semver(version_id)
        .filter(|v| v.pre.is_empty())
        .map(|v| (v.major, v.minor))
}

/// Precedence ordering, ignoring build metadata.
fn precedence(a: &Version, b: &Version) -> Ordering {
    (a.major, a.minor, a.patch, &a.pre).cmp(&(b.major, b.minor, b.patch, &b.pre))
}

/// Highest semver among `items` whose prerelease-ness equals `prerelease`.
///
/// `items` is expected in host order (newest first). The sort is stable, so
/// between two equal versions the one the host listed first wins. Items
/// whose tag is not valid semver are ignored.
pub fn highest<'a, T>(
    items: &'a [T],
    tag_of: impl Fn(&T) -> &str,
    prerelease: bool,
) -> Option<(&'a T, Version)> {
    ranked(items, tag_of, |v| v.pre.is_empty() != prerelease)
}

/// Highest semver among `items` regardless of prerelease-ness.
pub fn highest_any<'a, T>(items: &'a [T], tag_of: impl Fn(&T) -> &str) -> Option<(&'a T, Version)> {
    ranked(items, tag_of, |_| true)
}

fn ranked<'a, T>(
    items: &'a [T],
    tag_of: impl Fn(&T) -> &str,
    keep: impl Fn(&Version) -> bool,
) -> Option<(&'a T, Version)> {
    let mut candidates: Vec<(&T, Version)> = items
        .iter()
        .filter_map(|item| parse_semver(tag_of(item)).map(|v| (item, v)))
        .filter(|(_, v)| keep(v))
        .collect();
    candidates.sort_by(|a, b| precedence(&b.1, &a.1));
    candidates.into_iter().next()
}
