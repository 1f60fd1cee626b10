//! Repository tag normalization, ordering and selection
//!
//! Tags are ordered by semantic version when they parse as one, and by a
//! numeric-aware comparison otherwise ("release-9" < "release-10").

use semver::Version;
use serde::Serialize;
use std::cmp::Ordering;

use crate::reference::UNDEFINED_VERSION;

/// How the requested version relates to the tags the repository has
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TagState {
    /// The requested tag exists
    Valid,
    /// The requested tag does not exist, the newest one is used instead
    Invalid,
    /// Nothing was requested, the newest tag is used
    Undefined,
}

/// A repository tag plus the form used for comparison
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// Name as it exists in the repository, used for checkout
    pub name: String,
    pub normalized: String,
}

impl Tag {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            normalized: normalize(name),
        }
    }
}

/// Outcome of matching a requested version against the ordered tags
#[derive(Debug, PartialEq, Eq)]
pub struct TagSelection<'a> {
    pub state: TagState,
    /// `None` only when the repository has no tags
    pub tag: Option<&'a Tag>,
    /// Version reported back to the user
    pub version: Option<String>,
}

/// Remove the first `v` of a tag.
///
/// Meant for `v1.2.3` but applied wherever the first `v` sits, so "1.0.0-dev"
/// becomes "1.0.0-de". Kept as is; see DESIGN.md.
pub fn normalize(tag: &str) -> String {
    tag.replacen('v', "", 1)
}

/// Sort tags ascending.
///
/// Semantic versions are ordered among themselves, other tags among
/// themselves, and the two runs are merged with [`compare`].
/// Merging two sorted runs keeps the result deterministic even though the mixed
/// comparison is not a total order across both groups.
pub fn sort(tags: Vec<Tag>) -> Vec<Tag> {
    let (mut versions, mut others): (Vec<(Version, Tag)>, Vec<Tag>) = (Vec::new(), Vec::new());
    for tag in tags {
        match Version::parse(&tag.normalized) {
            Ok(version) => versions.push((version, tag)),
            Err(_) => others.push(tag),
        }
    }

    versions.sort_by(|(a, a_tag), (b, b_tag)| a.cmp(b).then_with(|| a_tag.name.cmp(&b_tag.name)));
    others.sort_by(|a, b| compare_numeric(&a.normalized, &b.normalized));

    let mut sorted = Vec::with_capacity(versions.len() + others.len());
    let mut versions = versions.into_iter().map(|(_, tag)| tag).peekable();
    let mut others = others.into_iter().peekable();

    loop {
        let take_version = match (versions.peek(), others.peek()) {
            (Some(v), Some(o)) => compare(&v.normalized, &o.normalized) != Ordering::Greater,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => break,
        };
        let next = if take_version {
            versions.next()
        } else {
            others.next()
        };
        sorted.extend(next);
    }

    sorted
}

/// Compare two tags: semver when both parse, numeric-aware otherwise
pub fn compare(a: &str, b: &str) -> Ordering {
    match (Version::parse(a), Version::parse(b)) {
        (Ok(left), Ok(right)) => left.cmp(&right),
        _ => compare_numeric(a, b),
    }
}

/// Lexicographic comparison that treats digit runs as numbers
pub fn compare_numeric(a: &str, b: &str) -> Ordering {
    let left = chunks(a);
    let right = chunks(b);

    for (x, y) in left.iter().zip(right.iter()) {
        let ordering = compare_chunk(x, y);
        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    left.len().cmp(&right.len()).then_with(|| a.cmp(b))
}

fn compare_chunk(x: &str, y: &str) -> Ordering {
    let x_digits = x.bytes().all(|c| c.is_ascii_digit());
    let y_digits = y.bytes().all(|c| c.is_ascii_digit());

    if x_digits && y_digits {
        let x = x.trim_start_matches('0');
        let y = y.trim_start_matches('0');
        x.len().cmp(&y.len()).then_with(|| x.cmp(y))
    } else {
        x.cmp(y)
    }
}

/// Split into maximal runs of digits and non-digits
fn chunks(s: &str) -> Vec<&str> {
    let mut result = Vec::new();
    let mut start = 0;
    let mut last_digit: Option<bool> = None;

    for (i, c) in s.char_indices() {
        let digit = c.is_ascii_digit();
        if let Some(prev) = last_digit
            && prev != digit
        {
            result.push(&s[start..i]);
            start = i;
        }
        last_digit = Some(digit);
    }
    if start < s.len() {
        result.push(&s[start..]);
    }
    result
}

/// Pick the tag to check out for a requested version.
///
/// `tags` must already be sorted ascending.
pub fn select<'a>(tags: &'a [Tag], requested: &str) -> TagSelection<'a> {
    let newest = tags.last();
    let newest_version = newest.map(|t| t.normalized.clone());

    if requested == UNDEFINED_VERSION {
        return TagSelection {
            state: TagState::Undefined,
            tag: newest,
            version: newest_version,
        };
    }

    match tags
        .iter()
        .find(|t| t.normalized == requested || t.name == requested)
    {
        Some(tag) => TagSelection {
            state: TagState::Valid,
            tag: Some(tag),
            version: Some(requested.to_string()),
        },
        None => TagSelection {
            state: TagState::Invalid,
            tag: newest,
            version: newest_version,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted_names(names: &[&str]) -> Vec<String> {
        sort(names.iter().map(|n| Tag::new(n)).collect())
            .into_iter()
            .map(|t| t.normalized)
            .collect()
    }

    #[test]
    fn test_normalize_strips_leading_v() {
        assert_eq!(normalize("v1.2.3"), "1.2.3");
        assert_eq!(normalize("1.2.3"), "1.2.3");
    }

    #[test]
    fn test_normalize_strips_first_v_anywhere() {
        assert_eq!(normalize("1.0.0-dev"), "1.0.0-de");
        assert_eq!(normalize("version-2"), "ersion-2");
    }

    #[test]
    fn test_sort_semantic_versions() {
        assert_eq!(
            sorted_names(&["1.10.0", "v1.2.0", "1.9.1", "0.1.0"]),
            vec!["0.1.0", "1.2.0", "1.9.1", "1.10.0"]
        );
    }

    #[test]
    fn test_sort_prerelease_before_release() {
        assert_eq!(
            sorted_names(&["1.0.0", "1.0.0-beta.1", "1.0.0-alpha"]),
            vec!["1.0.0-alpha", "1.0.0-beta.1", "1.0.0"]
        );
    }

    #[test]
    fn test_sort_non_semver_numeric_aware() {
        assert_eq!(
            sorted_names(&["release-10", "release-9", "release-1"]),
            vec!["release-1", "release-9", "release-10"]
        );
    }

    #[test]
    fn test_sort_mixed_tags() {
        assert_eq!(
            sorted_names(&["2.0", "1.5.0", "1.0", "3.0.0"]),
            vec!["1.0", "1.5.0", "2.0", "3.0.0"]
        );
    }

    #[test]
    fn test_compare_numeric() {
        assert_eq!(compare_numeric("1.9", "1.10"), Ordering::Less);
        assert_eq!(compare_numeric("abc", "abd"), Ordering::Less);
        assert_eq!(compare_numeric("1.0", "1.0"), Ordering::Equal);
        assert_eq!(compare_numeric("1.0", "1.0.1"), Ordering::Less);
    }

    #[test]
    fn test_compare_prefers_semver() {
        assert_eq!(compare("1.0.0-beta", "1.0.0"), Ordering::Less);
        assert_eq!(compare("1.2", "1.10"), Ordering::Less);
    }

    #[test]
    fn test_select_valid_tag() {
        let tags = sort(vec![Tag::new("1.0.0"), Tag::new("1.1.0"), Tag::new("2.0.0")]);
        let selection = select(&tags, "1.1.0");
        assert_eq!(selection.state, TagState::Valid);
        assert_eq!(selection.version.as_deref(), Some("1.1.0"));
        assert_eq!(selection.tag.map(|t| t.name.as_str()), Some("1.1.0"));
    }

    #[test]
    fn test_select_valid_keeps_original_tag_name() {
        let tags = sort(vec![Tag::new("v1.0.0"), Tag::new("v2.0.0")]);
        let selection = select(&tags, "1.0.0");
        assert_eq!(selection.state, TagState::Valid);
        assert_eq!(selection.tag.map(|t| t.name.as_str()), Some("v1.0.0"));
    }

    #[test]
    fn test_select_invalid_falls_back_to_newest() {
        let tags = sort(vec![Tag::new("1.0.0"), Tag::new("1.10.0"), Tag::new("1.9.0")]);
        let selection = select(&tags, "3.0.0");
        assert_eq!(selection.state, TagState::Invalid);
        assert_eq!(selection.version.as_deref(), Some("1.10.0"));
    }

    #[test]
    fn test_select_undefined_uses_newest() {
        let tags = sort(vec![Tag::new("0.9.0"), Tag::new("0.10.0")]);
        let selection = select(&tags, UNDEFINED_VERSION);
        assert_eq!(selection.state, TagState::Undefined);
        assert_eq!(selection.version.as_deref(), Some("0.10.0"));
    }

    #[test]
    fn test_select_without_tags() {
        let selection = select(&[], "1.0.0");
        assert_eq!(selection.state, TagState::Invalid);
        assert!(selection.tag.is_none());
        assert!(selection.version.is_none());
    }
}
