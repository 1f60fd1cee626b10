//! Package references: what the user asked to inspect
//!
//! A reference is either a local directory holding a `Package.swift`, or a
//! remote git URL plus a requested version or revision.

use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Version requested when the user did not pass one
pub const UNDEFINED_VERSION: &str = "undefined";

/// Manifest file every Swift package carries at its root
pub const MANIFEST_FILE: &str = "Package.swift";

const REMOTE_SCHEMES: &[&str] = &["https://", "http://", "ssh://", "git://", "file://"];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ReferenceError {
    #[error(
        "Invalid package reference '{input}'. Expected a git repository URL or a local directory containing Package.swift"
    )]
    InvalidUrl { input: String },
}

/// How a remote reference should be checked out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A tag, or `undefined` for "newest tag"
    Version(String),
    /// A commit, branch or any other git ref, used verbatim
    Revision(String),
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Version(v) => write!(f, "version {}", v),
            Resolution::Revision(r) => write!(f, "revision {}", r),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageReference {
    Local(PathBuf),
    Remote { url: String, resolution: Resolution },
}

impl PackageReference {
    /// Build a reference from the raw command line input.
    ///
    /// Local directories win over URLs. A revision, when given, takes precedence
    /// over the version.
    pub fn parse(
        input: &str,
        version: Option<&str>,
        revision: Option<&str>,
    ) -> Result<Self, ReferenceError> {
        let trimmed = input.trim();

        if is_local_package(Path::new(trimmed)) {
            return Ok(PackageReference::Local(PathBuf::from(trimmed)));
        }

        if !is_valid_remote_url(trimmed) {
            return Err(ReferenceError::InvalidUrl {
                input: input.to_string(),
            });
        }

        let resolution = match (revision, version) {
            (Some(rev), _) => Resolution::Revision(rev.to_string()),
            (None, Some(v)) => Resolution::Version(v.to_string()),
            (None, None) => Resolution::Version(UNDEFINED_VERSION.to_string()),
        };

        Ok(PackageReference::Remote {
            url: trimmed.to_string(),
            resolution,
        })
    }

    /// Short name used for clone directories and messages
    pub fn name(&self) -> String {
        match self {
            PackageReference::Local(path) => path
                .canonicalize()
                .ok()
                .as_deref()
                .unwrap_or(path.as_path())
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string()),
            PackageReference::Remote { url, .. } => repository_name(url),
        }
    }
}

impl fmt::Display for PackageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageReference::Local(path) => write!(f, "{}", path.display()),
            PackageReference::Remote { url, resolution } => write!(f, "{} ({})", url, resolution),
        }
    }
}

/// A directory that contains a package manifest
pub fn is_local_package(path: &Path) -> bool {
    path.is_dir() && path.join(MANIFEST_FILE).is_file()
}

/// Check that a string has the shape of a git repository URL
///
/// Accepts scheme URLs (`https://host/path`, `ssh://`, `git://`, `file:///path`)
/// and scp-like addresses (`git@github.com:org/repo.git`).
pub fn is_valid_remote_url(url: &str) -> bool {
    if url.is_empty() || url.chars().any(char::is_whitespace) {
        return false;
    }

    for scheme in REMOTE_SCHEMES {
        if let Some(rest) = url.strip_prefix(scheme) {
            if *scheme == "file://" {
                return rest.len() > 1 && rest.starts_with('/');
            }
            return match rest.split_once('/') {
                Some((host, path)) => !host.is_empty() && !path.trim_matches('/').is_empty(),
                None => false,
            };
        }
    }

    if url.contains("://") {
        return false;
    }

    // scp-like: user@host:path
    match url.split_once('@') {
        Some((user, rest)) => match rest.split_once(':') {
            Some((host, path)) => {
                !user.is_empty() && !host.is_empty() && !path.trim_matches('/').is_empty()
            }
            None => false,
        },
        None => false,
    }
}

/// Repository name derived from its URL
///
/// - "https://github.com/apple/swift-argument-parser.git" -> "swift-argument-parser"
/// - "git@github.com:org/repo" -> "repo"
pub fn repository_name(url: &str) -> String {
    let trimmed = url.trim_end_matches('/').trim_end_matches(".git");
    trimmed
        .rsplit(['/', ':'])
        .find(|s| !s.is_empty())
        .unwrap_or(trimmed)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_https_url() {
        assert!(is_valid_remote_url("https://github.com/apple/swift-log"));
        assert!(is_valid_remote_url("https://github.com/apple/swift-log.git"));
    }

    #[test]
    fn test_valid_scp_like_url() {
        assert!(is_valid_remote_url("git@github.com:apple/swift-log.git"));
    }

    #[test]
    fn test_valid_file_url() {
        assert!(is_valid_remote_url("file:///tmp/repos/package"));
    }

    #[test]
    fn test_invalid_urls() {
        assert!(!is_valid_remote_url(""));
        assert!(!is_valid_remote_url("not a url"));
        assert!(!is_valid_remote_url("https://github.com"));
        assert!(!is_valid_remote_url("https://"));
        assert!(!is_valid_remote_url("ftp://example.com/repo"));
        assert!(!is_valid_remote_url("some-folder"));
    }

    #[test]
    fn test_repository_name() {
        assert_eq!(
            repository_name("https://github.com/apple/swift-argument-parser.git"),
            "swift-argument-parser"
        );
        assert_eq!(repository_name("git@github.com:org/repo"), "repo");
        assert_eq!(repository_name("https://github.com/org/repo/"), "repo");
    }

    #[test]
    fn test_parse_remote_defaults_to_undefined_version() {
        let reference = PackageReference::parse("https://github.com/org/repo", None, None).unwrap();
        assert_eq!(
            reference,
            PackageReference::Remote {
                url: "https://github.com/org/repo".to_string(),
                resolution: Resolution::Version(UNDEFINED_VERSION.to_string()),
            }
        );
    }

    #[test]
    fn test_parse_revision_wins_over_version() {
        let reference =
            PackageReference::parse("https://github.com/org/repo", Some("1.0.0"), Some("abc123"))
                .unwrap();
        match reference {
            PackageReference::Remote { resolution, .. } => {
                assert_eq!(resolution, Resolution::Revision("abc123".to_string()));
            }
            other => panic!("expected remote reference, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_local_package() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), "// swift-tools-version:5.9").unwrap();
        let input = dir.path().to_string_lossy().to_string();
        let reference = PackageReference::parse(&input, None, None).unwrap();
        assert_eq!(reference, PackageReference::Local(dir.path().to_path_buf()));
    }

    #[test]
    fn test_parse_directory_without_manifest_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().to_string_lossy().to_string();
        let result = PackageReference::parse(&input, None, None);
        assert!(matches!(result, Err(ReferenceError::InvalidUrl { .. })));
    }
}
