//! Source and version resolution
//!
//! Turns a [`PackageReference`] into a loaded package graph plus a corrected
//! reference. Remote references go through these states:
//!
//! 1. Start: scratch directory created
//! 2. RepositoryLookup: remote fetched into the scratch directory
//! 3. WorkingCopyCreated: checkout directory named after the repository
//! 4. TagsListed: tags normalized and ordered
//! 5. Resolution: requested revision, requested tag, or newest tag checked out
//! 6. ManifestLoaded
//!
//! The caller's reference is never modified; the resolved one is returned.

use crate::console::Console;
use crate::git::{GitError, RepositoryProvider, WorkingCopy};
use crate::graph::{PackageGraph, Product};
use crate::manifest::{ManifestError, ManifestLoader};
use crate::reference::{PackageReference, Resolution, repository_name};
use crate::tags::{self, Tag, TagState};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Failed to load package: {source}")]
    FailedToLoadPackage {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Package '{package}' does not declare any product")]
    NoProductFound { package: String },

    #[error("Failed to create scratch directory: {0}")]
    Scratch(#[source] std::io::Error),
}

impl From<ManifestError> for ResolveError {
    fn from(e: ManifestError) -> Self {
        ResolveError::FailedToLoadPackage {
            source: Box::new(e),
        }
    }
}

impl From<GitError> for ResolveError {
    fn from(e: GitError) -> Self {
        match e {
            GitError::Unreachable { url, message } => ResolveError::InvalidUrl {
                url,
                reason: message,
            },
            other => ResolveError::FailedToLoadPackage {
                source: Box::new(other),
            },
        }
    }
}

/// Where the loaded manifest came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
    pub tag_state: TagState,
    /// Tag that was checked out, normalized
    pub version: Option<String>,
    /// Commit that was checked out, `None` for local packages
    pub revision: Option<String>,
}

impl SourceInfo {
    fn local() -> Self {
        Self {
            tag_state: TagState::Undefined,
            version: None,
            revision: None,
        }
    }
}

/// A validated package, ready for the providers
#[derive(Debug, Clone)]
pub struct ResolvedPackage {
    /// Corrected reference: concrete version or revision for remote packages
    pub reference: PackageReference,
    pub product_name: String,
    pub graph: PackageGraph,
    pub source: SourceInfo,
}

impl ResolvedPackage {
    pub fn product(&self) -> Option<&Product> {
        self.graph.product(&self.product_name)
    }

    pub fn is_dynamic_product(&self) -> bool {
        self.product().is_some_and(|p| p.is_dynamic_library)
    }
}

pub struct Resolver<G, L> {
    repositories: G,
    loader: L,
    console: Arc<Console>,
}

impl<G: RepositoryProvider, L: ManifestLoader> Resolver<G, L> {
    pub fn new(repositories: G, loader: L, console: Arc<Console>) -> Self {
        Self {
            repositories,
            loader,
            console,
        }
    }

    pub async fn resolve(
        &self,
        reference: &PackageReference,
        product_hint: Option<&str>,
    ) -> Result<ResolvedPackage, ResolveError> {
        let (reference, graph, source) = match reference {
            PackageReference::Local(path) => {
                debug!(path = %path.display(), "Resolving local package");
                let graph = self.loader.load(path).await?;
                (reference.clone(), graph, SourceInfo::local())
            }
            PackageReference::Remote { url, resolution } => {
                self.resolve_remote(url, resolution).await?
            }
        };

        let (product_name, substituted) = select_product(&graph, product_hint, &reference)?;
        if substituted && let Some(requested) = product_hint {
            info!(requested, product = %product_name, "Product not found, using first product");
            self.console.message(&format!(
                "Product '{}' not found in package, using first declared product '{}'",
                requested, product_name
            ));
        }

        Ok(ResolvedPackage {
            reference,
            product_name,
            graph,
            source,
        })
    }

    async fn resolve_remote(
        &self,
        url: &str,
        resolution: &Resolution,
    ) -> Result<(PackageReference, PackageGraph, SourceInfo), ResolveError> {
        let scratch = tempfile::Builder::new()
            .prefix("swift-package-info-")
            .tempdir()
            .map_err(ResolveError::Scratch)?;
        debug!(url, scratch = %scratch.path().display(), "Start");

        let repository = self.repositories.lookup(url, scratch.path()).await?;
        debug!(url, "RepositoryLookup");

        let clone_path = scratch.path().join("checkouts").join(repository_name(url));
        let copy = self
            .repositories
            .create_working_copy(&repository, &clone_path)
            .await?;
        debug!(path = %copy.path.display(), "WorkingCopyCreated");

        let listed = self.repositories.list_tags(&copy).await?;
        let ordered = tags::sort(listed.iter().map(|t| Tag::new(t)).collect());
        debug!(count = ordered.len(), "TagsListed");

        let (resolution, source) = match resolution {
            Resolution::Revision(revision) => {
                self.repositories.checkout(&copy, revision).await?;
                let head = self.repositories.head_revision(&copy).await?;
                (
                    Resolution::Revision(revision.clone()),
                    SourceInfo {
                        tag_state: TagState::Undefined,
                        version: None,
                        revision: Some(head),
                    },
                )
            }
            Resolution::Version(requested) => {
                self.resolve_version(&copy, &ordered, requested).await?
            }
        };

        let graph = self.loader.load(&copy.path).await?;
        debug!(url, "ManifestLoaded");

        Ok((
            PackageReference::Remote {
                url: url.to_string(),
                resolution,
            },
            graph,
            source,
        ))
    }

    async fn resolve_version(
        &self,
        copy: &WorkingCopy,
        ordered: &[Tag],
        requested: &str,
    ) -> Result<(Resolution, SourceInfo), ResolveError> {
        let selection = tags::select(ordered, requested);

        if let Some(tag) = selection.tag {
            self.repositories.checkout(copy, &tag.name).await?;
        }
        let head = self.repositories.head_revision(copy).await?;

        match (selection.state, selection.version.as_deref()) {
            (TagState::Invalid, Some(version)) => {
                info!(requested, version, "Requested version not found");
                self.console.message(&format!(
                    "Version {} not found, using the latest tag {}",
                    requested, version
                ));
            }
            (TagState::Undefined, Some(version)) => {
                info!(version, "No version requested");
                self.console
                    .message(&format!("No version given, using the latest tag {}", version));
            }
            (_, None) => {
                info!(revision = %head, "Repository has no tags");
                self.console.message(&format!(
                    "Repository has no tags, using the default branch at {}",
                    head
                ));
            }
            _ => {}
        }

        let resolution = match &selection.version {
            Some(version) => Resolution::Version(version.clone()),
            None => Resolution::Revision(head.clone()),
        };

        Ok((
            resolution,
            SourceInfo {
                tag_state: selection.state,
                version: selection.version,
                revision: Some(head),
            },
        ))
    }
}

/// Validate the requested product against the graph.
///
/// Returns the product to use and whether it replaced the requested one.
/// The fallback is the first product in declaration order.
pub fn select_product(
    graph: &PackageGraph,
    requested: Option<&str>,
    reference: &PackageReference,
) -> Result<(String, bool), ResolveError> {
    let Some(first) = graph.products.first() else {
        return Err(ResolveError::NoProductFound {
            package: reference.name(),
        });
    };

    match requested {
        Some(name) if graph.product(name).is_some() => Ok((name.to_string(), false)),
        Some(_) => Ok((first.name.clone(), true)),
        None => Ok((first.name.clone(), false)),
    }
}
