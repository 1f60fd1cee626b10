//! Information providers
//!
//! Each provider turns a resolved package into one [`ProvidedInfo`]. A full
//! analysis runs all three concurrently over the same resolved package and
//! keeps every outcome, so one failing provider does not hide the others.

use crate::graph::{ExternalDependency, external_dependencies};
use crate::measure::{MeasureError, SizeMeasurer};
use crate::process::CommandRunner;
use crate::resolver::ResolvedPackage;
use crate::size::SizeOnDisk;
use crate::xcodeproj::ProjectMutator;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ProviderKind {
    BinarySize,
    Dependencies,
    Platforms,
}

impl ProviderKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::BinarySize => "Binary Size",
            ProviderKind::Dependencies => "Dependencies",
            ProviderKind::Platforms => "Platforms",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error(transparent)]
    BinarySize(#[from] MeasureError),

    #[error("Product '{product}' not found in package")]
    ProductNotFound { kind: ProviderKind, product: String },
}

impl ProviderError {
    pub fn kind(&self) -> ProviderKind {
        match self {
            ProviderError::BinarySize(_) => ProviderKind::BinarySize,
            ProviderError::ProductNotFound { kind, .. } => *kind,
        }
    }
}

/// Minimum deployment targets, absent when the package does not declare one
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Platforms {
    #[serde(rename = "iOS", skip_serializing_if = "Option::is_none")]
    pub ios: Option<String>,
    #[serde(rename = "macOS", skip_serializing_if = "Option::is_none")]
    pub macos: Option<String>,
    #[serde(rename = "tvOS", skip_serializing_if = "Option::is_none")]
    pub tvos: Option<String>,
    #[serde(rename = "watchOS", skip_serializing_if = "Option::is_none")]
    pub watchos: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    BinarySize(SizeOnDisk),
    Dependencies(Vec<ExternalDependency>),
    Platforms(Platforms),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvidedInfo {
    pub provider_name: String,
    pub provider_kind: ProviderKind,
    pub payload: Payload,
}

impl ProvidedInfo {
    fn new(kind: ProviderKind, payload: Payload) -> Self {
        Self {
            provider_name: kind.display_name().to_string(),
            provider_kind: kind,
            payload,
        }
    }
}

pub trait Provider: Send + Sync {
    fn provide(
        &self,
        resolved: &ResolvedPackage,
    ) -> impl Future<Output = Result<ProvidedInfo, ProviderError>> + Send;
}

pub struct BinarySizeProvider<R, P> {
    measurer: SizeMeasurer<R, P>,
}

impl<R, P> BinarySizeProvider<R, P> {
    pub fn new(measurer: SizeMeasurer<R, P>) -> Self {
        Self { measurer }
    }
}

impl<R: CommandRunner, P: ProjectMutator + 'static> Provider for BinarySizeProvider<R, P> {
    async fn provide(&self, resolved: &ResolvedPackage) -> Result<ProvidedInfo, ProviderError> {
        let size = self
            .measurer
            .measure(resolved, resolved.is_dynamic_product())
            .await?;
        Ok(ProvidedInfo::new(
            ProviderKind::BinarySize,
            Payload::BinarySize(size),
        ))
    }
}

pub struct DependenciesProvider;

impl Provider for DependenciesProvider {
    async fn provide(&self, resolved: &ResolvedPackage) -> Result<ProvidedInfo, ProviderError> {
        let product = resolved
            .product()
            .ok_or_else(|| ProviderError::ProductNotFound {
                kind: ProviderKind::Dependencies,
                product: resolved.product_name.clone(),
            })?;
        let dependencies = external_dependencies(product, &resolved.graph);
        Ok(ProvidedInfo::new(
            ProviderKind::Dependencies,
            Payload::Dependencies(dependencies),
        ))
    }
}

pub struct PlatformsProvider;

impl Provider for PlatformsProvider {
    async fn provide(&self, resolved: &ResolvedPackage) -> Result<ProvidedInfo, ProviderError> {
        let graph = &resolved.graph;
        let platforms = Platforms {
            ios: graph.platform_version("ios").map(str::to_string),
            macos: graph.platform_version("macos").map(str::to_string),
            tvos: graph.platform_version("tvos").map(str::to_string),
            watchos: graph.platform_version("watchos").map(str::to_string),
        };
        Ok(ProvidedInfo::new(
            ProviderKind::Platforms,
            Payload::Platforms(platforms),
        ))
    }
}

/// Run every provider concurrently and collect each outcome.
///
/// Results come back in the order size, dependencies, platforms.
pub async fn full_analysis<S, D, P>(
    size: &S,
    dependencies: &D,
    platforms: &P,
    resolved: &ResolvedPackage,
) -> Vec<Result<ProvidedInfo, ProviderError>>
where
    S: Provider,
    D: Provider,
    P: Provider,
{
    let (size, dependencies, platforms) = tokio::join!(
        size.provide(resolved),
        dependencies.provide(resolved),
        platforms.provide(resolved),
    );
    vec![size, dependencies, platforms]
}
