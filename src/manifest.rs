//! Manifest loading through `swift package dump-package`
//!
//! The dump is JSON shaped like:
//! ```json
//! {
//!   "platforms": [{ "platformName": "ios", "version": "13.0" }],
//!   "products": [{ "name": "Foo", "targets": ["Foo"], "type": { "library": ["dynamic"] } }],
//!   "targets": [{
//!     "name": "Foo",
//!     "dependencies": [
//!       { "byName": ["Core", null] },
//!       { "target": ["Utils", null] },
//!       { "product": ["Logging", "swift-log", null, null] }
//!     ]
//!   }]
//! }
//! ```
//!
//! A `byName` dependency naming a target of the same package is internal.
//! Otherwise it is a product of the package with the same name.

use crate::graph::{Dependency, ExternalProduct, PackageGraph, Platform, TargetId};
use crate::process::{CommandRunner, Invocation, ProcessError};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("Failed to load manifest at {path}: {stderr}")]
    DumpFailed { path: PathBuf, stderr: String },

    #[error("Failed to parse manifest of {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Load the package graph declared by the manifest in a directory
pub trait ManifestLoader: Send + Sync {
    fn load(&self, path: &Path) -> impl Future<Output = Result<PackageGraph, ManifestError>> + Send;
}

pub struct SwiftPmManifestLoader<R> {
    runner: Arc<R>,
}

impl<R: CommandRunner> SwiftPmManifestLoader<R> {
    pub fn new(runner: Arc<R>) -> Self {
        Self { runner }
    }
}

impl<R: CommandRunner> ManifestLoader for SwiftPmManifestLoader<R> {
    async fn load(&self, path: &Path) -> Result<PackageGraph, ManifestError> {
        debug!(path = %path.display(), "Loading manifest");
        let output = self
            .runner
            .run(Invocation::new("swift", ["package", "dump-package"]).current_dir(path))
            .await?;

        if !output.succeeded {
            return Err(ManifestError::DumpFailed {
                path: path.to_path_buf(),
                stderr: output.stderr_text(),
            });
        }

        parse_dump(&output.stdout_text()).map_err(|source| ManifestError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[derive(Deserialize)]
struct RawManifest {
    #[serde(default)]
    platforms: Vec<RawPlatform>,
    #[serde(default)]
    products: Vec<RawProduct>,
    #[serde(default)]
    targets: Vec<RawTarget>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPlatform {
    platform_name: String,
    version: String,
}

#[derive(Deserialize)]
struct RawProduct {
    name: String,
    #[serde(default)]
    targets: Vec<String>,
    #[serde(rename = "type", default)]
    kind: Value,
}

#[derive(Deserialize)]
struct RawTarget {
    name: String,
    #[serde(default)]
    dependencies: Vec<RawDependency>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
enum RawDependency {
    ByName(Vec<Value>),
    Target(Vec<Value>),
    Product(Vec<Value>),
}

/// Build the arena graph from `dump-package` output
pub fn parse_dump(json: &str) -> Result<PackageGraph, serde_json::Error> {
    let raw: RawManifest = serde_json::from_str(json)?;

    let ids: HashMap<&str, usize> = raw
        .targets
        .iter()
        .enumerate()
        .map(|(i, t)| (t.name.as_str(), i))
        .collect();

    let mut graph = PackageGraph::default();

    for target in &raw.targets {
        let dependencies = target
            .dependencies
            .iter()
            .filter_map(|dependency| convert_dependency(dependency, &ids))
            .collect();
        graph.add_target(&target.name, dependencies);
    }

    for product in &raw.products {
        let targets = product
            .targets
            .iter()
            .filter_map(|name| graph.target_id(name))
            .collect();
        graph.add_product(&product.name, is_dynamic_library(&product.kind), targets);
    }

    graph.platforms = raw
        .platforms
        .into_iter()
        .map(|p| Platform {
            name: p.platform_name,
            version: p.version,
        })
        .collect();

    Ok(graph)
}

fn convert_dependency(
    dependency: &RawDependency,
    ids: &HashMap<&str, usize>,
) -> Option<Dependency> {
    match dependency {
        RawDependency::Target(values) => {
            let name = string_at(values, 0)?;
            ids.get(name).map(|i| Dependency::Target(TargetId(*i)))
        }
        RawDependency::ByName(values) => {
            let name = string_at(values, 0)?;
            match ids.get(name) {
                Some(i) => Some(Dependency::Target(TargetId(*i))),
                None => Some(Dependency::Product(ExternalProduct {
                    name: name.to_string(),
                    package: name.to_string(),
                })),
            }
        }
        RawDependency::Product(values) => {
            let name = string_at(values, 0)?;
            let package = string_at(values, 1).unwrap_or(name);
            Some(Dependency::Product(ExternalProduct {
                name: name.to_string(),
                package: package.to_string(),
            }))
        }
    }
}

fn string_at(values: &[Value], index: usize) -> Option<&str> {
    values.get(index).and_then(Value::as_str)
}

/// `{"library": ["dynamic"]}` is the only dynamic product type
fn is_dynamic_library(kind: &Value) -> bool {
    kind.get("library")
        .and_then(|linkage| linkage.get(0))
        .and_then(Value::as_str)
        == Some("dynamic")
}
