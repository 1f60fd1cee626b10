//! Package graph and external dependency flattening
//!
//! Targets live in an arena and are referenced by [`TargetId`], so a target
//! reachable through several paths is stored once.

use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetId(pub usize);

/// A product that belongs to another package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalProduct {
    pub name: String,
    pub package: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dependency {
    /// Target of the same package
    Target(TargetId),
    Product(ExternalProduct),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub name: String,
    pub dependencies: Vec<Dependency>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub name: String,
    pub is_dynamic_library: bool,
    pub targets: Vec<TargetId>,
}

/// Minimum deployment target declared by the package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    /// Lowercase SwiftPM name: "ios", "macos", "tvos", "watchos", ...
    pub name: String,
    pub version: String,
}

/// Loaded manifest. Built once per resolution, read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageGraph {
    /// In manifest declaration order
    pub products: Vec<Product>,
    pub targets: Vec<Target>,
    pub platforms: Vec<Platform>,
}

impl PackageGraph {
    pub fn add_target(&mut self, name: &str, dependencies: Vec<Dependency>) -> TargetId {
        self.targets.push(Target {
            name: name.to_string(),
            dependencies,
        });
        TargetId(self.targets.len() - 1)
    }

    pub fn add_product(&mut self, name: &str, is_dynamic_library: bool, targets: Vec<TargetId>) {
        self.products.push(Product {
            name: name.to_string(),
            is_dynamic_library,
            targets,
        });
    }

    pub fn target(&self, id: TargetId) -> Option<&Target> {
        self.targets.get(id.0)
    }

    pub fn target_id(&self, name: &str) -> Option<TargetId> {
        self.targets.iter().position(|t| t.name == name).map(TargetId)
    }

    pub fn product(&self, name: &str) -> Option<&Product> {
        self.products.iter().find(|p| p.name == name)
    }

    pub fn platform_version(&self, name: &str) -> Option<&str> {
        self.platforms
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .map(|p| p.version.as_str())
    }
}

/// A product of another package that the analyzed product links
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExternalDependency {
    pub product: String,
    pub package: String,
}

impl From<&ExternalProduct> for ExternalDependency {
    fn from(product: &ExternalProduct) -> Self {
        Self {
            product: product.name.clone(),
            package: product.package.clone(),
        }
    }
}

/// Flatten the direct and transitive external dependencies of a product.
///
/// A dependency reachable through two paths is listed twice. The result is
/// sorted by product name; ties keep discovery order (direct first).
pub fn external_dependencies(product: &Product, graph: &PackageGraph) -> Vec<ExternalDependency> {
    let mut externals = Vec::new();
    let mut frontier = Vec::new();

    for target in product.targets.iter().filter_map(|id| graph.target(*id)) {
        split_dependencies(target, &mut externals, &mut frontier);
    }

    // Every round goes one level deeper; a valid graph is never deeper than its target count
    let mut rounds = 0;
    while !frontier.is_empty() {
        if rounds > graph.targets.len() {
            warn!(product = %product.name, "Target dependency cycle detected, stopping walk");
            break;
        }
        rounds += 1;

        let mut next = Vec::new();
        for target in frontier.iter().filter_map(|id| graph.target(*id)) {
            split_dependencies(target, &mut externals, &mut next);
        }
        frontier = next;
    }

    externals.sort_by(|a, b| a.product.cmp(&b.product));
    externals
}

fn split_dependencies(
    target: &Target,
    externals: &mut Vec<ExternalDependency>,
    internals: &mut Vec<TargetId>,
) {
    for dependency in &target.dependencies {
        match dependency {
            Dependency::Product(product) => externals.push(product.into()),
            Dependency::Target(id) => internals.push(*id),
        }
    }
}
