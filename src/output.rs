//! Output formatting for console and JSON modes
//!
//! Renders provider results either as human-readable lines or as a JSON
//! document for machine consumption.

use crate::provider::{Payload, Platforms, ProvidedInfo, ProviderError, ProviderKind};
use crate::reference::{PackageReference, Resolution};
use crate::resolver::ResolvedPackage;
use crate::tags::TagState;
use owo_colors::OwoColorize;
use serde::Serialize;

/// The analyzed package as it was resolved
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageSummary {
    pub url: String,
    pub product: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    /// How the requested version matched the repository tags
    pub tag_state: TagState,
}

impl PackageSummary {
    pub fn new(resolved: &ResolvedPackage) -> Self {
        let (url, version, revision) = match &resolved.reference {
            PackageReference::Local(path) => (path.display().to_string(), None, None),
            PackageReference::Remote { url, resolution } => match resolution {
                Resolution::Version(v) => (
                    url.clone(),
                    Some(resolved.source.version.clone().unwrap_or_else(|| v.clone())),
                    resolved.source.revision.clone(),
                ),
                Resolution::Revision(r) => (
                    url.clone(),
                    None,
                    Some(resolved.source.revision.clone().unwrap_or_else(|| r.clone())),
                ),
            },
        };
        Self {
            url,
            product: resolved.product_name.clone(),
            version,
            revision,
            tag_state: resolved.source.tag_state,
        }
    }
}

/// A provider that failed
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderFailure {
    pub provider_kind: ProviderKind,
    pub message: String,
}

/// Full JSON report
#[derive(Debug, Serialize)]
pub struct Report<'a> {
    pub package: PackageSummary,
    pub results: Vec<&'a ProvidedInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ProviderFailure>,
}

impl<'a> Report<'a> {
    pub fn new(
        resolved: &ResolvedPackage,
        outcomes: &'a [Result<ProvidedInfo, ProviderError>],
    ) -> Self {
        let mut results = Vec::new();
        let mut errors = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(info) => results.push(info),
                Err(e) => errors.push(ProviderFailure {
                    provider_kind: e.kind(),
                    message: e.to_string(),
                }),
            }
        }
        Self {
            package: PackageSummary::new(resolved),
            results,
            errors,
        }
    }
}

/// Console lines for every outcome, in order
pub fn render_console(
    resolved: &ResolvedPackage,
    outcomes: &[Result<ProvidedInfo, ProviderError>],
) -> String {
    let summary = PackageSummary::new(resolved);
    let mut lines = vec![format!(
        "{} {}",
        resolved.product_name.bold(),
        describe_source(&summary).dimmed()
    )];

    for outcome in outcomes {
        match outcome {
            Ok(info) => lines.push(format!("{}: {}", info.provider_name.cyan(), describe(&info.payload))),
            Err(e) => lines.push(format!("{}: {}", e.kind().display_name().red(), e)),
        }
    }

    lines.join("\n")
}

fn describe_source(summary: &PackageSummary) -> String {
    match (&summary.version, &summary.revision) {
        (Some(version), _) => format!("({} @ {})", summary.url, version),
        (None, Some(revision)) => format!("({} @ {})", summary.url, revision),
        (None, None) => format!("({})", summary.url),
    }
}

fn describe(payload: &Payload) -> String {
    match payload {
        Payload::BinarySize(size) => format!("binary size increases by {}", size.formatted),
        Payload::Dependencies(deps) if deps.is_empty() => "no third-party dependencies".to_string(),
        Payload::Dependencies(deps) => deps
            .iter()
            .map(|d| format!("{} ({})", d.product, d.package))
            .collect::<Vec<_>>()
            .join(", "),
        Payload::Platforms(platforms) => describe_platforms(platforms),
    }
}

fn describe_platforms(platforms: &Platforms) -> String {
    let declared: Vec<String> = [
        ("iOS", &platforms.ios),
        ("macOS", &platforms.macos),
        ("tvOS", &platforms.tvos),
        ("watchOS", &platforms.watchos),
    ]
    .into_iter()
    .filter_map(|(name, version)| version.as_ref().map(|v| format!("{} {}", name, v)))
    .collect();

    if declared.is_empty() {
        "no minimum platform versions declared".to_string()
    } else {
        declared.join(" | ")
    }
}

/// Print JSON output to stdout
pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing JSON: {}", e);
            std::process::exit(1);
        }
    }
}
