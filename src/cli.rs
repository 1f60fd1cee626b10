use crate::reference::{PackageReference, ReferenceError, UNDEFINED_VERSION};
use clap::{Args, Parser, Subcommand};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Reports binary size, dependencies and platforms of a Swift package product
#[derive(Parser, Debug)]
#[command(name = "swift-package-info")]
#[command(version, about, long_about = None)]
#[command(subcommand_negates_reqs = true, args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Arguments for the default full analysis
    #[command(flatten)]
    pub arguments: AllArguments,
}

impl Cli {
    /// The subcommand to run, `full-analyzes` when none was given
    pub fn into_command(self) -> Command {
        self.command
            .unwrap_or(Command::FullAnalyzes(self.arguments))
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Estimated binary size increase of linking the product
    BinarySize(AllArguments),
    /// Platforms and minimum versions the package supports
    Platforms(AllArguments),
    /// Third-party dependencies of the product
    Dependencies(AllArguments),
    /// All of the above
    FullAnalyzes(AllArguments),
}

impl Command {
    pub fn arguments(&self) -> &AllArguments {
        match self {
            Command::BinarySize(args)
            | Command::Platforms(args)
            | Command::Dependencies(args)
            | Command::FullAnalyzes(args) => args,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct AllArguments {
    /// Git repository URL or local directory of the package
    #[arg(
        long = "url",
        visible_aliases = ["for", "package", "repo-url", "path", "local-path"],
        required = true
    )]
    pub url: Option<String>,

    /// Tag to inspect, the latest one when omitted
    #[arg(long = "package-version", short = 'v', default_value = UNDEFINED_VERSION)]
    pub package_version: String,

    /// Commit or branch to inspect instead of a tag
    #[arg(long, short = 'r')]
    pub revision: Option<String>,

    /// Product to inspect, the first declared product when omitted or not found
    #[arg(long = "product-named")]
    pub product_named: Option<String>,

    /// consoleMessage or jsonDump
    #[arg(long = "report-format", default_value = "consoleMessage")]
    pub report_format: ReportFormat,

    /// .xcconfig file applied when building the empty app
    #[arg(long)]
    pub xcconfig: Option<PathBuf>,

    /// Print every command and its output
    #[arg(long)]
    pub verbose: bool,
}

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Missing package reference. Pass --url with a git URL or a local package directory")]
    MissingReference,

    #[error(transparent)]
    InvalidReference(#[from] ReferenceError),

    #[error("Invalid xcconfig '{}'. Expected an existing file with the .xcconfig extension", .path.display())]
    InvalidXcconfig { path: PathBuf },
}

impl AllArguments {
    /// Package reference built from `--url`, `--package-version` and `--revision`
    pub fn package_reference(&self) -> Result<PackageReference, CliError> {
        let url = self.url.as_deref().ok_or(CliError::MissingReference)?;
        Ok(PackageReference::parse(
            url,
            Some(self.package_version.as_str()),
            self.revision.as_deref(),
        )?)
    }

    /// Absolute path of `--xcconfig`, checked to exist
    pub fn validated_xcconfig(&self) -> Result<Option<PathBuf>, CliError> {
        self.xcconfig.as_deref().map(validate_xcconfig).transpose()
    }
}

pub fn validate_xcconfig(path: &Path) -> Result<PathBuf, CliError> {
    let invalid = || CliError::InvalidXcconfig {
        path: path.to_path_buf(),
    };

    if path.extension().and_then(|e| e.to_str()) != Some("xcconfig") || !path.is_file() {
        return Err(invalid());
    }
    path.canonicalize().map_err(|_| invalid())
}

/// How results are printed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    ConsoleMessage,
    JsonDump,
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportFormat::ConsoleMessage => write!(f, "consoleMessage"),
            ReportFormat::JsonDump => write!(f, "jsonDump"),
        }
    }
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "consoleMessage" => Ok(ReportFormat::ConsoleMessage),
            "jsonDump" => Ok(ReportFormat::JsonDump),
            _ => Err(format!(
                "Unknown report format '{}'. Supported: consoleMessage, jsonDump",
                s
            )),
        }
    }
}
