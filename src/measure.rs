//! Differential binary size measurement
//!
//! Builds a baseline app, adds the package to it, builds again and reports the
//! difference between the two app bundles. The pipeline is strictly
//! sequential and always ends by removing the baseline app directory.

use crate::config::EmptyApp;
use crate::console::Console;
use crate::process::{CommandRunner, Invocation};
use crate::reference::{PackageReference, Resolution};
use crate::resolver::ResolvedPackage;
use crate::size::{SizeOnDisk, app_size_on_disk};
use crate::xcodeproj::{PackageRequirement, ProjectError, ProjectMutator};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

pub const TOTAL_STEPS: usize = 7;

const ARCHIVE_NAME: &str = "archive.xcarchive";

#[derive(Error, Debug)]
pub enum MeasureError {
    #[error("Cloning empty app failed: {message}")]
    UnableToCloneEmptyApp { message: String },

    #[error("Archiving failed: {stderr}")]
    UnableToGenerateArchive { stderr: String },

    #[error("Reading binary size failed: {source}")]
    UnableToGetBinarySizeOnDisk {
        #[source]
        source: walkdir::Error,
    },

    #[error("Adding the package to the empty app project failed: {source}")]
    UnableToRetrieveAppProject {
        #[source]
        source: ProjectError,
    },

    #[error("{}", unexpected_message(&**.source, .verbose))]
    Unexpected {
        source: Box<dyn std::error::Error + Send + Sync>,
        verbose: bool,
    },
}

fn unexpected_message(source: &(dyn std::error::Error + Send + Sync), verbose: &bool) -> String {
    if *verbose {
        format!("Unexpected error: {}", source)
    } else {
        "Unexpected error. Run again with --verbose for details".to_string()
    }
}

fn unexpected<E>(e: E, verbose: bool) -> MeasureError
where
    E: std::error::Error + Send + Sync + 'static,
{
    MeasureError::Unexpected {
        source: Box::new(e),
        verbose,
    }
}

fn project_error(e: ProjectError, verbose: bool) -> MeasureError {
    match e {
        e @ (ProjectError::MissingRootObject | ProjectError::NoTarget | ProjectError::Read { .. }) => {
            MeasureError::UnableToRetrieveAppProject { source: e }
        }
        other => unexpected(other, verbose),
    }
}

/// Reads the size of a built app bundle
type SizeReader = fn(&Path) -> Result<SizeOnDisk, walkdir::Error>;

#[derive(Debug, Clone)]
pub struct MeasureSettings {
    pub empty_app: EmptyApp,
    pub architecture: String,
    /// Build settings override passed to `xcodebuild -xcconfig`
    pub xcconfig: Option<PathBuf>,
    /// Directory the empty app is cloned into
    pub working_dir: PathBuf,
    pub clone_timeout: Duration,
    pub verbose: bool,
}

/// Paths inside the cloned empty app
struct AppLayout {
    dir: PathBuf,
    name: String,
}

impl AppLayout {
    fn project(&self) -> PathBuf {
        self.dir.join(format!("{}.xcodeproj", self.name))
    }

    fn archive(&self) -> PathBuf {
        self.dir.join(ARCHIVE_NAME)
    }

    fn bundle(&self) -> PathBuf {
        self.archive()
            .join("Products")
            .join("Applications")
            .join(format!("{}.app", self.name))
    }
}

pub struct SizeMeasurer<R, P> {
    runner: Arc<R>,
    mutator: Arc<P>,
    console: Arc<Console>,
    settings: MeasureSettings,
    size_reader: SizeReader,
}

impl<R: CommandRunner, P: ProjectMutator + 'static> SizeMeasurer<R, P> {
    pub fn new(runner: Arc<R>, mutator: P, console: Arc<Console>, settings: MeasureSettings) -> Self {
        Self {
            runner,
            mutator: Arc::new(mutator),
            console,
            settings,
            size_reader: app_size_on_disk,
        }
    }

    /// Size the app grows by when it links the resolved product
    pub async fn measure(
        &self,
        resolved: &ResolvedPackage,
        is_dynamic: bool,
    ) -> Result<SizeOnDisk, MeasureError> {
        self.console.start_progress("Measuring binary size");

        let result = match self.layout() {
            Ok(layout) => {
                let result = self.run_steps(&layout, resolved, is_dynamic).await;
                self.cleanup(&layout).await;
                result
            }
            Err(e) => Err(e),
        };

        match &result {
            Ok(size) => self
                .console
                .finish_progress(&format!("Binary size increase: {}", size.formatted)),
            Err(_) => self.console.fail_progress("Binary size measurement failed"),
        }
        result
    }

    async fn run_steps(
        &self,
        layout: &AppLayout,
        resolved: &ResolvedPackage,
        is_dynamic: bool,
    ) -> Result<SizeOnDisk, MeasureError> {
        let verbose = self.settings.verbose;

        self.begin(1, "Cleaning up empty app directory");
        let dir = layout.dir.clone();
        self.blocking(move || remove_dir(&dir).map_err(|e| unexpected(e, verbose)))
            .await?;
        self.end(1);

        self.begin(2, "Cloning empty app");
        self.clone_empty_app().await?;
        self.end(2);

        self.begin(3, "Generating archive for empty app");
        self.archive(layout).await?;
        self.end(3);

        self.begin(4, "Calculating binary size of empty app");
        let baseline = self.bundle_size(layout).await?;
        self.end(4);

        self.begin(5, "Adding package to empty app");
        let mutator = Arc::clone(&self.mutator);
        let project = layout.project();
        let requirement = package_requirement(resolved);
        let product = resolved.product_name.clone();
        self.blocking(move || {
            mutator
                .add_dependency(&project, &requirement, &product)
                .map_err(|e| project_error(e, verbose))?;
            if is_dynamic {
                mutator
                    .embed_as_framework(&project, &product)
                    .map_err(|e| project_error(e, verbose))?;
            }
            Ok(())
        })
        .await?;
        self.end(5);

        self.begin(6, "Generating archive with package");
        self.archive(layout).await?;
        let with_dependency = self.bundle_size(layout).await?;
        self.end(6);

        self.begin(7, "Calculating binary size delta");
        debug!(
            baseline = baseline.amount,
            with_dependency = with_dependency.amount,
            "Measured app bundles"
        );
        let delta = with_dependency - baseline;
        self.end(7);

        Ok(delta)
    }

    fn begin(&self, step: usize, message: &str) {
        self.console.step(step, TOTAL_STEPS, message);
    }

    fn end(&self, step: usize) {
        self.console
            .log("measure", &format!("Step {}/{} finished", step, TOTAL_STEPS));
    }

    /// Clone target for the empty app. Anything but a plain directory name
    /// is refused, since the directory is deleted before and after measuring.
    fn layout(&self) -> Result<AppLayout, MeasureError> {
        let app = &self.settings.empty_app;
        let directory = app
            .directory_name()
            .ok_or_else(|| MeasureError::UnableToCloneEmptyApp {
                message: format!(
                    "'{}' does not name a directory to clone into",
                    app.repository
                ),
            })?;

        Ok(AppLayout {
            dir: self.settings.working_dir.join(directory),
            name: app.name.clone(),
        })
    }

    async fn clone_empty_app(&self) -> Result<(), MeasureError> {
        let app = &self.settings.empty_app;
        let output = self
            .runner
            .shallow_clone(
                &app.repository,
                &app.reference,
                &self.settings.working_dir,
                self.settings.clone_timeout,
                self.settings.verbose,
            )
            .await
            .map_err(|e| MeasureError::UnableToCloneEmptyApp {
                message: e.to_string(),
            })?;

        if output.succeeded {
            Ok(())
        } else {
            Err(MeasureError::UnableToCloneEmptyApp {
                message: output.stderr_text(),
            })
        }
    }

    async fn archive(&self, layout: &AppLayout) -> Result<(), MeasureError> {
        let output = self
            .runner
            .run(self.archive_invocation(layout))
            .await
            .map_err(|e| self.unexpected(e))?;

        if output.succeeded {
            Ok(())
        } else {
            Err(MeasureError::UnableToGenerateArchive {
                stderr: output.stderr_text(),
            })
        }
    }

    fn archive_invocation(&self, layout: &AppLayout) -> Invocation {
        let mut args = vec![
            "archive".to_string(),
            "-project".to_string(),
            layout.project().to_string_lossy().to_string(),
            "-scheme".to_string(),
            layout.name.clone(),
            "-archivePath".to_string(),
            layout.archive().to_string_lossy().to_string(),
            "-configuration".to_string(),
            "Release".to_string(),
            "-arch".to_string(),
            self.settings.architecture.clone(),
            "CODE_SIGNING_REQUIRED=NO".to_string(),
            "CODE_SIGNING_ALLOWED=NO".to_string(),
            "ENABLE_BITCODE=NO".to_string(),
        ];
        if let Some(xcconfig) = &self.settings.xcconfig {
            args.push("-xcconfig".to_string());
            args.push(xcconfig.to_string_lossy().to_string());
        }

        Invocation::new("xcodebuild", args)
            .current_dir(&layout.dir)
            .verbose(self.settings.verbose)
            .timeout(None)
    }

    async fn bundle_size(&self, layout: &AppLayout) -> Result<SizeOnDisk, MeasureError> {
        let bundle = layout.bundle();
        let read = self.size_reader;
        self.blocking(move || {
            read(&bundle).map_err(|source| MeasureError::UnableToGetBinarySizeOnDisk { source })
        })
        .await
    }

    async fn cleanup(&self, layout: &AppLayout) {
        let dir = layout.dir.clone();
        match tokio::task::spawn_blocking(move || remove_dir(&dir)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Failed to remove empty app directory"),
            Err(e) => warn!(error = %e, "Empty app cleanup task failed"),
        }
    }

    /// Run filesystem work off the async workers
    async fn blocking<T, F>(&self, work: F) -> Result<T, MeasureError>
    where
        F: FnOnce() -> Result<T, MeasureError> + Send + 'static,
        T: Send + 'static,
    {
        tokio::task::spawn_blocking(work)
            .await
            .map_err(|e| self.unexpected(e))?
    }

    fn unexpected<E>(&self, e: E) -> MeasureError
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        unexpected(e, self.settings.verbose)
    }

    #[cfg(test)]
    fn with_size_reader(mut self, reader: SizeReader) -> Self {
        self.size_reader = reader;
        self
    }
}

/// Requirement written into the empty app's project.
///
/// Semantic version tags are pinned exactly. Anything else is pinned to the
/// commit that was resolved, since Xcode only accepts semver for versions.
pub fn package_requirement(resolved: &ResolvedPackage) -> PackageRequirement {
    match &resolved.reference {
        PackageReference::Local(path) => {
            PackageRequirement::Local(path.canonicalize().unwrap_or_else(|_| path.clone()))
        }
        PackageReference::Remote { url, resolution } => {
            let pinned = |fallback: &str| PackageRequirement::Revision {
                url: url.clone(),
                revision: resolved
                    .source
                    .revision
                    .clone()
                    .unwrap_or_else(|| fallback.to_string()),
            };
            match resolution {
                Resolution::Version(version) if semver::Version::parse(version).is_ok() => {
                    PackageRequirement::ExactVersion {
                        url: url.clone(),
                        version: version.clone(),
                    }
                }
                Resolution::Version(version) => pinned(version),
                Resolution::Revision(revision) => pinned(revision),
            }
        }
    }
}

/// Remove a directory tree; a missing directory is not an error
fn remove_dir(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_dir_all(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
