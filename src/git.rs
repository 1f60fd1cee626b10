//! Git repository access for remote packages
//!
//! Mirrors the way SwiftPM manages remote packages:
//! 1. Bare clone of the remote into a scratch directory (lookup)
//! 2. Working copy cloned from the bare repository, nothing checked out yet
//! 3. Tags listed from the working copy
//! 4. The resolved tag or revision checked out

use crate::process::{CommandRunner, Invocation, ProcessError, ProcessOutput};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum GitError {
    #[error("Git command failed: {message}")]
    CommandFailed { message: String },

    #[error("Repository {url} is unreachable: {message}")]
    Unreachable { url: String, message: String },

    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Process(#[from] ProcessError),
}

/// Local bare mirror of a remote repository
#[derive(Debug, Clone)]
pub struct Repository {
    pub url: String,
    pub path: PathBuf,
}

/// Checkout used to read the manifest
#[derive(Debug, Clone)]
pub struct WorkingCopy {
    pub path: PathBuf,
}

pub trait RepositoryProvider: Send + Sync {
    /// Fetch the remote into `scratch`. Fails with [`GitError::Unreachable`] when it cannot be reached.
    fn lookup(
        &self,
        url: &str,
        scratch: &Path,
    ) -> impl Future<Output = Result<Repository, GitError>> + Send;

    fn create_working_copy(
        &self,
        repository: &Repository,
        dest: &Path,
    ) -> impl Future<Output = Result<WorkingCopy, GitError>> + Send;

    fn list_tags(&self, copy: &WorkingCopy)
    -> impl Future<Output = Result<Vec<String>, GitError>> + Send;

    fn checkout(
        &self,
        copy: &WorkingCopy,
        git_ref: &str,
    ) -> impl Future<Output = Result<(), GitError>> + Send;

    fn head_revision(&self, copy: &WorkingCopy)
    -> impl Future<Output = Result<String, GitError>> + Send;
}

pub struct GitRepositoryProvider<R> {
    runner: Arc<R>,
    verbose: bool,
    /// Limit for network operations, `None` for no limit
    fetch_timeout: Option<Duration>,
}

impl<R: CommandRunner> GitRepositoryProvider<R> {
    pub fn new(runner: Arc<R>, verbose: bool, fetch_timeout: Option<Duration>) -> Self {
        Self {
            runner,
            verbose,
            fetch_timeout,
        }
    }

    async fn git(
        &self,
        args: &[&str],
        dir: &Path,
        verbose: bool,
        timeout: Option<Duration>,
    ) -> Result<ProcessOutput, GitError> {
        let invocation = Invocation::new("git", args.iter().copied())
            .current_dir(dir)
            .verbose(verbose)
            .timeout(timeout);
        let output = self.runner.run(invocation).await?;

        if output.succeeded {
            Ok(output)
        } else {
            Err(GitError::CommandFailed {
                message: output.stderr_text(),
            })
        }
    }
}

impl<R: CommandRunner> RepositoryProvider for GitRepositoryProvider<R> {
    async fn lookup(&self, url: &str, scratch: &Path) -> Result<Repository, GitError> {
        let parent = scratch.join("repositories");
        std::fs::create_dir_all(&parent).map_err(|source| GitError::CreateDir {
            path: parent.clone(),
            source,
        })?;

        let path = parent.join(format!("{}.git", crate::reference::repository_name(url)));
        cleanup_partial_clone(&path);
        let dest = path.to_string_lossy();

        debug!(url, path = %path.display(), "Fetching repository");
        let result = self
            .git(
                &["clone", "--bare", "--quiet", url, &*dest],
                scratch,
                self.verbose,
                self.fetch_timeout,
            )
            .await;

        match result {
            Ok(_) => Ok(Repository {
                url: url.to_string(),
                path,
            }),
            Err(GitError::CommandFailed { message }) => {
                cleanup_partial_clone(&path);
                Err(GitError::Unreachable {
                    url: url.to_string(),
                    message,
                })
            }
            Err(e) => {
                cleanup_partial_clone(&path);
                Err(e)
            }
        }
    }

    async fn create_working_copy(
        &self,
        repository: &Repository,
        dest: &Path,
    ) -> Result<WorkingCopy, GitError> {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|source| GitError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        cleanup_partial_clone(dest);
        debug!(url = %repository.url, dest = %dest.display(), "Creating working copy");

        let source = repository.path.to_string_lossy();
        let target = dest.to_string_lossy();
        let parent = dest.parent().unwrap_or(dest);

        if let Err(e) = self
            .git(
                &["clone", "--no-checkout", "--quiet", &*source, &*target],
                parent,
                false,
                self.fetch_timeout,
            )
            .await
        {
            cleanup_partial_clone(dest);
            return Err(e);
        }

        Ok(WorkingCopy {
            path: dest.to_path_buf(),
        })
    }

    async fn list_tags(&self, copy: &WorkingCopy) -> Result<Vec<String>, GitError> {
        let output = self
            .git(&["tag", "--list"], &copy.path, false, None)
            .await?;
        Ok(output
            .stdout_text()
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn checkout(&self, copy: &WorkingCopy, git_ref: &str) -> Result<(), GitError> {
        debug!(git_ref, "Checking out");
        self.git(
            &["-c", "advice.detachedHead=false", "checkout", "--quiet", git_ref],
            &copy.path,
            self.verbose,
            None,
        )
        .await?;
        Ok(())
    }

    async fn head_revision(&self, copy: &WorkingCopy) -> Result<String, GitError> {
        let output = self
            .git(&["rev-parse", "HEAD"], &copy.path, false, None)
            .await?;
        Ok(output.stdout_text())
    }
}

/// Remove a partial clone directory if it exists
fn cleanup_partial_clone(dest: &Path) {
    if dest.exists() {
        let _ = std::fs::remove_dir_all(dest);
    }
}
