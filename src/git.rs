// Git checkouts of auxiliary tools (e.g. the python-build scripts)
// Clones on first use and fast-forwards to the remote branch afterwards.

use crate::error::{DevbootError, GitError, Result};
use git2::Repository;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A tool repository mirrored into the cache directory
#[derive(Debug, Clone)]
pub struct ToolCheckout {
    url: String,
    branch: String,
    path: PathBuf,
}

impl ToolCheckout {
    pub fn new(url: impl Into<String>, branch: impl Into<String>, path: PathBuf) -> Self {
        Self {
            url: url.into(),
            branch: branch.into(),
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_present(&self) -> bool {
        self.path.join(".git").exists()
    }

    /// Make sure the checkout exists, cloning it if needed
    pub async fn ensure(&self) -> Result<PathBuf> {
        if !self.is_present() {
            self.clone_fresh().await?;
        }
        Ok(self.path.clone())
    }

    /// Clone if missing, otherwise fetch and move the branch to the remote tip
    pub async fn sync(&self) -> Result<PathBuf> {
        if self.is_present() {
            self.fast_forward().await?;
        } else {
            self.clone_fresh().await?;
        }
        Ok(self.path.clone())
    }

    async fn clone_fresh(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if self.path.exists() {
            // Leftover from an interrupted clone
            std::fs::remove_dir_all(&self.path)?;
        }

        info!("Cloning {} into {}", self.url, self.path.display());
        let url = self.url.clone();
        let branch = self.branch.clone();
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || {
            let mut fetch_options = git2::FetchOptions::new();
            fetch_options.depth(1);

            let mut builder = git2::build::RepoBuilder::new();
            builder.branch(&branch);
            builder.fetch_options(fetch_options);
            builder.clone(&url, &path).map(|_| ())
        })
        .await
        .map_err(|e| join_failure("clone", e))?
        .map_err(|e| {
            DevbootError::Git(Box::new(GitError::CloneFailed {
                url: self.url.clone(),
                path: self.path.clone(),
                message: e.message().to_string(),
            }))
        })
    }

    async fn fast_forward(&self) -> Result<()> {
        debug!("Updating {} from {}", self.path.display(), self.url);
        let branch = self.branch.clone();
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || update_branch(&path, &branch))
            .await
            .map_err(|e| join_failure("update", e))?
            .map_err(|e| {
                DevbootError::Git(Box::new(GitError::UpdateFailed {
                    path: self.path.clone(),
                    message: e.message().to_string(),
                }))
            })
    }
}

fn update_branch(path: &Path, branch: &str) -> std::result::Result<(), git2::Error> {
    let repo = Repository::open(path)?;
    let mut remote = repo.find_remote("origin")?;
    remote.fetch(&[branch], None, None)?;

    let fetch_head = repo.find_reference("FETCH_HEAD")?;
    let target = fetch_head.peel_to_commit()?;
    let refname = format!("refs/heads/{branch}");

    match repo.find_reference(&refname) {
        Ok(mut reference) => {
            reference.set_target(target.id(), "devboot: fast-forward")?;
        }
        Err(_) => {
            repo.reference(&refname, target.id(), true, "devboot: track remote")?;
        }
    }
    repo.set_head(&refname)?;
    repo.checkout_head(Some(git2::build::CheckoutBuilder::new().force()))?;
    Ok(())
}

fn join_failure(operation: &str, error: tokio::task::JoinError) -> DevbootError {
    DevbootError::Git(Box::new(GitError::CommandFailed {
        operation: operation.to_string(),
        message: format!("Task execution error: {error}"),
    }))
}
