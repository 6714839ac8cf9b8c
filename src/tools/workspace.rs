//! Local materialization of repositories
//!
//! Every remote materialization shallow-clones into its own directory under a
//! workspace root, named after the repository, a hash of the URL and a random
//! suffix. Clones land in a hidden staging directory first and are renamed into
//! place only once git succeeds. Only direct children of the root are ever
//! removed.

use anyhow::{anyhow, bail, Context, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};
use uuid::Uuid;

use crate::context::AnalysisContext;

#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Materialized {
    pub path: PathBuf,
    /// True when the directory was created by cloning and is ours to remove
    pub cloned: bool,
}

pub fn is_remote(location: &str) -> bool {
    let location = location.trim();
    location.starts_with("https://")
        || location.starts_with("http://")
        || location.starts_with("git@")
        || location.starts_with("ssh://")
        || location.starts_with("file://")
}

/// `owner/name` of a GitHub URL
pub fn github_slug(url: &str) -> Option<(String, String)> {
    let re = regex::Regex::new(r"github\.com[:/]([^/\s]+)/([^/\s]+?)(?:\.git)?/?$").ok()?;
    let caps = re.captures(url.trim())?;
    Some((caps[1].to_string(), caps[2].to_string()))
}

fn checkout_name(url: &str) -> String {
    let digest = hex::encode(Sha256::digest(url.trim().as_bytes()));
    let name = url
        .trim()
        .trim_end_matches('/')
        .trim_end_matches(".git")
        .rsplit(['/', ':'])
        .next()
        .filter(|n| !n.is_empty() && *n != "." && *n != "..")
        .unwrap_or("repo");
    format!("{}-{}", name, &digest[..12])
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Fresh checkout directory for `url`; never the same for two calls
    pub fn dir_for(&self, url: &str) -> PathBuf {
        let suffix = Uuid::new_v4().simple().to_string();
        self.root.join(format!("{}-{}", checkout_name(url), &suffix[..8]))
    }

    /// A direct child of the root, reached without `..` or symlinks
    pub fn is_managed(&self, path: &Path) -> bool {
        if path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::CurDir))
        {
            return false;
        }

        match path.symlink_metadata() {
            // Nothing on disk, the lexical check is all there is
            Err(_) => path.parent() == Some(self.root.as_path()),
            Ok(metadata) if metadata.file_type().is_symlink() => false,
            Ok(_) => match (path.canonicalize(), self.root.canonicalize()) {
                (Ok(resolved), Ok(root)) => resolved.parent() == Some(root.as_path()),
                _ => false,
            },
        }
    }

    /// Resolves a local path or shallow-clones a remote URL
    pub async fn materialize(&self, location: &str) -> Result<Materialized> {
        if !is_remote(location) {
            let path = PathBuf::from(location.trim());
            if !path.is_dir() {
                bail!("Repository path is not a directory: {}", path.display());
            }
            let path = path
                .canonicalize()
                .with_context(|| format!("Failed to resolve {}", path.display()))?;
            return Ok(Materialized {
                path,
                cloned: false,
            });
        }

        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("Failed to create workspace {}", self.root.display()))?;

        let target = self.dir_for(location);
        // Removed on drop, so a failed, timed out or cancelled clone leaves nothing behind
        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&self.root)
            .with_context(|| format!("Failed to create staging dir in {}", self.root.display()))?;

        info!(url = location, path = %target.display(), "Cloning repository");
        let output = Command::new("git")
            .args(["clone", "--depth", "1", "--quiet", location.trim()])
            .arg(staging.path())
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .context("Failed to spawn git")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git clone failed: {}", stderr.trim()));
        }

        tokio::fs::rename(staging.path(), &target)
            .await
            .with_context(|| format!("Failed to move clone to {}", target.display()))?;
        debug!(path = %target.display(), "Clone in place");

        Ok(Materialized {
            path: target,
            cloned: true,
        })
    }

    /// Removes a managed clone; returns whether anything was deleted
    pub async fn cleanup(&self, path: &Path) -> Result<bool> {
        if !self.is_managed(path) {
            debug!(path = %path.display(), "Not a managed workspace, leaving in place");
            return Ok(false);
        }
        if !path.exists() {
            return Ok(false);
        }

        tokio::fs::remove_dir_all(path)
            .await
            .with_context(|| format!("Failed to remove {}", path.display()))?;
        info!(path = %path.display(), "Removed workspace");
        Ok(true)
    }
}

/// Repository directory for a tool call
///
/// Prefers an explicit `repo_path` argument, then the context's materialized
/// path, then the context's repository when it is a local directory.
pub fn resolve_repo_path(context: &AnalysisContext, arguments: &Value) -> Result<PathBuf> {
    let candidate = arguments
        .get("repo_path")
        .and_then(Value::as_str)
        .map(PathBuf::from)
        .or_else(|| context.repo_path.clone())
        .or_else(|| {
            let local = PathBuf::from(&context.repository);
            (!is_remote(&context.repository) && local.is_dir()).then_some(local)
        })
        .ok_or_else(|| {
            anyhow!("No repository path available; clone the repository first or pass repo_path")
        })?;

    if !candidate.is_dir() {
        bail!("Repository path does not exist: {}", candidate.display());
    }
    Ok(candidate)
}
