//! Git backend, driving the `git` command line

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use diagtrack_core::RevisionHistory;

use crate::repository::{RevisionControl, VcsError};

pub struct GitRepository {
    workspace: PathBuf,
}

impl GitRepository {
    pub fn open(workspace: impl Into<PathBuf>) -> Result<Self, VcsError> {
        let workspace = workspace.into();
        if !workspace.join(".git").exists() {
            return Err(VcsError::RepositoryNotFound(workspace.display().to_string()));
        }

        Ok(Self { workspace })
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    fn run(&self, args: &[&str]) -> Result<Output, VcsError> {
        tracing::debug!(workspace = %self.workspace.display(), ?args, "running git");

        // error messages are matched on, so keep them untranslated
        Ok(Command::new("git")
            .env("LC_ALL", "C")
            .arg("-C")
            .arg(&self.workspace)
            .args(args)
            .output()?)
    }

    /// Run git and return stdout, failing on a non-zero exit
    fn stdout(&self, args: &[&str]) -> Result<String, VcsError> {
        let output = self.run(args)?;
        if !output.status.success() {
            return Err(command_failed(args, &output));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn command_failed(args: &[&str], output: &Output) -> VcsError {
    VcsError::CommandFailed {
        command: format!("git {}", args.join(" ")),
        status: output.status.to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    }
}

/// `git show` reports a path absent from an existing revision this way
fn is_missing_path(stderr: &str) -> bool {
    stderr.contains("does not exist in") || stderr.contains("exists on disk, but not in")
}

fn non_empty_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

impl RevisionControl for GitRepository {
    fn name(&self) -> &'static str {
        "git"
    }

    fn revisions(&self) -> Result<RevisionHistory, VcsError> {
        let log = self.stdout(&["log", "--reverse", "--pretty=format:%H"])?;
        let history = RevisionHistory::new(non_empty_lines(&log));

        tracing::info!(revisions = history.len(), "read git history");
        Ok(history)
    }

    fn checkout(&self, revision: &str) -> Result<(), VcsError> {
        self.stdout(&["checkout", "--quiet", revision]).map(|_| ())
    }

    fn files_at(&self, revision: &str) -> Result<Vec<String>, VcsError> {
        let listing = self.stdout(&["ls-tree", "-r", "--name-only", revision])?;
        Ok(non_empty_lines(&listing))
    }

    fn changed_files(&self, from: &str, to: &str) -> Result<Vec<String>, VcsError> {
        let diff = self.stdout(&["diff", "--name-only", from, to])?;
        Ok(non_empty_lines(&diff))
    }

    fn load_file(&self, revision: &str, path: &str) -> Result<String, VcsError> {
        let object = format!("{}:{}", revision, path);
        let args = ["show", object.as_str()];
        let output = self.run(&args)?;

        if !output.status.success() {
            if is_missing_path(&String::from_utf8_lossy(&output.stderr)) {
                return Err(VcsError::NotFound {
                    revision: revision.to_string(),
                    path: path.to_string(),
                });
            }
            return Err(command_failed(&args, &output));
        }

        String::from_utf8(output.stdout).map_err(|_| VcsError::InvalidUtf8 {
            revision: revision.to_string(),
            path: path.to_string(),
        })
    }
}
