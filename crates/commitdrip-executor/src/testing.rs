//! Helpers for tests that drive a real git binary against local bare remotes.

use std::path::{Path, PathBuf};
use std::process::Command;

pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Run git synchronously, panicking with its stderr on failure.
pub fn git(cwd: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// A bare repository standing in for the hosted remote.
///
/// Remote URLs resolve as `{base}/{owner}/{name}.git`, matching [`crate::RemoteSpec`].
pub struct BareRemote {
    pub base: PathBuf,
    pub path: PathBuf,
}

impl BareRemote {
    pub fn create(base: &Path, repo: &str) -> Self {
        let path = base.join(format!("{}.git", repo));
        std::fs::create_dir_all(&path).unwrap();
        git(&path, &["init", "-q", "--bare"]);
        git(&path, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        Self {
            base: base.to_path_buf(),
            path,
        }
    }

    pub fn url(&self) -> String {
        self.path.to_string_lossy().to_string()
    }

    /// Commit subjects on `branch`, oldest first.
    pub fn log(&self, branch: &str) -> Vec<String> {
        let out = git(&self.path, &["log", "--reverse", "--format=%s", branch]);
        out.lines().map(str::to_string).collect()
    }

    pub fn show(&self, branch: &str, file: &str) -> String {
        git(&self.path, &["show", &format!("{}:{}", branch, file)])
    }

    /// Push a commit writing `files` from an independent clone, diverging the remote.
    pub fn commit_from_elsewhere(&self, scratch: &Path, files: &[(&str, &str)], message: &str) {
        let clone = self.clone_at_tip(scratch);
        for (name, content) in files {
            let path = clone.join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(path, content).unwrap();
            git(&clone, &["add", name]);
        }
        git(&clone, &["commit", "-q", "-m", message]);
        git(&clone, &["push", "-q", "origin", "main"]);
    }

    /// Push a commit deleting `files` from an independent clone.
    pub fn delete_from_elsewhere(&self, scratch: &Path, files: &[&str], message: &str) {
        let clone = self.clone_at_tip(scratch);
        for name in files {
            git(&clone, &["rm", "-q", name]);
        }
        git(&clone, &["commit", "-q", "-m", message]);
        git(&clone, &["push", "-q", "origin", "main"]);
    }

    fn clone_at_tip(&self, scratch: &Path) -> PathBuf {
        let clone = scratch.join(format!("elsewhere-{}", rand_suffix()));
        std::fs::create_dir_all(&clone).unwrap();
        git(&clone, &["init", "-q"]);
        git(&clone, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        configure_identity(&clone);
        git(&clone, &["remote", "add", "origin", &self.url()]);
        git(&clone, &["fetch", "-q", "origin"]);
        let has_main = Command::new("git")
            .args(["rev-parse", "--verify", "origin/main"])
            .current_dir(&clone)
            .output()
            .unwrap()
            .status
            .success();
        if has_main {
            git(&clone, &["reset", "-q", "--hard", "origin/main"]);
        }
        clone
    }

    /// Whether any ref exists in the repository.
    pub fn has_refs(&self) -> bool {
        !git(&self.path, &["for-each-ref"]).is_empty()
    }
}

pub fn configure_identity(dir: &Path) {
    git(dir, &["config", "user.name", "Test"]);
    git(dir, &["config", "user.email", "test@example.com"]);
    git(dir, &["config", "commit.gpgsign", "false"]);
}

fn rand_suffix() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0)
}
