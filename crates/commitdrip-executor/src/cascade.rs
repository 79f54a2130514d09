//! Push cascade: land a freshly created local commit on the remote branch.
//!
//! The remote may have moved since the working tree was set up. Reconciliation
//! falls through rebase, a merge preferring the remote's side, and a cherry-pick
//! onto the remote tip; if all of those fail the local commit is forced. The
//! repository is owned by this system, so forward progress wins over preserving
//! conflicting remote edits.
//!
//! Individual step failures are swallowed. Only the final push decides the outcome.

use std::path::Path;
use tracing::{debug, info, warn};

use crate::driver::GitDriver;

const REMOTE: &str = "origin";

/// How local and remote history were reconciled before pushing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconcile {
    /// The remote branch did not exist.
    FreshBranch,
    Rebased,
    /// Merged, conflicting hunks resolved in favor of the remote.
    MergedTheirs,
    /// Reset to the remote tip and reapplied the local commit.
    CherryPicked,
    /// Forced the working tree to the local commit, discarding remote changes.
    ForcedLocal,
    /// The local commit could not be identified; history left as it was.
    Unreconciled,
}

impl Reconcile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reconcile::FreshBranch => "fresh_branch",
            Reconcile::Rebased => "rebased",
            Reconcile::MergedTheirs => "merged_theirs",
            Reconcile::CherryPicked => "cherry_picked",
            Reconcile::ForcedLocal => "forced_local",
            Reconcile::Unreconciled => "unreconciled",
        }
    }
}

/// Push variant that finally succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushMode {
    /// Conditional force push, refused if the remote moved since the last fetch.
    ForceWithLease,
    Plain,
    Force,
}

impl PushMode {
    fn flag(&self) -> Option<&'static str> {
        match self {
            PushMode::ForceWithLease => Some("--force-with-lease"),
            PushMode::Plain => None,
            PushMode::Force => Some("--force"),
        }
    }
}

/// Outcome of a cascade run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushReport {
    pub reconcile: Reconcile,
    /// `None` when every push variant was rejected.
    pub pushed_with: Option<PushMode>,
    /// Output of the last push attempt, for diagnostics.
    pub output: String,
}

impl PushReport {
    pub fn is_success(&self) -> bool {
        self.pushed_with.is_some()
    }
}

/// Run the cascade for the repository in `dir` against `origin/{branch}`.
pub async fn push_with_cascade(driver: &GitDriver, dir: &Path, branch: &str) -> PushReport {
    let _ = driver.run(dir, &["config", "pull.rebase", "true"]).await;
    let _ = driver.run(dir, &["config", "rebase.autoStash", "true"]).await;
    if let Err(e) = driver.run(dir, &["fetch", REMOTE]).await {
        warn!(error = %e, "Fetch before push failed");
    }

    let tracking = format!("{}/{}", REMOTE, branch);
    let remote_exists = driver
        .run(dir, &["rev-parse", "--verify", "--quiet", &tracking])
        .await
        .is_ok();

    let reconcile = if remote_exists {
        reconcile(driver, dir, &tracking).await
    } else {
        Reconcile::FreshBranch
    };
    debug!(strategy = reconcile.as_str(), "Reconciled with remote");

    let _ = driver.run(dir, &["branch", "-M", branch]).await;

    let mut output = String::new();
    for mode in [PushMode::ForceWithLease, PushMode::Plain, PushMode::Force] {
        let mut args = vec!["push", "-u", REMOTE, branch];
        if let Some(flag) = mode.flag() {
            args.push(flag);
        }

        match driver.run(dir, &args).await {
            Ok(out) => {
                info!(
                    strategy = reconcile.as_str(),
                    mode = ?mode,
                    "Pushed to remote"
                );
                return PushReport {
                    reconcile,
                    pushed_with: Some(mode),
                    output: out.combined(),
                };
            }
            Err(e) => {
                warn!(mode = ?mode, error = %e, "Push attempt rejected");
                output = e.output;
            }
        }
    }

    PushReport {
        reconcile,
        pushed_with: None,
        output,
    }
}

async fn reconcile(driver: &GitDriver, dir: &Path, tracking: &str) -> Reconcile {
    if driver.run(dir, &["rebase", tracking]).await.is_ok() {
        return Reconcile::Rebased;
    }
    let _ = driver.run(dir, &["rebase", "--abort"]).await;

    if driver
        .run(dir, &["merge", tracking, "--no-edit", "-X", "theirs"])
        .await
        .is_ok()
    {
        return Reconcile::MergedTheirs;
    }
    let _ = driver.run(dir, &["merge", "--abort"]).await;

    let ours = match driver.run(dir, &["rev-parse", "HEAD"]).await {
        Ok(out) if !out.trimmed().is_empty() => out.trimmed().to_string(),
        _ => {
            warn!("Could not resolve local commit; pushing history as is");
            return Reconcile::Unreconciled;
        }
    };

    let _ = driver.run(dir, &["reset", "--hard", tracking]).await;
    if driver.run(dir, &["cherry-pick", &ours]).await.is_ok() {
        return Reconcile::CherryPicked;
    }
    let _ = driver.run(dir, &["cherry-pick", "--abort"]).await;

    warn!(commit = %ours, "All reconciliation failed; forcing local commit");
    let _ = driver.run(dir, &["reset", "--hard", &ours]).await;
    Reconcile::ForcedLocal
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::{LocalRepo, StageOutcome};
    use crate::testing::{BareRemote, git, git_available};
    use std::path::PathBuf;

    struct Fixture {
        _tmp: tempfile::TempDir,
        scratch: PathBuf,
        remote: BareRemote,
        repo: LocalRepo,
    }

    impl Fixture {
        fn tree(&self) -> &Path {
            self.repo.dir()
        }

        fn write(&self, name: &str, content: &str) {
            std::fs::write(self.tree().join(name), content).unwrap();
        }

        async fn commit(&self, files: &[&str], message: &str) {
            let files: Vec<String> = files.iter().map(|f| f.to_string()).collect();
            let staged = self.repo.stage(&files).await.unwrap();
            assert!(matches!(staged, StageOutcome::Staged(_)));
            self.repo.commit(message).await.unwrap();
        }
    }

    async fn setup() -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let scratch = tmp.path().join("scratch");
        std::fs::create_dir_all(&scratch).unwrap();
        let remote = BareRemote::create(&tmp.path().join("remotes"), "octo/demo");
        let tree = tmp.path().join("tree");
        std::fs::create_dir_all(&tree).unwrap();

        let repo = LocalRepo::init(
            GitDriver::default(),
            &tree,
            &remote.url(),
            "main",
            "octo",
            "octo@users.noreply.github.com",
        )
        .await
        .unwrap();

        Fixture {
            _tmp: tmp,
            scratch,
            remote,
            repo,
        }
    }

    #[tokio::test]
    async fn test_push_to_fresh_remote() {
        if !git_available() {
            return;
        }
        let fx = setup().await;
        fx.write("a.txt", "a\n");
        fx.commit(&["a.txt"], "first").await;

        let report = fx.repo.push().await;

        assert!(report.is_success(), "{}", report.output);
        assert_eq!(report.reconcile, Reconcile::FreshBranch);
        assert_eq!(fx.remote.log("main"), vec!["first"]);
    }

    #[tokio::test]
    async fn test_diverged_remote_is_rebased() {
        if !git_available() {
            return;
        }
        let fx = setup().await;
        fx.write("a.txt", "a\n");
        fx.commit(&["a.txt"], "first").await;
        assert!(fx.repo.push().await.is_success());

        fx.remote
            .commit_from_elsewhere(&fx.scratch, &[("remote.txt", "r\n")], "remote change");

        fx.write("b.txt", "b\n");
        fx.commit(&["b.txt"], "second").await;
        let report = fx.repo.push().await;

        assert!(report.is_success(), "{}", report.output);
        assert_eq!(report.reconcile, Reconcile::Rebased);
        assert_eq!(
            fx.remote.log("main"),
            vec!["first", "remote change", "second"]
        );
        assert_eq!(fx.remote.show("main", "remote.txt"), "r");
        assert_eq!(fx.remote.show("main", "b.txt"), "b");
    }

    #[tokio::test]
    async fn test_conflicting_remote_prefers_theirs() {
        if !git_available() {
            return;
        }
        let fx = setup().await;
        fx.write("a.txt", "base\n");
        fx.commit(&["a.txt"], "first").await;
        assert!(fx.repo.push().await.is_success());

        fx.remote
            .commit_from_elsewhere(&fx.scratch, &[("a.txt", "remote\n")], "remote edit");

        fx.write("a.txt", "local\n");
        fx.write("c.txt", "c\n");
        fx.commit(&["a.txt", "c.txt"], "local edit").await;
        let report = fx.repo.push().await;

        assert!(report.is_success(), "{}", report.output);
        assert_eq!(report.reconcile, Reconcile::MergedTheirs);
        assert_eq!(fx.remote.show("main", "a.txt"), "remote");
        assert_eq!(fx.remote.show("main", "c.txt"), "c");
        let log = fx.remote.log("main");
        assert!(log.contains(&"remote edit".to_string()));
        assert!(log.contains(&"local edit".to_string()));
    }

    #[tokio::test]
    async fn test_modify_delete_conflict_forces_local() {
        if !git_available() {
            return;
        }
        let fx = setup().await;
        fx.write("a.txt", "base\n");
        fx.commit(&["a.txt"], "first").await;
        assert!(fx.repo.push().await.is_success());

        fx.remote
            .delete_from_elsewhere(&fx.scratch, &["a.txt"], "remote delete");

        fx.write("a.txt", "local\n");
        fx.commit(&["a.txt"], "local edit").await;
        let report = fx.repo.push().await;

        assert!(report.is_success(), "{}", report.output);
        assert_eq!(report.reconcile, Reconcile::ForcedLocal);
        assert_eq!(fx.remote.log("main"), vec!["first", "local edit"]);
        assert_eq!(fx.remote.show("main", "a.txt"), "local");
    }

    #[tokio::test]
    async fn test_last_commit_is_cherry_picked_past_conflicting_history() {
        if !git_available() {
            return;
        }
        let fx = setup().await;
        fx.write("a.txt", "base\n");
        fx.commit(&["a.txt"], "first").await;
        assert!(fx.repo.push().await.is_success());

        fx.remote
            .delete_from_elsewhere(&fx.scratch, &["a.txt"], "remote delete");

        // The unpushed edit conflicts with the deletion; the newest commit does not.
        fx.write("a.txt", "local\n");
        fx.commit(&["a.txt"], "local edit").await;
        fx.write("c.txt", "c\n");
        fx.commit(&["c.txt"], "add c").await;
        let report = fx.repo.push().await;

        assert!(report.is_success(), "{}", report.output);
        assert_eq!(report.reconcile, Reconcile::CherryPicked);
        assert_eq!(fx.remote.log("main"), vec!["first", "remote delete", "add c"]);
        assert_eq!(fx.remote.show("main", "c.txt"), "c");
        assert!(!fx.tree().join("a.txt").exists());
    }

    #[tokio::test]
    async fn test_unrelated_remote_history_is_replayed() {
        if !git_available() {
            return;
        }
        let fx = setup().await;
        fx.remote
            .commit_from_elsewhere(&fx.scratch, &[("seed.txt", "seed\n")], "seeded elsewhere");

        // Local history never saw the remote, so histories are unrelated.
        fx.write("a.txt", "a\n");
        fx.commit(&["a.txt"], "local root").await;
        let report = fx.repo.push().await;

        assert!(report.is_success(), "{}", report.output);
        assert_eq!(report.reconcile, Reconcile::Rebased);
        assert_eq!(fx.remote.log("main"), vec!["seeded elsewhere", "local root"]);
        assert_eq!(fx.remote.show("main", "seed.txt"), "seed");
        assert_eq!(fx.remote.show("main", "a.txt"), "a");
    }

    #[tokio::test]
    async fn test_push_to_unreachable_remote_fails() {
        if !git_available() {
            return;
        }
        let fx = setup().await;
        fx.write("a.txt", "a\n");
        fx.commit(&["a.txt"], "first").await;
        git(fx.tree(), &["remote", "set-url", "origin", "/nonexistent/remote.git"]);

        let report = fx.repo.push().await;

        assert!(!report.is_success());
        assert_eq!(report.pushed_with, None);
        assert!(!report.output.is_empty());
    }
}
