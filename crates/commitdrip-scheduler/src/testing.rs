//! Fakes and fixtures shared by the scheduler tests.

use async_trait::async_trait;
use bytes::Bytes;
use commitdrip_core::{
    CommitPlan, Job, JobId, JobPlan, JobStatus, Notification, Notifier, ObjectStore, Result,
    archive_key,
};
use commitdrip_db::{DbResult, FsObjectStore, JobRepo, JobUpdate, MemoryJobRepo};
use commitdrip_executor::{GitDriver, RemoteSpec};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use zip::write::SimpleFileOptions;

use crate::runner::{JobRunner, RunnerConfig};

/// Notifier that keeps everything it is given.
#[derive(Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn recorded(&self) -> Vec<Notification> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        self.seen.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// In-memory store that snapshots a job after every write.
#[derive(Default)]
pub struct RecordingJobRepo {
    inner: MemoryJobRepo,
    history: Mutex<Vec<Job>>,
}

impl RecordingJobRepo {
    pub async fn get(&self, id: JobId) -> Option<Job> {
        self.inner.get(id).await
    }

    pub async fn history(&self, id: JobId) -> Vec<Job> {
        self.history
            .lock()
            .unwrap()
            .iter()
            .filter(|j| j.id == id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl JobRepo for RecordingJobRepo {
    async fn insert(&self, job: &Job) -> DbResult<()> {
        self.inner.insert(job).await
    }

    async fn find(&self, id: JobId) -> DbResult<Option<Job>> {
        self.inner.find(id).await
    }

    async fn find_by_status(&self, status: JobStatus) -> DbResult<Vec<Job>> {
        self.inner.find_by_status(status).await
    }

    async fn list(&self, status: Option<JobStatus>, limit: i64) -> DbResult<Vec<Job>> {
        self.inner.list(status, limit).await
    }

    async fn update(&self, id: JobId, update: JobUpdate) -> DbResult<()> {
        self.inner.update(id, update).await?;
        if let Some(job) = self.inner.get(id).await {
            self.history.lock().unwrap().push(job);
        }
        Ok(())
    }
}

pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

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

/// Bare repository at `{base}/{owner}/{name}.git`.
pub struct BareRemote {
    path: PathBuf,
}

impl BareRemote {
    pub fn create(base: &Path, repo: &str) -> Self {
        let path = base.join(format!("{}.git", repo));
        std::fs::create_dir_all(&path).unwrap();
        git(&path, &["init", "-q", "--bare"]);
        git(&path, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        Self { path }
    }

    /// Commit subjects on `branch`, oldest first.
    pub fn log(&self, branch: &str) -> Vec<String> {
        git(&self.path, &["log", "--reverse", "--format=%s", branch])
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub fn show(&self, branch: &str, file: &str) -> String {
        git(&self.path, &["show", &format!("{}:{}", branch, file)])
    }

    /// Push one commit writing `files` on top of `main` from a throwaway clone.
    pub fn push_files(&self, scratch: &Path, files: &[(&str, &str)], message: &str) {
        let clone = tempfile::tempdir_in(scratch).unwrap();
        let dir = clone.path();
        let url = self.path.to_string_lossy().to_string();
        git(dir, &["init", "-q"]);
        git(dir, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        git(dir, &["config", "user.name", "Test"]);
        git(dir, &["config", "user.email", "test@example.com"]);
        git(dir, &["config", "commit.gpgsign", "false"]);
        git(dir, &["remote", "add", "origin", &url]);
        git(dir, &["fetch", "-q", "origin"]);
        let has_main = Command::new("git")
            .args(["rev-parse", "--verify", "--quiet", "origin/main"])
            .current_dir(dir)
            .output()
            .unwrap()
            .status
            .success();
        if has_main {
            git(dir, &["reset", "-q", "--hard", "origin/main"]);
        }
        for (name, content) in files {
            std::fs::write(dir.join(name), content).unwrap();
            git(dir, &["add", name]);
        }
        git(dir, &["commit", "-q", "-m", message]);
        git(dir, &["push", "-q", "origin", "main"]);
    }
}

/// Plan targeting `octo/demo` with one file per commit: `(file, message, delay_mins)`.
pub fn make_plan(commits: &[(&str, &str, u32)]) -> JobPlan {
    JobPlan {
        repo: "octo/demo".to_string(),
        commits: commits
            .iter()
            .map(|(file, message, delay_mins)| CommitPlan {
                files: vec![file.to_string()],
                message: message.to_string(),
                delay_mins: *delay_mins,
            })
            .collect(),
    }
}

pub fn write_zip(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// Scratch directories plus in-memory collaborators for one test.
pub struct Harness {
    _tmp: tempfile::TempDir,
    pub remotes: PathBuf,
    pub scratch: PathBuf,
    pub storage: PathBuf,
    pub work_dir: PathBuf,
    pub jobs: Arc<RecordingJobRepo>,
    pub objects: Arc<FsObjectStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub delay_unit: Duration,
}

impl Harness {
    pub fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = ["remotes", "scratch", "storage", "work"].map(|d| {
            let path = tmp.path().join(d);
            std::fs::create_dir_all(&path).unwrap();
            path
        });
        let [remotes, scratch, storage, work_dir] = dirs;

        Self {
            objects: Arc::new(FsObjectStore::new(&storage)),
            _tmp: tmp,
            remotes,
            scratch,
            storage,
            work_dir,
            jobs: Arc::new(RecordingJobRepo::default()),
            notifier: Arc::new(RecordingNotifier::default()),
            delay_unit: Duration::from_millis(50),
        }
    }

    pub fn with_delay_unit(mut self, unit: Duration) -> Self {
        self.delay_unit = unit;
        self
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            work_dir: self.work_dir.clone(),
            branch: "main".to_string(),
            remote: RemoteSpec {
                base_url: self.remotes.to_string_lossy().to_string(),
                username: "octo".to_string(),
                token: None,
            },
            author_name: "octo".to_string(),
            author_email: "octo@users.noreply.github.com".to_string(),
            delay_unit: self.delay_unit,
            cancel_poll: Duration::from_millis(20),
        }
    }

    pub fn runner(&self) -> JobRunner {
        JobRunner::new(
            self.jobs.clone(),
            self.objects.clone(),
            self.notifier.clone(),
            GitDriver::new(Duration::from_secs(30)),
            self.runner_config(),
        )
    }

    pub fn job(&self, plan: JobPlan) -> Job {
        let id = JobId::new();
        Job::from_plan(id, plan, archive_key(&id, "source.zip"))
    }

    pub async fn put_archive(&self, job: &Job, entries: &[(&str, &str)]) {
        self.objects
            .put(&job.archive_key, Bytes::from(write_zip(entries)))
            .await
            .unwrap();
    }

    pub fn archive_exists(&self, job: &Job) -> bool {
        self.storage.join(&job.archive_key).exists()
    }

    pub fn work_dir_for(&self, job: &Job) -> PathBuf {
        self.work_dir.join(job.id.to_string())
    }

    /// Poll the store until `done` holds for the job, for up to ten seconds.
    pub async fn wait_for(&self, id: JobId, done: impl Fn(&Job) -> bool) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            if let Some(job) = self.jobs.get(id).await {
                if done(&job) {
                    return;
                }
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for job {}",
                id
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
