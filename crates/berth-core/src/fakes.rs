//! In-memory fakes for the engine's collaborators (testing only)
//!
//! Provides `MemoryRemote`, `RecordingAction` and `RecordingDeployer`, which
//! satisfy the collaborator traits without touching git, the filesystem or
//! the network.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::actions::{ActionContext, DeployAction};
use crate::deployer::HostingDeployer;
use crate::domain::error::{BerthError, Result};
use crate::remote::{ref_pattern_matches, RefLine, RemoteRefQuery, HEADS_PREFIX};

// ---------------------------------------------------------------------------
// MemoryRemote
// ---------------------------------------------------------------------------

/// Remote whose refs live in a `Vec<RefLine>` and can change between queries.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    lines: Mutex<Vec<RefLine>>,
    queries: AtomicUsize,
    fail_next: Mutex<Option<String>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remote holding `(branch, commit)` pairs, in order.
    pub fn with_branches(branches: &[(&str, &str)]) -> Self {
        let remote = Self::new();
        for (branch, commit) in branches {
            remote.set_branch(branch, commit);
        }
        remote
    }

    /// Create or move a branch.
    pub fn set_branch(&self, branch: &str, commit: &str) {
        let reference = format!("{HEADS_PREFIX}{branch}");
        let mut lines = self.lines.lock().unwrap();
        match lines.iter_mut().find(|l| l.reference == reference) {
            Some(line) => line.commit = commit.to_string(),
            None => lines.push(RefLine::new(commit, reference)),
        }
    }

    pub fn delete_branch(&self, branch: &str) {
        let reference = format!("{HEADS_PREFIX}{branch}");
        self.lines.lock().unwrap().retain(|l| l.reference != reference);
    }

    /// Append a line verbatim, duplicates included.
    pub fn push_raw_line(&self, commit: &str, reference: &str) {
        self.lines.lock().unwrap().push(RefLine::new(commit, reference));
    }

    /// Make the next query fail with a git error.
    pub fn fail_next(&self, reason: &str) {
        *self.fail_next.lock().unwrap() = Some(reason.to_string());
    }

    /// Number of queries answered (including failed ones).
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl RemoteRefQuery for MemoryRemote {
    fn query(&self, pattern: &str, _remote: &str) -> Result<Vec<RefLine>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.fail_next.lock().unwrap().take() {
            return Err(BerthError::GitError(reason));
        }
        let lines = self.lines.lock().unwrap();
        Ok(lines
            .iter()
            .filter(|l| ref_pattern_matches(pattern, &l.reference))
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Call journal shared by the recording fakes
// ---------------------------------------------------------------------------

/// Ordered log of calls made to recording fakes, e.g. `"build:stable"`.
pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn new_journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

// ---------------------------------------------------------------------------
// RecordingAction
// ---------------------------------------------------------------------------

/// Action that records `"<name>:<target>"` and optionally fails.
#[derive(Debug, Clone)]
pub struct RecordingAction {
    name: String,
    journal: Journal,
    fail_with: Option<String>,
}

impl RecordingAction {
    pub fn new(name: &str, journal: Journal) -> Self {
        Self {
            name: name.to_string(),
            journal,
            fail_with: None,
        }
    }

    pub fn failing(name: &str, journal: Journal, reason: &str) -> Self {
        Self {
            fail_with: Some(reason.to_string()),
            ..Self::new(name, journal)
        }
    }
}

#[async_trait]
impl DeployAction for RecordingAction {
    async fn run(&self, ctx: &ActionContext) -> Result<()> {
        self.journal
            .lock()
            .unwrap()
            .push(format!("{}:{}", self.name, ctx.target));
        match &self.fail_with {
            Some(reason) => Err(BerthError::ActionFailed {
                action: self.name.clone(),
                target: ctx.target.clone(),
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingDeployer
// ---------------------------------------------------------------------------

/// Deployer that records `"deploy:<target>@<site>"`.
#[derive(Debug, Clone)]
pub struct RecordingDeployer {
    journal: Journal,
}

impl RecordingDeployer {
    pub fn new(journal: Journal) -> Self {
        Self { journal }
    }
}

#[async_trait]
impl HostingDeployer for RecordingDeployer {
    async fn deploy(&self, ctx: &ActionContext) -> Result<()> {
        self.journal
            .lock()
            .unwrap()
            .push(format!("deploy:{}@{}", ctx.target, ctx.site_id));
        Ok(())
    }
}
