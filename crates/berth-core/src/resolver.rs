//! Branch/version resolution over a memoised remote-ref query.
//!
//! The resolver answers two questions the deployment policy needs: what is
//! the tip commit of a branch, and which `<major>.<minor>.x` branch is the most
//! recent one (overall or within a major). Every query is cached by its
//! literal `(pattern, remote)` so one run sees a consistent snapshot of the
//! remote even if it changes mid-run.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;

use crate::domain::error::{BerthError, Result};
use crate::domain::facts::CommitId;
use crate::domain::version::VersionKey;
use crate::remote::{RefLine, RemoteRefQuery, HEADS_PREFIX};

/// Whether a query may be answered from the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CachePolicy {
    /// Return the cached answer when present; query and cache otherwise.
    #[default]
    Use,
    /// Always query the remote and replace the cached answer.
    Bypass,
}

/// Remote the resolver queries when none is configured.
pub const DEFAULT_REMOTE: &str = "origin";

/// Resolves branch facts through a [`RemoteRefQuery`].
pub struct BranchVersionResolver<Q> {
    query: Q,
    remote: String,
    cache: Mutex<HashMap<(String, String), Vec<RefLine>>>,
}

impl<Q> BranchVersionResolver<Q>
where
    Q: RemoteRefQuery,
{
    pub fn new(query: Q, remote: impl Into<String>) -> Self {
        Self {
            query,
            remote: remote.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Ref lines matching `pattern` on the configured remote.
    ///
    /// The cache lock is held across the remote query, so concurrent callers
    /// asking the same question serialise and the first answer wins.
    pub fn refs(&self, pattern: &str, policy: CachePolicy) -> Result<Vec<RefLine>> {
        let key = (pattern.to_string(), self.remote.clone());
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());

        if policy == CachePolicy::Use {
            if let Some(lines) = cache.get(&key) {
                debug!(pattern, remote = %self.remote, "ref cache hit");
                return Ok(lines.clone());
            }
        }

        debug!(pattern, remote = %self.remote, ?policy, "querying remote refs");
        let lines = self.query.query(pattern, &self.remote)?;
        cache.insert(key, lines.clone());
        Ok(lines)
    }

    /// Tip commit of `branch` on the remote.
    pub fn latest_commit(&self, branch: &str) -> Result<CommitId> {
        self.latest_commit_with(branch, CachePolicy::Use)
    }

    /// [`latest_commit`](Self::latest_commit) with an explicit cache policy.
    ///
    /// Only lines whose ref is exactly `refs/heads/<branch>` count; the
    /// remote's tail matching would otherwise also report e.g.
    /// `refs/heads/team/<branch>`. If the surviving lines disagree on the
    /// commit the snapshot is untrustworthy and resolution fails.
    pub fn latest_commit_with(&self, branch: &str, policy: CachePolicy) -> Result<CommitId> {
        let wanted = format!("{HEADS_PREFIX}{branch}");
        let lines = self.refs(branch, policy)?;

        let mut commits = Vec::new();
        for line in lines.iter().filter(|l| l.reference == wanted) {
            let commit = CommitId::parse(&line.commit).ok_or_else(|| {
                BerthError::Resolution(format!(
                    "remote '{}' returned malformed commit id '{}' for {}",
                    self.remote, line.commit, wanted
                ))
            })?;
            if !commits.contains(&commit) {
                commits.push(commit);
            }
        }

        match commits.len() {
            0 => Err(BerthError::Resolution(format!(
                "branch '{branch}' does not exist on remote '{}'",
                self.remote
            ))),
            1 => Ok(commits.remove(0)),
            n => Err(BerthError::Resolution(format!(
                "remote '{}' reported {n} different commits for branch '{branch}'",
                self.remote
            ))),
        }
    }

    /// Most recent `<major>.<minor>.x` branch, optionally within one major.
    pub fn most_recent_minor_branch(&self, major: Option<u64>) -> Result<Option<String>> {
        self.most_recent_minor_branch_with(major, CachePolicy::Use)
    }

    /// [`most_recent_minor_branch`](Self::most_recent_minor_branch) with an
    /// explicit cache policy.
    ///
    /// Names that do not strictly parse as a version branch are ignored, as
    /// are branches of another major that slipped through the glob. An empty
    /// remote yields `None`.
    pub fn most_recent_minor_branch_with(
        &self,
        major: Option<u64>,
        policy: CachePolicy,
    ) -> Result<Option<String>> {
        let pattern = match major {
            Some(m) => format!("{HEADS_PREFIX}{m}.*.x"),
            None => format!("{HEADS_PREFIX}*.*.x"),
        };
        let lines = self.refs(&pattern, policy)?;

        let newest = lines
            .iter()
            .filter_map(RefLine::branch_name)
            .filter_map(|name| VersionKey::parse_branch(name).map(|key| (key, name)))
            .filter(|(key, _)| major.map_or(true, |m| key.major == m))
            .max_by_key(|(key, _)| *key)
            .map(|(_, name)| name.to_string());

        debug!(?major, newest = ?newest, "resolved most recent minor branch");
        Ok(newest)
    }
}
