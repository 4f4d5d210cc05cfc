//! Remote ref queries: the one collaborator the resolver talks to.

use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;

use crate::domain::error::{BerthError, Result};

/// Prefix of branch refs in `git ls-remote` output.
pub const HEADS_PREFIX: &str = "refs/heads/";

/// One `<commit>\t<ref>` line returned by a remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefLine {
    /// Commit id exactly as the remote printed it.
    pub commit: String,
    /// Full ref name, e.g. `refs/heads/12.4.x`.
    pub reference: String,
}

impl RefLine {
    pub fn new(commit: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            commit: commit.into(),
            reference: reference.into(),
        }
    }

    /// Branch name when this is a `refs/heads/` ref.
    pub fn branch_name(&self) -> Option<&str> {
        self.reference.strip_prefix(HEADS_PREFIX)
    }
}

/// Parse `git ls-remote` output. Blank and malformed lines are dropped.
pub fn parse_ref_lines(output: &str) -> Vec<RefLine> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let commit = parts.next()?;
            let reference = parts.next()?;
            if parts.next().is_some() {
                tracing::debug!(line, "ignoring malformed ref line");
                return None;
            }
            Some(RefLine::new(commit, reference))
        })
        .collect()
}

/// Whether `reference` matches an `ls-remote` pattern.
///
/// Mirrors git's tail matching: the pattern may match the whole ref or any
/// trailing run of `/`-separated components, and `*` matches any sequence of
/// characters including `/`.
pub fn ref_pattern_matches(pattern: &str, reference: &str) -> bool {
    let pattern = format!("*/{pattern}");
    let reference = format!("/{reference}");
    glob_match(pattern.as_bytes(), reference.as_bytes())
}

fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while t < text.len() {
        if p < pattern.len() && pattern[p] == b'*' {
            backtrack = Some((p, t));
            p += 1;
        } else if p < pattern.len() && pattern[p] == text[t] {
            p += 1;
            t += 1;
        } else if let Some((star_p, star_t)) = backtrack {
            p = star_p + 1;
            t = star_t + 1;
            backtrack = Some((star_p, star_t + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|&c| c == b'*')
}

/// Lists refs on a remote that match a pattern.
///
/// Implementations are authoritative and synchronous; timeouts and
/// cancellation are theirs to handle.
pub trait RemoteRefQuery: Send + Sync {
    fn query(&self, pattern: &str, remote: &str) -> Result<Vec<RefLine>>;
}

impl<T: RemoteRefQuery + ?Sized> RemoteRefQuery for Arc<T> {
    fn query(&self, pattern: &str, remote: &str) -> Result<Vec<RefLine>> {
        (**self).query(pattern, remote)
    }
}

/// [`RemoteRefQuery`] backed by `git ls-remote`.
#[derive(Debug, Clone, Default)]
pub struct GitLsRemote {
    /// Directory to run git in; the process cwd when `None`.
    pub repo_dir: Option<PathBuf>,
}

impl GitLsRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_dir(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: Some(repo_dir.into()),
        }
    }
}

impl RemoteRefQuery for GitLsRemote {
    fn query(&self, pattern: &str, remote: &str) -> Result<Vec<RefLine>> {
        let mut cmd = Command::new("git");
        cmd.args(["ls-remote", remote, pattern]);
        if let Some(dir) = &self.repo_dir {
            cmd.current_dir(dir);
        }

        let output = cmd
            .output()
            .map_err(|e| BerthError::GitError(format!("failed to run git: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BerthError::GitError(format!(
                "git ls-remote {remote} {pattern} failed: {}",
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_ref_lines(&stdout))
    }
}
