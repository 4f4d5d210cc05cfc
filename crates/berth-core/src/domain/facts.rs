//! Repository facts resolved once at the start of a deployment run.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Length of the canonical commit identifier.
pub const COMMIT_ID_LEN: usize = 40;

/// A commit identifier in canonical form: 40 lowercase hex characters.
///
/// Deserialisation goes through [`CommitId::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommitId(String);

impl CommitId {
    /// Canonicalise a raw commit id.
    ///
    /// Longer hex ids (e.g. SHA-256 object names) are truncated to
    /// [`COMMIT_ID_LEN`]; shorter or non-hex input is rejected.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.len() < COMMIT_ID_LEN || !raw.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        Some(Self(raw[..COMMIT_ID_LEN].to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for log lines and skip reasons.
    pub fn short(&self) -> &str {
        &self.0[..8]
    }
}

impl TryFrom<String> for CommitId {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw).ok_or_else(|| format!("'{raw}' is not a full hex commit id"))
    }
}

impl From<CommitId> for String {
    fn from(id: CommitId) -> Self {
        id.0
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `owner/name` identity of a hosted repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoSlug {
    pub owner: String,
    pub name: String,
}

impl RepoSlug {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Parse `owner/name`.
    pub fn parse(slug: &str) -> Option<Self> {
        let (owner, name) = slug.split_once('/')?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return None;
        }
        Some(Self::new(owner, name))
    }
}

impl fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Secrets and thresholds only downstream actions consume.
///
/// The planner never reads these. The token is forwarded as-is and is
/// redacted from `Debug` output.
#[derive(Clone, Default)]
pub struct DeploySecrets {
    pub firebase_token: Option<String>,
    pub min_pwa_score: u8,
}

impl fmt::Debug for DeploySecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeploySecrets")
            .field(
                "firebase_token",
                &self.firebase_token.as_ref().map(|_| "<redacted>"),
            )
            .field("min_pwa_score", &self.min_pwa_score)
            .finish()
    }
}

/// Read-only facts about the run.
#[derive(Debug, Clone)]
pub struct RepoFacts {
    pub repository: RepoSlug,
    pub current_branch: String,
    pub current_commit: CommitId,
    pub stable_branch: String,
    pub is_pull_request: bool,
    pub secrets: DeploySecrets,
}
