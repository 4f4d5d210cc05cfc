//! Version branch naming: `<major>.<minor>.x`.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

fn version_branch_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)\.(\d+)\.x$").expect("static regex is valid"))
}

/// `(major, minor)` parsed from a version branch name.
///
/// Field order gives the derived `Ord` numeric lexicographic semantics, so
/// `2.10.x` sorts after `2.9.x`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VersionKey {
    pub major: u64,
    pub minor: u64,
}

impl VersionKey {
    pub fn new(major: u64, minor: u64) -> Self {
        Self { major, minor }
    }

    /// Parse a branch name such as `12.4.x`. Anything else yields `None`.
    pub fn parse_branch(branch: &str) -> Option<Self> {
        let caps = version_branch_re().captures(branch)?;
        let major = caps[1].parse::<u64>().ok()?;
        let minor = caps[2].parse::<u64>().ok()?;
        Some(Self { major, minor })
    }

    /// The branch name this key was parsed from, in canonical form.
    pub fn branch_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for VersionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.x", self.major, self.minor)
    }
}

/// Major version of a version branch, `None` for non-version branches.
pub fn major_of(branch: &str) -> Option<u64> {
    VersionKey::parse_branch(branch).map(|k| k.major)
}
