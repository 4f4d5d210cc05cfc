//! Deployment target descriptors and plans.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Role of a descriptor within a plan.
///
/// Serialises as a plain string. Unrecognised strings are kept in
/// [`TargetKind::Unknown`] so the validator can report them instead of the
/// plan failing to load.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TargetKind {
    /// Produces the build artifact and deploys it.
    Primary,
    /// Republishes the primary's artifact to another hosting coordinate.
    Secondary,
    /// No deployment; carries a reason.
    Skipped,
    Unknown(String),
}

impl TargetKind {
    pub fn as_str(&self) -> &str {
        match self {
            TargetKind::Primary => "primary",
            TargetKind::Secondary => "secondary",
            TargetKind::Skipped => "skipped",
            TargetKind::Unknown(other) => other,
        }
    }
}

impl From<String> for TargetKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "primary" => TargetKind::Primary,
            "secondary" => TargetKind::Secondary,
            "skipped" => TargetKind::Skipped,
            _ => TargetKind::Unknown(value),
        }
    }
}

impl From<TargetKind> for String {
    fn from(kind: TargetKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a [`DeploymentPlan`].
///
/// Which optional fields are required depends on `kind`; the plan validator
/// enforces that. Actions are referenced by name and resolved against an
/// action registry only when the plan is executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetDescriptor {
    pub name: String,
    pub kind: TargetKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy_env: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployed_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_actions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_actions: Vec<String>,
}

/// Name used for every skip descriptor.
pub const SKIPPED_TARGET: &str = "skipped";

impl TargetDescriptor {
    /// A skip descriptor carrying only a reason.
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            name: SKIPPED_TARGET.to_string(),
            kind: TargetKind::Skipped,
            reason: Some(reason.into()),
            deploy_env: None,
            project_id: None,
            site_id: None,
            deployed_url: None,
            pre_actions: Vec::new(),
            post_actions: Vec::new(),
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.kind == TargetKind::Skipped
    }
}

/// Ordered sequence of target descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeploymentPlan {
    pub targets: Vec<TargetDescriptor>,
}

impl DeploymentPlan {
    pub fn new(targets: Vec<TargetDescriptor>) -> Self {
        Self { targets }
    }

    /// Single-entry plan that deploys nothing.
    pub fn skip(reason: impl Into<String>) -> Self {
        Self::new(vec![TargetDescriptor::skipped(reason)])
    }

    pub fn is_skip(&self) -> bool {
        self.targets.iter().any(TargetDescriptor::is_skipped)
    }

    /// Reason of the skip descriptor, if this is a skip plan.
    pub fn skip_reason(&self) -> Option<&str> {
        self.targets
            .iter()
            .find(|t| t.is_skipped())
            .and_then(|t| t.reason.as_deref())
    }

    pub fn names(&self) -> Vec<&str> {
        self.targets.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// SHA-256 over the plan's JSON form, hex encoded.
    ///
    /// Field order is fixed by the struct definitions, so equal plans always
    /// produce equal digests.
    pub fn digest(&self) -> Result<String, serde_json::Error> {
        let bytes = serde_json::to_vec(self)?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(hex::encode(hasher.finalize()))
    }
}
