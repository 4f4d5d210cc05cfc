//! Domain-level error taxonomy for Berth.

/// Deployment plan invariant violations reported by the plan validator.
///
/// Variants are ordered the way the validator checks them; the first violated
/// invariant is the one reported.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("target '{target}' has unknown kind '{kind}' (expected primary, secondary or skipped)")]
    UnknownKind { target: String, kind: String },

    #[error("{kind} target '{target}' is missing required field: {field}")]
    MissingField {
        target: String,
        kind: String,
        field: String,
    },

    #[error("target name '{name}' appears more than once in the plan")]
    DuplicateName { name: String },

    #[error("skipped target '{skipped}' must be the only entry, but the plan has {len} targets")]
    SkipNotExclusive { skipped: String, len: usize },

    #[error("deployment plan is empty")]
    EmptyPlan,

    #[error("expected exactly one primary target, found {count}: [{}]", .primaries.join(", "))]
    PrimaryCount { count: usize, primaries: Vec<String> },

    #[error("primary target '{primary}' must come first, but '{first}' is at index 0")]
    PrimaryNotFirst { primary: String, first: String },

    #[error(
        "secondary target '{secondary}' deploys env '{secondary_env}' but primary '{primary}' builds '{primary_env}'"
    )]
    SecondaryEnvMismatch {
        secondary: String,
        secondary_env: String,
        primary: String,
        primary_env: String,
    },
}

/// Berth errors. Every variant is terminal for a deployment run.
#[derive(Debug, thiserror::Error)]
pub enum BerthError {
    #[error("resolution error: {0}")]
    Resolution(String),

    #[error("policy ambiguity for branch '{branch}': {detail}")]
    PolicyAmbiguity { branch: String, detail: String },

    #[error("invalid deployment plan: {0}")]
    Validation(#[from] ValidationError),

    #[error("git error: {0}")]
    GitError(String),

    #[error("unknown deployment target: {0}")]
    UnknownTarget(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("target '{target}' references unregistered action '{action}'")]
    UnknownAction { target: String, action: String },

    #[error("action '{action}' failed for target '{target}': {reason}")]
    ActionFailed {
        action: String,
        target: String,
        reason: String,
    },

    #[error("deploy of target '{target}' failed: {reason}")]
    DeployFailed { target: String, reason: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for Berth operations.
pub type Result<T> = std::result::Result<T, BerthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_count_lists_offending_names() {
        let err = ValidationError::PrimaryCount {
            count: 2,
            primaries: vec!["next".to_string(), "stable".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("found 2"));
        assert!(msg.contains("[next, stable]"));
    }

    #[test]
    fn test_secondary_env_mismatch_names_both_targets() {
        let err = ValidationError::SecondaryEnvMismatch {
            secondary: "stable-redeployed-as-rc".to_string(),
            secondary_env: "rc".to_string(),
            primary: "stable".to_string(),
            primary_env: "stable".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("stable-redeployed-as-rc"));
        assert!(msg.contains("'rc'"));
    }

    #[test]
    fn test_validation_error_wraps_into_berth_error() {
        let err: BerthError = ValidationError::EmptyPlan.into();
        assert!(err.to_string().contains("invalid deployment plan"));
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_policy_ambiguity_names_branch() {
        let err = BerthError::PolicyAmbiguity {
            branch: "11.2.x".to_string(),
            detail: "rc branch is not newer than stable".to_string(),
        };
        assert!(err.to_string().contains("11.2.x"));
    }
}
