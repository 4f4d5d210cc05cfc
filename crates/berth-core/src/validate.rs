//! Deployment plan validation.
//!
//! Checks a [`DeploymentPlan`] against its structural invariants before any
//! side effect runs. Validation is pure; a passing plan is wrapped in a
//! [`ValidatedPlan`], the only plan type the executor accepts.
//!
//! Checks, in order (the first violation is reported):
//! 1. every descriptor has a known kind
//! 2. every descriptor has the fields its kind requires
//! 3. a skipped descriptor is the only entry
//! 4. exactly one primary descriptor, at index 0
//! 5. every secondary's `deployEnv` equals the primary's
//! 6. target names are unique

use std::collections::HashSet;

use crate::domain::error::ValidationError;
use crate::domain::target::{DeploymentPlan, TargetDescriptor, TargetKind};

/// A plan that passed [`validate_plan`]. Immutable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedPlan(DeploymentPlan);

impl ValidatedPlan {
    pub fn plan(&self) -> &DeploymentPlan {
        &self.0
    }
}

/// Validate `plan`, taking ownership so it cannot be mutated afterwards.
///
/// # Errors
///
/// The first violated invariant, as a [`ValidationError`] naming the
/// offending descriptors.
pub fn validate_plan(plan: DeploymentPlan) -> Result<ValidatedPlan, ValidationError> {
    check_plan(&plan)?;
    Ok(ValidatedPlan(plan))
}

/// Check `plan` without consuming it.
pub fn check_plan(plan: &DeploymentPlan) -> Result<(), ValidationError> {
    let targets = &plan.targets;

    for target in targets {
        if let TargetKind::Unknown(kind) = &target.kind {
            return Err(ValidationError::UnknownKind {
                target: target.name.clone(),
                kind: kind.clone(),
            });
        }
    }

    for target in targets {
        check_required_fields(target)?;
    }

    if let Some(skipped) = targets.iter().find(|t| t.is_skipped()) {
        if targets.len() != 1 {
            return Err(ValidationError::SkipNotExclusive {
                skipped: skipped.name.clone(),
                len: targets.len(),
            });
        }
        return Ok(());
    }

    let first = targets.first().ok_or(ValidationError::EmptyPlan)?;
    let primaries: Vec<&TargetDescriptor> = targets
        .iter()
        .filter(|t| t.kind == TargetKind::Primary)
        .collect();
    if primaries.len() != 1 {
        return Err(ValidationError::PrimaryCount {
            count: primaries.len(),
            primaries: primaries.iter().map(|t| t.name.clone()).collect(),
        });
    }
    let primary = primaries[0];
    if first.kind != TargetKind::Primary {
        return Err(ValidationError::PrimaryNotFirst {
            primary: primary.name.clone(),
            first: first.name.clone(),
        });
    }

    let primary_env = primary.deploy_env.as_deref().unwrap_or_default();
    for secondary in targets.iter().filter(|t| t.kind == TargetKind::Secondary) {
        let secondary_env = secondary.deploy_env.as_deref().unwrap_or_default();
        if secondary_env != primary_env {
            return Err(ValidationError::SecondaryEnvMismatch {
                secondary: secondary.name.clone(),
                secondary_env: secondary_env.to_string(),
                primary: primary.name.clone(),
                primary_env: primary_env.to_string(),
            });
        }
    }

    let mut seen = HashSet::new();
    for target in targets {
        if !seen.insert(target.name.as_str()) {
            return Err(ValidationError::DuplicateName {
                name: target.name.clone(),
            });
        }
    }

    Ok(())
}

fn check_required_fields(target: &TargetDescriptor) -> Result<(), ValidationError> {
    let missing = |field: &str| ValidationError::MissingField {
        target: target.name.clone(),
        kind: target.kind.to_string(),
        field: field.to_string(),
    };
    let present = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.trim().is_empty());

    if target.name.trim().is_empty() {
        return Err(missing("name"));
    }

    match target.kind {
        TargetKind::Skipped => {
            if !present(&target.reason) {
                return Err(missing("reason"));
            }
        }
        TargetKind::Primary | TargetKind::Secondary => {
            let fields = [
                ("deployEnv", &target.deploy_env),
                ("projectId", &target.project_id),
                ("siteId", &target.site_id),
                ("deployedUrl", &target.deployed_url),
            ];
            if let Some((field, _)) = fields.iter().find(|(_, value)| !present(*value)) {
                return Err(missing(*field));
            }
        }
        TargetKind::Unknown(_) => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deployable(name: &str, kind: TargetKind, env: &str) -> TargetDescriptor {
        TargetDescriptor {
            name: name.to_string(),
            kind,
            reason: None,
            deploy_env: Some(env.to_string()),
            project_id: Some("angular-io".to_string()),
            site_id: Some(format!("{name}-site")),
            deployed_url: Some(format!("https://{name}.angular.io/")),
            pre_actions: vec!["build".to_string()],
            post_actions: Vec::new(),
        }
    }

    fn primary(name: &str, env: &str) -> TargetDescriptor {
        deployable(name, TargetKind::Primary, env)
    }

    fn secondary(name: &str, env: &str) -> TargetDescriptor {
        deployable(name, TargetKind::Secondary, env)
    }

    #[test]
    fn test_accepts_single_skip() {
        assert!(validate_plan(DeploymentPlan::skip("PR build")).is_ok());
    }

    #[test]
    fn test_accepts_primary_with_secondaries() {
        let plan = DeploymentPlan::new(vec![
            primary("stable", "stable"),
            secondary("stable-redeployed-as-rc", "stable"),
            secondary("stable-mirror", "stable"),
        ]);
        let validated = validate_plan(plan.clone()).unwrap();
        assert_eq!(validated.plan(), &plan);
    }

    #[test]
    fn test_rejects_unknown_kind_first() {
        let mut odd = primary("odd", "next");
        odd.kind = TargetKind::Unknown("tertiary".to_string());
        odd.site_id = None;
        let err = check_plan(&DeploymentPlan::new(vec![odd])).unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnknownKind {
                target: "odd".to_string(),
                kind: "tertiary".to_string()
            }
        );
    }

    #[test]
    fn test_rejects_missing_fields() {
        let mut next = primary("next", "next");
        next.site_id = Some("  ".to_string());
        let err = check_plan(&DeploymentPlan::new(vec![next])).unwrap_err();
        match err {
            ValidationError::MissingField { target, kind, field } => {
                assert_eq!(target, "next");
                assert_eq!(kind, "primary");
                assert_eq!(field, "siteId");
            }
            other => panic!("Expected MissingField, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_skip_without_reason() {
        let mut skip = TargetDescriptor::skipped("x");
        skip.reason = None;
        let err = check_plan(&DeploymentPlan::new(vec![skip])).unwrap_err();
        assert!(matches!(err, ValidationError::MissingField { field, .. } if field == "reason"));
    }

    #[test]
    fn test_rejects_skip_combined_with_work() {
        let plan = DeploymentPlan::new(vec![
            primary("next", "next"),
            TargetDescriptor::skipped("commit is stale"),
        ]);
        let err = check_plan(&plan).unwrap_err();
        assert_eq!(
            err,
            ValidationError::SkipNotExclusive {
                skipped: "skipped".to_string(),
                len: 2
            }
        );
    }

    #[test]
    fn test_two_skips_report_skip_exclusivity() {
        let plan = DeploymentPlan::new(vec![
            TargetDescriptor::skipped("a"),
            TargetDescriptor::skipped("b"),
        ]);
        assert_eq!(
            check_plan(&plan).unwrap_err(),
            ValidationError::SkipNotExclusive {
                skipped: "skipped".to_string(),
                len: 2
            }
        );
    }

    #[test]
    fn test_rejects_two_primaries() {
        let plan = DeploymentPlan::new(vec![primary("next", "next"), primary("rc", "rc")]);
        let err = check_plan(&plan).unwrap_err();
        assert_eq!(
            err,
            ValidationError::PrimaryCount {
                count: 2,
                primaries: vec!["next".to_string(), "rc".to_string()]
            }
        );
    }

    #[test]
    fn test_rejects_no_primary() {
        let plan = DeploymentPlan::new(vec![secondary("stable-redeployed-as-rc", "stable")]);
        let err = check_plan(&plan).unwrap_err();
        assert!(matches!(err, ValidationError::PrimaryCount { count: 0, .. }));
    }

    #[test]
    fn test_rejects_empty_plan() {
        assert_eq!(
            check_plan(&DeploymentPlan::default()).unwrap_err(),
            ValidationError::EmptyPlan
        );
    }

    #[test]
    fn test_rejects_primary_not_first() {
        let plan = DeploymentPlan::new(vec![
            secondary("stable-redeployed-as-rc", "stable"),
            primary("stable", "stable"),
        ]);
        let err = check_plan(&plan).unwrap_err();
        assert_eq!(
            err,
            ValidationError::PrimaryNotFirst {
                primary: "stable".to_string(),
                first: "stable-redeployed-as-rc".to_string()
            }
        );
    }

    #[test]
    fn test_rejects_secondary_with_different_env() {
        let plan = DeploymentPlan::new(vec![
            primary("stable", "stable"),
            secondary("stable-redeployed-as-rc", "rc"),
        ]);
        let err = check_plan(&plan).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::SecondaryEnvMismatch { ref secondary, .. } if secondary == "stable-redeployed-as-rc"
        ));
    }

    #[test]
    fn test_rejects_duplicate_names() {
        let plan = DeploymentPlan::new(vec![
            primary("stable", "stable"),
            secondary("stable", "stable"),
        ]);
        assert_eq!(
            check_plan(&plan).unwrap_err(),
            ValidationError::DuplicateName {
                name: "stable".to_string()
            }
        );
    }
}
