//! Resolve, plan and validate in one call.

use tracing::info;

use crate::config::BerthConfig;
use crate::domain::error::Result;
use crate::domain::facts::RepoFacts;
use crate::policy::{plan_deployment, BranchSnapshot, PolicyContext, PolicyRule};
use crate::registry::TargetRegistry;
use crate::remote::RemoteRefQuery;
use crate::resolver::BranchVersionResolver;
use crate::validate::{validate_plan, ValidatedPlan};

/// Result of [`plan_and_validate`].
#[derive(Debug, Clone)]
pub struct PlannedDeployment {
    pub rule: PolicyRule,
    pub snapshot: BranchSnapshot,
    pub plan: ValidatedPlan,
}

/// Capture the branch snapshot, apply the policy and validate the plan.
///
/// Everything here is synchronous; no action has run when this returns.
pub fn plan_and_validate<Q>(
    resolver: &BranchVersionResolver<Q>,
    facts: &RepoFacts,
    config: &BerthConfig,
    registry: &TargetRegistry,
) -> Result<PlannedDeployment>
where
    Q: RemoteRefQuery,
{
    let snapshot = BranchSnapshot::capture(resolver, facts, &config.policy)?;
    let decision = plan_deployment(&PolicyContext {
        facts,
        snapshot: &snapshot,
        config: &config.policy,
        registry,
    })?;
    let plan = validate_plan(decision.plan)?;
    info!(
        rule = decision.rule.name(),
        commit = %facts.current_commit.short(),
        "plan validated"
    );

    Ok(PlannedDeployment {
        rule: decision.rule,
        snapshot,
        plan,
    })
}
