//! Validated plan execution.
//!
//! Targets run in plan order, so the primary's build precedes every
//! secondary republish. For each target the pre-actions run first, then the
//! hosting deploy, then the post-actions. The first failure aborts the run.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::actions::{ActionContext, ActionRegistry};
use crate::config::HostingConfig;
use crate::deployer::HostingDeployer;
use crate::domain::error::{BerthError, Result};
use crate::domain::facts::RepoFacts;
use crate::domain::target::TargetDescriptor;
use crate::validate::ValidatedPlan;

/// Outcome of one deployed target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetReport {
    pub name: String,
    pub site_id: String,
    pub deployed_url: String,
    pub actions_run: Vec<String>,
    pub duration_ms: u64,
}

/// Summary of a plan execution.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentReport {
    pub run_id: Uuid,
    pub plan_digest: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Set when the plan was a skip.
    pub skipped: Option<String>,
    pub targets: Vec<TargetReport>,
}

impl DeploymentReport {
    pub fn deployed_count(&self) -> usize {
        self.targets.len()
    }
}

/// Execute `plan`.
///
/// Every action name referenced by the plan is resolved before anything
/// runs; an unresolvable name fails with [`BerthError::UnknownAction`] and
/// no side effects. A skip plan performs nothing.
pub async fn execute_plan(
    plan: &ValidatedPlan,
    facts: &RepoFacts,
    hosting: &HostingConfig,
    actions: &ActionRegistry,
    deployer: &dyn HostingDeployer,
) -> Result<DeploymentReport> {
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();
    let plan = plan.plan();
    let plan_digest = plan.digest()?;

    if let Some(reason) = plan.skip_reason() {
        info!(%run_id, reason, "nothing to deploy");
        return Ok(DeploymentReport {
            run_id,
            plan_digest,
            started_at,
            finished_at: Utc::now(),
            skipped: Some(reason.to_string()),
            targets: Vec::new(),
        });
    }

    preflight(plan.targets.iter(), actions)?;

    info!(%run_id, targets = ?plan.names(), digest = %plan_digest, "executing deployment plan");

    let mut targets = Vec::with_capacity(plan.len());
    for target in &plan.targets {
        let span = info_span!("deploy_target", %run_id, name = %target.name);
        let report = run_target(target, facts, hosting, actions, deployer)
            .instrument(span)
            .await?;
        targets.push(report);
    }

    let report = DeploymentReport {
        run_id,
        plan_digest,
        started_at,
        finished_at: Utc::now(),
        skipped: None,
        targets,
    };
    info!(%run_id, deployed = report.deployed_count(), "deployment complete");
    Ok(report)
}

fn preflight<'a>(
    targets: impl Iterator<Item = &'a TargetDescriptor>,
    actions: &ActionRegistry,
) -> Result<()> {
    for target in targets {
        for name in target.pre_actions.iter().chain(&target.post_actions) {
            if !actions.contains(name) {
                return Err(BerthError::UnknownAction {
                    target: target.name.clone(),
                    action: name.clone(),
                });
            }
        }
    }
    Ok(())
}

async fn run_target(
    target: &TargetDescriptor,
    facts: &RepoFacts,
    hosting: &HostingConfig,
    actions: &ActionRegistry,
    deployer: &dyn HostingDeployer,
) -> Result<TargetReport> {
    let start = Instant::now();
    let ctx = ActionContext::for_target(target, facts, hosting)?;
    let mut actions_run = Vec::new();

    for name in &target.pre_actions {
        run_action(actions, name, &ctx).await?;
        actions_run.push(name.clone());
    }

    deployer.deploy(&ctx).await?;

    for name in &target.post_actions {
        run_action(actions, name, &ctx).await?;
        actions_run.push(name.clone());
    }

    Ok(TargetReport {
        name: ctx.target,
        site_id: ctx.site_id,
        deployed_url: ctx.deployed_url,
        actions_run,
        duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
    })
}

async fn run_action(actions: &ActionRegistry, name: &str, ctx: &ActionContext) -> Result<()> {
    let action = actions.get(name).ok_or_else(|| BerthError::UnknownAction {
        target: ctx.target.clone(),
        action: name.to_string(),
    })?;
    action.run(ctx).await
}
