//! Hosting deployers.
//!
//! [`FirebaseCli`] drives the `firebase` command line; [`DryRunDeployer`]
//! only logs what would be deployed.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::actions::ActionContext;
use crate::domain::error::{BerthError, Result};
use crate::process::run_command;

/// Uploads the built site for one target.
#[async_trait]
pub trait HostingDeployer: Send + Sync {
    async fn deploy(&self, ctx: &ActionContext) -> Result<()>;
}

/// Deploys through the Firebase CLI.
///
/// Per target: select the project, re-point the hosting target at the
/// target's site, then deploy hosting only.
#[derive(Debug, Clone)]
pub struct FirebaseCli {
    command: Vec<String>,
    timeout_secs: u64,
}

impl FirebaseCli {
    pub fn new(command: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            command,
            timeout_secs,
        }
    }

    /// Argument lists (without the command prefix or token) for each step.
    pub fn steps(ctx: &ActionContext) -> Vec<Vec<String>> {
        let t = &ctx.firebase_target;
        let args = |parts: &[&str]| -> Vec<String> { parts.iter().map(|s| s.to_string()).collect() };
        vec![
            args(&["use", &ctx.project_id]),
            args(&["target:clear", "hosting", t]),
            args(&["target:apply", "hosting", t, &ctx.site_id]),
            vec![
                "deploy".to_string(),
                "--only".to_string(),
                format!("hosting:{t}"),
                "--message".to_string(),
                format!("Commit: {}", ctx.commit),
                "--non-interactive".to_string(),
            ],
        ]
    }

    async fn run_step(&self, ctx: &ActionContext, step: &[String]) -> Result<()> {
        debug!(deploy_target = %ctx.target, step = ?step, "firebase");

        let mut argv = self.command.clone();
        argv.extend_from_slice(step);
        if let Some(token) = &ctx.secrets.firebase_token {
            argv.push("--token".to_string());
            argv.push(token.clone());
        }

        let failed = |reason: String| BerthError::DeployFailed {
            target: ctx.target.clone(),
            reason,
        };
        let output = run_command(&argv, self.timeout_secs)
            .await
            .map_err(|e| failed(e.to_string()))?;
        if output.passed() {
            Ok(())
        } else {
            let step_name = step.first().map(String::as_str).unwrap_or_default();
            Err(failed(format!("firebase {step_name}: {}", output.failure_summary())))
        }
    }
}

#[async_trait]
impl HostingDeployer for FirebaseCli {
    async fn deploy(&self, ctx: &ActionContext) -> Result<()> {
        info!(
            deploy_target = %ctx.target,
            project = %ctx.project_id,
            site = %ctx.site_id,
            commit = %ctx.commit.short(),
            "deploying to firebase hosting"
        );
        for step in Self::steps(ctx) {
            self.run_step(ctx, &step).await?;
        }
        Ok(())
    }
}

/// Logs the deployment instead of performing it.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunDeployer;

#[async_trait]
impl HostingDeployer for DryRunDeployer {
    async fn deploy(&self, ctx: &ActionContext) -> Result<()> {
        info!(
            deploy_target = %ctx.target,
            project = %ctx.project_id,
            site = %ctx.site_id,
            url = %ctx.deployed_url,
            "dry run: skipping hosting deploy"
        );
        Ok(())
    }
}
