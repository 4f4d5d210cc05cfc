//! Berth - documentation site deployment planner
//!
//! The `berth` command decides which hosting targets a CI build deploys to,
//! validates the resulting plan and executes it.
//!
//! ## Commands
//!
//! - `plan`: Print the validated deployment plan for the current build
//! - `validate`: Check a deployment plan stored as JSON
//! - `deploy`: Plan, validate and execute

use anyhow::{anyhow, Context, Result};
use berth_core::{
    execute_plan, plan_and_validate, validate_plan, ActionRegistry, BerthConfig,
    BranchVersionResolver, CommitId, DeploySecrets, DeploymentPlan, DryRunDeployer, FirebaseCli,
    GitLsRemote, HostingDeployer, PlannedDeployment, RepoFacts, RepoSlug, TargetRegistry,
};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "berth")]
#[command(author = "Stevedores Org")]
#[command(version = berth_core::VERSION)]
#[command(about = "Deployment target resolution for documentation sites", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// TOML configuration file (defaults describe angular.io)
    #[arg(short, long, global = true, env = "BERTH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve branches and print the validated plan as JSON
    Plan {
        #[command(flatten)]
        ci: CiArgs,

        /// Directory of the git checkout queried for remote refs
        #[arg(long, default_value = ".")]
        repo_dir: PathBuf,
    },

    /// Validate a deployment plan JSON file
    Validate {
        /// Path to the plan (a JSON array of target descriptors)
        file: PathBuf,
    },

    /// Plan, validate and execute the deployment
    Deploy {
        #[command(flatten)]
        ci: CiArgs,

        /// Log actions and deploy steps instead of running them
        #[arg(long)]
        dry_run: bool,

        /// Directory of the git checkout queried for remote refs
        #[arg(long, default_value = ".")]
        repo_dir: PathBuf,
    },
}

/// Build facts, normally provided by the CI environment.
#[derive(Args)]
struct CiArgs {
    /// Owner of the repository being built
    #[arg(long, env = "CI_REPO_OWNER")]
    repo_owner: String,

    /// Name of the repository being built
    #[arg(long, env = "CI_REPO_NAME")]
    repo_name: String,

    /// Branch being built
    #[arg(long, env = "CI_BRANCH")]
    branch: String,

    /// Commit being built
    #[arg(long, env = "CI_COMMIT")]
    commit: String,

    /// Current stable branch, e.g. 12.1.x
    #[arg(long, env = "CI_STABLE_BRANCH")]
    stable_branch: String,

    /// Pull request number; empty or "false" for push builds
    #[arg(long, env = "CI_PULL_REQUEST")]
    pull_request: Option<String>,

    /// Firebase deploy token
    #[arg(long, env = "CI_SECRET_AIO_DEPLOY_FIREBASE_TOKEN", hide_env_values = true)]
    firebase_token: Option<String>,

    /// Minimum accepted PWA score
    #[arg(long, env = "CI_AIO_MIN_PWA_SCORE", default_value_t = 95)]
    min_pwa_score: u8,
}

impl CiArgs {
    fn into_facts(self) -> Result<RepoFacts> {
        let current_commit = CommitId::parse(&self.commit)
            .ok_or_else(|| anyhow!("'{}' is not a full commit id", self.commit))?;
        Ok(RepoFacts {
            repository: RepoSlug::new(self.repo_owner, self.repo_name),
            is_pull_request: is_pull_request(self.pull_request.as_deref()),
            current_branch: self.branch,
            current_commit,
            stable_branch: self.stable_branch,
            secrets: DeploySecrets {
                firebase_token: self.firebase_token.filter(|t| !t.is_empty()),
                min_pwa_score: self.min_pwa_score,
            },
        })
    }
}

/// Any value other than empty or `false` marks a pull-request build.
fn is_pull_request(value: Option<&str>) -> bool {
    match value.map(str::trim) {
        None | Some("") => false,
        Some(v) => !v.eq_ignore_ascii_case("false"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    berth_core::init_tracing(cli.json, level);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Plan { ci, repo_dir } => cmd_plan(&config, ci, &repo_dir).await,
        Commands::Validate { file } => cmd_validate(&file).await,
        Commands::Deploy {
            ci,
            dry_run,
            repo_dir,
        } => cmd_deploy(&config, ci, &repo_dir, dry_run).await,
    }
}

fn load_config(path: Option<&Path>) -> Result<BerthConfig> {
    let Some(path) = path else {
        return Ok(BerthConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("Invalid config {}", path.display()))
}

fn plan(config: &BerthConfig, facts: &RepoFacts, repo_dir: &Path) -> Result<PlannedDeployment> {
    let resolver = BranchVersionResolver::new(GitLsRemote::in_dir(repo_dir), config.remote.clone());
    let registry = TargetRegistry::standard(&config.hosting);
    plan_and_validate(&resolver, facts, config, &registry)
        .with_context(|| format!("Failed to plan deployment of '{}'", facts.current_branch))
}

/// [`plan`] on the blocking pool; `git ls-remote` runs synchronously.
async fn plan_off_runtime(
    config: &BerthConfig,
    facts: &RepoFacts,
    repo_dir: &Path,
) -> Result<PlannedDeployment> {
    let (config, facts, repo_dir) = (config.clone(), facts.clone(), repo_dir.to_path_buf());
    tokio::task::spawn_blocking(move || plan(&config, &facts, &repo_dir))
        .await
        .context("Planning task failed")?
}

#[derive(Serialize)]
struct PlanOutput<'a> {
    rule: &'static str,
    plan: &'a DeploymentPlan,
}

async fn cmd_plan(config: &BerthConfig, ci: CiArgs, repo_dir: &Path) -> Result<()> {
    let facts = ci.into_facts()?;
    let planned = plan_off_runtime(config, &facts, repo_dir).await?;
    let output = PlanOutput {
        rule: planned.rule.name(),
        plan: planned.plan.plan(),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn cmd_validate(file: &Path) -> Result<()> {
    let raw = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read plan {}", file.display()))?;
    let plan: DeploymentPlan = serde_json::from_str(&raw)
        .with_context(|| format!("Plan {} is not a JSON array of targets", file.display()))?;
    let validated = validate_plan(plan).context("Plan failed validation")?;

    let plan = validated.plan();
    match plan.skip_reason() {
        Some(reason) => println!("✓ Valid skip plan: {reason}"),
        None => println!("✓ Valid plan: {}", plan.names().join(", ")),
    }
    Ok(())
}

async fn cmd_deploy(config: &BerthConfig, ci: CiArgs, repo_dir: &Path, dry_run: bool) -> Result<()> {
    let facts = ci.into_facts()?;
    let planned = plan_off_runtime(config, &facts, repo_dir).await?;

    let (actions, deployer): (ActionRegistry, Box<dyn HostingDeployer>) = if dry_run {
        (ActionRegistry::dry_run(config), Box::new(DryRunDeployer))
    } else {
        (
            ActionRegistry::standard(config),
            Box::new(FirebaseCli::new(
                config.hosting.firebase_command.clone(),
                config.actions.command_timeout_secs,
            )),
        )
    };

    info!(rule = planned.rule.name(), dry_run, "starting deployment");
    let report = execute_plan(&planned.plan, &facts, &config.hosting, &actions, deployer.as_ref())
        .await
        .context("Deployment failed")?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
