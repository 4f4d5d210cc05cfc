//! Berth Core Library
//!
//! Decides where a documentation-site build deploys, checks the resulting
//! plan, and executes it.
//!
//! - [`resolver`]: remote branch lookups with a per-instance ref cache
//! - [`policy`]: the ordered branch-classification rules
//! - [`validate`]: structural plan checks producing a [`ValidatedPlan`]
//! - [`executor`]: runs actions and the hosting deployer for a validated plan

pub mod actions;
pub mod config;
pub mod deployer;
pub mod domain;
pub mod engine;
pub mod executor;
pub mod fakes;
pub mod policy;
pub mod process;
pub mod registry;
pub mod remote;
pub mod resolver;
pub mod telemetry;
pub mod validate;

pub use actions::{ActionContext, ActionRegistry, DeployAction};
pub use config::{ActionsConfig, BerthConfig, HostingConfig, PolicyConfig};
pub use deployer::{DryRunDeployer, FirebaseCli, HostingDeployer};
pub use domain::{
    major_of, BerthError, CommitId, DeploySecrets, DeploymentPlan, RepoFacts, RepoSlug, Result,
    TargetDescriptor, TargetKind, ValidationError, VersionKey,
};
pub use engine::{plan_and_validate, PlannedDeployment};
pub use executor::{execute_plan, DeploymentReport, TargetReport};
pub use policy::{plan_deployment, BranchSnapshot, PlanDecision, PolicyContext, PolicyRule};
pub use registry::{TargetRegistry, TargetTemplate};
pub use remote::{GitLsRemote, RefLine, RemoteRefQuery};
pub use resolver::{BranchVersionResolver, CachePolicy, DEFAULT_REMOTE};
pub use telemetry::init_tracing;
pub use validate::{check_plan, validate_plan, ValidatedPlan};

/// Crate version, reported by `berth --version` and in run logs.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
