//! Domain models for Berth.
//!
//! - `VersionKey`: `(major, minor)` of a `<major>.<minor>.x` branch
//! - `RepoFacts`: what a run knows about the repository
//! - `TargetDescriptor` / `DeploymentPlan`: the planner's output

pub mod error;
pub mod facts;
pub mod target;
pub mod version;

pub use error::{BerthError, Result, ValidationError};
pub use facts::{CommitId, DeploySecrets, RepoFacts, RepoSlug, COMMIT_ID_LEN};
pub use target::{DeploymentPlan, TargetDescriptor, TargetKind, SKIPPED_TARGET};
pub use version::{major_of, VersionKey};
