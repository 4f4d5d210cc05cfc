//! Static configuration: canonical repository, hosting coordinates and the
//! commands behind the shell-backed actions.
//!
//! Every field has a default, so an empty config file (or none at all)
//! describes the angular.io documentation site.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::facts::RepoSlug;
use crate::resolver::DEFAULT_REMOTE;

/// Top-level Berth configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BerthConfig {
    /// Remote the resolver queries.
    pub remote: String,
    pub policy: PolicyConfig,
    pub hosting: HostingConfig,
    pub actions: ActionsConfig,
}

impl Default for BerthConfig {
    fn default() -> Self {
        Self {
            remote: DEFAULT_REMOTE.to_string(),
            policy: PolicyConfig::default(),
            hosting: HostingConfig::default(),
            actions: ActionsConfig::default(),
        }
    }
}

/// Inputs to the branch-classification policy that are not repo facts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyConfig {
    /// Only builds of this repository deploy.
    pub canonical_repo: RepoSlug,
    /// Development line deployed to the `next` target.
    pub trunk_branch: String,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            canonical_repo: RepoSlug::new("angular", "angular"),
            trunk_branch: "master".to_string(),
        }
    }
}

/// Firebase coordinates the target registry is built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostingConfig {
    /// Firebase project holding every site.
    pub project_id: String,
    /// Public domain; targets live at `https://<prefix>.<domain>/`.
    pub domain: String,
    /// Site ids are `<prefix>-<site_suffix>`, e.g. `rc-angular-io-site`.
    pub site_suffix: String,
    /// Hosting target name used in `firebase.json`.
    pub firebase_target: String,
    /// How to invoke the Firebase CLI.
    pub firebase_command: Vec<String>,
}

impl HostingConfig {
    /// Public URL of the stable site.
    pub fn stable_url(&self) -> String {
        format!("https://{}/", self.domain)
    }
}

impl Default for HostingConfig {
    fn default() -> Self {
        Self {
            project_id: "angular-io".to_string(),
            domain: "angular.io".to_string(),
            site_suffix: "angular-io-site".to_string(),
            firebase_target: "aio".to_string(),
            firebase_command: vec!["firebase".to_string()],
        }
    }
}

/// Settings for the concrete pre/post actions.
///
/// Command templates may use `{deploy_env}`, `{deployed_url}`,
/// `{min_pwa_score}` and `{commit}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ActionsConfig {
    /// Build output directory that gets deployed.
    pub dist_dir: PathBuf,
    /// Firebase hosting config the redirect rule is injected into.
    pub firebase_json: PathBuf,
    pub build_command: Vec<String>,
    pub payload_size_command: Vec<String>,
    pub pwa_score_command: Vec<String>,
    /// Per-command timeout; 0 disables it.
    pub command_timeout_secs: u64,
    /// Timeout of the post-deploy HTTP check.
    pub verify_timeout_secs: u64,
}

impl Default for ActionsConfig {
    fn default() -> Self {
        let cmd = |parts: &[&str]| -> Vec<String> { parts.iter().map(|p| p.to_string()).collect() };
        Self {
            dist_dir: PathBuf::from("dist"),
            firebase_json: PathBuf::from("firebase.json"),
            build_command: cmd(&["yarn", "build", "--configuration={deploy_env}"]),
            payload_size_command: cmd(&["yarn", "payload-size", "aio-{deploy_env}"]),
            pwa_score_command: cmd(&["yarn", "test-pwa-score", "{deployed_url}", "{min_pwa_score}"]),
            command_timeout_secs: 1800,
            verify_timeout_secs: 30,
        }
    }
}
