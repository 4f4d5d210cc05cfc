//! Pre/post-deploy actions.
//!
//! Descriptors reference actions by name only; the executor resolves those
//! names against an [`ActionRegistry`] of [`DeployAction`] capabilities. The
//! planner and validator never see the implementations.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::{ActionsConfig, BerthConfig, HostingConfig};
use crate::domain::error::{BerthError, Result};
use crate::domain::facts::{CommitId, DeploySecrets, RepoFacts};
use crate::domain::target::TargetDescriptor;
use crate::process::run_command;

/// Names of the standard actions.
pub mod names {
    pub const BUILD: &str = "build";
    pub const CHECK_PAYLOAD_SIZE: &str = "check-payload-size";
    pub const TEST_PWA_SCORE: &str = "test-pwa-score";
    pub const REMOVE_SERVICE_WORKER: &str = "remove-service-worker";
    pub const REDIRECT_NON_FILES_TO_STABLE: &str = "redirect-non-files-to-stable";
    pub const VERIFY_DEPLOYMENT: &str = "verify-deployment";
}

/// Data forwarded to actions and the deployer for one target.
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub target: String,
    pub deploy_env: String,
    pub project_id: String,
    pub site_id: String,
    pub deployed_url: String,
    /// URL non-file requests are redirected to by the redirect action.
    pub stable_url: String,
    /// Hosting target name in `firebase.json`.
    pub firebase_target: String,
    pub branch: String,
    pub commit: CommitId,
    pub secrets: DeploySecrets,
}

impl ActionContext {
    /// Context for a deployable descriptor.
    pub fn for_target(
        target: &TargetDescriptor,
        facts: &RepoFacts,
        hosting: &HostingConfig,
    ) -> Result<Self> {
        let field = |value: &Option<String>, name: &str| -> Result<String> {
            value.clone().ok_or_else(|| {
                BerthError::Config(format!("target '{}' has no {name}", target.name))
            })
        };
        Ok(Self {
            target: target.name.clone(),
            deploy_env: field(&target.deploy_env, "deployEnv")?,
            project_id: field(&target.project_id, "projectId")?,
            site_id: field(&target.site_id, "siteId")?,
            deployed_url: field(&target.deployed_url, "deployedUrl")?,
            stable_url: hosting.stable_url(),
            firebase_target: hosting.firebase_target.clone(),
            branch: facts.current_branch.clone(),
            commit: facts.current_commit.clone(),
            secrets: facts.secrets.clone(),
        })
    }

    /// Replace `{deploy_env}`, `{deployed_url}`, `{min_pwa_score}` and
    /// `{commit}` in `template`.
    pub fn render(&self, template: &str) -> String {
        template
            .replace("{deploy_env}", &self.deploy_env)
            .replace("{deployed_url}", &self.deployed_url)
            .replace("{min_pwa_score}", &self.secrets.min_pwa_score.to_string())
            .replace("{commit}", self.commit.as_str())
    }

    fn failed(&self, action: &str, reason: impl Into<String>) -> BerthError {
        BerthError::ActionFailed {
            action: action.to_string(),
            target: self.target.clone(),
            reason: reason.into(),
        }
    }
}

/// A named side-effecting step run before or after a hosting deploy.
#[async_trait]
pub trait DeployAction: Send + Sync {
    async fn run(&self, ctx: &ActionContext) -> Result<()>;
}

/// Name → action mapping.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: BTreeMap<String, Arc<dyn DeployAction>>,
}

impl ActionRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Register `action` under `name` and return `self` (builder pattern).
    pub fn with_action(mut self, name: &str, action: impl DeployAction + 'static) -> Self {
        self.actions.insert(name.to_string(), Arc::new(action));
        self
    }

    /// The standard actions configured from `config`.
    pub fn standard(config: &BerthConfig) -> Self {
        let ActionsConfig {
            dist_dir,
            firebase_json,
            build_command,
            payload_size_command,
            pwa_score_command,
            command_timeout_secs,
            verify_timeout_secs,
        } = &config.actions;

        Self::empty()
            .with_action(
                names::BUILD,
                ShellAction::new(names::BUILD, build_command.clone(), *command_timeout_secs),
            )
            .with_action(
                names::CHECK_PAYLOAD_SIZE,
                ShellAction::new(
                    names::CHECK_PAYLOAD_SIZE,
                    payload_size_command.clone(),
                    *command_timeout_secs,
                ),
            )
            .with_action(
                names::TEST_PWA_SCORE,
                ShellAction::new(
                    names::TEST_PWA_SCORE,
                    pwa_score_command.clone(),
                    *command_timeout_secs,
                ),
            )
            .with_action(names::REMOVE_SERVICE_WORKER, RemoveServiceWorker::new(dist_dir.clone()))
            .with_action(
                names::REDIRECT_NON_FILES_TO_STABLE,
                InjectRedirect::new(firebase_json.clone()),
            )
            .with_action(names::VERIFY_DEPLOYMENT, VerifyDeployment::new(*verify_timeout_secs))
    }

    /// The standard action names, each bound to a [`DryRunAction`].
    pub fn dry_run(config: &BerthConfig) -> Self {
        Self::standard(config)
            .names()
            .fold(Self::empty(), |registry, name| {
                registry.with_action(name, DryRunAction::new(name))
            })
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn DeployAction>> {
        self.actions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ShellAction
// ---------------------------------------------------------------------------

/// Runs a templated command; a non-zero exit fails the action.
#[derive(Debug, Clone)]
pub struct ShellAction {
    name: String,
    command: Vec<String>,
    timeout_secs: u64,
}

impl ShellAction {
    pub fn new(name: &str, command: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            name: name.to_string(),
            command,
            timeout_secs,
        }
    }

    /// The command with placeholders filled for `ctx`.
    pub fn argv(&self, ctx: &ActionContext) -> Vec<String> {
        self.command.iter().map(|part| ctx.render(part)).collect()
    }
}

#[async_trait]
impl DeployAction for ShellAction {
    async fn run(&self, ctx: &ActionContext) -> Result<()> {
        let argv = self.argv(ctx);
        info!(action = %self.name, deploy_target = %ctx.target, command = ?argv, "running command");

        let output = run_command(&argv, self.timeout_secs)
            .await
            .map_err(|e| ctx.failed(&self.name, e.to_string()))?;

        if !output.passed() {
            return Err(ctx.failed(&self.name, output.failure_summary()));
        }
        info!(action = %self.name, duration_ms = output.duration_ms, "command finished");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// DryRunAction
// ---------------------------------------------------------------------------

/// Logs the action instead of running it.
#[derive(Debug, Clone)]
pub struct DryRunAction {
    name: String,
}

impl DryRunAction {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl DeployAction for DryRunAction {
    async fn run(&self, ctx: &ActionContext) -> Result<()> {
        info!(action = %self.name, deploy_target = %ctx.target, "dry run: skipping action");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RemoveServiceWorker
// ---------------------------------------------------------------------------

/// Service worker manifest generated by the build.
pub const SERVICE_WORKER_MANIFEST: &str = "ngsw.json";

/// Deletes the service worker manifest from the build output.
///
/// Without the manifest, already-installed service workers unregister
/// themselves instead of serving cached content from a site that no longer
/// receives its own builds. A missing manifest is not an error.
#[derive(Debug, Clone)]
pub struct RemoveServiceWorker {
    dist_dir: PathBuf,
}

impl RemoveServiceWorker {
    pub fn new(dist_dir: PathBuf) -> Self {
        Self { dist_dir }
    }
}

#[async_trait]
impl DeployAction for RemoveServiceWorker {
    async fn run(&self, ctx: &ActionContext) -> Result<()> {
        let manifest = self.dist_dir.join(SERVICE_WORKER_MANIFEST);
        match tokio::fs::remove_file(&manifest).await {
            Ok(()) => {
                info!(deploy_target = %ctx.target, path = %manifest.display(), "removed service worker manifest");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(path = %manifest.display(), "service worker manifest already absent");
                Ok(())
            }
            Err(e) => Err(ctx.failed(
                names::REMOVE_SERVICE_WORKER,
                format!("cannot remove {}: {e}", manifest.display()),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// InjectRedirect
// ---------------------------------------------------------------------------

/// Firebase redirect regex matching paths without a file extension.
pub const NON_FILE_PATH_REGEX: &str = "^(.*/[^./]*)$";

/// Prepends a redirect of every non-file path to the stable site into the
/// hosting section of `firebase.json`.
#[derive(Debug, Clone)]
pub struct InjectRedirect {
    firebase_json: PathBuf,
}

impl InjectRedirect {
    pub fn new(firebase_json: PathBuf) -> Self {
        Self { firebase_json }
    }

    /// The redirect rule for `stable_url`.
    pub fn rule(stable_url: &str) -> Value {
        json!({
            "type": 302,
            "regex": NON_FILE_PATH_REGEX,
            "destination": format!("{}:1", stable_url.trim_end_matches('/')),
        })
    }

    /// Insert the rule into a parsed `firebase.json`.
    ///
    /// `hosting` may be a single object or an array of per-target objects;
    /// in the latter case the entry whose `target` matches is updated.
    pub fn inject(config: &mut Value, firebase_target: &str, stable_url: &str) -> std::result::Result<(), String> {
        let hosting = config
            .get_mut("hosting")
            .ok_or_else(|| "firebase.json has no hosting section".to_string())?;

        let site = if hosting.is_array() {
            hosting
                .as_array_mut()
                .into_iter()
                .flatten()
                .find(|h| h.get("target").and_then(Value::as_str) == Some(firebase_target))
                .ok_or_else(|| format!("firebase.json has no hosting entry for target '{firebase_target}'"))?
        } else {
            hosting
        };

        let site = site
            .as_object_mut()
            .ok_or_else(|| "hosting entry is not an object".to_string())?;
        let redirects = site
            .entry("redirects")
            .or_insert_with(|| Value::Array(Vec::new()))
            .as_array_mut()
            .ok_or_else(|| "hosting.redirects is not an array".to_string())?;
        redirects.insert(0, Self::rule(stable_url));
        Ok(())
    }
}

#[async_trait]
impl DeployAction for InjectRedirect {
    async fn run(&self, ctx: &ActionContext) -> Result<()> {
        let action = names::REDIRECT_NON_FILES_TO_STABLE;
        let raw = tokio::fs::read_to_string(&self.firebase_json)
            .await
            .map_err(|e| ctx.failed(action, format!("cannot read {}: {e}", self.firebase_json.display())))?;
        let mut config: Value = serde_json::from_str(&raw)?;

        Self::inject(&mut config, &ctx.firebase_target, &ctx.stable_url)
            .map_err(|reason| ctx.failed(action, reason))?;

        let rendered = serde_json::to_string_pretty(&config)?;
        tokio::fs::write(&self.firebase_json, rendered).await?;
        info!(deploy_target = %ctx.target, destination = %ctx.stable_url, "injected redirect rule");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// VerifyDeployment
// ---------------------------------------------------------------------------

/// Fetches the deployed URL without following redirects; any success or
/// redirect status passes.
#[derive(Debug, Clone)]
pub struct VerifyDeployment {
    timeout_secs: u64,
}

impl VerifyDeployment {
    pub fn new(timeout_secs: u64) -> Self {
        Self { timeout_secs }
    }
}

#[async_trait]
impl DeployAction for VerifyDeployment {
    async fn run(&self, ctx: &ActionContext) -> Result<()> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()?;

        let response = client
            .get(&ctx.deployed_url)
            .send()
            .await
            .map_err(|e| ctx.failed(names::VERIFY_DEPLOYMENT, e.to_string()))?;
        let status = response.status();

        if status.is_success() || status.is_redirection() {
            info!(deploy_target = %ctx.target, url = %ctx.deployed_url, %status, "deployment reachable");
            Ok(())
        } else {
            Err(ctx.failed(
                names::VERIFY_DEPLOYMENT,
                format!("{} answered {status}", ctx.deployed_url),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::facts::RepoSlug;
    use crate::domain::target::TargetKind;

    fn context() -> ActionContext {
        ActionContext {
            target: "stable-redeployed-as-rc".to_string(),
            deploy_env: "stable".to_string(),
            project_id: "angular-io".to_string(),
            site_id: "rc-angular-io-site".to_string(),
            deployed_url: "https://rc.angular.io/".to_string(),
            stable_url: "https://angular.io/".to_string(),
            firebase_target: "aio".to_string(),
            branch: "12.1.x".to_string(),
            commit: CommitId::parse("abcdefabcdefabcdefabcdefabcdefabcdefabcd").unwrap(),
            secrets: DeploySecrets {
                firebase_token: Some("token".to_string()),
                min_pwa_score: 95,
            },
        }
    }

    #[test]
    fn test_render_placeholders() {
        let ctx = context();
        assert_eq!(
            ctx.render("{deploy_env}|{deployed_url}|{min_pwa_score}|{commit}"),
            "stable|https://rc.angular.io/|95|abcdefabcdefabcdefabcdefabcdefabcdefabcd"
        );
    }

    #[test]
    fn test_context_for_skipped_target_is_config_error() {
        let facts = RepoFacts {
            repository: RepoSlug::new("angular", "angular"),
            current_branch: "master".to_string(),
            current_commit: CommitId::parse("abcdefabcdefabcdefabcdefabcdefabcdefabcd").unwrap(),
            stable_branch: "12.1.x".to_string(),
            is_pull_request: false,
            secrets: DeploySecrets::default(),
        };
        let skip = TargetDescriptor::skipped("PR build");
        assert_eq!(skip.kind, TargetKind::Skipped);
        let err = ActionContext::for_target(&skip, &facts, &HostingConfig::default()).unwrap_err();
        assert!(matches!(err, BerthError::Config(_)));
    }

    #[test]
    fn test_standard_registry_covers_all_action_names() {
        let registry = ActionRegistry::standard(&BerthConfig::default());
        for name in [
            names::BUILD,
            names::CHECK_PAYLOAD_SIZE,
            names::TEST_PWA_SCORE,
            names::REMOVE_SERVICE_WORKER,
            names::REDIRECT_NON_FILES_TO_STABLE,
            names::VERIFY_DEPLOYMENT,
        ] {
            assert!(registry.contains(name), "missing action {name}");
        }
    }

    #[test]
    fn test_dry_run_registry_mirrors_standard_names() {
        let config = BerthConfig::default();
        let standard: Vec<_> = ActionRegistry::standard(&config).names().map(str::to_string).collect();
        let dry: Vec<_> = ActionRegistry::dry_run(&config).names().map(str::to_string).collect();
        assert_eq!(standard, dry);
    }

    #[test]
    fn test_shell_action_argv_is_rendered() {
        let action = ShellAction::new(
            names::BUILD,
            vec!["yarn".to_string(), "build".to_string(), "--configuration={deploy_env}".to_string()],
            0,
        );
        assert_eq!(
            action.argv(&context()),
            vec!["yarn", "build", "--configuration=stable"]
        );
    }

    #[tokio::test]
    async fn test_shell_action_failure_names_action_and_target() {
        let action = ShellAction::new("size", vec!["false".to_string()], 60);
        let err = action.run(&context()).await.unwrap_err();
        match err {
            BerthError::ActionFailed { action, target, .. } => {
                assert_eq!(action, "size");
                assert_eq!(target, "stable-redeployed-as-rc");
            }
            other => panic!("Expected ActionFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_remove_service_worker() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join(SERVICE_WORKER_MANIFEST);
        std::fs::write(&manifest, "{}").unwrap();

        let action = RemoveServiceWorker::new(dir.path().to_path_buf());
        action.run(&context()).await.unwrap();
        assert!(!manifest.exists());

        // Second run: already gone, still fine.
        action.run(&context()).await.unwrap();
    }

    #[test]
    fn test_inject_into_single_hosting_object() {
        let mut config = json!({
            "hosting": {
                "target": "aio",
                "redirects": [{ "type": 301, "source": "/old", "destination": "/new" }]
            }
        });
        InjectRedirect::inject(&mut config, "aio", "https://angular.io/").unwrap();

        let redirects = config["hosting"]["redirects"].as_array().unwrap();
        assert_eq!(redirects.len(), 2);
        assert_eq!(redirects[0]["regex"], NON_FILE_PATH_REGEX);
        assert_eq!(redirects[0]["destination"], "https://angular.io:1");
        assert_eq!(redirects[1]["source"], "/old");
    }

    #[test]
    fn test_inject_into_matching_hosting_entry() {
        let mut config = json!({
            "hosting": [
                { "target": "other", "public": "x" },
                { "target": "aio", "public": "dist" }
            ]
        });
        InjectRedirect::inject(&mut config, "aio", "https://angular.io/").unwrap();
        assert!(config["hosting"][0].get("redirects").is_none());
        assert_eq!(config["hosting"][1]["redirects"][0]["type"], 302);
    }

    #[test]
    fn test_inject_without_hosting_fails() {
        let mut config = json!({ "functions": {} });
        assert!(InjectRedirect::inject(&mut config, "aio", "https://angular.io/").is_err());

        let mut config = json!({ "hosting": [{ "target": "other" }] });
        let err = InjectRedirect::inject(&mut config, "aio", "https://angular.io/").unwrap_err();
        assert!(err.contains("aio"));
    }

    #[tokio::test]
    async fn test_inject_redirect_rewrites_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("firebase.json");
        std::fs::write(&path, r#"{ "hosting": { "public": "dist" } }"#).unwrap();

        InjectRedirect::new(path.clone()).run(&context()).await.unwrap();

        let written: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["hosting"]["public"], "dist");
        assert_eq!(written["hosting"]["redirects"][0]["destination"], "https://angular.io:1");
    }
}
