//! Static registry of deployment target templates.
//!
//! The registry is built once from [`HostingConfig`] and never mutated; the
//! planner receives it as an explicit input and instantiates descriptors from
//! it. Site ids and URLs may contain a `{major}` placeholder that is filled
//! with the major version of the branch being deployed.

use std::collections::BTreeMap;

use crate::actions::names as action;
use crate::config::HostingConfig;
use crate::domain::error::{BerthError, Result};
use crate::domain::target::{TargetDescriptor, TargetKind};

/// Well-known target names.
pub mod names {
    pub const NEXT: &str = "next";
    pub const RC: &str = "rc";
    pub const STABLE: &str = "stable";
    pub const ARCHIVE: &str = "archive";
    pub const STABLE_AS_RC: &str = "stable-redeployed-as-rc";
}

const MAJOR_PLACEHOLDER: &str = "{major}";

/// Descriptor template for one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetTemplate {
    pub name: String,
    pub kind: TargetKind,
    pub deploy_env: String,
    pub project_id: String,
    pub site_id: String,
    pub deployed_url: String,
    pub pre_actions: Vec<String>,
    pub post_actions: Vec<String>,
}

impl TargetTemplate {
    /// Fill placeholders and produce a descriptor.
    pub fn instantiate(&self, major: Option<u64>) -> Result<TargetDescriptor> {
        let fill = |s: &str| -> Result<String> {
            if !s.contains(MAJOR_PLACEHOLDER) {
                return Ok(s.to_string());
            }
            let major = major.ok_or_else(|| {
                BerthError::Config(format!(
                    "target '{}' is keyed by major version but none was provided",
                    self.name
                ))
            })?;
            Ok(s.replace(MAJOR_PLACEHOLDER, &major.to_string()))
        };

        Ok(TargetDescriptor {
            name: self.name.clone(),
            kind: self.kind.clone(),
            reason: None,
            deploy_env: Some(self.deploy_env.clone()),
            project_id: Some(self.project_id.clone()),
            site_id: Some(fill(&self.site_id)?),
            deployed_url: Some(fill(&self.deployed_url)?),
            pre_actions: self.pre_actions.clone(),
            post_actions: self.post_actions.clone(),
        })
    }
}

/// Immutable name → template mapping.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TargetRegistry {
    templates: BTreeMap<String, TargetTemplate>,
}

impl TargetRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Add or replace a template and return `self` (builder pattern).
    pub fn with_template(mut self, template: TargetTemplate) -> Self {
        self.templates.insert(template.name.clone(), template);
        self
    }

    /// The standard documentation-site registry.
    ///
    /// | Target                    | Kind      | Env     | Site                 | URL                        |
    /// |---------------------------|-----------|---------|----------------------|----------------------------|
    /// | `next`                    | primary   | next    | `next-<suffix>`      | `https://next.<domain>/`   |
    /// | `rc`                      | primary   | rc      | `rc-<suffix>`        | `https://rc.<domain>/`     |
    /// | `stable`                  | primary   | stable  | `v{major}-<suffix>`  | `https://<domain>/`        |
    /// | `archive`                 | primary   | archive | `v{major}-<suffix>`  | `https://v{major}.<domain>/` |
    /// | `stable-redeployed-as-rc` | secondary | stable  | `rc-<suffix>`        | `https://rc.<domain>/`     |
    pub fn standard(hosting: &HostingConfig) -> Self {
        let HostingConfig {
            project_id,
            domain,
            site_suffix,
            ..
        } = hosting;

        let strings = |items: &[&str]| -> Vec<String> { items.iter().map(|s| s.to_string()).collect() };
        let primary_pre = strings(&[action::BUILD, action::CHECK_PAYLOAD_SIZE]);
        let primary_post = strings(&[action::VERIFY_DEPLOYMENT, action::TEST_PWA_SCORE]);

        let primary = |name: &str, env: &str, site: String, url: String| TargetTemplate {
            name: name.to_string(),
            kind: TargetKind::Primary,
            deploy_env: env.to_string(),
            project_id: project_id.clone(),
            site_id: site,
            deployed_url: url,
            pre_actions: primary_pre.clone(),
            post_actions: primary_post.clone(),
        };

        Self::empty()
            .with_template(primary(
                names::NEXT,
                "next",
                format!("next-{site_suffix}"),
                format!("https://next.{domain}/"),
            ))
            .with_template(primary(
                names::RC,
                "rc",
                format!("rc-{site_suffix}"),
                format!("https://rc.{domain}/"),
            ))
            .with_template(primary(
                names::STABLE,
                "stable",
                format!("v{MAJOR_PLACEHOLDER}-{site_suffix}"),
                hosting.stable_url(),
            ))
            .with_template(primary(
                names::ARCHIVE,
                "archive",
                format!("v{MAJOR_PLACEHOLDER}-{site_suffix}"),
                format!("https://v{MAJOR_PLACEHOLDER}.{domain}/"),
            ))
            .with_template(TargetTemplate {
                name: names::STABLE_AS_RC.to_string(),
                kind: TargetKind::Secondary,
                deploy_env: "stable".to_string(),
                project_id: project_id.clone(),
                site_id: format!("rc-{site_suffix}"),
                deployed_url: format!("https://rc.{domain}/"),
                pre_actions: strings(&[action::REMOVE_SERVICE_WORKER, action::REDIRECT_NON_FILES_TO_STABLE]),
                post_actions: strings(&[action::VERIFY_DEPLOYMENT]),
            })
    }

    pub fn get(&self, name: &str) -> Option<&TargetTemplate> {
        self.templates.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    /// Descriptor for `name`, with `{major}` filled from `major`.
    pub fn instantiate(&self, name: &str, major: Option<u64>) -> Result<TargetDescriptor> {
        self.get(name)
            .ok_or_else(|| BerthError::UnknownTarget(name.to_string()))?
            .instantiate(major)
    }
}
