//! Branch-classification policy: which targets a build deploys to.
//!
//! The policy is an ordered list of [`PolicyRule`]s evaluated first-match-wins.
//! Branch states are not mutually exclusive by name alone (the trunk could
//! also be configured as the stable branch), so precedence is fixed:
//! repository, pull request, staleness, trunk, release candidate, stable,
//! archive.
//!
//! Every rule reads plain data: [`RepoFacts`], a [`BranchSnapshot`] captured
//! through the resolver before planning, the [`PolicyConfig`] and the
//! [`TargetRegistry`].

use serde::Serialize;
use tracing::{debug, info};

use crate::config::PolicyConfig;
use crate::domain::error::{BerthError, Result};
use crate::domain::facts::{CommitId, RepoFacts};
use crate::domain::target::DeploymentPlan;
use crate::domain::version::{major_of, VersionKey};
use crate::registry::{names as target, TargetRegistry};
use crate::remote::RemoteRefQuery;
use crate::resolver::BranchVersionResolver;

// ---------------------------------------------------------------------------
// Branch snapshot (resolver output, passed to the planner as data)
// ---------------------------------------------------------------------------

/// Remote branch facts the policy depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BranchSnapshot {
    /// Tip of the current branch on the remote.
    pub latest_commit: Option<CommitId>,
    /// Most recent `<major>.<minor>.x` branch overall.
    pub most_recent_minor: Option<String>,
    /// Most recent minor branch sharing the current branch's major.
    pub most_recent_minor_for_major: Option<String>,
}

impl BranchSnapshot {
    /// Resolve everything the policy can need for this run.
    ///
    /// Runs that are skipped before any remote fact matters (foreign
    /// repository, pull request) issue no remote queries at all.
    pub fn capture<Q>(
        resolver: &BranchVersionResolver<Q>,
        facts: &RepoFacts,
        config: &PolicyConfig,
    ) -> Result<Self>
    where
        Q: RemoteRefQuery,
    {
        if facts.repository != config.canonical_repo || facts.is_pull_request {
            debug!("run is skipped before remote resolution; capturing empty snapshot");
            return Ok(Self::default());
        }

        let latest_commit = Some(resolver.latest_commit(&facts.current_branch)?);
        let most_recent_minor = resolver.most_recent_minor_branch(None)?;
        let most_recent_minor_for_major = match major_of(&facts.current_branch) {
            Some(major) => resolver.most_recent_minor_branch(Some(major))?,
            None => None,
        };

        Ok(Self {
            latest_commit,
            most_recent_minor,
            most_recent_minor_for_major,
        })
    }
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// Everything a rule may read.
#[derive(Debug, Clone, Copy)]
pub struct PolicyContext<'a> {
    pub facts: &'a RepoFacts,
    pub snapshot: &'a BranchSnapshot,
    pub config: &'a PolicyConfig,
    pub registry: &'a TargetRegistry,
}

impl PolicyContext<'_> {
    /// The active release-candidate branch, if any: the most recent minor
    /// branch unless it is the stable branch itself.
    pub fn rc_branch(&self) -> Option<&str> {
        self.snapshot
            .most_recent_minor
            .as_deref()
            .filter(|rc| *rc != self.facts.stable_branch)
    }

    /// Fails when the current branch is the RC but not newer than stable,
    /// which would make it both release candidate and archive material.
    fn check_rc_newer_than_stable(&self, rc: &str) -> Result<()> {
        let stable = self.facts.stable_branch.as_str();
        if let (Some(rc_key), Some(stable_key)) =
            (VersionKey::parse_branch(rc), VersionKey::parse_branch(stable))
        {
            if rc_key <= stable_key {
                return Err(BerthError::PolicyAmbiguity {
                    branch: self.facts.current_branch.clone(),
                    detail: format!(
                        "release candidate branch '{rc}' is not newer than stable branch '{stable}', \
                         so it would be both release candidate and archive"
                    ),
                });
            }
        }
        Ok(())
    }

    fn stable_major(&self) -> Result<u64> {
        major_of(&self.facts.stable_branch).ok_or_else(|| {
            BerthError::Config(format!(
                "stable branch '{}' is not a <major>.<minor>.x branch",
                self.facts.stable_branch
            ))
        })
    }

    fn plan_of(&self, names: &[&str], major: Option<u64>) -> Result<DeploymentPlan> {
        names
            .iter()
            .map(|name| self.registry.instantiate(name, major))
            .collect::<Result<Vec<_>>>()
            .map(DeploymentPlan::new)
    }
}

/// One step of the decision list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyRule {
    /// Only the canonical repository deploys.
    CanonicalRepo,
    /// Pull-request builds never deploy.
    PullRequest,
    /// A newer commit has landed on the branch since the run started.
    StaleCommit,
    /// The trunk deploys to `next`.
    Trunk,
    /// The active RC branch deploys to `rc`.
    ReleaseCandidate,
    /// The stable branch deploys to `stable` (and to the rc site without an RC).
    Stable,
    /// Anything else: archive when it is the newest minor of an older major.
    Archive,
}

impl PolicyRule {
    /// Evaluation order.
    pub const ORDER: [PolicyRule; 7] = [
        PolicyRule::CanonicalRepo,
        PolicyRule::PullRequest,
        PolicyRule::StaleCommit,
        PolicyRule::Trunk,
        PolicyRule::ReleaseCandidate,
        PolicyRule::Stable,
        PolicyRule::Archive,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PolicyRule::CanonicalRepo => "canonical_repo",
            PolicyRule::PullRequest => "pull_request",
            PolicyRule::StaleCommit => "stale_commit",
            PolicyRule::Trunk => "trunk",
            PolicyRule::ReleaseCandidate => "release_candidate",
            PolicyRule::Stable => "stable",
            PolicyRule::Archive => "archive",
        }
    }

    /// The plan this rule produces, or `None` when its precondition does not
    /// hold and evaluation should continue with the next rule.
    pub fn evaluate(&self, ctx: &PolicyContext<'_>) -> Result<Option<DeploymentPlan>> {
        let facts = ctx.facts;
        let branch = facts.current_branch.as_str();

        match self {
            PolicyRule::CanonicalRepo => {
                if facts.repository == ctx.config.canonical_repo {
                    return Ok(None);
                }
                Ok(Some(DeploymentPlan::skip(format!(
                    "not the canonical repository: {} is not {}",
                    facts.repository, ctx.config.canonical_repo
                ))))
            }

            PolicyRule::PullRequest => Ok(facts
                .is_pull_request
                .then(|| DeploymentPlan::skip("PR build: only pushes to the canonical repository deploy"))),

            PolicyRule::StaleCommit => {
                let latest = ctx.snapshot.latest_commit.as_ref().ok_or_else(|| {
                    BerthError::Resolution(format!(
                        "latest commit of branch '{branch}' was not resolved"
                    ))
                })?;
                if *latest == facts.current_commit {
                    return Ok(None);
                }
                Ok(Some(DeploymentPlan::skip(format!(
                    "commit is stale: {} is not the latest commit on '{branch}' ({})",
                    facts.current_commit.short(),
                    latest.short()
                ))))
            }

            PolicyRule::Trunk => {
                if branch != ctx.config.trunk_branch {
                    return Ok(None);
                }
                ctx.plan_of(&[target::NEXT], None).map(Some)
            }

            PolicyRule::ReleaseCandidate => {
                if ctx.rc_branch() != Some(branch) {
                    return Ok(None);
                }
                ctx.check_rc_newer_than_stable(branch)?;
                ctx.plan_of(&[target::RC], major_of(branch)).map(Some)
            }

            PolicyRule::Stable => {
                if branch != facts.stable_branch {
                    return Ok(None);
                }
                let major = Some(ctx.stable_major()?);
                if ctx.rc_branch().is_some() {
                    ctx.plan_of(&[target::STABLE], major).map(Some)
                } else {
                    // Without an active RC the rc site would keep serving an
                    // outdated pre-release; redeploy stable there as well.
                    ctx.plan_of(&[target::STABLE, target::STABLE_AS_RC], major)
                        .map(Some)
                }
            }

            PolicyRule::Archive => {
                let Some(major) = major_of(branch) else {
                    return Ok(Some(DeploymentPlan::skip(format!(
                        "branch '{branch}' is not a <major>.<minor>.x branch and is neither trunk, rc nor stable"
                    ))));
                };

                let newest = ctx.snapshot.most_recent_minor_for_major.as_deref();
                if newest != Some(branch) {
                    let reason = match newest {
                        Some(newer) => format!(
                            "branch '{branch}' is superseded by more recent minor branch '{newer}' of major {major}"
                        ),
                        None => format!(
                            "branch '{branch}' is not among the remote's {major}.*.x branches"
                        ),
                    };
                    return Ok(Some(DeploymentPlan::skip(reason)));
                }

                let stable_major = ctx.stable_major()?;
                if major >= stable_major {
                    return Ok(Some(DeploymentPlan::skip(format!(
                        "branch '{branch}' (major {major}) is not older than stable branch '{}' (major {stable_major})",
                        facts.stable_branch
                    ))));
                }

                ctx.plan_of(&[target::ARCHIVE], Some(major)).map(Some)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Planner
// ---------------------------------------------------------------------------

/// A plan together with the rule that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanDecision {
    pub rule: PolicyRule,
    pub plan: DeploymentPlan,
}

/// Apply [`PolicyRule::ORDER`] and return the first rule's plan.
pub fn plan_deployment(ctx: &PolicyContext<'_>) -> Result<PlanDecision> {
    for rule in PolicyRule::ORDER {
        if let Some(plan) = rule.evaluate(ctx)? {
            match plan.skip_reason() {
                Some(reason) => info!(rule = rule.name(), reason, "deployment skipped"),
                None => info!(
                    rule = rule.name(),
                    branch = %ctx.facts.current_branch,
                    targets = ?plan.names(),
                    "deployment planned"
                ),
            }
            return Ok(PlanDecision { rule, plan });
        }
        debug!(rule = rule.name(), "rule did not match");
    }

    // Archive always matches; reaching here means the rule list was altered.
    Err(BerthError::PolicyAmbiguity {
        branch: ctx.facts.current_branch.clone(),
        detail: "no policy rule matched".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HostingConfig;
    use crate::domain::facts::{DeploySecrets, RepoSlug};
    use crate::domain::target::TargetKind;

    const HEAD: &str = "1111111111111111111111111111111111111111";
    const NEWER: &str = "2222222222222222222222222222222222222222";

    fn facts(branch: &str, stable: &str) -> RepoFacts {
        RepoFacts {
            repository: RepoSlug::new("angular", "angular"),
            current_branch: branch.to_string(),
            current_commit: CommitId::parse(HEAD).unwrap(),
            stable_branch: stable.to_string(),
            is_pull_request: false,
            secrets: DeploySecrets::default(),
        }
    }

    fn snapshot(most_recent: Option<&str>, for_major: Option<&str>) -> BranchSnapshot {
        BranchSnapshot {
            latest_commit: CommitId::parse(HEAD),
            most_recent_minor: most_recent.map(str::to_string),
            most_recent_minor_for_major: for_major.map(str::to_string),
        }
    }

    fn decide(facts: &RepoFacts, snapshot: &BranchSnapshot) -> Result<PlanDecision> {
        let config = PolicyConfig::default();
        let registry = TargetRegistry::standard(&HostingConfig::default());
        plan_deployment(&PolicyContext {
            facts,
            snapshot,
            config: &config,
            registry: &registry,
        })
    }

    #[test]
    fn test_rule_order_is_fixed() {
        let names: Vec<_> = PolicyRule::ORDER.iter().map(PolicyRule::name).collect();
        assert_eq!(
            names,
            vec![
                "canonical_repo",
                "pull_request",
                "stale_commit",
                "trunk",
                "release_candidate",
                "stable",
                "archive"
            ]
        );
    }

    #[test]
    fn test_foreign_repository_skips() {
        let mut f = facts("master", "12.1.x");
        f.repository = RepoSlug::new("someone", "angular");
        let decision = decide(&f, &BranchSnapshot::default()).unwrap();
        assert_eq!(decision.rule, PolicyRule::CanonicalRepo);
        assert!(decision.plan.skip_reason().unwrap().contains("someone/angular"));
    }

    #[test]
    fn test_pull_request_skips_before_staleness() {
        let mut f = facts("master", "12.1.x");
        f.is_pull_request = true;
        // No latest commit resolved: the PR rule must win before it is needed.
        let decision = decide(&f, &BranchSnapshot::default()).unwrap();
        assert_eq!(decision.rule, PolicyRule::PullRequest);
        assert!(decision.plan.is_skip());
    }

    #[test]
    fn test_stale_commit_skips() {
        let f = facts("master", "12.1.x");
        let mut snap = snapshot(Some("12.1.x"), None);
        snap.latest_commit = CommitId::parse(NEWER);
        let decision = decide(&f, &snap).unwrap();
        assert_eq!(decision.rule, PolicyRule::StaleCommit);
        let reason = decision.plan.skip_reason().unwrap();
        assert!(reason.contains("11111111"));
        assert!(reason.contains("22222222"));
    }

    #[test]
    fn test_unresolved_latest_commit_is_resolution_error() {
        let f = facts("master", "12.1.x");
        let err = decide(&f, &BranchSnapshot::default()).unwrap_err();
        assert!(matches!(err, BerthError::Resolution(_)));
    }

    #[test]
    fn test_trunk_deploys_next_regardless_of_stable() {
        for stable in ["12.1.x", "master", "not-a-version"] {
            let decision = decide(&facts("master", stable), &snapshot(Some("12.1.x"), None)).unwrap();
            assert_eq!(decision.rule, PolicyRule::Trunk);
            assert_eq!(decision.plan.names(), vec!["next"]);
        }
    }

    #[test]
    fn test_active_rc_deploys_rc() {
        let decision = decide(
            &facts("12.2.x", "12.1.x"),
            &snapshot(Some("12.2.x"), Some("12.2.x")),
        )
        .unwrap();
        assert_eq!(decision.rule, PolicyRule::ReleaseCandidate);
        assert_eq!(decision.plan.names(), vec!["rc"]);
    }

    #[test]
    fn test_stable_with_active_rc_deploys_stable_only() {
        let decision = decide(
            &facts("12.1.x", "12.1.x"),
            &snapshot(Some("13.0.x"), Some("12.1.x")),
        )
        .unwrap();
        assert_eq!(decision.rule, PolicyRule::Stable);
        assert_eq!(decision.plan.names(), vec!["stable"]);
        assert_eq!(
            decision.plan.targets[0].site_id.as_deref(),
            Some("v12-angular-io-site")
        );
    }

    #[test]
    fn test_stable_without_rc_also_redeploys_to_rc_site() {
        let decision = decide(
            &facts("12.1.x", "12.1.x"),
            &snapshot(Some("12.1.x"), Some("12.1.x")),
        )
        .unwrap();
        assert_eq!(decision.plan.names(), vec!["stable", "stable-redeployed-as-rc"]);
        assert_eq!(decision.plan.targets[0].kind, TargetKind::Primary);
        assert_eq!(decision.plan.targets[1].kind, TargetKind::Secondary);
        assert_eq!(
            decision.plan.targets[1].site_id.as_deref(),
            Some("rc-angular-io-site")
        );
    }

    #[test]
    fn test_stable_without_any_version_branch_on_remote() {
        let decision = decide(&facts("12.1.x", "12.1.x"), &snapshot(None, None)).unwrap();
        assert_eq!(decision.plan.names(), vec!["stable", "stable-redeployed-as-rc"]);
    }

    #[test]
    fn test_archive_for_newest_minor_of_older_major() {
        let decision = decide(
            &facts("10.2.x", "12.1.x"),
            &snapshot(Some("13.0.x"), Some("10.2.x")),
        )
        .unwrap();
        assert_eq!(decision.rule, PolicyRule::Archive);
        assert_eq!(decision.plan.names(), vec!["archive"]);
        assert_eq!(
            decision.plan.targets[0].deployed_url.as_deref(),
            Some("https://v10.angular.io/")
        );
    }

    #[test]
    fn test_superseded_minor_skips() {
        let decision = decide(
            &facts("2.3.x", "4.0.x"),
            &snapshot(Some("4.0.x"), Some("2.4.x")),
        )
        .unwrap();
        assert_eq!(decision.rule, PolicyRule::Archive);
        assert!(decision.plan.skip_reason().unwrap().contains("2.4.x"));
    }

    #[test]
    fn test_branch_not_older_than_stable_skips() {
        let decision = decide(
            &facts("12.3.x", "12.1.x"),
            &snapshot(Some("13.0.x"), Some("12.3.x")),
        )
        .unwrap();
        assert_eq!(decision.rule, PolicyRule::Archive);
        assert!(decision.plan.skip_reason().unwrap().contains("not older"));
    }

    #[test]
    fn test_non_version_branch_skips() {
        let decision = decide(
            &facts("feature-x", "12.1.x"),
            &snapshot(Some("12.1.x"), None),
        )
        .unwrap();
        assert_eq!(decision.rule, PolicyRule::Archive);
        assert!(decision.plan.is_skip());
    }

    #[test]
    fn test_rc_not_newer_than_stable_is_ambiguous() {
        let err = decide(
            &facts("11.2.x", "12.1.x"),
            &snapshot(Some("11.2.x"), Some("11.2.x")),
        )
        .unwrap_err();
        match err {
            BerthError::PolicyAmbiguity { branch, detail } => {
                assert_eq!(branch, "11.2.x");
                assert!(detail.contains("12.1.x"));
            }
            other => panic!("Expected PolicyAmbiguity, got {:?}", other),
        }
    }

    #[test]
    fn test_older_rc_does_not_block_archive_of_other_branches() {
        let decision = decide(
            &facts("10.2.x", "12.1.x"),
            &snapshot(Some("11.0.x"), Some("10.2.x")),
        )
        .unwrap();
        assert_eq!(decision.rule, PolicyRule::Archive);
        assert_eq!(decision.plan.names(), vec!["archive"]);
    }

    #[test]
    fn test_non_version_stable_branch_is_config_error_for_stable_rule() {
        let err = decide(&facts("main-stable", "main-stable"), &snapshot(None, None)).unwrap_err();
        assert!(matches!(err, BerthError::Config(_)));
    }

    #[test]
    fn test_each_rule_can_be_evaluated_alone() {
        let f = facts("12.1.x", "12.1.x");
        let snap = snapshot(Some("12.1.x"), Some("12.1.x"));
        let config = PolicyConfig::default();
        let registry = TargetRegistry::standard(&HostingConfig::default());
        let ctx = PolicyContext {
            facts: &f,
            snapshot: &snap,
            config: &config,
            registry: &registry,
        };
        assert_eq!(PolicyRule::Trunk.evaluate(&ctx).unwrap(), None);
        assert_eq!(PolicyRule::ReleaseCandidate.evaluate(&ctx).unwrap(), None);
        assert!(PolicyRule::Stable.evaluate(&ctx).unwrap().is_some());
        // Archive would skip the stable branch, which is why Stable precedes it.
        assert!(PolicyRule::Archive.evaluate(&ctx).unwrap().unwrap().is_skip());
    }
}
