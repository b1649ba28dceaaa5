/*!

Scenarios are data: a case id, a title, the provider they run against, how the cluster they work on
is prepared, and a body. The [`Runner`] prepares each scenario's cluster, runs the body, cleans up,
and hands the outcome to every [`Reporter`].

!*/

mod report;
mod runner;

pub use report::{JsonLinesReporter, LogReporter, Outcome, Reporter, ScenarioReport};
pub use runner::Runner;

use crate::context::ScenarioContext;
use crate::error::{self, Result};
use futures::future::BoxFuture;
use hosted_model::{ClusterResource, Provider};
use snafu::OptionExt;
use std::fmt::{Debug, Formatter};

/// A scenario body. It receives the scenario's context and the fixture prepared for it.
pub type Body = for<'a> fn(&'a ScenarioContext, &'a mut Fixture) -> BoxFuture<'a, Result<()>>;

/// How the runner prepares a scenario's cluster before running the body.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Setup {
    /// Nothing; the body creates its own cluster and records it in the fixture.
    None,
    /// A cluster provisioned through the management API from the provider's template, waited on
    /// until it is active.
    ReadyCluster,
    /// Like [`Setup::ReadyCluster`], except that with `IS_IMPORT` set the cluster is created with
    /// `eksctl` and imported instead.
    SyncCluster,
}

#[derive(Clone)]
pub struct Scenario {
    /// The test-management case id, if the scenario has one.
    pub case_id: Option<u32>,
    pub title: &'static str,
    pub provider: Provider,
    /// Upgrade scenarios start one minor release behind and are skipped with `SKIP_UPGRADE_TESTS`.
    pub is_upgrade: bool,
    /// Pending scenarios are listed and reported as skipped but never run.
    pub pending: bool,
    /// GKE only: provision a regional rather than a zonal cluster.
    pub regional: bool,
    pub setup: Setup,
    pub body: Body,
}

impl Debug for Scenario {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scenario")
            .field("case_id", &self.case_id)
            .field("title", &self.title)
            .field("provider", &self.provider)
            .field("is_upgrade", &self.is_upgrade)
            .field("pending", &self.pending)
            .field("regional", &self.regional)
            .field("setup", &self.setup)
            .finish()
    }
}

impl Scenario {
    /// A short identifier, `eks-141`, or the title for scenarios without a case id.
    pub fn name(&self) -> String {
        match self.case_id {
            Some(id) => format!("{}-{}", self.provider, id),
            None => self.title.to_string(),
        }
    }

    /// Whether `filter` selects this scenario, either by case id or by a substring of the title.
    pub fn matches(&self, filter: &str) -> bool {
        let filter = filter.trim();
        match filter.parse::<u32>() {
            Ok(id) => self.case_id == Some(id),
            Err(_) => self.title.contains(filter) || self.name() == filter,
        }
    }
}

/// What the runner prepared for a scenario, and what the body leaves behind for cleanup.
#[derive(Clone, Debug, Default)]
pub struct Fixture {
    /// The scenario's cluster. Bodies that create a cluster must record it here as soon as it
    /// exists so that it is cleaned up.
    pub cluster: Option<ClusterResource>,
    /// The Kubernetes version the cluster was created with.
    pub k8s_version: String,
    /// The version upgrade scenarios upgrade to.
    pub upgrade_to: Option<String>,
    /// The cluster was (or was being) created with the provider CLI and must be deleted with it.
    pub imported: bool,
}

impl Fixture {
    pub fn cluster(&self, action: &str) -> Result<&ClusterResource> {
        self.cluster
            .as_ref()
            .context(error::NoClusterSnafu { action })
    }

    pub fn upgrade_to(&self) -> Result<&str> {
        self.upgrade_to
            .as_deref()
            .context(error::MissingConfigSnafu {
                what: "no version to upgrade to",
            })
    }

    /// Records the latest state of the scenario's cluster and returns it.
    pub fn track(&mut self, cluster: ClusterResource) -> &ClusterResource {
        self.cluster.insert(cluster)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use futures::FutureExt;

    fn noop<'a>(_: &'a ScenarioContext, _: &'a mut Fixture) -> BoxFuture<'a, Result<()>> {
        async move { Ok(()) }.boxed()
    }

    fn scenario(case_id: Option<u32>, title: &'static str) -> Scenario {
        Scenario {
            case_id,
            title,
            provider: Provider::Eks,
            is_upgrade: false,
            pending: false,
            regional: false,
            setup: Setup::None,
            body: noop,
        }
    }

    #[test]
    fn filters_by_id_or_title() {
        let s = scenario(Some(141), "should error out with no nodegroups");
        assert_eq!(s.name(), "eks-141");
        assert!(s.matches("141"));
        assert!(s.matches("eks-141"));
        assert!(s.matches("no nodegroups"));
        assert!(!s.matches("14"));
        let unnumbered = scenario(None, "sync upgrade from the provider");
        assert_eq!(unnumbered.name(), "sync upgrade from the provider");
        assert!(unnumbered.matches("sync"));
    }

    #[test]
    fn fixture_without_cluster() {
        let mut fixture = Fixture::default();
        assert!(matches!(
            fixture.cluster("upgrade"),
            Err(crate::Error::NoCluster { .. })
        ));
        fixture.track(ClusterResource {
            id: "c-1".to_string(),
            ..Default::default()
        });
        assert_eq!(fixture.cluster("upgrade").unwrap().id, "c-1");
        assert!(fixture.upgrade_to().is_err());
    }
}
