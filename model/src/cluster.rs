use crate::constants::{STATE_ACTIVE, STATE_UPDATING, STATE_UPGRADING};
use crate::error::{self, Result};
use crate::K8sVersion;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// The hosted Kubernetes offerings the harness knows how to drive.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Eks,
    Gke,
}

impl Default for Provider {
    fn default() -> Self {
        Self::Eks
    }
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::Eks, Provider::Gke];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Eks => "eks",
            Provider::Gke => "gke",
        }
    }
}

impl Display for Provider {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self.as_str(), f)
    }
}

impl FromStr for Provider {
    type Err = crate::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "eks" => Ok(Provider::Eks),
            "gke" => Ok(Provider::Gke),
            _ => Err(error::OpaqueError::UnknownProvider {
                value: s.to_string(),
            }
            .into()),
        }
    }
}

/// Whether the control plane is in the middle of reconciling a cluster.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transitioning {
    #[serde(alias = "")]
    No,
    Yes,
    Error,
}

impl Default for Transitioning {
    fn default() -> Self {
        Self::No
    }
}

/// A named, sized pool of worker nodes belonging to a cluster. Names must be unique within a
/// cluster.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeGroupSpec {
    pub name: String,
    pub version: Option<String>,
    pub instance_type: Option<String>,
    pub disk_size: Option<i64>,
    pub min_size: Option<i64>,
    pub max_size: Option<i64>,
    pub desired_size: Option<i64>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    pub gpu: Option<bool>,
}

/// The provider-neutral cluster configuration. The same type describes both the desired
/// configuration submitted to the management API and the upstream spec the control plane mirrors
/// back from the provider.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfig {
    pub display_name: String,
    #[serde(default)]
    pub cloud_credential: String,
    #[serde(default)]
    pub imported: bool,
    pub region: Option<String>,
    pub zone: Option<String>,
    pub project_id: Option<String>,
    #[serde(default)]
    pub locations: Vec<String>,
    pub kubernetes_version: Option<String>,
    #[serde(default)]
    pub node_groups: Vec<NodeGroupSpec>,
    #[serde(default)]
    pub logging_types: Vec<String>,
    pub public_access: Option<bool>,
    pub private_access: Option<bool>,
    #[serde(default)]
    pub public_access_sources: Vec<String>,
    #[serde(default)]
    pub security_groups: Vec<String>,
    #[serde(default)]
    pub subnets: Vec<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl ClusterConfig {
    pub fn k8s_version(&self) -> Option<K8sVersion> {
        self.kubernetes_version
            .as_ref()
            .and_then(|v| K8sVersion::parse(v).ok())
    }

    pub fn node_group(&self, name: &str) -> Option<&NodeGroupSpec> {
        self.node_groups.iter().find(|ng| ng.name == name)
    }

    pub fn node_group_names(&self) -> Vec<String> {
        self.node_groups.iter().map(|ng| ng.name.clone()).collect()
    }

    /// Names used by more than one node group.
    pub fn duplicate_node_group_names(&self) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        self.node_groups
            .iter()
            .filter(|ng| !seen.insert(ng.name.as_str()))
            .map(|ng| ng.name.clone())
            .collect()
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    /// The provider's state as last observed by the control plane. `None` until the first
    /// reconciliation with the provider.
    pub upstream_spec: Option<ClusterConfig>,
}

/// A managed cluster as reported by the management API.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterResource {
    pub id: String,
    pub name: String,
    pub provider: Provider,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub transitioning: Transitioning,
    #[serde(default)]
    pub transitioning_message: String,
    /// The version the downstream cluster itself reports, if it is reachable.
    pub kubernetes_version: Option<String>,
    pub config: Option<ClusterConfig>,
    pub status: Option<ClusterStatus>,
}

impl ClusterResource {
    /// The desired configuration, or an empty one when the API did not echo any.
    pub fn desired(&self) -> ClusterConfig {
        self.config.clone().unwrap_or_default()
    }

    /// The upstream spec mirrored by the control plane, if it has been populated.
    pub fn upstream_spec(&self) -> Option<&ClusterConfig> {
        self.status.as_ref().and_then(|s| s.upstream_spec.as_ref())
    }

    pub fn is_active(&self) -> bool {
        self.state == STATE_ACTIVE && self.transitioning != Transitioning::Yes
    }

    pub fn is_updating(&self) -> bool {
        self.state == STATE_UPDATING || self.state == STATE_UPGRADING
    }

    /// `true` when the control plane flagged the cluster with an error whose message contains any
    /// of `needles`.
    pub fn has_error_containing<S: AsRef<str>>(&self, needles: &[S]) -> bool {
        self.transitioning == Transitioning::Error
            && needles
                .iter()
                .any(|n| self.transitioning_message.contains(n.as_ref()))
    }
}
