//! The management API's JSON representation of hosted clusters, and conversions to and from the
//! provider-neutral model. Field names follow the EKS and GKE operators' config specs.

use crate::constants::DOCKER_ROOT_DIR;
use crate::{ClusterConfig, ClusterResource, ClusterStatus, NodeGroupSpec, Provider, Transitioning};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCluster {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    id: String,
    #[serde(rename = "type", default = "cluster_type")]
    kind: String,
    #[serde(default)]
    name: String,
    #[serde(default, skip_serializing)]
    state: String,
    #[serde(default, skip_serializing)]
    transitioning: Transitioning,
    #[serde(default, skip_serializing)]
    transitioning_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    docker_root_dir: Option<String>,
    #[serde(default, skip_serializing)]
    version: Option<VersionInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    eks_config: Option<EksClusterConfigSpec>,
    #[serde(default, skip_serializing)]
    eks_status: Option<WireStatus<EksClusterConfigSpec>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    gke_config: Option<GkeClusterConfigSpec>,
    #[serde(default, skip_serializing)]
    gke_status: Option<WireStatus<GkeClusterConfigSpec>>,
}

fn cluster_type() -> String {
    "cluster".to_string()
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionInfo {
    #[serde(default)]
    git_version: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireStatus<T> {
    upstream_spec: Option<T>,
}

/// `eksConfig` as accepted by the management API.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EksClusterConfigSpec {
    #[serde(default)]
    pub amazon_credential_secret: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub imported: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubernetes_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_access: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_access: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_access_sources: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging_types: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subnets: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_groups: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_groups: Option<Vec<EksNodeGroup>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EksNodeGroup {
    #[serde(default)]
    pub nodegroup_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desired_size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu: Option<bool>,
}

/// `gkeConfig` as accepted by the management API.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GkeClusterConfigSpec {
    #[serde(default)]
    pub google_credential_secret: String,
    #[serde(default)]
    pub cluster_name: String,
    #[serde(default)]
    pub imported: bool,
    #[serde(rename = "projectID", skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locations: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubernetes_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_pools: Option<Vec<GkeNodePool>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GkeNodePool {
    #[serde(default)]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_node_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<GkeNodeConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub autoscaling: Option<GkeAutoscaling>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GkeNodeConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub machine_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_size_gb: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GkeAutoscaling {
    #[serde(default)]
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_node_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_node_count: Option<i64>,
}

impl From<EksClusterConfigSpec> for ClusterConfig {
    fn from(spec: EksClusterConfigSpec) -> Self {
        Self {
            display_name: spec.display_name,
            cloud_credential: spec.amazon_credential_secret,
            imported: spec.imported,
            region: spec.region,
            kubernetes_version: spec.kubernetes_version,
            node_groups: spec
                .node_groups
                .unwrap_or_default()
                .into_iter()
                .map(NodeGroupSpec::from)
                .collect(),
            logging_types: spec.logging_types.unwrap_or_default(),
            public_access: spec.public_access,
            private_access: spec.private_access,
            public_access_sources: spec.public_access_sources.unwrap_or_default(),
            security_groups: spec.security_groups.unwrap_or_default(),
            subnets: spec.subnets.unwrap_or_default(),
            tags: spec.tags.unwrap_or_default(),
            ..Default::default()
        }
    }
}

impl From<&ClusterConfig> for EksClusterConfigSpec {
    fn from(config: &ClusterConfig) -> Self {
        Self {
            amazon_credential_secret: config.cloud_credential.clone(),
            display_name: config.display_name.clone(),
            imported: config.imported,
            region: config.region.clone(),
            kubernetes_version: config.kubernetes_version.clone(),
            tags: Some(config.tags.clone()),
            public_access: config.public_access,
            private_access: config.private_access,
            public_access_sources: Some(config.public_access_sources.clone()),
            logging_types: Some(config.logging_types.clone()),
            subnets: Some(config.subnets.clone()),
            security_groups: Some(config.security_groups.clone()),
            node_groups: Some(config.node_groups.iter().map(EksNodeGroup::from).collect()),
        }
    }
}

impl From<EksNodeGroup> for NodeGroupSpec {
    fn from(ng: EksNodeGroup) -> Self {
        Self {
            name: ng.nodegroup_name,
            version: ng.version,
            instance_type: ng.instance_type,
            disk_size: ng.disk_size,
            min_size: ng.min_size,
            max_size: ng.max_size,
            desired_size: ng.desired_size,
            tags: ng.tags.unwrap_or_default(),
            labels: ng.labels.unwrap_or_default(),
            gpu: ng.gpu,
        }
    }
}

impl From<&NodeGroupSpec> for EksNodeGroup {
    fn from(ng: &NodeGroupSpec) -> Self {
        Self {
            nodegroup_name: ng.name.clone(),
            version: ng.version.clone(),
            instance_type: ng.instance_type.clone(),
            disk_size: ng.disk_size,
            min_size: ng.min_size,
            max_size: ng.max_size,
            desired_size: ng.desired_size,
            tags: Some(ng.tags.clone()),
            labels: Some(ng.labels.clone()),
            gpu: ng.gpu,
        }
    }
}

impl From<GkeClusterConfigSpec> for ClusterConfig {
    fn from(spec: GkeClusterConfigSpec) -> Self {
        Self {
            display_name: spec.cluster_name,
            cloud_credential: spec.google_credential_secret,
            imported: spec.imported,
            region: spec.region.filter(|r| !r.is_empty()),
            zone: spec.zone.filter(|z| !z.is_empty()),
            project_id: spec.project_id,
            locations: spec.locations.unwrap_or_default(),
            kubernetes_version: spec.kubernetes_version,
            node_groups: spec
                .node_pools
                .unwrap_or_default()
                .into_iter()
                .map(NodeGroupSpec::from)
                .collect(),
            tags: spec.labels.unwrap_or_default(),
            ..Default::default()
        }
    }
}

impl From<&ClusterConfig> for GkeClusterConfigSpec {
    fn from(config: &ClusterConfig) -> Self {
        Self {
            google_credential_secret: config.cloud_credential.clone(),
            cluster_name: config.display_name.clone(),
            imported: config.imported,
            project_id: config.project_id.clone(),
            region: config.region.clone(),
            zone: config.zone.clone(),
            locations: Some(config.locations.clone()),
            kubernetes_version: config.kubernetes_version.clone(),
            labels: Some(config.tags.clone()),
            node_pools: Some(config.node_groups.iter().map(GkeNodePool::from).collect()),
        }
    }
}

impl From<GkeNodePool> for NodeGroupSpec {
    fn from(pool: GkeNodePool) -> Self {
        let config = pool.config.unwrap_or_default();
        let autoscaling = pool.autoscaling.unwrap_or_default();
        Self {
            name: pool.name,
            version: pool.version,
            instance_type: config.machine_type,
            disk_size: config.disk_size_gb,
            min_size: autoscaling.min_node_count,
            max_size: autoscaling.max_node_count,
            desired_size: pool.initial_node_count,
            labels: config.labels.unwrap_or_default(),
            ..Default::default()
        }
    }
}

impl From<&NodeGroupSpec> for GkeNodePool {
    fn from(ng: &NodeGroupSpec) -> Self {
        let autoscaling = match (ng.min_size, ng.max_size) {
            (None, None) => None,
            (min_node_count, max_node_count) => Some(GkeAutoscaling {
                enabled: true,
                min_node_count,
                max_node_count,
            }),
        };
        Self {
            name: ng.name.clone(),
            version: ng.version.clone(),
            initial_node_count: ng.desired_size,
            config: Some(GkeNodeConfig {
                machine_type: ng.instance_type.clone(),
                disk_size_gb: ng.disk_size,
                labels: Some(ng.labels.clone()),
            }),
            autoscaling,
        }
    }
}

impl From<WireCluster> for ClusterResource {
    fn from(wire: WireCluster) -> Self {
        let is_gke = wire.gke_config.is_some() || wire.gke_status.is_some();
        let (provider, config, upstream_spec) = if is_gke {
            (
                Provider::Gke,
                wire.gke_config.map(ClusterConfig::from),
                wire.gke_status
                    .and_then(|s| s.upstream_spec)
                    .map(ClusterConfig::from),
            )
        } else {
            (
                Provider::Eks,
                wire.eks_config.map(ClusterConfig::from),
                wire.eks_status
                    .and_then(|s| s.upstream_spec)
                    .map(ClusterConfig::from),
            )
        };
        Self {
            id: wire.id,
            name: wire.name,
            provider,
            state: wire.state,
            transitioning: wire.transitioning,
            transitioning_message: wire.transitioning_message,
            kubernetes_version: wire
                .version
                .map(|v| v.git_version)
                .filter(|v| !v.is_empty()),
            config,
            status: Some(ClusterStatus { upstream_spec }),
        }
    }
}

impl From<&ClusterResource> for WireCluster {
    fn from(cluster: &ClusterResource) -> Self {
        let (eks_config, gke_config) = match (&cluster.provider, &cluster.config) {
            (Provider::Eks, Some(config)) => (Some(EksClusterConfigSpec::from(config)), None),
            (Provider::Gke, Some(config)) => (None, Some(GkeClusterConfigSpec::from(config))),
            (_, None) => (None, None),
        };
        Self {
            id: cluster.id.clone(),
            kind: cluster_type(),
            name: cluster.name.clone(),
            docker_root_dir: Some(DOCKER_ROOT_DIR.to_string()),
            eks_config,
            gke_config,
            ..Default::default()
        }
    }
}

/// Serializes `cluster` into the body the management API accepts for create and update.
pub fn to_wire(cluster: &ClusterResource) -> serde_json::Result<Value> {
    serde_json::to_value(WireCluster::from(cluster))
}

/// Parses a cluster object returned by the management API.
pub fn from_wire(value: Value) -> serde_json::Result<ClusterResource> {
    serde_json::from_value::<WireCluster>(value).map(ClusterResource::from)
}

/// Keys whose maps belong to the model as a whole. A key missing from the desired map must be
/// removed upstream, so these are sent as given instead of merged.
const OWNED_MAPS: &[&str] = &["tags", "labels"];

/// Overlays `desired` onto the object previously returned by the API so that fields the model
/// does not know about are sent back unchanged. Objects are merged key by key, except for the
/// tag and label maps, which replace the previous value. Arrays of objects that carry a node group
/// name are matched by that name; any other array is replaced.
pub fn merge_for_update(raw: Value, desired: Value) -> Value {
    match (raw, desired) {
        (Value::Object(mut raw), Value::Object(desired)) => {
            for (key, value) in desired {
                let merged = match raw.remove(&key) {
                    Some(_) if OWNED_MAPS.contains(&key.as_str()) => value,
                    Some(existing) => merge_for_update(existing, value),
                    None => value,
                };
                raw.insert(key, merged);
            }
            Value::Object(raw)
        }
        (Value::Array(raw), Value::Array(desired)) => Value::Array(
            desired
                .into_iter()
                .map(|item| match named(&item) {
                    Some(name) => match raw.iter().find(|r| named(r) == Some(name)) {
                        Some(existing) => merge_for_update(existing.clone(), item),
                        None => item,
                    },
                    None => item,
                })
                .collect(),
        ),
        (_, desired) => desired,
    }
}

fn named(value: &Value) -> Option<&str> {
    value
        .get("nodegroupName")
        .or_else(|| value.get("name"))
        .and_then(Value::as_str)
}

#[cfg(test)]
mod test {
    use super::*;
    use maplit::btreemap;
    use serde_json::json;

    #[test]
    fn parses_eks_cluster_with_upstream_spec() {
        let cluster = from_wire(json!({
            "id": "c-abcde",
            "name": "auto-hosted-xyz",
            "state": "active",
            "transitioning": "no",
            "transitioningMessage": "",
            "eksConfig": {
                "displayName": "auto-hosted-xyz",
                "kubernetesVersion": "1.29",
                "nodeGroups": [{"nodegroupName": "ng1", "desiredSize": 2}]
            },
            "eksStatus": {
                "upstreamSpec": {
                    "kubernetesVersion": "1.28",
                    "nodeGroups": [{"nodegroupName": "ng1", "desiredSize": 1}]
                }
            }
        }))
        .unwrap();
        assert_eq!(cluster.provider, Provider::Eks);
        assert!(cluster.is_active());
        assert_eq!(cluster.desired().node_groups[0].desired_size, Some(2));
        let upstream = cluster.upstream_spec().unwrap();
        assert_eq!(upstream.kubernetes_version.as_deref(), Some("1.28"));
        assert_eq!(upstream.node_groups[0].desired_size, Some(1));
    }

    #[test]
    fn parses_gke_node_pools() {
        let cluster = from_wire(json!({
            "id": "c-gke",
            "name": "gke",
            "gkeConfig": {
                "clusterName": "gke",
                "projectID": "project",
                "zone": "asia-south2-c",
                "region": "",
                "labels": {"owner": "me"},
                "nodePools": [{
                    "name": "pool",
                    "initialNodeCount": 3,
                    "config": {"machineType": "n2-standard-2", "labels": {"a": "b"}},
                    "autoscaling": {"enabled": true, "minNodeCount": 1, "maxNodeCount": 5}
                }]
            }
        }))
        .unwrap();
        assert_eq!(cluster.provider, Provider::Gke);
        let config = cluster.desired();
        assert_eq!(config.region, None);
        assert_eq!(config.project_id.as_deref(), Some("project"));
        assert_eq!(config.tags, btreemap! {"owner".to_string() => "me".to_string()});
        let pool = &config.node_groups[0];
        assert_eq!(pool.desired_size, Some(3));
        assert_eq!(pool.max_size, Some(5));
        assert_eq!(pool.instance_type.as_deref(), Some("n2-standard-2"));
        assert!(cluster.upstream_spec().is_none());
    }

    #[test]
    fn status_fields_are_not_sent() {
        let cluster = ClusterResource {
            id: "c-1".to_string(),
            name: "one".to_string(),
            state: "active".to_string(),
            config: Some(ClusterConfig::default()),
            status: Some(ClusterStatus {
                upstream_spec: Some(ClusterConfig::default()),
            }),
            ..Default::default()
        };
        let value = to_wire(&cluster).unwrap();
        assert!(value.get("eksConfig").is_some());
        assert!(value.get("eksStatus").is_none());
        assert!(value.get("state").is_none());
        assert_eq!(value["type"], "cluster");
        assert_eq!(value["dockerRootDir"], DOCKER_ROOT_DIR);
    }

    #[test]
    fn merge_keeps_unknown_fields() {
        let raw = json!({
            "id": "c-1",
            "links": {"self": "https://rancher/v3/clusters/c-1"},
            "eksConfig": {
                "serviceRole": "role",
                "loggingTypes": ["api"],
                "nodeGroups": [
                    {"nodegroupName": "a", "nodeRole": "arn:a", "desiredSize": 1},
                    {"nodegroupName": "b", "nodeRole": "arn:b", "desiredSize": 1}
                ]
            }
        });
        let desired = json!({
            "eksConfig": {
                "loggingTypes": ["api", "audit"],
                "nodeGroups": [
                    {"nodegroupName": "b", "desiredSize": 3},
                    {"nodegroupName": "c", "desiredSize": 1}
                ]
            }
        });
        let merged = merge_for_update(raw, desired);
        assert_eq!(merged["links"]["self"], "https://rancher/v3/clusters/c-1");
        assert_eq!(merged["eksConfig"]["serviceRole"], "role");
        assert_eq!(merged["eksConfig"]["loggingTypes"], json!(["api", "audit"]));
        let groups = merged["eksConfig"]["nodeGroups"].as_array().unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0]["nodeRole"], "arn:b");
        assert_eq!(groups[0]["desiredSize"], 3);
        assert!(groups[1].get("nodeRole").is_none());
    }

    #[test]
    fn merge_replaces_tags_and_labels() {
        let raw = json!({
            "eksConfig": {
                "tags": {"owner": "auto-e2e", "foo": "bar"},
                "nodeGroups": [{
                    "nodegroupName": "ng1",
                    "nodeRole": "arn:ng1",
                    "tags": {"team": "qa", "extra": "1"},
                    "labels": {"a": "1", "testCaseID": "x"}
                }]
            },
            "gkeConfig": {
                "labels": {"owner": "auto-e2e", "foo": "bar"},
                "nodePools": [{
                    "name": "pool",
                    "config": {"oauthScopes": ["s"], "labels": {"a": "1", "b": "2"}}
                }]
            }
        });
        let desired = json!({
            "eksConfig": {
                "tags": {"owner": "auto-e2e"},
                "nodeGroups": [{
                    "nodegroupName": "ng1",
                    "tags": {"team": "qa"},
                    "labels": {"a": "1"}
                }]
            },
            "gkeConfig": {
                "labels": {},
                "nodePools": [{"name": "pool", "config": {"labels": {"a": "1"}}}]
            }
        });
        let merged = merge_for_update(raw, desired);
        assert_eq!(merged["eksConfig"]["tags"], json!({"owner": "auto-e2e"}));
        let group = &merged["eksConfig"]["nodeGroups"][0];
        assert_eq!(group["nodeRole"], "arn:ng1");
        assert_eq!(group["tags"], json!({"team": "qa"}));
        assert_eq!(group["labels"], json!({"a": "1"}));
        assert_eq!(merged["gkeConfig"]["labels"], json!({}));
        let pool = &merged["gkeConfig"]["nodePools"][0]["config"];
        assert_eq!(pool["oauthScopes"], json!(["s"]));
        assert_eq!(pool["labels"], json!({"a": "1"}));
    }
}
