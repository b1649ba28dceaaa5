/*!

An in-memory management API. Submitted changes are echoed back at once, but the observed state
(the upstream spec) only catches up after a configurable number of reads, the way a real control
plane reconciles asynchronously. Invalid configurations are either refused synchronously or
surface later as a transitioning error, depending on which check a real control plane performs
where.

!*/

use crate::test_settings::TestSettings;
use async_trait::async_trait;
use hosted_model::clients::{Error, ManagementClient, Result, StatusCode, Token};
use hosted_model::constants::{STATE_ACTIVE, STATE_PROVISIONING, STATE_UPDATING};
use hosted_model::{ClusterConfig, ClusterResource, ClusterStatus, K8sVersion, Transitioning};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::{Mutex, MutexGuard};

pub const ACCESS_REQUIRED: &str = "public access, private access, or both must be enabled";
pub const SUBNETS_REQUIRED: &str = "subnets must be provided if security groups are provided";
pub const NO_NODE_GROUPS: &str =
    "Cluster must have at least one managed nodegroup or one self-managed node";

/// Operator releases report duplicate node group names in different words.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DuplicateWording {
    Legacy,
    Current,
}

impl DuplicateWording {
    fn message(&self, name: &str, cluster_id: &str) -> String {
        match self {
            DuplicateWording::Legacy => format!(
                "node group name [{}] is not unique within the cluster [{}]",
                name, cluster_id
            ),
            DuplicateWording::Current => format!(
                "NodePool names must be unique within the [{}] cluster to avoid duplication",
                cluster_id
            ),
        }
    }
}

#[derive(Debug)]
struct FakeCluster {
    resource: ClusterResource,
    /// Reads left before the pending change is reconciled. `None` when nothing is pending.
    countdown: Option<u32>,
    /// A change made directly on the provider, waiting to be synced back.
    provider_change: Option<ClusterConfig>,
    ever_active: bool,
}

#[derive(Debug, Default)]
struct State {
    clusters: BTreeMap<String, FakeCluster>,
    /// Clusters that exist on the provider but not (yet) in the management API, by name.
    external: BTreeMap<String, ClusterConfig>,
    next_id: u32,
    creates: usize,
    updates: usize,
    deletes: usize,
    tokens: Vec<Token>,
}

#[derive(Debug)]
pub struct FakeManagementApi {
    state: Mutex<State>,
    lag: u32,
    duplicate_wording: DuplicateWording,
    versions: Vec<String>,
}

impl Default for FakeManagementApi {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeManagementApi {
    /// A fake whose reconciliation lag comes from `HOSTED_SELFTEST_RECONCILE_LAG`.
    pub fn new() -> Self {
        Self::with_lag(TestSettings::reconcile_lag())
    }

    /// A fake that serves `lag` reads of the previous state after each change before
    /// reconciling it.
    pub fn with_lag(lag: u32) -> Self {
        Self {
            state: Mutex::new(State::default()),
            lag,
            duplicate_wording: DuplicateWording::Current,
            versions: Vec::new(),
        }
    }

    pub fn with_duplicate_wording(mut self, wording: DuplicateWording) -> Self {
        self.duplicate_wording = wording;
        self
    }

    /// Kubernetes versions offered for new clusters of any provider. None by default.
    pub fn with_versions<S: Into<String>>(mut self, versions: Vec<S>) -> Self {
        self.versions = versions.into_iter().map(Into::into).collect();
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers a cluster that exists only on the provider, for import.
    pub fn add_external_cluster(&self, config: ClusterConfig) {
        self.state()
            .external
            .insert(config.display_name.clone(), config);
    }

    /// Changes cluster `id` directly on the provider. The management API picks the change up
    /// after the usual lag. Returns `false` when the cluster does not exist.
    pub fn change_on_provider<F>(&self, id: &str, change: F) -> bool
    where
        F: FnOnce(&mut ClusterConfig),
    {
        let lag = self.lag;
        let mut state = self.state();
        let cluster = match state.clusters.get_mut(id) {
            Some(cluster) => cluster,
            None => return false,
        };
        let mut config = cluster
            .provider_change
            .clone()
            .or_else(|| cluster.resource.upstream_spec().cloned())
            .unwrap_or_else(|| cluster.resource.desired());
        change(&mut config);
        cluster.provider_change = Some(config);
        cluster.countdown = Some(lag);
        true
    }

    /// The stored cluster, without counting as a read.
    pub fn peek(&self, id: &str) -> Option<ClusterResource> {
        self.state().clusters.get(id).map(|c| c.resource.clone())
    }

    pub fn cluster_ids(&self) -> Vec<String> {
        self.state().clusters.keys().cloned().collect()
    }

    pub fn create_count(&self) -> usize {
        self.state().creates
    }

    pub fn update_count(&self) -> usize {
        self.state().updates
    }

    pub fn delete_count(&self) -> usize {
        self.state().deletes
    }

    pub fn tokens(&self) -> Vec<Token> {
        self.state().tokens.clone()
    }

    fn submit(&self, cluster: &mut FakeCluster, state: &str) {
        cluster.resource.state = state.to_string();
        cluster.resource.transitioning = Transitioning::Yes;
        cluster.resource.transitioning_message = String::new();
        cluster.countdown = Some(self.lag);
    }

    fn reconcile(&self, cluster: &mut FakeCluster, external: Option<&ClusterConfig>) {
        cluster.countdown = None;
        let desired = cluster.resource.desired();
        if let Some(message) = self.async_error(&cluster.resource.id, &desired, cluster.ever_active)
        {
            cluster.resource.transitioning = Transitioning::Error;
            cluster.resource.transitioning_message = message;
            return;
        }

        let upstream = match cluster.provider_change.take() {
            Some(changed) => {
                if !desired.imported {
                    cluster.resource.config = Some(changed.clone());
                }
                changed
            }
            None if desired.imported => external
                .cloned()
                .or_else(|| cluster.resource.upstream_spec().cloned())
                .unwrap_or(desired),
            None => with_defaults(desired, cluster.resource.upstream_spec()),
        };
        cluster.resource.kubernetes_version = upstream.kubernetes_version.clone();
        cluster.resource.status = Some(ClusterStatus {
            upstream_spec: Some(upstream),
        });
        cluster.resource.state = STATE_ACTIVE.to_string();
        cluster.resource.transitioning = Transitioning::No;
        cluster.resource.transitioning_message = String::new();
        cluster.ever_active = true;
    }

    /// Problems a real control plane only finds while reconciling.
    fn async_error(&self, id: &str, config: &ClusterConfig, ever_active: bool) -> Option<String> {
        if config.imported {
            return None;
        }
        if config.node_groups.is_empty() {
            return Some(NO_NODE_GROUPS.to_string());
        }
        if let Some(name) = config.duplicate_node_group_names().into_iter().next() {
            return Some(self.duplicate_wording.message(&name, id));
        }
        let control_plane = config.k8s_version();
        for ng in &config.node_groups {
            let version = match ng.version.as_deref() {
                Some(version) => version,
                None => continue,
            };
            if !ever_active && config.kubernetes_version.as_deref() != Some(version) {
                return Some(format!(
                    "nodegroup [{}] version must match cluster [{}] version",
                    ng.name, id
                ));
            }
            if let (Some(cp), Ok(ng_version)) = (&control_plane, K8sVersion::parse(version)) {
                if !cp.at_least_minor(&ng_version) {
                    return Some(format!(
                        "versions for cluster [{}] and nodegroup [{}] not compatible: all \
                         nodegroup kubernetes versions must be equal to or one minor version \
                         lower than the cluster kubernetes version",
                        cp.major_minor_without_v(),
                        ng_version.major_minor_without_v()
                    ));
                }
            }
        }
        let invalid: Vec<&str> = config
            .public_access_sources
            .iter()
            .map(String::as_str)
            .filter(|cidr| !is_cidr(cidr))
            .collect();
        if !invalid.is_empty() {
            return Some(format!(
                "InvalidParameterException: The following CIDRs are invalid in \
                 publicAccessCidrs: [{}]",
                invalid.join(", ")
            ));
        }
        None
    }
}

/// Problems a real control plane refuses synchronously.
fn rejection(config: &ClusterConfig) -> Option<Error> {
    if config.public_access == Some(false) && config.private_access == Some(false) {
        return Some(Error::rejected(
            StatusCode::UNPROCESSABLE_ENTITY,
            ACCESS_REQUIRED,
        ));
    }
    if !config.security_groups.is_empty() && config.subnets.is_empty() {
        return Some(Error::rejected(
            StatusCode::UNPROCESSABLE_ENTITY,
            SUBNETS_REQUIRED,
        ));
    }
    None
}

/// What a provider fills in: node groups without a version keep the version they already run,
/// and new ones get the control plane's.
fn with_defaults(mut config: ClusterConfig, previous: Option<&ClusterConfig>) -> ClusterConfig {
    for ng in config.node_groups.iter_mut() {
        if ng.version.is_none() {
            ng.version = previous
                .and_then(|p| p.node_group(&ng.name))
                .and_then(|p| p.version.clone())
                .or_else(|| config.kubernetes_version.clone());
        }
    }
    config
}

fn is_cidr(value: &str) -> bool {
    let (address, prefix) = match value.split_once('/') {
        Some(parts) => parts,
        None => return false,
    };
    match (address.parse::<IpAddr>(), prefix.parse::<u8>()) {
        (Ok(IpAddr::V4(_)), Ok(prefix)) => prefix <= 32,
        (Ok(IpAddr::V6(_)), Ok(prefix)) => prefix <= 128,
        _ => false,
    }
}

#[async_trait]
impl ManagementClient for FakeManagementApi {
    async fn create(&self, cluster: &ClusterResource) -> Result<ClusterResource> {
        let desired = cluster.desired();
        if let Some(e) = rejection(&desired) {
            return Err(e);
        }
        let mut state = self.state();
        state.creates += 1;
        state.next_id += 1;
        let id = format!("c-{:05}", state.next_id);
        let mut fake = FakeCluster {
            resource: ClusterResource {
                id: id.clone(),
                name: cluster.name.clone(),
                provider: cluster.provider,
                config: Some(desired),
                ..Default::default()
            },
            countdown: None,
            provider_change: None,
            ever_active: false,
        };
        self.submit(&mut fake, STATE_PROVISIONING);
        let resource = fake.resource.clone();
        state.clusters.insert(id, fake);
        Ok(resource)
    }

    async fn update(&self, cluster: &ClusterResource) -> Result<ClusterResource> {
        let desired = cluster.desired();
        if let Some(e) = rejection(&desired) {
            return Err(e);
        }
        let mut state = self.state();
        state.updates += 1;
        let fake = state
            .clusters
            .get_mut(&cluster.id)
            .ok_or_else(|| Error::not_found(format!("cluster '{}'", cluster.id)))?;
        fake.resource.config = Some(desired);
        self.submit(fake, STATE_UPDATING);
        Ok(fake.resource.clone())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut state = self.state();
        state.deletes += 1;
        state
            .clusters
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::not_found(format!("cluster '{}'", id)))
    }

    async fn get_by_id(&self, id: &str) -> Result<ClusterResource> {
        let mut state = self.state();
        let State {
            clusters, external, ..
        } = &mut *state;
        let fake = clusters
            .get_mut(id)
            .ok_or_else(|| Error::not_found(format!("cluster '{}'", id)))?;
        match fake.countdown {
            Some(0) => {
                let external = external.get(&fake.resource.desired().display_name);
                self.reconcile(fake, external);
            }
            Some(n) => fake.countdown = Some(n - 1),
            None => {}
        }
        Ok(fake.resource.clone())
    }

    async fn create_token(&self, description: &str) -> Result<Token> {
        let mut state = self.state();
        let name = format!("token-{:05}", state.tokens.len() + 1);
        let token = Token {
            id: name.clone(),
            token: format!("{}:secret", name),
            name,
            description: description.to_string(),
        };
        state.tokens.push(token.clone());
        Ok(token)
    }

    async fn kubernetes_versions(&self, _: &ClusterResource) -> Result<Vec<String>> {
        Ok(self.versions.clone())
    }
}
