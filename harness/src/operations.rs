/*!

Composite operations built from the mutator and the poller. Each one submits a single change, can
check that the accepted desired configuration carries the change, can wait for the cluster to
finish updating, and can wait for the change to appear in the upstream spec mirrored back from
the provider.

!*/

use crate::context::random_name;
use crate::error::{self, Result};
use crate::mutator::{refresh, update_cluster};
use crate::wait::{poll_until, Condition};
use hosted_model::clients::ManagementClient;
use hosted_model::constants::NODE_GROUP_NAME_PREFIX;
use hosted_model::{
    ClusterConfig, ClusterResource, ConvergenceWindow, NodeGroupSpec, Provider, Transitioning,
};
use log::info;
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};

/// Which follow-up checks an operation performs after its change is accepted.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Checks {
    /// Wait for the cluster to go through an update and become active again.
    pub wait: bool,
    /// Check the accepted desired configuration and wait for the upstream spec to match it.
    pub check_config: bool,
}

impl Checks {
    pub const NONE: Self = Self {
        wait: false,
        check_config: false,
    };
    pub const CONFIG: Self = Self {
        wait: false,
        check_config: true,
    };
    pub const ALL: Self = Self {
        wait: true,
        check_config: true,
    };
}

/// A sampled value paired with the cluster it came from. Only the value is shown in logs and
/// timeout errors.
struct Observed<T> {
    value: T,
    cluster: ClusterResource,
}

impl<T: Debug> Debug for Observed<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(&self.value, f)
    }
}

/// The upstream spec, or an empty one before the first reconciliation.
pub fn upstream(cluster: &ClusterResource) -> ClusterConfig {
    cluster.upstream_spec().cloned().unwrap_or_default()
}

/// Polls cluster `id` until `extract` applied to it satisfies `condition`. Returns the cluster
/// from the satisfying sample.
pub async fn wait_for_cluster<T, F>(
    client: &dyn ManagementClient,
    id: &str,
    awaited: &str,
    window: ConvergenceWindow,
    condition: Condition<T>,
    extract: F,
) -> Result<ClusterResource>
where
    T: Debug + Send + Sync + 'static,
    F: Fn(&ClusterResource) -> T + Send + Sync,
{
    let description = condition.description().to_string();
    let condition = Condition::satisfies(description, move |observed: &Observed<T>| {
        condition.is_satisfied_by(&observed.value)
    });
    let extract = &extract;
    let observed = poll_until(awaited, window, &condition, move || async move {
        let cluster = refresh(client, id).await?;
        Ok(Observed {
            value: extract(&cluster),
            cluster,
        })
    })
    .await?;
    Ok(observed.cluster)
}

/// Like [`wait_for_cluster`] with `extract` applied to the upstream spec.
pub async fn wait_for_upstream<T, F>(
    client: &dyn ManagementClient,
    id: &str,
    awaited: &str,
    window: ConvergenceWindow,
    condition: Condition<T>,
    extract: F,
) -> Result<ClusterResource>
where
    T: Debug + Send + Sync + 'static,
    F: Fn(&ClusterConfig) -> T + Send + Sync,
{
    wait_for_cluster(client, id, awaited, window, condition, |cluster| {
        extract(&upstream(cluster))
    })
    .await
}

pub(crate) fn expect_config<E, A>(what: &str, ok: bool, expected: E, actual: A) -> Result<()>
where
    E: Debug,
    A: Debug,
{
    if ok {
        return Ok(());
    }
    error::UnexpectedConfigSnafu {
        what,
        expected: format!("{:?}", expected),
        actual: format!("{:?}", actual),
    }
    .fail()
}

fn node_groups_at_version(config: &ClusterConfig, version: &str, which: &str) -> Result<()> {
    for ng in &config.node_groups {
        if let Some(actual) = &ng.version {
            expect_config(
                &format!("version of node group '{}' in the {}", ng.name, which),
                actual == version,
                version,
                actual,
            )?;
        }
    }
    Ok(())
}

fn contains_all_entries(map: &BTreeMap<String, String>, entries: &BTreeMap<String, String>) -> bool {
    entries.iter().all(|(k, v)| map.get(k) == Some(v))
}

/// Upgrades the control plane to `to`, leaving node groups at their current version. With
/// `check_config`, checks the accepted config and waits for the upstream spec to report `to`
/// while the node groups stay put.
pub async fn upgrade_cluster_kubernetes_version(
    client: &dyn ManagementClient,
    cluster: &ClusterResource,
    to: &str,
    check_config: bool,
) -> Result<ClusterResource> {
    info!("Upgrading control plane of '{}' to {}", cluster.name, to);
    let current = cluster.desired().kubernetes_version.unwrap_or_default();
    let accepted = update_cluster(client, cluster, |c| {
        c.kubernetes_version = Some(to.to_string())
    })
    .await?;
    if !check_config {
        return Ok(accepted);
    }
    let desired = accepted.desired();
    expect_config(
        "control plane version in the accepted config",
        desired.kubernetes_version.as_deref() == Some(to),
        to,
        &desired.kubernetes_version,
    )?;
    node_groups_at_version(&desired, &current, "accepted config")?;

    let cluster = wait_for_upstream(
        client,
        &accepted.id,
        "k8s upgrade to appear in the upstream spec",
        ConvergenceWindow::CONTROL_PLANE_UPGRADE,
        Condition::equals(Some(to.to_string())),
        |u| u.kubernetes_version.clone(),
    )
    .await?;
    node_groups_at_version(&upstream(&cluster), &current, "upstream spec")?;
    Ok(cluster)
}

fn all_node_groups_at(to: &str) -> Condition<Vec<Option<String>>> {
    let to = to.to_string();
    Condition::satisfies(
        format!("every node group at version {}", to),
        move |versions: &Vec<Option<String>>| {
            !versions.is_empty() && versions.iter().all(|v| v.as_deref() == Some(to.as_str()))
        },
    )
}

fn node_group_versions(config: &ClusterConfig) -> Vec<Option<String>> {
    config.node_groups.iter().map(|ng| ng.version.clone()).collect()
}

/// Upgrades every node group to `to`.
pub async fn upgrade_node_kubernetes_version(
    client: &dyn ManagementClient,
    cluster: &ClusterResource,
    to: &str,
    checks: Checks,
) -> Result<ClusterResource> {
    info!("Upgrading node groups of '{}' to {}", cluster.name, to);
    let accepted = update_cluster(client, cluster, |c| {
        for ng in c.node_groups.iter_mut() {
            ng.version = Some(to.to_string());
        }
    })
    .await?;
    node_groups_at_version(&accepted.desired(), to, "accepted config")?;

    if checks.wait {
        wait_cluster_to_be_upgraded(client, &accepted.id).await?;
    }
    if !checks.check_config {
        return Ok(accepted);
    }
    wait_for_upstream(
        client,
        &accepted.id,
        "node group upgrade to appear in the upstream spec",
        ConvergenceWindow::CONTROL_PLANE_UPGRADE,
        all_node_groups_at(to),
        node_group_versions,
    )
    .await
}

/// Waits for every upstream node group to report `to`, used after upgrading on the provider.
pub async fn wait_for_node_group_version(
    client: &dyn ManagementClient,
    id: &str,
    to: &str,
    window: ConvergenceWindow,
) -> Result<ClusterResource> {
    wait_for_upstream(
        client,
        id,
        "node group upgrade to appear in the upstream spec",
        window,
        all_node_groups_at(to),
        node_group_versions,
    )
    .await
}

fn node_groups_named(expected: Vec<String>) -> Condition<Vec<String>> {
    Condition::satisfies(
        format!("node groups {:?}", expected),
        move |observed: &Vec<String>| {
            observed.len() == expected.len() && expected.iter().all(|n| observed.contains(n))
        },
    )
}

async fn change_node_groups(
    client: &dyn ManagementClient,
    cluster: &ClusterResource,
    node_groups: Vec<NodeGroupSpec>,
    awaited: &str,
    checks: Checks,
) -> Result<ClusterResource> {
    let names: Vec<String> = node_groups.iter().map(|ng| ng.name.clone()).collect();
    let accepted = update_cluster(client, cluster, |c| c.node_groups = node_groups).await?;
    if checks.check_config {
        let accepted_names = accepted.desired().node_group_names();
        expect_config(
            "node groups in the accepted config",
            accepted_names == names,
            &names,
            &accepted_names,
        )?;
    }
    if checks.wait {
        wait_cluster_to_be_upgraded(client, &accepted.id).await?;
    }
    if !checks.check_config {
        return Ok(accepted);
    }
    wait_for_upstream(
        client,
        &accepted.id,
        awaited,
        ConvergenceWindow::NODE_GROUP,
        node_groups_named(names),
        ClusterConfig::node_group_names,
    )
    .await
}

/// Adds `increase_by` node groups sized like `template`, each with a random name, in front of the
/// existing ones.
pub async fn add_node_groups(
    client: &dyn ManagementClient,
    cluster: &ClusterResource,
    increase_by: usize,
    template: &NodeGroupSpec,
    checks: Checks,
) -> Result<ClusterResource> {
    let desired = cluster.desired();
    let version = match cluster.provider {
        Provider::Gke => desired.kubernetes_version.clone(),
        Provider::Eks => None,
    };
    let mut node_groups = desired.node_groups;
    for _ in 0..increase_by {
        let ng = NodeGroupSpec {
            name: random_name(NODE_GROUP_NAME_PREFIX),
            version: version.clone(),
            instance_type: template.instance_type.clone(),
            disk_size: template.disk_size,
            min_size: template.min_size,
            max_size: template.max_size,
            desired_size: template.desired_size,
            ..Default::default()
        };
        info!("Adding node group '{}' to '{}'", ng.name, cluster.name);
        node_groups.insert(0, ng);
    }
    change_node_groups(
        client,
        cluster,
        node_groups,
        "the node group count to increase in the upstream spec",
        checks,
    )
    .await
}

/// Removes every node group except the first.
pub async fn delete_node_group(
    client: &dyn ManagementClient,
    cluster: &ClusterResource,
    checks: Checks,
) -> Result<ClusterResource> {
    let node_groups: Vec<NodeGroupSpec> =
        cluster.desired().node_groups.into_iter().take(1).collect();
    info!(
        "Reducing '{}' to node groups {:?}",
        cluster.name,
        node_groups.iter().map(|ng| &ng.name).collect::<Vec<_>>()
    );
    change_node_groups(
        client,
        cluster,
        node_groups,
        "the node group count to decrease in the upstream spec",
        checks,
    )
    .await
}

/// Sets the desired and maximum size of every node group to `count`.
pub async fn scale_node_groups(
    client: &dyn ManagementClient,
    cluster: &ClusterResource,
    count: i64,
    checks: Checks,
) -> Result<ClusterResource> {
    info!("Scaling node groups of '{}' to {}", cluster.name, count);
    let accepted = update_cluster(client, cluster, |c| {
        for ng in c.node_groups.iter_mut() {
            ng.desired_size = Some(count);
            ng.max_size = Some(count);
        }
    })
    .await?;
    if checks.check_config {
        for ng in accepted.desired().node_groups {
            expect_config(
                &format!("desired size of node group '{}' in the accepted config", ng.name),
                ng.desired_size == Some(count),
                count,
                ng.desired_size,
            )?;
        }
    }
    if checks.wait {
        wait_cluster_to_be_upgraded(client, &accepted.id).await?;
    }
    if !checks.check_config {
        return Ok(accepted);
    }
    wait_for_upstream(
        client,
        &accepted.id,
        "the node count change to appear in the upstream spec",
        ConvergenceWindow::NODE_GROUP,
        Condition::satisfies(
            format!("every node group with desired size {}", count),
            move |sizes: &Vec<Option<i64>>| {
                !sizes.is_empty() && sizes.iter().all(|s| *s == Some(count))
            },
        ),
        |u| u.node_groups.iter().map(|ng| ng.desired_size).collect::<Vec<_>>(),
    )
    .await
}

/// Replaces the enabled control plane log types.
pub async fn update_logging(
    client: &dyn ManagementClient,
    cluster: &ClusterResource,
    logging_types: &[&str],
    check_config: bool,
) -> Result<ClusterResource> {
    let types: Vec<String> = logging_types.iter().map(|t| t.to_string()).collect();
    info!("Setting logging types of '{}' to {:?}", cluster.name, types);
    let accepted = update_cluster(client, cluster, |c| c.logging_types = types.clone()).await?;
    if !check_config {
        return Ok(accepted);
    }
    let accepted_types = accepted.desired().logging_types;
    expect_config(
        "logging types in the accepted config",
        accepted_types == types,
        &types,
        &accepted_types,
    )?;
    wait_for_upstream(
        client,
        &accepted.id,
        "the logging changes to appear in the upstream spec",
        ConvergenceWindow::METADATA,
        Condition::exact_elements(types),
        |u| u.logging_types.clone(),
    )
    .await
}

/// Sets the public and private API endpoint access flags. Disabling both is refused by the
/// management API, which surfaces as [`crate::Error::Rejected`].
pub async fn update_access(
    client: &dyn ManagementClient,
    cluster: &ClusterResource,
    public_access: bool,
    private_access: bool,
    check_config: bool,
) -> Result<ClusterResource> {
    info!(
        "Setting access of '{}' to public={} private={}",
        cluster.name, public_access, private_access
    );
    let accepted = update_cluster(client, cluster, |c| {
        c.public_access = Some(public_access);
        c.private_access = Some(private_access);
    })
    .await?;
    if !check_config {
        return Ok(accepted);
    }
    let desired = accepted.desired();
    expect_config(
        "access flags in the accepted config",
        desired.public_access == Some(public_access)
            && desired.private_access == Some(private_access),
        (public_access, private_access),
        (desired.public_access, desired.private_access),
    )?;
    wait_for_upstream(
        client,
        &accepted.id,
        "the access changes to appear in the upstream spec",
        ConvergenceWindow::METADATA,
        Condition::equals((Some(public_access), Some(private_access))),
        |u| (u.public_access, u.private_access),
    )
    .await
}

/// Appends `sources` to the CIDRs allowed to reach the public endpoint.
pub async fn update_public_access_sources(
    client: &dyn ManagementClient,
    cluster: &ClusterResource,
    sources: &[String],
    check_config: bool,
) -> Result<ClusterResource> {
    info!("Adding public access sources {:?} to '{}'", sources, cluster.name);
    let accepted = update_cluster(client, cluster, |c| {
        c.public_access_sources.extend(sources.iter().cloned())
    })
    .await?;
    if !check_config {
        return Ok(accepted);
    }
    let accepted_sources = accepted.desired().public_access_sources;
    expect_config(
        "public access sources in the accepted config",
        sources.iter().all(|s| accepted_sources.contains(s)),
        sources,
        &accepted_sources,
    )?;
    wait_for_upstream(
        client,
        &accepted.id,
        "the public access sources to appear in the upstream spec",
        ConvergenceWindow::METADATA,
        Condition::contains_all(sources.to_vec()),
        |u| u.public_access_sources.clone(),
    )
    .await
}

/// Replaces the cluster's tags (cluster labels on GKE) with `tags`. Passing the original tags
/// removes any that were added.
pub async fn update_cluster_tags(
    client: &dyn ManagementClient,
    cluster: &ClusterResource,
    tags: &BTreeMap<String, String>,
    check_config: bool,
) -> Result<ClusterResource> {
    info!("Setting tags of '{}' to {:?}", cluster.name, tags);
    let accepted = update_cluster(client, cluster, |c| c.tags = tags.clone()).await?;
    if !check_config {
        return Ok(accepted);
    }
    let accepted_tags = accepted.desired().tags;
    expect_config(
        "tags in the accepted config",
        contains_all_entries(&accepted_tags, tags),
        tags,
        &accepted_tags,
    )?;
    wait_for_upstream(
        client,
        &accepted.id,
        "the cluster tag changes to appear in the upstream spec",
        ConvergenceWindow::METADATA,
        Condition::equals(tags.clone()),
        |u| u.tags.clone(),
    )
    .await
}

/// Replaces the tags and labels of every node group.
pub async fn update_node_group_metadata(
    client: &dyn ManagementClient,
    cluster: &ClusterResource,
    tags: &BTreeMap<String, String>,
    labels: &BTreeMap<String, String>,
    check_config: bool,
) -> Result<ClusterResource> {
    info!(
        "Setting node group tags {:?} and labels {:?} on '{}'",
        tags, labels, cluster.name
    );
    let accepted = update_cluster(client, cluster, |c| {
        for ng in c.node_groups.iter_mut() {
            ng.tags = tags.clone();
            ng.labels = labels.clone();
        }
    })
    .await?;
    if !check_config {
        return Ok(accepted);
    }
    for ng in accepted.desired().node_groups {
        expect_config(
            &format!("metadata of node group '{}' in the accepted config", ng.name),
            contains_all_entries(&ng.tags, tags) && contains_all_entries(&ng.labels, labels),
            (tags, labels),
            (&ng.tags, &ng.labels),
        )?;
    }
    let expected = (tags.clone(), labels.clone());
    wait_for_upstream(
        client,
        &accepted.id,
        "the node group metadata changes to appear in the upstream spec",
        ConvergenceWindow::METADATA,
        Condition::satisfies(
            format!("a node group with tags {:?} and labels {:?}", expected.0, expected.1),
            move |observed: &Vec<(BTreeMap<String, String>, BTreeMap<String, String>)>| {
                observed.contains(&expected)
            },
        ),
        |u| {
            u.node_groups
                .iter()
                .map(|ng| (ng.tags.clone(), ng.labels.clone()))
                .collect::<Vec<_>>()
        },
    )
    .await
}

/// Waits for a newly created or imported cluster to become active with a populated upstream
/// spec.
pub async fn wait_until_cluster_is_ready(
    client: &dyn ManagementClient,
    cluster: &ClusterResource,
) -> Result<ClusterResource> {
    info!("Waiting for cluster '{}' to be ready", cluster.name);
    wait_for_cluster(
        client,
        &cluster.id,
        &format!("cluster '{}' to be active", cluster.name),
        ConvergenceWindow::CLUSTER_READY,
        Condition::equals((true, true)),
        |c| (c.is_active(), c.upstream_spec().is_some()),
    )
    .await
}

/// Waits for the cluster to enter an updating state.
pub async fn wait_cluster_in_upgrade(
    client: &dyn ManagementClient,
    id: &str,
) -> Result<ClusterResource> {
    wait_for_cluster(
        client,
        id,
        "the cluster to start updating",
        ConvergenceWindow::METADATA,
        Condition::equals(true),
        |c| c.is_updating() || c.transitioning == Transitioning::Yes,
    )
    .await
}

/// Waits for an update to run its course: first, briefly, for the cluster to leave the active
/// state, then for it to become active again. An update that finished before the first sample is
/// accepted.
pub async fn wait_cluster_to_be_upgraded(
    client: &dyn ManagementClient,
    id: &str,
) -> Result<ClusterResource> {
    match wait_for_cluster(
        client,
        id,
        "the cluster to start updating",
        ConvergenceWindow::VALIDATION_ERROR,
        Condition::equals(true),
        |c| !c.is_active(),
    )
    .await
    {
        Ok(_) => {}
        Err(e) if e.is_convergence_timeout() => {
            info!("Cluster '{}' did not leave the active state, assuming the update is done", id)
        }
        Err(e) => return Err(e),
    }
    wait_for_cluster(
        client,
        id,
        "the cluster to finish updating",
        ConvergenceWindow::CONTROL_PLANE_UPGRADE,
        Condition::equals(true),
        ClusterResource::is_active,
    )
    .await
}

/// Waits for the control plane to flag the cluster with an error whose message contains any of
/// `needles`. Several needles cope with wording that differs between operator versions.
pub async fn wait_for_transitioning_error(
    client: &dyn ManagementClient,
    id: &str,
    needles: &[&str],
    window: ConvergenceWindow,
) -> Result<ClusterResource> {
    let message = Condition::contains_any(needles);
    wait_for_cluster(
        client,
        id,
        "the expected error to appear on the cluster",
        window,
        Condition::satisfies(
            message.description().to_string(),
            move |(t, m): &(Transitioning, String)| {
                *t == Transitioning::Error && message.is_satisfied_by(m)
            },
        ),
        |c| (c.transitioning, c.transitioning_message.clone()),
    )
    .await
}
