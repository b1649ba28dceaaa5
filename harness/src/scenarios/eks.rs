use super::{expect_rejection, ready_nodes_check};
use crate::context::random_name;
use crate::error::{self, Result};
use crate::mutator::{create_hosted_cluster, refresh, update_cluster};
use crate::operations::{
    add_node_groups, expect_config, scale_node_groups, update_access, update_cluster_tags,
    update_logging, update_node_group_metadata, update_public_access_sources,
    upgrade_cluster_kubernetes_version, upgrade_node_kubernetes_version, upstream,
    wait_cluster_in_upgrade, wait_cluster_to_be_upgraded, wait_for_node_group_version,
    wait_for_transitioning_error, wait_for_upstream, wait_until_cluster_is_ready, Checks,
};
use crate::provider::EksResource;
use crate::scenario::{Body, Fixture, Scenario, Setup};
use crate::wait::Condition;
use crate::ScenarioContext;
use futures::future::BoxFuture;
use futures::FutureExt;
use hosted_model::{sorted_descending, ConvergenceWindow, NodeGroupSpec, Provider};
use log::info;
use snafu::OptionExt;
use std::collections::BTreeMap;

const LOGGING_TYPES: [&str; 5] = [
    "api",
    "audit",
    "authenticator",
    "controllerManager",
    "scheduler",
];

const NO_NODE_GROUPS: &str =
    "Cluster must have at least one managed nodegroup or one self-managed node";
// Operator releases word this differently.
const DUPLICATE_NODE_GROUP: [&str; 2] = [
    "is not unique within the cluster",
    "NodePool names must be unique",
];
const VERSION_MISMATCH: &str = "version must match cluster";
const SUBNETS_REQUIRED: &str = "subnets must be provided if security groups are provided";
const INVALID_CIDR: &str =
    "InvalidParameterException: The following CIDRs are invalid in publicAccessCidrs";
const ACCESS_REQUIRED: &str = "public access, private access, or both must be enabled";
const NOT_COMPATIBLE: &str = "not compatible";
const GPU_NODE_GROUP: &str = "gpuenabled";
const GPU_INSTANCE_TYPE: &str = "p2.xlarge";
const GPU_AMI_TYPE: &str = "AL2_x86_64_GPU";

fn scenario(case_id: Option<u32>, title: &'static str, setup: Setup, body: Body) -> Scenario {
    Scenario {
        case_id,
        title,
        provider: Provider::Eks,
        is_upgrade: false,
        pending: false,
        regional: false,
        setup,
        body,
    }
}

pub(super) fn scenarios() -> Vec<Scenario> {
    vec![
        scenario(
            Some(141),
            "should error out to provision a cluster with no nodegroups",
            Setup::None,
            no_node_groups,
        ),
        scenario(
            Some(255),
            "should fail to provision a cluster with duplicate nodegroup names",
            Setup::None,
            duplicate_node_group_names,
        ),
        scenario(
            Some(127),
            "should fail to create a cluster with different k8s versions on control plane and nodegroup",
            Setup::None,
            mismatched_versions,
        ),
        scenario(
            Some(120),
            "should fail to create a cluster with only security groups",
            Setup::None,
            security_groups_without_subnets,
        ),
        scenario(
            Some(147),
            "should fail to update both public and private access as false and invalid access values",
            Setup::ReadyCluster,
            invalid_access,
        ),
        scenario(
            Some(274),
            "should successfully provision a cluster with a GPU enabled nodegroup",
            Setup::None,
            gpu_node_group,
        ),
        Scenario {
            is_upgrade: true,
            ..scenario(
                Some(126),
                "should fail to upgrade the nodegroup beyond the control plane version",
                Setup::ReadyCluster,
                node_group_beyond_control_plane,
            )
        },
        Scenario {
            is_upgrade: true,
            ..scenario(
                Some(125),
                "should upgrade the k8s version of the cluster and replace its nodegroups",
                Setup::ReadyCluster,
                upgrade_and_replace_node_groups,
            )
        },
        // Blocked on the operator accepting updates while another update is in progress.
        Scenario {
            is_upgrade: true,
            pending: true,
            ..scenario(
                Some(148),
                "should successfully update a cluster while it is still in updating state",
                Setup::ReadyCluster,
                update_while_updating,
            )
        },
        scenario(
            Some(128),
            "should update the cluster logging types",
            Setup::ReadyCluster,
            logging,
        ),
        scenario(
            Some(131),
            "should update cluster and nodegroup tags and labels",
            Setup::ReadyCluster,
            tags_and_labels,
        ),
        Scenario {
            is_upgrade: true,
            ..scenario(
                None,
                "should sync control plane and nodegroup upgrades made with eksctl",
                Setup::SyncCluster,
                sync_provider_upgrade,
            )
        },
        Scenario {
            is_upgrade: true,
            ..scenario(
                None,
                "should sync changes made through the management API to EKS",
                Setup::SyncCluster,
                sync_to_provider,
            )
        },
    ]
}

fn no_node_groups<'a>(ctx: &'a ScenarioContext, fx: &'a mut Fixture) -> BoxFuture<'a, Result<()>> {
    async move {
        let mut config = ctx.cluster_config(&fx.k8s_version)?;
        config.node_groups.clear();
        let cluster = create_hosted_cluster(ctx.client(), ctx.provider, config).await?;
        let id = fx.track(cluster).id.clone();
        wait_for_transitioning_error(
            ctx.client(),
            &id,
            &[NO_NODE_GROUPS],
            ConvergenceWindow::PROVISIONING_ERROR,
        )
        .await?;
        Ok(())
    }
    .boxed()
}

fn duplicate_node_group_names<'a>(
    ctx: &'a ScenarioContext,
    fx: &'a mut Fixture,
) -> BoxFuture<'a, Result<()>> {
    async move {
        let mut config = ctx.cluster_config(&fx.k8s_version)?;
        let template = ctx.config.node_group_template(ctx.provider)?;
        config.node_groups = (0..3)
            .map(|_| NodeGroupSpec {
                name: "duplicate".to_string(),
                ..template.clone()
            })
            .collect();
        let cluster = create_hosted_cluster(ctx.client(), ctx.provider, config).await?;
        let id = fx.track(cluster).id.clone();
        wait_for_transitioning_error(
            ctx.client(),
            &id,
            &DUPLICATE_NODE_GROUP,
            ConvergenceWindow::VALIDATION_ERROR,
        )
        .await?;
        Ok(())
    }
    .boxed()
}

fn mismatched_versions<'a>(
    ctx: &'a ScenarioContext,
    fx: &'a mut Fixture,
) -> BoxFuture<'a, Result<()>> {
    async move {
        let versions = sorted_descending(&ctx.available_versions);
        let (node_version, control_plane_version) = match versions.as_slice() {
            [first, second, ..] => (first.to_string(), second.to_string()),
            _ => {
                return error::MissingConfigSnafu {
                    what: "two available EKS versions are needed",
                }
                .fail()
            }
        };
        info!(
            "Kubernetes {} for the control plane and {} for the nodegroups of '{}'",
            control_plane_version, node_version, ctx.cluster_name
        );
        let mut config = ctx.cluster_config(&control_plane_version)?;
        for ng in config.node_groups.iter_mut() {
            ng.version = Some(node_version.clone());
        }
        let cluster = create_hosted_cluster(ctx.client(), ctx.provider, config).await?;
        let id = fx.track(cluster).id.clone();
        wait_for_transitioning_error(
            ctx.client(),
            &id,
            &[VERSION_MISMATCH],
            ConvergenceWindow::VALIDATION_ERROR,
        )
        .await?;
        Ok(())
    }
    .boxed()
}

fn security_groups_without_subnets<'a>(
    ctx: &'a ScenarioContext,
    fx: &'a mut Fixture,
) -> BoxFuture<'a, Result<()>> {
    async move {
        let mut config = ctx.cluster_config(&fx.k8s_version)?;
        config.security_groups = vec![random_name("sg"), random_name("sg")];
        config.subnets.clear();
        let result = create_hosted_cluster(ctx.client(), ctx.provider, config).await;
        if let Ok(cluster) = &result {
            fx.track(cluster.clone());
        }
        expect_rejection("cluster with only security groups", result, SUBNETS_REQUIRED)
    }
    .boxed()
}

fn invalid_access<'a>(ctx: &'a ScenarioContext, fx: &'a mut Fixture) -> BoxFuture<'a, Result<()>> {
    async move {
        let cluster = fx.cluster("update access")?.clone();
        let cidrs = vec![random_name("invalid")];
        if let Err(e) = update_public_access_sources(ctx.client(), &cluster, &cidrs, false).await
        {
            info!("Invalid public access source was refused immediately: {}", e);
        }
        wait_for_transitioning_error(
            ctx.client(),
            &cluster.id,
            &[INVALID_CIDR],
            ConvergenceWindow::INVALID_ENDPOINT,
        )
        .await?;

        let cluster = refresh(ctx.client(), &cluster.id).await?;
        let result = update_access(ctx.client(), &cluster, false, false, false).await;
        expect_rejection("disabling both public and private access", result, ACCESS_REQUIRED)
    }
    .boxed()
}

fn gpu_node_group<'a>(ctx: &'a ScenarioContext, fx: &'a mut Fixture) -> BoxFuture<'a, Result<()>> {
    async move {
        let mut config = ctx.cluster_config(&fx.k8s_version)?;
        let first = config
            .node_groups
            .first()
            .cloned()
            .context(error::MissingConfigSnafu {
                what: "the EKS cluster template has no node groups",
            })?;
        config.node_groups.push(NodeGroupSpec {
            name: GPU_NODE_GROUP.to_string(),
            gpu: Some(true),
            instance_type: Some(GPU_INSTANCE_TYPE.to_string()),
            ..first
        });
        let cluster = create_hosted_cluster(ctx.client(), ctx.provider, config).await?;
        fx.track(cluster.clone());
        let cluster = wait_until_cluster_is_ready(ctx.client(), &cluster).await?;
        ready_nodes_check(ctx, fx.track(cluster)).await?;

        let ami = ctx.eksctl.get(
            EksResource::NodeGroup,
            &ctx.cluster_name,
            ".[].ImageID",
            &["--name", GPU_NODE_GROUP],
        )?;
        expect_config("AMI type of the GPU nodegroup", ami == GPU_AMI_TYPE, GPU_AMI_TYPE, &ami)
    }
    .boxed()
}

fn node_group_beyond_control_plane<'a>(
    ctx: &'a ScenarioContext,
    fx: &'a mut Fixture,
) -> BoxFuture<'a, Result<()>> {
    async move {
        let cluster = fx.cluster("upgrade")?.clone();
        let to = fx.upgrade_to()?;
        info!("Upgrading only the nodegroups of '{}' to {}", cluster.name, to);
        let cluster =
            upgrade_node_kubernetes_version(ctx.client(), &cluster, to, Checks::NONE).await?;
        wait_for_transitioning_error(
            ctx.client(),
            &cluster.id,
            &[NOT_COMPATIBLE],
            ConvergenceWindow::VALIDATION_ERROR,
        )
        .await?;
        Ok(())
    }
    .boxed()
}

fn upgrade_and_replace_node_groups<'a>(
    ctx: &'a ScenarioContext,
    fx: &'a mut Fixture,
) -> BoxFuture<'a, Result<()>> {
    async move {
        let cluster = fx.cluster("upgrade")?.clone();
        let to = fx.upgrade_to()?.to_string();
        let original_len = cluster.desired().node_groups.len();
        let cluster =
            upgrade_cluster_kubernetes_version(ctx.client(), &cluster, &to, true).await?;

        let template = ctx.config.node_group_template(ctx.provider)?;
        let new_name = random_name("ng");
        let replacement = NodeGroupSpec {
            name: new_name.clone(),
            ..template
        };
        let cluster = update_cluster(ctx.client(), &cluster, |c| {
            c.node_groups = vec![replacement]
        })
        .await?;
        let names = cluster.desired().node_group_names();
        expect_config(
            "nodegroups in the accepted config",
            names.len() == original_len && names.iter().all(|n| *n == new_name),
            vec![new_name.clone(); original_len],
            &names,
        )?;

        wait_cluster_to_be_upgraded(ctx.client(), &cluster.id).await?;
        let cluster = wait_for_node_group_version(
            ctx.client(),
            &cluster.id,
            &to,
            ConvergenceWindow::NODE_GROUP,
        )
        .await?;
        fx.track(cluster);
        Ok(())
    }
    .boxed()
}

fn update_while_updating<'a>(
    ctx: &'a ScenarioContext,
    fx: &'a mut Fixture,
) -> BoxFuture<'a, Result<()>> {
    async move {
        let cluster = fx.cluster("upgrade")?.clone();
        let to = fx.upgrade_to()?.to_string();
        let cluster =
            upgrade_cluster_kubernetes_version(ctx.client(), &cluster, &to, false).await?;
        let desired = cluster.desired();
        expect_config(
            "control plane version in the accepted config",
            desired.kubernetes_version.as_deref() == Some(to.as_str()),
            &to,
            &desired.kubernetes_version,
        )?;

        let cluster = wait_cluster_in_upgrade(ctx.client(), &cluster.id).await?;
        let logging_types = ["api"];
        let cluster = update_logging(ctx.client(), &cluster, &logging_types, false).await?;
        let accepted = cluster.desired().logging_types;
        expect_config(
            "logging types in the accepted config",
            accepted == logging_types,
            logging_types,
            &accepted,
        )?;

        wait_cluster_to_be_upgraded(ctx.client(), &cluster.id).await?;
        let expected = (true, Some(to.clone()));
        let cluster = wait_for_upstream(
            ctx.client(),
            &cluster.id,
            "the updated changes to appear in the upstream spec",
            ConvergenceWindow::CONTROL_PLANE_UPGRADE,
            Condition::equals(expected),
            |u| {
                (
                    u.logging_types.iter().any(|t| t == "api"),
                    u.kubernetes_version.clone(),
                )
            },
        )
        .await?;
        fx.track(cluster);
        Ok(())
    }
    .boxed()
}

fn logging<'a>(ctx: &'a ScenarioContext, fx: &'a mut Fixture) -> BoxFuture<'a, Result<()>> {
    async move {
        let cluster = fx.cluster("update logging")?.clone();
        let cluster = update_logging(ctx.client(), &cluster, &LOGGING_TYPES, true).await?;
        let cluster = update_logging(ctx.client(), &cluster, &LOGGING_TYPES[..1], true).await?;
        fx.track(cluster);
        Ok(())
    }
    .boxed()
}

fn without_entries(
    map: &BTreeMap<String, String>,
    removed: &BTreeMap<String, String>,
) -> bool {
    removed.iter().all(|(k, v)| map.get(k) != Some(v))
}

fn tags_and_labels<'a>(ctx: &'a ScenarioContext, fx: &'a mut Fixture) -> BoxFuture<'a, Result<()>> {
    async move {
        let tags: BTreeMap<String, String> = [("foo", "bar"), ("testCaseID", "144-97-143")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let labels: BTreeMap<String, String> = [("testCaseID", "142-99-145")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let cluster = fx.cluster("update tags")?.clone();
        let original_tags = cluster.desired().tags;
        let mut updated_tags = original_tags.clone();
        updated_tags.extend(tags.clone());

        info!("Adding cluster tags");
        let cluster = update_cluster_tags(ctx.client(), &cluster, &updated_tags, true).await?;
        info!("Removing cluster tags");
        let cluster = update_cluster_tags(ctx.client(), &cluster, &original_tags, true).await?;
        let desired_tags = cluster.desired().tags;
        expect_config(
            "cluster tags after removal",
            without_entries(&desired_tags, &tags),
            &original_tags,
            &desired_tags,
        )?;

        let first = cluster
            .desired()
            .node_groups
            .into_iter()
            .next()
            .context(error::MissingConfigSnafu {
                what: "the cluster has no node groups",
            })?;
        let mut updated_labels = first.labels.clone();
        updated_labels.extend(labels.clone());
        let mut updated_ng_tags = first.tags.clone();
        updated_ng_tags.extend(tags.clone());

        info!("Adding nodegroup tags and labels");
        let cluster = update_node_group_metadata(
            ctx.client(),
            &cluster,
            &updated_ng_tags,
            &updated_labels,
            true,
        )
        .await?;
        info!("Removing nodegroup tags and labels");
        let cluster =
            update_node_group_metadata(ctx.client(), &cluster, &first.tags, &first.labels, true)
                .await?;
        for ng in cluster.desired().node_groups {
            expect_config(
                &format!("metadata of nodegroup '{}' after removal", ng.name),
                without_entries(&ng.tags, &tags) && without_entries(&ng.labels, &labels),
                (&first.tags, &first.labels),
                (&ng.tags, &ng.labels),
            )?;
        }
        fx.track(cluster);
        Ok(())
    }
    .boxed()
}

/// Upgrades the control plane, and optionally every nodegroup, with `eksctl`, then waits for the
/// management API to pick the upgrade up.
async fn sync_upgrade_from_provider(
    ctx: &ScenarioContext,
    fx: &mut Fixture,
    upgrade_node_groups: bool,
) -> Result<()> {
    let cluster = fx.cluster("upgrade")?.clone();
    let to = fx.upgrade_to()?.to_string();
    info!("Upgrading '{}' to {} with eksctl", ctx.cluster_name, to);

    ctx.eksctl.upgrade_cluster(&ctx.cluster_name, &to)?;
    let cluster = wait_for_upstream(
        ctx.client(),
        &cluster.id,
        "k8s upgrade to appear in the upstream spec",
        ConvergenceWindow::PROVIDER_SYNC,
        Condition::equals(Some(to.clone())),
        |u| u.kubernetes_version.clone(),
    )
    .await?;
    // Imported clusters keep an empty desired config.
    if !fx.imported {
        for ng in cluster.desired().node_groups {
            expect_config(
                &format!("version of nodegroup '{}' in the desired config", ng.name),
                ng.version.as_deref() == Some(fx.k8s_version.as_str()),
                &fx.k8s_version,
                &ng.version,
            )?;
        }
    }
    fx.track(cluster.clone());
    if !upgrade_node_groups {
        return Ok(());
    }

    for ng in upstream(&cluster).node_groups {
        ctx.eksctl
            .upgrade_node_group(&ctx.cluster_name, &ng.name, &to)?;
    }
    let cluster = wait_for_node_group_version(
        ctx.client(),
        &cluster.id,
        &to,
        ConvergenceWindow::PROVIDER_SYNC,
    )
    .await?;
    if !fx.imported {
        let desired = cluster.desired();
        expect_config(
            "control plane version in the desired config",
            desired.kubernetes_version.as_deref() == Some(to.as_str()),
            &to,
            &desired.kubernetes_version,
        )?;
        for ng in &desired.node_groups {
            expect_config(
                &format!("version of nodegroup '{}' in the desired config", ng.name),
                ng.version.as_deref() == Some(to.as_str()),
                &to,
                &ng.version,
            )?;
        }
    }
    fx.track(cluster);
    Ok(())
}

fn sync_provider_upgrade<'a>(
    ctx: &'a ScenarioContext,
    fx: &'a mut Fixture,
) -> BoxFuture<'a, Result<()>> {
    sync_upgrade_from_provider(ctx, fx, true).boxed()
}

fn eks_value(ctx: &ScenarioContext, resource: EksResource, query: &str) -> Result<String> {
    ctx.eksctl.get(resource, &ctx.cluster_name, query, &[])
}

fn sync_to_provider<'a>(ctx: &'a ScenarioContext, fx: &'a mut Fixture) -> BoxFuture<'a, Result<()>> {
    async move {
        let cluster = fx.cluster("update")?.clone();
        let to = fx.upgrade_to()?.to_string();
        let node_group_count = cluster.desired().node_groups.len();
        let initial_size = cluster
            .desired()
            .node_groups
            .first()
            .and_then(|ng| ng.desired_size)
            .unwrap_or(1);

        sync_upgrade_from_provider(ctx, fx, false).await?;
        let cluster = fx.cluster("scale")?.clone();

        info!("Scaling up the nodegroup");
        let cluster =
            scale_node_groups(ctx.client(), &cluster, initial_size + 1, Checks::ALL).await?;
        let desired = cluster.desired();
        expect_config(
            "nodegroup count in the desired config",
            desired.node_groups.len() == node_group_count,
            node_group_count,
            desired.node_groups.len(),
        )?;
        for ng in &desired.node_groups {
            expect_config(
                &format!("version of nodegroup '{}' in the desired config", ng.name),
                ng.version.as_deref() == Some(fx.k8s_version.as_str()),
                &fx.k8s_version,
                &ng.version,
            )?;
        }
        let version = eks_value(ctx, EksResource::Cluster, "'.[]|.Version'")?;
        expect_config("EKS control plane version", version == to, &to, &version)?;
        let count = eks_value(ctx, EksResource::NodeGroup, "'.|length'")?;
        expect_config(
            "EKS nodegroup count",
            count == node_group_count.to_string(),
            node_group_count,
            &count,
        )?;
        let capacities = eks_value(ctx, EksResource::NodeGroup, "'.[]|.DesiredCapacity'")?;
        let expected = (initial_size + 1).to_string();
        expect_config(
            "EKS nodegroup desired capacity",
            capacities.lines().all(|c| c == expected),
            &expected,
            &capacities,
        )?;

        info!("Adding a nodegroup");
        let template = ctx.config.node_group_template(ctx.provider)?;
        let cluster = add_node_groups(ctx.client(), &cluster, 1, &template, Checks::ALL).await?;
        let desired = cluster.desired();
        expect_config(
            "control plane version in the desired config",
            desired.kubernetes_version.as_deref() == Some(to.as_str()),
            &to,
            &desired.kubernetes_version,
        )?;
        expect_config(
            "logging types in the desired config",
            desired.logging_types != LOGGING_TYPES,
            "logging left unchanged",
            &desired.logging_types,
        )?;
        let count = eks_value(ctx, EksResource::NodeGroup, "'.|length'")?;
        expect_config(
            "EKS nodegroup count",
            count == (node_group_count + 1).to_string(),
            node_group_count + 1,
            &count,
        )?;

        info!("Adding the logging types");
        let cluster = update_logging(ctx.client(), &cluster, &LOGGING_TYPES, true).await?;
        let desired = cluster.desired();
        expect_config(
            "nodegroup count in the desired config",
            desired.node_groups.len() == node_group_count + 1,
            node_group_count + 1,
            desired.node_groups.len(),
        )?;
        let count = eks_value(ctx, EksResource::NodeGroup, "'.|length'")?;
        expect_config(
            "EKS nodegroup count",
            count == (node_group_count + 1).to_string(),
            node_group_count + 1,
            &count,
        )?;
        fx.track(cluster);
        Ok(())
    }
    .boxed()
}
