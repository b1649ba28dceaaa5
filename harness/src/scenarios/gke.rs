use super::ready_nodes_check;
use crate::error::{self, Result};
use crate::operations::{
    add_node_groups, delete_node_group, expect_config, scale_node_groups,
    upgrade_cluster_kubernetes_version, upgrade_node_kubernetes_version, upstream,
    wait_cluster_to_be_upgraded, wait_for_node_group_version, wait_for_upstream, Checks,
};
use crate::provider::GkeResource;
use crate::scenario::{Body, Fixture, Scenario, Setup};
use crate::wait::Condition;
use crate::ScenarioContext;
use futures::future::BoxFuture;
use futures::FutureExt;
use hosted_model::{ConvergenceWindow, K8sVersion, Provider};
use log::info;
use snafu::ResultExt;

fn scenario(
    case_id: Option<u32>,
    title: &'static str,
    is_upgrade: bool,
    regional: bool,
    body: Body,
) -> Scenario {
    Scenario {
        case_id,
        title,
        provider: Provider::Gke,
        is_upgrade,
        pending: false,
        regional,
        setup: Setup::ReadyCluster,
        body,
    }
}

pub(super) fn scenarios() -> Vec<Scenario> {
    vec![
        scenario(
            Some(8),
            "should successfully provision the zonal cluster & add, delete, scale nodepool",
            false,
            false,
            node_pool_checks,
        ),
        scenario(
            Some(11),
            "should be able to upgrade k8s version of the zonal provisioned cluster",
            true,
            false,
            upgrade_checks,
        ),
        scenario(
            Some(300),
            "should successfully provision the regional cluster & add, delete, scale nodepool",
            false,
            true,
            node_pool_checks,
        ),
        scenario(
            Some(301),
            "should be able to upgrade k8s version of the regional provisioned cluster",
            true,
            true,
            upgrade_checks,
        ),
        Scenario {
            setup: Setup::SyncCluster,
            ..scenario(
                None,
                "should sync control plane and nodepool upgrades made with gcloud",
                true,
                false,
                sync_provider_upgrade,
            )
        },
    ]
}

fn node_pool_checks<'a>(ctx: &'a ScenarioContext, fx: &'a mut Fixture) -> BoxFuture<'a, Result<()>> {
    async move {
        let cluster = fx.cluster("scale")?.clone();
        let initial_count = cluster
            .desired()
            .node_groups
            .first()
            .and_then(|ng| ng.desired_size)
            .unwrap_or(1);

        info!("Scaling up the nodepools of '{}'", cluster.name);
        let cluster =
            scale_node_groups(ctx.client(), &cluster, initial_count + 1, Checks::ALL).await?;
        ready_nodes_check(ctx, &cluster).await?;

        info!("Scaling down the nodepools of '{}'", cluster.name);
        let cluster = scale_node_groups(ctx.client(), &cluster, initial_count, Checks::ALL).await?;

        info!("Adding a nodepool to '{}'", cluster.name);
        let template = ctx.config.node_group_template(ctx.provider)?;
        let cluster = add_node_groups(ctx.client(), &cluster, 1, &template, Checks::ALL).await?;

        info!("Deleting a nodepool from '{}'", cluster.name);
        let cluster = delete_node_group(ctx.client(), &cluster, Checks::ALL).await?;
        fx.track(cluster);
        Ok(())
    }
    .boxed()
}

fn upgrade_checks<'a>(ctx: &'a ScenarioContext, fx: &'a mut Fixture) -> BoxFuture<'a, Result<()>> {
    async move {
        let cluster = fx.cluster("upgrade")?.clone();
        let to = fx.upgrade_to()?.to_string();
        let cluster =
            upgrade_cluster_kubernetes_version(ctx.client(), &cluster, &to, true).await?;
        wait_cluster_to_be_upgraded(ctx.client(), &cluster.id).await?;
        let cluster =
            upgrade_node_kubernetes_version(ctx.client(), &cluster, &to, Checks::ALL).await?;
        fx.track(cluster);
        Ok(())
    }
    .boxed()
}

fn sync_provider_upgrade<'a>(
    ctx: &'a ScenarioContext,
    fx: &'a mut Fixture,
) -> BoxFuture<'a, Result<()>> {
    async move {
        let cluster = fx.cluster("upgrade")?.clone();
        let to = fx.upgrade_to()?.to_string();
        let minimum = K8sVersion::parse(&to).context(error::ModelSnafu)?;

        ctx.gcloud
            .upgrade_control_plane(&ctx.cluster_name, &ctx.location, &to)?;
        // GKE may settle on a later patch than the one requested.
        let cluster = wait_for_upstream(
            ctx.client(),
            &cluster.id,
            "k8s upgrade to appear in the upstream spec",
            ConvergenceWindow::PROVIDER_SYNC,
            Condition::at_least_version(&minimum),
            |u| u.kubernetes_version.clone().unwrap_or_default(),
        )
        .await?;
        let reported = ctx.gcloud.get(
            GkeResource::Cluster,
            &ctx.cluster_name,
            &ctx.location,
            ".currentMasterVersion",
        )?;
        let upstream_version = upstream(&cluster).kubernetes_version.unwrap_or_default();
        expect_config(
            "GKE control plane version",
            reported == upstream_version,
            &upstream_version,
            &reported,
        )?;

        for pool in upstream(&cluster).node_groups {
            ctx.gcloud
                .upgrade_node_pool(&ctx.cluster_name, &pool.name, &ctx.location, &to)?;
        }
        let cluster = wait_for_node_group_version(
            ctx.client(),
            &cluster.id,
            &to,
            ConvergenceWindow::PROVIDER_SYNC,
        )
        .await?;
        let pool_versions = ctx.gcloud.get(
            GkeResource::NodePools,
            &ctx.cluster_name,
            &ctx.location,
            ".[].version",
        )?;
        expect_config(
            "GKE nodepool versions",
            pool_versions.lines().all(|v| v == to),
            &to,
            &pool_versions,
        )?;
        fx.track(cluster);
        Ok(())
    }
    .boxed()
}
