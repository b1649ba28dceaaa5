/*!

The desired-state mutator: applies one change to a cluster's desired configuration and submits it.
What comes back is the configuration the management API accepted, which may differ from what was
sent when the API applies defaults. Synchronous refusals surface as [`crate::Error::Rejected`],
never as a convergence timeout.

!*/

use crate::error::{Error, Result};
use crate::wait::poll_until_true;
use hosted_model::clients::{HttpStatusCode, ManagementClient, StatusCode};
use hosted_model::{ClusterConfig, ClusterResource, ConvergenceWindow, Provider};
use log::{debug, info};

/// Fetches the current state of cluster `id`.
pub async fn refresh(client: &dyn ManagementClient, id: &str) -> Result<ClusterResource> {
    client
        .get_by_id(id)
        .await
        .map_err(|e| Error::from_client(format!("get cluster '{}'", id), e))
}

/// Applies `transform` to a copy of `cluster`'s desired configuration and submits the result.
/// Updates are submitted even while a previous update is still being reconciled.
pub async fn update_cluster<F>(
    client: &dyn ManagementClient,
    cluster: &ClusterResource,
    transform: F,
) -> Result<ClusterResource>
where
    F: FnOnce(&mut ClusterConfig),
{
    let mut desired = cluster.clone();
    let mut config = cluster.desired();
    transform(&mut config);
    desired.config = Some(config);
    if cluster.is_updating() {
        debug!(
            "Cluster '{}' is still '{}', submitting the update anyway",
            cluster.name, cluster.state
        );
    }
    client
        .update(&desired)
        .await
        .map_err(|e| Error::from_client(format!("update cluster '{}'", cluster.name), e))
}

/// Submits a new hosted cluster named after `config.display_name`.
pub async fn create_hosted_cluster(
    client: &dyn ManagementClient,
    provider: Provider,
    config: ClusterConfig,
) -> Result<ClusterResource> {
    let name = config.display_name.clone();
    info!("Creating {} cluster '{}'", provider, name);
    let cluster = ClusterResource {
        name: name.clone(),
        provider,
        config: Some(config),
        ..Default::default()
    };
    client
        .create(&cluster)
        .await
        .map_err(|e| Error::from_client(format!("create cluster '{}'", name), e))
}

/// Registers a cluster that already exists on the provider. Only the fields needed to find the
/// cluster are sent.
pub async fn import_hosted_cluster(
    client: &dyn ManagementClient,
    provider: Provider,
    template: &ClusterConfig,
) -> Result<ClusterResource> {
    let config = ClusterConfig {
        display_name: template.display_name.clone(),
        cloud_credential: template.cloud_credential.clone(),
        imported: true,
        region: template.region.clone(),
        zone: template.zone.clone(),
        project_id: template.project_id.clone(),
        ..Default::default()
    };
    info!("Importing {} cluster '{}'", provider, config.display_name);
    create_hosted_cluster(client, provider, config).await
}

pub async fn delete_hosted_cluster(
    client: &dyn ManagementClient,
    cluster: &ClusterResource,
) -> Result<()> {
    info!("Deleting cluster '{}' ({})", cluster.name, cluster.id);
    client
        .delete(&cluster.id)
        .await
        .map_err(|e| Error::from_client(format!("delete cluster '{}'", cluster.name), e))
}

/// Waits until the management API no longer knows cluster `id`.
pub async fn wait_for_deletion(
    client: &dyn ManagementClient,
    id: &str,
    window: ConvergenceWindow,
) -> Result<()> {
    poll_until_true(&format!("cluster '{}' to be deleted", id), window, move || async move {
        match client.get_by_id(id).await {
            Ok(_) => Ok(false),
            Err(e) if e.is_status_code(StatusCode::NOT_FOUND) => Ok(true),
            Err(e) => Err(Error::from_client(format!("get cluster '{}'", id), e)),
        }
    })
    .await
}
