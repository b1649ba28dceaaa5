use crate::clients::Result;
use crate::ClusterResource;
use serde::{Deserialize, Serialize};

/// An API token minted by the management API, used to build kubeconfigs for downstream clusters.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// The bearer value, `<name>:<secret>`. Only returned when the token is created.
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub description: String,
}

/// The operations the harness needs from the management API. Implementations must be usable from
/// several tasks at once.
#[async_trait::async_trait]
pub trait ManagementClient: Send + Sync {
    /// Submits a new cluster. Configuration the API refuses outright is returned as a rejection
    /// (see [`crate::clients::Error::is_rejection`]) and no cluster is created.
    async fn create(&self, cluster: &ClusterResource) -> Result<ClusterResource>;

    /// Replaces the desired configuration of an existing cluster. `cluster.id` selects the
    /// target. A rejected update leaves the stored cluster unchanged.
    async fn update(&self, cluster: &ClusterResource) -> Result<ClusterResource>;

    async fn delete(&self, id: &str) -> Result<()>;

    async fn get_by_id(&self, id: &str) -> Result<ClusterResource>;

    async fn create_token(&self, description: &str) -> Result<Token>;

    /// Kubernetes versions offered for clusters like `template`, in no particular order. Empty
    /// when the API does not publish versions for the template's provider.
    async fn kubernetes_versions(&self, template: &ClusterResource) -> Result<Vec<String>>;
}
