use crate::config::HarnessConfig;
use crate::error::{self, Result};
use crate::provider::{Eksctl, Gcloud, Location};
use crate::settings::Settings;
use crate::versions::k8s_version_for;
use hosted_model::clients::{ManagementClient, RancherClient};
use hosted_model::constants::{
    CLUSTER_NAME_PREFIX, ENV_CONFIG_PATH, TAG_CLUSTER_NAME, TAG_OWNER, TAG_OWNER_VALUE,
};
use hosted_model::{ClusterConfig, ClusterResource, Provider};
use log::{debug, info};
use snafu::{OptionExt, ResultExt};
use std::path::PathBuf;
use std::sync::Arc;

/// Appends a short random suffix to `prefix`, e.g. `ng-3fa9c`.
pub fn random_name(prefix: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, &suffix[..5])
}

/// Everything shared by the scenarios of one run.
#[derive(Clone)]
pub struct Harness {
    client: Arc<dyn ManagementClient>,
    settings: Arc<Settings>,
    config: Arc<HarnessConfig>,
    kubeconfig_dir: PathBuf,
}

impl std::fmt::Debug for Harness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Harness")
            .field("settings", &self.settings)
            .field("kubeconfig_dir", &self.kubeconfig_dir)
            .finish()
    }
}

impl Harness {
    pub fn new(
        client: Arc<dyn ManagementClient>,
        settings: Settings,
        config: HarnessConfig,
        kubeconfig_dir: PathBuf,
    ) -> Self {
        Self {
            client,
            settings: Arc::new(settings),
            config: Arc::new(config),
            kubeconfig_dir,
        }
    }

    /// Reads settings from the environment, loads the config file they name and connects to the
    /// management API it describes.
    pub fn from_env() -> Result<Self> {
        let settings = Settings::from_env()?;
        let path = settings
            .cattle_test_config
            .clone()
            .context(error::MissingConfigSnafu {
                what: format!("{} is not set", ENV_CONFIG_PATH),
            })?;
        let config = HarnessConfig::load(&path)?;
        info!(
            "Using management API at '{}' from config '{}'",
            config.rancher.host,
            path.display()
        );
        let client = RancherClient::new(
            &config.rancher.host,
            config.rancher.admin_token.clone(),
            config.rancher.insecure,
        )
        .map_err(|e| error::Error::from_client("create the management API client", e))?;
        let kubeconfig_dir = std::env::temp_dir().join("hosted-e2e");
        std::fs::create_dir_all(&kubeconfig_dir).context(error::IoSnafu {
            what: format!("create '{}'", kubeconfig_dir.display()),
        })?;
        Ok(Self::new(Arc::new(client), settings, config, kubeconfig_dir))
    }

    pub fn client(&self) -> &Arc<dyn ManagementClient> {
        &self.client
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// A fresh context, with a new random cluster name, for one scenario.
    pub fn context(&self, provider: Provider, regional: bool) -> ScenarioContext {
        let location = match provider {
            Provider::Eks => Location::Region(self.settings.eks_region.clone()),
            Provider::Gke if regional => Location::Region(self.settings.gke_region()),
            Provider::Gke => Location::Zone(self.settings.gke_zone.clone()),
        };
        ScenarioContext {
            client: Arc::clone(&self.client),
            settings: Arc::clone(&self.settings),
            config: Arc::clone(&self.config),
            cluster_name: random_name(CLUSTER_NAME_PREFIX),
            available_versions: self.config.available_versions(provider).to_vec(),
            provider,
            location,
            eksctl: Eksctl::new(
                self.settings.eksctl_path.clone(),
                self.settings.eks_region.clone(),
                self.kubeconfig_dir.clone(),
            ),
            gcloud: Gcloud::new(
                self.settings.gcloud_path.clone(),
                self.settings.gke_project_id.clone(),
            ),
        }
    }
}

/// The explicit state a scenario works with: the management client, settings, the cluster
/// templates, the cluster's name and location, and handles to the provider CLIs.
#[derive(Clone)]
pub struct ScenarioContext {
    pub client: Arc<dyn ManagementClient>,
    pub settings: Arc<Settings>,
    pub config: Arc<HarnessConfig>,
    pub cluster_name: String,
    /// Kubernetes versions to choose from, see [`ScenarioContext::load_versions`].
    pub available_versions: Vec<String>,
    pub provider: Provider,
    pub location: Location,
    pub eksctl: Eksctl,
    pub gcloud: Gcloud,
}

impl ScenarioContext {
    pub fn client(&self) -> &dyn ManagementClient {
        self.client.as_ref()
    }

    /// The Kubernetes version for a new cluster, see [`k8s_version_for`].
    pub fn k8s_version(&self, for_upgrade: bool) -> Result<String> {
        k8s_version_for(
            self.settings.downstream_k8s_minor_version.as_deref(),
            &self.available_versions,
            for_upgrade,
        )
    }

    /// Replaces the config file's versions with the ones the management API offers for this
    /// scenario's clusters, when it publishes any.
    pub async fn load_versions(&mut self) -> Result<()> {
        let mut config = self.cluster_config("")?;
        config.kubernetes_version = None;
        let template = ClusterResource {
            name: self.cluster_name.clone(),
            provider: self.provider,
            config: Some(config),
            ..Default::default()
        };
        let offered = self
            .client
            .kubernetes_versions(&template)
            .await
            .map_err(|e| error::Error::from_client("list Kubernetes versions", e))?;
        if !offered.is_empty() {
            debug!("The management API offers {} versions {:?}", self.provider, offered);
            self.available_versions = offered;
        }
        Ok(())
    }

    pub fn cleanup_enabled(&self) -> bool {
        self.config.cleanup_enabled(&self.settings)
    }

    pub fn is_regional(&self) -> bool {
        matches!(self.location, Location::Region(_))
    }

    /// Tags that mark a cluster as created by this harness.
    pub fn common_tags(&self) -> std::collections::BTreeMap<String, String> {
        let mut tags = std::collections::BTreeMap::new();
        tags.insert(TAG_OWNER.to_string(), TAG_OWNER_VALUE.to_string());
        tags.insert(TAG_CLUSTER_NAME.to_string(), self.cluster_name.clone());
        tags
    }

    /// The provider's cluster template with this scenario's name, location, credential, common
    /// tags and `k8s_version` filled in. Node groups are left at the template's versions.
    pub fn cluster_config(&self, k8s_version: &str) -> Result<ClusterConfig> {
        let mut config = self.config.template(self.provider)?;
        config.display_name = self.cluster_name.clone();
        if let Some(credential) = &self.settings.provider_credential_id {
            config.cloud_credential = credential.clone();
        }
        config.kubernetes_version = Some(k8s_version.to_string());
        config.tags.extend(self.common_tags());
        match (&self.provider, &self.location) {
            (Provider::Eks, location) => config.region = Some(location.name().to_string()),
            (Provider::Gke, Location::Region(region)) => {
                config.region = Some(region.clone());
                config.zone = None;
                if !config.locations.contains(&self.settings.gke_zone) {
                    config.locations.push(self.settings.gke_zone.clone());
                }
            }
            (Provider::Gke, Location::Zone(zone)) => {
                config.zone = Some(zone.clone());
                config.region = None;
            }
        }
        if self.provider == Provider::Gke {
            if let Some(project) = &self.settings.gke_project_id {
                config.project_id = Some(project.clone());
            }
        }
        Ok(config)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn random_names_have_prefix_and_differ() {
        let a = random_name("ng");
        let b = random_name("ng");
        assert!(a.starts_with("ng-"));
        assert_eq!(a.len(), "ng-".len() + 5);
        assert_ne!(a, b);
    }
}
