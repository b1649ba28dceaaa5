use crate::error::{self, Result};
use crate::settings::Settings;
use hosted_model::clients::wire::{EksClusterConfigSpec, GkeClusterConfigSpec};
use hosted_model::{ClusterConfig, NodeGroupSpec, Provider};
use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt};
use std::fs;
use std::path::Path;

/// The YAML file named by `CATTLE_TEST_CONFIG`.
///
/// ```yaml
/// rancher:
///   host: rancher.example.com
///   adminToken: token-abcde:secret
///   insecure: true
///   cleanup: true
/// eksClusterConfig:
///   region: us-west-2
///   nodeGroups:
///     - nodegroupName: ng
///       instanceType: t3.large
///       desiredSize: 1
///       minSize: 1
///       maxSize: 3
///       diskSize: 20
/// kubernetesVersions:
///   eks: ["1.30", "1.29", "1.28"]
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarnessConfig {
    pub rancher: RancherConfig,
    #[serde(default)]
    pub eks_cluster_config: Option<EksClusterConfigSpec>,
    #[serde(default)]
    pub gke_cluster_config: Option<GkeClusterConfigSpec>,
    #[serde(default)]
    pub kubernetes_versions: KubernetesVersions,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RancherConfig {
    pub host: String,
    pub admin_token: String,
    #[serde(default)]
    pub insecure: bool,
    #[serde(default = "cleanup_default")]
    pub cleanup: bool,
}

fn cleanup_default() -> bool {
    true
}

/// Kubernetes versions each provider offers, in any order.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct KubernetesVersions {
    #[serde(default)]
    pub eks: Vec<String>,
    #[serde(default)]
    pub gke: Vec<String>,
}

impl HarnessConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).context(error::ConfigReadSnafu { path })?;
        serde_yaml::from_str(&contents).context(error::ConfigSnafu { path })
    }

    /// Cluster template for `provider`.
    pub fn template(&self, provider: Provider) -> Result<ClusterConfig> {
        let template = match provider {
            Provider::Eks => self.eks_cluster_config.clone().map(ClusterConfig::from),
            Provider::Gke => self.gke_cluster_config.clone().map(ClusterConfig::from),
        };
        template.context(error::MissingConfigSnafu {
            what: format!("no {} cluster template in the config file", provider),
        })
    }

    /// The first node group of the cluster template, used when adding node groups.
    pub fn node_group_template(&self, provider: Provider) -> Result<NodeGroupSpec> {
        self.template(provider)?
            .node_groups
            .into_iter()
            .next()
            .context(error::MissingConfigSnafu {
                what: format!("the {} cluster template has no node groups", provider),
            })
    }

    pub fn available_versions(&self, provider: Provider) -> &[String] {
        match provider {
            Provider::Eks => &self.kubernetes_versions.eks,
            Provider::Gke => &self.kubernetes_versions.gke,
        }
    }

    /// Whether clusters are deleted after each scenario. `DOWNSTREAM_CLUSTER_CLEANUP` wins over
    /// the config file.
    pub fn cleanup_enabled(&self, settings: &Settings) -> bool {
        settings
            .downstream_cluster_cleanup
            .unwrap_or(self.rancher.cleanup)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    const CONFIG: &str = r#"
rancher:
  host: rancher.example.com
  adminToken: token-abcde:secret
  insecure: true
eksClusterConfig:
  region: us-west-2
  publicAccess: true
  privateAccess: false
  loggingTypes: []
  nodeGroups:
    - nodegroupName: ng
      instanceType: t3.large
      desiredSize: 1
      minSize: 1
      maxSize: 3
      diskSize: 20
kubernetesVersions:
  eks: ["1.28", "1.30", "1.29"]
"#;

    #[test]
    fn loads_templates_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();
        let config = HarnessConfig::load(file.path()).unwrap();
        assert!(config.rancher.insecure);
        assert!(config.rancher.cleanup);
        let template = config.template(Provider::Eks).unwrap();
        assert_eq!(template.region.as_deref(), Some("us-west-2"));
        assert_eq!(template.public_access, Some(true));
        let ng = config.node_group_template(Provider::Eks).unwrap();
        assert_eq!(ng.instance_type.as_deref(), Some("t3.large"));
        assert_eq!(ng.max_size, Some(3));
        assert_eq!(config.available_versions(Provider::Eks).len(), 3);
        assert!(config.template(Provider::Gke).is_err());
        assert!(config.available_versions(Provider::Gke).is_empty());
    }

    #[test]
    fn cleanup_setting_overrides_file() {
        let config: HarnessConfig = serde_yaml::from_str(CONFIG).unwrap();
        let mut settings = Settings::default();
        assert!(config.cleanup_enabled(&settings));
        settings.downstream_cluster_cleanup = Some(false);
        assert!(!config.cleanup_enabled(&settings));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = HarnessConfig::load("/nonexistent/cattle-config.yaml").unwrap_err();
        assert!(matches!(err, crate::Error::ConfigRead { .. }));
    }
}
