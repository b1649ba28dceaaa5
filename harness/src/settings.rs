use crate::error::{self, Result};
use hosted_model::constants::{DEFAULT_EKS_REGION, DEFAULT_GKE_ZONE};
use serde::Deserialize;
use snafu::ResultExt;
use std::path::PathBuf;

/// Settings passed to the harness through environment variables.
///
/// # Example
///
/// ```text
/// CATTLE_TEST_CONFIG=/path/to/cattle-config.yaml
/// DOWNSTREAM_K8S_MINOR_VERSION=1.29
/// SKIP_UPGRADE_TESTS=true
/// EKS_REGION=eu-west-1
/// ```
///
/// Variable names are matched case-insensitively against the field names.
#[derive(Clone, Debug, Deserialize)]
pub struct Settings {
    /// Pins the Kubernetes version used for new clusters, e.g. `1.29`.
    #[serde(default)]
    pub downstream_k8s_minor_version: Option<String>,

    #[serde(default)]
    pub skip_upgrade_tests: bool,

    /// The kubeconfig of the cluster hosting the management API.
    #[serde(default)]
    pub kubeconfig: Option<PathBuf>,

    /// Path of the YAML config file.
    #[serde(default)]
    pub cattle_test_config: Option<PathBuf>,

    /// Overrides the config file's `rancher.cleanup`.
    #[serde(default)]
    pub downstream_cluster_cleanup: Option<bool>,

    #[serde(default = "default_eks_region")]
    pub eks_region: String,

    #[serde(default = "default_gke_zone")]
    pub gke_zone: String,

    #[serde(default)]
    pub gke_project_id: Option<String>,

    #[serde(default = "eksctl")]
    pub eksctl_path: String,

    #[serde(default = "gcloud")]
    pub gcloud_path: String,

    /// The management API's reference to the cloud credential used for new clusters, e.g.
    /// `cattle-global-data:cc-abcde`.
    #[serde(default)]
    pub provider_credential_id: Option<String>,

    /// Scenarios import clusters created with the provider CLI instead of provisioning them.
    #[serde(default)]
    pub is_import: bool,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        envy::from_env::<Settings>().context(error::SettingsSnafu)
    }

    /// Reads settings from explicit key value pairs instead of the process environment.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        envy::from_iter::<_, Settings>(vars.into_iter().map(|(k, v)| (k.into(), v.into())))
            .context(error::SettingsSnafu)
    }

    /// The GCP region derived from the configured zone, e.g. `asia-south2` for `asia-south2-c`.
    pub fn gke_region(&self) -> String {
        match self.gke_zone.rsplit_once('-') {
            Some((region, suffix)) if suffix.len() == 1 => region.to_string(),
            _ => self.gke_zone.clone(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            downstream_k8s_minor_version: None,
            skip_upgrade_tests: false,
            kubeconfig: None,
            cattle_test_config: None,
            downstream_cluster_cleanup: None,
            eks_region: default_eks_region(),
            gke_zone: default_gke_zone(),
            gke_project_id: None,
            eksctl_path: eksctl(),
            gcloud_path: gcloud(),
            provider_credential_id: None,
            is_import: false,
        }
    }
}

fn default_eks_region() -> String {
    DEFAULT_EKS_REGION.to_string()
}

fn default_gke_zone() -> String {
    DEFAULT_GKE_ZONE.to_string()
}

fn eksctl() -> String {
    String::from("eksctl")
}

fn gcloud() -> String {
    String::from("gcloud")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_when_unset() {
        let settings = Settings::from_vars(Vec::<(String, String)>::new()).unwrap();
        assert_eq!(settings.eks_region, "us-west-2");
        assert_eq!(settings.gke_zone, "asia-south2-c");
        assert_eq!(settings.gke_region(), "asia-south2");
        assert_eq!(settings.eksctl_path, "eksctl");
        assert!(!settings.skip_upgrade_tests);
        assert!(settings.downstream_k8s_minor_version.is_none());
        assert!(settings.downstream_cluster_cleanup.is_none());
    }

    #[test]
    fn reads_overrides() {
        let settings = Settings::from_vars(vec![
            ("DOWNSTREAM_K8S_MINOR_VERSION", "1.28"),
            ("SKIP_UPGRADE_TESTS", "true"),
            ("DOWNSTREAM_CLUSTER_CLEANUP", "false"),
            ("EKS_REGION", "eu-west-1"),
            ("IS_IMPORT", "true"),
            ("EKSCTL_PATH", "/opt/bin/eksctl"),
        ])
        .unwrap();
        assert_eq!(settings.downstream_k8s_minor_version.as_deref(), Some("1.28"));
        assert!(settings.skip_upgrade_tests);
        assert_eq!(settings.downstream_cluster_cleanup, Some(false));
        assert_eq!(settings.eks_region, "eu-west-1");
        assert!(settings.is_import);
        assert_eq!(settings.eksctl_path, "/opt/bin/eksctl");
    }

    #[test]
    fn bad_boolean_is_an_error() {
        assert!(Settings::from_vars(vec![("SKIP_UPGRADE_TESTS", "maybe")]).is_err());
    }
}
