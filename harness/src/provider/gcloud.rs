use crate::error::{self, Result};
use crate::provider::command::run;
use crate::provider::{query, Location};
use log::info;
use serde_json::Value;
use snafu::ResultExt;

/// What `gcloud` describes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GkeResource {
    Cluster,
    NodePools,
}

/// Drives GKE clusters directly through `gcloud container`.
#[derive(Clone, Debug)]
pub struct Gcloud {
    program: String,
    project: Option<String>,
}

impl Gcloud {
    pub fn new<S: Into<String>>(program: S, project: Option<String>) -> Self {
        Self {
            program: program.into(),
            project,
        }
    }

    fn with_common_flags(&self, mut args: Vec<String>, location: &Location) -> Vec<String> {
        args.push(location.flag());
        if let Some(project) = &self.project {
            args.push(format!("--project={}", project));
        }
        args
    }

    /// Describes the cluster or lists its node pools as JSON and extracts `query` from it.
    pub fn get(
        &self,
        resource: GkeResource,
        cluster_name: &str,
        location: &Location,
        query: &str,
    ) -> Result<String> {
        let args = match resource {
            GkeResource::Cluster => vec![
                "container".to_string(),
                "clusters".to_string(),
                "describe".to_string(),
                cluster_name.to_string(),
            ],
            GkeResource::NodePools => vec![
                "container".to_string(),
                "node-pools".to_string(),
                "list".to_string(),
                format!("--cluster={}", cluster_name),
            ],
        };
        let mut args = self.with_common_flags(args, location);
        args.push("--format=json".to_string());
        let stdout = run(&self.program, &args)?;
        let json: Value = serde_json::from_str(&stdout).context(error::SerdeSnafu {
            what: format!("gcloud output for '{}'", cluster_name),
        })?;
        query::extract(query, &json)
    }

    pub fn upgrade_control_plane(
        &self,
        cluster_name: &str,
        location: &Location,
        k8s_version: &str,
    ) -> Result<()> {
        info!("Upgrading GKE cluster '{}' control plane", cluster_name);
        let mut args = self.with_common_flags(
            vec![
                "container".to_string(),
                "clusters".to_string(),
                "upgrade".to_string(),
                cluster_name.to_string(),
                "--master".to_string(),
                format!("--cluster-version={}", k8s_version),
            ],
            location,
        );
        args.push("--quiet".to_string());
        run(&self.program, &args)?;
        Ok(())
    }

    pub fn upgrade_node_pool(
        &self,
        cluster_name: &str,
        node_pool: &str,
        location: &Location,
        k8s_version: &str,
    ) -> Result<()> {
        info!(
            "Upgrading node pool '{}' of GKE cluster '{}'",
            node_pool, cluster_name
        );
        let mut args = self.with_common_flags(
            vec![
                "container".to_string(),
                "clusters".to_string(),
                "upgrade".to_string(),
                cluster_name.to_string(),
                format!("--node-pool={}", node_pool),
                format!("--cluster-version={}", k8s_version),
            ],
            location,
        );
        args.push("--quiet".to_string());
        run(&self.program, &args)?;
        Ok(())
    }
}
