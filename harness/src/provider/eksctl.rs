use crate::env_guard::EnvVarGuard;
use crate::error::{self, Result};
use crate::provider::command::run;
use crate::provider::query;
use hosted_model::constants::{EKSCTL_NODE_GROUP_NAME, ENV_KUBECONFIG};
use log::info;
use serde_json::Value;
use snafu::ResultExt;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// What `eksctl get` describes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EksResource {
    Cluster,
    NodeGroup,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NodeGroupOperation {
    Create,
    Delete,
}

impl NodeGroupOperation {
    fn verb(&self) -> &'static str {
        match self {
            NodeGroupOperation::Create => "create",
            NodeGroupOperation::Delete => "delete",
        }
    }
}

/// Drives EKS clusters directly through `eksctl`, bypassing the management API.
#[derive(Clone, Debug)]
pub struct Eksctl {
    program: String,
    region: String,
    kubeconfig_dir: PathBuf,
}

impl Eksctl {
    /// `kubeconfig_dir` is where kubeconfigs for clusters created by [`Eksctl::create_cluster`]
    /// are written.
    pub fn new<S1, S2, P>(program: S1, region: S2, kubeconfig_dir: P) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        P: Into<PathBuf>,
    {
        Self {
            program: program.into(),
            region: region.into(),
            kubeconfig_dir: kubeconfig_dir.into(),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// The kubeconfig `eksctl` writes for `cluster_name`.
    pub fn downstream_kubeconfig(&self, cluster_name: &str) -> PathBuf {
        self.kubeconfig_dir
            .join(format!("{}.kubeconfig", cluster_name))
    }

    fn region_flag(&self) -> String {
        format!("--region={}", self.region)
    }

    /// Creates a cluster with a single node group of `nodes` nodes. `KUBECONFIG` points at the
    /// cluster's own kubeconfig while `eksctl` runs so that the caller's kubeconfig is left alone.
    pub fn create_cluster(
        &self,
        cluster_name: &str,
        k8s_version: &str,
        nodes: u32,
        tags: &BTreeMap<String, String>,
        extra_args: &[&str],
    ) -> Result<()> {
        let _kubeconfig = EnvVarGuard::set(ENV_KUBECONFIG, self.downstream_kubeconfig(cluster_name));
        info!("Creating EKS cluster '{}'", cluster_name);
        let mut args = vec![
            "create".to_string(),
            "cluster".to_string(),
            self.region_flag(),
            format!("--name={}", cluster_name),
            format!("--version={}", k8s_version),
            "--nodegroup-name".to_string(),
            EKSCTL_NODE_GROUP_NAME.to_string(),
            "--nodes".to_string(),
            nodes.to_string(),
            "--tags".to_string(),
            format_tags(tags),
        ];
        args.extend(extra_args.iter().map(|a| a.to_string()));
        run(&self.program, &args)?;
        info!("Created EKS cluster '{}'", cluster_name);
        Ok(())
    }

    pub fn upgrade_cluster(&self, cluster_name: &str, k8s_version: &str) -> Result<()> {
        info!("Upgrading EKS cluster '{}' control plane", cluster_name);
        run(
            &self.program,
            &[
                "upgrade".to_string(),
                "cluster".to_string(),
                self.region_flag(),
                format!("--name={}", cluster_name),
                format!("--version={}", k8s_version),
                "--approve".to_string(),
            ],
        )?;
        Ok(())
    }

    pub fn add_node_group(
        &self,
        cluster_name: &str,
        node_group: &str,
        extra_args: &[&str],
    ) -> Result<()> {
        info!("Adding node group '{}' to EKS cluster '{}'", node_group, cluster_name);
        let mut args = vec![
            "create".to_string(),
            "nodegroup".to_string(),
            self.region_flag(),
            "--cluster".to_string(),
            cluster_name.to_string(),
            "--name".to_string(),
            node_group.to_string(),
        ];
        args.extend(extra_args.iter().map(|a| a.to_string()));
        run(&self.program, &args)?;
        Ok(())
    }

    pub fn upgrade_node_group(
        &self,
        cluster_name: &str,
        node_group: &str,
        k8s_version: &str,
    ) -> Result<()> {
        info!("Upgrading node group '{}' of EKS cluster '{}'", node_group, cluster_name);
        run(
            &self.program,
            &[
                "upgrade".to_string(),
                "nodegroup".to_string(),
                self.region_flag(),
                format!("--name={}", node_group),
                format!("--cluster={}", cluster_name),
                format!("--kubernetes-version={}", k8s_version),
            ],
        )?;
        Ok(())
    }

    /// Describes the cluster or its node groups as JSON and extracts `query` from it.
    pub fn get(
        &self,
        resource: EksResource,
        cluster_name: &str,
        query: &str,
        extra_args: &[&str],
    ) -> Result<String> {
        let mut args = match resource {
            EksResource::Cluster => vec![
                "get".to_string(),
                "cluster".to_string(),
                self.region_flag(),
                format!("--name={}", cluster_name),
                "-ojson".to_string(),
            ],
            EksResource::NodeGroup => vec![
                "get".to_string(),
                "nodegroup".to_string(),
                self.region_flag(),
                format!("--cluster={}", cluster_name),
                "-ojson".to_string(),
            ],
        };
        args.extend(extra_args.iter().map(|a| a.to_string()));
        let stdout = run(&self.program, &args)?;
        let json: Value = serde_json::from_str(&stdout).context(error::SerdeSnafu {
            what: format!("eksctl output for '{}'", cluster_name),
        })?;
        query::extract(query, &json)
    }

    /// Creates or deletes a single node group. Deletion skips pod eviction.
    pub fn modify_node_group(
        &self,
        operation: NodeGroupOperation,
        cluster_name: &str,
        node_group: &str,
        extra_args: &[&str],
    ) -> Result<()> {
        let mut args = vec![
            operation.verb().to_string(),
            "nodegroup".to_string(),
            self.region_flag(),
            format!("--name={}", node_group),
            format!("--cluster={}", cluster_name),
        ];
        if operation == NodeGroupOperation::Delete {
            args.push("--disable-eviction".to_string());
        }
        args.extend(extra_args.iter().map(|a| a.to_string()));
        run(&self.program, &args)?;
        Ok(())
    }

    /// Deletes every node group and then the cluster itself. `KUBECONFIG` is restored and the
    /// cluster's kubeconfig removed whether or not deletion succeeds.
    pub fn delete_cluster(&self, cluster_name: &str) -> Result<()> {
        let downstream = self.downstream_kubeconfig(cluster_name);
        let _cleanup = RemoveOnDrop(&downstream);
        let _kubeconfig = EnvVarGuard::set(ENV_KUBECONFIG, &downstream);

        info!("Deleting all node groups of EKS cluster '{}'", cluster_name);
        let names = self.get(EksResource::NodeGroup, cluster_name, ".[].Name", &[])?;
        for name in names.lines().map(str::trim).filter(|n| !n.is_empty()) {
            self.modify_node_group(NodeGroupOperation::Delete, cluster_name, name, &["--wait"])?;
        }

        info!("Deleting EKS cluster '{}'", cluster_name);
        run(
            &self.program,
            &[
                "delete".to_string(),
                "cluster".to_string(),
                self.region_flag(),
                format!("--name={}", cluster_name),
            ],
        )?;
        info!("Deleted EKS cluster '{}'", cluster_name);
        Ok(())
    }
}

struct RemoveOnDrop<'a>(&'a Path);

impl Drop for RemoveOnDrop<'_> {
    fn drop(&mut self) {
        let _ = fs::remove_file(self.0);
    }
}

/// Formats tags as a sorted label selector, `k1=v1,k2=v2`.
pub fn format_tags(tags: &BTreeMap<String, String>) -> String {
    tags.iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod test {
    use super::*;
    use maplit::btreemap;

    #[test]
    fn tags_are_sorted() {
        let tags = btreemap! {
            "owner".to_string() => "hosted".to_string(),
            "cluster-name".to_string() => "abc".to_string(),
        };
        assert_eq!(format_tags(&tags), "cluster-name=abc,owner=hosted");
        assert_eq!(format_tags(&BTreeMap::new()), "");
    }

    #[test]
    fn downstream_kubeconfig_is_per_cluster() {
        let eksctl = Eksctl::new("eksctl", "us-west-2", "/tmp/kube");
        assert_eq!(
            eksctl.downstream_kubeconfig("one"),
            PathBuf::from("/tmp/kube/one.kubeconfig")
        );
    }
}
