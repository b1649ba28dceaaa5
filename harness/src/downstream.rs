/*!

Checks against the downstream (workload) cluster itself, reached either through the management
API's cluster proxy or through a kubeconfig written by a provider CLI.

!*/

use crate::error::{self, Result};
use crate::wait::{poll_until, Condition};
use hosted_model::ConvergenceWindow;
use k8s_openapi::api::core::v1::Node;
use kube::api::ListParams;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config};
use log::debug;
use snafu::ResultExt;
use std::convert::TryFrom;
use std::path::Path;

/// A kubeconfig that reaches cluster `cluster_id` through the management API proxy at `host`,
/// authenticating with `token`.
pub fn proxy_kubeconfig(host: &str, cluster_id: &str, token: &str) -> String {
    let host = host
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/');
    format!(
        r#"apiVersion: v1
kind: Config
clusters:
  - name: {id}
    cluster:
      server: "https://{host}/k8s/clusters/{id}"
users:
  - name: {id}
    user:
      token: "{token}"
contexts:
  - name: {id}
    context:
      cluster: {id}
      user: {id}
current-context: {id}
"#,
        id = cluster_id,
        host = host,
        token = token
    )
}

async fn client_from(kubeconfig: Kubeconfig, what: &str) -> Result<Client> {
    let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .context(error::KubeconfigSnafu { what })?;
    Client::try_from(config).context(error::KubeSnafu {
        what: format!("create a client for {}", what),
    })
}

/// A client for cluster `cluster_id` through the management API proxy.
pub async fn proxy_client(host: &str, cluster_id: &str, token: &str) -> Result<Client> {
    let what = format!("cluster '{}'", cluster_id);
    let kubeconfig = Kubeconfig::from_yaml(&proxy_kubeconfig(host, cluster_id, token))
        .context(error::KubeconfigSnafu { what: what.as_str() })?;
    client_from(kubeconfig, &what).await
}

/// A client from a kubeconfig file, such as the one `eksctl create cluster` writes.
pub async fn client_from_kubeconfig(path: &Path) -> Result<Client> {
    let what = format!("'{}'", path.display());
    let kubeconfig =
        Kubeconfig::read_from(path).context(error::KubeconfigSnafu { what: what.as_str() })?;
    client_from(kubeconfig, &what).await
}

/// `true` when the node reports a `Ready` condition with status `True`.
pub fn is_node_ready(node: &Node) -> bool {
    node.status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
        .unwrap_or(false)
}

pub async fn ready_node_count(client: &Client) -> Result<usize> {
    let nodes = Api::<Node>::all(client.clone())
        .list(&ListParams::default())
        .await
        .context(error::KubeSnafu {
            what: "list nodes",
        })?;
    let ready = nodes.items.iter().filter(|n| is_node_ready(n)).count();
    debug!("{} of {} nodes are ready", ready, nodes.items.len());
    Ok(ready)
}

/// Waits until at least `count` nodes are ready.
pub async fn wait_for_ready_nodes(
    client: &Client,
    count: usize,
    window: ConvergenceWindow,
) -> Result<usize> {
    let condition = Condition::satisfies(
        format!("at least {} ready nodes", count),
        move |ready: &usize| *ready >= count,
    );
    poll_until("nodes to become ready", window, &condition, move || {
        ready_node_count(client)
    })
    .await
}

#[cfg(test)]
mod test {
    use super::*;
    use k8s_openapi::api::core::v1::{NodeCondition, NodeStatus};

    fn node(conditions: &[(&str, &str)]) -> Node {
        Node {
            status: Some(NodeStatus {
                conditions: Some(
                    conditions
                        .iter()
                        .map(|(type_, status)| NodeCondition {
                            type_: type_.to_string(),
                            status: status.to_string(),
                            ..Default::default()
                        })
                        .collect(),
                ),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn ready_condition() {
        assert!(is_node_ready(&node(&[
            ("MemoryPressure", "False"),
            ("Ready", "True")
        ])));
        assert!(!is_node_ready(&node(&[("Ready", "False")])));
        assert!(!is_node_ready(&node(&[("Ready", "Unknown")])));
        assert!(!is_node_ready(&node(&[])));
        assert!(!is_node_ready(&Node::default()));
    }

    #[test]
    fn proxy_kubeconfig_parses() {
        let text = proxy_kubeconfig("https://rancher.example.com/", "c-abc12", "token-x:secret");
        assert!(text.contains("server: \"https://rancher.example.com/k8s/clusters/c-abc12\""));
        let kubeconfig = Kubeconfig::from_yaml(&text).unwrap();
        assert_eq!(kubeconfig.current_context.as_deref(), Some("c-abc12"));
        assert_eq!(kubeconfig.clusters.len(), 1);
    }
}
