//! The registered scenarios.

mod eks;
mod gke;

use crate::downstream::{proxy_client, wait_for_ready_nodes};
use crate::error::{self, Error, Result};
use crate::scenario::Scenario;
use crate::ScenarioContext;
use hosted_model::{ClusterResource, ConvergenceWindow, Provider};
use log::info;

/// Every scenario, EKS first.
pub fn all() -> Vec<Scenario> {
    let mut scenarios = eks::scenarios();
    scenarios.extend(gke::scenarios());
    scenarios
}

/// Scenarios for `provider` (all providers when `None`) matching any of `filters` (all scenarios
/// when empty). See [`Scenario::matches`].
pub fn select<S: AsRef<str>>(provider: Option<Provider>, filters: &[S]) -> Vec<Scenario> {
    all()
        .into_iter()
        .filter(|s| provider.map(|p| s.provider == p).unwrap_or(true))
        .filter(|s| filters.is_empty() || filters.iter().any(|f| s.matches(f.as_ref())))
        .collect()
}

/// Succeeds only when `result` is a synchronous rejection whose message contains `needle`.
pub(crate) fn expect_rejection<T>(what: &str, result: Result<T>, needle: &str) -> Result<()> {
    match result {
        Err(Error::Rejected { message, .. }) if message.contains(needle) => {
            info!("The {} was rejected as expected: {}", what, message);
            Ok(())
        }
        Err(e) => Err(e),
        Ok(_) => error::UnexpectedConfigSnafu {
            what: format!("response to the {}", what),
            expected: format!("a rejection containing '{}'", needle),
            actual: "the change was accepted",
        }
        .fail(),
    }
}

/// Waits until the downstream cluster, reached through the management API proxy, has at least as
/// many ready nodes as its node groups' desired sizes add up to.
pub(crate) async fn ready_nodes_check(
    ctx: &ScenarioContext,
    cluster: &ClusterResource,
) -> Result<()> {
    let expected: i64 = cluster
        .desired()
        .node_groups
        .iter()
        .map(|ng| ng.desired_size.unwrap_or(0))
        .sum();
    let expected = usize::try_from(expected).unwrap_or(0);
    let rancher = &ctx.config.rancher;
    let client = proxy_client(&rancher.host, &cluster.id, &rancher.admin_token).await?;
    let ready = wait_for_ready_nodes(&client, expected, ConvergenceWindow::NODE_GROUP).await?;
    info!("Cluster '{}' has {} ready nodes", cluster.name, ready);
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn registry_has_unique_names() {
        let scenarios = all();
        let names: HashSet<String> = scenarios.iter().map(Scenario::name).collect();
        assert_eq!(names.len(), scenarios.len());
    }

    #[test]
    fn selects_by_provider_and_filter() {
        let eks = select::<&str>(Some(Provider::Eks), &[]);
        assert!(!eks.is_empty());
        assert!(eks.iter().all(|s| s.provider == Provider::Eks));

        let chosen = select(None, &["141", "300"]);
        let ids: Vec<Option<u32>> = chosen.iter().map(|s| s.case_id).collect();
        assert_eq!(ids, vec![Some(141), Some(300)]);

        assert!(select(Some(Provider::Gke), &["141"]).is_empty());
    }

    #[test]
    fn pending_scenarios_are_registered() {
        assert!(all()
            .iter()
            .any(|s| s.pending && s.case_id == Some(148)));
    }

    #[test]
    fn rejection_matching() {
        let rejected: Result<()> = Err(Error::Rejected {
            what: "update cluster 'a'".to_string(),
            message: "public access, private access, or both must be enabled".to_string(),
        });
        assert!(expect_rejection("access change", rejected, "must be enabled").is_ok());

        let other: Result<()> = Err(Error::Rejected {
            what: "update cluster 'a'".to_string(),
            message: "something else".to_string(),
        });
        assert!(expect_rejection("access change", other, "must be enabled")
            .unwrap_err()
            .is_rejection());

        let accepted: Result<()> = Ok(());
        assert!(matches!(
            expect_rejection("access change", accepted, "must be enabled"),
            Err(Error::UnexpectedConfig { .. })
        ));
    }
}
