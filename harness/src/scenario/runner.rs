use super::{Fixture, Outcome, Reporter, Scenario, ScenarioReport, Setup};
use crate::context::{Harness, ScenarioContext};
use crate::error::Result;
use crate::mutator::{create_hosted_cluster, delete_hosted_cluster, import_hosted_cluster};
use crate::operations::wait_until_cluster_is_ready;
use hosted_model::Provider;
use log::{error, info};
use std::time::Instant;

/// Nodes in the single node group of clusters created with `eksctl` for import.
const IMPORT_NODE_COUNT: u32 = 1;

/// Runs scenarios one after another and reports each outcome.
pub struct Runner {
    harness: Harness,
    reporters: Vec<Box<dyn Reporter>>,
}

impl Runner {
    pub fn new(harness: Harness) -> Self {
        Self {
            harness,
            reporters: Vec::new(),
        }
    }

    pub fn with_reporter<R: Reporter + 'static>(mut self, reporter: R) -> Self {
        self.reporters.push(Box::new(reporter));
        self
    }

    pub fn harness(&self) -> &Harness {
        &self.harness
    }

    /// Runs every scenario in order. A failing scenario does not stop the run; a failing reporter
    /// does.
    pub async fn run(&mut self, scenarios: &[Scenario]) -> Result<Vec<ScenarioReport>> {
        let mut reports = Vec::with_capacity(scenarios.len());
        for scenario in scenarios {
            let report = self.run_one(scenario).await;
            for reporter in self.reporters.iter_mut() {
                reporter.report(&report)?;
            }
            reports.push(report);
        }
        Ok(reports)
    }

    async fn run_one(&self, scenario: &Scenario) -> ScenarioReport {
        let mut report = ScenarioReport {
            case_id: scenario.case_id,
            title: scenario.title.to_string(),
            provider: scenario.provider,
            cluster_name: None,
            outcome: Outcome::Passed,
            elapsed: Default::default(),
        };
        if scenario.pending {
            report.outcome = Outcome::Skipped("pending".to_string());
            return report;
        }
        if scenario.is_upgrade && self.harness.settings().skip_upgrade_tests {
            report.outcome = Outcome::Skipped("upgrade tests are disabled".to_string());
            return report;
        }

        let mut ctx = self.harness.context(scenario.provider, scenario.regional);
        report.cluster_name = Some(ctx.cluster_name.clone());
        info!("Running '{}' on cluster '{}'", scenario.title, ctx.cluster_name);
        let start = Instant::now();

        let mut fixture = Fixture::default();
        let result = match prepare(&mut ctx, scenario, &mut fixture).await {
            Ok(()) => (scenario.body)(&ctx, &mut fixture).await,
            Err(e) => Err(e),
        };
        let cleanup = cleanup(&ctx, &fixture).await;

        report.elapsed = start.elapsed();
        report.outcome = match (result, cleanup) {
            (Err(e), Err(cleanup_error)) => {
                error!("Cleanup after '{}' failed: {}", scenario.title, cleanup_error);
                Outcome::Failed(e.to_string())
            }
            (Err(e), Ok(())) => Outcome::Failed(e.to_string()),
            (Ok(()), Err(cleanup_error)) => {
                Outcome::Failed(format!("cleanup failed: {}", cleanup_error))
            }
            (Ok(()), Ok(())) => Outcome::Passed,
        };
        report
    }
}

async fn prepare(
    ctx: &mut ScenarioContext,
    scenario: &Scenario,
    fixture: &mut Fixture,
) -> Result<()> {
    ctx.load_versions().await?;
    let ctx = &*ctx;

    // Upgrade scenarios start on the second-highest minor and upgrade to the highest.
    if scenario.is_upgrade {
        fixture.k8s_version = ctx.k8s_version(true)?;
        let upgrade_to = ctx.k8s_version(false)?;
        info!(
            "Using Kubernetes {} for cluster '{}', upgrading to {}",
            fixture.k8s_version, ctx.cluster_name, upgrade_to
        );
        fixture.upgrade_to = Some(upgrade_to);
    } else {
        fixture.k8s_version = ctx.k8s_version(false)?;
        info!(
            "Using Kubernetes {} for cluster '{}'",
            fixture.k8s_version, ctx.cluster_name
        );
    }

    let setup = scenario.setup;
    let import = setup == Setup::SyncCluster
        && ctx.settings.is_import
        && ctx.provider == Provider::Eks;
    match setup {
        Setup::None => return Ok(()),
        _ if import => {
            // Set first so cleanup tears down a partially created stack.
            fixture.imported = true;
            ctx.eksctl.create_cluster(
                &ctx.cluster_name,
                &fixture.k8s_version,
                IMPORT_NODE_COUNT,
                &ctx.common_tags(),
                &[],
            )?;
            let template = ctx.cluster_config(&fixture.k8s_version)?;
            let cluster = import_hosted_cluster(ctx.client(), ctx.provider, &template).await?;
            fixture.track(cluster);
        }
        _ => {
            let config = ctx.cluster_config(&fixture.k8s_version)?;
            let cluster = create_hosted_cluster(ctx.client(), ctx.provider, config).await?;
            fixture.track(cluster);
        }
    }
    let cluster = fixture.cluster("wait for")?.clone();
    let ready = wait_until_cluster_is_ready(ctx.client(), &cluster).await?;
    fixture.track(ready);
    Ok(())
}

async fn cleanup(ctx: &ScenarioContext, fixture: &Fixture) -> Result<()> {
    let cluster = fixture.cluster.as_ref().filter(|c| !c.id.is_empty());
    if cluster.is_none() && !fixture.imported {
        return Ok(());
    }
    if !ctx.cleanup_enabled() {
        info!("Skipping downstream cluster deletion: {}", ctx.cluster_name);
        return Ok(());
    }
    if let Some(cluster) = cluster {
        info!("Cleaning up cluster '{}' ({})", cluster.name, cluster.id);
        delete_hosted_cluster(ctx.client(), cluster).await?;
    }
    if fixture.imported {
        ctx.eksctl.delete_cluster(&ctx.cluster_name)?;
    }
    Ok(())
}
