use anyhow::{bail, Context, Result};
use clap::Parser;
use hosted_harness::scenario::{JsonLinesReporter, LogReporter, Outcome, Runner};
use hosted_harness::{scenarios, Harness};
use hosted_model::Provider;
use log::info;
use std::path::PathBuf;

/// Run scenarios. Settings are read from the environment, see `CATTLE_TEST_CONFIG`.
#[derive(Debug, Parser)]
pub(crate) struct Run {
    /// Only run scenarios for this provider [eks|gke].
    #[clap(long)]
    provider: Option<Provider>,

    /// Also write one JSON object per scenario to this file.
    #[clap(long = "report")]
    report: Option<PathBuf>,

    /// Case ids or title substrings selecting scenarios. All scenarios run when omitted.
    filters: Vec<String>,
}

impl Run {
    pub(crate) async fn run(self) -> Result<()> {
        let selected = scenarios::select(self.provider, &self.filters);
        if selected.is_empty() {
            bail!("No scenarios match {:?}", self.filters);
        }

        let harness = Harness::from_env().context("Unable to set up the harness")?;
        let mut runner = Runner::new(harness).with_reporter(LogReporter);
        if let Some(path) = &self.report {
            runner = runner.with_reporter(JsonLinesReporter::new(path).context(format!(
                "Unable to create report file '{}'",
                path.display()
            ))?);
        }

        info!("Running {} scenarios", selected.len());
        let reports = runner
            .run(&selected)
            .await
            .context("Unable to report scenario outcomes")?;
        let failed = reports.iter().filter(|r| r.outcome.is_failed()).count();
        let skipped = reports
            .iter()
            .filter(|r| matches!(r.outcome, Outcome::Skipped(_)))
            .count();
        info!(
            "{} passed, {} failed, {} skipped",
            reports.len() - failed - skipped,
            failed,
            skipped
        );
        if failed > 0 {
            bail!("{} of {} scenarios failed", failed, reports.len());
        }
        Ok(())
    }
}
