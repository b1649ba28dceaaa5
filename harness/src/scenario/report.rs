use crate::error::{self, Result};
use hosted_model::Provider;
use log::{error, info, warn};
use serde::Serialize;
use snafu::ResultExt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum Outcome {
    Passed,
    Failed(String),
    Skipped(String),
}

impl Outcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }
}

/// The result of one scenario, as handed to reporters.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioReport {
    pub case_id: Option<u32>,
    pub title: String,
    pub provider: Provider,
    pub cluster_name: Option<String>,
    pub outcome: Outcome,
    #[serde(serialize_with = "as_secs")]
    pub elapsed: Duration,
}

fn as_secs<S>(elapsed: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_f64(elapsed.as_secs_f64())
}

/// Receives the outcome of every scenario, in the order they ran.
pub trait Reporter: Send {
    fn report(&mut self, report: &ScenarioReport) -> Result<()>;
}

/// Logs each outcome.
#[derive(Debug, Default)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn report(&mut self, report: &ScenarioReport) -> Result<()> {
        let case = report
            .case_id
            .map(|id| format!(" (case {})", id))
            .unwrap_or_default();
        match &report.outcome {
            Outcome::Passed => info!(
                "PASSED{} {} in {:.0?}",
                case, report.title, report.elapsed
            ),
            Outcome::Skipped(reason) => warn!("SKIPPED{} {}: {}", case, report.title, reason),
            Outcome::Failed(reason) => error!(
                "FAILED{} {} after {:.0?}: {}",
                case, report.title, report.elapsed, reason
            ),
        }
        Ok(())
    }
}

/// Writes one JSON object per scenario to a file.
#[derive(Debug)]
pub struct JsonLinesReporter {
    path: PathBuf,
    out: BufWriter<File>,
}

impl JsonLinesReporter {
    /// Creates or truncates `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).context(error::ReportSnafu { path: &path })?;
        Ok(Self {
            path,
            out: BufWriter::new(file),
        })
    }
}

impl Reporter for JsonLinesReporter {
    fn report(&mut self, report: &ScenarioReport) -> Result<()> {
        let line = serde_json::to_string(report).context(error::SerdeSnafu {
            what: format!("the report for '{}'", report.title),
        })?;
        writeln!(self.out, "{}", line).context(error::ReportSnafu { path: &self.path })?;
        self.out
            .flush()
            .context(error::ReportSnafu { path: &self.path })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn writes_one_line_per_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.jsonl");
        let mut reporter = JsonLinesReporter::new(&path).unwrap();
        reporter
            .report(&ScenarioReport {
                case_id: Some(141),
                title: "no node groups".to_string(),
                provider: Provider::Eks,
                cluster_name: Some("auto-hosted-abcde".to_string()),
                outcome: Outcome::Passed,
                elapsed: Duration::from_millis(1500),
            })
            .unwrap();
        reporter
            .report(&ScenarioReport {
                case_id: None,
                title: "sync".to_string(),
                provider: Provider::Eks,
                cluster_name: None,
                outcome: Outcome::Failed("boom".to_string()),
                elapsed: Duration::from_secs(2),
            })
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<Value> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["caseId"], json!(141));
        assert_eq!(lines[0]["outcome"], json!({"status": "passed"}));
        assert_eq!(lines[0]["elapsed"], json!(1.5));
        assert_eq!(lines[1]["caseId"], Value::Null);
        assert_eq!(
            lines[1]["outcome"],
            json!({"status": "failed", "reason": "boom"})
        );
    }
}
