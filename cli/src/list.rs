use anyhow::{Context, Result};
use clap::Parser;
use hosted_harness::scenario::Scenario;
use hosted_harness::scenarios;
use hosted_model::Provider;
use serde::Serialize;
use tabled::{Alignment, Full, MaxWidth, Modify, Style, Table, Tabled};
use terminal_size::{Height, Width};

/// List the registered scenarios.
#[derive(Debug, Parser)]
pub(crate) struct List {
    /// Only list scenarios for this provider [eks|gke].
    #[clap(long)]
    provider: Option<Provider>,

    /// Output the scenarios in JSON format.
    #[clap(long = "json")]
    json: bool,

    /// Case ids or title substrings selecting scenarios. All scenarios are listed when omitted.
    filters: Vec<String>,
}

#[derive(Tabled, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScenarioRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "PROVIDER")]
    provider: Provider,
    #[tabled(rename = "UPGRADE")]
    #[tabled(display_with = "display_flag")]
    is_upgrade: bool,
    #[tabled(rename = "PENDING")]
    #[tabled(display_with = "display_flag")]
    pending: bool,
    #[tabled(rename = "TITLE")]
    title: String,
}

fn display_flag(flag: &bool) -> String {
    if *flag {
        "yes".to_string()
    } else {
        "".to_string()
    }
}

impl From<&Scenario> for ScenarioRow {
    fn from(scenario: &Scenario) -> Self {
        Self {
            name: scenario.name(),
            provider: scenario.provider,
            is_upgrade: scenario.is_upgrade,
            pending: scenario.pending,
            title: scenario.title.to_string(),
        }
    }
}

impl List {
    pub(crate) fn run(self) -> Result<()> {
        let rows: Vec<ScenarioRow> = scenarios::select(self.provider, &self.filters)
            .iter()
            .map(ScenarioRow::from)
            .collect();
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&rows).context("Could not serialize scenarios")?
            );
        } else {
            let (Width(width), _) =
                terminal_size::terminal_size().unwrap_or((Width(120), Height(0)));
            let table = Table::new(rows)
                .with(Style::blank())
                .with(Modify::new(Full).with(Alignment::left()))
                .with(MaxWidth::truncating(width as usize));
            println!("{}", table);
        }
        Ok(())
    }
}
