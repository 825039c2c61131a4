use indexmap::IndexMap;
use std::fmt;

use crate::{
    evaluator::Evaluation,
    scenario::{Scenario, ScenarioTable},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display)]
pub enum Outcome {
    #[default]
    #[strum(serialize = "not run")]
    NotRun,
    #[strum(serialize = "pass")]
    Pass,
    #[strum(serialize = "fail")]
    Fail,
}

impl Outcome {
    pub fn marker(self) -> &'static str {
        match self {
            Outcome::NotRun => "·",
            Outcome::Pass => "✓",
            Outcome::Fail => "✘",
        }
    }
}

/// Latest result of one scenario.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScenarioResult {
    pub status: Outcome,
    pub last_code: Option<i64>,
    pub last_message: Option<String>,
}

impl ScenarioResult {
    pub fn failed(message: impl Into<String>) -> ScenarioResult {
        ScenarioResult {
            status: Outcome::Fail,
            last_code: None,
            last_message: Some(message.into()),
        }
    }
}

impl From<Evaluation> for ScenarioResult {
    fn from(e: Evaluation) -> Self {
        ScenarioResult {
            status: if e.pass { Outcome::Pass } else { Outcome::Fail },
            last_code: e.code,
            last_message: e.message,
        }
    }
}

/// Results keyed by scenario id, in table order.
pub type Results = IndexMap<&'static str, ScenarioResult>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub total: usize,
    pub pass: usize,
    pub fail: usize,
    pub not_run: usize,
    pub lines: Vec<String>,
}

impl Summary {
    pub fn all_passed(&self) -> bool {
        self.total > 0 && self.pass == self.total
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{line}")?;
        }
        write!(
            f,
            "total: {}, pass: {}, fail: {}, not run: {}",
            self.total, self.pass, self.fail, self.not_run
        )
    }
}

/// One line per scenario, shared by the live output and the summary block.
pub fn scenario_line(
    marker: impl fmt::Display,
    scenario: &Scenario,
    result: &ScenarioResult,
) -> String {
    let actual = result
        .last_code
        .map(|code| code.to_string())
        .unwrap_or_else(|| "-".into());
    let mut line = format!(
        "{marker} [{}] {}: expected {}, got {actual}",
        scenario.id, scenario.label, scenario.expected_status_code
    );
    if let Some(message) = &result.last_message {
        line.push_str(&format!(" ({message})"));
    }
    line
}

/// Tally results over the whole table. Scenarios without a result count as
/// not run.
pub fn summarize(table: &ScenarioTable, results: &Results) -> Summary {
    let default = ScenarioResult::default();
    let mut summary = Summary {
        total: table.len(),
        ..Default::default()
    };

    for scenario in table.iter() {
        let result = results.get(scenario.id).unwrap_or(&default);
        match result.status {
            Outcome::NotRun => summary.not_run += 1,
            Outcome::Pass => summary.pass += 1,
            Outcome::Fail => summary.fail += 1,
        }

        let line = scenario_line(result.status.marker(), scenario, result);
        summary.lines.push(line);
    }

    summary
}
