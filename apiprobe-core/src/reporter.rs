use console::{style, StyledObject, Term};
use eyre::WrapErr;
use std::collections::HashMap;
use tokio::sync::broadcast;
use tracing::*;

use crate::{
    http, masking,
    runner::Message,
    scenario::Scenario,
    summary::{scenario_line, Outcome, ScenarioResult, Summary},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ReporterType {
    #[default]
    List,
    Null,
}

/// Reporter trait. The trait is based on the "template method" pattern.
/// You can implement on_xxx methods to hook into the runner. This way is enough for most usecases.
/// If you need more control, you can override the "run" method.
#[async_trait::async_trait]
pub trait Reporter {
    async fn run(&mut self, mut rx: broadcast::Receiver<Message>) -> eyre::Result<()> {
        loop {
            match rx.recv().await {
                Ok(Message::Start(scenario)) => self.on_start(scenario).await?,
                Ok(Message::HttpLog(source, log)) => self.on_http_call(source, log).await?,
                Ok(Message::End(scenario, result)) => self.on_end(scenario, result).await?,
                Ok(Message::Summary(summary)) => self.on_summary(summary).await?,
                Ok(Message::Reset) => self.on_reset().await?,
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("runner channel has been closed");
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!("reporter lagged behind by {n} messages");
                    continue;
                }
            }
        }

        Ok(())
    }

    /// Called when a scenario starts.
    async fn on_start(&mut self, _scenario: Scenario) -> eyre::Result<()> {
        Ok(())
    }

    /// Called when an HTTP call is made.
    async fn on_http_call(&mut self, _source: &'static str, _log: Box<http::Log>) -> eyre::Result<()> {
        Ok(())
    }

    /// Called when a scenario ends.
    async fn on_end(&mut self, _scenario: Scenario, _result: ScenarioResult) -> eyre::Result<()> {
        Ok(())
    }

    /// Called after a single run, a bulk run, or a reset.
    async fn on_summary(&mut self, _summary: Summary) -> eyre::Result<()> {
        Ok(())
    }

    async fn on_reset(&mut self) -> eyre::Result<()> {
        Ok(())
    }
}

pub struct NullReporter;

#[async_trait::async_trait]
impl Reporter for NullReporter {}

#[allow(clippy::vec_box)]
pub struct ListReporter {
    terminal: Term,
    buffer: HashMap<&'static str, Vec<Box<http::Log>>>,
    capture_http: bool,
    show_secrets: bool,
}

impl ListReporter {
    pub fn new(capture_http: bool) -> ListReporter {
        ListReporter {
            terminal: Term::stdout(),
            buffer: HashMap::new(),
            capture_http,
            show_secrets: false,
        }
    }

    /// Print credentials as sent instead of masking them.
    pub fn show_secrets(mut self, show: bool) -> ListReporter {
        self.show_secrets = show;
        self
    }

    fn write_log(&self, log: &http::Log) -> eyre::Result<()> {
        let (request_headers, response_headers, body) = if self.show_secrets {
            (
                log.request.headers.clone(),
                log.response.headers.clone(),
                log.response.body.clone(),
            )
        } else {
            (
                masking::mask_headers(&log.request.headers),
                masking::mask_headers(&log.response.headers),
                masking::mask_body(&log.response.body),
            )
        };

        write(
            &self.terminal,
            format!(" => {} {}", log.request.method, log.request.url),
        )?;
        write(&self.terminal, "  > request:")?;
        write(&self.terminal, "    > headers:")?;
        for (key, value) in &request_headers {
            write(
                &self.terminal,
                format!("       > {key}: {}", value.to_str().unwrap_or("<binary>")),
            )?;
        }
        if let Some(body) = &log.request.body {
            write(&self.terminal, format!("    > body: {body}"))?;
        }
        match log.response.status {
            Some(status) => write(&self.terminal, format!("  < response {status}"))?,
            None => write(&self.terminal, "  < no response")?,
        }
        write(&self.terminal, "    < headers:")?;
        for (key, value) in &response_headers {
            write(
                &self.terminal,
                format!("       < {key}: {}", value.to_str().unwrap_or("<binary>")),
            )?;
        }
        write(&self.terminal, format!("    < body: {body}"))
    }
}

#[async_trait::async_trait]
impl Reporter for ListReporter {
    async fn on_start(&mut self, scenario: Scenario) -> eyre::Result<()> {
        self.buffer.insert(scenario.id, Vec::new());
        Ok(())
    }

    async fn on_http_call(&mut self, source: &'static str, log: Box<http::Log>) -> eyre::Result<()> {
        if !self.capture_http {
            return Ok(());
        }
        match self.buffer.get_mut(source) {
            Some(logs) => logs.push(log),
            // Token fetches outside a scenario are printed right away.
            None => self.write_log(&log)?,
        }
        Ok(())
    }

    async fn on_end(&mut self, scenario: Scenario, result: ScenarioResult) -> eyre::Result<()> {
        let http_logs = self.buffer.remove(scenario.id).unwrap_or_default();
        for log in http_logs {
            self.write_log(&log)?;
        }

        let line = scenario_line(marker(result.status), &scenario, &result);
        self.terminal.write_line(&line)?;
        Ok(())
    }

    async fn on_summary(&mut self, summary: Summary) -> eyre::Result<()> {
        self.terminal.write_line("")?;
        for line in &summary.lines {
            write(&self.terminal, line)?;
        }
        let counts = format!(
            "total: {}, pass: {}, fail: {}, not run: {}",
            summary.total,
            style(summary.pass).green(),
            style(summary.fail).red(),
            summary.not_run
        );
        self.terminal.write_line(&counts)?;
        Ok(())
    }

    async fn on_reset(&mut self) -> eyre::Result<()> {
        self.buffer.clear();
        self.terminal.write_line("results reset")?;
        Ok(())
    }
}

fn marker(outcome: Outcome) -> StyledObject<&'static str> {
    match outcome {
        Outcome::Pass => style(outcome.marker()).green(),
        Outcome::Fail => style(outcome.marker()).red(),
        Outcome::NotRun => style(outcome.marker()).dim(),
    }
}

fn write(term: &Term, s: impl AsRef<str>) -> eyre::Result<()> {
    let colored = style(s.as_ref()).dim();
    term.write_line(&format!("{colored}"))
        .wrap_err("failed to write character on terminal")
}
