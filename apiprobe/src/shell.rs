//! Line-oriented interactive mode. Each command stands in for one button of
//! the original test page.

use apiprobe_core::{Error, ListReporter, Reporter, Runner, UserMode};
use console::Term;
use std::{str::FromStr, sync::Arc};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    task::JoinSet,
};
use tracing::*;

use crate::app::print_token;

const HELP: &str = "\
commands:
  run <id>       run one scenario
  all            run every scenario in the background
  reset          set every result back to not run
  summary        print the current summary
  token [mode]   fetch a token, optionally under a server-side mode
  ls             list scenario ids
  help           show this help
  quit           leave the shell";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Run(String),
    All,
    Reset,
    Summary,
    Token(Option<UserMode>),
    Ls,
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Command, String> {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return Err("empty command".into());
        };
        let arg = words.next();
        if words.next().is_some() {
            return Err(format!("too many arguments for \"{name}\""));
        }

        match (name, arg) {
            ("run", Some(id)) => Ok(Command::Run(id.to_string())),
            ("run", None) => Err("usage: run <id>".into()),
            ("all", None) => Ok(Command::All),
            ("reset", None) => Ok(Command::Reset),
            ("summary", None) => Ok(Command::Summary),
            ("token", None) => Ok(Command::Token(None)),
            ("token", Some(mode)) => UserMode::from_str(mode)
                .map(|m| Command::Token(Some(m)))
                .map_err(|_| format!("unknown mode \"{mode}\"")),
            ("ls", None) => Ok(Command::Ls),
            ("help", None) => Ok(Command::Help),
            ("quit" | "exit", None) => Ok(Command::Quit),
            (name, Some(_)) if ["all", "reset", "summary", "ls", "help", "quit", "exit"].contains(&name) => {
                Err(format!("\"{name}\" takes no argument"))
            }
            (name, _) => Err(format!("unknown command \"{name}\", try \"help\"")),
        }
    }
}

/// Start `run_all` in the background. Refused while an earlier bulk run is
/// still going.
fn start_bulk(runner: &Arc<Runner>, bulk: &mut JoinSet<()>) -> apiprobe_core::Result<()> {
    while bulk.try_join_next().is_some() {}
    if !bulk.is_empty() {
        return Err(Error::RunInProgress);
    }

    let runner = runner.clone();
    bulk.spawn(async move {
        if let Err(e) = runner.run_all().await {
            let _ = Term::stderr().write_line(&format!("bulk run failed: {e}"));
        }
    });
    Ok(())
}

/// Wait for every bulk run still in flight.
async fn finish_bulk(bulk: &mut JoinSet<()>) -> eyre::Result<()> {
    while let Some(joined) = bulk.join_next().await {
        joined?;
    }
    Ok(())
}

/// Read commands from stdin until `quit` or end of input.
pub async fn run(runner: Arc<Runner>, mut reporter: ListReporter) -> eyre::Result<()> {
    let rx = runner.subscribe()?;
    let reporter = tokio::spawn(async move { reporter.run(rx).await });

    let term = Term::stdout();
    let err = Term::stderr();
    term.write_line(HELP)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut bulk = JoinSet::new();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let command = match Command::from_str(&line) {
            Ok(command) => command,
            Err(e) => {
                err.write_line(&e)?;
                continue;
            }
        };
        debug!("shell command: {command:?}");

        let outcome = match command {
            Command::Run(id) => runner.run_one(&id).await.map(|_| ()),
            Command::All => start_bulk(&runner, &mut bulk),
            Command::Reset => runner.reset().await.map(|_| ()),
            Command::Summary => {
                term.write_line(&runner.summary().await.to_string())?;
                Ok(())
            }
            Command::Token(mode) => match runner.fetch_token(mode).await {
                Ok(token) => {
                    print_token(&term, &token)?;
                    Ok(())
                }
                Err(e) => Err(e),
            },
            Command::Ls => {
                for scenario in runner.table().iter() {
                    term.write_line(&format!(
                        "{} [{}] {}",
                        scenario.id, scenario.expected_status_code, scenario.label
                    ))?;
                }
                Ok(())
            }
            Command::Help => {
                term.write_line(HELP)?;
                Ok(())
            }
            Command::Quit => break,
        };
        if let Err(e) = outcome {
            err.write_line(&e.to_string())?;
        }
    }

    finish_bulk(&mut bulk).await?;
    runner.close();
    reporter.await??;
    Ok(())
}
