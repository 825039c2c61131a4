use apiprobe_core::{
    runner::Runner, token, Config, ListReporter, NullReporter, Reporter, ReporterType,
    ScenarioTable, Token, UserMode,
};
use clap::{Arg, ArgAction, ArgMatches, Command as ClapCommand};
use console::Term;
use eyre::WrapErr;
use futures::FutureExt;
use itertools::Itertools;
use std::{str::FromStr, sync::Arc};
use strum::IntoEnumIterator;
use tracing_subscriber::EnvFilter;

use crate::shell;

/// Build the CLI with clap's builder pattern
fn build_cli() -> ClapCommand {
    let modes: Vec<&'static str> = UserMode::iter().map(Into::into).collect();
    ClapCommand::new("apiprobe")
        .about("apiprobe runs a fixed table of scenarios against the order, user and discount API")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .subcommand(
            ClapCommand::new("test")
                .about("Run scenarios and print a summary")
                .arg(Arg::new("scenarios")
                    .short('s')
                    .long("scenarios")
                    .help("Specify scenario ids to run in comma-separated string. e.g. --scenarios discount-ok-btn,order-get-btn")
                    .value_delimiter(',')
                    .action(ArgAction::Append))
                .arg(Arg::new("capture-http")
                    .long("capture-http")
                    .help("Print request and response of every HTTP call")
                    .action(ArgAction::SetTrue))
                .arg(Arg::new("capture-rust")
                    .long("capture-rust")
                    .help("Print apiprobe's internal tracing logs. Filter with RUST_LOG")
                    .action(ArgAction::SetTrue))
                .arg(Arg::new("show-secrets")
                    .long("show-secrets")
                    .help("Do not mask tokens in captured HTTP logs")
                    .action(ArgAction::SetTrue))
                .arg(Arg::new("reporters")
                    .long("reporters")
                    .help("Specify the reporters to use in comma-separated string. Default is \"list\". [possible values: list, null]")
                    .value_delimiter(',')
                    .action(ArgAction::Append))
                .arg(Arg::new("color")
                    .long("color")
                    .help("Produce color output. Default is \"auto\" [env: CARGO_TERM_COLOR]")
                    .value_parser(["auto", "always", "never"]))
        )
        .subcommand(
            ClapCommand::new("ls")
                .about("List scenarios")
        )
        .subcommand(
            ClapCommand::new("token")
                .about("Fetch a token from the user endpoint and decode its header")
                .arg(Arg::new("mode")
                    .long("mode")
                    .help("Server-side token scenario")
                    .value_parser(modes))
        )
        .subcommand(
            ClapCommand::new("decode")
                .about("Decode the header of a token without contacting the server")
                .arg(Arg::new("token")
                    .required(true)
                    .help("Token in header.payload.signature form"))
        )
        .subcommand(
            ClapCommand::new("shell")
                .about("Interactive mode: run, reset and inspect scenarios one command at a time")
                .arg(Arg::new("capture-http")
                    .long("capture-http")
                    .help("Print request and response of every HTTP call")
                    .action(ArgAction::SetTrue))
        )
}

/// apiprobe CLI.
#[derive(Default)]
pub struct App;

impl App {
    pub fn new() -> App {
        App
    }

    /// Parse command-line args and run apiprobe CLI sub command.
    pub async fn run(self) -> eyre::Result<()> {
        let matches = build_cli().get_matches();
        color_eyre::install()?;
        dispatch(&matches).await
    }
}

/// Run the matched sub command. Only sub commands that talk to the server
/// load the configuration.
async fn dispatch(matches: &ArgMatches) -> eyre::Result<()> {
    let term = Term::stdout();

    match matches.subcommand() {
        Some(("test", test_matches)) => {
            let capture_http = test_matches.get_flag("capture-http");
            let show_secrets = test_matches.get_flag("show-secrets");
            let scenarios = test_matches
                .get_many::<String>("scenarios")
                .map(|vals| vals.cloned().collect::<Vec<_>>())
                .unwrap_or_default();
            let reporter_names = test_matches
                .get_many::<String>("reporters")
                .map(|vals| vals.cloned().collect::<Vec<_>>())
                .unwrap_or_else(|| vec![ReporterType::List.to_string()]);
            let color_command = test_matches
                .get_one::<String>("color")
                .and_then(|s| Color::from_str(s).ok());

            if test_matches.get_flag("capture-rust") {
                init_tracing();
            }
            apply_color(color_command);

            let mut reporters: Vec<Box<dyn Reporter + Send>> = Vec::new();
            for name in reporter_names {
                let reporter: Box<dyn Reporter + Send> = match ReporterType::from_str(&name)
                    .map_err(|_| eyre::eyre!("Unknown reporter: {name}"))?
                {
                    ReporterType::List => {
                        Box::new(ListReporter::new(capture_http).show_secrets(show_secrets))
                    }
                    ReporterType::Null => Box::new(NullReporter),
                };
                reporters.push(reporter);
            }

            let runner = Runner::new(Config::load()?)?;
            let receivers = reporters
                .iter()
                .map(|_| runner.subscribe())
                .collect::<Result<Vec<_>, _>>()?;
            let reporters = futures::future::join_all(
                reporters
                    .iter_mut()
                    .zip(receivers)
                    .map(|(reporter, rx)| reporter.run(rx).boxed()),
            );

            let run = async {
                let summary = if scenarios.is_empty() {
                    runner.run_all().await
                } else {
                    runner.run_selected(&scenarios).await
                };
                runner.close();
                summary
            };

            let (summary, reporter_results) = tokio::join!(run, reporters);
            for result in reporter_results {
                result.wrap_err("reporter failed")?;
            }

            let summary = summary?;
            if summary.fail > 0 {
                eyre::bail!("{} of {} scenarios failed", summary.fail, summary.total);
            }
            Ok(())
        }
        Some(("ls", _)) => {
            let table = ScenarioTable::default();
            let by_resource = table.iter().chunk_by(|s| resource(s.id));
            for (resource, scenarios) in &by_resource {
                term.write_line(&format!("* {resource}"))?;
                for scenario in scenarios {
                    term.write_line(&format!(
                        "  - {} [{}] {}",
                        scenario.id, scenario.expected_status_code, scenario.label
                    ))?;
                }
            }
            Ok(())
        }
        Some(("token", token_matches)) => {
            let mode = token_matches
                .get_one::<String>("mode")
                .map(|m| UserMode::from_str(m))
                .transpose()?;
            let runner = Runner::new(Config::load()?)?;
            let token = runner.fetch_token(mode).await?;
            print_token(&term, &token)
        }
        Some(("decode", decode_matches)) => {
            let raw = decode_matches
                .get_one::<String>("token")
                .ok_or_else(|| eyre::eyre!("token is required"))?;
            let header = token::decode_header_segment(raw);
            term.write_line(&pretty(header.as_ref())?)?;
            Ok(())
        }
        Some(("shell", shell_matches)) => {
            let capture_http = shell_matches.get_flag("capture-http");
            let runner = Arc::new(Runner::new(Config::load()?)?);
            shell::run(runner, ListReporter::new(capture_http)).await
        }
        _ => unreachable!("Subcommand required is set to true"),
    }
}

/// Resource a scenario targets, derived from its id prefix.
fn resource(id: &str) -> &str {
    id.split('-').next().unwrap_or(id)
}

pub(crate) fn print_token(term: &Term, token: &Token) -> eyre::Result<()> {
    term.write_line(&format!("token: {token}"))?;
    term.write_line(&format!("header: {}", pretty(token.header().as_ref())?))?;

    // Nested tokens carry the inner token as payload.
    if let Some(inner) = token
        .payload_text()
        .filter(|p| token::decode_header_segment(p).is_some())
    {
        let inner = Token::new(inner);
        term.write_line(&format!("inner token: {inner}"))?;
        term.write_line(&format!(
            "inner header: {}",
            pretty(inner.header().as_ref())?
        ))?;
    }
    Ok(())
}

fn pretty(value: Option<&serde_json::Value>) -> eyre::Result<String> {
    Ok(match value {
        Some(value) => serde_json::to_string_pretty(value)?,
        None => "null".to_string(),
    })
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("apiprobe_core=debug"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn apply_color(color_command: Option<Color>) {
    let color_env = std::env::var("CARGO_TERM_COLOR");
    let color = match (color_command, color_env) {
        (color @ Some(Color::Always), _) => color,
        (color @ Some(Color::Never), _) => color,
        (None, Ok(color)) => Color::from_str(&color).ok(),
        _ => None,
    };
    match color {
        Some(Color::Always) => {
            console::set_colors_enabled(true);
            console::set_colors_enabled_stderr(true);
        }
        Some(Color::Never) => {
            console::set_colors_enabled(false);
            console::set_colors_enabled_stderr(false);
        }
        _ => {}
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Color {
    #[default]
    Auto,
    Always,
    Never,
}
