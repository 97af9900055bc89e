//! Command-line front end for an MCP observability tool server.
//!
//! Usage:
//!
//! ```text
//! tether [-v...] [--log-format plain|json] tools
//! tether call <tool> [--args <json-object>] [--timeout-secs <n>]
//! tether report [--probes <file>] [--output <dir>] [--no-save]
//! ```
//!
//! Connection settings come from the environment; see
//! [`tether::config::EnvironmentConfig`]. Logs go to stderr so stdout
//! carries only command output.

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use clap::{Parser, Subcommand, ValueEnum};
use eyre::{WrapErr, eyre};
use mockable::DefaultClock;
use serde_json::{Map, Value};
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use tether::config::EnvironmentConfig;
use tether::report::{ReportCollector, ReportWriter, ToolProbe, parse_probes, render_markdown};
use tether::tool_server::adapters::stdio::StdioConnector;
use tether::tool_server::ports::ToolInvoker;
use tether::tool_server::services::ToolSession;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

/// Talk to an MCP tool server over stdio.
#[derive(Debug, Parser)]
#[command(name = "tether", version, about)]
struct Cli {
    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Plain)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Plain,
    Json,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the tools the server offers.
    Tools,
    /// Invoke one tool and print its text content.
    Call(CallArgs),
    /// Run the report probes and print the Markdown report.
    Report(ReportArgs),
}

#[derive(Debug, clap::Args)]
struct CallArgs {
    /// Tool to invoke.
    tool: String,

    /// Arguments as a JSON object.
    #[arg(long = "args", default_value = "{}")]
    arguments: String,

    /// Per-call timeout overriding the configured one.
    #[arg(long)]
    timeout_secs: Option<u64>,
}

#[derive(Debug, clap::Args)]
struct ReportArgs {
    /// JSON file holding an array of probes.
    #[arg(long)]
    probes: Option<Utf8PathBuf>,

    /// Directory the report files are written to.
    #[arg(long, default_value = "reports")]
    output: Utf8PathBuf,

    /// Print the report without writing files.
    #[arg(long)]
    no_save: bool,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    let config = EnvironmentConfig::from_process_env()?;
    debug!(?config, "loaded configuration");

    match cli.command {
        Command::Tools => list_tools(&config).await,
        Command::Call(args) => call_tool(&config, &args).await,
        Command::Report(args) => run_report(&config, args).await,
    }
}

fn init_tracing(verbose: u8, format: LogFormat) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    match format {
        LogFormat::Json => builder
            .json()
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE)
            .init(),
        LogFormat::Plain => builder.init(),
    }
}

fn session(
    config: &EnvironmentConfig,
    call_timeout: Option<Duration>,
) -> eyre::Result<Arc<ToolSession<StdioConnector>>> {
    let launch = match call_timeout {
        Some(timeout) => config.launch_config()?.with_call_timeout(timeout)?,
        None => config.launch_config()?,
    };
    Ok(Arc::new(ToolSession::from_launch_config(launch, config.policy())))
}

/// Closes `session` after `outcome` was produced, keeping the first error.
async fn finish<T>(
    session: &ToolSession<StdioConnector>,
    outcome: eyre::Result<T>,
) -> eyre::Result<T> {
    let closed = session.close().await;
    let value = outcome?;
    closed.wrap_err("failed to close the tool server connection")?;
    Ok(value)
}

async fn list_tools(config: &EnvironmentConfig) -> eyre::Result<()> {
    let tools = session(config, None)?;
    let listed = tools.list_tools().await.map_err(eyre::Report::from);
    let catalog = finish(&tools, listed).await?;

    let mut stdout = io::stdout().lock();
    for tool in catalog.tools() {
        writeln!(stdout, "{}\t{}", tool.name(), tool.description())?;
    }
    writeln!(
        stdout,
        "\n{} tools, fingerprint {}",
        catalog.len(),
        catalog.fingerprint()
    )?;
    Ok(())
}

async fn call_tool(config: &EnvironmentConfig, args: &CallArgs) -> eyre::Result<()> {
    let arguments: Map<String, Value> =
        serde_json::from_str(&args.arguments).wrap_err("--args must be a JSON object")?;
    let tools = session(config, args.timeout_secs.map(Duration::from_secs))?;
    let invoked = tools
        .invoke(&args.tool, arguments)
        .await
        .map_err(eyre::Report::from);
    let result = finish(&tools, invoked).await?;

    let output = result.into_output().map_err(|failure| eyre!(failure))?;
    writeln!(io::stdout().lock(), "{}", output.text())?;
    Ok(())
}

async fn run_report(config: &EnvironmentConfig, args: ReportArgs) -> eyre::Result<()> {
    let probes = match &args.probes {
        Some(path) => read_probes(path)?,
        None => tether::report::default_probes(),
    };
    let tools = session(config, None)?;
    let collector =
        ReportCollector::new(Arc::clone(&tools), Arc::new(DefaultClock)).with_probes(probes);
    let report = collector.collect().await;
    finish(&tools, Ok(())).await?;

    writeln!(io::stdout().lock(), "{}", render_markdown(&report)?)?;
    if !args.no_save {
        let written = ReportWriter::new(args.output).write(&report)?;
        writeln!(
            io::stdout().lock(),
            "Report saved to {} and {}",
            written.markdown,
            written.json
        )?;
    }
    Ok(())
}

fn read_probes(path: &Utf8Path) -> eyre::Result<Vec<ToolProbe>> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let name = path
        .file_name()
        .ok_or_else(|| eyre!("probe path {path} has no file name"))?;
    let dir = Dir::open_ambient_dir(parent, ambient_authority())
        .wrap_err_with(|| format!("failed to open {parent}"))?;
    let text = dir
        .read_to_string(name)
        .wrap_err_with(|| format!("failed to read {path}"))?;
    Ok(parse_probes(&text)?)
}
