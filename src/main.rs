//! `daq-cli`: command-line control of a running microscope backend.
//!
//! Each invocation performs exactly one action and reports the outcome
//! through the exit code (see [`daq_cli::error`]).

use anyhow::Context;
use clap::{ArgGroup, Parser};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use daq_cli::acquisition;
use daq_cli::config::{Settings, DEFAULT_CONFIG_FILE};
use daq_cli::error::{CliError, CliResult, EXIT_FAILURE, EXIT_OK};
use daq_cli::gateway::{self, SetAttrRequest};
use daq_cli::motion::{self, MoveRequest};
use daq_cli::report;
use daq_cli::resolve;
use daq_cli::session::Session;
use daq_cli::sink::{TerminalDisplay, TiffSink};
use daq_cli::status::{self, BackendStatus};

const PREVIEW_COLUMNS: u32 = 64;

#[derive(Parser, Debug)]
#[command(
    name = "daq-cli",
    version,
    about = "Control a running microscope backend from the command line"
)]
#[command(group(
    ArgGroup::new("action")
        .required(true)
        .args(["kill", "check", "scan", "list", "list_prop", "set_attr", "move_axis", "stop", "acquire", "live"])
))]
struct Cli {
    /// Verbosity level (0-2)
    #[arg(long = "log-level", value_name = "LEVEL")]
    log_level: Option<u8>,

    /// Settings file
    #[arg(long, value_name = "FILE", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Use the in-process simulated microscope
    #[arg(long)]
    simulate: bool,

    /// Kill the running back-end
    #[arg(long, short = 'k')]
    kill: bool,

    /// Check for a running back-end (only returns exit code)
    #[arg(long)]
    check: bool,

    /// Scan for possible devices to connect (the back-end must be stopped)
    #[arg(long)]
    scan: bool,

    /// List the components of the microscope
    #[arg(long, short = 'l')]
    list: bool,

    /// List the properties of a component
    #[arg(long = "list-prop", short = 'L', value_name = "COMPONENT")]
    list_prop: Option<String>,

    /// Set the attribute of a component (lists are delimited by commas)
    #[arg(
        long = "set-attr",
        short = 's',
        num_args = 3,
        value_names = ["COMPONENT", "ATTRIBUTE", "VALUE"],
        allow_negative_numbers = true,
        action = clap::ArgAction::Append
    )]
    set_attr: Vec<String>,

    /// Move the axis by the given amount of µm
    #[arg(
        long = "move",
        short = 'm',
        num_args = 3,
        value_names = ["COMPONENT", "AXIS", "DISTANCE"],
        allow_negative_numbers = true,
        action = clap::ArgAction::Append
    )]
    move_axis: Vec<String>,

    /// Immediately stop all the actuators in all directions
    #[arg(long, short = 'S')]
    stop: bool,

    /// Acquire an image (default data-flow is "data")
    #[arg(long, short = 'a', num_args = 1.., value_names = ["COMPONENT", "DATA-FLOW"])]
    acquire: Vec<String>,

    /// File where the acquired image is saved, in TIFF format
    #[arg(long, short = 'o', value_name = "FILE")]
    output: Option<PathBuf>,

    /// Display and update an image on the screen (default data-flow is "data")
    #[arg(long, num_args = 1.., value_names = ["COMPONENT", "DATA-FLOW"])]
    live: Vec<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            EXIT_FAILURE
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let settings = Settings::load_from(&cli.config);
    init_tracing(cli.log_level, settings.as_ref().ok());
    let mut settings =
        settings.with_context(|| format!("Failed to load settings from {}", cli.config.display()))?;
    if cli.simulate {
        settings.backend.simulated = true;
    }

    if !cli.acquire.is_empty() && cli.output.is_none() {
        return Ok(report_error(&CliError::Usage(
            "name of the output file must be specified".to_string(),
        )));
    }

    let session = Session::open(settings);
    let status = status::probe(&session).await;

    if cli.check {
        info!("Status of back-end is {}", status);
        return Ok(status.exit_code());
    }

    if cli.scan {
        if status == BackendStatus::Running {
            return Ok(report_error(&CliError::Usage(
                "back-end running while trying to scan for devices".to_string(),
            )));
        }
        return Ok(finish(scan(&session).await));
    }

    match status {
        BackendStatus::Running => {}
        BackendStatus::Dead => return Ok(report_error(&CliError::BackendDead)),
        BackendStatus::Stopped => return Ok(report_error(&CliError::BackendStopped)),
    }

    Ok(finish(dispatch(&cli, &session).await))
}

async fn dispatch(cli: &Cli, session: &Session) -> CliResult<()> {
    if cli.kill {
        return session
            .backend()
            .terminate()
            .await
            .map_err(|e| CliError::from_remote("back-end", e));
    }

    if cli.list {
        let scope = resolve::microscope(session).await?;
        print!("{}", report::render_tree(&resolve::walk_tree(&scope).await?));
        return Ok(());
    }

    if let Some(component) = &cli.list_prop {
        let listing = gateway::list_properties(session, component).await?;
        print!("{}", report::render_properties(&listing));
        return Ok(());
    }

    if !cli.set_attr.is_empty() {
        let requests: Vec<SetAttrRequest> = cli
            .set_attr
            .chunks_exact(3)
            .map(|c| SetAttrRequest::new(&c[0], &c[1], &c[2]))
            .collect();
        return gateway::set_attributes(session, &requests).await;
    }

    if !cli.move_axis.is_empty() {
        let requests: Vec<MoveRequest> = cli
            .move_axis
            .chunks_exact(3)
            .map(|c| MoveRequest::new(&c[0], &c[1], &c[2]))
            .collect();
        return motion::run_moves(session, &requests).await;
    }

    if cli.stop {
        return motion::stop_all(session).await;
    }

    if let Some((component, dataflows)) = cli.acquire.split_first() {
        let output = cli
            .output
            .as_deref()
            .ok_or_else(|| CliError::Usage("name of the output file must be specified".into()))?;
        acquisition::acquire(session, component, dataflows, output, &TiffSink).await?;
        return Ok(());
    }

    if let Some((component, dataflows)) = cli.live.split_first() {
        if dataflows.len() > 1 {
            return Err(CliError::Usage(
                "live display shows only one data-flow at a time".to_string(),
            ));
        }
        let mut display = TerminalDisplay::new();
        if session.settings().display.preview {
            display = display.with_preview(PREVIEW_COLUMNS);
        }
        println!("Press Ctrl-C to quit");
        let dataflow = dataflows.first().map(String::as_str);
        return acquisition::live_display(session, component, dataflow, Arc::new(display)).await;
    }

    Err(CliError::Usage("no action specified".to_string()))
}

async fn scan(session: &Session) -> CliResult<()> {
    let devices = session
        .backend()
        .scan()
        .await
        .map_err(|e| CliError::from_remote("device scan", e))?;
    print!("{}", report::render_scan(&devices));
    Ok(())
}

fn finish(result: CliResult<()>) -> i32 {
    match result {
        Ok(()) => EXIT_OK,
        Err(e) => report_error(&e),
    }
}

fn report_error(err: &CliError) -> i32 {
    error!("{}", err);
    if let CliError::PartialFailure { failures, .. } = err {
        for failure in failures {
            error!("  {}", failure);
        }
    }
    err.exit_code()
}

/// `--log-level` wins over the settings file; `RUST_LOG` wins over both.
fn init_tracing(log_level: Option<u8>, settings: Option<&Settings>) {
    let level = match log_level {
        Some(0) => "warn".to_string(),
        Some(1) => "info".to_string(),
        Some(_) => "debug".to_string(),
        None => settings
            .map(|s| s.logging.level.clone())
            .unwrap_or_else(|| "warn".to_string()),
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
