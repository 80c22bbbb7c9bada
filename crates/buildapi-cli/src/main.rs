//! Build API entry point
//!
//! `build_api <service>/<method> --input-json <path> --output-json <path>`
//! routes one call and exits with its return code. Calls that must run in the
//! SDK chroot are re-invoked there through this same binary.
//!
//! ## Exit codes
//!
//! - `0..=3`: handler return codes (see `ReturnCode`), or the exit code of
//!   the bridged call
//! - `65..=78`: routing failures, one per error kind
//! - `1`: usage and other failures

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use buildapi_core::config::{
    ENV_DEFAULT_SANDBOX, ENV_ENTER_COMMAND, ENV_SANDBOX_ENTRY, ENV_SANDBOX_MARKER,
};
use buildapi_core::{api, CallConfig, CallType, Router, RouterError, Settings};
use clap::{ArgGroup, Parser};
use tracing::{error, Level};

#[derive(Parser, Debug)]
#[command(name = "build_api")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    about = "Route a Build API call, entering the SDK chroot when required",
    long_about = None
)]
#[command(group(
    ArgGroup::new("call_type")
        .args(["validate_only", "mock_call", "mock_failure", "mock_invalid"])
))]
struct Cli {
    /// Method to call, as <service>/<method>
    #[arg(required_unless_present = "list_methods")]
    method: Option<String>,

    /// Request payload (JSON)
    #[arg(long, required_unless_present = "list_methods")]
    input_json: Option<PathBuf>,

    /// Where to write the response payload (JSON)
    #[arg(long, required_unless_present = "list_methods")]
    output_json: Option<PathBuf>,

    /// Only validate the request
    #[arg(long)]
    validate_only: bool,

    /// Return a canned successful response
    #[arg(long)]
    mock_call: bool,

    /// Return a canned failure response
    #[arg(long)]
    mock_failure: bool,

    /// Return a canned invalid-input response
    #[arg(long)]
    mock_invalid: bool,

    /// Print every registered method and exit
    #[arg(long)]
    list_methods: bool,

    /// Tool used to enter the chroot
    #[arg(long, env = ENV_ENTER_COMMAND)]
    enter_command: Option<String>,

    /// Entry point re-invoked inside the chroot
    #[arg(long, env = ENV_SANDBOX_ENTRY)]
    sandbox_entry: Option<String>,

    /// File whose presence means we already run inside the chroot
    #[arg(long, env = ENV_SANDBOX_MARKER)]
    sandbox_marker: Option<PathBuf>,

    /// Chroot used when a request names none
    #[arg(long, env = ENV_DEFAULT_SANDBOX)]
    default_sandbox: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn call_type(&self) -> CallType {
        if self.validate_only {
            CallType::ValidateOnly
        } else if self.mock_call {
            CallType::MockSuccess
        } else if self.mock_failure {
            CallType::MockFailure
        } else if self.mock_invalid {
            CallType::MockInvalid
        } else {
            CallType::Execute
        }
    }

    fn settings(&self) -> Settings {
        let mut settings = Settings::from_env();
        if let Some(command) = &self.enter_command {
            settings.enter_command = command.clone();
        }
        if let Some(entry) = &self.sandbox_entry {
            settings.sandbox_entry = entry.clone();
        }
        if let Some(marker) = &self.sandbox_marker {
            settings.sandbox_marker = marker.clone();
        }
        if let Some(root) = &self.default_sandbox {
            settings.default_sandbox = root.clone();
        }
        settings
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    buildapi_core::telemetry::init_tracing(cli.json, level);

    match run(&cli) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            let code = match err.downcast_ref::<RouterError>() {
                Some(router_err) => {
                    error!(
                        kind = router_err.kind(),
                        fatal = router_err.is_fatal(),
                        "Build API call failed"
                    );
                    router_err.exit_code()
                }
                None => 1,
            };
            eprintln!("Error: {err:#}");
            ExitCode::from(code)
        }
    }
}

fn build_router(settings: Settings) -> Result<Router> {
    let mut router = Router::new(settings);
    router
        .register(&api::service_module())
        .context("Failed to register built-in services")?;
    let methods = router.list_methods();
    router.register_controller(api::MODULE, api::controller(methods));
    Ok(router)
}

fn run(cli: &Cli) -> Result<u8> {
    let router = build_router(cli.settings())?;

    if cli.list_methods {
        for method in router.list_methods() {
            println!("{method}");
        }
        return Ok(0);
    }

    let (service, method) = parse_method(cli.method.as_deref().unwrap_or_default())?;
    let input = cli.input_json.as_deref().context("--input-json is required")?;
    let output = cli.output_json.as_deref().context("--output-json is required")?;

    let code = router.route(
        service,
        method,
        input,
        output,
        &CallConfig::new(cli.call_type()),
    )?;
    Ok(exit_status(code))
}

fn parse_method(arg: &str) -> Result<(&str, &str)> {
    match arg.split_once('/') {
        Some((service, method)) if !service.is_empty() && !method.is_empty() => {
            Ok((service, method))
        }
        _ => anyhow::bail!("expected <service>/<method>, got {arg:?}"),
    }
}

/// Codes outside `0..=255` (a child killed by a signal reports `-1`) exit 255.
fn exit_status(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(u8::MAX)
}
