use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use pos_cli::dispatch::DispatchMode;
use pos_cli::output::OutputFormat;
use pos_cli::timing::Timer;
use pos_cli::{
    build_command_tree, BackendInvoker, CliConfig, CliExitCode, CommandDispatcher, ConnectionOptions, Printer,
    StdinInput,
};
use pos_net::{TcpConnector, TcpSocket};

/// PoseidonOS command-line interface
///
/// Sends administrative commands to the PoseidonOS control plane.
/// Destructive commands ask for confirmation unless --force is given.
/// Run `poseidonos-cli <category> --help` for the commands of a category.
#[derive(Parser, Debug)]
#[command(name = "poseidonos-cli", version, about)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionOptions,

    /// Output format (table or json).
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    /// Enable verbose logging.
    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    /// Print the request that would be sent and exit without sending it.
    #[arg(long, default_value_t = false)]
    json_req: bool,

    /// Show timing information for the executed command.
    #[arg(long, default_value_t = false)]
    profile: bool,

    /// Command words, arguments and command flags, e.g. `devel resetmbr --force`.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                CliExitCode::Usage.into()
            } else {
                CliExitCode::Success.into()
            };
        }
    };

    let format = cli.format;
    match run(cli).await {
        Ok(code) => code.into(),
        Err(e) => {
            let _ = Printer::stdio(format).print_error(&format!("[internal] {:#}", e));
            CliExitCode::Internal.into()
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<CliExitCode> {
    let timer = cli.profile.then(|| Timer::start(cli.command.join(" ")));

    let config = CliConfig::from_options(&cli.connection).context("failed to load configuration")?;
    let log_config = if cli.verbose {
        config.log.clone().with_level("debug")
    } else {
        config.log.clone()
    };
    let _log_guard = pos_logging::init_logging(&log_config).context("failed to initialize logging")?;

    let tree = build_command_tree().context("invalid command tree")?;
    tracing::debug!(address = %config.control_plane.address, "control plane");

    let invoker = BackendInvoker::<TcpSocket>::new(
        Arc::new(TcpConnector),
        config.control_plane.clone(),
        config.retry.clone(),
    );
    let mode = if cli.json_req {
        DispatchMode::PrintRequest
    } else {
        DispatchMode::Execute
    };
    let dispatcher = CommandDispatcher::new(&tree, &invoker).with_mode(mode);

    let mut printer = Printer::stdio(cli.format);
    let code = dispatcher
        .run(&cli.command, &mut StdinInput, &mut std::io::stderr(), &mut printer)
        .await;

    if let Some(timer) = timer {
        timer.stop();
    }
    Ok(code)
}
