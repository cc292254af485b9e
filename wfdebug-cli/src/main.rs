use clap::CommandFactory;
use is_terminal::IsTerminal;
use std::io::Write;
use std::process;
use tracing_subscriber::EnvFilter;
use wfdebug_cli::cli::{Cli, Commands};
use wfdebug_cli::compact::run_compact_error;
use wfdebug_cli::diagnose::run_diagnostic;
use wfdebug_cli::error::handle_cli_result;
use wfdebug_cli::exit_codes::{EXIT_ERROR, EXIT_SUCCESS};
use wfdebug_cli::tool_spec::run_tool_spec;

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();

    // Fast path for help - avoid loading configuration
    let Some(command) = &cli.command else {
        if Cli::command().print_help().is_err() {
            process::exit(EXIT_ERROR);
        }
        process::exit(EXIT_SUCCESS);
    };

    let log_level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "trace"
    } else if cli.debug {
        "debug"
    } else {
        "info"
    };

    // RUST_LOG wins over the flags
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_env_filter(filter)
        .init();

    let result = match command {
        Commands::ToolSpec { format } => run_tool_spec(*format),
        Commands::CompactError {
            message,
            with_context,
        } => run_compact_error(
            message.as_deref(),
            *with_context,
            std::io::stdin().lock(),
        ),
        diagnostic => {
            tracing::debug!("Running diagnostic command");
            run_diagnostic(&cli, diagnostic).await
        }
    };

    let exit_code = handle_cli_result(result.map(|output| {
        let mut stdout = std::io::stdout().lock();
        // Ignore write errors on a closed pipe
        let _ = writeln!(stdout, "{output}");
        let _ = stdout.flush();
    }));

    process::exit(exit_code);
}
