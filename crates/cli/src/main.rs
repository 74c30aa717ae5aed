//! cascade CLI entry point.

// CLI binary needs to output to stdout/stderr - this is intentional
#![allow(clippy::print_stdout, clippy::print_stderr)]

use cascade::cli::{self, EXIT_FATAL, exit_code_for, render_error};
use cascade::commands;
use cascade::tracing::{TracingConfig, TracingFormat, init_tracing};

fn main() {
    // eprintln! in the panic hook: tracing may be unusable during a panic.
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panicked: {panic_info}");
        eprintln!("Internal error occurred. Run with RUST_LOG=debug for more information.");
    }));

    let cli = cli::parse();
    let json = cli.json;

    let tracing_config = TracingConfig {
        format: if json {
            TracingFormat::Json
        } else {
            TracingFormat::Compact
        },
        level: cli.level.into(),
        filter: None,
    };
    if let Err(e) = init_tracing(tracing_config) {
        eprintln!("Warning: {e}");
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Fatal error: Failed to create tokio runtime: {e}");
            std::process::exit(EXIT_FATAL);
        }
    };

    let exit_code = match rt.block_on(commands::run(cli)) {
        Ok(output) => {
            println!("{}", output.render(json));
            output.exit_code
        }
        Err(err) => {
            tracing::error!(error = %err, "Command failed");
            render_error(&err, json);
            exit_code_for(&err)
        }
    };
    std::process::exit(exit_code);
}
