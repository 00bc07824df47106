use clap::Parser;

use live_console::common::init_tracing;
use live_console::{Cli, Commands, ConsoleConfig, run_serve};

fn main() {
    let cli = Cli::parse();
    let _telemetry = init_tracing("info");

    let result = match cli.command {
        Commands::Serve(args) => run_serve(ConsoleConfig::from(args)),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        eprintln!("Suggestion: {}", e.suggestion());
        std::process::exit(e.exit_code());
    }
}
