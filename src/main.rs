//! Confessor - chat bot that enrols direct-message senders into groups
//! and runs a guess-the-confessor game inside them.

use clap::Parser;
use std::process::ExitCode;

use confessor::{logging, Commands};

#[tokio::main]
async fn main() -> ExitCode {
    // Held for the life of the process so buffered file logs get flushed
    let _guard = match logging::init() {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let args = Commands::parse();

    match args.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Fatal: {}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
