//! stagehub - review staged text and publish approved content

use std::process::ExitCode;

fn main() -> ExitCode {
    if let Err(e) = stagehub::cli::run() {
        eprintln!("Error: {:#}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
