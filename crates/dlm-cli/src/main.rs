use dlm_core::logging;

mod cli;

use crate::cli::CliCommand;

fn main() {
    // Initialize logging as early as possible.
    logging::init();

    if let Err(err) = CliCommand::run_from_args() {
        eprintln!("dlm error: {:#}", err);
        std::process::exit(1);
    }
}
