use linkding_launcher::{launcher, logging};
use std::process::ExitCode;

fn main() -> ExitCode {
    logging::setup_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match launcher::run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}
