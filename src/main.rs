mod app;
mod cli;
mod cmd;
mod config;
mod logger;
mod progress;
mod sandbox;
mod shell;
mod user;

#[cfg(test)]
mod test_support;

use std::process::ExitCode;

use clap::Parser;
use tracing::{debug, error};

fn main() -> ExitCode {
    let opts = cli::Opts::parse();
    if let Err(err) = logger::init(opts.verbose) {
        eprintln!("oe: {err:#}");
    }
    debug!(?opts, "oe start");

    match app::run(opts) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
