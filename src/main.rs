use clap::Parser;
use log::warn;
use snafu::ErrorCompat;

mod args;
mod run;

use crate::args::Args;

fn main() {
    let args = Args::parse();
    let mut logger = env_logger::Builder::from_default_env();
    if args.verbose {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    if let Err(e) = run::run_pipeline(&args) {
        warn!("Error occured: {:?}", e);
        eprintln!("An error occured {}", e);
        match ErrorCompat::backtrace(&e) {
            Some(bt) => eprintln!("trace: {}", bt),
            None => eprintln!("No trace found"),
        }
        std::process::exit(1);
    }
}
