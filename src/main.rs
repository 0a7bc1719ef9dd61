use clap::Parser;
use std::time;
use vcfclean::{
    cli::{init_verbose, Cli, Command},
    commands::{annotate, collate, filter},
    core::header::FULL_VERSION,
    utils::util::{handle_error_and_exit, peak_memory_usage, readable_size, Result},
};

fn runner() -> Result<()> {
    let cli = Cli::parse();
    init_verbose(&cli);
    log::trace!("CLI options set: {:?}", cli);

    log::info!(
        "Running {}-{} [{}]",
        env!("CARGO_PKG_NAME"),
        &**FULL_VERSION,
        cli.command.name()
    );

    let start_timer = time::Instant::now();
    match cli.command {
        Command::Filter(args) => {
            log::trace!("Filter arguments: {:#?}", args);
            filter(args)?
        }
        Command::Collate(args) => {
            log::trace!("Collate arguments: {:#?}", args);
            collate(args)?
        }
        Command::Annotate(args) => {
            log::trace!("Annotate arguments: {:#?}", args);
            annotate(args)?
        }
    }
    log::info!("Total execution time: {:.2?}", start_timer.elapsed());

    match peak_memory_usage() {
        Ok(bytes) => {
            let (size, unit) = readable_size(bytes);
            log::info!("Peak memory use: {:.2} {}", size, unit);
        }
        Err(e) => log::debug!("Peak memory use unavailable: {e}"),
    }

    log::info!("{} end", env!("CARGO_PKG_NAME"));
    Ok(())
}

fn main() {
    if let Err(e) = runner() {
        handle_error_and_exit(e);
    }
}
