mod app;
mod commands;
mod output;

use clap::Parser;

use crate::app::{Cli, Command};

fn main() -> anyhow::Result<()> {
    ctrlc::set_handler(|| {
        eprintln!("\nCancelled.");
        std::process::exit(130);
    })
    .expect("failed to set Ctrl+C handler");

    let cli = Cli::parse();

    // Show cilprobe info+ on stderr unless --json; --verbose enables debug; RUST_LOG overrides
    if !cli.global.json {
        let level = if cli.global.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        };
        env_logger::Builder::new()
            .filter_module("cilprobe", level)
            .parse_default_env()
            .target(env_logger::Target::Stderr)
            .format_timestamp(None)
            .format_module_path(false)
            .format_target(false)
            .init();
    }

    match &cli.command {
        Command::Dump { path } => commands::dump::run(path, &cli.global),
        Command::Instrument {
            path,
            points,
            token,
            function,
            signature,
            pointer32,
            output,
            no_sequence,
            no_branches,
            force,
            extra_max_stack,
        } => commands::instrument::run(
            path,
            &commands::instrument::InstrumentOptions {
                points,
                token: token.as_deref(),
                function: function.as_deref(),
                signature: signature.as_deref(),
                pointer32: *pointer32,
                output,
                sequence: !*no_sequence,
                branches: !*no_branches,
                force: *force,
                extra_max_stack: *extra_max_stack,
                global: &cli.global,
            },
        ),
    }
}
