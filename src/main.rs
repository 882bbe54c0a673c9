mod cli;
mod commands;
mod config;
mod engine;
mod progress;
mod resource;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub connection: cli::ConnectionArgs,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        connection: cli.connection,
    };

    match cli.command {
        Command::Resources => commands::resources::run(&ctx),
        Command::Show(args) => {
            commands::declarative::show(&ctx, &args.resource, args.key.as_deref())
        }
        Command::Check(args) => commands::declarative::check(&ctx, &args),
        Command::Apply(args) => commands::declarative::apply(&ctx, &args),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "opnrecon", &mut io::stdout());
            Ok(())
        }
    }
}
