use crate::cli::{Cli, Command};
use crate::commands;
use crate::context::AppContext;
use crate::error::AppResult;
use crate::logging;

pub async fn run(cli: Cli) -> AppResult<()> {
    let Cli {
        profile,
        json,
        verbose,
        command,
    } = cli;

    logging::init(verbose);
    let ctx = AppContext::bootstrap(profile, json, verbose)?;

    match command {
        Command::Scan(args) => commands::scan::run(&ctx, args).await,
        Command::Stats(args) => commands::stats::run(&ctx, args).await,
        Command::Clean(args) => commands::clean::run(&ctx, args).await,
        Command::Config(args) => commands::config::run(&ctx, args.command),
    }
}
