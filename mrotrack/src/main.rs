//! mrotrack Server Entry Point

use clap::Parser;
use mrotrack::cli::{backup, custody, serve, Cli, Commands};
use mrotrack::logging;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let storage = cli.storage_config();

    // サーバーはファイルにもJSONログを残す。他のコマンドは標準エラーのみ
    let log_dir = match &cli.command {
        None | Some(Commands::Serve(_)) => Some(logging::log_dir(&storage.data_dir)),
        _ => None,
    };
    if let Err(e) = logging::init(log_dir.as_deref()) {
        eprintln!("Error: failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    let result = match &cli.command {
        Some(Commands::Custody(args)) => custody::execute(args, &storage).await,
        Some(Commands::Backup(args)) => backup::execute(args, &storage).await,
        Some(Commands::Restore(args)) => backup::execute_restore(args, &storage).await,
        Some(Commands::Serve(args)) => serve::execute(args, storage).await.map(|()| true),
        None => {
            // No subcommand - default to serve
            let args = serve::ServeArgs::default();
            serve::execute(&args, storage).await.map(|()| true)
        }
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
