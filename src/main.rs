// graph_bulk_importer/src/main.rs
// Entry point for the graph-bulk-importer CLI.

use std::future::Future;

use clap::Parser;
use graph_bulk_importer::cli::{Cli, Commands, ImportArgs};
use graph_bulk_importer::driver::ImportDriver;
use graph_bulk_importer::error::Result;
use graph_bulk_importer::file::FileLoader;
use graph_bulk_importer::loader::{BulkLoader, CancelToken, LoaderConfig};
use graph_bulk_importer::neo4j::Neo4jLoader;
use tracing::{error, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<(),> {
    let cli = Cli::parse();

    let file_appender = tracing_appender::rolling::never(&cli.log_dir, "importer.log",);
    let (non_blocking, _guard,) = tracing_appender::non_blocking(file_appender,);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info",),),)
        .with(fmt::layer().with_writer(std::io::stderr,),)
        .with(fmt::layer().with_writer(non_blocking,).with_ansi(false,),)
        .init();

    let cancel = CancelToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling import");
            on_signal.cancel();
        }
    },);

    match &cli.command {
        Commands::Neo4j(args,) => handle_import(args, Neo4jLoader::new, &cancel,).await,
        Commands::File(args,) => handle_import(args, FileLoader::new, &cancel,).await,
    }
}

async fn handle_import<L: BulkLoader, F,>(
    args: &impl ImportArgs,
    loader_factory: impl FnOnce(LoaderConfig,) -> F,
    cancel: &CancelToken,
) -> Result<(),>
where
    F: Future<Output = Result<L,>,>,
{
    let config = args.import_config();
    let loader = match loader_factory(config.loader.clone(),).await {
        Ok(loader,) => loader,
        Err(e,) => {
            error!("Failed to create loader: {}", e);
            return Err(e,);
        },
    };

    let driver = ImportDriver::new(loader, config,);
    let summary = driver.run(cancel,).await?;
    println!("\n{}\n", summary);
    Ok((),)
}
