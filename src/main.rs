mod aggregate;
mod catalogue;
mod cli;
mod coregister;
mod corruption;
mod dates;
mod error;
mod export;
mod fetch;
mod raster;
mod roi;

use anyhow::{Error, Result};
use clap::Parser;
use cli::{command, Cli, Commands};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Csv(args) => match command::csv(args).await {
            Ok(path) => println!("CSV saved to `{}`", path.display()),
            Err(e) => eprintln!("Error: {}", e),
        },
        Commands::Download(args) => match command::download(args).await {
            Ok(folder) => println!("Files saved to `{}`", folder.display()),
            Err(e) => eprintln!("Error: {}", e),
        },
    }

    Ok(())
}
