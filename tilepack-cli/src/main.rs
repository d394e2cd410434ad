mod assign;
mod build;
mod merge;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "tilepack")]
#[command(about = "Harvest map tiles into single-file archives", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch every tile in a bounding box and pack an archive
    Build(build::Args),
    /// Union several MBTiles archives into one
    Merge(merge::Args),
    /// Compute and store spatial metadata for existing MBTiles archives
    AssignMetadata(assign::Args),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger from RUST_LOG environment variable
    // Example: RUST_LOG=debug tilepack build ...
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build(args) => build::run(args).await,
        Commands::Merge(args) => merge::run(args),
        Commands::AssignMetadata(args) => assign::run(args),
    }
}
