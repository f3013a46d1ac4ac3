use clap::Parser;
use std::error::Error;

use kestrel_db::cli;
use kestrel_db::server::handler::Server;

fn main() -> Result<(), Box<dyn Error>> {
    let cli = cli::Cli::parse();
    match &cli.command {
        cli::Commands::Run(config) => {
            kestrel_db::init_tracing(&config.log_level);
            let server = Server::new(config)?;
            server.start()?;
        }
    }
    Ok(())
}
