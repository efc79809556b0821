use clap::Parser;
use env_logger::Env;
use log::info;
use server::config::ServerConfig;
use server::network::Server;

/// Main-method of the application.
/// Parses command-line arguments, binds the listener and serves until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Address to listen on
        #[clap(short, long, default_value = "0.0.0.0:25565")]
        address: String,
        /// Maximum number of players online at once
        #[clap(short, long, default_value = "20")]
        max_players: usize,
    }

    let args = Args::parse();
    let server = Server::bind(ServerConfig::new(args.address, args.max_players)).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
