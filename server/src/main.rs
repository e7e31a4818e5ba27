use clap::Parser;
use log::{error, info};
use rps_server::handler::IdleTimeouts;
use rps_server::network::{BoxError, Server, ServerConfig};
use std::time::Duration;

/// Main-method of the application.
/// Parses command-line arguments, binds the listener and serves until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), BoxError> {
    env_logger::init();

    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value = "8080")]
        port: u16,
        /// Seconds a new connection may take to send a nickname
        #[clap(long, default_value = "180")]
        nick_timeout: u64,
        /// Seconds a registered player may wait for an opponent
        #[clap(long, default_value = "180")]
        wait_timeout: u64,
        /// Seconds a player in a match may stay silent
        #[clap(long, default_value = "120")]
        game_timeout: u64,
        /// Longest accepted input line in bytes
        #[clap(long, default_value = "256")]
        max_line: usize,
    }

    let args = Args::parse();

    let config = ServerConfig {
        addr: format!("{}:{}", args.host, args.port),
        timeouts: IdleTimeouts {
            nickname: Duration::from_secs(args.nick_timeout),
            waiting: Duration::from_secs(args.wait_timeout),
            in_match: Duration::from_secs(args.game_timeout),
        },
        max_line_length: args.max_line,
    };

    let server = Server::bind(config).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped: {}", e);
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
