use clap::Parser;
use log::{error, info};
use server::auth::{CredentialStore, DEFAULT_CREDENTIALS_FILE};
use server::network::{Server, ServerConfig};
use server::pool::DEFAULT_WORKERS;
use shared::DEFAULT_PORT;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: IpAddr,

    /// Server port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Number of worker threads serving clients
    #[arg(short, long, default_value_t = DEFAULT_WORKERS)]
    workers: usize,

    /// Seed for mine placement, for reproducible boards
    #[arg(short, long)]
    seed: Option<u64>,

    /// Credential file with one `username password` pair per line
    #[arg(short, long, default_value = DEFAULT_CREDENTIALS_FILE)]
    credentials: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let credentials = CredentialStore::load(&args.credentials)?;
    let config = ServerConfig {
        bind_addr: SocketAddr::new(args.host, args.port),
        workers: args.workers,
        seed: args.seed,
    };

    let server = Server::bind(&config, Arc::new(credentials))?;
    let shutdown = server.shutdown_handle();

    let mut serving = tokio::task::spawn_blocking(move || server.run());

    tokio::select! {
        result = &mut serving => {
            if let Err(e) = result {
                error!("Server thread panicked: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
            shutdown.shutdown();
            serving.await?;
        }
    }

    Ok(())
}
