use clap::Parser;
use skarv_server::Store;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "skarv-server", about = "Reference archive server for skarv")]
struct Cli {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:8431")]
    bind: String,

    /// Require this bearer token on every request.
    #[arg(long)]
    token: Option<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("SKARV_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    info!("starting skarv-server on {}", cli.bind);
    if cli.token.is_some() {
        info!("bearer token required");
    }

    let store = Arc::new(Store::new(cli.token));
    skarv_server::run_server(&store, &cli.bind);
}
