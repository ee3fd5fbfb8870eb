use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use vigil_proxy::config::Config;
use vigil_proxy::proxy::ProxyServer;
use vigil_proxy::validation::DisabledValidator;

#[derive(Parser, Debug)]
#[command(name = "vigil-proxy", version, about = "OpenAPI compliance proxy")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long)]
    config: String,
    /// Override the configured listener port
    #[arg(short, long)]
    port: Option<u16>,
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    let mut config = match Config::from_file(&args.config) {
        Ok(config) => config,
        Err(err) => {
            error!("failed to load config: {err:#}");
            std::process::exit(1);
        }
    };
    if let Some(port) = args.port {
        config.listen.port = port;
    }

    info!("starting vigil on port {}", config.listen.port);

    let server = match ProxyServer::new(config, Arc::new(DisabledValidator)) {
        Ok(server) => server,
        Err(err) => {
            error!("failed to start: {err:#}");
            std::process::exit(1);
        }
    };

    if let Err(err) = server.run().await {
        error!("server error: {err:#}");
        std::process::exit(1);
    }
}
