use clap::Parser;
use tracing::{error, info};

use pier::{
    cli::{Cli, Commands, ServeArgs},
    config::Config,
    probe, serve,
    telemetry::init_tracing,
};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(2);
        }
    };
    init_tracing(&config.log_filter);

    let serve_args = match cli.command {
        Some(Commands::Probe {
            url,
            name,
            timeout_secs,
            candidates,
        }) => {
            if let Err(e) = probe::run_probe(url, name, timeout_secs, candidates).await {
                error!("Probe failed: {}", e);
                std::process::exit(1);
            }
            return;
        }
        Some(Commands::Serve(args)) => args,
        None => ServeArgs::default(),
    };
    serve_args.apply(&mut config);

    let addr = config.listen_addr();
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = serve(listener, config, shutdown_signal()).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
    info!("pier stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
