use std::net::SocketAddr;

use clap::Parser;
use tracing::{error, info};
use wicketgate::cli::{
    Args, build_config, init_logging, open_database, validate_app_url, warn_insecure_defaults,
};
use wicketgate::{create_app, init_cleanup};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);
    warn_insecure_defaults(&args);

    let Some(app_url) = validate_app_url(&args.app_url) else {
        std::process::exit(1);
    };

    let Some(db) = open_database(&args.database).await else {
        std::process::exit(1);
    };

    let config = build_config(&args, db, &app_url);

    init_cleanup(&config.db).await;

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    let local_addr = match listener.local_addr() {
        Ok(addr) => addr,
        Err(e) => {
            error!(error = %e, "Failed to get local address");
            std::process::exit(1);
        }
    };

    let app = create_app(&config);

    info!(address = %local_addr, "Listening");

    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    if let Err(e) = axum::serve(listener, make_service).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
