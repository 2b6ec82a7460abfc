//! Triage CLI and HTTP API entry point.
//!
//! Binary name: `triage`
//!
//! Parses CLI arguments, loads config, builds the cascade, then dispatches
//! to the appropriate command handler or starts the HTTP server.

mod cli;
mod http;
mod state;

use anyhow::anyhow;
use clap::Parser;

use cli::{Cli, Commands};
use state::AppState;
use triage_infra::authority::build_validator;
use triage_infra::config::load_global_config;
use triage_types::cascade::CascadeContext;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up tracing based on verbosity
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,triage=debug",
        _ => "trace",
    };
    triage_observe::tracing_setup::init_tracing(filter, cli.otel).map_err(|e| anyhow!("{e}"))?;

    let config = load_global_config(&cli.config).await;

    match cli.command {
        Commands::Config => {
            cli::config::show_config(&config, cli.json)?;
        }

        Commands::CheckLinks { input } => {
            let validator = build_validator(&config.validator)?;
            let ok = cli::check_links::check_links(&validator, input, cli.json).await?;
            if !ok {
                triage_observe::tracing_setup::shutdown_tracing();
                std::process::exit(1);
            }
        }

        Commands::Ask {
            question,
            name,
            plan,
            admin,
            origin_url,
            no_stream,
        } => {
            let state = AppState::init(config)?;
            let options = cli::ask::AskOptions {
                question,
                context: CascadeContext {
                    name,
                    plan,
                    is_admin: admin,
                    origin_url,
                },
                no_stream,
                json: cli.json,
                quiet: cli.quiet,
                verbose: cli.verbose > 0,
            };
            cli::ask::ask(&state, options).await?;
        }

        Commands::Serve { port, host } => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            let state = AppState::init(config)?;

            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;

            println!();
            println!(
                "  {} Triage API listening on {}",
                console::style("⚡").bold(),
                console::style(format!("http://{addr}")).cyan()
            );
            println!(
                "  {} router {} · heavy {}",
                console::style("·").dim(),
                state.config.cascade.router_model,
                state.config.cascade.heavy_model
            );
            println!("  {}", console::style("Press Ctrl+C to stop").dim());
            println!();

            let router = http::router::build_router(state);
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            println!("\n  Server stopped.");
        }
    }

    triage_observe::tracing_setup::shutdown_tracing();
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
