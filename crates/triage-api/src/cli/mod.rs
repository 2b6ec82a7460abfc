//! CLI command definitions for the `triage` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod ask;
pub mod check_links;
pub mod config;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use triage_infra::config::DEFAULT_CONFIG_FILE;

/// Answer support questions with a fast router and a retrieval-backed agent.
#[derive(Parser)]
#[command(name = "triage", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true, env = "TRIAGE_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export spans to stdout via OpenTelemetry.
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API server.
    Serve {
        /// Port to listen on (overrides config).
        #[arg(long)]
        port: Option<u16>,

        /// Host to bind (overrides config).
        #[arg(long)]
        host: Option<String>,
    },

    /// Ask one question and stream the answer.
    Ask {
        /// The customer's question.
        question: String,

        /// Customer display name.
        #[arg(long)]
        name: Option<String>,

        /// Customer plan (e.g. "pro").
        #[arg(long)]
        plan: Option<String>,

        /// Treat the customer as an account admin.
        #[arg(long)]
        admin: bool,

        /// Page the customer was on.
        #[arg(long)]
        origin_url: Option<String>,

        /// Wait for the full heavy answer instead of streaming it.
        #[arg(long)]
        no_stream: bool,
    },

    /// Validate help-center links in text or a list of URLs.
    #[command(name = "check-links")]
    CheckLinks {
        /// URLs or text to check. Reads stdin when empty.
        input: Vec<String>,
    },

    /// Print the effective configuration.
    Config,
}
