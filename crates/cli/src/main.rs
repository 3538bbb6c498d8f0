// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! `lazycluster` - manage remote runtimes and clusters over SSH.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

mod commands;
mod ssh_config;

#[derive(Parser)]
#[command(name = "lazycluster", version, about = "Distributed machine learning for lazy people")]
struct Cli {
    /// Verbose logging.
    #[arg(long, global = true)]
    debug: bool,

    /// Errors only (the default).
    #[arg(long, global = true, conflicts_with = "debug")]
    no_debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Persist an SSH config entry for a runtime.
    AddRuntime {
        /// Name of the config entry.
        name: String,
        /// Connection string, `user@host[:port]`.
        connection_uri: String,
        /// Private key file used for authentication.
        #[arg(long)]
        id_file: Option<PathBuf>,
        /// Custom ssh options, one `Key Value` pair per occurrence.
        #[arg(long)]
        options: Vec<String>,
        /// The ssh config file to edit.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Delete a runtime's SSH config entry.
    DeleteRuntime {
        /// Name of the config entry.
        name: String,
        /// The ssh config file to edit.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Discover valid runtimes and print them.
    ListRuntimes {
        /// Print detailed information about the runtimes.
        #[arg(short, long)]
        long: bool,
    },
    /// Start a Dask cluster on all detected runtimes and block.
    StartDask,
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "error" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    // When invoked as the uploaded function agent this executes the
    // payload and exits instead of parsing arguments.
    lc_core::agent_guard();

    let cli = Cli::parse();
    let debug = cli.debug && !cli.no_debug;
    init_tracing(debug);

    let result = match cli.command {
        Command::AddRuntime {
            name,
            connection_uri,
            id_file,
            options,
            config,
        } => commands::runtime::add(&name, &connection_uri, id_file, &options, config),
        Command::DeleteRuntime { name, config } => commands::runtime::delete(&name, config).await,
        Command::ListRuntimes { long } => commands::runtime::list(long).await,
        Command::StartDask => commands::dask::start(debug).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {:#}", error);
            ExitCode::FAILURE
        }
    }
}
