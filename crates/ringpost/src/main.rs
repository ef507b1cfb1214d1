// SPDX-FileCopyrightText: 2026 Ringpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ringpost - multi-port outbound campaign dialer.
//!
//! This is the binary entry point for the dialer service and its operator CLI.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod serve;
mod status;
mod test_call;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ringpost_config::model::RingpostConfig;

/// Ringpost - multi-port outbound campaign dialer.
#[derive(Parser, Debug)]
#[command(name = "ringpost", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the XDG hierarchy.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the dialer: dispatch loops, watchdog and HTTP API.
    Serve,
    /// Inspect or reset device ports.
    Ports {
        #[command(subcommand)]
        action: PortsCommands,
    },
    /// Inspect dialer jobs.
    Jobs {
        #[command(subcommand)]
        action: JobsCommands,
    },
    /// Place a single test call for a campaign and hold it to the ceiling.
    TestCall {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        campaign: String,
        #[arg(long)]
        phone: String,
    },
}

#[derive(Subcommand, Debug)]
enum PortsCommands {
    /// List an owner's ports.
    List {
        #[arg(long)]
        owner: String,
        /// Output JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Register (or relabel) a device port.
    Register {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        number: u32,
        #[arg(long)]
        label: String,
    },
    /// Force every port of an owner back to available.
    Reset {
        #[arg(long)]
        owner: String,
    },
}

#[derive(Subcommand, Debug)]
enum JobsCommands {
    /// Show a job's status and counters.
    Status {
        job_id: String,
        #[arg(long)]
        owner: String,
        /// Output JSON instead of text.
        #[arg(long)]
        json: bool,
    },
}

fn load_config(path: Option<&std::path::Path>) -> RingpostConfig {
    let result = match path {
        Some(path) => ringpost_config::load_and_validate_path(path),
        None => ringpost_config::load_and_validate(),
    };
    match result {
        Ok(config) => config,
        Err(errors) => {
            ringpost_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref());

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Ports { action }) => match action {
            PortsCommands::List { owner, json } => status::run_ports_list(&config, &owner, json).await,
            PortsCommands::Register {
                owner,
                number,
                label,
            } => status::run_ports_register(&config, &owner, number, &label).await,
            PortsCommands::Reset { owner } => status::run_ports_reset(&config, &owner).await,
        },
        Some(Commands::Jobs { action }) => match action {
            JobsCommands::Status {
                job_id,
                owner,
                json,
            } => status::run_job_status(&config, &job_id, &owner, json).await,
        },
        Some(Commands::TestCall {
            owner,
            campaign,
            phone,
        }) => test_call::run_test_call(config, &owner, &campaign, &phone).await,
        None => {
            println!("ringpost: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
