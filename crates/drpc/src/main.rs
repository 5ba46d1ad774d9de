// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::io::{self, BufReader};

use clap::{Parser, Subcommand};
use log::{info, LevelFilter};

use drpc::service;
use drpc_connection::{Launcher, LauncherConfig};
use drpc_dispatch::MethodKind;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Hosts the built-in demo service over stdin/stdout.
    Serve {
        /// Display verbose output (defaults to warnings).
        #[arg(short, long)]
        verbose: bool,

        /// Log every inbound frame at trace level.
        #[arg(long)]
        trace_frames: bool,
    },
    /// Prints the demo service's method table.
    Methods,
}

fn initialize_logger(verbose: bool) {
    let level = if verbose {
        LevelFilter::Trace
    } else {
        LevelFilter::Warn
    };
    // Logs go to stderr; stdout carries the protocol frames.
    env_logger::Builder::new().filter(None, level).init();
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            verbose,
            trace_frames,
        } => {
            initialize_logger(verbose);
            let registry = match service::build_registry() {
                Ok(registry) => registry,
                Err(err) => {
                    eprintln!("invalid service description: {err}");
                    std::process::exit(1);
                }
            };

            let config = LauncherConfig {
                trace_frames,
                ..LauncherConfig::default()
            };
            let launcher = Launcher::with_config(
                registry,
                BufReader::new(io::stdin()),
                io::stdout(),
                config,
            );

            info!("listening on stdin");
            if let Err(err) = launcher.listen() {
                eprintln!("connection failed: {err}");
                std::process::exit(1);
            }
        }
        Commands::Methods => {
            let registry = match service::build_registry() {
                Ok(registry) => registry,
                Err(err) => {
                    eprintln!("invalid service description: {err}");
                    std::process::exit(1);
                }
            };
            let mut methods: Vec<_> = registry.methods().collect();
            methods.sort_by_key(|(name, _)| name.to_string());
            for (name, kind) in methods {
                let kind = match kind {
                    MethodKind::Request => "request",
                    MethodKind::Notification => "notification",
                };
                println!("{name:<24} {kind}");
            }
        }
    }
}
