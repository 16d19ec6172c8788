// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! RWT Remote Object Client CLI
//!
//! Opens a session against a server endpoint, mirrors its widget tree and
//! follows server push until interrupted.
//!
//! # Usage
//!
//! ```bash
//! # Connect to an endpoint
//! rwt-remote --url http://localhost:8080/rap
//!
//! # Without the server push channel
//! rwt-remote --url http://localhost:8080/rap --no-server-push
//!
//! # Using configuration file
//! rwt-remote --config client.toml
//! ```

use clap::{Parser, Subcommand};
use rwt_remote::{
    widgets, ClientConfig, ConfigError, Connection, ConnectionError, ConnectionStatsSnapshot,
    RetryConfig, Session, SessionEvent,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// RWT Remote Object Client
#[derive(Parser, Debug)]
#[command(name = "rwt-remote")]
#[command(about = "RWT Remote Object Client - mirror a server-owned widget tree")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server endpoint URL
    #[arg(short, long, conflicts_with = "config")]
    url: Option<String>,

    /// Connection id sent with every request
    #[arg(long, conflicts_with = "config")]
    connection_id: Option<String>,

    /// Disable the server push channel
    #[arg(long, conflicts_with = "config")]
    no_server_push: bool,

    /// Request timeout (milliseconds)
    #[arg(long, default_value = "30000")]
    timeout_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate example configuration file
    GenConfig {
        /// Output file path
        #[arg(short, long, default_value = "client.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if let Some(cmd) = args.command {
        return match cmd {
            Commands::GenConfig { output } => cmd_gen_config(output),
            Commands::Validate { config } => cmd_validate(config),
        };
    }

    let config = build_config(&args)?;

    println!("RWT Remote Object Client v{}", env!("CARGO_PKG_VERSION"));
    println!("=====================================");
    println!();
    println!("Endpoint:    {}", config.url);
    println!(
        "Server push: {}",
        if config.server_push.enabled {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!();

    let connection = Connection::open(config, widgets::standard_registry()?)?;
    let (mut session, handle, mut events) = Session::new(connection)?;
    let report = session.start().await?;
    println!(
        "Initial batch: {} applied, {} failed",
        report.applied,
        report.failures.len()
    );
    println!("Press Ctrl+C to stop...");
    println!();

    let session_task = tokio::spawn(session.run());

    let events_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::Flushed(report) => {
                    tracing::info!(
                        "Batch applied: {} ok, {} failed, {} created, {} destroyed",
                        report.applied,
                        report.failures.len(),
                        report.created.len(),
                        report.destroyed.len()
                    );
                    for failure in &report.failures {
                        tracing::warn!("  {}", failure);
                    }
                }
                SessionEvent::ServerError { status, message } => {
                    tracing::error!("Server error ({}): {}", status, message);
                }
                SessionEvent::ConnectionFailed { attempts } => {
                    tracing::error!("Connection lost after {} attempts", attempts);
                }
                SessionEvent::ProtocolError(message) => {
                    tracing::error!("Protocol error: {}", message);
                }
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    println!("\nShutting down...");
    // Already closed if the session loop ended on its own.
    let _ = handle.shutdown().await;

    let stats = session_task.await?;
    events_task.abort();

    println!("\nFinal Statistics:");
    print_stats(&stats);
    Ok(())
}

fn build_config(args: &Args) -> Result<ClientConfig, ConnectionError> {
    if let Some(ref config_path) = args.config {
        return Ok(ClientConfig::from_file(config_path)?);
    }

    let url = args.url.clone().ok_or_else(|| {
        ConnectionError::Config(ConfigError::Invalid(
            "Missing --url (or use --config)".into(),
        ))
    })?;

    let mut config = ClientConfig::new(url).with_request_timeout(Duration::from_millis(args.timeout_ms));
    if let Some(ref id) = args.connection_id {
        config = config.with_connection_id(id.clone());
    }
    if args.no_server_push {
        config = config.without_server_push();
    }
    config.log_level = args.log_level.clone();

    config.validate()?;
    Ok(config)
}

/// Comment lines placed above keys and tables of the generated file.
const CONFIG_COMMENTS: &[(&str, &str)] = &[
    ("url", "Server endpoint (http or https)"),
    (
        "request_timeout_ms",
        "Timeout for each POST (milliseconds). Push requests never time out",
    ),
    ("log_level", "Log level (trace, debug, info, warn, error)"),
    (
        "connection_id",
        "Sent as connectionId in every request head and as cid on push requests",
    ),
    (
        "[retry]",
        "Connection errors are retried after base_delay_ms * n",
    ),
    ("max_retries", "Retries after the first failure before giving up"),
    (
        "[server_push]",
        "Long-poll channel the server uses to wake the client",
    ),
    ("service_handler", "Value of the servicehandler query parameter"),
];

fn example_config_toml(config: &ClientConfig) -> Result<String, toml::ser::Error> {
    let body = toml::to_string_pretty(config)?;

    let mut content = String::from(
        "# RWT Remote Client Configuration\n# Generated by rwt-remote gen-config\n\n",
    );
    for line in body.lines() {
        let key = line.split('=').next().unwrap_or_default().trim();
        if let Some((_, comment)) = CONFIG_COMMENTS.iter().find(|(k, _)| *k == key) {
            content.push_str("# ");
            content.push_str(comment);
            content.push('\n');
        }
        content.push_str(line);
        content.push('\n');
    }
    Ok(content)
}

fn cmd_gen_config(output: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = ClientConfig::new("http://localhost:8080/rap")
        .with_request_timeout(Duration::from_secs(30))
        .with_retry(RetryConfig::new(Duration::from_secs(1), 3))
        .with_connection_id("example");

    std::fs::write(&output, example_config_toml(&config)?)?;
    println!("Generated configuration file: {}", output.display());
    Ok(())
}

fn cmd_validate(config_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    match ClientConfig::from_file(&config_path) {
        Ok(config) => {
            println!("Configuration valid!");
            println!();
            println!("Endpoint: {}", config.url);
            println!("Timeout:  {:?}", config.request_timeout());
            println!(
                "Retry:    {} x {:?} (linear)",
                config.retry.max_retries,
                config.retry.base_delay()
            );
            println!(
                "Push:     {}",
                if config.server_push.enabled {
                    config.server_push.service_handler.as_str()
                } else {
                    "disabled"
                }
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration invalid: {}", e);
            std::process::exit(1);
        }
    }
}

fn print_stats(stats: &ConnectionStatsSnapshot) {
    println!("--- Connection Statistics ---");
    println!("  Messages sent:        {}", stats.messages_sent);
    println!("  Operations sent:      {}", stats.operations_sent);
    println!("  Retries:              {}", stats.retries);
    println!("  Instructions applied: {}", stats.instructions_applied);
    println!("  Instruction failures: {}", stats.instruction_failures);
}
