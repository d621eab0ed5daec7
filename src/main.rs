use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use pingscope_core::{ClientId, LookupError};
use pingscope_extension::{extension_information, PingScopeExtension};
use pingscope_host::{Host, HostConfig, HostError};
use pingscope_telemetry::{init_telemetry, LogQuery, TelemetryConfig};
use tokio::runtime::Handle;
use tracing::Level;

/// Boot an in-process host, load the PINGREQ extension and drive some
/// keep-alive traffic through it.
#[derive(Debug, Parser)]
#[command(name = "pingscope", version)]
struct Args {
    /// Number of simulated clients.
    #[arg(long, default_value_t = 3)]
    clients: usize,

    /// PINGREQ packets sent by each client.
    #[arg(long, default_value_t = 2)]
    pings: usize,

    /// Artificial session lookup latency.
    #[arg(long, default_value_t = 50)]
    latency_ms: u64,

    /// Make lookups of every Nth client fail (0 disables).
    #[arg(long, default_value_t = 0)]
    fail_every: usize,

    /// Session expiry interval given to every client, in seconds.
    #[arg(long, default_value_t = 3600)]
    session_expiry: u64,

    /// Emit JSON log lines.
    #[arg(long)]
    json: bool,

    #[arg(long, default_value_t = Level::INFO)]
    log_level: Level,

    /// Raise or lower one module's level after startup, as `module=level`.
    /// Replaces any RUST_LOG directives. May be repeated.
    #[arg(long = "module-level", value_parser = parse_module_level)]
    module_levels: Vec<(String, Level)>,
}

fn parse_module_level(raw: &str) -> Result<(String, Level), String> {
    let (module, level) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected module=level, got {raw:?}"))?;
    let level = level
        .parse::<Level>()
        .map_err(|e| format!("invalid level {level:?}: {e}"))?;
    Ok((module.to_string(), level))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let telemetry = init_telemetry(TelemetryConfig {
        log_level: args.log_level,
        json: args.json,
        ..Default::default()
    })?;

    for (module, level) in &args.module_levels {
        telemetry.set_module_level(module, *level)?;
    }
    if !args.module_levels.is_empty() {
        tracing::info!(overrides = ?telemetry.module_levels(), "module log levels applied");
    }

    tracing::info!("Starting pingscope demo host");

    let host = Host::new(
        HostConfig {
            lookup_latency: Duration::from_millis(args.latency_ms),
            ..Default::default()
        },
        Handle::current(),
    );

    let state = host.load_extension(extension_information(), Arc::new(PingScopeExtension::new()))?;
    tracing::info!(state = ?state, "extension load finished");

    let mut connections = Vec::with_capacity(args.clients);
    for i in 0..args.clients {
        let client_id = ClientId::from_raw(format!("client-{i}"));
        if args.fail_every > 0 && (i + 1) % args.fail_every == 0 {
            host.sessions().fail_lookups_for(
                client_id.clone(),
                LookupError::Unavailable("simulated store outage".into()),
            );
        }
        connections.push(host.connect(client_id, args.session_expiry)?);
    }

    // One blocking thread per client stands in for the broker's I/O threads.
    let mut workers = Vec::with_capacity(connections.len());
    for connection in connections {
        let pings = args.pings;
        workers.push(tokio::task::spawn_blocking(move || {
            for _ in 0..pings {
                connection.receive_pingreq()?;
            }
            Ok::<_, HostError>(())
        }));
    }
    for worker in workers {
        worker.await??;
    }

    // Lookups finish on their own; give them time before reporting.
    tokio::time::sleep(host.config().lookup_latency + Duration::from_millis(100)).await;

    let errors = telemetry.logs().map_or(0, |logs| {
        logs.query(&LogQuery {
            level: Some("ERROR".into()),
            ..Default::default()
        })
        .len()
    });
    tracing::info!(
        lookups = host.sessions().total_lookups(),
        errors,
        "demo finished"
    );

    host.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_level_flag_parses() {
        let args = Args::parse_from([
            "pingscope",
            "--module-level",
            "pingscope_host=debug",
            "--module-level",
            "pingscope_extension=warn",
        ]);
        assert_eq!(
            args.module_levels,
            vec![
                ("pingscope_host".to_string(), Level::DEBUG),
                ("pingscope_extension".to_string(), Level::WARN),
            ]
        );
    }

    #[test]
    fn module_level_without_separator_is_rejected() {
        assert!(parse_module_level("pingscope_host").is_err());
        assert!(parse_module_level("pingscope_host=loud").is_err());
    }
}
