//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "binary"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Binary entrypoint for the gateway daemon."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use devgw_api::{spawn_api_server, ApiServer, ApiState};
use devgw_common::{init_tracing, AppConfig, LogFormat};
use devgw_devices::{build_gateways, GatewaySet};
use devgw_metrics::{new_registry, DaemonMetrics, GatewayMetrics, SharedRegistry};
use futures::future::join_all;
use serde_json::json;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Parser)]
#[command(
    author,
    version = concat!("devgwd ", env!("CARGO_PKG_VERSION")),
    about = "Device integration gateway daemon",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "FORMAT", help = "Override log format (pretty|structured-json)")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Start the gateways and serve the REST API")]
    Run,
    #[command(about = "Read one device once and print its data as JSON")]
    Read {
        device: String,
        #[arg(long, value_name = "NAME", help = "Print only this view")]
        view: Option<String>,
    },
    #[command(about = "Validate the configuration and print the effective settings")]
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/devgw.toml"));
    candidates.push(PathBuf::from("/etc/devgw/devgw.toml"));

    let loaded = AppConfig::load_with_source(&candidates)?;
    let mut config = loaded.config;
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            init_tracing("devgwd", &config.logging)?;
            info!(
                config_path = %loaded.source.display(),
                gateways = ?config.enabled_gateways(),
                "configuration loaded"
            );
            run_daemon(config).await?
        }
        Commands::Read { device, view } => {
            init_tracing("devgwd", &config.logging)?;
            read_once(&config, &device, view.as_deref()).await?
        }
        Commands::CheckConfig => println!("{}", render_config(&loaded.source, &config)?),
    }

    Ok(())
}

/// Effective configuration as TOML, credentials masked.
fn render_config(source: &Path, config: &AppConfig) -> Result<String> {
    let rendered =
        toml::to_string_pretty(&config.redacted()).context("failed to render configuration")?;
    Ok(format!(
        "# source: {}\n# gateways: {}\n{rendered}",
        source.display(),
        config.enabled_gateways().join(", ")
    ))
}

async fn run_daemon(config: AppConfig) -> Result<()> {
    let gateways = build_gateways(&config)?;

    let metrics = if config.metrics.enabled {
        let registry = new_registry();
        let gateway_metrics = Arc::new(GatewayMetrics::new(registry.clone())?);
        gateways.observe(gateway_metrics);
        let daemon_metrics = DaemonMetrics::new(&registry)?;
        let profile = if cfg!(debug_assertions) { "debug" } else { "release" };
        daemon_metrics.set_build_info(env!("CARGO_PKG_VERSION"), profile);
        Some((registry, daemon_metrics))
    } else {
        info!("metrics disabled by configuration");
        None
    };

    startup(&gateways, metrics.as_ref().map(|(_, daemon)| daemon)).await;

    let (stop_tx, stop_rx) = watch::channel(false);
    let poller = config
        .polling
        .interval
        .map(|interval| spawn_poller(gateways.clone(), interval, stop_rx));

    let mut api_server: Option<ApiServer> = None;
    if config.api.enabled {
        let registry: Option<SharedRegistry> =
            metrics.as_ref().map(|(registry, _)| registry.clone());
        let mut state = ApiState::new(gateways.clone());
        if let Some(registry) = registry {
            state = state.with_metrics(registry);
        }
        match spawn_api_server(Arc::new(state), config.api.listen) {
            Ok(server) => {
                info!(address = %server.addr(), "api server listening");
                api_server = Some(server);
            }
            Err(err) => {
                warn!(error = %err, "failed to start api server");
            }
        }
    } else {
        info!("api server disabled by configuration");
    }

    info!(gateways = ?gateways.names(), "daemon running; waiting for termination signal");
    signal::ctrl_c().await?;
    info!("ctrl-c received; shutting down");

    let _ = stop_tx.send(true);
    if let Some(poller) = poller {
        poller.await.context("polling task failed")?;
    }
    if let Some(server) = api_server {
        server.shutdown().await?;
    }

    Ok(())
}

/// One read per gateway, concurrently; the outcome is recorded as the startup flag.
async fn startup(gateways: &GatewaySet, metrics: Option<&DaemonMetrics>) {
    let outcomes = join_all(gateways.iter().map(|gateway| async move {
        let status = gateway.startup().await;
        (gateway.name(), status)
    }))
    .await;
    for (name, status) in outcomes {
        if let Some(metrics) = metrics {
            metrics.set_startup(name, status.is_good());
        }
        if !status.is_good() {
            warn!(gateway = name, status = %status, "startup read did not succeed");
        }
    }
}

fn spawn_poller(
    gateways: GatewaySet,
    interval: Duration,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<()> {
    info!(interval_s = interval.as_secs(), "background polling enabled");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = stop.changed() => break,
            }
            join_all(gateways.iter().map(|gateway| async move {
                if gateway.is_locked() {
                    debug!(gateway = gateway.name(), "skipping poll while busy");
                    return;
                }
                gateway.read_all().await;
            }))
            .await;
        }
        debug!("polling stopped");
    })
}

async fn read_once(config: &AppConfig, device: &str, view: Option<&str>) -> Result<()> {
    let gateways = build_gateways(config)?;
    let gateway = gateways
        .get(device)
        .ok_or_else(|| {
            anyhow!("device '{device}' is not configured; enabled: {:?}", gateways.names())
        })?;

    let status = gateway.read_all().await;
    let data = match view {
        Some(view) => gateway
            .view(view)
            .ok_or_else(|| anyhow!("{} has no view '{view}'", gateway.name()))?,
        None => gateway.data(),
    };
    let rendered = serde_json::to_string_pretty(&json!({ "status": status, "data": data }))?;
    println!("{rendered}");

    if status.is_bad() {
        return Err(anyhow!("{} read failed: {status}", gateway.name()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_command_takes_device_and_view() {
        let cli = Cli::try_parse_from([
            "devgwd", "--config", "gw.toml", "read", "fronius", "--view", "CommonData",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("gw.toml")));
        match cli.command {
            Some(Commands::Read { device, view }) => {
                assert_eq!(device, "fronius");
                assert_eq!(view.as_deref(), Some("CommonData"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn log_format_and_default_command() {
        let cli = Cli::try_parse_from(["devgwd", "--log-format", "pretty"]).unwrap();
        assert_eq!(cli.log_format, Some(LogFormat::Pretty));
        assert!(cli.command.is_none());
        assert!(Cli::try_parse_from(["devgwd", "--log-format", "xml"]).is_err());

        let cli = Cli::try_parse_from(["devgwd", "check-config"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::CheckConfig)));
    }

    #[test]
    fn check_config_masks_credentials() {
        let config: AppConfig = r#"
            [em300lr]
            address = "http://192.168.1.20/"
            password = "meter-pw"
            serial_number = "72130001"

            [netatmo]
            user = "me@example.com"
            password = "netatmo-pw"
            client_id = "client"
            client_secret = "client-secret"
            device_id = "70:ee:50:00:00:01"
        "#
        .parse()
        .unwrap();

        let output = render_config(Path::new("gw.toml"), &config).unwrap();
        assert!(output.starts_with("# source: gw.toml\n# gateways: em300lr, netatmo\n"));
        assert!(output.contains("serial_number = \"72130001\""));
        for secret in ["meter-pw", "netatmo-pw", "client-secret"] {
            assert!(!output.contains(secret), "{secret} printed by check-config");
        }
    }
}
