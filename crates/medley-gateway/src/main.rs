//! Medley API Gateway entry point.
//!
//! Loads the gateway configuration, starts the axum server and reloads the
//! configuration file on `SIGHUP`.
//!
//! # Environment variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `MEDLEY_CONFIG` | `config/gateway.yaml` | Configuration file. |
//! | `MEDLEY_LISTEN` | *(from config)* | Listen address override. |
//! | `MEDLEY__<SECTION>__<KEY>` | | Override any config value. |
//! | `RUST_LOG` | `medley_gateway=info` | Log filter. |

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use eyre::WrapErr;
use medley_gateway::backend::HttpUpstream;
use medley_gateway::proxy::{Gateway, load_config};
use medley_gateway::server;
use medley_kernel::gateway::GatewayConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Medley API Gateway - authenticating, rate-limiting reverse proxy
#[derive(Parser, Debug)]
#[command(name = "medley-gateway")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(short, long, env = "MEDLEY_CONFIG", default_value = "config/gateway.yaml")]
    config: PathBuf,

    /// Listen address, overriding the config file
    #[arg(short, long, env = "MEDLEY_LISTEN")]
    listen: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("medley_gateway=info,tower_http=info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn read_config(path: &Path, listen: Option<&str>) -> eyre::Result<GatewayConfig> {
    let mut config = load_config(path)
        .wrap_err_with(|| format!("failed to load gateway config from {}", path.display()))?;
    if let Some(addr) = listen {
        config.listen = addr.to_string();
    }
    Ok(config)
}

#[cfg(unix)]
fn reload_on_sighup(
    gateway: Arc<Gateway>,
    path: PathBuf,
    listen: Option<String>,
) -> eyre::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};
    use tracing::error;

    let mut hangup = signal(SignalKind::hangup()).wrap_err("failed to install SIGHUP handler")?;
    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            info!(path = %path.display(), "SIGHUP received, reloading configuration");
            let result = read_config(&path, listen.as_deref())
                .and_then(|config| gateway.reload(config).map_err(eyre::Report::from));
            if let Err(err) = result {
                error!(error = %format!("{err:#}"), "reload rejected, keeping current configuration");
            }
        }
    });
    Ok(())
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = read_config(&cli.config, cli.listen.as_deref())?;
    let listen = config.listen.clone();
    info!(
        gateway = %config.id,
        config = %cli.config.display(),
        routes = config.routes.len(),
        backends = config.backends.len(),
        "Medley gateway configuration loaded"
    );

    let upstream = Arc::new(HttpUpstream::new(Duration::from_secs(5))?);
    let gateway = Arc::new(Gateway::builder(config, upstream).build()?);

    #[cfg(unix)]
    reload_on_sighup(gateway.clone(), cli.config.clone(), cli.listen.clone())?;

    server::serve(gateway, &listen)
        .await
        .wrap_err_with(|| format!("gateway server on {listen} failed"))
}
