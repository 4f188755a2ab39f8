use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use meshprobe::{
    agent::{Agent, HttpControlPlane, SystemProber},
    config::{detect_hostname, detect_ip_address, AgentConfig, ServerConfig},
    model::Hostname,
    server,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "meshprobe", version, about = "Pairwise reachability monitoring for a mesh of hosts")]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Debug, Subcommand)]
enum Mode {
    /// Run the aggregation server
    Server {
        #[arg(long, default_value = "0.0.0.0:50000")]
        listen: SocketAddr,
        /// Also write each export to this directory
        #[arg(long)]
        archive_dir: Option<PathBuf>,
    },
    /// Run an agent that probes every other registered agent
    Agent {
        #[arg(long, default_value = "http://172.17.0.1:50000")]
        server: String,
        /// Defaults to the kernel hostname
        #[arg(long)]
        hostname: Option<String>,
        /// Defaults to the first address from `hostname -I`
        #[arg(long)]
        ip: Option<String>,
        #[arg(long, default_value_t = 500)]
        test_interval_ms: u64,
        #[arg(long, default_value_t = 1000)]
        idle_interval_ms: u64,
        #[arg(long, default_value_t = 5000)]
        retry_interval_ms: u64,
        #[arg(long, default_value_t = 2000)]
        probe_timeout_ms: u64,
        /// Timeout for each call to the server
        #[arg(long, default_value_t = 5000)]
        request_timeout_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.mode {
        Mode::Server { listen, archive_dir } => {
            let mut config = ServerConfig::default().with_address(listen);
            if let Some(dir) = archive_dir {
                config = config.with_archive_dir(dir);
            }
            server::serve(config)
                .await
                .wrap_err_with(|| format!("server on {} failed", listen))?;
        }
        Mode::Agent {
            server,
            hostname,
            ip,
            test_interval_ms,
            idle_interval_ms,
            retry_interval_ms,
            probe_timeout_ms,
            request_timeout_ms,
        } => {
            let hostname = match hostname {
                Some(name) => Hostname::parse(name)?,
                None => detect_hostname()?,
            };
            let ip = match ip {
                Some(ip) => ip,
                None => detect_ip_address()?,
            };

            let config = AgentConfig::new(server, hostname, ip)
                .with_intervals(
                    Duration::from_millis(test_interval_ms),
                    Duration::from_millis(idle_interval_ms),
                )
                .with_retry_interval(Duration::from_millis(retry_interval_ms))
                .with_probe_timeout(Duration::from_millis(probe_timeout_ms))
                .with_request_timeout(Duration::from_millis(request_timeout_ms));

            let control = HttpControlPlane::new(&config.server_url, config.request_timeout)?;
            let prober = SystemProber::new(config.ping_wait);
            Agent::new(config, control, prober).run().await;
        }
    }

    Ok(())
}
