//! dataconnd - replica data-path daemon
//!
//! - `serve`: expose a local file-backed replica over TCP or a UNIX socket
//! - `probe`: open a connection pool to a remote export and report on it

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use dataconn_client::{NbdPool, PoolOptions};
use dataconn_common::{Config, DataServerProtocol, FailoverPolicy, Frontend};
use dataconn_replica::{BlockIo, FileReplica};
use dataconn_server::{DataServer, RejectFramedHandler};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "dataconnd")]
#[command(about = "Replica data-path daemon")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "DATACONN_CONFIG", default_value = "/etc/dataconn/dataconn.toml")]
    config: PathBuf,

    /// Log level (RUST_LOG takes precedence)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the local replica to remote initiators
    Serve(ServeArgs),
    /// Connect to a remote export and report its geometry
    Probe(ProbeArgs),
}

#[derive(ClapArgs, Debug, Default)]
struct ServeArgs {
    /// Transport protocol: tcp, tcp+nbd, unix, unix+nbd
    #[arg(long)]
    protocol: Option<DataServerProtocol>,

    /// Bind address (host:port, or a socket path for unix)
    #[arg(short, long)]
    listen: Option<String>,

    /// Frontend for plain tcp/unix listeners: default or nbd
    #[arg(long)]
    frontend: Option<Frontend>,

    /// NBD export name
    #[arg(long)]
    export_name: Option<String>,

    /// NBD export description
    #[arg(long)]
    export_description: Option<String>,

    /// Replica backing file
    #[arg(long)]
    replica: Option<PathBuf>,

    /// Replica size in bytes
    #[arg(long)]
    size_bytes: Option<u64>,

    /// Serve the replica read-only
    #[arg(long)]
    read_only: bool,
}

#[derive(ClapArgs, Debug, Default)]
struct ProbeArgs {
    /// Remote export URI (nbd://host:port/export or nbd+unix:///export?socket=path)
    #[arg(long)]
    remote: Option<String>,

    /// Per-operation timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Upper bound on pooled connections (1-8)
    #[arg(long)]
    max_connections: Option<usize>,

    /// fail-fast or failover
    #[arg(long)]
    failover: Option<FailoverPolicy>,

    /// Read this many bytes at offset 0 once through every connection
    #[arg(long, default_value_t = 0)]
    verify_bytes: usize,
}

/// Load the config file if present; a missing file means defaults
fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        Config::load(path).with_context(|| format!("loading config {}", path.display()))
    } else {
        Ok(Config::default())
    }
}

/// CLI flags take precedence over the config file
fn apply_serve_args(config: &mut Config, args: &ServeArgs) {
    if let Some(protocol) = args.protocol {
        config.server.protocol = protocol;
    }
    if let Some(listen) = &args.listen {
        config.server.address.clone_from(listen);
    }
    if let Some(frontend) = args.frontend {
        config.server.frontend = frontend;
    }
    if let Some(name) = &args.export_name {
        config.server.export_name.clone_from(name);
    }
    if let Some(description) = &args.export_description {
        config.server.export_description.clone_from(description);
    }
    if let Some(path) = &args.replica {
        config.replica.path.clone_from(path);
    }
    if let Some(size) = args.size_bytes {
        config.replica.size_bytes = size;
    }
    if args.read_only {
        config.replica.read_only = true;
    }
}

fn apply_probe_args(config: &mut Config, args: &ProbeArgs) {
    if let Some(remote) = &args.remote {
        config.client.remote.clone_from(remote);
    }
    if let Some(ms) = args.timeout_ms {
        config.client.op_timeout_ms = ms;
    }
    if let Some(max) = args.max_connections {
        config.client.max_connections = max;
    }
    if let Some(failover) = args.failover {
        config.client.failover = failover;
    }
}

fn init_logging(config: &Config, cli_level: Option<&str>) {
    let level = cli_level.unwrap_or(&config.logging.level).to_string();
    let json = config.logging.json;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| level.into()),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();
}

async fn serve(config: Config) -> Result<()> {
    let replica = &config.replica;
    let file = FileReplica::open(
        &replica.path,
        replica.size_bytes,
        replica.sector_size,
        replica.read_only,
    )
    .await
    .with_context(|| format!("opening replica {}", replica.path.display()))?;

    let server = DataServer::from_config(
        &config.server,
        Arc::new(file),
        Arc::new(RejectFramedHandler),
    );
    info!(
        "Serving replica {} as '{}' over {} ({} frontend)",
        replica.path.display(),
        config.server.export_name,
        server.protocol(),
        server.frontend()
    );

    server
        .listen_and_serve(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await
        .context("data server failed")?;

    info!("Data server stopped");
    Ok(())
}

async fn probe(config: Config, verify_bytes: usize) -> Result<()> {
    let remote = &config.client.remote;
    let options = PoolOptions::from(&config.client);
    let pool = NbdPool::connect_uri(remote, options)
        .await
        .with_context(|| format!("connecting to {remote}"))?;

    println!("remote:       {remote}");
    println!("size:         {} bytes", pool.size_bytes());
    println!("connections:  {}", pool.len());
    println!("failover:     {}", pool.options().failover);

    let len = u64::try_from(verify_bytes)
        .unwrap_or(u64::MAX)
        .min(pool.size_bytes());
    if len > 0 {
        let mut buf = vec![0u8; usize::try_from(len).unwrap_or(verify_bytes)];
        for _ in 0..pool.len() {
            pool.read_at(&mut buf, 0).await.context("verification read failed")?;
        }
        println!("verified:     {len} bytes on each connection");
    }

    if pool.healthy_count() < pool.len() {
        warn!(
            "{} of {} connections became unhealthy",
            pool.len() - pool.healthy_count(),
            pool.len()
        );
    }
    pool.close().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = load_config(&args.config)?;

    match &args.command {
        Commands::Serve(serve_args) => apply_serve_args(&mut config, serve_args),
        Commands::Probe(probe_args) => apply_probe_args(&mut config, probe_args),
    }
    config.validate().context("invalid configuration")?;

    init_logging(&config, args.log_level.as_deref());
    info!("Config file: {}", args.config.display());

    match args.command {
        Commands::Serve(_) => serve(config).await,
        Commands::Probe(probe_args) => probe(config, probe_args.verify_bytes).await,
    }
}
