use clap::Parser;
use pixel_office_engine::OfficeConfig;
use pixel_office_server::ServeOptions;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "pixel-office-server", version, about = "Pixel-art virtual office")]
struct Args {
    #[arg(long, default_value = "127.0.0.1:39480")]
    addr: SocketAddr,

    /// YAML office configuration; defaults apply when absent.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    db: Option<PathBuf>,

    /// Directory of daily `YYYY-MM-DD.md` work memos.
    #[arg(long)]
    memory_dir: Option<PathBuf>,

    /// Directory holding `static-data.json`.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Start with live mode off: simulate only.
    #[arg(long)]
    offline: bool,

    /// Start with the push stream on.
    #[arg(long)]
    push: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let home = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".pixel-office");

    let config_path = args.config.unwrap_or_else(|| home.join("office.yaml"));
    let mut config = OfficeConfig::load_or_default(Some(&config_path))?;
    if args.offline {
        config.live = false;
    }
    if args.push {
        config.push = true;
    }

    std::fs::create_dir_all(&home)?;
    let opts = ServeOptions {
        db_path: args.db.unwrap_or_else(|| home.join("office.db")),
        memory_dir: args.memory_dir.unwrap_or_else(|| home.join("memory")),
        data_dir: args.data_dir.unwrap_or_else(|| home.clone()),
        config,
    };

    let listener = tokio::net::TcpListener::bind(args.addr).await?;
    tracing::info!(addr = %args.addr, db = %opts.db_path.display(), "starting");
    pixel_office_server::serve_listener(listener, opts, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "ctrl-c handler failed");
            std::future::pending::<()>().await;
        }
        tracing::info!("shutting down");
    })
    .await?;
    Ok(())
}
