//! proxy-provider - CLI entry point

use clap::Parser;
use proxy_provider::{Config, Host, VERSION};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "proxy-provider")]
#[command(author = "Tsang")]
#[command(version = VERSION)]
#[command(about = "Runtime-managed proxy provider subsystem")]
struct Args {
    /// Path to configuration file
    #[arg(short = 'c', long = "config", default_value = "config.yaml")]
    config: PathBuf,

    /// External controller address (overrides config)
    #[arg(long = "ext-ctl")]
    external_controller: Option<String>,

    /// External controller secret (overrides config)
    #[arg(long = "secret")]
    secret: Option<String>,

    /// Validate configuration and exit
    #[arg(short = 't', long = "test")]
    test: bool,
}

fn main() -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(async_main())
}

async fn async_main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("proxy_provider=info".parse()?),
        )
        .init();

    let args = Args::parse();

    info!("proxy-provider v{}", VERSION);
    info!("loading configuration from: {}", args.config.display());

    let mut config = match Config::load(args.config.to_str().unwrap_or("config.yaml")) {
        Ok(c) => c,
        Err(e) => {
            error!("failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Some(ext_ctl) = args.external_controller {
        config.external_controller = Some(ext_ctl);
    }
    if let Some(secret) = args.secret {
        config.secret = Some(secret);
    }

    if args.test {
        info!("configuration test passed");
        return Ok(());
    }

    let host = match Host::new(config).await {
        Ok(h) => h,
        Err(e) => {
            error!("failed to initialize host: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = host.run().await {
        error!("host error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
