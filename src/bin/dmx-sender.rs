//! DMX Sender
//!
//! Opens the configured line driver, applies any `address=level` pairs
//! given on the command line (1-based DMX addresses) and transmits until
//! Ctrl-C.
//!
//! ```text
//! dmx-sender [--config <path>] [--null] [1=255 2=128 ...]
//! ```

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dmx_serial_sender::{config::Backend, DmxConfig, DmxSender};

struct Args {
    config: Option<PathBuf>,
    null: bool,
    levels: Vec<(usize, i32)>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        config: None,
        null: false,
        levels: Vec::new(),
    };

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = iter.next().context("--config needs a path")?;
                args.config = Some(PathBuf::from(path));
            }
            "--null" => args.null = true,
            pair => {
                let (addr, level) = pair
                    .split_once('=')
                    .with_context(|| format!("expected address=level, got {pair}"))?;
                let addr: usize = addr.trim().parse().with_context(|| format!("bad address {addr}"))?;
                let level: i32 = level.trim().parse().with_context(|| format!("bad level {level}"))?;
                if addr == 0 {
                    bail!("DMX addresses start at 1");
                }
                args.levels.push((addr, level));
            }
        }
    }
    Ok(args)
}

fn load_config(args: &Args) -> Result<DmxConfig> {
    let path = args.config.clone().or_else(DmxConfig::default_path);
    let mut config = match path {
        Some(path) if path.exists() => {
            tracing::info!("Loading config from {}", path.display());
            DmxConfig::load(&path).with_context(|| format!("reading {}", path.display()))?
        }
        Some(path) if args.config.is_some() => bail!("config file {} not found", path.display()),
        _ => DmxConfig::default(),
    };

    config.apply_env()?;
    if args.null {
        config.backend = Backend::Null;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting DMX sender");

    let args = parse_args()?;
    let config = load_config(&args)?;

    let sender = DmxSender::new(config).context("cannot start DMX output")?;
    for &(addr, level) in &args.levels {
        sender
            .set_channel(addr as isize - 1, level)
            .with_context(|| format!("DMX address {addr}"))?;
    }

    sender.start()?;
    tracing::info!("Transmitting - press Ctrl+C to stop");

    let mut stats_tick = tokio::time::interval(Duration::from_secs(10));
    stats_tick.tick().await;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = stats_tick.tick() => {
                let stats = sender.stats();
                tracing::info!(
                    "Stats: {} frames sent, {} dropped ({:.2}%), {} flush failures",
                    stats.frames_sent,
                    stats.frames_dropped,
                    stats.drop_rate() * 100.0,
                    stats.flush_failures
                );
            }
        }
    }

    tracing::info!("Shutting down");
    sender.blackout();
    // Give the loop one cycle to put the blackout on the wire
    tokio::time::sleep(sender.config().frame_interval() * 2).await;
    sender.stop();
    Ok(())
}
