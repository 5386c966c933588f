//! label-scanner - scan one label image against a product catalog.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use label_scanner_lib::services::ocr::HttpEngineFactory;
use label_scanner_lib::{init_tracing, Catalog, ConfigManager, ScanSession, SessionEvent, SessionMode, StillImageSource};

/// Hands-free label scanner: OCR a label image and match it to a product
#[derive(Parser, Debug)]
#[command(name = "label-scanner")]
#[command(about = "Capture, OCR and match a product label against a catalog")]
struct Args {
    /// Product catalog (JSON array of {id, name, keywords})
    #[arg(long)]
    catalog: PathBuf,

    /// Label image served as a still camera feed
    #[arg(long)]
    image: PathBuf,

    /// Scanner config file (defaults to the saved user config)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Confirm the scan with the matched product and parsed weight
    #[arg(long)]
    confirm: bool,

    /// Give up if no scan completes within this many seconds
    #[arg(long, default_value = "60")]
    timeout_secs: u64,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    let config = match &args.config {
        Some(path) => ConfigManager::load_from(path),
        None => ConfigManager::new().and_then(|manager| manager.load()),
    }
    .map_err(anyhow::Error::msg)
    .context("loading scanner config")?;

    let catalog = Catalog::load(&args.catalog).map_err(anyhow::Error::msg)?;
    if catalog.is_empty() {
        warn!("catalog is empty, nothing can match");
    }

    let source = StillImageSource::open(&args.image).map_err(anyhow::Error::msg)?;
    let factory = HttpEngineFactory::new(&config.engine)?;

    let session = ScanSession::new(config, catalog, Arc::new(source), Arc::new(factory));
    let mut events = session.take_events().context("event stream already taken")?;
    let mut mode_rx = session.subscribe_mode();

    session.start().await?;
    info!(image = %args.image.display(), "waiting for a stable capture");

    let waited = tokio::time::timeout(
        Duration::from_secs(args.timeout_secs),
        wait_for_capture(&mut mode_rx, &mut events),
    )
    .await;

    let result = match waited {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!("no stable capture within {} s", args.timeout_secs)),
    };
    if let Err(e) = result {
        session.stop().await;
        return Err(e);
    }

    let pending = session.pending().context("capture produced no pending record")?;
    println!("{}", serde_json::to_string_pretty(&pending)?);

    if args.confirm {
        let Some(kg) = pending.parsed_kg else {
            session.stop().await;
            bail!("no weight found in label text, cannot confirm");
        };

        let confirmed = session.confirm(&pending.matched_product_id, &kg.to_string());
        session.stop().await;
        println!("{}", serde_json::to_string_pretty(&confirmed?)?);
    } else {
        session.stop().await;
    }

    Ok(())
}

/// Resolve once the session holds a pending record; fail on the first reported error
async fn wait_for_capture(
    mode_rx: &mut watch::Receiver<SessionMode>,
    events: &mut mpsc::UnboundedReceiver<SessionEvent>,
) -> Result<()> {
    loop {
        tokio::select! {
            changed = mode_rx.wait_for(|mode| *mode == SessionMode::Confirm) => {
                changed.context("session closed")?;
                return Ok(());
            }
            event = events.recv() => match event {
                Some(SessionEvent::Error(message)) => bail!(message),
                Some(SessionEvent::Status(status)) => info!(%status, "status"),
                Some(SessionEvent::Confirmed(_)) => {}
                None => bail!("session closed"),
            },
        }
    }
}
