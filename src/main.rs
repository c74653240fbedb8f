//! Binary entrypoint: simulates scrolling through a gallery of progressive images.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use progressive_picture::config::Configuration;
use progressive_picture::events::{LoadOutcome, LoaderCommand, WidgetUpdate};
use progressive_picture::library;
use progressive_picture::sensor::Rect;
use progressive_picture::state::Phase;
use progressive_picture::tasks::gallery::{self, GalleryItem, WidgetSettings};
use progressive_picture::tasks::loader::{self, LoaderOptions};
use progressive_picture::tasks::scroll;
use progressive_picture::widget::WidgetSnapshot;

#[derive(Debug, Parser)]
#[command(
    name = "progressive-picture",
    version,
    about = "Viewport-aware progressive image loading simulator"
)]
struct Args {
    /// Path to YAML config
    #[arg(value_name = "CONFIG")]
    config: PathBuf,
    /// Print every widget update as a JSON object per line
    #[arg(long)]
    json: bool,
    /// Override the scroll tick (e.g. "120ms")
    #[arg(long = "scroll-interval", value_name = "DURATION", value_parser = humantime::parse_duration)]
    scroll_interval: Option<Duration>,
    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) {
    let default = match verbosity {
        0 => "info",
        1 => "progressive_picture=debug,info",
        _ => "progressive_picture=trace,debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let Args {
        config,
        json,
        scroll_interval,
        verbose,
    } = Args::parse();
    init_tracing(verbose);

    let mut cfg = Configuration::from_yaml_file(&config)
        .with_context(|| format!("failed to load configuration from {}", config.display()))?
        .validated()
        .context("invalid configuration values")?;
    if let Some(interval) = scroll_interval {
        cfg.scroll.interval = interval;
    }

    let assets = library::scan(&cfg.library).context("failed to scan asset library")?;
    let regions = library::layout(assets.len(), &cfg.layout);
    let page_height = library::page_height(&regions);
    let items: Vec<GalleryItem> = assets
        .into_iter()
        .zip(regions)
        .map(|(asset, region)| GalleryItem { asset, region })
        .collect();
    info!(items = items.len(), page_height, "gallery laid out");

    // Channels (small/bounded)
    let viewport = Rect::new(0.0, 0.0, cfg.viewport.width, cfg.viewport.height);
    let (viewport_tx, viewport_rx) = watch::channel(viewport); // Scroll -> Widgets
    let (loader_tx, loader_rx) = mpsc::channel::<LoaderCommand>(64); // Widgets -> Loader
    let (outcome_tx, outcome_rx) = mpsc::channel::<LoadOutcome>(64); // Loader -> Gallery
    let (update_tx, mut update_rx) = mpsc::channel::<WidgetUpdate>(128); // Gallery -> stdout

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!("failed to listen for ctrl-c: {err}");
                return;
            }
            info!("ctrl-c received; shutting down");
            cancel.cancel();
        });
    }

    let loader = tokio::spawn(loader::run(
        loader_rx,
        outcome_tx,
        LoaderOptions::from_load_options(&cfg.library.full_size_dir, &cfg.loading),
        cancel.clone(),
    ));
    let gallery = tokio::spawn(gallery::run(
        items,
        WidgetSettings::from(&cfg),
        viewport_rx,
        loader_tx,
        outcome_rx,
        update_tx,
        cancel.clone(),
    ));
    let scroll = {
        let cancel = cancel.clone();
        let options = cfg.scroll.clone();
        tokio::spawn(async move {
            let res = scroll::run(viewport_tx, page_height, options, cancel.clone()).await;
            cancel.cancel();
            res
        })
    };

    while let Some(WidgetUpdate(snapshot)) = update_rx.recv().await {
        if json {
            println!("{}", serde_json::to_string(&snapshot)?);
        } else {
            print_snapshot(&snapshot);
        }
    }

    let summary = gallery.await.context("gallery task panicked")??;
    scroll.await.context("scroll task panicked")??;
    loader.await.context("loader task panicked")??;

    info!(
        widgets = summary.snapshots.len(),
        idle = summary.count(Phase::Idle),
        armed = summary.count(Phase::Armed),
        thumbnail = summary.count(Phase::ThumbnailLoaded),
        full_size = summary.count(Phase::FullSizeLoaded),
        placeholder_removed = summary.count(Phase::PlaceholderRemoved),
        failed = summary.count(Phase::Failed),
        "gallery finished"
    );
    Ok(())
}

fn print_snapshot(snapshot: &WidgetSnapshot) {
    let opacity = |slot: Option<progressive_picture::SlotStyle>| match slot {
        Some(style) => style.opacity.to_string(),
        None => "-".to_owned(),
    };
    println!(
        "{:>4} {:<20} visible={:<5} thumbnail={} full-size={}",
        snapshot.widget.to_string(),
        format!("{:?}", snapshot.phase),
        snapshot.state.visible,
        opacity(snapshot.presentation.thumbnail),
        opacity(snapshot.presentation.full_size),
    );
}
