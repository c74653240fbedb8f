use std::path::Path;
use std::time::Duration;

use progressive_picture::config::{
    FeatureFlags, LayoutOptions, LibraryOptions, LoadOptions, RetryPolicy, ScrollOptions,
    SensorOptions,
};
use progressive_picture::events::{LoadOutcome, LoaderCommand, WidgetUpdate};
use progressive_picture::library;
use progressive_picture::sensor::Rect;
use progressive_picture::state::Phase;
use progressive_picture::tasks::gallery::{self, GalleryItem, GallerySummary, WidgetSettings};
use progressive_picture::tasks::loader::{self, LoaderOptions};
use progressive_picture::tasks::scroll;
use progressive_picture::widget::{WidgetId, WidgetSnapshot};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

fn write_png(path: &Path, w: u32, h: u32) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    image::RgbaImage::new(w, h).save(path).unwrap();
}

struct Run {
    summary: GallerySummary,
    updates: Vec<WidgetSnapshot>,
}

/// Wire loader, gallery and scroll together the way the binary does and run
/// until the scroll task has settled.
async fn run_gallery(
    library: LibraryOptions,
    layout: LayoutOptions,
    viewport: Rect,
    settings: WidgetSettings,
    scroll_options: ScrollOptions,
) -> Run {
    let assets = library::scan(&library).unwrap();
    let regions = library::layout(assets.len(), &layout);
    let page_height = library::page_height(&regions);
    let items: Vec<GalleryItem> = assets
        .into_iter()
        .zip(regions)
        .map(|(asset, region)| GalleryItem { asset, region })
        .collect();

    let (viewport_tx, viewport_rx) = watch::channel(viewport);
    let (loader_tx, loader_rx) = mpsc::channel::<LoaderCommand>(64);
    let (outcome_tx, outcome_rx) = mpsc::channel::<LoadOutcome>(64);
    let (update_tx, mut update_rx) = mpsc::channel::<WidgetUpdate>(128);
    let cancel = CancellationToken::new();

    let loader = tokio::spawn(loader::run(
        loader_rx,
        outcome_tx,
        LoaderOptions::from_load_options(&library.full_size_dir, &settings.loading),
        cancel.clone(),
    ));
    let gallery = tokio::spawn(gallery::run(
        items,
        settings,
        viewport_rx,
        loader_tx,
        outcome_rx,
        update_tx,
        cancel.clone(),
    ));
    let scroll = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let res = scroll::run(viewport_tx, page_height, scroll_options, cancel.clone()).await;
            cancel.cancel();
            res
        })
    };

    let mut updates = Vec::new();
    let drain = async {
        while let Some(WidgetUpdate(snapshot)) = update_rx.recv().await {
            updates.push(snapshot);
        }
    };
    tokio::time::timeout(Duration::from_secs(10), drain)
        .await
        .expect("gallery did not shut down");

    let summary = gallery.await.unwrap().unwrap();
    scroll.await.unwrap().unwrap();
    loader.await.unwrap().unwrap();
    Run { summary, updates }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn visible_gallery_settles_every_widget() {
    let dir = tempfile::tempdir().unwrap();
    let heavy = dir.path().join("heavy");
    let light = dir.path().join("superlight");
    write_png(&heavy.join("a.png"), 32, 24);
    write_png(&heavy.join("b.png"), 32, 24);
    std::fs::create_dir_all(&heavy).unwrap();
    std::fs::write(heavy.join("c.png"), b"definitely not a png").unwrap();
    write_png(&light.join("a.png"), 4, 3);

    let settings = WidgetSettings {
        features: FeatureFlags {
            diminish_on_hidden: false,
            transition_duration: Duration::from_millis(50),
            ..FeatureFlags::default()
        },
        sensor: SensorOptions::default(),
        loading: LoadOptions {
            thumbnail_latency: Duration::from_millis(10),
            full_size_latency: Duration::from_millis(30),
            retry: RetryPolicy {
                max_attempts: 2,
                initial_backoff: Duration::from_millis(20),
            },
            ..LoadOptions::default()
        },
    };
    let layout = LayoutOptions {
        item_width: 100.0,
        item_height: 100.0,
        gap: 0.0,
        columns: 1,
    };
    let scroll_options = ScrollOptions {
        settle: Duration::from_millis(800),
        ..ScrollOptions::default()
    };

    let run = run_gallery(
        LibraryOptions {
            full_size_dir: heavy,
            placeholder_dir: Some(light),
        },
        layout,
        Rect::new(0.0, 0.0, 1280.0, 800.0),
        settings,
        scroll_options,
    )
    .await;

    let summary = &run.summary;
    assert_eq!(summary.snapshots.len(), 3);

    let with_placeholder = summary.get(WidgetId(0)).unwrap();
    assert_eq!(with_placeholder.phase, Phase::PlaceholderRemoved);
    assert!(with_placeholder.presentation.thumbnail.is_none());
    assert_eq!(
        with_placeholder.presentation.full_size.unwrap().opacity,
        1
    );

    let single = summary.get(WidgetId(1)).unwrap();
    assert_eq!(single.phase, Phase::FullSizeLoaded);
    assert!(single.state.thumbnail_loaded && single.state.full_size_loaded);
    assert!(!single.state.placeholder_removed);

    let broken = summary.get(WidgetId(2)).unwrap();
    assert_eq!(broken.phase, Phase::Failed);
    assert!(!broken.state.thumbnail_loaded);

    // The placeholder is never removed before the full asset has loaded.
    for snapshot in run.updates.iter().filter(|s| s.widget == WidgetId(0)) {
        if snapshot.state.placeholder_removed {
            assert!(snapshot.state.full_size_loaded);
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scrolling_reveals_and_diminishes_widgets() {
    let dir = tempfile::tempdir().unwrap();
    let heavy = dir.path().join("heavy");
    let light = dir.path().join("superlight");
    for name in ["01.png", "02.png", "03.png", "04.png", "05.png", "06.png"] {
        write_png(&heavy.join(name), 16, 16);
        write_png(&light.join(name), 2, 2);
    }

    let settings = WidgetSettings {
        features: FeatureFlags::default(),
        sensor: SensorOptions::default(),
        loading: LoadOptions::default(),
    };
    let layout = LayoutOptions::default();
    let scroll_options = ScrollOptions {
        step_px: 300.0,
        interval: Duration::from_millis(40),
        settle: Duration::from_millis(500),
    };

    let run = run_gallery(
        LibraryOptions {
            full_size_dir: heavy,
            placeholder_dir: Some(light),
        },
        layout,
        Rect::new(0.0, 0.0, 1280.0, 800.0),
        settings,
        scroll_options,
    )
    .await;

    let summary = &run.summary;
    assert_eq!(summary.snapshots.len(), 6);

    // First widget was loaded while on screen, then scrolled out.
    let first = summary.get(WidgetId(0)).unwrap();
    assert!(!first.state.visible);
    assert!(first.state.full_size_loaded);
    assert_eq!(first.presentation.full_size.unwrap().opacity, 0);
    assert!(first.presentation.thumbnail.is_some());

    // Last widget sits at the bottom of the page when scrolling stops.
    let last = summary.get(WidgetId(5)).unwrap();
    assert!(last.state.visible);
    assert_eq!(last.phase, Phase::FullSizeLoaded);
    assert_eq!(last.presentation.full_size.unwrap().opacity, 1);

    // Keeping the placeholder mounted means nothing is ever removed.
    assert!(run.updates.iter().all(|s| !s.state.placeholder_removed));
}
