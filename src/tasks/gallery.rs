use std::collections::HashMap;

use anyhow::Result;
use serde::Serialize;
use tokio::select;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::asset::AssetRef;
use crate::config::{Configuration, FeatureFlags, LoadOptions, SensorOptions};
use crate::events::{LoadOutcome, LoaderCommand, WidgetEvent, WidgetUpdate};
use crate::sensor::Rect;
use crate::state::Phase;
use crate::tasks::widget;
use crate::widget::{Widget, WidgetId, WidgetSnapshot};

const WIDGET_INBOX: usize = 16;
const UPDATE_BUFFER: usize = 64;

/// One widget placed on the page.
#[derive(Debug, Clone)]
pub struct GalleryItem {
    pub asset: AssetRef,
    pub region: Rect,
}

/// Settings shared by every widget of a gallery.
#[derive(Debug, Clone, Default)]
pub struct WidgetSettings {
    pub features: FeatureFlags,
    pub sensor: SensorOptions,
    pub loading: LoadOptions,
}

impl From<&Configuration> for WidgetSettings {
    fn from(cfg: &Configuration) -> Self {
        Self {
            features: cfg.features.clone(),
            sensor: cfg.sensor.clone(),
            loading: cfg.loading.clone(),
        }
    }
}

/// Last snapshot of every widget when the gallery shut down.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GallerySummary {
    pub snapshots: Vec<WidgetSnapshot>,
}

impl GallerySummary {
    pub fn count(&self, phase: Phase) -> usize {
        self.snapshots.iter().filter(|s| s.phase == phase).count()
    }

    pub fn get(&self, widget: WidgetId) -> Option<&WidgetSnapshot> {
        self.snapshots.iter().find(|s| s.widget == widget)
    }
}

/// Mounts one widget per item and routes traffic between them and the loader.
///
/// Rules:
/// - Each widget runs in its own task with a child cancellation token.
/// - Load outcomes are delivered to the owning widget; outcomes for widgets
///   that are gone are dropped.
/// - Widget updates are forwarded to `updates_out` and remembered for the
///   summary.
#[instrument(skip_all, fields(widgets = items.len()))]
pub async fn run(
    items: Vec<GalleryItem>,
    settings: WidgetSettings,
    viewport_rx: watch::Receiver<Rect>,
    to_loader: Sender<LoaderCommand>,
    mut outcomes_rx: Receiver<LoadOutcome>,
    updates_out: Sender<WidgetUpdate>,
    cancel: CancellationToken,
) -> Result<GallerySummary> {
    let (update_tx, mut update_rx) = mpsc::channel::<WidgetUpdate>(UPDATE_BUFFER);
    let mut inboxes: HashMap<WidgetId, Sender<WidgetEvent>> = HashMap::new();
    let mut latest: HashMap<WidgetId, WidgetSnapshot> = HashMap::new();
    let mut widgets = JoinSet::new();
    let widgets_cancel = cancel.child_token();

    for (index, item) in items.into_iter().enumerate() {
        let id = WidgetId(index);
        let (inbox_tx, inbox_rx) = mpsc::channel(WIDGET_INBOX);
        inbox_tx
            .try_send(WidgetEvent::Layout(item.region))
            .map_err(|_| anyhow::anyhow!("fresh widget inbox rejected layout"))?;
        let w = Widget::mount(
            id,
            item.asset,
            settings.features.clone(),
            settings.sensor.clone(),
            &settings.loading,
        );
        widgets.spawn(widget::run(
            w,
            viewport_rx.clone(),
            inbox_rx,
            to_loader.clone(),
            update_tx.clone(),
            widgets_cancel.child_token(),
        ));
        inboxes.insert(id, inbox_tx);
    }
    drop(update_tx);
    drop(to_loader);
    info!(mounted = inboxes.len(), "gallery mounted");

    let mut outcomes_open = true;
    loop {
        select! {
            _ = cancel.cancelled() => break,

            maybe_outcome = outcomes_rx.recv(), if outcomes_open => {
                let Some(outcome) = maybe_outcome else {
                    debug!("loader finished");
                    outcomes_open = false;
                    continue;
                };
                match inboxes.get(&outcome.widget) {
                    Some(inbox) => {
                        if inbox.send(outcome.into()).await.is_err() {
                            debug!("outcome for unmounted widget dropped");
                        }
                    }
                    None => warn!(widget = %outcome.widget, "outcome for unknown widget"),
                }
            }

            maybe_update = update_rx.recv() => {
                let Some(update) = maybe_update else {
                    debug!("all widgets finished");
                    break;
                };
                remember(&mut latest, &update);
                // Consumer may have gone away; keep routing regardless.
                let _ = updates_out.send(update).await;
            }
        }
    }

    // Unmount everything that is still running. Keep draining updates so no
    // widget stays blocked on a full channel while it shuts down.
    widgets_cancel.cancel();
    drop(inboxes);
    loop {
        select! {
            joined = widgets.join_next() => match joined {
                None => break,
                Some(Ok(Ok(()))) => {}
                Some(Ok(Err(err))) => warn!(error = %err, "widget task failed"),
                Some(Err(err)) => warn!(error = %err, "widget task panicked"),
            },
            Some(update) = update_rx.recv() => remember(&mut latest, &update),
        }
    }
    while let Ok(update) = update_rx.try_recv() {
        remember(&mut latest, &update);
    }

    let mut snapshots: Vec<WidgetSnapshot> = latest.into_values().collect();
    snapshots.sort_by_key(|s| s.widget);
    Ok(GallerySummary { snapshots })
}

fn remember(latest: &mut HashMap<WidgetId, WidgetSnapshot>, update: &WidgetUpdate) {
    let WidgetUpdate(snapshot) = update;
    latest.insert(snapshot.widget, snapshot.clone());
}
