use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::select;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::sync::watch;
use tokio::time::sleep_until;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

use crate::events::{LoadRequest, LoaderCommand, WidgetEvent, WidgetUpdate};
use crate::sensor::Rect;
use crate::state::{Effect, Step};
use crate::widget::Widget;

/// Placeholder wake-up when no deadline is pending; the branch is disabled then.
const IDLE_PARK: Duration = Duration::from_secs(3600);

/// Drives one widget until cancelled or its inbox closes.
///
/// - Viewport changes arrive on `viewport_rx` and feed the sensor.
/// - Load completions and layout changes arrive on `events_rx`.
/// - Requests and aborts go to the loader; a snapshot is published on every
///   state change.
/// - The removal/retry deadline is awaited here; leaving the loop drops it, so
///   nothing fires after teardown.
#[instrument(skip_all, fields(widget = %widget.id()))]
pub async fn run(
    mut widget: Widget,
    mut viewport_rx: watch::Receiver<Rect>,
    mut events_rx: Receiver<WidgetEvent>,
    to_loader: Sender<LoaderCommand>,
    updates: Sender<WidgetUpdate>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut viewport = *viewport_rx.borrow_and_update();
    let mut viewport_open = true;

    let step = widget.on_viewport(&viewport, Instant::now());
    apply(&widget, step, &to_loader, &updates).await;
    publish(&widget, &updates).await;

    loop {
        let deadline = widget.next_deadline();
        let wake = tokio::time::Instant::from_std(
            deadline.unwrap_or_else(|| Instant::now() + IDLE_PARK),
        );

        let step = select! {
            _ = cancel.cancelled() => break,

            changed = viewport_rx.changed(), if viewport_open => {
                if changed.is_err() {
                    debug!("viewport source closed");
                    viewport_open = false;
                    continue;
                }
                viewport = *viewport_rx.borrow_and_update();
                widget.on_viewport(&viewport, Instant::now())
            }

            maybe_ev = events_rx.recv() => {
                let Some(ev) = maybe_ev else {
                    debug!("widget inbox closed");
                    break;
                };
                let now = Instant::now();
                match ev {
                    WidgetEvent::Layout(region) => widget.on_layout(region, &viewport, now),
                    WidgetEvent::Loaded { slot, ticket } => {
                        trace!(%slot, ticket, "asset loaded");
                        widget.on_asset_loaded(slot, ticket, now)
                    }
                    WidgetEvent::Failed { slot, ticket } => {
                        trace!(%slot, ticket, "asset failed");
                        widget.on_asset_failed(slot, ticket, now)
                    }
                }
            }

            _ = sleep_until(wake), if deadline.is_some() => {
                widget.on_tick(Instant::now())
            }
        };

        apply(&widget, step, &to_loader, &updates).await;
    }

    let step = widget.unmount();
    debug!(phase = ?widget.phase(), "widget unmounted");
    for effect in step.effects {
        if let Effect::Abandon { ticket, .. } = effect {
            // Best effort: the loader may already be shutting down.
            let _ = to_loader.try_send(LoaderCommand::Abort {
                widget: widget.id(),
                ticket,
            });
        }
    }
    Ok(())
}

async fn apply(
    widget: &Widget,
    step: Step,
    to_loader: &Sender<LoaderCommand>,
    updates: &Sender<WidgetUpdate>,
) {
    forward_effects(widget, &step, to_loader).await;
    if step.changed {
        debug!(phase = ?widget.phase(), state = ?widget.state(), "widget state changed");
        publish(widget, updates).await;
    }
}

async fn forward_effects(widget: &Widget, step: &Step, to_loader: &Sender<LoaderCommand>) {
    for effect in &step.effects {
        let cmd = match *effect {
            Effect::Request { slot, ticket } => LoaderCommand::Load(LoadRequest {
                widget: widget.id(),
                slot,
                ticket,
                locator: widget.locator(slot).to_owned(),
            }),
            Effect::Abandon { ticket, .. } => LoaderCommand::Abort {
                widget: widget.id(),
                ticket,
            },
        };
        if to_loader.send(cmd).await.is_err() {
            warn!("loader channel closed");
            return;
        }
    }
}

async fn publish(widget: &Widget, updates: &Sender<WidgetUpdate>) {
    // Consumer may be gone during shutdown; nothing to do then.
    let _ = updates.send(WidgetUpdate(widget.snapshot())).await;
}
