use anyhow::Result;
use tokio::select;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::ScrollOptions;
use crate::sensor::Rect;

/// Scrolls the viewport from its current position to the bottom of the page,
/// one step per interval, then lingers for `settle` so loads and timers can
/// finish. Returns early on cancellation.
pub async fn run(
    viewport_tx: watch::Sender<Rect>,
    page_height: f32,
    options: ScrollOptions,
    cancel: CancellationToken,
) -> Result<()> {
    let start = *viewport_tx.borrow();
    let max_y = (page_height - start.height).max(start.y);
    let mut y = start.y;

    let mut ticker = interval(options.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately.
    ticker.tick().await;

    while y < max_y {
        select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = ticker.tick() => {
                y = (y + options.step_px).min(max_y);
                debug!(y, "viewport scrolled");
                viewport_tx.send_replace(Rect { y, ..start });
            }
        }
    }

    info!(y, "reached bottom of page");
    select! {
        _ = cancel.cancelled() => {}
        _ = sleep(options.settle) => {}
    }
    Ok(())
}
