use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use image::GenericImageView;
use tokio::select;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::task::{AbortHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::asset::Slot;
use crate::config::LoadOptions;
use crate::events::{AssetInfo, LoadOutcome, LoadRequest, LoaderCommand};
use crate::state::Ticket;
use crate::widget::WidgetId;

type RequestKey = (WidgetId, Ticket);

/// Host-side settings for the local asset loader.
#[derive(Debug, Clone)]
pub struct LoaderOptions {
    /// Base directory for relative locators.
    pub root: PathBuf,
    pub max_in_flight: usize,
    pub thumbnail_latency: Duration,
    pub full_size_latency: Duration,
}

impl LoaderOptions {
    pub fn from_load_options(root: impl Into<PathBuf>, loading: &LoadOptions) -> Self {
        Self {
            root: root.into(),
            max_in_flight: loading.max_concurrent_loads.max(1),
            thumbnail_latency: loading.thumbnail_latency,
            full_size_latency: loading.full_size_latency,
        }
    }

    fn latency(&self, slot: Slot) -> Duration {
        match slot {
            Slot::Thumbnail => self.thumbnail_latency,
            Slot::FullSize => self.full_size_latency,
        }
    }
}

/// Decodes the asset to prove it is loadable and reports its dimensions.
fn decode_dimensions(path: &Path) -> crate::error::Result<AssetInfo> {
    let img = image::ImageReader::open(path)?
        .with_guessed_format()?
        .decode()?;
    let (width, height) = img.dimensions();
    Ok(AssetInfo { width, height })
}

fn resolve(root: &Path, locator: &str) -> PathBuf {
    let path = Path::new(locator);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Stand-in for the host platform's resource loader:
/// - Keeps at most `max_in_flight` requests running; the rest wait in FIFO order.
/// - Aborts pending or running requests on demand; aborted requests never report.
/// - Reports every finished request as a `LoadOutcome`.
pub async fn run(
    mut commands: Receiver<LoaderCommand>,
    outcomes: Sender<LoadOutcome>,
    options: LoaderOptions,
    cancel: CancellationToken,
) -> Result<()> {
    let mut queue: VecDeque<LoadRequest> = VecDeque::new();
    let mut running: HashMap<RequestKey, (Slot, AbortHandle)> = HashMap::new();
    let mut tasks: JoinSet<(RequestKey, crate::error::Result<AssetInfo>)> = JoinSet::new();
    let mut commands_open = true;

    loop {
        while running.len() < options.max_in_flight {
            let Some(req) = queue.pop_front() else {
                break;
            };
            let key = (req.widget, req.ticket);
            let path = resolve(&options.root, &req.locator);
            let latency = options.latency(req.slot);
            debug!(widget = %req.widget, slot = %req.slot, path = %path.display(), "load started");
            let handle = tasks.spawn(async move {
                if !latency.is_zero() {
                    tokio::time::sleep(latency).await;
                }
                let res = tokio::task::spawn_blocking(move || decode_dimensions(&path)).await;
                let res = match res {
                    Ok(res) => res,
                    Err(err) => Err(std::io::Error::other(err).into()),
                };
                (key, res)
            });
            running.insert(key, (req.slot, handle));
        }

        if !commands_open && queue.is_empty() && running.is_empty() {
            break;
        }

        select! {
            _ = cancel.cancelled() => break,

            maybe_cmd = commands.recv(), if commands_open => {
                match maybe_cmd {
                    Some(LoaderCommand::Load(req)) => queue.push_back(req),
                    Some(LoaderCommand::Abort { widget, ticket }) => {
                        let key = (widget, ticket);
                        if let Some((slot, handle)) = running.remove(&key) {
                            handle.abort();
                            debug!(%widget, %slot, ticket, "running load aborted");
                        } else {
                            queue.retain(|r| (r.widget, r.ticket) != key);
                        }
                    }
                    None => commands_open = false,
                }
            }

            Some(joined) = tasks.join_next() => {
                // Aborted tasks surface as join errors; their keys are already gone.
                let Ok((key, res)) = joined else {
                    continue;
                };
                let Some((slot, _)) = running.remove(&key) else {
                    continue;
                };
                let (widget, ticket) = key;
                let result = match res {
                    Ok(info) => {
                        debug!(%widget, %slot, width = info.width, height = info.height, "load finished");
                        Ok(info)
                    }
                    Err(err) => {
                        warn!(%widget, %slot, error = %err, "load failed");
                        Err(err.to_string())
                    }
                };
                let outcome = LoadOutcome { widget, slot, ticket, result };
                if outcomes.send(outcome).await.is_err() {
                    info!("outcome receiver closed; stopping loader");
                    break;
                }
            }
        }
    }

    tasks.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_relative_locators_against_root() {
        let root = Path::new("/srv/assets");
        assert_eq!(resolve(root, "heavy/01.jpeg"), PathBuf::from("/srv/assets/heavy/01.jpeg"));
        assert_eq!(resolve(root, "/abs/01.jpeg"), PathBuf::from("/abs/01.jpeg"));
    }

    #[test]
    fn decode_reports_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.png");
        image::RgbaImage::new(3, 2).save(&path).unwrap();
        assert_eq!(
            decode_dimensions(&path).unwrap(),
            AssetInfo {
                width: 3,
                height: 2
            }
        );
    }

    #[test]
    fn decode_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not an image").unwrap();
        assert!(decode_dimensions(&path).is_err());
    }
}
