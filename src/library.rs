//! Discovers full-size/placeholder pairs on disk and lays them out on a page.

use std::ffi::OsStr;
use std::path::Path;

use tracing::{debug, info, instrument};
use walkdir::WalkDir;

use crate::asset::AssetRef;
use crate::config::{LayoutOptions, LibraryOptions};
use crate::error::{Error, Result};
use crate::sensor::Rect;

pub fn is_image(path: &Path) -> bool {
    matches!(
        path.extension()
            .and_then(OsStr::to_str)
            .map(|s| s.to_ascii_lowercase())
            .as_deref(),
        Some("jpg" | "jpeg" | "png" | "gif" | "webp")
    )
}

/// Scan the full-size directory recursively. Each image gets a placeholder
/// when a file with the same relative path exists in the placeholder directory.
#[instrument(skip(library), fields(root = %library.full_size_dir.display()))]
pub fn scan(library: &LibraryOptions) -> Result<Vec<AssetRef>> {
    let root = &library.full_size_dir;
    if !root.is_dir() {
        return Err(Error::BadDir(root.display().to_string()));
    }

    let mut assets = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry?;
        if !entry.file_type().is_file() || !is_image(entry.path()) {
            continue;
        }
        let path = entry.path();
        let mut asset = AssetRef::new(path.to_string_lossy());
        if let Ok(relative) = path.strip_prefix(root) {
            asset = asset.with_title(relative.to_string_lossy());
            if let Some(dir) = library.placeholder_dir.as_deref() {
                let placeholder = dir.join(relative);
                if placeholder.is_file() {
                    asset = asset.with_placeholder(placeholder.to_string_lossy());
                } else {
                    debug!(path = %path.display(), "no placeholder; full asset fills both slots");
                }
            }
        }
        assets.push(asset);
    }

    if assets.is_empty() {
        return Err(Error::EmptyLibrary(root.display().to_string()));
    }
    let with_placeholder = assets.iter().filter(|a| a.has_placeholder()).count();
    info!(
        discovered = assets.len(),
        with_placeholder, "library scan complete"
    );
    Ok(assets)
}

/// Grid positions for `count` items, left to right, top to bottom.
pub fn layout(count: usize, options: &LayoutOptions) -> Vec<Rect> {
    let columns = options.columns.max(1);
    (0..count)
        .map(|i| {
            let col = (i % columns) as f32;
            let row = (i / columns) as f32;
            Rect::new(
                col * (options.item_width + options.gap),
                row * (options.item_height + options.gap),
                options.item_width,
                options.item_height,
            )
        })
        .collect()
}

/// Total height of the page holding `regions`.
pub fn page_height(regions: &[Rect]) -> f32 {
    regions.iter().map(Rect::bottom).fold(0.0, f32::max)
}
