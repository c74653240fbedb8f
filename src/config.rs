use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

/// Fixed guard added on top of the transition before the placeholder is
/// removed, so it never disappears while still fading out.
pub const SAFE_DELAY: Duration = Duration::from_millis(100);

/// Per-instance presentation switches. Immutable for the life of a widget.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct FeatureFlags {
    /// Blur the placeholder while it is shown.
    pub placeholder_blur: bool,
    /// Blur radius applied when `placeholder_blur` is enabled.
    pub blur_radius_px: u32,
    /// Let the full asset follow viewport intersection instead of staying shown
    /// once loaded. Keeps the placeholder mounted for the widget's lifetime.
    pub diminish_on_hidden: bool,
    /// Duration of every opacity transition.
    #[serde(with = "humantime_serde")]
    pub transition_duration: Duration,
    /// Skip the default absolute-fill/cover layout directives.
    pub disable_default_presentation: bool,
}

impl FeatureFlags {
    const fn default_blur_radius_px() -> u32 {
        4
    }

    const fn default_transition_duration() -> Duration {
        Duration::from_millis(500)
    }
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            placeholder_blur: false,
            blur_radius_px: Self::default_blur_radius_px(),
            diminish_on_hidden: true,
            transition_duration: Self::default_transition_duration(),
            disable_default_presentation: false,
        }
    }
}

/// Visibility sensor policy.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SensorOptions {
    /// Latch the first positive intersection forever.
    pub freeze_once_visible: bool,
    /// Fraction of the region that must be inside the viewport. `0.0` means
    /// any overlap, including touching edges.
    pub threshold: f32,
    /// Grows (or, when negative, shrinks) the viewport on every side.
    pub root_margin_px: f32,
}

impl Default for SensorOptions {
    fn default() -> Self {
        Self {
            freeze_once_visible: false,
            threshold: 0.0,
            root_margin_px: 0.0,
        }
    }
}

impl SensorOptions {
    fn validate(&self) -> Result<()> {
        ensure!(
            (0.0..=1.0).contains(&self.threshold),
            "sensor.threshold must be within [0, 1]"
        );
        ensure!(
            self.root_margin_px.is_finite(),
            "sensor.root-margin-px must be finite"
        );
        Ok(())
    }
}

/// How failed loads are retried.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RetryPolicy {
    /// Total attempts per slot, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for every further attempt.
    #[serde(with = "humantime_serde")]
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    const fn default_initial_backoff() -> Duration {
        Duration::from_millis(250)
    }

    /// Backoff before attempt `failed_attempts + 1`.
    pub fn backoff_after(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(16);
        self.initial_backoff.saturating_mul(1_u32 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Self::default_initial_backoff(),
        }
    }
}

/// Load sequencing and host loader settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct LoadOptions {
    #[serde(with = "humantime_serde")]
    pub safe_delay: Duration,
    /// Concurrent requests the host loader keeps in flight.
    pub max_concurrent_loads: usize,
    /// Artificial latency added by the host loader to placeholder requests.
    #[serde(with = "humantime_serde")]
    pub thumbnail_latency: Duration,
    /// Artificial latency added by the host loader to full-size requests.
    #[serde(with = "humantime_serde")]
    pub full_size_latency: Duration,
    pub retry: RetryPolicy,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            safe_delay: SAFE_DELAY,
            max_concurrent_loads: 4,
            thumbnail_latency: Duration::ZERO,
            full_size_latency: Duration::ZERO,
            retry: RetryPolicy::default(),
        }
    }
}

impl LoadOptions {
    fn validate(&self) -> Result<()> {
        ensure!(
            self.max_concurrent_loads > 0,
            "loading.max-concurrent-loads must be greater than zero"
        );
        ensure!(
            self.retry.max_attempts >= 1,
            "loading.retry.max-attempts must be >= 1"
        );
        Ok(())
    }
}

/// Where the gallery finds its assets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct LibraryOptions {
    /// Directory scanned for full-size images.
    pub full_size_dir: PathBuf,
    /// Directory holding placeholders under the same relative file names.
    #[serde(default)]
    pub placeholder_dir: Option<PathBuf>,
}

/// Grid layout of widgets on the page.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct LayoutOptions {
    pub item_width: f32,
    pub item_height: f32,
    pub gap: f32,
    pub columns: usize,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            item_width: 400.0,
            item_height: 600.0,
            gap: 16.0,
            columns: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ViewportOptions {
    pub width: f32,
    pub height: f32,
}

impl Default for ViewportOptions {
    fn default() -> Self {
        Self {
            width: 1280.0,
            height: 800.0,
        }
    }
}

/// Simulated scrolling over the page.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ScrollOptions {
    /// Pixels scrolled per tick.
    pub step_px: f32,
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Time to linger at the bottom so pending loads and timers settle.
    #[serde(with = "humantime_serde")]
    pub settle: Duration,
}

impl Default for ScrollOptions {
    fn default() -> Self {
        Self {
            step_px: 200.0,
            interval: Duration::from_millis(50),
            settle: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Configuration {
    pub library: LibraryOptions,
    #[serde(default)]
    pub features: FeatureFlags,
    #[serde(default)]
    pub sensor: SensorOptions,
    #[serde(default)]
    pub loading: LoadOptions,
    #[serde(default)]
    pub layout: LayoutOptions,
    #[serde(default)]
    pub viewport: ViewportOptions,
    #[serde(default)]
    pub scroll: ScrollOptions,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let mut cfg: Self = serde_yaml::from_str(&s)?;
        cfg.resolve_relative_paths(path.parent());
        Ok(cfg)
    }

    /// Library directories are relative to the configuration file.
    fn resolve_relative_paths(&mut self, base: Option<&Path>) {
        let Some(base) = base else {
            return;
        };
        if self.library.full_size_dir.is_relative() {
            self.library.full_size_dir = base.join(&self.library.full_size_dir);
        }
        if let Some(dir) = self.library.placeholder_dir.as_mut() {
            if dir.is_relative() {
                *dir = base.join(&*dir);
            }
        }
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(
            !self.library.full_size_dir.as_os_str().is_empty(),
            "library.full-size-dir must be set"
        );
        self.sensor.validate()?;
        self.loading.validate()?;
        ensure!(
            self.layout.item_width > 0.0 && self.layout.item_height > 0.0,
            "layout item dimensions must be positive"
        );
        ensure!(self.layout.gap >= 0.0, "layout.gap must not be negative");
        ensure!(
            self.layout.columns > 0,
            "layout.columns must be greater than zero"
        );
        ensure!(
            self.viewport.width > 0.0 && self.viewport.height > 0.0,
            "viewport dimensions must be positive"
        );
        ensure!(self.scroll.step_px > 0.0, "scroll.step-px must be positive");
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_failure() {
        let retry = RetryPolicy {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(100),
        };
        assert_eq!(retry.backoff_after(1), Duration::from_millis(100));
        assert_eq!(retry.backoff_after(2), Duration::from_millis(200));
        assert_eq!(retry.backoff_after(3), Duration::from_millis(400));
    }

    #[test]
    fn default_flags_follow_picture_variant() {
        let flags = FeatureFlags::default();
        assert!(flags.diminish_on_hidden);
        assert!(!flags.placeholder_blur);
        assert_eq!(flags.blur_radius_px, 4);
        assert_eq!(flags.transition_duration, Duration::from_millis(500));
    }
}
