//! Pure mapping from load state to presentation directives.

use std::fmt::{self, Write as _};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::FeatureFlags;
use crate::state::LoadState;

/// Directive vocabulary. `resolve` only emits `Visible` and `Inherit`;
/// `Hidden` is accepted when directives are read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Visibility {
    Visible,
    Hidden,
    Inherit,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Visible => "visible",
            Self::Hidden => "hidden",
            Self::Inherit => "inherit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Easing {
    EaseIn,
    EaseOut,
    EaseInOut,
}

impl Easing {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EaseIn => "ease-in",
            Self::EaseOut => "ease-out",
            Self::EaseInOut => "ease-in-out",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Transition {
    #[serde(with = "humantime_serde")]
    pub opacity_duration: Duration,
    pub opacity_easing: Easing,
    /// When set, visibility flips after this delay instead of immediately.
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none", default)]
    pub visibility_delay: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum Filter {
    None,
    Blur { radius_px: u32 },
}

/// Default slot layout: stretched over the wrapper, cropped to cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SlotLayout {
    FillCover,
}

/// Directive for one image slot, ready to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SlotStyle {
    /// Either 0 or 1.
    pub opacity: u8,
    pub visibility: Visibility,
    pub transition: Transition,
    pub filter: Filter,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout: Option<SlotLayout>,
}

impl SlotStyle {
    pub fn is_opaque(&self) -> bool {
        self.opacity == 1
    }

    /// Render as CSS declarations.
    pub fn css(&self) -> String {
        let mut out = String::new();
        if let Some(SlotLayout::FillCover) = self.layout {
            out.push_str(
                "position: absolute; top: 0; left: 0; bottom: 0; right: 0; \
                 width: 100%; height: 100%; object-fit: cover; ",
            );
        }
        let t = &self.transition;
        let ms = t.opacity_duration.as_millis();
        let _ = write!(
            out,
            "opacity: {}; visibility: {}; transition: opacity {}ms {}",
            self.opacity,
            self.visibility.as_str(),
            ms,
            t.opacity_easing.as_str()
        );
        match t.visibility_delay {
            Some(delay) => {
                let _ = write!(out, ", visibility 0ms ease-out {}ms", delay.as_millis());
            }
            None => out.push_str(" 0ms"),
        }
        match self.filter {
            Filter::None => out.push_str("; filter: none;"),
            Filter::Blur { radius_px } => {
                let _ = write!(out, "; filter: blur({radius_px}px);");
            }
        }
        out
    }
}

impl fmt::Display for SlotStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.css())
    }
}

/// Everything the presentation layer needs for one widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Presentation {
    /// Whether the asset elements should exist at all.
    pub render_assets: bool,
    /// Placeholder slot, or the full asset when no placeholder exists.
    pub thumbnail: Option<SlotStyle>,
    pub full_size: Option<SlotStyle>,
}

/// Derive presentation directives from the current state. No side effects.
pub fn resolve(state: &LoadState, flags: &FeatureFlags, has_placeholder: bool) -> Presentation {
    let render_assets = state.gate_open();
    if !render_assets {
        return Presentation {
            render_assets,
            thumbnail: None,
            full_size: None,
        };
    }
    let layout = (!flags.disable_default_presentation).then_some(SlotLayout::FillCover);

    let thumbnail = (!state.placeholder_removed).then(|| {
        let crossfaded_out =
            has_placeholder && state.full_size_loaded && !flags.diminish_on_hidden;
        let shown = state.thumbnail_loaded && !crossfaded_out;
        let visibility = if flags.diminish_on_hidden && !state.visible && state.thumbnail_loaded {
            Visibility::Visible
        } else {
            Visibility::Inherit
        };
        let filter = if flags.placeholder_blur {
            Filter::Blur {
                radius_px: flags.blur_radius_px,
            }
        } else {
            Filter::None
        };
        SlotStyle {
            opacity: u8::from(shown),
            visibility,
            transition: Transition {
                opacity_duration: flags.transition_duration,
                opacity_easing: Easing::EaseInOut,
                visibility_delay: Some(flags.transition_duration),
            },
            filter,
            layout,
        }
    });

    let full_size = (has_placeholder && state.thumbnail_loaded).then(|| {
        let shown = if flags.diminish_on_hidden {
            state.visible && state.full_size_loaded
        } else {
            state.full_size_loaded
        };
        SlotStyle {
            opacity: u8::from(shown),
            visibility: Visibility::Inherit,
            transition: Transition {
                opacity_duration: flags.transition_duration,
                opacity_easing: Easing::EaseIn,
                visibility_delay: None,
            },
            filter: Filter::None,
            layout,
        }
    });

    Presentation {
        render_assets,
        thumbnail,
        full_size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(visible: bool, thumbnail_loaded: bool, full_size_loaded: bool) -> LoadState {
        LoadState {
            thumbnail_loaded,
            full_size_loaded,
            visible,
            ..LoadState::default()
        }
    }

    fn diminishing() -> FeatureFlags {
        FeatureFlags::default()
    }

    fn permanent() -> FeatureFlags {
        FeatureFlags {
            diminish_on_hidden: false,
            ..FeatureFlags::default()
        }
    }

    #[test]
    fn nothing_rendered_before_gate_opens() {
        let p = resolve(&LoadState::default(), &diminishing(), true);
        assert!(!p.render_assets);
        assert!(p.thumbnail.is_none() && p.full_size.is_none());
    }

    #[test]
    fn thumbnail_fades_in_once_loaded() {
        let flags = diminishing();
        let before = resolve(&state(true, false, false), &flags, true);
        assert_eq!(before.thumbnail.unwrap().opacity, 0);
        assert!(before.full_size.is_none(), "full slot waits for the placeholder");

        let after = resolve(&state(true, true, false), &flags, true);
        assert_eq!(after.thumbnail.unwrap().opacity, 1);
        assert_eq!(after.full_size.unwrap().opacity, 0);
    }

    #[test]
    fn diminish_on_hidden_follows_visibility() {
        let flags = diminishing();
        for visible in [true, false, true] {
            let p = resolve(&state(visible, true, true), &flags, true);
            assert_eq!(p.full_size.unwrap().is_opaque(), visible);
            assert_eq!(p.thumbnail.unwrap().opacity, 1, "placeholder stays behind");
        }
        let hidden = resolve(&state(false, true, true), &flags, true);
        assert_eq!(hidden.thumbnail.unwrap().visibility, Visibility::Visible);
        let shown = resolve(&state(true, true, true), &flags, true);
        assert_eq!(shown.thumbnail.unwrap().visibility, Visibility::Inherit);
    }

    #[test]
    fn permanent_mode_crossfades_then_drops_placeholder() {
        let flags = permanent();
        let loaded = resolve(&state(false, true, true), &flags, true);
        assert!(loaded.full_size.unwrap().is_opaque(), "visibility is ignored");
        assert_eq!(loaded.thumbnail.unwrap().opacity, 0);

        let removed = LoadState {
            placeholder_removed: true,
            ..state(true, true, true)
        };
        let p = resolve(&removed, &flags, true);
        assert!(p.thumbnail.is_none());
        assert!(p.full_size.unwrap().is_opaque());
    }

    #[test]
    fn single_slot_without_placeholder() {
        let p = resolve(&state(true, true, true), &permanent(), false);
        assert!(p.full_size.is_none());
        assert!(p.thumbnail.unwrap().is_opaque());
    }

    #[test]
    fn blur_applies_only_to_placeholder() {
        let flags = FeatureFlags {
            placeholder_blur: true,
            blur_radius_px: 6,
            ..FeatureFlags::default()
        };
        let p = resolve(&state(true, true, false), &flags, true);
        assert_eq!(p.thumbnail.unwrap().filter, Filter::Blur { radius_px: 6 });
        assert_eq!(p.full_size.unwrap().filter, Filter::None);
    }

    #[test]
    fn blur_follows_flag_when_asset_fills_thumbnail_slot() {
        let flags = FeatureFlags {
            placeholder_blur: true,
            ..FeatureFlags::default()
        };
        let p = resolve(&state(true, true, true), &flags, false);
        assert_eq!(p.thumbnail.unwrap().filter, Filter::Blur { radius_px: 4 });
        assert!(p.full_size.is_none());

        let p = resolve(&state(true, true, true), &FeatureFlags::default(), false);
        assert_eq!(p.thumbnail.unwrap().filter, Filter::None);
    }

    #[test]
    fn resolver_never_emits_hidden() {
        for flags in [diminishing(), permanent()] {
            for has_placeholder in [true, false] {
                for bits in 0..16u8 {
                    let s = LoadState {
                        visible: bits & 1 != 0,
                        thumbnail_loaded: bits & 2 != 0,
                        full_size_loaded: bits & 4 != 0,
                        placeholder_removed: bits & 8 != 0,
                        failed: None,
                    };
                    let p = resolve(&s, &flags, has_placeholder);
                    for slot in [p.thumbnail, p.full_size].into_iter().flatten() {
                        assert_ne!(slot.visibility, Visibility::Hidden, "{s:?}");
                    }
                }
            }
        }
        let parsed: Visibility = serde_yaml::from_str("hidden").unwrap();
        assert_eq!(parsed.as_str(), "hidden");
    }

    #[test]
    fn default_presentation_can_be_disabled() {
        let flags = FeatureFlags {
            disable_default_presentation: true,
            ..FeatureFlags::default()
        };
        let p = resolve(&state(true, true, false), &flags, true);
        assert!(p.thumbnail.unwrap().layout.is_none());
        let p = resolve(&state(true, true, false), &FeatureFlags::default(), true);
        assert_eq!(p.thumbnail.unwrap().layout, Some(SlotLayout::FillCover));
    }

    #[test]
    fn renders_css_declarations() {
        let flags = FeatureFlags {
            placeholder_blur: true,
            disable_default_presentation: true,
            ..FeatureFlags::default()
        };
        let p = resolve(&state(true, true, false), &flags, true);
        assert_eq!(
            p.thumbnail.unwrap().css(),
            "opacity: 1; visibility: inherit; transition: opacity 500ms ease-in-out, \
             visibility 0ms ease-out 500ms; filter: blur(4px);"
        );
        assert_eq!(
            p.full_size.unwrap().to_string(),
            "opacity: 0; visibility: inherit; transition: opacity 500ms ease-in 0ms; filter: none;"
        );
    }
}
