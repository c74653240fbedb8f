use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the two image slots a widget manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Slot {
    /// Placeholder slot. Holds the full asset when no placeholder exists.
    Thumbnail,
    FullSize,
}

impl Slot {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Thumbnail => "thumbnail",
            Self::FullSize => "full-size",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A responsive alternate, the equivalent of a `<source>` element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ResponsiveSource {
    pub srcset: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl ResponsiveSource {
    pub fn new(srcset: impl Into<String>) -> Self {
        Self {
            srcset: srcset.into(),
            media: None,
            mime_type: None,
        }
    }

    pub fn with_media(mut self, media: impl Into<String>) -> Self {
        self.media = Some(media.into());
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

/// Identifies the assets behind one widget: the full-size locator plus an
/// optional cheap placeholder, each with optional responsive alternates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AssetRef {
    pub primary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<ResponsiveSource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub placeholder_sources: Vec<ResponsiveSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl AssetRef {
    pub fn new(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            placeholder: None,
            sources: Vec::new(),
            placeholder_sources: Vec::new(),
            title: None,
        }
    }

    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    pub fn with_sources(mut self, sources: Vec<ResponsiveSource>) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_placeholder_sources(mut self, sources: Vec<ResponsiveSource>) -> Self {
        self.placeholder_sources = sources;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn has_placeholder(&self) -> bool {
        self.placeholder.is_some()
    }

    /// Locator fetched for `slot`. The thumbnail slot falls back to the primary
    /// locator so placeholder and full asset coincide.
    pub fn locator(&self, slot: Slot) -> &str {
        match slot {
            Slot::Thumbnail => self.placeholder.as_deref().unwrap_or(&self.primary),
            Slot::FullSize => &self.primary,
        }
    }

    /// Responsive alternates offered for `slot`.
    pub fn alternates(&self, slot: Slot) -> &[ResponsiveSource] {
        match slot {
            Slot::Thumbnail if self.has_placeholder() && !self.placeholder_sources.is_empty() => {
                &self.placeholder_sources
            }
            Slot::Thumbnail | Slot::FullSize => &self.sources,
        }
    }
}
