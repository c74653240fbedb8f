pub mod asset;
pub mod config;
pub mod error;
pub mod events;
pub mod library;
pub mod sensor;
pub mod state;
pub mod style;
pub mod widget;
pub mod tasks {
    pub mod gallery;
    pub mod loader;
    pub mod scroll;
    pub mod widget;
}

pub use asset::{AssetRef, ResponsiveSource, Slot};
pub use config::{Configuration, FeatureFlags, SAFE_DELAY};
pub use sensor::{Rect, VisibilitySensor};
pub use state::{Effect, LoadState, LoadStateMachine, Phase, Step, Ticket};
pub use style::{Presentation, SlotStyle, resolve};
pub use widget::{Widget, WidgetId, WidgetSnapshot};
