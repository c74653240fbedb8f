use serde::Serialize;

use crate::asset::Slot;
use crate::sensor::Rect;
use crate::state::Ticket;
use crate::widget::{WidgetId, WidgetSnapshot};

/// Widget -> Loader
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoaderCommand {
    Load(LoadRequest),
    /// The requesting element went away; drop the request if still pending.
    Abort { widget: WidgetId, ticket: Ticket },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub widget: WidgetId,
    pub slot: Slot,
    pub ticket: Ticket,
    pub locator: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AssetInfo {
    pub width: u32,
    pub height: u32,
}

/// Loader -> Gallery -> Widget
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOutcome {
    pub widget: WidgetId,
    pub slot: Slot,
    pub ticket: Ticket,
    pub result: Result<AssetInfo, String>,
}

/// Inbound events for one widget driver, besides viewport changes.
#[derive(Debug, Clone, PartialEq)]
pub enum WidgetEvent {
    Layout(Rect),
    Loaded { slot: Slot, ticket: Ticket },
    Failed { slot: Slot, ticket: Ticket },
}

impl From<LoadOutcome> for WidgetEvent {
    fn from(outcome: LoadOutcome) -> Self {
        let LoadOutcome {
            slot,
            ticket,
            result,
            ..
        } = outcome;
        match result {
            Ok(_) => Self::Loaded { slot, ticket },
            Err(_) => Self::Failed { slot, ticket },
        }
    }
}

/// Widget -> Gallery -> consumer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WidgetUpdate(pub WidgetSnapshot);
