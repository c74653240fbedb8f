use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::asset::{AssetRef, ResponsiveSource, Slot};
use crate::config::{FeatureFlags, LoadOptions, SensorOptions};
use crate::sensor::{Rect, VisibilitySensor};
use crate::state::{LoadState, LoadStateMachine, Phase, Step, Ticket};
use crate::style::{self, Presentation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WidgetId(pub usize);

impl fmt::Display for WidgetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// State published by a widget after every change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WidgetSnapshot {
    pub widget: WidgetId,
    pub phase: Phase,
    pub state: LoadState,
    pub presentation: Presentation,
    /// Alternates for each rendered slot; empty while the slot is absent.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub thumbnail_sources: Vec<ResponsiveSource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub full_size_sources: Vec<ResponsiveSource>,
}

/// One progressive image instance: a visibility sensor, a load state machine
/// and the inputs the resolver needs, owned together.
pub struct Widget {
    id: WidgetId,
    asset: AssetRef,
    flags: FeatureFlags,
    sensor: VisibilitySensor,
    machine: LoadStateMachine,
}

impl Widget {
    pub fn mount(
        id: WidgetId,
        asset: AssetRef,
        flags: FeatureFlags,
        sensor: SensorOptions,
        loading: &LoadOptions,
    ) -> Self {
        let machine = LoadStateMachine::new(asset.has_placeholder(), &flags, loading);
        Self {
            id,
            asset,
            flags,
            sensor: VisibilitySensor::new(sensor),
            machine,
        }
    }

    pub fn id(&self) -> WidgetId {
        self.id
    }

    pub fn asset(&self) -> &AssetRef {
        &self.asset
    }

    pub fn flags(&self) -> &FeatureFlags {
        &self.flags
    }

    pub fn state(&self) -> LoadState {
        self.machine.state()
    }

    pub fn phase(&self) -> Phase {
        self.machine.phase()
    }

    pub fn is_settled(&self) -> bool {
        self.machine.is_settled()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.machine.next_deadline()
    }

    pub fn locator(&self, slot: Slot) -> &str {
        self.asset.locator(slot)
    }

    /// Place (or move) the widget's region on the page and re-evaluate it.
    pub fn on_layout(&mut self, region: Rect, viewport: &Rect, now: Instant) -> Step {
        self.sensor.attach(region);
        self.on_viewport(viewport, now)
    }

    pub fn on_viewport(&mut self, viewport: &Rect, now: Instant) -> Step {
        match self.sensor.observe(viewport) {
            Some(visible) => self.machine.on_visibility(visible, now),
            None => Step::default(),
        }
    }

    pub fn on_asset_loaded(&mut self, slot: Slot, ticket: Ticket, now: Instant) -> Step {
        self.machine.on_asset_loaded(slot, ticket, now)
    }

    pub fn on_asset_failed(&mut self, slot: Slot, ticket: Ticket, now: Instant) -> Step {
        self.machine.on_asset_failed(slot, ticket, now)
    }

    pub fn on_tick(&mut self, now: Instant) -> Step {
        self.machine.on_tick(now)
    }

    pub fn unmount(&mut self) -> Step {
        self.machine.teardown()
    }

    pub fn presentation(&self) -> Presentation {
        style::resolve(
            &self.machine.state(),
            &self.flags,
            self.asset.has_placeholder(),
        )
    }

    pub fn snapshot(&self) -> WidgetSnapshot {
        let presentation = self.presentation();
        let sources = |slot: Slot, rendered: bool| {
            if rendered {
                self.asset.alternates(slot).to_vec()
            } else {
                Vec::new()
            }
        };
        WidgetSnapshot {
            widget: self.id,
            phase: self.phase(),
            state: self.state(),
            thumbnail_sources: sources(Slot::Thumbnail, presentation.thumbnail.is_some()),
            full_size_sources: sources(Slot::FullSize, presentation.full_size.is_some()),
            presentation,
        }
    }
}
