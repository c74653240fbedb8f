//! Per-widget progressive load state machine.
//!
//! The machine never sleeps. Every operation takes the current `Instant`,
//! deadlines are exposed through [`LoadStateMachine::next_deadline`] and fired
//! by [`LoadStateMachine::on_tick`], so the same code runs under the async
//! driver and under plain unit tests.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::asset::Slot;
use crate::config::{FeatureFlags, LoadOptions, RetryPolicy};

/// Identifies one asset request so that stale completions can be discarded.
pub type Ticket = u64;

/// Snapshot of a widget's load and visibility facts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LoadState {
    pub thumbnail_loaded: bool,
    pub full_size_loaded: bool,
    pub visible: bool,
    pub placeholder_removed: bool,
    /// Slot that exhausted its load attempts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed: Option<Slot>,
}

impl LoadState {
    /// Whether the asset elements should exist at all.
    pub fn gate_open(&self) -> bool {
        self.visible || self.thumbnail_loaded
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Idle,
    Armed,
    ThumbnailLoaded,
    FullSizeLoaded,
    PlaceholderRemoved,
    Failed,
}

/// Work the host has to carry out on behalf of the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Start fetching the asset for `slot`; report back with `ticket`.
    Request { slot: Slot, ticket: Ticket },
    /// The element for `slot` went away before it loaded.
    Abandon { slot: Slot, ticket: Ticket },
}

/// Result of feeding one event into the machine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Step {
    /// The observable `LoadState` changed.
    pub changed: bool,
    pub effects: Vec<Effect>,
}

impl Step {
    fn unchanged() -> Self {
        Self::default()
    }

    pub fn is_noop(&self) -> bool {
        !self.changed && self.effects.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
struct SlotTracker {
    in_flight: Option<Ticket>,
    failures: u32,
    retry_at: Option<Instant>,
}

pub struct LoadStateMachine {
    has_placeholder: bool,
    diminish_on_hidden: bool,
    removal_delay: Duration,
    retry: RetryPolicy,
    state: LoadState,
    next_ticket: Ticket,
    thumbnail: SlotTracker,
    full_size: SlotTracker,
    removal_at: Option<Instant>,
    torn_down: bool,
}

impl LoadStateMachine {
    pub fn new(has_placeholder: bool, flags: &FeatureFlags, loading: &LoadOptions) -> Self {
        Self {
            has_placeholder,
            diminish_on_hidden: flags.diminish_on_hidden,
            removal_delay: flags.transition_duration + loading.safe_delay,
            retry: loading.retry.clone(),
            state: LoadState::default(),
            next_ticket: 1,
            thumbnail: SlotTracker::default(),
            full_size: SlotTracker::default(),
            removal_at: None,
            torn_down: false,
        }
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn has_placeholder(&self) -> bool {
        self.has_placeholder
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    pub fn phase(&self) -> Phase {
        let s = &self.state;
        if s.failed.is_some() {
            Phase::Failed
        } else if s.placeholder_removed {
            Phase::PlaceholderRemoved
        } else if s.full_size_loaded {
            Phase::FullSizeLoaded
        } else if s.thumbnail_loaded {
            Phase::ThumbnailLoaded
        } else if s.gate_open() {
            Phase::Armed
        } else {
            Phase::Idle
        }
    }

    /// No further changes can happen apart from visibility toggles.
    pub fn is_settled(&self) -> bool {
        let s = &self.state;
        if s.failed.is_some() {
            return true;
        }
        s.thumbnail_loaded
            && s.full_size_loaded
            && (s.placeholder_removed || self.diminish_on_hidden || !self.has_placeholder)
    }

    /// Earliest pending removal or retry deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.removal_at,
            self.thumbnail.retry_at,
            self.full_size.retry_at,
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Ticket of the outstanding request for `slot`, if any.
    pub fn in_flight(&self, slot: Slot) -> Option<Ticket> {
        self.tracker(slot).in_flight
    }

    pub fn on_visibility(&mut self, visible: bool, _now: Instant) -> Step {
        if self.torn_down || self.state.visible == visible {
            return Step::unchanged();
        }
        trace!(visible, "visibility changed");
        self.state.visible = visible;
        let mut step = Step {
            changed: true,
            effects: Vec::new(),
        };
        self.sync_requests(&mut step.effects);
        step
    }

    /// Placeholder slot finished loading (the full asset when no placeholder exists).
    /// Ignored while the gate is closed, since no element is mounted then.
    pub fn on_thumbnail_loaded(&mut self, now: Instant) -> Step {
        self.complete(Slot::Thumbnail, None, now)
    }

    pub fn on_full_size_loaded(&mut self, now: Instant) -> Step {
        self.complete(Slot::FullSize, None, now)
    }

    /// Completion for a specific request. Stale tickets are ignored.
    pub fn on_asset_loaded(&mut self, slot: Slot, ticket: Ticket, now: Instant) -> Step {
        self.complete(slot, Some(ticket), now)
    }

    pub fn on_asset_failed(&mut self, slot: Slot, ticket: Ticket, now: Instant) -> Step {
        if self.torn_down {
            return Step::unchanged();
        }
        let slot = self.effective_slot(slot);
        if self.is_loaded(slot) || self.tracker(slot).in_flight != Some(ticket) {
            trace!(%slot, ticket, "ignoring stale failure");
            return Step::unchanged();
        }
        let max_attempts = self.retry.max_attempts;
        let tracker = self.tracker_mut(slot);
        tracker.in_flight = None;
        tracker.failures += 1;
        let failures = tracker.failures;
        if failures < max_attempts {
            let backoff = self.retry.backoff_after(failures);
            self.tracker_mut(slot).retry_at = Some(now + backoff);
            debug!(%slot, failures, backoff_ms = backoff.as_millis() as u64, "load failed; retry scheduled");
            return Step::unchanged();
        }
        warn!(%slot, failures, "load failed; giving up");
        self.state.failed = Some(slot);
        self.removal_at = None;
        self.thumbnail.retry_at = None;
        self.full_size.retry_at = None;
        Step {
            changed: true,
            effects: Vec::new(),
        }
    }

    /// Fire every deadline that is due at `now`.
    pub fn on_tick(&mut self, now: Instant) -> Step {
        if self.torn_down {
            return Step::unchanged();
        }
        let mut step = Step::unchanged();
        if self.removal_at.is_some_and(|at| at <= now) {
            self.removal_at = None;
            self.state.placeholder_removed = true;
            step.changed = true;
            debug!("placeholder removed");
        }
        let mut retry_due = false;
        for tracker in [&mut self.thumbnail, &mut self.full_size] {
            if tracker.retry_at.is_some_and(|at| at <= now) {
                tracker.retry_at = None;
                retry_due = true;
            }
        }
        if retry_due {
            self.sync_requests(&mut step.effects);
        }
        step
    }

    /// Stop the machine. Pending deadlines are dropped and every later event is
    /// a no-op. Outstanding requests are reported as abandoned.
    pub fn teardown(&mut self) -> Step {
        if self.torn_down {
            return Step::unchanged();
        }
        self.torn_down = true;
        self.removal_at = None;
        let mut step = Step::unchanged();
        for slot in [Slot::Thumbnail, Slot::FullSize] {
            let tracker = self.tracker_mut(slot);
            tracker.retry_at = None;
            if let Some(ticket) = tracker.in_flight.take() {
                step.effects.push(Effect::Abandon { slot, ticket });
            }
        }
        step
    }

    fn complete(&mut self, slot: Slot, ticket: Option<Ticket>, now: Instant) -> Step {
        if self.torn_down {
            trace!(%slot, "completion after teardown");
            return Step::unchanged();
        }
        let slot = self.effective_slot(slot);
        match ticket {
            Some(ticket) if self.tracker(slot).in_flight != Some(ticket) => {
                trace!(%slot, ticket, "ignoring stale completion");
                return Step::unchanged();
            }
            None if slot == Slot::Thumbnail && !self.state.gate_open() => {
                trace!(%slot, "ignoring completion while nothing is mounted");
                return Step::unchanged();
            }
            _ => {}
        }
        if self.state.failed.is_some() || self.is_loaded(slot) {
            return Step::unchanged();
        }
        if slot == Slot::FullSize && !self.state.thumbnail_loaded {
            warn!("full-size asset reported before placeholder; ignoring");
            return Step::unchanged();
        }

        let tracker = self.tracker_mut(slot);
        tracker.in_flight = None;
        tracker.retry_at = None;

        let mut step = Step {
            changed: true,
            effects: Vec::new(),
        };
        match slot {
            Slot::Thumbnail => {
                self.state.thumbnail_loaded = true;
                if !self.has_placeholder {
                    self.state.full_size_loaded = true;
                }
                debug!(has_placeholder = self.has_placeholder, "thumbnail loaded");
                self.sync_requests(&mut step.effects);
            }
            Slot::FullSize => {
                self.state.full_size_loaded = true;
                if !self.diminish_on_hidden {
                    self.removal_at = Some(now + self.removal_delay);
                    debug!(
                        delay_ms = self.removal_delay.as_millis() as u64,
                        "full size loaded; placeholder removal armed"
                    );
                } else {
                    debug!("full size loaded");
                }
            }
        }
        step
    }

    /// Issue or abandon requests so they match the current gate.
    fn sync_requests(&mut self, effects: &mut Vec<Effect>) {
        if self.state.failed.is_some() {
            return;
        }
        if !self.state.thumbnail_loaded {
            let gate_open = self.state.gate_open();
            let retry_pending = self.thumbnail.retry_at.is_some();
            match (gate_open, self.thumbnail.in_flight) {
                (true, None) if !retry_pending => {
                    let ticket = self.issue_ticket();
                    self.thumbnail.in_flight = Some(ticket);
                    effects.push(Effect::Request {
                        slot: Slot::Thumbnail,
                        ticket,
                    });
                }
                (false, Some(ticket)) => {
                    self.thumbnail.in_flight = None;
                    debug!(ticket, "thumbnail abandoned before load");
                    effects.push(Effect::Abandon {
                        slot: Slot::Thumbnail,
                        ticket,
                    });
                }
                _ => {}
            }
        } else if self.has_placeholder
            && !self.state.full_size_loaded
            && self.full_size.in_flight.is_none()
            && self.full_size.retry_at.is_none()
        {
            let ticket = self.issue_ticket();
            self.full_size.in_flight = Some(ticket);
            effects.push(Effect::Request {
                slot: Slot::FullSize,
                ticket,
            });
        }
    }

    fn issue_ticket(&mut self) -> Ticket {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        ticket
    }

    /// Without a placeholder the full asset lives in the thumbnail slot.
    fn effective_slot(&self, slot: Slot) -> Slot {
        if self.has_placeholder {
            slot
        } else {
            Slot::Thumbnail
        }
    }

    fn is_loaded(&self, slot: Slot) -> bool {
        match slot {
            Slot::Thumbnail => self.state.thumbnail_loaded,
            Slot::FullSize => self.state.full_size_loaded,
        }
    }

    fn tracker(&self, slot: Slot) -> &SlotTracker {
        match slot {
            Slot::Thumbnail => &self.thumbnail,
            Slot::FullSize => &self.full_size,
        }
    }

    fn tracker_mut(&mut self, slot: Slot) -> &mut SlotTracker {
        match slot {
            Slot::Thumbnail => &mut self.thumbnail,
            Slot::FullSize => &mut self.full_size,
        }
    }
}
