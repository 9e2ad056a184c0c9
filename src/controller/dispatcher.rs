//! Change detection and callback dispatch
//!
//! [`StateTracker::apply`] is the single transition every new reading goes
//! through, whether it came off the bus or from a manual override:
//!
//! 1. compare the candidate buttons against the previously published reading
//! 2. publish reading and changed flags together through the watch channel
//! 3. run the registered callbacks: C change, Z change, then any update
//!
//! Publishing happens before dispatch so a callback that reads the handle
//! already sees the reading it was called with.

use serde::Serialize;
use std::fmt;
use tokio::sync::watch;
use tracing::{debug, info};

use super::frame::{button_state, Button, ControllerState};

/// A registered state callback
pub type StateCallback = Box<dyn FnMut(ControllerState) + Send + 'static>;

/// Optional callbacks invoked from the poll task
#[derive(Default)]
pub struct Callbacks {
    on_c_change: Option<StateCallback>,
    on_z_change: Option<StateCallback>,
    on_any_update: Option<StateCallback>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called when C was pressed or released since the previous reading.
    pub fn on_c_change(mut self, callback: impl FnMut(ControllerState) + Send + 'static) -> Self {
        self.on_c_change = Some(Box::new(callback));
        self
    }

    /// Called when Z was pressed or released since the previous reading.
    pub fn on_z_change(mut self, callback: impl FnMut(ControllerState) + Send + 'static) -> Self {
        self.on_z_change = Some(Box::new(callback));
        self
    }

    /// Called after every successful reading, changed or not.
    pub fn on_any_update(
        mut self,
        callback: impl FnMut(ControllerState) + Send + 'static,
    ) -> Self {
        self.on_any_update = Some(Box::new(callback));
        self
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_c_change", &self.on_c_change.is_some())
            .field("on_z_change", &self.on_z_change.is_some())
            .field("on_any_update", &self.on_any_update.is_some())
            .finish()
    }
}

/// Snapshot shared with readers through the watch channel
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct HandleState {
    /// Last reading, `None` until the first successful poll
    pub state: Option<ControllerState>,
    pub button_c_changed: bool,
    pub button_z_changed: bool,
    /// Number of readings applied so far
    pub updates: u64,
}

impl HandleState {
    pub fn changed(&self, button: Button) -> bool {
        match button {
            Button::C => self.button_c_changed,
            Button::Z => self.button_z_changed,
        }
    }
}

impl fmt::Display for HandleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            Some(state) => write!(
                f,
                "{} (C changed: {}, Z changed: {})",
                state, self.button_c_changed, self.button_z_changed
            ),
            None => f.write_str("<no reading yet>"),
        }
    }
}

// Tracker settings
#[derive(Clone, Debug, Default)]
pub struct TrackerSettings {
    /// Report edges on the very first reading instead of treating it as unchanged
    pub report_initial_edges: bool,
}

/// Owns the published state and the callbacks
pub struct StateTracker {
    settings: TrackerSettings,
    state_sender: watch::Sender<HandleState>,
    callbacks: Callbacks,
}

impl StateTracker {
    pub fn new(settings: Option<TrackerSettings>, callbacks: Callbacks) -> Self {
        let settings = settings.unwrap_or_default();
        let (state_sender, _) = watch::channel(HandleState::default());
        debug!(
            "Created state tracker with settings {:?} and {:?}",
            settings, callbacks
        );
        Self {
            settings,
            state_sender,
            callbacks,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<HandleState> {
        self.state_sender.subscribe()
    }

    pub fn current(&self) -> HandleState {
        *self.state_sender.borrow()
    }

    /// Base for a manual override: the last reading, or a neutral one.
    pub fn override_base(&self) -> ControllerState {
        self.current().state.unwrap_or_else(ControllerState::neutral)
    }

    /// Apply a new reading: detect edges, publish, dispatch.
    pub fn apply(&mut self, candidate: ControllerState) -> HandleState {
        let previous = self.current();

        // With no previous reading every button counts as changed, if reported at all
        let changed = |button: Button| match previous.state {
            Some(prev) => prev.button(button) != candidate.button(button),
            None => self.settings.report_initial_edges,
        };
        let button_c_changed = changed(Button::C);
        let button_z_changed = changed(Button::Z);

        let next = HandleState {
            state: Some(candidate),
            button_c_changed,
            button_z_changed,
            updates: previous.updates + 1,
        };
        // Single publish keeps reading and flags together for readers
        self.state_sender.send_replace(next);
        debug!("Published {}", next);

        if button_c_changed {
            info!("Button {} {}", Button::C, button_state(candidate.button(Button::C)));
            if let Some(callback) = self.callbacks.on_c_change.as_mut() {
                callback(candidate);
            }
        }
        if button_z_changed {
            info!("Button {} {}", Button::Z, button_state(candidate.button(Button::Z)));
            if let Some(callback) = self.callbacks.on_z_change.as_mut() {
                callback(candidate);
            }
        }
        if let Some(callback) = self.callbacks.on_any_update.as_mut() {
            callback(candidate);
        }

        next
    }
}
