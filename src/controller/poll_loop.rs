use chrono::Local;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::device::{DeviceError, NunchuckDevice, Ready};
use super::dispatcher::{HandleState, StateTracker};
use super::frame::{button_state, unscramble, Button, ControllerState};

/// Manual override request, answered with the snapshot it produced
#[derive(Debug)]
pub struct OverrideRequest {
    pub button: Button,
    pub pressed: bool,
    pub response_tx: oneshot::Sender<HandleState>,
}

/// One initialized device plus the state it feeds
pub struct Poller {
    device: NunchuckDevice<Ready>,
    tracker: StateTracker,
}

impl Poller {
    pub fn new(device: NunchuckDevice<Ready>, tracker: StateTracker) -> Self {
        Self { device, tracker }
    }

    pub fn tracker(&self) -> &StateTracker {
        &self.tracker
    }

    /// Run one full poll cycle.
    ///
    /// On error nothing is published and no callback runs.
    pub async fn poll_once(&mut self) -> Result<HandleState, DeviceError> {
        let frame = self.device.read_frame().await?;
        // read_frame only returns complete frames
        let candidate = ControllerState::from_unscrambled(frame.map(unscramble));
        debug!("Decoded {}", candidate);
        Ok(self.tracker.apply(candidate))
    }

    /// Force one button, holding every other value at the last reading.
    pub fn apply_override(&mut self, button: Button, pressed: bool) -> HandleState {
        info!("Fake button {} {}", button, button_state(pressed));
        let candidate = self.tracker.override_base().with_button(button, pressed);
        let snapshot = self.tracker.apply(candidate);
        if !snapshot.changed(button) {
            debug!("Button {} was already {}", button, button_state(pressed));
        }
        snapshot
    }
}

// Run the poll loop until cancelled
pub async fn run_poll_loop(
    mut poller: Poller,
    mut overrides: mpsc::Receiver<OverrideRequest>,
    cancel: CancellationToken,
    tick: Duration,
) {
    info!("Starting poll loop with {} ms tick", tick.as_millis());

    let mut interval_timer = tokio::time::interval(tick);
    // A slow callback pushes the next tick back instead of bunching ticks up
    interval_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // Stats for performance monitoring
    let mut cycles: u64 = 0;
    let mut failures: u64 = 0;
    let mut last_stats_time = Local::now();
    let stats_interval = chrono::Duration::seconds(30);

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                info!("Poll loop cancelled after {} cycles", cycles);
                break;
            }

            Some(request) = overrides.recv() => {
                let snapshot = poller.apply_override(request.button, request.pressed);
                if request.response_tx.send(snapshot).is_err() {
                    debug!("Override requester went away before the reply");
                }
            }

            _ = interval_timer.tick() => {
                cycles += 1;
                match poller.poll_once().await {
                    Ok(snapshot) => debug!("Poll cycle {} complete: {}", cycles, snapshot),
                    Err(e) => {
                        failures += 1;
                        warn!("Poll cycle {} skipped: {}", cycles, e);
                    }
                }
            }
        }

        let now = Local::now();
        if now - last_stats_time > stats_interval {
            let elapsed_seconds = (now - last_stats_time).num_seconds();
            info!(
                "Poll stats: {} cycles, {} failed in {} seconds",
                cycles, failures, elapsed_seconds
            );
            cycles = 0;
            failures = 0;
            last_stats_time = now;
        }
    }
}
