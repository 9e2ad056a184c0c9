//! Nunchuck Handle - public API for the polled controller
//!
//! Runs the device handshake in the caller's context, then moves the device
//! into a single background task that polls it on a fixed tick. Everything
//! the caller sees afterwards goes through the watch channel the task
//! publishes to, so reading the handle never blocks on the bus.

use std::fmt;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::device::{DeviceError, DeviceSettings, NunchuckDevice};
use super::dispatcher::{Callbacks, HandleState, StateTracker, TrackerSettings};
use super::frame::{Button, ControllerState, DeviceIdent};
use super::poll_loop::{run_poll_loop, OverrideRequest, Poller};
use crate::transport::Transport;

/// Configuration for the complete nunchuck subsystem
///
/// Split into device settings (address and bus timing) and tracker settings
/// when the handle is spawned.
///
/// # Examples
///
/// ```rust
/// use nunchuck::controller::NunchuckSettings;
///
/// // Poll at 20 Hz instead of the default 2 Hz
/// let fast = NunchuckSettings {
///     tick_ms: 50,
///     ..NunchuckSettings::default()
/// };
/// assert_eq!(fast.address, 0x52);
/// ```
#[derive(Clone, Debug)]
pub struct NunchuckSettings {
    /// 7-bit I2C address of the extension
    pub address: u8,

    /// Interval between poll cycles, read once at spawn
    pub tick_ms: u64,

    /// Quiet time before addressing the device
    pub settle_delay_us: u64,

    /// Time the device needs between trigger write and read
    pub response_delay_us: u64,

    /// Pause before retrying a failed trigger write
    pub recovery_delay_ms: u64,

    /// Pause after the wake-up handshake
    pub init_delay_ms: u64,

    /// Report both buttons as changed on the very first reading
    pub report_initial_edges: bool,
}

impl Default for NunchuckSettings {
    fn default() -> Self {
        let device = DeviceSettings::default();
        Self {
            address: device.address,
            tick_ms: 500,
            settle_delay_us: device.settle_delay_us,
            response_delay_us: device.response_delay_us,
            recovery_delay_ms: device.recovery_delay_ms,
            init_delay_ms: device.init_delay_ms,
            report_initial_edges: false,
        }
    }
}

/// Errors that can occur while starting or talking to the nunchuck
#[derive(Debug, thiserror::Error)]
pub enum NunchuckError {
    /// Error from the device layer
    ///
    /// During spawn this is always an initialization failure; the handle is
    /// never returned for a device that did not complete its handshake.
    #[error("Device error: {0}")]
    DeviceError(#[from] DeviceError),

    /// The poll task is gone
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// Invalid settings
    #[error("Initialization error: {0}")]
    InitializationError(String),
}

/// Handle to a running nunchuck poll task
///
/// The poll task runs until [`NunchuckHandle::shutdown`] or process exit;
/// dropping the handle does not stop it.
pub struct NunchuckHandle {
    state_receiver: watch::Receiver<HandleState>,
    override_sender: mpsc::Sender<OverrideRequest>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    address: u8,
    ident: Option<DeviceIdent>,
}

impl NunchuckHandle {
    /// Initialize the device and start polling it
    ///
    /// # Errors
    ///
    /// * [`NunchuckError::DeviceError`] - the handshake or ident read failed
    /// * [`NunchuckError::InitializationError`] - a zero tick interval was configured
    pub async fn spawn(
        transport: Box<dyn Transport>,
        settings: Option<NunchuckSettings>,
        callbacks: Callbacks,
    ) -> Result<Self, NunchuckError> {
        info!("Initializing nunchuck with settings: {:?}", settings);

        let settings = settings.unwrap_or_default();
        if settings.tick_ms == 0 {
            return Err(NunchuckError::InitializationError(
                "tick interval must be greater than zero".to_string(),
            ));
        }

        // Distribute settings to subsystem components
        let device_settings = DeviceSettings {
            address: settings.address,
            settle_delay_us: settings.settle_delay_us,
            response_delay_us: settings.response_delay_us,
            recovery_delay_ms: settings.recovery_delay_ms,
            init_delay_ms: settings.init_delay_ms,
        };
        let tracker_settings = TrackerSettings {
            report_initial_edges: settings.report_initial_edges,
        };
        debug!(
            "Split settings: device={:?}, tracker={:?}",
            device_settings, tracker_settings
        );

        let device = NunchuckDevice::create(transport, Some(device_settings))
            .initialize()
            .await
            .inspect_err(|e| error!("Nunchuck initialization failed: {}", e))?;
        let ident = device.ident();
        let address = device.settings().address;

        let tracker = StateTracker::new(Some(tracker_settings), callbacks);
        let state_receiver = tracker.subscribe();

        let (override_sender, override_receiver) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let tick = Duration::from_millis(settings.tick_ms);

        info!("Spawning nunchuck poll task");
        let task = tokio::spawn(run_poll_loop(
            Poller::new(device, tracker),
            override_receiver,
            cancel.clone(),
            tick,
        ));

        info!("Nunchuck at {:#04x} started", address);
        Ok(Self {
            state_receiver,
            override_sender,
            cancel,
            task,
            address,
            ident,
        })
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> HandleState {
        *self.state_receiver.borrow()
    }

    pub fn state(&self) -> Option<ControllerState> {
        self.snapshot().state
    }

    pub fn stick(&self) -> Option<(u8, u8)> {
        self.state().map(|s| s.stick)
    }

    pub fn accel(&self) -> Option<(u8, u8, u8)> {
        self.state().map(|s| s.accel)
    }

    pub fn button_c(&self) -> Option<bool> {
        self.state().map(|s| s.button_c)
    }

    pub fn button_z(&self) -> Option<bool> {
        self.state().map(|s| s.button_z)
    }

    pub fn button_c_changed(&self) -> bool {
        self.snapshot().button_c_changed
    }

    pub fn button_z_changed(&self) -> bool {
        self.snapshot().button_z_changed
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn ident(&self) -> Option<DeviceIdent> {
        self.ident
    }

    // Get a receiver for the published state
    pub fn subscribe(&self) -> watch::Receiver<HandleState> {
        debug!("New subscriber to nunchuck state");
        self.state_receiver.clone()
    }

    /// Force C pressed or released through the regular update path.
    pub async fn fake_button_c(&self, pressed: bool) -> Result<HandleState, NunchuckError> {
        self.fake_button(Button::C, pressed).await
    }

    /// Force Z pressed or released through the regular update path.
    pub async fn fake_button_z(&self, pressed: bool) -> Result<HandleState, NunchuckError> {
        self.fake_button(Button::Z, pressed).await
    }

    pub async fn fake_button(
        &self,
        button: Button,
        pressed: bool,
    ) -> Result<HandleState, NunchuckError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.override_sender
            .send(OverrideRequest {
                button,
                pressed,
                response_tx,
            })
            .await
            .map_err(|e| NunchuckError::ChannelError(format!("poll task stopped: {}", e)))?;

        response_rx
            .await
            .map_err(|e| NunchuckError::ChannelError(format!("no override reply: {}", e)))
    }

    /// Stop polling before the next tick and wait for the task to finish.
    pub async fn shutdown(self) -> Result<(), NunchuckError> {
        info!("Shutting down nunchuck at {:#04x}", self.address);
        self.cancel.cancel();
        self.task
            .await
            .map_err(|e| NunchuckError::ChannelError(format!("poll task failed: {}", e)))
    }
}

impl fmt::Display for NunchuckHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Nunchuck {:#04x} {}>", self.address, self.snapshot())
    }
}
