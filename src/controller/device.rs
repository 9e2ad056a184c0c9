use statum::{machine, state};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::frame::{unscramble, DeviceIdent, FRAME_LEN};
use crate::transport::{Transport, TransportError};

/// Register/value pair that wakes the extension up
const INIT_REGISTER: u8 = 0x40;
const INIT_VALUE: u8 = 0x00;

/// Written before every read; the device answers with a data frame
const DATA_TRIGGER: u8 = 0x00;
/// Written before an ident read; the device answers with its ident bytes
const IDENT_REQUEST: u8 = 0xFA;

// Device settings
#[derive(Clone, Debug)]
pub struct DeviceSettings {
    pub address: u8,
    pub settle_delay_us: u64,
    pub response_delay_us: u64,
    pub recovery_delay_ms: u64,
    pub init_delay_ms: u64,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            address: 0x52,
            settle_delay_us: 4_000,
            response_delay_us: 2_000,
            recovery_delay_ms: 100,
            init_delay_ms: 10,
        }
    }
}

impl DeviceSettings {
    fn settle_delay(&self) -> Duration {
        Duration::from_micros(self.settle_delay_us)
    }

    fn response_delay(&self) -> Duration {
        Duration::from_micros(self.response_delay_us)
    }

    fn recovery_delay(&self) -> Duration {
        Duration::from_millis(self.recovery_delay_ms)
    }

    fn init_delay(&self) -> Duration {
        Duration::from_millis(self.init_delay_ms)
    }
}

// Device errors
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Failed to initialize device: {0}")]
    InitializationError(String),

    #[error("Transient bus error during {operation}: {source}")]
    TransientBusError {
        operation: &'static str,
        #[source]
        source: TransportError,
    },

    #[error("Malformed frame: expected {expected} bytes, got {got}")]
    MalformedFrameError { expected: usize, got: usize },
}

#[state]
#[derive(Debug, Clone)]
pub enum DeviceState {
    Uninitialized,
    Ready,
}

#[machine]
#[derive(Debug)]
pub struct NunchuckDevice<S: DeviceState> {
    // Bus the device sits on
    transport: Box<dyn Transport>,

    settings: DeviceSettings,

    // Filled in by the handshake
    ident: Option<DeviceIdent>,
}

impl<S: DeviceState> NunchuckDevice<S> {
    pub fn settings(&self) -> &DeviceSettings {
        &self.settings
    }

    pub fn ident(&self) -> Option<DeviceIdent> {
        self.ident
    }

    // Write trigger, wait for the device, read one frame's worth of bytes
    async fn request(
        &mut self,
        trigger: u8,
        retry_write: bool,
    ) -> Result<[u8; FRAME_LEN], DeviceError> {
        let address = self.settings.address;
        sleep(self.settings.settle_delay()).await;

        if let Err(e) = self.transport.write_byte(address, trigger) {
            if !retry_write {
                return Err(DeviceError::TransientBusError {
                    operation: "write",
                    source: e,
                });
            }
            // One bus restart, then give up on this cycle
            warn!("Bus restart after failed write of {:#04x}: {}", trigger, e);
            sleep(self.settings.recovery_delay()).await;
            self.transport
                .write_byte(address, trigger)
                .map_err(|source| DeviceError::TransientBusError {
                    operation: "write",
                    source,
                })?;
        }

        sleep(self.settings.response_delay()).await;

        let mut buf = [0u8; FRAME_LEN];
        let got = self
            .transport
            .read_bytes(address, &mut buf)
            .map_err(|source| DeviceError::TransientBusError {
                operation: "read",
                source,
            })?;
        if got < FRAME_LEN {
            return Err(DeviceError::MalformedFrameError {
                expected: FRAME_LEN,
                got,
            });
        }

        Ok(buf)
    }
}

impl NunchuckDevice<Uninitialized> {
    pub fn create(transport: Box<dyn Transport>, settings: Option<DeviceSettings>) -> Self {
        let settings = settings.unwrap_or_default();
        debug!("Creating nunchuck device with settings: {:?}", settings);
        Self::new(transport, settings, None)
    }

    // Run the wake-up handshake and read the ident, transitioning to Ready
    pub async fn initialize(mut self) -> Result<NunchuckDevice<Ready>, DeviceError> {
        let address = self.settings.address;
        info!("Initializing nunchuck at {:#04x}", address);

        if let Err(e) = self
            .transport
            .write_register(address, INIT_REGISTER, INIT_VALUE)
        {
            error!("Handshake write failed: {}", e);
            return Err(DeviceError::InitializationError(format!(
                "handshake write to {:#04x} failed: {}",
                address, e
            )));
        }
        sleep(self.settings.init_delay()).await;

        // The ident request gets no bus restart; a failure here ends the start
        let ident = match self.request(IDENT_REQUEST, false).await {
            Ok(raw) => DeviceIdent(raw.map(unscramble)),
            Err(e) => {
                error!("Reading ident failed: {}", e);
                return Err(DeviceError::InitializationError(format!(
                    "ident read failed: {}",
                    e
                )));
            }
        };
        info!("Nunchuck ident: {}", ident);
        self.ident = Some(ident);

        Ok(self.transition())
    }
}

impl NunchuckDevice<Ready> {
    /// Trigger and read one raw frame, retrying the trigger write once.
    pub async fn read_frame(&mut self) -> Result<[u8; FRAME_LEN], DeviceError> {
        let frame = self.request(DATA_TRIGGER, true).await?;
        debug!("Raw frame: {:02x?}", frame);
        Ok(frame)
    }
}
