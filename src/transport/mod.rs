//! Byte-level I2C transport
//!
//! The controller core never talks to the bus directly. It is handed a boxed
//! [`Transport`] at startup and only ever issues three operations against it:
//!
//! ```text
//! write_byte(addr, byte)            data trigger / ident request
//! write_register(addr, reg, value)  init handshake
//! read_bytes(addr, buf) -> count    6-byte frame
//! ```
//!
//! Two implementations ship with the crate: [`RppalBus`] for a Raspberry Pi
//! I2C bus and [`SimulatedBus`] for machines without hardware and for tests.
//! [`open_transport`] picks one based on [`TransportKind`].

pub mod rppal_bus;
pub mod simulated;

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

pub use rppal_bus::RppalBus;
pub use simulated::SimulatedBus;

/// Errors raised by a single bus operation
///
/// Every variant is considered transient by the poll loop: the cycle is
/// abandoned and the next tick tries again.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I2C bus error: {0}")]
    I2c(#[from] rppal::i2c::Error),

    #[error("No acknowledge from device {addr:#04x}")]
    Nack { addr: u8 },

    #[error("Transport unavailable: {0}")]
    Unavailable(String),
}

/// Raw byte access to a device on an I2C bus
pub trait Transport: Send + fmt::Debug {
    /// Write a single byte to the device.
    fn write_byte(&mut self, addr: u8, byte: u8) -> Result<(), TransportError>;

    /// Write `value` into `register` of the device.
    fn write_register(&mut self, addr: u8, register: u8, value: u8) -> Result<(), TransportError>;

    /// Read up to `buf.len()` bytes, returning how many were actually read.
    fn read_bytes(&mut self, addr: u8, buf: &mut [u8]) -> Result<usize, TransportError>;
}

/// Which transport to open at startup
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Use the hardware bus if it can be opened, otherwise simulate.
    #[default]
    Auto,
    /// Hardware bus only; failing to open it is an error.
    I2c,
    /// Never touch hardware.
    Simulated,
}

/// Open the transport selected by `kind` on I2C bus number `bus`.
pub fn open_transport(kind: TransportKind, bus: u8) -> Result<Box<dyn Transport>, TransportError> {
    match kind {
        TransportKind::I2c => {
            let transport = RppalBus::open(bus).map_err(|e| {
                TransportError::Unavailable(format!("I2C bus {} could not be opened: {}", bus, e))
            })?;
            info!("Opened I2C bus {}", bus);
            Ok(Box::new(transport))
        }
        TransportKind::Simulated => {
            info!("Using simulated bus, no hardware will be accessed");
            Ok(Box::new(SimulatedBus::new()))
        }
        TransportKind::Auto => match RppalBus::open(bus) {
            Ok(transport) => {
                info!("Opened I2C bus {}", bus);
                Ok(Box::new(transport))
            }
            Err(e) => {
                warn!("I2C bus {} not available ({}), falling back to simulated bus", bus, e);
                Ok(Box::new(SimulatedBus::new()))
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_kind_never_touches_hardware() {
        let mut transport = open_transport(TransportKind::Simulated, 1).unwrap();
        transport.write_byte(0x52, 0x00).unwrap();
        let mut buf = [0u8; 6];
        assert_eq!(transport.read_bytes(0x52, &mut buf).unwrap(), 6);
    }

    #[test]
    fn missing_bus_is_unavailable() {
        // No machine has an I2C bus this high
        let result = open_transport(TransportKind::I2c, 250);
        assert!(matches!(result, Err(TransportError::Unavailable(_))));

        // Auto never fails for a missing bus
        assert!(open_transport(TransportKind::Auto, 250).is_ok());
    }

    #[test]
    fn transport_kind_reads_lowercase_names() {
        #[derive(Deserialize)]
        struct Wrapper {
            kind: TransportKind,
        }
        let parsed: Wrapper = toml::from_str("kind = \"simulated\"").unwrap();
        assert_eq!(parsed.kind, TransportKind::Simulated);
        let parsed: Wrapper = toml::from_str("kind = \"i2c\"").unwrap();
        assert_eq!(parsed.kind, TransportKind::I2c);
    }
}
