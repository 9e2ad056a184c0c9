use rppal::i2c::I2c;
use std::fmt;
use tracing::debug;

use super::{Transport, TransportError};

/// Raspberry Pi I2C bus backed by `/dev/i2c-N`
pub struct RppalBus {
    i2c: I2c,
    bus: u8,
    // Slave address currently programmed into the driver
    slave: Option<u8>,
}

impl RppalBus {
    pub fn open(bus: u8) -> Result<Self, TransportError> {
        let i2c = I2c::with_bus(bus)?;
        Ok(Self {
            i2c,
            bus,
            slave: None,
        })
    }

    fn select(&mut self, addr: u8) -> Result<(), TransportError> {
        if self.slave != Some(addr) {
            debug!("Selecting slave address {:#04x} on bus {}", addr, self.bus);
            self.i2c.set_slave_address(u16::from(addr))?;
            self.slave = Some(addr);
        }
        Ok(())
    }
}

impl fmt::Debug for RppalBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RppalBus")
            .field("bus", &self.bus)
            .field("slave", &self.slave)
            .finish()
    }
}

impl Transport for RppalBus {
    fn write_byte(&mut self, addr: u8, byte: u8) -> Result<(), TransportError> {
        self.select(addr)?;
        match self.i2c.write(&[byte])? {
            0 => Err(TransportError::Nack { addr }),
            _ => Ok(()),
        }
    }

    fn write_register(&mut self, addr: u8, register: u8, value: u8) -> Result<(), TransportError> {
        self.select(addr)?;
        self.i2c.smbus_write_byte(register, value)?;
        Ok(())
    }

    fn read_bytes(&mut self, addr: u8, buf: &mut [u8]) -> Result<usize, TransportError> {
        self.select(addr)?;
        Ok(self.i2c.read(buf)?)
    }
}
