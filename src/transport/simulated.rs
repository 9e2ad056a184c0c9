use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

use super::{Transport, TransportError};
use crate::controller::frame::{scramble, ControllerState, FRAME_LEN};

/// Default device address answered by the simulated bus
pub const SIMULATED_ADDRESS: u8 = 0x52;

const IDENT_REQUEST: u8 = 0xFA;

// Identification bytes of a genuine nunchuck, after unscrambling
const NUNCHUCK_IDENT: [u8; FRAME_LEN] = [0x00, 0x00, 0xA4, 0x20, 0x00, 0x00];

/// A single write observed on the simulated bus
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BusWrite {
    pub addr: u8,
    pub bytes: Vec<u8>,
}

#[derive(Debug)]
enum Latched {
    Frame,
    Ident,
}

#[derive(Debug)]
struct SimulatedInner {
    address: u8,
    queued: VecDeque<[u8; FRAME_LEN]>,
    current: [u8; FRAME_LEN],
    ident: [u8; FRAME_LEN],
    latched: Latched,
    failing_writes: usize,
    failing_reads: usize,
    short_reads: usize,
    writes: Vec<BusWrite>,
    reads: usize,
}

/// In-memory stand-in for a nunchuck on an I2C bus
///
/// Clones share the same device, so a test can keep one clone to script frames
/// and inject faults while the poll loop owns another. Frames are kept in their
/// scrambled wire form; once the queue drains the device keeps reporting the
/// last frame it delivered, like the real hardware does.
#[derive(Clone, Debug)]
pub struct SimulatedBus {
    inner: Arc<Mutex<SimulatedInner>>,
}

impl Default for SimulatedBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedBus {
    pub fn new() -> Self {
        Self::with_address(SIMULATED_ADDRESS)
    }

    pub fn with_address(address: u8) -> Self {
        let neutral = ControllerState::neutral().to_unscrambled();
        Self {
            inner: Arc::new(Mutex::new(SimulatedInner {
                address,
                queued: VecDeque::new(),
                current: neutral.map(scramble),
                ident: NUNCHUCK_IDENT.map(scramble),
                latched: Latched::Frame,
                failing_writes: 0,
                failing_reads: 0,
                short_reads: 0,
                writes: Vec::new(),
                reads: 0,
            })),
        }
    }

    /// Queue a reading the device will report on a later data trigger.
    pub fn push_state(&self, state: ControllerState) {
        self.push_raw_frame(state.to_unscrambled().map(scramble));
    }

    /// Queue a frame exactly as it would appear on the wire.
    pub fn push_raw_frame(&self, frame: [u8; FRAME_LEN]) {
        self.inner.lock().queued.push_back(frame);
    }

    /// Replace the unscrambled ident the device answers with.
    pub fn set_ident(&self, ident: [u8; FRAME_LEN]) {
        self.inner.lock().ident = ident.map(scramble);
    }

    /// Make the next `count` writes fail with a NACK.
    pub fn fail_next_writes(&self, count: usize) {
        self.inner.lock().failing_writes = count;
    }

    /// Make the next `count` reads fail with a NACK.
    pub fn fail_next_reads(&self, count: usize) {
        self.inner.lock().failing_reads = count;
    }

    /// Make the next `count` reads return only half a frame.
    pub fn truncate_next_reads(&self, count: usize) {
        self.inner.lock().short_reads = count;
    }

    pub fn writes(&self) -> Vec<BusWrite> {
        self.inner.lock().writes.clone()
    }

    pub fn read_count(&self) -> usize {
        self.inner.lock().reads
    }

    pub fn queued_frames(&self) -> usize {
        self.inner.lock().queued.len()
    }
}

impl SimulatedInner {
    fn accept_write(&mut self, addr: u8, bytes: Vec<u8>) -> Result<(), TransportError> {
        if addr != self.address {
            return Err(TransportError::Nack { addr });
        }
        if self.failing_writes > 0 {
            self.failing_writes -= 1;
            debug!("Simulated bus rejecting write {:02x?}", bytes);
            return Err(TransportError::Nack { addr });
        }
        self.writes.push(BusWrite { addr, bytes });
        Ok(())
    }
}

impl Transport for SimulatedBus {
    fn write_byte(&mut self, addr: u8, byte: u8) -> Result<(), TransportError> {
        let mut inner = self.inner.lock();
        inner.accept_write(addr, vec![byte])?;
        if byte == IDENT_REQUEST {
            inner.latched = Latched::Ident;
        } else {
            if let Some(next) = inner.queued.pop_front() {
                inner.current = next;
            }
            inner.latched = Latched::Frame;
        }
        Ok(())
    }

    fn write_register(&mut self, addr: u8, register: u8, value: u8) -> Result<(), TransportError> {
        self.inner.lock().accept_write(addr, vec![register, value])
    }

    fn read_bytes(&mut self, addr: u8, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut inner = self.inner.lock();
        if addr != inner.address {
            return Err(TransportError::Nack { addr });
        }
        if inner.failing_reads > 0 {
            inner.failing_reads -= 1;
            return Err(TransportError::Nack { addr });
        }
        inner.reads += 1;

        let source = match inner.latched {
            Latched::Frame => inner.current,
            Latched::Ident => inner.ident,
        };
        let mut count = buf.len().min(FRAME_LEN);
        if inner.short_reads > 0 {
            inner.short_reads -= 1;
            count = count.min(FRAME_LEN / 2);
        }
        buf[..count].copy_from_slice(&source[..count]);
        Ok(count)
    }
}
