//! Nunchuck controller subsystem
//!
//! Polls a Wii nunchuck over I2C and turns its frames into button edges and
//! callbacks:
//!
//! 1. [`device`] - handshake and raw frame reads over a [`Transport`](crate::transport::Transport)
//! 2. [`frame`] - unscrambling and decoding of the 6-byte frame
//! 3. [`dispatcher`] - edge detection, state publishing and callbacks
//! 4. [`poll_loop`] - the fixed-tick background task
//! 5. [`controller_handle`] - public API and lifecycle
//!
//! # Architecture
//!
//! ```text
//! Transport ──► Device ──► Frame decode ──► StateTracker ──► watch channel
//!                                              │
//!                                              └──► callbacks (C, Z, any)
//! ```
//!
//! One poll cycle is settle delay, trigger write, response delay and a
//! 6-byte read, repeated every 500ms by default.

pub mod controller_handle;
pub mod device;
pub mod dispatcher;
pub mod frame;
pub mod poll_loop;

pub use controller_handle::{NunchuckError, NunchuckHandle, NunchuckSettings};
pub use device::{DeviceError, DeviceSettings};
pub use dispatcher::{Callbacks, HandleState};
pub use frame::{Button, ControllerState, DeviceIdent, FrameError};
