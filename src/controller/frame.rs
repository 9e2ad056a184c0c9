//! Nunchuck frame decoding
//!
//! Every poll yields a 6-byte frame. The device whitens each byte before
//! sending it; [`unscramble`] undoes that, after which the layout is:
//!
//! ```text
//! byte 0   stick X
//! byte 1   stick Y
//! byte 2-4 accel X / Y / Z (upper 8 bits only)
//! byte 5   bit 1 = C released, bit 0 = Z released
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of one data frame
pub const FRAME_LEN: usize = 6;

/// Key of the byte whitening applied by the device
pub const SCRAMBLE_KEY: u8 = 0x17;

/// Undo the device's byte whitening.
pub fn unscramble(raw: u8) -> u8 {
    (raw ^ SCRAMBLE_KEY).wrapping_add(SCRAMBLE_KEY)
}

/// Apply the device's byte whitening; exact inverse of [`unscramble`].
pub fn scramble(value: u8) -> u8 {
    value.wrapping_sub(SCRAMBLE_KEY) ^ SCRAMBLE_KEY
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("Frame must be {expected} bytes, got {got}")]
    Length { expected: usize, got: usize },
}

/// The two nunchuck buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Button {
    C,
    Z,
}

impl Button {
    pub fn label(&self) -> &'static str {
        match self {
            Button::C => "C",
            Button::Z => "Z",
        }
    }
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub fn button_state(pressed: bool) -> &'static str {
    if pressed {
        "pressed"
    } else {
        "released"
    }
}

/// One complete, decoded reading of the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ControllerState {
    /// Analog stick X / Y
    pub stick: (u8, u8),
    /// Acceleration X / Y / Z, low-order bits discarded
    pub accel: (u8, u8, u8),
    /// `true` while C is held down
    pub button_c: bool,
    /// `true` while Z is held down
    pub button_z: bool,
}

impl ControllerState {
    /// Decode a raw frame as read from the bus.
    pub fn decode(raw: &[u8]) -> Result<Self, FrameError> {
        let raw: &[u8; FRAME_LEN] = raw.try_into().map_err(|_| FrameError::Length {
            expected: FRAME_LEN,
            got: raw.len(),
        })?;
        Ok(Self::from_unscrambled((*raw).map(unscramble)))
    }

    /// Interpret bytes that have already been unscrambled.
    pub fn from_unscrambled(data: [u8; FRAME_LEN]) -> Self {
        Self {
            stick: (data[0], data[1]),
            accel: (data[2], data[3], data[4]),
            // Raw bits are 0 while the button is held
            button_c: (data[5] >> 1) & 1 == 0,
            button_z: data[5] & 1 == 0,
        }
    }

    /// Unscrambled frame bytes that decode back to this state.
    ///
    /// The unused upper bits of byte 5 are left clear.
    pub fn to_unscrambled(&self) -> [u8; FRAME_LEN] {
        let mut buttons = 0u8;
        if !self.button_c {
            buttons |= 0b10;
        }
        if !self.button_z {
            buttons |= 0b01;
        }
        [
            self.stick.0,
            self.stick.1,
            self.accel.0,
            self.accel.1,
            self.accel.2,
            buttons,
        ]
    }

    /// Stick and accelerometer centred, both buttons released.
    pub fn neutral() -> Self {
        Self {
            stick: (0x80, 0x80),
            accel: (0x80, 0x80, 0x80),
            button_c: false,
            button_z: false,
        }
    }

    pub fn button(&self, button: Button) -> bool {
        match button {
            Button::C => self.button_c,
            Button::Z => self.button_z,
        }
    }

    pub fn with_button(mut self, button: Button, pressed: bool) -> Self {
        match button {
            Button::C => self.button_c = pressed,
            Button::Z => self.button_z = pressed,
        }
        self
    }

    pub fn with_button_c(self, pressed: bool) -> Self {
        self.with_button(Button::C, pressed)
    }

    pub fn with_button_z(self, pressed: bool) -> Self {
        self.with_button(Button::Z, pressed)
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<stick ({}, {}) accel ({}, {}, {}) C {} Z {}>",
            self.stick.0,
            self.stick.1,
            self.accel.0,
            self.accel.1,
            self.accel.2,
            button_state(self.button_c),
            button_state(self.button_z),
        )
    }
}

/// Identification bytes reported by the extension, unscrambled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdent(pub [u8; FRAME_LEN]);

impl fmt::Display for DeviceIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex: Vec<String> = self.0.iter().map(|b| format!("{:#04x}", b)).collect();
        write!(f, "[{}]", hex.join(", "))
    }
}
