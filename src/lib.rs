//! Poll a Wii nunchuck over I2C and react to its buttons.
//!
//! ```rust,no_run
//! use nunchuck::controller::{Callbacks, NunchuckHandle};
//! use nunchuck::transport::{open_transport, TransportKind};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = open_transport(TransportKind::Auto, 1)?;
//! let callbacks = Callbacks::new().on_c_change(|state| println!("C changed: {}", state));
//! let handle = NunchuckHandle::spawn(transport, None, callbacks).await?;
//! println!("{}", handle);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod controller;
pub mod transport;
