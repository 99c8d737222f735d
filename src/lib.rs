//! Serial driver and browser monitor for Korad bench power supplies.
//!
//! The serial port should be configured like so:
//! * Baud rate: 9600
//! * Data bits: 8
//! * Stop bits: 1
//! * Parity: None

pub mod channel;
pub mod error;
pub mod korad;
pub mod monitor;
pub mod shared;
pub mod status;
pub mod web;

#[cfg(test)]
mod mock_serial;

pub use channel::{Channel, ChannelData, Indicator};
pub use error::{Error, Result};
pub use korad::{KoradPowerSupply, PortSettings, Transport};
pub use shared::SharedData;
pub use status::StatusRegister;
