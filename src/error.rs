//! Error types for the Korad serial link.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to open serial port: {0}")]
    PortOpen(#[from] serialport::Error),
    #[error("Serial communication error: {0}")]
    Io(#[from] std::io::Error),
    #[error("No reply to \"{0}\" before timeout")]
    Timeout(String),
    #[error("Nothing received before timeout")]
    ReadTimeout,
    #[error("Invalid response to \"{command}\": {response:?}")]
    InvalidResponse { command: String, response: String },
    #[error("Invalid channel {0}, expected 1-9")]
    InvalidChannel(u8),
    #[error("Invalid channel {0:?}, expected 1-9")]
    InvalidChannelName(String),
    #[error("Invalid set point {0}")]
    InvalidValue(f64),
    #[error("Port lock poisoned")]
    PortLock,
    #[error("Data lock poisoned")]
    DataLock,
}
